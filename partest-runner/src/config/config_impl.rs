// Copyright (c) The partest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use super::{Processes, RunOrder, StopPolicy, WorkerMode};
use crate::errors::{ConfigParseError, ConfigParseErrorKind};
use camino::{Utf8Path, Utf8PathBuf};
use config::{Config, ConfigBuilder, ConfigError, File, FileFormat, builder::DefaultState};
use indexmap::IndexMap;
use serde::Deserialize;
use std::{collections::BTreeSet, sync::LazyLock, time::Duration};
use tracing::warn;

/// Gets the number of available CPUs and caches the value.
#[inline]
pub fn get_num_cpus() -> usize {
    static NUM_CPUS: LazyLock<usize> =
        LazyLock::new(|| match std::thread::available_parallelism() {
            Ok(count) => count.into(),
            Err(err) => {
                warn!("unable to determine num-cpus ({err}), assuming 1 logical CPU");
                1
            }
        });

    *NUM_CPUS
}

/// Overall configuration for partest.
///
/// Obtained through [`Self::from_sources`], which layers the repository config over the embedded
/// default config.
#[derive(Clone, Debug)]
pub struct PartestConfig {
    workspace_root: Utf8PathBuf,
    inner: PartestConfigImpl,
}

impl PartestConfig {
    /// The default location of the config within the workspace: `.config/partest.toml`.
    pub const CONFIG_PATH: &'static str = ".config/partest.toml";

    /// Contains the default config as a TOML file.
    ///
    /// Repository-specific configuration is layered on top of the default config.
    pub const DEFAULT_CONFIG: &'static str = include_str!("../../default-config.toml");

    /// Reads the partest config from the given file, or if not specified from
    /// `.config/partest.toml` in the workspace root.
    ///
    /// If the file isn't specified and the default location doesn't exist, only the default
    /// config is used. Unknown keys are reported as warnings.
    pub fn from_sources(
        workspace_root: impl Into<Utf8PathBuf>,
        config_file: Option<&Utf8Path>,
    ) -> Result<Self, ConfigParseError> {
        let workspace_root = workspace_root.into();
        let (config_file, source) = match config_file {
            Some(file) => (file.to_owned(), File::new(file.as_str(), FileFormat::Toml)),
            None => {
                let config_file = workspace_root.join(Self::CONFIG_PATH);
                let source = File::new(config_file.as_str(), FileFormat::Toml).required(false);
                (config_file, source)
            }
        };

        let builder = Self::make_default_config().add_source(source);
        let (inner, unknown) = Self::build_and_deserialize_config(&builder)
            .map_err(|kind| ConfigParseError::new(&config_file, kind))?;

        if !unknown.is_empty() {
            let unknown_str = unknown.into_iter().collect::<Vec<_>>().join(", ");
            warn!("ignoring unknown configuration keys in `{config_file}`: {unknown_str}");
        }

        Ok(Self {
            workspace_root,
            inner,
        })
    }

    /// Returns the default partest config.
    pub fn default_config(workspace_root: impl Into<Utf8PathBuf>) -> Self {
        let (inner, _unknown) = Self::build_and_deserialize_config(&Self::make_default_config())
            .expect("default config is always valid");
        Self {
            workspace_root: workspace_root.into(),
            inner,
        }
    }

    /// Returns the workspace root the config was read for.
    pub fn workspace_root(&self) -> &Utf8Path {
        &self.workspace_root
    }

    /// Returns the `[run]` section.
    pub fn run(&self) -> &RunConfig {
        &self.inner.run
    }

    /// Returns the `[engine]` section.
    pub fn engine(&self) -> &EngineConfig {
        &self.inner.engine
    }

    /// Returns the `[discovery]` section.
    pub fn discovery(&self) -> &DiscoveryConfig {
        &self.inner.discovery
    }

    fn make_default_config() -> ConfigBuilder<DefaultState> {
        Config::builder().add_source(File::from_str(Self::DEFAULT_CONFIG, FileFormat::Toml))
    }

    /// This returns a tuple of (config, ignored paths).
    fn build_and_deserialize_config(
        builder: &ConfigBuilder<DefaultState>,
    ) -> Result<(PartestConfigImpl, BTreeSet<String>), ConfigParseErrorKind> {
        let config = builder
            .build_cloned()
            .map_err(|error| ConfigParseErrorKind::BuildError(Box::new(error)))?;

        let mut ignored = BTreeSet::new();
        let mut cb = |path: serde_ignored::Path| {
            ignored.insert(path.to_string());
        };
        let ignored_de = serde_ignored::Deserializer::new(config, &mut cb);
        let config: PartestConfigImpl =
            serde_path_to_error::deserialize(ignored_de).map_err(|error| {
                // Both serde_path_to_error and the config crate report the key. Drop the key
                // from the config error for consistency.
                let path = error.path().clone();
                let config_error = error.into_inner();
                let error = match config_error {
                    ConfigError::At { error, .. } => *error,
                    other => other,
                };
                ConfigParseErrorKind::DeserializeError(Box::new(serde_path_to_error::Error::new(
                    path, error,
                )))
            })?;

        Ok((config, ignored))
    }
}

#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "kebab-case")]
struct PartestConfigImpl {
    run: RunConfig,
    engine: EngineConfig,
    discovery: DiscoveryConfig,
}

/// The `[run]` section: how units are scheduled.
#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct RunConfig {
    /// Number of engine processes to run at once.
    pub processes: Processes,

    /// When to discard pending units.
    pub stop_on: StopPolicy,

    /// The order in which units are handed out.
    pub order: RunOrder,

    /// Whether to spawn a process per unit or reuse long-lived workers.
    pub worker_mode: WorkerMode,

    /// The scheduler's coordination tick.
    #[serde(with = "humantime_serde")]
    pub tick_interval: Duration,

    /// Directory in which per-unit artifacts are created.
    #[serde(default)]
    pub tmp_dir: Option<Utf8PathBuf>,
}

/// The `[engine]` section: how to invoke the single-process test engine.
#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct EngineConfig {
    /// The engine binary, as a bare name or a path.
    pub binary: String,

    /// Directories (relative to the workspace root) searched for a bare engine name.
    pub search_dirs: Vec<Utf8PathBuf>,

    /// Extra arguments passed before everything else.
    pub args: Vec<String>,

    /// The flag carrying the path of the per-unit JUnit log.
    pub log_junit_flag: String,

    /// The flag carrying the path of the per-unit raw coverage file.
    pub coverage_flag: String,

    /// The flag carrying the path of the per-unit TeamCity log.
    pub teamcity_flag: String,

    /// The flag that starts a long-lived worker.
    pub worker_flag: String,

    /// The flag carrying the path of a long-lived worker's marker file.
    pub write_to_flag: String,

    /// Extra environment variables.
    #[serde(default)]
    pub env: IndexMap<String, String>,
}

/// The `[discovery]` section: how test units are found.
#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct DiscoveryConfig {
    /// Paths searched for test units.
    pub paths: Vec<Utf8PathBuf>,

    /// Glob patterns a file must match to be a test unit.
    pub patterns: Vec<String>,

    /// Regular expression whose matches count the test cases in a unit.
    pub case_pattern: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use camino_tempfile::Utf8TempDir;
    use indoc::indoc;
    use pretty_assertions::assert_eq;

    fn temp_workspace(config_contents: &str) -> Utf8TempDir {
        let dir = camino_tempfile::Builder::new()
            .prefix("partest-config-")
            .tempdir()
            .expect("tempdir created");
        let config_dir = dir.path().join(".config");
        std::fs::create_dir(&config_dir).expect(".config created");
        std::fs::write(config_dir.join("partest.toml"), config_contents)
            .expect("config written");
        dir
    }

    #[test]
    fn default_config_is_valid() {
        let config = PartestConfig::default_config("/fake/root");
        assert_eq!(config.run().processes, Processes::NumCpus);
        assert_eq!(config.run().stop_on, StopPolicy::Never);
        assert_eq!(config.run().order, RunOrder::Default);
        assert_eq!(config.run().worker_mode, WorkerMode::Spawn);
        assert_eq!(config.run().tick_interval, Duration::from_millis(10));
        assert_eq!(config.run().tmp_dir, None);
        assert_eq!(config.engine().binary, "pest");
        assert_eq!(config.engine().log_junit_flag, "--log-junit");
        assert!(config.engine().env.is_empty());
        assert_eq!(config.discovery().paths, vec![Utf8PathBuf::from("tests")]);
    }

    #[test]
    fn repository_config_overrides_defaults() {
        let workspace = temp_workspace(indoc! {r#"
            [run]
            processes = 3
            stop-on = "on-error"
            order = "random=42"
            worker-mode = "reuse"
            tick-interval = "25ms"

            [engine]
            binary = "fake-engine"
            args = ["--quiet"]

            [engine.env]
            suite = "integration"

            [discovery]
            patterns = ["**/*.unit"]
        "#});

        let config =
            PartestConfig::from_sources(workspace.path(), None).expect("config is valid");
        assert_eq!(config.run().processes, Processes::Count(3));
        assert_eq!(config.run().stop_on, StopPolicy::OnError);
        assert_eq!(config.run().order, RunOrder::Random { seed: Some(42) });
        assert_eq!(config.run().worker_mode, WorkerMode::Reuse);
        assert_eq!(config.run().tick_interval, Duration::from_millis(25));
        assert_eq!(config.engine().binary, "fake-engine");
        assert_eq!(config.engine().args, vec!["--quiet".to_owned()]);
        assert_eq!(
            config.engine().env.get("suite").map(String::as_str),
            Some("integration")
        );
        // Keys not mentioned keep their defaults.
        assert_eq!(config.engine().worker_flag, "--worker");
        assert_eq!(config.discovery().patterns, vec!["**/*.unit".to_owned()]);
        assert_eq!(config.discovery().paths, vec![Utf8PathBuf::from("tests")]);
    }

    #[test]
    fn missing_repository_config_uses_defaults() {
        let dir = camino_tempfile::tempdir().expect("tempdir created");
        let config = PartestConfig::from_sources(dir.path(), None).expect("config is valid");
        assert_eq!(config.engine().binary, "pest");
    }

    #[test]
    fn missing_explicit_config_is_an_error() {
        let dir = camino_tempfile::tempdir().expect("tempdir created");
        let file = dir.path().join("nope.toml");
        let error = PartestConfig::from_sources(dir.path(), Some(&file))
            .expect_err("explicit config file must exist");
        assert_eq!(error.config_file(), file.as_path());
        assert!(matches!(error.kind(), ConfigParseErrorKind::BuildError(_)));
    }

    #[test]
    fn invalid_value_reports_path() {
        let workspace = temp_workspace(indoc! {r#"
            [run]
            processes = 0
        "#});

        let error = PartestConfig::from_sources(workspace.path(), None)
            .expect_err("zero processes is invalid");
        match error.kind() {
            ConfigParseErrorKind::DeserializeError(error) => {
                assert_eq!(error.path().to_string(), "run.processes");
            }
            other => panic!("unexpected error kind: {other:?}"),
        }
    }
}
