// Copyright (c) The partest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use camino::{Utf8Path, Utf8PathBuf};
use camino_tempfile::Utf8TempDir;
use color_eyre::{Result, eyre::Context};
use indoc::formatdoc;

/// A temporary workspace whose units are run by the fake engine.
///
/// Units are `.unit` files under `tests/`, and every line starting with an outcome directive
/// counts as a test case.
#[derive(Debug)]
pub struct TempWorkspace {
    dir: Utf8TempDir,
}

impl TempWorkspace {
    /// Creates a workspace configured to run units through `engine`.
    pub fn new(engine: &Utf8Path) -> Result<Self> {
        Self::with_config(engine, "")
    }

    /// Creates a workspace with extra TOML appended to the `[run]` section.
    pub fn with_config(engine: &Utf8Path, run_config: &str) -> Result<Self> {
        let dir = camino_tempfile::Builder::new()
            .prefix("partest-ws-")
            .tempdir()
            .wrap_err("failed to create temp dir")?;
        std::fs::create_dir_all(dir.path().join(".config"))?;
        std::fs::create_dir_all(dir.path().join("tests"))?;

        let config = formatdoc! {r#"
            [run]
            tick-interval = "5ms"
            {run_config}

            [engine]
            binary = '{engine}'

            [discovery]
            patterns = ["**/*.unit"]
            case-pattern = '(?m)^(?:pass|fail|error|skip|warn)\b'
        "#};
        std::fs::write(dir.path().join(".config/partest.toml"), config)
            .wrap_err("failed to write config")?;

        Ok(Self { dir })
    }

    /// Returns the workspace root.
    pub fn root(&self) -> &Utf8Path {
        self.dir.path()
    }

    /// Writes a unit at `tests/<name>.unit`.
    pub fn add_unit(&self, name: &str, contents: &str) -> Result<Utf8PathBuf> {
        let rel_path = Utf8PathBuf::from(format!("tests/{name}.unit"));
        let path = self.root().join(&rel_path);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&path, contents).wrap_err_with(|| format!("failed to write `{path}`"))?;
        Ok(rel_path)
    }

    /// Returns the absolute path of a file in the workspace.
    pub fn path(&self, rel_path: &str) -> Utf8PathBuf {
        self.root().join(rel_path)
    }
}
