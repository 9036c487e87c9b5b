// Copyright (c) The partest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use camino::Utf8Path;
use indexmap::IndexMap;
use partest_metadata::{
    PARTEST_ENV, PARTEST_FORCE_COLORS_ENV, PARTEST_TOKEN_ENV, PARTEST_UNIQUE_TOKEN_ENV,
};
use std::io;

mod imp;
pub(crate) use imp::{Child, ChildAccumulator, ChildFds, StdinMode};

/// Environment passed to every engine process.
#[derive(Clone, Debug)]
pub(crate) struct EngineEnv<'a> {
    /// The slot token, exposed as `PARTEST_TOKEN`.
    pub(crate) token: usize,

    /// Exposed as `PARTEST_UNIQUE_TOKEN`. Only set for per-unit processes.
    pub(crate) unique_token: Option<String>,

    /// Whether to set `PARTEST_FORCE_COLORS`.
    pub(crate) force_colors: bool,

    /// Extra variables from `[engine.env]`.
    pub(crate) extra: &'a IndexMap<String, String>,
}

/// An engine command ready to be spawned.
pub(crate) struct TestCommand {
    command: std::process::Command,
    command_line: String,
}

impl TestCommand {
    /// Creates a new command.
    pub(crate) fn new(
        program: &Utf8Path,
        args: &[String],
        cwd: &Utf8Path,
        env: &EngineEnv<'_>,
    ) -> Self {
        let mut command = std::process::Command::new(program);
        command.args(args).current_dir(cwd);

        // User-provided variables come first so the PARTEST_* ones always win.
        for (key, value) in env.extra {
            command.env(key, value);
        }
        command
            // Set to indicate that tests are being run under partest.
            .env(PARTEST_ENV, "1")
            .env(PARTEST_TOKEN_ENV, env.token.to_string());
        if let Some(unique_token) = &env.unique_token {
            command.env(PARTEST_UNIQUE_TOKEN_ENV, unique_token);
        }
        if env.force_colors {
            command.env(PARTEST_FORCE_COLORS_ENV, "1");
        }

        let command_line = shell_words::join(
            std::iter::once(program.as_str()).chain(args.iter().map(String::as_str)),
        );

        Self {
            command,
            command_line,
        }
    }

    /// Returns the shell-quoted command line, for diagnostics.
    pub(crate) fn command_line(&self) -> &str {
        &self.command_line
    }

    pub(crate) fn spawn(self, stdin: StdinMode) -> io::Result<Child> {
        imp::spawn(self.command, stdin)
    }
}
