// Copyright (c) The partest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Rewriting of the arguments passed through to the engine.
//!
//! The arguments a user passes after `--` are meant for the engine, but some of them only make
//! sense for a single-process run. Before each launch they are passed through an [`ArgPipeline`]:
//! a fixed list of [`ArgHandler`]s, each a pure function from arguments to arguments.

use crate::config::StopPolicy;
use tracing::debug;

/// A single step of argument rewriting.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum ArgHandler {
    /// Removes the options that would make the engine parallelize on its own.
    StripParallel,

    /// Normalizes color options to a bare `--colors` flag, or to nothing.
    ///
    /// If the arguments contain `--colors=<when>` or `--colors <when>`, output is decorated unless
    /// `<when>` is `never`. Otherwise `default_decorated` decides.
    Colors {
        /// Whether output is decorated when the arguments don't say.
        default_decorated: bool,
    },

    /// Forwards the stop policy to the engine so it stops within a unit, too.
    StopOn(StopPolicy),

    /// Appends `key`, or `key=value` if a value is given.
    Set {
        /// The option.
        key: String,

        /// The option's value.
        value: Option<String>,
    },

    /// Removes every argument starting with `prefix`.
    Unset {
        /// The prefix to remove.
        prefix: String,
    },
}

impl ArgHandler {
    /// Applies this handler to `args`.
    pub fn apply(&self, mut args: Vec<String>) -> Vec<String> {
        match self {
            Self::StripParallel => {
                for key in ["--parallel", "-p"] {
                    if has_argument(&args, key) {
                        debug!("removing `{key}` from engine arguments");
                        args.retain(|arg| !is_argument(arg, key));
                    }
                }
                unset_argument(&mut args, "--processes");
            }
            Self::Colors { default_decorated } => {
                let decorated = match colors_value(&args) {
                    Some(when) => when != "never",
                    None => *default_decorated,
                };
                remove_colors(&mut args);
                if decorated {
                    set_argument(&mut args, "--colors", None);
                }
            }
            Self::StopOn(policy) => {
                unset_argument(&mut args, "--stop-on-failure");
                unset_argument(&mut args, "--stop-on-error");
                if let Some(flag) = policy.engine_flag() {
                    set_argument(&mut args, flag, None);
                }
            }
            Self::Set { key, value } => set_argument(&mut args, key, value.as_deref()),
            Self::Unset { prefix } => unset_argument(&mut args, prefix),
        }
        args
    }
}

/// An ordered list of [`ArgHandler`]s.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct ArgPipeline {
    handlers: Vec<ArgHandler>,
}

impl ArgPipeline {
    /// Creates a pipeline from a list of handlers.
    pub fn new(handlers: Vec<ArgHandler>) -> Self {
        Self { handlers }
    }

    /// The pipeline applied to every launch: strip parallelism, normalize colors, then forward
    /// the stop policy.
    pub fn standard(decorated: bool, stop_policy: StopPolicy) -> Self {
        Self::new(vec![
            ArgHandler::StripParallel,
            ArgHandler::Colors {
                default_decorated: decorated,
            },
            ArgHandler::StopOn(stop_policy),
        ])
    }

    /// Appends a handler.
    pub fn push(&mut self, handler: ArgHandler) {
        self.handlers.push(handler);
    }

    /// Returns the handlers in this pipeline.
    pub fn handlers(&self) -> &[ArgHandler] {
        &self.handlers
    }

    /// Runs `args` through every handler, in order.
    pub fn apply(&self, args: &[String]) -> Vec<String> {
        self.handlers
            .iter()
            .fold(args.to_vec(), |args, handler| handler.apply(args))
    }
}

/// Appends `key`, or `key=value` if `value` is non-empty.
pub fn set_argument(args: &mut Vec<String>, key: &str, value: Option<&str>) {
    match value {
        Some(value) if !value.is_empty() => args.push(format!("{key}={value}")),
        _ => args.push(key.to_owned()),
    }
}

/// Removes every argument that starts with `prefix`.
pub fn unset_argument(args: &mut Vec<String>, prefix: &str) {
    args.retain(|arg| !arg.starts_with(prefix));
}

/// Returns true if `key` is present, either bare or as `key=value`.
pub fn has_argument(args: &[String], key: &str) -> bool {
    args.iter().any(|arg| is_argument(arg, key))
}

fn is_argument(arg: &str, key: &str) -> bool {
    match arg.strip_prefix(key) {
        Some(rest) => rest.is_empty() || rest.starts_with('='),
        None => false,
    }
}

/// Finds the value of the last `--colors` option, if it has one.
fn colors_value(args: &[String]) -> Option<&str> {
    let mut value = None;
    let mut iter = args.iter().peekable();
    while let Some(arg) = iter.next() {
        if let Some(when) = arg.strip_prefix("--colors=") {
            value = Some(when);
        } else if arg == "--colors" {
            if let Some(next) = iter.peek().filter(|next| is_colors_value(next)) {
                value = Some(next.as_str());
                iter.next();
            }
        }
    }
    value
}

/// Removes `--colors` options along with any separate value argument.
fn remove_colors(args: &mut Vec<String>) {
    let mut out = Vec::with_capacity(args.len());
    let mut iter = std::mem::take(args).into_iter().peekable();
    while let Some(arg) = iter.next() {
        if arg == "--colors" {
            if iter.peek().is_some_and(|next| is_colors_value(next)) {
                iter.next();
            }
        } else if !arg.starts_with("--colors") {
            out.push(arg);
        }
    }
    *args = out;
}

fn is_colors_value(arg: &str) -> bool {
    matches!(arg, "always" | "auto" | "never")
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use test_case::test_case;

    fn args(args: &[&str]) -> Vec<String> {
        args.iter().map(|&arg| arg.to_owned()).collect()
    }

    #[test]
    fn set_and_unset() {
        let mut list = args(&["baz=boom"]);
        set_argument(&mut list, "foo", Some("bar"));
        unset_argument(&mut list, "baz");
        assert_eq!(list, args(&["foo=bar"]));

        set_argument(&mut list, "--bare", None);
        set_argument(&mut list, "--empty", Some(""));
        assert_eq!(list, args(&["foo=bar", "--bare", "--empty"]));
    }

    #[test]
    fn has_argument_matches_keys() {
        let list = args(&["foo=bar", "--verbose"]);
        assert!(has_argument(&list, "foo"));
        assert!(has_argument(&list, "--verbose"));
        assert!(!has_argument(&list, "bar"));
        assert!(!has_argument(&list, "fo"));
    }

    #[test]
    fn strip_parallel() {
        let list = ArgHandler::StripParallel.apply(args(&[
            "--parallel",
            "-p",
            "--processes=4",
            "--filter=foo",
        ]));
        assert_eq!(list, args(&["--filter=foo"]));

        // Only whole options are removed.
        let list = ArgHandler::StripParallel.apply(args(&["-p=2", "-pfoo", "--parallelism"]));
        assert_eq!(list, args(&["-pfoo", "--parallelism"]));
    }

    #[test_case(&[], true, &["--colors"] ; "default decorated")]
    #[test_case(&[], false, &[] ; "default plain")]
    #[test_case(&["--colors=never"], true, &[] ; "never wins over default")]
    #[test_case(&["--colors=always"], false, &["--colors"] ; "always wins over default")]
    #[test_case(&["--colors", "never", "--x"], true, &["--x"] ; "separate value")]
    #[test_case(&["--colors", "--x"], false, &["--x"] ; "bare flag uses default")]
    fn colors(input: &[&str], default_decorated: bool, expected: &[&str]) {
        let list = ArgHandler::Colors { default_decorated }.apply(args(input));
        assert_eq!(list, args(expected));
    }

    #[test_case(StopPolicy::Never, &["--x"] ; "never")]
    #[test_case(StopPolicy::OnFailure, &["--x", "--stop-on-failure"] ; "on failure")]
    #[test_case(StopPolicy::OnError, &["--x", "--stop-on-error"] ; "on error")]
    fn stop_on(policy: StopPolicy, expected: &[&str]) {
        let list = ArgHandler::StopOn(policy).apply(args(&["--stop-on-failure", "--x"]));
        assert_eq!(list, args(expected));
    }

    #[test]
    fn standard_pipeline() {
        let mut pipeline = ArgPipeline::standard(true, StopPolicy::OnFailure);
        pipeline.push(ArgHandler::Set {
            key: "--group".to_owned(),
            value: Some("fast".to_owned()),
        });
        pipeline.push(ArgHandler::Unset {
            prefix: "--debug".to_owned(),
        });
        assert_eq!(pipeline.handlers().len(), 5);

        let list = pipeline.apply(&args(&["-p", "--colors=never", "--debug", "--filter=x"]));
        assert_eq!(
            list,
            args(&["--filter=x", "--stop-on-failure", "--group=fast"])
        );
    }
}
