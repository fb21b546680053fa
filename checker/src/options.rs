// Copyright (c) Facebook, Inc. and its affiliates.
//
// This source code is licensed under the MIT license found in the
// LICENSE file in the root directory of this source tree.

use crate::k_limits;
use crate::waitlist::WaitlistPolicy;

use clap::{Arg, ArgAction, Command};
use itertools::Itertools;

/// The name of the environment variable that supplies options to embedding tools.
pub const FLAGS_VARIABLE: &str = "CPA_FLAGS";

/// Creates the clap::Command metadata for argument parsing.
fn make_options_parser() -> Command {
    Command::new("CPA")
        .no_binary_name(true)
        .version("v0.1.0")
        .arg(Arg::new("max_call_stack_depth")
            .long("max_call_stack_depth")
            .value_parser(clap::value_parser!(usize))
            .help("The maximum number of nested procedure analyses.")
            .long_help("Calls deeper than this are analyzed intraprocedurally. Unbounded by default."))
        .arg(Arg::new("waitlist")
            .long("waitlist")
            .value_parser(["dfs", "bfs"])
            .default_value("dfs")
            .help("The order in which pending abstract states are explored.")
            .long_help("With `dfs` the most recently added state is explored first.\nWith `bfs` the oldest pending state is explored first.\n"))
        .arg(Arg::new("statistics")
            .long("statistics")
            .action(ArgAction::SetTrue)
            .help("Log a summary of the block abstraction cache usage once an analysis completes."))
}

/// Represents options passed to the analyses.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Options {
    pub max_call_stack_depth: Option<usize>,
    pub waitlist_policy: WaitlistPolicy,
    pub statistics: bool,
}

impl Default for Options {
    fn default() -> Options {
        Options {
            max_call_stack_depth: k_limits::MAX_CALL_STACK_DEPTH_DEFAULT,
            waitlist_policy: WaitlistPolicy::DepthFirst,
            statistics: false,
        }
    }
}

impl Options {
    /// Reads options from the CPA_FLAGS environment variable, if it is set.
    pub fn from_env() -> Result<Options, clap::Error> {
        let mut options = Options::default();
        if let Ok(flags) = std::env::var(FLAGS_VARIABLE) {
            options.parse_from_str(&flags)?;
        }
        Ok(options)
    }

    /// Parse options from an argument string. The argument string will be split using unix
    /// shell escaping rules. Any content beyond the leftmost `--` token will be returned
    /// (excluding this token).
    pub fn parse_from_str(&mut self, s: &str) -> Result<Vec<String>, clap::Error> {
        let args = shellwords::split(s).map_err(|e| {
            make_options_parser().error(
                clap::error::ErrorKind::InvalidValue,
                format!("Cannot parse argument string: {:?}", e),
            )
        })?;
        self.parse(&args)
    }

    /// Parses options from a list of strings. Any content beyond the leftmost `--` token
    /// will be returned (excluding this token).
    pub fn parse(&mut self, args: &[String]) -> Result<Vec<String>, clap::Error> {
        let mut own_args_end = args.len();
        let mut rest_start = args.len();
        if let Some((p, _)) = args.iter().find_position(|s| s.as_str() == "--") {
            own_args_end = p;
            rest_start = p + 1;
        }
        let matches = make_options_parser().try_get_matches_from(args[0..own_args_end].iter())?;

        if let Some(depth) = matches.get_one::<usize>("max_call_stack_depth") {
            self.max_call_stack_depth = Some(*depth);
        }
        if let Some(policy) = matches.get_one::<String>("waitlist") {
            self.waitlist_policy = match policy.as_str() {
                "dfs" => WaitlistPolicy::DepthFirst,
                "bfs" => WaitlistPolicy::BreadthFirst,
                other => {
                    warn!("unknown waitlist policy {}, using dfs", other);
                    WaitlistPolicy::DepthFirst
                }
            };
        }
        if matches.get_flag("statistics") {
            self.statistics = true;
        }
        Ok(args[rest_start..].to_vec())
    }
}
