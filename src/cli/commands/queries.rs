use crate::queries::{QUERY_NAMES, Query, all_factories};
use clap::{Arg, ArgAction, Command};

/// Add `--query.<name>` and `--no-query.<name>` for every registered query.
pub fn add_query_args(mut cmd: Command) -> Command {
    let factories = all_factories();

    for &name in QUERY_NAMES {
        let default_enabled = factories
            .get(name)
            .is_some_and(|factory| factory().enabled_by_default());

        // clap needs 'static ids; the set of queries is fixed for the process
        let enable_flag: &'static str = Box::leak(format!("query.{name}").into_boxed_str());
        let disable_flag: &'static str = Box::leak(format!("no-query.{name}").into_boxed_str());

        let default_indicator = if default_enabled {
            " [default: enabled]"
        } else {
            " [default: disabled]"
        };
        let enable_help: &'static str =
            Box::leak(format!("Run the {name} query{default_indicator}").into_boxed_str());
        let disable_help: &'static str =
            Box::leak(format!("Do not run the {name} query").into_boxed_str());

        cmd = cmd
            .arg(
                Arg::new(enable_flag)
                    .long(enable_flag)
                    .help(enable_help)
                    .action(ArgAction::SetTrue),
            )
            .arg(
                Arg::new(disable_flag)
                    .long(disable_flag)
                    .help(disable_help)
                    .action(ArgAction::SetTrue)
                    .overrides_with(enable_flag),
            );
    }

    cmd
}
