use clap::{
    Arg, ArgAction, ColorChoice, Command,
    builder::styling::{AnsiColor, Effects, Styles},
};
use std::path::PathBuf;

mod queries;

pub mod built_info {
    include!(concat!(env!("OUT_DIR"), "/built.rs"));
}

pub fn new() -> Command {
    let styles = Styles::styled()
        .header(AnsiColor::Yellow.on_default() | Effects::BOLD)
        .usage(AnsiColor::Green.on_default() | Effects::BOLD)
        .literal(AnsiColor::Blue.on_default() | Effects::BOLD)
        .placeholder(AnsiColor::Green.on_default());

    let cmd = Command::new("mssql_agent")
        .about(env!("CARGO_PKG_DESCRIPTION"))
        .version(env!("CARGO_PKG_VERSION"))
        .long_version(built_info::GIT_COMMIT_HASH.unwrap_or(env!("CARGO_PKG_VERSION")))
        .color(ColorChoice::Auto)
        .styles(styles)
        .arg(
            Arg::new("config")
                .short('c')
                .long("config")
                .help("Path to the TOML configuration file")
                .default_value("mssql_agent.toml")
                .env("MSSQL_AGENT_CONFIG")
                .value_name("FILE")
                .value_parser(clap::value_parser!(PathBuf)),
        )
        .arg(
            Arg::new("poll-interval")
                .long("poll-interval")
                .help("Seconds between polls, overrides poll_interval_secs")
                .env("MSSQL_AGENT_POLL_INTERVAL")
                .value_name("SECONDS")
                .value_parser(clap::value_parser!(u64).range(1..)),
        )
        .arg(
            Arg::new("collect-only")
                .long("collect-only")
                .help("Collect and log metrics without sending them")
                .env("MSSQL_AGENT_COLLECT_ONLY")
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new("status-port")
                .long("status-port")
                .help("Serve /health and /metrics on this port")
                .env("MSSQL_AGENT_STATUS_PORT")
                .value_parser(clap::value_parser!(u16)),
        )
        .arg(
            Arg::new("listen")
                .short('l')
                .long("listen")
                .help("Address for the status server, defaults to [::] then 0.0.0.0")
                .env("MSSQL_AGENT_LISTEN")
                .value_name("IP")
                .requires("status-port"),
        )
        .arg(
            Arg::new("verbose")
                .short('v')
                .long("verbose")
                .help("Increase verbosity, -vv for debug")
                .action(ArgAction::Count),
        );

    queries::add_query_args(cmd)
}
