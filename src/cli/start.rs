use crate::cli::{actions::Action, commands, dispatch::handler, telemetry};
use anyhow::Result;
use tracing::{Level, info};

/// Map the `-v` count to a tracing level. Without `-v` only errors are shown.
const fn get_verbosity_level(verbose_count: u8) -> Option<Level> {
    match verbose_count {
        0 => None,
        1 => Some(Level::INFO),
        2 => Some(Level::DEBUG),
        _ => Some(Level::TRACE),
    }
}

/// Parse the command line, initialise telemetry and build the action to run.
///
/// # Errors
///
/// Returns an error if telemetry initialization or command handling fails
pub fn start() -> Result<Action> {
    let matches = commands::new().get_matches();

    telemetry::init(get_verbosity_level(matches.get_count("verbose")))?;

    info!(
        version = env!("CARGO_PKG_VERSION"),
        commit = crate::status::GIT_COMMIT_HASH,
        "starting {}",
        env!("CARGO_PKG_NAME")
    );

    handler(&matches)
}
