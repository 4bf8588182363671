pub mod run;

use std::path::PathBuf;

#[derive(Debug)]
pub enum Action {
    Run {
        config: PathBuf,
        collect_only: bool,
        poll_interval: Option<u64>,
        status_port: Option<u16>,
        listen: Option<String>,
        queries: Vec<String>,
    },
}
