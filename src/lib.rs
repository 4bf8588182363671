pub mod agent;
pub mod cli;
pub mod config;
pub mod connection;
pub mod endpoint;
pub mod poller;
pub mod queries;
pub mod scheduler;
pub mod sink;
pub mod status;
