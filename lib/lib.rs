pub mod auth;
pub mod build_info;
pub mod cli;
pub mod config;
pub mod logging;
pub mod notify;
pub mod queue;
pub mod server;
pub mod service;
pub mod state;
pub mod store;
