use crate::build_info;
use clap::Parser;

#[derive(Parser, Debug)]
#[command(
    about = "Walk-in queue server for the shop floor",
    version = build_info::VERSION_WITH_COMMIT,
    long_version = build_info::VERSION_WITH_COMMIT
)]
pub struct Cli {
    #[clap(long)]
    /// Override the HTTP bind address (otherwise BIND_ADDR or 0.0.0.0:3000)
    pub bind: Option<std::net::SocketAddr>,

    #[clap(long, default_value = "info")]
    /// Default log level when RUST_LOG is unset
    pub log_level: String,
}

pub fn parse_args() -> Cli {
    Cli::parse()
}
