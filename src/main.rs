use clap::Parser;
use env_logger::Env;
use kabusignal::cli::{Cli, configured_log_level, run};

fn main() -> std::process::ExitCode {
    let cli = Cli::parse();
    let level = configured_log_level(&cli).unwrap_or_else(|| "info".to_string());
    env_logger::Builder::from_env(Env::default().default_filter_or(level)).init();
    run(cli)
}
