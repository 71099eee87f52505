use dotenvy::dotenv;
use log::info;
use recon_daemon::{cli::handle_command_line_args, config::DaemonConfig, daemon::run_daemon};

#[tokio::main]
async fn main() {
    dotenv().ok();
    env_logger::init();
    if handle_command_line_args() {
        return;
    }
    let config = DaemonConfig::from_env_or_default();

    info!("🚀️ Starting reconciliation daemon using {}", config.database_url);
    match run_daemon(config).await {
        Ok(_) => println!("Bye!"),
        Err(e) => eprintln!("{e}"),
    }
}
