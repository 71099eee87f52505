use std::{env, env::VarError};

/// The daemon takes no arguments, so any argument prints the help. Returns true if help was printed.
pub fn handle_command_line_args() -> bool {
    let has_cli_args = env::args().count() > 1;
    if has_cli_args {
        display_readme();
        display_envs();
    }
    has_cli_args
}

fn display_readme() {
    const README: &str = include_str!("./cli-help.txt");
    println!("\n{README}\n");
}

fn display_envs() {
    // The webhook url is left out, since it contains the robot's access token
    const DISPLAY_ENVS: [&str; 11] = [
        "RUST_LOG",
        "RECON_DATABASE_URL",
        "RECON_ENABLED",
        "RECON_AUTO_INIT_TABLES",
        "RECON_AMOUNT_TOLERANCE",
        "RECON_BATCH_SIZE",
        "RECON_TIMING_ENABLED",
        "RECON_TIMING_INTERVAL_SECS",
        "RECON_ALARM_TYPE",
        "RECON_ASYNC_QUEUE_SIZE",
        "RECON_ASYNC_WORKERS",
    ];

    println!("Current environment values (EXCLUDING variables that contain secrets):");
    DISPLAY_ENVS.iter().for_each(|&name| {
        let val = match env::var(name) {
            Ok(s) => s,
            Err(VarError::NotPresent) => "Not set".into(),
            Err(VarError::NotUnicode(s)) => format!("Invalid value: {}", s.to_string_lossy()),
        };
        println!("  {name:<35} {val:<15}");
    })
}
