pub mod cli;
pub mod load_config;

use std::process::ExitCode;

use clap::Parser;
use repo_policy_core::registry::HookId;
use tracing_subscriber::EnvFilter;

pub use cli::{run, Cli, Commands};

/// Exit status when flags or the profile are invalid and nothing was touched.
pub const CONFIGURATION_ERROR: u8 = 2;

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    // A second initialisation only happens in tests; keep the first subscriber.
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

/// Shared `main` of every binary. `hook` is set by the per-hook executables and
/// stands in for the subcommand.
pub fn main_for(hook: Option<HookId>) -> ExitCode {
    dotenvy::dotenv().ok();
    init_tracing();

    let cli = Cli::parse_from(cli::hook_args(hook, std::env::args_os()));
    tracing::info!("CLI arguments parsed, invoking run");
    match run(cli) {
        Ok(outcome) => {
            let summary = outcome.render();
            if !summary.is_empty() {
                println!("{summary}");
            }
            tracing::info!(exit_code = outcome.exit_code(), "CLI completed");
            ExitCode::from(outcome.exit_code())
        }
        Err(e) => {
            tracing::error!(error = %e, "CLI exited with error");
            eprintln!("error: {e:#}");
            ExitCode::from(CONFIGURATION_ERROR)
        }
    }
}
