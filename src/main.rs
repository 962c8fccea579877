use clap::Parser;
use tracing_subscriber::EnvFilter;

use medsafe::cli::{Cli, Commands};
use medsafe::config::Config;
use medsafe::service::MedSafe;

fn init_tracing(default_filter: &str) {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter)),
        )
        .with_writer(std::io::stderr)
        .try_init();
}

async fn serve(host: &str, port: u16) -> Result<(), medsafe::error::MedSafeError> {
    let config = Config::from_env()?;
    let service = MedSafe::from_config(&config)?;
    medsafe::server::start_server(host, port, service).await
}

#[tokio::main]
async fn main() -> std::process::ExitCode {
    let cli = Cli::parse();
    match cli.command {
        Commands::Serve { ref host, port } => {
            init_tracing("info");
            match serve(host, port).await {
                Ok(()) => std::process::ExitCode::SUCCESS,
                Err(err) => {
                    eprintln!("Error: {err}");
                    std::process::ExitCode::from(1)
                }
            }
        }
        _ => {
            init_tracing("warn");
            match medsafe::cli::run(cli).await {
                Ok(output) => {
                    println!("{output}");
                    std::process::ExitCode::SUCCESS
                }
                Err(err) => {
                    if let Some(med_err) = err.downcast_ref::<medsafe::error::MedSafeError>() {
                        eprintln!("Error: {med_err}");
                    } else {
                        eprintln!("Error: {err}");
                    }
                    std::process::ExitCode::from(1)
                }
            }
        }
    }
}
