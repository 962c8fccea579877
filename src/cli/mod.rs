//! Command-line interface: the HTTP server plus one-shot commands for each workflow.

use clap::{Parser, Subcommand};

use crate::config::Config;
use crate::entities::chat::ChatSession;
use crate::error::MedSafeError;
use crate::render;
use crate::service::MedSafe;

#[derive(Parser, Debug)]
#[command(
    name = "medsafe",
    version,
    about = "Educational drug interaction checker backed by RxNav",
    after_help = "Results are educational only and are not medical advice."
)]
pub struct Cli {
    /// Print JSON instead of markdown
    #[arg(long, global = true)]
    pub json: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the HTTP API
    Serve {
        #[arg(long, default_value = "127.0.0.1")]
        host: String,
        #[arg(long, default_value_t = 8000)]
        port: u16,
    },
    /// Check two or more drugs for interactions
    Interactions {
        #[arg(required = true, num_args = 1..)]
        drugs: Vec<String>,
    },
    /// List products that share the drug's active ingredients
    Alternatives { drug: String },
    /// Find drug names in free text
    Extract {
        #[arg(required = true, num_args = 1..)]
        text: Vec<String>,
    },
    /// Ask the app-usage assistant; several messages form one conversation
    Chat {
        #[arg(required = true, num_args = 1..)]
        messages: Vec<String>,
    },
}

/// Builds the service from the environment and runs a one-shot command.
pub async fn run(cli: Cli) -> anyhow::Result<String> {
    let config = Config::from_env()?;
    let service = MedSafe::from_config(&config)?;
    execute(&service, cli.json, cli.command).await
}

/// Runs a one-shot command against `service` and returns the rendered output.
pub async fn execute(service: &MedSafe, json: bool, command: Commands) -> anyhow::Result<String> {
    match command {
        Commands::Serve { .. } => Err(MedSafeError::InvalidArgument(
            "serve is handled by the binary entry point".into(),
        )
        .into()),
        Commands::Interactions { drugs } => {
            let report = service.check_interactions(&drugs).await?;
            if json {
                Ok(render::json::to_pretty(&report)?)
            } else {
                Ok(render::markdown::interactions_markdown(&drugs, &report)?)
            }
        }
        Commands::Alternatives { drug } => {
            let result = service.alternatives(&drug).await?;
            if json {
                Ok(render::json::to_pretty(&result)?)
            } else {
                Ok(render::markdown::alternatives_markdown(&result)?)
            }
        }
        Commands::Extract { text } => {
            let resolved = service.extract(&text.join(" ")).await;
            if json {
                Ok(render::json::to_pretty(&serde_json::json!({ "resolved": resolved }))?)
            } else {
                Ok(render::markdown::extract_markdown(&resolved)?)
            }
        }
        Commands::Chat { messages } => {
            let mut session = ChatSession::default();
            for message in &messages {
                service.chat_session(&mut session, message).await;
            }
            if json {
                Ok(render::json::to_pretty(&session)?)
            } else {
                Ok(render::markdown::chat_markdown(&session)?)
            }
        }
    }
}
