#![warn(clippy::all, clippy::pedantic)]
#![allow(
    clippy::doc_markdown,
    clippy::missing_errors_doc,
    clippy::module_name_repetitions,
    clippy::uninlined_format_args
)]

use std::sync::Arc;

use anyhow::{bail, Result};
use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::{fmt, EnvFilter};

use voxtutor::answers::AnswerGenerator;
use voxtutor::completion::OpenAiCompatibleClient;
use voxtutor::config::Config;
use voxtutor::dialog::DialogController;
use voxtutor::gateway;
use voxtutor::summary::{DisabledSummaryDispatcher, SmtpSummaryDispatcher, SummaryDispatcher};
use voxtutor::transcript::{InMemoryTranscriptStore, TranscriptStore};

/// `VoxTutor` - an AI study tutor answering questions over the phone.
#[derive(Parser, Debug)]
#[command(name = "voxtutor")]
#[command(version)]
#[command(about = "AI study tutor over the phone.", long_about = None)]
struct Cli {
    #[arg(long, global = true)]
    config_dir: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Start the webhook gateway the telephony provider calls into
    #[command(long_about = "\
Start the webhook gateway the telephony provider calls into.

Binds the HTTP server that answers voice callbacks. Point your
provider's voice webhook at POST http://<host>:<port>/voice.

Examples:
  voxtutor serve                  # use config defaults
  voxtutor serve -p 8080          # listen on port 8080
  voxtutor serve --host 0.0.0.0   # bind to all interfaces")]
    Serve {
        /// Port to listen on; defaults to config gateway.port
        #[arg(short, long)]
        port: Option<u16>,

        /// Host to bind to; defaults to config gateway.host
        #[arg(long)]
        host: Option<String>,
    },

    /// Show configuration and service status
    Status,

    /// Check configured credentials against their live services
    Doctor,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Install default crypto provider for Rustls TLS.
    // This prevents the error: "could not automatically determine the process-level CryptoProvider"
    // when both aws-lc-rs and ring features are available (or neither is explicitly selected).
    if let Err(e) = rustls::crypto::ring::default_provider().install_default() {
        eprintln!("Warning: Failed to install default crypto provider: {e:?}");
    }

    let cli = Cli::parse();

    if let Some(config_dir) = &cli.config_dir {
        if config_dir.trim().is_empty() {
            bail!("--config-dir cannot be empty");
        }
        std::env::set_var("VOXTUTOR_CONFIG_DIR", config_dir);
    }

    let subscriber = fmt::Subscriber::builder()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .finish();

    tracing::subscriber::set_global_default(subscriber)?;

    let config = Config::load_or_init().await?;

    match cli.command {
        Commands::Serve { port, host } => {
            let port = port.unwrap_or(config.gateway.port);
            let host = host.unwrap_or_else(|| config.gateway.host.clone());
            let controller = build_controller(&config);
            info!("📞 Starting VoxTutor gateway on {host}:{port}");
            gateway::run(&host, port, Arc::new(controller)).await
        }

        Commands::Status => {
            println!("📞 VoxTutor Status");
            println!();
            println!("Version:     {}", env!("CARGO_PKG_VERSION"));
            println!("Config:      {}", config.config_path.display());
            println!();
            println!("🤖 Model:        {}", config.model);
            println!(
                "   API key:      {}",
                if config.api_key.is_some() {
                    "configured"
                } else {
                    "missing"
                }
            );
            println!(
                "🌐 Gateway:      {}:{}",
                config.gateway.host, config.gateway.port
            );
            println!(
                "✉️  Summaries:    {}",
                if config.summary_configured() {
                    format!(
                        "enabled → {}",
                        config.summary.recipient.as_deref().unwrap_or("")
                    )
                } else {
                    "not configured".to_string()
                }
            );
            Ok(())
        }

        Commands::Doctor => doctor(&config).await,
    }
}

fn build_controller(config: &Config) -> DialogController {
    let store: Arc<dyn TranscriptStore> = Arc::new(InMemoryTranscriptStore::new());
    let client = Arc::new(OpenAiCompatibleClient::new(
        config.api_url.as_deref(),
        config.api_key.as_deref(),
        &config.model,
        config.temperature,
    ));
    let dispatcher: Arc<dyn SummaryDispatcher> =
        match SmtpSummaryDispatcher::from_config(&config.summary) {
            Ok(smtp) => Arc::new(smtp),
            Err(e) => {
                // The service still answers calls; the summary branch will
                // apologize instead of emailing.
                tracing::warn!(error = %e, "summary delivery disabled");
                Arc::new(DisabledSummaryDispatcher)
            }
        };

    DialogController::new(store, AnswerGenerator::new(client), dispatcher)
}

/// Exercise each configured credential against its live service and report
/// pass/fail per check. Exits non-zero if any check fails.
async fn doctor(config: &Config) -> Result<()> {
    use voxtutor::completion::CompletionClient;

    println!("🩺 VoxTutor Doctor");
    println!();

    let mut failures = 0;

    print!("Completion API... ");
    if config.api_key.is_none() {
        println!("❌ no API key configured (set api_key or OPENAI_API_KEY)");
        failures += 1;
    } else {
        let client = OpenAiCompatibleClient::new(
            config.api_url.as_deref(),
            config.api_key.as_deref(),
            &config.model,
            config.temperature,
        );
        match client
            .complete("You are a connectivity check.", "Reply with the word OK.")
            .await
        {
            Ok(_) => println!("✅ reachable (model: {})", config.model),
            Err(e) => {
                println!("❌ {e}");
                failures += 1;
            }
        }
    }

    print!("SMTP relay...     ");
    if !config.summary_configured() {
        println!("⚠️  not configured, summary delivery disabled");
    } else {
        match SmtpSummaryDispatcher::from_config(&config.summary) {
            Ok(dispatcher) => match dispatcher.verify().await {
                Ok(()) => println!(
                    "✅ connected to {}",
                    config.summary.smtp_host.as_deref().unwrap_or("")
                ),
                Err(e) => {
                    println!("❌ {e}");
                    failures += 1;
                }
            },
            Err(e) => {
                println!("❌ {e}");
                failures += 1;
            }
        }
    }

    println!();
    if failures > 0 {
        bail!("{failures} check(s) failed");
    }
    println!("All checks passed.");
    Ok(())
}
