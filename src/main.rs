use std::sync::Arc;

use clap::{Parser, Subcommand};

use telecon::api::http::HttpAccountApi;
use telecon::api::AccountApi;
use telecon::cli::{doctor, repl::Repl};
use telecon::config::Config;
use telecon::console::Console;
use telecon::notify::{Notifier, StdinConfirm, TerminalNotifier};

#[derive(Parser)]
#[command(name = "telecon", version, about = "Operator console for remote messaging-account sessions")]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Interactive console (default).
    Console,
    /// Run the credential-verification flow once and exit.
    Login {
        /// Phone number in international format.
        phone: Option<String>,
    },
    /// List stored sessions and exit.
    Sessions,
    /// Connectivity and configuration diagnostics.
    Doctor {
        /// Exit non-zero when any check fails.
        #[arg(long)]
        strict: bool,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    telecon::bootstrap::load_telecon_env();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("telecon=info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = Config::from_env()?;

    let api: Arc<dyn AccountApi> = Arc::new(HttpAccountApi::new(config.api.clone()));
    let notifier: Arc<dyn Notifier> = Arc::new(TerminalNotifier);
    let console = Arc::new(Console::new(
        Arc::clone(&api),
        Arc::clone(&notifier),
        Arc::new(StdinConfirm),
        config.poll,
    ));

    match cli.command.unwrap_or(Command::Console) {
        Command::Console => {
            let mut repl = Repl::new(
                Arc::clone(&console),
                Arc::clone(&api),
                Arc::clone(&notifier),
                config.browser.page_size,
            )?;
            repl.run().await?;
        }
        Command::Login { phone } => {
            let mut repl = Repl::new(
                Arc::clone(&console),
                Arc::clone(&api),
                Arc::clone(&notifier),
                config.browser.page_size,
            )?;
            repl.login(phone.as_deref()).await?;
        }
        Command::Sessions => {
            let sessions = console.load_sessions().await?;
            if sessions.is_empty() {
                println!("no stored sessions");
            }
            for session in sessions {
                println!(
                    "{}\t{}\t{}",
                    session.id,
                    session.phone_number,
                    if session.is_active { "active" } else { "inactive" }
                );
            }
        }
        Command::Doctor { strict } => {
            doctor::run_doctor(api, strict).await?;
        }
    }

    Ok(())
}
