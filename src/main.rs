use std::process::ExitCode;
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use voice_relay::api::ApiServerBuilder;
use voice_relay::db::{self, Role, SessionRepo};
use voice_relay::llm::GeminiClient;
use voice_relay::relay::Conversation;
use voice_relay::tools::ToolExecutor;
use voice_relay::Config;

/// Voice relay - streams speech through STT, an LLM with tools, and TTS
#[derive(Parser)]
#[command(name = "relay", version, about)]
struct Cli {
    /// Port to listen on (overrides config)
    #[arg(long)]
    port: Option<u16>,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Run the HTTP and WebSocket server (default)
    Serve,
    /// List stored session ids
    Sessions,
    /// Print the history of a session
    History {
        /// Session id
        session_id: String,
    },
    /// Delete a session and its history
    Delete {
        /// Session id
        session_id: String,
    },
    /// Run one text turn through the LLM and tools
    Ask {
        /// Session id
        session_id: String,
        /// Question to ask
        text: String,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    // Set up logging based on verbosity; RUST_LOG wins when set
    let filter = match cli.verbose {
        0 => "info,voice_relay=info",
        1 => "info,voice_relay=debug",
        2 => "debug",
        _ => "trace",
    };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)))
        .init();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("fatal: {e:#}");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let config = Config::load().context("failed to load config")?;
    let pool = db::init(config.db_path()).context("failed to open history database")?;

    match cli.command.unwrap_or(Command::Serve) {
        Command::Serve => serve(config, pool, cli.port).await,
        Command::Sessions => {
            for id in SessionRepo::new(pool).list_ids()? {
                println!("{id}");
            }
            Ok(())
        }
        Command::History { session_id } => print_history(&SessionRepo::new(pool), &session_id),
        Command::Delete { session_id } => {
            SessionRepo::new(pool).delete(&session_id)?;
            println!("Session {session_id} deleted.");
            Ok(())
        }
        Command::Ask { session_id, text } => ask(&config, pool, &session_id, &text).await,
    }
}

async fn serve(config: Config, pool: db::DbPool, port: Option<u16>) -> anyhow::Result<()> {
    let port = port.unwrap_or(config.server.port);

    tracing::info!(
        port,
        data_dir = %config.data_dir.display(),
        model = %config.llm.model,
        tts_mode = ?config.voice.tts_mode,
        "starting voice relay"
    );

    ApiServerBuilder::new(pool, config)
        .port(port)
        .build()
        .run()
        .await?;

    Ok(())
}

fn print_history(repo: &SessionRepo, session_id: &str) -> anyhow::Result<()> {
    if repo.find(session_id)?.is_none() {
        anyhow::bail!("session {session_id} not found");
    }

    for turn in repo.history(session_id)? {
        let speaker = match turn.role {
            Role::User => "user",
            Role::Assistant => "assistant",
        };
        println!("[{}] {speaker}: {}", turn.created_at.format("%Y-%m-%d %H:%M:%S"), turn.content);
    }
    Ok(())
}

async fn ask(config: &Config, pool: db::DbPool, session_id: &str, text: &str) -> anyhow::Result<()> {
    let key = config
        .api_keys
        .google_gemini
        .clone()
        .filter(|k| !k.is_empty())
        .context("GOOGLE_API_KEY is not set")?;

    let llm = GeminiClient::from_config(config, key)?;
    let tools = Arc::new(ToolExecutor::from_config(config));
    let conversation = Conversation::new(SessionRepo::new(pool), llm, tools);

    let reply = conversation.respond(session_id, text).await?;
    println!("{reply}");
    Ok(())
}
