use std::path::PathBuf;
use std::sync::atomic::Ordering;

use clap::Parser;
use env_logger::Env;
use log::{error, info};
use server::config::ServerConfig;
use server::corpus::WordCorpus;
use server::error::ServerError;
use server::network::Server;

/// Main-method of the server.
/// Parses command-line arguments, loads the word file and runs the reactor until ctrl-c.
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    #[derive(Parser, Debug)]
    #[clap(author, version, about)]
    struct Args {
        /// Server IP address to bind to
        host: String,
        /// Server port to listen on
        port: u16,
        /// Plain text file with the words to race on
        wordfile: PathBuf,
        /// Maximum number of connected players
        #[clap(long, default_value_t = server::config::DEFAULT_MAX_PLAYERS)]
        max_players: usize,
        /// Lobby countdown in seconds
        #[clap(long, default_value_t = server::config::DEFAULT_LOBBY_SECS)]
        lobby_secs: u32,
        /// Round length in seconds
        #[clap(long, default_value_t = server::config::DEFAULT_ROUND_SECS)]
        round_secs: u32,
        /// Score that wins a round
        #[clap(long, default_value_t = server::config::DEFAULT_SCORE_LIMIT)]
        score_limit: u32,
    }

    env_logger::Builder::from_env(Env::default().default_filter_or("info")).init();

    let args = Args::parse();

    let corpus = WordCorpus::load(&args.wordfile)
        .map_err(ServerError::from)
        .map_err(|e| {
            error!("{}", e);
            e
        })?;
    info!(
        "Loaded {} words from {}",
        corpus.len(),
        args.wordfile.display()
    );

    let config = ServerConfig {
        max_players: args.max_players,
        lobby_duration: args.lobby_secs,
        round_duration: args.round_secs,
        score_limit: args.score_limit,
        ..ServerConfig::default()
    };

    let address = format!("{}:{}", args.host, args.port);
    let mut server = Server::bind(&address, config, corpus).await?;

    let running = server.running_flag();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Received Ctrl+C, shutting down gracefully...");
            running.store(false, Ordering::SeqCst);
        }
    });

    server.run().await?;
    Ok(())
}
