use clap::Parser;
use log::{error, info};
use tokio::io::{stdin, BufReader};

use client::network::Client;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Server host to connect to
    host: String,

    /// Server port
    port: u16,

    /// Name shown to other players (at most 16 bytes)
    name: String,

    /// Words the server pushes at the start of each round (1-10)
    #[arg(short = 'f', long, default_value_t = shared::MAX_FANOUT)]
    fanout: u32,
}

#[tokio::main]
async fn main() {
    env_logger::init();

    if std::env::var("RUST_LOG").is_err() {
        eprintln!("Set RUST_LOG=info for detailed logging");
    }

    let args = Args::parse();
    let address = format!("{}:{}", args.host, args.port);

    let code = match play(&address, &args.name, args.fanout).await {
        Ok(()) => 0,
        Err(e) => {
            error!("{}", e);
            1
        }
    };

    // The blocking stdin reader would otherwise hold the runtime open until
    // the next line is typed.
    std::process::exit(code);
}

async fn play(address: &str, name: &str, fanout: u32) -> Result<(), Box<dyn std::error::Error>> {
    let mut client = Client::connect(address, name, fanout).await?;
    info!("Connected, type each word followed by Enter");

    let shutdown = async {
        let _ = tokio::signal::ctrl_c().await;
    };
    client.run(BufReader::new(stdin()), shutdown).await?;

    Ok(())
}
