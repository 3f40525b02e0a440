use clap::Parser;
use client::network::ChatClient;
use client::ClientConfig;
use log::info;
use shared::{ChatError, ConsoleNotifier};
use std::sync::Arc;
use tokio::io::BufReader;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Login ID announced to the server
    login_id: Option<String>,

    /// Server host (no short flag to avoid conflict with --help)
    #[arg(long, default_value = shared::DEFAULT_HOST)]
    host: String,

    /// Server port
    #[arg(short, long, default_value_t = shared::DEFAULT_PORT)]
    port: u16,
}

impl From<Args> for ClientConfig {
    fn from(args: Args) -> Self {
        ClientConfig {
            identity: args.login_id,
            host: args.host,
            port: args.port,
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    if std::env::var("RUST_LOG").is_err() {
        eprintln!("Set RUST_LOG=info for detailed logging");
    }

    let args = Args::parse();
    info!("Connecting to {}:{}", args.host, args.port);

    let result = match ClientConfig::from(args).validate() {
        Ok(config) => {
            let mut client = ChatClient::new(config, Arc::new(ConsoleNotifier));
            match client.start().await {
                Ok(()) => client.run(BufReader::new(tokio::io::stdin())).await,
                Err(e) => Err(e),
            }
        }
        Err(e) => Err(e),
    };

    match result {
        Err(e @ (ChatError::IdentityRequired | ChatError::InvalidIdentity(_))) => {
            println!("ERROR - {}", e);
            std::process::exit(1);
        }
        result => Ok(result?),
    }
}
