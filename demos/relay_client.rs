use clap::{Parser, Subcommand};
use clap_derive::{Parser, Subcommand};
use anyhow::bail;
use bytes::Bytes;
use rustrelay::client::relay_client::RelayClient;
use rustrelay::frame::frame_model::{ClientId, Response};
use std::net::SocketAddr;
use std::time::Duration;
use tracing::Level;

#[derive(Parser)]
struct Args {
    relay_address: String,
    client_id: ClientId,

    #[clap(long, default_value_t = 2000)]
    timeout_millis: u64,

    #[clap(short, long, default_value_t = false)]
    verbose: bool,

    #[clap(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// register with the relay, or renew the registration
    Associate,
    /// send a message to another client's inbox
    Push {
        recipient_id: ClientId,
        message: String,
    },
    /// pick up the oldest message from our own inbox
    Get,
    /// associate, then poll for messages until interrupted
    Listen {
        #[clap(long, default_value_t = 1000)]
        poll_interval_millis: u64,
    },
}

#[tokio::main]
pub async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_max_level(if args.verbose { Level::TRACE } else { Level::INFO })
        .try_init()
        .ok();

    let relay_addr: SocketAddr = args.relay_address.parse()?;
    let mut client = RelayClient::connect(relay_addr, args.client_id, Duration::from_millis(args.timeout_millis)).await?;

    let response = match args.command {
        Command::Associate => client.associate().await?,
        Command::Push { recipient_id, message } => client.push(recipient_id, Bytes::from(message)).await?,
        Command::Get => client.get().await?,
        Command::Listen { poll_interval_millis } => {
            print_response(&client.associate().await?);
            let mut interval = tokio::time::interval(Duration::from_millis(poll_interval_millis));
            loop {
                interval.tick().await;
                match client.get().await? {
                    Response::BufferEmpty { .. } => {}
                    Response::NotAssociated { .. } => print_response(&client.associate().await?),
                    other => print_response(&other),
                }
            }
        }
    };

    print_response(&response);
    if !response.is_success() {
        bail!("the relay answered {:?}", response.message_code());
    }
    Ok(())
}

fn print_response(response: &Response) {
    match response {
        Response::GetResponse { sender_id, payload, .. } => {
            println!("from {}: {}", sender_id, String::from_utf8_lossy(payload));
        }
        other => println!("{:?}", other),
    }
}
