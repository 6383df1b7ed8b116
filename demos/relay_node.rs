use clap::Parser;
use clap_derive::Parser;
use http_body_util::Full;
use hyper::body::Bytes;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Error, Response};
use hyper_util::rt::TokioIo;
use rustrelay::relay::relay_config::RelayConfig;
use rustrelay::relay::relay_server::RelayServer;
use rustrelay::relay::relay_state::RelayState;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::select;
use tracing::{error, info, Level};

#[derive(Parser)]
struct Args {
    relay_address: String,

    /// serves a plain text status page on this address if present
    #[clap(long)]
    http_address: Option<String>,

    #[clap(long, default_value_t = 30)]
    association_timeout_secs: u64,
    #[clap(long, default_value_t = 1024)]
    max_payload_len: usize,
    #[clap(long, default_value_t = 5)]
    max_buffer_size: usize,

    #[clap(short, long, default_value_t = false)]
    verbose: bool,

    #[clap(long, default_value_t = false)]
    very_verbose: bool,
}

#[tokio::main]
pub async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let level = match (args.verbose, args.very_verbose) {
        (_, true) => Level::TRACE,
        (true, _) => Level::DEBUG,
        (false, false) => Level::INFO,
    };

    tracing_subscriber::fmt()
        .with_max_level(level)
        .try_init()
        .ok();

    let mut config = RelayConfig::new(args.relay_address.parse()?);
    config.association_timeout = Duration::from_secs(args.association_timeout_secs);
    config.max_payload_len = args.max_payload_len;
    config.max_buffer_size = args.max_buffer_size;

    let server = Arc::new(RelayServer::new(Arc::new(config)).await?);

    match args.http_address {
        Some(http_address) => {
            let http_addr: SocketAddr = http_address.parse()?;
            select! {
                result = server.run() => { result }
                result = run_http_server(http_addr, server.state().clone()) => { result }
            }
        }
        None => server.run().await,
    }
}


async fn run_http_server(addr: SocketAddr, state: Arc<RelayState>) -> anyhow::Result<()> {
    let listener = TcpListener::bind(addr).await?;
    info!("Listening on http://{}", addr);
    loop {
        let (stream, _) = listener.accept().await?;
        let io = TokioIo::new(stream);

        let state = state.clone();
        let service = service_fn(move |_req| {
            let status = format!(
                "relay is running: {} associations, {} inboxes\n",
                state.registry.len(),
                state.inboxes.num_inboxes(),
            );
            async move {
                Ok::<_, Error>(Response::new(Full::new(Bytes::from(status))))
            }
        });

        tokio::spawn(async move {
            if let Err(err) = http1::Builder::new().serve_connection(io, service).await {
                error!("Error serving connection: {:?}", err);
            }
        });
    }
}
