use std::net::SocketAddr;
use std::sync::Arc;

use tracing::{error, info};

use crate::relay::dispatcher::Dispatcher;
use crate::relay::relay_config::RelayConfig;
use crate::relay::relay_state::RelayState;
use crate::transport::relay_handler::RelayRequestHandler;
use crate::transport::udp::UdpTransport;
use crate::transport::Transport;

/// Puts the pieces together: the shared state, the dispatcher working on it, and a UDP transport
///  feeding it requests.
pub struct RelayServer {
    config: Arc<RelayConfig>,
    state: Arc<RelayState>,
    transport: Arc<dyn Transport>,
}
impl RelayServer {
    pub async fn new(config: Arc<RelayConfig>) -> anyhow::Result<RelayServer> {
        config.validate()?;

        Ok(RelayServer {
            state: Arc::new(RelayState::new(&config)),
            transport: Arc::new(UdpTransport::new(config.self_addr, config.max_datagram_size).await?), //TODO configurable transport
            config,
        })
    }

    pub fn local_addr(&self) -> anyhow::Result<SocketAddr> {
        self.transport.local_addr()
    }

    pub fn state(&self) -> &Arc<RelayState> {
        &self.state
    }

    /// Serves requests until [RelayServer::shutdown] is called or the socket fails
    pub async fn run(&self) -> anyhow::Result<()> {
        let dispatcher = Arc::new(Dispatcher::new(self.config.clone(), self.state.clone()));
        let handler = RelayRequestHandler::new(dispatcher, self.config.max_datagram_size);

        info!("relay listening on {:?}", self.local_addr()?);
        match self.transport.recv_loop(Arc::new(handler)).await {
            Ok(()) => {
                info!("relay shut down");
                Ok(())
            }
            Err(e) => {
                error!("relay stopped: {}", e);
                Err(e)
            }
        }
    }

    pub fn shutdown(&self) {
        self.transport.cancel_recv_loop();
    }
}
