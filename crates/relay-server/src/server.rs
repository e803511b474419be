//! Relay server: accepts WebSocket connections and runs one session task
//! per client.
//!
//! The registry and dispatcher are built explicitly at construction time
//! and shared by reference; there is no hidden wiring. Each connection gets
//! a session id, a bounded outbound envelope queue, and a registry entry
//! whose lifetime matches the connection's.

use crate::config::ServerConfig;
use crate::relay::{RelayDispatcher, SessionRegistry};
use crate::transport::websocket::{self, WebSocketConnection};
use relay_core::{generate_session_id, RelayEnvelope, RelayError, RelayResult};
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

/// The fanout-relay server.
pub struct RelayServer {
    config: ServerConfig,
    registry: Arc<SessionRegistry>,
    dispatcher: Arc<RelayDispatcher>,
}

impl RelayServer {
    /// Create a new relay server from resolved configuration.
    pub fn new(config: ServerConfig) -> Self {
        let registry = Arc::new(SessionRegistry::new());
        let dispatcher = Arc::new(RelayDispatcher::new(registry.clone()));
        Self {
            config,
            registry,
            dispatcher,
        }
    }

    /// Access the session registry (e.g. for counting active sessions).
    pub fn registry(&self) -> &SessionRegistry {
        &self.registry
    }

    /// Resolve the configured bind address and port.
    ///
    /// Parses the address as an `IpAddr` so bare IPv6 forms like `::1`
    /// work without brackets.
    fn bind_addr(&self) -> RelayResult<SocketAddr> {
        let ip: IpAddr = self
            .config
            .bind
            .parse()
            .map_err(|e| RelayError::Transport(format!("invalid bind address: {e}")))?;
        Ok(SocketAddr::new(ip, self.config.port))
    }

    /// Bind the listener and accept connections until the listener stops.
    pub async fn run(self) -> RelayResult<()> {
        let addr = self.bind_addr()?;

        let server = Arc::new(self);
        let (local_addr, mut ws_rx) = websocket::start_listener(addr).await?;

        info!(addr = %local_addr, "fanout-relay ready");

        while let Some(conn) = ws_rx.recv().await {
            let server = server.clone();
            tokio::spawn(async move {
                server.handle_connection(conn).await;
            });
        }

        Ok(())
    }

    /// Drive one client connection from accept to close.
    ///
    /// Registers the session, runs the session loop, and unregisters on
    /// every exit path so a closing connection is promptly removed even
    /// while an in-flight broadcast still holds its stale handle.
    pub(crate) async fn handle_connection(&self, mut conn: WebSocketConnection) {
        let session_id = generate_session_id();
        let (envelope_tx, envelope_rx) =
            mpsc::channel::<RelayEnvelope>(self.config.send_queue_depth);

        if let Err(e) = self
            .registry
            .register(session_id.clone(), conn.remote_addr, envelope_tx)
            .await
        {
            error!(session_id = %session_id, error = %e, "could not register session");
            return;
        }

        let active = self.registry.count().await;
        info!(session_id = %session_id, remote = %conn.remote_addr, active, "session opened");

        if let Err(e) = self.session_loop(&mut conn, &session_id, envelope_rx).await {
            warn!(session_id = %session_id, error = %e, "session loop error");
        }

        self.registry.unregister(&session_id).await;
        let active = self.registry.count().await;
        info!(session_id = %session_id, active, "session closed");
    }

    /// Message loop for one connection.
    ///
    /// Outbound envelopes queued by the dispatcher are written to the
    /// socket; inbound text frames are handed to the dispatcher. Close or
    /// transport error ends the loop.
    async fn session_loop(
        &self,
        conn: &mut WebSocketConnection,
        session_id: &str,
        mut envelope_rx: mpsc::Receiver<RelayEnvelope>,
    ) -> RelayResult<()> {
        loop {
            tokio::select! {
                Some(envelope) = envelope_rx.recv() => {
                    websocket::ws_send_text(&mut conn.ws_stream, &envelope.render()).await?;
                }

                ws_result = websocket::ws_recv_text(&mut conn.ws_stream) => {
                    match ws_result {
                        Ok(Some(text)) => {
                            self.dispatcher.on_message(session_id, &text).await;
                        }
                        Ok(None) => {
                            debug!(session_id = %session_id, "client closed connection");
                            break;
                        }
                        Err(e) => {
                            debug!(session_id = %session_id, error = %e, "session ended");
                            break;
                        }
                    }
                }
            }
        }

        Ok(())
    }
}
