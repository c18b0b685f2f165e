//! The TCP accept loop: one worker [`dmtp_session::Session`] per connection.
//!
//! Grounded on `mssql-testing::mock_server::MockTdsServer::start`/`stop`,
//! the only place in the teacher pack with a real `tokio::spawn` accept
//! loop gated by a `tokio::sync::broadcast` shutdown signal. Here the
//! handler spawned per connection is a whole [`dmtp_session::Session`]
//! rather than a scripted handshake responder.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use dmtp_session::Session;
use dmtp_store::Store;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use crate::config::ListenerConfig;
use crate::error::ListenerError;

/// A running TCP accept loop. Dropping this stops it.
pub struct TcpAcceptLoop {
    addr: SocketAddr,
    shutdown_tx: broadcast::Sender<()>,
    active_sessions: Arc<AtomicUsize>,
}

impl TcpAcceptLoop {
    /// Bind and start accepting connections, spawning one [`Session`] per
    /// accepted socket.
    pub async fn start<S: Store>(config: Arc<ListenerConfig>, store: Arc<S>) -> Result<Self, ListenerError> {
        let listener = TcpListener::bind(("0.0.0.0", config.port))
            .await
            .map_err(|source| ListenerError::TcpBind { port: config.port, source })?;
        let addr = listener.local_addr().map_err(|source| ListenerError::TcpBind { port: config.port, source })?;

        let (shutdown_tx, _) = broadcast::channel(1);
        let active_sessions = Arc::new(AtomicUsize::new(0));

        let accept_shutdown = shutdown_tx.clone();
        let accept_count = active_sessions.clone();
        tokio::spawn(async move {
            let mut shutdown_rx = accept_shutdown.subscribe();
            loop {
                tokio::select! {
                    result = listener.accept() => {
                        match result {
                            Ok((stream, peer)) => {
                                let config = config.clone();
                                let store = store.clone();
                                let count = accept_count.clone();
                                count.fetch_add(1, Ordering::SeqCst);
                                tokio::spawn(async move {
                                    run_session(stream, peer, config, store).await;
                                    count.fetch_sub(1, Ordering::SeqCst);
                                });
                            }
                            Err(err) => {
                                warn!(%err, "TCP accept failed");
                                break;
                            }
                        }
                    }
                    _ = shutdown_rx.recv() => break,
                }
            }
        });

        Ok(Self { addr, shutdown_tx, active_sessions })
    }

    /// The address the listener bound, useful when `port` was 0.
    #[must_use]
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Number of sessions currently being driven.
    #[must_use]
    pub fn active_sessions(&self) -> usize {
        self.active_sessions.load(Ordering::SeqCst)
    }

    /// Signal the accept loop to stop taking new connections. In-flight
    /// sessions run to completion.
    pub fn stop(&self) {
        let _ = self.shutdown_tx.send(());
    }
}

impl Drop for TcpAcceptLoop {
    fn drop(&mut self) {
        self.stop();
    }
}

async fn run_session<S: Store>(stream: TcpStream, peer: SocketAddr, config: Arc<ListenerConfig>, store: Arc<S>) {
    if let Err(err) = stream.set_linger(Some(config.linger)) {
        warn!(%peer, %err, "failed to set SO_LINGER");
    }
    if let Err(err) = stream.set_nodelay(true) {
        debug!(%peer, %err, "failed to set TCP_NODELAY");
    }

    let session = Session::new(stream, store, config.to_tcp_session_config());
    match tokio::time::timeout(config.session_timeout_tcp, session.run()).await {
        Ok((stats, Ok(()))) => {
            info!(%peer, events_stored = stats.events_stored, naks_sent = stats.naks_sent, "session closed");
        }
        Ok((stats, Err(err))) => {
            debug!(%peer, %err, events_stored = stats.events_stored, "session ended with error");
        }
        Err(_) => {
            debug!(%peer, "session exceeded its wall-clock timeout, dropping transport");
        }
    }
}
