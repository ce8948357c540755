//! Node implementation: wires the store, verifier, risk scorer and HTTP API
//! together from a [`NodeConfig`] and serves until shutdown.

use crate::api::{self, AppState};
use crate::auth::{authenticator_from_config, Authenticator};
use crate::chain::{ChainReader, ChainVerifier};
use crate::config::NodeConfig;
use crate::error::{Error, Result};
use crate::event::{create_event_channel, NodeEvent, NodeEventsChannel, NodeEventsSender};
use crate::payment::{ConfirmationService, InvoiceService, ReferenceLocks};
use crate::risk::{endpoint_from_config, RiskEndpoint, RiskScorer};
use crate::store::InvoiceStore;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tracing::{debug, info, warn};

/// Builder for constructing a trustpay node.
///
/// Every external collaborator can be swapped out before [`build`](Self::build);
/// anything not supplied is created from the configuration.
pub struct NodeBuilder {
    config: NodeConfig,
    chain_reader: Option<Arc<dyn ChainReader>>,
    risk_endpoint: Option<Arc<dyn RiskEndpoint>>,
    authenticator: Option<Arc<dyn Authenticator>>,
}

impl NodeBuilder {
    /// Create a new node builder with the given configuration.
    #[must_use]
    pub fn new(config: NodeConfig) -> Self {
        Self {
            config,
            chain_reader: None,
            risk_endpoint: None,
            authenticator: None,
        }
    }

    /// Use this chain reader instead of JSON-RPC to `chain.rpc_url`.
    #[must_use]
    pub fn with_chain_reader(mut self, reader: Arc<dyn ChainReader>) -> Self {
        self.chain_reader = Some(reader);
        self
    }

    /// Use this risk endpoint instead of the configured one.
    #[must_use]
    pub fn with_risk_endpoint(mut self, endpoint: Arc<dyn RiskEndpoint>) -> Self {
        self.risk_endpoint = Some(endpoint);
        self
    }

    /// Use this authenticator instead of the configured one.
    #[must_use]
    pub fn with_authenticator(mut self, authenticator: Arc<dyn Authenticator>) -> Self {
        self.authenticator = Some(authenticator);
        self
    }

    /// Build the node and bind its listener.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid, the database cannot
    /// be opened or the listen address cannot be bound.
    pub async fn build(self) -> Result<RunningNode> {
        info!(
            "Building trustpay-node (database={}, contract={})",
            self.config.database_path.display(),
            self.config.chain.contract_address
        );

        let store = if self.config.is_in_memory() {
            InvoiceStore::open_in_memory()?
        } else {
            InvoiceStore::open(&self.config.database_path)?
        };

        let verifier = Arc::new(match self.chain_reader {
            Some(reader) => ChainVerifier::new(
                reader,
                self.config.chain.contract_address()?,
                &self.config.chain.function_signature,
            )?,
            None => ChainVerifier::from_config(&self.config.chain)?,
        });

        let risk_endpoint = match self.risk_endpoint {
            Some(endpoint) => endpoint,
            None => endpoint_from_config(&self.config.risk)?,
        };
        let authenticator = match self.authenticator {
            Some(authenticator) => authenticator,
            None => authenticator_from_config(&self.config.auth)?,
        };

        // Create shutdown channel
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        // Create event channel
        let (events_tx, events_rx) = create_event_channel();

        let scorer = RiskScorer::new(store.clone(), risk_endpoint);
        let locks = ReferenceLocks::with_capacity(self.config.lock_capacity);
        let state = AppState {
            confirmations: ConfirmationService::new(
                store.clone(),
                verifier,
                scorer.clone(),
                locks.clone(),
                events_tx.clone(),
            ),
            invoices: InvoiceService::new(store, scorer, locks, events_tx.clone()),
            authenticator,
        };

        let listener = TcpListener::bind(self.config.listen_addr).await?;
        let local_addr = listener.local_addr()?;
        info!("Listening on {}", local_addr);

        Ok(RunningNode {
            config: self.config,
            state,
            listener: Some(listener),
            local_addr,
            shutdown_tx,
            shutdown_rx,
            events_tx,
            events_rx: Some(events_rx),
        })
    }
}

/// A running trustpay node.
pub struct RunningNode {
    config: NodeConfig,
    state: AppState,
    listener: Option<TcpListener>,
    local_addr: SocketAddr,
    shutdown_tx: watch::Sender<bool>,
    shutdown_rx: watch::Receiver<bool>,
    events_tx: NodeEventsSender,
    events_rx: Option<NodeEventsChannel>,
}

impl RunningNode {
    /// Get the node's configuration.
    #[must_use]
    pub fn config(&self) -> &NodeConfig {
        &self.config
    }

    /// Address the HTTP server is bound to.
    #[must_use]
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Get a receiver for node events.
    ///
    /// Note: Can only be called once. Subsequent calls return None.
    pub fn events(&mut self) -> Option<NodeEventsChannel> {
        self.events_rx.take()
    }

    /// Subscribe to node events.
    #[must_use]
    pub fn subscribe_events(&self) -> NodeEventsChannel {
        self.events_tx.subscribe()
    }

    /// A handle that can stop the node from another task.
    #[must_use]
    pub fn shutdown_handle(&self) -> watch::Sender<bool> {
        self.shutdown_tx.clone()
    }

    /// Serve the HTTP API until shutdown is requested or Ctrl-C is received.
    ///
    /// # Errors
    ///
    /// Returns an error if the node has already run or the server fails.
    pub async fn run(&mut self) -> Result<()> {
        let listener = self
            .listener
            .take()
            .ok_or_else(|| Error::Internal("node has already run".to_string()))?;

        info!("Starting trustpay-node");

        // Emit started event
        let _ = self.events_tx.send(NodeEvent::Started);

        // Log lifecycle events until shutdown
        let mut events = self.events_tx.subscribe();
        let mut log_shutdown = self.shutdown_rx.clone();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = log_shutdown.changed() => {
                        if *log_shutdown.borrow() {
                            break;
                        }
                    }
                    event = events.recv() => match event {
                        Ok(NodeEvent::Error { message }) => warn!("Node error: {}", message),
                        Ok(event) => debug!("Event: {:?}", event),
                        Err(tokio::sync::broadcast::error::RecvError::Lagged(n)) => {
                            warn!("Event logger lagged by {} events", n);
                        }
                        Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
                    },
                }
            }
        });

        let mut shutdown_rx = self.shutdown_rx.clone();
        let shutdown_tx = self.shutdown_tx.clone();
        let shutdown = async move {
            tokio::select! {
                _ = async {
                    while shutdown_rx.changed().await.is_ok() {
                        if *shutdown_rx.borrow() {
                            break;
                        }
                    }
                } => {
                    info!("Shutdown signal received");
                }
                _ = tokio::signal::ctrl_c() => {
                    info!("Ctrl-C received, initiating shutdown");
                    let _ = shutdown_tx.send(true);
                }
            }
        };

        info!("Node running, waiting for shutdown signal");
        let app = api::router(self.state.clone());
        let served = axum::serve(listener, app)
            .with_graceful_shutdown(shutdown)
            .await;

        let _ = self.events_tx.send(NodeEvent::ShuttingDown);
        if let Err(e) = served {
            let _ = self.events_tx.send(NodeEvent::Error {
                message: format!("server failed: {e}"),
            });
            return Err(Error::Io(e));
        }
        info!("Node shutdown complete");
        Ok(())
    }

    /// Request the node to shut down.
    pub fn shutdown(&self) {
        let _ = self.shutdown_tx.send(true);
    }
}
