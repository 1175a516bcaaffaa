//! Runtime: wires the ledger store to both sync directions.
//!
//! Owns the background sync tasks and shuts them down before closing the
//! store.

use std::sync::Arc;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{error, info};

use crate::config::Config;
use crate::projector::BalanceProjector;
use crate::store::LedgerStore;
use crate::sync::{ChangeFeed, InboundSyncListener, OutboundSyncEngine, RemoteStore, StaticParentResolver};

pub struct Runtime {
    store: Arc<LedgerStore>,
    outbound: Arc<OutboundSyncEngine>,
    inbound: Arc<InboundSyncListener>,
    shutdown: watch::Sender<bool>,
    tasks: Vec<JoinHandle<()>>,
}

impl Runtime {
    /// Spawn the outbound and inbound sync loops over an open store.
    pub fn start(
        config: &Config,
        store: Arc<LedgerStore>,
        remote: Arc<dyn RemoteStore>,
        feed: Arc<dyn ChangeFeed>,
    ) -> Self {
        let mut outbound = OutboundSyncEngine::new(store.clone(), remote, &config.sync);
        if !config.sync.parents.is_empty() {
            let resolver = StaticParentResolver::new(config.sync.parents.clone());
            outbound = outbound.with_resolver(Arc::new(resolver));
        }
        let outbound = Arc::new(outbound);
        let inbound = Arc::new(InboundSyncListener::new(store.clone(), feed));

        let (shutdown, shutdown_rx) = watch::channel(false);
        let tasks = vec![
            outbound.clone().spawn(shutdown_rx.clone()),
            inbound.clone().spawn(shutdown_rx),
        ];

        info!("Runtime started");
        Self {
            store,
            outbound,
            inbound,
            shutdown,
            tasks,
        }
    }

    pub fn store(&self) -> &Arc<LedgerStore> {
        &self.store
    }

    pub fn outbound(&self) -> &Arc<OutboundSyncEngine> {
        &self.outbound
    }

    pub fn inbound(&self) -> &Arc<InboundSyncListener> {
        &self.inbound
    }

    pub fn balances(&self) -> BalanceProjector {
        BalanceProjector::new(self.store.clone())
    }

    /// Stop both sync loops, wait for them, then close the store.
    pub async fn shutdown(self) {
        info!("Shutting down runtime");
        let _ = self.shutdown.send(true);

        for task in self.tasks {
            if let Err(e) = task.await {
                error!(error = %e, "Sync task ended abnormally");
            }
        }

        self.store.close().await;
        info!("Runtime stopped");
    }
}
