//! silo-ledger-sync: ledger sync daemon
//!
//! Opens the local ledger, seeds silos on first start, and keeps it in sync
//! with the remote store until Ctrl+C.
//!
//! ## Architecture
//! ```text
//! local ledger (SQLite) --(outbound push, every push_interval)--> remote REST
//!        ^                                                           |
//!        +---------------(inbound change feed + resync)--------------+
//! ```
//!
//! ## Configuration
//! ```yaml
//! storage:
//!   type: sqlite
//!   path: data/silo-ledger.db
//!
//! sync:
//!   remote_url: https://example.supabase.co/rest/v1
//!   api_key: ...
//!   push_interval_secs: 120
//!   parents:
//!     silo-001: farm-1
//!
//! seed:
//!   silos:
//!     - id: silo-001
//!       name: Trincheira Principal
//!       capacity: 500000
//! ```
//!
//! The first argument overrides the configuration file path.

use std::sync::Arc;

use tracing::{info, warn};

use silo_ledger::config::Config;
use silo_ledger::runtime::Runtime;
use silo_ledger::seed::seed_silos;
use silo_ledger::store::LedgerStore;
use silo_ledger::sync::remote::HttpRemote;
use silo_ledger::utils::bootstrap::init_tracing;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_tracing();

    let path = std::env::args().nth(1);
    let config = Config::load(path.as_deref())?;

    let store = LedgerStore::open(&config.storage).await?;
    seed_silos(&store, config.seed_silos()).await?;

    if !config.sync.is_enabled() {
        warn!("No remote_url configured, running local-only");
        tokio::signal::ctrl_c().await?;
        store.close().await;
        return Ok(());
    }

    let remote = Arc::new(HttpRemote::from_config(&config.sync)?);
    let runtime = Runtime::start(&config, store, remote.clone(), remote);

    info!("silo-ledger-sync running, press Ctrl+C to exit");
    tokio::signal::ctrl_c().await?;

    runtime.shutdown().await;
    Ok(())
}
