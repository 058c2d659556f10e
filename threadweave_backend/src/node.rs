use crate::api;
use crate::bootstrap::{self, BootstrapResources};
use crate::config::ThreadweaveConfig;
use crate::database::Database;
use crate::invalidation::BroadcastSignal;
use anyhow::Result;

/// Bootstraps the backend once and hands out cloned handles for whichever
/// entrypoint (CLI, REST server, tests) needs them.
pub struct ThreadweaveNode {
    config: ThreadweaveConfig,
    bootstrap: BootstrapResources,
    signal: BroadcastSignal,
}

impl ThreadweaveNode {
    pub async fn start(config: ThreadweaveConfig) -> Result<Self> {
        let bootstrap = bootstrap::initialize(&config).await?;

        tracing::info!(
            directories_created = ?bootstrap.directories_created,
            database_initialized = bootstrap.database_initialized,
            db_path = %config.paths.db_path.display(),
            "threadweave node initialized"
        );

        Ok(Self {
            config,
            bootstrap,
            signal: BroadcastSignal::default(),
        })
    }

    /// Returns a snapshot of the node's reusable handles.
    pub fn snapshot(&self) -> NodeSnapshot {
        NodeSnapshot {
            config: self.config.clone(),
            database: self.bootstrap.database.clone(),
            signal: self.signal.clone(),
        }
    }

    /// Runs the REST API server until it stops.
    pub async fn run_http_server(&self) -> Result<()> {
        let snapshot = self.snapshot();
        api::serve_http(snapshot.config, snapshot.database, snapshot.signal).await
    }

    pub fn database(&self) -> Database {
        self.bootstrap.database.clone()
    }

    /// Invalidation fan-out shared by every writer started from this node.
    pub fn signal(&self) -> BroadcastSignal {
        self.signal.clone()
    }

    /// Closes the Store. Handles cloned earlier fail from here on.
    pub fn shutdown(self) -> Result<()> {
        self.bootstrap.database.close()?;
        tracing::info!("threadweave node stopped");
        Ok(())
    }
}

#[derive(Clone)]
pub struct NodeSnapshot {
    pub config: ThreadweaveConfig,
    pub database: Database,
    pub signal: BroadcastSignal,
}
