use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::api::{self, AppState};
use crate::clock::SystemClock;
use crate::config::{DatabaseConfig, ServerConfig};
use crate::error::{OrchestratorError, Result};
use crate::mirror::loader::DirConfigSource;
use crate::scheduler::JobQueue;
use crate::state::StateStore;
use crate::store::{MemoryStatusStore, SqliteStatusStore, StatusStore};

/// Wires the configuration source, status store, state store, job queue and
/// HTTP API together.
pub struct Orchestrator {
    pub config: ServerConfig,
    pub queue: Arc<JobQueue>,
}

impl Orchestrator {
    /// Open storage and build every component. Mirror state stays empty
    /// until [`Orchestrator::run`] performs the first reload.
    pub fn new(config: ServerConfig) -> Result<Self> {
        let state = Arc::new(open_state(&config)?);
        let queue = Arc::new(JobQueue::new(
            state,
            Arc::new(SystemClock),
            config.cool_down,
        ));
        Ok(Self { config, queue })
    }

    /// Load mirrors, then serve the API until `shutdown` fires.
    ///
    /// # Errors
    ///
    /// Fails if the initial reload fails or the listener cannot be bound.
    pub async fn run(
        self,
        shutdown: CancellationToken,
    ) -> std::result::Result<(), Box<dyn std::error::Error>> {
        let queue = self.queue.clone();
        tokio::task::spawn_blocking(move || queue.reload())
            .await
            .map_err(|e| OrchestratorError::Internal(format!("initial reload task failed: {e}")))??;

        let status = self.queue.get_queue_status();
        tracing::info!(
            mirrors = self.queue.state().len(),
            pending = status.pending,
            "Mirrors loaded"
        );

        let state = AppState {
            queue: self.queue.clone(),
        };
        api::serve(self.config.listen_addr, state, shutdown).await?;
        tracing::info!("API server stopped");
        Ok(())
    }
}

/// State store over the configured mirror directory and database.
pub fn open_state(config: &ServerConfig) -> Result<StateStore> {
    let source = Arc::new(DirConfigSource::new(config.conf_dir.clone()));
    Ok(StateStore::new(source, open_store(&config.database)?))
}

pub fn open_store(database: &DatabaseConfig) -> Result<Arc<dyn StatusStore>> {
    Ok(match database {
        DatabaseConfig::Sqlite(path) => Arc::new(SqliteStatusStore::open(path)?),
        DatabaseConfig::Memory => {
            tracing::warn!("Using in-memory status store, sync history is lost on exit");
            Arc::new(MemoryStatusStore::new())
        }
    })
}
