use std::sync::Arc;

use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

use crate::api::{run_control_server, ControlState};
use crate::config::DaemonConfig;
use crate::error::{Result, SnowflakeError};
use crate::plugins::{register_plugins, ServiceJob};
use crate::scheduler::{JobRegistry, Scheduler};

/// The whole daemon: one registry shared by the scheduler and the control
/// channel.
pub struct Daemon {
    pub config: DaemonConfig,
    registry: Arc<JobRegistry>,
}

impl Daemon {
    pub fn new(config: DaemonConfig) -> Self {
        let registry = Arc::new(JobRegistry::with_process_settings(
            config.stop,
            config.output_limit_bytes,
        ));
        Self { config, registry }
    }

    pub fn registry(&self) -> Arc<JobRegistry> {
        self.registry.clone()
    }

    /// Run until `shutdown` is cancelled.
    ///
    /// 1. Binds the control channel (failure here is fatal)
    /// 2. Registers the configured custom jobs
    /// 3. Spawns the scheduler loop
    /// 4. Serves control requests until shutdown
    /// 5. Waits up to `shutdown_grace_ms` for the scheduler to stop its jobs
    ///
    /// # Errors
    ///
    /// Returns an error if the listen address is invalid, cannot be bound, or
    /// the control server fails.
    pub async fn run(self, shutdown: CancellationToken) -> Result<()> {
        let addr = self.config.listen_addr()?;
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|source| SnowflakeError::Bind { addr, source })?;

        register_plugins(&self.registry, ServiceJob::from_configs(&self.config.services)).await;

        let scheduler = Scheduler::new(self.registry.clone(), self.config.tick_interval());
        let scheduler_shutdown = shutdown.clone();
        let scheduler_handle = tokio::spawn(async move {
            scheduler.run(scheduler_shutdown).await;
        });

        let state = ControlState {
            registry: self.registry.clone(),
        };
        let served = run_control_server(listener, state, shutdown.clone()).await;

        // The control server may also end on its own error
        shutdown.cancel();

        match tokio::time::timeout(self.config.shutdown_grace(), scheduler_handle).await {
            Ok(Ok(())) => tracing::info!("Daemon stopped"),
            Ok(Err(e)) => tracing::error!(error = %e, "Scheduler task failed"),
            Err(_) => tracing::warn!(
                grace_ms = self.config.shutdown_grace_ms,
                "Scheduler did not stop in time"
            ),
        }

        served
    }
}
