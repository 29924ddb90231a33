use std::process::{Output, Stdio};

use async_trait::async_trait;
use tokio::process::Command;

use crate::config::ServiceJobConfig;
use crate::error::{Result, SnowflakeError};
use crate::plugins::CustomJob;

/// A system service switched on and off through shell commands,
/// e.g. `pihole enable` / `pihole disable`.
#[derive(Debug, Clone)]
pub struct ServiceJob {
    config: ServiceJobConfig,
}

impl ServiceJob {
    pub fn new(config: ServiceJobConfig) -> Self {
        Self { config }
    }

    pub fn from_configs(configs: &[ServiceJobConfig]) -> Vec<Box<dyn CustomJob>> {
        configs
            .iter()
            .cloned()
            .map(|config| Box::new(ServiceJob::new(config)) as Box<dyn CustomJob>)
            .collect()
    }

    async fn run(&self, command: &str) -> Result<Output> {
        Command::new("sh")
            .arg("-c")
            .arg(command)
            .stdin(Stdio::null())
            .output()
            .await
            .map_err(|source| SnowflakeError::Spawn {
                command: command.to_string(),
                source,
            })
    }

    async fn run_checked(&self, command: &str) -> Result<()> {
        let output = self.run(command).await?;
        if output.status.success() {
            Ok(())
        } else {
            Err(SnowflakeError::Plugin {
                name: self.config.name.clone(),
                reason: format!(
                    "'{}' exited with {}: {}",
                    command,
                    output.status,
                    String::from_utf8_lossy(&output.stderr).trim()
                ),
            })
        }
    }
}

#[async_trait]
impl CustomJob for ServiceJob {
    fn name(&self) -> &str {
        &self.config.name
    }

    fn active(&self) -> bool {
        self.config.active
    }

    fn source(&self) -> String {
        format!("config:services/{}", self.config.name)
    }

    async fn dependency_check(&mut self) -> bool {
        match self.run(&self.config.check).await {
            Ok(output) => output.status.success(),
            Err(e) => {
                tracing::debug!(job = %self.config.name, error = %e, "Dependency check could not run");
                false
            }
        }
    }

    async fn start(&mut self) -> Result<()> {
        self.run_checked(&self.config.start).await
    }

    async fn stop(&mut self) -> Result<()> {
        self.run_checked(&self.config.stop).await
    }

    async fn is_alive(&mut self) -> bool {
        match self.run(&self.config.status).await {
            Ok(output) => {
                let stdout = String::from_utf8_lossy(&output.stdout);
                let stderr = String::from_utf8_lossy(&output.stderr);
                stdout.contains(&self.config.running_marker)
                    || stderr.contains(&self.config.running_marker)
            }
            Err(e) => {
                tracing::debug!(job = %self.config.name, error = %e, "Status command could not run");
                false
            }
        }
    }
}
