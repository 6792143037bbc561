//! Service control through `systemctl`.

use async_trait::async_trait;

use super::process::{self, stderr_tail};
use super::{ProcessControl, ServiceName};
use crate::config::ServicesConfig;
use crate::error::{Result, SkyreelError};

pub struct SystemctlControl {
    config: ServicesConfig,
}

impl SystemctlControl {
    pub fn new(config: ServicesConfig) -> Self {
        Self { config }
    }

    async fn unit_action(&self, action: &str, service: ServiceName) -> Result<()> {
        let unit = self.config.unit_name(service);
        let output = process::run(
            &self.config.systemctl_path,
            [action, unit],
            self.config.timeout(),
        )
        .await?;

        if output.status.success() {
            tracing::info!(service = %service, unit, action, "Service control succeeded");
            Ok(())
        } else {
            Err(SkyreelError::process(format!(
                "systemctl {} {} failed: {}",
                action,
                unit,
                stderr_tail(&output)
            )))
        }
    }
}

#[async_trait]
impl ProcessControl for SystemctlControl {
    async fn is_running(&self, service: ServiceName) -> bool {
        let unit = self.config.unit_name(service);
        match process::run(
            &self.config.systemctl_path,
            ["is-active", "--quiet", unit],
            self.config.timeout(),
        )
        .await
        {
            Ok(output) => output.status.success(),
            Err(e) => {
                tracing::warn!(service = %service, unit, error = %e, "Unable to query service state");
                false
            }
        }
    }

    async fn restart(&self, service: ServiceName) -> Result<()> {
        self.unit_action("restart", service).await
    }

    async fn start(&self, service: ServiceName) -> Result<()> {
        self.unit_action("start", service).await
    }
}
