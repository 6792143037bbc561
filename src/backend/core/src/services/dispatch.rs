//! Outbound command routing.

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;

use super::{CommandSink, ServiceName};
use crate::command::{Command, CommandHandler};
use crate::error::{ErrorCode, Result, SkyreelError};

/// Routes watchdog commands to the service that owns the resource's work.
///
/// MOVIE commands go straight to this process's handler. RETRIEVAL commands
/// are posted to the retrieval service's command API.
pub struct CommandRouter {
    local: Arc<CommandHandler>,
    client: reqwest::Client,
    retrieval_url: String,
}

impl CommandRouter {
    pub fn new(local: Arc<CommandHandler>, retrieval_url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            local,
            client,
            retrieval_url: retrieval_url.into().trim_end_matches('/').to_string(),
        })
    }

    async fn post(&self, base: &str, command: &Command) -> Result<()> {
        let url = format!("{}/api/v1/commands", base);
        let response = self.client.post(&url).json(command).send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(SkyreelError::with_internal(
                ErrorCode::NetworkError,
                "Command was rejected",
                format!("POST {} returned {}: {}", url, status, body),
            ));
        }
        Ok(())
    }
}

#[async_trait]
impl CommandSink for CommandRouter {
    async fn dispatch(&self, service: ServiceName, command: Command) -> Result<()> {
        tracing::debug!(service = %service, command = command.name(), resource = %command.resource(), "Dispatching command");
        match service {
            ServiceName::Movie => self.local.handle(command).await.map(|_| ()),
            ServiceName::Retrieval => self.post(&self.retrieval_url, &command).await,
            other => Err(SkyreelError::invalid_command(format!(
                "{} does not accept resource commands",
                other
            ))),
        }
    }
}
