//! Live image probes.

use async_trait::async_trait;
use std::time::Duration;

use super::ImageProbe;
use crate::error::{ErrorCode, Result, SkyreelError};

/// Fetches a live image over HTTP and decodes it to read its size.
#[derive(Clone)]
pub struct HttpImageProbe {
    client: reqwest::Client,
}

impl HttpImageProbe {
    pub fn new(timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("skyreel/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self { client })
    }
}

#[async_trait]
impl ImageProbe for HttpImageProbe {
    async fn dimensions(&self, url: &str) -> Result<(u32, u32)> {
        let response = self.client.get(url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(SkyreelError::with_internal(
                ErrorCode::NetworkError,
                "The resource URL is not producing images",
                format!("GET {} returned {}", url, status),
            ));
        }

        let bytes = response.bytes().await?;
        if bytes.is_empty() {
            return Err(SkyreelError::with_internal(
                ErrorCode::ImageDecodeError,
                "The resource URL is not producing images",
                format!("GET {} returned an empty body", url),
            ));
        }

        let image = image::load_from_memory(&bytes)?;
        Ok((image.width(), image.height()))
    }
}
