//! HTTP client for the Skyreel command API.

use anyhow::{Context, Result};
use reqwest::{Client, Response};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

/// Envelope returned by every command API route.
#[derive(Debug, Deserialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub data: Option<T>,
    pub error: Option<String>,
    #[serde(default)]
    pub error_code: Option<String>,
}

pub struct ApiClient {
    client: Client,
    base_url: String,
}

impl ApiClient {
    pub fn new(base_url: &str) -> Result<Self> {
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(30))
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// GET a route and unwrap the response envelope.
    pub async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        let url = format!("{}{}", self.base_url, path);
        let resp = self
            .client
            .get(&url)
            .send()
            .await
            .with_context(|| format!("GET {} failed", url))?;
        unwrap_envelope(&url, resp).await
    }

    /// POST a JSON body and unwrap the response envelope.
    pub async fn post<B: Serialize, T: DeserializeOwned>(&self, path: &str, body: &B) -> Result<T> {
        let url = format!("{}{}", self.base_url, path);
        let resp = self
            .client
            .post(&url)
            .json(body)
            .send()
            .await
            .with_context(|| format!("POST {} failed", url))?;
        unwrap_envelope(&url, resp).await
    }

    /// GET a route that is not wrapped in an envelope (`/health`).
    pub async fn get_raw<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        let url = format!("{}{}", self.base_url, path);
        let resp = self
            .client
            .get(&url)
            .send()
            .await
            .with_context(|| format!("GET {} failed", url))?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            anyhow::bail!("API error ({}): {}", status, body);
        }

        resp.json()
            .await
            .with_context(|| format!("Failed to parse response from {}", url))
    }
}

async fn unwrap_envelope<T: DeserializeOwned>(url: &str, resp: Response) -> Result<T> {
    let status = resp.status();
    let body = resp
        .text()
        .await
        .with_context(|| format!("Failed to read response from {}", url))?;

    // Error responses share the envelope's success/error fields.
    let envelope: ApiResponse<T> = match serde_json::from_str(&body) {
        Ok(envelope) => envelope,
        Err(_) if !status.is_success() => anyhow::bail!("API error ({}): {}", status, body),
        Err(e) => return Err(e).with_context(|| format!("Failed to parse response from {}", url)),
    };

    if envelope.success {
        return envelope
            .data
            .ok_or_else(|| anyhow::anyhow!("API returned success but no data"));
    }

    let message = envelope.error.unwrap_or_else(|| "Unknown error".into());
    match envelope.error_code {
        Some(code) => anyhow::bail!("API error ({}, {}): {}", status, code, message),
        None => anyhow::bail!("API error ({}): {}", status, message),
    }
}
