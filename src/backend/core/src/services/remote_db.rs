//! Remote database proxy over HTTP.

use async_trait::async_trait;
use std::time::Duration;

use super::RemoteDatabase;
use crate::error::{ErrorCode, Result, SkyreelError};

pub struct HttpRemoteDatabase {
    client: reqwest::Client,
    base_url: String,
}

impl HttpRemoteDatabase {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    fn failed(detail: String) -> SkyreelError {
        SkyreelError::with_internal(
            ErrorCode::RemoteDatabaseError,
            "The system could not properly return a query",
            detail,
        )
    }
}

#[async_trait]
impl RemoteDatabase for HttpRemoteDatabase {
    async fn server_is_running(&self) -> Result<bool> {
        let response = self
            .client
            .get(format!("{}/health", self.base_url))
            .send()
            .await?;
        Ok(response.status().is_success())
    }

    async fn round_trip(&self) -> Result<()> {
        let url = format!("{}/resources", self.base_url);
        let response = self.client.get(&url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(Self::failed(format!("GET {} returned {}", url, status)));
        }

        let body: serde_json::Value = response.json().await?;
        match &body {
            serde_json::Value::Null => Err(Self::failed(format!("GET {} returned null", url))),
            serde_json::Value::Object(map) if map.get("error").map_or(false, |e| !e.is_null()) => {
                Err(Self::failed(format!("GET {} returned error: {}", url, map["error"])))
            }
            _ => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    async fn remote(body: serde_json::Value) -> (MockServer, HttpRemoteDatabase) {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/resources"))
            .respond_with(ResponseTemplate::new(200).set_body_json(body))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/health"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&server)
            .await;
        let db = HttpRemoteDatabase::new(server.uri(), Duration::from_secs(5)).unwrap();
        (server, db)
    }

    #[tokio::test]
    async fn test_round_trip_accepts_resource_list() {
        let (_server, db) = remote(serde_json::json!([{"resource_number": 1}])).await;
        assert!(db.server_is_running().await.unwrap());
        assert!(db.round_trip().await.is_ok());
    }

    #[tokio::test]
    async fn test_round_trip_rejects_null_and_error() {
        let (_server, db) = remote(serde_json::Value::Null).await;
        assert_eq!(
            db.round_trip().await.unwrap_err().code(),
            ErrorCode::RemoteDatabaseError
        );

        let (_server, db) = remote(serde_json::json!({"error": "query failed"})).await;
        assert!(db.round_trip().await.is_err());
    }
}
