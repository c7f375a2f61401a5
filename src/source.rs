//! Data source adapter for raw contract values
//!
//! [`DataSource`] is the seam between the caching tiers and whatever serves
//! on-chain state. [`HttpSource`] talks to the intermediate JSON API.

use crate::config::SourceConfig;
use crate::core::{PreviewError, PreviewResult};
use crate::logger::{self, LogTag};
use crate::vesting::{GlobalState, ProjectConfig, UserClaim};
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::de::DeserializeOwned;
use std::time::Duration;

#[async_trait]
pub trait DataSource: Send + Sync {
    fn name(&self) -> &str;

    async fn fetch_project_config(&self, project_id: &str) -> PreviewResult<ProjectConfig>;

    async fn fetch_global_state(&self, project_id: &str) -> PreviewResult<GlobalState>;

    async fn fetch_user_claim(&self, project_id: &str, wallet: &str) -> PreviewResult<UserClaim>;
}

pub struct HttpSource {
    client: Client,
    base_url: String,
}

impl HttpSource {
    pub fn new(config: &SourceConfig) -> PreviewResult<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| PreviewError::Config(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    async fn get_json<T: DeserializeOwned>(&self, path: &str, what: &str) -> PreviewResult<T> {
        let url = format!("{}{}", self.base_url, path);
        logger::debug(LogTag::Source, &format!("GET {}", url));

        let response = self
            .client
            .get(&url)
            .header("Accept", "application/json")
            .send()
            .await?;

        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return Err(PreviewError::NotFound(what.to_string()));
        }
        if !status.is_success() {
            logger::warning(
                LogTag::Source,
                &format!("Source returned {} for {}", status, url),
            );
            return Err(PreviewError::source_unavailable(
                "http",
                format!("API returned status: {}", status),
            ));
        }

        Ok(response.json::<T>().await?)
    }
}

#[async_trait]
impl DataSource for HttpSource {
    fn name(&self) -> &str {
        "http"
    }

    async fn fetch_project_config(&self, project_id: &str) -> PreviewResult<ProjectConfig> {
        self.get_json(
            &format!("/projects/{}/config", project_id),
            &format!("project {}", project_id),
        )
        .await
    }

    async fn fetch_global_state(&self, project_id: &str) -> PreviewResult<GlobalState> {
        self.get_json(
            &format!("/projects/{}/global", project_id),
            &format!("global state for project {}", project_id),
        )
        .await
    }

    async fn fetch_user_claim(&self, project_id: &str, wallet: &str) -> PreviewResult<UserClaim> {
        self.get_json(
            &format!("/projects/{}/users/{}", project_id, wallet),
            &format!("claim for wallet {} in project {}", wallet, project_id),
        )
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_base_url_is_normalized() {
        let config = SourceConfig {
            base_url: "http://localhost:8080/api/".to_string(),
            ..Default::default()
        };
        let source = HttpSource::new(&config).unwrap();
        assert_eq!(source.base_url(), "http://localhost:8080/api");
        assert_eq!(source.name(), "http");
    }

    #[tokio::test]
    async fn test_unreachable_source_is_a_source_failure() {
        let config = SourceConfig {
            base_url: "http://127.0.0.1:9".to_string(),
            timeout_secs: 2,
        };
        let source = HttpSource::new(&config).unwrap();
        let err = source.fetch_global_state("alpha").await.unwrap_err();
        assert!(err.is_source_failure(), "unexpected error: {:?}", err);
        assert!(err.is_recoverable());
    }
}
