//! `reqwest`-backed implementation of the sibling gateway.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::json;
use tracing::debug;

use crate::error::{ClientError, ClientResult};
use crate::gateway::{
    EncodeRequest, JobStatus, PublishRequest, SiblingGateway, TransferStatus, VpnStatus,
};

/// Default per-request timeout applied when none is configured.
pub const DEFAULT_HTTP_TIMEOUT: Duration = Duration::from_secs(30);

/// Base URLs for the sibling services.
///
/// The media processor and publishing backend are optional; the pipeline
/// auto-skips their stages when unconfigured.
#[derive(Debug, Clone)]
pub struct SiblingEndpoints {
    /// VPN manager base URL.
    pub vpn_url: String,
    /// Torrent manager base URL.
    pub torrent_url: String,
    /// Metadata enrichment base URL.
    pub metadata_url: String,
    /// Subtitle manager base URL.
    pub subtitle_url: String,
    /// Media processor base URL, when deployed.
    pub media_url: Option<String>,
    /// Publishing backend base URL, when deployed.
    pub publish_url: Option<String>,
}

/// HTTP gateway to the sibling services.
#[derive(Clone)]
pub struct HttpSiblings {
    client: Client,
    endpoints: SiblingEndpoints,
}

#[derive(Debug, serde::Deserialize)]
struct SubmitTorrentResponse {
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    download_id: Option<String>,
}

#[derive(Debug, serde::Deserialize)]
struct SubmitJobResponse {
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    job_id: Option<String>,
}

impl HttpSiblings {
    /// Build a gateway with the given endpoints and per-request timeout.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying HTTP client cannot be constructed.
    pub fn new(endpoints: SiblingEndpoints, timeout: Duration) -> reqwest::Result<Self> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self { client, endpoints })
    }

    fn url(base: &str, path: &str) -> String {
        format!("{}{path}", base.trim_end_matches('/'))
    }

    fn media_base(&self, operation: &'static str) -> ClientResult<&str> {
        self.endpoints
            .media_url
            .as_deref()
            .ok_or(ClientError::Malformed {
                service: "media",
                operation,
                detail: "media processor URL not configured".to_string(),
            })
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        service: &'static str,
        operation: &'static str,
        url: String,
    ) -> ClientResult<T> {
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|source| ClientError::Unreachable {
                service,
                operation,
                source: Box::new(source),
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(ClientError::HttpStatus {
                service,
                operation,
                status: status.as_u16(),
            });
        }

        response
            .json::<T>()
            .await
            .map_err(|err| ClientError::Malformed {
                service,
                operation,
                detail: err.to_string(),
            })
    }

    async fn post_json<B: Serialize + Sync, T: DeserializeOwned>(
        &self,
        service: &'static str,
        operation: &'static str,
        url: String,
        body: &B,
    ) -> ClientResult<T> {
        let response = self
            .client
            .post(&url)
            .json(body)
            .send()
            .await
            .map_err(|source| ClientError::Unreachable {
                service,
                operation,
                source: Box::new(source),
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(ClientError::HttpStatus {
                service,
                operation,
                status: status.as_u16(),
            });
        }

        response
            .json::<T>()
            .await
            .map_err(|err| ClientError::Malformed {
                service,
                operation,
                detail: err.to_string(),
            })
    }

    async fn post_unit<B: Serialize + Sync>(
        &self,
        service: &'static str,
        operation: &'static str,
        url: String,
        body: &B,
    ) -> ClientResult<()> {
        let response = self
            .client
            .post(&url)
            .json(body)
            .send()
            .await
            .map_err(|source| ClientError::Unreachable {
                service,
                operation,
                source: Box::new(source),
            })?;

        let status = response.status();
        if status.is_success() {
            Ok(())
        } else {
            Err(ClientError::HttpStatus {
                service,
                operation,
                status: status.as_u16(),
            })
        }
    }
}

#[async_trait]
impl SiblingGateway for HttpSiblings {
    async fn vpn_status(&self) -> ClientResult<VpnStatus> {
        let url = Self::url(&self.endpoints.vpn_url, "/api/status");
        self.get_json("vpn", "status", url).await
    }

    async fn submit_torrent(&self, source_url: &str) -> ClientResult<String> {
        let url = Self::url(&self.endpoints.torrent_url, "/api/downloads");
        let response: SubmitTorrentResponse = self
            .post_json("torrent", "submit", url, &json!({ "url": source_url }))
            .await?;

        response
            .id
            .or(response.download_id)
            .ok_or_else(|| ClientError::Malformed {
                service: "torrent",
                operation: "submit",
                detail: "response carried neither 'id' nor 'download_id'".to_string(),
            })
    }

    async fn torrent_status(&self, download_id: &str) -> ClientResult<TransferStatus> {
        let url = Self::url(
            &self.endpoints.torrent_url,
            &format!("/api/downloads/{download_id}"),
        );
        self.get_json("torrent", "status", url).await
    }

    async fn enrich_metadata(&self, title: &str, content_type: &str) -> ClientResult<()> {
        let url = Self::url(&self.endpoints.metadata_url, "/api/enrich");
        debug!(title, content_type, "requesting metadata enrichment");
        self.post_unit(
            "metadata",
            "enrich",
            url,
            &json!({ "title": title, "type": content_type }),
        )
        .await
    }

    async fn search_subtitles(&self, title: &str) -> ClientResult<()> {
        let url = Self::url(&self.endpoints.subtitle_url, "/api/search");
        self.post_unit("subtitles", "search", url, &json!({ "title": title }))
            .await
    }

    async fn submit_encode_job(&self, request: &EncodeRequest) -> ClientResult<String> {
        let base = self.media_base("submit_job")?;
        let url = Self::url(base, "/v1/jobs");
        let response: SubmitJobResponse =
            self.post_json("media", "submit_job", url, request).await?;

        response
            .id
            .or(response.job_id)
            .ok_or_else(|| ClientError::Malformed {
                service: "media",
                operation: "submit_job",
                detail: "response carried neither 'id' nor 'job_id'".to_string(),
            })
    }

    async fn encode_job_status(&self, job_id: &str) -> ClientResult<JobStatus> {
        let base = self.media_base("job_status")?;
        let url = Self::url(base, &format!("/v1/jobs/{job_id}"));
        self.get_json("media", "job_status", url).await
    }

    async fn publish(&self, request: &PublishRequest) -> ClientResult<()> {
        let base = self
            .endpoints
            .publish_url
            .as_deref()
            .ok_or(ClientError::Malformed {
                service: "publish",
                operation: "publish",
                detail: "publishing backend URL not configured".to_string(),
            })?;
        let url = Self::url(base, "/api/library/publish");
        self.post_unit("publish", "publish", url, request).await
    }
}
