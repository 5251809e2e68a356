use std::time::{Duration, Instant};

use reqwest::Url;
use reqwest::header::CONTENT_TYPE;

use dragnet_core::wire::{JobConfigData, JobData};

#[derive(Debug, thiserror::Error)]
pub(crate) enum BackendError {
    #[error("http {status}: {body}")]
    Http { status: u16, body: String },
    #[error(transparent)]
    Transport(#[from] reqwest::Error),
    #[error("invalid request url: {0}")]
    InvalidUrl(String),
}

/// Coordinator protocol client owned by one worker.
///
/// Consecutive requests are spaced at least `delay` apart (the deficit is
/// slept away), so a worker in a tight failure loop cannot hammer the
/// server. The pacing state is worker-local by construction.
pub(crate) struct ApiClient {
    http: reqwest::Client,
    base: Url,
    api_key: String,
    delay: Duration,
    last_request_at: Option<Instant>,
}

impl ApiClient {
    pub(crate) fn new(
        base: Url,
        api_key: String,
        delay: Duration,
        timeout: Duration,
    ) -> Result<Self, BackendError> {
        let http = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            http,
            base,
            api_key,
            delay,
            last_request_at: None,
        })
    }

    async fn pace(&mut self) {
        if let Some(last) = self.last_request_at {
            let elapsed = last.elapsed();
            if elapsed < self.delay {
                tokio::time::sleep(self.delay - elapsed).await;
            }
        }
        self.last_request_at = Some(Instant::now());
    }

    fn endpoint(&self, path: &str) -> Result<Url, BackendError> {
        self.base
            .join(path)
            .map_err(|err| BackendError::InvalidUrl(err.to_string()))
    }

    fn request(&self, method: reqwest::Method, url: Url) -> reqwest::RequestBuilder {
        self.http
            .request(method, url)
            .bearer_auth(&self.api_key)
            .header(CONTENT_TYPE, "application/json")
    }

    async fn send(
        &mut self,
        request: reqwest::RequestBuilder,
    ) -> Result<reqwest::Response, BackendError> {
        self.pace().await;
        let res = request.send().await?;
        let status = res.status();
        if !status.is_success() {
            let body = res.text().await.unwrap_or_default();
            return Err(BackendError::Http {
                status: status.as_u16(),
                body,
            });
        }
        Ok(res)
    }

    pub(crate) async fn job_configuration(&mut self) -> Result<JobConfigData, BackendError> {
        let url = self.endpoint("configuration/job")?;
        let res = self.send(self.request(reqwest::Method::GET, url)).await?;
        Ok(res.json().await?)
    }

    pub(crate) async fn fetch_job(&mut self, batch_size: u64) -> Result<JobData, BackendError> {
        let mut url = self.endpoint("job")?;
        url.query_pairs_mut()
            .append_pair("batchSize", &batch_size.to_string());
        let res = self.send(self.request(reqwest::Method::GET, url)).await?;
        Ok(res.json().await?)
    }

    pub(crate) async fn update_job(&mut self, job: &JobData) -> Result<(), BackendError> {
        let url = self.endpoint(&format!("job/{}", job.id))?;
        self.send(self.request(reqwest::Method::PUT, url).json(job))
            .await?;
        Ok(())
    }

    pub(crate) async fn finish_job(&mut self, job: &JobData) -> Result<(), BackendError> {
        let url = self.endpoint(&format!("job/{}", job.id))?;
        self.send(self.request(reqwest::Method::POST, url).json(job))
            .await?;
        Ok(())
    }

    pub(crate) async fn post_results(
        &mut self,
        results: &[serde_json::Value],
    ) -> Result<(), BackendError> {
        let url = self.endpoint("results")?;
        self.send(self.request(reqwest::Method::POST, url).json(results))
            .await?;
        Ok(())
    }
}
