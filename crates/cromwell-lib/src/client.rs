//! REST client for a running Cromwell server

use crate::cost::PriceList;
use crate::error::{CromwellError, Result};
use crate::metadata::WorkflowMetadata;
use crate::models::{
    QueryResponse, Submission, SubmissionSource, WorkflowQuery, WorkflowState, WorkflowStatus,
};
use crate::observability::ToolMetrics;
use crate::storage::ObjectFetcher;
use reqwest::multipart::{Form, Part};
use reqwest::{Client, RequestBuilder};
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::time::{Duration, Instant};
use tracing::{debug, info};
use url::Url;

/// Connection settings for [`CromwellClient`]
#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub url: String,
    pub username: Option<String>,
    pub password: Option<String>,
    pub api_version: String,
    pub request_timeout: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            url: "http://localhost:8000".to_string(),
            username: None,
            password: None,
            api_version: "v1".to_string(),
            request_timeout: Duration::from_secs(30),
        }
    }
}

/// API client for the Cromwell workflow and engine endpoints
pub struct CromwellClient {
    client: Client,
    base_url: Url,
    api_version: String,
    auth: Option<(String, String)>,
    metrics: ToolMetrics,
}

impl CromwellClient {
    /// Create a client for `base_url` with default settings
    pub fn new(base_url: &str) -> Result<Self> {
        Self::with_config(&ClientConfig {
            url: base_url.to_string(),
            ..Default::default()
        })
    }

    pub fn with_config(config: &ClientConfig) -> Result<Self> {
        let client = Client::builder().timeout(config.request_timeout).build()?;

        let mut base_url = Url::parse(&config.url)?;
        // joins are relative to the last segment, keep the whole path
        if !base_url.path().ends_with('/') {
            let path = format!("{}/", base_url.path());
            base_url.set_path(&path);
        }

        let auth = match (&config.username, &config.password) {
            (Some(user), Some(pass)) => Some((user.clone(), pass.clone())),
            _ => None,
        };

        Ok(Self {
            client,
            base_url,
            api_version: config.api_version.clone(),
            auth,
            metrics: ToolMetrics::new(),
        })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    fn workflows_url(&self, path: &str) -> Result<Url> {
        let prefix = format!("api/workflows/{}/", self.api_version);
        Ok(self.base_url.join(&prefix)?.join(path)?)
    }

    fn engine_url(&self, path: &str) -> Result<Url> {
        let prefix = format!("engine/{}/", self.api_version);
        Ok(self.base_url.join(&prefix)?.join(path)?)
    }

    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.auth {
            Some((user, pass)) => request.basic_auth(user, Some(pass)),
            None => request,
        }
    }

    /// Send a request and decode a JSON body, failing on non-success status
    async fn send<T: DeserializeOwned>(&self, endpoint: &str, request: RequestBuilder) -> Result<T> {
        let started = Instant::now();
        let response = self.authorize(request).send().await?;
        self.metrics
            .observe_request_latency(endpoint, started.elapsed().as_secs_f64());

        let status = response.status();
        debug!(endpoint = %endpoint, status = %status, "Cromwell request completed");
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(CromwellError::Api {
                status: status.as_u16(),
                body,
            });
        }

        let bytes = response.bytes().await?;
        Ok(serde_json::from_slice(&bytes)?)
    }

    /// True if the server answers its root URL with 200
    pub async fn server_is_running(&self) -> bool {
        let request = self.authorize(self.client.get(self.base_url.clone()));
        match request.send().await {
            Ok(response) => response.status() == reqwest::StatusCode::OK,
            Err(e) => {
                debug!(error = %e, "Cromwell server unreachable");
                false
            }
        }
    }

    /// Submit a new workflow
    pub async fn submit(
        &self,
        submission: &Submission,
        fetcher: &dyn ObjectFetcher,
    ) -> Result<WorkflowStatus> {
        let mut form = Form::new()
            .part(
                "workflowSource",
                file_part(&submission.workflow_source, fetcher, "workflow.wdl").await?,
            )
            .part(
                "workflowInputs",
                file_part(&submission.inputs, fetcher, "inputs.json").await?,
            );

        if let Some(options) = &submission.options {
            form = form.part("workflowOptions", file_part(options, fetcher, "options.json").await?);
        }

        if !submission.labels.is_empty() {
            let labels = serde_json::to_vec(&submission.labels)?;
            form = form.part("labels", Part::bytes(labels).file_name("labels.json"));
        }

        if let Some(archive) = &submission.dependencies {
            if let SubmissionSource::Location(location) = archive {
                if !location.ends_with(".zip") {
                    return Err(CromwellError::InvalidSubmission(format!(
                        "dependencies must be a pre-zipped archive, got {}",
                        location
                    )));
                }
            }
            form = form.part(
                "workflowDependencies",
                file_part(archive, fetcher, "dependencies.zip").await?,
            );
        }

        let url = self.workflows_url("")?;
        let status: WorkflowStatus = self.send("submit", self.client.post(url).multipart(form)).await?;
        info!(workflow_id = %status.id, status = %status.status, "Workflow submitted");
        Ok(status)
    }

    pub async fn status(&self, id: &str) -> Result<WorkflowStatus> {
        let url = self.workflows_url(&format!("{}/status", id))?;
        self.send("status", self.client.get(url)).await
    }

    /// Typed metadata, optionally with subworkflow metadata embedded
    pub async fn metadata(&self, id: &str, expand_subworkflows: bool) -> Result<WorkflowMetadata> {
        let url = self.metadata_url(id, expand_subworkflows)?;
        self.send("metadata", self.client.get(url)).await
    }

    /// The metadata document exactly as Cromwell returns it
    pub async fn raw_metadata(&self, id: &str, expand_subworkflows: bool) -> Result<Value> {
        let url = self.metadata_url(id, expand_subworkflows)?;
        self.send("metadata", self.client.get(url)).await
    }

    fn metadata_url(&self, id: &str, expand_subworkflows: bool) -> Result<Url> {
        let mut url = self.workflows_url(&format!("{}/metadata", id))?;
        if expand_subworkflows {
            url.query_pairs_mut().append_pair("expandSubWorkflows", "true");
        }
        Ok(url)
    }

    pub async fn outputs(&self, id: &str) -> Result<Value> {
        let url = self.workflows_url(&format!("{}/outputs", id))?;
        self.send("outputs", self.client.get(url)).await
    }

    pub async fn logs(&self, id: &str) -> Result<Value> {
        let url = self.workflows_url(&format!("{}/logs", id))?;
        self.send("logs", self.client.get(url)).await
    }

    pub async fn abort(&self, id: &str) -> Result<WorkflowStatus> {
        let url = self.workflows_url(&format!("{}/abort", id))?;
        let status: WorkflowStatus = self.send("abort", self.client.post(url)).await?;
        info!(workflow_id = %status.id, status = %status.status, "Workflow abort requested");
        Ok(status)
    }

    pub async fn query(&self, query: &WorkflowQuery) -> Result<QueryResponse> {
        let url = self.workflows_url("query")?;
        self.send("query", self.client.get(url).query(&query.to_pairs()))
            .await
    }

    pub async fn backends(&self) -> Result<Value> {
        let url = self.workflows_url("backends")?;
        self.send("backends", self.client.get(url)).await
    }

    pub async fn version(&self) -> Result<Value> {
        let url = self.engine_url("version")?;
        self.send("version", self.client.get(url)).await
    }

    pub async fn stats(&self) -> Result<Value> {
        let url = self.engine_url("stats")?;
        self.send("stats", self.client.get(url)).await
    }

    /// Download and decode a Compute Engine price list, e.g. [`GCE_PRICE_LIST_URL`](crate::cost::GCE_PRICE_LIST_URL)
    pub async fn fetch_price_list(&self, url: &str) -> Result<PriceList> {
        let started = Instant::now();
        let response = self.client.get(url).send().await?.error_for_status()?;
        let bytes = response.bytes().await?;
        self.metrics
            .observe_request_latency("price_list", started.elapsed().as_secs_f64());
        PriceList::from_slice(&bytes)
    }

    /// Timing diagram page for a workflow
    pub fn timing_url(&self, id: &str) -> Result<Url> {
        self.workflows_url(&format!("{}/timing", id))
    }

    /// Poll until the workflow reaches one of `targets`.
    ///
    /// With `timeout` of `None` this polls forever.
    pub async fn wait_for_status(
        &self,
        id: &str,
        targets: &[WorkflowState],
        timeout: Option<Duration>,
        delay: Duration,
    ) -> Result<WorkflowStatus> {
        let started = Instant::now();
        debug!(workflow_id = %id, targets = ?targets, "Waiting for workflow status");

        loop {
            let status = self.status(id).await?;
            if targets.contains(&status.status) {
                return Ok(status);
            }

            if let Some(limit) = timeout {
                if started.elapsed() + delay > limit {
                    return Err(CromwellError::Timeout {
                        id: id.to_string(),
                        statuses: targets
                            .iter()
                            .map(WorkflowState::as_str)
                            .collect::<Vec<_>>()
                            .join(", "),
                        last: status.status.to_string(),
                        timeout_secs: limit.as_secs(),
                    });
                }
            }
            tokio::time::sleep(delay).await;
        }
    }
}

async fn file_part(
    source: &SubmissionSource,
    fetcher: &dyn ObjectFetcher,
    default_name: &str,
) -> Result<Part> {
    let (bytes, name) = match source {
        SubmissionSource::Inline(bytes) => (bytes.clone(), default_name.to_string()),
        SubmissionSource::Location(location) => {
            let name = location
                .rsplit('/')
                .next()
                .filter(|n| !n.is_empty())
                .unwrap_or(default_name)
                .to_string();
            (fetcher.fetch(location).await?, name)
        }
    };
    Ok(Part::bytes(bytes).file_name(name))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::DEFAULT_STORAGE_ENDPOINT;
    use crate::storage::StorageFetcher;
    use mockito::Matcher;

    const ID: &str = "884d3bb0-20b6-455e-8ecb-106e7d287e81";

    #[test]
    fn test_urls_keep_base_path() {
        let client = CromwellClient::new("http://cromwell.example.org/proxy").unwrap();
        assert_eq!(
            client.workflows_url("abc/status").unwrap().as_str(),
            "http://cromwell.example.org/proxy/api/workflows/v1/abc/status"
        );
        assert_eq!(
            client.engine_url("version").unwrap().as_str(),
            "http://cromwell.example.org/proxy/engine/v1/version"
        );
        assert_eq!(
            client.timing_url("abc").unwrap().as_str(),
            "http://cromwell.example.org/proxy/api/workflows/v1/abc/timing"
        );
    }

    #[test]
    fn test_invalid_url_rejected() {
        assert!(matches!(
            CromwellClient::new("not a url"),
            Err(CromwellError::InvalidUrl(_))
        ));
    }

    #[tokio::test]
    async fn test_status() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", format!("/api/workflows/v1/{}/status", ID).as_str())
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(format!(r#"{{"id": "{}", "status": "Running"}}"#, ID))
            .create_async()
            .await;

        let client = CromwellClient::new(&server.url()).unwrap();
        let status = client.status(ID).await.unwrap();

        assert_eq!(status.id, ID);
        assert_eq!(status.status, WorkflowState::Running);
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_basic_auth_sent() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", format!("/api/workflows/v1/{}/status", ID).as_str())
            .match_header("authorization", "Basic dXNlcjpwYXNz")
            .with_status(200)
            .with_body(format!(r#"{{"id": "{}", "status": "Succeeded"}}"#, ID))
            .create_async()
            .await;

        let client = CromwellClient::with_config(&ClientConfig {
            url: server.url(),
            username: Some("user".to_string()),
            password: Some("pass".to_string()),
            ..Default::default()
        })
        .unwrap();
        client.status(ID).await.unwrap();
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_api_error_carries_body() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("GET", "/api/workflows/v1/missing/status")
            .with_status(404)
            .with_body(r#"{"status": "fail", "message": "Unrecognized workflow ID"}"#)
            .create_async()
            .await;

        let client = CromwellClient::new(&server.url()).unwrap();
        let err = client.status("missing").await.unwrap_err();
        match err {
            CromwellError::Api { status, body } => {
                assert_eq!(status, 404);
                assert!(body.contains("Unrecognized workflow ID"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_metadata_expands_subworkflows() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", format!("/api/workflows/v1/{}/metadata", ID).as_str())
            .match_query(Matcher::UrlEncoded("expandSubWorkflows".into(), "true".into()))
            .with_status(200)
            .with_body(r#"{"id": "x", "calls": {"wf.align": [{"executionStatus": "Done"}]}}"#)
            .create_async()
            .await;

        let client = CromwellClient::new(&server.url()).unwrap();
        let metadata = client.metadata(ID, true).await.unwrap();
        assert_eq!(metadata.calls.len(), 1);
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_query_sends_repeated_filters() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/api/workflows/v1/query")
            .match_query(Matcher::AllOf(vec![
                Matcher::UrlEncoded("status".into(), "Failed".into()),
                Matcher::UrlEncoded("name".into(), "scaling".into()),
            ]))
            .with_status(200)
            .with_body(
                r#"{"results": [{"id": "a", "name": "scaling", "status": "Failed"}], "totalResultsCount": 1}"#,
            )
            .create_async()
            .await;

        let client = CromwellClient::new(&server.url()).unwrap();
        let response = client
            .query(&WorkflowQuery {
                names: vec!["scaling".to_string()],
                statuses: vec![WorkflowState::Failed],
                ..Default::default()
            })
            .await
            .unwrap();

        assert_eq!(response.total_results_count, Some(1));
        assert_eq!(response.results[0].status, Some(WorkflowState::Failed));
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_submit_multipart() {
        let dir = tempfile::tempdir().unwrap();
        let wdl = dir.path().join("scaling.wdl");
        std::fs::write(&wdl, "workflow scaling {}").unwrap();

        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/api/workflows/v1/")
            .match_body(Matcher::AllOf(vec![
                Matcher::Regex("name=\"workflowSource\"".into()),
                Matcher::Regex("workflow scaling".into()),
                Matcher::Regex("name=\"workflowInputs\"".into()),
                Matcher::Regex("name=\"labels\"".into()),
            ]))
            .with_status(201)
            .with_body(format!(r#"{{"id": "{}", "status": "Submitted"}}"#, ID))
            .create_async()
            .await;

        let client = CromwellClient::new(&server.url()).unwrap();
        let fetcher = StorageFetcher::new(DEFAULT_STORAGE_ENDPOINT).unwrap();
        let submission = Submission::new(
            SubmissionSource::Location(wdl.to_string_lossy().to_string()),
            SubmissionSource::Inline(br#"{"scaling.n": 10}"#.to_vec()),
        )
        .with_label("project", "scaling");

        let status = client.submit(&submission, &fetcher).await.unwrap();
        assert_eq!(status.status, WorkflowState::Submitted);
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_submit_rejects_unzipped_dependencies() {
        let client = CromwellClient::new("http://localhost:1").unwrap();
        let fetcher = StorageFetcher::new(DEFAULT_STORAGE_ENDPOINT).unwrap();
        let submission = Submission::new(
            SubmissionSource::Inline(b"workflow w {}".to_vec()),
            SubmissionSource::Inline(b"{}".to_vec()),
        )
        .with_dependencies("imports/tasks.wdl");

        let err = client.submit(&submission, &fetcher).await.unwrap_err();
        assert!(matches!(err, CromwellError::InvalidSubmission(_)));
    }

    #[tokio::test]
    async fn test_wait_for_status_returns_on_target() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("GET", format!("/api/workflows/v1/{}/status", ID).as_str())
            .with_status(200)
            .with_body(format!(r#"{{"id": "{}", "status": "Succeeded"}}"#, ID))
            .create_async()
            .await;

        let client = CromwellClient::new(&server.url()).unwrap();
        let status = client
            .wait_for_status(
                ID,
                &WorkflowState::TERMINAL,
                Some(Duration::from_secs(5)),
                Duration::from_millis(10),
            )
            .await
            .unwrap();
        assert_eq!(status.status, WorkflowState::Succeeded);
    }

    #[tokio::test]
    async fn test_wait_for_status_times_out() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("GET", format!("/api/workflows/v1/{}/status", ID).as_str())
            .with_status(200)
            .with_body(format!(r#"{{"id": "{}", "status": "Running"}}"#, ID))
            .expect_at_least(1)
            .create_async()
            .await;

        let client = CromwellClient::new(&server.url()).unwrap();
        let err = client
            .wait_for_status(
                ID,
                &WorkflowState::TERMINAL,
                Some(Duration::from_millis(50)),
                Duration::from_millis(20),
            )
            .await
            .unwrap_err();

        match err {
            CromwellError::Timeout { last, .. } => assert_eq!(last, "Running"),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_fetch_price_list() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("GET", "/pricelist.json")
            .with_status(200)
            .with_body(
                r#"{"gcp_price_list": {
                    "CP-COMPUTEENGINE-VMIMAGE-N1-STANDARD-2": {"us": 0.095},
                    "CP-COMPUTEENGINE-STORAGE-PD-SSD": {"us": 0.17},
                    "CP-COMPUTEENGINE-STORAGE-PD-CAPACITY": {"us": 0.04}
                }}"#,
            )
            .create_async()
            .await;

        let client = CromwellClient::new("http://localhost:8000").unwrap();
        let prices = client
            .fetch_price_list(&format!("{}/pricelist.json", server.url()))
            .await
            .unwrap();
        assert_eq!(prices.machine_per_hour("n1-standard-2"), Some(0.095));
    }

    #[tokio::test]
    async fn test_server_is_running() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server.mock("GET", "/").with_status(200).create_async().await;

        let client = CromwellClient::new(&server.url()).unwrap();
        assert!(client.server_is_running().await);

        let offline = CromwellClient::new("http://127.0.0.1:1").unwrap();
        assert!(!offline.server_is_running().await);
    }
}
