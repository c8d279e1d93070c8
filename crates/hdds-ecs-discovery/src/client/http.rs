// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! ECS JSON 1.1 API over HTTPS.
//!
//! Every call is a signed `POST /` with the operation named in the
//! `x-amz-target` header:
//!
//! ```text
//! POST / HTTP/1.1
//! host: ecs.us-east-1.amazonaws.com
//! content-type: application/x-amz-json-1.1
//! x-amz-target: AmazonEC2ContainerServiceV20141113.ListTasks
//! authorization: AWS4-HMAC-SHA256 Credential=...
//!
//! {"cluster":"prod","serviceName":"api","desiredStatus":"RUNNING","maxResults":100}
//! ```

use super::credentials::{self, CONTAINER_CREDENTIALS_HOST};
use super::sigv4::{self, AwsCredentials, SigningScope};
use super::{EcsApi, EcsConnector, EcsError, DESCRIBE_TASKS_BATCH};
use crate::config::EcsDiscoveryConfig;
use crate::model::Task;
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::time::Duration;
use url::Url;

/// Request timeout for every control-plane call.
pub const HTTP_TIMEOUT: Duration = Duration::from_secs(30);

const TARGET_PREFIX: &str = "AmazonEC2ContainerServiceV20141113";
const CONTENT_TYPE: &str = "application/x-amz-json-1.1";
const SERVICE: &str = "ecs";
const MAX_RESULTS: u32 = 100;

/// Upper bound on pages drained by one `List*` call.
pub const MAX_PAGES: usize = 1000;

/// Bytes of a non-JSON error body kept in [`EcsError::Status`].
const ERROR_BODY_LIMIT: usize = 256;

// ============================================================================
// Wire types
// ============================================================================

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ListRequest<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    cluster: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    service_name: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    desired_status: Option<&'a str>,
    max_results: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    next_token: Option<String>,
}

impl<'a> ListRequest<'a> {
    fn new() -> Self {
        Self {
            cluster: None,
            service_name: None,
            desired_status: None,
            max_results: MAX_RESULTS,
            next_token: None,
        }
    }
}

/// One page of any `List*` call; only the field for the operation is set.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ListResponse {
    #[serde(default)]
    cluster_arns: Vec<String>,
    #[serde(default)]
    service_arns: Vec<String>,
    #[serde(default)]
    task_arns: Vec<String>,
    #[serde(default)]
    next_token: Option<String>,
}

#[derive(Debug, Serialize)]
struct DescribeTasksRequest<'a> {
    cluster: &'a str,
    tasks: &'a [String],
}

#[derive(Debug, Default, Deserialize)]
struct DescribeTasksResponse {
    #[serde(default)]
    tasks: Vec<Task>,
    #[serde(default)]
    failures: Vec<Failure>,
}

#[derive(Debug, Default, Deserialize)]
struct Failure {
    #[serde(default)]
    arn: Option<String>,
    #[serde(default)]
    reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    #[serde(rename = "__type", default)]
    error_type: Option<String>,
    #[serde(alias = "Message", default)]
    message: Option<String>,
}

/// Map a non-2xx response to an [`EcsError`].
fn api_error(status: u16, body: &[u8]) -> EcsError {
    match serde_json::from_slice::<ErrorBody>(body) {
        Ok(ErrorBody {
            error_type: Some(error_type),
            message,
        }) => EcsError::Api {
            // "com.amazonaws.ecs#ClusterNotFoundException" -> "ClusterNotFoundException"
            code: error_type
                .rsplit('#')
                .next()
                .unwrap_or(&error_type)
                .to_string(),
            message: message.unwrap_or_default(),
        },
        _ => {
            let body = String::from_utf8_lossy(body);
            let mut cut = body.len().min(ERROR_BODY_LIMIT);
            while !body.is_char_boundary(cut) {
                cut -= 1;
            }
            EcsError::Status {
                status,
                body: body[..cut].to_string(),
            }
        }
    }
}

// ============================================================================
// Client
// ============================================================================

/// Signed ECS client bound to one region and one set of credentials.
#[derive(Debug, Clone)]
pub struct EcsHttpClient {
    client: Client,
    endpoint: Url,
    host: String,
    region: String,
    credentials: AwsCredentials,
}

impl EcsHttpClient {
    /// Client for the public regional endpoint.
    pub fn new(region: impl Into<String>, credentials: AwsCredentials) -> Result<Self, EcsError> {
        let client = Client::builder().timeout(HTTP_TIMEOUT).build()?;
        Self::with_client(client, region, credentials)
    }

    /// Reuse an existing `reqwest` client (shares its connection pool).
    pub fn with_client(
        client: Client,
        region: impl Into<String>,
        credentials: AwsCredentials,
    ) -> Result<Self, EcsError> {
        let region = region.into();
        let endpoint = format!("https://ecs.{}.amazonaws.com/", region);
        let endpoint = Url::parse(&endpoint)
            .map_err(|e| EcsError::Region(format!("invalid region '{}': {}", region, e)))?;
        let host = host_header(&endpoint)
            .ok_or_else(|| EcsError::Region(format!("invalid region '{}'", region)))?;

        Ok(Self {
            client,
            endpoint,
            host,
            region,
            credentials,
        })
    }

    /// Send requests to `endpoint` instead of the regional AWS endpoint.
    pub fn with_endpoint(mut self, endpoint: &str) -> Result<Self, EcsError> {
        let url = Url::parse(endpoint)
            .map_err(|e| EcsError::Region(format!("invalid endpoint '{}': {}", endpoint, e)))?;
        self.host = host_header(&url)
            .ok_or_else(|| EcsError::Region(format!("endpoint '{}' has no host", endpoint)))?;
        self.endpoint = url;
        Ok(self)
    }

    pub fn region(&self) -> &str {
        &self.region
    }

    pub fn endpoint(&self) -> &str {
        self.endpoint.as_str()
    }

    async fn call<Req, Resp>(&self, operation: &str, request: &Req) -> Result<Resp, EcsError>
    where
        Req: Serialize + Sync,
        Resp: DeserializeOwned,
    {
        let body = serde_json::to_vec(request)?;
        let datetime = chrono::Utc::now().format("%Y%m%dT%H%M%SZ").to_string();

        let mut headers = vec![
            ("host".to_string(), self.host.clone()),
            ("content-type".to_string(), CONTENT_TYPE.to_string()),
            (
                "x-amz-target".to_string(),
                format!("{}.{}", TARGET_PREFIX, operation),
            ),
        ];
        let authorization = sigv4::sign_request(
            &self.credentials,
            "POST",
            self.endpoint.path(),
            "",
            &mut headers,
            &body,
            SigningScope {
                region: &self.region,
                service: SERVICE,
                datetime: &datetime,
            },
        );

        // reqwest derives Host from the URL itself
        let mut builder = self
            .client
            .post(self.endpoint.clone())
            .header("authorization", authorization);
        for (name, value) in headers.iter().filter(|(name, _)| name != "host") {
            builder = builder.header(name.as_str(), value.as_str());
        }

        log::debug!("[ECS-CLIENT] {} -> {}", operation, self.endpoint);

        let response = builder.body(body).send().await?;
        let status = response.status();
        let bytes = response.bytes().await?;

        if !status.is_success() {
            return Err(api_error(status.as_u16(), &bytes));
        }

        Ok(serde_json::from_slice(&bytes)?)
    }

    /// Drain every page of a `List*` operation.
    async fn list_all(
        &self,
        operation: &str,
        mut request: ListRequest<'_>,
    ) -> Result<Vec<String>, EcsError> {
        let mut arns = Vec::new();
        let mut seen = HashSet::new();
        let mut pages = 0usize;

        loop {
            let page: ListResponse = self.call(operation, &request).await?;
            pages += 1;
            arns.extend(page.cluster_arns);
            arns.extend(page.service_arns);
            arns.extend(page.task_arns);

            let token = match page.next_token.filter(|t| !t.is_empty()) {
                Some(token) => token,
                None => break,
            };
            if !seen.insert(token.clone()) {
                return Err(EcsError::Pagination {
                    operation: operation.to_string(),
                    reason: format!("nextToken '{}' returned twice", token),
                });
            }
            if pages >= MAX_PAGES {
                return Err(EcsError::Pagination {
                    operation: operation.to_string(),
                    reason: format!("more than {} pages", MAX_PAGES),
                });
            }
            request.next_token = Some(token);
        }

        log::debug!(
            "[ECS-CLIENT] {}: {} ARN(s) in {} page(s)",
            operation,
            arns.len(),
            pages
        );
        Ok(arns)
    }
}

/// `host[:port]` as reqwest will send it.
fn host_header(url: &Url) -> Option<String> {
    let host = url.host_str()?;
    Some(match url.port() {
        Some(port) => format!("{}:{}", host, port),
        None => host.to_string(),
    })
}

impl EcsApi for EcsHttpClient {
    async fn list_clusters(&self) -> Result<Vec<String>, EcsError> {
        self.list_all("ListClusters", ListRequest::new()).await
    }

    async fn list_services(&self, cluster: &str) -> Result<Vec<String>, EcsError> {
        let request = ListRequest {
            cluster: Some(cluster),
            ..ListRequest::new()
        };
        self.list_all("ListServices", request).await
    }

    async fn list_running_tasks(
        &self,
        cluster: &str,
        service: &str,
    ) -> Result<Vec<String>, EcsError> {
        let request = ListRequest {
            cluster: Some(cluster),
            service_name: Some(service),
            desired_status: Some("RUNNING"),
            ..ListRequest::new()
        };
        self.list_all("ListTasks", request).await
    }

    async fn describe_tasks(
        &self,
        cluster: &str,
        task_arns: &[String],
    ) -> Result<Vec<Task>, EcsError> {
        if task_arns.len() > DESCRIBE_TASKS_BATCH {
            return Err(EcsError::BatchTooLarge {
                got: task_arns.len(),
                max: DESCRIBE_TASKS_BATCH,
            });
        }
        if task_arns.is_empty() {
            return Ok(Vec::new());
        }

        let request = DescribeTasksRequest {
            cluster,
            tasks: task_arns,
        };
        let response: DescribeTasksResponse = self.call("DescribeTasks", &request).await?;

        for failure in &response.failures {
            log::debug!(
                "[ECS-CLIENT] DescribeTasks failure: arn={} reason={}",
                failure.arn.as_deref().unwrap_or("?"),
                failure.reason.as_deref().unwrap_or("?")
            );
        }

        Ok(response.tasks)
    }
}

// ============================================================================
// Connector
// ============================================================================

/// Resolves region and credentials, then builds an [`EcsHttpClient`].
#[derive(Debug, Clone)]
pub struct HttpConnector {
    client: Client,
    endpoint: Option<String>,
    credentials_host: String,
}

impl HttpConnector {
    pub fn new() -> Result<Self, EcsError> {
        let client = Client::builder().timeout(HTTP_TIMEOUT).build()?;
        Ok(Self {
            client,
            endpoint: None,
            credentials_host: CONTAINER_CREDENTIALS_HOST.to_string(),
        })
    }

    /// Override the ECS endpoint (local mocks, VPC endpoints).
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = Some(endpoint.into());
        self
    }

    /// Override the task-role credential endpoint base.
    pub fn with_credentials_host(mut self, host: impl Into<String>) -> Self {
        self.credentials_host = host.into();
        self
    }
}

impl EcsConnector for HttpConnector {
    type Api = EcsHttpClient;

    async fn connect(&self, config: &EcsDiscoveryConfig) -> Result<EcsHttpClient, EcsError> {
        let region = credentials::resolve_region(config, credentials::process_env)?;
        let creds = credentials::resolve_credentials(
            config,
            &self.client,
            &self.credentials_host,
            credentials::process_env,
        )
        .await?;

        let api = EcsHttpClient::with_client(self.client.clone(), region, creds)?;
        match &self.endpoint {
            Some(endpoint) => api.with_endpoint(endpoint),
            None => Ok(api),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::prelude::*;
    use serde_json::json;

    fn target(operation: &str) -> String {
        format!("{}.{}", TARGET_PREFIX, operation)
    }

    fn client_for(server: &MockServer) -> EcsHttpClient {
        EcsHttpClient::new("us-east-1", AwsCredentials::new("AKIDEXAMPLE", "secret"))
            .unwrap()
            .with_endpoint(&server.base_url())
            .unwrap()
    }

    #[test]
    fn test_default_endpoint() {
        let client =
            EcsHttpClient::new("eu-west-3", AwsCredentials::new("AKIDEXAMPLE", "secret")).unwrap();
        assert_eq!(client.endpoint(), "https://ecs.eu-west-3.amazonaws.com/");
        assert_eq!(client.region(), "eu-west-3");
    }

    #[test]
    fn test_host_header_keeps_port() {
        let url = Url::parse("http://127.0.0.1:4566/").unwrap();
        assert_eq!(host_header(&url).unwrap(), "127.0.0.1:4566");
        let url = Url::parse("https://ecs.us-east-1.amazonaws.com/").unwrap();
        assert_eq!(host_header(&url).unwrap(), "ecs.us-east-1.amazonaws.com");
    }

    #[test]
    fn test_api_error_mapping() {
        let err = api_error(
            400,
            br#"{"__type":"com.amazonaws.ecs#ClusterNotFoundException","message":"Cluster not found."}"#,
        );
        match err {
            EcsError::Api { code, message } => {
                assert_eq!(code, "ClusterNotFoundException");
                assert_eq!(message, "Cluster not found.");
            }
            other => panic!("unexpected: {:?}", other),
        }

        let err = api_error(502, b"<html>bad gateway</html>");
        assert!(matches!(err, EcsError::Status { status: 502, .. }));
    }

    #[test]
    fn test_api_error_truncates_on_char_boundary() {
        // '€' is three bytes and straddles the limit
        let page = format!("{}€ gateway error page", "x".repeat(255));

        match api_error(502, page.as_bytes()) {
            EcsError::Status { status, body } => {
                assert_eq!(status, 502);
                assert_eq!(body, "x".repeat(255));
            }
            other => panic!("unexpected: {:?}", other),
        }

        match api_error(503, "é".repeat(200).as_bytes()) {
            EcsError::Status { body, .. } => assert_eq!(body, "é".repeat(128)),
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_list_clusters_paginates() {
        let server = MockServer::start();
        let first = server.mock(|when, then| {
            when.method(Method::POST)
                .path("/")
                .header("x-amz-target", target("ListClusters"))
                .header("content-type", CONTENT_TYPE)
                .header_exists("authorization")
                .header_exists("x-amz-date")
                .body(r#"{"maxResults":100}"#);
            then.status(200).json_body(json!({
                "clusterArns": ["arn:aws:ecs:us-east-1:1:cluster/a"],
                "nextToken": "page-2"
            }));
        });
        let second = server.mock(|when, then| {
            when.method(Method::POST)
                .path("/")
                .header("x-amz-target", target("ListClusters"))
                .body(r#"{"maxResults":100,"nextToken":"page-2"}"#);
            then.status(200).json_body(json!({
                "clusterArns": ["arn:aws:ecs:us-east-1:1:cluster/b"]
            }));
        });

        let clusters = client_for(&server).list_clusters().await.unwrap();

        first.assert();
        second.assert();
        assert_eq!(
            clusters,
            vec![
                "arn:aws:ecs:us-east-1:1:cluster/a",
                "arn:aws:ecs:us-east-1:1:cluster/b"
            ]
        );
    }

    #[tokio::test]
    async fn test_repeated_next_token_stops_pagination() {
        let server = MockServer::start();
        let mock = server.mock(|when, then| {
            when.method(Method::POST)
                .header("x-amz-target", target("ListClusters"));
            then.status(200).json_body(json!({
                "clusterArns": ["arn:aws:ecs:us-east-1:1:cluster/a"],
                "nextToken": "same"
            }));
        });

        let result = tokio::time::timeout(
            Duration::from_secs(10),
            client_for(&server).list_clusters(),
        )
        .await
        .expect("pagination must terminate");

        match result {
            Err(EcsError::Pagination { operation, .. }) => assert_eq!(operation, "ListClusters"),
            other => panic!("unexpected: {:?}", other),
        }
        // first page, then the repeated token
        mock.assert_calls(2);
    }

    #[tokio::test]
    async fn test_list_running_tasks_request_shape() {
        let server = MockServer::start();
        let mock = server.mock(|when, then| {
            when.method(Method::POST)
                .path("/")
                .header("x-amz-target", target("ListTasks"))
                .body(
                    r#"{"cluster":"prod","serviceName":"api","desiredStatus":"RUNNING","maxResults":100}"#,
                );
            then.status(200).json_body(json!({
                "taskArns": ["arn:aws:ecs:us-east-1:1:task/prod/t1"],
                "nextToken": ""
            }));
        });

        let tasks = client_for(&server)
            .list_running_tasks("prod", "api")
            .await
            .unwrap();

        mock.assert();
        assert_eq!(tasks, vec!["arn:aws:ecs:us-east-1:1:task/prod/t1"]);
    }

    #[tokio::test]
    async fn test_list_services() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(Method::POST)
                .header("x-amz-target", target("ListServices"))
                .body(r#"{"cluster":"prod","maxResults":100}"#);
            then.status(200).json_body(json!({
                "serviceArns": [
                    "arn:aws:ecs:us-east-1:1:service/prod/api",
                    "arn:aws:ecs:us-east-1:1:service/prod/worker"
                ]
            }));
        });

        let services = client_for(&server).list_services("prod").await.unwrap();
        assert_eq!(services.len(), 2);
    }

    #[tokio::test]
    async fn test_describe_tasks() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(Method::POST)
                .header("x-amz-target", target("DescribeTasks"))
                .body(r#"{"cluster":"prod","tasks":["t1","t2"]}"#);
            then.status(200).json_body(json!({
                "tasks": [{
                    "taskArn": "t1",
                    "containers": [{
                        "name": "web",
                        "networkInterfaces": [{"privateIpv4Address": "10.0.0.5"}]
                    }]
                }],
                "failures": [{"arn": "t2", "reason": "MISSING"}]
            }));
        });

        let ids = vec!["t1".to_string(), "t2".to_string()];
        let tasks = client_for(&server)
            .describe_tasks("prod", &ids)
            .await
            .unwrap();

        assert_eq!(tasks.len(), 1);
        assert_eq!(tasks[0], Task::new("t1").with_container("web", &["10.0.0.5"]));
    }

    #[tokio::test]
    async fn test_describe_tasks_rejects_oversized_batch() {
        let client = EcsHttpClient::new("us-east-1", AwsCredentials::new("AKIDEXAMPLE", "secret"))
            .unwrap()
            .with_endpoint("http://127.0.0.1:9")
            .unwrap();
        let ids: Vec<String> = (0..101).map(|i| format!("t{}", i)).collect();

        let err = client.describe_tasks("prod", &ids).await.unwrap_err();
        assert!(matches!(
            err,
            EcsError::BatchTooLarge { got: 101, max: 100 }
        ));
    }

    #[tokio::test]
    async fn test_api_error_is_surfaced() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(Method::POST)
                .header("x-amz-target", target("ListClusters"));
            then.status(400).json_body(json!({
                "__type": "AccessDeniedException",
                "message": "not authorized"
            }));
        });

        let err = client_for(&server).list_clusters().await.unwrap_err();
        match err {
            EcsError::Api { code, .. } => assert_eq!(code, "AccessDeniedException"),
            other => panic!("unexpected: {:?}", other),
        }
    }
}
