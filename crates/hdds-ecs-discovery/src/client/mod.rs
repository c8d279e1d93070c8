// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! ECS control-plane access.
//!
//! # Architecture
//!
//! ```text
//! EcsConnector (one per discovery)
//!   +-- connect(config) -> EcsApi (one per discovery cycle)
//!         +-- list_clusters / list_services / list_running_tasks
//!         +-- describe_tasks (<= 100 ids per call)
//! ```
//!
//! [`HttpConnector`] binds to the real ECS JSON API; tests plug in their own
//! [`EcsApi`] implementation.

pub mod credentials;
pub mod http;
pub mod sigv4;

pub use http::{EcsHttpClient, HttpConnector};
pub use sigv4::AwsCredentials;

use crate::config::EcsDiscoveryConfig;
use crate::model::Task;
use std::future::Future;
use thiserror::Error;

/// Maximum number of task ids accepted by one `DescribeTasks` call.
pub const DESCRIBE_TASKS_BATCH: usize = 100;

/// ECS query errors.
#[derive(Debug, Error)]
pub enum EcsError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("ECS returned HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("ECS API error {code}: {message}")]
    Api { code: String, message: String },

    #[error("Failed to decode ECS response: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("AWS credentials unavailable: {0}")]
    Credentials(String),

    #[error("AWS region unavailable: {0}")]
    Region(String),

    #[error("{operation} pagination aborted: {reason}")]
    Pagination { operation: String, reason: String },

    #[error("DescribeTasks accepts at most {max} task ids, got {got}")]
    BatchTooLarge { got: usize, max: usize },
}

/// The subset of the ECS API needed for discovery.
///
/// List operations return every page; implementations handle `nextToken`.
pub trait EcsApi: Send + Sync {
    /// ARNs of all clusters visible to the caller.
    fn list_clusters(&self) -> impl Future<Output = Result<Vec<String>, EcsError>> + Send;

    /// ARNs of all services in `cluster`.
    fn list_services(
        &self,
        cluster: &str,
    ) -> impl Future<Output = Result<Vec<String>, EcsError>> + Send;

    /// ARNs of the RUNNING tasks of `service` in `cluster`.
    fn list_running_tasks(
        &self,
        cluster: &str,
        service: &str,
    ) -> impl Future<Output = Result<Vec<String>, EcsError>> + Send;

    /// Full descriptors for at most [`DESCRIBE_TASKS_BATCH`] tasks.
    fn describe_tasks(
        &self,
        cluster: &str,
        task_arns: &[String],
    ) -> impl Future<Output = Result<Vec<Task>, EcsError>> + Send;
}

/// Builds an [`EcsApi`] client from the current region/credential hints.
///
/// Called at the start of every discovery cycle, so rotated credentials are
/// picked up without restarting.
pub trait EcsConnector: Send + Sync {
    type Api: EcsApi;

    fn connect(
        &self,
        config: &EcsDiscoveryConfig,
    ) -> impl Future<Output = Result<Self::Api, EcsError>> + Send;
}
