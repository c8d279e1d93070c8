// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Own task identity from the ECS container metadata side-channel.
//!
//! The ECS agent exposes task metadata either over HTTP
//! (`ECS_CONTAINER_METADATA_URI`, document at `<uri>/task`) or as a local
//! file (`ECS_CONTAINER_METADATA_FILE`). Both documents carry a `TaskARN`
//! field; it is extracted with a pattern scan, no full JSON decode.
//!
//! Failure is never fatal: without an ARN, discovery simply cannot exclude
//! its own task.

use regex::Regex;
use std::path::PathBuf;
use std::sync::OnceLock;
use std::time::Duration;
use thiserror::Error;
use url::Url;

pub const ENV_METADATA_URI: &str = "ECS_CONTAINER_METADATA_URI";
pub const ENV_METADATA_FILE: &str = "ECS_CONTAINER_METADATA_FILE";

const METADATA_TIMEOUT: Duration = Duration::from_secs(5);

/// Task metadata read errors.
#[derive(Debug, Error)]
pub enum IdentityError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("metadata endpoint returned HTTP {0}")]
    Status(u16),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Where the task metadata document lives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MetadataSource {
    /// Task metadata endpoint (already including `/task`).
    Uri(String),
    /// Local metadata file.
    File(PathBuf),
}

impl MetadataSource {
    /// Pick the source from the process environment.
    pub fn from_env() -> Option<Self> {
        Self::from_vars(|name| std::env::var(name).ok())
    }

    /// Pick the source from a variable lookup; the URI wins over the file.
    pub fn from_vars<F>(var: F) -> Option<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_empty = |name: &str| var(name).filter(|v| !v.trim().is_empty());

        if let Some(base) = non_empty(ENV_METADATA_URI) {
            return Some(Self::Uri(format!("{}/task", base.trim_end_matches('/'))));
        }

        non_empty(ENV_METADATA_FILE).map(|file| Self::File(file_path(file.trim())))
    }

    /// Fetch the document and extract the task ARN.
    pub async fn task_arn(&self) -> Option<String> {
        let text = match self.fetch().await {
            Ok(text) => text,
            Err(e) => {
                log::warn!("[ECS-IDENTITY] Cannot read task metadata from {}: {}", self, e);
                return None;
            }
        };

        let arn = extract_task_arn(&text);
        match &arn {
            Some(arn) => log::debug!("[ECS-IDENTITY] Own task: {}", arn),
            None => log::warn!("[ECS-IDENTITY] No TaskARN in metadata from {}", self),
        }
        arn
    }

    async fn fetch(&self) -> Result<String, IdentityError> {
        match self {
            Self::Uri(uri) => {
                let client = reqwest::Client::builder()
                    .timeout(METADATA_TIMEOUT)
                    .build()?;
                let response = client.get(uri).send().await?;
                let status = response.status();
                if !status.is_success() {
                    return Err(IdentityError::Status(status.as_u16()));
                }
                Ok(response.text().await?)
            }
            Self::File(path) => Ok(tokio::fs::read_to_string(path).await?),
        }
    }
}

impl std::fmt::Display for MetadataSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Uri(uri) => f.write_str(uri),
            Self::File(path) => write!(f, "{}", path.display()),
        }
    }
}

/// `file:///x/y` and bare `/x/y` both name `/x/y`.
fn file_path(value: &str) -> PathBuf {
    if value.starts_with("file:") {
        if let Some(path) = Url::parse(value).ok().and_then(|u| u.to_file_path().ok()) {
            return path;
        }
    }
    PathBuf::from(value)
}

fn task_arn_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        #[allow(clippy::expect_used)] // literal pattern, covered by tests
        let pattern = Regex::new(r#""TaskARN"\s*:\s*"([^"]+)""#).expect("valid TaskARN pattern");
        pattern
    })
}

/// First `"TaskARN" : "<value>"` anywhere in `text`.
pub fn extract_task_arn(text: &str) -> Option<String> {
    task_arn_pattern()
        .captures(text)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().to_string())
}

/// Resolve the own task ARN from the process environment.
///
/// `None` when no hint is set or the document cannot be read.
pub async fn resolve_own_task_arn() -> Option<String> {
    match MetadataSource::from_env() {
        Some(source) => source.task_arn().await,
        None => {
            log::debug!(
                "[ECS-IDENTITY] Neither {} nor {} set; own task unknown",
                ENV_METADATA_URI,
                ENV_METADATA_FILE
            );
            None
        }
    }
}
