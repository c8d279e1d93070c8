// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Region and credential resolution.
//!
//! Lookup order:
//!
//! | What        | 1st               | 2nd                                        | 3rd                          |
//! |-------------|-------------------|--------------------------------------------|------------------------------|
//! | Region      | config `region`   | `AWS_REGION`                               | `AWS_DEFAULT_REGION`         |
//! | Credentials | config key pair   | `AWS_ACCESS_KEY_ID` / `AWS_SECRET_ACCESS_KEY` | ECS task-role endpoint    |
//!
//! Environment access goes through a lookup closure so tests never touch the
//! process environment.

use super::{AwsCredentials, EcsError};
use crate::config::EcsDiscoveryConfig;
use reqwest::Client;
use serde::Deserialize;

/// ECS task-role credential endpoint (link-local).
pub const CONTAINER_CREDENTIALS_HOST: &str = "http://169.254.170.2";

pub const ENV_REGION: &str = "AWS_REGION";
pub const ENV_DEFAULT_REGION: &str = "AWS_DEFAULT_REGION";
pub const ENV_ACCESS_KEY_ID: &str = "AWS_ACCESS_KEY_ID";
pub const ENV_SECRET_ACCESS_KEY: &str = "AWS_SECRET_ACCESS_KEY";
pub const ENV_SESSION_TOKEN: &str = "AWS_SESSION_TOKEN";
pub const ENV_CONTAINER_CREDENTIALS_RELATIVE_URI: &str = "AWS_CONTAINER_CREDENTIALS_RELATIVE_URI";
pub const ENV_CONTAINER_CREDENTIALS_FULL_URI: &str = "AWS_CONTAINER_CREDENTIALS_FULL_URI";
pub const ENV_CONTAINER_AUTHORIZATION_TOKEN: &str = "AWS_CONTAINER_AUTHORIZATION_TOKEN";

/// Process environment lookup; empty values count as unset.
pub fn process_env(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}

pub fn resolve_region<F>(config: &EcsDiscoveryConfig, env: F) -> Result<String, EcsError>
where
    F: Fn(&str) -> Option<String>,
{
    config
        .region
        .clone()
        .filter(|r| !r.trim().is_empty())
        .or_else(|| env(ENV_REGION))
        .or_else(|| env(ENV_DEFAULT_REGION))
        .ok_or_else(|| {
            EcsError::Region(format!(
                "set 'region' or {} / {}",
                ENV_REGION, ENV_DEFAULT_REGION
            ))
        })
}

/// Static credentials from the environment.
pub fn credentials_from_env<F>(env: F) -> Option<AwsCredentials>
where
    F: Fn(&str) -> Option<String>,
{
    let creds = AwsCredentials::new(env(ENV_ACCESS_KEY_ID)?, env(ENV_SECRET_ACCESS_KEY)?);
    Some(match env(ENV_SESSION_TOKEN) {
        Some(token) => creds.with_session_token(token),
        None => creds,
    })
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct ContainerCredentials {
    access_key_id: String,
    secret_access_key: String,
    #[serde(default)]
    token: Option<String>,
}

/// Resolve credentials for one discovery cycle.
///
/// `container_host` is the task-role endpoint base, normally
/// [`CONTAINER_CREDENTIALS_HOST`].
pub async fn resolve_credentials<F>(
    config: &EcsDiscoveryConfig,
    client: &Client,
    container_host: &str,
    env: F,
) -> Result<AwsCredentials, EcsError>
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(creds) = &config.credentials {
        return Ok(creds.clone());
    }

    if let Some(creds) = credentials_from_env(&env) {
        log::debug!("[ECS-CLIENT] Using credentials from environment");
        return Ok(creds);
    }

    let url = match (
        env(ENV_CONTAINER_CREDENTIALS_RELATIVE_URI),
        env(ENV_CONTAINER_CREDENTIALS_FULL_URI),
    ) {
        (Some(relative), _) => format!("{}{}", container_host.trim_end_matches('/'), relative),
        (None, Some(full)) => full,
        (None, None) => {
            return Err(EcsError::Credentials(format!(
                "no static keys, no {} / {}, and no task role ({})",
                ENV_ACCESS_KEY_ID, ENV_SECRET_ACCESS_KEY, ENV_CONTAINER_CREDENTIALS_RELATIVE_URI
            )))
        }
    };

    log::debug!("[ECS-CLIENT] Fetching task-role credentials from {}", url);

    let mut request = client.get(&url);
    if let Some(token) = env(ENV_CONTAINER_AUTHORIZATION_TOKEN) {
        request = request.header("authorization", token);
    }

    let response = request.send().await?;
    let status = response.status();
    if !status.is_success() {
        return Err(EcsError::Credentials(format!(
            "task-role endpoint returned HTTP {}",
            status.as_u16()
        )));
    }

    let body: ContainerCredentials = response.json().await?;
    let creds = AwsCredentials::new(body.access_key_id, body.secret_access_key);
    Ok(match body.token {
        Some(token) if !token.is_empty() => creds.with_session_token(token),
        _ => creds,
    })
}
