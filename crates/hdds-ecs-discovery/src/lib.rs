// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! HDDS ECS Peer Discovery
//!
//! Resolves the live peer addresses of a clustered process running in AWS
//! ECS by querying the ECS control plane.
//!
//! # Features
//!
//! - **Self-exclusion**: own task ARN from the container metadata endpoint/file
//! - **Selectors**: one exact cluster/service, or name patterns over all of them
//! - **Batching**: paginated list calls, `DescribeTasks` in chunks of 100
//! - **Fail-soft**: last known-good peers returned when a cycle fails
//! - **Poller**: background thread with join/leave events for sync callers
//!
//! # Quick Start
//!
//! ```ignore
//! use hdds_ecs_discovery::{EcsDiscovery, EcsDiscoveryConfig};
//!
//! let config = EcsDiscoveryConfig::for_service("prod", "hdds-node");
//! let discovery = EcsDiscovery::from_env(config).await?;
//! for peer in discovery.discover_nodes().await? {
//!     println!("{}", peer);
//! }
//! ```
//!
//! # Properties
//!
//! | Key                     | Default | Meaning                                  |
//! |-------------------------|---------|------------------------------------------|
//! | `cluster`               |         | exact cluster name                       |
//! | `cluster-name-regexp`   | `.*`    | cluster pattern (when not both exact)    |
//! | `service`               |         | exact service name                       |
//! | `service-name-regexp`   | `.*`    | service pattern (when not both exact)    |
//! | `ports`                 | `5701`  | `p` or `p1-p2`                           |
//! | `container-name-regexp` | `.*`    | containers contributing addresses        |
//! | `access-key`/`secret-key` |       | static credentials                       |
//! | `region`                | env     | AWS region                               |
//! | `fail-fast`             | `true`  | propagate errors instead of cached peers |

pub mod cache;
pub mod client;
pub mod config;
pub mod discovery;
pub mod extract;
pub mod identity;
pub mod model;
pub mod poller;
pub mod resolver;

pub use cache::DiscoveryCache;
pub use client::{
    AwsCredentials, EcsApi, EcsConnector, EcsError, EcsHttpClient, HttpConnector,
    DESCRIBE_TASKS_BATCH,
};
pub use config::{ConfigError, EcsDiscoveryConfig, NamePattern, PortRange, Selector};
pub use discovery::{DiscoveryError, EcsDiscovery};
pub use extract::extract_addresses;
pub use identity::{extract_task_arn, resolve_own_task_arn, IdentityError, MetadataSource};
pub use model::{Address, Container, NetworkInterface, Task};
pub use poller::{EcsDiscoveryPoller, EcsDiscoveryPollerHandle, PollerConfig, PollerEvent};
pub use resolver::resolve_running_tasks;
