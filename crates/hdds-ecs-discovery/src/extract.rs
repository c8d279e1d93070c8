// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Task descriptors to peer addresses.

use crate::config::EcsDiscoveryConfig;
use crate::model::{Address, Task};

/// Expand `tasks` into one address per (container interface, port).
///
/// The own task is skipped, as is every container whose name does not fully
/// match the container filter. Output may contain duplicates.
pub fn extract_addresses(
    tasks: &[Task],
    own_task_arn: Option<&str>,
    config: &EcsDiscoveryConfig,
) -> Vec<Address> {
    let mut addresses = Vec::new();

    for task in tasks {
        if own_task_arn == Some(task.task_arn.as_str()) {
            log::debug!("[ECS-DISCOVERY] Skipping own task {}", task.task_arn);
            continue;
        }

        let containers = task
            .containers
            .iter()
            .filter(|c| config.container_filter.matches(&c.name));

        for container in containers {
            for interface in &container.network_interfaces {
                let host = interface.private_ipv4_address.as_str();
                for port in config.ports.ports() {
                    match Address::new(host, port) {
                        Some(address) => addresses.push(address),
                        None => {
                            log::warn!(
                                "[ECS-DISCOVERY] Skipping '{}' of container {} in {}: not an IP address",
                                host,
                                container.name,
                                task.task_arn
                            );
                            break;
                        }
                    }
                }
            }
        }
    }

    addresses
}
