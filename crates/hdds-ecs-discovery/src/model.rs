// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Discovery data model.
//!
//! Task descriptors as returned by the ECS `DescribeTasks` call, and the
//! [`Address`] produced for every qualifying network endpoint.

use serde::Deserialize;
use std::cmp::Ordering;
use std::fmt;
use std::net::{IpAddr, SocketAddr};

/// A discovered peer endpoint.
///
/// Ordered by host (lexicographic on the textual form), then port.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Address {
    host: String,
    ip: IpAddr,
    port: u16,
}

impl Address {
    /// Build an address from an IP literal and a port.
    ///
    /// Returns `None` if `host` is not a valid IPv4/IPv6 literal.
    pub fn new(host: &str, port: u16) -> Option<Self> {
        let ip: IpAddr = host.trim().parse().ok()?;
        Some(Self {
            host: ip.to_string(),
            ip,
            port,
        })
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn ip(&self) -> IpAddr {
        self.ip
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.ip, self.port)
    }
}

impl Ord for Address {
    fn cmp(&self, other: &Self) -> Ordering {
        self.host
            .cmp(&other.host)
            .then_with(|| self.port.cmp(&other.port))
    }
}

impl PartialOrd for Address {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.socket_addr())
    }
}

impl From<&Address> for SocketAddr {
    fn from(addr: &Address) -> Self {
        addr.socket_addr()
    }
}

// ============================================================================
// ECS task descriptors
// ============================================================================

/// One running ECS task.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    pub task_arn: String,
    #[serde(default)]
    pub containers: Vec<Container>,
}

/// A container inside a task.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Container {
    pub name: String,
    #[serde(default)]
    pub network_interfaces: Vec<NetworkInterface>,
}

/// An attached network interface (awsvpc mode).
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NetworkInterface {
    #[serde(default)]
    pub private_ipv4_address: String,
}

impl Task {
    pub fn new(task_arn: impl Into<String>) -> Self {
        Self {
            task_arn: task_arn.into(),
            containers: Vec::new(),
        }
    }

    /// Add a container exposing the given interface addresses.
    pub fn with_container(mut self, name: impl Into<String>, ips: &[&str]) -> Self {
        self.containers.push(Container {
            name: name.into(),
            network_interfaces: ips
                .iter()
                .map(|ip| NetworkInterface {
                    private_ipv4_address: (*ip).to_string(),
                })
                .collect(),
        });
        self
    }
}
