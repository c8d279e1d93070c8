// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Discovery configuration.
//!
//! Built from a flat, hyphenated property bag (the shape a membership layer
//! hands to its discovery plugins) or from a TOML file with the same keys.
//!
//! ```toml
//! cluster-name-regexp = "prod-.*"
//! service = "hdds-node"
//! ports = "5701-5703"
//! container-name-regexp = "node"
//! region = "eu-west-1"
//! fail-fast = false
//! ```

use crate::client::AwsCredentials;
use regex::Regex;
use std::collections::HashMap;
use std::fmt;
use std::ops::RangeInclusive;
use std::path::Path;
use std::str::FromStr;
use thiserror::Error;

/// Default peer port when no `ports` property is given.
pub const DEFAULT_PORT: u16 = 5701;

pub const KEY_CLUSTER: &str = "cluster";
pub const KEY_CLUSTER_NAME_REGEXP: &str = "cluster-name-regexp";
pub const KEY_SERVICE: &str = "service";
pub const KEY_SERVICE_NAME_REGEXP: &str = "service-name-regexp";
pub const KEY_PORTS: &str = "ports";
pub const KEY_CONTAINER_NAME_REGEXP: &str = "container-name-regexp";
pub const KEY_ACCESS_KEY: &str = "access-key";
pub const KEY_SECRET_KEY: &str = "secret-key";
pub const KEY_REGION: &str = "region";
pub const KEY_FAIL_FAST: &str = "fail-fast";

/// Every property key understood by [`EcsDiscoveryConfig::from_properties`].
pub const PROPERTY_KEYS: &[&str] = &[
    KEY_CLUSTER,
    KEY_CLUSTER_NAME_REGEXP,
    KEY_SERVICE,
    KEY_SERVICE_NAME_REGEXP,
    KEY_PORTS,
    KEY_CONTAINER_NAME_REGEXP,
    KEY_ACCESS_KEY,
    KEY_SECRET_KEY,
    KEY_REGION,
    KEY_FAIL_FAST,
];

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("Invalid port specification '{spec}': {reason}")]
    InvalidPorts { spec: String, reason: String },

    #[error("Invalid pattern for '{key}': {source}")]
    InvalidPattern {
        key: &'static str,
        #[source]
        source: regex::Error,
    },

    #[error("Invalid value for '{key}': {reason}")]
    InvalidValue { key: String, reason: String },

    #[error("Unknown property '{0}'")]
    UnknownProperty(String),
}

// ============================================================================
// Port range
// ============================================================================

/// Inclusive port range, `5701` or `5701-5705`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PortRange {
    lower: u16,
    upper: u16,
}

impl PortRange {
    pub fn single(port: u16) -> Self {
        Self {
            lower: port,
            upper: port,
        }
    }

    pub fn lower(&self) -> u16 {
        self.lower
    }

    pub fn upper(&self) -> u16 {
        self.upper
    }

    /// Ports in ascending order.
    pub fn ports(&self) -> RangeInclusive<u16> {
        self.lower..=self.upper
    }

    /// Number of ports in the range (never zero).
    pub fn count(&self) -> usize {
        usize::from(self.upper - self.lower) + 1
    }
}

impl Default for PortRange {
    fn default() -> Self {
        Self::single(DEFAULT_PORT)
    }
}

impl FromStr for PortRange {
    type Err = ConfigError;

    fn from_str(spec: &str) -> Result<Self, Self::Err> {
        let invalid = |reason: &str| ConfigError::InvalidPorts {
            spec: spec.to_string(),
            reason: reason.to_string(),
        };

        let (lower, upper) = match spec.split_once('-') {
            Some((lower, upper)) => (lower, upper),
            None => (spec, spec),
        };

        let parse = |part: &str| -> Result<u16, ConfigError> {
            if part.is_empty() || !part.bytes().all(|b| b.is_ascii_digit()) {
                return Err(invalid("expected <port> or <port>-<port>"));
            }
            match part.parse::<u32>() {
                Ok(port) if (1..=65535).contains(&port) => Ok(port as u16),
                _ => Err(invalid("port must be within 1-65535")),
            }
        };

        let lower = parse(lower)?;
        let upper = parse(upper)?;
        if lower > upper {
            return Err(invalid("lower bound exceeds upper bound"));
        }

        Ok(Self { lower, upper })
    }
}

impl fmt::Display for PortRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.lower == self.upper {
            write!(f, "{}", self.lower)
        } else {
            write!(f, "{}-{}", self.lower, self.upper)
        }
    }
}

// ============================================================================
// Name patterns
// ============================================================================

/// Precompiled whole-string name matcher.
///
/// `app` matches `app` only, never `application-backup`.
#[derive(Clone)]
pub struct NamePattern {
    source: String,
    regex: Regex,
}

impl NamePattern {
    /// Compile a user-supplied regular expression.
    pub fn new(pattern: &str) -> Result<Self, regex::Error> {
        let regex = Regex::new(&format!("^(?:{})$", pattern))?;
        Ok(Self {
            source: pattern.to_string(),
            regex,
        })
    }

    /// Pattern matching everything.
    pub fn match_all() -> Self {
        #[allow(clippy::expect_used)] // constant pattern
        let regex = Regex::new("^(?s:.*)$").expect("match-all pattern compiles");
        Self {
            source: ".*".to_string(),
            regex,
        }
    }

    /// Pattern matching exactly `name` (regex metacharacters escaped).
    pub fn exact(name: &str) -> Self {
        let source = regex::escape(name);
        #[allow(clippy::expect_used)] // escaped literal always compiles
        let regex = Regex::new(&format!("^{}$", source)).expect("escaped literal compiles");
        Self { source, regex }
    }

    pub fn matches(&self, text: &str) -> bool {
        self.regex.is_match(text)
    }

    pub fn as_str(&self) -> &str {
        &self.source
    }
}

impl fmt::Debug for NamePattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "NamePattern({:?})", self.source)
    }
}

impl fmt::Display for NamePattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.source)
    }
}

// ============================================================================
// Selector
// ============================================================================

/// Which ECS services to query.
#[derive(Debug, Clone)]
pub enum Selector {
    /// One known service in one known cluster.
    ExactNames { cluster: String, service: String },
    /// Every service matching `service` in every cluster matching `cluster`.
    Patterns {
        cluster: NamePattern,
        service: NamePattern,
    },
}

impl Selector {
    fn from_parts(
        cluster: Option<&str>,
        cluster_regexp: Option<&str>,
        service: Option<&str>,
        service_regexp: Option<&str>,
    ) -> Result<Self, ConfigError> {
        if let (Some(cluster), Some(service)) = (cluster, service) {
            return Ok(Self::ExactNames {
                cluster: cluster.to_string(),
                service: service.to_string(),
            });
        }

        let pattern = |key: &'static str, regexp: Option<&str>, name: Option<&str>| {
            match (regexp, name) {
                (Some(regexp), _) => NamePattern::new(regexp)
                    .map_err(|source| ConfigError::InvalidPattern { key, source }),
                (None, Some(name)) => Ok(NamePattern::exact(name)),
                (None, None) => Ok(NamePattern::match_all()),
            }
        };

        Ok(Self::Patterns {
            cluster: pattern(KEY_CLUSTER_NAME_REGEXP, cluster_regexp, cluster)?,
            service: pattern(KEY_SERVICE_NAME_REGEXP, service_regexp, service)?,
        })
    }
}

impl fmt::Display for Selector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ExactNames { cluster, service } => {
                write!(f, "cluster={} service={}", cluster, service)
            }
            Self::Patterns { cluster, service } => {
                write!(f, "cluster=~/{}/ service=~/{}/", cluster, service)
            }
        }
    }
}

// ============================================================================
// Discovery configuration
// ============================================================================

/// Validated ECS discovery configuration.
#[derive(Debug, Clone)]
pub struct EcsDiscoveryConfig {
    /// Cluster/service selection.
    pub selector: Selector,

    /// Only containers whose name fully matches contribute addresses.
    pub container_filter: NamePattern,

    /// Ports expanded for every discovered interface.
    pub ports: PortRange,

    /// Propagate query errors instead of returning the cached peers.
    pub fail_fast: bool,

    /// Static credentials (otherwise resolved from the environment).
    pub credentials: Option<AwsCredentials>,

    /// Region hint (otherwise resolved from the environment).
    pub region: Option<String>,
}

impl Default for EcsDiscoveryConfig {
    fn default() -> Self {
        Self {
            selector: Selector::Patterns {
                cluster: NamePattern::match_all(),
                service: NamePattern::match_all(),
            },
            container_filter: NamePattern::match_all(),
            ports: PortRange::default(),
            fail_fast: true,
            credentials: None,
            region: None,
        }
    }
}

impl EcsDiscoveryConfig {
    /// Discover a single service of a single cluster.
    pub fn for_service(cluster: impl Into<String>, service: impl Into<String>) -> Self {
        Self {
            selector: Selector::ExactNames {
                cluster: cluster.into(),
                service: service.into(),
            },
            ..Default::default()
        }
    }

    /// Build and validate from a flat property bag.
    pub fn from_properties(props: &HashMap<String, String>) -> Result<Self, ConfigError> {
        if let Some(unknown) = props.keys().find(|k| !PROPERTY_KEYS.contains(&k.as_str())) {
            return Err(ConfigError::UnknownProperty(unknown.clone()));
        }

        let get = |key: &str| props.get(key).map(String::as_str);

        let selector = Selector::from_parts(
            get(KEY_CLUSTER),
            get(KEY_CLUSTER_NAME_REGEXP),
            get(KEY_SERVICE),
            get(KEY_SERVICE_NAME_REGEXP),
        )?;

        let container_filter = match get(KEY_CONTAINER_NAME_REGEXP).map(str::trim) {
            Some(filter) if !filter.is_empty() => {
                NamePattern::new(filter).map_err(|source| ConfigError::InvalidPattern {
                    key: KEY_CONTAINER_NAME_REGEXP,
                    source,
                })?
            }
            _ => NamePattern::match_all(),
        };

        let ports = match get(KEY_PORTS) {
            Some(spec) => spec.trim().parse()?,
            None => PortRange::default(),
        };

        let fail_fast = match get(KEY_FAIL_FAST) {
            Some(value) => parse_bool(KEY_FAIL_FAST, value)?,
            None => true,
        };

        let credentials = match (get(KEY_ACCESS_KEY), get(KEY_SECRET_KEY)) {
            (Some(access_key), Some(secret_key)) => {
                Some(AwsCredentials::new(access_key, secret_key))
            }
            (None, None) => None,
            (Some(_), None) => return Err(missing_pair(KEY_SECRET_KEY, KEY_ACCESS_KEY)),
            (None, Some(_)) => return Err(missing_pair(KEY_ACCESS_KEY, KEY_SECRET_KEY)),
        };

        Ok(Self {
            selector,
            container_filter,
            ports,
            fail_fast,
            credentials,
            region: get(KEY_REGION).map(str::to_string),
        })
    }

    /// Load from a TOML file whose top-level keys are the property keys.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let table: toml::Table = toml::from_str(content)?;

        let mut props = HashMap::with_capacity(table.len());
        for (key, value) in table {
            let value = match value {
                toml::Value::String(s) => s,
                toml::Value::Boolean(b) => b.to_string(),
                toml::Value::Integer(i) => i.to_string(),
                other => {
                    return Err(ConfigError::InvalidValue {
                        key,
                        reason: format!("unsupported {} value", other.type_str()),
                    })
                }
            };
            props.insert(key, value);
        }

        Self::from_properties(&props)
    }

    /// Render back into the TOML file format (credentials included in clear).
    pub fn to_toml_string(&self) -> String {
        let mut table = toml::Table::new();
        match &self.selector {
            Selector::ExactNames { cluster, service } => {
                table.insert(KEY_CLUSTER.into(), cluster.clone().into());
                table.insert(KEY_SERVICE.into(), service.clone().into());
            }
            Selector::Patterns { cluster, service } => {
                table.insert(KEY_CLUSTER_NAME_REGEXP.into(), cluster.as_str().into());
                table.insert(KEY_SERVICE_NAME_REGEXP.into(), service.as_str().into());
            }
        }
        table.insert(KEY_PORTS.into(), self.ports.to_string().into());
        table.insert(
            KEY_CONTAINER_NAME_REGEXP.into(),
            self.container_filter.as_str().into(),
        );
        if let Some(creds) = &self.credentials {
            table.insert(KEY_ACCESS_KEY.into(), creds.access_key_id.clone().into());
            table.insert(KEY_SECRET_KEY.into(), creds.secret_access_key.clone().into());
        }
        if let Some(region) = &self.region {
            table.insert(KEY_REGION.into(), region.clone().into());
        }
        table.insert(KEY_FAIL_FAST.into(), self.fail_fast.into());
        table.to_string()
    }
}

impl fmt::Display for EcsDiscoveryConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "EcsDiscoveryConfig{{{}, container=~/{}/, ports={}, fail-fast={}, region={}",
            self.selector,
            self.container_filter,
            self.ports,
            self.fail_fast,
            self.region.as_deref().unwrap_or("<env>"),
        )?;
        match &self.credentials {
            Some(creds) => write!(
                f,
                ", access-key={}, secret-key={}}}",
                mask(&creds.access_key_id),
                mask(&creds.secret_access_key)
            ),
            None => f.write_str(", credentials=<env>}"),
        }
    }
}

/// Keep the first two characters of a secret.
pub(crate) fn mask(secret: &str) -> String {
    let mut masked: String = secret.chars().take(2).collect();
    masked.push_str("...");
    masked
}

fn parse_bool(key: &str, value: &str) -> Result<bool, ConfigError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "true" => Ok(true),
        "false" => Ok(false),
        other => Err(ConfigError::InvalidValue {
            key: key.to_string(),
            reason: format!("expected true or false, got '{}'", other),
        }),
    }
}

fn missing_pair(missing: &str, present: &str) -> ConfigError {
    ConfigError::InvalidValue {
        key: missing.to_string(),
        reason: format!("required when '{}' is set", present),
    }
}
