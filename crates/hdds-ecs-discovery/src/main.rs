// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! HDDS ECS Discovery CLI
//!
//! Command-line tool for inspecting ECS peer discovery.
//!
//! # Usage
//!
//! ```bash
//! # One-shot discovery of one service
//! hdds-ecs-discovery --cluster prod --service hdds-node
//!
//! # Every "api" service in every "prod-*" cluster, two ports
//! hdds-ecs-discovery --cluster-name-regexp 'prod-.*' --service api --ports 5701-5702
//!
//! # Using configuration file, watching for changes
//! hdds-ecs-discovery --config ecs.toml watch --interval 10
//!
//! # Own task identity
//! hdds-ecs-discovery whoami
//! ```

use clap::{Parser, Subcommand};
use hdds_ecs_discovery::config::{
    KEY_ACCESS_KEY, KEY_CLUSTER, KEY_CLUSTER_NAME_REGEXP, KEY_CONTAINER_NAME_REGEXP,
    KEY_FAIL_FAST, KEY_PORTS, KEY_REGION, KEY_SECRET_KEY, KEY_SERVICE, KEY_SERVICE_NAME_REGEXP,
};
use hdds_ecs_discovery::{
    resolve_own_task_arn, ConfigError, EcsDiscovery, EcsDiscoveryConfig, EcsDiscoveryPoller,
    HttpConnector, PollerConfig, PollerEvent,
};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing_subscriber::EnvFilter;

/// HDDS ECS peer discovery
#[derive(Parser, Debug)]
#[command(name = "hdds-ecs-discovery")]
#[command(about = "HDDS ECS Discovery - Resolve cluster peers from the AWS ECS control plane")]
#[command(version)]
struct Args {
    /// Configuration file path (TOML, same keys as the flags)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Exact cluster name
    #[arg(long, conflicts_with = "config")]
    cluster: Option<String>,

    /// Cluster name pattern (whole-name match)
    #[arg(long, conflicts_with = "config")]
    cluster_name_regexp: Option<String>,

    /// Exact service name
    #[arg(long, conflicts_with = "config")]
    service: Option<String>,

    /// Service name pattern (whole-name match)
    #[arg(long, conflicts_with = "config")]
    service_name_regexp: Option<String>,

    /// Port or port range (e.g. 5701 or 5701-5703)
    #[arg(short, long, conflicts_with = "config")]
    ports: Option<String>,

    /// Container name pattern (whole-name match)
    #[arg(long, conflicts_with = "config")]
    container_name_regexp: Option<String>,

    /// AWS access key (requires --secret-key)
    #[arg(long, conflicts_with = "config")]
    access_key: Option<String>,

    /// AWS secret key (requires --access-key)
    #[arg(long, conflicts_with = "config")]
    secret_key: Option<String>,

    /// AWS region (defaults to AWS_REGION / AWS_DEFAULT_REGION)
    #[arg(short, long, conflicts_with = "config")]
    region: Option<String>,

    /// Fail on query errors instead of returning cached peers (true/false)
    #[arg(long, conflicts_with = "config")]
    fail_fast: Option<String>,

    /// ECS endpoint override (e.g. http://localhost:4566)
    #[arg(long)]
    endpoint: Option<String>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run one discovery cycle and print the peers (default)
    Discover,

    /// Poll continuously and print peer changes until Ctrl+C
    Watch {
        /// Poll interval (seconds)
        #[arg(short, long, default_value = "5")]
        interval: u64,
    },

    /// Generate example configuration file
    GenConfig {
        /// Output file path
        #[arg(short, long, default_value = "ecs-discovery.toml")]
        output: PathBuf,
    },

    /// Validate a configuration file
    Validate {
        /// Configuration file path
        #[arg(short, long)]
        config: PathBuf,
    },

    /// Print the task ARN of this container
    Whoami,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    // Initialize logging
    let filter = EnvFilter::try_new(&args.log_level).unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    match args.command {
        None | Some(Commands::Discover) => cmd_discover(&args).await,
        Some(Commands::Watch { interval }) => cmd_watch(&args, interval).await,
        Some(Commands::GenConfig { ref output }) => cmd_gen_config(output),
        Some(Commands::Validate { ref config }) => cmd_validate(config),
        Some(Commands::Whoami) => cmd_whoami().await,
    }
}

fn build_config(args: &Args) -> Result<EcsDiscoveryConfig, ConfigError> {
    if let Some(ref config_path) = args.config {
        return EcsDiscoveryConfig::from_file(config_path);
    }

    let flags = [
        (KEY_CLUSTER, &args.cluster),
        (KEY_CLUSTER_NAME_REGEXP, &args.cluster_name_regexp),
        (KEY_SERVICE, &args.service),
        (KEY_SERVICE_NAME_REGEXP, &args.service_name_regexp),
        (KEY_PORTS, &args.ports),
        (KEY_CONTAINER_NAME_REGEXP, &args.container_name_regexp),
        (KEY_ACCESS_KEY, &args.access_key),
        (KEY_SECRET_KEY, &args.secret_key),
        (KEY_REGION, &args.region),
        (KEY_FAIL_FAST, &args.fail_fast),
    ];

    let props: HashMap<String, String> = flags
        .iter()
        .filter_map(|(key, value)| value.as_ref().map(|v| (key.to_string(), v.clone())))
        .collect();

    EcsDiscoveryConfig::from_properties(&props)
}

async fn build_discovery(
    args: &Args,
) -> Result<EcsDiscovery<HttpConnector>, Box<dyn std::error::Error>> {
    let config = build_config(args)?;

    let discovery = match args.endpoint {
        Some(ref endpoint) => {
            let connector = HttpConnector::new()?.with_endpoint(endpoint.clone());
            EcsDiscovery::new(config, connector, resolve_own_task_arn().await)
        }
        None => EcsDiscovery::from_env(config).await?,
    };
    Ok(discovery)
}

async fn cmd_discover(args: &Args) -> Result<(), Box<dyn std::error::Error>> {
    let discovery = build_discovery(args).await?;
    let peers = discovery.discover_nodes().await?;

    tracing::info!("{} peer address(es)", peers.len());
    for peer in peers {
        println!("{}", peer);
    }
    Ok(())
}

async fn cmd_watch(args: &Args, interval: u64) -> Result<(), Box<dyn std::error::Error>> {
    let discovery = build_discovery(args).await?;

    println!("HDDS ECS Discovery v{}", env!("CARGO_PKG_VERSION"));
    println!("=====================================");
    println!("{}", discovery.config());
    println!(
        "Own task: {}",
        discovery.own_task_arn().unwrap_or("unknown")
    );
    println!();
    println!("Press Ctrl+C to stop...");
    println!();

    let poller = EcsDiscoveryPoller::spawn(
        discovery,
        PollerConfig {
            poll_interval: Duration::from_secs(interval.max(1)),
        },
    );
    let handle = poller.handle();

    let printer = tokio::task::spawn_blocking(move || loop {
        match handle.wait(Duration::from_millis(500)) {
            Some(PollerEvent::Stopped) => break,
            Some(event) => print_event(&event),
            None if !handle.is_running() => break,
            None => {}
        }
    });

    tokio::signal::ctrl_c().await?;
    println!("\nShutting down...");

    // Drop joins the poller thread
    tokio::task::spawn_blocking(move || drop(poller)).await?;
    printer.await?;
    Ok(())
}

fn print_event(event: &PollerEvent) {
    match event {
        PollerEvent::Ready => println!("[ready]"),
        PollerEvent::PeerJoined { address } => println!("+ {}", address),
        PollerEvent::PeerLeft { address } => println!("- {}", address),
        PollerEvent::PeersUpdated { peers } => println!("= {} peer(s)", peers.len()),
        PollerEvent::Error { message } => eprintln!("! {}", message),
        PollerEvent::Stopped => println!("[stopped]"),
    }
}

fn cmd_gen_config(output: &Path) -> Result<(), Box<dyn std::error::Error>> {
    let props: HashMap<String, String> = [
        (KEY_CLUSTER_NAME_REGEXP, "prod-.*"),
        (KEY_SERVICE, "hdds-node"),
        (KEY_PORTS, "5701-5703"),
        (KEY_CONTAINER_NAME_REGEXP, "node"),
        (KEY_REGION, "eu-west-1"),
        (KEY_FAIL_FAST, "false"),
    ]
    .iter()
    .map(|(k, v)| (k.to_string(), v.to_string()))
    .collect();
    let config = EcsDiscoveryConfig::from_properties(&props)?;

    // Add comments
    let content = format!(
        r#"# HDDS ECS Discovery Configuration
# Generated by hdds-ecs-discovery gen-config
#
# Set both `cluster` and `service` for a single exact service; otherwise
# `*-name-regexp` patterns are matched against every cluster and service.
# Credentials default to the environment / ECS task role
# (`access-key` + `secret-key` to override).

{}"#,
        config.to_toml_string()
    );

    std::fs::write(output, content)?;
    println!("Generated configuration file: {}", output.display());
    Ok(())
}

fn cmd_validate(config_path: &Path) -> Result<(), Box<dyn std::error::Error>> {
    match EcsDiscoveryConfig::from_file(config_path) {
        Ok(config) => {
            println!("Configuration valid!");
            println!();
            println!("Selector:   {}", config.selector);
            println!("Containers: {}", config.container_filter);
            println!(
                "Ports:      {} ({} per interface)",
                config.ports,
                config.ports.count()
            );
            println!("Fail-fast:  {}", config.fail_fast);
            println!(
                "Region:     {}",
                config.region.as_deref().unwrap_or("<environment>")
            );
            Ok(())
        }
        Err(e) => {
            eprintln!("Configuration invalid: {}", e);
            std::process::exit(1);
        }
    }
}

async fn cmd_whoami() -> Result<(), Box<dyn std::error::Error>> {
    match resolve_own_task_arn().await {
        Some(arn) => println!("{}", arn),
        None => println!("unknown"),
    }
    Ok(())
}
