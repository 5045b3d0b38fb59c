// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

#![cfg_attr(not(test), deny(clippy::panic))]
#![cfg_attr(not(test), deny(clippy::unwrap_used))]
#![cfg_attr(not(test), deny(clippy::expect_used))]
#![cfg_attr(not(test), deny(clippy::todo))]
#![cfg_attr(not(test), deny(clippy::unimplemented))]

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use tracing_subscriber::{fmt, layer::SubscriberExt, reload, util::SubscriberInitExt};

use logtail::{
    agent::LogsAgent,
    config::{
        env::EnvConfigSource, log_level::LogLevel, yaml::YamlConfigSource, Config, ConfigBuilder,
    },
    credentials::{CredentialResolver, JwtClaimsResolver, DEFAULT_IDENTITY_CLAIM},
    delivery::{
        record::{DEFAULT_CONTENT_FIELD, DEFAULT_IDENTITY_FIELD, DEFAULT_SOURCE_FIELD},
        BatchCoordinator, RecordTemplate,
    },
    error::{AgentError, ConfigError},
    logger::{env_filter, Formatter},
    sink::{RestSink, RestSinkConfig},
    sources::SourceSpec,
};

/// Tails files or standard input and ships every new line to a remote table.
#[derive(Debug, Parser)]
#[command(name = "logtail-agent", version)]
struct Args {
    /// Access token; its identity claim is attached to every record.
    #[arg(long, env = "LOGTAIL_TOKEN", hide_env_values = true)]
    token: String,

    /// Base URL of the table API, e.g. https://db.example.com/rest/v1
    #[arg(long, env = "LOGTAIL_ENDPOINT")]
    endpoint: String,

    #[arg(long, env = "LOGTAIL_API_KEY", hide_env_values = true)]
    api_key: Option<String>,

    /// Destination table.
    #[arg(long, env = "LOGTAIL_TABLE")]
    table: String,

    #[arg(long, env = "LOGTAIL_FOREIGN_KEY_FIELD")]
    foreign_key_field: String,

    #[arg(long, env = "LOGTAIL_FOREIGN_KEY_VALUE")]
    foreign_key_value: String,

    #[arg(long, env = "LOGTAIL_IDENTITY_FIELD", default_value = DEFAULT_IDENTITY_FIELD)]
    identity_field: String,

    #[arg(long, env = "LOGTAIL_CONTENT_FIELD", default_value = DEFAULT_CONTENT_FIELD)]
    content_field: String,

    #[arg(long, env = "LOGTAIL_SOURCE_FIELD", default_value = DEFAULT_SOURCE_FIELD)]
    source_field: String,

    /// Token claim holding the identity.
    #[arg(long, env = "LOGTAIL_IDENTITY_CLAIM", default_value = DEFAULT_IDENTITY_CLAIM)]
    identity_claim: String,

    /// Optional YAML file with tuning settings.
    #[arg(long, env = "LOGTAIL_CONFIG")]
    config: Option<PathBuf>,

    #[arg(long, env = "LOGTAIL_LOG_LEVEL")]
    log_level: Option<LogLevel>,

    /// `-` for stdin, or `[format:]path`, where path may be a glob and
    /// format is `plain` (default) or `docker`.
    #[arg(required = true, value_name = "SOURCE")]
    sources: Vec<String>,
}

impl Args {
    fn validate(&self) -> Result<(), ConfigError> {
        let required = [
            ("endpoint", &self.endpoint),
            ("table", &self.table),
            ("foreign-key-field", &self.foreign_key_field),
            ("foreign-key-value", &self.foreign_key_value),
            ("identity-field", &self.identity_field),
            ("content-field", &self.content_field),
            ("source-field", &self.source_field),
        ];
        for (name, value) in required {
            if value.trim().is_empty() {
                return Err(ConfigError::Missing(name));
            }
        }
        Ok(())
    }
}

#[tokio::main]
pub async fn main() -> ExitCode {
    let args = Args::parse();

    let (filter, filter_handle) =
        reload::Layer::new(env_filter(args.log_level.unwrap_or_default()));
    tracing_subscriber::registry()
        .with(filter)
        .with(
            fmt::layer()
                .event_format(Formatter)
                .with_writer(std::io::stderr),
        )
        .init();

    debug!("Logging subsystem enabled");

    let config = match load_config(&args) {
        Ok(config) => config,
        Err(e) => {
            error!("{e}");
            return ExitCode::FAILURE;
        }
    };
    if let Err(e) = filter_handle.reload(env_filter(config.log_level)) {
        warn!("Failed to apply log level {:?}: {e}", config.log_level);
    }

    match run(args, config).await {
        Ok(code) => code,
        Err(e) => {
            error!("{e}");
            ExitCode::FAILURE
        }
    }
}

fn load_config(args: &Args) -> Result<Config, ConfigError> {
    args.validate()?;

    let mut builder = ConfigBuilder::default();
    if let Some(path) = &args.config {
        builder = builder.add_source(Box::new(YamlConfigSource { path: path.clone() }));
    }
    let mut config = builder.add_source(Box::new(EnvConfigSource)).build()?;

    if let Some(level) = args.log_level {
        config.log_level = level;
    }
    Ok(config)
}

async fn run(args: Args, config: Config) -> Result<ExitCode, AgentError> {
    let sources = args
        .sources
        .iter()
        .map(|source| SourceSpec::parse(source))
        .collect::<Result<Vec<_>, _>>()?;

    let credentials = JwtClaimsResolver::new(&args.identity_claim).resolve(&args.token)?;
    debug!("Shipping as {}", credentials.identity);

    let sink = RestSink::new(RestSinkConfig {
        endpoint: args.endpoint,
        token: args.token,
        api_key: args.api_key,
        timeout: config.request_timeout(),
    })?;

    let template = RecordTemplate::new(
        credentials.identity,
        args.foreign_key_field,
        args.foreign_key_value,
    )
    .with_identity_field(args.identity_field)
    .with_content_field(args.content_field)
    .with_source_field(args.source_field);

    let coordinator =
        BatchCoordinator::new(config.delivery(args.table), Arc::new(sink), template);
    let mut agent = LogsAgent::start(&sources, &config, coordinator.clone())?;

    tokio::spawn(shutdown_on_signal(agent.cancel_token()));

    let ready = agent.ready();
    let count = sources.len();
    tokio::spawn(async move {
        ready.await;
        info!("Initial scan complete, shipping {count} source(s)");
    });
    agent.spin().await;

    let stats = coordinator.stats();
    info!(
        "Delivered {} records in {} batches, dropped {} records",
        stats.records_delivered, stats.batches_delivered, stats.records_dropped
    );

    if coordinator.shutdown_token().is_cancelled() {
        return Ok(ExitCode::FAILURE);
    }
    Ok(ExitCode::SUCCESS)
}

async fn shutdown_on_signal(cancel: CancellationToken) {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        let mut terminate = match signal(SignalKind::terminate()) {
            Ok(terminate) => terminate,
            Err(e) => {
                warn!("Failed to listen for SIGTERM: {e}");
                if tokio::signal::ctrl_c().await.is_ok() {
                    cancel.cancel();
                }
                return;
            }
        };
        tokio::select! {
            _ = tokio::signal::ctrl_c() => info!("Received SIGINT, shutting down"),
            _ = terminate.recv() => info!("Received SIGTERM, shutting down"),
        }
    }
    #[cfg(not(unix))]
    {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Received Ctrl-C, shutting down");
        }
    }
    cancel.cancel();
}
