use crate::config::{LoggingConfig, MetricsConfig};
use metrics_exporter_statsd::StatsdBuilder;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::prelude::*;

#[derive(thiserror::Error, Debug)]
pub enum TelemetryError {
    #[error("could not build statsd recorder: {0}")]
    Statsd(String),
    #[error("could not install metrics recorder: {0}")]
    Recorder(String),
}

/// Installs the global subscriber. The returned guard flushes Sentry events on drop.
pub fn init_logging(logging: Option<&LoggingConfig>) -> Option<sentry::ClientInitGuard> {
    let guard = logging.map(|logging| {
        sentry::init((
            logging.sentry_dsn.as_str(),
            sentry::ClientOptions {
                release: sentry::release_name!(),
                environment: logging.environment.clone().map(Into::into),
                ..Default::default()
            },
        ))
    });

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .with(guard.is_some().then(sentry::integrations::tracing::layer))
        .init();

    guard
}

/// Installs the statsd exporter as the global metrics recorder when configured.
pub fn init_metrics(metrics: Option<&MetricsConfig>) -> Result<(), TelemetryError> {
    let Some(metrics) = metrics else {
        return Ok(());
    };

    let recorder = StatsdBuilder::from(metrics.statsd_host.as_str(), metrics.statsd_port)
        .build(Some(metrics.prefix.as_str()))
        .map_err(|e| TelemetryError::Statsd(e.to_string()))?;
    metrics::set_global_recorder(recorder).map_err(|e| TelemetryError::Recorder(e.to_string()))?;

    tracing::info!(
        host = %metrics.statsd_host,
        port = metrics.statsd_port,
        "statsd metrics enabled"
    );
    Ok(())
}
