//! Tracing setup for the collection engine. `RUST_LOG` wins when set;
//! otherwise the configured level applies to the debtflow crates while
//! third-party crates stay at `warn`, keeping sync and dispatch spans
//! readable in production logs.

use crate::config::TelemetryConfig;
use std::fmt;
use tracing_subscriber::filter::ParseError;
use tracing_subscriber::EnvFilter;

#[derive(Debug)]
pub enum TelemetryError {
    Filter { directives: String, source: ParseError },
    Install(Box<dyn std::error::Error + Send + Sync>),
}

impl fmt::Display for TelemetryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TelemetryError::Filter { directives, .. } => {
                write!(f, "invalid log filter '{directives}': unable to build EnvFilter")
            }
            TelemetryError::Install(err) => {
                write!(f, "failed to install tracing subscriber: {err}")
            }
        }
    }
}

impl std::error::Error for TelemetryError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            TelemetryError::Filter { source, .. } => Some(source),
            TelemetryError::Install(err) => Some(&**err),
        }
    }
}

/// Expands a bare level like `info` into per-crate directives. A value that
/// already contains directives (commas or `=`) passes through untouched.
fn directives_for(level: &str) -> String {
    if level.contains(',') || level.contains('=') {
        level.to_string()
    } else {
        format!("warn,debtflow={level},debtflow_api={level}")
    }
}

pub fn init(config: &TelemetryConfig) -> Result<(), TelemetryError> {
    let directives = directives_for(&config.log_level);
    let env_filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => {
            EnvFilter::try_new(&directives).map_err(|source| TelemetryError::Filter {
                directives: directives.clone(),
                source,
            })?
        }
    };

    // Targets stay on so a log line places itself in the workflow
    // (reconciliation, notification, escalation) without extra fields.
    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(true)
        .compact()
        .with_ansi(false)
        .try_init()
        .map_err(TelemetryError::Install)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bare_level_expands_to_crate_directives() {
        assert_eq!(directives_for("debug"), "warn,debtflow=debug,debtflow_api=debug");
    }

    #[test]
    fn explicit_directives_pass_through() {
        assert_eq!(directives_for("info,hyper=off"), "info,hyper=off");
        assert_eq!(directives_for("debtflow=trace"), "debtflow=trace");
    }
}
