//! Logging setup.
//!
//! JSON to stdout, plus the same JSON appended to
//! `~/.supervysor/logs/supervysor.log`. If the log file cannot be opened the
//! supervisor keeps running with stdout only.

use std::fs::File;
use std::sync::Mutex;

use tracing::{warn, Subscriber};
use tracing_subscriber::layer::{Layer, SubscriberExt};
use tracing_subscriber::registry::LookupSpan;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

use supervysor::config::{open_log_file, supervysor_dir};

/// Install the global subscriber.
pub fn init() {
    let file = supervysor_dir().and_then(|root| open_log_file(&root));
    let (file_layer, file_error) = match file {
        Ok(file) => (Some(file_layer(file)), None),
        Err(e) => (None, Some(e)),
    };

    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .with(fmt::layer().json())
        .with(file_layer)
        .init();

    if let Some(e) = file_error {
        warn!(error = %e, "Could not open log file, logging to stdout only");
    }
}

fn file_layer<S>(file: File) -> impl Layer<S>
where
    S: Subscriber + for<'a> LookupSpan<'a>,
{
    fmt::layer()
        .json()
        .with_ansi(false)
        .with_writer(Mutex::new(file))
}

#[cfg(test)]
mod tests {
    use std::fs;

    use supervysor::config::LOG_FILE;
    use tracing::info;

    use super::*;

    #[test]
    fn test_file_layer_writes_json_lines() {
        let dir = tempfile::tempdir().unwrap();
        let file = open_log_file(dir.path()).unwrap();

        let subscriber = tracing_subscriber::registry().with(file_layer(file));
        tracing::subscriber::with_default(subscriber, || {
            info!(pid = 7, "Node relaunched");
        });

        let written = fs::read_to_string(dir.path().join("logs").join(LOG_FILE)).unwrap();
        let line: serde_json::Value = serde_json::from_str(written.trim()).unwrap();
        assert_eq!(line["level"], "INFO");
        assert_eq!(line["fields"]["message"], "Node relaunched");
        assert_eq!(line["fields"]["pid"], 7);
    }
}
