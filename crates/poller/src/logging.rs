//! Tracing subscriber setup: console output plus an optional log file.

use std::fs::{self, File, OpenOptions};
use std::path::Path;
use std::sync::Mutex;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Filter used when `RUST_LOG` is not set.
pub const DEFAULT_FILTER: &str =
    "printwatch_poller=info,printwatch_octoprint=info,printwatch_core=info";

/// Install the global subscriber.
///
/// When `log_file` is given, a second plain-text layer appends to it.
/// A file that cannot be opened is reported and logging continues on
/// the console only.
pub fn init(log_file: Option<&Path>) {
    let (file, file_error) = match log_file.map(open_log_file) {
        Some(Ok(file)) => (Some(file), None),
        Some(Err(e)) => (None, Some(e)),
        None => (None, None),
    };

    let file_layer = file.map(|file| {
        tracing_subscriber::fmt::layer()
            .with_ansi(false)
            .with_writer(Mutex::new(file))
    });

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| DEFAULT_FILTER.into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .with(file_layer)
        .init();

    if let (Some(path), Some(e)) = (log_file, file_error) {
        tracing::warn!(
            path = %path.display(),
            error = %e,
            "Cannot open log file, logging to console only",
        );
    }
}

fn open_log_file(path: &Path) -> std::io::Result<File> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }
    OpenOptions::new().create(true).append(true).open(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn log_file_parent_created() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("logs/poller.log");
        open_log_file(&path).unwrap();
        assert!(path.exists());
    }
}
