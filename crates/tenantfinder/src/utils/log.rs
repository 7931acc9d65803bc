use crate::Result;
use std::io;
use std::path::Path;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::fmt::{format::FmtSpan, layer};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::EnvFilter;

/// Logs go to stderr, stdout is reserved for results. `default_filter` applies
/// when `RUST_LOG` is not set. With `save_logs_file` they are also written to
/// `<output_dir>/<filename>.log`.
pub fn init_tracing_subscriber(
    default_filter: &str,
    color: bool,
    save_logs_file: bool,
    output_dir: &Path,
    filename: &str,
) -> Result<()> {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));

    let stderr_layer = layer()
        .with_span_events(FmtSpan::CLOSE)
        .with_ansi(color)
        .with_target(false)
        .with_writer(io::stderr);

    // no colors in the file
    let file_layer = save_logs_file.then(|| {
        let appender =
            RollingFileAppender::new(Rotation::NEVER, output_dir, format!("{filename}.log"));
        layer()
            .with_span_events(FmtSpan::CLOSE)
            .with_ansi(false)
            .with_target(false)
            .with_writer(appender)
    });

    let subscriber = tracing_subscriber::registry()
        .with(filter)
        .with(stderr_layer)
        .with(file_layer);
    tracing::subscriber::set_global_default(subscriber)?;

    Ok(())
}
