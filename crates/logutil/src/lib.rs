//! Utilities for logging.

use std::io;
use std::sync::Once;

use tracing::Level;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt::MakeWriter;

/// Output format for the global logger.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    #[default]
    HumanReadable,
    Json,
    Compact,
}

static GLOBAL_INIT: Once = Once::new();

/// Configure the global logger.
///
/// `level` is the default verbosity, `RUST_LOG` directives take precedence
/// over it. Only the first call installs a subscriber, later calls are
/// no-ops.
pub fn configure_global_logger<W>(level: Level, format: LogFormat, writer: W)
where
    W: for<'w> MakeWriter<'w> + Send + Sync + 'static,
{
    GLOBAL_INIT.call_once(|| {
        let env_filter = EnvFilter::builder()
            .with_default_directive(level.into())
            .from_env_lossy();

        let builder = tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .with_writer(writer)
            .with_thread_ids(true);

        // Errors here mean some other subscriber was already installed by the
        // embedding application, which is fine.
        let _ = match format {
            LogFormat::HumanReadable => builder.try_init(),
            LogFormat::Json => builder.json().try_init(),
            LogFormat::Compact => builder.compact().try_init(),
        };
    });
}

/// Configure the global logger writing to stderr.
pub fn configure_stderr_logger(level: Level, format: LogFormat) {
    configure_global_logger(level, format, io::stderr)
}

/// Initialize a logger for tests.
///
/// Output is captured by the test harness. Safe to call from any number of
/// tests.
pub fn init_test() {
    let env_filter = EnvFilter::builder()
        .with_default_directive(Level::DEBUG.into())
        .from_env_lossy();

    let _ = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_test_writer()
        .with_file(true)
        .with_line_number(true)
        .try_init();
}
