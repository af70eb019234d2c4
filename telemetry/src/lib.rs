//! Tracing setup shared by cdc services and tests.
//!
//! Services call [`init_tracing`] once at startup and keep the returned [`LogFlusher`] alive
//! until exit. Tests call [`init_test_tracing`], which is idempotent and only installs a
//! subscriber when `ENABLE_TRACING` is set.

use std::sync::Once;

use config::environment::Environment;
use thiserror::Error;
use tracing::subscriber::SetGlobalDefaultError;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_log::log_tracer::LogTracer;
use tracing_subscriber::EnvFilter;

/// Filter applied when `RUST_LOG` is not set.
const DEFAULT_LOG_FILTER: &str = "info";

/// Environment variable enabling log output in tests.
const ENABLE_TRACING_ENV_NAME: &str = "ENABLE_TRACING";

/// Errors raised while installing the global subscriber.
#[derive(Debug, Error)]
pub enum TracingError {
    /// `APP_ENVIRONMENT` holds an unsupported value.
    #[error("failed to determine the environment: {0}")]
    Environment(#[from] std::io::Error),

    /// The `log` bridge could not be installed.
    #[error("failed to install the log bridge: {0}")]
    LogBridge(#[from] tracing_log::log::SetLoggerError),

    /// A global subscriber was already installed.
    #[error("failed to install the global subscriber: {0}")]
    Subscriber(#[from] SetGlobalDefaultError),
}

/// Flushes buffered log lines when dropped.
///
/// Logs are written by a background thread; dropping the flusher waits for pending lines.
#[must_use = "dropping the flusher stops log output"]
#[derive(Debug)]
pub struct LogFlusher {
    _guard: WorkerGuard,
}

/// Installs the global subscriber for a service.
///
/// Logs go to stdout through a non-blocking writer. Deployed environments emit JSON lines,
/// development emits human readable lines. The filter comes from `RUST_LOG` and defaults to
/// `info`. Records emitted through the `log` crate are forwarded to `tracing`.
pub fn init_tracing(app_name: &str, pipeline_id: Option<u64>) -> Result<LogFlusher, TracingError> {
    let environment = Environment::load()?;

    LogTracer::init()?;

    let (writer, guard) = tracing_appender::non_blocking(std::io::stdout());
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(writer)
        .with_target(true);

    if environment.is_deployed() {
        let subscriber = builder
            .json()
            .with_current_span(true)
            .flatten_event(true)
            .finish();
        tracing::subscriber::set_global_default(subscriber)?;
    } else {
        tracing::subscriber::set_global_default(builder.finish())?;
    }

    tracing::info!(
        app = app_name,
        pipeline_id,
        environment = %environment,
        "tracing initialized"
    );

    Ok(LogFlusher { _guard: guard })
}

/// Installs a test subscriber once per process when `ENABLE_TRACING` is set.
///
/// Output goes through the test writer so it is captured per test.
pub fn init_test_tracing() {
    static INIT: Once = Once::new();

    INIT.call_once(|| {
        if std::env::var(ENABLE_TRACING_ENV_NAME).is_err() {
            return;
        }

        let filter = EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new("cdc=debug,info"));

        let subscriber = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_test_writer()
            .finish();

        // Another test harness may already have installed a subscriber, which is fine.
        let _ = tracing::subscriber::set_global_default(subscriber);
    });
}
