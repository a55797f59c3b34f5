pub mod utils;

use std::path::Path;

use tracing::Level;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

use crate::state::{AppState, LOG_FILE_NAME};

/// Initialize logging, panic handler, and build info reporting.
///
/// Logs go to `warden.log` in the state directory so the terminal stays
/// free for output and prompts; before `init` has created the directory
/// they go to stderr. Returns a guard that must be kept alive for the
/// duration of the program.
pub fn init_logging(config_path: Option<&Path>, verbose: bool) -> WorkerGuard {
    use tracing_subscriber::fmt::format::FmtSpan;

    let level = if verbose { Level::DEBUG } else { Level::ERROR };
    let env_filter = EnvFilter::builder()
        .with_default_directive(level.into())
        .from_env_lossy();

    let log_dir = AppState::warden_dir(config_path.map(Path::to_path_buf))
        .ok()
        .filter(|dir| dir.is_dir());

    let guard = match log_dir {
        Some(dir) => {
            let file_appender = tracing_appender::rolling::never(dir, LOG_FILE_NAME);
            let (file_writer, guard) = tracing_appender::non_blocking(file_appender);

            let file_layer = tracing_subscriber::fmt::layer()
                .with_writer(file_writer)
                .with_ansi(false)
                .with_span_events(FmtSpan::CLOSE)
                .with_filter(env_filter);
            tracing_subscriber::registry().with(file_layer).init();
            guard
        }
        None => {
            let (stderr_writer, guard) = tracing_appender::non_blocking(std::io::stderr());

            let stderr_layer = tracing_subscriber::fmt::layer()
                .compact()
                .with_writer(stderr_writer)
                .with_filter(env_filter);
            tracing_subscriber::registry().with(stderr_layer).init();
            guard
        }
    };

    utils::register_panic_logger();
    utils::report_build_info();

    guard
}
