use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Spawns a task that cancels `token` on Ctrl-C.
///
/// The running workflow notices at its next remote call and aborts
/// without committing.
pub fn cancel_on_interrupt(token: CancellationToken) -> JoinHandle<()> {
    tokio::spawn(async move {
        tokio::select! {
            result = tokio::signal::ctrl_c() => {
                if let Err(e) = result {
                    tracing::error!("failed to listen for Ctrl-C: {}", e);
                    return;
                }
                tracing::debug!("interrupted, cancelling the running command");
                eprintln!("Cancelling...");
                token.cancel();
            }
            _ = token.cancelled() => {}
        }
    })
}

/// Registers a panic hook that logs panics using the `tracing` crate
pub fn register_panic_logger() {
    std::panic::set_hook(Box::new(|panic| {
        eprintln!("warden crashed: {}", panic);
        log_panic(panic);
    }));
}

fn log_panic(panic: &std::panic::PanicHookInfo<'_>) {
    match panic.location() {
        Some(loc) => {
            tracing::error!(
                message = %panic,
                panic.file = loc.file(),
                panic.line = loc.line(),
                panic.column = loc.column(),
            );
        }
        None => tracing::error!(message = %panic),
    }
}

pub fn report_build_info() {
    let build = common::build_info!();

    tracing::info!(
        build_profile = ?build.build_profile,
        features = ?build.build_features,
        version = ?build.version,
        "warden starting up"
    );
}
