use std::sync::LazyLock;
use std::sync::atomic::{AtomicBool, Ordering};

use console::Term;
use tokio::sync::Notify;

/// Global shutdown flag for graceful termination.
static SHUTDOWN_REQUESTED: AtomicBool = AtomicBool::new(false);

static SHUTDOWN_NOTIFY: LazyLock<Notify> = LazyLock::new(Notify::new);

/// Check if shutdown has been requested.
#[inline]
pub(crate) fn is_shutdown_requested() -> bool {
    SHUTDOWN_REQUESTED.load(Ordering::Acquire)
}

/// Request shutdown.
fn request_shutdown() {
    SHUTDOWN_REQUESTED.store(true, Ordering::Release);
    SHUTDOWN_NOTIFY.notify_waiters();
}

/// Resolve once shutdown has been requested.
pub(crate) async fn wait_for_shutdown() {
    let notified = SHUTDOWN_NOTIFY.notified();
    if is_shutdown_requested() {
        return;
    }
    notified.await;
}

/// Set up the Ctrl+C handler for graceful shutdown.
///
/// The first Ctrl+C stops accepting work and lets queued stages drain; the
/// second exits immediately.
pub(crate) fn setup_shutdown_handler() {
    tokio::spawn(async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::warn!("Failed to install Ctrl+C handler: {}", e);
            return;
        }

        let is_tty = Term::stdout().is_term();
        if is_tty {
            eprintln!("\n\nShutdown requested, finishing queued stages...");
            eprintln!("Press Ctrl+C again to force quit.");
        } else {
            tracing::warn!("Shutdown requested, finishing queued stages");
        }

        request_shutdown();

        // Wait for second Ctrl+C for force quit
        if tokio::signal::ctrl_c().await.is_ok() {
            if is_tty {
                eprintln!("Force quit!");
            }
            std::process::exit(130);
        }
    });
}
