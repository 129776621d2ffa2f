//! Process-wide stop signal.
//!
//! The sampler runs on a dedicated OS thread and polls the atomic flag once per tick;
//! the reporter and the query server are tokio tasks and await the watch channel. Both
//! views flip together in [`Shutdown::trigger`], which is what the `stop` query and
//! the signal watcher call.

use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::info;

/// Cloneable handle to the shared stop flag.
#[derive(Clone, Debug)]
pub struct Shutdown {
    flag: Arc<AtomicBool>,
    notify: Arc<watch::Sender<bool>>,
}

impl Shutdown {
    /// New, untriggered signal.
    pub fn new() -> Self {
        let (notify, _) = watch::channel(false);
        Self {
            flag: Arc::new(AtomicBool::new(false)),
            notify: Arc::new(notify),
        }
    }

    /// Request shutdown. Calling it more than once is a no-op.
    pub fn trigger(&self) {
        if !self.flag.swap(true, Ordering::SeqCst) {
            tracing::info!("Shutdown requested");
        }
        self.notify.send_replace(true);
    }

    /// Non-blocking check, used by the sampler thread.
    pub fn is_triggered(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }

    /// Resolve once shutdown has been requested.
    pub async fn wait(&self) {
        let mut rx = self.notify.subscribe();
        // The sender lives as long as `self`, so this only returns once triggered.
        let _ = rx.wait_for(|stopped| *stopped).await;
    }

    /// Trigger on SIGINT or SIGTERM.
    ///
    /// The handlers are registered before this returns. The watcher task ends after
    /// the first signal, or quietly once shutdown was requested some other way.
    #[cfg(unix)]
    pub fn watch_signals(&self) -> io::Result<JoinHandle<()>> {
        use tokio::signal::unix::{signal, SignalKind};

        let mut interrupt = signal(SignalKind::interrupt())?;
        let mut terminate = signal(SignalKind::terminate())?;
        let shutdown = self.clone();
        Ok(tokio::spawn(async move {
            tokio::select! {
                _ = interrupt.recv() => info!("Interrupt received"),
                _ = terminate.recv() => info!("Termination requested"),
                _ = shutdown.wait() => return,
            }
            shutdown.trigger();
        }))
    }

    /// Trigger on Ctrl-C.
    #[cfg(not(unix))]
    pub fn watch_signals(&self) -> io::Result<JoinHandle<()>> {
        let shutdown = self.clone();
        Ok(tokio::spawn(async move {
            tokio::select! {
                result = tokio::signal::ctrl_c() => match result {
                    Ok(()) => info!("Interrupt received"),
                    Err(e) => {
                        tracing::error!(error = %e, "Unable to listen for Ctrl-C");
                        return;
                    }
                },
                _ = shutdown.wait() => return,
            }
            shutdown.trigger();
        }))
    }
}

impl Default for Shutdown {
    fn default() -> Self {
        Self::new()
    }
}
