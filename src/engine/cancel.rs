//! Process-wide cancellation
//!
//! The inventory checks the signal before listing each project, a pending
//! console prompt declines once it trips, and the executor checks it before
//! each dispatch. In-flight work is never interrupted.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

#[derive(Debug, Clone, Default)]
pub struct CancelSignal(Arc<AtomicBool>);

impl CancelSignal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    /// Trip the signal on the first Ctrl-C
    pub fn install_ctrl_c(&self) {
        let signal = self.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::warn!("Interrupt received; finishing in-flight operations");
                eprintln!("\nInterrupted: waiting for in-flight operations to finish...");
                signal.cancel();
            }
        });
    }
}
