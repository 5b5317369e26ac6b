//! Per-call state shared between the issuer and the completion path.
//!
//! A [`CallController`] is created fresh for each call and lives exactly as
//! long as it. Either side may mark it failed or canceled; the completion
//! path inspects both to decide how to surface the result. Cancellation is
//! advisory: it never aborts a request already on the wire.

use std::sync::{Arc, Mutex};

/// Callback fired when a call is canceled.
pub type CancelCallback = Box<dyn FnOnce() + Send + 'static>;

#[derive(Default)]
struct ControllerState {
    failed: bool,
    error_text: String,
    canceled: bool,
    on_cancel: Option<CancelCallback>,
}

/// Per-call control object.
///
/// `Clone` shares the underlying state; a controller is not reusable
/// across calls.
#[derive(Clone, Default)]
pub struct CallController {
    inner: Arc<Mutex<ControllerState>>,
}

impl CallController {
    /// Create a controller for a new call.
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark the call failed with a description. Later calls overwrite the
    /// text; the flag never clears.
    pub fn set_failed(&self, error_text: impl Into<String>) {
        let mut state = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        state.failed = true;
        state.error_text = error_text.into();
    }

    /// Whether the call has been marked failed.
    pub fn failed(&self) -> bool {
        self.inner.lock().unwrap_or_else(|e| e.into_inner()).failed
    }

    /// The failure description; empty unless `failed()`.
    pub fn error_text(&self) -> String {
        self.inner
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .error_text
            .clone()
    }

    /// Mark the call canceled and fire the notify callback, if one was
    /// registered. The callback fires at most once; repeated cancels are
    /// no-ops.
    pub fn start_cancel(&self) {
        let callback = {
            let mut state = self.inner.lock().unwrap_or_else(|e| e.into_inner());
            if state.canceled {
                return;
            }
            state.canceled = true;
            state.on_cancel.take()
        };

        // Fired outside the lock; the callback may touch this controller.
        if let Some(callback) = callback {
            callback();
        }
    }

    /// Whether the call has been canceled.
    pub fn is_canceled(&self) -> bool {
        self.inner
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .canceled
    }

    /// Register a callback fired when the call is canceled. If the call is
    /// already canceled, the callback fires immediately; otherwise it
    /// replaces any previously registered one.
    pub fn notify_on_cancel(&self, callback: impl FnOnce() + Send + 'static) {
        let fire_now = {
            let mut state = self.inner.lock().unwrap_or_else(|e| e.into_inner());
            if state.canceled {
                true
            } else {
                state.on_cancel = Some(Box::new(callback));
                return;
            }
        };

        if fire_now {
            callback();
        }
    }
}

impl std::fmt::Debug for CallController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        f.debug_struct("CallController")
            .field("failed", &state.failed)
            .field("error_text", &state.error_text)
            .field("canceled", &state.canceled)
            .finish()
    }
}
