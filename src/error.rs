use crate::types::SensorCaps;
use std::sync::Mutex;

/// Errors that can occur when driving an HMD session.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum HmdError {
    #[error("runtime is not initialized")]
    NotInitialized,

    #[error("runtime is already initialized")]
    AlreadyInitialized,

    #[error("invalid or destroyed HMD handle")]
    InvalidHandle,

    #[error("device index {index} out of range ({detected} detected)")]
    IndexOutOfRange { index: usize, detected: usize },

    #[error("device index {0} is already bound to a session")]
    AlreadyBound(usize),

    #[error("required sensor capabilities not available: {0:?}")]
    UnsupportedRequired(SensorCaps),

    #[error("frame protocol violation: {0}")]
    ProtocolViolation(&'static str),

    #[error("tracking hardware disconnected")]
    Disconnected,

    #[error("operation not supported on this hardware")]
    Unsupported,
}

/// Thread-safe last-error storage, kept globally and per session.
///
/// Construction-time failures record their message here so callers in a
/// real-time loop can query the reason without unwinding.
pub(crate) struct LastError {
    message: Mutex<String>,
}

impl LastError {
    pub const fn new() -> Self {
        Self {
            message: Mutex::new(String::new()),
        }
    }

    pub fn set(&self, err: &HmdError) {
        if let Ok(mut msg) = self.message.lock() {
            *msg = err.to_string();
        }
    }

    /// Returns the last recorded error message, or an empty string.
    pub fn get(&self) -> String {
        match self.message.lock() {
            Ok(msg) => msg.clone(),
            Err(_) => String::new(),
        }
    }

    pub fn clear(&self) {
        if let Ok(mut msg) = self.message.lock() {
            msg.clear();
        }
    }
}
