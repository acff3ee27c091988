//! Leveled logging for machine execution.
//!
//! Each machine carries a [`Logger`] tagged with an identifier (typically
//! the AT's account address) so that interleaved output from independent
//! machines stays attributable. The `Echo` level exists for the ECHO
//! function code, which lets on-chain programs emit diagnostics.

use std::fmt::Display;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;

/// Log level for filtering messages.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Level {
    /// Per-opcode execution traces.
    Debug = 1,
    /// Output of the ECHO function code.
    Echo = 2,
    Error = 3,
}

impl Display for Level {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Level::Debug => write!(f, "DEBUG"),
            Level::Echo => write!(f, "ECHO"),
            Level::Error => write!(f, "ERROR"),
        }
    }
}

static LOG_LEVEL: AtomicU8 = AtomicU8::new(Level::Error as u8);

/// Sets the global minimum level; messages below it are dropped.
pub fn init(level: Level) {
    LOG_LEVEL.store(level as u8, Ordering::Relaxed);
}

#[inline]
fn enabled(level: Level) -> bool {
    level as u8 >= LOG_LEVEL.load(Ordering::Relaxed)
}

fn emit(level: Level, id: &str, message: &str) {
    if !enabled(level) {
        return;
    }
    let now = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default();
    let secs = now.as_secs();
    eprintln!(
        "{:02}:{:02}:{:02}.{:03} [{:5}] [{}] {}",
        (secs / 3600) % 24,
        (secs / 60) % 60,
        secs % 60,
        now.subsec_millis(),
        level,
        id,
        message
    );
}

/// Cheaply cloneable logger carrying an identifier prefix.
#[derive(Clone, Debug)]
pub struct Logger {
    id: Arc<str>,
}

impl Logger {
    /// Creates a logger with the given identifier.
    pub fn new(id: impl Into<Arc<str>>) -> Self {
        Self { id: id.into() }
    }

    pub fn debug(&self, message: &str) {
        emit(Level::Debug, &self.id, message);
    }

    /// Logs ECHO output from a running program.
    pub fn echo(&self, message: &str) {
        emit(Level::Echo, &self.id, message);
    }

    pub fn error(&self, message: &str) {
        emit(Level::Error, &self.id, message);
    }

    /// Returns true when `debug` output is currently emitted, letting hot
    /// paths skip message formatting.
    pub fn debug_enabled(&self) -> bool {
        enabled(Level::Debug)
    }
}
