//! The `Logger` interface the core consumes. The dispatcher and
//! pruner report unused-rule diagnostics through it; these are purely
//! informational and never fail a run.

use log::{error, info, warn};

pub trait Logger {
    fn info(&self, message: &str);
    fn warn(&self, message: &str);
    fn error(&self, message: &str);
}

/// Routes through the `log` crate at the matching level, the way callers
/// already configure logging (`env_logger`, etc.) for the rest of their
/// toolchain.
#[derive(Clone, Copy, Debug, Default)]
pub struct EnvLogger;

impl Logger for EnvLogger {
    fn info(&self, message: &str) {
        info!("{message}");
    }

    fn warn(&self, message: &str) {
        warn!("{message}");
    }

    fn error(&self, message: &str) {
        error!("{message}");
    }
}

/// An in-memory `Logger` for tests that need to assert on emitted
/// diagnostics rather than capture `log`'s global output.
#[derive(Default)]
pub struct RecordingLogger {
    pub infos: std::cell::RefCell<Vec<String>>,
    pub warns: std::cell::RefCell<Vec<String>>,
    pub errors: std::cell::RefCell<Vec<String>>,
}

impl Logger for RecordingLogger {
    fn info(&self, message: &str) {
        self.infos.borrow_mut().push(message.to_string());
    }

    fn warn(&self, message: &str) {
        self.warns.borrow_mut().push(message.to_string());
    }

    fn error(&self, message: &str) {
        self.errors.borrow_mut().push(message.to_string());
    }
}
