//! Exception channel - one pending exception, drained by the caller

use crate::registry::ExceptionRef;
use parking_lot::Mutex;

/// Single pending-exception slot
///
/// Setting while occupied overwrites the previous value.
#[derive(Debug, Default)]
pub struct ExceptionSlot {
    pending: Mutex<Option<ExceptionRef>>,
}

impl ExceptionSlot {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store `exception`, returning whatever it replaced
    pub fn set(&self, exception: ExceptionRef) -> Option<ExceptionRef> {
        self.pending.lock().replace(exception)
    }

    pub fn take(&self) -> Option<ExceptionRef> {
        self.pending.lock().take()
    }

    pub fn peek(&self) -> Option<ExceptionRef> {
        *self.pending.lock()
    }
}
