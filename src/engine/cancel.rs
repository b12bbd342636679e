use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::errors::AppError;

/// Hands out load tickets for one view. Starting a new load supersedes
/// every ticket issued before it.
#[derive(Debug, Clone, Default)]
pub struct LoadGate {
    current: Arc<AtomicU64>,
}

impl LoadGate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn begin(&self) -> LoadTicket {
        let generation = self.current.fetch_add(1, Ordering::SeqCst) + 1;
        LoadTicket { generation, current: Arc::clone(&self.current) }
    }

    /// Invalidate all outstanding tickets (the view was torn down).
    pub fn cancel(&self) {
        self.current.fetch_add(1, Ordering::SeqCst);
    }
}

/// Checked after every awaited round trip, before any state is written.
#[derive(Debug, Clone)]
pub struct LoadTicket {
    generation: u64,
    current: Arc<AtomicU64>,
}

impl LoadTicket {
    /// A ticket not tied to any view; never superseded.
    pub fn detached() -> Self {
        LoadGate::new().begin()
    }

    pub fn is_current(&self) -> bool {
        self.current.load(Ordering::SeqCst) == self.generation
    }

    pub fn ensure_current(&self) -> Result<(), AppError> {
        if self.is_current() {
            Ok(())
        } else {
            log::debug!("Dropping result of superseded load (generation {})", self.generation);
            Err(AppError::StaleLoad)
        }
    }
}
