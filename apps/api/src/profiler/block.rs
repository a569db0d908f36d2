//! Scoped timed blocks. A block records exactly one entry when it is dropped,
//! whether the wrapped code returned normally, bailed out with `?`, or panicked.

use std::future::Future;

use crate::profiler::session::{now, BlockTicket};
use crate::profiler::{current_handle, SessionHandle};

/// Guard returned by [`time_block`]. Inert when no session is active.
#[must_use = "the block is recorded when this guard is dropped"]
pub struct TimedBlock {
    recording: Option<Recording>,
}

struct Recording {
    session: SessionHandle,
    ticket: BlockTicket,
    name: String,
    details: String,
    start: f64,
}

/// Enters a block against the session bound to the current task.
pub fn time_block(name: impl Into<String>) -> TimedBlock {
    let Some(session) = current_handle() else {
        return TimedBlock { recording: None };
    };

    let name = name.into();
    let ticket = match session.lock() {
        Ok(mut guard) => guard.open_block(&name, None),
        Err(_) => return TimedBlock { recording: None },
    };

    TimedBlock {
        recording: Some(Recording {
            session,
            ticket,
            name,
            details: String::new(),
            start: now(),
        }),
    }
}

/// Runs `fut` inside a block named `name`.
pub async fn timed<F: Future>(name: impl Into<String>, fut: F) -> F::Output {
    let _block = time_block(name);
    fut.await
}

impl TimedBlock {
    /// Overrides the display parent label. Structural nesting is unaffected.
    pub fn with_parent(mut self, parent: impl Into<String>) -> Self {
        if let Some(recording) = self.recording.as_mut() {
            recording.ticket.parent = parent.into();
        }
        self
    }

    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        if let Some(recording) = self.recording.as_mut() {
            recording.details = details.into();
        }
        self
    }

    #[cfg(test)]
    pub fn is_recording(&self) -> bool {
        self.recording.is_some()
    }
}

impl Drop for TimedBlock {
    fn drop(&mut self) {
        let Some(recording) = self.recording.take() else {
            return;
        };
        let end = now();
        if let Ok(mut session) = recording.session.lock() {
            session.close_block(
                recording.ticket,
                recording.name,
                recording.start,
                end,
                recording.details,
            );
        };
    }
}
