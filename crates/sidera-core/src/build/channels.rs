//! Explicit message values for the dispatch and acknowledgement channels.
//!
//! The coordinator is the sole producer on the work channel and the sole
//! consumer on the result channel; workers are the mirror image. Sentinels
//! are ordinary enum variants rather than magic in-band values.

use crate::domain::ObservationId;
use crossbeam_channel::{unbounded, Receiver, Sender};

/// One order's worth of interpolation work for a single observation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WorkItem {
    pub observation: ObservationId,
    pub order: usize,
    /// Frame axis slot this observation accumulates into.
    pub frame_slot: usize,
}

/// Coordinator-to-worker messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkMessage {
    Task(WorkItem),
    /// Termination sentinel; one is sent per worker.
    Shutdown,
}

/// Per-task acknowledgement posted by a worker.
#[derive(Debug, Clone, PartialEq)]
pub struct OrderAck {
    pub observation: ObservationId,
    pub order: usize,
    /// Fraction of reference pixels this observation could not contribute to.
    pub rejection_fraction: f64,
}

/// Fatal sentinel payload: the posting worker hit an unrecoverable
/// condition and has already exited its loop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkerFailure {
    pub worker: usize,
    pub detail: String,
}

/// Worker-to-coordinator messages.
#[derive(Debug, Clone, PartialEq)]
pub enum ResultMessage {
    Ack(OrderAck),
    Fatal(WorkerFailure),
}

pub fn work_channel() -> (Sender<WorkMessage>, Receiver<WorkMessage>) {
    unbounded()
}

pub fn result_channel() -> (Sender<ResultMessage>, Receiver<ResultMessage>) {
    unbounded()
}
