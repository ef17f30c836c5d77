//! Bounded FIFO of remote ICE candidates that arrived before a remote
//! description was applied

use std::collections::VecDeque;

use crate::error::{CallError, Result};
use crate::signaling::IceCandidate;

/// Default queue capacity
pub const DEFAULT_CANDIDATE_QUEUE_CAPACITY: usize = 128;

#[derive(Debug)]
pub struct CandidateQueue {
    queue: VecDeque<IceCandidate>,
    capacity: usize,
}

impl CandidateQueue {
    pub fn new(capacity: usize) -> Self {
        Self {
            queue: VecDeque::new(),
            capacity,
        }
    }

    /// Append a candidate; fails when the queue is full
    pub fn push(&mut self, candidate: IceCandidate) -> Result<()> {
        if self.queue.len() >= self.capacity {
            return Err(CallError::Negotiation(format!(
                "Pending candidate queue full ({} entries)",
                self.capacity
            )));
        }
        self.queue.push_back(candidate);
        Ok(())
    }

    /// Take every queued candidate in arrival order
    pub fn drain(&mut self) -> Vec<IceCandidate> {
        self.queue.drain(..).collect()
    }

    /// Put a drained batch back at the head, ahead of anything queued since
    ///
    /// The batch came out of this queue, so capacity is not re-checked.
    pub fn requeue(&mut self, batch: Vec<IceCandidate>) {
        for candidate in batch.into_iter().rev() {
            self.queue.push_front(candidate);
        }
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

impl Default for CandidateQueue {
    fn default() -> Self {
        Self::new(DEFAULT_CANDIDATE_QUEUE_CAPACITY)
    }
}
