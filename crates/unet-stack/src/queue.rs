use std::collections::VecDeque;

use crate::frame::Frame;

/// How much of a queue's capacity a frame consumes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum QueuePolicy {
    /// Every frame costs 1.
    #[default]
    Unit,
    ByDataLength,
    /// Frames without a network view cost 0.
    ByNetViewLength,
    ByTransportViewLength,
}

impl QueuePolicy {
    pub fn cost(self, frame: &Frame) -> usize {
        match self {
            Self::Unit => 1,
            Self::ByDataLength => frame.len(),
            Self::ByNetViewLength => frame.net_range().map_or(0, |r| r.len()),
            Self::ByTransportViewLength => frame.transport_range().map_or(0, |r| r.len()),
        }
    }
}

/// A capacity-bounded FIFO of frames.
///
/// The cost of a frame is computed once when it is pushed and credited back when it leaves, so
/// mutating a queued frame never breaks the accounting.
#[derive(Debug)]
pub struct Queue {
    frames: VecDeque<Frame>,
    capacity: usize,
    remaining: usize,
    policy: QueuePolicy,
}

impl Queue {
    pub fn new(capacity: usize) -> Self {
        Self::with_policy(capacity, QueuePolicy::Unit)
    }

    /// A `capacity` of 0 is raised to 1.
    pub fn with_policy(capacity: usize, policy: QueuePolicy) -> Self {
        let capacity = capacity.max(1);
        Self {
            frames: VecDeque::new(),
            capacity,
            remaining: capacity,
            policy,
        }
    }

    pub fn policy(&self) -> QueuePolicy {
        self.policy
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn remaining(&self) -> usize {
        self.remaining
    }

    pub fn has_capacity(&self, cost: usize) -> bool {
        self.remaining >= cost
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    /// Append `frame`, or hand it back if its cost exceeds the remaining capacity.
    pub fn push(&mut self, mut frame: Frame) -> Result<(), Frame> {
        let cost = self.policy.cost(&frame);
        if cost > self.remaining {
            return Err(frame);
        }
        self.remaining -= cost;
        frame.cost = cost;
        self.frames.push_back(frame);
        Ok(())
    }

    pub fn pop(&mut self) -> Option<Frame> {
        let frame = self.frames.pop_front()?;
        self.remaining += frame.cost;
        Some(frame)
    }

    pub fn peek(&self) -> Option<&Frame> {
        self.frames.front()
    }

    pub fn peek_mut(&mut self) -> Option<&mut Frame> {
        self.frames.front_mut()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Frame> {
        self.frames.iter()
    }

    /// Visit every queued frame exactly once, in order. Frames `f` returns are kept (in their
    /// original relative order); frames it consumes leave the queue.
    pub fn scan(&mut self, mut f: impl FnMut(Frame) -> Option<Frame>) {
        for _ in 0..self.frames.len() {
            let Some(frame) = self.frames.pop_front() else {
                break;
            };
            let cost = frame.cost;
            self.remaining += cost;
            if let Some(mut kept) = f(frame) {
                kept.cost = cost;
                self.remaining -= cost;
                self.frames.push_back(kept);
            }
        }
    }

    pub fn clear(&mut self) {
        self.frames.clear();
        self.remaining = self.capacity;
    }
}
