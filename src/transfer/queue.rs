extern crate alloc;

use alloc::collections::VecDeque;
use core::sync::atomic::{AtomicU32, Ordering};

use kspin::SpinNoIrq;

use super::Request;
use crate::err::QueueFull;

/// Bounded FIFO between any number of submitters and the worker.
///
/// `pushes` advances after every successful push. A consumer that read it
/// before finding the queue empty can sleep on it with `Osa::wait_on`.
pub struct RequestQueue {
    inner: SpinNoIrq<VecDeque<Request>>,
    capacity: usize,
    pushes: AtomicU32,
}

impl RequestQueue {
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: SpinNoIrq::new(VecDeque::with_capacity(capacity)),
            capacity,
            pushes: AtomicU32::new(0),
        }
    }

    /// Appends `request`, handing it back if the queue is full.
    pub fn push(&self, request: Request) -> Result<(), (QueueFull, Request)> {
        let mut queue = self.inner.lock();
        if queue.len() >= self.capacity {
            return Err((QueueFull, request));
        }
        queue.push_back(request);
        drop(queue);
        self.pushes.fetch_add(1, Ordering::Release);
        Ok(())
    }

    pub fn pushes(&self) -> &AtomicU32 {
        &self.pushes
    }

    pub fn generation(&self) -> u32 {
        self.pushes.load(Ordering::Acquire)
    }

    pub fn pop(&self) -> Option<Request> {
        self.inner.lock().pop_front()
    }

    pub fn len(&self) -> usize {
        self.inner.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}
