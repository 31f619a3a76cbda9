//! Purpose: Recycle decoded value records to amortize allocation under
//! high query volume.
//! Exports: `ValuePool`, `VALUE_POOL`, `MAX_DECODE_VALUES`.
//! Role: Optimization layered over the deterministic release of foreign
//! buffers; correctness never depends on pool return.
//! Invariants: Acquired instances are fully overwritten by the decoder
//! before they become visible; retention is capped.
use std::sync::Mutex;

use crate::core::value::Value;

/// Upper bound on values retained for reuse. Instances released beyond the
/// cap are simply dropped.
const MAX_POOLED: usize = 64 * 1024;

/// Sanity cap on the number of records a single decode may claim. A cube
/// exceeding this indicates a corrupt or hostile size field, reported as
/// `ErrorKind::Pool` before any allocation happens.
pub const MAX_DECODE_VALUES: usize = 1 << 24;

pub struct ValuePool {
    stack: Mutex<Vec<Value>>,
}

impl ValuePool {
    pub const fn new() -> Self {
        Self {
            stack: Mutex::new(Vec::new()),
        }
    }

    /// Pop a recycled instance, or allocate a fresh null value.
    pub fn acquire(&self) -> Value {
        self.lock().pop().unwrap_or_default()
    }

    pub fn release(&self, value: Value) {
        let mut stack = self.lock();
        if stack.len() < MAX_POOLED {
            stack.push(value);
        }
    }

    /// Return a whole batch, honoring the retention cap.
    pub fn release_all(&self, values: &mut Vec<Value>) {
        let mut stack = self.lock();
        for value in values.drain(..) {
            if stack.len() >= MAX_POOLED {
                break;
            }
            stack.push(value);
        }
        values.clear();
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<Value>> {
        match self.stack.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.lock().len()
    }
}

pub static VALUE_POOL: ValuePool = ValuePool::new();
