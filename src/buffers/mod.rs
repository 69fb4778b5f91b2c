//! Pre-allocated request buffers.
//!
//! # Responsibilities
//! - Allocate a fixed number of fixed-size buffers up front
//! - Hand buffers to listeners for the duration of one request
//! - Report allocated/free counters for the leak audit
//!
//! # Design Decisions
//! - Buffers are returned by `Drop` on [`PooledBuffer`], so an early return
//!   or a panic in a handler cannot lose one
//! - The pool grows on demand; growth is visible in `allocated`
//! - A buffer that grew past `buffer_size` while on loan is freed on return,
//!   never pooled
//! - After `release()` the pool hands out nothing and returned buffers are freed;
//!   `allocated` counts live buffers, so it falls to zero once all are back

use std::ops::{Deref, DerefMut};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use thiserror::Error;

use crate::config::InternalConfig;
use crate::lifecycle::audit::{BufferStats, ResourceAccounting};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum BufferPoolError {
    #[error("buffer size must be greater than zero")]
    ZeroSize,

    #[error("buffer pool has been released")]
    Released,
}

/// Shared pool of byte buffers.
#[derive(Debug)]
pub struct BufferPool {
    buffer_size: usize,
    free: Mutex<Vec<Vec<u8>>>,
    allocated: AtomicUsize,
    released: AtomicBool,
}

impl BufferPool {
    /// Open a pool with `preallocated_buffers` buffers of `buffer_size` bytes.
    pub fn open(config: &InternalConfig) -> Result<Arc<Self>, BufferPoolError> {
        if config.buffer_size == 0 {
            return Err(BufferPoolError::ZeroSize);
        }

        let free = (0..config.preallocated_buffers)
            .map(|_| Vec::with_capacity(config.buffer_size))
            .collect::<Vec<_>>();

        tracing::info!(
            buffers = config.preallocated_buffers,
            buffer_size = config.buffer_size,
            "Buffer pool opened"
        );

        Ok(Arc::new(Self {
            buffer_size: config.buffer_size,
            allocated: AtomicUsize::new(free.len()),
            free: Mutex::new(free),
            released: AtomicBool::new(false),
        }))
    }

    /// Take a buffer for the duration of one request.
    pub fn acquire(self: &Arc<Self>) -> Result<PooledBuffer, BufferPoolError> {
        if self.released.load(Ordering::Acquire) {
            return Err(BufferPoolError::Released);
        }

        let reused = self.free_list().pop();
        let buf = match reused {
            Some(buf) => buf,
            None => {
                self.allocated.fetch_add(1, Ordering::SeqCst);
                tracing::debug!("Buffer pool exhausted, allocating");
                Vec::with_capacity(self.buffer_size)
            }
        };

        Ok(PooledBuffer {
            buf,
            pool: Arc::clone(self),
        })
    }

    pub fn buffer_size(&self) -> usize {
        self.buffer_size
    }

    /// Free every pooled buffer. Idempotent.
    pub fn release(&self) {
        if self.released.swap(true, Ordering::AcqRel) {
            return;
        }
        let mut free = self.free_list();
        let freed = std::mem::take(&mut *free).len();
        self.allocated.fetch_sub(freed, Ordering::SeqCst);
        drop(free);
        tracing::info!(freed, "Buffer pool released");
    }

    pub fn is_released(&self) -> bool {
        self.released.load(Ordering::Acquire)
    }

    fn free_list(&self) -> std::sync::MutexGuard<'_, Vec<Vec<u8>>> {
        self.free.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn give_back(&self, mut buf: Vec<u8>) {
        if self.released.load(Ordering::Acquire) || buf.capacity() > self.buffer_size {
            self.allocated.fetch_sub(1, Ordering::SeqCst);
            tracing::trace!(capacity = buf.capacity(), "Freeing returned buffer");
            return;
        }
        buf.clear();
        self.free_list().push(buf);
    }
}

impl BufferStats for BufferPool {
    fn stats(&self) -> ResourceAccounting {
        // Lock first so a concurrent grow-then-return cannot be half counted.
        let free = self.free_list();
        ResourceAccounting {
            allocated: self.allocated.load(Ordering::SeqCst),
            free: free.len(),
        }
    }
}

/// A buffer on loan from a [`BufferPool`], returned on drop.
#[derive(Debug)]
pub struct PooledBuffer {
    buf: Vec<u8>,
    pool: Arc<BufferPool>,
}

impl Deref for PooledBuffer {
    type Target = Vec<u8>;

    fn deref(&self) -> &Self::Target {
        &self.buf
    }
}

impl DerefMut for PooledBuffer {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.buf
    }
}

impl Drop for PooledBuffer {
    fn drop(&mut self) {
        self.pool.give_back(std::mem::take(&mut self.buf));
    }
}
