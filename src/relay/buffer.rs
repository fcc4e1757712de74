//! Shared pool of backend read buffers.
//!
//! A pool is most useful with a modest volume of writes across a large number
//! of sessions. Use one pool per distinct write buffer size.

use std::sync::{Arc, Mutex, PoisonError};

use bytes::BytesMut;

/// A thread-safe pool of reusable `BytesMut` buffers.
#[derive(Debug, Clone)]
pub struct BufferPool {
    inner: Arc<BufferPoolInner>,
}

#[derive(Debug)]
struct BufferPoolInner {
    buffers: Mutex<Vec<BytesMut>>,
    buffer_size: usize,
    max_pooled: usize,
}

impl BufferPool {
    /// Create a pool handing out buffers of `buffer_size` bytes, keeping at most `max_pooled` idle.
    pub fn new(buffer_size: usize, max_pooled: usize) -> Self {
        Self {
            inner: Arc::new(BufferPoolInner {
                buffers: Mutex::new(Vec::with_capacity(max_pooled)),
                buffer_size,
                max_pooled,
            }),
        }
    }

    /// Get a zeroed buffer of `buffer_size` bytes, reusing an idle one if possible.
    pub fn acquire(&self) -> BytesMut {
        let reused = self
            .inner
            .buffers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pop();
        let mut buf = reused.unwrap_or_else(|| BytesMut::with_capacity(self.inner.buffer_size));
        buf.clear();
        buf.resize(self.inner.buffer_size, 0);
        buf
    }

    /// Return a buffer. Dropped if the pool is full or the buffer has grown past twice the size.
    pub fn release(&self, buf: BytesMut) {
        if buf.capacity() > self.inner.buffer_size * 2 {
            return;
        }
        let mut buffers = self.inner.buffers.lock().unwrap_or_else(PoisonError::into_inner);
        if buffers.len() < self.inner.max_pooled {
            buffers.push(buf);
        }
    }

    /// Size of the buffers handed out.
    pub fn buffer_size(&self) -> usize {
        self.inner.buffer_size
    }

    /// Number of idle buffers.
    pub fn count(&self) -> usize {
        self.inner.buffers.lock().unwrap_or_else(PoisonError::into_inner).len()
    }
}
