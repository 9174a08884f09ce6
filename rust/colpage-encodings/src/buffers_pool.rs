use colpage_bytes::ByteBuffer;
use std::{
    borrow::{Borrow, BorrowMut},
    ops::{Deref, DerefMut},
    sync::{Mutex, PoisonError},
};

/// Simple pool of buffers that are reused by the encoders
/// to avoid unnecessary allocations.
///
/// The `BuffersPool` maintains a collection of `ByteBuffer` instances
/// that can be borrowed and returned to reduce memory allocation overhead
/// when many pages are encoded one after another.
///
/// # Thread Safety
///
/// The pool is thread-safe and can be shared across multiple threads.
/// Buffer checkout and return operations are protected by a mutex.
///
/// # Usage
///
/// Buffers are automatically returned to the pool when the `BufferPoolRef`
/// is dropped. Returned buffers are zeroed, so a recycled buffer never
/// exposes the contents of a previous page.
pub struct BuffersPool {
    /// Thread-safe storage for pooled buffers.
    buffers: Mutex<Vec<ByteBuffer>>,
}

/// Process-wide pool shared by all encoders.
static GLOBAL_POOL: BuffersPool = BuffersPool::new();

impl BuffersPool {
    /// Maximum number of idle buffers retained by a pool.
    const MAX_IDLE_BUFFERS: usize = 64;

    /// Creates a new empty buffer pool.
    pub const fn new() -> Self {
        BuffersPool {
            buffers: Mutex::new(Vec::new()),
        }
    }

    /// Returns the process-wide pool.
    pub fn global() -> &'static BuffersPool {
        &GLOBAL_POOL
    }

    /// Retrieves a buffer from the pool or creates a new one if the pool is empty.
    ///
    /// # Returns
    ///
    /// A `BufferPoolRef` that provides access to the buffer and automatically
    /// returns it to the pool when dropped.
    pub fn get_buffer(&self) -> BufferPoolRef<'_> {
        let buffer = self
            .buffers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pop()
            .unwrap_or_default();
        BufferPoolRef { pool: self, buffer }
    }

    /// Number of idle buffers currently held by the pool.
    pub fn idle_count(&self) -> usize {
        self.buffers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Returns a buffer to the pool for reuse.
    ///
    /// The buffer is zeroed and cleared before being added back to the pool.
    fn return_buffer(&self, mut buffer: ByteBuffer) {
        buffer.zero_and_clear();
        let mut buffers = self.buffers.lock().unwrap_or_else(PoisonError::into_inner);
        if buffers.len() < Self::MAX_IDLE_BUFFERS {
            buffers.push(buffer);
        }
    }
}

impl Default for BuffersPool {
    fn default() -> Self {
        Self::new()
    }
}

/// A reference to a buffer borrowed from a `BuffersPool`.
///
/// This type provides access to a pooled buffer and ensures that the buffer
/// is automatically returned to the pool when the reference is dropped.
/// It implements `Deref` and `DerefMut` to provide transparent access to
/// the underlying `ByteBuffer`, and `BorrowMut<ByteBuffer>` so it can back
/// a `BitWriter` directly.
///
/// # Lifetime
///
/// The lifetime parameter `'a` ensures that the buffer reference cannot
/// outlive the pool it was borrowed from.
pub struct BufferPoolRef<'a> {
    /// Reference to the pool that owns this buffer.
    pool: &'a BuffersPool,
    /// The actual buffer data.
    buffer: ByteBuffer,
}

impl Deref for BufferPoolRef<'_> {
    type Target = ByteBuffer;

    fn deref(&self) -> &Self::Target {
        &self.buffer
    }
}

impl DerefMut for BufferPoolRef<'_> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.buffer
    }
}

impl Borrow<ByteBuffer> for BufferPoolRef<'_> {
    fn borrow(&self) -> &ByteBuffer {
        &self.buffer
    }
}

impl BorrowMut<ByteBuffer> for BufferPoolRef<'_> {
    fn borrow_mut(&mut self) -> &mut ByteBuffer {
        &mut self.buffer
    }
}

impl std::fmt::Debug for BufferPoolRef<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("BufferPoolRef").field(&self.buffer).finish()
    }
}

impl Drop for BufferPoolRef<'_> {
    /// Automatically returns the buffer to the pool when the reference is dropped.
    fn drop(&mut self) {
        let buffer = std::mem::take(&mut self.buffer);
        self.pool.return_buffer(buffer);
    }
}
