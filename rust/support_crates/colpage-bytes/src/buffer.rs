use crate::align::power_of_two_capacity;

/// A growable byte vector whose capacity is always a power of two.
///
/// The length of the buffer doubles as its write cursor: every append lands
/// at `len()`, while [`ByteBuffer::write_at`] patches bytes that were
/// reserved earlier without moving the cursor.
///
/// # Performance
/// - Capacity grows to the next power of two (never below 64 bytes), so a
///   sequence of appends performs a logarithmic number of allocations.
/// - Buffers are meant to be recycled through a pool; [`ByteBuffer::zero_and_clear`]
///   wipes the previously written bytes before the buffer is handed out again.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct ByteBuffer {
    inner: Vec<u8>,
}

impl ByteBuffer {
    /// Smallest capacity allocated once the buffer holds any data.
    pub const MIN_CAPACITY: usize = 64;

    /// Creates a new empty buffer with no capacity allocation.
    pub fn new() -> ByteBuffer {
        ByteBuffer { inner: Vec::new() }
    }

    /// Creates a new buffer able to hold at least `capacity` bytes.
    pub fn with_capacity(capacity: usize) -> ByteBuffer {
        let mut buf = ByteBuffer::new();
        buf.reserve(capacity);
        buf
    }

    /// Creates a new buffer of specified length, filled with zeros.
    pub fn zeroed(len: usize) -> ByteBuffer {
        let mut buf = ByteBuffer::with_capacity(len);
        buf.resize(len, 0);
        buf
    }

    /// Creates a new buffer containing a copy of the provided slice.
    pub fn copy_from_slice(data: &[u8]) -> ByteBuffer {
        let mut buf = ByteBuffer::with_capacity(data.len());
        buf.extend_from_slice(data);
        buf
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.inner.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    /// Returns the number of bytes the buffer can hold without reallocating.
    #[inline]
    pub fn capacity(&self) -> usize {
        self.inner.capacity()
    }

    #[inline]
    pub fn as_slice(&self) -> &[u8] {
        self.inner.as_slice()
    }

    #[inline]
    pub fn as_mut_slice(&mut self) -> &mut [u8] {
        self.inner.as_mut_slice()
    }

    /// Reserves capacity for at least `additional` more bytes.
    #[inline]
    pub fn reserve(&mut self, additional: usize) {
        if self.inner.capacity() - self.inner.len() >= additional {
            return;
        }
        self.grow(additional);
    }

    /// Appends a slice to the buffer.
    #[inline]
    pub fn extend_from_slice(&mut self, s: &[u8]) {
        self.reserve(s.len());
        self.inner.extend_from_slice(s);
    }

    #[inline]
    pub fn push(&mut self, byte: u8) {
        self.reserve(1);
        self.inner.push(byte);
    }

    /// Resizes the buffer to the specified length, filling any new space with the given value.
    pub fn resize(&mut self, new_len: usize, value: u8) {
        if new_len > self.len() {
            self.reserve(new_len - self.len());
        }
        self.inner.resize(new_len, value);
    }

    /// Appends `n` zero bytes and returns the offset of the first of them,
    /// so the caller can fill them in later with [`ByteBuffer::write_at`].
    pub fn reserve_zeroed(&mut self, n: usize) -> usize {
        let offset = self.len();
        self.resize(offset + n, 0);
        offset
    }

    /// Overwrites previously written bytes at `offset`, leaving the length unchanged.
    ///
    /// # Panics
    ///
    /// Panics if `offset + bytes.len()` exceeds the current length.
    #[inline]
    pub fn write_at(&mut self, offset: usize, bytes: &[u8]) {
        self.inner[offset..offset + bytes.len()].copy_from_slice(bytes);
    }

    /// Clears the buffer, keeping the allocated capacity.
    pub fn clear(&mut self) {
        self.inner.clear();
    }

    /// Overwrites the written bytes with zeros and clears the buffer, so no
    /// data from a previous page can be observed through a recycled buffer.
    pub fn zero_and_clear(&mut self) {
        self.inner.fill(0);
        self.inner.clear();
    }

    /// Copies the contents into an immutable shared [`bytes::Bytes`] and clears
    /// the buffer for reuse.
    pub fn take_bytes(&mut self) -> bytes::Bytes {
        let bytes = bytes::Bytes::copy_from_slice(&self.inner);
        self.inner.clear();
        bytes
    }

    #[cold]
    fn grow(&mut self, additional: usize) {
        let required = self.len().checked_add(additional).expect("add");
        let new_cap = power_of_two_capacity(required, Self::MIN_CAPACITY).expect("capacity");
        self.inner.reserve_exact(new_cap - self.inner.len());
    }
}

impl ByteBuffer {
    /// Appends a value of type `T` to the buffer by copying its bytes.
    #[inline]
    pub fn push_typed<T>(&mut self, value: T)
    where
        T: bytemuck::NoUninit,
    {
        self.extend_from_slice(bytemuck::bytes_of(&value));
    }

    /// Appends a slice of values of type `T` by copying their bytes.
    #[inline]
    pub fn extend_from_typed_slice<T>(&mut self, values: &[T])
    where
        T: bytemuck::NoUninit,
    {
        self.extend_from_slice(bytemuck::cast_slice(values));
    }

    /// Reinterprets the buffer contents as a slice of `T`.
    ///
    /// # Panics
    ///
    /// Panics if the length is not a multiple of `size_of::<T>()` or the
    /// storage is not suitably aligned for `T`.
    #[inline]
    pub fn typed_data<T>(&self) -> &[T]
    where
        T: bytemuck::AnyBitPattern,
    {
        bytemuck::cast_slice(self.as_slice())
    }
}

impl std::ops::Deref for ByteBuffer {
    type Target = [u8];

    #[inline]
    fn deref(&self) -> &Self::Target {
        self.as_slice()
    }
}

impl std::ops::DerefMut for ByteBuffer {
    #[inline]
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.as_mut_slice()
    }
}

impl AsRef<[u8]> for ByteBuffer {
    fn as_ref(&self) -> &[u8] {
        self.as_slice()
    }
}

impl std::fmt::Debug for ByteBuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ByteBuffer")
            .field("len", &self.len())
            .field("cap", &self.capacity())
            .finish_non_exhaustive()
    }
}

impl From<ByteBuffer> for bytes::Bytes {
    fn from(buf: ByteBuffer) -> Self {
        bytes::Bytes::from(buf.inner)
    }
}
