//! Chunk Manager Module
//!
//! Splits oversized payloads into bounded fragments and reassembles them.

// == Chunk Manager ==
/// Splits payloads into ordered, non-overlapping fragments of at most
/// `max_size` bytes. Only the last fragment may be shorter.
#[derive(Debug, Clone, Copy)]
pub struct ChunkManager {
    max_size: usize,
}

impl ChunkManager {
    /// Creates a manager; a zero size is treated as one byte.
    pub fn new(max_size: usize) -> Self {
        Self {
            max_size: max_size.max(1),
        }
    }

    /// Returns the fragment size bound.
    pub fn max_size(&self) -> usize {
        self.max_size
    }

    /// Returns true when a payload of `len` bytes cannot be stored inline.
    pub fn needs_chunking(&self, len: usize) -> bool {
        len > self.max_size
    }

    /// Number of fragments a payload of `len` bytes is split into.
    pub fn chunk_count(&self, len: usize) -> usize {
        len.div_ceil(self.max_size)
    }

    // == Split ==
    /// Splits `payload` into fragments in payload order.
    pub fn split<'a>(&self, payload: &'a [u8]) -> Vec<&'a [u8]> {
        payload.chunks(self.max_size).collect()
    }

    // == Join ==
    /// Concatenates fragments in the order given.
    pub fn join<I, B>(fragments: I) -> Vec<u8>
    where
        I: IntoIterator<Item = B>,
        B: AsRef<[u8]>,
    {
        let mut payload = Vec::new();
        for fragment in fragments {
            payload.extend_from_slice(fragment.as_ref());
        }
        payload
    }
}
