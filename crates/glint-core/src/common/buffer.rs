/// The allocation policy tag of §3: `0` heap-growable, `>0` pre-reserved,
/// `<0` fixed upper bound with no reallocation past it.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Allocated {
    /// Grows on demand, no upper bound.
    Heap,
    /// Pre-reserved with `capacity` bytes, but still allowed to grow past it.
    Reserved(usize),
    /// Hard upper bound. Writes that would exceed it are dropped silently;
    /// only `len()` is observable afterward (§8 boundary behavior).
    Fixed(usize),
}

/// An owned, growable byte container with an `Allocated` policy.
///
/// Mirrors the spec's `buffer` type. `Buffer` backs SSZ encoding scratch
/// space and MPT node-RLP assembly, where a caller may want to cap memory
/// use without plumbing a `Result` through every `push`.
#[derive(Clone, Debug)]
pub struct Buffer {
    data: Vec<u8>,
    policy: Allocated,
}

impl Buffer {
    pub fn new(policy: Allocated) -> Self {
        let data = match policy {
            Allocated::Heap => Vec::new(),
            Allocated::Reserved(cap) => Vec::with_capacity(cap),
            Allocated::Fixed(cap) => Vec::with_capacity(cap),
        };
        Self { data, policy }
    }

    pub fn heap() -> Self {
        Self::new(Allocated::Heap)
    }

    pub fn fixed(max_len: usize) -> Self {
        Self::new(Allocated::Fixed(max_len))
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.data
    }

    pub fn into_vec(self) -> Vec<u8> {
        self.data
    }

    /// Append `bytes`. Under `Fixed(max)`, any write that would push
    /// `len()` past `max` is silently dropped in its entirety — the spec
    /// requires this be observable only through an unchanged length, not
    /// through a returned error or a partial write.
    pub fn extend(&mut self, bytes: &[u8]) {
        if let Allocated::Fixed(max) = self.policy {
            if self.data.len() + bytes.len() > max {
                return;
            }
        }
        self.data.extend_from_slice(bytes);
    }

    pub fn push(&mut self, byte: u8) {
        self.extend(&[byte]);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fixed_buffer_drops_overflowing_write() {
        let mut buf = Buffer::fixed(4);
        buf.extend(&[1, 2, 3]);
        assert_eq!(buf.len(), 3);
        // This write would push us to 7 bytes, past the 4-byte bound.
        buf.extend(&[4, 5, 6, 7]);
        assert_eq!(buf.len(), 3);
        assert_eq!(buf.as_slice(), &[1, 2, 3]);
    }

    #[test]
    fn fixed_buffer_accepts_writes_at_exact_bound() {
        let mut buf = Buffer::fixed(4);
        buf.extend(&[1, 2, 3, 4]);
        assert_eq!(buf.len(), 4);
    }

    #[test]
    fn heap_buffer_has_no_bound() {
        let mut buf = Buffer::heap();
        for _ in 0..10 {
            buf.extend(&[0u8; 1024]);
        }
        assert_eq!(buf.len(), 10 * 1024);
    }
}
