//! Growable byte sections and the string pool used while building a record.

/// An append-only byte region that tracks how much of its allocation is used.
///
/// Growth reallocates to at least double the capacity and copies the used
/// prefix, so offsets handed out earlier stay valid.
#[derive(Debug, Default)]
pub struct Section {
    buf: Vec<u8>,
    used: usize,
}

const MIN_SECTION_CAPACITY: usize = 64;

impl Section {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            buf: vec![0; capacity],
            used: 0,
        }
    }

    pub fn used(&self) -> usize {
        self.used
    }

    pub fn capacity(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.used == 0
    }

    fn grow(&mut self, needed: usize) {
        let target = (self.buf.len() * 2)
            .max(self.used + needed)
            .max(MIN_SECTION_CAPACITY);
        let mut next = vec![0; target];
        next[..self.used].copy_from_slice(&self.buf[..self.used]);
        self.buf = next;
    }

    /// Append `bytes` and return the offset they were written at.
    pub fn push(&mut self, bytes: &[u8]) -> usize {
        if self.used + bytes.len() > self.buf.len() {
            self.grow(bytes.len());
        }
        let at = self.used;
        self.buf[at..at + bytes.len()].copy_from_slice(bytes);
        self.used += bytes.len();
        at
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.buf[..self.used]
    }
}

/// Append-only pool of NUL-terminated strings addressed by one-based offset.
///
/// Strings are never deduplicated: the pool layout is a pure function of the
/// order in which strings are added.
#[derive(Debug, Default)]
pub struct StringPool {
    section: Section,
}

impl StringPool {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add `s` and return its id (never 0).
    pub fn add(&mut self, s: &str) -> u32 {
        let at = self.section.push(s.as_bytes());
        self.section.push(&[0]);
        at as u32 + 1
    }

    /// Add an optional string; `None` maps to id 0.
    pub fn add_opt(&mut self, s: Option<&str>) -> u32 {
        s.map_or(0, |s| self.add(s))
    }

    pub fn len(&self) -> usize {
        self.section.used()
    }

    pub fn is_empty(&self) -> bool {
        self.section.is_empty()
    }

    pub fn as_bytes(&self) -> &[u8] {
        self.section.as_bytes()
    }
}
