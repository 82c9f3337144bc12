// Bounded at `limit` bytes; once full, further bytes are counted and dropped so
// offsets handed to pollers stay valid.
#[derive(Debug, Clone)]
pub struct OutputBuffer {
    data: Vec<u8>,
    limit: usize,
    dropped: u64,
    sealed: bool,
}

impl OutputBuffer {
    pub fn new(limit: usize) -> Self {
        Self {
            data: Vec::new(),
            limit,
            dropped: 0,
            sealed: false,
        }
    }

    /// Returns how many bytes of `chunk` were kept.
    pub fn append(&mut self, chunk: &[u8]) -> usize {
        if self.sealed {
            return 0;
        }
        let room = self.limit.saturating_sub(self.data.len());
        let keep = room.min(chunk.len());
        self.data.extend_from_slice(&chunk[..keep]);
        self.dropped += (chunk.len() - keep) as u64;
        keep
    }

    pub fn seal(&mut self) {
        self.sealed = true;
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn truncated(&self) -> bool {
        self.dropped > 0
    }

    pub fn dropped(&self) -> u64 {
        self.dropped
    }

    pub fn bytes(&self) -> &[u8] {
        &self.data
    }

    pub fn since(&self, offset: usize) -> &[u8] {
        &self.data[offset.min(self.data.len())..]
    }
}
