//! RFC 1071 internet checksum.

/// Ones'-complement sum accumulator, for checksums spanning several slices.
#[derive(Debug, Clone, Copy, Default)]
pub struct Checksum {
    acc: u64,
}

impl Checksum {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add `buf` to the sum. Slices of odd length are padded with a trailing zero byte, so only
    /// the last slice added may have an odd length.
    pub fn add(&mut self, buf: &[u8]) -> &mut Self {
        let mut chunks = buf.chunks_exact(2);
        for pair in &mut chunks {
            self.acc += u64::from(u16::from_be_bytes([pair[0], pair[1]]));
        }
        if let [last] = chunks.remainder() {
            self.acc += u64::from(*last) << 8;
        }
        self
    }

    pub fn finish(&self) -> u16 {
        let mut acc = self.acc;
        while acc > 0xffff {
            acc = (acc & 0xffff) + (acc >> 16);
        }
        !(acc as u16)
    }
}

/// Checksum of a single buffer. Running it over a buffer that embeds a correct checksum yields 0.
pub fn checksum(buf: &[u8]) -> u16 {
    Checksum::new().add(buf).finish()
}
