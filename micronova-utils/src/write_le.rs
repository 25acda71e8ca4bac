use std::io::{self, Write};

/// Write little-endian integers directly to a stream.
pub trait WriteLE: Write {
    fn write_le_words(&mut self, words: &[u16]) -> io::Result<()>;
}

/// Everything that implements Write can also implement WriteLE.
impl<T: Write> WriteLE for T {
    fn write_le_words(&mut self, words: &[u16]) -> io::Result<()> {
        // One write call per sector rather than per word.
        let bytes: Vec<u8> = words.iter()
            .flat_map(|w| w.to_le_bytes())
            .collect();
        self.write_all(&bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_write_words() {
        let mut out = Vec::new();
        out.write_le_words(&[0x1234, 0x00FF]).unwrap();
        out.write_le_words(&[0o177777]).unwrap();
        assert_eq!(out, vec![0x34, 0x12, 0xFF, 0x00, 0xFF, 0xFF]);
    }
}
