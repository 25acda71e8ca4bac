use std::io::{self, Read};

/// Read little-endian integers directly from a stream. Disk images store
/// each 16-bit word low byte first.
pub trait ReadLE: Read {
    /// Fill `words` from the stream. Words past the end of the stream are
    /// zeroed; the number of words actually read is returned.
    fn read_le_words(&mut self, words: &mut [u16]) -> io::Result<usize>;
}

/// Everything that implements Read can also implement ReadLE.
impl<T: Read> ReadLE for T {
    fn read_le_words(&mut self, words: &mut [u16]) -> io::Result<usize> {
        let mut bytes = Vec::with_capacity(words.len() * 2);
        self.take(words.len() as u64 * 2).read_to_end(&mut bytes)?;
        // A trailing odd byte is the low half of a partial word.
        let mut chunks = bytes.chunks(2);
        let mut count = 0;
        for word in words.iter_mut() {
            *word = match chunks.next() {
                Some([lo, hi]) => {
                    count += 1;
                    u16::from_le_bytes([*lo, *hi])
                }
                Some([lo]) => u16::from(*lo),
                _ => 0,
            };
        }
        Ok(count)
    }
}
