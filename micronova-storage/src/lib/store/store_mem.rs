use std::io;
use std::sync::{Arc, Mutex};

use super::store_interface::SectorStore;
use crate::geometry::{BYTES_PER_WORD, WORDS_PER_SECTOR};

/// Contents of a MemStore, shared so tests can inspect the medium while a
/// controller owns the store.
#[derive(Default)]
pub struct MemMedium {
    pub words: Vec<u16>,
    pub fail_reads: bool,
    pub fail_writes: bool,
    pub writes: usize,
}

/// A MemStore is backed by memory instead of a real file, and can be told
/// to fail.
pub struct MemStore {
    medium: Arc<Mutex<MemMedium>>,
}

impl MemStore {
    pub fn new(blocks: u32) -> (Self, Arc<Mutex<MemMedium>>) {
        let medium = Arc::new(Mutex::new(MemMedium {
            words: vec![0; blocks as usize * WORDS_PER_SECTOR],
            ..MemMedium::default()
        }));
        (MemStore { medium: Arc::clone(&medium) }, medium)
    }
}

fn injected() -> io::Error {
    io::Error::new(io::ErrorKind::Other, "injected fault")
}

impl SectorStore for MemStore {
    fn read_sector(&mut self, block: u32, buf: &mut [u16]) -> io::Result<()> {
        let medium = self.medium.lock().unwrap();
        if medium.fail_reads {
            return Err(injected());
        }
        let base = block as usize * WORDS_PER_SECTOR;
        for (i, word) in buf.iter_mut().enumerate() {
            *word = medium.words.get(base + i).copied().unwrap_or(0);
        }
        Ok(())
    }

    fn write_sector(&mut self, block: u32, buf: &[u16]) -> io::Result<()> {
        let mut medium = self.medium.lock().unwrap();
        if medium.fail_writes {
            return Err(injected());
        }
        let base = block as usize * WORDS_PER_SECTOR;
        if medium.words.len() < base + buf.len() {
            medium.words.resize(base + buf.len(), 0);
        }
        medium.words[base..base + buf.len()].copy_from_slice(buf);
        medium.writes += 1;
        Ok(())
    }

    fn len_bytes(&self) -> io::Result<u64> {
        Ok((self.medium.lock().unwrap().words.len() * BYTES_PER_WORD) as u64)
    }
}
