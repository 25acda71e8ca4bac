use log::debug;
use micronova_utils::read_le::ReadLE;
use micronova_utils::write_le::WriteLE;
use std::fs::{File, OpenOptions};
use std::io::{self, Seek, SeekFrom};
use std::path::{Path, PathBuf};

use super::store_interface::SectorStore;
use crate::geometry::{BYTES_PER_WORD, WORDS_PER_SECTOR};

/// A sector store on a host file. Words are stored little-endian.
pub struct FileStore {
    file: File,
}

impl FileStore {
    /// Open an existing image. A read-only open is used for write-locked
    /// units so that the image cannot be modified by accident.
    pub fn open(path: impl Into<PathBuf>, read_only: bool) -> io::Result<Self> {
        let path = path.into();
        let file = OpenOptions::new()
            .read(true)
            .write(!read_only)
            .open(&path)?;
        debug!("Opened image '{}'{}.", path.display(),
               if read_only {" read-only"} else {""});
        Ok(FileStore { file })
    }

    /// Create a zero-filled image of exactly `bytes` bytes.
    pub fn create(path: impl AsRef<Path>, bytes: u64) -> io::Result<()> {
        let file = File::create(path)?;
        file.set_len(bytes)
    }

    fn seek_block(&mut self, block: u32) -> io::Result<()> {
        let offset = block as u64 * (WORDS_PER_SECTOR * BYTES_PER_WORD) as u64;
        self.file.seek(SeekFrom::Start(offset))?;
        Ok(())
    }
}

impl SectorStore for FileStore {
    fn read_sector(&mut self, block: u32, buf: &mut [u16]) -> io::Result<()> {
        self.seek_block(block)?;
        self.file.read_le_words(buf)?;
        Ok(())
    }

    fn write_sector(&mut self, block: u32, buf: &[u16]) -> io::Result<()> {
        self.seek_block(block)?;
        self.file.write_le_words(buf)
    }

    fn len_bytes(&self) -> io::Result<u64> {
        Ok(self.file.metadata()?.len())
    }
}
