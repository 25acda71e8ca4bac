use std::io;

/// A flat array of fixed-size sectors backing one drive unit. Blocks are
/// addressed linearly; see `Geometry::block_address`.
pub trait SectorStore: Send {
    /// Read a sector. Words beyond the end of the medium read as zero.
    fn read_sector(&mut self, block: u32, buf: &mut [u16]) -> io::Result<()>;
    fn write_sector(&mut self, block: u32, buf: &[u16]) -> io::Result<()>;
    /// Current size of the medium in bytes.
    fn len_bytes(&self) -> io::Result<u64>;
}
