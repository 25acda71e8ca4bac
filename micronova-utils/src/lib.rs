pub mod octdump;
pub mod read_le;
pub mod write_le;
