use std::fmt;
use std::io;

/// Host-side failures. Faults the emulated software can observe are
/// reported through status registers instead.
#[derive(Debug)]
pub enum DiskError {
    /// The backing store failed during an operation.
    Io(io::Error),
    NoSuchUnit(usize),
    AlreadyAttached(usize),
    NotAttached(usize),
    UnknownDriveType(String),
    /// The image is bigger than the drive type can address.
    ImageTooLarge { bytes: u64, capacity: u64 },
}

/// Result type alias.
pub type DiskResult<T> = Result<T, DiskError>;

impl fmt::Display for DiskError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DiskError::Io(e) => write!(f, "IO error: {}", e),
            DiskError::NoSuchUnit(u) => write!(f, "No such unit: {}", u),
            DiskError::AlreadyAttached(u) => write!(f, "Unit {} is already attached", u),
            DiskError::NotAttached(u) => write!(f, "Unit {} is not attached", u),
            DiskError::UnknownDriveType(name) => write!(f, "Unknown drive type '{}'", name),
            DiskError::ImageTooLarge { bytes, capacity } => write!(
                f, "Image of {} bytes exceeds drive capacity of {} bytes", bytes, capacity),
        }
    }
}

impl std::error::Error for DiskError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            DiskError::Io(e) => Some(e),
            _ => None,
        }
    }
}

/// Convert IO errors to disk errors.
impl From<io::Error> for DiskError {
    fn from(e: io::Error) -> Self {
        DiskError::Io(e)
    }
}
