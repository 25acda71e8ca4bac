//! Drive geometries and the two register layouts used to address them.
//!
//! The original Nova moving-head controllers packed an 8-bit cylinder plus
//! a separate extension bit into the command register; the revised layout
//! uses a flat 9-bit cylinder field and narrower surface/sector fields.
//! Which layout applies is a property of the drive type.

/// 16-bit words per sector on every supported drive.
pub const WORDS_PER_SECTOR: usize = 256;

/// Bytes per word in a disk image.
pub const BYTES_PER_WORD: usize = 2;

/// Read/write/seek/recalibrate, as encoded in the command register.
pub const FUNCTION_READ: u16 = 0;
pub const FUNCTION_WRITE: u16 = 1;
pub const FUNCTION_SEEK: u16 = 2;
pub const FUNCTION_RECALIBRATE: u16 = 3;

/// The register bit-layout strategy of a drive type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegisterLayout {
    /// 2-bit command at 9:8, cylinder 7:0 extended by bit 10.
    Original,
    /// 2-bit command at 10:9, 9-bit cylinder at 8:0.
    Revised,
}

impl RegisterLayout {
    /// Extract the function code from the command/cylinder register.
    pub fn function(self, fccy: u16) -> u16 {
        match self {
            RegisterLayout::Original => (fccy >> 8) & 0o3,
            RegisterLayout::Revised => (fccy >> 9) & 0o3,
        }
    }

    /// Extract the cylinder from the command/cylinder register.
    pub fn cylinder(self, fccy: u16) -> u16 {
        match self {
            RegisterLayout::Original => (fccy & 0o377) | ((fccy & 0o2000) >> 2),
            RegisterLayout::Revised => fccy & 0o777,
        }
    }

    /// Extract the sector from the unit/surface/sector/count register.
    pub fn sector(self, ussc: u16) -> u16 {
        match self {
            RegisterLayout::Original => (ussc >> 4) & 0o17,
            RegisterLayout::Revised => (ussc >> 4) & 0o37,
        }
    }

    /// Extract the surface from the unit/surface/sector/count register.
    pub fn surface(self, ussc: u16) -> u16 {
        self.surface_field(ussc) & self.surface_mask()
    }

    fn surface_field(self, ussc: u16) -> u16 {
        match self {
            RegisterLayout::Original => ussc >> 8,
            RegisterLayout::Revised => ussc >> 9,
        }
    }

    /// The widest surface number the register can hold.
    pub fn surface_mask(self) -> u16 {
        match self {
            RegisterLayout::Original => 0o77,
            RegisterLayout::Revised => 0o37,
        }
    }

    /// Rewrite the surface and sector fields of `ussc`, leaving the unit
    /// and count fields alone.
    pub fn with_position(self, ussc: u16, surface: u16, sector: u16) -> u16 {
        let kept = ussc & (USSC_UNIT_MASK | USSC_COUNT_MASK);
        match self {
            RegisterLayout::Original =>
                kept | ((surface & 0o77) << 8) | ((sector & 0o17) << 4),
            RegisterLayout::Revised =>
                kept | ((surface & 0o37) << 9) | ((sector & 0o37) << 4),
        }
    }

    /// Build a command/cylinder register value.
    pub fn command_word(self, function: u16, cylinder: u16) -> u16 {
        match self {
            RegisterLayout::Original => ((function & 0o3) << 8) | (cylinder & 0o377)
                | ((cylinder & 0o400) << 2),
            RegisterLayout::Revised => ((function & 0o3) << 9) | (cylinder & 0o777),
        }
    }

    /// Build a unit/surface/sector/count register value that moves
    /// `sectors` sectors (1 to 16).
    pub fn unit_word(self, unit: usize, surface: u16, sector: u16, sectors: u16) -> u16 {
        let count = sectors.wrapping_neg() & USSC_COUNT_MASK;
        self.with_position(((unit as u16 & 0o3) << 14) | count, surface, sector)
    }

    /// How much of a memory address write the controller keeps.
    pub fn memory_address_mask(self) -> u16 {
        match self {
            RegisterLayout::Original => 0o77777,
            RegisterLayout::Revised => 0o177777,
        }
    }
}

pub const USSC_COUNT_MASK: u16 = 0o17;
pub const USSC_UNIT_MASK: u16 = 0o140000;

/// Sector count field of the unit register.
pub fn ussc_count(ussc: u16) -> u16 {
    ussc & USSC_COUNT_MASK
}

/// Unit select field of the unit register.
pub fn ussc_unit(ussc: u16) -> usize {
    (ussc >> 14) as usize & 0o3
}

/// A fixed drive geometry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Geometry {
    pub name: &'static str,
    pub sectors: u16,
    pub surfaces: u16,
    pub cylinders: u16,
    pub layout: RegisterLayout,
}

impl Geometry {
    /// Total sectors on the drive.
    pub const fn blocks(&self) -> u32 {
        self.sectors as u32 * self.surfaces as u32 * self.cylinders as u32
    }

    pub const fn capacity_words(&self) -> u64 {
        self.blocks() as u64 * WORDS_PER_SECTOR as u64
    }

    pub const fn capacity_bytes(&self) -> u64 {
        self.capacity_words() * BYTES_PER_WORD as u64
    }

    /// Linear block number of a cylinder/surface/sector triple. Callers
    /// are expected to have bounds-checked the triple.
    pub fn block_address(&self, cylinder: u16, surface: u16, sector: u16) -> u32 {
        (cylinder as u32 * self.surfaces as u32 + surface as u32) * self.sectors as u32
            + sector as u32
    }

    pub fn contains(&self, cylinder: u16, surface: u16, sector: u16) -> bool {
        cylinder < self.cylinders && surface < self.surfaces && sector < self.sectors
    }
}

/// Drive types the hard disk controller accepts.
pub const HARD_DISK_TYPES: &[Geometry] = &[
    Geometry {
        name: "6095",
        sectors: 12,
        surfaces: 4,
        cylinders: 408,
        layout: RegisterLayout::Original,
    },
    Geometry {
        name: "6097",
        sectors: 16,
        surfaces: 2,
        cylinders: 77,
        layout: RegisterLayout::Revised,
    },
];

/// Drive types the floppy controller accepts.
pub const FLOPPY_TYPES: &[Geometry] = &[
    Geometry {
        name: "6038",
        sectors: 8,
        surfaces: 1,
        cylinders: 77,
        layout: RegisterLayout::Original,
    },
];

pub const TYPE_6095: usize = 0;
pub const TYPE_6097: usize = 1;
pub const TYPE_6038: usize = 0;

/// Find a drive type index in a catalogue by name.
pub fn find_type(catalogue: &[Geometry], name: &str) -> Option<usize> {
    catalogue.iter().position(|g| g.name == name)
}

/// Choose the smallest catalogued geometry that holds `file_bytes`.
/// Returns `None` for an empty file or one too large for every entry, in
/// which case the configured type should be kept.
pub fn autosize(catalogue: &[Geometry], file_bytes: u64) -> Option<usize> {
    if file_bytes == 0 {
        return None;
    }
    catalogue.iter()
        .enumerate()
        .filter(|(_, g)| file_bytes <= g.capacity_bytes())
        .min_by_key(|(_, g)| g.capacity_bytes())
        .map(|(i, _)| i)
}
