use log::info;
use std::path::Path;

use crate::error::{DiskError, DiskResult};
use crate::geometry::{self, Geometry};
use crate::store::{FileStore, SectorStore};

/// One drive attached to a controller.
pub struct DriveUnit {
    store: Option<Box<dyn SectorStore>>,
    catalogue: &'static [Geometry],
    pub write_locked: bool,
    drive_type: usize,
    autosize: bool,
    /// Cylinder the heads are on.
    pub cylinder: u16,
    /// Sector passing under the head. Only the floppy tracks rotation.
    pub sector: u16,
    /// Function code of the last command given to this unit.
    pub function: u16,
    /// Command recorded but waiting on the rotation timer.
    pub armed: bool,
}

impl DriveUnit {
    pub fn new(catalogue: &'static [Geometry], drive_type: usize) -> Self {
        DriveUnit {
            store: None,
            catalogue,
            write_locked: false,
            drive_type,
            autosize: true,
            cylinder: 0,
            sector: 0,
            function: 0,
            armed: false,
        }
    }

    pub fn geometry(&self) -> &'static Geometry {
        &self.catalogue[self.drive_type]
    }

    pub fn is_attached(&self) -> bool {
        self.store.is_some()
    }

    /// Attach a host image file. Write-locked units open it read-only.
    pub fn attach_file(&mut self, path: &Path) -> DiskResult<()> {
        if self.is_attached() {
            return Err(DiskError::AlreadyAttached(0));
        }
        let store = FileStore::open(path, self.write_locked)?;
        info!("Attaching '{}'.", path.display());
        self.attach_store(Box::new(store))
    }

    /// Attach any sector store, autosizing the drive type from its length
    /// if the unit allows it.
    pub fn attach_store(&mut self, store: Box<dyn SectorStore>) -> DiskResult<()> {
        if self.is_attached() {
            return Err(DiskError::AlreadyAttached(0));
        }
        if self.autosize {
            let bytes = store.len_bytes()?;
            if let Some(index) = geometry::autosize(self.catalogue, bytes) {
                self.drive_type = index;
            }
        }
        info!("Unit attached as drive type {}.", self.geometry().name);
        self.store = Some(store);
        Ok(())
    }

    /// Drop the backing store, returning it.
    pub fn detach(&mut self) -> DiskResult<Box<dyn SectorStore>> {
        self.store.take().ok_or(DiskError::NotAttached(0))
    }

    /// Fix the drive type, turning autosizing off. Refused while attached.
    pub fn set_drive_type(&mut self, name: &str) -> DiskResult<()> {
        if self.is_attached() {
            return Err(DiskError::AlreadyAttached(0));
        }
        self.drive_type = geometry::find_type(self.catalogue, name)
            .ok_or_else(|| DiskError::UnknownDriveType(name.to_string()))?;
        self.autosize = false;
        Ok(())
    }

    pub fn set_autosize(&mut self, autosize: bool) {
        self.autosize = autosize;
    }

    /// Borrow the store for the duration of a transfer. It must be handed
    /// back with `restore_store`.
    pub fn take_store(&mut self) -> Option<Box<dyn SectorStore>> {
        self.store.take()
    }

    pub fn restore_store(&mut self, store: Box<dyn SectorStore>) {
        self.store = Some(store);
    }

    /// Forget head position and pending work.
    pub fn reset(&mut self) {
        self.cylinder = 0;
        self.sector = 0;
        self.function = 0;
        self.armed = false;
    }
}

/// Fix up the unit number in errors raised by a unit.
fn for_unit(e: DiskError, unit: usize) -> DiskError {
    match e {
        DiskError::AlreadyAttached(_) => DiskError::AlreadyAttached(unit),
        DiskError::NotAttached(_) => DiskError::NotAttached(unit),
        other => other,
    }
}

/// Host-side management of a controller's drive units, the equivalent of
/// mounting packs and flipping the write-protect switch.
pub trait DriveControl {
    fn units(&self) -> &[DriveUnit];
    fn units_mut(&mut self) -> &mut [DriveUnit];

    fn unit_mut(&mut self, unit: usize) -> DiskResult<&mut DriveUnit> {
        self.units_mut().get_mut(unit).ok_or(DiskError::NoSuchUnit(unit))
    }

    fn unit(&self, unit: usize) -> DiskResult<&DriveUnit> {
        self.units().get(unit).ok_or(DiskError::NoSuchUnit(unit))
    }

    /// Attach a disk image file to a unit.
    fn attach(&mut self, unit: usize, path: &Path) -> DiskResult<()> {
        self.unit_mut(unit)?
            .attach_file(path)
            .map_err(|e| for_unit(e, unit))
    }

    /// Attach any sector store to a unit.
    fn attach_store(&mut self, unit: usize, store: Box<dyn SectorStore>) -> DiskResult<()> {
        self.unit_mut(unit)?
            .attach_store(store)
            .map_err(|e| for_unit(e, unit))
    }

    fn detach(&mut self, unit: usize) -> DiskResult<()> {
        self.unit_mut(unit)?
            .detach()
            .map_err(|e| for_unit(e, unit))?;
        info!("Unit {} detached.", unit);
        Ok(())
    }

    fn set_write_lock(&mut self, unit: usize, locked: bool) -> DiskResult<()> {
        self.unit_mut(unit)?.write_locked = locked;
        Ok(())
    }

    /// Fix a unit's drive type by name. This turns autosizing off.
    fn set_drive_type(&mut self, unit: usize, name: &str) -> DiskResult<()> {
        self.unit_mut(unit)?
            .set_drive_type(name)
            .map_err(|e| for_unit(e, unit))
    }

    fn set_autosize(&mut self, unit: usize, autosize: bool) -> DiskResult<()> {
        self.unit_mut(unit)?.set_autosize(autosize);
        Ok(())
    }

    fn drive_type(&self, unit: usize) -> DiskResult<&'static Geometry> {
        self.unit(unit).map(DriveUnit::geometry)
    }

    /// The cylinder a unit's heads are on.
    fn cylinder(&self, unit: usize) -> DiskResult<u16> {
        self.unit(unit).map(|u| u.cylinder)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::{HARD_DISK_TYPES, TYPE_6095, TYPE_6097};
    use crate::store::MemStore;

    #[test]
    fn test_autosize_on_attach() {
        let mut unit = DriveUnit::new(HARD_DISK_TYPES, TYPE_6095);
        let (store, _) = MemStore::new(10);
        unit.attach_store(Box::new(store)).unwrap();
        assert_eq!(unit.geometry(), &HARD_DISK_TYPES[TYPE_6097]);
        assert!(unit.is_attached());
        assert!(matches!(unit.attach_store(Box::new(MemStore::new(1).0)),
                         Err(DiskError::AlreadyAttached(_))));
    }

    #[test]
    fn test_fixed_type_survives_attach() {
        let mut unit = DriveUnit::new(HARD_DISK_TYPES, TYPE_6097);
        unit.set_drive_type("6095").unwrap();
        unit.attach_store(Box::new(MemStore::new(10).0)).unwrap();
        assert_eq!(unit.geometry().name, "6095");
        assert!(matches!(unit.set_drive_type("6097"), Err(DiskError::AlreadyAttached(_))));
        unit.detach().unwrap();
        assert!(matches!(unit.detach(), Err(DiskError::NotAttached(_))));
        assert!(matches!(unit.set_drive_type("nope"), Err(DiskError::UnknownDriveType(_))));
    }

    #[test]
    fn test_empty_image_keeps_type() {
        let mut unit = DriveUnit::new(HARD_DISK_TYPES, TYPE_6095);
        unit.attach_store(Box::new(MemStore::new(0).0)).unwrap();
        assert_eq!(unit.geometry().name, HARD_DISK_TYPES[TYPE_6095].name);
    }
}
