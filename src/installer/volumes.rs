use crate::types::ErrorLog;
use crate::utils::{get_space_info, is_writable_dir, same_filesystem};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Why a volume can or cannot take a new book
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum VolumeStatus {
    /// Present, writable and above the free-space floor
    Usable,
    /// The volume root does not exist (unmounted card)
    Missing,
    /// The volume root cannot be written
    Unwritable,
    /// Free space is below the floor (percent free attached)
    LowSpace(f64),
}

/// Inspect a volume against the free-space floor
pub fn volume_status(volume: &Path, min_free_percent: u8) -> VolumeStatus {
    if !volume.is_dir() {
        return VolumeStatus::Missing;
    }
    if !is_writable_dir(volume) {
        return VolumeStatus::Unwritable;
    }
    match get_space_info(volume) {
        Ok(space) if space.free_percent() < f64::from(min_free_percent) => {
            VolumeStatus::LowSpace(space.free_percent())
        }
        Ok(_) => VolumeStatus::Usable,
        Err(e) => {
            // Space unknown: let the copy itself fail if the volume is really full
            debug!(?volume, error = %e, "could not query free space");
            VolumeStatus::Usable
        }
    }
}

/// First writable volume sharing a filesystem with `source`
///
/// A rename onto it needs no free space, so the floor is not checked.
pub fn same_filesystem_volume<'a>(volumes: &'a [PathBuf], source: &Path) -> Option<&'a Path> {
    volumes
        .iter()
        .find(|v| is_writable_dir(v) && same_filesystem(source, v))
        .map(PathBuf::as_path)
}

/// Walks the volume list in order for the copy pass
///
/// A volume that fails its check is skipped for the rest of the batch.
#[derive(Debug)]
pub struct VolumeCursor<'a> {
    volumes: &'a [PathBuf],
    min_free_percent: u8,
    position: usize,
}

impl<'a> VolumeCursor<'a> {
    /// Start at the first volume
    pub fn new(volumes: &'a [PathBuf], min_free_percent: u8) -> Self {
        Self {
            volumes,
            min_free_percent,
            position: 0,
        }
    }

    /// The volume the next book goes to, or `None` once every volume is exhausted
    ///
    /// Each skipped volume is logged MILD.
    pub fn current(&mut self, log: &mut ErrorLog) -> Option<&'a Path> {
        while let Some(volume) = self.volumes.get(self.position) {
            match volume_status(volume, self.min_free_percent) {
                VolumeStatus::Usable => return Some(volume.as_path()),
                VolumeStatus::Missing => {
                    log.mild(format!("volume {} is not available, trying next", volume.display()));
                }
                VolumeStatus::Unwritable => {
                    log.mild(format!("volume {} is not writable, trying next", volume.display()));
                }
                VolumeStatus::LowSpace(free) => {
                    log.mild(format!(
                        "volume {} has only {:.1}% free space, trying next",
                        volume.display(),
                        free
                    ));
                }
            }
            warn!(?volume, "skipping library volume");
            self.position += 1;
        }
        None
    }
}
