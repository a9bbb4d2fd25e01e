//! Stub collaborators for platforms without a volume-bitmap binding.

use std::fs::File;
use std::io;

use anyhow::{bail, Result};

use crate::error::WipecheckError;
use crate::extents::RunDescriptor;
use crate::volume::{AllocationBitmap, BitmapSource, VolumeInfo};

const UNSUPPORTED: &str =
    "raw volume access is only implemented on Windows (NTFS volume bitmaps and retrieval pointers)";

pub fn volume_info(_volume_root: &str) -> Result<VolumeInfo> {
    bail!(UNSUPPORTED)
}

pub fn open_volume_for_search(_volume: &str) -> Result<File> {
    bail!(UNSUPPORTED)
}

pub fn file_retrieval_pointers(_file: &File) -> Result<Vec<RunDescriptor>> {
    bail!(UNSUPPORTED)
}

pub struct VolumeBitmapSource;

impl VolumeBitmapSource {
    pub fn new(_volume: &str) -> Result<Self> {
        bail!(UNSUPPORTED)
    }
}

impl BitmapSource for VolumeBitmapSource {
    fn volume_bitmap(&mut self, _cluster_count: u64) -> Result<AllocationBitmap, WipecheckError> {
        Err(WipecheckError::VolumeIo(io::Error::new(
            io::ErrorKind::Unsupported,
            UNSUPPORTED,
        )))
    }
}
