//! Iterative occupancy targeting: write filler files until the volume's
//! allocation bitmap reports the requested percentage in use.
//!
//! The filler files are deliberate test-harness residue — the caller decides
//! when to clean them up.

use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};

use rand::RngCore;

use crate::error::WipecheckError;
use crate::extents::{check_extents, Extent};
use crate::path_ext;
use crate::volume::{BitmapSource, VolumeInfo};

/// Write granularity for filler file content.
const FILLER_WRITE_CHUNK: usize = 1024 * 1024;

/// Consecutive iterations without an allocation increase before the fill is
/// declared stalled. Filesystem reserved space can put the target permanently
/// out of reach; failing beats looping forever.
const STALL_LIMIT: u32 = 3;

/// Writes one filler file per fill iteration.
pub trait FillerSink {
    /// Write a filler file of `len` bytes for iteration `index` and return
    /// its path.
    fn write_filler(&mut self, index: u32, len: u64) -> Result<PathBuf, WipecheckError>;
}

/// [`FillerSink`] that creates sequentially named files of random bytes in the
/// target volume's root.
///
/// Content is cryptographically irrelevant — only the allocation matters.
pub struct VolumeRootSink {
    root: PathBuf,
}

impl VolumeRootSink {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn filler_path(&self, index: u32) -> PathBuf {
        self.root.join(format!("fill{index:03}.dat"))
    }
}

impl FillerSink for VolumeRootSink {
    fn write_filler(&mut self, index: u32, len: u64) -> Result<PathBuf, WipecheckError> {
        let path = self.filler_path(index);
        let mut file = create_filler(&path)?;
        let mut rng = rand::rng();
        let mut buf = vec![0u8; FILLER_WRITE_CHUNK.min(len.max(1) as usize)];
        let mut remaining = len;
        while remaining > 0 {
            let n = buf.len().min(remaining as usize);
            rng.fill_bytes(&mut buf[..n]);
            file.write_all(&buf[..n])?;
            remaining -= n as u64;
        }
        // The next bitmap fetch must see this file's clusters as allocated
        file.sync_all()?;
        Ok(path)
    }
}

/// Create the filler file, routing through the extended-path form on Windows
/// so long volume-root paths cannot trip MAX_PATH.
fn create_filler(path: &Path) -> Result<File, WipecheckError> {
    if cfg!(windows) {
        let extended = path_ext::extended_path(&path.to_string_lossy());
        Ok(File::create(extended)?)
    } else {
        Ok(File::create(path)?)
    }
}

/// One fill invocation: target percentage, volume snapshot, and the files
/// written so far. Not persisted; lives only for the duration of [`run`].
///
/// [`run`]: FillSession::run
#[derive(Debug)]
pub struct FillSession<'a> {
    info: &'a VolumeInfo,
    target_percent: u32,
    iteration_index: u32,
    written: Vec<PathBuf>,
}

impl<'a> FillSession<'a> {
    /// Validates the target percentage before any I/O happens.
    pub fn new(info: &'a VolumeInfo, target_percent: u32) -> Result<Self, WipecheckError> {
        if target_percent == 0 || target_percent >= 100 {
            return Err(WipecheckError::InvalidArgument(format!(
                "target percentage must be between 1 and 99, got {target_percent}"
            )));
        }
        Ok(Self {
            info,
            target_percent,
            iteration_index: 1,
            written: Vec::new(),
        })
    }

    /// Drive the volume to the target occupancy, returning the paths written.
    ///
    /// Each iteration re-fetches the allocation bitmap, computes
    /// `floor(100 × allocated / total_clusters)`, and either stops or writes
    /// one filler file of ≈1% of the volume's total bytes. If the allocated
    /// count fails to advance for [`STALL_LIMIT`] consecutive iterations the
    /// session fails with `FillStalled`.
    pub fn run<B, S>(mut self, bitmaps: &mut B, sink: &mut S) -> Result<Vec<PathBuf>, WipecheckError>
    where
        B: BitmapSource,
        S: FillerSink,
    {
        let total_clusters = self.info.total_clusters;
        let filler_len = self.info.total_bytes() / 100;
        let whole_volume = [Extent::new(0, total_clusters - 1)];

        let mut last_allocated: Option<u64> = None;
        let mut stalled = 0u32;

        loop {
            let bitmap = bitmaps.volume_bitmap(total_clusters)?;
            let (free, allocated) = check_extents(&whole_volume, &bitmap);
            let occupancy = 100 * allocated / total_clusters;
            if occupancy >= self.target_percent as u64 {
                break;
            }

            if last_allocated.is_some_and(|prev| allocated <= prev) {
                stalled += 1;
                if stalled >= STALL_LIMIT {
                    return Err(WipecheckError::FillStalled {
                        iterations: stalled,
                        occupancy_percent: occupancy,
                    });
                }
            } else {
                stalled = 0;
            }
            last_allocated = Some(allocated);

            let path = sink.write_filler(self.iteration_index, filler_len)?;
            log::info!(
                "wrote {}: free {free}, allocated {allocated}",
                path.display()
            );
            self.written.push(path);
            self.iteration_index += 1;
        }

        Ok(self.written)
    }
}

/// Convenience wrapper: validate and run a fill in one call.
pub fn fill_to_percent<B, S>(
    info: &VolumeInfo,
    target_percent: u32,
    bitmaps: &mut B,
    sink: &mut S,
) -> Result<Vec<PathBuf>, WipecheckError>
where
    B: BitmapSource,
    S: FillerSink,
{
    FillSession::new(info, target_percent)?.run(bitmaps, sink)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::volume::AllocationBitmap;
    use std::cell::RefCell;
    use std::rc::Rc;

    /// Allocated-cluster count shared between the simulated bitmap source and
    /// the recording sink, so writes are visible to the next bitmap fetch.
    type SharedAllocated = Rc<RefCell<u64>>;

    struct SimulatedBitmaps {
        total_clusters: u64,
        allocated: SharedAllocated,
    }

    impl BitmapSource for SimulatedBitmaps {
        fn volume_bitmap(
            &mut self,
            cluster_count: u64,
        ) -> Result<AllocationBitmap, WipecheckError> {
            assert_eq!(cluster_count, self.total_clusters);
            let allocated = (*self.allocated.borrow()).min(self.total_clusters);
            let mut data = vec![0u8; (self.total_clusters as usize + 7) / 8];
            for cluster in 0..allocated {
                data[(cluster / 8) as usize] |= 1 << (cluster % 8);
            }
            Ok(AllocationBitmap::new(data, 0, cluster_count))
        }
    }

    /// Sink that records requested writes and bumps the shared allocation.
    struct RecordingSink {
        allocated: SharedAllocated,
        clusters_per_file: u64,
        sizes: Vec<u64>,
    }

    impl FillerSink for RecordingSink {
        fn write_filler(&mut self, index: u32, len: u64) -> Result<PathBuf, WipecheckError> {
            self.sizes.push(len);
            *self.allocated.borrow_mut() += self.clusters_per_file;
            Ok(PathBuf::from(format!("fill{index:03}.dat")))
        }
    }

    fn harness(
        allocated: u64,
        clusters_per_file: u64,
    ) -> (SimulatedBitmaps, RecordingSink) {
        let shared = Rc::new(RefCell::new(allocated));
        (
            SimulatedBitmaps {
                total_clusters: 1000,
                allocated: Rc::clone(&shared),
            },
            RecordingSink {
                allocated: shared,
                clusters_per_file,
                sizes: Vec::new(),
            },
        )
    }

    fn info(total_clusters: u64) -> VolumeInfo {
        VolumeInfo::new(512, 8, "NTFS", total_clusters).unwrap()
    }

    #[test]
    fn test_rejects_out_of_range_percent() {
        let info = info(1000);
        for bad in [0u32, 100, 250] {
            let err = FillSession::new(&info, bad).unwrap_err();
            assert!(matches!(err, WipecheckError::InvalidArgument(_)));
        }
    }

    #[test]
    fn test_already_at_target_writes_nothing() {
        let info = info(1000);
        let (mut bitmaps, mut sink) = harness(600, 10);
        let written = fill_to_percent(&info, 50, &mut bitmaps, &mut sink).unwrap();
        assert!(written.is_empty());
        assert!(sink.sizes.is_empty());
    }

    #[test]
    fn test_converges_to_target() {
        // 1000 clusters, 100 allocated (10%); each file allocates 10 clusters
        // (1% of the volume) → reaching 50% takes 40 files.
        let info = info(1000);
        let (mut bitmaps, mut sink) = harness(100, 10);
        let written = fill_to_percent(&info, 50, &mut bitmaps, &mut sink).unwrap();
        assert_eq!(written.len(), 40);
        assert_eq!(written[0], PathBuf::from("fill001.dat"));
        assert_eq!(written[39], PathBuf::from("fill040.dat"));
        // Each file is 1% of total volume bytes
        let expected = info.total_bytes() / 100;
        assert!(sink.sizes.iter().all(|&s| s == expected));
    }

    #[test]
    fn test_stalls_when_allocation_stops_advancing() {
        let info = info(1000);
        // Writes never change the bitmap
        let (mut bitmaps, mut sink) = harness(100, 0);
        let err = fill_to_percent(&info, 50, &mut bitmaps, &mut sink).unwrap_err();
        assert!(matches!(err, WipecheckError::FillStalled { .. }));
    }

    #[test]
    fn test_volume_root_sink_writes_expected_size() {
        let dir = tempfile::tempdir().unwrap();
        let mut sink = VolumeRootSink::new(dir.path());
        let path = sink.write_filler(7, 10_000).unwrap();
        assert_eq!(path.file_name().unwrap(), "fill007.dat");
        assert_eq!(std::fs::metadata(&path).unwrap().len(), 10_000);
    }

    #[test]
    fn test_volume_root_sink_sequential_names() {
        let sink = VolumeRootSink::new("/vol");
        assert_eq!(sink.filler_path(1), PathBuf::from("/vol/fill001.dat"));
        assert_eq!(sink.filler_path(123), PathBuf::from("/vol/fill123.dat"));
    }
}
