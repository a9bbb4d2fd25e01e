//! Volume metadata and the per-cluster allocation bitmap.
//!
//! One `VolumeInfo` snapshot is taken per operation and passed by reference
//! into the scanner and the fill controller, so cluster arithmetic lives in
//! exactly one place.

use crate::error::WipecheckError;

/// Immutable snapshot of a volume's geometry, taken once per operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VolumeInfo {
    pub bytes_per_sector: u64,
    pub sectors_per_cluster: u64,
    pub filesystem: String,
    pub total_clusters: u64,
}

impl VolumeInfo {
    /// Build a snapshot, validating the geometry up front.
    ///
    /// Zero-sized or nonsensical metadata is rejected here so the scanner and
    /// fill controller never see an invalid snapshot.
    pub fn new(
        bytes_per_sector: u64,
        sectors_per_cluster: u64,
        filesystem: impl Into<String>,
        total_clusters: u64,
    ) -> Result<Self, WipecheckError> {
        if bytes_per_sector < 512
            || bytes_per_sector > 4096
            || !bytes_per_sector.is_power_of_two()
        {
            return Err(WipecheckError::VolumeMetadata(format!(
                "invalid bytes per sector: {bytes_per_sector}"
            )));
        }
        if sectors_per_cluster == 0 {
            return Err(WipecheckError::VolumeMetadata(
                "sectors per cluster is zero".into(),
            ));
        }
        if total_clusters == 0 {
            return Err(WipecheckError::VolumeMetadata(
                "volume reports zero clusters".into(),
            ));
        }
        Ok(Self {
            bytes_per_sector,
            sectors_per_cluster,
            filesystem: filesystem.into(),
            total_clusters,
        })
    }

    pub fn bytes_per_cluster(&self) -> u64 {
        self.sectors_per_cluster * self.bytes_per_sector
    }

    pub fn total_bytes(&self) -> u64 {
        self.bytes_per_cluster() * self.total_clusters
    }
}

/// A point-in-time copy of the volume's allocation bitmap.
///
/// Bit `i` set means cluster `starting_cluster + i` is allocated. Bit order is
/// little-endian within each byte (bit 0 = LSB), matching what
/// FSCTL_GET_VOLUME_BITMAP returns.
pub struct AllocationBitmap {
    data: Vec<u8>,
    starting_cluster: u64,
    bit_count: u64,
}

impl AllocationBitmap {
    /// `bit_count` is the number of valid bits; bits beyond it in the last
    /// partial byte are ignored.
    pub fn new(data: Vec<u8>, starting_cluster: u64, bit_count: u64) -> Self {
        Self {
            data,
            starting_cluster,
            bit_count,
        }
    }

    /// Whether the given cluster is currently allocated.
    ///
    /// Clusters outside the mapped range report `false`.
    #[inline]
    pub fn is_allocated(&self, cluster: u64) -> bool {
        if cluster < self.starting_cluster {
            return false;
        }
        let index = cluster - self.starting_cluster;
        if index >= self.bit_count {
            return false;
        }
        let byte_idx = (index / 8) as usize;
        let bit_idx = (index % 8) as u32;
        if byte_idx >= self.data.len() {
            return false;
        }
        self.data[byte_idx] & (1u8 << bit_idx) != 0
    }

    /// Count allocated clusters in the inclusive range `[start, end]`.
    ///
    /// Full bytes are counted with popcount; the partial bytes at either edge
    /// are masked. Clusters outside the mapped range count as free.
    pub fn count_allocated_in(&self, start_cluster: u64, end_cluster: u64) -> u64 {
        if self.bit_count == 0 || end_cluster < start_cluster {
            return 0;
        }
        if end_cluster < self.starting_cluster {
            return 0;
        }
        let lo = start_cluster.saturating_sub(self.starting_cluster);
        let hi = (end_cluster - self.starting_cluster).min(self.bit_count - 1);
        if lo > hi {
            return 0;
        }

        let lo_byte = (lo / 8) as usize;
        let hi_byte = (hi / 8) as usize;
        if lo_byte >= self.data.len() {
            return 0;
        }
        let hi_byte = hi_byte.min(self.data.len() - 1);

        let lo_mask = !low_bits((lo % 8) as u32);
        let hi_mask = low_bits((hi % 8) as u32 + 1);

        if lo_byte == hi_byte {
            return (self.data[lo_byte] & lo_mask & hi_mask).count_ones() as u64;
        }

        let mut count = (self.data[lo_byte] & lo_mask).count_ones() as u64;
        for &byte in &self.data[lo_byte + 1..hi_byte] {
            count += byte.count_ones() as u64;
        }
        count += (self.data[hi_byte] & hi_mask).count_ones() as u64;
        count
    }
}

/// Byte mask with the lowest `n` bits set.
fn low_bits(n: u32) -> u8 {
    if n >= 8 {
        0xFF
    } else {
        (1u8 << n) - 1
    }
}

/// Supplies point-in-time allocation bitmaps for a volume.
///
/// The scanner fetches one per discovered hit; the fill controller fetches one
/// per iteration. Implementations query live filesystem state, so two fetches
/// may legitimately disagree.
pub trait BitmapSource {
    fn volume_bitmap(&mut self, cluster_count: u64) -> Result<AllocationBitmap, WipecheckError>;
}
