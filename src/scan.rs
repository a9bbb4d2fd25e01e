//! Sequential full-volume residue scan.
//!
//! Reads the raw volume front to back looking for a byte pattern left behind
//! by an incomplete wipe, and classifies every hit by whether its cluster is
//! currently allocated.

use std::io::{Read, Seek, SeekFrom};

use crate::error::WipecheckError;
use crate::volume::{BitmapSource, VolumeInfo};

/// Read granularity for the sequential volume scan.
pub const SCAN_CHUNK_SIZE: usize = 512 * 1024;

/// Aggregate result of a full-volume scan.
///
/// `found` is true if the needle appeared anywhere; `matched_cluster` and
/// `was_allocated` describe the last hit processed (every hit is also logged
/// as it is found).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScanOutcome {
    pub found: bool,
    pub matched_cluster: Option<u64>,
    pub was_allocated: Option<bool>,
}

/// Scan the whole volume for `needle`, classifying each hit against the live
/// allocation bitmap.
///
/// The scan does not stop at the first match; it consumes the entire volume so
/// every residue site gets logged. A needle that straddles a chunk boundary is
/// a known miss of this chunked design.
///
/// A failed chunk read aborts the scan and reports `found == false`. That
/// outcome is inconclusive, not a verified-clean result — callers must not
/// conflate the two. Seek and bitmap-fetch failures are surfaced as errors.
pub fn scan_volume<R, B>(
    volume: &mut R,
    info: &VolumeInfo,
    needle: &[u8],
    bitmaps: &mut B,
) -> Result<ScanOutcome, WipecheckError>
where
    R: Read + Seek,
    B: BitmapSource,
{
    if needle.is_empty() {
        return Err(WipecheckError::InvalidArgument(
            "search pattern must not be empty".into(),
        ));
    }

    let bytes_per_cluster = info.bytes_per_cluster();
    let total_bytes = info.total_bytes();

    volume.seek(SeekFrom::Start(0))?;
    log::debug!(
        "scanning {} bytes ({} clusters of {} bytes)",
        total_bytes,
        info.total_clusters,
        bytes_per_cluster
    );

    let mut outcome = ScanOutcome::default();
    let mut chunk = vec![0u8; SCAN_CHUNK_SIZE];
    let mut bytes_remaining = total_bytes;

    while bytes_remaining > 0 {
        let n = match volume.read(&mut chunk) {
            // The device ended before the metadata said it would; nothing
            // more to search.
            Ok(0) => break,
            Ok(n) => n,
            Err(e) => {
                log::error!("read error while scanning volume: {e}");
                // Conservative abort: report not-found, discarding any
                // earlier hits. Inconclusive, not clean.
                return Ok(ScanOutcome::default());
            }
        };

        if let Some(offset) = find_needle(&chunk[..n], needle) {
            let absolute = (total_bytes - bytes_remaining) + offset as u64;
            let cluster = absolute / bytes_per_cluster;
            let bitmap = bitmaps.volume_bitmap(info.total_clusters)?;
            let allocated = bitmap.is_allocated(cluster);
            log::warn!("search pattern found near cluster {cluster}");
            if allocated {
                log::warn!("cluster {cluster} is allocated");
            } else {
                log::warn!("cluster {cluster} is free");
            }
            outcome.found = true;
            outcome.matched_cluster = Some(cluster);
            outcome.was_allocated = Some(allocated);
        }

        bytes_remaining = bytes_remaining.saturating_sub(n as u64);
    }

    Ok(outcome)
}

/// First occurrence of `needle` in `haystack`, if any.
fn find_needle(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    if needle.len() > haystack.len() {
        return None;
    }
    haystack.windows(needle.len()).position(|w| w == needle)
}
