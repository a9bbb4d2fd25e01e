//! Run-list decoding: a filesystem's compact description of which clusters
//! back a file, turned into physical extents.
//!
//! A run list is a sequence of `(cumulative VCN, LCN)` pairs as returned by
//! FSCTL_GET_RETRIEVAL_POINTERS. The cumulative VCN gives each run's end
//! position in the file's logical stream; an LCN of −1 marks a sparse or
//! compression hole that consumes logical offset space but no clusters.
//! This is the most reproducibility-sensitive code in the crate: an off-by-one
//! here shifts every cluster classification downstream.

use crate::error::WipecheckError;
use crate::volume::AllocationBitmap;

/// LCN marker for a run with no physical backing.
pub const SPARSE_RUN_LCN: i64 = -1;

/// One entry of a file's run list.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunDescriptor {
    /// Cumulative virtual cluster number at the end of this run.
    pub cumulative_vcn: u64,
    /// Starting logical cluster number, or [`SPARSE_RUN_LCN`] for a hole.
    pub lcn: i64,
}

impl RunDescriptor {
    pub fn new(cumulative_vcn: u64, lcn: i64) -> Self {
        Self { cumulative_vcn, lcn }
    }
}

/// A physically contiguous range of clusters, inclusive on both ends.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Extent {
    pub start: u64,
    pub end: u64,
}

impl Extent {
    pub fn new(start: u64, end: u64) -> Self {
        debug_assert!(start <= end);
        Self { start, end }
    }

    /// Number of clusters covered by this extent.
    pub fn cluster_count(&self) -> u64 {
        self.end - self.start + 1
    }
}

/// Decode a run list into physical extents, lazily.
///
/// Each non-sparse run yields exactly one extent; physically adjacent runs are
/// never merged — that is a caller decision. Sparse runs yield nothing but
/// still advance the VCN cursor. The first run's length is its cumulative VCN
/// (implicit previous cumulative of 0).
///
/// A run whose cumulative VCN does not advance past the previous one has a
/// non-positive implied length and yields `MalformedRun`; so does a negative
/// LCN other than the sparse marker. Malformed input is surfaced, never
/// silently corrected.
pub fn decode_runs<I>(runs: I) -> impl Iterator<Item = Result<Extent, WipecheckError>>
where
    I: IntoIterator<Item = RunDescriptor>,
{
    let mut previous_vcn = 0u64;
    runs.into_iter().filter_map(move |run| {
        if run.cumulative_vcn <= previous_vcn {
            return Some(Err(WipecheckError::MalformedRun(format!(
                "cumulative VCN {} does not advance past {}",
                run.cumulative_vcn, previous_vcn
            ))));
        }
        let run_length = run.cumulative_vcn - previous_vcn;
        previous_vcn = run.cumulative_vcn;
        match run.lcn {
            SPARSE_RUN_LCN => None,
            lcn if lcn < 0 => Some(Err(WipecheckError::MalformedRun(format!(
                "negative LCN {lcn} is not a valid cluster"
            )))),
            lcn => Some(Ok(Extent::new(lcn as u64, lcn as u64 + run_length - 1))),
        }
    })
}

/// Cross-reference extents against an allocation bitmap.
///
/// Returns `(free, allocated)` cluster counts summed over all extents. The
/// fill controller applies this to the whole-volume extent
/// `[0, total_clusters − 1]`; wipe verification applies it to a single file's
/// decoded extents.
pub fn check_extents(extents: &[Extent], bitmap: &AllocationBitmap) -> (u64, u64) {
    let mut free = 0u64;
    let mut allocated = 0u64;
    for extent in extents {
        let set = bitmap.count_allocated_in(extent.start, extent.end);
        allocated += set;
        free += extent.cluster_count() - set;
    }
    (free, allocated)
}
