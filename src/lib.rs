//! Verification harness for secure-deletion testing on raw volumes.
//!
//! Three cooperating pieces:
//! - [`extents`]: decode a file's run list into physical cluster extents and
//!   cross-reference them against the allocation bitmap.
//! - [`scan`]: sequential raw-volume search for residue of a known byte
//!   pattern, classifying each hit as allocated or free.
//! - [`fill`]: drive a volume to a target occupancy by writing filler files,
//!   re-reading the allocation bitmap between writes.
//!
//! Everything OS-specific (volume handles, FSCTL calls) is confined to [`os`];
//! the core components work against `Read + Seek` plus the
//! [`BitmapSource`](volume::BitmapSource) trait and are exercised entirely
//! in-memory by the test suite.

pub mod error;
pub mod extents;
pub mod fill;
pub mod os;
pub mod path_ext;
pub mod scan;
pub mod volume;

pub use error::WipecheckError;
