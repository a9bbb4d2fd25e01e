//! Per-platform bindings for the volume collaborators: metadata query, raw
//! volume open, allocation-bitmap fetch, and file retrieval pointers.
//!
//! The core components only ever see `Read + Seek`, [`VolumeInfo`] and
//! [`BitmapSource`](crate::volume::BitmapSource); everything OS-specific
//! lives here. Non-Windows builds compile but report the operations as
//! unsupported at runtime.
//!
//! [`VolumeInfo`]: crate::volume::VolumeInfo

#[cfg(windows)]
mod windows;
#[cfg(windows)]
pub use self::windows::{
    file_retrieval_pointers, open_volume_for_search, volume_info, VolumeBitmapSource,
};

#[cfg(not(windows))]
mod unsupported;
#[cfg(not(windows))]
pub use self::unsupported::{
    file_retrieval_pointers, open_volume_for_search, volume_info, VolumeBitmapSource,
};
