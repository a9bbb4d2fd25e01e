//! Win32 binding for the volume collaborators.
//!
//! Raw handles from `CreateFileW` are converted into `std::fs::File` via
//! `FromRawHandle`, so the scanner's `Read + Seek` bound binds directly to a
//! real volume. FSCTL control codes are defined locally rather than pulled
//! from the Ioctl bindings.

use std::ffi::c_void;
use std::fs::File;
use std::io;
use std::os::windows::io::{AsRawHandle, FromRawHandle};

use anyhow::{Context, Result};
use windows::core::PCWSTR;
use windows::Win32::Foundation::HANDLE;
use windows::Win32::Storage::FileSystem::{
    CreateFileW, GetDiskFreeSpaceW, GetVolumeInformationW, FILE_FLAGS_AND_ATTRIBUTES,
    FILE_SHARE_READ, FILE_SHARE_WRITE, OPEN_EXISTING,
};
use windows::Win32::System::IO::DeviceIoControl;

use crate::error::WipecheckError;
use crate::extents::RunDescriptor;
use crate::volume::{AllocationBitmap, BitmapSource, VolumeInfo};

const GENERIC_READ_ACCESS: u32 = 0x8000_0000;

const FSCTL_GET_VOLUME_BITMAP: u32 = 0x0009_006F;
const FSCTL_GET_RETRIEVAL_POINTERS: u32 = 0x0009_0073;

const ERROR_MORE_DATA: i32 = 234;
const ERROR_HANDLE_EOF: i32 = 38;

/// Convert a string to null-terminated UTF-16.
fn to_wide(s: &str) -> Vec<u16> {
    s.encode_utf16().chain(std::iter::once(0)).collect()
}

/// Win32 error code carried in a `windows` crate error.
fn win32_code(e: &windows::core::Error) -> i32 {
    e.code().0 & 0xFFFF
}

fn io_error(e: windows::core::Error) -> io::Error {
    io::Error::from_raw_os_error(win32_code(&e))
}

/// Query the metadata snapshot for a volume root like `E:\`.
pub fn volume_info(volume_root: &str) -> Result<VolumeInfo> {
    let root = if volume_root.ends_with('\\') {
        volume_root.to_string()
    } else {
        format!("{volume_root}\\")
    };
    let root_wide = to_wide(&root);

    let mut fs_name_buf = vec![0u16; 64];
    unsafe {
        GetVolumeInformationW(
            PCWSTR(root_wide.as_ptr()),
            None,
            None,
            None,
            None,
            Some(&mut fs_name_buf),
        )
        .with_context(|| format!("cannot query volume information for {root}"))?;
    }
    let end = fs_name_buf
        .iter()
        .position(|&c| c == 0)
        .unwrap_or(fs_name_buf.len());
    let filesystem = String::from_utf16_lossy(&fs_name_buf[..end]);

    let mut sectors_per_cluster = 0u32;
    let mut bytes_per_sector = 0u32;
    let mut free_clusters = 0u32;
    let mut total_clusters = 0u32;
    unsafe {
        GetDiskFreeSpaceW(
            PCWSTR(root_wide.as_ptr()),
            Some(&mut sectors_per_cluster),
            Some(&mut bytes_per_sector),
            Some(&mut free_clusters),
            Some(&mut total_clusters),
        )
        .with_context(|| format!("cannot query cluster geometry for {root}"))?;
    }

    let info = VolumeInfo::new(
        bytes_per_sector as u64,
        sectors_per_cluster as u64,
        filesystem,
        total_clusters as u64,
    )?;
    log::debug!(
        "volume {root}: {} ({} clusters of {} bytes)",
        info.filesystem,
        info.total_clusters,
        info.bytes_per_cluster()
    );
    Ok(info)
}

/// Open a volume for raw sequential reads.
///
/// Uses the `\\.\X:` device form with both share flags so the open succeeds
/// while the OS or another process holds the volume.
pub fn open_volume_for_search(volume: &str) -> Result<File> {
    let trimmed = volume.trim_end_matches('\\');
    let device = if trimmed.starts_with(r"\\.\") {
        trimmed.to_string()
    } else {
        format!(r"\\.\{trimmed}")
    };
    let wide = to_wide(&device);
    let handle = unsafe {
        CreateFileW(
            PCWSTR(wide.as_ptr()),
            GENERIC_READ_ACCESS,
            FILE_SHARE_READ | FILE_SHARE_WRITE,
            None,
            OPEN_EXISTING,
            FILE_FLAGS_AND_ATTRIBUTES(0),
            None,
        )
    }
    .with_context(|| format!("cannot open {device} for raw reads"))?;
    log::debug!("opened {device} for raw volume reads");
    Ok(unsafe { File::from_raw_handle(handle.0) })
}

/// [`BitmapSource`] backed by FSCTL_GET_VOLUME_BITMAP on its own volume
/// handle.
pub struct VolumeBitmapSource {
    handle: File,
}

impl VolumeBitmapSource {
    pub fn new(volume: &str) -> Result<Self> {
        Ok(Self {
            handle: open_volume_for_search(volume)?,
        })
    }
}

impl BitmapSource for VolumeBitmapSource {
    fn volume_bitmap(&mut self, cluster_count: u64) -> Result<AllocationBitmap, WipecheckError> {
        // STARTING_LCN_INPUT_BUFFER: one LARGE_INTEGER, from cluster 0
        let starting_lcn = 0u64.to_le_bytes();
        // VOLUME_BITMAP_BUFFER: StartingLcn (8) + BitmapSize (8) + bits
        let buf_len = 16 + (cluster_count as usize + 7) / 8 + 8;
        let mut buf = vec![0u8; buf_len];
        let mut returned = 0u32;

        let result = unsafe {
            DeviceIoControl(
                HANDLE(self.handle.as_raw_handle()),
                FSCTL_GET_VOLUME_BITMAP,
                Some(starting_lcn.as_ptr() as *const c_void),
                starting_lcn.len() as u32,
                Some(buf.as_mut_ptr() as *mut c_void),
                buf.len() as u32,
                Some(&mut returned),
                None,
            )
        };
        match result {
            Ok(()) => {}
            // A partial bitmap still covers the requested range when the
            // volume is larger than our buffer estimate
            Err(e) if win32_code(&e) == ERROR_MORE_DATA => {}
            Err(e) => return Err(WipecheckError::VolumeIo(io_error(e))),
        }
        if (returned as usize) < 16 {
            return Err(WipecheckError::VolumeIo(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                "volume bitmap response truncated",
            )));
        }

        let mut field = [0u8; 8];
        field.copy_from_slice(&buf[0..8]);
        let starting_cluster = u64::from_le_bytes(field);
        field.copy_from_slice(&buf[8..16]);
        let bit_count = u64::from_le_bytes(field).min(cluster_count);

        let data_len = ((bit_count as usize + 7) / 8).min(returned as usize - 16);
        buf.drain(..16);
        buf.truncate(data_len);
        Ok(AllocationBitmap::new(buf, starting_cluster, bit_count))
    }
}

/// Fetch a file's run list via FSCTL_GET_RETRIEVAL_POINTERS.
///
/// Returns the `(cumulative VCN, LCN)` pairs ready for
/// [`decode_runs`](crate::extents::decode_runs). A resident file with no
/// extents yields an empty list.
pub fn file_retrieval_pointers(file: &File) -> Result<Vec<RunDescriptor>> {
    let mut runs = Vec::new();
    let mut starting_vcn = 0u64;

    loop {
        let input = starting_vcn.to_le_bytes();
        let mut buf = vec![0u8; 64 * 1024];
        let mut returned = 0u32;

        let result = unsafe {
            DeviceIoControl(
                HANDLE(file.as_raw_handle()),
                FSCTL_GET_RETRIEVAL_POINTERS,
                Some(input.as_ptr() as *const c_void),
                input.len() as u32,
                Some(buf.as_mut_ptr() as *mut c_void),
                buf.len() as u32,
                Some(&mut returned),
                None,
            )
        };
        let more = match result {
            Ok(()) => false,
            // Resident data: the file has no extents at all
            Err(e) if win32_code(&e) == ERROR_HANDLE_EOF => return Ok(runs),
            Err(e) if win32_code(&e) == ERROR_MORE_DATA => true,
            Err(e) => {
                return Err(e).with_context(|| "cannot query retrieval pointers".to_string())
            }
        };

        // RETRIEVAL_POINTERS_BUFFER: ExtentCount (u32, 4 bytes padding),
        // StartingVcn (8), then (NextVcn, Lcn) pairs of 8 bytes each
        if (returned as usize) < 16 {
            anyhow::bail!("retrieval pointers response truncated");
        }
        let mut field = [0u8; 8];
        let mut count = [0u8; 4];
        count.copy_from_slice(&buf[0..4]);
        let extent_count = u32::from_le_bytes(count) as usize;

        let mut offset = 16usize;
        for _ in 0..extent_count {
            if offset + 16 > returned as usize {
                break;
            }
            field.copy_from_slice(&buf[offset..offset + 8]);
            let next_vcn = u64::from_le_bytes(field);
            field.copy_from_slice(&buf[offset + 8..offset + 16]);
            let lcn = u64::from_le_bytes(field) as i64;
            runs.push(RunDescriptor::new(next_vcn, lcn));
            starting_vcn = next_vcn;
            offset += 16;
        }

        if !more {
            return Ok(runs);
        }
    }
}
