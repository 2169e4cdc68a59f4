//! Read-only shared memory mapping
//!
//! Maps the producer's region once with `mmap(PROT_READ, MAP_SHARED)` and copies
//! it out on demand. The producer gives no change notification, so callers poll.

use std::fs::File;
use std::os::fd::AsRawFd;
use std::path::{Path, PathBuf};
use std::ptr::NonNull;

use tracing::{debug, trace, warn};

use crate::{LinkError, Result};

/// A read-only view of a shared memory file.
pub struct SharedMapping {
    base: NonNull<u8>,
    len: usize,
    path: PathBuf,
}

// SAFETY: the mapping is read-only for its whole lifetime and is unmapped only in Drop.
unsafe impl Send for SharedMapping {}
// SAFETY: no method hands out interior mutability; all access copies bytes out.
unsafe impl Sync for SharedMapping {}

impl SharedMapping {
    /// Map up to `len` bytes of `path`.
    ///
    /// If the file is shorter than `len` only the existing bytes are mapped, so
    /// reads never touch pages past end of file.
    pub fn open<P: AsRef<Path>>(path: P, len: usize) -> Result<Self> {
        let path = path.as_ref();
        trace!(path = %path.display(), len, "Mapping shared memory region");

        let file = File::open(path).map_err(|e| LinkError::io_error(path, e))?;
        let file_len = file.metadata().map_err(|e| LinkError::io_error(path, e))?.len() as usize;
        if file_len == 0 {
            return Err(LinkError::truncated(len, 0, 0));
        }
        let map_len = len.min(file_len);
        if map_len < len {
            warn!(
                path = %path.display(),
                requested = len,
                available = file_len,
                "Shared memory file is shorter than configured region size"
            );
        }

        // SAFETY: fd is a valid open descriptor, map_len is non-zero and within the file.
        let ptr = unsafe {
            libc::mmap(
                std::ptr::null_mut(),
                map_len,
                libc::PROT_READ,
                libc::MAP_SHARED,
                file.as_raw_fd(),
                0,
            )
        };
        if ptr == libc::MAP_FAILED {
            return Err(LinkError::io_error(path, std::io::Error::last_os_error()));
        }
        let base = NonNull::new(ptr as *mut u8)
            .ok_or_else(|| LinkError::io_error(path, std::io::Error::other("mmap returned null")))?;

        debug!(path = %path.display(), len = map_len, "Mapped shared memory region");
        Ok(Self { base, len: map_len, path: path.to_path_buf() })
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Copy the mapped region out.
    ///
    /// The producer may be writing concurrently, so the region is read twice and
    /// the copy accepted when both reads agree. After two disagreeing attempts the
    /// latest copy is returned.
    pub fn read(&self) -> Vec<u8> {
        let mut latest = self.copy_once();
        for attempt in 0..2 {
            let again = self.copy_once();
            if again == latest {
                return latest;
            }
            debug!(attempt = attempt + 1, "Region changed while reading, retrying");
            latest = again;
        }
        warn!("Region kept changing during read, using latest copy");
        latest
    }

    fn copy_once(&self) -> Vec<u8> {
        let mut out = vec![0u8; self.len];
        // SAFETY: base points to `len` readable bytes for the lifetime of self.
        unsafe {
            std::ptr::copy_nonoverlapping(self.base.as_ptr(), out.as_mut_ptr(), self.len);
        }
        out
    }
}

impl Drop for SharedMapping {
    fn drop(&mut self) {
        // SAFETY: base/len describe exactly the mapping created in open().
        let rc = unsafe { libc::munmap(self.base.as_ptr() as *mut libc::c_void, self.len) };
        if rc != 0 {
            warn!(path = %self.path.display(), "munmap failed: {}", std::io::Error::last_os_error());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn maps_and_reads_file_contents() {
        let mut file = tempfile::NamedTempFile::new().expect("temp file");
        let contents: Vec<u8> = (0..200u8).collect();
        file.write_all(&contents).expect("write");
        file.flush().expect("flush");

        let mapping = SharedMapping::open(file.path(), 1024).expect("mappable");
        assert_eq!(mapping.len(), 200);
        assert_eq!(mapping.read(), contents);
    }

    #[test]
    fn sees_producer_updates_without_remapping() {
        let mut file = tempfile::NamedTempFile::new().expect("temp file");
        file.write_all(&[0u8; 64]).expect("write");
        file.flush().expect("flush");

        let mapping = SharedMapping::open(file.path(), 64).expect("mappable");
        assert_eq!(mapping.read()[0], 0);

        let mut writer =
            std::fs::OpenOptions::new().write(true).open(file.path()).expect("reopen for write");
        writer.write_all(&[9u8; 64]).expect("rewrite in place");
        writer.flush().expect("flush");
        assert_eq!(mapping.read()[0], 9);
    }

    #[test]
    fn empty_and_missing_files_fail() {
        let file = tempfile::NamedTempFile::new().expect("temp file");
        assert!(matches!(SharedMapping::open(file.path(), 64), Err(LinkError::TruncatedBuffer { .. })));
        assert!(matches!(SharedMapping::open("/nonexistent/region", 64), Err(LinkError::Io { .. })));
    }
}
