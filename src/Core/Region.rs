// Memory region backend for the arena
// Uses an anonymous private mmap so the region is page-aligned and zeroed

use std::fmt::Debug;
use std::io;
use std::ptr::{self, NonNull};

/// A contiguous, process-private memory region reserved once at startup.
pub trait RegionBackend: Send + Sync + Debug {
    /// Get a pointer to the start of the mapped region
    fn as_ptr(&self) -> *mut u8;

    /// Get the size of the mapped region in bytes
    fn size(&self) -> usize;
}

/// Reserve a new zero-filled region of `size` bytes.
///
/// # Arguments
/// * `size` - Size of the region in bytes (must be non-zero)
///
/// # Returns
/// A boxed trait object implementing RegionBackend
pub fn create_region(size: usize) -> io::Result<Box<dyn RegionBackend>> {
    Ok(Box::new(AnonymousRegion::create(size)?))
}

#[derive(Debug)]
pub struct AnonymousRegion {
    ptr: NonNull<u8>,
    size: usize,
}

unsafe impl Send for AnonymousRegion {}
unsafe impl Sync for AnonymousRegion {}

impl AnonymousRegion {
    pub fn create(size: usize) -> io::Result<Self> {
        if size == 0 {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "region size must be greater than zero",
            ));
        }

        #[cfg(target_os = "linux")]
        let flags = libc::MAP_PRIVATE | libc::MAP_ANONYMOUS | libc::MAP_POPULATE;
        #[cfg(not(target_os = "linux"))]
        let flags = libc::MAP_PRIVATE | libc::MAP_ANON;

        let raw = unsafe {
            libc::mmap(
                ptr::null_mut(),
                size,
                libc::PROT_READ | libc::PROT_WRITE,
                flags,
                -1,
                0,
            )
        };
        if raw == libc::MAP_FAILED {
            return Err(io::Error::last_os_error());
        }

        let ptr = NonNull::new(raw as *mut u8).ok_or_else(|| {
            io::Error::new(io::ErrorKind::Other, "mmap returned a null mapping")
        })?;

        Ok(Self { ptr, size })
    }
}

impl Drop for AnonymousRegion {
    fn drop(&mut self) {
        unsafe {
            libc::munmap(self.ptr.as_ptr() as *mut libc::c_void, self.size);
        }
    }
}

impl RegionBackend for AnonymousRegion {
    fn as_ptr(&self) -> *mut u8 {
        self.ptr.as_ptr()
    }

    fn size(&self) -> usize {
        self.size
    }
}
