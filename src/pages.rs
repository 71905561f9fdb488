//! Page providers.
//!
//! The allocator never talks to the operating system directly; it obtains
//! and returns memory through the [`PageProvider`] trait. The production
//! implementation, [`SystemPages`], is a thin wrapper over anonymous
//! `mmap(2)` / `munmap(2)`. Tests substitute a recording provider with a
//! fixed page size and injectable failure.

use std::ptr;

use libc::{c_int, c_void, off_t, size_t};

/// Source of page-granular memory regions.
///
/// Implementations must hand out regions that are aligned to
/// [`page_size`](Self::page_size), sized as requested, zero-initialized,
/// and exclusive to the caller until returned through
/// [`unmap`](Self::unmap). The reported page size must be a power of two
/// and must not change over the provider's lifetime.
pub trait PageProvider {
  /// Maps a fresh region of exactly `bytes` bytes.
  ///
  /// Returns the region base, or null when the request cannot be
  /// satisfied.
  ///
  /// # Safety
  ///
  /// The caller takes ownership of the region and must return it through
  /// [`unmap`](Self::unmap) with the same length, or intentionally leave
  /// it mapped for the rest of the process lifetime.
  unsafe fn map(
    &mut self,
    bytes: usize,
  ) -> *mut u8;

  /// Returns a previously mapped region.
  ///
  /// # Safety
  ///
  /// `region` must be a base address obtained from [`map`](Self::map) on
  /// this provider, `bytes` must be the length it was mapped with, and no
  /// live pointers into the region may remain.
  unsafe fn unmap(
    &mut self,
    region: *mut u8,
    bytes: usize,
  );

  /// The fixed page granularity of this provider.
  fn page_size(&self) -> usize;
}

/// The host operating system's virtual memory, via anonymous private
/// mappings.
pub struct SystemPages {
  /// Cached result of `sysconf(_SC_PAGE_SIZE)`; the kernel's page size
  /// cannot change while the process runs.
  page_size: usize,
}

impl SystemPages {
  pub fn new() -> Self {
    let page_size = unsafe { libc::sysconf(libc::_SC_PAGE_SIZE) } as usize;

    Self { page_size }
  }
}

impl Default for SystemPages {
  fn default() -> Self {
    Self::new()
  }
}

impl PageProvider for SystemPages {
  unsafe fn map(
    &mut self,
    bytes: usize,
  ) -> *mut u8 {
    const PROT: c_int = libc::PROT_READ | libc::PROT_WRITE;
    const FLAGS: c_int = libc::MAP_PRIVATE | libc::MAP_ANONYMOUS;
    const FD: c_int = -1;
    const OFFSET: off_t = 0;

    let addr = unsafe {
      libc::mmap(ptr::null_mut::<c_void>(), bytes as size_t, PROT, FLAGS, FD, OFFSET)
    };

    if addr == libc::MAP_FAILED {
      return ptr::null_mut();
    }

    addr as *mut u8
  }

  unsafe fn unmap(
    &mut self,
    region: *mut u8,
    bytes: usize,
  ) {
    let rc = unsafe { libc::munmap(region as *mut c_void, bytes as size_t) };

    if rc != 0 {
      log::warn!("munmap of {bytes} bytes at {region:p} failed");
    }
  }

  fn page_size(&self) -> usize {
    self.page_size
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn page_size_is_a_power_of_two() {
    let pages = SystemPages::new();

    assert!(pages.page_size().is_power_of_two());
  }

  #[test]
  fn mapped_region_is_aligned_zeroed_and_writable() {
    let mut pages = SystemPages::new();
    let bytes = 2 * pages.page_size();

    unsafe {
      let region = pages.map(bytes);
      assert!(!region.is_null());
      assert_eq!(0, region as usize % pages.page_size());

      for offset in [0, 1, bytes / 2, bytes - 1] {
        assert_eq!(0, region.add(offset).read());
      }

      region.write(0xAB);
      region.add(bytes - 1).write(0xCD);
      assert_eq!(0xAB, region.read());
      assert_eq!(0xCD, region.add(bytes - 1).read());

      pages.unmap(region, bytes);
    }
  }

  #[test]
  fn map_and_unmap_round_trip_repeatedly() {
    let mut pages = SystemPages::new();
    let bytes = pages.page_size();

    unsafe {
      for _ in 0..32 {
        let region = pages.map(bytes);
        assert!(!region.is_null());
        pages.unmap(region, bytes);
      }
    }
  }
}
