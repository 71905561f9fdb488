//! # Explicit-Free-List Heap
//!
//! The allocator hands out blocks carved from *regions*, page-multiple
//! ranges obtained from a [`PageProvider`]. Free blocks across all regions
//! are threaded into one LIFO doubly-linked list (the `efl` module);
//! allocation is a first-fit walk of that list, release coalesces with
//! both neighbours through the boundary tags (the `block` module).
//!
//! ## Region layout
//!
//! Every region starts half an alignment unit in, so that each payload
//! (one header word past its block start) lands on a 16-byte boundary:
//!
//! ```text
//!        base
//!         │
//!         ▼
//!   ┌─────┬────────┬────────┬────────┬──               ──┬────────┬────────┐
//!   │ pad │ prolog │ prolog │ block  │     payload ...   │ block  │ epilog │
//!   │ 8 B │ header │ footer │ header │                   │ footer │  word  │
//!   └─────┴────────┴────────┴────────┴──               ──┴────────┴────────┘
//!         │◄─ (16|1)  (16|1) ─►│      ▲                            (0|1)
//!         │                    │      └── first payload, base + 32
//!         └── permanently allocated sentinels bound every traversal
//! ```
//!
//! The prologue block and the epilogue word are never handed out and never
//! freed. They terminate the neighbour stepping of the boundary-tag
//! protocol: a coalesce never has to ask whether a neighbour exists, only
//! whether it is allocated.
//!
//! ## Allocation
//!
//! ```text
//!   allocate(n):
//!     n == 0            → null, nothing changes
//!     round n up        → block size s = align(max(n, links) + overhead)
//!     first-fit search  → found? split if the remainder is viable, done
//!     miss              → map a fresh region (page-aligned request × 10),
//!                         push its interior block, search again
//!     map refused       → null, nothing changed
//! ```
//!
//! ## Release
//!
//! ```text
//!   release(p):
//!     mark free         → clear the allocated bit in header and footer
//!     coalesce          → absorb whichever neighbours are free (4 cases)
//!     region empty?     → merged block runs prologue to epilogue; unless
//!                         this is the primordial region, unlist it and
//!                         hand the whole region back to the provider
//! ```
//!
//! The primordial region, the one mapped on construction, is kept for
//! the allocator's lifetime, so a working set that briefly drops to zero
//! does not thrash the provider.

use std::ptr;

use log::trace;

use crate::block::{self, ALIGNMENT, MIN_PAYLOAD, OVERHEAD, REGION_OVERHEAD, WORD};
use crate::efl::FreeList;
use crate::pages::PageProvider;

/// How many page-aligned request sizes each mapped region spans.
///
/// Mapping more than asked amortises provider calls; a larger ratio means
/// fewer `map`s, a smaller one means tighter residency. Any positive value
/// is correct.
pub const PAGE_RATIO: usize = 10;

/// Failure to establish the primordial region.
#[derive(Debug, thiserror::Error)]
pub enum InitError {
  /// The page provider refused the initial mapping.
  #[error("page provider refused the initial {0}-byte mapping")]
  MapRefused(usize),
}

/// A first-fit, split-and-coalesce heap over an explicit free list.
///
/// All process-wide allocator state lives in this object: the free-list
/// anchor and the base of the primordial region. Independent instances are
/// fully isolated from one another.
///
/// # Thread safety
///
/// Not thread-safe: exactly one caller may be inside [`allocate`] or
/// [`release`] at a time. Wrap the allocator in external synchronization
/// for multi-threaded use.
///
/// [`allocate`]: Self::allocate
/// [`release`]: Self::release
pub struct EflAllocator<P: PageProvider> {
  /// Where regions come from and return to.
  pages: P,

  /// Anchor of the explicit free list, threaded through free payloads
  /// across all live regions.
  free: FreeList,

  /// Base of the first region ever mapped. Never unmapped, even when
  /// empty.
  primordial: *mut u8,
}

impl<P: PageProvider> EflAllocator<P> {
  /// Creates an allocator and establishes its primordial region by
  /// requesting one page-size worth (times [`PAGE_RATIO`]) from the
  /// provider.
  ///
  /// # Errors
  ///
  /// [`InitError::MapRefused`] when the provider cannot satisfy the
  /// initial mapping. No resources are held in that case.
  pub fn new(pages: P) -> Result<Self, InitError> {
    let mut heap = Self {
      pages,
      free: FreeList::new(),
      primordial: ptr::null_mut(),
    };

    let page = heap.pages.page_size();

    if unsafe { heap.extend(page) }.is_null() {
      return Err(InitError::MapRefused(page * PAGE_RATIO));
    }

    Ok(heap)
  }

  /// The page provider this allocator draws from.
  pub fn provider(&self) -> &P {
    &self.pages
  }

  /// Allocates `size` bytes and returns the payload address, aligned to
  /// [`ALIGNMENT`].
  ///
  /// Returns null when `size` is zero (nothing happens) or when no free
  /// block fits and the provider refuses a fresh region (the heap is left
  /// exactly as it was).
  ///
  /// # Safety
  ///
  /// The returned memory is valid until passed to [`release`]. The caller
  /// must not read past `size` bytes and must release each payload at
  /// most once.
  ///
  /// [`release`]: Self::release
  pub unsafe fn allocate(
    &mut self,
    size: usize,
  ) -> *mut u8 {
    // ignore spurious requests
    if size == 0 {
      return ptr::null_mut();
    }

    // A freed block must be able to hold the list links in its payload,
    // so never build a block smaller than that.
    let needed = crate::align!(size.max(MIN_PAYLOAD) + OVERHEAD);

    unsafe {
      let mut extended = false;

      loop {
        let found = self.free.first_fit(needed);

        if !found.is_null() {
          self.set_allocated(found, needed);
          return found;
        }

        // At most one extension per call: a successful extend always
        // creates a block large enough, so a second miss means the
        // provider refused.
        if extended || self.extend(needed).is_null() {
          return ptr::null_mut();
        }

        extended = true;
      }
    }
  }

  /// Releases a payload previously returned by [`allocate`].
  ///
  /// The block is marked free, merged with any free neighbours, and
  /// re-listed. When that leaves the enclosing region entirely empty and
  /// the region is not the primordial one, the whole region is returned
  /// to the provider.
  ///
  /// Releasing null is a no-op.
  ///
  /// # Safety
  ///
  /// `payload` must be null or a live address obtained from [`allocate`]
  /// on this allocator. Double release, foreign addresses, and any access
  /// to the payload after this call corrupt the heap silently.
  ///
  /// [`allocate`]: Self::allocate
  pub unsafe fn release(
    &mut self,
    payload: *mut u8,
  ) {
    if payload.is_null() {
      return;
    }

    unsafe {
      debug_assert!(
        block::is_allocated(payload),
        "release of a block that is not allocated"
      );

      let size = block::block_size(payload);
      block::set_block(payload, size, false);

      let merged = self.coalesce(payload);
      // coalescing may have grown the block and moved its payload
      let size = block::block_size(merged);

      // The region is empty when the merged block runs from the prologue
      // to the epilogue.
      if block::block_size(block::prev_block(merged)) == OVERHEAD
        && block::block_size(block::next_block(merged)) == 0
      {
        let base = merged.sub(REGION_OVERHEAD);

        if base == self.primordial {
          return;
        }

        self.free.remove(merged);

        // a single interior block plus the region bookkeeping must give
        // back exactly what was mapped
        debug_assert_eq!(0, (size + REGION_OVERHEAD) % self.pages.page_size());

        trace!(
          "unmapping empty {}-byte region at {:p}",
          size + REGION_OVERHEAD,
          base
        );
        self.pages.unmap(base, size + REGION_OVERHEAD);
      }
    }
  }

  /// Maps a fresh region large enough for a `needed`-byte block and
  /// installs its sentinels and interior free block.
  ///
  /// Returns the interior payload, or null when the provider refused; a
  /// refusal leaves the heap untouched.
  unsafe fn extend(
    &mut self,
    needed: usize,
  ) -> *mut u8 {
    let page = self.pages.page_size();
    let bytes = crate::align_up!(needed, page) * PAGE_RATIO;

    let base = unsafe { self.pages.map(bytes) };

    if base.is_null() {
      return ptr::null_mut();
    }

    trace!("mapped fresh {bytes}-byte region at {base:p}");

    unsafe {
      // prologue, half an alignment unit in so payloads land on aligned
      // addresses
      block::write_tag(base.add(ALIGNMENT / 2), block::pack(OVERHEAD, true));
      block::write_tag(base.add(ALIGNMENT / 2 + WORD), block::pack(OVERHEAD, true));

      // epilogue
      block::write_tag(base.add(bytes - WORD), block::pack(0, true));

      // everything in between is one free block
      let payload = base.add(REGION_OVERHEAD);
      block::set_block(payload, bytes - REGION_OVERHEAD, false);
      self.free.push_front(payload);

      if self.primordial.is_null() {
        self.primordial = base;
      }

      payload
    }
  }

  /// Marks a free block allocated, splitting off the tail as a new free
  /// block when the remainder is big enough to be worth listing.
  ///
  /// The split floor is the full region overhead: a remainder below that
  /// could never amortise its own bookkeeping, so the whole block is
  /// handed out instead and the difference stays as internal
  /// fragmentation.
  unsafe fn set_allocated(
    &mut self,
    payload: *mut u8,
    size: usize,
  ) {
    unsafe {
      let available = block::block_size(payload);

      if available - size >= REGION_OVERHEAD {
        block::set_block(payload, size, true);
        self.free.remove(payload);

        let remainder = block::next_block(payload);
        block::set_block(remainder, available - size, false);
        self.free.push_front(remainder);
      } else {
        block::set_block(payload, available, true);
        self.free.remove(payload);
      }
    }
  }

  /// Merges a just-freed block with whichever neighbours are free and
  /// returns the payload of the merged block.
  ///
  /// Ensures a block sits in the free list exactly once: when the
  /// predecessor absorbs the freed block, the predecessor's existing list
  /// node is reused and nothing is re-inserted.
  unsafe fn coalesce(
    &mut self,
    payload: *mut u8,
  ) -> *mut u8 {
    unsafe {
      let prev = block::prev_block(payload);
      let next = block::next_block(payload);

      let prev_allocated = block::tag_allocated(block::read_tag(block::footer_of(prev)));
      let next_allocated = block::tag_allocated(block::read_tag(block::header_of(next)));

      let mut size = block::block_size(payload);

      match (prev_allocated, next_allocated) {
        // no free neighbours
        (true, true) => {
          self.free.push_front(payload);
          payload
        }

        // absorb the next block and take over its place in the list
        (true, false) => {
          size += block::block_size(next);
          self.free.remove(next);
          block::set_block(payload, size, false);
          self.free.push_front(payload);
          payload
        }

        // grow the previous block; it is already listed
        (false, true) => {
          size += block::block_size(prev);
          block::write_tag(block::footer_of(payload), block::pack(size, false));
          block::write_tag(block::header_of(prev), block::pack(size, false));
          prev
        }

        // absorb both sides into the previous block
        (false, false) => {
          size += block::block_size(prev) + block::block_size(next);
          self.free.remove(next);
          block::write_tag(block::header_of(prev), block::pack(size, false));
          block::write_tag(block::footer_of(prev), block::pack(size, false));
          prev
        }
      }
    }
  }
}
