//! Block layout and boundary tags.
//!
//! Every block managed by the allocator carries a one-word *tag* at each
//! end. The header and footer hold the same value: the total block size
//! with the allocated flag packed into bit 0.
//!
//! ```text
//!   ┌────────┬──────────────────────────────────┬────────┐
//!   │ header │             payload              │ footer │
//!   │ size|a │  (user data, or free-list links) │ size|a │
//!   └────────┴──────────────────────────────────┴────────┘
//!   ▲        ▲
//!   │        └── payload pointer (handed to the caller, 16-aligned)
//!   └── payload − one word
//! ```
//!
//! Sizes are always multiples of [`ALIGNMENT`], so the low four bits of a
//! tag are zero and bit 0 is free to hold the allocated flag. The mirrored
//! footer makes the *previous* neighbour reachable in O(1): the word just
//! before a block's header is the predecessor's footer and encodes its
//! size.
//!
//! # Safety contract
//!
//! All functions here do raw pointer arithmetic on payload pointers and are
//! sound only inside a region initialised by the heap: a prologue block at
//! the front and an epilogue tag at the back, both permanently allocated,
//! bound every neighbour step. [`links_of`] additionally reinterprets the
//! first two payload words as free-list links; that view is only valid
//! while the block's allocated bit is clear, and the heap flips between
//! the two views exclusively in its set-allocated and release paths.

use std::mem;

/// Alignment of every payload address returned by the allocator.
pub const ALIGNMENT: usize = 16;

/// One boundary-tag word.
pub(crate) const WORD: usize = mem::size_of::<usize>();

/// Per-block bookkeeping: one header plus one footer word.
pub(crate) const OVERHEAD: usize = 2 * WORD;

/// Per-region bookkeeping: leading padding, prologue header and footer,
/// and the trailing epilogue word.
pub(crate) const REGION_OVERHEAD: usize = 2 * OVERHEAD;

/// Free blocks must fit a pair of list links in their payload.
pub(crate) const MIN_PAYLOAD: usize = mem::size_of::<FreeLinks>();

/// The view of a *free* block's first two payload words.
///
/// `prev` and `next` are payload pointers of other free blocks, or null at
/// the ends of the list.
#[repr(C)]
pub(crate) struct FreeLinks {
  pub prev: *mut u8,
  pub next: *mut u8,
}

/// Combines a block size and its allocated flag into one tag word.
pub(crate) fn pack(
  size: usize,
  allocated: bool,
) -> usize {
  size | allocated as usize
}

/// Size stored in a tag word.
pub(crate) fn tag_size(tag: usize) -> usize {
  tag & !(ALIGNMENT - 1)
}

/// Allocated flag stored in a tag word.
pub(crate) fn tag_allocated(tag: usize) -> bool {
  tag & 1 == 1
}

/// Reads a tag word at `at`.
pub(crate) unsafe fn read_tag(at: *const u8) -> usize {
  unsafe { (at as *const usize).read() }
}

/// Writes a tag word at `at`.
pub(crate) unsafe fn write_tag(
  at: *mut u8,
  tag: usize,
) {
  unsafe { (at as *mut usize).write(tag) }
}

/// Header tag of the block owning `payload`.
pub(crate) unsafe fn header_of(payload: *mut u8) -> *mut u8 {
  unsafe { payload.sub(WORD) }
}

/// Footer tag of the block owning `payload`.
///
/// Reads the header first, so the header must already hold the block's
/// current size.
pub(crate) unsafe fn footer_of(payload: *mut u8) -> *mut u8 {
  unsafe { payload.add(block_size(payload)).sub(OVERHEAD) }
}

/// Total size of the block owning `payload`, header and footer included.
pub(crate) unsafe fn block_size(payload: *mut u8) -> usize {
  unsafe { tag_size(read_tag(header_of(payload))) }
}

/// Allocated flag of the block owning `payload`.
pub(crate) unsafe fn is_allocated(payload: *mut u8) -> bool {
  unsafe { tag_allocated(read_tag(header_of(payload))) }
}

/// Payload pointer of the next block in address order.
pub(crate) unsafe fn next_block(payload: *mut u8) -> *mut u8 {
  unsafe { payload.add(block_size(payload)) }
}

/// Payload pointer of the previous block in address order.
///
/// The word immediately before this block's header is the predecessor's
/// footer; its size field says how far back the predecessor's payload
/// starts.
pub(crate) unsafe fn prev_block(payload: *mut u8) -> *mut u8 {
  unsafe { payload.sub(tag_size(read_tag(payload.sub(OVERHEAD)))) }
}

/// Writes matching header and footer tags for the block owning `payload`.
///
/// The header is written first so the footer position can be derived from
/// the new size.
pub(crate) unsafe fn set_block(
  payload: *mut u8,
  size: usize,
  allocated: bool,
) {
  unsafe {
    write_tag(header_of(payload), pack(size, allocated));
    write_tag(footer_of(payload), pack(size, allocated));
  }
}

/// Free-list view of a free block's payload.
///
/// # Safety
///
/// The block's allocated bit must be clear and its payload must be at
/// least [`MIN_PAYLOAD`] bytes. The returned pointer aliases user memory;
/// it must not be used once the block is marked allocated again.
pub(crate) unsafe fn links_of(payload: *mut u8) -> *mut FreeLinks {
  payload as *mut FreeLinks
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn pack_round_trips_size_and_flag() {
    for size in [16usize, 48, 4096, 40928] {
      assert_eq!(size, tag_size(pack(size, true)));
      assert_eq!(size, tag_size(pack(size, false)));
      assert!(tag_allocated(pack(size, true)));
      assert!(!tag_allocated(pack(size, false)));
    }
  }

  // A 16-aligned scratch buffer standing in for a mapped region.
  #[repr(C, align(16))]
  struct Arena([u8; 256]);

  #[test]
  fn neighbour_stepping_follows_tags() {
    let mut arena = Arena([0; 256]);
    let base = arena.0.as_mut_ptr();

    unsafe {
      // Two adjacent blocks of 64 and 96 bytes starting one word in.
      let first = base.add(WORD);
      set_block(first, 64, true);
      let second = next_block(first);
      set_block(second, 96, false);

      assert_eq!(64, block_size(first));
      assert!(is_allocated(first));
      assert_eq!(96, block_size(second));
      assert!(!is_allocated(second));

      assert_eq!(second, first.add(64));
      assert_eq!(first, prev_block(second));
      assert_eq!(read_tag(header_of(first)), read_tag(footer_of(first)));
      assert_eq!(read_tag(header_of(second)), read_tag(footer_of(second)));
    }
  }
}
