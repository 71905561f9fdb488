//! # eflalloc - An Explicit-Free-List Memory Allocator Library
//!
//! This crate provides a general-purpose **explicit-free-list allocator**
//! in Rust that manages memory in page-granular regions obtained through a
//! pluggable page provider (anonymous `mmap` by default).
//!
//! ## Overview
//!
//! ```text
//!   Explicit Free List Concept:
//!
//!   ┌──────────────────────────────────────────────────────────────────────┐
//!   │                        ONE MAPPED REGION                             │
//!   │                                                                      │
//!   │  ┌────────┬──────┬────────┬──────┬────────┬──────────────┬────────┐  │
//!   │  │prologue│ used │  FREE  │ used │  FREE  │     used     │epilogue│  │
//!   │  └────────┴──────┴───┬────┴──────┴───┬────┴──────────────┴────────┘  │
//!   │                      │       ▲       │      ▲                        │
//!   │                      ▼       │       ▼      │                        │
//!   │           free list: links live inside the free payloads            │
//!   │                                                                      │
//!   └──────────────────────────────────────────────────────────────────────┘
//!
//!   head ──► FREE #2 ◄──► FREE #1          (LIFO order, not address order)
//!
//!   Allocation walks the list first-fit; release coalesces with both
//!   neighbours through the boundary tags before re-listing.
//! ```
//!
//! ## Crate Structure
//!
//! ```text
//!   eflalloc
//!   ├── align      - Alignment macros (align!, align_up!)
//!   ├── block      - Boundary-tag block layout (internal)
//!   ├── efl        - The explicit free list (internal)
//!   ├── heap       - EflAllocator implementation
//!   └── pages      - PageProvider trait and the mmap-backed SystemPages
//! ```
//!
//! ## Quick Start
//!
//! ```rust
//! use eflalloc::{EflAllocator, SystemPages};
//!
//! let mut allocator = EflAllocator::new(SystemPages::new()).unwrap();
//!
//! unsafe {
//!     // Allocate memory for a u64
//!     let ptr = allocator.allocate(size_of::<u64>()) as *mut u64;
//!
//!     // Use the memory
//!     ptr.write(42);
//!     assert_eq!(42, ptr.read());
//!
//!     // Free the memory
//!     allocator.release(ptr as *mut u8);
//! }
//! ```
//!
//! ## How It Works
//!
//! Every block carries its size and allocated flag at both ends, so both
//! neighbours are reachable in O(1):
//!
//! ```text
//!   Single Block:
//!   ┌──────────┬───────────────────────────────────┬──────────┐
//!   │  Header  │             Payload               │  Footer  │
//!   │ size | a │  user data when allocated,        │ size | a │
//!   │          │  (prev, next) links when free     │          │
//!   └──────────┴───────────────────────────────────┴──────────┘
//!              ▲
//!              └── Pointer returned to user (16-byte aligned)
//! ```
//!
//! When no free block fits a request, the allocator maps a fresh region
//! sized at ten times the page-aligned request, which amortises provider
//! calls. A region whose blocks are all free again is returned to the
//! provider, except for the first region ever mapped: that one stays for
//! the allocator's lifetime so that an idle heap does not thrash `mmap`.
//!
//! ## Features
//!
//! - **First-fit with splitting**: large free blocks are split and the
//!   remainder stays allocatable
//! - **Exhaustive coalescing**: adjacent free blocks never coexist
//! - **Region recycling**: empty regions go back to the OS
//! - **Pluggable backing**: any [`PageProvider`] works; tests inject a
//!   recording provider with failure injection
//!
//! ## Limitations
//!
//! - **Single-threaded only**: no synchronization primitives
//! - **Fixed 16-byte alignment**: larger alignments are not supported
//! - **No realloc**: grow by allocate-copy-release
//! - **Unix-only default provider**: [`SystemPages`] requires `libc` and
//!   `mmap` (POSIX systems)
//!
//! ## Safety
//!
//! This crate is inherently unsafe as it deals with raw memory
//! management. All allocation and release operations require `unsafe`
//! blocks, and the caller is responsible for releasing each payload
//! exactly once and never touching it afterwards.

pub mod align;
mod block;
mod efl;
mod heap;
mod pages;

pub use block::ALIGNMENT;
pub use heap::{EflAllocator, InitError, PAGE_RATIO};
pub use pages::{PageProvider, SystemPages};
