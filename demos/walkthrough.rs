use std::io::Read;

use eflalloc::{ALIGNMENT, EflAllocator, PAGE_RATIO, PageProvider, SystemPages};

/// Waits until the user presses ENTER.
/// Useful when you want to inspect memory state with tools like `pmap`,
/// `htop`, `gdb`, or just watch the region trace lines as they happen.
fn block_until_enter_pressed() {
  println!("\n>>> Press ENTER to continue...");
  let _ = std::io::stdin().bytes().next();
}

/// Prints the outcome of an allocation: size, address, and alignment.
fn print_alloc(
  label: &str,
  size: usize,
  addr: *mut u8,
) {
  println!(
    "[{label}] allocated {size} bytes at {addr:p}, addr % {ALIGNMENT} = {}",
    addr as usize % ALIGNMENT,
  );
}

/// Forwards the allocator's region-lifecycle trace lines to stderr so the
/// `mmap`/`munmap` traffic is visible during the walkthrough.
struct StderrLogger;

impl log::Log for StderrLogger {
  fn enabled(
    &self,
    _metadata: &log::Metadata,
  ) -> bool {
    true
  }

  fn log(
    &self,
    record: &log::Record,
  ) {
    eprintln!("  [{}] {}", record.level(), record.args());
  }

  fn flush(&self) {}
}

static LOGGER: StderrLogger = StderrLogger;

fn main() {
  log::set_logger(&LOGGER).unwrap();
  log::set_max_level(log::LevelFilter::Trace);

  // The allocator maps its first region right here; that one is kept for
  // the allocator's whole lifetime.
  let mut allocator = EflAllocator::new(SystemPages::new()).unwrap();

  let page = allocator.provider().page_size();
  println!(
    "PID = {}, page size = {page}, primordial region = {} bytes",
    std::process::id(),
    page * PAGE_RATIO,
  );

  unsafe {
    block_until_enter_pressed();

    // --------------------------------------------------------------------
    // 1) Allocate space for a u32 (rounds up to the minimum block).
    // --------------------------------------------------------------------
    println!("\n[1] Allocate u32");
    let first = allocator.allocate(size_of::<u32>());
    print_alloc("1", size_of::<u32>(), first);

    // Write something into the allocated memory to show it's usable.
    let first_ptr = first as *mut u32;
    first_ptr.write(0xDEADBEEF);
    println!("[1] value written to first = 0x{:X}", first_ptr.read());

    block_until_enter_pressed();

    // --------------------------------------------------------------------
    // 2) Allocate a 100-byte buffer; it is carved from the same region,
    //    right behind the first block.
    // --------------------------------------------------------------------
    println!("\n[2] Allocate [u8; 100]");
    let second = allocator.allocate(100);
    print_alloc("2", 100, second);

    std::ptr::write_bytes(second, 0xAB, 100);
    println!("[2] initialized second with 0xAB");
    println!(
      "[2] second - first = {} bytes",
      second as usize - first as usize
    );

    block_until_enter_pressed();

    // --------------------------------------------------------------------
    // 3) Allocate a third block, then release the middle one. The freed
    //    block sits between two live ones, so nothing coalesces yet and
    //    no memory is returned to the OS.
    // --------------------------------------------------------------------
    println!("\n[3] Allocate a third block, release the middle one");
    let third = allocator.allocate(100);
    print_alloc("3", 100, third);

    allocator.release(second);
    println!("[3] released the middle block (no unmap expected)");

    block_until_enter_pressed();

    // --------------------------------------------------------------------
    // 4) Allocate 64 bytes: first-fit reuses the freed middle block.
    // --------------------------------------------------------------------
    println!("\n[4] Allocate 64 bytes (reuses the freed middle block)");
    let fourth = allocator.allocate(64);
    print_alloc("4", 64, fourth);
    println!(
      "[4] fourth == old second? {}",
      if fourth == second {
        "yes, the hole was reused"
      } else {
        "no, it went elsewhere"
      }
    );

    block_until_enter_pressed();

    // --------------------------------------------------------------------
    // 5) Allocate more than the primordial region can hold. Watch the
    //    trace: a fresh region is mapped for this request.
    // --------------------------------------------------------------------
    let big = page * PAGE_RATIO;
    println!("\n[5] Allocate {big} bytes (forces a fresh region)");
    let fifth = allocator.allocate(big);
    print_alloc("5", big, fifth);

    block_until_enter_pressed();

    // --------------------------------------------------------------------
    // 6) Release the big block. Its region is now completely empty and is
    //    handed back to the OS; the trace shows the munmap.
    // --------------------------------------------------------------------
    println!("\n[6] Release the big block (watch the unmap)");
    allocator.release(fifth);

    block_until_enter_pressed();

    // --------------------------------------------------------------------
    // 7) Release everything else. The primordial region empties but is
    //    deliberately kept mapped until the process exits.
    // --------------------------------------------------------------------
    println!("\n[7] Release the remaining blocks");
    allocator.release(first);
    allocator.release(third);
    allocator.release(fourth);
    println!("[7] heap is empty again; the primordial region stays mapped");
  }

  println!("\n[8] End of walkthrough. The OS reclaims the rest at exit.");
}
