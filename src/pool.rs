//! Pooled working buffers.
//!
//! The engine's steady-state memory use is a small fixed working set:
//! one column end table per live row, one unquote scratch buffer per
//! binder, one output buffer per writer. All of them are rented from
//! per-thread free lists here and returned on drop of their owner, so a
//! long-running ingestion process churns no allocations per row.
//!
//! Buffers are returned uncleared; the data they held came from the
//! caller's own input or output stream.

use core::cell::RefCell;
use core::sync::atomic::{AtomicU64, Ordering};

/// Per-thread free-list length cap.
const MAX_POOLED: usize = 16;

/// Buffers above this capacity are dropped instead of pooled.
const MAX_POOLED_CAPACITY: usize = 4 << 20;

static RENTED: AtomicU64 = AtomicU64::new(0);
static RETURNED: AtomicU64 = AtomicU64::new(0);

thread_local! {
    static END_TABLES: RefCell<Vec<Vec<u32>>> = const { RefCell::new(Vec::new()) };
    static BYTE_BUFFERS: RefCell<Vec<Vec<u8>>> = const { RefCell::new(Vec::new()) };
}

/// Rent a column end table. Returned empty.
pub(crate) fn take_end_table() -> Vec<u32> {
    RENTED.fetch_add(1, Ordering::Relaxed);
    END_TABLES.with(|cell| cell.borrow_mut().pop()).unwrap_or_default()
}

/// Return a column end table to the current thread's free list.
pub(crate) fn give_end_table(mut table: Vec<u32>) {
    RETURNED.fetch_add(1, Ordering::Relaxed);
    if table.capacity() * core::mem::size_of::<u32>() > MAX_POOLED_CAPACITY {
        return;
    }
    table.clear();
    END_TABLES.with(|cell| {
        let mut pool = cell.borrow_mut();
        if pool.len() < MAX_POOLED {
            pool.push(table);
        }
    });
}

/// Rent a byte buffer (unquote scratch, writer output). Returned empty.
pub(crate) fn take_bytes() -> Vec<u8> {
    RENTED.fetch_add(1, Ordering::Relaxed);
    BYTE_BUFFERS.with(|cell| cell.borrow_mut().pop()).unwrap_or_default()
}

/// Return a byte buffer to the current thread's free list.
pub(crate) fn give_bytes(mut buf: Vec<u8>) {
    RETURNED.fetch_add(1, Ordering::Relaxed);
    if buf.capacity() > MAX_POOLED_CAPACITY {
        return;
    }
    buf.clear();
    BYTE_BUFFERS.with(|cell| {
        let mut pool = cell.borrow_mut();
        if pool.len() < MAX_POOLED {
            pool.push(buf);
        }
    });
}

/// Process-wide rental/return counters, in that order.
///
/// At quiescence (no live reader, binder, or writer) the two values are
/// equal; tests use this to verify the pool balances.
pub fn balance() -> (u64, u64) {
    (RENTED.load(Ordering::Relaxed), RETURNED.load(Ordering::Relaxed))
}
