use crate::GuestPtr;
use crate::Len;
use once_cell::sync::Lazy;
use parking_lot::Mutex;
use std::collections::HashMap;

/// every live allocation keyed by the address handed out for it
///
/// existence of an entry is the sole proof that a buffer is currently owned
/// by this allocator, so a free for an address with no entry is a protocol
/// violation, not a recoverable condition
///
/// the host enters guest exports one at a time so the mutex is uncontended
/// under wasm, it only becomes load-bearing if exports are ever entered
/// concurrently
static ALLOCATIONS: Lazy<Mutex<HashMap<GuestPtr, Vec<u8>>>> =
    Lazy::new(|| Mutex::new(HashMap::new()));

#[cfg(not(target_arch = "wasm32"))]
static NEXT_ADDR: std::sync::atomic::AtomicU32 = std::sync::atomic::AtomicU32::new(16);

#[cfg(test)]
pub(crate) static RELEASES: std::sync::atomic::AtomicUsize =
    std::sync::atomic::AtomicUsize::new(0);

/// on wasm the address is the buffer's real position in linear memory, which
/// is what lets the host write payload bytes through it before the guest
/// reads them back out
#[cfg(target_arch = "wasm32")]
fn buffer_addr(buf: &[u8]) -> GuestPtr {
    buf.as_ptr() as GuestPtr
}

/// off-wasm there is no 32-bit linear memory to point into, so addresses are
/// synthetic nonzero ids and every access goes through the table
#[cfg(not(target_arch = "wasm32"))]
fn buffer_addr(_buf: &[u8]) -> GuestPtr {
    NEXT_ADDR.fetch_add(16, std::sync::atomic::Ordering::Relaxed)
}

/// reserve a zeroed buffer of `len` bytes and register it as live
///
/// a zero length is a valid no-op: it returns the null address and registers
/// nothing, matching the empty-slice rule on the decode side
pub fn allocate(len: Len) -> GuestPtr {
    if len == 0 {
        return 0;
    }
    let buf = vec![0u8; len as usize];
    let ptr = buffer_addr(&buf);
    tracing::trace!(ptr, len, "allocate");
    ALLOCATIONS.lock().insert(ptr, buf);
    ptr
}

/// release a previously allocated buffer
///
/// the null address is a no-op, any other address without a live record is
/// fatal
pub fn deallocate(ptr: GuestPtr) {
    if ptr == 0 {
        return;
    }
    drop(take(ptr));
}

/// remove the allocation record for `ptr` and take ownership of its backing
/// storage, the exactly-once release every non-empty transient buffer gets
///
/// a missing record means a double free or an address this allocator never
/// issued, both of which signal host/guest desynchronization: panicking here
/// traps the wasm instance rather than letting memory silently corrupt
pub(crate) fn take(ptr: GuestPtr) -> Vec<u8> {
    let entry = ALLOCATIONS.lock().remove(&ptr);
    match entry {
        Some(buf) => {
            #[cfg(test)]
            RELEASES.fetch_add(1, std::sync::atomic::Ordering::Relaxed);
            tracing::trace!(ptr, len = buf.len(), "release");
            buf
        }
        None => panic!("invalid free: no live allocation at address {ptr:#x}"),
    }
}

/// number of live allocation records, useful for leak diagnostics
pub fn live_allocations() -> usize {
    ALLOCATIONS.lock().len()
}

/// write payload bytes into a live allocation, standing in for the host
/// writing directly to linear memory
#[cfg(not(target_arch = "wasm32"))]
pub(crate) fn fill(ptr: GuestPtr, bytes: &[u8]) {
    let mut allocations = ALLOCATIONS.lock();
    match allocations.get_mut(&ptr) {
        Some(buf) => buf[..bytes.len()].copy_from_slice(bytes),
        None => panic!("write to unallocated address {ptr:#x}"),
    }
}

/// host-callable allocator entry point: stage a buffer the host can write a
/// payload into before a `set` call or during an `as` call
#[no_mangle]
pub extern "C" fn __hostref_malloc(len: Len) -> GuestPtr {
    allocate(len)
}

/// host-callable allocator entry point: release a staged buffer
#[no_mangle]
pub extern "C" fn __hostref_free(ptr: GuestPtr) {
    deallocate(ptr)
}

#[cfg(test)]
pub mod tests {
    use crate::allocation;

    #[test]
    fn zero_length_allocate_is_a_noop() {
        let _serial = crate::tests::guard();

        let live = allocation::live_allocations();
        assert_eq!(0, allocation::allocate(0));
        assert_eq!(live, allocation::live_allocations());

        // freeing the null address is equally a no-op
        allocation::deallocate(0);
        assert_eq!(live, allocation::live_allocations());
    }

    #[test]
    fn allocate_then_free() {
        let _serial = crate::tests::guard();

        let live = allocation::live_allocations();
        let ptr = allocation::allocate(100);
        assert_ne!(0, ptr);
        assert_eq!(live + 1, allocation::live_allocations());

        allocation::deallocate(ptr);
        assert_eq!(live, allocation::live_allocations());
    }

    #[test]
    fn exports_wrap_the_allocator() {
        let _serial = crate::tests::guard();

        let live = allocation::live_allocations();
        let ptr = allocation::__hostref_malloc(7);
        assert_ne!(0, ptr);
        assert_eq!(live + 1, allocation::live_allocations());
        allocation::__hostref_free(ptr);
        assert_eq!(live, allocation::live_allocations());
    }

    #[test]
    #[should_panic(expected = "invalid free")]
    fn double_free_is_fatal() {
        let _serial = crate::tests::guard();

        let ptr = allocation::allocate(3);
        allocation::deallocate(ptr);
        allocation::deallocate(ptr);
    }

    #[test]
    #[should_panic(expected = "invalid free")]
    fn foreign_free_is_fatal() {
        let _serial = crate::tests::guard();

        // never issued by the allocator: synthetic addresses are multiples
        // of 16 so this cannot collide with a live record
        allocation::deallocate(0xDEAD);
    }
}
