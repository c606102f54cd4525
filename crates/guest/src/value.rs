use crate::allocation;
use crate::host;
use crate::HostRefError;
use crate::PackedSlice;
use crate::RawHandle;

/// a value as the host stores it, one variant per marshalable kind
///
/// strings and byte buffers are the only variable-length payloads, everything
/// else crosses the boundary as a plain scalar argument
#[derive(Debug, Clone, PartialEq)]
pub enum HostValue {
    Str(String),
    Bytes(Vec<u8>),
    U32(u32),
    U64(u64),
    F32(f32),
    F64(f64),
    Bool(bool),
}

/// opaque identifier for a value the host owns in its own address space
///
/// the inner number is never a pointer into guest memory and the guest never
/// interprets its bits, it only holds it, passes it across the boundary and
/// eventually releases it with [`HostRef::free`]
///
/// HostRef intentionally implements neither Clone nor Copy: `free` consumes
/// the handle, so using one after release is a compile error rather than
/// undefined behavior at the host
#[repr(transparent)]
#[derive(Debug, PartialEq, Eq)]
pub struct HostRef(RawHandle);

impl HostRef {
    /// allocate a fresh host-owned handle and set its value
    ///
    /// always two-phase under the hood: one import call to obtain the handle,
    /// one typed import call to write the value
    pub fn new(value: &HostValue) -> Self {
        match value {
            HostValue::Str(s) => Self::from_string(s),
            HostValue::Bytes(b) => Self::from_bytes(b),
            HostValue::U32(v) => Self::from_u32(*v),
            HostValue::U64(v) => Self::from_u64(*v),
            HostValue::F32(v) => Self::from_f32(*v),
            HostValue::F64(v) => Self::from_f64(*v),
            HostValue::Bool(v) => Self::from_bool(*v),
        }
    }

    fn alloc() -> RawHandle {
        unsafe { host::__hostref_new() }
    }

    /// the guest buffer's location crosses as a (pointer, length) pair and
    /// the host copies the bytes out before the call returns, so borrowing
    /// is sufficient
    pub fn from_string(value: &str) -> Self {
        let handle = Self::alloc();
        unsafe { host::__hostref_set_string(handle, value.as_ptr(), value.len()) };
        Self(handle)
    }

    pub fn from_bytes(value: &[u8]) -> Self {
        let handle = Self::alloc();
        unsafe { host::__hostref_set_bytes(handle, value.as_ptr(), value.len()) };
        Self(handle)
    }

    pub fn from_bool(value: bool) -> Self {
        let handle = Self::alloc();
        unsafe { host::__hostref_set_bool(handle, value as u32) };
        Self(handle)
    }

    pub fn as_bool(&self) -> bool {
        unsafe { host::__hostref_as_bool(self.0) != 0 }
    }

    /// copy the handle's payload out of the transient buffer the host staged
    /// in guest memory
    pub fn as_bytes(&self) -> Vec<u8> {
        let slice = PackedSlice::from_raw(unsafe { host::__hostref_as_bytes(self.0) });
        take_transient(slice)
    }

    /// like [`HostRef::as_bytes`] plus utf-8 validation
    ///
    /// the transient buffer is released before validation, so a bad payload
    /// reports an error without leaking
    pub fn as_string(&self) -> Result<String, HostRefError> {
        let slice = PackedSlice::from_raw(unsafe { host::__hostref_as_string(self.0) });
        Ok(String::from_utf8(take_transient(slice))?)
    }

    /// release the host-owned value
    ///
    /// consumes the handle: the `Freed` state is terminal and the type system
    /// keeps it that way
    pub fn free(self) {
        unsafe { host::__hostref_drop(self.0) }
    }

    /// wrap a raw handle received as a guest export parameter
    pub fn from_abi(raw: RawHandle) -> Self {
        Self(raw)
    }

    /// unwrap for returning to the host from a guest export, after which the
    /// host owns the value and the guest holds no further responsibility
    pub fn into_abi(self) -> RawHandle {
        self.0
    }
}

macro_rules! scalar_impls {
    ( $( $kind:ident : $ty:ty ),* $(,)? ) => { paste::paste! {
        impl HostRef {
            $(
                pub fn [<from_ $kind>](value: $ty) -> Self {
                    let handle = Self::alloc();
                    unsafe { host::[<__hostref_set_ $kind>](handle, value) };
                    Self(handle)
                }

                pub fn [<as_ $kind>](&self) -> $ty {
                    unsafe { host::[<__hostref_as_ $kind>](self.0) }
                }
            )*
        }
    } };
}
scalar_impls!(u32: u32, u64: u64, f32: f32, f64: f64);

/// decode a packed slice returned by an `as` import and take ownership of the
/// transient buffer, which releases its allocation record exactly once
///
/// an empty slice was never backed by a buffer so it touches neither memory
/// nor the allocator
fn take_transient(slice: PackedSlice) -> Vec<u8> {
    if slice.is_empty() {
        return Vec::new();
    }
    let mut bytes = allocation::take(slice.ptr());
    bytes.truncate(slice.len() as usize);
    bytes
}

#[cfg(test)]
pub mod tests {
    use super::*;
    use crate::allocation;
    use std::sync::atomic::Ordering;

    fn releases() -> usize {
        allocation::RELEASES.load(Ordering::Relaxed)
    }

    #[test]
    fn scalar_round_trips() {
        let _serial = crate::tests::guard();

        let r = HostRef::from_u32(42);
        assert_eq!(42, r.as_u32());
        r.free();

        let r = HostRef::from_u64(u64::MAX - 1);
        assert_eq!(u64::MAX - 1, r.as_u64());
        r.free();

        let r = HostRef::from_f32(2.5);
        assert_eq!(2.5, r.as_f32());
        r.free();

        let r = HostRef::from_f64(3.141592653589793);
        assert_eq!(3.141592653589793, r.as_f64());
        r.free();

        let r = HostRef::from_bool(true);
        assert!(r.as_bool());
        r.free();

        let r = HostRef::from_bool(false);
        assert!(!r.as_bool());
        r.free();
    }

    #[test]
    fn string_round_trip_releases_exactly_once() {
        let _serial = crate::tests::guard();

        let live = allocation::live_allocations();
        let released = releases();

        let r = HostRef::from_string("hello");
        assert_eq!("hello", r.as_string().unwrap());
        r.free();

        assert_eq!(released + 1, releases());
        assert_eq!(live, allocation::live_allocations());
    }

    #[test]
    fn awkward_strings_round_trip() {
        let _serial = crate::tests::guard();

        for s in ["he\0llo\0", "héllo → ünïcode 🚀", "\0", "a"] {
            let r = HostRef::from_string(s);
            assert_eq!(s, r.as_string().unwrap());
            r.free();
        }
    }

    #[test]
    fn empty_payloads_skip_the_allocator() {
        let _serial = crate::tests::guard();

        let released = releases();

        let r = HostRef::from_string("");
        assert_eq!("", r.as_string().unwrap());
        r.free();

        let r = HostRef::from_bytes(&[]);
        assert!(r.as_bytes().is_empty());
        r.free();

        assert_eq!(released, releases());
    }

    #[test]
    fn bytes_round_trip() {
        let _serial = crate::tests::guard();

        let payload = [0u8, 1, 2, 3, 255, 254, 0, 128];
        let r = HostRef::from_bytes(&payload);
        assert_eq!(payload.to_vec(), r.as_bytes());
        r.free();
    }

    #[test]
    fn invalid_utf8_reports_and_still_releases() {
        let _serial = crate::tests::guard();

        let live = allocation::live_allocations();
        let released = releases();

        let r = HostRef::from_bytes(&[0xFF, 0xFE]);
        assert!(matches!(r.as_string(), Err(HostRefError::Utf8(_))));
        r.free();

        assert_eq!(released + 1, releases());
        assert_eq!(live, allocation::live_allocations());
    }

    #[test]
    fn constructor_union_matches_typed_constructors() {
        let _serial = crate::tests::guard();

        let r = HostRef::new(&HostValue::Str("abc".into()));
        assert_eq!("abc", r.as_string().unwrap());
        r.free();

        let r = HostRef::new(&HostValue::Bytes(vec![9, 8, 7]));
        assert_eq!(vec![9, 8, 7], r.as_bytes());
        r.free();

        let r = HostRef::new(&HostValue::U32(42));
        assert_eq!(42, r.as_u32());
        r.free();

        let r = HostRef::new(&HostValue::Bool(true));
        assert!(r.as_bool());
        r.free();
    }

    #[test]
    fn handles_survive_the_abi_boundary() {
        let _serial = crate::tests::guard();

        let raw = HostRef::from_u32(7).into_abi();
        let r = HostRef::from_abi(raw);
        assert_eq!(7, r.as_u32());
        r.free();
    }

    #[test]
    #[should_panic(expected = "stale handle access")]
    fn host_rejects_freed_handles() {
        let _serial = crate::tests::guard();

        let raw = HostRef::from_u32(1).into_abi();
        HostRef::from_abi(raw).free();
        HostRef::from_abi(raw).as_u32();
    }
}
