//! the import surface the managed host provides to the guest
//!
//! every signature is numeric-only: handles are u32, variable-length payloads
//! travel as (pointer, length) parameter pairs on the way in and as a
//! [`PackedSlice`](crate::PackedSlice) word on the way out
//!
//! off-wasm the same surface is implemented by an in-process stand-in so the
//! marshaling paths can be exercised by native tests

#[cfg(target_arch = "wasm32")]
mod abi {
    use crate::RawHandle;

    #[link(wasm_import_module = "env")]
    extern "C" {
        pub fn __hostref_new() -> RawHandle;
        pub fn __hostref_set_string(handle: RawHandle, ptr: *const u8, len: usize);
        pub fn __hostref_set_bytes(handle: RawHandle, ptr: *const u8, len: usize);
        pub fn __hostref_set_u32(handle: RawHandle, value: u32);
        pub fn __hostref_set_u64(handle: RawHandle, value: u64);
        pub fn __hostref_set_f32(handle: RawHandle, value: f32);
        pub fn __hostref_set_f64(handle: RawHandle, value: f64);
        pub fn __hostref_set_bool(handle: RawHandle, value: u32);
        pub fn __hostref_as_string(handle: RawHandle) -> u64;
        pub fn __hostref_as_bytes(handle: RawHandle) -> u64;
        pub fn __hostref_as_u32(handle: RawHandle) -> u32;
        pub fn __hostref_as_u64(handle: RawHandle) -> u64;
        pub fn __hostref_as_f32(handle: RawHandle) -> f32;
        pub fn __hostref_as_f64(handle: RawHandle) -> f64;
        pub fn __hostref_as_bool(handle: RawHandle) -> u32;
        pub fn __hostref_drop(handle: RawHandle);
    }
}

#[cfg(target_arch = "wasm32")]
pub(crate) use abi::*;

#[cfg(not(target_arch = "wasm32"))]
mod native {
    use crate::allocation;
    use crate::value::HostValue;
    use crate::Len;
    use crate::PackedSlice;
    use crate::RawHandle;
    use once_cell::sync::Lazy;
    use parking_lot::Mutex;

    /// a handle's slot in the stand-in host store
    ///
    /// `Vacant` means freed or never issued, so any access to it is a stale
    /// handle and fails loudly instead of returning stale data
    #[derive(Debug)]
    enum Slot {
        Vacant,
        Unset,
        Set(HostValue),
    }

    /// host-side store of live values, a slot vector with a free-slot stack
    ///
    /// handles are slot indexes offset by one so the null handle 0 is never
    /// issued and cannot collide with "no handle"
    struct RefStore {
        slots: Vec<Slot>,
        empty_slots: Vec<usize>,
    }

    impl RefStore {
        const fn new() -> Self {
            Self {
                slots: Vec::new(),
                empty_slots: Vec::new(),
            }
        }

        fn register(&mut self) -> RawHandle {
            let idx = match self.empty_slots.pop() {
                Some(idx) => {
                    debug_assert!(matches!(self.slots[idx], Slot::Vacant));
                    self.slots[idx] = Slot::Unset;
                    idx
                }
                None => {
                    self.slots.push(Slot::Unset);
                    self.slots.len() - 1
                }
            };
            (idx + 1) as RawHandle
        }

        fn slot_mut(&mut self, handle: RawHandle) -> &mut Slot {
            let idx = (handle as usize)
                .checked_sub(1)
                .filter(|idx| *idx < self.slots.len());
            match idx {
                Some(idx) if !matches!(self.slots[idx], Slot::Vacant) => &mut self.slots[idx],
                _ => panic!("stale handle access: {handle}"),
            }
        }

        fn set(&mut self, handle: RawHandle, value: HostValue) {
            *self.slot_mut(handle) = Slot::Set(value);
        }

        fn get(&mut self, handle: RawHandle) -> &HostValue {
            match self.slot_mut(handle) {
                Slot::Set(value) => value,
                Slot::Unset => panic!("access to handle {handle} before any value was set"),
                Slot::Vacant => unreachable!(),
            }
        }

        fn drop_ref(&mut self, handle: RawHandle) {
            *self.slot_mut(handle) = Slot::Vacant;
            self.empty_slots.push(handle as usize - 1);
        }
    }

    static STORE: Lazy<Mutex<RefStore>> = Lazy::new(|| Mutex::new(RefStore::new()));

    /// stage a variable-length payload the way the wasm host does: write it
    /// into a buffer obtained from the guest allocator and hand back its
    /// location as a packed slice, or the empty word when there is nothing
    /// to stage
    fn stage_payload(handle: RawHandle) -> u64 {
        let mut store = STORE.lock();
        let bytes: &[u8] = match store.get(handle) {
            HostValue::Str(s) => s.as_bytes(),
            HostValue::Bytes(b) => b,
            other => panic!("unsupported conversion to payload: {other:?}"),
        };
        if bytes.is_empty() {
            return PackedSlice::EMPTY.into_raw();
        }
        let ptr = allocation::allocate(bytes.len() as Len);
        allocation::fill(ptr, bytes);
        PackedSlice::new(ptr, bytes.len() as Len).into_raw()
    }

    pub(crate) unsafe fn __hostref_new() -> RawHandle {
        STORE.lock().register()
    }

    pub(crate) unsafe fn __hostref_set_string(handle: RawHandle, ptr: *const u8, len: usize) {
        let bytes = if len == 0 {
            Vec::new()
        } else {
            std::slice::from_raw_parts(ptr, len).to_vec()
        };
        let value = match String::from_utf8(bytes) {
            Ok(s) => HostValue::Str(s),
            Err(e) => panic!("host received an invalid utf-8 string payload: {e}"),
        };
        STORE.lock().set(handle, value);
    }

    pub(crate) unsafe fn __hostref_set_bytes(handle: RawHandle, ptr: *const u8, len: usize) {
        let bytes = if len == 0 {
            Vec::new()
        } else {
            std::slice::from_raw_parts(ptr, len).to_vec()
        };
        STORE.lock().set(handle, HostValue::Bytes(bytes));
    }

    pub(crate) unsafe fn __hostref_set_u32(handle: RawHandle, value: u32) {
        STORE.lock().set(handle, HostValue::U32(value));
    }

    pub(crate) unsafe fn __hostref_set_u64(handle: RawHandle, value: u64) {
        STORE.lock().set(handle, HostValue::U64(value));
    }

    pub(crate) unsafe fn __hostref_set_f32(handle: RawHandle, value: f32) {
        STORE.lock().set(handle, HostValue::F32(value));
    }

    pub(crate) unsafe fn __hostref_set_f64(handle: RawHandle, value: f64) {
        STORE.lock().set(handle, HostValue::F64(value));
    }

    pub(crate) unsafe fn __hostref_set_bool(handle: RawHandle, value: u32) {
        STORE.lock().set(handle, HostValue::Bool(value != 0));
    }

    pub(crate) unsafe fn __hostref_as_string(handle: RawHandle) -> u64 {
        stage_payload(handle)
    }

    pub(crate) unsafe fn __hostref_as_bytes(handle: RawHandle) -> u64 {
        stage_payload(handle)
    }

    pub(crate) unsafe fn __hostref_as_u32(handle: RawHandle) -> u32 {
        match STORE.lock().get(handle) {
            HostValue::U32(v) => *v,
            other => panic!("unsupported conversion to u32: {other:?}"),
        }
    }

    pub(crate) unsafe fn __hostref_as_u64(handle: RawHandle) -> u64 {
        match STORE.lock().get(handle) {
            HostValue::U64(v) => *v,
            other => panic!("unsupported conversion to u64: {other:?}"),
        }
    }

    pub(crate) unsafe fn __hostref_as_f32(handle: RawHandle) -> f32 {
        match STORE.lock().get(handle) {
            HostValue::F32(v) => *v,
            other => panic!("unsupported conversion to f32: {other:?}"),
        }
    }

    pub(crate) unsafe fn __hostref_as_f64(handle: RawHandle) -> f64 {
        match STORE.lock().get(handle) {
            HostValue::F64(v) => *v,
            other => panic!("unsupported conversion to f64: {other:?}"),
        }
    }

    pub(crate) unsafe fn __hostref_as_bool(handle: RawHandle) -> u32 {
        match STORE.lock().get(handle) {
            HostValue::Bool(v) => *v as u32,
            other => panic!("unsupported conversion to bool: {other:?}"),
        }
    }

    pub(crate) unsafe fn __hostref_drop(handle: RawHandle) {
        STORE.lock().drop_ref(handle);
    }
}

#[cfg(not(target_arch = "wasm32"))]
pub(crate) use native::*;
