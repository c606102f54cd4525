use crate::GuestPtr;
use crate::Len;

/// PackedSlice combines a guest linear memory offset and a byte length into a
/// single u64 so a dynamically sized guest buffer's location can be returned
/// across the numeric-only ABI in one value
///
/// the offset always represents a position in wasm linear memory _never_ on
/// the host, and the length always represents u8 bytes _not_ items
///
/// canonical bit layout, the only one either side may use:
///
/// - bits 63..32: offset (u32)
/// - bits 31..0: length (u32)
///
/// a packed slice with a zero offset or a zero length is "empty": it decodes
/// to an empty value and the word carries no live buffer, so consumers must
/// not touch memory or the allocator for it
#[repr(transparent)]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PackedSlice(u64);

/// pure bit packing, no allocation, no failure mode
#[cfg_attr(feature = "fuzzing", test_fuzz::test_fuzz)]
pub fn pack(ptr: GuestPtr, len: Len) -> u64 {
    ((ptr as u64) << 32) | len as u64
}

/// exact inverse of [`pack`] for every 32-bit offset/length pair
#[cfg_attr(feature = "fuzzing", test_fuzz::test_fuzz)]
pub fn unpack(word: u64) -> (GuestPtr, Len) {
    ((word >> 32) as GuestPtr, word as Len)
}

impl PackedSlice {
    pub const EMPTY: Self = Self(0);

    pub fn new(ptr: GuestPtr, len: Len) -> Self {
        Self(pack(ptr, len))
    }

    /// wrap a word received over the ABI
    pub fn from_raw(word: u64) -> Self {
        Self(word)
    }

    /// the word as it travels over the ABI
    pub fn into_raw(self) -> u64 {
        self.0
    }

    pub fn ptr(&self) -> GuestPtr {
        unpack(self.0).0
    }

    pub fn len(&self) -> Len {
        unpack(self.0).1
    }

    /// gate every dereference and every allocator interaction on this
    pub fn is_empty(&self) -> bool {
        self.ptr() == 0 || self.len() == 0
    }
}
