pub mod packed;
pub mod result;

pub use packed::PackedSlice;
pub use result::HostRefError;

/// something like usize for wasm
/// wasm has a memory limit of 4GB so offsets and lengths fit in u32
///
/// the host reads and writes the guest's linear memory directly so both sides
/// need a predictable width for offsets and lengths, independent of whatever
/// `usize` happens to be on the host
pub type WasmSize = u32;

pub type Len = WasmSize;
pub type GuestPtr = WasmSize;

/// raw handle value as it crosses the ABI
/// 0 is never issued by the host so it can double as "no handle"
pub type RawHandle = u32;
