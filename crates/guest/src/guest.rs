pub use hostref_common::*;

pub mod allocation;
pub(crate) mod host;
pub mod value;

pub use value::HostRef;
pub use value::HostValue;

/// declare additional host imports with numeric-only signatures
///
/// parameters and returns must be plain integers, floats, raw pointers or
/// [`RawHandle`]s, the only things the boundary can carry
///
/// ```ignore
/// host_externs!(
///     fn my_host_check(value: u32);
///     fn my_host_pair(x: u32, y: u32) -> u64;
/// );
/// ```
#[macro_export]
macro_rules! host_externs {
    ( $( fn $func_name:ident( $( $arg:ident : $ty:ty ),* ) $( -> $ret:ty )? ; )* ) => {
        #[link(wasm_import_module = "env")]
        extern "C" {
            $( fn $func_name( $( $arg : $ty ),* ) $( -> $ret )?; )*
        }
    };
}
