use thiserror::Error;

/// recoverable marshaling failures
///
/// allocator violations (freeing an address with no live allocation record)
/// are deliberately not represented here: they indicate host/guest protocol
/// desynchronization and abort the instance instead of propagating
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum HostRefError {
    /// while shuffling raw bytes back and forward between Vec<u8> and utf-8
    /// str values we have hit an invalid utf-8 string
    /// the host may legitimately hand us arbitrary bytes so this is reported
    /// rather than assumed away
    #[error("payload is not valid utf-8: {0}")]
    Utf8(String),
    /// a pointer or length failed to fit the 32-bit boundary representation
    /// almost certainly indicative of a critical bug somewhere
    #[error("pointer or length does not fit in 32 bits")]
    PointerMap,
}

impl From<std::string::FromUtf8Error> for HostRefError {
    fn from(e: std::string::FromUtf8Error) -> Self {
        HostRefError::Utf8(e.to_string())
    }
}

impl From<std::num::TryFromIntError> for HostRefError {
    fn from(_: std::num::TryFromIntError) -> Self {
        HostRefError::PointerMap
    }
}
