//! Error types produced while parsing a PE image or running it through the
//! extraction pipeline.

use crate::alloc::string::String;
use core::fmt;
use core::result;

#[derive(Debug)]
pub enum Error {
    /// A `scroll` read/write failed — out-of-bounds or a context mismatch.
    Scroll(scroll::Error),
    /// A magic number didn't match what was expected (DOS/PE signature,
    /// optional header magic, ...).
    BadMagic(u64),
    /// The input was internally inconsistent in some way that isn't a
    /// simple bounds violation (bad section count, non-null-terminated
    /// import table that hit the sanity cap, ...).
    Malformed(String),
    /// A read needed more bytes than the buffer has left.
    BufferTooShort(usize, &'static str),
    /// Input was well-formed but describes something this pipeline doesn't
    /// support (e.g. a codegen target other than the stack-machine dialect).
    Unsupported(String),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Scroll(err) => write!(f, "{}", err),
            Error::BadMagic(magic) => write!(f, "invalid magic number: {:#x}", magic),
            Error::Malformed(msg) => write!(f, "malformed entity: {}", msg),
            Error::BufferTooShort(n, msg) => {
                write!(f, "buffer too short: {} ({})", msg, n)
            }
            Error::Unsupported(msg) => write!(f, "unsupported: {}", msg),
        }
    }
}

#[cfg(feature = "std")]
impl std::error::Error for Error {}

impl From<scroll::Error> for Error {
    fn from(err: scroll::Error) -> Self {
        Error::Scroll(err)
    }
}

pub type Result<T> = result::Result<T, Error>;
