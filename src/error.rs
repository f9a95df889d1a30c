use std::{error, fmt, io};

// -------------------------------------------------------------------------------------------------

/// Errors reported by the control-thread API.
///
/// The render path never returns this type: a full event ring, an unknown
/// voice id, or a denormal filter state are logged and the render path
/// degrades (drops the event, finishes the voice) instead of propagating.
#[derive(Debug)]
pub enum Error {
    /// An argument passed to a control-thread call was out of range or
    /// otherwise meaningless (unknown channel, generator id, key range...).
    InvalidArgument(String),
    /// A lookup by id (preset, instrument, sample, voice) found nothing.
    NotFound(String),
    /// A fixed-size allocation (voice pool, delay line) could not be sized.
    OutOfMemory(String),
    /// The control -> render event ring was full; the event was dropped.
    RingOverflow,
    /// An I/O failure from a loader callback.
    IoError(io::Error),
    /// A call was made while the synth was in a state that forbids it.
    InvalidState(String),
    /// An unrecoverable internal inconsistency.
    Fatal(String),
}

impl error::Error for Error {}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidArgument(s) => write!(f, "invalid argument: {s}"),
            Self::NotFound(s) => write!(f, "not found: {s}"),
            Self::OutOfMemory(s) => write!(f, "out of memory: {s}"),
            Self::RingOverflow => write!(f, "event ring overflow"),
            Self::IoError(err) => err.fmt(f),
            Self::InvalidState(s) => write!(f, "invalid state: {s}"),
            Self::Fatal(s) => write!(f, "fatal: {s}"),
        }
    }
}

impl From<io::Error> for Error {
    fn from(err: io::Error) -> Error {
        Error::IoError(err)
    }
}
