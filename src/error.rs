use std::fmt;

/// Result alias for the handful of fallible public entry points.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors a caller of the public API can observe.
///
/// Contention (a lock-free retry budget exhausted) is never represented here:
/// it is always recovered locally by the component that hit it. What lands
/// in this enum are configuration mistakes and, in debug builds, the
/// protocol assertions described in the crate's design notes.
#[derive(Debug)]
pub enum Error {
    /// A configuration value was out of the range the engine can act on,
    /// e.g. a bucket count of zero.
    InvalidConfig {
        /// Name of the offending field.
        field: &'static str,
        /// Human-readable reason.
        reason: String,
    },
    /// An invariant of the node state machine was violated. This indicates
    /// a bug in the engine or in a user callback, not a recoverable runtime
    /// condition; constructing one of these is normally immediately followed
    /// by a panic rather than returned to a caller.
    ProtocolViolation {
        /// Key of the node that observed the violation.
        key: u64,
        /// What was expected/observed.
        detail: String,
    },
}

impl fmt::Display for Error {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::InvalidConfig { field, reason } => {
                write!(fmt, "invalid configuration for `{}`: {}", field, reason)
            }
            Error::ProtocolViolation { key, detail } => {
                write!(fmt, "protocol violation at node {}: {}", key, detail)
            }
        }
    }
}

impl std::error::Error for Error {}

/// Aborts with a [`Error::ProtocolViolation`]. Used at the handful of sites
/// where the state machine's own invariants would otherwise be broken; these
/// are bugs, not user-facing errors, so they never unwind past this point.
#[cold]
pub(crate) fn protocol_violation(key: u64, detail: impl Into<String>) -> ! {
    let err = Error::ProtocolViolation {
        key,
        detail: detail.into(),
    };
    panic!("{}", err);
}
