//! Error types
//!
//! The hub itself never fails: it reports a stopped stream through `false`
//! returns and closed subscriptions. These errors belong to the producer and
//! consumer collaborators that move bytes in and out of a hub.

use std::fmt;

/// Result alias for collaborator operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error type for ingest and serving operations
#[derive(Debug)]
pub enum Error {
    /// Socket or stream I/O failed
    Io(std::io::Error),
    /// A fixed-size frame ended before it was complete
    TruncatedFrame {
        /// Bytes the frame should have had
        expected: usize,
        /// Bytes actually read before end of stream
        got: usize,
    },
    /// A buffer pool cannot cover every value that may be in flight
    PoolTooSmall {
        /// Slots in the pool
        slots: usize,
        /// Slots needed to never overwrite an unread value
        required: usize,
    },
    /// The hub's delivery settings let values outlive a fixed buffer pool
    UnsafeDelivery {
        /// What makes the settings unsafe
        reason: &'static str,
    },
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Io(e) => write!(f, "I/O error: {}", e),
            Error::TruncatedFrame { expected, got } => {
                write!(f, "Truncated frame: expected {} bytes, got {}", expected, got)
            }
            Error::PoolTooSmall { slots, required } => write!(
                f,
                "Buffer pool too small: {} slots, {} required",
                slots, required
            ),
            Error::UnsafeDelivery { reason } => {
                write!(f, "Delivery unsafe for a fixed buffer pool: {}", reason)
            }
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Error::Io(e)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display() {
        let err = Error::TruncatedFrame {
            expected: 12,
            got: 5,
        };
        assert_eq!(err.to_string(), "Truncated frame: expected 12 bytes, got 5");

        let err = Error::PoolTooSmall {
            slots: 4,
            required: 7,
        };
        assert_eq!(err.to_string(), "Buffer pool too small: 4 slots, 7 required");

        let err = Error::UnsafeDelivery { reason: "drops" };
        assert_eq!(err.to_string(), "Delivery unsafe for a fixed buffer pool: drops");
        assert!(std::error::Error::source(&err).is_none());
    }

    #[test]
    fn test_from_io() {
        let io = std::io::Error::new(std::io::ErrorKind::UnexpectedEof, "eof");
        let err: Error = io.into();

        assert!(matches!(err, Error::Io(_)));
        assert!(std::error::Error::source(&err).is_some());
    }
}
