//! Error types for Drishti

use std::time::Duration;

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;

/// Drishti error types
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// I/O error (sockets, files)
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration file could not be parsed
    #[error("Config parse error: {0}")]
    ConfigParse(#[from] toml::de::Error),

    /// Configuration value rejected at apply time
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Invalid parameter
    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    /// Capture device could not be opened
    #[error("Failed to open camera device {index}: {reason}")]
    DeviceOpen {
        /// Requested device index
        index: u32,
        /// Backend-specific reason
        reason: String,
    },

    /// Frame read from an open capture device failed
    #[error("Capture error: {0}")]
    Capture(String),

    /// Camera backend name not recognized
    #[error("Unknown camera backend: {0}")]
    UnknownBackend(String),

    /// Projection requested before intrinsics were supplied
    #[error("Camera intrinsics not set")]
    IntrinsicsNotSet,

    /// Calibration view submitted while no session is collecting
    #[error("Calibration session is not collecting")]
    CalibrationNotCollecting,

    /// Too few views to run the calibration solve
    #[error("Not enough calibration views: need {required}, have {available}")]
    NotEnoughViews {
        /// Minimum number of views
        required: usize,
        /// Views collected so far
        available: usize,
    },

    /// Calibration solver reported failure
    #[error("Calibration solve failed: {0}")]
    CalibrationFailed(String),

    /// Packet could not be encoded
    #[error("Packet encode error: {0}")]
    Encode(String),

    /// Thread could not be spawned
    #[error("Failed to spawn thread {0}")]
    ThreadSpawn(&'static str),

    /// Other error
    #[error("{0}")]
    Other(String),
}

/// Why a sonar datagram was dropped by the decoder.
///
/// Drops are expected on a lossy multicast link and are never surfaced as
/// errors; they only show up in receiver statistics and trace logs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DropReason {
    /// Shorter than header + trailer
    TooShort,
    /// First four bytes are not the RIP2 magic
    BadMagic,
    /// Declared length differs from datagram length
    BadLength,
    /// CRC-32 trailer does not match header + payload
    BadChecksum,
    /// Snappy block decompression failed
    DecompressFail,
    /// Envelope or inner message failed protobuf decoding
    SchemaMismatch,
    /// Envelope carried some other message type
    NotRangeImage,
}

impl DropReason {
    /// All reasons, in decode check order.
    pub const ALL: [DropReason; 7] = [
        DropReason::TooShort,
        DropReason::BadMagic,
        DropReason::BadLength,
        DropReason::BadChecksum,
        DropReason::DecompressFail,
        DropReason::SchemaMismatch,
        DropReason::NotRangeImage,
    ];

    /// Stable label for logs and stats
    pub fn as_str(self) -> &'static str {
        match self {
            DropReason::TooShort => "too_short",
            DropReason::BadMagic => "bad_magic",
            DropReason::BadLength => "bad_length",
            DropReason::BadChecksum => "bad_checksum",
            DropReason::DecompressFail => "decompress_fail",
            DropReason::SchemaMismatch => "schema_mismatch",
            DropReason::NotRangeImage => "not_range_image",
        }
    }

    /// Position in [`DropReason::ALL`]
    pub(crate) fn index(self) -> usize {
        self as usize
    }
}

impl std::fmt::Display for DropReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of one acquisition loop iteration.
///
/// Receiver loops never return; they act on this value instead:
/// - `Ok`: continue immediately
/// - `Idle`: nothing to do, sleep for the given duration
/// - `Transient`: recoverable miss, keep resources and sleep for `backoff`
/// - `Fatal`: tear down the owned resource and re-establish it next cycle
#[derive(Debug)]
pub enum LoopStep {
    Ok,
    Idle(Duration),
    Transient { error: Error, backoff: Duration },
    Fatal(Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_drop_reason_labels_unique() {
        let mut labels: Vec<_> = DropReason::ALL.iter().map(|r| r.as_str()).collect();
        labels.sort();
        labels.dedup();
        assert_eq!(labels.len(), DropReason::ALL.len());
    }

    #[test]
    fn test_drop_reason_index_matches_order() {
        for (i, reason) in DropReason::ALL.iter().enumerate() {
            assert_eq!(reason.index(), i);
        }
    }

    #[test]
    fn test_error_display() {
        let err = Error::DeviceOpen {
            index: 3,
            reason: "no such device".to_string(),
        };
        assert_eq!(err.to_string(), "Failed to open camera device 3: no such device");
    }
}
