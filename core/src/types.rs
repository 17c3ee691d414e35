use std::io;

use crate::crypto::CryptoError;
use crate::headers::HeaderError;

/// Unified cipher stream error covering I/O, header, crypto and framing.
/// - Ergonomic `From<T>` impls enable `?` across the stream layer.
/// - Streams surface these through `io::Error` (the `Read`/`Write` contract);
///   `CipherError::from_io` recovers the typed error on the other side.
#[derive(Debug)]
pub enum CipherError {
    /// Underlying I/O failure.
    Io(io::Error),

    /// Input does not start with a known cipher stream header.
    NotEncrypted,

    /// Header recognized but damaged or unsupported.
    Header(HeaderError),

    /// Header is intact but the key check does not match the supplied key.
    WrongKey,

    /// A frame failed AEAD authentication.
    Authentication { frame_index: u64 },

    /// Stream ended before the final frame.
    Truncated,

    /// Frame layout is invalid (length, type, trailing data).
    MalformedFrame(String),

    /// ASCII armor could not be decoded.
    MalformedArmor(String),

    /// Cryptographic primitive failure (key length, KDF).
    Crypto(CryptoError),

    /// Generic validation with a descriptive message.
    Validation(String),
}

impl CipherError {
    /// True when the error is caused by the input or key rather than the
    /// environment.
    pub fn is_user_error(&self) -> bool {
        !matches!(self, CipherError::Io(_))
    }

    /// Wrap into an `io::Error` for `Read`/`Write` implementations.
    pub fn into_io(self) -> io::Error {
        match self {
            CipherError::Io(e) => e,
            other => io::Error::new(io::ErrorKind::InvalidData, other),
        }
    }

    /// Recover a typed error from an `io::Error` produced by `into_io`.
    pub fn from_io(err: io::Error) -> Self {
        let is_cipher = err
            .get_ref()
            .map(|inner| inner.is::<CipherError>())
            .unwrap_or(false);
        if !is_cipher {
            return CipherError::Io(err);
        }
        match err.into_inner().map(|inner| inner.downcast::<CipherError>()) {
            Some(Ok(typed)) => *typed,
            Some(Err(other)) => CipherError::Io(io::Error::new(io::ErrorKind::Other, other)),
            None => CipherError::Validation("empty io error".into()),
        }
    }
}

impl std::fmt::Display for CipherError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CipherError::Io(e) => write!(f, "I/O error: {}", e),
            CipherError::NotEncrypted => write!(f, "input is not an encrypted stream"),
            CipherError::Header(e) => write!(f, "header error: {}", e),
            CipherError::WrongKey => write!(f, "wrong key: key check mismatch"),
            CipherError::Authentication { frame_index } =>
                write!(f, "frame {} failed authentication", frame_index),
            CipherError::Truncated => write!(f, "stream truncated before final frame"),
            CipherError::MalformedFrame(msg) => write!(f, "malformed frame: {}", msg),
            CipherError::MalformedArmor(msg) => write!(f, "malformed armor: {}", msg),
            CipherError::Crypto(e) => write!(f, "crypto error: {}", e),
            CipherError::Validation(msg) => write!(f, "validation error: {}", msg),
        }
    }
}

impl std::error::Error for CipherError {}

impl From<io::Error> for CipherError {
    fn from(e: io::Error) -> Self {
        CipherError::from_io(e)
    }
}

impl From<HeaderError> for CipherError {
    fn from(e: HeaderError) -> Self {
        CipherError::Header(e)
    }
}

impl From<CryptoError> for CipherError {
    fn from(e: CryptoError) -> Self {
        CipherError::Crypto(e)
    }
}
