use std::io;

use thiserror::Error;

/// TFTP error codes (RFC 1350, RFC 2347).
#[repr(u16)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    NotDefined = 0,
    FileNotFound = 1,
    AccessViolation = 2,
    DiskFull = 3,
    IllegalOperation = 4,
    UnknownTransferId = 5,
    FileExists = 6,
    NoSuchUser = 7,
    OptionNegotiation = 8,
}

impl ErrorCode {
    pub fn as_u16(self) -> u16 {
        self as u16
    }

    pub fn from_u16(code: u16) -> Option<Self> {
        let code = match code {
            0 => ErrorCode::NotDefined,
            1 => ErrorCode::FileNotFound,
            2 => ErrorCode::AccessViolation,
            3 => ErrorCode::DiskFull,
            4 => ErrorCode::IllegalOperation,
            5 => ErrorCode::UnknownTransferId,
            6 => ErrorCode::FileExists,
            7 => ErrorCode::NoSuchUser,
            8 => ErrorCode::OptionNegotiation,
            _ => return None,
        };
        Some(code)
    }
}

/// Failure reported by a file-access backend.
///
/// The set is closed so that the session can pick an error code by kind.
#[derive(Debug, Error)]
pub enum BackendError {
    #[error("{0}")]
    NotFound(String),
    #[error("{0}")]
    PermissionDenied(String),
    #[error("{0}")]
    Other(String),
}

impl From<io::Error> for BackendError {
    fn from(err: io::Error) -> Self {
        let msg = err.to_string();
        match err.kind() {
            io::ErrorKind::NotFound => BackendError::NotFound(msg),
            io::ErrorKind::PermissionDenied => BackendError::PermissionDenied(msg),
            _ => BackendError::Other(msg),
        }
    }
}

#[derive(Debug, Error)]
pub enum TftpError {
    /// No acceptable reply after every send attempt.
    #[error("timeout")]
    Timeout,

    #[error("{0}")]
    Io(#[from] io::Error),

    #[error("{0}")]
    Malformed(String),

    #[error("{0}")]
    Negotiation(String),

    #[error(transparent)]
    Backend(#[from] BackendError),

    /// Streaming from an already opened file failed.
    #[error("{0}")]
    Read(io::Error),

    #[error("not supported")]
    Unsupported,

    #[error("illegal operation")]
    IllegalOperation,
}

impl TftpError {
    /// Code put on the wire when this error is reported to the peer.
    pub fn error_code(&self) -> ErrorCode {
        match self {
            TftpError::Backend(BackendError::NotFound(_)) => ErrorCode::FileNotFound,
            TftpError::Backend(BackendError::PermissionDenied(_)) => ErrorCode::AccessViolation,
            TftpError::Negotiation(_) => ErrorCode::OptionNegotiation,
            TftpError::IllegalOperation => ErrorCode::IllegalOperation,
            _ => ErrorCode::NotDefined,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backend_errors_map_to_codes() {
        let cases = [
            (BackendError::NotFound("x".into()), ErrorCode::FileNotFound),
            (BackendError::PermissionDenied("x".into()), ErrorCode::AccessViolation),
            (BackendError::Other("x".into()), ErrorCode::NotDefined),
        ];
        for (err, code) in cases {
            assert_eq!(TftpError::from(err).error_code(), code);
        }
    }

    #[test]
    fn io_kinds_become_backend_kinds() {
        let err = BackendError::from(io::Error::from(io::ErrorKind::NotFound));
        assert!(matches!(err, BackendError::NotFound(_)));

        let err = BackendError::from(io::Error::from(io::ErrorKind::PermissionDenied));
        assert!(matches!(err, BackendError::PermissionDenied(_)));

        let err = BackendError::from(io::Error::other("disk on fire"));
        assert!(matches!(err, BackendError::Other(ref m) if m == "disk on fire"));
    }

    #[test]
    fn protocol_errors_map_to_codes() {
        assert_eq!(
            TftpError::Negotiation("bad".into()).error_code(),
            ErrorCode::OptionNegotiation
        );
        assert_eq!(TftpError::Unsupported.error_code(), ErrorCode::NotDefined);
        assert_eq!(TftpError::IllegalOperation.error_code(), ErrorCode::IllegalOperation);
        assert_eq!(TftpError::Malformed("short".into()).error_code(), ErrorCode::NotDefined);
        assert_eq!(ErrorCode::from_u16(8), Some(ErrorCode::OptionNegotiation));
        assert_eq!(ErrorCode::from_u16(9), None);
    }
}
