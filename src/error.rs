//! Error types for the laptop catalog service.

use tonic::Status;

/// Main error type for the library.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// A record with the same key is already stored.
    #[error("record already exists: {0}")]
    AlreadyExists(String),

    /// The requested record does not exist.
    #[error("record not found: {0}")]
    NotFound(String),

    /// The caller supplied a malformed or out-of-range value.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// The call carried no credentials, or the credentials did not verify.
    #[error("unauthenticated: {0}")]
    Unauthenticated(String),

    /// The verified identity is not allowed to perform the call.
    #[error("permission denied: {0}")]
    PermissionDenied(String),

    /// The caller cancelled the call.
    #[error("request is cancelled")]
    Canceled,

    /// The call ran past its deadline.
    #[error("deadline is exceeded")]
    DeadlineExceeded,

    /// An unexpected failure (id generation, persistence I/O, ...).
    #[error("internal error: {0}")]
    Internal(String),
}

impl From<Error> for Status {
    fn from(err: Error) -> Self {
        let message = err.to_string();
        match err {
            Error::AlreadyExists(_) => Status::already_exists(message),
            Error::NotFound(_) => Status::not_found(message),
            Error::InvalidArgument(_) => Status::invalid_argument(message),
            Error::Unauthenticated(_) => Status::unauthenticated(message),
            Error::PermissionDenied(_) => Status::permission_denied(message),
            Error::Canceled => Status::cancelled(message),
            Error::DeadlineExceeded => Status::deadline_exceeded(message),
            Error::Internal(_) => Status::internal(message),
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::Internal(err.to_string())
    }
}

impl From<Status> for Error {
    fn from(status: Status) -> Self {
        let message = status.message().to_string();
        match status.code() {
            tonic::Code::AlreadyExists => Error::AlreadyExists(message),
            tonic::Code::NotFound => Error::NotFound(message),
            tonic::Code::InvalidArgument => Error::InvalidArgument(message),
            tonic::Code::Unauthenticated => Error::Unauthenticated(message),
            tonic::Code::PermissionDenied => Error::PermissionDenied(message),
            tonic::Code::Cancelled => Error::Canceled,
            tonic::Code::DeadlineExceeded => Error::DeadlineExceeded,
            _ => Error::Internal(message),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn maps_to_matching_status_codes() {
        let cases = [
            (Error::AlreadyExists("x".into()), tonic::Code::AlreadyExists),
            (Error::NotFound("x".into()), tonic::Code::NotFound),
            (Error::InvalidArgument("x".into()), tonic::Code::InvalidArgument),
            (Error::Unauthenticated("x".into()), tonic::Code::Unauthenticated),
            (Error::PermissionDenied("x".into()), tonic::Code::PermissionDenied),
            (Error::Canceled, tonic::Code::Cancelled),
            (Error::DeadlineExceeded, tonic::Code::DeadlineExceeded),
            (Error::Internal("x".into()), tonic::Code::Internal),
        ];

        for (err, code) in cases {
            assert_eq!(Status::from(err).code(), code);
        }
    }

    #[test]
    fn status_round_trips_through_error() {
        let err = Error::from(Status::permission_denied("nope"));
        assert!(matches!(err, Error::PermissionDenied(ref m) if m == "nope"));

        let err = Error::from(Status::unavailable("down"));
        assert!(matches!(err, Error::Internal(_)));
    }
}
