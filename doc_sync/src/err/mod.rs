use std::fmt::{Debug, Display, Formatter};
use std::panic::Location;

pub type Error = Box<dyn std::error::Error + Send + Sync>;

pub type Result<T> = std::result::Result<T, Error>;

/// Failure categories callers branch on. Anything from outside the
/// coordination layer travels as a plain boxed error with no kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CoordErrorKind {
    /// The caller's access mode forbids the requested operation.
    PermissionDenied,
    /// A non-owner aborted an acquisition because the owner was waiting.
    OwnerPriority,
    /// The owner's read acquisition ran past its deadline.
    LockTimeout,
    /// A writer's editor was closed by the time-budget enforcer.
    TimeBudgetExpired,
    /// The user directory file is missing or malformed.
    DirectoryInvalid,
    /// Pop was requested on an empty history.
    HistoryEmpty,
    /// The history file could not be parsed into records.
    HistoryCorrupt,
    /// Unrecoverable I/O on the document, history, or directory.
    IoFailed,
    /// A coordination resource (semaphore, shared mapping, signal channel,
    /// editor subprocess) could not be set up or driven.
    ResourceFailed,
    /// A directory command was given a value that fails validation.
    InvalidInput,
}

impl CoordErrorKind {
    fn as_str(&self) -> &'static str {
        match self {
            CoordErrorKind::PermissionDenied => "permission denied",
            CoordErrorKind::OwnerPriority => "owner priority",
            CoordErrorKind::LockTimeout => "lock timeout",
            CoordErrorKind::TimeBudgetExpired => "time budget expired",
            CoordErrorKind::DirectoryInvalid => "directory invalid",
            CoordErrorKind::HistoryEmpty => "history empty",
            CoordErrorKind::HistoryCorrupt => "history corrupt",
            CoordErrorKind::IoFailed => "io failed",
            CoordErrorKind::ResourceFailed => "resource failure",
            CoordErrorKind::InvalidInput => "invalid input",
        }
    }
}

/// The coordination layer's error type: the kind for branching, free-form
/// detail for reports, the construction site for logs, and the underlying
/// error when there is one.
pub struct CoordError {
    kind: CoordErrorKind,
    detail: String,
    location: &'static Location<'static>,
    source: Option<Error>,
}

impl CoordError {
    #[track_caller]
    pub fn new(kind: CoordErrorKind, detail: impl Into<String>) -> Self {
        Self {
            kind,
            detail: detail.into(),
            location: Location::caller(),
            source: None,
        }
    }

    #[track_caller]
    pub fn with_source(
        kind: CoordErrorKind,
        detail: impl Into<String>,
        source: impl Into<Error>,
    ) -> Self {
        Self {
            kind,
            detail: detail.into(),
            location: Location::caller(),
            source: Some(source.into()),
        }
    }

    #[track_caller]
    pub fn boxed(kind: CoordErrorKind, detail: impl Into<String>) -> Error {
        Box::new(Self::new(kind, detail))
    }

    pub fn kind(&self) -> CoordErrorKind {
        self.kind
    }
}

impl Debug for CoordError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "[{}:{}] {}",
            self.location.file(),
            self.location.line(),
            self
        )
    }
}

impl Display for CoordError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        if self.detail.is_empty() {
            write!(f, "{}", self.kind.as_str())
        } else {
            write!(f, "{}: {}", self.kind.as_str(), self.detail)
        }
    }
}

impl std::error::Error for CoordError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.source
            .as_deref()
            .map(|e| e as &(dyn std::error::Error))
    }
}

/// Recover the protocol kind from a boxed error, if it carries one.
pub fn error_kind(err: &Error) -> Option<CoordErrorKind> {
    err.downcast_ref::<CoordError>().map(|e| e.kind())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_survives_boxing() {
        let err = CoordError::boxed(CoordErrorKind::OwnerPriority, "user blocked at gate");
        assert_eq!(error_kind(&err), Some(CoordErrorKind::OwnerPriority));
        assert!(err.to_string().contains("owner priority"));
    }

    #[test]
    fn foreign_errors_have_no_kind() {
        let err: Error = std::io::Error::other("disk trouble").into();
        assert_eq!(error_kind(&err), None);
    }

    #[test]
    fn debug_points_at_the_construction_site() {
        let err = CoordError::new(CoordErrorKind::IoFailed, "boom");
        let dbg = format!("{:?}", err);
        assert!(dbg.contains("err/mod.rs"), "{}", dbg);
        assert!(dbg.contains("boom"));
    }

    #[test]
    fn underlying_error_is_exposed_as_source() {
        let io = std::io::Error::other("gone");
        let err = CoordError::with_source(CoordErrorKind::IoFailed, "wrapping", io);
        let src = std::error::Error::source(&err).expect("source present");
        assert!(src.to_string().contains("gone"));
    }

    #[test]
    fn display_omits_empty_detail() {
        let err = CoordError::new(CoordErrorKind::HistoryEmpty, "");
        assert_eq!(err.to_string(), "history empty");
    }
}
