//! Error types and result definitions for the replication engine.
//!
//! [`ReplicationError`] carries a classification ([`ErrorKind`]), a static description, optional
//! dynamic detail, an optional source error and the location where it was raised. Errors coming
//! from several concurrent tasks can be aggregated into a single value.
//!
//! Which connector an error is attributed to is not decided here: the workers wrap errors into
//! [`crate::workers::policy::AttemptFailure`] at the task boundary where the origin is known.

use std::backtrace::Backtrace;
use std::borrow::Cow;
use std::error;
use std::fmt;
use std::panic::Location;
use std::sync::Arc;

/// Result type for replication operations.
pub type ReplicationResult<T> = Result<T, ReplicationError>;

/// Payload stored for single [`ReplicationError`] instances.
#[derive(Debug, Clone)]
struct ErrorPayload {
    kind: ErrorKind,
    description: Cow<'static, str>,
    detail: Option<Cow<'static, str>>,
    source: Option<Arc<dyn error::Error + Send + Sync>>,
    location: &'static Location<'static>,
    backtrace: Arc<Backtrace>,
}

/// Main error type of the replication engine.
#[derive(Debug, Clone)]
pub struct ReplicationError {
    repr: ErrorRepr,
}

#[derive(Debug, Clone)]
enum ErrorRepr {
    Single(ErrorPayload),
    /// Errors collected from several tasks, in the order they were observed.
    Many {
        errors: Vec<ReplicationError>,
        location: &'static Location<'static>,
    },
}

/// Classification of replication errors.
///
/// Kinds are grouped by the component raising them.
#[derive(PartialEq, Eq, Copy, Clone, Debug, Hash)]
#[non_exhaustive]
pub enum ErrorKind {
    // Connector lifecycle errors
    SourceStartFailed,
    DestinationStartFailed,
    SourceCloseFailed,
    DestinationCloseFailed,
    ConnectorCloseTimeout,

    // Connector I/O errors
    SourceReadFailed,
    DestinationWriteFailed,

    // Connector exit errors
    SourceExitedWithError,
    DestinationExitedWithError,

    // Message & schema errors
    InvalidMessage,

    // Bookkeeping errors
    StatsTrackingFailed,
    StatsUnavailable,

    // Collaborator errors
    EventPublishingFailed,
    ConnectorConfigUpdateFailed,

    // Configuration errors
    ConfigError,

    // IO & serialization errors
    IoError,
    SerializationError,
    DeserializationError,

    // State & workflow errors
    InvalidState,
    QueueClosed,
    WorkerPanic,
    WorkerCancelled,

    // Unknown / uncategorized
    Unknown,

    // Raised by fault injection in tests.
    #[cfg(feature = "failpoints")]
    WithFailpoint,
}

impl ReplicationError {
    /// Returns the [`ErrorKind`] of this error.
    ///
    /// Aggregated errors report the kind of their first error, or [`ErrorKind::Unknown`] when
    /// empty.
    pub fn kind(&self) -> ErrorKind {
        match self.repr {
            ErrorRepr::Single(ref payload) => payload.kind,
            ErrorRepr::Many { ref errors, .. } => errors
                .first()
                .map(|err| err.kind())
                .unwrap_or(ErrorKind::Unknown),
        }
    }

    /// Returns every [`ErrorKind`] contained in this error, flattening aggregates.
    pub fn kinds(&self) -> Vec<ErrorKind> {
        match self.repr {
            ErrorRepr::Single(ref payload) => vec![payload.kind],
            ErrorRepr::Many { ref errors, .. } => {
                errors.iter().flat_map(|err| err.kinds()).collect()
            }
        }
    }

    /// Returns the static description of this error.
    ///
    /// Aggregated errors return the description of their first error.
    pub fn description(&self) -> &str {
        match self.repr {
            ErrorRepr::Single(ref payload) => payload.description.as_ref(),
            ErrorRepr::Many { ref errors, .. } => errors
                .first()
                .map(|err| err.description())
                .unwrap_or("multiple errors occurred"),
        }
    }

    /// Returns the dynamic detail of this error, if any.
    pub fn detail(&self) -> Option<&str> {
        match self.repr {
            ErrorRepr::Single(ref payload) => payload.detail.as_deref(),
            ErrorRepr::Many { ref errors, .. } => errors.iter().find_map(|e| e.detail()),
        }
    }

    /// Returns a one-line summary made of the description and the detail.
    pub fn summary(&self) -> String {
        match self.detail() {
            Some(detail) => format!("{}: {detail}", self.description()),
            None => self.description().to_string(),
        }
    }

    /// Returns the captured backtrace for single errors.
    pub fn backtrace(&self) -> Option<&Backtrace> {
        match self.repr {
            ErrorRepr::Single(ref payload) => Some(payload.backtrace.as_ref()),
            ErrorRepr::Many { .. } => None,
        }
    }

    /// Returns the location where this error was created.
    pub fn location(&self) -> &'static Location<'static> {
        match self.repr {
            ErrorRepr::Single(ref payload) => payload.location,
            ErrorRepr::Many { location, .. } => location,
        }
    }

    /// Attaches an originating error, exposed through [`error::Error::source`].
    ///
    /// Has no effect on aggregated errors.
    pub fn with_source<E>(mut self, source: E) -> Self
    where
        E: error::Error + Send + Sync + 'static,
    {
        if let ErrorRepr::Single(ref mut payload) = self.repr {
            payload.source = Some(Arc::new(source));
        }
        self
    }

    #[track_caller]
    fn from_components(
        kind: ErrorKind,
        description: Cow<'static, str>,
        detail: Option<Cow<'static, str>>,
        source: Option<Arc<dyn error::Error + Send + Sync>>,
    ) -> Self {
        ReplicationError {
            repr: ErrorRepr::Single(ErrorPayload {
                kind,
                description,
                detail,
                source,
                location: Location::caller(),
                backtrace: Arc::new(Backtrace::capture()),
            }),
        }
    }
}

impl PartialEq for ReplicationError {
    fn eq(&self, other: &ReplicationError) -> bool {
        match (&self.repr, &other.repr) {
            (ErrorRepr::Single(a), ErrorRepr::Single(b)) => a.kind == b.kind,
            (ErrorRepr::Many { errors: a, .. }, ErrorRepr::Many { errors: b, .. }) => a == b,
            _ => false,
        }
    }
}

impl fmt::Display for ReplicationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.repr {
            ErrorRepr::Single(payload) => {
                let location = payload.location;
                write!(
                    f,
                    "[{:?}] {} @ {}:{}:{}",
                    payload.kind,
                    payload.description,
                    location.file(),
                    location.line(),
                    location.column()
                )?;

                if let Some(detail) = payload.detail.as_deref() {
                    write_block(f, "Detail", detail)?;
                }
                if let Some(source) = payload.source.as_ref() {
                    write_block(f, "Caused by", &source.to_string())?;
                }

                let backtrace = payload.backtrace.to_string();
                if !backtrace.trim().is_empty() {
                    write_block(f, "Backtrace", &backtrace)?;
                }

                Ok(())
            }
            ErrorRepr::Many { errors, location } => {
                write!(
                    f,
                    "[Many] {} error{} aggregated @ {}:{}:{}",
                    errors.len(),
                    if errors.len() == 1 { "" } else { "s" },
                    location.file(),
                    location.line(),
                    location.column()
                )?;

                for (index, error) in errors.iter().enumerate() {
                    let rendered = error.to_string();
                    let mut lines = rendered.lines();
                    write!(f, "\n  {}. {}", index + 1, lines.next().unwrap_or_default())?;
                    for line in lines {
                        write!(f, "\n     {line}")?;
                    }
                }

                Ok(())
            }
        }
    }
}

impl error::Error for ReplicationError {
    fn source(&self) -> Option<&(dyn error::Error + 'static)> {
        match &self.repr {
            ErrorRepr::Single(payload) => payload
                .source
                .as_ref()
                .map(|source| source as &(dyn error::Error + 'static)),
            ErrorRepr::Many { errors, .. } => errors
                .first()
                .map(|error| error as &(dyn error::Error + 'static)),
        }
    }
}

/// Writes an indented, titled block below the error headline.
fn write_block(f: &mut fmt::Formatter<'_>, title: &str, content: &str) -> fmt::Result {
    write!(f, "\n  {title}:")?;
    for line in content.lines() {
        if line.trim().is_empty() {
            write!(f, "\n    ")?;
        } else {
            write!(f, "\n    {line}")?;
        }
    }

    Ok(())
}

impl From<(ErrorKind, &'static str)> for ReplicationError {
    #[track_caller]
    fn from((kind, desc): (ErrorKind, &'static str)) -> ReplicationError {
        ReplicationError::from_components(kind, Cow::Borrowed(desc), None, None)
    }
}

impl<D> From<(ErrorKind, &'static str, D)> for ReplicationError
where
    D: Into<Cow<'static, str>>,
{
    #[track_caller]
    fn from((kind, desc, detail): (ErrorKind, &'static str, D)) -> ReplicationError {
        ReplicationError::from_components(kind, Cow::Borrowed(desc), Some(detail.into()), None)
    }
}

/// Aggregates errors. A single error is returned as is.
impl<E> From<Vec<E>> for ReplicationError
where
    E: Into<ReplicationError>,
{
    #[track_caller]
    fn from(errors: Vec<E>) -> ReplicationError {
        let location = Location::caller();
        let mut errors: Vec<ReplicationError> = errors.into_iter().map(Into::into).collect();

        if errors.len() == 1 {
            if let Some(error) = errors.pop() {
                return error;
            }
        }

        ReplicationError {
            repr: ErrorRepr::Many { errors, location },
        }
    }
}

impl From<std::io::Error> for ReplicationError {
    #[track_caller]
    fn from(err: std::io::Error) -> ReplicationError {
        let detail = err.to_string();
        ReplicationError::from_components(
            ErrorKind::IoError,
            Cow::Borrowed("I/O operation failed"),
            Some(Cow::Owned(detail)),
            Some(Arc::new(err)),
        )
    }
}

/// Maps [`serde_json::Error`] to a serialization or deserialization error depending on its
/// category.
impl From<serde_json::Error> for ReplicationError {
    #[track_caller]
    fn from(err: serde_json::Error) -> ReplicationError {
        let (kind, description) = match err.classify() {
            serde_json::error::Category::Io => (ErrorKind::SerializationError, "JSON I/O failed"),
            serde_json::error::Category::Syntax
            | serde_json::error::Category::Data
            | serde_json::error::Category::Eof => {
                (ErrorKind::DeserializationError, "JSON deserialization failed")
            }
        };

        let detail = err.to_string();
        ReplicationError::from_components(
            kind,
            Cow::Borrowed(description),
            Some(Cow::Owned(detail)),
            Some(Arc::new(err)),
        )
    }
}

/// Maps a failed task join to [`ErrorKind::WorkerPanic`] or [`ErrorKind::WorkerCancelled`].
impl From<tokio::task::JoinError> for ReplicationError {
    #[track_caller]
    fn from(err: tokio::task::JoinError) -> ReplicationError {
        let (kind, description) = if err.is_panic() {
            (ErrorKind::WorkerPanic, "Replication task panicked")
        } else {
            (ErrorKind::WorkerCancelled, "Replication task was cancelled")
        };

        let detail = err.to_string();
        ReplicationError::from_components(
            kind,
            Cow::Borrowed(description),
            Some(Cow::Owned(detail)),
            Some(Arc::new(err)),
        )
    }
}

impl From<config::shared::ValidationError> for ReplicationError {
    #[track_caller]
    fn from(err: config::shared::ValidationError) -> ReplicationError {
        let detail = err.to_string();
        ReplicationError::from_components(
            ErrorKind::ConfigError,
            Cow::Borrowed("Invalid replication worker configuration"),
            Some(Cow::Owned(detail)),
            Some(Arc::new(err)),
        )
    }
}
