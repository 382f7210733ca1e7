//! Error taxonomy shared by one-shot and interactive invocations.
//!
//! Three tiers are distinguished:
//! - [`CommandError`]: an expected, user-facing failure, reported tersely;
//! - [`ExitRequest`]: a control signal from the parser asking to stop normal flow;
//! - anything else carried by an [`anyhow::Error`]: an unexpected defect, reported
//!   with full diagnostics.
use thiserror::Error;

/// Status returned by [`crate::command::BaseCommand::run_from_argv`] and carried by
/// [`ExitRequest`]; the binary hands it to `std::process::exit`.
pub type ExitCode = i32;

/// What kind of expected failure a [`CommandError`] describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandErrorKind {
    /// Raised by a command's own logic.
    Failed,
    /// The command needs arguments and got none at all.
    MissingArguments,
    /// The argument vector does not fit the command's schema.
    InvalidArguments,
    /// The system check framework detected unrecoverable problems. The message is
    /// already formatted for display.
    SystemCheck,
}

/// A problem while executing a command that should be shown to the user as a
/// message rather than as a crash report.
///
/// Returning this (wrapped in `anyhow::Error`) from a handler is the preferred way
/// to signal that something went wrong.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct CommandError {
    kind: CommandErrorKind,
    message: String,
}

impl CommandError {
    pub fn new(message: impl Into<String>) -> Self {
        Self::with_kind(CommandErrorKind::Failed, message)
    }

    pub fn missing_arguments(message: impl Into<String>) -> Self {
        Self::with_kind(CommandErrorKind::MissingArguments, message)
    }

    pub fn invalid_arguments(message: impl Into<String>) -> Self {
        Self::with_kind(CommandErrorKind::InvalidArguments, message)
    }

    /// A system check failure; `report` is written out exactly as given.
    pub fn system_check(report: impl Into<String>) -> Self {
        Self::with_kind(CommandErrorKind::SystemCheck, report)
    }

    pub fn with_kind(kind: CommandErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn kind(&self) -> CommandErrorKind {
        self.kind
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn is_system_check(&self) -> bool {
        self.kind == CommandErrorKind::SystemCheck
    }
}

/// The parser (or a handler) wants to stop normal flow, e.g. after printing help.
///
/// Never terminates anything by itself: whoever catches it decides.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{}", .message.as_deref().unwrap_or("exit requested"))]
pub struct ExitRequest {
    pub status: ExitCode,
    pub message: Option<String>,
}

impl ExitRequest {
    pub fn new(status: ExitCode, message: Option<String>) -> Self {
        Self { status, message }
    }

    pub fn success(message: impl Into<String>) -> Self {
        Self::new(0, Some(message.into()))
    }
}

/// A command was dispatched without providing a `handle` implementation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("command `{command}` does not provide a handle() implementation")]
pub struct NotImplemented {
    pub command: String,
}

impl NotImplemented {
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
        }
    }
}

/// Why parsing an argument vector did not produce an invocation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    #[error(transparent)]
    Exit(#[from] ExitRequest),
    #[error(transparent)]
    Command(#[from] CommandError),
}

/// Short type name used when an unexpected error is printed as `<kind>: <message>`.
pub fn error_kind(err: &anyhow::Error) -> &'static str {
    if err.is::<NotImplemented>() {
        "NotImplemented"
    } else if err.is::<std::io::Error>() {
        "IoError"
    } else if err.is::<std::num::ParseIntError>() {
        "ParseIntError"
    } else if err.is::<std::num::ParseFloatError>() {
        "ParseFloatError"
    } else if err.is::<std::str::Utf8Error>() || err.is::<std::string::FromUtf8Error>() {
        "Utf8Error"
    } else {
        "Error"
    }
}
