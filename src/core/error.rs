use std::error::Error as StdError;
use std::fmt;
use std::path::{Path, PathBuf};

use crate::core::jvmti::{
    JVMTI_ERROR_ILLEGAL_ARGUMENT, JVMTI_ERROR_INTERNAL, JVMTI_ERROR_OUT_OF_MEMORY, jvmtiError,
};

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ErrorKind {
    Internal,
    Usage,
    Exhausted,
    AlreadyActive,
    NotFound,
    Corrupt,
    Io,
    Host,
}

#[derive(Debug)]
pub struct Error {
    kind: ErrorKind,
    message: Option<String>,
    path: Option<PathBuf>,
    code: Option<i32>,
    seq: Option<u64>,
    source: Option<Box<dyn StdError + Send + Sync>>,
}

impl Error {
    pub fn new(kind: ErrorKind) -> Self {
        Self {
            kind,
            message: None,
            path: None,
            code: None,
            seq: None,
            source: None,
        }
    }

    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    pub fn message(&self) -> Option<&str> {
        self.message.as_deref()
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Host status code carried by `ErrorKind::Host` errors.
    pub fn code(&self) -> Option<i32> {
        self.code
    }

    pub fn seq(&self) -> Option<u64> {
        self.seq
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    pub fn with_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.path = Some(path.into());
        self
    }

    pub fn with_code(mut self, code: i32) -> Self {
        self.code = Some(code);
        self
    }

    pub fn with_seq(mut self, seq: u64) -> Self {
        self.seq = Some(seq);
        self
    }

    pub fn with_source(mut self, source: impl StdError + Send + Sync + 'static) -> Self {
        self.source = Some(Box::new(source));
        self
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self.kind)?;
        if let Some(message) = &self.message {
            write!(f, ": {message}")?;
        }
        if let Some(path) = &self.path {
            write!(f, " (path: {})", path.display())?;
        }
        if let Some(code) = self.code {
            write!(f, " (code: {code})")?;
        }
        if let Some(seq) = self.seq {
            write!(f, " (seq: {seq})")?;
        }
        if let Some(source) = &self.source {
            write!(f, ": {source}")?;
        }
        Ok(())
    }
}

impl StdError for Error {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        self.source
            .as_ref()
            .map(|source| source.as_ref() as &(dyn StdError + 'static))
    }
}

pub fn to_exit_code(kind: ErrorKind) -> i32 {
    match kind {
        ErrorKind::Internal => 1,
        ErrorKind::Usage => 2,
        ErrorKind::NotFound => 3,
        ErrorKind::AlreadyActive => 4,
        ErrorKind::Exhausted => 5,
        ErrorKind::Corrupt => 7,
        ErrorKind::Io => 8,
        ErrorKind::Host => 9,
    }
}

/// Status reported back through the intercepted `SetEventCallbacks`.
pub fn to_jvmti_error(err: &Error) -> jvmtiError {
    match err.kind() {
        ErrorKind::Host => err.code().unwrap_or(JVMTI_ERROR_INTERNAL),
        ErrorKind::Exhausted => JVMTI_ERROR_OUT_OF_MEMORY,
        ErrorKind::Usage => JVMTI_ERROR_ILLEGAL_ARGUMENT,
        _ => JVMTI_ERROR_INTERNAL,
    }
}
