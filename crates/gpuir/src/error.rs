//! Error taxonomy and source-location tracking for the IR core.
//!
//! Every fallible builder API returns `Result<T, IrError>`; there is no
//! retry path and no recovery on the same method builder after an error.
//! Locally recoverable conditions — identity casts, algebraic
//! simplifications — are silent rewrites and never surface here.

use std::fmt;

use crate::types::TypeId;

/// An opaque source coordinate attached to every value-creating call.
///
/// Mandatory rather than `Option<Location>` everywhere: callers without a
/// real coordinate use [`Location::unknown`] instead of threading `None`
/// through every factory.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Location {
    file: u32,
    line: u32,
    column: u32,
}

impl Location {
    pub const fn new(file: u32, line: u32, column: u32) -> Self {
        Self { file, line, column }
    }

    /// Sentinel for call sites that have no real source coordinate
    /// (legacy entry points, synthesized control flow such as the unique
    /// exit block).
    pub const fn unknown() -> Self {
        Self {
            file: u32::MAX,
            line: 0,
            column: 0,
        }
    }

    pub const fn is_unknown(&self) -> bool {
        self.file == u32::MAX
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_unknown() {
            write!(f, "<unknown>")
        } else {
            write!(f, "{}:{}:{}", self.file, self.line, self.column)
        }
    }
}

impl fmt::Debug for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}

/// Stable message keys (`NotSupportedConversion`, `NotSupportedClassType`,
/// ...). Kept as a separate `&'static str` rather than folded into the
/// `Display` text so tooling can match on the key without parsing the
/// rendered message.
pub type MessageKey = &'static str;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum IrError {
    #[error("{key} at {location}: type mismatch, expected {expected:?} found {found:?}")]
    TypeMismatch {
        location: Location,
        key: MessageKey,
        expected: TypeId,
        found: TypeId,
    },

    #[error("{key} at {location}: not supported ({detail})")]
    NotSupported {
        location: Location,
        key: MessageKey,
        detail: String,
    },

    #[error("{key} at {location}: argument must not be null")]
    ArgumentNull { location: Location, key: MessageKey },

    #[error("{key} at {location}: argument out of range ({detail})")]
    ArgumentOutOfRange {
        location: Location,
        key: MessageKey,
        detail: String,
    },

    #[error("{key} at {location}: invalid state ({detail})")]
    InvalidState {
        location: Location,
        key: MessageKey,
        detail: String,
    },

    #[error("{key} at {location}: assertion failed ({detail})")]
    Assertion {
        location: Location,
        key: MessageKey,
        detail: String,
    },
}

use thiserror::Error;

impl IrError {
    pub fn location(&self) -> Location {
        match *self {
            IrError::TypeMismatch { location, .. }
            | IrError::NotSupported { location, .. }
            | IrError::ArgumentNull { location, .. }
            | IrError::ArgumentOutOfRange { location, .. }
            | IrError::InvalidState { location, .. }
            | IrError::Assertion { location, .. } => location,
        }
    }

    pub fn key(&self) -> MessageKey {
        match self {
            IrError::TypeMismatch { key, .. }
            | IrError::NotSupported { key, .. }
            | IrError::ArgumentNull { key, .. }
            | IrError::ArgumentOutOfRange { key, .. }
            | IrError::InvalidState { key, .. }
            | IrError::Assertion { key, .. } => key,
        }
    }

    pub fn type_mismatch(location: Location, key: MessageKey, expected: TypeId, found: TypeId) -> Self {
        IrError::TypeMismatch {
            location,
            key,
            expected,
            found,
        }
    }

    pub fn not_supported(location: Location, key: MessageKey, detail: impl Into<String>) -> Self {
        IrError::NotSupported {
            location,
            key,
            detail: detail.into(),
        }
    }

    pub fn argument_out_of_range(location: Location, key: MessageKey, detail: impl Into<String>) -> Self {
        IrError::ArgumentOutOfRange {
            location,
            key,
            detail: detail.into(),
        }
    }

    pub fn argument_null(location: Location, key: MessageKey) -> Self {
        IrError::ArgumentNull { location, key }
    }

    pub fn invalid_state(location: Location, key: MessageKey, detail: impl Into<String>) -> Self {
        IrError::InvalidState {
            location,
            key,
            detail: detail.into(),
        }
    }

    /// Raises an internal-invariant failure. When the `debug-assertions`
    /// cargo feature is enabled this panics immediately, mirroring a
    /// release build that still wants assertions fatal; otherwise it
    /// degrades to a returned error the caller can propagate.
    pub fn assertion(location: Location, key: MessageKey, detail: impl Into<String>) -> Self {
        let detail = detail.into();
        if cfg!(feature = "debug-assertions") {
            panic!("{key} at {location}: assertion failed ({detail})");
        }
        IrError::Assertion {
            location,
            key,
            detail,
        }
    }
}

pub type IrResult<T> = Result<T, IrError>;
