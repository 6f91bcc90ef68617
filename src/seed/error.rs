//! Operation Error Kinds
//!
//! One terminal error per failed operation; runners convert every internal
//! failure into exactly one `on_error` callback carrying one of these kinds.

use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OpErr {
    BadCommandArgument,
    NotSupportedCmd,
    NotSupportedRead,
    NotSupportedWrite,
    NotSupportedRemovePod,
    NotFoundTab,
    NotFoundKey,
    PathFormatError,
    FieldNotFound,
    StrToCellFailed,
    AccessDenied,
    IoError,
    FileNotFound,
    ParseError,
}

impl OpErr {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::BadCommandArgument => "bad command argument",
            Self::NotSupportedCmd => "not supported: command",
            Self::NotSupportedRead => "not supported: read",
            Self::NotSupportedWrite => "not supported: write",
            Self::NotSupportedRemovePod => "not supported: remove pod",
            Self::NotFoundTab => "tab not found",
            Self::NotFoundKey => "key not found",
            Self::PathFormatError => "path format error",
            Self::FieldNotFound => "field not found",
            Self::StrToCellFailed => "value conversion failed",
            Self::AccessDenied => "access denied",
            Self::IoError => "io error",
            Self::FileNotFound => "file not found",
            Self::ParseError => "parse error",
        }
    }
}

impl fmt::Display for OpErr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::error::Error for OpErr {}

pub type OpResult<T> = Result<T, OpErr>;
