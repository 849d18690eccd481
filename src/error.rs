// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Hard failure of the PE parser. Only I/O can fail a PE parse.
#[derive(Debug, Error)]
pub enum PeError {
    #[error("reading PE file {}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// Why a readable file is not a usable PE image.
///
/// These never escape the parser as errors; they end up in
/// `SymbolMetadata::error`.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PeFormatError {
    #[error("file too small for a DOS header ({0} bytes)")]
    TooSmall(usize),
    #[error("Invalid DOS header")]
    InvalidDosHeader,
    #[error("Invalid PE header")]
    InvalidPeSignature,
    #[error("unsupported optional header magic 0x{0:04x}")]
    UnsupportedOptionalHeader(u16),
    #[error("truncated PE: {what} at offset 0x{offset:x} (need {len} bytes, file has {file_len})")]
    OutOfBounds {
        what: &'static str,
        offset: u64,
        len: usize,
        file_len: usize,
    },
    #[error("malformed PE: {0}")]
    Malformed(String),
}

impl From<goblin::error::Error> for PeFormatError {
    fn from(e: goblin::error::Error) -> Self {
        Self::Malformed(e.to_string())
    }
}

impl From<scroll::Error> for PeFormatError {
    fn from(e: scroll::Error) -> Self {
        Self::Malformed(e.to_string())
    }
}

/// Hard failure of the Breakpad parser.
#[derive(Debug, Error)]
pub enum BreakpadError {
    #[error("reading Breakpad symbol file {}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("reading Breakpad symbol data")]
    Read(#[source] io::Error),
    #[error("Unsupported symbol file: Breakpad .sym files must be ASCII encoded (line {line})")]
    NonAscii { line: usize },
    #[error("Unsupported symbol file: first non-empty line must be a Breakpad MODULE header")]
    MissingModuleHeader,
    #[error("Invalid MODULE header in Breakpad symbol file")]
    InvalidModuleHeader,
    #[error("Breakpad MODULE identifier is malformed: expected more than 32 hex characters, got {0}")]
    IdentifierTooShort(usize),
    #[error("Breakpad MODULE identifier must be hexadecimal")]
    IdentifierNotHex,
    #[error("Breakpad MODULE age is not hexadecimal: {0}")]
    InvalidAge(String),
}

impl BreakpadError {
    /// True for errors caused by the file contents rather than I/O.
    pub fn is_format_error(&self) -> bool {
        !matches!(self, Self::Io { .. } | Self::Read(_))
    }
}
