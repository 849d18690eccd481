// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! PDB identity metadata for PE images and Breakpad symbol files.

pub mod binary;
pub mod error;
pub mod guid;
pub mod metadata;
pub mod scan;
pub mod symbols;

pub use binary::{parse_pe, parse_pe_bytes};
pub use error::{BreakpadError, PeError};
pub use guid::format_guid;
pub use metadata::{MachineArchitecture, SourceType, SymbolMetadata, SymbolSource};
pub use symbols::parse_breakpad_sym;
