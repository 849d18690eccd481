// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

use std::path::Path;

use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader};
use tracing::debug;

use crate::error::BreakpadError;
use crate::guid::{format_guid, GUID_HEX_LEN};
use crate::metadata::{MachineArchitecture, SourceType, SymbolMetadata, SymbolSource};

/// The `MODULE <os> <cpu> <id> <name>` header of a .sym file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModuleRecord {
    pub os: String,
    pub arch: String,
    pub debug_id: String,
    pub name: String,
}

impl ModuleRecord {
    /// Split the debug identifier into the 32-char GUID and the age.
    pub fn debug_identity(&self) -> Result<(String, u32), BreakpadError> {
        let id = self.debug_id.to_ascii_uppercase();
        if id.len() <= GUID_HEX_LEN {
            return Err(BreakpadError::IdentifierTooShort(id.len()));
        }
        if !id.bytes().all(|b| b.is_ascii_hexdigit()) {
            return Err(BreakpadError::IdentifierNotHex);
        }
        let (guid, age) = id.split_at(GUID_HEX_LEN);
        let age =
            u32::from_str_radix(age, 16).map_err(|_| BreakpadError::InvalidAge(age.to_string()))?;
        Ok((guid.to_string(), age))
    }
}

/// MODULE header plus what the rest of the file tells about its contents.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BreakpadSummary {
    pub module: ModuleRecord,
    pub has_file_records: bool,
    pub function_count: usize,
    pub public_count: usize,
}

impl BreakpadSummary {
    /// Scan a .sym stream.
    ///
    /// The first non-empty line must be the MODULE record and every byte of
    /// the stream must be ASCII. Other records are only counted.
    pub async fn scan<R: AsyncBufRead + Unpin>(reader: R) -> Result<Self, BreakpadError> {
        let mut lines = reader.split(b'\n');
        let mut module: Option<ModuleRecord> = None;
        let mut has_file_records = false;
        let mut function_count: usize = 0;
        let mut public_count: usize = 0;
        let mut line_num: usize = 0;

        while let Some(raw) = lines.next_segment().await.map_err(BreakpadError::Read)? {
            line_num += 1;
            if !raw.is_ascii() {
                return Err(BreakpadError::NonAscii { line: line_num });
            }
            let line = String::from_utf8_lossy(&raw);
            let line = line.trim();

            if module.is_none() {
                if line.is_empty() {
                    continue;
                }
                module = Some(parse_module_record(line)?);
                continue;
            }

            if line.starts_with("FILE ") {
                has_file_records = true;
            } else if line.starts_with("FUNC ") {
                function_count += 1;
            } else if line.starts_with("PUBLIC ") {
                public_count += 1;
            }
        }

        let module = module.ok_or(BreakpadError::MissingModuleHeader)?;
        Ok(Self {
            module,
            has_file_records,
            function_count,
            public_count,
        })
    }

    pub fn symbol_source(&self) -> SymbolSource {
        if self.has_file_records || self.function_count > 0 {
            SymbolSource::DebugInfo
        } else {
            SymbolSource::SymbolTable
        }
    }

    /// Build the metadata record for the file at `path`.
    pub fn to_metadata(&self, path: &str) -> Result<SymbolMetadata, BreakpadError> {
        let (guid, pdb_age) = self.module.debug_identity()?;
        let pdb_sig = format_guid(&guid).ok_or(BreakpadError::IdentifierNotHex)?;
        Ok(SymbolMetadata {
            filename: path.to_string(),
            is_pe: false,
            has_pdb_info: true,
            arch: MachineArchitecture::from_sym_arch(&self.module.arch),
            pdb_age,
            pdb_sig: Some(pdb_sig),
            pdb_filename: self.module.name.clone(),
            source_type: SourceType::BreakpadSym,
            symbol_path: Some(path.to_string()),
            symbol_source: Some(self.symbol_source()),
            module_os: Some(self.module.os.clone()),
            error: None,
        })
    }
}

fn parse_module_record(line: &str) -> Result<ModuleRecord, BreakpadError> {
    // MODULE <os> <cpu> <debug_id> <name...>
    if !line.starts_with("MODULE ") {
        return Err(BreakpadError::MissingModuleHeader);
    }
    let tokens: Vec<&str> = line.split_whitespace().collect();
    if tokens.len() < 5 {
        return Err(BreakpadError::InvalidModuleHeader);
    }
    Ok(ModuleRecord {
        os: tokens[1].to_string(),
        arch: tokens[2].to_string(),
        debug_id: tokens[3].to_string(),
        // module names may contain spaces
        name: tokens[4..].join(" "),
    })
}

/// Extract symbol metadata from a Breakpad .sym file.
///
/// Any I/O, encoding or header problem is an error.
pub async fn parse_breakpad_sym(path: impl AsRef<Path>) -> Result<SymbolMetadata, BreakpadError> {
    let path = path.as_ref();
    let io_error = |source| BreakpadError::Io {
        path: path.to_path_buf(),
        source,
    };

    let file = tokio::fs::File::open(path).await.map_err(io_error)?;
    let summary = BreakpadSummary::scan(BufReader::new(file))
        .await
        .map_err(|e| match e {
            BreakpadError::Read(source) => io_error(source),
            other => other,
        })?;
    debug!(
        "{}: {} FUNC, {} PUBLIC records",
        path.display(),
        summary.function_count,
        summary.public_count
    );
    summary.to_metadata(&path.to_string_lossy())
}
