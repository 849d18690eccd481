// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

use serde::{Serialize, Serializer};

/// CPU architecture shared by the PE and Breakpad parsers.
///
/// Serialized as its numeric code so that records from both sources compare
/// equal for the same target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[repr(u8)]
pub enum MachineArchitecture {
    #[default]
    Unknown = 0,
    X86 = 1,
    X64 = 2,
    Arm32 = 3,
    Arm64 = 4,
}

impl MachineArchitecture {
    /// Map a COFF `Machine` field.
    pub fn from_pe_machine(machine: u16) -> Self {
        use goblin::pe::header::{
            COFF_MACHINE_ARM, COFF_MACHINE_ARM64, COFF_MACHINE_X86, COFF_MACHINE_X86_64,
        };

        match machine {
            COFF_MACHINE_X86 => Self::X86,
            COFF_MACHINE_X86_64 => Self::X64,
            COFF_MACHINE_ARM => Self::Arm32,
            COFF_MACHINE_ARM64 => Self::Arm64,
            _ => Self::Unknown,
        }
    }

    /// Map the cpu token of a .sym MODULE record. Case-insensitive.
    pub fn from_sym_arch(cpu: &str) -> Self {
        match cpu.to_ascii_lowercase().as_str() {
            "x86" => Self::X86,
            "x86_64" | "amd64" | "x64" => Self::X64,
            "arm64" => Self::Arm64,
            "arm" | "armv7" | "arm32" => Self::Arm32,
            _ => Self::Unknown,
        }
    }

    pub fn code(self) -> u8 {
        self as u8
    }

    /// Name used in symbol upload metadata.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Unknown => "unknown",
            Self::X86 => "x86",
            Self::X64 => "x64",
            Self::Arm32 => "arm32",
            Self::Arm64 => "arm64",
        }
    }
}

impl std::fmt::Display for MachineArchitecture {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for MachineArchitecture {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u8(self.code())
    }
}

/// Which parser produced a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceType {
    PeBinary,
    BreakpadSym,
}

/// What kind of symbol information backs a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SymbolSource {
    /// Line information is present.
    DebugInfo,
    /// Only a public symbol table.
    SymbolTable,
    None,
}

impl SymbolSource {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::DebugInfo => "debug_info",
            Self::SymbolTable => "symbol_table",
            Self::None => "none",
        }
    }
}

/// Debug identity of a PE image or Breakpad symbol file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SymbolMetadata {
    /// Input path, echoed back.
    pub filename: String,
    #[serde(rename = "isPE")]
    pub is_pe: bool,
    pub has_pdb_info: bool,
    pub arch: MachineArchitecture,
    pub pdb_age: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pdb_sig: Option<String>,
    pub pdb_filename: String,
    pub source_type: SourceType,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub symbol_path: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub symbol_source: Option<SymbolSource>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub module_os: Option<String>,
    /// Soft failure diagnostic. Only ever set with `is_pe == false`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl SymbolMetadata {
    /// An empty PE record: not a PE, no debug info.
    pub fn pe(filename: impl Into<String>) -> Self {
        Self {
            filename: filename.into(),
            is_pe: false,
            has_pdb_info: false,
            arch: MachineArchitecture::Unknown,
            pdb_age: 0,
            pdb_sig: None,
            pdb_filename: String::new(),
            source_type: SourceType::PeBinary,
            symbol_path: None,
            symbol_source: None,
            module_os: None,
            error: None,
        }
    }

    /// A PE record for a readable file that failed structural validation.
    pub fn pe_soft_failure(filename: impl Into<String>, reason: impl std::fmt::Display) -> Self {
        Self {
            error: Some(reason.to_string()),
            ..Self::pe(filename)
        }
    }

    /// Key used to detect the same build uploaded twice.
    pub fn build_id(&self) -> String {
        match (&self.pdb_sig, self.has_pdb_info) {
            (Some(sig), true) => format!("{}_{}", sig, self.pdb_age),
            _ => "?_?".to_string(),
        }
    }

    pub fn symbol_source_name(&self) -> &'static str {
        match self.symbol_source {
            Some(source) => source.as_str(),
            None if self.has_pdb_info => SymbolSource::DebugInfo.as_str(),
            None => SymbolSource::None.as_str(),
        }
    }

    /// Last component of `pdb_filename`, accepting both separator styles.
    pub fn pdb_basename(&self) -> &str {
        self.pdb_filename
            .rsplit(['\\', '/'])
            .next()
            .unwrap_or(&self.pdb_filename)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_arch_from_pe_machine() {
        assert_eq!(MachineArchitecture::from_pe_machine(0x014c), MachineArchitecture::X86);
        assert_eq!(MachineArchitecture::from_pe_machine(0x8664), MachineArchitecture::X64);
        assert_eq!(MachineArchitecture::from_pe_machine(0xaa64), MachineArchitecture::Arm64);
        assert_eq!(MachineArchitecture::from_pe_machine(0x01c0), MachineArchitecture::Arm32);
        assert_eq!(MachineArchitecture::from_pe_machine(0x0200), MachineArchitecture::Unknown);
        assert_eq!(MachineArchitecture::from_pe_machine(0), MachineArchitecture::Unknown);
    }

    #[test]
    fn test_arch_from_sym() {
        assert_eq!(MachineArchitecture::from_sym_arch("x86"), MachineArchitecture::X86);
        assert_eq!(MachineArchitecture::from_sym_arch("x86_64"), MachineArchitecture::X64);
        assert_eq!(MachineArchitecture::from_sym_arch("AMD64"), MachineArchitecture::X64);
        assert_eq!(MachineArchitecture::from_sym_arch("arm"), MachineArchitecture::Arm32);
        assert_eq!(MachineArchitecture::from_sym_arch("armv7"), MachineArchitecture::Arm32);
        assert_eq!(MachineArchitecture::from_sym_arch("arm32"), MachineArchitecture::Arm32);
        assert_eq!(MachineArchitecture::from_sym_arch("ARM64"), MachineArchitecture::Arm64);
        assert_eq!(MachineArchitecture::from_sym_arch("mips"), MachineArchitecture::Unknown);
    }

    #[test]
    fn test_arch_codes_and_names() {
        assert_eq!(MachineArchitecture::Unknown.code(), 0);
        assert_eq!(MachineArchitecture::X86.code(), 1);
        assert_eq!(MachineArchitecture::X64.code(), 2);
        assert_eq!(MachineArchitecture::Arm32.code(), 3);
        assert_eq!(MachineArchitecture::Arm64.code(), 4);
        assert_eq!(MachineArchitecture::Arm32.to_string(), "arm32");
        assert_eq!(MachineArchitecture::X64.to_string(), "x64");
    }

    #[test]
    fn test_build_id() {
        let mut md = SymbolMetadata::pe("a.dll");
        assert_eq!(md.build_id(), "?_?");

        md.is_pe = true;
        md.has_pdb_info = true;
        md.pdb_sig = Some("E37085B2-4E2C-4BF4-B83F-84F16BC71B74".to_string());
        md.pdb_age = 3;
        assert_eq!(md.build_id(), "E37085B2-4E2C-4BF4-B83F-84F16BC71B74_3");
    }

    #[test]
    fn test_soft_failure_shape() {
        let md = SymbolMetadata::pe_soft_failure("x.bin", "Invalid DOS header");
        assert!(!md.is_pe);
        assert!(!md.has_pdb_info);
        assert_eq!(md.error.as_deref(), Some("Invalid DOS header"));
        assert_eq!(md.source_type, SourceType::PeBinary);
    }

    #[test]
    fn test_symbol_source_name() {
        let mut md = SymbolMetadata::pe("a.dll");
        assert_eq!(md.symbol_source_name(), "none");
        md.has_pdb_info = true;
        assert_eq!(md.symbol_source_name(), "debug_info");
        md.symbol_source = Some(SymbolSource::SymbolTable);
        assert_eq!(md.symbol_source_name(), "symbol_table");
    }

    #[test]
    fn test_pdb_basename() {
        let mut md = SymbolMetadata::pe("a.dll");
        md.pdb_filename = r"C:\src\Exports\Release\Exports.pdb".to_string();
        assert_eq!(md.pdb_basename(), "Exports.pdb");
        md.pdb_filename = "out/libfoo.pdb".to_string();
        assert_eq!(md.pdb_basename(), "libfoo.pdb");
        md.pdb_filename = "plain.pdb".to_string();
        assert_eq!(md.pdb_basename(), "plain.pdb");
    }

    #[test]
    fn test_json_field_names() {
        let mut md = SymbolMetadata::pe("a.dll");
        md.is_pe = true;
        md.arch = MachineArchitecture::X64;
        let v = serde_json::to_value(&md).unwrap();
        assert_eq!(v["isPE"], true);
        assert_eq!(v["hasPdbInfo"], false);
        assert_eq!(v["arch"], 2);
        assert_eq!(v["pdbAge"], 0);
        assert_eq!(v["pdbFilename"], "");
        assert_eq!(v["sourceType"], "pe_binary");
        assert!(v.get("pdbSig").is_none());
        assert!(v.get("error").is_none());
        assert!(v.get("symbolSource").is_none());
    }
}
