// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

use std::fmt::Write;

use anyhow::{Context, Result};
use symmeta::binary::parse_pe;
use symmeta::metadata::{SourceType, SymbolMetadata};
use symmeta::symbols::parse_breakpad_sym;

use super::PathArgs;
use crate::config::{Config, OutputFormat};

pub async fn run_pe(args: &PathArgs, config: &Config) -> Result<()> {
    let md = parse_pe(&args.path).await?;
    print_metadata(&md, config)
}

pub async fn run_breakpad(args: &PathArgs, config: &Config) -> Result<()> {
    let md = parse_breakpad_sym(&args.path)
        .await
        .with_context(|| format!("parsing {}", args.path.display()))?;
    print_metadata(&md, config)
}

fn print_metadata(md: &SymbolMetadata, config: &Config) -> Result<()> {
    match config.format {
        OutputFormat::Text => print!("{}", format_metadata_text(md)),
        OutputFormat::Json => println!("{}", format_metadata_json(md)?),
    }
    Ok(())
}

fn yes_no(b: bool) -> &'static str {
    if b { "yes" } else { "no" }
}

// --- Text formatting ---

fn format_metadata_text(md: &SymbolMetadata) -> String {
    let mut out = String::new();

    let source = match md.source_type {
        SourceType::PeBinary => "PE binary",
        SourceType::BreakpadSym => "Breakpad symbol file",
    };
    writeln!(out, "File: {}", md.filename).unwrap();
    writeln!(out, "Source: {source}").unwrap();
    if md.source_type == SourceType::PeBinary {
        writeln!(out, "PE image: {}", yes_no(md.is_pe)).unwrap();
    }
    if let Some(ref error) = md.error {
        writeln!(out, "Error: {error}").unwrap();
        return out;
    }
    writeln!(out, "Architecture: {} ({})", md.arch, md.arch.code()).unwrap();
    if let Some(ref os) = md.module_os {
        writeln!(out, "OS: {os}").unwrap();
    }
    writeln!(out, "PDB info: {}", yes_no(md.has_pdb_info)).unwrap();
    if let Some(ref sig) = md.pdb_sig {
        writeln!(out, "PDB signature: {sig}").unwrap();
        writeln!(out, "PDB age: {}", md.pdb_age).unwrap();
        writeln!(out, "Build ID: {}", md.build_id()).unwrap();
    }
    if !md.pdb_filename.is_empty() {
        writeln!(out, "PDB file: {}", md.pdb_filename).unwrap();
    }
    writeln!(out, "Symbol source: {}", md.symbol_source_name()).unwrap();

    out
}

// --- JSON formatting ---

fn format_metadata_json(md: &SymbolMetadata) -> Result<String> {
    serde_json::to_string_pretty(md).context("serializing metadata")
}

#[cfg(test)]
mod tests {
    use symmeta::metadata::{MachineArchitecture, SymbolSource};

    use super::*;

    fn pe_with_pdb() -> SymbolMetadata {
        let mut md = SymbolMetadata::pe("out/Exports.dll");
        md.is_pe = true;
        md.has_pdb_info = true;
        md.arch = MachineArchitecture::X86;
        md.pdb_age = 1;
        md.pdb_sig = Some("E37085B2-4E2C-4BF4-B83F-84F16BC71B74".to_string());
        md.pdb_filename = r"C:\src\Exports\Release\Exports.pdb".to_string();
        md
    }

    fn breakpad() -> SymbolMetadata {
        SymbolMetadata {
            filename: "example.sym".to_string(),
            is_pe: false,
            has_pdb_info: true,
            arch: MachineArchitecture::X64,
            pdb_age: 0x2a,
            pdb_sig: Some("00112233-4455-6677-8899-AABBCCDDEEFF".to_string()),
            pdb_filename: "example.pdb".to_string(),
            source_type: SourceType::BreakpadSym,
            symbol_path: Some("example.sym".to_string()),
            symbol_source: Some(SymbolSource::SymbolTable),
            module_os: Some("windows".to_string()),
            error: None,
        }
    }

    #[test]
    fn test_text_pe_with_pdb() {
        let output = format_metadata_text(&pe_with_pdb());
        assert!(output.contains("File: out/Exports.dll"));
        assert!(output.contains("Source: PE binary"));
        assert!(output.contains("PE image: yes"));
        assert!(output.contains("Architecture: x86 (1)"));
        assert!(output.contains("PDB info: yes"));
        assert!(output.contains("PDB signature: E37085B2-4E2C-4BF4-B83F-84F16BC71B74"));
        assert!(output.contains("PDB age: 1"));
        assert!(output.contains("Build ID: E37085B2-4E2C-4BF4-B83F-84F16BC71B74_1"));
        assert!(output.contains(r"PDB file: C:\src\Exports\Release\Exports.pdb"));
        assert!(output.contains("Symbol source: debug_info"));
    }

    #[test]
    fn test_text_soft_failure() {
        let md = SymbolMetadata::pe_soft_failure("notes.txt", "Invalid DOS header");
        let output = format_metadata_text(&md);
        assert!(output.contains("PE image: no"));
        assert!(output.contains("Error: Invalid DOS header"));
        assert!(!output.contains("Architecture:"));
    }

    #[test]
    fn test_text_breakpad() {
        let output = format_metadata_text(&breakpad());
        assert!(output.contains("Source: Breakpad symbol file"));
        assert!(!output.contains("PE image:"));
        assert!(output.contains("OS: windows"));
        assert!(output.contains("PDB age: 42"));
        assert!(output.contains("Symbol source: symbol_table"));
    }

    #[test]
    fn test_json_breakpad() {
        let json_str = format_metadata_json(&breakpad()).unwrap();
        let v: serde_json::Value = serde_json::from_str(&json_str).unwrap();
        assert_eq!(v["filename"], "example.sym");
        assert_eq!(v["isPE"], false);
        assert_eq!(v["hasPdbInfo"], true);
        assert_eq!(v["arch"], 2);
        assert_eq!(v["pdbAge"], 42);
        assert_eq!(v["pdbSig"], "00112233-4455-6677-8899-AABBCCDDEEFF");
        assert_eq!(v["pdbFilename"], "example.pdb");
        assert_eq!(v["sourceType"], "breakpad_sym");
        assert_eq!(v["symbolPath"], "example.sym");
        assert_eq!(v["symbolSource"], "symbol_table");
        assert_eq!(v["moduleOs"], "windows");
        assert!(v["error"].is_null());
    }

    #[test]
    fn test_json_soft_failure() {
        let md = SymbolMetadata::pe_soft_failure("small.dll", "file too small for a DOS header (4 bytes)");
        let v: serde_json::Value =
            serde_json::from_str(&format_metadata_json(&md).unwrap()).unwrap();
        assert_eq!(v["isPE"], false);
        assert_eq!(v["hasPdbInfo"], false);
        assert_eq!(v["error"], "file too small for a DOS header (4 bytes)");
        assert!(v["pdbSig"].is_null());
    }
}
