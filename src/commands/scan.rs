// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

use std::fmt::Write;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Serialize;
use symmeta::metadata::SymbolMetadata;
use symmeta::scan::{collect_locations, companion_pdb_path};

use super::ScanArgs;
use crate::config::{Config, OutputFormat};

/// A scanned image plus the .pdb found next to it, if any.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ScanEntry {
    #[serde(flatten)]
    metadata: SymbolMetadata,
    companion_pdb: Option<PathBuf>,
}

pub async fn run(args: &ScanArgs, config: &Config) -> Result<()> {
    let found = collect_locations(&args.locations, config.max_concurrency).await?;

    let mut entries = Vec::with_capacity(found.len());
    for md in found {
        let companion_pdb = companion_pdb_path(Path::new(&md.filename), &md.pdb_filename).await;
        entries.push(ScanEntry {
            metadata: md,
            companion_pdb,
        });
    }

    match config.format {
        OutputFormat::Text => print!("{}", format_scan_text(&entries)),
        OutputFormat::Json => println!("{}", format_scan_json(&entries)?),
    }
    Ok(())
}

fn format_scan_text(entries: &[ScanEntry]) -> String {
    let mut out = String::new();
    for entry in entries {
        let md = &entry.metadata;
        writeln!(
            out,
            "{} (arch:{} pdb_age:{} pdb_sig:{} filename:{})",
            md.filename,
            md.arch,
            md.pdb_age,
            md.pdb_sig.as_deref().unwrap_or("?"),
            md.pdb_basename(),
        )
        .unwrap();
        match entry.companion_pdb {
            Some(ref pdb) => writeln!(out, "  pdb: {}", pdb.display()).unwrap(),
            None => writeln!(out, "  pdb: not found next to the image").unwrap(),
        }
    }
    if entries.is_empty() {
        writeln!(out, "No PE files with debug info found.").unwrap();
    }
    out
}

fn format_scan_json(entries: &[ScanEntry]) -> Result<String> {
    serde_json::to_string_pretty(entries).context("serializing scan results")
}
