// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use thiserror::Error;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use crate::binary::pe::parse_pe;
use crate::error::PeError;
use crate::metadata::SymbolMetadata;

/// Why a parsed file is not a usable PE symbol candidate.
#[derive(Debug, Error)]
pub enum Rejection {
    #[error("Input location {} is not a PE file: {reason}", path.display())]
    NotPe { path: PathBuf, reason: String },
    #[error("Skipped {} because it has no debug info, nor symbols", path.display())]
    NoDebugInfo { path: PathBuf },
}

/// Accept a PE record only if it carries PDB info.
pub fn check_candidate(md: &SymbolMetadata) -> Result<(), Rejection> {
    let path = PathBuf::from(&md.filename);
    if !md.is_pe {
        let reason = md.error.clone().unwrap_or_else(|| "unknown format".to_string());
        return Err(Rejection::NotPe { path, reason });
    }
    if !md.has_pdb_info {
        return Err(Rejection::NoDebugInfo { path });
    }
    Ok(())
}

/// Decide what to do with one file found while walking a directory.
/// Unreadable files and rejected candidates are logged and skipped.
fn accept_in_directory(parsed: Result<SymbolMetadata, PeError>) -> Option<SymbolMetadata> {
    let md = match parsed {
        Ok(md) => md,
        Err(PeError::Io { path, source }) => {
            warn!("Skipped {} because it is not readable: {source}", path.display());
            return None;
        }
    };
    match check_candidate(&md) {
        Ok(()) => Some(md),
        Err(rejection) => {
            warn!("{rejection}");
            None
        }
    }
}

/// List regular files under `root`, recursively, dot-files included.
/// Symlinks are not followed.
async fn walk_files(root: &Path) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    let mut pending = vec![root.to_path_buf()];

    while let Some(dir) = pending.pop() {
        let mut entries = match tokio::fs::read_dir(&dir).await {
            Ok(entries) => entries,
            Err(e) if dir == root => {
                return Err(e).with_context(|| format!("Directory {} is not readable", dir.display()));
            }
            Err(e) => {
                warn!("Skipped directory {} because it is not readable: {e}", dir.display());
                continue;
            }
        };
        while let Some(entry) = entries
            .next_entry()
            .await
            .with_context(|| format!("reading directory: {}", dir.display()))?
        {
            let ft = entry.file_type().await?;
            if ft.is_dir() {
                pending.push(entry.path());
            } else if ft.is_file() {
                files.push(entry.path());
            }
        }
    }

    files.sort();
    Ok(files)
}

/// Parse every file under `location` as a PE image and keep those with PDB
/// info. A single file that is unreadable or not a usable candidate is an
/// error; inside a directory such files are skipped with a warning.
pub async fn collect_pe_symbol_files(
    location: &Path,
    max_concurrency: usize,
) -> Result<Vec<SymbolMetadata>> {
    let stat = tokio::fs::metadata(location)
        .await
        .with_context(|| format!("reading {}", location.display()))?;

    if !stat.is_dir() {
        let md = parse_pe(location).await?;
        check_candidate(&md)?;
        return Ok(vec![md]);
    }

    let paths = walk_files(location).await?;
    debug!("{} files under {}", paths.len(), location.display());

    let semaphore = Arc::new(Semaphore::new(max_concurrency.max(1)));
    let mut tasks = JoinSet::new();
    for path in paths {
        let semaphore = Arc::clone(&semaphore);
        tasks.spawn(async move {
            let _permit = semaphore.acquire_owned().await;
            parse_pe(&path).await
        });
    }

    let mut found = Vec::new();
    while let Some(joined) = tasks.join_next().await {
        if let Some(md) = accept_in_directory(joined.context("PE parse task failed")?) {
            found.push(md);
        }
    }

    found.sort_by(|a, b| a.filename.cmp(&b.filename));
    Ok(found)
}

/// Keep the first record for each build id.
pub fn remove_build_id_duplicates(files: Vec<SymbolMetadata>) -> Vec<SymbolMetadata> {
    let mut first_seen: HashMap<String, String> = HashMap::new();
    let mut kept = Vec::with_capacity(files.len());

    for md in files {
        let build_id = md.build_id();
        if let Some(existing) = first_seen.get(&build_id) {
            warn!(
                "Duplicate build_id found: {build_id} in {} and {existing} - skipping {}",
                md.filename, md.filename
            );
            continue;
        }
        first_seen.insert(build_id, md.filename.clone());
        kept.push(md);
    }

    kept.sort_by(|a, b| a.filename.cmp(&b.filename));
    kept
}

/// Collect candidates from several locations and drop duplicate builds.
pub async fn collect_locations(
    locations: &[PathBuf],
    max_concurrency: usize,
) -> Result<Vec<SymbolMetadata>> {
    let mut all = Vec::new();
    for location in locations {
        all.extend(collect_pe_symbol_files(location, max_concurrency).await?);
    }
    let total = all.len();
    let kept = remove_build_id_duplicates(all);
    info!("{} PE files with debug info ({} duplicates skipped)", kept.len(), total - kept.len());
    Ok(kept)
}

/// Find the .pdb that goes with a binary.
///
/// Tries the file named by the CodeView path next to the binary, then
/// `<stem>.pdb` next to the binary.
pub async fn companion_pdb_path(binary: &Path, pdb_filename: &str) -> Option<PathBuf> {
    let dir = binary.parent().unwrap_or(Path::new("."));

    let named = pdb_filename.rsplit(['\\', '/']).next().unwrap_or(pdb_filename);
    if !named.is_empty() {
        let candidate = dir.join(named);
        if tokio::fs::try_exists(&candidate).await.unwrap_or(false) {
            return Some(candidate);
        }
    }

    let stem = binary.file_stem()?;
    let mut fallback = dir.join(stem);
    fallback.set_extension("pdb");
    if tokio::fs::try_exists(&fallback).await.unwrap_or(false) {
        Some(fallback)
    } else {
        None
    }
}
