// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

pub mod inspect;
pub mod scan;

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand, ValueEnum};

use crate::config::Config;
use crate::logging;

const PE_LONG_HELP: &str = r#"OUTPUT FIELDS:

  isPE          true only for a structurally valid PE image
  hasPdbInfo    a CodeView RSDS record was found
  arch          0 unknown, 1 x86, 2 x64, 3 arm32, 4 arm64
  pdbSig        PDB GUID, XXXXXXXX-XXXX-XXXX-XXXX-XXXXXXXXXXXX
  pdbAge        PDB age from the CodeView record
  pdbFilename   PDB path recorded by the linker
  error         why the file is not a PE image (never set with isPE)

  Files that are not PE images are reported, not rejected: the command
  only fails when the file cannot be read.

EXAMPLES:

  symmeta pe build/Release/Exports.dll
  symmeta --format json pe app.exe"#;

const BREAKPAD_LONG_HELP: &str = r#"The first non-empty line must be a MODULE record:

  MODULE <os> <cpu> <id> <name>

  <id> is the 32-hex-digit PDB GUID followed by the age in hex. The file
  must be pure ASCII. symbolSource is debug_info when FILE or FUNC records
  are present, symbol_table otherwise.

EXAMPLES:

  symmeta breakpad symbols/example.sym
  symmeta --format json breakpad xul.sym"#;

const SCAN_LONG_HELP: &str = r#"Collects PE images that carry PDB info from files or directories
(searched recursively). Inside a directory, files that are not PE images or
have no debug info are skipped with a warning; a single file location that
is not usable is an error. Images sharing a build id (PDB GUID + age) are
reported once.

EXAMPLES:

  symmeta scan build/Release
  symmeta -v --max-concurrency 8 scan out/x64 out/x86"#;

#[derive(Parser)]
#[command(
    name = "symmeta",
    version,
    about = "Extract PDB identity metadata from PE images and Breakpad symbol files",
    long_about = "Extract PDB identity metadata from PE images and Breakpad symbol files.\n\n\
        Reads the CodeView record of a PE image, or the MODULE header of a \
        Breakpad .sym file, and prints the architecture, PDB GUID, age and \
        PDB file name used to match symbols with crash reports.\n\n\
        Subcommands:\n  \
        pe        Inspect a PE image (.dll, .exe)\n  \
        breakpad  Inspect a Breakpad .sym file\n  \
        scan      Collect PE images with debug info from files or directories"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Output format
    #[arg(long, global = true, env = "SYMMETA_FORMAT", default_value = "text")]
    pub format: FormatArg,

    /// Verbose output (-v info, -vv debug)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Maximum number of files parsed at once
    #[arg(long, global = true)]
    pub max_concurrency: Option<usize>,
}

#[derive(Clone, Copy, ValueEnum)]
pub enum FormatArg {
    Text,
    Json,
}

#[derive(Subcommand)]
pub enum Command {
    /// Show symbol metadata of a PE image
    #[command(after_long_help = PE_LONG_HELP)]
    Pe(PathArgs),
    /// Show symbol metadata of a Breakpad .sym file
    #[command(after_long_help = BREAKPAD_LONG_HELP)]
    Breakpad(PathArgs),
    /// Collect PE images with debug info
    #[command(after_long_help = SCAN_LONG_HELP)]
    Scan(ScanArgs),
}

#[derive(Parser)]
pub struct PathArgs {
    /// File to inspect
    pub path: PathBuf,
}

#[derive(Parser)]
pub struct ScanArgs {
    /// Files or directories to scan
    #[arg(required = true)]
    pub locations: Vec<PathBuf>,
}

pub async fn run(cli: Cli) -> Result<()> {
    let config = Config::resolve(&cli)?;
    logging::init(config.verbose);

    match cli.command {
        Command::Pe(ref args) => inspect::run_pe(args, &config).await,
        Command::Breakpad(ref args) => inspect::run_breakpad(args, &config).await,
        Command::Scan(ref args) => scan::run(args, &config).await,
    }
}
