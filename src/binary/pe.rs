// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

use std::io::{self, Cursor, SeekFrom};
use std::path::Path;

use goblin::pe::debug::{
    ImageDebugDirectory, CODEVIEW_PDB70_MAGIC, IMAGE_DEBUG_DIRECTORY_SIZE,
    IMAGE_DEBUG_TYPE_CODEVIEW,
};
use goblin::pe::header::{
    Header, DOS_MAGIC, PE_MAGIC, PE_POINTER_OFFSET, SIZEOF_COFF_HEADER, SIZEOF_PE_MAGIC,
};
use goblin::pe::optional_header::{OptionalHeader, MAGIC_32, MAGIC_64};
use goblin::pe::section_table::SIZEOF_SECTION_TABLE;
use scroll::{Pread, LE};
use tokio::fs::File;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncSeek, AsyncSeekExt};
use tracing::debug;

use crate::error::{PeError, PeFormatError};
use crate::guid::format_guid_bytes;
use crate::metadata::{MachineArchitecture, SymbolMetadata};

const DOS_HEADER_SIZE: usize = 64;

// Offsets relative to the "PE\0\0" signature.
const COFF_NUMBER_OF_SECTIONS_OFFSET: usize = 6;
const COFF_SIZE_OF_OPTIONAL_HEADER_OFFSET: usize = 20;
const OPTIONAL_HEADER_OFFSET: usize = SIZEOF_PE_MAGIC + SIZEOF_COFF_HEADER;

// Offsets relative to the optional header.
const PE32_DATA_DIRECTORIES_OFFSET: usize = 96;
const PE32PLUS_DATA_DIRECTORIES_OFFSET: usize = 112;

const IMAGE_DATA_DIRECTORY_SIZE: usize = 8;
const IMAGE_DIRECTORY_ENTRY_DEBUG: usize = 6;
const CV_INFO_PDB70_HEADER_SIZE: usize = 24;
/// Longest PDB path read from a CodeView record.
const PDB_PATH_MAX: usize = 0x8000;

/// RVAs below this live in the header page, where RVA == file offset.
const HEADER_PAGE_SIZE: u64 = 0x1000;

/// Fields of the DOS/COFF/optional headers needed to find debug info.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PeHeader {
    pub pe_header_offset: u64,
    pub machine: u16,
    pub arch: MachineArchitecture,
    pub number_of_sections: u16,
    /// Link time, seconds since the Unix epoch.
    pub time_date_stamp: u32,
    pub size_of_optional_header: u16,
    /// PE32+ rather than PE32.
    pub is_64: bool,
}

/// An `IMAGE_DATA_DIRECTORY` entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DataDirectory {
    pub virtual_address: u32,
    pub size: u32,
}

/// A CodeView PDB 7.0 (`RSDS`) record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CodeViewPdb70 {
    /// GUID bytes as stored on disk.
    pub guid: [u8; 16],
    pub age: u32,
    pub path: String,
}

/// Everything the parser extracts from a structurally valid image.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PeDebugInfo {
    pub header: PeHeader,
    pub codeview: Option<CodeViewPdb70>,
}

impl PeDebugInfo {
    pub fn into_metadata(self, filename: &str) -> SymbolMetadata {
        let mut md = SymbolMetadata::pe(filename);
        md.is_pe = true;
        md.arch = self.header.arch;
        if let Some(cv) = self.codeview {
            md.has_pdb_info = true;
            md.pdb_age = cv.age;
            md.pdb_sig = Some(format_guid_bytes(&cv.guid));
            md.pdb_filename = cv.path;
        }
        md
    }
}

struct SectionInfo {
    virtual_address: u64,
    virtual_size: u64,
    pointer_to_raw_data: u64,
    size_of_raw_data: u64,
}

/// Section headers, used to map RVAs to file offsets.
struct SectionMap {
    sections: Vec<SectionInfo>,
}

impl SectionMap {
    /// Convert an RVA to a file offset.
    fn rva_to_offset(&self, rva: u64) -> Option<u64> {
        if rva < HEADER_PAGE_SIZE {
            return Some(rva);
        }
        for section in &self.sections {
            // Some linkers leave VirtualSize at 0
            let size = if section.virtual_size == 0 {
                section.size_of_raw_data
            } else {
                section.virtual_size
            };
            if rva >= section.virtual_address && rva < section.virtual_address + size {
                return Some(rva - section.virtual_address + section.pointer_to_raw_data);
            }
        }
        None
    }

    /// Like `rva_to_offset`, falling back to a flat read for images whose
    /// sections do not cover the RVA.
    fn resolve(&self, rva: u32) -> u64 {
        let rva = u64::from(rva);
        self.rva_to_offset(rva).unwrap_or_else(|| {
            debug!("RVA 0x{rva:x} not in any section, reading it as a file offset");
            rva
        })
    }
}

/// Parsed header page: the header fields, the section table and data
/// directory 6.
struct ImageHeaders {
    header: PeHeader,
    sections: SectionMap,
    debug_directory: Option<DataDirectory>,
}

/// Why a walk over an image stopped.
#[derive(Debug)]
enum WalkError {
    Io(io::Error),
    Format(PeFormatError),
}

impl From<io::Error> for WalkError {
    fn from(e: io::Error) -> Self {
        Self::Io(e)
    }
}

impl From<PeFormatError> for WalkError {
    fn from(e: PeFormatError) -> Self {
        Self::Format(e)
    }
}

impl From<scroll::Error> for WalkError {
    fn from(e: scroll::Error) -> Self {
        Self::Format(e.into())
    }
}

/// Bounds-checked ranged reads over an image of known length.
struct ImageReader<'r, R> {
    inner: &'r mut R,
    len: u64,
}

impl<R: AsyncRead + AsyncSeek + Unpin> ImageReader<'_, R> {
    async fn read_at(
        &mut self,
        offset: u64,
        len: usize,
        what: &'static str,
    ) -> Result<Vec<u8>, WalkError> {
        let in_bounds = offset
            .checked_add(len as u64)
            .is_some_and(|end| end <= self.len);
        if !in_bounds {
            return Err(PeFormatError::OutOfBounds {
                what,
                offset,
                len,
                file_len: usize::try_from(self.len).unwrap_or(usize::MAX),
            }
            .into());
        }
        self.inner.seek(SeekFrom::Start(offset)).await?;
        let mut buf = vec![0u8; len];
        self.inner.read_exact(&mut buf).await?;
        Ok(buf)
    }

    /// Up to `len` bytes at `offset`, cut short at the end of the image.
    async fn read_clamped(
        &mut self,
        offset: u64,
        len: usize,
        what: &'static str,
    ) -> Result<Vec<u8>, WalkError> {
        let offset = offset.min(self.len);
        let available = usize::try_from(self.len - offset).unwrap_or(usize::MAX);
        self.read_at(offset, len.min(available), what).await
    }
}

/// Number of leading bytes taken by the headers and the section table, as
/// far as `prefix` can tell. When `prefix` stops before the COFF header ends,
/// that end is returned so the caller can read more and ask again.
fn headers_extent(prefix: &[u8]) -> Result<u64, PeFormatError> {
    if prefix.len() < DOS_HEADER_SIZE {
        return Err(PeFormatError::TooSmall(prefix.len()));
    }
    if prefix.pread_with::<u16>(0, LE)? != DOS_MAGIC {
        return Err(PeFormatError::InvalidDosHeader);
    }
    let pe_offset = prefix.pread_with::<u32>(PE_POINTER_OFFSET as usize, LE)?;
    let coff_end = u64::from(pe_offset) + OPTIONAL_HEADER_OFFSET as u64;
    if (prefix.len() as u64) < coff_end {
        return Ok(coff_end);
    }

    let pe_offset = pe_offset as usize;
    if prefix.pread_with::<u32>(pe_offset, LE)? != PE_MAGIC {
        return Err(PeFormatError::InvalidPeSignature);
    }
    let number_of_sections =
        prefix.pread_with::<u16>(pe_offset + COFF_NUMBER_OF_SECTIONS_OFFSET, LE)?;
    let size_of_optional_header =
        prefix.pread_with::<u16>(pe_offset + COFF_SIZE_OF_OPTIONAL_HEADER_OFFSET, LE)?;
    Ok(coff_end
        + u64::from(size_of_optional_header)
        + u64::from(number_of_sections) * SIZEOF_SECTION_TABLE as u64)
}

/// Data directory 6, if the optional header is large enough to hold it and
/// it is not empty.
fn debug_data_directory(opt: &OptionalHeader, header: &PeHeader) -> Option<DataDirectory> {
    let directories_offset = if header.is_64 {
        PE32PLUS_DATA_DIRECTORIES_OFFSET
    } else {
        PE32_DATA_DIRECTORIES_OFFSET
    };
    let entry_end =
        directories_offset + (IMAGE_DIRECTORY_ENTRY_DEBUG + 1) * IMAGE_DATA_DIRECTORY_SIZE;
    if usize::from(header.size_of_optional_header) < entry_end {
        return None;
    }

    // goblin leaves entries past NumberOfRvaAndSizes empty
    let dd = opt.data_directories.get_debug_table()?;
    if dd.virtual_address == 0 || dd.size == 0 {
        return None;
    }
    Some(DataDirectory {
        virtual_address: dd.virtual_address,
        size: dd.size,
    })
}

fn parse_headers(bytes: &[u8]) -> Result<ImageHeaders, PeFormatError> {
    let extent = headers_extent(bytes)?;
    if (bytes.len() as u64) < extent {
        return Err(PeFormatError::OutOfBounds {
            what: "PE headers",
            offset: 0,
            len: usize::try_from(extent).unwrap_or(usize::MAX),
            file_len: bytes.len(),
        });
    }

    let pe_offset = bytes.pread_with::<u32>(PE_POINTER_OFFSET as usize, LE)? as usize;
    let optional_offset = pe_offset + OPTIONAL_HEADER_OFFSET;
    let is_64 = match bytes.pread_with::<u16>(optional_offset, LE)? {
        MAGIC_32 => false,
        MAGIC_64 => true,
        other => return Err(PeFormatError::UnsupportedOptionalHeader(other)),
    };

    let parsed = Header::parse(bytes)?;
    let coff = parsed.coff_header;
    let header = PeHeader {
        pe_header_offset: pe_offset as u64,
        machine: coff.machine,
        arch: MachineArchitecture::from_pe_machine(coff.machine),
        number_of_sections: coff.number_of_sections,
        time_date_stamp: coff.time_date_stamp,
        size_of_optional_header: coff.size_of_optional_header,
        is_64,
    };

    let mut section_offset = optional_offset + usize::from(coff.size_of_optional_header);
    let sections = coff
        .sections(bytes, &mut section_offset)?
        .iter()
        .map(|s| SectionInfo {
            virtual_address: u64::from(s.virtual_address),
            virtual_size: u64::from(s.virtual_size),
            pointer_to_raw_data: u64::from(s.pointer_to_raw_data),
            size_of_raw_data: u64::from(s.size_of_raw_data),
        })
        .collect();

    let debug_directory = parsed
        .optional_header
        .as_ref()
        .and_then(|opt| debug_data_directory(opt, &header));

    Ok(ImageHeaders {
        header,
        sections: SectionMap { sections },
        debug_directory,
    })
}

/// Validate the DOS, COFF and optional headers and read the fields needed to
/// locate the debug directory. `headers` must reach past the section table.
pub fn read_pe_header(headers: &[u8]) -> Result<PeHeader, PeFormatError> {
    parse_headers(headers).map(|image| image.header)
}

async fn read_codeview<R: AsyncRead + AsyncSeek + Unpin>(
    reader: &mut ImageReader<'_, R>,
    sections: &SectionMap,
    entry: &ImageDebugDirectory,
) -> Result<Option<CodeViewPdb70>, WalkError> {
    let offset = if entry.pointer_to_raw_data != 0 {
        u64::from(entry.pointer_to_raw_data)
    } else {
        sections.resolve(entry.address_of_raw_data)
    };

    let signature = reader
        .read_at(offset, 4, "CodeView signature")
        .await?
        .pread_with::<u32>(0, LE)?;
    if signature != CODEVIEW_PDB70_MAGIC {
        debug!("CodeView record has signature 0x{signature:08x}, not RSDS");
        return Ok(None);
    }

    let record = reader
        .read_at(offset, CV_INFO_PDB70_HEADER_SIZE, "CodeView PDB70 record")
        .await?;
    let mut cursor = 4;
    let mut guid = [0u8; 16];
    record.gread_inout_with(&mut cursor, &mut guid[..], LE)?;
    let age = record.gread_with::<u32>(&mut cursor, LE)?;

    let path_len = (entry.size_of_data as usize)
        .saturating_sub(CV_INFO_PDB70_HEADER_SIZE)
        .min(PDB_PATH_MAX);
    let path_bytes = reader
        .read_clamped(
            offset + CV_INFO_PDB70_HEADER_SIZE as u64,
            path_len,
            "CodeView PDB path",
        )
        .await?;
    let end = path_bytes.iter().position(|&b| b == 0).unwrap_or(path_bytes.len());
    let path = String::from_utf8_lossy(&path_bytes[..end]).into_owned();

    Ok(Some(CodeViewPdb70 { guid, age, path }))
}

/// Walk the header chain to the CodeView record. Only the header page, the
/// debug directory and the record itself are read.
async fn walk_image<R: AsyncRead + AsyncSeek + Unpin>(
    source: &mut R,
    len: u64,
) -> Result<PeDebugInfo, WalkError> {
    let mut reader = ImageReader { inner: source, len };

    let mut headers = reader
        .read_at(0, len.min(HEADER_PAGE_SIZE) as usize, "PE headers")
        .await?;
    loop {
        let extent = headers_extent(&headers)?;
        if extent <= headers.len() as u64 {
            break;
        }
        let extent = usize::try_from(extent).unwrap_or(usize::MAX);
        headers = reader.read_at(0, extent, "PE headers").await?;
    }
    let image = parse_headers(&headers)?;

    let Some(directory) = image.debug_directory else {
        debug!("no debug directory");
        return Ok(PeDebugInfo {
            header: image.header,
            codeview: None,
        });
    };

    let directory_offset = image.sections.resolve(directory.virtual_address);
    let entries = reader
        .read_at(directory_offset, directory.size as usize, "debug directory")
        .await?;

    // a trailing partial entry is ignored
    for index in 0..entries.len() / IMAGE_DEBUG_DIRECTORY_SIZE {
        let entry: ImageDebugDirectory =
            entries.pread_with(index * IMAGE_DEBUG_DIRECTORY_SIZE, LE)?;
        if entry.data_type == IMAGE_DEBUG_TYPE_CODEVIEW {
            let codeview = read_codeview(&mut reader, &image.sections, &entry).await?;
            return Ok(PeDebugInfo {
                header: image.header,
                codeview,
            });
        }
    }

    debug!("debug directory has no CodeView entry");
    Ok(PeDebugInfo {
        header: image.header,
        codeview: None,
    })
}

/// Format problems become a soft failure; I/O errors are handed back.
fn summarize(
    filename: &str,
    walked: Result<PeDebugInfo, WalkError>,
) -> Result<SymbolMetadata, io::Error> {
    match walked {
        Ok(info) => Ok(info.into_metadata(filename)),
        Err(WalkError::Format(reason)) => {
            debug!("{filename} is not a usable PE image: {reason}");
            Ok(SymbolMetadata::pe_soft_failure(filename, reason))
        }
        Err(WalkError::Io(e)) => Err(e),
    }
}

/// Extract symbol metadata from an in-memory image.
///
/// Never fails: a buffer that is not a valid PE yields `is_pe == false` with
/// `error` set.
pub async fn parse_pe_bytes(filename: &str, data: &[u8]) -> SymbolMetadata {
    let mut cursor = Cursor::new(data);
    let walked = walk_image(&mut cursor, data.len() as u64).await;
    summarize(filename, walked).unwrap_or_else(|e| SymbolMetadata::pe_soft_failure(filename, e))
}

/// Extract symbol metadata from a PE file.
///
/// Fails only when the file cannot be read.
pub async fn parse_pe(path: impl AsRef<Path>) -> Result<SymbolMetadata, PeError> {
    let path = path.as_ref();
    let io_error = |source: io::Error| PeError::Io {
        path: path.to_path_buf(),
        source,
    };

    let mut file = File::open(path).await.map_err(io_error)?;
    let len = file.metadata().await.map_err(io_error)?.len();
    let walked = walk_image(&mut file, len).await;
    summarize(&path.to_string_lossy(), walked).map_err(io_error)
}
