use crc32fast::Hasher as Crc32;
use flate2::write::DeflateEncoder;
use flate2::Compression;
use log::{debug, warn};
use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::{self, Read, Write};
use std::path::{Component, Path};
use zip::read::ZipArchive;

/// Result alias for archive operations.
pub type ApkZipResult<T> = Result<T, ApkZipError>;

/// Errors surfaced while reading an application archive or writing a cache archive.
#[derive(Debug)]
pub enum ApkZipError {
    Io(io::Error),
    Zip(zip::result::ZipError),
    InvalidInput(String),
}

impl std::fmt::Display for ApkZipError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ApkZipError::Io(err) => write!(f, "I/O error: {err}"),
            ApkZipError::Zip(err) => write!(f, "ZIP error: {err}"),
            ApkZipError::InvalidInput(msg) => write!(f, "{msg}"),
        }
    }
}

impl std::error::Error for ApkZipError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ApkZipError::Io(err) => Some(err),
            ApkZipError::Zip(err) => Some(err),
            ApkZipError::InvalidInput(_) => None,
        }
    }
}

impl From<io::Error> for ApkZipError {
    fn from(value: io::Error) -> Self {
        ApkZipError::Io(value)
    }
}

impl From<zip::result::ZipError> for ApkZipError {
    fn from(value: zip::result::ZipError) -> Self {
        ApkZipError::Zip(value)
    }
}

/// Compression preference for an entry.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ApkCompression {
    Stored,
    Deflated,
}

impl ApkCompression {
    /// The zip `compression method` field.
    fn method(self) -> u16 {
        match self {
            ApkCompression::Stored => 0,
            ApkCompression::Deflated => 8,
        }
    }
}

/// A single file entry stored in [`ApkFile`].
#[derive(Clone, Debug)]
pub struct ApkEntry {
    pub data: Vec<u8>,
    pub compression: Option<ApkCompression>,
}

impl ApkEntry {
    pub fn new(data: Vec<u8>) -> Self {
        ApkEntry { data, compression: None }
    }

    pub fn with_compression(mut self, compression: Option<ApkCompression>) -> Self {
        self.compression = compression;
        self
    }
}

/// The position of a dex entry in the multidex sequence: `classes.dex` is 1,
/// `classes2.dex` is 2 and so on. `None` for anything else.
pub fn dex_entry_index(name: &str) -> Option<u32> {
    let number = name.strip_prefix("classes")?.strip_suffix(".dex")?;
    if number.is_empty() {
        return Some(1);
    }
    if number.starts_with('0') || !number.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    match number.parse::<u32>() {
        Ok(n) if n >= 2 => Some(n),
        _ => None,
    }
}

/// An in-memory zip archive.
///
/// Entries are kept in a `BTreeMap`, so written archives are byte-for-byte
/// reproducible for the same contents.
#[derive(Default)]
pub struct ApkFile {
    entries: BTreeMap<String, ApkEntry>,
}

impl ApkFile {
    pub fn new() -> Self {
        ApkFile { entries: BTreeMap::new() }
    }

    /// Load every file entry of an archive.
    pub fn from_file(path: impl AsRef<Path>) -> ApkZipResult<Self> {
        Self::from_file_filtered(path, |_| true)
    }

    /// Load only the `classes*.dex` entries of an application archive.
    pub fn dex_entries_from_file(path: impl AsRef<Path>) -> ApkZipResult<Self> {
        Self::from_file_filtered(path, |name| dex_entry_index(name).is_some())
    }

    fn from_file_filtered(path: impl AsRef<Path>, wanted: impl Fn(&str) -> bool) -> ApkZipResult<Self> {
        let path = path.as_ref();
        let file = File::open(path)?;
        let mut archive = ZipArchive::new(file)?;
        let mut entries = BTreeMap::new();
        for idx in 0..archive.len() {
            let mut entry = archive.by_index(idx)?;
            if entry.is_dir() {
                continue;
            }
            let name = match entry.enclosed_name() {
                Some(enclosed) => path_to_entry_name(enclosed)?,
                None => {
                    warn!("skipping unsafe entry name {:?} in {}", entry.name(), path.display());
                    continue;
                }
            };
            if !wanted(&name) {
                continue;
            }
            let mut data = Vec::with_capacity(entry.size().min(64 * 1024 * 1024) as usize);
            entry.read_to_end(&mut data)?;
            let compression = match entry.compression() {
                zip::CompressionMethod::Stored => Some(ApkCompression::Stored),
                zip::CompressionMethod::Deflated => Some(ApkCompression::Deflated),
                _ => None,
            };
            entries.insert(name, ApkEntry::new(data).with_compression(compression));
        }
        debug!("read {} entries from {}", entries.len(), path.display());
        Ok(ApkFile { entries })
    }

    /// Serialize the in-memory archive to disk.
    pub fn write_to_file(&self, path: impl AsRef<Path>) -> ApkZipResult<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        let mut buffer = Vec::new();
        let mut central_records = Vec::new();

        for (name, entry) in &self.entries {
            let plan = plan_entry(name, entry);
            let record = write_local_entry(&mut buffer, name, entry, &plan)?;
            central_records.push(record);
        }

        let central_start = buffer.len() as u32;
        for record in &central_records {
            write_central_directory_entry(&mut buffer, record);
        }
        let central_size = buffer.len() as u32 - central_start;
        write_end_of_central_directory(&mut buffer, central_records.len(), central_size, central_start)?;

        fs::write(path, buffer)?;
        Ok(())
    }

    /// Iterate over entry names.
    pub fn entry_names(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(|s| s.as_str())
    }

    /// Borrow an entry by name (e.g., `classes.dex`).
    pub fn entry(&self, name: &str) -> Option<&ApkEntry> {
        self.entries.get(name)
    }

    /// Replace the contents of an entry (or add a new entry).
    pub fn replace_entry(&mut self, name: impl AsRef<str>, data: Vec<u8>) -> ApkZipResult<()> {
        let normalized = normalize_entry_name(name.as_ref())?;
        self.entries.insert(normalized, ApkEntry::new(data));
        Ok(())
    }

    /// Move the dex entries out, ordered `classes.dex`, `classes2.dex`, ...
    pub fn into_dex_entries(self) -> Vec<(String, Vec<u8>)> {
        let mut dex: Vec<(u32, String, Vec<u8>)> = self
            .entries
            .into_iter()
            .filter_map(|(name, entry)| dex_entry_index(&name).map(|n| (n, name, entry.data)))
            .collect();
        dex.sort_by_key(|(n, _, _)| *n);
        dex.into_iter().map(|(_, name, data)| (name, data)).collect()
    }
}

#[derive(Clone, Copy)]
struct EntryPlan {
    compression: ApkCompression,
    alignment: Option<u32>,
}

#[derive(Clone)]
struct CentralDirectoryRecord {
    file_name: Vec<u8>,
    compression: ApkCompression,
    crc32: u32,
    compressed_size: u32,
    uncompressed_size: u32,
    local_header_offset: u32,
}

/// Dex files are stored uncompressed and 4-byte aligned so they can be mapped in place.
fn plan_entry(name: &str, entry: &ApkEntry) -> EntryPlan {
    let compression = entry.compression.unwrap_or(if name.to_ascii_lowercase().ends_with(".dex") {
        ApkCompression::Stored
    } else {
        ApkCompression::Deflated
    });
    let alignment = match compression {
        ApkCompression::Stored => Some(4),
        ApkCompression::Deflated => None,
    };
    EntryPlan { compression, alignment }
}

fn write_local_entry(
    buf: &mut Vec<u8>,
    name: &str,
    entry: &ApkEntry,
    plan: &EntryPlan,
) -> ApkZipResult<CentralDirectoryRecord> {
    if entry.data.len() > u32::MAX as usize || name.len() > u16::MAX as usize {
        return Err(ApkZipError::InvalidInput(format!("{name} is too large for a zip entry")));
    }
    let offset = buf.len() as u32;
    let extra_len = match plan.alignment {
        Some(align) => alignment_padding(offset, name.len(), align),
        None => 0,
    };

    let compressed_bytes = match plan.compression {
        ApkCompression::Stored => entry.data.clone(),
        ApkCompression::Deflated => deflate_bytes(&entry.data)?,
    };

    let mut crc = Crc32::new();
    crc.update(&entry.data);
    let crc32 = crc.finalize();

    write_u32(buf, 0x04034b50);
    write_u16(buf, 20);
    write_u16(buf, 0);
    write_u16(buf, plan.compression.method());
    write_u16(buf, 0);
    write_u16(buf, 0);
    write_u32(buf, crc32);
    write_u32(buf, compressed_bytes.len() as u32);
    write_u32(buf, entry.data.len() as u32);
    write_u16(buf, name.len() as u16);
    write_u16(buf, extra_len as u16);
    buf.extend_from_slice(name.as_bytes());
    buf.resize(buf.len() + extra_len as usize, 0);
    buf.extend_from_slice(&compressed_bytes);

    Ok(CentralDirectoryRecord {
        file_name: name.as_bytes().to_vec(),
        compression: plan.compression,
        crc32,
        compressed_size: compressed_bytes.len() as u32,
        uncompressed_size: entry.data.len() as u32,
        local_header_offset: offset,
    })
}

fn write_central_directory_entry(buf: &mut Vec<u8>, record: &CentralDirectoryRecord) {
    write_u32(buf, 0x02014b50);
    write_u16(buf, 0x031E);
    write_u16(buf, 20);
    write_u16(buf, 0);
    write_u16(buf, record.compression.method());
    write_u16(buf, 0);
    write_u16(buf, 0);
    write_u32(buf, record.crc32);
    write_u32(buf, record.compressed_size);
    write_u32(buf, record.uncompressed_size);
    write_u16(buf, record.file_name.len() as u16);
    write_u16(buf, 0);
    write_u16(buf, 0);
    write_u16(buf, 0);
    write_u16(buf, 0);
    write_u32(buf, 0o644 << 16);
    write_u32(buf, record.local_header_offset);
    buf.extend_from_slice(&record.file_name);
}

fn write_end_of_central_directory(
    buf: &mut Vec<u8>,
    entry_count: usize,
    central_size: u32,
    central_offset: u32,
) -> ApkZipResult<()> {
    if entry_count > u16::MAX as usize {
        return Err(ApkZipError::InvalidInput(format!("too many entries: {entry_count}")));
    }
    write_u32(buf, 0x06054b50);
    write_u16(buf, 0);
    write_u16(buf, 0);
    write_u16(buf, entry_count as u16);
    write_u16(buf, entry_count as u16);
    write_u32(buf, central_size);
    write_u32(buf, central_offset);
    write_u16(buf, 0);
    Ok(())
}

fn deflate_bytes(data: &[u8]) -> ApkZipResult<Vec<u8>> {
    let mut encoder = DeflateEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(data)?;
    Ok(encoder.finish()?)
}

fn path_to_entry_name(path: &Path) -> ApkZipResult<String> {
    let mut components = Vec::new();
    for comp in path.components() {
        match comp {
            Component::Normal(part) => components.push(part.to_string_lossy().replace('\\', "/")),
            Component::CurDir => {}
            Component::RootDir | Component::Prefix(_) => {
                return Err(ApkZipError::InvalidInput(format!(
                    "invalid entry path component in {}",
                    path.display()
                )));
            }
            Component::ParentDir => {
                return Err(ApkZipError::InvalidInput(
                    "entry paths may not contain parent components".to_string(),
                ));
            }
        }
    }
    if components.is_empty() {
        return Err(ApkZipError::InvalidInput("entry name must not be empty".to_string()));
    }
    Ok(components.join("/"))
}

fn normalize_entry_name(name: &str) -> ApkZipResult<String> {
    path_to_entry_name(Path::new(name))
}

fn write_u16(buf: &mut Vec<u8>, value: u16) {
    buf.extend_from_slice(&value.to_le_bytes());
}

fn write_u32(buf: &mut Vec<u8>, value: u32) {
    buf.extend_from_slice(&value.to_le_bytes());
}

fn alignment_padding(offset: u32, name_len: usize, alignment: u32) -> u32 {
    if alignment <= 1 {
        return 0;
    }
    let base = offset as u64 + 30 + name_len as u64;
    let align = alignment as u64;
    ((align - (base % align)) % align) as u32
}
