//! Append-only class store backing one namespace.
//!
//! On-disk format:
//! ```text
//! [optional version record (24 bytes)]
//! [class record]
//! [class record]
//! ...
//! ```
//!
//! Records are self-sized (see `cim_codec::layout`). A class whose name
//! starts with [`TOMBSTONE_PREFIX`] is logically deleted: it stays on disk but
//! is never indexed. The same record stream may be stored zstd-compressed in
//! `<store_file>.zst`; compressed stores are read-only.

use std::collections::HashMap;
use std::ffi::OsString;
use std::fs::{self, File, OpenOptions};
use std::io::{self, BufReader, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use cim_codec::{CodecError, ConstClass, RecordHeader, RecordKind, VersionRecord, HEADER_LEN, VERSION_RECORD_LEN};
use tempfile::NamedTempFile;
use tracing::{debug, trace};

use crate::error::{RegistryError, RegistryResult};
use crate::tree::ClassKey;

/// Default file name of a namespace's class store.
pub const DEFAULT_STORE_FILE: &str = "classSchemas";

/// Extension appended to the store file name for the compressed variant.
pub const COMPRESSED_EXTENSION: &str = "zst";

/// Class names with this prefix are logically deleted.
pub const TOMBSTONE_PREFIX: &str = "DMY_";

/// zstd level used when writing compressed stores.
const COMPRESSION_LEVEL: i32 = 3;

/// Upper bound on the buffer preallocated for one record before its bytes
/// are actually read.
const MAX_PREALLOC: usize = 64 * 1024;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StoreFormat {
    Plain,
    Compressed,
}

/// A class record found while scanning a store.
#[derive(Debug)]
pub struct StoredClass {
    pub position: u64,
    pub length: u32,
    pub class: ConstClass,
}

/// Summary of a completed scan.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ScanSummary {
    pub version: Option<VersionRecord>,
    pub classes: usize,
    pub tombstones: usize,
    pub bytes: u64,
}

/// Where an appended record landed.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Appended {
    pub position: u64,
    /// The store did not exist and was created with a version record.
    pub created: bool,
}

/// Handle on one namespace's class store file.
#[derive(Clone, Debug)]
pub struct BackingStore {
    path: PathBuf,
    format: StoreFormat,
}

fn compressed_path(plain: &Path) -> PathBuf {
    let mut name = OsString::from(plain.as_os_str());
    name.push(".");
    name.push(COMPRESSED_EXTENSION);
    PathBuf::from(name)
}

/// Read until `buf` is full or the reader is exhausted.
fn read_full(reader: &mut dyn Read, buf: &mut [u8]) -> io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
            Err(e) => return Err(e),
        }
    }
    Ok(filled)
}

impl BackingStore {
    /// Find an existing store in `dir`: the plain file, or failing that the
    /// compressed variant.
    pub fn locate(dir: &Path, file_name: &str) -> Option<Self> {
        let plain = dir.join(file_name);
        if plain.is_file() {
            return Some(Self {
                path: plain,
                format: StoreFormat::Plain,
            });
        }
        let compressed = compressed_path(&plain);
        compressed.is_file().then_some(Self {
            path: compressed,
            format: StoreFormat::Compressed,
        })
    }

    /// The existing store in `dir`, or a plain store that will be created on
    /// the first append.
    pub fn locate_or_new(dir: &Path, file_name: &str) -> Self {
        Self::locate(dir, file_name).unwrap_or_else(|| Self {
            path: dir.join(file_name),
            format: StoreFormat::Plain,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn format(&self) -> StoreFormat {
        self.format
    }

    pub fn is_read_only(&self) -> bool {
        self.format == StoreFormat::Compressed
    }

    pub fn exists(&self) -> bool {
        self.path.is_file()
    }

    fn corrupt(&self, position: u64, source: CodecError) -> RegistryError {
        RegistryError::Corrupt {
            path: self.path.clone(),
            position,
            source,
        }
    }

    fn ensure_writable(&self) -> RegistryResult<()> {
        if self.is_read_only() {
            return Err(RegistryError::ReadOnly(self.path.clone()));
        }
        Ok(())
    }

    fn reader(&self) -> RegistryResult<Box<dyn Read>> {
        let file = File::open(&self.path)?;
        Ok(match self.format {
            StoreFormat::Plain => Box::new(BufReader::new(file)),
            StoreFormat::Compressed => Box::new(zstd::stream::read::Decoder::new(file)?),
        })
    }

    /// Read every record front to back, handing live classes to `visit`.
    ///
    /// Any malformed record aborts the scan: callers must not publish what
    /// they collected before the error.
    pub fn scan<F>(&self, mut visit: F) -> RegistryResult<ScanSummary>
    where
        F: FnMut(StoredClass) -> RegistryResult<()>,
    {
        let mut reader = self.reader()?;
        let mut summary = ScanSummary::default();
        let mut position: u64 = 0;

        loop {
            let mut header_buf = [0u8; HEADER_LEN];
            let got = read_full(reader.as_mut(), &mut header_buf)?;
            if got == 0 {
                break;
            }
            if got < HEADER_LEN {
                return Err(self.corrupt(
                    position,
                    CodecError::Truncated {
                        needed: HEADER_LEN,
                        available: got,
                    },
                ));
            }
            let header = RecordHeader::peek(&header_buf).map_err(|e| self.corrupt(position, e))?;
            let size = header.size as usize;

            let mut record = Vec::with_capacity(size.min(MAX_PREALLOC));
            record.extend_from_slice(&header_buf);
            reader
                .as_mut()
                .take((size - HEADER_LEN) as u64)
                .read_to_end(&mut record)?;
            if record.len() < size {
                return Err(self.corrupt(
                    position,
                    CodecError::SizeMismatch {
                        declared: header.size,
                        available: record.len(),
                    },
                ));
            }

            match header.kind {
                RecordKind::Version => {
                    if position != 0 {
                        return Err(self.corrupt(
                            position,
                            CodecError::Corrupt {
                                offset: 0,
                                reason: "version record after the start of the store".into(),
                            },
                        ));
                    }
                    let version = VersionRecord::decode(&record).map_err(|e| self.corrupt(position, e))?;
                    trace!(?version, "store version record");
                    summary.version = Some(version);
                }
                RecordKind::Class => {
                    let class = ConstClass::decode(record).map_err(|e| self.corrupt(position, e))?;
                    if class.name().starts_with(TOMBSTONE_PREFIX) {
                        debug!(class = class.name(), position, "skipping deleted class record");
                        summary.tombstones += 1;
                    } else {
                        summary.classes += 1;
                        visit(StoredClass {
                            position,
                            length: header.size,
                            class,
                        })?;
                    }
                }
                RecordKind::Instance => {
                    return Err(self.corrupt(
                        position,
                        CodecError::UnexpectedRecord {
                            expected: RecordKind::Class,
                            found: RecordKind::Instance,
                        },
                    ));
                }
            }
            position += size as u64;
        }

        summary.bytes = position;
        debug!(
            path = %self.path.display(),
            classes = summary.classes,
            tombstones = summary.tombstones,
            bytes = position,
            "scanned class store"
        );
        Ok(summary)
    }

    /// Read the raw bytes of the record at `position`.
    pub fn read_at(&self, position: u64, length: u32) -> RegistryResult<Vec<u8>> {
        let mut record = vec![0u8; length as usize];
        match self.format {
            StoreFormat::Plain => {
                let mut file = File::open(&self.path)?;
                file.seek(SeekFrom::Start(position))?;
                file.read_exact(&mut record)?;
            }
            StoreFormat::Compressed => {
                // No random access into a zstd stream: every read decompresses
                // from the start, so the cost grows with `position`.
                trace!(path = %self.path.display(), position, "seeking in compressed store");
                let mut reader = self.reader()?;
                io::copy(&mut reader.as_mut().take(position), &mut io::sink())?;
                reader.read_exact(&mut record)?;
            }
        }
        Ok(record)
    }

    /// Read and decode the class record at `position`.
    pub fn load_class(&self, position: u64, length: u32) -> RegistryResult<ConstClass> {
        let bytes = self.read_at(position, length)?;
        ConstClass::decode(bytes).map_err(|e| self.corrupt(position, e))
    }

    /// Append an encoded record, creating the store with a version record
    /// if it does not exist yet.
    pub fn append(&self, record: &[u8]) -> RegistryResult<Appended> {
        self.ensure_writable()?;
        let existing = match fs::metadata(&self.path) {
            Ok(meta) => meta.len(),
            Err(e) if e.kind() == io::ErrorKind::NotFound => 0,
            Err(e) => return Err(e.into()),
        };

        let mut file = OpenOptions::new().create(true).append(true).open(&self.path)?;
        let mut position = existing;
        let created = existing == 0;
        if created {
            file.write_all(&VersionRecord::current().encode())?;
            position = VERSION_RECORD_LEN as u64;
        }
        file.write_all(record)?;
        file.sync_all()?;

        debug!(path = %self.path.display(), position, len = record.len(), "appended class record");
        Ok(Appended { position, created })
    }

    /// Rewrite the store without any class record named `name`
    /// (case-insensitive) and return how many records were dropped.
    ///
    /// Every matching record goes, including shadowed duplicates, so the
    /// class cannot reappear on the next open. The new content is written to
    /// a temporary file in the same directory and atomically renamed over the
    /// store. Positions of later records change: callers rescan.
    pub fn remove_class_records(&self, name: &str) -> RegistryResult<usize> {
        self.ensure_writable()?;
        let bytes = fs::read(&self.path)?;
        let target = ClassKey::new(name);
        let mut kept = Vec::with_capacity(bytes.len());
        let mut removed = 0;
        let mut position = 0usize;

        while position < bytes.len() {
            let rest = &bytes[position..];
            let header = RecordHeader::peek(rest).map_err(|e| self.corrupt(position as u64, e))?;
            let size = header.size as usize;
            if size > rest.len() {
                return Err(self.corrupt(
                    position as u64,
                    CodecError::SizeMismatch {
                        declared: header.size,
                        available: rest.len(),
                    },
                ));
            }
            let record = &rest[..size];
            let matches = header.kind == RecordKind::Class
                && ConstClass::from_slice(record)
                    .map_err(|e| self.corrupt(position as u64, e))
                    .map(|class| ClassKey::new(class.name()) == target)?;
            if matches {
                trace!(class = name, position, size, "dropping class record");
                removed += 1;
            } else {
                kept.extend_from_slice(record);
            }
            position += size;
        }

        if removed == 0 {
            return Err(RegistryError::NotFound(name.to_string()));
        }

        let dir = self.path.parent().unwrap_or_else(|| Path::new("."));
        let mut tmp = NamedTempFile::new_in(dir)?;
        tmp.write_all(&kept)?;
        tmp.as_file().sync_all()?;
        tmp.persist(&self.path).map_err(|e| e.error)?;

        debug!(path = %self.path.display(), class = name, removed, "removed class records");
        Ok(removed)
    }

    /// Current `(position, length)` of every live class record, keyed by
    /// class name. A later duplicate overrides an earlier one.
    pub fn record_positions(&self) -> RegistryResult<HashMap<ClassKey, (u64, u32)>> {
        let mut positions = HashMap::new();
        self.scan(|rec| {
            positions.insert(ClassKey::new(rec.class.name()), (rec.position, rec.length));
            Ok(())
        })?;
        Ok(positions)
    }

    /// Write a zstd-compressed copy of this plain store next to it and
    /// return its path.
    pub fn compress(&self) -> RegistryResult<PathBuf> {
        self.ensure_writable()?;
        let bytes = fs::read(&self.path)?;
        let packed = zstd::encode_all(&bytes[..], COMPRESSION_LEVEL)?;
        let target = compressed_path(&self.path);

        let dir = self.path.parent().unwrap_or_else(|| Path::new("."));
        let mut tmp = NamedTempFile::new_in(dir)?;
        tmp.write_all(&packed)?;
        tmp.as_file().sync_all()?;
        tmp.persist(&target).map_err(|e| e.error)?;

        debug!(
            source = %self.path.display(),
            target = %target.display(),
            raw = bytes.len(),
            packed = packed.len(),
            "compressed class store"
        );
        Ok(target)
    }
}
