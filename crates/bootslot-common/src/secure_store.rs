//! Locates and expands the secure-store envelope: a custom-framed binary
//! image (on an MTD partition, or at a fixed sector of the eMMC boot device)
//! carrying a bzip2/tar payload that gets expanded under `/adu`.
//!
//! Two source variants share a 64-byte header format and extraction loop;
//! only where the envelope is found, and whether the rewritten agent
//! configuration gets flushed back to disk, differ.

use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use reportify::Report;
use serde_json::Value;
use tracing::{info, warn};

use crate::config_link;
use crate::memory::MemoryDetector;
use crate::paths;
use crate::scratch::ScratchOverlay;
use crate::mount::ReadOnlyOverlay;

/// Size, in bytes, of the on-disk [`SecureStoreHeader`].
pub const HEADER_SIZE: usize = 64;

const MAGIC_OFFSET: usize = 0;
const MAGIC_LEN: usize = 4;
const LEN_LOW_OFFSET: usize = 4;
const LEN_HIGH_OFFSET: usize = 8;
const TYPE_OFFSET: usize = 12;
const TYPE_LEN: usize = 16;

/// The 64-byte on-disk header preceding the bzip2/tar payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SecureStoreHeader {
    pub magic: [u8; MAGIC_LEN],
    pub payload_len_low: u32,
    pub payload_len_high: u32,
    pub type_field: [u8; TYPE_LEN],
}

impl SecureStoreHeader {
    pub fn payload_size(&self) -> u64 {
        ((self.payload_len_high as u64) << 32) | self.payload_len_low as u64
    }

    pub fn type_str(&self) -> String {
        let end = self.type_field.iter().position(|&b| b == 0).unwrap_or(TYPE_LEN);
        String::from_utf8_lossy(&self.type_field[..end]).into_owned()
    }

    fn is_well_formed(&self) -> bool {
        self.type_str() == paths::SECURE_STORE_HEADER_TYPE && self.payload_size() > 0
    }

    /// Parses a 64-byte buffer into a header without validating it.
    pub fn parse(buf: &[u8; HEADER_SIZE]) -> Self {
        let mut magic = [0u8; MAGIC_LEN];
        magic.copy_from_slice(&buf[MAGIC_OFFSET..MAGIC_OFFSET + MAGIC_LEN]);
        let payload_len_low = u32::from_le_bytes(buf[LEN_LOW_OFFSET..LEN_LOW_OFFSET + 4].try_into().unwrap());
        let payload_len_high = u32::from_le_bytes(buf[LEN_HIGH_OFFSET..LEN_HIGH_OFFSET + 4].try_into().unwrap());
        let mut type_field = [0u8; TYPE_LEN];
        type_field.copy_from_slice(&buf[TYPE_OFFSET..TYPE_OFFSET + TYPE_LEN]);
        SecureStoreHeader {
            magic,
            payload_len_low,
            payload_len_high,
            type_field,
        }
    }

    /// Encodes the header back into a 64-byte buffer (used by tests to
    /// synthesize fixtures).
    #[cfg(test)]
    pub fn to_bytes(&self) -> [u8; HEADER_SIZE] {
        let mut buf = [0u8; HEADER_SIZE];
        buf[MAGIC_OFFSET..MAGIC_OFFSET + MAGIC_LEN].copy_from_slice(&self.magic);
        buf[LEN_LOW_OFFSET..LEN_LOW_OFFSET + 4].copy_from_slice(&self.payload_len_low.to_le_bytes());
        buf[LEN_HIGH_OFFSET..LEN_HIGH_OFFSET + 4].copy_from_slice(&self.payload_len_high.to_le_bytes());
        buf[TYPE_OFFSET..TYPE_OFFSET + TYPE_LEN].copy_from_slice(&self.type_field);
        buf
    }
}

/// Which physical medium carries the secure-store envelope.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SecureStoreSource {
    Mtd,
    Mmc,
}

#[derive(Debug, thiserror::Error)]
pub enum SecureStoreError {
    #[error("unable to read /proc/mtd")]
    ProcMtdUnreadable(#[source] std::io::Error),
    #[error("unable to open secure-store source {0}")]
    OpenSource(PathBuf, #[source] std::io::Error),
    #[error("unable to read secure-store header from {0}")]
    ReadHeader(PathBuf, #[source] std::io::Error),
    #[error("secure-store header in {path} has type `{found}`, expected `CERT`")]
    WrongType { path: PathBuf, found: String },
    #[error("secure-store header in {0} has a zero-length payload")]
    ZeroLength(PathBuf),
    #[error("unable to seek to sector offset {offset} of {path}")]
    Seek {
        path: PathBuf,
        offset: u64,
        #[source]
        source: std::io::Error,
    },
    #[error("unable to copy secure-store payload into {0}")]
    CopyPayload(PathBuf, #[source] std::io::Error),
    #[error("extraction of {archive} into {target} failed")]
    ExtractionFailed { archive: PathBuf, target: PathBuf },
    #[error("unable to run extraction subprocess")]
    Subprocess(#[source] std::io::Error),
    #[error("unable to read agent configuration {0}")]
    ConfigRead(PathBuf, #[source] std::io::Error),
    #[error("unable to write agent configuration {0}")]
    ConfigWrite(PathBuf, #[source] std::io::Error),
    #[error("agent configuration {0} is not valid JSON")]
    ConfigParse(PathBuf, #[source] serde_json::Error),
    #[error("agent configuration {0} has no agents[0].connectionSource, or it is not x509")]
    NotX509(PathBuf),
    #[error("unable to prepare the /adu scratch overlay")]
    Scratch(#[source] crate::scratch::ScratchError),
}

pub type SecureStoreResult<T> = Result<T, Report<SecureStoreError>>;

/// Reads and validates a 64-byte header at the current position of `reader`.
fn read_header(path: &Path, reader: &mut impl Read) -> SecureStoreResult<SecureStoreHeader> {
    let mut buf = [0u8; HEADER_SIZE];
    reader
        .read_exact(&mut buf)
        .map_err(|source| Report::new(SecureStoreError::ReadHeader(path.to_path_buf(), source)))?;
    let header = SecureStoreHeader::parse(&buf);
    if header.type_str() != paths::SECURE_STORE_HEADER_TYPE {
        return Err(Report::new(SecureStoreError::WrongType {
            path: path.to_path_buf(),
            found: header.type_str(),
        }));
    }
    if header.payload_size() == 0 {
        return Err(Report::new(SecureStoreError::ZeroLength(path.to_path_buf())));
    }
    debug_assert!(header.is_well_formed());
    Ok(header)
}

/// Copies exactly `size` bytes from `reader` to `writer` in 1 KiB chunks,
/// tolerating short reads.
fn copy_payload(path: &Path, reader: &mut impl Read, writer: &mut impl Write, size: u64) -> SecureStoreResult<()> {
    let mut remaining = size;
    let mut chunk = [0u8; 1024];
    while remaining > 0 {
        let want = remaining.min(chunk.len() as u64) as usize;
        let mut got = 0;
        while got < want {
            let n = reader
                .read(&mut chunk[got..want])
                .map_err(|source| Report::new(SecureStoreError::CopyPayload(path.to_path_buf(), source)))?;
            if n == 0 {
                break;
            }
            got += n;
        }
        if got == 0 {
            break;
        }
        writer
            .write_all(&chunk[..got])
            .map_err(|source| Report::new(SecureStoreError::CopyPayload(path.to_path_buf(), source)))?;
        remaining -= got as u64;
    }
    Ok(())
}

/// Scans `/proc/mtd` for the `"Secure"` partition.
fn find_mtd_secure_partition(label: &str) -> SecureStoreResult<Option<String>> {
    let contents = std::fs::read_to_string("/proc/mtd")
        .map_err(|source| Report::new(SecureStoreError::ProcMtdUnreadable(source)))?;
    Ok(config_link::find_mtd_device_by_name(&contents, label))
}

/// Extracts the secure store from the configured source, flushes the
/// rewritten JSON agent configuration as needed, and returns the sealed
/// `/adu` overlay ready for injection into the orchestrator.
pub fn extract_secure_store(
    source: SecureStoreSource,
    detector: &MemoryDetector,
    mtd_secure_partition_name: &str,
    default_archive: &Path,
    emmc_secure_part_blk_nr: u64,
    json_config_path: &Path,
    adu_ramdisk_mountpoint: &Path,
    adu_target_dir: &Path,
    adu_ramdisk_size_mib: u64,
) -> SecureStoreResult<ReadOnlyOverlay> {
    std::fs::create_dir_all(adu_target_dir)
        .map_err(|source| Report::new(SecureStoreError::CopyPayload(adu_target_dir.to_path_buf(), source)))?;

    let used_dedicated_mtd = match source {
        SecureStoreSource::Mtd => {
            extract_from_mtd(mtd_secure_partition_name, default_archive, adu_target_dir)?
        }
        SecureStoreSource::Mmc => {
            extract_from_mmc(detector, emmc_secure_part_blk_nr, adu_target_dir)?;
            false
        }
    };

    let flush_config = source == SecureStoreSource::Mmc || !used_dedicated_mtd;
    validate_and_rewrite_config(json_config_path, flush_config)?;

    let scratch = ScratchOverlay::prepare(adu_ramdisk_mountpoint, adu_target_dir, adu_ramdisk_size_mib)
        .map_err(|report| Report::new(SecureStoreError::Scratch(report.into_error())))?;
    scratch
        .seal()
        .map_err(|report| Report::new(SecureStoreError::Scratch(report.into_error())))
}

/// Returns `true` if extraction used the dedicated MTD `"Secure"` partition
/// (as opposed to the default archive fallback).
fn extract_from_mtd(label: &str, default_archive: &Path, target: &Path) -> SecureStoreResult<bool> {
    let (path, used_dedicated): (PathBuf, bool) = match find_mtd_secure_partition(label)? {
        Some(device) => (PathBuf::from(device), true),
        None => (default_archive.to_path_buf(), false),
    };

    let mut source_file = OpenOptions::new()
        .read(true)
        .open(&path)
        .map_err(|source| Report::new(SecureStoreError::OpenSource(path.clone(), source)))?;

    let header = read_header(&path, &mut source_file)?;
    let tmp_archive = target.join(".adu-archive.tar.bz2");
    {
        let mut tmp_file = File::create(&tmp_archive)
            .map_err(|source| Report::new(SecureStoreError::CopyPayload(tmp_archive.clone(), source)))?;
        copy_payload(&path, &mut source_file, &mut tmp_file, header.payload_size())?;
    }
    run_extraction(&tmp_archive, target)?;
    std::fs::remove_file(&tmp_archive).ok();
    Ok(used_dedicated)
}

fn extract_from_mmc(detector: &MemoryDetector, secure_part_blk_nr: u64, target: &Path) -> SecureStoreResult<()> {
    let device_path = PathBuf::from("/dev").join(detector.boot_device());
    let mut source_file = OpenOptions::new()
        .read(true)
        .open(&device_path)
        .map_err(|source| Report::new(SecureStoreError::OpenSource(device_path.clone(), source)))?;

    let offset = secure_part_blk_nr * 512;
    source_file
        .seek(SeekFrom::Start(offset))
        .map_err(|source| {
            Report::new(SecureStoreError::Seek {
                path: device_path.clone(),
                offset,
                source,
            })
        })?;

    let header = read_header(&device_path, &mut source_file)?;
    let tmp_archive = target.join(".adu-archive.tar.bz2");
    {
        let mut tmp_file = File::create(&tmp_archive)
            .map_err(|source| Report::new(SecureStoreError::CopyPayload(tmp_archive.clone(), source)))?;
        copy_payload(&device_path, &mut source_file, &mut tmp_file, header.payload_size())?;
    }
    run_extraction(&tmp_archive, target)?;
    std::fs::remove_file(&tmp_archive).ok();
    Ok(())
}

/// Runs `bunzip2 -c <archive> | tar x -C <target>` via the shell, the one
/// collaborator this crate treats as a black box per the top-level scope note.
fn run_extraction(archive: &Path, target: &Path) -> SecureStoreResult<()> {
    let command = format!(
        "bunzip2 -c {} | tar x -C {}",
        shell_quote(archive),
        shell_quote(target),
    );
    let status = std::process::Command::new("sh")
        .arg("-c")
        .arg(&command)
        .status()
        .map_err(|source| Report::new(SecureStoreError::Subprocess(source)))?;
    if !status.success() {
        return Err(Report::new(SecureStoreError::ExtractionFailed {
            archive: archive.to_path_buf(),
            target: target.to_path_buf(),
        }));
    }
    Ok(())
}

fn shell_quote(path: &Path) -> String {
    format!("'{}'", path.display().to_string().replace('\'', "'\\''"))
}

/// Checks `agents[0].connectionSource.connectionType == "x509"`, rewriting
/// `x509_cert`/`x509_key`/`x509_container` to their canonical values when
/// they differ. Flushed back to disk only when `flush` is set.
fn validate_and_rewrite_config(config_path: &Path, flush: bool) -> SecureStoreResult<()> {
    if !config_path.exists() {
        warn!(path = %config_path.display(), "secure-store agent configuration missing, skipping validation");
        return Ok(());
    }
    let text = std::fs::read_to_string(config_path)
        .map_err(|source| Report::new(SecureStoreError::ConfigRead(config_path.to_path_buf(), source)))?;
    let mut doc: Value = serde_json::from_str(&text)
        .map_err(|source| Report::new(SecureStoreError::ConfigParse(config_path.to_path_buf(), source)))?;

    let connection_source = doc
        .get_mut("agents")
        .and_then(|agents| agents.get_mut(0))
        .and_then(|agent| agent.get_mut("connectionSource"))
        .ok_or_else(|| Report::new(SecureStoreError::NotX509(config_path.to_path_buf())))?;

    let connection_type = connection_source
        .get("connectionType")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_owned();
    if connection_type != "x509" {
        return Err(Report::new(SecureStoreError::NotX509(config_path.to_path_buf())));
    }

    let mut changed = false;
    for (key, canonical) in [
        ("x509_cert", paths::SECURE_STORE_CANONICAL_CERT),
        ("x509_key", paths::SECURE_STORE_CANONICAL_KEY),
        ("x509_container", paths::SECURE_STORE_CANONICAL_CONTAINER),
    ] {
        let current = connection_source.get(key).and_then(Value::as_str);
        if current != Some(canonical) {
            connection_source[key] = Value::String(canonical.to_owned());
            changed = true;
        }
    }

    if changed && flush {
        let rewritten = serde_json::to_string_pretty(&doc).expect("Value serialization cannot fail");
        std::fs::write(config_path, rewritten)
            .map_err(|source| Report::new(SecureStoreError::ConfigWrite(config_path.to_path_buf(), source)))?;
        info!(path = %config_path.display(), "rewrote secure-store agent configuration");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn header_round_trip_writes_exact_payload_size() {
        let payload_size: u64 = 12345;
        let header = SecureStoreHeader {
            magic: *b"FS\0\0",
            payload_len_low: (payload_size & 0xFFFF_FFFF) as u32,
            payload_len_high: (payload_size >> 32) as u32,
            type_field: {
                let mut buf = [0u8; TYPE_LEN];
                buf[..4].copy_from_slice(b"CERT");
                buf
            },
        };
        assert!(header.is_well_formed());
        assert_eq!(header.payload_size(), payload_size);

        let mut bytes = header.to_bytes().to_vec();
        let payload = vec![0xABu8; payload_size as usize];
        bytes.extend_from_slice(&payload);
        bytes.extend_from_slice(&[0xFFu8; 16]); // trailing garbage must not be copied

        let mut reader = Cursor::new(bytes);
        let parsed = read_header(Path::new("test"), &mut reader).unwrap();
        assert_eq!(parsed.payload_size(), payload_size);

        let mut out = Vec::new();
        copy_payload(Path::new("test"), &mut reader, &mut out, parsed.payload_size()).unwrap();
        assert_eq!(out.len(), payload_size as usize);
        assert!(out.iter().all(|&b| b == 0xAB));
    }

    #[test]
    fn wrong_type_is_rejected() {
        let header = SecureStoreHeader {
            magic: *b"FS\0\0",
            payload_len_low: 10,
            payload_len_high: 0,
            type_field: {
                let mut buf = [0u8; TYPE_LEN];
                buf[..4].copy_from_slice(b"NOPE");
                buf
            },
        };
        let bytes = header.to_bytes();
        let mut reader = Cursor::new(bytes.to_vec());
        let err = read_header(Path::new("test"), &mut reader).unwrap_err();
        assert!(matches!(err.error(), SecureStoreError::WrongType { .. }));
    }

    #[test]
    fn zero_length_is_rejected() {
        let header = SecureStoreHeader {
            magic: *b"FS\0\0",
            payload_len_low: 0,
            payload_len_high: 0,
            type_field: {
                let mut buf = [0u8; TYPE_LEN];
                buf[..4].copy_from_slice(b"CERT");
                buf
            },
        };
        let bytes = header.to_bytes();
        let mut reader = Cursor::new(bytes.to_vec());
        let err = read_header(Path::new("test"), &mut reader).unwrap_err();
        assert!(matches!(err.error(), SecureStoreError::ZeroLength(_)));
    }

    #[test]
    fn rejects_non_x509_connection_type() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("adu-conf.json");
        std::fs::write(
            &path,
            r#"{"agents":[{"connectionSource":{"connectionType":"symmetric"}}]}"#,
        )
        .unwrap();
        let err = validate_and_rewrite_config(&path, true).unwrap_err();
        assert!(matches!(err.error(), SecureStoreError::NotX509(_)));
    }

    #[test]
    fn rewrites_canonical_paths_and_flushes() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("adu-conf.json");
        std::fs::write(
            &path,
            r#"{"agents":[{"connectionSource":{"connectionType":"x509","x509_cert":"/old/cert.pem"}}]}"#,
        )
        .unwrap();
        validate_and_rewrite_config(&path, true).unwrap();
        let rewritten = std::fs::read_to_string(&path).unwrap();
        assert!(rewritten.contains(paths::SECURE_STORE_CANONICAL_CERT));
        assert!(rewritten.contains(paths::SECURE_STORE_CANONICAL_KEY));
    }

    #[test]
    fn does_not_flush_when_flush_is_false() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("adu-conf.json");
        let original = r#"{"agents":[{"connectionSource":{"connectionType":"x509","x509_cert":"/old/cert.pem"}}]}"#;
        std::fs::write(&path, original).unwrap();
        validate_and_rewrite_config(&path, false).unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), original);
    }
}
