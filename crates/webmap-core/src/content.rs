//! Stored-file helpers for attachments and hook data.
//!
//! Uploaded content lives under a storage directory by save name. The store
//! only keeps its size and SHA-256; these helpers compute and verify them.

use std::fs::File;
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use sha2::{Digest, Sha256};

use crate::error::{Result, StoreError};
use crate::model::clean_name;

/// Hex SHA-256 of everything `reader` yields.
pub fn sha256_reader<R: Read>(mut reader: R) -> io::Result<String> {
    let mut hasher = Sha256::new();
    io::copy(&mut reader, &mut hasher)?;
    Ok(format!("{:x}", hasher.finalize()))
}

/// Copy `reader` into `writer`, returning the hex SHA-256 of the bytes copied.
pub fn copy_and_hash<W: Write, R: Read>(writer: &mut W, reader: &mut R) -> io::Result<String> {
    let mut hasher = Sha256::new();
    let mut buf = [0u8; 64 * 1024];
    loop {
        let n = reader.read(&mut buf)?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
        writer.write_all(&buf[..n])?;
    }
    Ok(format!("{:x}", hasher.finalize()))
}

/// Whether the stream starts like an ELF or DOS/PE executable.
///
/// The reader is rewound to the start before returning.
pub fn is_executable<R: Read + Seek>(reader: &mut R) -> io::Result<bool> {
    let result = sniff_executable(reader);
    reader.seek(SeekFrom::Start(0))?;
    result
}

fn sniff_executable<R: Read + Seek>(reader: &mut R) -> io::Result<bool> {
    let mut head = [0u8; 64];
    let n = read_up_to(reader, &mut head)?;

    // ELF: 0x7f 'E' 'L' 'F', then e_version (little-endian u32 at 6..10) == 1
    if n >= 10
        && head[..4] == [0x7f, b'E', b'L', b'F']
        && u32::from_le_bytes([head[6], head[7], head[8], head[9]]) == 1
    {
        return Ok(true);
    }

    // DOS 'MZ'; anything past that is treated as executable even when the
    // PE header is missing or broken
    if n >= 2 && head[0] == b'M' && head[1] == b'Z' {
        return Ok(true);
    }

    Ok(false)
}

fn read_up_to<R: Read>(reader: &mut R, buf: &mut [u8]) -> io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..])? {
            0 => break,
            n => filled += n,
        }
    }
    Ok(filled)
}

/// Path of a save name under `base_dir`, sanitized again in case the
/// snapshot was edited by hand.
pub fn stored_path(base_dir: &Path, save_name: &str) -> PathBuf {
    base_dir.join(clean_name(save_name))
}

/// Open a stored file after checking its size and checksum.
///
/// Returns the file positioned at the start.
pub fn open_verified(path: &Path, size: i64, checksum: &str) -> Result<File> {
    let mismatch = || StoreError::ContentMismatch {
        name: path.display().to_string(),
    };

    let meta = std::fs::metadata(path)?;
    if i64::try_from(meta.len()).ok() != Some(size) {
        return Err(mismatch());
    }

    let mut file = File::open(path)?;
    let hash = sha256_reader(&mut file)?;
    if hash != checksum {
        return Err(mismatch());
    }
    file.seek(SeekFrom::Start(0))?;
    Ok(file)
}
