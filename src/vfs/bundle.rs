//! Bit-exact codec for the embedded bundle envelope (spec §6).
//!
//! ```text
//! runtime_executable_bytes    (omitted when --bundle-only)
//! concatenated_file_data
//! index_block:
//!   u32 version (= 1)
//!   u32 file_count
//!   u32 entry_path_len
//!   u32 reserved (= 0)
//!   bytes entry_path
//!   repeated file_count times:
//!     u32 path_len
//!     u32 reserved (= 0)
//!     u64 data_offset
//!     u64 data_size
//!     bytes path
//! footer (28 bytes):
//!   bytes magic[8] = "MYSBNDL1"
//!   u32 version (= 1)
//!   u32 reserved (= 0)
//!   u64 index_size
//! ```

use crate::error::BundleError;
use std::collections::HashMap;

pub const MAGIC: &[u8; 8] = b"MYSBNDL1";
pub const VERSION: u32 = 1;
pub const FOOTER_SIZE: usize = 8 + 4 + 4 + 8;

#[derive(Debug, Clone, Copy)]
pub struct FileSpan {
    pub offset: u64,
    pub size: u64,
}

/// A decoded bundle index: entry path plus a map of normalized
/// bundle-relative path -> (offset, size) within the data region.
#[derive(Debug, Clone, Default)]
pub struct BundleIndex {
    pub entry_path: String,
    pub files: HashMap<String, FileSpan>,
}

/// One file destined for the bundle's data region, in insertion order.
pub struct BundleEntry {
    pub path: String,
    pub data: Vec<u8>,
}

/// Encode the index block + footer for `entries`, with `data_region_start`
/// offsets computed from insertion order. Returns `(data, index_and_footer)`
/// where `data` is the concatenation of every entry's bytes in order.
pub fn encode(entry_path: &str, entries: &[BundleEntry]) -> Result<(Vec<u8>, Vec<u8>), BundleError> {
    let mut data = Vec::new();
    let mut spans = Vec::with_capacity(entries.len());

    for entry in entries {
        let offset = data.len() as u64;
        data.extend_from_slice(&entry.data);
        spans.push((entry.path.clone(), offset, entry.data.len() as u64));
    }

    let mut index = Vec::new();
    index.extend_from_slice(&VERSION.to_le_bytes());
    index.extend_from_slice(&(entries.len() as u32).to_le_bytes());
    index.extend_from_slice(&(entry_path.len() as u32).to_le_bytes());
    index.extend_from_slice(&0u32.to_le_bytes());
    index.extend_from_slice(entry_path.as_bytes());

    for (path, offset, size) in &spans {
        index.extend_from_slice(&(path.len() as u32).to_le_bytes());
        index.extend_from_slice(&0u32.to_le_bytes());
        index.extend_from_slice(&offset.to_le_bytes());
        index.extend_from_slice(&size.to_le_bytes());
        index.extend_from_slice(path.as_bytes());
    }

    let index_size = index.len() as u64;
    let mut footer = Vec::with_capacity(FOOTER_SIZE);
    footer.extend_from_slice(MAGIC);
    footer.extend_from_slice(&VERSION.to_le_bytes());
    footer.extend_from_slice(&0u32.to_le_bytes());
    footer.extend_from_slice(&index_size.to_le_bytes());

    let mut index_and_footer = index;
    index_and_footer.extend_from_slice(&footer);
    Ok((data, index_and_footer))
}

fn read_u32(buf: &[u8], cursor: &mut usize) -> Result<u32, BundleError> {
    let end = *cursor + 4;
    let bytes: [u8; 4] = buf
        .get(*cursor..end)
        .ok_or_else(|| BundleError::CorruptIndex("truncated u32".into()))?
        .try_into()
        .unwrap();
    *cursor = end;
    Ok(u32::from_le_bytes(bytes))
}

fn read_u64(buf: &[u8], cursor: &mut usize) -> Result<u64, BundleError> {
    let end = *cursor + 8;
    let bytes: [u8; 8] = buf
        .get(*cursor..end)
        .ok_or_else(|| BundleError::CorruptIndex("truncated u64".into()))?
        .try_into()
        .unwrap();
    *cursor = end;
    Ok(u64::from_le_bytes(bytes))
}

fn read_bytes<'a>(buf: &'a [u8], cursor: &mut usize, len: usize) -> Result<&'a [u8], BundleError> {
    let end = *cursor + len;
    let slice = buf
        .get(*cursor..end)
        .ok_or_else(|| BundleError::CorruptIndex("truncated string".into()))?;
    *cursor = end;
    Ok(slice)
}

/// Parse the trailing 28-byte footer of a file's bytes, returning the index
/// size if the magic and version are valid. Any truncation or mismatch
/// yields `BadFooter`, never a panic (testable property #10).
pub fn parse_footer(file_bytes: &[u8]) -> Result<u64, BundleError> {
    if file_bytes.len() <= FOOTER_SIZE {
        return Err(BundleError::BadFooter);
    }
    let footer = &file_bytes[file_bytes.len() - FOOTER_SIZE..];
    if &footer[0..8] != MAGIC {
        return Err(BundleError::BadFooter);
    }
    let mut cursor = 8;
    let version = read_u32(footer, &mut cursor)?;
    let _reserved = read_u32(footer, &mut cursor)?;
    let index_size = read_u64(footer, &mut cursor)?;

    if version != VERSION {
        return Err(BundleError::UnsupportedVersion(version));
    }
    if index_size == 0 || index_size as usize > file_bytes.len() - FOOTER_SIZE {
        return Err(BundleError::CorruptIndex("index_size out of range".into()));
    }
    Ok(index_size)
}

/// Decode the index block. `index_bytes` must be exactly `index_size` bytes
/// as reported by `parse_footer`. Returns the index plus the total size of
/// the data region it references (used by the caller to locate its start).
pub fn parse_index(index_bytes: &[u8]) -> Result<(BundleIndex, u64), BundleError> {
    let mut cursor = 0usize;
    let version = read_u32(index_bytes, &mut cursor)?;
    if version != VERSION {
        return Err(BundleError::UnsupportedVersion(version));
    }
    let file_count = read_u32(index_bytes, &mut cursor)?;
    let entry_path_len = read_u32(index_bytes, &mut cursor)?;
    let _reserved = read_u32(index_bytes, &mut cursor)?;
    let entry_path_bytes = read_bytes(index_bytes, &mut cursor, entry_path_len as usize)?;
    let entry_path = normalize_path(&String::from_utf8_lossy(entry_path_bytes));

    let mut files = HashMap::with_capacity(file_count as usize);
    let mut data_size = 0u64;

    for _ in 0..file_count {
        let path_len = read_u32(index_bytes, &mut cursor)?;
        let _reserved = read_u32(index_bytes, &mut cursor)?;
        let offset = read_u64(index_bytes, &mut cursor)?;
        let size = read_u64(index_bytes, &mut cursor)?;
        let path_bytes = read_bytes(index_bytes, &mut cursor, path_len as usize)?;
        let path = normalize_path(&String::from_utf8_lossy(path_bytes));

        if offset.checked_add(size).ok_or_else(|| BundleError::CorruptIndex("offset overflow".into()))? > data_size {
            data_size = offset + size;
        }
        if !path.is_empty() {
            files.insert(path, FileSpan { offset, size });
        }
    }

    Ok((BundleIndex { entry_path, files }, data_size))
}

/// Normalize a bundle path: strip `file://`, backslashes to forward
/// slashes, collapse `./`/`..`, drop a leading `/`.
///
/// A `..` that would pop past the start is kept as a literal `..` segment
/// rather than silently dropped, so a path that escapes its base (e.g.
/// `"../outside.js"`) is still observable as such in the normalized result
/// (`compile::escapes_root` depends on this).
pub fn normalize_path(path: &str) -> String {
    let s = path.strip_prefix("file://").unwrap_or(path).replace('\\', "/");

    // Collapse `.` and `..` segments without touching the filesystem.
    let mut out: Vec<&str> = Vec::new();
    for segment in s.split('/') {
        match segment {
            "" | "." => continue,
            ".." => match out.last() {
                Some(&last) if last != ".." => {
                    out.pop();
                }
                _ => out.push(".."),
            },
            other => out.push(other),
        }
    }
    out.join("/")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_a_small_bundle() {
        let entries = vec![
            BundleEntry { path: "main.js".into(), data: b"console.log(1)".to_vec() },
            BundleEntry { path: "lib/util.js".into(), data: b"module.exports = {}".to_vec() },
        ];
        let (data, index_and_footer) = encode("main.js", &entries).unwrap();

        let mut file_bytes = data.clone();
        file_bytes.extend_from_slice(&index_and_footer);

        let index_size = parse_footer(&file_bytes).unwrap();
        let index_start = file_bytes.len() - FOOTER_SIZE - index_size as usize;
        let (index, data_size) = parse_index(&file_bytes[index_start..file_bytes.len() - FOOTER_SIZE]).unwrap();

        assert_eq!(index.entry_path, "main.js");
        assert_eq!(data_size, data.len() as u64);
        let span = index.files.get("lib/util.js").unwrap();
        assert_eq!(&data[span.offset as usize..(span.offset + span.size) as usize], b"module.exports = {}");
    }

    #[test]
    fn truncated_footer_falls_back_without_panicking() {
        let (data, index_and_footer) = encode(
            "a.js",
            &[BundleEntry { path: "a.js".into(), data: b"1".to_vec() }],
        )
        .unwrap();
        let mut file_bytes = data;
        file_bytes.extend_from_slice(&index_and_footer);
        file_bytes.pop(); // corrupt the last footer byte
        assert!(parse_footer(&file_bytes).is_err());
    }

    #[test]
    fn normalizes_paths() {
        assert_eq!(normalize_path("file:///a/./b/../c"), "a/c");
        assert_eq!(normalize_path("\\a\\b"), "a/b");
        assert_eq!(normalize_path("/a/b"), "a/b");
    }
}
