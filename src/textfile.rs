use crate::rule_set::{Charset, TextEncoding};
use encoding_rs::Encoding;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use thiserror::Error;
use xxhash_rust::xxh3::xxh3_64;

#[derive(Error, Debug)]
pub enum TextFileError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to write {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("{path} is not valid {encoding}")]
    Decode {
        path: PathBuf,
        encoding: TextEncoding,
    },

    #[error("replaced content of {path} cannot be represented in {encoding}")]
    Unmappable {
        path: PathBuf,
        encoding: TextEncoding,
    },

    #[error("{path} was modified by another process while rules were applied")]
    ConcurrentModification { path: PathBuf },
}

/// Result of writing a text file back.
#[derive(Debug, Clone, PartialEq, Eq)]
#[must_use = "WriteResult should be checked for written/unchanged"]
pub enum WriteResult {
    Written { file: PathBuf, bytes: usize },
    /// Encoded content equals what is on disk; nothing was written.
    Unchanged { file: PathBuf },
}

/// A file decoded into memory, remembering the bytes it was read from.
#[derive(Debug, Clone)]
pub struct TextFile {
    path: PathBuf,
    encoding: TextEncoding,
    text: String,
    original_len: usize,
    fingerprint: u64,
}

impl TextFile {
    /// Read and decode `path` as a whole.
    ///
    /// A byte order mark is kept as part of the text so it is written back
    /// unchanged. Malformed input is an error rather than being replaced.
    /// For `UTF-16` the byte order found here is used again on write.
    pub fn read(path: impl Into<PathBuf>, encoding: TextEncoding) -> Result<Self, TextFileError> {
        let path = path.into();
        let bytes = fs::read(&path).map_err(|source| TextFileError::Read {
            path: path.clone(),
            source,
        })?;

        let (text, encoding) =
            decode(&bytes, encoding).ok_or_else(|| TextFileError::Decode {
                path: path.clone(),
                encoding,
            })?;

        Ok(Self {
            path,
            encoding,
            text,
            original_len: bytes.len(),
            fingerprint: xxh3_64(&bytes),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn encoding(&self) -> TextEncoding {
        self.encoding
    }

    /// Encode `new_text` in the file's encoding.
    pub fn encode(&self, new_text: &str) -> Result<Vec<u8>, TextFileError> {
        encode(new_text, self.encoding).ok_or_else(|| TextFileError::Unmappable {
            path: self.path.clone(),
            encoding: self.encoding,
        })
    }

    /// Whether writing `encoded` would leave the file byte-for-byte as read.
    pub fn is_unchanged(&self, encoded: &[u8]) -> bool {
        encoded.len() == self.original_len && xxh3_64(encoded) == self.fingerprint
    }

    /// Replace the file content with `new_text`.
    ///
    /// The file is re-read first; if it no longer matches what was read,
    /// nothing is written. The write itself is atomic.
    pub fn write(&self, new_text: &str) -> Result<WriteResult, TextFileError> {
        let encoded = self.encode(new_text)?;
        self.write_encoded(&encoded)
    }

    /// Same as [`write`](Self::write) for content already produced by
    /// [`encode`](Self::encode).
    pub fn write_encoded(&self, encoded: &[u8]) -> Result<WriteResult, TextFileError> {
        if self.is_unchanged(encoded) {
            return Ok(WriteResult::Unchanged {
                file: self.path.clone(),
            });
        }

        let current = fs::read(&self.path).map_err(|source| TextFileError::Read {
            path: self.path.clone(),
            source,
        })?;
        if current.len() != self.original_len || xxh3_64(&current) != self.fingerprint {
            return Err(TextFileError::ConcurrentModification {
                path: self.path.clone(),
            });
        }

        atomic_write(&self.path, encoded).map_err(|source| TextFileError::Write {
            path: self.path.clone(),
            source,
        })?;

        // Bump mtime so downstream build tools notice the change
        let now = filetime::FileTime::now();
        filetime::set_file_mtime(&self.path, now).map_err(|source| TextFileError::Write {
            path: self.path.clone(),
            source,
        })?;

        Ok(WriteResult::Written {
            file: self.path.clone(),
            bytes: encoded.len(),
        })
    }
}

/// Decode strictly, returning the encoding to write back with.
fn decode(bytes: &[u8], encoding: TextEncoding) -> Option<(String, TextEncoding)> {
    let text = match encoding.charset() {
        Charset::Latin1 => encoding_rs::mem::decode_latin1(bytes).into_owned(),
        Charset::Ascii => {
            if !bytes.is_ascii() {
                return None;
            }
            String::from_utf8(bytes.to_vec()).ok()?
        }
        Charset::Utf16 => {
            let byte_order = match Encoding::for_bom(bytes) {
                Some((found, _)) if found == encoding_rs::UTF_16LE => encoding_rs::UTF_16LE,
                _ => encoding_rs::UTF_16BE,
            };
            let text = decode_whatwg(byte_order, bytes)?;
            return Some((text, TextEncoding::from_encoding(byte_order)));
        }
        Charset::Utf8 => decode_whatwg(encoding_rs::UTF_8, bytes)?,
        Charset::Other(other) => decode_whatwg(other, bytes)?,
    };
    Some((text, encoding))
}

fn decode_whatwg(encoding: &'static Encoding, bytes: &[u8]) -> Option<String> {
    encoding
        .decode_without_bom_handling_and_without_replacement(bytes)
        .map(|text| text.into_owned())
}

/// Encode text, returning `None` if a character has no representation.
fn encode(text: &str, encoding: TextEncoding) -> Option<Vec<u8>> {
    let other = match encoding.charset() {
        Charset::Utf8 => return Some(text.as_bytes().to_vec()),
        Charset::Latin1 => {
            if text.chars().any(|c| u32::from(c) > 0xFF) {
                return None;
            }
            return Some(encoding_rs::mem::encode_latin1_lossy(text).into_owned());
        }
        Charset::Ascii => return text.is_ascii().then(|| text.as_bytes().to_vec()),
        Charset::Utf16 => encoding_rs::UTF_16BE,
        Charset::Other(other) => other,
    };

    // encoding_rs only decodes UTF-16; its encoder falls back to UTF-8.
    if other == encoding_rs::UTF_16LE {
        return Some(text.encode_utf16().flat_map(u16::to_le_bytes).collect());
    }
    if other == encoding_rs::UTF_16BE {
        return Some(text.encode_utf16().flat_map(u16::to_be_bytes).collect());
    }

    let (bytes, _, had_errors) = other.encode(text);
    if had_errors {
        None
    } else {
        Some(bytes.into_owned())
    }
}

/// Atomic file write: tempfile + fsync + rename.
///
/// The temporary file lives in the target's directory so the rename stays on
/// one filesystem. The original file's permissions are carried over.
fn atomic_write(path: &Path, content: &[u8]) -> std::io::Result<()> {
    let parent = path.parent().ok_or_else(|| {
        std::io::Error::new(
            std::io::ErrorKind::InvalidInput,
            "Path has no parent directory",
        )
    })?;

    let mut temp = tempfile::NamedTempFile::new_in(parent)?;
    temp.write_all(content)?;

    if let Ok(metadata) = fs::metadata(path) {
        temp.as_file().set_permissions(metadata.permissions())?;
    }

    // Flush to disk (fsync)
    temp.as_file().sync_all()?;

    temp.persist(path).map_err(|e| e.error)?;

    Ok(())
}
