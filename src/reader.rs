//! The byte-source abstraction the parser reads through (§4.A)
//!
//! A [`ByteReader`] never raises: a read past the end of the source returns whatever bytes
//! remain, possibly empty, rather than an error. Short reads are how the parser (§4.E) detects
//! end of input.
use std::{fs, io, path::Path};

/// A random-access source of bytes. Implementations must be pure: the same `(offset, length)`
/// always returns the same bytes for the lifetime of the reader.
pub trait ByteReader {
    /// Total number of bytes available.
    fn len(&self) -> u64;

    /// Returns `true` if this source has no bytes.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Read up to `length` bytes starting at `offset`. Returns fewer bytes than requested (down
    /// to zero) when the read would run past the end of the source; never raises.
    fn read(&self, offset: u64, length: usize) -> Vec<u8>;
}

/// An in-memory byte source, typically the whole contents of a captured binary.
#[derive(Debug, Clone)]
pub struct SliceReader<'a> {
    data: &'a [u8],
}

impl<'a> SliceReader<'a> {
    #[must_use]
    pub fn new(data: &'a [u8]) -> Self {
        Self { data }
    }
}

impl ByteReader for SliceReader<'_> {
    fn len(&self) -> u64 {
        self.data.len() as u64
    }

    fn read(&self, offset: u64, length: usize) -> Vec<u8> {
        let Ok(offset) = usize::try_from(offset) else {
            return Vec::new();
        };
        if offset >= self.data.len() {
            return Vec::new();
        }
        let end = (offset + length).min(self.data.len());
        self.data[offset..end].to_vec()
    }
}

/// A reader that pulls bytes from an already-loaded owned buffer.
#[derive(Debug, Clone)]
pub struct OwnedReader {
    data: Vec<u8>,
}

impl OwnedReader {
    /// Read an entire file into memory up front.
    pub fn from_path(path: impl AsRef<Path>) -> io::Result<Self> {
        Ok(Self {
            data: fs::read(path)?,
        })
    }

    #[must_use]
    pub fn from_vec(data: Vec<u8>) -> Self {
        Self { data }
    }

    #[must_use]
    pub fn as_reader(&self) -> SliceReader<'_> {
        SliceReader::new(&self.data)
    }
}

impl ByteReader for OwnedReader {
    fn len(&self) -> u64 {
        self.data.len() as u64
    }

    fn read(&self, offset: u64, length: usize) -> Vec<u8> {
        self.as_reader().read(offset, length)
    }
}
