use super::error::ImportError;
use memmap2::Mmap;
use std::fs::File;
use std::io::{self, BufRead, BufReader, Read};
use std::ops::Deref;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

const ZSTD_MAGIC: [u8; 4] = [0x28, 0xB5, 0x2F, 0xFD];

enum Backing {
    Mapped(Mmap),
    Owned(Vec<u8>),
}

impl Deref for Backing {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        match self {
            Backing::Mapped(map) => map,
            Backing::Owned(bytes) => bytes,
        }
    }
}

struct CountingReader<R> {
    inner: R,
    count: Arc<AtomicU64>,
}

impl<R: Read> Read for CountingReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = self.inner.read(buf)?;
        self.count.fetch_add(n as u64, Ordering::Relaxed);
        Ok(n)
    }
}

enum Source {
    Buffer {
        data: Backing,
        pos: usize,
    },
    Stream {
        reader: Box<dyn BufRead + Send>,
        consumed: Arc<AtomicU64>,
    },
}

/// Line-oriented reader over a plain (memory-mapped) or zstd-compressed file.
///
/// Tracks the byte offset of the next unread line and the number of lines
/// read so far, so a position can later be restored with [`TextReader::seek`].
pub struct TextReader {
    source: Source,
    path: Option<PathBuf>,
    underlying_size: u64,
    line: String,
    raw: Vec<u8>,
    line_number: u64,
    byte_offset: u64,
    mmap_enabled: bool,
}

impl TextReader {
    pub fn open(path: &Path) -> Result<Self, ImportError> {
        let mut file = File::open(path)?;
        let underlying_size = file.metadata()?.len();

        let mut magic = [0u8; 4];
        let sniffed = file.read(&mut magic)?;
        let compressed = path.extension().is_some_and(|ext| ext == "zst")
            || (sniffed == 4 && magic == ZSTD_MAGIC);

        let source = if compressed {
            open_stream(path)?
        } else if underlying_size == 0 {
            Source::Buffer {
                data: Backing::Owned(Vec::new()),
                pos: 0,
            }
        } else {
            // SAFETY: read-only mapping; the file must not be truncated while mapped.
            let map = unsafe { Mmap::map(&file)? };
            Source::Buffer {
                data: Backing::Mapped(map),
                pos: 0,
            }
        };

        Ok(Self::with_source(source, Some(path.to_path_buf()), underlying_size))
    }

    pub fn from_bytes(bytes: impl Into<Vec<u8>>) -> Self {
        let bytes = bytes.into();
        let size = bytes.len() as u64;
        Self::with_source(
            Source::Buffer {
                data: Backing::Owned(bytes),
                pos: 0,
            },
            None,
            size,
        )
    }

    fn with_source(source: Source, path: Option<PathBuf>, underlying_size: u64) -> Self {
        Self {
            source,
            path,
            underlying_size,
            line: String::new(),
            raw: Vec::new(),
            line_number: 0,
            byte_offset: 0,
            mmap_enabled: true,
        }
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn is_compressed(&self) -> bool {
        matches!(self.source, Source::Stream { .. })
    }

    pub fn set_mmap_enabled(&mut self, enabled: bool) {
        self.mmap_enabled = enabled;
    }

    /// Reads the next line. Returns `false` at end of input.
    pub fn read_line(&mut self) -> Result<bool, ImportError> {
        self.line.clear();
        match &mut self.source {
            Source::Buffer { data, pos } => {
                if *pos >= data.len() {
                    return Ok(false);
                }
                let rest = &data[*pos..];
                let len = rest.iter().position(|&b| b == b'\n').map_or(rest.len(), |i| i + 1);
                self.line.push_str(&String::from_utf8_lossy(trim_newline(&rest[..len])));
                *pos += len;
                self.byte_offset += len as u64;
            }
            Source::Stream { reader, .. } => {
                self.raw.clear();
                let len = reader.read_until(b'\n', &mut self.raw)?;
                if len == 0 {
                    return Ok(false);
                }
                self.line.push_str(&String::from_utf8_lossy(trim_newline(&self.raw)));
                self.byte_offset += len as u64;
            }
        }
        self.line_number += 1;
        Ok(true)
    }

    /// The most recently read line, without its line terminator.
    pub fn line(&self) -> &str {
        &self.line
    }

    pub fn line_starts_with(&self, prefix: &str) -> bool {
        self.line.starts_with(prefix)
    }

    /// Byte offset of the next unread line in the (decompressed) data.
    pub fn byte_offset(&self) -> u64 {
        self.byte_offset
    }

    /// Number of lines read since the start of the data.
    pub fn line_number(&self) -> u64 {
        self.line_number
    }

    pub fn eof(&mut self) -> bool {
        match &mut self.source {
            Source::Buffer { data, pos } => *pos >= data.len(),
            Source::Stream { reader, .. } => reader.fill_buf().map(|b| b.is_empty()).unwrap_or(false),
        }
    }

    /// Repositions the reader at a previously recorded `(offset, line)` pair.
    pub fn seek(&mut self, offset: u64, line_number: u64) -> Result<(), ImportError> {
        match &mut self.source {
            Source::Buffer { data, pos } => {
                let target = usize::try_from(offset).ok().filter(|&o| o <= data.len()).ok_or_else(|| {
                    io::Error::new(io::ErrorKind::UnexpectedEof, "seek offset beyond end of file")
                })?;
                *pos = target;
            }
            Source::Stream { .. } => {
                if offset < self.byte_offset {
                    let path = self.path.clone().ok_or_else(|| {
                        io::Error::new(io::ErrorKind::Unsupported, "cannot rewind a stream without a file path")
                    })?;
                    self.source = open_stream(&path)?;
                    self.byte_offset = 0;
                }
                if let Source::Stream { reader, .. } = &mut self.source {
                    let skip = offset - self.byte_offset;
                    let skipped = io::copy(&mut reader.take(skip), &mut io::sink())?;
                    if skipped != skip {
                        return Err(io::Error::new(
                            io::ErrorKind::UnexpectedEof,
                            "seek offset beyond end of decompressed stream",
                        )
                        .into());
                    }
                }
            }
        }
        self.byte_offset = offset;
        self.line_number = line_number;
        self.line.clear();
        Ok(())
    }

    /// Unread remainder of a memory-resident file, for zero-copy parsing.
    ///
    /// `None` for compressed streams or when the fast path is disabled.
    pub fn mapped_bytes(&self) -> Option<&[u8]> {
        match &self.source {
            Source::Buffer { data, pos } if self.mmap_enabled => Some(&data[*pos..]),
            _ => None,
        }
    }

    /// Advances past bytes that were parsed directly from [`TextReader::mapped_bytes`].
    pub fn consume_mapped(&mut self, bytes: usize, lines: u64) {
        if let Source::Buffer { data, pos } = &mut self.source {
            let bytes = bytes.min(data.len() - *pos);
            *pos += bytes;
            self.byte_offset += bytes as u64;
            self.line_number += lines;
        }
    }

    /// Size of the file on disk, which is the progress denominator.
    pub fn underlying_size(&self) -> u64 {
        self.underlying_size
    }

    /// Bytes of the file on disk consumed so far.
    pub fn underlying_byte_offset(&self) -> u64 {
        match &self.source {
            Source::Buffer { pos, .. } => *pos as u64,
            Source::Stream { consumed, .. } => consumed.load(Ordering::Relaxed),
        }
    }
}

fn open_stream(path: &Path) -> Result<Source, ImportError> {
    let consumed = Arc::new(AtomicU64::new(0));
    let counting = CountingReader {
        inner: File::open(path)?,
        count: Arc::clone(&consumed),
    };
    let decoder = zstd::stream::read::Decoder::new(counting)?;
    Ok(Source::Stream {
        reader: Box::new(BufReader::new(decoder)),
        consumed,
    })
}

fn trim_newline(bytes: &[u8]) -> &[u8] {
    let bytes = bytes.strip_suffix(b"\n").unwrap_or(bytes);
    bytes.strip_suffix(b"\r").unwrap_or(bytes)
}

/// Splits one line off the front of `bytes`.
///
/// Returns the line without its terminator and the number of bytes consumed.
pub fn split_line(bytes: &[u8]) -> (&[u8], usize) {
    let len = bytes.iter().position(|&b| b == b'\n').map_or(bytes.len(), |i| i + 1);
    (trim_newline(&bytes[..len]), len)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    const TEXT: &str = "first\r\nsecond\nthird";

    #[test]
    fn read_line_tracks_offsets_and_line_numbers() {
        let mut reader = TextReader::from_bytes(TEXT);
        assert!(reader.read_line().unwrap());
        assert_eq!(reader.line(), "first");
        assert_eq!(reader.byte_offset(), 7);
        assert_eq!(reader.line_number(), 1);
        assert!(reader.read_line().unwrap());
        assert!(reader.read_line().unwrap());
        assert_eq!(reader.line(), "third");
        assert!(reader.eof());
        assert!(!reader.read_line().unwrap());
        assert_eq!(reader.line_number(), 3);
    }

    #[test]
    fn seek_restores_position_and_line_number() {
        let mut reader = TextReader::from_bytes(TEXT);
        reader.read_line().unwrap();
        let (offset, line) = (reader.byte_offset(), reader.line_number());
        reader.read_line().unwrap();
        reader.read_line().unwrap();

        reader.seek(offset, line).unwrap();
        reader.read_line().unwrap();
        assert_eq!(reader.line(), "second");
        assert_eq!(reader.line_number(), 2);
        assert!(reader.seek(1_000, 0).is_err());
    }

    #[test]
    fn mapped_bytes_follow_the_read_position() {
        let mut reader = TextReader::from_bytes(TEXT);
        reader.read_line().unwrap();
        assert_eq!(reader.mapped_bytes().unwrap(), b"second\nthird");

        reader.consume_mapped(7, 1);
        assert_eq!(reader.line_number(), 2);
        reader.read_line().unwrap();
        assert_eq!(reader.line(), "third");

        reader.set_mmap_enabled(false);
        assert!(reader.mapped_bytes().is_none());
    }

    #[test]
    fn split_line_handles_missing_terminator() {
        assert_eq!(split_line(b"a b\r\nc"), (&b"a b"[..], 5));
        assert_eq!(split_line(b"tail"), (&b"tail"[..], 4));
    }

    #[test]
    fn plain_files_are_memory_mapped() {
        let mut file = NamedTempFile::new().unwrap();
        write!(file, "{TEXT}").unwrap();
        let mut reader = TextReader::open(file.path()).unwrap();
        assert!(!reader.is_compressed());
        assert_eq!(reader.underlying_size(), TEXT.len() as u64);
        assert!(reader.mapped_bytes().is_some());
        reader.read_line().unwrap();
        assert_eq!(reader.line(), "first");
    }

    #[test]
    fn zstd_files_are_decoded_and_seekable() {
        let compressed = zstd::encode_all(TEXT.as_bytes(), 3).unwrap();
        let mut file = tempfile::Builder::new().suffix(".zst").tempfile().unwrap();
        file.write_all(&compressed).unwrap();

        let mut reader = TextReader::open(file.path()).unwrap();
        assert!(reader.is_compressed());
        assert!(reader.mapped_bytes().is_none());
        reader.read_line().unwrap();
        let (offset, line) = (reader.byte_offset(), reader.line_number());
        reader.read_line().unwrap();
        reader.read_line().unwrap();
        assert!(reader.eof());

        reader.seek(offset, line).unwrap();
        reader.read_line().unwrap();
        assert_eq!(reader.line(), "second");
    }
}
