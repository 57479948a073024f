use std::{
    borrow::Cow,
    fs::File,
    io::{self, Read},
    path::Path,
};

use tracing::{debug, trace};

use crate::errors::BufferError;

/// Size of a full chunk in bytes.
pub const CHUNK_SIZE: usize = 1 << 20;

const BOM: &[u8] = b"\xef\xbb\xbf";

/// Character encoding of the stored text.
///
/// PGN corpora predate UTF-8 and are usually written in a legacy 8-bit code
/// page, so files default to [`Encoding::Windows1252`].
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Encoding {
    #[default]
    Windows1252,
    Latin1,
    Utf8,
}

impl Encoding {
    /// Decodes a byte slice of text stored in this encoding.
    pub fn decode(self, bytes: &[u8]) -> Cow<'_, str> {
        if bytes.is_ascii() {
            return String::from_utf8_lossy(bytes);
        }
        match self {
            Encoding::Utf8 => String::from_utf8_lossy(bytes),
            Encoding::Latin1 => Cow::Owned(bytes.iter().copied().map(char::from).collect()),
            Encoding::Windows1252 => Cow::Owned(bytes.iter().copied().map(windows_1252).collect()),
        }
    }
}

fn windows_1252(b: u8) -> char {
    const HIGH: [char; 32] = [
        '\u{20ac}', '\u{81}', '\u{201a}', '\u{192}', '\u{201e}', '\u{2026}', '\u{2020}', '\u{2021}',
        '\u{2c6}', '\u{2030}', '\u{160}', '\u{2039}', '\u{152}', '\u{8d}', '\u{17d}', '\u{8f}',
        '\u{90}', '\u{2018}', '\u{2019}', '\u{201c}', '\u{201d}', '\u{2022}', '\u{2013}', '\u{2014}',
        '\u{2dc}', '\u{2122}', '\u{161}', '\u{203a}', '\u{153}', '\u{9d}', '\u{17e}', '\u{178}',
    ];
    match b {
        0x80..=0x9f => HIGH[usize::from(b - 0x80)],
        _ => char::from(b),
    }
}

#[inline]
pub(crate) fn is_space(ch: u8) -> bool {
    matches!(ch, b' ' | b'\t' | b'\r' | b'\n')
}

/// Reads until `chunk` holds `size` bytes or the reader is exhausted.
fn fill<R: Read>(reader: &mut R, chunk: &mut Vec<u8>, size: usize) -> io::Result<()> {
    let missing = size.saturating_sub(chunk.len());
    reader.by_ref().take(missing as u64).read_to_end(chunk)?;
    Ok(())
}

/// PGN text held as a sequence of fixed-size chunks, read as one logical
/// character stream.
///
/// Every chunk except the last one holds exactly
/// [`chunk_size()`](Self::chunk_size) bytes, so absolute offsets map to
/// chunks by division. Chunks far behind the read cursor can be released
/// with [`flush_old_chunks()`](Self::flush_old_chunks).
#[derive(Debug, Clone)]
pub struct Buffer {
    /// `None` once flushed.
    chunks: Vec<Option<Box<[u8]>>>,
    chunk_size: usize,
    len: u64,
    encoding: Encoding,
    /// Index of the chunk being read.
    chunk: usize,
    /// Read position in the current chunk.
    pos: usize,
    /// Offset of the first byte of the current chunk.
    base: u64,
    pushed: Option<u8>,
    start_of_line: bool,
}

impl Buffer {
    fn from_chunks(chunks: Vec<Option<Box<[u8]>>>, chunk_size: usize, encoding: Encoding) -> Buffer {
        let len = chunks.iter().flatten().map(|chunk| chunk.len() as u64).sum();
        Buffer {
            chunks,
            chunk_size: chunk_size.max(1),
            len,
            encoding,
            chunk: 0,
            pos: 0,
            base: 0,
            pushed: None,
            start_of_line: true,
        }
    }

    /// Holds an in-memory string as a single chunk.
    pub fn from_text(text: &str) -> Buffer {
        Buffer::from_bytes(text.as_bytes(), Encoding::Utf8)
    }

    /// Holds raw bytes as a single chunk.
    pub fn from_bytes(bytes: &[u8], encoding: Encoding) -> Buffer {
        Buffer::from_chunks(vec![Some(bytes.into())], bytes.len(), encoding)
    }

    /// Splits raw bytes into chunks of `chunk_size` bytes.
    pub fn with_chunk_size(bytes: &[u8], chunk_size: usize, encoding: Encoding) -> Buffer {
        let chunk_size = chunk_size.max(1);
        let mut chunks: Vec<_> = bytes.chunks(chunk_size).map(|c| Some(c.into())).collect();
        if chunks.is_empty() {
            chunks.push(Some(Box::default()));
        }
        Buffer::from_chunks(chunks, chunk_size, encoding)
    }

    /// Reads a whole stream into chunks of [`CHUNK_SIZE`] bytes.
    ///
    /// A leading UTF-8 byte order mark is skipped and switches the encoding
    /// to [`Encoding::Utf8`].
    pub fn from_reader<R: Read>(mut reader: R, mut encoding: Encoding) -> io::Result<Buffer> {
        let mut chunks = Vec::new();
        loop {
            let mut chunk = Vec::with_capacity(CHUNK_SIZE);
            fill(&mut reader, &mut chunk, CHUNK_SIZE)?;
            if chunks.is_empty() && chunk.starts_with(BOM) {
                encoding = Encoding::Utf8;
                chunk.drain(..BOM.len());
                fill(&mut reader, &mut chunk, CHUNK_SIZE)?;
            }
            let full = chunk.len() == CHUNK_SIZE;
            if !chunk.is_empty() || chunks.is_empty() {
                chunks.push(Some(chunk.into_boxed_slice()));
            }
            if !full {
                break;
            }
        }
        Ok(Buffer::from_chunks(chunks, CHUNK_SIZE, encoding))
    }

    /// Reads a PGN file.
    pub fn open<P: AsRef<Path>>(path: P, encoding: Encoding) -> io::Result<Buffer> {
        let path = path.as_ref();
        let buffer = Buffer::from_reader(File::open(path)?, encoding)?;
        debug!(
            path = %path.display(),
            len = buffer.len(),
            chunks = buffer.chunk_count(),
            encoding = ?buffer.encoding(),
            "read pgn file"
        );
        Ok(buffer)
    }

    /// Total size of the text in bytes.
    pub fn len(&self) -> u64 {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn encoding(&self) -> Encoding {
        self.encoding
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    pub fn chunk_count(&self) -> usize {
        self.chunks.len()
    }

    /// Index of the chunk under the read cursor.
    pub fn current_chunk(&self) -> usize {
        self.chunk
    }

    /// Absolute offset of the next character to be read. A pushed back
    /// character counts as unread.
    pub fn position(&self) -> u64 {
        (self.base + self.pos as u64).saturating_sub(u64::from(self.pushed.is_some()))
    }

    /// Whether the next character starts a physical line.
    pub fn is_start_of_line(&self) -> bool {
        self.start_of_line
    }

    /// Moves the read cursor back to the start of the text.
    pub fn rewind(&mut self) {
        self.chunk = 0;
        self.pos = 0;
        self.base = 0;
        self.pushed = None;
        self.start_of_line = true;
    }

    fn current(&self) -> &[u8] {
        self.chunks[self.chunk].as_deref().unwrap_or_default()
    }

    fn next_chunk(&mut self) -> bool {
        if self.chunk + 1 < self.chunks.len() {
            self.base += self.current().len() as u64;
            self.chunk += 1;
            self.pos = 0;
            true
        } else {
            false
        }
    }

    #[inline]
    fn track_line(&mut self, ch: u8) {
        match ch {
            b'\r' => self.start_of_line = true,
            b'\n' => (),
            _ => self.start_of_line = false,
        }
    }

    /// Returns the next character without consuming it.
    pub fn peek_char(&self) -> Option<u8> {
        if self.pushed.is_some() {
            return self.pushed;
        }
        match self.current().get(self.pos) {
            Some(&ch) => Some(ch),
            None => self
                .chunks
                .get(self.chunk + 1)
                .and_then(|chunk| chunk.as_deref())
                .and_then(|chunk| chunk.first().copied()),
        }
    }

    fn raw_char(&mut self) -> Option<u8> {
        let ch = if let Some(ch) = self.pushed.take() {
            Some(ch)
        } else if let Some(&ch) = self.current().get(self.pos) {
            self.pos += 1;
            Some(ch)
        } else if self.next_chunk() {
            let ch = self.current().first().copied();
            if ch.is_some() {
                self.pos = 1;
            }
            ch
        } else {
            None
        };
        if let Some(ch) = ch {
            self.track_line(ch);
        }
        ch
    }

    fn skip_line(&mut self) {
        while let Some(ch) = self.raw_char() {
            if ch == b'\r' || ch == b'\n' {
                break;
            }
        }
        while self.peek_char() == Some(b'\n') {
            self.raw_char();
        }
        self.start_of_line = true;
    }

    /// Consumes the next character, transparently discarding comment lines
    /// starting with `;` or `%`.
    pub fn get_char(&mut self) -> Option<u8> {
        loop {
            let at_line_start = self.start_of_line;
            let ch = self.raw_char();
            if at_line_start && matches!(ch, Some(b';' | b'%')) {
                self.skip_line();
            } else {
                return ch;
            }
        }
    }

    /// Pushes back a single character to be read again.
    pub fn push_char(&mut self, ch: u8) -> Result<(), BufferError> {
        if self.pushed.is_some() {
            return Err(BufferError::AlreadyPushed);
        }
        self.pushed = Some(ch);
        Ok(())
    }

    /// Skips spaces, tabs and line breaks.
    pub fn skip_whitespace(&mut self) {
        match self.pushed {
            Some(ch) if !is_space(ch) => return,
            Some(_) => self.pushed = None,
            None => (),
        }

        loop {
            let Some(chunk) = self.chunks[self.chunk].as_deref() else {
                return;
            };
            let mut pos = self.pos;
            let mut start_of_line = self.start_of_line;
            while let Some(&ch) = chunk.get(pos) {
                match ch {
                    b'\r' => start_of_line = true,
                    b'\n' => (),
                    b' ' | b'\t' => start_of_line = false,
                    _ => break,
                }
                pos += 1;
            }
            let exhausted = pos == chunk.len();
            self.pos = pos;
            self.start_of_line = start_of_line;
            if !exhausted || !self.next_chunk() {
                return;
            }
        }
    }

    fn chunk_at(&self, index: usize, offset: u64) -> Result<&[u8], BufferError> {
        match self.chunks.get(index) {
            Some(Some(chunk)) => Ok(chunk),
            Some(None) => Err(BufferError::Flushed { offset }),
            None => Err(BufferError::OutOfRange { offset, len: 0 }),
        }
    }

    /// Random access to the raw bytes of the text. The range may span at most
    /// two adjacent chunks.
    pub fn get_bytes_at(&self, offset: u64, len: usize) -> Result<Cow<'_, [u8]>, BufferError> {
        if len > self.chunk_size {
            return Err(BufferError::LengthTooBig {
                len,
                max: self.chunk_size,
            });
        }
        if offset + len as u64 > self.len {
            return Err(BufferError::OutOfRange { offset, len });
        }
        if len == 0 {
            return Ok(Cow::Borrowed(&[]));
        }

        let size = self.chunk_size as u64;
        let index = (offset / size) as usize;
        let at = (offset % size) as usize;
        let first = self.chunk_at(index, offset)?;
        let available = first.len() - at;
        if len <= available {
            Ok(Cow::Borrowed(&first[at..at + len]))
        } else {
            let second = self.chunk_at(index + 1, offset)?;
            let mut bytes = Vec::with_capacity(len);
            bytes.extend_from_slice(&first[at..]);
            bytes.extend_from_slice(&second[..len - available]);
            Ok(Cow::Owned(bytes))
        }
    }

    /// Random access to the decoded text.
    pub fn get_string_at(&self, offset: u64, len: usize) -> Result<String, BufferError> {
        let bytes = self.get_bytes_at(offset, len)?;
        Ok(self.encoding.decode(&bytes).into_owned())
    }

    /// Best effort source excerpt for error messages, clamped to one chunk.
    pub(crate) fn excerpt(&self, offset: u64, len: u64) -> String {
        let len = len.min(self.chunk_size as u64).min(self.len.saturating_sub(offset));
        self.get_string_at(offset, len as usize).unwrap_or_default()
    }

    /// Releases every chunk older than the one preceding the current chunk.
    pub fn flush_old_chunks(&mut self) {
        let Some(last) = self.chunk.checked_sub(2) else {
            return;
        };
        let mut flushed = 0;
        for chunk in self.chunks[..=last].iter_mut().rev() {
            if chunk.take().is_none() {
                break;
            }
            flushed += 1;
        }
        if flushed > 0 {
            trace!(flushed, current = self.chunk, "flushed old chunks");
        }
    }

    /// Whether the whole text is a single chunk with at most one line
    /// terminator, i.e. possibly a bare FEN.
    pub fn is_only_fen(&self) -> bool {
        match self.chunks.as_slice() {
            [Some(text)] => {
                memchr::memchr2_iter(b'\r', b'\n', text)
                    .filter(|&i| !(text[i] == b'\n' && i > 0 && text[i - 1] == b'\r'))
                    .count()
                    <= 1
            }
            _ => false,
        }
    }

    /// The whole text, if it is held in a single chunk.
    pub(crate) fn single_chunk(&self) -> Option<&[u8]> {
        match self.chunks.as_slice() {
            [Some(text)] => Some(text),
            _ => None,
        }
    }
}
