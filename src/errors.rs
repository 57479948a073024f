use thiserror::Error;

use crate::token::TokenKind;

/// Misuse of the [`Buffer`](crate::Buffer) API.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BufferError {
    /// A character was pushed back while another one was still pending.
    #[error("cannot push two characters")]
    AlreadyPushed,
    /// Random access is limited to one chunk worth of text.
    #[error("length too big: {len} exceeds the chunk size of {max}")]
    LengthTooBig { len: usize, max: usize },
    /// The requested text lives in a chunk released by
    /// [`Buffer::flush_old_chunks()`](crate::Buffer::flush_old_chunks).
    #[error("text at offset {offset} has already been flushed")]
    Flushed { offset: u64 },
    #[error("range {offset}+{len} lies outside of the text")]
    OutOfRange { offset: u64, len: usize },
}

/// What went wrong while tokenizing, parsing or resolving a game.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ErrorKind {
    #[error("string cannot contain a new line")]
    NewlineInString,
    #[error("missing closing quote")]
    UnterminatedString,
    #[error("invalid NAG")]
    InvalidNag,
    #[error("'/' character found at an unexpected location")]
    UnexpectedSlash,
    #[error("unknown token character '{0}'")]
    UnknownCharacter(char),
    #[error("expected a token of type {expected}")]
    UnexpectedToken { expected: TokenKind, found: TokenKind },
    #[error("cannot push two tokens")]
    TokenAlreadyPushed,
    #[error("bad move number")]
    BadMoveNumber { expected: u32, found: u32 },
    /// The square part of a SAN move could not be decoded.
    #[error("unable to decode position")]
    UndecodableMove(String),
    /// More than one legal move matches a SAN move. Always fatal.
    #[error("more than one piece found for this move - {0}")]
    AmbiguousMove(String),
    /// No legal move matches a SAN move. Only raised in
    /// [`ResolveMode::Diagnostic`](crate::ResolveMode::Diagnostic).
    #[error("unable to find compatible move - {0}")]
    NoCompatibleMove(String),
    #[error("PGN contains a bad move")]
    BadMove,
    #[error("error parsing the FEN attribute")]
    InvalidFen,
    #[error(transparent)]
    Buffer(#[from] BufferError),
}

/// A lexical, grammatical or move resolution error, together with the
/// offending source text.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{kind}")]
pub struct PgnError {
    kind: ErrorKind,
    offset: u64,
    code: String,
    moves: Vec<u16>,
}

impl PgnError {
    pub fn new(kind: ErrorKind, offset: u64, code: impl Into<String>) -> PgnError {
        PgnError {
            kind,
            offset,
            code: code.into(),
            moves: Vec::new(),
        }
    }

    /// Attaches the packed moves that were resolved before the failure.
    #[must_use]
    pub fn with_moves(mut self, moves: Vec<u16>) -> PgnError {
        self.moves = moves;
        self
    }

    pub fn kind(&self) -> &ErrorKind {
        &self.kind
    }

    /// Byte offset of the offending text.
    pub fn offset(&self) -> u64 {
        self.offset
    }

    /// The offending source text, `<empty>` if there is none.
    pub fn code(&self) -> &str {
        if self.code.is_empty() {
            "<empty>"
        } else {
            &self.code
        }
    }

    /// Packed moves of the game resolved before the error.
    pub fn moves(&self) -> &[u16] {
        &self.moves
    }

    /// The error message followed by the offending source text.
    pub fn report(&self) -> String {
        format!("{}\n\n{}", self.kind, self.code())
    }
}
