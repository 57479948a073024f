use std::fmt;

use crate::{
    buffer::{is_space, Buffer},
    errors::{ErrorKind, PgnError},
};

/// Kinds of lexical tokens in PGN text.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum TokenKind {
    Integer,
    String,
    Symbol,
    Dot,
    Nag,
    OpenBracket,
    CloseBracket,
    Termination,
    /// A symbol starting with `-`, like the `--` null move.
    Unknown,
    Eof,
}

impl fmt::Display for TokenKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match *self {
            TokenKind::Integer => "Integer",
            TokenKind::String => "String",
            TokenKind::Symbol => "Symbol",
            TokenKind::Dot => "Dot",
            TokenKind::Nag => "Nag",
            TokenKind::OpenBracket => "OpenBracket",
            TokenKind::CloseBracket => "CloseBracket",
            TokenKind::Termination => "Termination",
            TokenKind::Unknown => "Unknown",
            TokenKind::Eof => "Eof",
        })
    }
}

/// A token together with its location in the source text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    pub kind: TokenKind,
    /// Unescaped contents of strings, or the text of symbols, integers,
    /// terminations and unknown tokens.
    pub text: Option<String>,
    /// Value of integers and NAGs.
    pub number: Option<u32>,
    /// Byte offset of the first character.
    pub start: u64,
    /// Length in bytes.
    pub len: u32,
}

impl Token {
    fn eof(start: u64) -> Token {
        Token {
            kind: TokenKind::Eof,
            text: None,
            number: None,
            start,
            len: 0,
        }
    }

    pub fn text(&self) -> &str {
        self.text.as_deref().unwrap_or_default()
    }

    /// Offset immediately after the token.
    pub fn end(&self) -> u64 {
        self.start + u64::from(self.len)
    }
}

#[inline]
fn is_symbol_continuation(ch: u8) -> bool {
    ch.is_ascii_alphanumeric() || matches!(ch, b'_' | b'+' | b'#' | b'=' | b':' | b'-' | b'/')
}

fn parse_number(digits: &[u8]) -> u32 {
    btoi::btou_saturating(digits).unwrap_or(u32::MAX)
}

/// Splits a [`Buffer`] into tokens, skipping comments and variations.
///
/// Holds at most one pushed back token.
#[derive(Debug, Clone)]
pub struct Tokenizer {
    buffer: Buffer,
    pushed: Option<Token>,
}

impl Tokenizer {
    pub fn new(buffer: Buffer) -> Tokenizer {
        Tokenizer {
            buffer,
            pushed: None,
        }
    }

    pub fn buffer(&self) -> &Buffer {
        &self.buffer
    }

    pub fn buffer_mut(&mut self) -> &mut Buffer {
        &mut self.buffer
    }

    pub fn into_buffer(self) -> Buffer {
        self.buffer
    }

    /// Starts over at the beginning of the text.
    pub fn rewind(&mut self) {
        self.pushed = None;
        self.buffer.rewind();
    }

    fn error(&self, kind: ErrorKind, start: u64) -> PgnError {
        let end = self.buffer.position().max(start);
        PgnError::new(kind, start, self.buffer.excerpt(start, end - start))
    }

    fn token(&self, kind: TokenKind, start: u64, text: Option<String>, number: Option<u32>) -> Token {
        Token {
            kind,
            text,
            number,
            start,
            len: u32::try_from(self.buffer.position() - start).unwrap_or(u32::MAX),
        }
    }

    fn decode(&self, bytes: &[u8]) -> String {
        self.buffer.encoding().decode(bytes).into_owned()
    }

    fn unread(&mut self, ch: u8, start: u64) -> Result<(), PgnError> {
        self.buffer
            .push_char(ch)
            .map_err(|err| self.error(err.into(), start))
    }

    fn read_string(&mut self, start: u64) -> Result<String, PgnError> {
        let mut bytes = Vec::new();
        loop {
            match self.buffer.get_char() {
                None => return Err(self.error(ErrorKind::UnterminatedString, start)),
                Some(b'\r') => return Err(self.error(ErrorKind::NewlineInString, start)),
                Some(b'"') => break,
                Some(b'\\') => match self.buffer.get_char() {
                    Some(b'"') => bytes.push(b'"'),
                    Some(ch) => bytes.extend_from_slice(&[b'\\', ch]),
                    None => bytes.push(b'\\'),
                },
                Some(ch) => bytes.push(ch),
            }
        }
        Ok(self.decode(&bytes))
    }

    fn read_while(
        &mut self,
        first: u8,
        start: u64,
        accept: fn(u8) -> bool,
    ) -> Result<Vec<u8>, PgnError> {
        let mut bytes = vec![first];
        while let Some(ch) = self.buffer.get_char() {
            if accept(ch) {
                bytes.push(ch);
            } else {
                self.unread(ch, start)?;
                break;
            }
        }
        Ok(bytes)
    }

    fn skip_comment(&mut self) {
        while let Some(ch) = self.buffer.get_char() {
            if ch == b'}' {
                break;
            }
        }
    }

    fn skip_variation(&mut self) {
        let mut depth = 1usize;
        while depth > 0 {
            match self.buffer.get_char() {
                None => break,
                Some(b'(') => depth += 1,
                Some(b')') => depth -= 1,
                Some(b'{') => self.skip_comment(),
                Some(_) => (),
            }
        }
    }

    /// Reads the next token, or the pushed back token if there is one.
    pub fn next_token(&mut self) -> Result<Token, PgnError> {
        if let Some(token) = self.pushed.take() {
            return Ok(token);
        }

        loop {
            self.buffer.skip_whitespace();
            let Some(ch) = self.buffer.get_char() else {
                return Ok(Token::eof(self.buffer.position()));
            };
            let start = self.buffer.position() - 1;

            return Ok(match ch {
                ch if is_space(ch) => continue, // after a skipped comment line
                b'{' => {
                    self.skip_comment();
                    continue;
                }
                b'(' => {
                    self.skip_variation();
                    continue;
                }
                b'"' => {
                    let text = self.read_string(start)?;
                    self.token(TokenKind::String, start, Some(text), None)
                }
                b'.' => {
                    while self.buffer.peek_char() == Some(b'.') {
                        self.buffer.get_char();
                    }
                    self.token(TokenKind::Dot, start, None, None)
                }
                b'$' => match self.buffer.get_char() {
                    Some(digit) if digit.is_ascii_digit() => {
                        let digits = self.read_while(digit, start, |ch| ch.is_ascii_digit())?;
                        self.token(TokenKind::Nag, start, None, Some(parse_number(&digits)))
                    }
                    _ => return Err(self.error(ErrorKind::InvalidNag, start)),
                },
                b'[' => self.token(TokenKind::OpenBracket, start, None, None),
                b']' => self.token(TokenKind::CloseBracket, start, None, None),
                b'*' => self.token(TokenKind::Termination, start, Some("*".to_owned()), None),
                b'-' => {
                    let symbol = self.read_while(ch, start, is_symbol_continuation)?;
                    let text = self.decode(&symbol);
                    self.token(TokenKind::Unknown, start, Some(text), None)
                }
                ch if ch.is_ascii_alphanumeric() => {
                    let symbol = self.read_while(ch, start, is_symbol_continuation)?;
                    let text = Some(self.decode(&symbol));
                    if symbol.iter().all(u8::is_ascii_digit) {
                        self.token(TokenKind::Integer, start, text, Some(parse_number(&symbol)))
                    } else {
                        match &symbol[..] {
                            b"1-0" | b"0-1" | b"1/2-1/2" => {
                                self.token(TokenKind::Termination, start, text, None)
                            }
                            s if s.contains(&b'/') => {
                                return Err(self.error(ErrorKind::UnexpectedSlash, start))
                            }
                            _ => self.token(TokenKind::Symbol, start, text, None),
                        }
                    }
                }
                ch => return Err(self.error(ErrorKind::UnknownCharacter(char::from(ch)), start)),
            });
        }
    }

    /// Pushes back a token to be returned by the next call to
    /// [`next_token()`](Self::next_token).
    pub fn push_token(&mut self, token: Token) -> Result<(), PgnError> {
        if self.pushed.is_some() {
            return Err(PgnError::new(ErrorKind::TokenAlreadyPushed, token.start, ""));
        }
        self.pushed = Some(token);
        Ok(())
    }

    pub fn peek_token(&mut self) -> Result<&Token, PgnError> {
        let token = match self.pushed.take() {
            Some(token) => token,
            None => self.next_token()?,
        };
        Ok(self.pushed.insert(token))
    }

    /// Reads the next token and fails unless it is of the given kind.
    pub fn assume_token(&mut self, expected: TokenKind) -> Result<Token, PgnError> {
        let token = self.next_token()?;
        self.check_token(&token, expected)?;
        Ok(token)
    }

    pub(crate) fn check_token(&self, token: &Token, expected: TokenKind) -> Result<(), PgnError> {
        if token.kind == expected {
            Ok(())
        } else {
            Err(PgnError::new(
                ErrorKind::UnexpectedToken {
                    expected,
                    found: token.kind,
                },
                token.start,
                self.buffer.excerpt(token.start, u64::from(token.len)),
            ))
        }
    }
}
