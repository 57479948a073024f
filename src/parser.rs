//! Assemble tag pairs and movetext into [`RawGame`]s.
//!
//! The grammar is the export format of the PGN standard, without
//! recursive annotation variations (they are skipped by the tokenizer):
//!
//! ```text
//! game     := { '[' Symbol String ']' } movetext
//! movetext := { Integer | '.' | Symbol | Nag } Termination
//! ```
//!
//! # Examples
//!
//! ```
//! use pgn_resolver::{ParseOptions, Parser};
//!
//! let mut parser = Parser::from_text("[White \"A\"]\n1. e4 e5 2. Nf3 *");
//! let game = parser.parse_game(ParseOptions::default())?.expect("one game");
//! assert_eq!(game.white(), Some("A"));
//! assert_eq!(game.san_moves(), ["e4", "e5", "Nf3"]);
//! assert_eq!(game.termination.as_deref(), Some("*"));
//!
//! assert!(parser.parse_game(ParseOptions::default())?.is_none());
//! # Ok::<_, pgn_resolver::PgnError>(())
//! ```

use std::{io, path::Path};

use tracing::{debug, warn};

use crate::{
    analysis::{Analyzer, Counters},
    board::GameBoard,
    buffer::{Buffer, Encoding},
    errors::{ErrorKind, PgnError},
    fen::{FenError, FenPosition},
    game::{RawGame, Tags},
    progress::{CancelToken, ChunkThrottle, Phase, Progress, ProgressEvent},
    token::{Token, TokenKind, Tokenizer},
};

/// Selects what [`Parser::parse_game()`] materializes.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ParseOptions {
    /// Collect tag pairs. A `FEN` tag is collected regardless.
    pub attrs: bool,
    /// Collect SAN moves.
    pub moves: bool,
}

impl ParseOptions {
    /// Only the moves, as needed to build move lists.
    pub const MOVES_ONLY: ParseOptions = ParseOptions {
        attrs: false,
        moves: true,
    };
}

impl Default for ParseOptions {
    fn default() -> ParseOptions {
        ParseOptions {
            attrs: true,
            moves: true,
        }
    }
}

/// Result of [`Parser::all_raw_games()`].
#[derive(Debug, Clone, Default)]
pub struct RawGames {
    pub games: Vec<RawGame>,
    /// Games dropped because they contain a bad move.
    pub skipped: u32,
    /// The job stopped early on request.
    pub cancelled: bool,
}

/// Result of [`Parser::parse_single()`].
#[derive(Debug, Clone)]
pub struct SingleGame {
    pub game: RawGame,
    pub counters: Counters,
}

/// A PGN parser over a [`Buffer`].
#[derive(Debug, Clone)]
pub struct Parser {
    tokenizer: Tokenizer,
}

impl Parser {
    pub fn new(buffer: Buffer) -> Parser {
        Parser {
            tokenizer: Tokenizer::new(buffer),
        }
    }

    pub fn from_text(text: &str) -> Parser {
        Parser::new(Buffer::from_text(text))
    }

    pub fn open<P: AsRef<Path>>(path: P, encoding: Encoding) -> io::Result<Parser> {
        Buffer::open(path, encoding).map(Parser::new)
    }

    pub fn buffer(&self) -> &Buffer {
        self.tokenizer.buffer()
    }

    pub fn buffer_mut(&mut self) -> &mut Buffer {
        self.tokenizer.buffer_mut()
    }

    pub fn into_buffer(self) -> Buffer {
        self.tokenizer.into_buffer()
    }

    /// Starts over at the beginning of the text.
    pub fn rewind(&mut self) {
        self.tokenizer.rewind();
    }

    /// Parses the next game. Returns `None` at the end of the text.
    pub fn parse_game(&mut self, options: ParseOptions) -> Result<Option<RawGame>, PgnError> {
        let first = self.tokenizer.peek_token()?;
        if first.kind == TokenKind::Eof {
            return Ok(None);
        }
        if first.kind != TokenKind::OpenBracket {
            warn!(offset = first.start, "game does not begin with '['");
        }

        let mut game = RawGame {
            start_offset: first.start,
            ..RawGame::default()
        };
        game.tags = self.parse_tags(options.attrs)?;
        self.parse_movetext(&mut game, options.moves)?;

        let next = self.tokenizer.peek_token()?.start;
        game.length = u32::try_from(next - game.start_offset).unwrap_or(u32::MAX);
        Ok(Some(game))
    }

    fn parse_tags(&mut self, attrs: bool) -> Result<Option<Tags>, PgnError> {
        let mut tags = attrs.then(Tags::new);
        loop {
            let token = self.tokenizer.next_token()?;
            if token.kind != TokenKind::OpenBracket {
                self.tokenizer.push_token(token)?;
                return Ok(tags);
            }
            let name = self.tokenizer.assume_token(TokenKind::Symbol)?;
            let value = self.tokenizer.assume_token(TokenKind::String)?;
            self.tokenizer.assume_token(TokenKind::CloseBracket)?;

            let (name, value) = (name.text.unwrap_or_default(), value.text.unwrap_or_default());
            let tags = match tags {
                Some(ref mut tags) => tags,
                None if name == "FEN" => tags.insert(Tags::new()),
                None => continue,
            };
            if !tags.insert(name.as_str(), value) {
                debug!(tag = %name, "duplicate tag ignored");
            }
        }
    }

    fn parse_movetext(&mut self, game: &mut RawGame, moves: bool) -> Result<(), PgnError> {
        game.san_moves = moves.then(Vec::new);

        let mut token = self.tokenizer.next_token()?;
        match token.kind {
            TokenKind::Integer | TokenKind::Symbol | TokenKind::Nag | TokenKind::Termination => (),
            // tags without movetext at the end of the text
            TokenKind::Eof => return self.tokenizer.push_token(token),
            _ => {
                debug!(offset = token.start, kind = %token.kind, "unexpected token before movetext");
                game.bad_move = true;
            }
        }

        let numbered = game.fen().is_none();
        let mut ply = 2u32;
        while !matches!(token.kind, TokenKind::Termination | TokenKind::Eof) {
            match token.kind {
                TokenKind::Integer => {
                    let expected = ply / 2;
                    let found = token.number.unwrap_or(u32::MAX);
                    if numbered && found != expected {
                        return Err(self.error_at(&token, ErrorKind::BadMoveNumber { expected, found }));
                    }
                }
                TokenKind::Symbol | TokenKind::Unknown => {
                    if token.kind == TokenKind::Unknown {
                        game.bad_move = true;
                    }
                    if let Some(ref mut sans) = game.san_moves {
                        sans.push(token.text.take().unwrap_or_default());
                    }
                    ply += 1;
                }
                _ => (),
            }
            token = self.tokenizer.next_token()?;
        }

        self.tokenizer.check_token(&token, TokenKind::Termination)?;
        game.termination = token.text;
        Ok(())
    }

    fn error_at(&self, token: &Token, kind: ErrorKind) -> PgnError {
        PgnError::new(
            kind,
            token.start,
            self.buffer().excerpt(token.start, u64::from(token.len)),
        )
    }

    /// Decodes the whole text as a FEN, if it has at most one line.
    pub fn parse_fen_line(&self) -> Option<Result<FenPosition, FenError>> {
        if !self.buffer().is_only_fen() {
            return None;
        }
        let text = self.buffer().single_chunk()?;
        Some(FenPosition::decode(&self.buffer().encoding().decode(text)))
    }

    /// Parses every remaining game.
    ///
    /// Games with a bad move are counted and dropped, as are games without
    /// moves when moves are collected.
    pub fn all_raw_games(
        &mut self,
        options: ParseOptions,
        cancel: &CancelToken,
        progress: Progress<'_>,
    ) -> Result<RawGames, PgnError> {
        let total = self.buffer().chunk_count() as u64;
        let mut throttle = ChunkThrottle::default();
        let mut raw = RawGames::default();

        progress(&ProgressEvent::new(Phase::RawParsing, 0, total));
        loop {
            if cancel.is_cancelled() {
                raw.cancelled = true;
                break;
            }
            let Some(game) = self.parse_game(options)? else {
                break;
            };
            if game.bad_move {
                debug!(offset = game.start_offset, "game with a bad move skipped");
                raw.skipped += 1;
                continue;
            }
            if game.san_moves.as_ref().is_none_or(|sans| !sans.is_empty()) {
                raw.games.push(game);
            }
            let chunk = self.buffer().current_chunk();
            if throttle.poll(chunk) {
                progress(&ProgressEvent::new(Phase::RawParsing, chunk as u64, total));
            }
        }
        progress(&ProgressEvent::new(
            Phase::RawParsing,
            self.buffer().current_chunk() as u64,
            total,
        ));

        debug!(games = raw.games.len(), skipped = raw.skipped, "raw games parsed");
        Ok(raw)
    }

    /// Parses a single game or FEN for interactive use, and resolves its
    /// moves on the analyzer's board.
    ///
    /// A text holding only a valid FEN yields a game without moves that
    /// starts from that position. An empty text yields a default game.
    pub fn parse_single<B: GameBoard>(
        &mut self,
        analyzer: &mut Analyzer<B>,
        ignore_moves_if_fen: bool,
    ) -> Result<SingleGame, PgnError> {
        let mut counters = Counters::default();

        if let Some(Ok(fen)) = self.parse_fen_line() {
            analyzer.board.reset();
            if fen.apply_to(&mut analyzer.board).is_ok() {
                let game = RawGame {
                    tags: Some(Tags::new()),
                    san_moves: Some(Vec::new()),
                    move_list: Some(Vec::new()),
                    resolved: Some(Vec::new()),
                    starting_color: fen.turn,
                    starting_position: Some(fen),
                    ..RawGame::default()
                };
                return Ok(SingleGame { game, counters });
            }
        }

        let Some(mut game) = self.parse_game(ParseOptions::default())? else {
            let game = RawGame {
                tags: Some(Tags::new()),
                san_moves: Some(Vec::new()),
                ..RawGame::default()
            };
            return Ok(SingleGame { game, counters });
        };
        if game.bad_move {
            return Err(PgnError::new(
                ErrorKind::BadMove,
                game.start_offset,
                self.buffer().excerpt(game.start_offset, u64::from(game.length)),
            ));
        }

        analyzer.analyze(self.buffer(), &mut game, ignore_moves_if_fen, true, &mut counters)?;
        Ok(SingleGame { game, counters })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::board::ChessBoard;

    fn games(text: &str, options: ParseOptions) -> Vec<RawGame> {
        let mut parser = Parser::from_text(text);
        let mut games = Vec::new();
        while let Some(game) = parser.parse_game(options).unwrap() {
            games.push(game);
        }
        games
    }

    #[test]
    fn test_tags_and_moves() {
        let text = "[Event \"Test\"]\n[White \"A\"]\n[Black \"B\"]\n\n1. e4 e5 2. Nf3 *";
        let games = games(text, ParseOptions::default());
        assert_eq!(games.len(), 1);
        let game = &games[0];
        let tags: Vec<_> = game.tags.as_ref().unwrap().iter().collect();
        assert_eq!(tags, [("Event", "Test"), ("White", "A"), ("Black", "B")]);
        assert_eq!(game.san_moves(), ["e4", "e5", "Nf3"]);
        assert_eq!(game.termination.as_deref(), Some("*"));
        assert_eq!((game.start_offset, game.length as usize), (0, text.len()));
        assert!(!game.bad_move);
    }

    #[test]
    fn test_game_length() {
        let first = "[Event \"1\"]\n1. d4 d5 1-0\n\n";
        let text = format!("{first}[Event \"2\"]\n1. c4 0-1\n");
        let games = games(&text, ParseOptions::default());
        assert_eq!(games.len(), 2);
        assert_eq!(games[0].length as usize, first.len());
        assert_eq!(games[1].start_offset as usize, first.len());
        assert_eq!(games[1].end_offset() as usize, text.len());
        assert_eq!(games[1].event(), Some("2"));
    }

    #[test]
    fn test_options() {
        let text = "[Event \"E\"]\n[FEN \"8/8/8/8/8/8/8/K6k w - - 0 1\"]\n1. Kb1 *";
        let game = &games(text, ParseOptions { attrs: false, moves: false })[0];
        // the FEN is kept even without attributes
        assert_eq!(game.tags.as_ref().map(Tags::len), Some(1));
        assert_eq!(game.event(), None);
        assert!(game.san_moves.is_none());

        let text = "[Event \"E\"]\n1. e4 *";
        assert!(games(text, ParseOptions::MOVES_ONLY)[0].tags.is_none());

        let text = "[FEN \"8/8/8/8/8/8/8/K6k w - - 0 1\"]\n[Event \"E\"]\n5. Kb1 *";
        let game = &games(text, ParseOptions::MOVES_ONLY)[0];
        assert_eq!(game.fen(), Some("8/8/8/8/8/8/8/K6k w - - 0 1"));
        assert_eq!(game.event(), None);
        assert_eq!(game.san_moves(), ["Kb1"]);
    }

    #[test]
    fn test_bad_move_number() {
        let mut parser = Parser::from_text("1. e4 e5 3. Nf3 *");
        let err = parser.parse_game(ParseOptions::default()).unwrap_err();
        assert_eq!(*err.kind(), ErrorKind::BadMoveNumber { expected: 2, found: 3 });
        assert_eq!(err.to_string(), "bad move number");
        assert_eq!(err.code(), "3");

        // black continuations and annotations
        let game = &games("1. e4 {best} 1... e5 $1 2. Nf3 1-0", ParseOptions::default())[0];
        assert_eq!(game.san_moves(), ["e4", "e5", "Nf3"]);
    }

    #[test]
    fn test_missing_termination() {
        let mut parser = Parser::from_text("[Event \"E\"]\n1. e4 e5");
        let err = parser.parse_game(ParseOptions::default()).unwrap_err();
        assert_eq!(err.to_string(), "expected a token of type Termination");
    }

    #[test]
    fn test_bad_move() {
        let game = &games("1. e4 -- 2. Nf3 *", ParseOptions::default())[0];
        assert!(game.bad_move);
        assert_eq!(game.san_moves(), ["e4", "--", "Nf3"]);
    }

    #[test]
    fn test_tags_without_movetext() {
        let game = &games("[Event \"E\"]\n", ParseOptions::default())[0];
        assert_eq!(game.event(), Some("E"));
        assert!(game.san_moves().is_empty());
        assert_eq!(game.termination, None);

    }

    #[test]
    fn test_stray_token_before_movetext() {
        let text = "[Event \"E\"]\n\"stray\" 1. e4 *\n\n[Event \"F\"]\n1. d4 *";
        let games = games(text, ParseOptions::default());
        assert_eq!(games.len(), 2);
        assert!(games[0].bad_move);
        assert_eq!(games[0].san_moves(), ["e4"]);
        assert_eq!(games[0].termination.as_deref(), Some("*"));
        assert!(!games[1].bad_move);
        assert_eq!(games[1].san_moves(), ["d4"]);
    }

    #[test]
    fn test_termination_only() {
        let game = &games("[Event \"E\"]\n1/2-1/2", ParseOptions::default())[0];
        assert!(game.san_moves().is_empty());
        assert_eq!(game.termination.as_deref(), Some("1/2-1/2"));
    }

    #[test]
    fn test_duplicate_tag() {
        let game = &games("[Event \"A\"]\n[Event \"B\"]\n*", ParseOptions::default())[0];
        assert_eq!(game.event(), Some("A"));
        assert_eq!(game.tags.as_ref().unwrap().len(), 1);
    }

    #[test]
    fn test_game_without_tags() {
        let games = games("1. e4 *\n1. d4 *", ParseOptions::default());
        assert_eq!(games.len(), 2);
        assert_eq!(games[1].san_moves(), ["d4"]);
    }

    #[test]
    fn test_parse_fen_line() {
        let parser = Parser::from_text("4k3/8/8/8/8/8/8/4K3 w - - 0 1\r\n");
        let fen = parser.parse_fen_line().unwrap().unwrap();
        assert_eq!(fen.turn, shakmaty::Color::White);

        let parser = Parser::from_text("[Event \"E\"]\n1. e4 *\n");
        assert!(parser.parse_fen_line().is_none());
    }

    #[test]
    fn test_all_raw_games() {
        let text = "1. e4 *\n1. e4 -- *\n[Event \"Empty\"]\n*\n1. d4 d5 *";
        let mut parser = Parser::from_text(text);
        let mut events = Vec::new();
        let raw = parser
            .all_raw_games(ParseOptions::default(), &CancelToken::new(), &mut |e| {
                events.push(e.clone())
            })
            .unwrap();
        assert_eq!(raw.games.len(), 2);
        assert_eq!(raw.skipped, 1);
        assert!(!raw.cancelled);
        assert!(events.iter().all(|e| e.phase == Phase::RawParsing));
        assert_eq!(events.len(), 2);

        let cancel = CancelToken::new();
        cancel.cancel();
        let mut parser = Parser::from_text(text);
        let raw = parser
            .all_raw_games(ParseOptions::default(), &cancel, &mut |_| ())
            .unwrap();
        assert!(raw.cancelled);
        assert!(raw.games.is_empty());
    }

    #[test]
    fn test_parse_single() {
        let mut analyzer = Analyzer::new(ChessBoard::new());
        let mut parser = Parser::from_text("[White \"A\"]\n1. e4 e5 2. Nf3 Nc6 *");
        let single = parser.parse_single(&mut analyzer, false).unwrap();
        assert_eq!(single.game.packed_moves().len(), 4);
        assert_eq!(single.game.resolved.as_ref().map(Vec::len), Some(4));
        assert_eq!(single.counters, Counters::default());

        let mut parser = Parser::from_text("8/8/8/8/8/8/8/K6k b - - 0 1");
        let single = parser.parse_single(&mut analyzer, false).unwrap();
        assert_eq!(single.game.starting_color, shakmaty::Color::Black);
        assert!(single.game.starting_position.is_some());
        assert_eq!(analyzer.board.turn(), shakmaty::Color::Black);

        let mut parser = Parser::from_text("   ");
        let single = parser.parse_single(&mut analyzer, false).unwrap();
        assert_eq!(single.game.player_name(shakmaty::Color::White), "Player 1");
        assert!(single.game.packed_moves().is_empty());

        let mut parser = Parser::from_text("1. e4 -- *");
        let err = parser.parse_single(&mut analyzer, false).unwrap_err();
        assert_eq!(*err.kind(), ErrorKind::BadMove);
        assert_eq!(err.code(), "1. e4 -- *");
    }
}
