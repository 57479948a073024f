//! Resolve the SAN moves of parsed games on a board.

use std::ops::AddAssign;

use tracing::{debug, trace};

use crate::{
    board::GameBoard,
    buffer::Buffer,
    errors::{ErrorKind, PgnError},
    fen::FenPosition,
    game::RawGame,
    san::{self, ResolveMode, ResolvedMove, SanError, SanOutcome},
};

/// Games dropped and games cut short during a job.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Counters {
    /// Games without any move to resolve.
    pub skipped: u32,
    /// Games whose moves were resolved up to an unresolvable move.
    pub truncated: u32,
}

impl AddAssign for Counters {
    fn add_assign(&mut self, other: Counters) {
        self.skipped += other.skipped;
        self.truncated += other.truncated;
    }
}

/// Moves resolved for a game.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Resolution {
    pub packed: Vec<u16>,
    /// Only filled on request.
    pub resolved: Option<Vec<ResolvedMove>>,
}

/// Resolves games on a board it owns.
#[derive(Debug, Clone, Default)]
pub struct Analyzer<B> {
    pub board: B,
    pub mode: ResolveMode,
}

impl<B: GameBoard> Analyzer<B> {
    pub fn new(board: B) -> Analyzer<B> {
        Analyzer {
            board,
            mode: ResolveMode::default(),
        }
    }

    #[must_use]
    pub fn with_mode(mut self, mode: ResolveMode) -> Analyzer<B> {
        self.mode = mode;
        self
    }

    /// Sets up the starting position of a game and resolves its moves.
    ///
    /// With `ignore_moves_if_fen`, a game with a `FEN` tag only gets its
    /// starting position. The buffer provides the source text of errors.
    pub fn analyze(
        &mut self,
        buffer: &Buffer,
        game: &mut RawGame,
        ignore_moves_if_fen: bool,
        fill_resolved: bool,
        counters: &mut Counters,
    ) -> Result<(), PgnError> {
        self.board.reset();
        game.starting_color = self.board.turn();

        let has_fen = match game.fen() {
            Some(text) => {
                let fen = FenPosition::decode(text)
                    .ok()
                    .filter(|fen| fen.apply_to(&mut self.board).is_ok())
                    .ok_or_else(|| game_error(buffer, game, ErrorKind::InvalidFen))?;
                game.starting_color = fen.turn;
                game.starting_position = Some(fen);
                true
            }
            None => false,
        };

        if has_fen && ignore_moves_if_fen {
            game.resolved = fill_resolved.then(Vec::new);
            return Ok(());
        }

        if game.san_moves().is_empty() && game.starting_position.is_none() {
            counters.skipped += 1;
        }

        let sans = game.san_moves.take().unwrap_or_default();
        let result = self.resolve_moves(buffer, game, &sans, fill_resolved, counters);
        game.san_moves = Some(sans);
        let resolution = result?;
        game.move_list = Some(resolution.packed);
        game.resolved = resolution.resolved;
        Ok(())
    }

    /// Resolves moves in order from the current position, stopping before
    /// the first move that cannot be resolved.
    ///
    /// A truncation is counted for a move that matches nothing in
    /// [`ResolveMode::Lenient`] or has an unsupported promotion. Other
    /// failures are errors holding the moves resolved so far.
    pub fn resolve_moves<S: AsRef<str>>(
        &mut self,
        buffer: &Buffer,
        game: &RawGame,
        sans: &[S],
        fill_resolved: bool,
        counters: &mut Counters,
    ) -> Result<Resolution, PgnError> {
        let mut resolution = Resolution {
            packed: Vec::with_capacity(sans.len()),
            resolved: fill_resolved.then(|| Vec::with_capacity(sans.len())),
        };

        for san in sans {
            let san = san.as_ref();
            let kind = match san::resolve(&mut self.board, san) {
                Ok(SanOutcome::Resolved(m)) => {
                    resolution.packed.push(m.packed());
                    if let Some(ref mut resolved) = resolution.resolved {
                        resolved.push(m);
                    }
                    continue;
                }
                Ok(SanOutcome::NoMatch) if self.mode == ResolveMode::Diagnostic => {
                    ErrorKind::NoCompatibleMove(san.to_owned())
                }
                Ok(SanOutcome::NoMatch | SanOutcome::UnsupportedPromotion) => {
                    trace!(san, offset = game.start_offset, "game truncated");
                    counters.truncated += 1;
                    break;
                }
                Err(SanError::Undecodable(san)) => ErrorKind::UndecodableMove(san),
                Err(SanError::Ambiguous(san)) => ErrorKind::AmbiguousMove(san),
            };
            debug!(san, offset = game.start_offset, "move cannot be resolved");
            return Err(game_error(buffer, game, kind).with_moves(resolution.packed));
        }

        Ok(resolution)
    }

    /// Plays a single SAN on the board. Returns `None` if the move is empty
    /// or cannot be resolved.
    pub fn apply_san(&mut self, san: &str) -> Option<ResolvedMove> {
        if san.is_empty() {
            return None;
        }
        match san::resolve(&mut self.board, san) {
            Ok(SanOutcome::Resolved(m)) => Some(m),
            _ => None,
        }
    }
}

fn game_error(buffer: &Buffer, game: &RawGame, kind: ErrorKind) -> PgnError {
    PgnError::new(
        kind,
        game.start_offset,
        buffer.excerpt(game.start_offset, u64::from(game.length)),
    )
}
