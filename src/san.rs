//! Resolve and write Standard Algebraic Notation against a [`GameBoard`].
//!
//! # Examples
//!
//! ```
//! use pgn_resolver::{san::{self, SanOutcome}, ChessBoard, GameBoard};
//!
//! let mut board = ChessBoard::new();
//! let SanOutcome::Resolved(m) = san::resolve(&mut board, "Nf3")? else {
//!     panic!("expected a move");
//! };
//! assert_eq!(m.packed(), 6 + 21 * 256);
//!
//! board.undo_move();
//! assert_eq!(san::render(&mut board, &m.mv, false), "Nf3");
//! # Ok::<_, pgn_resolver::san::SanError>(())
//! ```

use shakmaty::{CastlingSide, File, Piece, Rank, Role, Square};
use thiserror::Error;

use crate::board::{BoardMove, GameBoard, GameState, MoveKind};

/// What happens when no legal move matches a SAN.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum ResolveMode {
    /// The game is truncated before the move.
    #[default]
    Lenient,
    /// The move is reported as an error.
    Diagnostic,
}

/// Errors that abort the resolution regardless of the [`ResolveMode`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SanError {
    #[error("unable to decode position")]
    Undecodable(String),
    #[error("more than one piece found for this move - {0}")]
    Ambiguous(String),
}

/// A committed move with the SAN it was resolved from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedMove {
    pub mv: BoardMove,
    pub san: String,
}

impl ResolvedMove {
    pub fn packed(&self) -> u16 {
        self.mv.packed()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SanOutcome {
    /// Exactly one legal move matched and has been played.
    Resolved(ResolvedMove),
    /// No legal move matched.
    NoMatch,
    /// The promotion suffix is missing or names no piece.
    UnsupportedPromotion,
}

/// Removes capture, check, mate and en passant markers.
pub fn strip_noise(san: &str) -> String {
    san.replace('x', "")
        .replace('#', "")
        .replace("ep", "")
        .replace('+', "")
}

/// A decoded SAN.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum SanPattern {
    Castle(CastlingSide),
    Normal {
        role: Role,
        file: Option<File>,
        rank: Option<Rank>,
        to: Square,
        promotion: Option<Role>,
    },
}

fn file_of(ch: u8) -> Option<File> {
    match ch {
        b'a'..=b'h' => File::from_char(char::from(ch)),
        _ => None,
    }
}

fn rank_of(ch: u8) -> Option<Rank> {
    match ch {
        b'1'..=b'8' => Rank::from_char(char::from(ch)),
        _ => None,
    }
}

fn square_of(file: u8, rank: u8) -> Option<Square> {
    Some(Square::from_coords(file_of(file)?, rank_of(rank)?))
}

impl SanPattern {
    /// Decodes a SAN. Returns `Ok(None)` if the promotion suffix is
    /// missing or names no piece.
    pub fn parse(san: &str) -> Result<Option<SanPattern>, SanError> {
        let undecodable = || SanError::Undecodable(san.to_owned());

        let mut pure = strip_noise(san);
        let mut promotion = None;
        if let Some(index) = pure.find('=') {
            promotion = match pure.as_bytes().get(index + 1) {
                Some(b'Q') => Some(Role::Queen),
                Some(b'R') => Some(Role::Rook),
                Some(b'B') => Some(Role::Bishop),
                Some(b'N') => Some(Role::Knight),
                Some(b'P') => Some(Role::Pawn),
                _ => return Ok(None),
            };
            pure.truncate(index);
        }

        match pure.as_str() {
            "O-O" | "0-0" => return Ok(Some(SanPattern::Castle(CastlingSide::KingSide))),
            "O-O-O" | "0-0-0" => return Ok(Some(SanPattern::Castle(CastlingSide::QueenSide))),
            _ => (),
        }

        let bytes = pure.as_bytes();
        let (role, squares) = match bytes.first() {
            Some(b'K') => (Role::King, &bytes[1..]),
            Some(b'Q') => (Role::Queen, &bytes[1..]),
            Some(b'R') => (Role::Rook, &bytes[1..]),
            Some(b'B') => (Role::Bishop, &bytes[1..]),
            Some(b'N') => (Role::Knight, &bytes[1..]),
            _ => (Role::Pawn, bytes),
        };

        let (file, rank, to) = match *squares {
            [f, r] => (None, None, square_of(f, r)),
            [hint, f, r] => match (file_of(hint), rank_of(hint)) {
                (Some(file), _) => (Some(file), None, square_of(f, r)),
                (None, Some(rank)) => (None, Some(rank), square_of(f, r)),
                (None, None) => return Err(undecodable()),
            },
            [ff, fr, f, r] => (
                Some(file_of(ff).ok_or_else(undecodable)?),
                Some(rank_of(fr).ok_or_else(undecodable)?),
                square_of(f, r),
            ),
            _ => return Err(undecodable()),
        };

        Ok(Some(SanPattern::Normal {
            role,
            file,
            rank,
            to: to.ok_or_else(undecodable)?,
            promotion,
        }))
    }

    /// Tests a legal move of the side to move against the pattern.
    pub fn matches<B: GameBoard>(&self, board: &B, mv: &BoardMove) -> bool {
        match *self {
            SanPattern::Castle(side) => mv.castling_side() == Some(side),
            SanPattern::Normal {
                role,
                file,
                rank,
                to,
                promotion,
            } => {
                mv.to == to
                    && board.piece_at(mv.from) == Some(Piece { color: board.turn(), role })
                    && promotion.is_none_or(|p| mv.promotion() == Some(p))
                    && file.is_none_or(|f| mv.from.file() == f)
                    && rank.is_none_or(|r| mv.from.rank() == r)
            }
        }
    }
}

/// Resolves a SAN for the side to move and plays the unique matching move.
///
/// The board is left untouched unless a move is returned.
pub fn resolve<B: GameBoard>(board: &mut B, san: &str) -> Result<SanOutcome, SanError> {
    let Some(pattern) = SanPattern::parse(san)? else {
        return Ok(SanOutcome::UnsupportedPromotion);
    };

    let mut found = None;
    for mv in board.legal_moves() {
        if pattern.matches(board, &mv) {
            if found.is_some() {
                return Err(SanError::Ambiguous(san.to_owned()));
            }
            found = Some(mv);
        }
    }

    match found {
        Some(mv) if board.apply_move(&mv).is_ok() => Ok(SanOutcome::Resolved(ResolvedMove {
            mv,
            san: san.to_owned(),
        })),
        _ => Ok(SanOutcome::NoMatch),
    }
}

/// Writes the SAN of a legal move, disambiguated against the other legal
/// moves. With `include_ending`, a final result is appended after a mate
/// (` 1-0`, ` 0-1`) or a draw (` 1/2-1/2`).
///
/// The board is left unchanged.
pub fn render<B: GameBoard>(board: &mut B, mv: &BoardMove, include_ending: bool) -> String {
    let mut san = String::new();

    if let Some(side) = mv.castling_side() {
        san.push_str(match side {
            CastlingSide::KingSide => "O-O",
            CastlingSide::QueenSide => "O-O-O",
        });
    } else {
        let mover = board.piece_at(mv.from);
        let (mut rivals, mut same_file, mut same_rank) = (false, false, false);
        for other in board.legal_moves() {
            if other.to == mv.to && other.from != mv.from && board.piece_at(other.from) == mover {
                rivals = true;
                same_file |= other.from.file() == mv.from.file();
                same_rank |= other.from.rank() == mv.from.rank();
            }
        }
        // file first, then rank, then both
        let need_file = rivals && (!same_file || same_rank);
        let need_rank = same_file;

        if mv.role != Role::Pawn {
            san.push(mv.role.upper_char());
        }
        if need_file {
            san.push(mv.from.file().char());
        }
        if need_rank {
            san.push(mv.from.rank().char());
        }
        if mv.is_capture() {
            if mv.role == Role::Pawn && !need_file && !need_rank {
                san.push(mv.from.file().char());
            }
            san.push('x');
        }
        san.push_str(&mv.to.to_string());
        if let Some(role) = mv.promotion() {
            san.push('=');
            san.push(role.upper_char());
        }
    }

    let mover = board.turn();
    if board.apply_move(mv).is_ok() {
        match board.state() {
            GameState::Check => san.push('+'),
            GameState::Checkmate => {
                san.push('#');
                if include_ending {
                    san.push_str(mover.fold_wb(" 1-0", " 0-1"));
                }
            }
            GameState::Stalemate | GameState::InsufficientMaterial => {
                if include_ending {
                    san.push_str(" 1/2-1/2");
                }
            }
            GameState::Ongoing => (),
        }
        board.undo_move();
    }

    san
}

/// Writes the SANs of a sequence of moves played from the current position.
///
/// The board is left unchanged. Rendering stops before the first illegal
/// move.
pub fn render_line<B: GameBoard>(board: &mut B, moves: &[BoardMove]) -> Vec<String> {
    let mut line = Vec::with_capacity(moves.len());
    for mv in moves {
        let san = render(board, mv, false);
        if board.apply_move(mv).is_err() {
            break;
        }
        line.push(san);
    }
    for _ in 0..line.len() {
        board.undo_move();
    }
    line
}

#[cfg(test)]
mod tests {
    use shakmaty::{san::San, Color, Position};

    use super::*;
    use crate::{board::ChessBoard, fen::FenPosition};

    fn board(fen: &str) -> ChessBoard {
        let mut board = ChessBoard::new();
        FenPosition::decode(fen)
            .unwrap()
            .apply_to(&mut board)
            .unwrap();
        board
    }

    fn resolved(board: &mut ChessBoard, san: &str) -> BoardMove {
        match resolve(board, san) {
            Ok(SanOutcome::Resolved(m)) => m.mv,
            other => panic!("{san}: {other:?}"),
        }
    }

    #[test]
    fn test_strip_noise() {
        assert_eq!(strip_noise("Nxe5+"), "Ne5");
        assert_eq!(strip_noise("exd6ep"), "ed6");
        assert_eq!(strip_noise("Qxf7#"), "Qf7");
        assert_eq!(strip_noise("bxa8=Q+"), "ba8=Q");
    }

    #[test]
    fn test_parse() {
        assert_eq!(
            SanPattern::parse("Nbd7").unwrap(),
            Some(SanPattern::Normal {
                role: Role::Knight,
                file: Some(File::B),
                rank: None,
                to: Square::D7,
                promotion: None,
            })
        );
        assert_eq!(
            SanPattern::parse("R1xa3").unwrap(),
            Some(SanPattern::Normal {
                role: Role::Rook,
                file: None,
                rank: Some(Rank::First),
                to: Square::A3,
                promotion: None,
            })
        );
        assert_eq!(
            SanPattern::parse("exf8=N+").unwrap(),
            Some(SanPattern::Normal {
                role: Role::Pawn,
                file: Some(File::E),
                rank: None,
                to: Square::F8,
                promotion: Some(Role::Knight),
            })
        );
        assert_eq!(
            SanPattern::parse("Qh4e1").unwrap(),
            Some(SanPattern::Normal {
                role: Role::Queen,
                file: Some(File::H),
                rank: Some(Rank::Fourth),
                to: Square::E1,
                promotion: None,
            })
        );
        assert_eq!(
            SanPattern::parse("O-O-O+").unwrap(),
            Some(SanPattern::Castle(CastlingSide::QueenSide))
        );
    }

    #[test]
    fn test_unsupported_promotion() {
        assert_eq!(SanPattern::parse("e8=").unwrap(), None);
        assert_eq!(SanPattern::parse("e8=K").unwrap(), None);
        let mut board = ChessBoard::new();
        assert_eq!(resolve(&mut board, "e8=X"), Ok(SanOutcome::UnsupportedPromotion));
    }

    #[test]
    fn test_undecodable() {
        for san in ["", "N", "Nz4", "e9", "Ni4", "Nbb", "Qa1b2c3", "9e4", "Q1ae4"] {
            assert_eq!(
                SanPattern::parse(san),
                Err(SanError::Undecodable(san.to_owned())),
                "{san}"
            );
        }
    }

    #[test]
    fn test_resolve_opening() {
        let mut board = ChessBoard::new();
        for (san, packed) in [
            ("e4", 12 + 28 * 256),
            ("e5", 52 + 36 * 256),
            ("Nf3", 6 + 21 * 256),
            ("Nc6", 57 + 42 * 256),
            ("Bb5", 5 + 33 * 256),
        ] {
            match resolve(&mut board, san).unwrap() {
                SanOutcome::Resolved(m) => {
                    assert_eq!(m.packed(), packed, "{san}");
                    assert_eq!(m.san, san);
                }
                other => panic!("{san}: {other:?}"),
            }
        }
        assert_eq!(board.turn(), Color::Black);
    }

    #[test]
    fn test_knight_disambiguation() {
        // knights on b8 and f6 both reach d7
        let fen = "rn2kb1r/ppp2ppp/5n2/8/8/8/PPPPPPPP/RNBQKBNR b KQkq - 0 1";
        let mut b = board(fen);
        let mv = resolved(&mut b, "Nbd7");
        assert_eq!((mv.from, mv.to), (Square::B8, Square::D7));

        let mut b = board(fen);
        assert_eq!(resolve(&mut b, "Nd7"), Err(SanError::Ambiguous("Nd7".to_owned())));
        assert_eq!(b.history_len(), 0);

        let mut b = board("r3kb1r/ppp2ppp/1n3n2/8/8/8/PPPPPPPP/RNBQKBNR b KQkq - 0 1");
        assert_eq!(
            resolve(&mut b, "Nbd7"),
            Ok(SanOutcome::Resolved(ResolvedMove {
                mv: BoardMove {
                    from: Square::B6,
                    to: Square::D7,
                    role: Role::Knight,
                    capture: None,
                    kind: MoveKind::Normal,
                },
                san: "Nbd7".to_owned(),
            }))
        );

        let mut b = board("r3kb1r/ppp2ppp/5n2/8/8/8/PPPPPPPP/RNBQKBNR b KQkq - 0 1");
        assert_eq!(resolve(&mut b, "Nbd7"), Ok(SanOutcome::NoMatch));

        // d7 is taken by the queen
        let mut b = board("rn2kb1r/pppq1ppp/5n2/8/8/8/PPPPPPPP/RNBQKBNR b KQkq - 0 1");
        assert_eq!(resolve(&mut b, "Nbd7"), Ok(SanOutcome::NoMatch));
        assert_eq!(b.turn(), Color::Black);
    }

    #[test]
    fn test_castling_symmetry() {
        let fen = "r3k2r/pppppppp/8/8/8/8/PPPPPPPP/R3K2R w KQkq - 0 1";
        for (turn, back) in [("w", 0u32), ("b", 7)] {
            let fen = fen.replace(" w ", &format!(" {turn} "));
            for (san, side, to) in [
                ("O-O", CastlingSide::KingSide, File::G),
                ("O-O-O", CastlingSide::QueenSide, File::C),
            ] {
                let mut b = board(&fen);
                let mv = resolved(&mut b, san);
                assert_eq!(mv.kind, MoveKind::Castle);
                assert_eq!(mv.castling_side(), Some(side));
                assert_eq!(u32::from(mv.from.rank()), back);
                assert_eq!(mv.from.file(), File::E);
                assert_eq!(mv.to.file(), to);
            }
        }
    }

    #[test]
    fn test_castling_unavailable() {
        let mut b = ChessBoard::new();
        assert_eq!(resolve(&mut b, "O-O"), Ok(SanOutcome::NoMatch));
    }

    #[test]
    fn test_promotion() {
        let mut b = board("8/4P1k1/8/8/8/8/8/4K3 w - - 0 1");
        let mv = resolved(&mut b, "e8=N+");
        assert_eq!(mv.kind, MoveKind::Promotion(Role::Knight));
        b.undo_move();
        // without a suffix every promotion matches
        assert_eq!(resolve(&mut b, "e8"), Err(SanError::Ambiguous("e8".to_owned())));
    }

    #[test]
    fn test_en_passant() {
        let mut b = board("4k3/8/8/3pP3/8/8/8/4K3 w - d6 0 2");
        let mv = resolved(&mut b, "exd6ep");
        assert_eq!(mv.kind, MoveKind::EnPassant);
        assert_eq!(b.piece_at(Square::D5), None);
    }

    #[test]
    fn test_render() {
        let mut b = board("r3k2r/8/8/8/8/2N3N1/8/R3K2R w KQkq - 0 1");
        let find = |b: &ChessBoard, from, to| {
            b.legal_moves()
                .into_iter()
                .find(|m| m.from == from && m.to == to)
                .unwrap()
        };
        let mv = find(&b, Square::C3, Square::E4);
        assert_eq!(render(&mut b, &mv, false), "Nce4");
        let mv = find(&b, Square::A1, Square::A8);
        assert_eq!(render(&mut b, &mv, false), "Rxa8+");
        let mv = find(&b, Square::E1, Square::C1);
        assert_eq!(render(&mut b, &mv, false), "O-O-O");
        let mv = find(&b, Square::H1, Square::H8);
        assert_eq!(render(&mut b, &mv, false), "Rxh8+");
        assert_eq!(b.history_len(), 0);
    }

    #[test]
    fn test_render_rank_disambiguation() {
        let mut b = board("4k3/8/8/R7/8/8/8/R3K3 w - - 0 1");
        let mv = b
            .legal_moves()
            .into_iter()
            .find(|m| m.from == Square::A1 && m.to == Square::A3)
            .unwrap();
        assert_eq!(render(&mut b, &mv, false), "R1a3");
    }

    #[test]
    fn test_render_mate() {
        let mut b = ChessBoard::new();
        let line: Vec<BoardMove> = ["f3", "e5", "g4"]
            .iter()
            .map(|san| resolved(&mut b, san))
            .collect();
        let mate = b
            .legal_moves()
            .into_iter()
            .find(|m| m.to == Square::H4)
            .unwrap();
        assert_eq!(render(&mut b, &mate, false), "Qh4#");
        assert_eq!(render(&mut b, &mate, true), "Qh4# 0-1");

        for _ in 0..line.len() {
            b.undo_move();
        }
        assert_eq!(render_line(&mut b, &line), ["f3", "e5", "g4"]);
        assert_eq!(b.history_len(), 0);
    }

    #[test]
    fn test_render_matches_engine() {
        let mut b = ChessBoard::new();
        for san in ["e4", "d5", "exd5", "Qxd5", "Nc3", "Qa5", "d4", "c6", "Nf3", "Bg4"] {
            resolved(&mut b, san);
        }
        let pos = b.position().clone();
        for m in pos.legal_moves() {
            let expected = San::from_move(&pos, &m).to_string();
            let mv = b
                .legal_moves()
                .into_iter()
                .find(|c| Some(c.from) == m.from() && c.to == m.to() && c.promotion() == m.promotion())
                .unwrap();
            assert_eq!(render(&mut b, &mv, false).trim_end_matches('+'), expected);
        }
    }
}
