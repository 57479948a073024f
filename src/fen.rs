//! Parse and write Forsyth-Edwards Notation.
//!
//! # Examples
//!
//! ```
//! use pgn_resolver::{fen::FenPosition, ChessBoard, GameBoard};
//!
//! let fen: FenPosition = "8/8/8/8/8/8/8/4K2k b - - 12 40".parse()?;
//! let mut board = ChessBoard::new();
//! fen.apply_to(&mut board)?;
//! assert_eq!(board.fullmoves(), 40);
//! assert_eq!(FenPosition::from_board(&board).to_string(), "8/8/8/8/8/8/8/4K2k b - - 12 40");
//! # Ok::<_, Box<dyn std::error::Error>>(())
//! ```

use std::{fmt, str::FromStr};

use shakmaty::{Color, File, Piece, Rank, Square};
use thiserror::Error;

use crate::board::{BoardError, CastlingMask, GameBoard};

/// FEN of the standard starting position.
pub const STARTING_FEN: &str = "rnbqkbnr/pppppppp/8/8/8/8/PPPPPPPP/RNBQKBNR w KQkq - 0 1";

/// Errors that can occur when decoding FEN text.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FenError {
    #[error("expected 6 fields, found {0}")]
    FieldCount(usize),
    #[error("expected 8 ranks, found {0}")]
    RankCount(usize),
    #[error("rank {0} does not span 8 squares")]
    RankWidth(char),
    #[error("invalid piece character '{0}'")]
    InvalidPiece(char),
    #[error("invalid side to move")]
    InvalidTurn,
}

/// The board primitives described by a FEN.
///
/// Decoding only checks the syntax. Whether the placement is playable is
/// decided by the board in [`FenPosition::apply_to()`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FenPosition {
    /// Indexed by square, `a1` first.
    pub placement: [Option<Piece>; 64],
    pub turn: Color,
    pub castling: CastlingMask,
    pub ep_square: Option<Square>,
    pub halfmoves: u32,
    pub fullmoves: u32,
}

impl Default for FenPosition {
    fn default() -> FenPosition {
        FenPosition {
            placement: [None; 64],
            turn: Color::White,
            castling: CastlingMask::empty(),
            ep_square: None,
            halfmoves: 0,
            fullmoves: 1,
        }
    }
}

impl FenPosition {
    /// Decodes a FEN. The en passant square and the move counters are
    /// lenient: invalid values fall back to none, `0` and `1`.
    pub fn decode(fen: &str) -> Result<FenPosition, FenError> {
        let fields: Vec<&str> = fen.trim().split(' ').collect();
        let &[placement, turn, castling, ep_square, halfmoves, fullmoves] = &fields[..] else {
            return Err(FenError::FieldCount(fields.len()));
        };

        let mut pos = FenPosition::default();

        let ranks: Vec<&str> = placement.split('/').collect();
        if ranks.len() != 8 {
            return Err(FenError::RankCount(ranks.len()));
        }
        for (rank, text) in Rank::ALL.into_iter().rev().zip(ranks) {
            let mut file = 0u32;
            for ch in text.chars() {
                let width = match ch {
                    '1'..='8' => u32::from(ch) - u32::from('0'),
                    _ => 1,
                };
                if file + width > 8 {
                    return Err(FenError::RankWidth(rank.char()));
                }
                if width == 1 && !ch.is_ascii_digit() {
                    let piece = Piece::from_char(ch).ok_or(FenError::InvalidPiece(ch))?;
                    let sq = Square::from_coords(File::new(file), rank);
                    pos.placement[usize::from(sq)] = Some(piece);
                } else if !('1'..='8').contains(&ch) {
                    return Err(FenError::InvalidPiece(ch));
                }
                file += width;
            }
            if file != 8 {
                return Err(FenError::RankWidth(rank.char()));
            }
        }

        pos.turn = match turn {
            "w" => Color::White,
            "b" => Color::Black,
            _ => return Err(FenError::InvalidTurn),
        };

        for ch in castling.chars() {
            pos.castling |= match ch {
                'K' => CastlingMask::WHITE_KING,
                'Q' => CastlingMask::WHITE_QUEEN,
                'k' => CastlingMask::BLACK_KING,
                'q' => CastlingMask::BLACK_QUEEN,
                _ => CastlingMask::empty(),
            };
        }

        pos.ep_square = ep_square.parse().ok();
        pos.halfmoves = halfmoves.parse().unwrap_or(0);
        pos.fullmoves = fullmoves.parse().unwrap_or(1);
        Ok(pos)
    }

    /// Reads the position of a board.
    pub fn from_board<B: GameBoard>(board: &B) -> FenPosition {
        let mut placement = [None; 64];
        for sq in Square::ALL {
            placement[usize::from(sq)] = board.piece_at(sq);
        }
        FenPosition {
            placement,
            turn: board.turn(),
            castling: board.castling(),
            ep_square: board.ep_square(),
            halfmoves: board.halfmoves(),
            fullmoves: board.fullmoves(),
        }
    }

    pub fn piece_at(&self, sq: Square) -> Option<Piece> {
        self.placement[usize::from(sq)]
    }

    /// Sets up the board through its design mode.
    pub fn apply_to<B: GameBoard>(&self, board: &mut B) -> Result<(), BoardError> {
        board.open_design_mode();
        for sq in Square::ALL {
            board.set_piece_at(sq, self.piece_at(sq))?;
        }
        board.set_move_counters(self.halfmoves, self.fullmoves)?;
        board.close_design_mode(self.turn, self.castling, self.ep_square)
    }
}

impl FromStr for FenPosition {
    type Err = FenError;

    fn from_str(fen: &str) -> Result<FenPosition, FenError> {
        FenPosition::decode(fen)
    }
}

impl fmt::Display for FenPosition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for rank in Rank::ALL.into_iter().rev() {
            let mut empty = 0;
            for file in File::ALL {
                match self.piece_at(Square::from_coords(file, rank)) {
                    Some(piece) => {
                        if empty > 0 {
                            write!(f, "{empty}")?;
                            empty = 0;
                        }
                        write!(f, "{}", piece.char())?;
                    }
                    None => empty += 1,
                }
            }
            if empty > 0 {
                write!(f, "{empty}")?;
            }
            if rank > Rank::First {
                f.write_str("/")?;
            }
        }

        write!(f, " {} ", self.turn.char())?;

        if self.castling.is_empty() {
            f.write_str("-")?;
        } else {
            for (flag, ch) in [
                (CastlingMask::WHITE_KING, 'K'),
                (CastlingMask::WHITE_QUEEN, 'Q'),
                (CastlingMask::BLACK_KING, 'k'),
                (CastlingMask::BLACK_QUEEN, 'q'),
            ] {
                if self.castling.contains(flag) {
                    write!(f, "{ch}")?;
                }
            }
        }

        match self.ep_square {
            Some(sq) => write!(f, " {sq}")?,
            None => f.write_str(" -")?,
        }

        write!(f, " {} {}", self.halfmoves, self.fullmoves)
    }
}

/// Writes the FEN of a board.
pub fn encode<B: GameBoard>(board: &B) -> String {
    FenPosition::from_board(board).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::board::ChessBoard;

    #[test]
    fn test_starting_fen() {
        let pos = FenPosition::decode(STARTING_FEN).unwrap();
        assert_eq!(pos.piece_at(Square::E1), Some(Color::White.king()));
        assert_eq!(pos.piece_at(Square::D8), Some(Color::Black.queen()));
        assert_eq!(pos.piece_at(Square::E4), None);
        assert_eq!(pos.turn, Color::White);
        assert_eq!(pos.castling, CastlingMask::all());
        assert_eq!(pos.to_string(), STARTING_FEN);
        assert_eq!(encode(&ChessBoard::new()), STARTING_FEN);
    }

    #[test]
    fn test_invalid_fen() {
        for (fen, err) in [
            ("8/8/8/8/8/8/8/8 w - - 0", FenError::FieldCount(5)),
            ("8/8/8/8/8/8/8 w - - 0 1", FenError::RankCount(7)),
            ("8/8/8/8/8/8/8/7 w - - 0 1", FenError::RankWidth('1')),
            ("8/8/8/8/8/8/8/44p w - - 0 1", FenError::RankWidth('1')),
            ("9/8/8/8/8/8/8/8 w - - 0 1", FenError::InvalidPiece('9')),
            ("8/8/8/8/8/8/8/7x w - - 0 1", FenError::InvalidPiece('x')),
            ("8/8/8/8/8/8/8/8 x - - 0 1", FenError::InvalidTurn),
        ] {
            assert_eq!(FenPosition::decode(fen), Err(err), "{fen}");
        }
    }

    #[test]
    fn test_lenient_fields() {
        let pos = FenPosition::decode("4k3/8/8/8/8/8/8/4K3 b KXq z9 foo bar").unwrap();
        assert_eq!(pos.turn, Color::Black);
        assert_eq!(pos.castling, CastlingMask::WHITE_KING | CastlingMask::BLACK_QUEEN);
        assert_eq!(pos.ep_square, None);
        assert_eq!((pos.halfmoves, pos.fullmoves), (0, 1));
    }

    #[test]
    fn test_apply_to() {
        let fen = "r3k2r/8/8/3pP3/8/8/8/R3K2R w KQkq d6 0 24";
        let pos = FenPosition::decode(fen).unwrap();
        let mut board = ChessBoard::new();
        pos.apply_to(&mut board).unwrap();
        assert_eq!(board.castling(), CastlingMask::all());
        assert_eq!(board.ep_square(), Some(Square::D6));
        assert_eq!(board.fullmoves(), 24);
        assert_eq!(encode(&board), fen);
    }

    #[test]
    fn test_empty_board_is_rejected_by_the_board() {
        let pos = FenPosition::decode("8/8/8/8/8/8/8/8 w - - 0 1").unwrap();
        assert!(pos.placement.iter().all(Option::is_none));
        let mut board = ChessBoard::new();
        assert!(matches!(
            pos.apply_to(&mut board),
            Err(BoardError::InvalidPosition(_))
        ));
    }
}
