//! The rules engine consumed by the resolver.
//!
//! Move generation, move application and game state detection are delegated
//! to an implementation of [`GameBoard`]. [`ChessBoard`] is the standard
//! implementation, backed by [`shakmaty::Chess`].

use std::num::NonZeroU32;

use arrayvec::ArrayVec;
use bitflags::bitflags;
use shakmaty::{
    Bitboard, CastlingMode, CastlingSide, Chess, Color, EnPassantMode, FromSetup, Move, Piece,
    Position, PositionError, Role, Setup, Square,
};
use thiserror::Error;

/// Packs a move as `from + to * 256`.
#[inline]
pub fn pack(from: Square, to: Square) -> u16 {
    (u32::from(from) + (u32::from(to) << 8)) as u16
}

/// Inverse of [`pack()`].
pub fn unpack(packed: u16) -> Option<(Square, Square)> {
    let from = Square::try_from(u32::from(packed & 0xff)).ok()?;
    let to = Square::try_from(u32::from(packed >> 8)).ok()?;
    Some((from, to))
}

/// Kind of a [`BoardMove`].
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum MoveKind {
    Normal,
    /// The king moves two files towards the rook.
    Castle,
    EnPassant,
    /// A pawn move to the last rank, with the promoted role.
    Promotion(Role),
}

/// A legal move as seen by the resolver.
///
/// Castling moves are given by the start and destination square of the king
/// (e.g. `e1` to `g1`).
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub struct BoardMove {
    pub from: Square,
    pub to: Square,
    pub role: Role,
    pub capture: Option<Role>,
    pub kind: MoveKind,
}

impl BoardMove {
    /// The compact `from + to * 256` encoding.
    #[inline]
    pub fn packed(&self) -> u16 {
        pack(self.from, self.to)
    }

    pub fn promotion(&self) -> Option<Role> {
        match self.kind {
            MoveKind::Promotion(role) => Some(role),
            _ => None,
        }
    }

    pub fn is_capture(&self) -> bool {
        self.capture.is_some()
    }

    pub fn castling_side(&self) -> Option<CastlingSide> {
        match self.kind {
            MoveKind::Castle => Some(CastlingSide::from_king_side(self.from.file() < self.to.file())),
            _ => None,
        }
    }

    fn from_engine(m: &Move) -> Option<BoardMove> {
        Some(match *m {
            Move::Normal {
                role,
                from,
                capture,
                to,
                promotion,
            } => BoardMove {
                from,
                to,
                role,
                capture,
                kind: promotion.map_or(MoveKind::Normal, MoveKind::Promotion),
            },
            Move::EnPassant { from, to } => BoardMove {
                from,
                to,
                role: Role::Pawn,
                capture: Some(Role::Pawn),
                kind: MoveKind::EnPassant,
            },
            Move::Castle { king, rook } => {
                let side = CastlingSide::from_king_side(king < rook);
                BoardMove {
                    from: king,
                    to: Square::from_coords(side.king_to_file(), king.rank()),
                    role: Role::King,
                    capture: None,
                    kind: MoveKind::Castle,
                }
            }
            Move::Put { .. } => return None,
        })
    }

    fn matches(&self, other: &BoardMove) -> bool {
        self.from == other.from && self.to == other.to && self.promotion() == other.promotion()
    }
}

bitflags! {
    /// Castling rights.
    #[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Default)]
    pub struct CastlingMask: u8 {
        const WHITE_KING = 1;
        const WHITE_QUEEN = 2;
        const BLACK_KING = 4;
        const BLACK_QUEEN = 8;
    }
}

impl CastlingMask {
    pub fn flag(color: Color, side: CastlingSide) -> CastlingMask {
        match (color, side) {
            (Color::White, CastlingSide::KingSide) => CastlingMask::WHITE_KING,
            (Color::White, CastlingSide::QueenSide) => CastlingMask::WHITE_QUEEN,
            (Color::Black, CastlingSide::KingSide) => CastlingMask::BLACK_KING,
            (Color::Black, CastlingSide::QueenSide) => CastlingMask::BLACK_QUEEN,
        }
    }

    /// Corner squares of the rooks that keep castling rights.
    pub fn rooks(self) -> Bitboard {
        [
            (CastlingMask::WHITE_KING, Square::H1),
            (CastlingMask::WHITE_QUEEN, Square::A1),
            (CastlingMask::BLACK_KING, Square::H8),
            (CastlingMask::BLACK_QUEEN, Square::A8),
        ]
        .into_iter()
        .filter(|&(flag, _)| self.contains(flag))
        .map(|(_, sq)| sq)
        .collect()
    }
}

/// Outcome of the position for the side to move.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum GameState {
    Ongoing,
    Check,
    Checkmate,
    Stalemate,
    InsufficientMaterial,
}

#[derive(Debug, Error)]
pub enum BoardError {
    #[error("board is not in design mode")]
    NotInDesignMode,
    #[error("illegal move {from}{to}")]
    IllegalMove { from: Square, to: Square },
    #[error("invalid position: {0}")]
    InvalidPosition(#[from] PositionError<Chess>),
}

/// Legal moves of a position.
pub type MoveList = ArrayVec<BoardMove, 256>;

/// The board operations the resolver and the FEN decoder rely on.
///
/// Each pipeline worker owns its own board, so implementations only need to
/// be [`Send`].
pub trait GameBoard: Clone + Default + Send {
    /// Sets up the standard starting position and forgets the history.
    fn reset(&mut self);

    /// The side to move.
    fn turn(&self) -> Color;

    fn piece_at(&self, sq: Square) -> Option<Piece>;

    /// Legal moves for the side to move.
    fn legal_moves(&self) -> MoveList;

    /// Plays a legal move, matched by origin, destination and promotion.
    fn apply_move(&mut self, mv: &BoardMove) -> Result<(), BoardError>;

    /// Takes back the last move played with
    /// [`apply_move()`](Self::apply_move).
    fn undo_move(&mut self) -> Option<BoardMove>;

    fn state(&self) -> GameState;

    fn castling(&self) -> CastlingMask;

    fn ep_square(&self) -> Option<Square>;

    fn halfmoves(&self) -> u32;

    fn fullmoves(&self) -> u32;

    /// Starts editing an empty board. Pieces can be placed freely until
    /// [`close_design_mode()`](Self::close_design_mode) validates the
    /// result.
    fn open_design_mode(&mut self);

    fn set_piece_at(&mut self, sq: Square, piece: Option<Piece>) -> Result<(), BoardError>;

    fn set_move_counters(&mut self, halfmoves: u32, fullmoves: u32) -> Result<(), BoardError>;

    /// Finishes editing. On error the board keeps its previous position.
    fn close_design_mode(
        &mut self,
        turn: Color,
        castling: CastlingMask,
        ep_square: Option<Square>,
    ) -> Result<(), BoardError>;
}

/// A standard chess board with undo history.
#[derive(Debug, Clone, Default)]
pub struct ChessBoard {
    pos: Chess,
    history: Vec<(Chess, BoardMove)>,
    design: Option<Setup>,
}

impl ChessBoard {
    pub fn new() -> ChessBoard {
        ChessBoard::default()
    }

    /// The underlying position.
    pub fn position(&self) -> &Chess {
        &self.pos
    }

    /// Number of moves that can be taken back.
    pub fn history_len(&self) -> usize {
        self.history.len()
    }

    fn design_mut(&mut self) -> Result<&mut Setup, BoardError> {
        self.design.as_mut().ok_or(BoardError::NotInDesignMode)
    }
}

impl From<Chess> for ChessBoard {
    fn from(pos: Chess) -> ChessBoard {
        ChessBoard {
            pos,
            history: Vec::new(),
            design: None,
        }
    }
}

impl GameBoard for ChessBoard {
    fn reset(&mut self) {
        self.pos = Chess::default();
        self.history.clear();
        self.design = None;
    }

    fn turn(&self) -> Color {
        self.pos.turn()
    }

    fn piece_at(&self, sq: Square) -> Option<Piece> {
        self.pos.board().piece_at(sq)
    }

    fn legal_moves(&self) -> MoveList {
        self.pos
            .legal_moves()
            .iter()
            .filter_map(BoardMove::from_engine)
            .collect()
    }

    fn apply_move(&mut self, mv: &BoardMove) -> Result<(), BoardError> {
        let legal = self.pos.legal_moves();
        let (m, played) = legal
            .iter()
            .find_map(|m| {
                BoardMove::from_engine(m)
                    .filter(|candidate| candidate.matches(mv))
                    .map(|candidate| (m, candidate))
            })
            .ok_or(BoardError::IllegalMove {
                from: mv.from,
                to: mv.to,
            })?;
        self.history.push((self.pos.clone(), played));
        self.pos.play_unchecked(m);
        Ok(())
    }

    fn undo_move(&mut self) -> Option<BoardMove> {
        let (pos, mv) = self.history.pop()?;
        self.pos = pos;
        Some(mv)
    }

    fn state(&self) -> GameState {
        if self.pos.is_checkmate() {
            GameState::Checkmate
        } else if self.pos.is_stalemate() {
            GameState::Stalemate
        } else if self.pos.is_insufficient_material() {
            GameState::InsufficientMaterial
        } else if self.pos.is_check() {
            GameState::Check
        } else {
            GameState::Ongoing
        }
    }

    fn castling(&self) -> CastlingMask {
        let castles = self.pos.castles();
        let mut mask = CastlingMask::empty();
        for color in Color::ALL {
            for side in CastlingSide::ALL {
                if castles.has(color, side) {
                    mask |= CastlingMask::flag(color, side);
                }
            }
        }
        mask
    }

    fn ep_square(&self) -> Option<Square> {
        self.pos.ep_square(EnPassantMode::Always)
    }

    fn halfmoves(&self) -> u32 {
        self.pos.halfmoves()
    }

    fn fullmoves(&self) -> u32 {
        self.pos.fullmoves().get()
    }

    fn open_design_mode(&mut self) {
        self.design = Some(Setup::empty());
    }

    fn set_piece_at(&mut self, sq: Square, piece: Option<Piece>) -> Result<(), BoardError> {
        let board = &mut self.design_mut()?.board;
        match piece {
            Some(piece) => board.set_piece_at(sq, piece),
            None => {
                board.remove_piece_at(sq);
            }
        }
        Ok(())
    }

    fn set_move_counters(&mut self, halfmoves: u32, fullmoves: u32) -> Result<(), BoardError> {
        let setup = self.design_mut()?;
        setup.halfmoves = halfmoves;
        setup.fullmoves = NonZeroU32::new(fullmoves).unwrap_or(NonZeroU32::MIN);
        Ok(())
    }

    fn close_design_mode(
        &mut self,
        turn: Color,
        castling: CastlingMask,
        ep_square: Option<Square>,
    ) -> Result<(), BoardError> {
        let mut setup = self.design.take().ok_or(BoardError::NotInDesignMode)?;
        setup.turn = turn;
        setup.castling_rights = castling.rooks();
        setup.ep_square = ep_square;
        let pos = Chess::from_setup(setup, CastlingMode::Standard)
            .or_else(PositionError::ignore_invalid_castling_rights)
            .or_else(PositionError::ignore_invalid_ep_square)?;
        self.pos = pos;
        self.history.clear();
        Ok(())
    }
}
