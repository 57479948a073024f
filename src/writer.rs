//! Write games as PGN text.

use std::{
    io::{self, Write},
    time::Duration,
};

use shakmaty::Color;

use crate::{
    board::{BoardMove, GameBoard, GameState},
    buffer::Buffer,
    fen::{self, STARTING_FEN},
    game::{encode_time_control, PlayerType, RawGame},
    san,
};

/// Copies the source text of a game.
pub fn write_raw_game<W: Write>(buffer: &Buffer, game: &RawGame, writer: &mut W) -> io::Result<()> {
    let bytes = buffer
        .get_bytes_at(game.start_offset, game.length as usize)
        .map_err(|err| io::Error::new(io::ErrorKind::InvalidInput, err))?;
    writer.write_all(&bytes)
}

/// Tag values of a written game.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GameHeader {
    pub event: String,
    pub site: String,
    pub date: String,
    pub round: String,
    pub white: String,
    pub black: String,
    pub white_type: PlayerType,
    pub black_type: PlayerType,
    pub white_time: Duration,
    pub black_time: Duration,
}

impl Default for GameHeader {
    fn default() -> GameHeader {
        GameHeader {
            event: "?".to_owned(),
            site: "?".to_owned(),
            date: "????.??.??".to_owned(),
            round: "?".to_owned(),
            white: "Player 1".to_owned(),
            black: "Player 2".to_owned(),
            white_type: PlayerType::Human,
            black_type: PlayerType::Human,
            white_time: Duration::ZERO,
            black_time: Duration::ZERO,
        }
    }
}

impl GameHeader {
    /// Takes the tags of a parsed game, with defaults for missing ones.
    pub fn from_game(game: &RawGame) -> GameHeader {
        let defaults = GameHeader::default();
        let tag = |value: Option<&str>, default: String| value.map_or(default, str::to_owned);
        GameHeader {
            event: tag(game.event(), defaults.event),
            site: tag(game.site(), defaults.site),
            date: tag(game.date(), defaults.date),
            round: tag(game.round(), defaults.round),
            white: tag(game.white(), defaults.white),
            black: tag(game.black(), defaults.black),
            white_type: game.white_type(),
            black_type: game.black_type(),
            white_time: game.white_time(),
            black_time: game.black_time(),
        }
    }
}

fn result(state: GameState, turn: Color) -> &'static str {
    match state {
        GameState::Checkmate => turn.fold_wb("0-1", "1-0"),
        GameState::Stalemate | GameState::InsufficientMaterial => "1/2-1/2",
        GameState::Ongoing | GameState::Check => "*",
    }
}

/// Writes a game played from `board` as PGN.
///
/// The `SetUp` and `FEN` tags are written if the game does not start from
/// the standard position. Movetext lines are wrapped after 60 characters.
/// Fails with [`io::ErrorKind::InvalidInput`] if a move is not legal.
pub fn write_game<W: Write, B: GameBoard>(
    writer: &mut W,
    board: &B,
    moves: &[BoardMove],
    header: &GameHeader,
) -> io::Result<()> {
    let mut board = board.clone();
    let start_fen = fen::encode(&board);
    let start_turn = board.turn();
    let start_number = board.fullmoves();

    let sans = san::render_line(&mut board, moves);
    if sans.len() != moves.len() {
        return Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("illegal move at ply {}", sans.len() + 1),
        ));
    }
    for mv in moves {
        board.apply_move(mv).map_err(|err| io::Error::new(io::ErrorKind::InvalidInput, err))?;
    }
    let result = result(board.state(), board.turn());

    writeln!(writer, "[Event \"{}\"]", header.event)?;
    writeln!(writer, "[Site \"{}\"]", header.site)?;
    writeln!(writer, "[Date \"{}\"]", header.date)?;
    writeln!(writer, "[Round \"{}\"]", header.round)?;
    writeln!(writer, "[White \"{}\"]", header.white)?;
    writeln!(writer, "[Black \"{}\"]", header.black)?;
    writeln!(writer, "[Result \"{result}\"]")?;
    if start_fen != STARTING_FEN {
        writeln!(writer, "[SetUp \"1\"]")?;
        writeln!(writer, "[FEN \"{start_fen}\"]")?;
    }
    writeln!(writer, "[WhiteType \"{}\"]", header.white_type.as_str())?;
    writeln!(writer, "[BlackType \"{}\"]", header.black_type.as_str())?;
    writeln!(
        writer,
        "[TimeControl \"{}\"]",
        encode_time_control(header.white_time, header.black_time)
    )?;
    writeln!(writer)?;

    let mut line = String::new();
    let mut number = start_number;
    let mut white = start_turn.is_white();
    for (ply, san) in sans.iter().enumerate() {
        if line.len() > 60 {
            writeln!(writer, "{}", line.trim_end())?;
            line.clear();
        }
        if white {
            line.push_str(&format!("{number}. "));
        } else if ply == 0 {
            line.push_str(&format!("{number}... "));
        }
        line.push_str(san);
        line.push(' ');
        if !white {
            number += 1;
        }
        white = !white;
    }
    line.push_str(result);
    writeln!(writer, "{line}")
}
