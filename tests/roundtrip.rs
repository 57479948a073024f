//! Property tests over random legal playouts.

use pgn_resolver::{
    fen,
    san::{self, SanOutcome},
    writer::{write_game, GameHeader},
    Analyzer, BoardMove, ChessBoard, Counters, FenPosition, GameBoard, ParseOptions, Parser,
};
use proptest::prelude::*;

/// Plays the legal move picked by each index, until the game ends.
fn playout(picks: &[u8]) -> (ChessBoard, Vec<BoardMove>) {
    let mut board = ChessBoard::new();
    let mut moves = Vec::new();
    for &pick in picks {
        let legal = board.legal_moves();
        if legal.is_empty() {
            break;
        }
        let mv = legal[usize::from(pick) % legal.len()];
        board.apply_move(&mv).unwrap();
        moves.push(mv);
    }
    (board, moves)
}

proptest! {
    #[test]
    fn test_rendered_san_resolves_to_same_move(picks in prop::collection::vec(any::<u8>(), 0..120)) {
        let (_, moves) = playout(&picks);
        let mut board = ChessBoard::new();
        for mv in &moves {
            let text = san::render(&mut board, mv, false);
            let mut probe = board.clone();
            match san::resolve(&mut probe, &text) {
                Ok(SanOutcome::Resolved(resolved)) => {
                    prop_assert_eq!(resolved.mv, *mv);
                    prop_assert_eq!(resolved.san, text);
                }
                other => prop_assert!(false, "{} resolved to {:?}", text, other),
            }
            board.apply_move(mv).unwrap();
        }
    }

    #[test]
    fn test_fen_round_trip(picks in prop::collection::vec(any::<u8>(), 0..80)) {
        let (board, _) = playout(&picks);
        let text = fen::encode(&board);
        let decoded = FenPosition::decode(&text).unwrap();
        let mut other = ChessBoard::new();
        decoded.apply_to(&mut other).unwrap();
        prop_assert_eq!(fen::encode(&other), text);
        prop_assert_eq!(other.legal_moves().len(), board.legal_moves().len());
    }

    #[test]
    fn test_written_game_parses_back(picks in prop::collection::vec(any::<u8>(), 0..80)) {
        let (_, moves) = playout(&picks);
        let mut pgn = Vec::new();
        write_game(&mut pgn, &ChessBoard::new(), &moves, &GameHeader::default()).unwrap();
        let pgn = String::from_utf8(pgn).unwrap();

        let mut parser = Parser::from_text(&pgn);
        let mut game = parser.parse_game(ParseOptions::default()).unwrap().unwrap();
        Analyzer::new(ChessBoard::new())
            .analyze(parser.buffer(), &mut game, false, false, &mut Counters::default())
            .unwrap();
        let packed: Vec<u16> = moves.iter().map(BoardMove::packed).collect();
        prop_assert_eq!(game.packed_moves(), &packed[..]);
    }
}
