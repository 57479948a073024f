#![no_main]

use libfuzzer_sys::fuzz_target;
use pgn_resolver::{
    fen,
    san::{self, SanOutcome},
    ChessBoard, GameBoard as _,
};

fuzz_target!(|data: (Vec<u8>, &str)| {
    let (picks, text) = data;
    let mut board = ChessBoard::new();
    for pick in picks {
        let legal = board.legal_moves();
        if legal.is_empty() {
            break;
        }
        board
            .apply_move(&legal[usize::from(pick) % legal.len()])
            .expect("legal move");
    }

    let before = fen::encode(&board);
    match san::resolve(&mut board, text) {
        Ok(SanOutcome::Resolved(resolved)) => {
            assert_eq!(board.undo_move(), Some(resolved.mv));
            let mut probe = board.clone();
            let rendered = san::render(&mut probe, &resolved.mv, false);
            assert!(matches!(
                san::resolve(&mut probe, &rendered),
                Ok(SanOutcome::Resolved(again)) if again.mv == resolved.mv
            ));
        }
        _ => assert_eq!(fen::encode(&board), before),
    }
});
