#![no_main]

use libfuzzer_sys::fuzz_target;
use pgn_resolver::{fen, ChessBoard, FenPosition};

fuzz_target!(|data: &str| {
    let Ok(pos) = FenPosition::decode(data) else {
        return;
    };
    let mut board = ChessBoard::new();
    if pos.apply_to(&mut board).is_ok() {
        let text = fen::encode(&board);
        let roundtripped = FenPosition::decode(&text).expect("roundtrip");
        let mut other = ChessBoard::new();
        roundtripped.apply_to(&mut other).expect("legal position");
        assert_eq!(fen::encode(&other), text);
    }
});
