#![no_main]

use libfuzzer_sys::fuzz_target;
use pgn_resolver::{
    Analyzer, Buffer, ChessBoard, Counters, Encoding, ParseOptions, Parser, ResolveMode,
};

fuzz_target!(|data: (u8, &[u8])| {
    let (chunk_size, pgn) = data;
    let buffer = Buffer::with_chunk_size(pgn, usize::from(chunk_size).max(1), Encoding::Latin1);
    let mut parser = Parser::new(buffer);
    let mut analyzer = Analyzer::new(ChessBoard::new()).with_mode(ResolveMode::Diagnostic);
    let mut counters = Counters::default();

    let mut offsets = Vec::new();
    while let Ok(Some(mut game)) = parser.parse_game(ParseOptions::default()) {
        offsets.push(game.start_offset);
        let _ = analyzer.analyze(parser.buffer(), &mut game, false, true, &mut counters);
    }

    // Tokenization must not depend on chunk boundaries.
    let mut whole = Parser::new(Buffer::from_bytes(pgn, Encoding::Latin1));
    let mut whole_offsets = Vec::new();
    while let Ok(Some(game)) = whole.parse_game(ParseOptions::default()) {
        whole_offsets.push(game.start_offset);
    }
    assert_eq!(offsets, whole_offsets);
});
