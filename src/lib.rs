//! A library for reading chess games in Portable Game Notation and turning
//! their moves into packed square pairs.
//!
//! # Examples
//!
//! Parse the games of a text and resolve their moves:
//!
//! ```
//! use pgn_resolver::{Analyzer, ChessBoard, Counters, ParseOptions, Parser};
//!
//! let mut parser = Parser::from_text("[White \"Anna\"]\n\n1. e4 e5 2. Nf3 *\n");
//! let mut game = parser.parse_game(ParseOptions::default())?.expect("one game");
//! assert_eq!(game.white(), Some("Anna"));
//!
//! let mut analyzer = Analyzer::new(ChessBoard::new());
//! analyzer.analyze(parser.buffer(), &mut game, false, false, &mut Counters::default())?;
//!
//! // from + to * 256, squares counted from a1
//! assert_eq!(game.packed_moves(), [12 + 28 * 256, 52 + 36 * 256, 6 + 21 * 256]);
//! # Ok::<_, pgn_resolver::PgnError>(())
//! ```
//!
//! Extract the move lists of whole files on all cores:
//!
//! ```no_run
//! use pgn_resolver::{batch, BatchConfig, CancelToken};
//!
//! let report = batch::extract_move_lists(
//!     &["games.pgn"],
//!     &BatchConfig::default(),
//!     &CancelToken::new(),
//!     &mut |event| println!("{:?} {}/{}", event.phase, event.done, event.total),
//! );
//! println!("{} games, {:?}", report.move_lists.len(), report.counters);
//! ```
//!
//! The pieces are also usable on their own: [`fen`] for starting positions,
//! [`san`] for single moves, [`filter`] for selecting games and [`writer`]
//! for producing PGN.
//!
//! # Feature flags
//!
//! * `serde`: Implements [`serde::Serialize`](https://docs.rs/serde/1/serde/trait.Serialize.html)
//!   and [`serde::Deserialize`](https://docs.rs/serde/1/serde/trait.Deserialize.html) for
//!   configuration, counters and progress events.

#![warn(missing_debug_implementations)]
#![cfg_attr(docs_rs, feature(doc_auto_cfg))]

pub mod analysis;
pub mod batch;
pub mod board;
pub mod buffer;
pub mod errors;
pub mod fen;
pub mod filter;
pub mod game;
pub mod parser;
pub mod progress;
pub mod san;
pub mod token;
pub mod writer;

pub use analysis::{Analyzer, Counters};
pub use batch::{BatchConfig, BatchError, BatchReport, MoveListSink, PackedWriter};
pub use board::{BoardMove, ChessBoard, GameBoard, GameState};
pub use buffer::{Buffer, Encoding};
pub use errors::{ErrorKind, PgnError};
pub use fen::FenPosition;
pub use filter::FilterClause;
pub use game::{PlayerType, RawGame};
pub use parser::{ParseOptions, Parser};
pub use progress::{CancelToken, Phase, Progress, ProgressEvent};
pub use san::ResolveMode;
