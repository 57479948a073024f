//! Extract packed move lists from whole PGN files.
//!
//! Games are always parsed in source order on the calling thread. With more
//! than one worker, parsed games are buffered and their moves are resolved
//! by a fork-join over [`crossbeam::scope`], each worker owning a board and
//! a contiguous slice of the batch. Move lists are emitted in input order.

use std::{
    io::{self, Write},
    panic,
    path::{Path, PathBuf},
    sync::atomic::{AtomicUsize, Ordering},
};

use byteorder::{WriteBytesExt as _, LE};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::{
    analysis::{Analyzer, Counters},
    board::ChessBoard,
    buffer::{Buffer, Encoding},
    errors::PgnError,
    game::RawGame,
    parser::{ParseOptions, Parser},
    progress::{CancelToken, ChunkThrottle, Phase, Progress, ProgressEvent},
    san::ResolveMode,
};

/// Games resolved by each worker in a parallel batch.
pub const GAMES_PER_WORKER: usize = 4096;

/// Settings of a batch job.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct BatchConfig {
    /// Number of resolving threads. `1` resolves every game on the calling
    /// thread.
    pub workers: usize,
    pub games_per_worker: usize,
    /// Encoding of the files opened by [`extract_move_lists()`].
    pub encoding: Encoding,
    pub mode: ResolveMode,
}

impl Default for BatchConfig {
    fn default() -> BatchConfig {
        BatchConfig {
            workers: num_cpus::get(),
            games_per_worker: GAMES_PER_WORKER,
            encoding: Encoding::default(),
            mode: ResolveMode::default(),
        }
    }
}

impl BatchConfig {
    #[must_use]
    pub fn with_workers(mut self, workers: usize) -> BatchConfig {
        self.workers = workers.max(1);
        self
    }

    #[must_use]
    pub fn with_games_per_worker(mut self, games: usize) -> BatchConfig {
        self.games_per_worker = games.max(1);
        self
    }

    #[must_use]
    pub fn with_encoding(mut self, encoding: Encoding) -> BatchConfig {
        self.encoding = encoding;
        self
    }

    #[must_use]
    pub fn with_mode(mut self, mode: ResolveMode) -> BatchConfig {
        self.mode = mode;
        self
    }

    /// Number of games buffered before a parallel batch.
    pub fn batch_size(&self) -> usize {
        self.workers.max(1) * self.games_per_worker.max(1)
    }
}

/// Errors that end a batch job.
#[derive(Debug, Error)]
pub enum BatchError {
    #[error("error loading file")]
    Load {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("error writing move lists")]
    Output(#[source] io::Error),
    #[error("cancelled by the user")]
    Cancelled,
    #[error(transparent)]
    Game(#[from] PgnError),
}

/// Receives the move list of each resolved game, in input order.
pub trait MoveListSink {
    fn accept(&mut self, moves: Box<[u16]>) -> io::Result<()>;
}

impl MoveListSink for Vec<Box<[u16]>> {
    fn accept(&mut self, moves: Box<[u16]>) -> io::Result<()> {
        self.push(moves);
        Ok(())
    }
}

/// Writes each move list as a little endian `u16` move count followed by
/// the packed moves.
#[derive(Debug)]
pub struct PackedWriter<W> {
    inner: W,
    games: u64,
}

impl<W: Write> PackedWriter<W> {
    pub fn new(inner: W) -> PackedWriter<W> {
        PackedWriter { inner, games: 0 }
    }

    /// Number of move lists written.
    pub fn games(&self) -> u64 {
        self.games
    }

    pub fn into_inner(self) -> W {
        self.inner
    }
}

impl<W: Write> MoveListSink for PackedWriter<W> {
    fn accept(&mut self, moves: Box<[u16]>) -> io::Result<()> {
        let len = u16::try_from(moves.len())
            .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "move list too long"))?;
        self.inner.write_u16::<LE>(len)?;
        for &m in moves.iter() {
            self.inner.write_u16::<LE>(m)?;
        }
        self.games += 1;
        Ok(())
    }
}

fn emit<S: MoveListSink + ?Sized>(sink: &mut S, game: &mut RawGame) -> Result<(), BatchError> {
    match game.move_list.take() {
        Some(moves) => sink.accept(moves.into_boxed_slice()).map_err(BatchError::Output),
        None => Ok(()),
    }
}

/// Whether a game is left out of the move lists. Games starting from a
/// custom position and games with a bad move are never resolved.
fn skip(game: &RawGame) -> bool {
    game.bad_move || game.fen().is_some() || game.san_moves().is_empty()
}

/// Resolves every remaining game of a parser and passes the move lists to
/// the sink.
///
/// `counters` is updated as games are processed, so it is meaningful after
/// a cancellation too.
pub fn parse_all_move_lists<S: MoveListSink + ?Sized>(
    parser: &mut Parser,
    sink: &mut S,
    config: &BatchConfig,
    cancel: &CancelToken,
    progress: Progress<'_>,
    counters: &mut Counters,
) -> Result<(), BatchError> {
    let total = parser.buffer().chunk_count() as u64;
    progress(&ProgressEvent::new(Phase::RawParsing, 0, total));
    debug!(workers = config.workers, total_chunks = total, "parsing move lists");

    if config.workers <= 1 {
        parse_sequential(parser, sink, config, cancel, progress, counters)?;
    } else {
        parse_parallel(parser, sink, config, cancel, progress, counters)?;
    }

    progress(&ProgressEvent::new(Phase::RawParsing, total, total));
    debug!(skipped = counters.skipped, truncated = counters.truncated, "move lists parsed");
    Ok(())
}

fn next_game(parser: &mut Parser, cancel: &CancelToken) -> Result<Option<RawGame>, BatchError> {
    if cancel.is_cancelled() {
        info!(offset = parser.buffer().position(), "job cancelled");
        return Err(BatchError::Cancelled);
    }
    Ok(parser.parse_game(ParseOptions::MOVES_ONLY)?)
}

fn parse_sequential<S: MoveListSink + ?Sized>(
    parser: &mut Parser,
    sink: &mut S,
    config: &BatchConfig,
    cancel: &CancelToken,
    progress: Progress<'_>,
    counters: &mut Counters,
) -> Result<(), BatchError> {
    let total = parser.buffer().chunk_count() as u64;
    let mut analyzer = Analyzer::new(ChessBoard::new()).with_mode(config.mode);
    let mut throttle = ChunkThrottle::default();

    while let Some(mut game) = next_game(parser, cancel)? {
        if skip(&game) {
            debug!(offset = game.start_offset, "game skipped");
            counters.skipped += 1;
            continue;
        }
        analyzer.analyze(parser.buffer(), &mut game, true, false, counters)?;
        emit(sink, &mut game)?;

        let chunk = parser.buffer().current_chunk();
        if throttle.poll(chunk) {
            progress(&ProgressEvent::new(Phase::RawParsing, chunk as u64, total));
        }
        parser.buffer_mut().flush_old_chunks();
    }
    Ok(())
}

fn parse_parallel<S: MoveListSink + ?Sized>(
    parser: &mut Parser,
    sink: &mut S,
    config: &BatchConfig,
    cancel: &CancelToken,
    progress: Progress<'_>,
    counters: &mut Counters,
) -> Result<(), BatchError> {
    let total = parser.buffer().chunk_count() as u64;
    let batch_size = config.batch_size();
    let mut batch = Batch::with_capacity(batch_size);
    let mut last_chunk = 0;

    while let Some(game) = next_game(parser, cancel)? {
        if skip(&game) {
            debug!(offset = game.start_offset, "game skipped");
            batch.skipped += 1;
            continue;
        }
        batch.push(game);
        if batch.games.len() < batch_size {
            continue;
        }

        batch.flush(parser.buffer(), sink, config, cancel, counters)?;
        parser.buffer_mut().flush_old_chunks();
        let chunk = parser.buffer().current_chunk();
        if chunk != last_chunk {
            last_chunk = chunk;
            progress(&ProgressEvent::new(Phase::RawParsing, chunk as u64, total));
        }
    }

    batch.flush(parser.buffer(), sink, config, cancel, counters)?;
    counters.skipped += batch.skipped;
    Ok(())
}

/// Games waiting to be resolved, with the number of skipped games parsed
/// right before each of them.
#[derive(Debug)]
struct Batch {
    games: Vec<RawGame>,
    skipped_before: Vec<u32>,
    skipped: u32,
}

impl Batch {
    fn with_capacity(capacity: usize) -> Batch {
        Batch {
            games: Vec::with_capacity(capacity),
            skipped_before: Vec::with_capacity(capacity),
            skipped: 0,
        }
    }

    fn push(&mut self, game: RawGame) {
        self.games.push(game);
        self.skipped_before.push(self.skipped);
        self.skipped = 0;
    }

    /// Resolves the batch and emits the games a sequential run would have
    /// emitted: the longest resolved prefix, up to a cancellation or the
    /// first failing game.
    fn flush<S: MoveListSink + ?Sized>(
        &mut self,
        buffer: &Buffer,
        sink: &mut S,
        config: &BatchConfig,
        cancel: &CancelToken,
        counters: &mut Counters,
    ) -> Result<(), BatchError> {
        if self.games.is_empty() {
            return Ok(());
        }
        debug!(games = self.games.len(), workers = config.workers, "resolving batch");
        let outcome = resolve_parallel(buffer, &mut self.games, config, cancel);
        let cut = outcome.resolved.len();

        let resolved = self.games.iter_mut().zip(&self.skipped_before).zip(outcome.resolved);
        for ((game, &skipped), local) in resolved {
            if cancel.is_cancelled() {
                return Err(BatchError::Cancelled);
            }
            counters.skipped += skipped;
            *counters += local;
            emit(sink, game)?;
        }

        if cut < self.games.len() {
            return Err(match outcome.error {
                Some(err) => {
                    counters.skipped += self.skipped_before[cut];
                    err.into()
                }
                None => BatchError::Cancelled,
            });
        }
        self.games.clear();
        self.skipped_before.clear();
        Ok(())
    }
}

/// Resolved prefix of a batch.
#[derive(Debug)]
struct BatchOutcome {
    /// Counters of each game of the prefix.
    resolved: Vec<Counters>,
    /// Error of the game right after the prefix, if it failed.
    error: Option<PgnError>,
}

#[derive(Debug)]
struct WorkerOutcome {
    resolved: Vec<Counters>,
    error: Option<PgnError>,
    complete: bool,
}

/// Resolves a batch with one thread per contiguous slice. A failing game
/// stops the workers past it. Workers before it carry on, so the failure
/// with the lowest index is the one reported.
fn resolve_parallel(
    buffer: &Buffer,
    games: &mut [RawGame],
    config: &BatchConfig,
    cancel: &CancelToken,
) -> BatchOutcome {
    let per_worker = games.len().div_ceil(config.workers.max(1)).max(1);
    let failed_at = AtomicUsize::new(usize::MAX);

    let joined = crossbeam::scope(|scope| {
        let handles: Vec<_> = games
            .chunks_mut(per_worker)
            .enumerate()
            .map(|(worker, slice)| {
                let failed_at = &failed_at;
                scope.spawn(move |_| {
                    let mut analyzer = Analyzer::new(ChessBoard::new()).with_mode(config.mode);
                    let mut outcome = WorkerOutcome {
                        resolved: Vec::with_capacity(slice.len()),
                        error: None,
                        complete: false,
                    };
                    for (i, game) in slice.iter_mut().enumerate() {
                        let index = worker * per_worker + i;
                        if cancel.is_cancelled() || failed_at.load(Ordering::Relaxed) < index {
                            return outcome;
                        }
                        let mut local = Counters::default();
                        if let Err(err) = analyzer.analyze(buffer, game, true, false, &mut local) {
                            failed_at.fetch_min(index, Ordering::Relaxed);
                            warn!(offset = game.start_offset, "worker stopped on error");
                            outcome.error = Some(err);
                            return outcome;
                        }
                        outcome.resolved.push(local);
                    }
                    outcome.complete = true;
                    outcome
                })
            })
            .collect();

        handles
            .into_iter()
            .map(|handle| handle.join())
            .collect::<Result<Vec<WorkerOutcome>, _>>()
    });

    let workers = joined
        .and_then(|workers| workers)
        .unwrap_or_else(|payload| panic::resume_unwind(payload));

    let mut outcome = BatchOutcome {
        resolved: Vec::with_capacity(games.len()),
        error: None,
    };
    for worker in workers {
        outcome.resolved.extend(worker.resolved);
        if !worker.complete {
            outcome.error = worker.error;
            break;
        }
    }
    outcome
}

/// Outcome of [`extract_move_lists()`].
#[derive(Debug, Default)]
pub struct BatchReport {
    pub move_lists: Vec<Box<[u16]>>,
    /// Totals of the files processed, including a cancelled one.
    pub counters: Counters,
    /// Why the job stopped early, if it did.
    pub error: Option<BatchError>,
}

impl BatchReport {
    pub fn is_ok(&self) -> bool {
        self.error.is_none()
    }
}

/// Extracts the move lists of several files, in order. Stops at the first
/// file that cannot be loaded or parsed, or when cancelled.
pub fn extract_move_lists<P: AsRef<Path>>(
    paths: &[P],
    config: &BatchConfig,
    cancel: &CancelToken,
    progress: Progress<'_>,
) -> BatchReport {
    let mut report = BatchReport::default();
    let count = paths.len();

    for (index, path) in paths.iter().enumerate() {
        let path = path.as_ref();
        if cancel.is_cancelled() {
            report.error = Some(BatchError::Cancelled);
            break;
        }

        let name = path.display().to_string();
        let mut in_file = |event: &ProgressEvent| progress(&event.clone().in_file(index + 1, count, &name));
        in_file(&ProgressEvent::new(Phase::OpeningFile, 0, 0));
        in_file(&ProgressEvent::new(Phase::ReadingFile, 0, 0));

        let mut parser = match Parser::open(path, config.encoding) {
            Ok(parser) => parser,
            Err(source) => {
                warn!(path = %name, %source, "error loading file");
                report.error = Some(BatchError::Load {
                    path: path.to_owned(),
                    source,
                });
                break;
            }
        };

        // a file that fails is left out of the report as a whole
        let mut move_lists = Vec::new();
        let mut counters = Counters::default();
        let result = parse_all_move_lists(
            &mut parser,
            &mut move_lists,
            config,
            cancel,
            &mut in_file,
            &mut counters,
        );
        if matches!(result, Ok(()) | Err(BatchError::Cancelled)) {
            report.move_lists.append(&mut move_lists);
            report.counters += counters;
        }
        if let Err(err) = result {
            report.error = Some(err);
            break;
        }
    }

    progress(&ProgressEvent::new(
        Phase::Finished,
        report.move_lists.len() as u64,
        report.move_lists.len() as u64,
    ));
    info!(
        games = report.move_lists.len(),
        skipped = report.counters.skipped,
        truncated = report.counters.truncated,
        "extraction finished"
    );
    report
}

#[cfg(test)]
mod tests {
    use super::*;

    const GAMES: &str = "\
[Event \"1\"]\n1. e4 e5 2. Nf3 Nc6 1-0\n\n\
[Event \"2\"]\n1. d4 d5 2. Kd3 Nf6 0-1\n\n\
[FEN \"4k3/8/8/8/8/8/8/4K3 w - - 0 1\"]\n1. Kd2 *\n\n\
[Event \"4\"]\n1. e4 -- *\n\n\
[Event \"5\"]\n*\n\n\
[Event \"6\"]\n1. c4 *\n";

    fn run(config: &BatchConfig) -> (Result<(), BatchError>, Vec<Box<[u16]>>, Counters) {
        let mut parser = Parser::new(Buffer::with_chunk_size(GAMES.as_bytes(), 16, Encoding::Utf8));
        let mut lists = Vec::new();
        let mut counters = Counters::default();
        let result = parse_all_move_lists(
            &mut parser,
            &mut lists,
            config,
            &CancelToken::new(),
            &mut |_| (),
            &mut counters,
        );
        (result, lists, counters)
    }

    #[test]
    fn test_batch_size() {
        let config = BatchConfig::default().with_workers(3).with_games_per_worker(10);
        assert_eq!(config.batch_size(), 30);
        assert_eq!(BatchConfig::default().with_workers(0).workers, 1);
        assert_eq!(BatchConfig::default().games_per_worker, GAMES_PER_WORKER);
    }

    #[test]
    fn test_sequential() {
        let (result, lists, counters) = run(&BatchConfig::default().with_workers(1));
        result.unwrap();
        assert_eq!(lists.len(), 3);
        assert_eq!(&*lists[0], [12 + 28 * 256, 52 + 36 * 256, 6 + 21 * 256, 57 + 42 * 256]);
        assert_eq!(&*lists[1], [11 + 27 * 256, 51 + 35 * 256]);
        assert_eq!(&*lists[2], [10 + 26 * 256]);
        // FEN, bad move and empty games
        assert_eq!(counters, Counters { skipped: 3, truncated: 1 });
    }

    #[test]
    fn test_parallel_matches_sequential() {
        let (_, expected, expected_counters) = run(&BatchConfig::default().with_workers(1));
        for games_per_worker in 1..4 {
            let config = BatchConfig::default()
                .with_workers(2)
                .with_games_per_worker(games_per_worker);
            let (result, lists, counters) = run(&config);
            result.unwrap();
            assert_eq!(lists, expected);
            assert_eq!(counters, expected_counters);
        }
    }

    #[test]
    fn test_diagnostic_error() {
        let config = BatchConfig::default().with_mode(ResolveMode::Diagnostic);
        for workers in [1, 2] {
            let config = config.with_workers(workers).with_games_per_worker(1);
            let (result, lists, _) = run(&config);
            match result {
                Err(BatchError::Game(err)) => {
                    assert_eq!(err.to_string(), "unable to find compatible move - Kd3");
                    assert_eq!(err.moves(), [11 + 27 * 256, 51 + 35 * 256]);
                }
                other => panic!("unexpected {other:?}"),
            }
            assert_eq!(lists.len(), 1);
        }
    }

    #[test]
    fn test_failing_file_is_left_out() {
        let dir = std::env::temp_dir().join(format!("pgn-resolver-batch-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let good = dir.join("good.pgn");
        std::fs::write(&good, "1. e4 e5 *\n\n[Event \"E\"]\n*\n\n1. d4 *\n").unwrap();
        let bad = dir.join("bad.pgn");
        std::fs::write(&bad, "1. c4 *\n\n[Event \"E\"]\n*\n\n1. e4 e5 2. Ke3 *\n").unwrap();

        let config = BatchConfig::default()
            .with_workers(1)
            .with_encoding(Encoding::Utf8)
            .with_mode(ResolveMode::Diagnostic);
        let report = extract_move_lists(&[&good, &bad], &config, &CancelToken::new(), &mut |_| ());
        std::fs::remove_dir_all(&dir).unwrap();

        match report.error {
            Some(BatchError::Game(ref err)) => {
                assert_eq!(err.to_string(), "unable to find compatible move - Ke3")
            }
            ref other => panic!("unexpected {other:?}"),
        }
        let expected: Vec<Box<[u16]>> = vec![
            vec![12 + 28 * 256, 52 + 36 * 256].into_boxed_slice(),
            vec![11 + 27 * 256].into_boxed_slice(),
        ];
        assert_eq!(report.move_lists, expected);
        assert_eq!(report.counters, Counters { skipped: 1, truncated: 0 });
    }

    #[test]
    fn test_packed_writer() {
        let mut writer = PackedWriter::new(Vec::new());
        writer.accept(vec![12 + 28 * 256, 1].into_boxed_slice()).unwrap();
        writer.accept(Box::default()).unwrap();
        assert_eq!(writer.games(), 2);
        assert_eq!(writer.into_inner(), [2, 0, 12, 28, 1, 0, 0, 0]);
    }

    #[test]
    fn test_missing_file() {
        let mut events = Vec::new();
        let report = extract_move_lists(
            &["/nonexistent/games.pgn"],
            &BatchConfig::default(),
            &CancelToken::new(),
            &mut |e| events.push(e.phase),
        );
        assert!(!report.is_ok());
        assert!(matches!(report.error, Some(BatchError::Load { .. })));
        assert_eq!(report.error.unwrap().to_string(), "error loading file");
        assert_eq!(events, [Phase::OpeningFile, Phase::ReadingFile, Phase::Finished]);
    }

    #[test]
    fn test_cancelled_before_start() {
        let cancel = CancelToken::new();
        cancel.cancel();
        let report = extract_move_lists(&["games.pgn"], &BatchConfig::default(), &cancel, &mut |_| ());
        assert_eq!(report.error.map(|e| e.to_string()).as_deref(), Some("cancelled by the user"));
        assert!(report.move_lists.is_empty());
    }
}
