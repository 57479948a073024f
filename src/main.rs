use std::{
    error::Error,
    fs::File,
    io::{self, BufWriter, Write},
    path::PathBuf,
    process,
};

use clap::{Parser as _, Subcommand, ValueEnum};
use pgn_resolver::{
    batch, board, filter, san, Analyzer, BatchConfig, BatchError, CancelToken, ChessBoard, Counters,
    Encoding, FenPosition, FilterClause, GameBoard, MoveListSink as _, PackedWriter,
    ParseOptions, Parser, Phase, PgnError, ProgressEvent, ResolveMode,
};
use tracing::info;

#[derive(Debug, clap::Parser)]
#[command(author, version, about = "Read PGN files and resolve their moves")]
struct Opt {
    /// Encoding of the input files
    #[arg(long, value_enum, default_value_t = TextEncoding::Windows1252, global = true)]
    encoding: TextEncoding,
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Copy, Clone, ValueEnum)]
enum TextEncoding {
    Windows1252,
    Latin1,
    Utf8,
}

impl From<TextEncoding> for Encoding {
    fn from(encoding: TextEncoding) -> Encoding {
        match encoding {
            TextEncoding::Windows1252 => Encoding::Windows1252,
            TextEncoding::Latin1 => Encoding::Latin1,
            TextEncoding::Utf8 => Encoding::Utf8,
        }
    }
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Extracts the packed move lists of all games
    Moves {
        files: Vec<PathBuf>,
        /// Writes the move lists as little endian u16 records
        #[arg(short, long)]
        output: Option<PathBuf>,
        /// Number of resolving threads (default: number of cpus)
        #[arg(short = 'j', long)]
        workers: Option<usize>,
        #[arg(long, default_value_t = batch::GAMES_PER_WORKER)]
        games_per_worker: usize,
        /// Reports moves without a legal match instead of truncating games
        #[arg(long)]
        diagnostic: bool,
    },
    /// Resolves the first game or FEN of a file and prints the final position
    Show {
        file: PathBuf,
        /// Reports a move without a legal match instead of truncating
        #[arg(long)]
        diagnose: bool,
    },
    /// Decodes a FEN and lists the legal moves of the position
    Fen { fen: String },
    /// Copies the games matching all given conditions
    Filter {
        file: PathBuf,
        #[arg(short, long)]
        output: Option<PathBuf>,
        #[arg(long)]
        min_elo: Option<u32>,
        #[arg(long)]
        max_elo: Option<u32>,
        /// Drops games where a rating is missing
        #[arg(long)]
        rated_only: bool,
        #[arg(long = "player")]
        players: Vec<String>,
        /// Comma separated endings to retain
        #[arg(long, value_delimiter = ',')]
        results: Vec<Ending>,
        /// Prints players and rating bounds instead of copying games
        #[arg(long)]
        summary: bool,
    },
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, ValueEnum)]
enum Ending {
    White,
    Black,
    Draw,
}

fn moves(
    files: &[PathBuf],
    output: Option<PathBuf>,
    config: &BatchConfig,
) -> Result<(), Box<dyn Error>> {
    let cancel = CancelToken::new();
    let mut progress = |event: &ProgressEvent| {
        if event.phase == Phase::OpeningFile {
            info!(
                file = event.file_name.as_deref().unwrap_or(""),
                "[{}/{}] extracting move lists",
                event.file_index,
                event.file_count
            );
        }
    };
    let report = batch::extract_move_lists(files, config, &cancel, &mut progress);

    let stdout;
    let mut writer: Box<dyn Write> = match output {
        Some(path) => Box::new(BufWriter::new(File::create(path)?)),
        None => {
            stdout = io::stdout();
            Box::new(stdout.lock())
        }
    };
    let mut packed = PackedWriter::new(&mut writer);
    for moves in report.move_lists {
        packed.accept(moves)?;
    }
    let games = packed.games();
    writer.flush()?;

    eprintln!(
        "{games} games, {} skipped, {} truncated",
        report.counters.skipped, report.counters.truncated
    );
    match report.error {
        Some(err) => Err(err.into()),
        None => Ok(()),
    }
}

fn show(file: PathBuf, encoding: Encoding, diagnose: bool) -> Result<(), Box<dyn Error>> {
    let mut parser = Parser::open(&file, encoding)?;
    let mode = if diagnose {
        ResolveMode::Diagnostic
    } else {
        ResolveMode::Lenient
    };
    let mut analyzer = Analyzer::new(ChessBoard::new()).with_mode(mode);
    let single = parser.parse_single(&mut analyzer, false)?;

    for (name, value) in single.game.tags.iter().flat_map(|tags| tags.iter()) {
        println!("[{name} \"{value}\"]");
    }
    if let Some(resolved) = &single.game.resolved {
        let sans: Vec<&str> = resolved.iter().map(|m| m.san.as_str()).collect();
        println!("{}", sans.join(" "));
    }
    let squares: Vec<String> = single
        .game
        .packed_moves()
        .iter()
        .filter_map(|&packed| board::unpack(packed))
        .map(|(from, to)| format!("{from}{to}"))
        .collect();
    println!("{}", squares.join(" "));
    println!("{}", pgn_resolver::fen::encode(&analyzer.board));
    if single.counters != Counters::default() {
        eprintln!(
            "{} skipped, {} truncated",
            single.counters.skipped, single.counters.truncated
        );
    }
    Ok(())
}

fn fen(text: &str) -> Result<(), Box<dyn Error>> {
    let mut board = ChessBoard::new();
    FenPosition::decode(text)?.apply_to(&mut board)?;
    println!("{}", pgn_resolver::fen::encode(&board));
    println!("{:?} to move, {:?}", board.turn(), board.state());

    let mut sans: Vec<String> = board
        .legal_moves()
        .iter()
        .map(|mv| san::render(&mut board.clone(), mv, false))
        .collect();
    sans.sort();
    println!("{} legal moves: {}", sans.len(), sans.join(" "));
    Ok(())
}

#[allow(clippy::too_many_arguments)]
fn filter(
    file: PathBuf,
    encoding: Encoding,
    output: Option<PathBuf>,
    elo: (Option<u32>, Option<u32>),
    rated_only: bool,
    players: Vec<String>,
    results: &[Ending],
    summary: bool,
) -> Result<(), Box<dyn Error>> {
    let mut parser = Parser::open(&file, encoding)?;
    let mut games = Vec::new();
    while let Some(game) = parser.parse_game(ParseOptions::default())? {
        games.push(game);
    }

    if summary {
        let summary = filter::scan_games(&games);
        println!("{} games, {} players", games.len(), summary.players.len());
        if let (Some(min), Some(max)) = (summary.min_elo, summary.max_elo) {
            println!("average ratings from {min} to {max}");
        }
        for name in &summary.players {
            println!("{name}");
        }
        return Ok(());
    }

    let mut clause = FilterClause {
        includes_unrated: !rated_only,
        ..FilterClause::default()
    };
    if elo.0.is_some() || elo.1.is_some() {
        clause = clause.with_elo_range(elo.0.unwrap_or(0), elo.1.unwrap_or(4000));
    }
    if !players.is_empty() {
        clause = clause.with_players(players);
    }
    if !results.is_empty() {
        clause = clause.with_endings(
            results.contains(&Ending::White),
            results.contains(&Ending::Black),
            results.contains(&Ending::Draw),
        );
    }

    let retained = match output {
        Some(path) => {
            let writer = BufWriter::new(File::create(path)?);
            filter::filter_games(parser.buffer(), &games, &clause, Some(writer))?
        }
        None => filter::filter_games(parser.buffer(), &games, &clause, Some(io::stdout().lock()))?,
    };
    eprintln!("{retained} of {} games retained", games.len());
    Ok(())
}

fn run(opt: Opt) -> Result<(), Box<dyn Error>> {
    let encoding = Encoding::from(opt.encoding);
    match opt.command {
        Command::Moves {
            files,
            output,
            workers,
            games_per_worker,
            diagnostic,
        } => {
            let mut config = BatchConfig::default()
                .with_games_per_worker(games_per_worker)
                .with_encoding(encoding);
            if let Some(workers) = workers {
                config = config.with_workers(workers);
            }
            if diagnostic {
                config = config.with_mode(ResolveMode::Diagnostic);
            }
            moves(&files, output, &config)
        }
        Command::Show { file, diagnose } => show(file, encoding, diagnose),
        Command::Fen { fen: text } => fen(&text),
        Command::Filter {
            file,
            output,
            min_elo,
            max_elo,
            rated_only,
            players,
            results,
            summary,
        } => filter(
            file,
            encoding,
            output,
            (min_elo, max_elo),
            rated_only,
            players,
            &results,
            summary,
        ),
    }
}

fn game_error<'a>(err: &'a (dyn Error + 'static)) -> Option<&'a PgnError> {
    match err.downcast_ref::<BatchError>() {
        Some(BatchError::Game(err)) => Some(err),
        Some(_) => None,
        None => err.downcast_ref::<PgnError>(),
    }
}

fn main() {
    env_logger::init();

    if let Err(err) = run(Opt::parse()) {
        match game_error(err.as_ref()) {
            Some(err) => eprintln!("error: {}", err.report()),
            None => {
                eprintln!("error: {err}");
                let mut source = err.source();
                while let Some(cause) = source {
                    eprintln!("  caused by: {cause}");
                    source = cause.source();
                }
            }
        }
        process::exit(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_game_error() {
        let mut parser = Parser::from_text("1. e4 e5 3. Nf3 *");
        let err = parser.parse_game(ParseOptions::default()).unwrap_err();

        let boxed: Box<dyn Error> = Box::new(BatchError::Game(err.clone()));
        assert_eq!(game_error(boxed.as_ref()), Some(&err));
        let boxed: Box<dyn Error> = Box::new(err.clone());
        assert_eq!(game_error(boxed.as_ref()), Some(&err));
        let boxed: Box<dyn Error> = Box::new(BatchError::Cancelled);
        assert_eq!(game_error(boxed.as_ref()), None);
    }
}
