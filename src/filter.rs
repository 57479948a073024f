//! Select games by rating, player and result, and copy them verbatim.

use std::{
    collections::{BTreeSet, HashSet},
    io::{self, Write},
};

use tracing::debug;

use crate::{buffer::Buffer, game::RawGame, writer::write_raw_game};

/// Conditions a game must meet to be retained.
///
/// The default clause retains every game.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilterClause {
    /// Retain games where a rating is missing.
    pub includes_unrated: bool,
    /// Retain rated games regardless of `ranges`.
    pub all_ranges: bool,
    /// Retained ranges, each given by its lower bound. The range of a game
    /// is its average rating rounded down to a hundred.
    pub ranges: HashSet<u32>,
    pub all_players: bool,
    /// Retain games where one of these players takes part.
    pub players: HashSet<String>,
    pub all_endings: bool,
    pub white_wins: bool,
    pub black_wins: bool,
    pub draws: bool,
}

impl Default for FilterClause {
    fn default() -> FilterClause {
        FilterClause {
            includes_unrated: true,
            all_ranges: true,
            ranges: HashSet::new(),
            all_players: true,
            players: HashSet::new(),
            all_endings: true,
            white_wins: true,
            black_wins: true,
            draws: true,
        }
    }
}

impl FilterClause {
    /// Retains rated games with an average rating in `min..=max`, by
    /// hundreds.
    #[must_use]
    pub fn with_elo_range(mut self, min: u32, max: u32) -> FilterClause {
        self.all_ranges = false;
        self.ranges = (min / 100..=max / 100).map(|r| r * 100).collect();
        self
    }

    #[must_use]
    pub fn with_players<I, S>(mut self, players: I) -> FilterClause
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.all_players = false;
        self.players = players.into_iter().map(Into::into).collect();
        self
    }

    #[must_use]
    pub fn with_endings(mut self, white_wins: bool, black_wins: bool, draws: bool) -> FilterClause {
        self.all_endings = false;
        self.white_wins = white_wins;
        self.black_wins = black_wins;
        self.draws = draws;
        self
    }

    pub fn is_retained(&self, game: &RawGame) -> bool {
        let rated = match game.average_elo() {
            None => self.includes_unrated,
            Some(_) if self.all_ranges => true,
            Some(elo) => self.ranges.contains(&(elo / 100 * 100)),
        };
        if !rated {
            return false;
        }

        if !self.all_players {
            let plays = |name: Option<&str>| name.is_some_and(|name| self.players.contains(name));
            if !plays(game.white()) && !plays(game.black()) {
                return false;
            }
        }

        self.all_endings
            || match game.result() {
                Some("1-0") => self.white_wins,
                Some("0-1") => self.black_wins,
                Some("1/2-1/2") => self.draws,
                _ => false,
            }
    }
}

/// Players and rating bounds found in a set of games.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GameSummary {
    /// Sorted player names.
    pub players: BTreeSet<String>,
    /// Lowest average rating of a rated game.
    pub min_elo: Option<u32>,
    pub max_elo: Option<u32>,
}

/// Collects the players and the average rating bounds of the games.
pub fn scan_games<'a, I>(games: I) -> GameSummary
where
    I: IntoIterator<Item = &'a RawGame>,
{
    let mut summary = GameSummary::default();
    for game in games {
        for name in [game.white(), game.black()].into_iter().flatten() {
            if !summary.players.contains(name) {
                summary.players.insert(name.to_owned());
            }
        }
        if let Some(elo) = game.average_elo() {
            summary.min_elo = Some(summary.min_elo.map_or(elo, |min| min.min(elo)));
            summary.max_elo = Some(summary.max_elo.map_or(elo, |max| max.max(elo)));
        }
    }
    summary
}

/// Counts the retained games, and copies their source text to `writer` if
/// one is given.
pub fn filter_games<W: Write>(
    buffer: &Buffer,
    games: &[RawGame],
    clause: &FilterClause,
    mut writer: Option<W>,
) -> io::Result<usize> {
    let mut retained = 0;
    for game in games.iter().filter(|game| clause.is_retained(game)) {
        if let Some(ref mut writer) = writer {
            write_raw_game(buffer, game, writer)?;
        }
        retained += 1;
    }
    if let Some(ref mut writer) = writer {
        writer.flush()?;
    }
    debug!(retained, total = games.len(), "games filtered");
    Ok(retained)
}
