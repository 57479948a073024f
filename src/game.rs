use std::time::Duration;

use once_cell::unsync::OnceCell;
use shakmaty::Color;

use crate::{fen::FenPosition, san::ResolvedMove};

/// Tag pairs of a game in the order they appear.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Tags {
    pairs: Vec<(String, String)>,
}

impl Tags {
    pub fn new() -> Tags {
        Tags::default()
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.pairs
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    /// Adds a tag. Returns `false` and keeps the existing value if the tag
    /// is already present.
    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<String>) -> bool {
        let name = name.into();
        if self.contains(&name) {
            return false;
        }
        self.pairs.push((name, value.into()));
        true
    }

    pub fn len(&self) -> usize {
        self.pairs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.pairs.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

/// Whether a side is played by a human or an engine.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum PlayerType {
    #[default]
    Human,
    Program,
}

impl PlayerType {
    fn from_tag(value: Option<&str>) -> PlayerType {
        match value {
            Some(value) if value.eq_ignore_ascii_case("program") => PlayerType::Program,
            _ => PlayerType::Human,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            PlayerType::Human => "human",
            PlayerType::Program => "program",
        }
    }
}

/// A game as found in the source text.
///
/// The typed accessors decode their tag on first use and remember the
/// result. Tags must not be modified after that.
#[derive(Debug, Clone)]
pub struct RawGame {
    /// Offset of the first token of the game.
    pub start_offset: u64,
    /// Bytes up to the first token of the next game.
    pub length: u32,
    pub tags: Option<Tags>,
    pub san_moves: Option<Vec<String>>,
    /// Text of the game termination marker.
    pub termination: Option<String>,
    /// The movetext contains an unsupported move, like `--`.
    pub bad_move: bool,
    /// Packed moves, set by the analyzer.
    pub move_list: Option<Vec<u16>>,
    /// Resolved moves, set by the analyzer on request.
    pub resolved: Option<Vec<ResolvedMove>>,
    /// Position given by the `FEN` tag, set by the analyzer.
    pub starting_position: Option<FenPosition>,
    pub starting_color: Color,
    pub(crate) white_elo: OnceCell<Option<u32>>,
    pub(crate) black_elo: OnceCell<Option<u32>>,
    pub(crate) white_type: OnceCell<PlayerType>,
    pub(crate) black_type: OnceCell<PlayerType>,
    pub(crate) times: OnceCell<(Duration, Duration)>,
}

impl Default for RawGame {
    fn default() -> RawGame {
        RawGame {
            start_offset: 0,
            length: 0,
            tags: None,
            san_moves: None,
            termination: None,
            bad_move: false,
            move_list: None,
            resolved: None,
            starting_position: None,
            starting_color: Color::White,
            white_elo: OnceCell::new(),
            black_elo: OnceCell::new(),
            white_type: OnceCell::new(),
            black_type: OnceCell::new(),
            times: OnceCell::new(),
        }
    }
}

impl RawGame {
    pub fn tag(&self, name: &str) -> Option<&str> {
        self.tags.as_ref().and_then(|tags| tags.get(name))
    }

    pub fn event(&self) -> Option<&str> {
        self.tag("Event")
    }

    pub fn site(&self) -> Option<&str> {
        self.tag("Site")
    }

    pub fn date(&self) -> Option<&str> {
        self.tag("Date")
    }

    pub fn round(&self) -> Option<&str> {
        self.tag("Round")
    }

    pub fn white(&self) -> Option<&str> {
        self.tag("White")
    }

    pub fn black(&self) -> Option<&str> {
        self.tag("Black")
    }

    pub fn result(&self) -> Option<&str> {
        self.tag("Result")
    }

    pub fn fen(&self) -> Option<&str> {
        self.tag("FEN")
    }

    pub fn time_control(&self) -> Option<&str> {
        self.tag("TimeControl")
    }

    pub fn termination_tag(&self) -> Option<&str> {
        self.tag("Termination")
    }

    /// Name of the player, or `Player 1` / `Player 2` if the tag is missing.
    pub fn player_name(&self, color: Color) -> &str {
        match color {
            Color::White => self.white().unwrap_or("Player 1"),
            Color::Black => self.black().unwrap_or("Player 2"),
        }
    }

    fn elo(&self, name: &str) -> Option<u32> {
        self.tag(name).and_then(|value| value.trim().parse().ok())
    }

    pub fn white_elo(&self) -> Option<u32> {
        *self.white_elo.get_or_init(|| self.elo("WhiteElo"))
    }

    pub fn black_elo(&self) -> Option<u32> {
        *self.black_elo.get_or_init(|| self.elo("BlackElo"))
    }

    /// Mean rating of both players, if both are rated.
    pub fn average_elo(&self) -> Option<u32> {
        let sum = u64::from(self.white_elo()?) + u64::from(self.black_elo()?);
        Some((sum / 2) as u32)
    }

    pub fn white_type(&self) -> PlayerType {
        *self
            .white_type
            .get_or_init(|| PlayerType::from_tag(self.tag("WhiteType")))
    }

    pub fn black_type(&self) -> PlayerType {
        *self
            .black_type
            .get_or_init(|| PlayerType::from_tag(self.tag("BlackType")))
    }

    fn times(&self) -> (Duration, Duration) {
        *self.times.get_or_init(|| {
            self.time_control()
                .and_then(decode_time_control)
                .unwrap_or((Duration::ZERO, Duration::ZERO))
        })
    }

    /// Time used by white according to an extended `TimeControl` tag of the
    /// form `?:<white ticks>:<black ticks>`.
    pub fn white_time(&self) -> Duration {
        self.times().0
    }

    pub fn black_time(&self) -> Duration {
        self.times().1
    }

    /// Packed moves resolved by the analyzer.
    pub fn packed_moves(&self) -> &[u16] {
        self.move_list.as_deref().unwrap_or_default()
    }

    pub fn san_moves(&self) -> &[String] {
        self.san_moves.as_deref().unwrap_or_default()
    }

    pub(crate) fn end_offset(&self) -> u64 {
        self.start_offset + u64::from(self.length)
    }
}

fn decode_time_control(value: &str) -> Option<(Duration, Duration)> {
    let mut parts = value.split(':');
    let (Some("?"), Some(white), Some(black), None) =
        (parts.next(), parts.next(), parts.next(), parts.next())
    else {
        return None;
    };
    let ticks = |value: &str| {
        let ticks: u64 = value.parse().ok()?;
        Some(Duration::from_nanos(ticks.saturating_mul(100)))
    };
    Some((ticks(white)?, ticks(black)?))
}

/// Encodes both clocks as an extended `TimeControl` value.
pub fn encode_time_control(white: Duration, black: Duration) -> String {
    let ticks = |d: Duration| d.as_nanos() / 100;
    format!("?:{}:{}", ticks(white), ticks(black))
}
