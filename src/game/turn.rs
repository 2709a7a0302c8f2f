//! # Turn State
//!
//! Holds the ordered players, the four row labels, the pointer to whoever moves
//! next, and the last announced combination.
//!
//! ## Lifecycle:
//! 1. **Created**: when a game starts, players and rows are frozen
//! 2. **Advanced**: each `advance()` picks a limb and a row for the current player
//!    and rotates the pointer
//! 3. **Dropped**: when the group goes back to setup

use crate::error::{AppError, AppResult};
use crate::i18n::{Language, Localization};
use rand::Rng;
use serde::Serialize;

/// Number of row labels on the mat.
pub const ROW_COUNT: usize = 4;

/// Minimum number of players for a game.
pub const MIN_PLAYERS: usize = 2;

/// The fixed set of limbs a move can name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Limb {
    LeftHand,
    RightHand,
    LeftFoot,
    RightFoot,
}

impl Limb {
    pub const ALL: [Limb; 4] = [Limb::LeftHand, Limb::RightHand, Limb::LeftFoot, Limb::RightFoot];

    /// Position in `ALL`, which is also the position in the localized `limbs` list.
    pub fn index(&self) -> usize {
        match self {
            Limb::LeftHand => 0,
            Limb::RightHand => 1,
            Limb::LeftFoot => 2,
            Limb::RightFoot => 3,
        }
    }

    /// Localized label, e.g. "Left hand".
    pub fn label(&self, localization: &Localization, language: Language) -> String {
        localization
            .list(language, "limbs")
            .into_iter()
            .nth(self.index())
            .unwrap_or_else(|| format!("{:?}", self))
    }
}

/// One resolved (player, limb, row) triple.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Announcement {
    pub player: String,
    pub limb: Limb,
    pub row: String,
}

impl Announcement {
    /// The sentence handed to the announcer: `"{player}. {limb}, {row}"`.
    pub fn spoken_text(&self, localization: &Localization, language: Language) -> String {
        format!(
            "{}. {}, {}",
            self.player,
            self.limb.label(localization, language),
            self.row
        )
    }
}

/// Mutable record of player order, row labels and the current pointer.
#[derive(Debug, Clone)]
pub struct TurnState {
    players: Vec<String>,
    rows: Vec<String>,
    current_player_index: usize,
    last_announcement: Option<Announcement>,
}

impl TurnState {
    /// Start a game with the given players (in turn order) and row labels.
    ///
    /// ## Validation:
    /// - at least 2 players, none blank
    /// - exactly 4 rows, none blank
    ///
    /// Names are trimmed before they are stored.
    pub fn new(players: Vec<String>, rows: Vec<String>) -> AppResult<Self> {
        let players: Vec<String> = players.into_iter().map(|p| p.trim().to_string()).collect();
        let rows: Vec<String> = rows.into_iter().map(|r| r.trim().to_string()).collect();

        if players.len() < MIN_PLAYERS {
            return Err(AppError::InvalidSetup(format!(
                "at least {} players are required, got {}",
                MIN_PLAYERS,
                players.len()
            )));
        }
        if players.iter().any(|p| p.is_empty()) {
            return Err(AppError::InvalidSetup("player names cannot be blank".to_string()));
        }
        if rows.len() != ROW_COUNT {
            return Err(AppError::InvalidSetup(format!(
                "exactly {} rows are required, got {}",
                ROW_COUNT,
                rows.len()
            )));
        }
        if rows.iter().any(|r| r.is_empty()) {
            return Err(AppError::InvalidSetup("row names cannot be blank".to_string()));
        }

        Ok(Self {
            players,
            rows,
            current_player_index: 0,
            last_announcement: None,
        })
    }

    pub fn players(&self) -> &[String] {
        &self.players
    }

    pub fn rows(&self) -> &[String] {
        &self.rows
    }

    pub fn current_player_index(&self) -> usize {
        self.current_player_index
    }

    /// Whoever the next `advance()` is for.
    pub fn current_player(&self) -> &str {
        &self.players[self.current_player_index]
    }

    pub fn last_announcement(&self) -> Option<&Announcement> {
        self.last_announcement.as_ref()
    }

    /// Pick a limb and a row for the current player, record it, and move the
    /// pointer to the next player (wrapping after the last one).
    ///
    /// Limb and row are drawn independently and uniformly, with replacement.
    pub fn advance<R: Rng>(&mut self, rng: &mut R) -> Announcement {
        let limb = Limb::ALL[rng.random_range(0..Limb::ALL.len())];
        let row = self.rows[rng.random_range(0..self.rows.len())].clone();

        let announcement = Announcement {
            player: self.players[self.current_player_index].clone(),
            limb,
            row,
        };

        self.last_announcement = Some(announcement.clone());
        self.current_player_index = (self.current_player_index + 1) % self.players.len();
        announcement
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use std::collections::HashMap;

    fn names(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    fn colors() -> Vec<String> {
        names(&["Red", "Yellow", "Blue", "Green"])
    }

    #[test]
    fn test_players_announced_in_order() {
        let mut turns = TurnState::new(names(&["A", "B", "C"]), colors()).unwrap();
        let mut rng = StdRng::seed_from_u64(7);

        let order: Vec<String> = (0..3).map(|_| turns.advance(&mut rng).player).collect();
        assert_eq!(order, names(&["A", "B", "C"]));
        assert_eq!(turns.current_player_index(), 0);
    }

    #[test]
    fn test_pointer_cycles_for_many_calls() {
        for player_count in 2..6 {
            let players: Vec<String> = (0..player_count).map(|i| format!("P{}", i)).collect();
            let mut turns = TurnState::new(players, colors()).unwrap();
            let mut rng = StdRng::seed_from_u64(player_count as u64);

            for call in 0..(player_count * 5) {
                assert_eq!(turns.current_player_index(), call % player_count);
                let announcement = turns.advance(&mut rng);
                assert_eq!(announcement.player, format!("P{}", call % player_count));
                assert_eq!(turns.current_player_index(), (call + 1) % player_count);
            }
        }
    }

    #[test]
    fn test_last_announcement_is_recorded() {
        let mut turns = TurnState::new(names(&["A", "B"]), colors()).unwrap();
        assert!(turns.last_announcement().is_none());

        let mut rng = StdRng::seed_from_u64(1);
        let announcement = turns.advance(&mut rng);
        assert_eq!(turns.last_announcement(), Some(&announcement));
        assert!(colors().contains(&announcement.row));
        assert!(Limb::ALL.contains(&announcement.limb));
    }

    #[test]
    fn test_selection_is_uniform() {
        let mut turns = TurnState::new(names(&["A", "B"]), colors()).unwrap();
        let mut rng = StdRng::seed_from_u64(2024);
        let draws = 4000;

        let mut limb_counts: HashMap<Limb, usize> = HashMap::new();
        let mut row_counts: HashMap<String, usize> = HashMap::new();
        for _ in 0..draws {
            let a = turns.advance(&mut rng);
            *limb_counts.entry(a.limb).or_insert(0) += 1;
            *row_counts.entry(a.row).or_insert(0) += 1;
        }

        // Chi-square with 3 degrees of freedom; 16.27 is the 0.1% critical value.
        let expected = draws as f64 / 4.0;
        let chi_square = |counts: Vec<usize>| -> f64 {
            counts
                .into_iter()
                .map(|c| (c as f64 - expected).powi(2) / expected)
                .sum()
        };

        assert_eq!(limb_counts.len(), 4);
        assert_eq!(row_counts.len(), 4);
        assert!(chi_square(limb_counts.into_values().collect()) < 16.27);
        assert!(chi_square(row_counts.into_values().collect()) < 16.27);
    }

    #[test]
    fn test_setup_validation() {
        assert!(TurnState::new(names(&["Solo"]), colors()).is_err());
        assert!(TurnState::new(names(&["A", "  "]), colors()).is_err());
        assert!(TurnState::new(names(&["A", "B"]), names(&["Red", "Blue"])).is_err());
        assert!(TurnState::new(names(&["A", "B"]), names(&["Red", "", "Blue", "Green"])).is_err());

        let turns = TurnState::new(names(&[" A ", "B"]), colors()).unwrap();
        assert_eq!(turns.players()[0], "A");
    }

    #[test]
    fn test_spoken_text() {
        let l10n = Localization::builtin().unwrap();
        let announcement = Announcement {
            player: "Ann".to_string(),
            limb: Limb::RightFoot,
            row: "Blue".to_string(),
        };
        assert_eq!(
            announcement.spoken_text(&l10n, Language::En),
            "Ann. Right foot, Blue"
        );
    }
}
