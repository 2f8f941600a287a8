#![deny(warnings)]

//! End-of-year scoring: a 0-100 score, its label and letter grade, and the
//! persisted score record with leaderboard ordering.

use budget_core::{GameState, Money, School, SchoolId, SchoolType};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Weight of the funded-category ratio.
pub const CATEGORY_WEIGHT: f64 = 40.0;
/// Weight of unallocated budget over total budget.
pub const EFFICIENCY_WEIGHT: f64 = 30.0;
/// Weight of a low doom meter.
pub const DOOM_WEIGHT: f64 = 15.0;
/// Weight of morale.
pub const MORALE_WEIGHT: f64 = 15.0;

/// Score from its four inputs, rounded and clamped to [0, 100].
///
/// `budget_efficiency` may be negative when the budget is overdrawn.
pub fn score_from_parts(category_ratio: f64, budget_efficiency: f64, doom: u8, morale: u8) -> u8 {
    let raw = category_ratio * CATEGORY_WEIGHT
        + budget_efficiency * EFFICIENCY_WEIGHT
        + (100.0 - f64::from(doom)) / 100.0 * DOOM_WEIGHT
        + f64::from(morale) / 100.0 * MORALE_WEIGHT;
    if raw.is_nan() {
        return 0;
    }
    raw.round().clamp(0.0, 100.0) as u8
}

/// Share of categories meeting their minimum; 0 with no categories.
pub fn category_ratio(state: &GameState) -> f64 {
    if state.categories.is_empty() {
        return 0.0;
    }
    state.funded_count() as f64 / state.categories.len() as f64
}

/// Unallocated budget over total budget; 0 before any budget is granted.
pub fn budget_efficiency(state: &GameState) -> f64 {
    if state.total_budget == 0 {
        return 0.0;
    }
    state.current_budget as f64 / state.total_budget as f64
}

/// Score a game state snapshot.
pub fn score(state: &GameState) -> u8 {
    score_from_parts(
        category_ratio(state),
        budget_efficiency(state),
        state.doom.value(),
        state.morale.value(),
    )
}

const NICKNAMES: [(u8, &str); 9] = [
    (90, "Budget Wizard"),
    (80, "Financial Mastermind"),
    (70, "Competent Administrator"),
    (60, "Adequate Manager"),
    (50, "Struggling Principal"),
    (40, "Budget Juggler"),
    (30, "Fiscal Disaster"),
    (20, "Bankruptcy Bound"),
    (10, "School Boards Nightmare"),
];

/// Qualitative label for a score, in ten 10-point tiers.
pub fn nickname(score: u8) -> &'static str {
    NICKNAMES
        .iter()
        .find(|(min, _)| score >= *min)
        .map(|(_, name)| *name)
        .unwrap_or("Complete Financial Catastrophe")
}

/// Letter grade used for display only.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Grade {
    A,
    B,
    C,
    D,
    F,
}

impl fmt::Display for Grade {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Grade::A => "A",
            Grade::B => "B",
            Grade::C => "C",
            Grade::D => "D",
            Grade::F => "F",
        };
        f.write_str(s)
    }
}

pub fn grade(score: u8) -> Grade {
    match score {
        90.. => Grade::A,
        80..=89 => Grade::B,
        70..=79 => Grade::C,
        60..=69 => Grade::D,
        _ => Grade::F,
    }
}

/// Newspaper headline for the end-of-year report.
pub fn headline(score: u8, won: bool) -> &'static str {
    match (won, score) {
        (true, 90..) => "Miracle Worker Principal Saves School with Brilliant Budget Management!",
        (true, 70..) => "School Survives Another Year Thanks to Competent Leadership",
        (true, _) => "School Narrowly Avoids Financial Disaster, Continues Operations",
        (false, 0..=29) => "School Closes Doors After Catastrophic Budget Mismanagement",
        (false, 30..=49) => "Financial Crisis Forces School to Slash Programs and Staff",
        (false, _) => "Budget Woes Continue as School Struggles to Stay Afloat",
    }
}

/// Append-only record of a finished game.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PlayerScore {
    pub id: String,
    pub player_name: String,
    pub school_id: SchoolId,
    pub school_name: String,
    pub school_type: SchoolType,
    pub final_budget: Money,
    pub doom: u8,
    pub morale: u8,
    pub school_year: u32,
    pub score: u8,
    pub nickname: String,
    pub recorded_at: DateTime<Utc>,
}

impl PlayerScore {
    /// Build the record for a state played at `school`.
    pub fn new(
        state: &GameState,
        school: &School,
        player_name: impl Into<String>,
        recorded_at: DateTime<Utc>,
    ) -> Self {
        let value = score(state);
        Self {
            id: format!("score_{}", recorded_at.timestamp_millis()),
            player_name: player_name.into(),
            school_id: school.id.clone(),
            school_name: school.name.clone(),
            school_type: school.school_type,
            final_budget: state.current_budget,
            doom: state.doom.value(),
            morale: state.morale.value(),
            school_year: state.school_year,
            score: value,
            nickname: nickname(value).to_string(),
            recorded_at,
        }
    }

    /// Leaderboard sort key: final budget, minus 100 per doom point, plus
    /// 100 per morale point.
    pub fn ranking_key(&self) -> i64 {
        self.final_budget - i64::from(self.doom) * 100 + i64::from(self.morale) * 100
    }
}

/// Order records best first. Ties keep the earlier record first.
pub fn leaderboard(mut scores: Vec<PlayerScore>) -> Vec<PlayerScore> {
    scores.sort_by(|a, b| {
        b.ranking_key()
            .cmp(&a.ranking_key())
            .then(a.recorded_at.cmp(&b.recorded_at))
    });
    scores
}
