#![deny(warnings)]

//! Core domain models and invariants for Budget Quest.
//!
//! This crate defines the serializable game-state aggregate shared by the
//! content tables, the scoring module and the engine, together with the
//! rules configuration and the validation helpers used when a saved state
//! is restored.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use thiserror::Error;

/// Currency amount in whole units. Signed because approvals may overdraw.
pub type Money = i64;

macro_rules! string_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub String);

        impl $name {
            pub fn new(id: impl Into<String>) -> Self {
                Self(id.into())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.pad(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                Self(s.to_string())
            }
        }
    };
}

string_id!(
    /// School template identifier, e.g. "elementary1".
    SchoolId
);
string_id!(
    /// Budget category identifier, e.g. "supplies".
    CategoryId
);
string_id!(
    /// Identifier of a pending teacher request.
    RequestId
);
string_id!(
    /// Identifier of a pending crisis event instance.
    EventId
);
string_id!(
    /// Identifier of an option within a crisis event.
    OptionId
);

/// Kind of school.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SchoolType {
    Elementary,
    Middle,
    High,
}

impl fmt::Display for SchoolType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            SchoolType::Elementary => "elementary",
            SchoolType::Middle => "middle",
            SchoolType::High => "high",
        })
    }
}

/// Difficulty band attached to a school template.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Difficulty {
    Easy,
    #[default]
    Medium,
    Hard,
}

impl fmt::Display for Difficulty {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Difficulty::Easy => "easy",
            Difficulty::Medium => "medium",
            Difficulty::Hard => "hard",
        })
    }
}

/// Urgency tier of a teacher request.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Urgency {
    Low,
    Medium,
    High,
}

impl Urgency {
    pub const ALL: [Urgency; 3] = [Urgency::Low, Urgency::Medium, Urgency::High];
}

/// Severity tier of a crisis event.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Minor,
    Major,
    Catastrophic,
}

/// Immutable school template, selected once at game start.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct School {
    pub id: SchoolId,
    pub name: String,
    #[serde(rename = "type")]
    pub school_type: SchoolType,
    pub description: String,
    /// Budget granted on selection (>= 0).
    pub initial_budget: Money,
    pub difficulty: Difficulty,
    #[serde(default)]
    pub pros: Vec<String>,
    #[serde(default)]
    pub cons: Vec<String>,
}

/// Funding level of a category relative to its minimum.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CategoryStatus {
    Underfunded,
    Adequate,
    Overfunded,
}

/// One budget line item the player allocates money to.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BudgetCategory {
    pub id: CategoryId,
    pub name: String,
    /// Current allocation (>= 0).
    pub allocation: Money,
    /// Allocation needed to count as funded.
    pub min_required: Money,
    pub description: String,
    /// Icon tag for the presentation layer.
    pub icon: String,
}

impl BudgetCategory {
    /// Whether the allocation meets the minimum requirement.
    pub fn is_funded(&self) -> bool {
        self.allocation >= self.min_required
    }

    /// Underfunded below 100% of the minimum, adequate below 150%.
    pub fn status(&self) -> CategoryStatus {
        // allocation / min < 1.0 and < 1.5, kept in integers
        if self.allocation < self.min_required {
            CategoryStatus::Underfunded
        } else if self.allocation * 2 < self.min_required * 3 {
            CategoryStatus::Adequate
        } else {
            CategoryStatus::Overfunded
        }
    }
}

/// A teacher asking for money in one category.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TeacherRequest {
    pub id: RequestId,
    pub teacher_name: String,
    pub category: CategoryId,
    /// Requested amount (> 0).
    pub amount: Money,
    pub description: String,
    pub urgency: Urgency,
    /// Days until the deadline. Informational only.
    pub deadline: u32,
}

/// A single budget line of a crisis option.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BudgetEffect {
    pub category: CategoryId,
    /// Signed amount moved into (positive) or out of (negative) the category.
    pub amount: Money,
}

/// One pre-authored response to a crisis.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CrisisOption {
    pub id: OptionId,
    pub text: String,
    #[serde(default)]
    pub budget_effects: Vec<BudgetEffect>,
    #[serde(default)]
    pub morale_delta: i64,
    #[serde(default)]
    pub doom_delta: i64,
}

impl CrisisOption {
    /// Net money this option moves out of the unallocated budget.
    pub fn net_cost(&self) -> Money {
        self.budget_effects.iter().map(|e| e.amount).sum()
    }
}

/// A pending crisis instance awaiting exactly one option choice.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CrisisEvent {
    pub id: EventId,
    /// Template the instance was generated from, e.g. "roof_leak".
    pub kind: String,
    pub title: String,
    pub description: String,
    pub options: Vec<CrisisOption>,
    /// Days until the deadline. Informational only.
    pub deadline: u32,
    pub severity: Severity,
}

impl CrisisEvent {
    pub fn option(&self, id: &OptionId) -> Option<&CrisisOption> {
        self.options.iter().find(|o| &o.id == id)
    }
}

/// Integer meter clamped to [0, 100].
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(from = "i64", into = "i64")]
pub struct Meter(u8);

impl Meter {
    pub const MAX: u8 = 100;

    /// Build a meter, clamping the raw value into range.
    pub fn new(raw: i64) -> Self {
        Self(raw.clamp(0, i64::from(Self::MAX)) as u8)
    }

    pub fn value(self) -> u8 {
        self.0
    }

    /// Meter after adding a signed delta, clamped.
    #[must_use]
    pub fn adjusted(self, delta: i64) -> Self {
        Self::new(i64::from(self.0).saturating_add(delta))
    }
}

impl From<i64> for Meter {
    fn from(raw: i64) -> Self {
        Self::new(raw)
    }
}

impl From<Meter> for i64 {
    fn from(m: Meter) -> Self {
        i64::from(m.0)
    }
}

impl fmt::Display for Meter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}%", self.0)
    }
}

/// Lifecycle phase derived from the state flags.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Phase {
    NotStarted,
    InProgress,
    YearEnded,
}

/// Tunable rule constants. Defaults reproduce the standard game.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RulesConfig {
    /// Calendar month play starts in (and returns to at year end).
    pub start_month: u8,
    /// Month whose advance ends the school year.
    pub year_end_month: u8,
    pub initial_morale: u8,
    pub initial_doom: u8,
    pub approve_morale_delta: i64,
    pub decline_morale_delta: i64,
    /// Morale lost on every non-final month advance.
    pub monthly_morale_decay: i64,
    /// Doom gained per underfunded category on a month advance.
    pub doom_per_underfunded: i64,
    /// Winning requires doom strictly below this.
    pub win_doom_below: u8,
    /// Winning requires morale strictly above this.
    pub win_morale_above: u8,
    /// Nominal teacher requests per month before difficulty scaling.
    pub monthly_requests: u32,
}

impl Default for RulesConfig {
    fn default() -> Self {
        Self {
            start_month: 8,
            year_end_month: 5,
            initial_morale: 100,
            initial_doom: 0,
            approve_morale_delta: 5,
            decline_morale_delta: -3,
            monthly_morale_decay: 2,
            doom_per_underfunded: 5,
            win_doom_below: 80,
            win_morale_above: 30,
            monthly_requests: 2,
        }
    }
}

/// Top-level game state aggregate, owned by one engine per session.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct GameState {
    /// Selected school; `None` before selection.
    pub school_id: Option<SchoolId>,
    /// Unallocated budget. Equals `total_budget - sum(allocations)`.
    pub current_budget: Money,
    pub total_budget: Money,
    pub categories: Vec<BudgetCategory>,
    pub teacher_requests: Vec<TeacherRequest>,
    pub crisis_events: Vec<CrisisEvent>,
    /// Calendar month, 1-12.
    pub current_month: u8,
    /// Starts at 1, incremented at each year end.
    pub school_year: u32,
    pub doom: Meter,
    pub morale: Meter,
    pub game_over: bool,
    pub game_won: bool,
}

impl GameState {
    /// Pristine pre-selection state for the given rules.
    pub fn initial(rules: &RulesConfig) -> Self {
        Self {
            school_id: None,
            current_budget: 0,
            total_budget: 0,
            categories: Vec::new(),
            teacher_requests: Vec::new(),
            crisis_events: Vec::new(),
            current_month: rules.start_month,
            school_year: 1,
            doom: Meter::new(i64::from(rules.initial_doom)),
            morale: Meter::new(i64::from(rules.initial_morale)),
            game_over: false,
            game_won: false,
        }
    }

    pub fn phase(&self) -> Phase {
        match (&self.school_id, self.game_over) {
            (None, _) => Phase::NotStarted,
            (Some(_), false) => Phase::InProgress,
            (Some(_), true) => Phase::YearEnded,
        }
    }

    pub fn category(&self, id: &CategoryId) -> Option<&BudgetCategory> {
        self.categories.iter().find(|c| &c.id == id)
    }

    pub fn request(&self, id: &RequestId) -> Option<&TeacherRequest> {
        self.teacher_requests.iter().find(|r| &r.id == id)
    }

    pub fn event(&self, id: &EventId) -> Option<&CrisisEvent> {
        self.crisis_events.iter().find(|e| &e.id == id)
    }

    /// Sum of all category allocations.
    pub fn allocated(&self) -> Money {
        self.categories.iter().map(|c| c.allocation).sum()
    }

    /// Whether `current_budget + sum(allocations) == total_budget`.
    pub fn is_balanced(&self) -> bool {
        self.current_budget + self.allocated() == self.total_budget
    }

    pub fn funded_count(&self) -> usize {
        self.categories.iter().filter(|c| c.is_funded()).count()
    }

    pub fn underfunded_count(&self) -> usize {
        self.categories.len() - self.funded_count()
    }

    pub fn all_minimums_met(&self) -> bool {
        self.categories.iter().all(BudgetCategory::is_funded)
    }

    /// Lengths of the request and crisis queues, for popup throttling.
    pub fn pending_counts(&self) -> (usize, usize) {
        (self.teacher_requests.len(), self.crisis_events.len())
    }
}

impl Default for GameState {
    fn default() -> Self {
        Self::initial(&RulesConfig::default())
    }
}

/// Why an engine operation had no effect.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum Rejection {
    #[error("no school selected")]
    NotStarted,
    #[error("a school is already selected")]
    AlreadyStarted,
    #[error("the school year is over; reset to play again")]
    YearOver,
    #[error("unknown school: {0}")]
    UnknownSchool(SchoolId),
    #[error("unknown category: {0}")]
    UnknownCategory(CategoryId),
    #[error("unknown teacher request: {0}")]
    UnknownRequest(RequestId),
    #[error("unknown crisis event: {0}")]
    UnknownEvent(EventId),
    #[error("unknown option {option} for crisis event {event}")]
    UnknownOption { event: EventId, option: OptionId },
    #[error("insufficient budget: {available} available, {needed} needed")]
    InsufficientBudget { available: Money, needed: Money },
    #[error("allocation must be non-negative, got {0}")]
    NegativeAmount(Money),
    #[error("content tables cannot produce a {0}")]
    ContentExhausted(&'static str),
}

/// Validation errors for restored states and rule sets.
#[derive(Debug, Error, PartialEq)]
pub enum ValidationError {
    /// Month outside [1, 12].
    #[error("month {0} is out of range [1, 12]")]
    MonthOutOfRange(u8),
    /// Budget conservation does not hold.
    #[error("unbalanced budget: {current} unallocated + {allocated} allocated != {total} total")]
    UnbalancedBudget {
        current: Money,
        allocated: Money,
        total: Money,
    },
    #[error("negative monetary value is invalid")]
    NegativeMoney,
    #[error("category {0} has a negative allocation")]
    NegativeAllocation(CategoryId),
    #[error("duplicate id: {0}")]
    DuplicateId(String),
    #[error("teacher request {0} must ask for a positive amount")]
    NonPositiveRequest(RequestId),
    #[error("categories present without a selected school")]
    CategoriesWithoutSchool,
    #[error("school year must start at 1")]
    InvalidSchoolYear,
    #[error("game marked won before the year ended")]
    WonWithoutGameOver,
}

/// Validate a rules configuration.
pub fn validate_rules(rules: &RulesConfig) -> Result<(), ValidationError> {
    for m in [rules.start_month, rules.year_end_month] {
        if !(1..=12).contains(&m) {
            return Err(ValidationError::MonthOutOfRange(m));
        }
    }
    Ok(())
}

/// Validate a game state, typically one restored from a save.
pub fn validate_state(state: &GameState) -> Result<(), ValidationError> {
    if !(1..=12).contains(&state.current_month) {
        return Err(ValidationError::MonthOutOfRange(state.current_month));
    }
    if state.school_year == 0 {
        return Err(ValidationError::InvalidSchoolYear);
    }
    if state.total_budget < 0 {
        return Err(ValidationError::NegativeMoney);
    }
    if state.school_id.is_none() && !state.categories.is_empty() {
        return Err(ValidationError::CategoriesWithoutSchool);
    }
    if state.game_won && !state.game_over {
        return Err(ValidationError::WonWithoutGameOver);
    }
    let mut ids: BTreeSet<&str> = BTreeSet::new();
    for c in &state.categories {
        if c.allocation < 0 {
            return Err(ValidationError::NegativeAllocation(c.id.clone()));
        }
        if !ids.insert(c.id.as_str()) {
            return Err(ValidationError::DuplicateId(c.id.0.clone()));
        }
    }
    if !state.is_balanced() {
        return Err(ValidationError::UnbalancedBudget {
            current: state.current_budget,
            allocated: state.allocated(),
            total: state.total_budget,
        });
    }
    let mut ids: BTreeSet<&str> = BTreeSet::new();
    for r in &state.teacher_requests {
        if r.amount <= 0 {
            return Err(ValidationError::NonPositiveRequest(r.id.clone()));
        }
        if !ids.insert(r.id.as_str()) {
            return Err(ValidationError::DuplicateId(r.id.0.clone()));
        }
    }
    let mut ids: BTreeSet<&str> = BTreeSet::new();
    for e in &state.crisis_events {
        if !ids.insert(e.id.as_str()) {
            return Err(ValidationError::DuplicateId(e.id.0.clone()));
        }
    }
    Ok(())
}

const MONTH_NAMES: [&str; 12] = [
    "January",
    "February",
    "March",
    "April",
    "May",
    "June",
    "July",
    "August",
    "September",
    "October",
    "November",
    "December",
];

/// English name of a calendar month (1-12).
pub fn month_name(month: u8) -> Option<&'static str> {
    MONTH_NAMES.get(usize::from(month).checked_sub(1)?).copied()
}

/// Format whole currency units as US dollars, e.g. `$12,345` or `-$500`.
pub fn format_currency(amount: Money) -> String {
    let digits = amount.unsigned_abs().to_string();
    let mut grouped = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(ch);
    }
    if amount < 0 {
        format!("-${grouped}")
    } else {
        format!("${grouped}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn category(id: &str, allocation: Money, min_required: Money) -> BudgetCategory {
        BudgetCategory {
            id: CategoryId::from(id),
            name: id.to_string(),
            allocation,
            min_required,
            description: String::new(),
            icon: String::new(),
        }
    }

    fn started_state() -> GameState {
        GameState {
            school_id: Some(SchoolId::from("elementary1")),
            current_budget: 60_000,
            total_budget: 80_000,
            categories: vec![
                category("supplies", 10_000, 10_000),
                category("repairs", 10_000, 8_000),
            ],
            ..GameState::default()
        }
    }

    #[test]
    fn default_state_is_not_started() {
        let s = GameState::default();
        assert_eq!(s.phase(), Phase::NotStarted);
        assert_eq!(s.current_month, 8);
        assert_eq!(s.school_year, 1);
        assert_eq!(s.morale.value(), 100);
        assert_eq!(s.doom.value(), 0);
        validate_state(&s).unwrap();
    }

    #[test]
    fn phase_follows_flags() {
        let mut s = started_state();
        assert_eq!(s.phase(), Phase::InProgress);
        s.game_over = true;
        assert_eq!(s.phase(), Phase::YearEnded);
    }

    #[test]
    fn meter_clamps() {
        assert_eq!(Meter::new(-5).value(), 0);
        assert_eq!(Meter::new(250).value(), 100);
        assert_eq!(Meter::new(40).adjusted(75).value(), 100);
        assert_eq!(Meter::new(40).adjusted(-75).value(), 0);
        assert_eq!(Meter::new(40).adjusted(i64::MIN).value(), 0);
    }

    #[test]
    fn meter_serde_clamps_out_of_range() {
        let m: Meter = serde_json::from_str("140").unwrap();
        assert_eq!(m.value(), 100);
        assert_eq!(serde_json::to_string(&Meter::new(42)).unwrap(), "42");
    }

    #[test]
    fn category_status_bands() {
        assert_eq!(category("a", 9_999, 10_000).status(), CategoryStatus::Underfunded);
        assert_eq!(category("a", 10_000, 10_000).status(), CategoryStatus::Adequate);
        assert_eq!(category("a", 14_999, 10_000).status(), CategoryStatus::Adequate);
        assert_eq!(category("a", 15_000, 10_000).status(), CategoryStatus::Overfunded);
    }

    #[test]
    fn balance_and_funding_counts() {
        let s = started_state();
        assert!(s.is_balanced());
        assert_eq!(s.funded_count(), 2);
        assert!(s.all_minimums_met());
        validate_state(&s).unwrap();
    }

    #[test]
    fn validate_rejects_unbalanced_budget() {
        let mut s = started_state();
        s.current_budget += 1;
        assert!(matches!(
            validate_state(&s),
            Err(ValidationError::UnbalancedBudget { .. })
        ));
    }

    #[test]
    fn validate_rejects_duplicate_requests() {
        let mut s = started_state();
        let r = TeacherRequest {
            id: RequestId::from("request_1"),
            teacher_name: "Ms. Chen".into(),
            category: CategoryId::from("supplies"),
            amount: 700,
            description: String::new(),
            urgency: Urgency::Low,
            deadline: 3,
        };
        s.teacher_requests = vec![r.clone(), r];
        assert_eq!(
            validate_state(&s),
            Err(ValidationError::DuplicateId("request_1".into()))
        );
    }

    #[test]
    fn validate_rejects_bad_month() {
        let s = GameState {
            current_month: 13,
            ..GameState::default()
        };
        assert_eq!(validate_state(&s), Err(ValidationError::MonthOutOfRange(13)));
        let rules = RulesConfig {
            year_end_month: 0,
            ..RulesConfig::default()
        };
        assert!(validate_rules(&rules).is_err());
    }

    #[test]
    fn rules_yaml_partial_override() {
        let rules: RulesConfig = serde_yaml::from_str("monthly_requests: 4\n").unwrap();
        assert_eq!(rules.monthly_requests, 4);
        assert_eq!(rules.start_month, 8);
        validate_rules(&rules).unwrap();
    }

    #[test]
    fn state_snapshot_roundtrip() {
        let s = started_state();
        let json = serde_json::to_string_pretty(&s).unwrap();
        let back: GameState = serde_json::from_str(&json).unwrap();
        assert_eq!(back, s);
    }

    #[test]
    fn month_names() {
        assert_eq!(month_name(1), Some("January"));
        assert_eq!(month_name(8), Some("August"));
        assert_eq!(month_name(12), Some("December"));
        assert_eq!(month_name(0), None);
        assert_eq!(month_name(13), None);
    }

    #[test]
    fn currency_formatting() {
        assert_eq!(format_currency(0), "$0");
        assert_eq!(format_currency(999), "$999");
        assert_eq!(format_currency(12_345), "$12,345");
        assert_eq!(format_currency(1_234_567), "$1,234,567");
        assert_eq!(format_currency(-500), "-$500");
    }

    proptest! {
        #[test]
        fn meter_always_in_range(start in -1_000i64..1_000, deltas in proptest::collection::vec(-500i64..500, 0..50)) {
            let mut m = Meter::new(start);
            for d in deltas {
                m = m.adjusted(d);
                prop_assert!(m.value() <= Meter::MAX);
            }
        }
    }
}
