#![deny(warnings)]

//! Content tables for Budget Quest and the random generators built on them.
//!
//! The tables (schools, budget categories, teacher request pools and the
//! crisis event pool) are plain data. Defaults are embedded YAML documents;
//! a replacement set can be loaded from disk for balance changes or
//! localization without touching the engine.
//!
//! Generators take any `rand::Rng`, so callers decide on seeding.

pub mod embedded;

use budget_core::{
    BudgetCategory, CategoryId, CrisisEvent, CrisisOption, Difficulty, EventId, Money,
    RequestId, School, SchoolId, Severity, TeacherRequest, Urgency,
};
use rand::seq::SliceRandom;
use rand::Rng;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fs;
use std::ops::RangeInclusive;
use std::path::Path;
use thiserror::Error;
use tracing::{debug, info};

/// Range of the informational request deadline, in days.
pub const REQUEST_DEADLINE_DAYS: RangeInclusive<u32> = 1..=10;

#[derive(Debug, Error)]
pub enum ContentError {
    #[error("io error: {0}")]
    Io(String),
    #[error("invalid yaml in {table}: {message}")]
    Yaml { table: String, message: String },
    #[error("missing embedded table: {0}")]
    MissingTable(String),
    #[error("table {0} is empty")]
    EmptyTable(&'static str),
    #[error("duplicate id in {table}: {id}")]
    DuplicateId { table: &'static str, id: String },
    #[error("no request profile for category {0}")]
    MissingRequestProfile(CategoryId),
    #[error("request profile for unknown category {0}")]
    OrphanRequestProfile(CategoryId),
    #[error("invalid request amount range for category {0}")]
    InvalidAmountRange(CategoryId),
    #[error("crisis event {0} has no options")]
    NoOptions(String),
    #[error("school {0} has a negative initial budget")]
    NegativeBudget(SchoolId),
}

impl From<std::io::Error> for ContentError {
    fn from(e: std::io::Error) -> Self {
        ContentError::Io(e.to_string())
    }
}

/// Minimum required allocation per difficulty band.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MinimumTable {
    pub easy: Money,
    pub medium: Money,
    pub hard: Money,
}

impl MinimumTable {
    pub fn for_difficulty(&self, difficulty: Difficulty) -> Money {
        match difficulty {
            Difficulty::Easy => self.easy,
            Difficulty::Medium => self.medium,
            Difficulty::Hard => self.hard,
        }
    }
}

/// Template for one budget category.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CategoryTemplate {
    pub id: CategoryId,
    pub name: String,
    pub description: String,
    pub icon: String,
    pub min_required: MinimumTable,
}

impl CategoryTemplate {
    /// Unfunded category with the minimum for the given difficulty.
    pub fn instantiate(&self, difficulty: Difficulty) -> BudgetCategory {
        BudgetCategory {
            id: self.id.clone(),
            name: self.name.clone(),
            allocation: 0,
            min_required: self.min_required.for_difficulty(difficulty),
            description: self.description.clone(),
            icon: self.icon.clone(),
        }
    }
}

/// Amount range and wording pool for requests in one category.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RequestProfile {
    pub category: CategoryId,
    /// Smallest amount drawn (> 0).
    pub amount_min: Money,
    /// Amounts are drawn from `[amount_min, amount_min + amount_span)`.
    pub amount_span: Money,
    pub descriptions: Vec<String>,
}

impl RequestProfile {
    pub fn amount_range(&self) -> std::ops::Range<Money> {
        self.amount_min..self.amount_min + self.amount_span
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RequestTables {
    pub teacher_names: Vec<String>,
    pub profiles: Vec<RequestProfile>,
}

impl RequestTables {
    pub fn profile(&self, category: &CategoryId) -> Option<&RequestProfile> {
        self.profiles.iter().find(|p| &p.category == category)
    }
}

/// Pre-authored crisis; instances differ only by id.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CrisisTemplate {
    pub id: String,
    pub title: String,
    pub description: String,
    pub deadline: u32,
    pub severity: Severity,
    pub options: Vec<CrisisOption>,
}

impl CrisisTemplate {
    pub fn instantiate(&self, id: EventId) -> CrisisEvent {
        CrisisEvent {
            id,
            kind: self.id.clone(),
            title: self.title.clone(),
            description: self.description.clone(),
            options: self.options.clone(),
            deadline: self.deadline,
            severity: self.severity,
        }
    }
}

/// Monotonic counter minting unique request and event ids.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct IdSequence(u64);

impl IdSequence {
    pub fn starting_at(last: u64) -> Self {
        Self(last)
    }

    /// Last value handed out.
    pub fn last(&self) -> u64 {
        self.0
    }

    fn bump(&mut self) -> u64 {
        self.0 += 1;
        self.0
    }

    pub fn next_request_id(&mut self) -> RequestId {
        RequestId(format!("request_{}", self.bump()))
    }

    pub fn next_event_id(&mut self, kind: &str) -> EventId {
        EventId(format!("{kind}_{}", self.bump()))
    }
}

/// All static content consumed by the engine.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ContentTables {
    pub schools: Vec<School>,
    pub categories: Vec<CategoryTemplate>,
    pub teacher_requests: RequestTables,
    pub crisis_events: Vec<CrisisTemplate>,
}

fn embedded_table<T: DeserializeOwned>(name: &str) -> Result<T, ContentError> {
    let text = embedded::get_yaml(name).ok_or_else(|| ContentError::MissingTable(name.into()))?;
    serde_yaml::from_str(text).map_err(|e| ContentError::Yaml {
        table: name.into(),
        message: e.to_string(),
    })
}

fn check_unique<'a>(
    table: &'static str,
    ids: impl IntoIterator<Item = &'a str>,
) -> Result<(), ContentError> {
    let mut seen = BTreeSet::new();
    for id in ids {
        if !seen.insert(id) {
            return Err(ContentError::DuplicateId {
                table,
                id: id.to_string(),
            });
        }
    }
    Ok(())
}

impl ContentTables {
    /// The default tables shipped with the game.
    pub fn builtin() -> Result<Self, ContentError> {
        let tables = Self {
            schools: embedded_table(embedded::SCHOOLS)?,
            categories: embedded_table(embedded::CATEGORIES)?,
            teacher_requests: embedded_table(embedded::TEACHER_REQUESTS)?,
            crisis_events: embedded_table(embedded::CRISIS_EVENTS)?,
        };
        tables.validate()?;
        Ok(tables)
    }

    /// Parse a single YAML document holding all four tables.
    pub fn from_yaml_str(text: &str) -> Result<Self, ContentError> {
        let tables: Self = serde_yaml::from_str(text).map_err(|e| ContentError::Yaml {
            table: "content".into(),
            message: e.to_string(),
        })?;
        tables.validate()?;
        Ok(tables)
    }

    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self, ContentError> {
        let text = fs::read_to_string(path.as_ref())?;
        let tables = Self::from_yaml_str(&text)?;
        info!(
            path = %path.as_ref().display(),
            schools = tables.schools.len(),
            crisis_events = tables.crisis_events.len(),
            "loaded content tables"
        );
        Ok(tables)
    }

    /// Serialize as one YAML document, loadable by `from_yaml_str`.
    pub fn to_yaml_string(&self) -> Result<String, ContentError> {
        serde_yaml::to_string(self).map_err(|e| ContentError::Yaml {
            table: "content".into(),
            message: e.to_string(),
        })
    }

    /// Check cross-references and the non-empty pools generators rely on.
    pub fn validate(&self) -> Result<(), ContentError> {
        if self.schools.is_empty() {
            return Err(ContentError::EmptyTable("schools"));
        }
        if self.categories.is_empty() {
            return Err(ContentError::EmptyTable("categories"));
        }
        if self.crisis_events.is_empty() {
            return Err(ContentError::EmptyTable("crisis_events"));
        }
        if self.teacher_requests.teacher_names.is_empty() {
            return Err(ContentError::EmptyTable("teacher_names"));
        }
        check_unique("schools", self.schools.iter().map(|s| s.id.as_str()))?;
        check_unique("categories", self.categories.iter().map(|c| c.id.as_str()))?;
        check_unique(
            "crisis_events",
            self.crisis_events.iter().map(|e| e.id.as_str()),
        )?;
        for s in &self.schools {
            if s.initial_budget < 0 {
                return Err(ContentError::NegativeBudget(s.id.clone()));
            }
        }
        for c in &self.categories {
            let p = self
                .teacher_requests
                .profile(&c.id)
                .ok_or_else(|| ContentError::MissingRequestProfile(c.id.clone()))?;
            if p.amount_min <= 0 || p.amount_span <= 0 {
                return Err(ContentError::InvalidAmountRange(c.id.clone()));
            }
            if p.descriptions.is_empty() {
                return Err(ContentError::EmptyTable("request descriptions"));
            }
        }
        for p in &self.teacher_requests.profiles {
            if !self.categories.iter().any(|c| c.id == p.category) {
                return Err(ContentError::OrphanRequestProfile(p.category.clone()));
            }
        }
        for e in &self.crisis_events {
            if e.options.is_empty() {
                return Err(ContentError::NoOptions(e.id.clone()));
            }
        }
        Ok(())
    }

    pub fn school(&self, id: &SchoolId) -> Option<&School> {
        self.schools.iter().find(|s| &s.id == id)
    }

    /// Fresh, unfunded categories for a school of the given difficulty.
    pub fn build_categories(&self, difficulty: Difficulty) -> Vec<BudgetCategory> {
        self.categories
            .iter()
            .map(|c| c.instantiate(difficulty))
            .collect()
    }

    /// Generate one teacher request, optionally for a fixed category.
    ///
    /// Returns `None` when the override names a category without a request
    /// profile.
    pub fn generate_request<R: Rng + ?Sized>(
        &self,
        rng: &mut R,
        ids: &mut IdSequence,
        category: Option<&CategoryId>,
    ) -> Option<TeacherRequest> {
        let category = match category {
            Some(id) => id,
            None => &self.categories.choose(rng)?.id,
        };
        let profile = self.teacher_requests.profile(category)?;
        if profile.amount_span <= 0 {
            return None;
        }
        let amount = rng.gen_range(profile.amount_range());
        let teacher_name = self.teacher_requests.teacher_names.choose(rng)?.clone();
        let description = profile.descriptions.choose(rng)?.clone();
        let urgency = *Urgency::ALL.choose(rng)?;
        let deadline = rng.gen_range(REQUEST_DEADLINE_DAYS);
        Some(TeacherRequest {
            id: ids.next_request_id(),
            teacher_name,
            category: category.clone(),
            amount,
            description,
            urgency,
            deadline,
        })
    }

    /// Generate a batch whose size is `count` scaled by difficulty.
    pub fn generate_requests<R: Rng + ?Sized>(
        &self,
        rng: &mut R,
        ids: &mut IdSequence,
        count: u32,
        difficulty: Difficulty,
    ) -> Vec<TeacherRequest> {
        let n = adjusted_request_count(count, difficulty);
        let requests: Vec<_> = (0..n)
            .filter_map(|_| self.generate_request(rng, ids, None))
            .collect();
        debug!(%difficulty, requested = count, generated = requests.len(), "generated teacher requests");
        requests
    }

    /// Crisis templates eligible at a difficulty, before shuffling.
    ///
    /// Easy drops catastrophic events; hard lists them twice.
    pub fn crisis_pool(&self, difficulty: Difficulty) -> Vec<&CrisisTemplate> {
        let catastrophic = |t: &&CrisisTemplate| t.severity == Severity::Catastrophic;
        match difficulty {
            Difficulty::Easy => self
                .crisis_events
                .iter()
                .filter(|t| !catastrophic(t))
                .collect(),
            Difficulty::Medium => self.crisis_events.iter().collect(),
            Difficulty::Hard => self
                .crisis_events
                .iter()
                .chain(self.crisis_events.iter().filter(catastrophic))
                .collect(),
        }
    }

    /// Shuffle the eligible pool and instantiate the first `count` entries.
    pub fn random_crisis_events<R: Rng + ?Sized>(
        &self,
        rng: &mut R,
        ids: &mut IdSequence,
        count: usize,
        difficulty: Difficulty,
    ) -> Vec<CrisisEvent> {
        let mut pool = self.crisis_pool(difficulty);
        pool.shuffle(rng);
        pool.into_iter()
            .take(count)
            .map(|t| t.instantiate(ids.next_event_id(&t.id)))
            .collect()
    }
}

/// Batch size after difficulty scaling: easy x0.7 floored (at least 1),
/// hard x1.5 rounded up, medium unchanged.
pub fn adjusted_request_count(count: u32, difficulty: Difficulty) -> u32 {
    match difficulty {
        Difficulty::Easy => (count * 7 / 10).max(1),
        Difficulty::Medium => count,
        Difficulty::Hard => (count * 3).div_ceil(2),
    }
}

/// Number of crisis events arriving with a new month.
pub fn monthly_crisis_count<R: Rng + ?Sized>(rng: &mut R, difficulty: Difficulty) -> usize {
    match difficulty {
        Difficulty::Easy => usize::from(rng.gen_bool(0.5)),
        Difficulty::Medium => 1,
        Difficulty::Hard => {
            if rng.gen_bool(0.7) {
                2
            } else {
                1
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    fn tables() -> ContentTables {
        ContentTables::builtin().unwrap()
    }

    #[test]
    fn builtin_tables_load() {
        let t = tables();
        assert_eq!(t.schools.len(), 6);
        assert_eq!(t.categories.len(), 5);
        assert_eq!(t.crisis_events.len(), 5);
        assert_eq!(t.teacher_requests.teacher_names.len(), 20);
        for p in &t.teacher_requests.profiles {
            assert_eq!(p.descriptions.len(), 8);
        }
        let penny = t.school(&SchoolId::from("elementary1")).unwrap();
        assert_eq!(penny.initial_budget, 80_000);
        assert_eq!(penny.difficulty, Difficulty::Easy);
        assert!(t.school(&SchoolId::from("nope")).is_none());
    }

    #[test]
    fn category_minimums_by_difficulty() {
        let t = tables();
        let mins = |d| {
            t.build_categories(d)
                .iter()
                .map(|c| c.min_required)
                .collect::<Vec<_>>()
        };
        assert_eq!(mins(Difficulty::Easy), vec![10_000, 50_000, 5_000, 8_000, 5_000]);
        assert_eq!(mins(Difficulty::Medium), vec![10_000, 60_000, 5_000, 8_000, 5_000]);
        assert_eq!(mins(Difficulty::Hard), vec![15_000, 70_000, 10_000, 12_000, 8_000]);
        assert!(t
            .build_categories(Difficulty::Hard)
            .iter()
            .all(|c| c.allocation == 0));
    }

    #[test]
    fn request_with_category_override() {
        let t = tables();
        let mut rng = ChaCha8Rng::seed_from_u64(7);
        let mut ids = IdSequence::default();
        let cat = CategoryId::from("repairs");
        for _ in 0..50 {
            let r = t.generate_request(&mut rng, &mut ids, Some(&cat)).unwrap();
            assert_eq!(r.category, cat);
            assert!((1_000..4_000).contains(&r.amount));
            assert!(REQUEST_DEADLINE_DAYS.contains(&r.deadline));
        }
        assert_eq!(ids.last(), 50);
    }

    #[test]
    fn request_with_unknown_override_is_none() {
        let t = tables();
        let mut rng = ChaCha8Rng::seed_from_u64(7);
        let mut ids = IdSequence::default();
        let r = t.generate_request(&mut rng, &mut ids, Some(&CategoryId::from("yachts")));
        assert!(r.is_none());
        assert_eq!(ids.last(), 0);
    }

    #[test]
    fn request_ids_are_unique() {
        let t = tables();
        let mut rng = ChaCha8Rng::seed_from_u64(1);
        let mut ids = IdSequence::default();
        let batch = t.generate_requests(&mut rng, &mut ids, 20, Difficulty::Medium);
        let unique: BTreeSet<_> = batch.iter().map(|r| r.id.clone()).collect();
        assert_eq!(unique.len(), batch.len());
    }

    #[test]
    fn batch_size_scales_with_difficulty() {
        assert_eq!(adjusted_request_count(2, Difficulty::Easy), 1);
        assert_eq!(adjusted_request_count(0, Difficulty::Easy), 1);
        assert_eq!(adjusted_request_count(10, Difficulty::Easy), 7);
        assert_eq!(adjusted_request_count(2, Difficulty::Medium), 2);
        assert_eq!(adjusted_request_count(2, Difficulty::Hard), 3);
        assert_eq!(adjusted_request_count(3, Difficulty::Hard), 5);
    }

    #[test]
    fn easy_pool_excludes_catastrophic() {
        let t = tables();
        let pool = t.crisis_pool(Difficulty::Easy);
        assert_eq!(pool.len(), 4);
        assert!(pool.iter().all(|e| e.severity != Severity::Catastrophic));
        assert_eq!(t.crisis_pool(Difficulty::Medium).len(), 5);
    }

    #[test]
    fn hard_pool_duplicates_catastrophic() {
        let t = tables();
        let pool = t.crisis_pool(Difficulty::Hard);
        assert_eq!(pool.len(), 6);
        let strikes = pool.iter().filter(|e| e.id == "teacher_strike").count();
        assert_eq!(strikes, 2);
    }

    #[test]
    fn crisis_selection_capped_by_pool() {
        let t = tables();
        let mut rng = ChaCha8Rng::seed_from_u64(3);
        let mut ids = IdSequence::default();
        let medium = t.random_crisis_events(&mut rng, &mut ids, 20, Difficulty::Medium);
        assert_eq!(medium.len(), 5);
        let kinds: BTreeSet<_> = medium.iter().map(|e| e.kind.clone()).collect();
        assert_eq!(kinds.len(), 5);
        let hard = t.random_crisis_events(&mut rng, &mut ids, 20, Difficulty::Hard);
        assert_eq!(hard.len(), 6);
        let ids: BTreeSet<_> = hard.iter().map(|e| e.id.clone()).collect();
        assert_eq!(ids.len(), 6);
    }

    #[test]
    fn crisis_instance_keeps_template_options() {
        let t = tables();
        let template = &t.crisis_events[0];
        let e = template.instantiate(EventId::from("roof_leak_9"));
        assert_eq!(e.kind, "roof_leak");
        assert_eq!(e.options, template.options);
        assert_eq!(e.severity, Severity::Major);
    }

    #[test]
    fn monthly_crisis_counts_stay_in_band() {
        let mut rng = ChaCha8Rng::seed_from_u64(11);
        let mut hard_twos = 0;
        for _ in 0..1_000 {
            assert!(monthly_crisis_count(&mut rng, Difficulty::Easy) <= 1);
            assert_eq!(monthly_crisis_count(&mut rng, Difficulty::Medium), 1);
            let h = monthly_crisis_count(&mut rng, Difficulty::Hard);
            assert!((1..=2).contains(&h));
            if h == 2 {
                hard_twos += 1;
            }
        }
        // ~70% of hard months bring two crises
        assert!((600..800).contains(&hard_twos), "got {hard_twos}");
    }

    #[test]
    fn yaml_export_reloads() {
        let t = tables();
        let text = t.to_yaml_string().unwrap();
        let back = ContentTables::from_yaml_str(&text).unwrap();
        assert_eq!(back, t);
    }

    #[test]
    fn validation_catches_duplicates_and_missing_profiles() {
        let mut t = tables();
        t.schools.push(t.schools[0].clone());
        assert!(matches!(
            t.validate(),
            Err(ContentError::DuplicateId { table: "schools", .. })
        ));

        let mut t = tables();
        t.teacher_requests.profiles.retain(|p| p.category.as_str() != "emergency");
        assert!(matches!(
            t.validate(),
            Err(ContentError::MissingRequestProfile(c)) if c.as_str() == "emergency"
        ));

        let mut t = tables();
        t.crisis_events[1].options.clear();
        assert!(matches!(t.validate(), Err(ContentError::NoOptions(_))));
    }

    #[test]
    fn malformed_yaml_is_an_error() {
        let err = ContentTables::from_yaml_str("schools: [").unwrap_err();
        assert!(matches!(err, ContentError::Yaml { .. }));
    }

    proptest! {
        #[test]
        fn request_amounts_within_profile(seed in any::<u64>()) {
            let t = tables();
            let mut rng = ChaCha8Rng::seed_from_u64(seed);
            let mut ids = IdSequence::default();
            let r = t.generate_request(&mut rng, &mut ids, None).unwrap();
            let p = t.teacher_requests.profile(&r.category).unwrap();
            prop_assert!(p.amount_range().contains(&r.amount));
            prop_assert!(p.descriptions.contains(&r.description));
            prop_assert!(t.teacher_requests.teacher_names.contains(&r.teacher_name));
        }
    }
}
