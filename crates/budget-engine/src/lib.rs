#![deny(warnings)]

//! Budget Quest game engine.
//!
//! [`GameEngine`] owns one [`GameState`] plus the seeded RNG and id counter
//! that feed the content generators. Every transition is a method returning
//! `Result<_, Rejection>`; a rejected call leaves the state untouched.
//!
//! Pending request and crisis queues are unbounded: unresolved items carry
//! over from month to month until the player acts on them or resets.

use budget_content::{monthly_crisis_count, ContentTables, IdSequence};
use budget_core::{
    validate_rules, validate_state, BudgetEffect, CategoryId, Difficulty, EventId, GameState,
    Money, OptionId, Phase, RequestId, Rejection, RulesConfig, School, SchoolId,
    ValidationError,
};
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, warn};

/// Engine construction parameters.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    pub rng_seed: u64,
    #[serde(default)]
    pub rules: RulesConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            rng_seed: 42,
            rules: RulesConfig::default(),
        }
    }
}

/// Errors building or restoring an engine.
#[derive(Debug, Error, PartialEq)]
pub enum SetupError {
    #[error(transparent)]
    Invalid(#[from] ValidationError),
    #[error("saved game references unknown school {0}")]
    UnknownSchool(SchoolId),
}

/// Result of a successful month advance.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum MonthOutcome {
    /// A regular month passed.
    Advanced {
        month: u8,
        new_requests: usize,
        new_events: usize,
        doom_gained: u8,
    },
    /// The school year closed and the outcome is final.
    YearEnded { won: bool, school_year: u32 },
}

/// Effects actually applied by a crisis resolution.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CrisisResolution {
    /// Budget lines applied, with amounts after flooring at zero allocation.
    pub applied: Vec<BudgetEffect>,
    /// Budget lines naming categories absent from the state.
    pub skipped: Vec<CategoryId>,
}

/// Serializable snapshot of a running engine.
///
/// Carries the RNG stream position and id counter so a restored game keeps
/// producing the same requests and crises it would have without the save.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SaveGame {
    pub state: GameState,
    pub rng: ChaCha8Rng,
    pub ids: IdSequence,
}

/// One game session.
#[derive(Clone, Debug)]
pub struct GameEngine {
    content: ContentTables,
    config: EngineConfig,
    state: GameState,
    rng: ChaCha8Rng,
    ids: IdSequence,
}

fn reject<T>(op: &'static str, reason: Rejection) -> Result<T, Rejection> {
    debug!(op, %reason, "operation rejected");
    Err(reason)
}

impl GameEngine {
    /// Fresh engine in the pre-selection phase.
    pub fn new(content: ContentTables, config: EngineConfig) -> Result<Self, SetupError> {
        validate_rules(&config.rules)?;
        let state = GameState::initial(&config.rules);
        let rng = ChaCha8Rng::seed_from_u64(config.rng_seed);
        Ok(Self {
            content,
            config,
            state,
            rng,
            ids: IdSequence::default(),
        })
    }

    /// Rebuild an engine from a save, validating the restored state.
    pub fn restore(
        content: ContentTables,
        config: EngineConfig,
        save: SaveGame,
    ) -> Result<Self, SetupError> {
        validate_rules(&config.rules)?;
        validate_state(&save.state)?;
        if let Some(id) = &save.state.school_id {
            if content.school(id).is_none() {
                return Err(SetupError::UnknownSchool(id.clone()));
            }
        }
        info!(
            month = save.state.current_month,
            year = save.state.school_year,
            "game restored"
        );
        Ok(Self {
            content,
            config,
            state: save.state,
            rng: save.rng,
            ids: save.ids,
        })
    }

    pub fn save(&self) -> SaveGame {
        SaveGame {
            state: self.state.clone(),
            rng: self.rng.clone(),
            ids: self.ids,
        }
    }

    pub fn state(&self) -> &GameState {
        &self.state
    }

    /// Owned copy of the current state for observers.
    pub fn snapshot(&self) -> GameState {
        self.state.clone()
    }

    pub fn content(&self) -> &ContentTables {
        &self.content
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn phase(&self) -> Phase {
        self.state.phase()
    }

    /// The selected school's template, if any.
    pub fn school(&self) -> Option<&School> {
        self.state
            .school_id
            .as_ref()
            .and_then(|id| self.content.school(id))
    }

    fn difficulty(&self) -> Difficulty {
        self.school().map(|s| s.difficulty).unwrap_or_default()
    }

    fn require_in_progress(&self, op: &'static str) -> Result<Difficulty, Rejection> {
        match self.state.phase() {
            Phase::InProgress => Ok(self.difficulty()),
            Phase::NotStarted => reject(op, Rejection::NotStarted),
            Phase::YearEnded => reject(op, Rejection::YearOver),
        }
    }

    /// Pick a school and build its budget categories.
    pub fn select_school(&mut self, id: &SchoolId) -> Result<(), Rejection> {
        if self.state.phase() != Phase::NotStarted {
            return reject("select_school", Rejection::AlreadyStarted);
        }
        let Some(school) = self.content.school(id) else {
            warn!(school = %id, "school not found");
            return Err(Rejection::UnknownSchool(id.clone()));
        };
        let categories = self.content.build_categories(school.difficulty);
        info!(
            school = %id,
            budget = school.initial_budget,
            difficulty = %school.difficulty,
            "school selected"
        );
        self.state.current_budget = school.initial_budget;
        self.state.total_budget = school.initial_budget;
        self.state.categories = categories;
        self.state.school_id = Some(id.clone());
        self.state.game_over = false;
        self.state.game_won = false;
        Ok(())
    }

    /// Set a category's allocation to `amount`, moving the difference
    /// to or from the unallocated budget.
    pub fn allocate_budget(&mut self, category: &CategoryId, amount: Money) -> Result<(), Rejection> {
        const OP: &str = "allocate_budget";
        self.require_in_progress(OP)?;
        if amount < 0 {
            return reject(OP, Rejection::NegativeAmount(amount));
        }
        let Some(idx) = self.state.categories.iter().position(|c| &c.id == category) else {
            return reject(OP, Rejection::UnknownCategory(category.clone()));
        };
        let old = self.state.categories[idx].allocation;
        let delta = amount - old;
        if self.state.current_budget - delta < 0 {
            return reject(
                OP,
                Rejection::InsufficientBudget {
                    available: self.state.current_budget + old,
                    needed: amount,
                },
            );
        }
        self.state.categories[idx].allocation = amount;
        self.state.current_budget -= delta;
        debug_assert!(self.state.is_balanced());
        Ok(())
    }

    /// Approve or decline a pending teacher request.
    ///
    /// Approval funds the request even when it overdraws the unallocated
    /// budget. Approving a request for a category missing from the state is
    /// rejected and the request stays queued.
    pub fn resolve_teacher_request(&mut self, id: &RequestId, approved: bool) -> Result<(), Rejection> {
        const OP: &str = "resolve_teacher_request";
        self.require_in_progress(OP)?;
        let Some(idx) = self.state.teacher_requests.iter().position(|r| &r.id == id) else {
            return reject(OP, Rejection::UnknownRequest(id.clone()));
        };
        let rules = &self.config.rules;
        if approved {
            let request = &self.state.teacher_requests[idx];
            let Some(cat) = self
                .state
                .categories
                .iter()
                .position(|c| c.id == request.category)
            else {
                return reject(OP, Rejection::UnknownCategory(request.category.clone()));
            };
            let amount = request.amount;
            self.state.categories[cat].allocation += amount;
            self.state.current_budget -= amount;
            self.state.morale = self.state.morale.adjusted(rules.approve_morale_delta);
        } else {
            self.state.morale = self.state.morale.adjusted(rules.decline_morale_delta);
        }
        self.state.teacher_requests.remove(idx);
        debug_assert!(self.state.is_balanced());
        Ok(())
    }

    /// Apply one option of a pending crisis and remove the crisis.
    ///
    /// Budget lines for unknown categories are skipped. A negative line never
    /// takes a category below zero; only the amount actually removed returns
    /// to the unallocated budget. A shipped option such as the `budget_cuts`
    /// fundraiser, which draws on the emergency line, therefore frees nothing
    /// while that line is still unfunded.
    pub fn resolve_crisis_event(
        &mut self,
        id: &EventId,
        option: &OptionId,
    ) -> Result<CrisisResolution, Rejection> {
        const OP: &str = "resolve_crisis_event";
        self.require_in_progress(OP)?;
        let Some(idx) = self.state.crisis_events.iter().position(|e| &e.id == id) else {
            return reject(OP, Rejection::UnknownEvent(id.clone()));
        };
        let Some(chosen) = self.state.crisis_events[idx].option(option).cloned() else {
            return reject(
                OP,
                Rejection::UnknownOption {
                    event: id.clone(),
                    option: option.clone(),
                },
            );
        };
        self.state.crisis_events.remove(idx);

        let mut resolution = CrisisResolution::default();
        for effect in &chosen.budget_effects {
            match self
                .state
                .categories
                .iter_mut()
                .find(|c| c.id == effect.category)
            {
                Some(cat) => {
                    let amount = effect.amount.max(-cat.allocation);
                    cat.allocation += amount;
                    self.state.current_budget -= amount;
                    resolution.applied.push(BudgetEffect {
                        category: effect.category.clone(),
                        amount,
                    });
                }
                None => {
                    debug!(event = %id, category = %effect.category, "crisis effect skipped");
                    resolution.skipped.push(effect.category.clone());
                }
            }
        }
        self.state.doom = self.state.doom.adjusted(chosen.doom_delta);
        self.state.morale = self.state.morale.adjusted(chosen.morale_delta);
        debug_assert!(self.state.is_balanced());
        Ok(resolution)
    }

    /// Close the current month.
    ///
    /// In the year-end month this evaluates the win condition and finishes
    /// the game; otherwise it queues new work and applies monthly pressure.
    pub fn advance_month(&mut self) -> Result<MonthOutcome, Rejection> {
        let difficulty = self.require_in_progress("advance_month")?;
        let rules = &self.config.rules;
        let state = &mut self.state;

        if state.current_month == rules.year_end_month {
            let won = state.all_minimums_met()
                && state.doom.value() < rules.win_doom_below
                && state.morale.value() > rules.win_morale_above;
            let finished_year = state.school_year;
            state.current_month = rules.start_month;
            state.school_year += 1;
            state.game_over = true;
            state.game_won = won;
            info!(
                won,
                school_year = finished_year,
                doom = state.doom.value(),
                morale = state.morale.value(),
                "school year ended"
            );
            return Ok(MonthOutcome::YearEnded {
                won,
                school_year: finished_year,
            });
        }

        state.current_month = state.current_month % 12 + 1;
        let requests = self.content.generate_requests(
            &mut self.rng,
            &mut self.ids,
            rules.monthly_requests,
            difficulty,
        );
        let crisis_count = monthly_crisis_count(&mut self.rng, difficulty);
        let events =
            self.content
                .random_crisis_events(&mut self.rng, &mut self.ids, crisis_count, difficulty);
        let (new_requests, new_events) = (requests.len(), events.len());
        state.teacher_requests.extend(requests);
        state.crisis_events.extend(events);

        let before = state.doom;
        let underfunded = state.underfunded_count() as i64;
        state.doom = state.doom.adjusted(rules.doom_per_underfunded * underfunded);
        state.morale = state.morale.adjusted(-rules.monthly_morale_decay);
        debug!(
            month = state.current_month,
            new_requests,
            new_events,
            doom = state.doom.value(),
            morale = state.morale.value(),
            "month advanced"
        );
        Ok(MonthOutcome::Advanced {
            month: state.current_month,
            new_requests,
            new_events,
            doom_gained: state.doom.value().saturating_sub(before.value()),
        })
    }

    /// Return to the pristine pre-selection state.
    ///
    /// The RNG stream and id counter continue, so ids stay unique across
    /// games played in one session.
    pub fn reset_game(&mut self) {
        info!("game reset");
        self.state = GameState::initial(&self.config.rules);
    }

    /// Queue one random teacher request outside the monthly cycle.
    pub fn generate_teacher_request(&mut self) -> Result<RequestId, Rejection> {
        self.generate_teacher_request_in(None)
    }

    /// Queue one teacher request, optionally pinned to a category.
    pub fn generate_teacher_request_in(
        &mut self,
        category: Option<&CategoryId>,
    ) -> Result<RequestId, Rejection> {
        const OP: &str = "generate_teacher_request";
        self.require_in_progress(OP)?;
        let Some(request) = self
            .content
            .generate_request(&mut self.rng, &mut self.ids, category)
        else {
            return reject(OP, Rejection::ContentExhausted("teacher request"));
        };
        let id = request.id.clone();
        self.state.teacher_requests.push(request);
        Ok(id)
    }

    /// Queue one crisis drawn from the difficulty-weighted pool.
    pub fn generate_crisis_event(&mut self) -> Result<EventId, Rejection> {
        const OP: &str = "generate_crisis_event";
        let difficulty = self.require_in_progress(OP)?;
        let Some(event) = self
            .content
            .random_crisis_events(&mut self.rng, &mut self.ids, 1, difficulty)
            .pop()
        else {
            return reject(OP, Rejection::ContentExhausted("crisis event"));
        };
        let id = event.id.clone();
        self.state.crisis_events.push(event);
        Ok(id)
    }
}
