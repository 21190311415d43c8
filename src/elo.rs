use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::contest::{Contest, EntityId, Outcome, sorted_by_kickoff};
use crate::error::ContestError;
use crate::rating_store::{DEFAULT_BASELINE, RatingStore};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EloConfig {
    pub k: f64,
    pub baseline: f64,
    // Goal-margin K bonus: k + min(margin * margin_step, margin_cap). Zero disables it.
    pub margin_step: f64,
    pub margin_cap: f64,
}

impl Default for EloConfig {
    fn default() -> Self {
        Self {
            k: 32.0,
            baseline: DEFAULT_BASELINE,
            margin_step: 0.0,
            margin_cap: 20.0,
        }
    }
}

impl EloConfig {
    /// One K for both sides of the contest; that is what keeps the update zero-sum.
    pub fn k_for_margin(&self, margin: u32) -> f64 {
        let bonus = (margin as f64 * self.margin_step).min(self.margin_cap).max(0.0);
        self.k + bonus
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RatingDelta {
    pub home_before: f64,
    pub away_before: f64,
    pub home_change: f64,
    pub away_change: f64,
}

impl RatingDelta {
    pub fn home_after(&self) -> f64 {
        self.home_before + self.home_change
    }

    pub fn away_after(&self) -> f64 {
        self.away_before + self.away_change
    }
}

#[derive(Debug, Clone)]
pub struct SkippedContest {
    pub position: usize,
    pub home: EntityId,
    pub away: EntityId,
    pub reason: ContestError,
}

#[derive(Debug, Clone)]
pub struct ReplayReport {
    pub store: RatingStore,
    pub applied: usize,
    pub skipped: Vec<SkippedContest>,
}

/// Probability-like expected score of `r_a` against `r_b`.
pub fn expected_score(r_a: f64, r_b: f64) -> f64 {
    1.0 / (1.0 + 10.0_f64.powf((r_b - r_a) / 400.0))
}

#[derive(Debug, Clone, Copy, Default)]
pub struct RatingUpdater {
    cfg: EloConfig,
}

impl RatingUpdater {
    pub fn new(cfg: EloConfig) -> Self {
        Self { cfg }
    }

    pub fn config(&self) -> &EloConfig {
        &self.cfg
    }

    /// Applies one contest. No home advantage here: the offset belongs to prediction time.
    pub fn apply(
        &self,
        store: &mut RatingStore,
        contest: &Contest,
    ) -> Result<RatingDelta, ContestError> {
        let score = contest.validate()?;

        let r_home = store.touch(&contest.home);
        let r_away = store.touch(&contest.away);

        let expected_home = expected_score(r_home, r_away);
        let s_home = match score.outcome() {
            Outcome::Home => 1.0,
            Outcome::Draw => 0.5,
            Outcome::Away => 0.0,
        };

        let delta = self.cfg.k_for_margin(score.margin()) * (s_home - expected_home);
        store.set(&contest.home.id, r_home + delta);
        store.set(&contest.away.id, r_away - delta);
        store.record_played(&contest.home.id);
        store.record_played(&contest.away.id);

        debug!(
            home = %contest.home.id,
            away = %contest.away.id,
            score = %format!("{}-{}", score.home_goals, score.away_goals),
            delta,
            "rating update"
        );

        Ok(RatingDelta {
            home_before: r_home,
            away_before: r_away,
            home_change: delta,
            away_change: -delta,
        })
    }

    /// Replays the history into a fresh store, sorting by kickoff first.
    pub fn replay(&self, contests: &[Contest]) -> ReplayReport {
        let mut store = RatingStore::new(self.cfg.baseline);
        let (applied, skipped) = self.replay_into(&mut store, contests);
        ReplayReport {
            store,
            applied,
            skipped,
        }
    }

    /// Replays only the contests that kicked off strictly before `before`, so a
    /// dated fixture is never rated with its own or later results. Undated rows
    /// are kept so they show up as skipped. `None` replays everything.
    pub fn replay_before(
        &self,
        contests: &[Contest],
        before: Option<DateTime<Utc>>,
    ) -> ReplayReport {
        let Some(cut) = before else {
            return self.replay(contests);
        };
        let mut store = RatingStore::new(self.cfg.baseline);
        let ordered = sorted_by_kickoff(contests)
            .into_iter()
            .filter(|c| c.kickoff.is_none_or(|k| k < cut))
            .collect();
        let (applied, skipped) = self.apply_ordered(&mut store, ordered);
        ReplayReport {
            store,
            applied,
            skipped,
        }
    }

    /// Continues an existing store with more history.
    pub fn replay_into(
        &self,
        store: &mut RatingStore,
        contests: &[Contest],
    ) -> (usize, Vec<SkippedContest>) {
        self.apply_ordered(store, sorted_by_kickoff(contests))
    }

    fn apply_ordered(
        &self,
        store: &mut RatingStore,
        ordered: Vec<&Contest>,
    ) -> (usize, Vec<SkippedContest>) {
        let mut applied = 0usize;
        let mut skipped = Vec::new();

        for (position, contest) in ordered.into_iter().enumerate() {
            match self.apply(store, contest) {
                Ok(_) => applied += 1,
                Err(reason) => {
                    warn!(
                        position,
                        home = %contest.home.id,
                        away = %contest.away.id,
                        %reason,
                        "skipping malformed contest"
                    );
                    skipped.push(SkippedContest {
                        position,
                        home: contest.home.id.clone(),
                        away: contest.away.id.clone(),
                        reason,
                    });
                }
            }
        }

        info!(
            applied,
            skipped = skipped.len(),
            entities = store.len(),
            "rating replay finished"
        );
        (applied, skipped)
    }
}
