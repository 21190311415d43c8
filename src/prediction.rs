use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::blend::{BlendWeights, ExpectedGoals, RateBound, SignalBlender};
use crate::calibration::calibrate;
use crate::config::EngineConfig;
use crate::contest::{Contest, Entity, EntityId, Outcome};
use crate::elo::RatingUpdater;
use crate::error::{EngineError, EngineResult};
use crate::market::{ValueBet, value_bets};
use crate::metrics::Prob3;
use crate::rating_store::RatingStore;
use crate::score_matrix::{ScoreEntry, ScoreMatrix, Scoreline};
use crate::signals::SignalSet;

/// An upcoming contest plus whatever signals a collaborator gathered for it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Fixture {
    pub home: Entity,
    pub away: Entity,
    #[serde(default)]
    pub kickoff: Option<DateTime<Utc>>,
    #[serde(default)]
    pub signals: SignalSet,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Side {
    Home,
    Away,
}

/// Data-quality conditions that degrade a prediction without failing it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PredictionWarning {
    UnknownEntity { entity: EntityId },
    RateFloored { side: Side, floor: f64 },
    RateCapped { side: Side, cap: f64 },
    TruncatedTail { tail_mass: f64, max_goals: u32 },
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RatingsUsed {
    pub home: f64,
    pub away: f64,
    pub home_advantage: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MatchResultMarket {
    pub home: f64,
    pub draw: f64,
    pub away: f64,
    pub pick: Outcome,
    pub confidence: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TotalsPick {
    Over,
    Under,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TotalGoalsMarket {
    pub line: f64,
    pub over: f64,
    pub under: f64,
    pub pick: TotalsPick,
    pub confidence: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BothScoreMarket {
    pub yes: f64,
    pub no: f64,
    pub pick: bool,
    pub confidence: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ExactScoreMarket {
    pub score: Scoreline,
    pub confidence: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredictionRecord {
    pub home: EntityId,
    pub away: EntityId,
    pub ratings: RatingsUsed,
    pub expected_goals: ExpectedGoals,
    pub match_result: MatchResultMarket,
    pub total_goals: TotalGoalsMarket,
    pub both_score: BothScoreMarket,
    pub exact_score: ExactScoreMarket,
    pub top_scores: Vec<ScoreEntry>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub matrix: Option<Vec<Vec<f64>>>,
    pub weights: BlendWeights,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub calibration: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub value_bets: Vec<ValueBet>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<PredictionWarning>,
}

impl PredictionRecord {
    pub fn is_degraded(&self) -> bool {
        !self.warnings.is_empty()
    }
}

/// Turns a finished rating snapshot plus per-fixture signals into prediction records.
///
/// Holds the store by shared reference: nothing can replay into it while predictions run.
pub struct PredictionAssembler<'a> {
    ratings: &'a RatingStore,
    cfg: &'a EngineConfig,
    blender: SignalBlender,
}

impl<'a> PredictionAssembler<'a> {
    pub fn new(ratings: &'a RatingStore, cfg: &'a EngineConfig) -> EngineResult<Self> {
        cfg.validate()?;
        Ok(Self {
            ratings,
            cfg,
            blender: SignalBlender::new(cfg.blend),
        })
    }

    pub fn predict_fixture(&self, fixture: &Fixture) -> EngineResult<PredictionRecord> {
        self.predict(&fixture.home.id, &fixture.away.id, &fixture.signals)
    }

    /// One result per fixture, in input order. A failing fixture never aborts the batch.
    pub fn predict_batch(&self, fixtures: &[Fixture]) -> Vec<EngineResult<PredictionRecord>> {
        fixtures.par_iter().map(|f| self.predict_fixture(f)).collect()
    }

    pub fn predict(
        &self,
        home: &EntityId,
        away: &EntityId,
        signals: &SignalSet,
    ) -> EngineResult<PredictionRecord> {
        if home.is_blank() || away.is_blank() {
            return Err(EngineError::InvalidFixture("missing entity identifier".into()));
        }
        if home == away {
            return Err(EngineError::InvalidFixture(format!("{home} cannot play itself")));
        }

        let mut warnings = Vec::new();
        for id in [home, away] {
            if self.ratings.contains(id) {
                continue;
            }
            if !self.cfg.fallback_to_baseline {
                return Err(EngineError::UnknownEntity(id.clone()));
            }
            warnings.push(PredictionWarning::UnknownEntity { entity: id.clone() });
        }

        let offset = self.cfg.blend.home_advantage_offset;
        let blended = self
            .blender
            .blend(home, away, self.ratings, signals, offset)?;
        for (side, bound) in [
            (Side::Home, blended.home_bound),
            (Side::Away, blended.away_bound),
        ] {
            match bound {
                RateBound::Within => {}
                RateBound::Floored => warnings.push(PredictionWarning::RateFloored {
                    side,
                    floor: self.cfg.blend.min_rate,
                }),
                RateBound::Capped => warnings.push(PredictionWarning::RateCapped {
                    side,
                    cap: self.cfg.blend.max_rate,
                }),
            }
        }

        let mut matrix = ScoreMatrix::build(
            blended.rates.home,
            blended.rates.away,
            self.cfg.matrix.max_goals,
        )?;
        if matrix.tail_mass() > self.cfg.matrix.max_tail_mass {
            warnings.push(PredictionWarning::TruncatedTail {
                tail_mass: matrix.tail_mass(),
                max_goals: matrix.max_goals(),
            });
        }

        if let Some(market) = blended.market {
            let target = matrix.outcome_probs().mix(&market.probs, market.weight);
            matrix = matrix.rebalance_outcomes(&target)?;
        }

        let policy = &self.cfg.calibration;
        let matrix = calibrate(&matrix, policy)?;
        matrix.check_normalized()?;

        for w in &warnings {
            warn!(%home, %away, warning = ?w, "degraded prediction");
        }

        let markets = &self.cfg.markets;
        let match_result = match_result_market(&matrix);
        let value_bets = signals
            .market
            .and_then(|m| m.odds)
            .map(|odds| {
                let model = Prob3 {
                    home: match_result.home,
                    draw: match_result.draw,
                    away: match_result.away,
                };
                value_bets(&model, &odds, markets.value_min_edge)
            })
            .unwrap_or_default();
        let most_likely = matrix.most_likely();

        Ok(PredictionRecord {
            home: home.clone(),
            away: away.clone(),
            ratings: RatingsUsed {
                home: self.ratings.get(home),
                away: self.ratings.get(away),
                home_advantage: offset,
            },
            expected_goals: blended.rates,
            match_result,
            total_goals: total_goals_market(&matrix, markets.goal_line),
            both_score: both_score_market(&matrix),
            exact_score: ExactScoreMarket {
                score: most_likely.score,
                confidence: most_likely.probability,
            },
            top_scores: matrix.top(markets.top_scores),
            matrix: markets.include_matrix.then(|| matrix.rows()),
            weights: blended.weights,
            calibration: policy.is_enabled().then(|| policy.label.clone()),
            value_bets,
            warnings,
        })
    }
}

/// Predicts every fixture from ratings replayed up to its own kickoff. Fixtures
/// sharing a kickoff share one replay; undated fixtures see the whole history.
/// Results come back in input order.
pub fn predict_as_of(
    history: &[Contest],
    fixtures: &[Fixture],
    cfg: &EngineConfig,
) -> EngineResult<Vec<EngineResult<PredictionRecord>>> {
    let updater = RatingUpdater::new(cfg.elo);
    let mut by_kickoff: BTreeMap<Option<DateTime<Utc>>, Vec<usize>> = BTreeMap::new();
    for (idx, f) in fixtures.iter().enumerate() {
        by_kickoff.entry(f.kickoff).or_default().push(idx);
    }

    let mut slots: Vec<Option<EngineResult<PredictionRecord>>> =
        fixtures.iter().map(|_| None).collect();
    for (kickoff, indices) in by_kickoff {
        let store = updater.replay_before(history, kickoff).store;
        let assembler = PredictionAssembler::new(&store, cfg)?;
        let results: Vec<_> = indices
            .par_iter()
            .map(|&idx| assembler.predict_fixture(&fixtures[idx]))
            .collect();
        for (idx, res) in indices.into_iter().zip(results) {
            slots[idx] = Some(res);
        }
    }
    Ok(slots.into_iter().flatten().collect())
}

fn match_result_market(matrix: &ScoreMatrix) -> MatchResultMarket {
    let p = matrix.outcome_probs();
    let pick = p.argmax();
    MatchResultMarket {
        home: p.home,
        draw: p.draw,
        away: p.away,
        pick,
        confidence: p.get(pick),
    }
}

fn total_goals_market(matrix: &ScoreMatrix, line: f64) -> TotalGoalsMarket {
    let over = matrix.over(line);
    let under = matrix.under_or_equal(line);
    let (pick, confidence) = if over > under {
        (TotalsPick::Over, over)
    } else {
        (TotalsPick::Under, under)
    };
    TotalGoalsMarket {
        line,
        over,
        under,
        pick,
        confidence,
    }
}

fn both_score_market(matrix: &ScoreMatrix) -> BothScoreMarket {
    let yes = matrix.both_score();
    let no = 1.0 - yes;
    BothScoreMarket {
        yes,
        no,
        pick: yes > no,
        confidence: yes.max(no),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn totals_pick_follows_larger_side() {
        let m = ScoreMatrix::build(2.4, 1.9, 8).unwrap();
        let t = total_goals_market(&m, 2.5);
        assert_eq!(t.pick, TotalsPick::Over);
        assert_eq!(t.confidence, t.over);
        let low = ScoreMatrix::build(0.6, 0.5, 5).unwrap();
        assert_eq!(total_goals_market(&low, 2.5).pick, TotalsPick::Under);
    }

    #[test]
    fn warning_serializes_with_kind_tag() {
        let w = PredictionWarning::RateFloored {
            side: Side::Away,
            floor: 0.05,
        };
        let json = serde_json::to_string(&w).unwrap();
        assert_eq!(json, r#"{"kind":"rate_floored","side":"away","floor":0.05}"#);
    }
}
