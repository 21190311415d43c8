use serde::{Deserialize, Serialize};

use crate::contest::EntityId;
use crate::elo::expected_score;
use crate::error::{EngineError, EngineResult};
use crate::metrics::Prob3;
use crate::rating_store::RatingStore;
use crate::signals::{HeadToHead, SignalSet, StrengthPair};

const WEIGHT_TOLERANCE: f64 = 1e-9;
const FORM_SMOOTHING: f64 = 0.10;
/// Highest `max_rate` a config may set; the Poisson grid stays representable below it.
pub const RATE_LIMIT: f64 = 100.0;

/// Every weight is a convex-combination coefficient; zero switches a signal off.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BlendConfig {
    pub goals_total_base: f64,
    pub home_advantage_offset: f64,
    // Head-to-head weight: min(h2h_cap, meetings * h2h_step).
    pub h2h_step: f64,
    pub h2h_cap: f64,
    // Share moved toward the side with more head-to-head wins (0.1 => 60/40).
    pub h2h_lean: f64,
    pub market_weight: f64,
    pub form_weight: f64,
    pub min_rate: f64,
    pub max_rate: f64,
}

impl Default for BlendConfig {
    fn default() -> Self {
        Self {
            goals_total_base: 2.60,
            home_advantage_offset: 60.0,
            h2h_step: 0.15,
            h2h_cap: 0.40,
            h2h_lean: 0.10,
            market_weight: 0.35,
            form_weight: 0.15,
            min_rate: 0.05,
            max_rate: 10.0,
        }
    }
}

impl BlendConfig {
    pub fn validate(&self) -> EngineResult<()> {
        let unit = [
            ("h2h_cap", self.h2h_cap),
            ("h2h_lean", self.h2h_lean * 2.0),
            ("market_weight", self.market_weight),
            ("form_weight", self.form_weight),
        ];
        for (name, v) in unit {
            if !v.is_finite() || !(0.0..=1.0).contains(&v) {
                return Err(EngineError::InvalidConfig(format!("{name} outside [0, 1]")));
            }
        }
        if !self.h2h_step.is_finite() || self.h2h_step < 0.0 {
            return Err(EngineError::InvalidConfig("h2h_step must be >= 0".into()));
        }
        if !self.goals_total_base.is_finite() || self.goals_total_base <= 0.0 {
            return Err(EngineError::InvalidConfig("goals_total_base must be > 0".into()));
        }
        if !self.min_rate.is_finite() || self.min_rate <= 0.0 {
            return Err(EngineError::InvalidConfig("min_rate must be > 0".into()));
        }
        let max_ok = self.max_rate > self.min_rate && self.max_rate <= RATE_LIMIT;
        if !max_ok {
            return Err(EngineError::InvalidConfig(format!(
                "max_rate must lie in (min_rate, {RATE_LIMIT}]"
            )));
        }
        if !self.home_advantage_offset.is_finite() {
            return Err(EngineError::InvalidConfig("home_advantage_offset not finite".into()));
        }
        Ok(())
    }

    pub fn h2h_weight(&self, meetings: u32) -> f64 {
        (meetings as f64 * self.h2h_step).min(self.h2h_cap).clamp(0.0, 1.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ExpectedGoals {
    pub home: f64,
    pub away: f64,
}

impl ExpectedGoals {
    pub fn total(&self) -> f64 {
        self.home + self.away
    }

    fn mix(&self, other: &ExpectedGoals, w: f64) -> Self {
        Self {
            home: (1.0 - w) * self.home + w * other.home,
            away: (1.0 - w) * self.away + w * other.away,
        }
    }

    fn split(total: f64, home_share: f64) -> Self {
        Self {
            home: total * home_share,
            away: total * (1.0 - home_share),
        }
    }
}

/// Effective weight of each signal after missing signals are normalized away.
/// `baseline + head_to_head + form == 1` and `model + market == 1`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BlendWeights {
    pub baseline: f64,
    pub head_to_head: f64,
    pub form: f64,
    pub model: f64,
    pub market: f64,
}

impl BlendWeights {
    pub fn check(&self) -> EngineResult<()> {
        let all = [
            self.baseline,
            self.head_to_head,
            self.form,
            self.model,
            self.market,
        ];
        if all
            .iter()
            .any(|w| !w.is_finite() || *w < -WEIGHT_TOLERANCE || *w > 1.0 + WEIGHT_TOLERANCE)
        {
            return Err(EngineError::InvariantViolation(format!(
                "blend weight outside [0, 1]: {self:?}"
            )));
        }
        let goals = self.baseline + self.head_to_head + self.form;
        let outcome = self.model + self.market;
        if (goals - 1.0).abs() > WEIGHT_TOLERANCE || (outcome - 1.0).abs() > WEIGHT_TOLERANCE {
            return Err(EngineError::InvariantViolation(format!(
                "blend weights do not sum to 1: goals={goals} outcome={outcome}"
            )));
        }
        Ok(())
    }
}

/// Market view of the 1X2 split, applied to the score matrix by the assembler.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MarketBlend {
    pub probs: Prob3,
    pub weight: f64,
}

/// Whether a goal rate had to be pulled back inside `[min_rate, max_rate]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateBound {
    Within,
    Floored,
    Capped,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BlendOutput {
    pub rates: ExpectedGoals,
    pub weights: BlendWeights,
    pub market: Option<MarketBlend>,
    /// Rating-implied expected score of the home side, offset included.
    pub rating_expectation: f64,
    pub home_bound: RateBound,
    pub away_bound: RateBound,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SignalBlender {
    cfg: BlendConfig,
}

impl SignalBlender {
    pub fn new(cfg: BlendConfig) -> Self {
        Self { cfg }
    }

    pub fn config(&self) -> &BlendConfig {
        &self.cfg
    }

    pub fn blend(
        &self,
        home: &EntityId,
        away: &EntityId,
        ratings: &RatingStore,
        signals: &SignalSet,
        home_advantage_offset: f64,
    ) -> EngineResult<BlendOutput> {
        let cfg = &self.cfg;
        let rating_expectation =
            expected_score(ratings.get(home) + home_advantage_offset, ratings.get(away));

        let home_share = signals
            .strength
            .and_then(|s| strength_share(&s))
            .unwrap_or(rating_expectation);
        let mut rates = ExpectedGoals::split(cfg.goals_total_base, home_share);

        let w_h2h = match signals.head_to_head {
            Some(h2h) if h2h.is_usable() => {
                let w = cfg.h2h_weight(h2h.meetings);
                rates = rates.mix(&h2h_rates(&h2h, cfg.h2h_lean), w);
                w
            }
            _ => 0.0,
        };

        let w_form = match signals.form {
            Some(form) if form.is_usable() && cfg.form_weight > 0.0 => {
                let share = (form.home + FORM_SMOOTHING)
                    / (form.home + form.away + 2.0 * FORM_SMOOTHING);
                rates = rates.mix(&ExpectedGoals::split(rates.total(), share), cfg.form_weight);
                cfg.form_weight
            }
            _ => 0.0,
        };

        let market = match signals.market.and_then(|m| m.implied()) {
            Some(probs) if cfg.market_weight > 0.0 => Some(MarketBlend {
                probs,
                weight: cfg.market_weight,
            }),
            _ => None,
        };
        let w_market = market.map(|m| m.weight).unwrap_or(0.0);

        let weights = BlendWeights {
            baseline: (1.0 - w_form) * (1.0 - w_h2h),
            head_to_head: (1.0 - w_form) * w_h2h,
            form: w_form,
            model: 1.0 - w_market,
            market: w_market,
        };
        debug_assert!(weights.check().is_ok(), "blend weights: {weights:?}");
        weights.check()?;

        let (home_rate, home_bound) = bound_rate(rates.home, cfg.min_rate, cfg.max_rate);
        let (away_rate, away_bound) = bound_rate(rates.away, cfg.min_rate, cfg.max_rate);

        Ok(BlendOutput {
            rates: ExpectedGoals {
                home: home_rate,
                away: away_rate,
            },
            weights,
            market,
            rating_expectation,
            home_bound,
            away_bound,
        })
    }
}

/// Home attack against away defence, relative to the mirrored pairing.
fn strength_share(s: &StrengthPair) -> Option<f64> {
    if !s.home.is_usable() || !s.away.is_usable() {
        return None;
    }
    let home_side = s.home.scored_per_match + s.away.conceded_per_match;
    let away_side = s.away.scored_per_match + s.home.conceded_per_match;
    let sum = home_side + away_side;
    if sum <= 0.0 {
        return None;
    }
    Some(home_side / sum)
}

fn h2h_rates(h2h: &HeadToHead, lean: f64) -> ExpectedGoals {
    let share = match h2h.home_wins.cmp(&h2h.away_wins) {
        std::cmp::Ordering::Greater => 0.5 + lean,
        std::cmp::Ordering::Less => 0.5 - lean,
        std::cmp::Ordering::Equal => 0.5,
    };
    ExpectedGoals::split(h2h.goals_avg, share)
}

fn bound_rate(rate: f64, min_rate: f64, max_rate: f64) -> (f64, RateBound) {
    if rate.is_nan() || rate < min_rate {
        (min_rate, RateBound::Floored)
    } else if rate > max_rate {
        (max_rate, RateBound::Capped)
    } else {
        (rate, RateBound::Within)
    }
}
