//! Optional scoreline calibration.
//!
//! These stages reproduce the "boost common scores / boost the favourites" output
//! style of older report scripts. They have no statistical grounding, shift the
//! most-likely score, and are never applied unless a policy is configured.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::contest::Outcome;
use crate::error::{EngineError, EngineResult};
use crate::score_matrix::{ScoreMatrix, Scoreline};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum CalibrationStage {
    /// Multiply the listed scorelines by `factor`.
    BoostScores {
        scores: Vec<Scoreline>,
        factor: f64,
    },
    /// Multiply the `n` most probable cells by `factor`.
    BoostTopN {
        n: usize,
        factor: f64,
        #[serde(default)]
        rank: RankBasis,
    },
    /// Multiply every cell by `1 + P(outcome)`, read from the uncalibrated matrix.
    WeightByOutcome,
}

/// Which matrix a top-N boost ranks cells on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RankBasis {
    /// The matrix handed to `calibrate`, before any stage ran.
    Input,
    /// The matrix as left by the previous stage.
    #[default]
    Current,
}

impl CalibrationStage {
    fn factor(&self) -> f64 {
        match self {
            CalibrationStage::BoostScores { factor, .. } => *factor,
            CalibrationStage::BoostTopN { factor, .. } => *factor,
            CalibrationStage::WeightByOutcome => 1.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct CalibrationPolicy {
    #[serde(default)]
    pub label: String,
    #[serde(default)]
    pub stages: Vec<CalibrationStage>,
}

impl CalibrationPolicy {
    pub fn disabled() -> Self {
        Self::default()
    }

    pub fn is_enabled(&self) -> bool {
        !self.stages.is_empty()
    }

    /// Common low scores x1.5, top-3 x2.0, outcome weighting, then top-2 x3.0.
    /// Both top-N boosts rank on the uncalibrated matrix.
    pub fn source_style() -> Self {
        let common = ["1-0", "2-1", "1-1", "0-0", "2-0", "0-1", "1-2", "0-2"]
            .iter()
            .filter_map(|s| s.parse().ok())
            .collect();
        Self {
            label: "source-style-boost".to_string(),
            stages: vec![
                CalibrationStage::BoostScores {
                    scores: common,
                    factor: 1.5,
                },
                CalibrationStage::BoostTopN {
                    n: 3,
                    factor: 2.0,
                    rank: RankBasis::Input,
                },
                CalibrationStage::WeightByOutcome,
                CalibrationStage::BoostTopN {
                    n: 2,
                    factor: 3.0,
                    rank: RankBasis::Input,
                },
            ],
        }
    }

    pub fn validate(&self) -> EngineResult<()> {
        for stage in &self.stages {
            let f = stage.factor();
            if !f.is_finite() || f <= 0.0 {
                return Err(EngineError::InvalidConfig(format!(
                    "calibration `{}` has non-positive factor {f}",
                    self.label
                )));
            }
        }
        if self.is_enabled() && self.label.trim().is_empty() {
            return Err(EngineError::InvalidConfig(
                "an enabled calibration policy needs a label".into(),
            ));
        }
        Ok(())
    }
}

/// Applies every stage in order, renormalizing after each one.
/// A disabled policy hands back an untouched copy.
pub fn calibrate(matrix: &ScoreMatrix, policy: &CalibrationPolicy) -> EngineResult<ScoreMatrix> {
    if !policy.is_enabled() {
        return Ok(matrix.clone());
    }
    policy.validate()?;

    let split = matrix.outcome_probs();
    let mut out = matrix.clone();
    for stage in &policy.stages {
        match stage {
            CalibrationStage::BoostScores { scores, factor } => {
                out.scale_where(*factor, |s| scores.contains(&s));
            }
            CalibrationStage::BoostTopN { n, factor, rank } => {
                let ranked = match rank {
                    RankBasis::Input => matrix.top(*n),
                    RankBasis::Current => out.top(*n),
                };
                let top: Vec<Scoreline> = ranked.into_iter().map(|e| e.score).collect();
                out.scale_where(*factor, |s| top.contains(&s));
            }
            CalibrationStage::WeightByOutcome => {
                for outcome in [Outcome::Home, Outcome::Draw, Outcome::Away] {
                    let weight = 1.0 + split.get(outcome);
                    out.scale_where(weight, |s| s.outcome() == outcome);
                }
            }
        }
        out.renormalize()?;
    }
    debug!(policy = %policy.label, stages = policy.stages.len(), "score matrix calibrated");
    Ok(out)
}
