use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::blend::BlendConfig;
use crate::calibration::CalibrationPolicy;
use crate::elo::EloConfig;
use crate::error::{EngineError, EngineResult};
use crate::score_matrix::MAX_GOALS_LIMIT;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MatrixConfig {
    pub max_goals: u32,
    // Tail probability above which a truncation warning is attached.
    pub max_tail_mass: f64,
}

impl Default for MatrixConfig {
    fn default() -> Self {
        Self {
            max_goals: 5,
            max_tail_mass: 0.01,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MarketsConfig {
    pub goal_line: f64,
    pub top_scores: usize,
    pub value_min_edge: f64,
    pub include_matrix: bool,
}

impl Default for MarketsConfig {
    fn default() -> Self {
        Self {
            goal_line: 2.5,
            top_scores: 5,
            value_min_edge: 0.05,
            include_matrix: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub elo: EloConfig,
    pub blend: BlendConfig,
    pub matrix: MatrixConfig,
    pub markets: MarketsConfig,
    pub calibration: CalibrationPolicy,
    pub fallback_to_baseline: bool,
    // Form and strength window when signals are derived from history.
    pub form_window: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            elo: EloConfig::default(),
            blend: BlendConfig::default(),
            matrix: MatrixConfig::default(),
            markets: MarketsConfig::default(),
            calibration: CalibrationPolicy::disabled(),
            fallback_to_baseline: true,
            form_window: 5,
        }
    }
}

impl EngineConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let raw = fs::read_to_string(path)
            .with_context(|| format!("read engine config {}", path.display()))?;
        let cfg: Self = serde_json::from_str(&raw).context("parse engine config")?;
        cfg.validate().context("validate engine config")?;
        Ok(cfg)
    }

    pub fn validate(&self) -> EngineResult<()> {
        if !self.elo.k.is_finite() || self.elo.k <= 0.0 {
            return Err(EngineError::InvalidConfig("elo.k must be > 0".into()));
        }
        if !self.elo.baseline.is_finite() {
            return Err(EngineError::InvalidConfig("elo.baseline not finite".into()));
        }
        if !self.elo.margin_step.is_finite()
            || self.elo.margin_step < 0.0
            || !self.elo.margin_cap.is_finite()
            || self.elo.margin_cap < 0.0
        {
            return Err(EngineError::InvalidConfig("elo margin bonus must be >= 0".into()));
        }
        self.blend.validate()?;
        if !(1..=MAX_GOALS_LIMIT).contains(&self.matrix.max_goals) {
            return Err(EngineError::InvalidConfig(format!(
                "matrix.max_goals must lie in 1..={MAX_GOALS_LIMIT}"
            )));
        }
        if !(0.0..1.0).contains(&self.matrix.max_tail_mass) {
            return Err(EngineError::InvalidConfig("matrix.max_tail_mass outside [0, 1)".into()));
        }
        if !self.markets.goal_line.is_finite() || self.markets.goal_line < 0.0 {
            return Err(EngineError::InvalidConfig("markets.goal_line must be >= 0".into()));
        }
        if self.form_window == 0 {
            return Err(EngineError::InvalidConfig("form_window must be >= 1".into()));
        }
        self.calibration.validate()
    }
}
