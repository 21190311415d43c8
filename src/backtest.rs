//! Walk-forward evaluation: every contest is predicted from the ratings and
//! history strictly before it, scored, and only then folded into the ratings.

use serde::Serialize;
use tracing::{info, warn};

use crate::config::EngineConfig;
use crate::contest::{Contest, Outcome, sorted_by_kickoff};
use crate::elo::RatingUpdater;
use crate::error::{EngineError, EngineResult};
use crate::metrics::{Metrics, Prob3, ece_1x2, empirical_outcome_probs, evaluate_probs};
use crate::prediction::PredictionAssembler;
use crate::rating_store::RatingStore;
use crate::signals::{ScoredContest, SignalSet};

const ECE_BINS: usize = 10;

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct BacktestOptions {
    /// Valid contests replayed before predictions start being scored.
    pub warmup: usize,
    /// Derive head-to-head, form and strength signals from prior contests.
    pub derive_signals: bool,
}

impl Default for BacktestOptions {
    fn default() -> Self {
        Self {
            warmup: 0,
            derive_signals: true,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct BacktestReport {
    pub evaluated: usize,
    pub skipped: usize,
    pub model: Metrics,
    /// Running outcome frequencies as the prediction: the bar the model has to clear.
    pub base_rate: Metrics,
    pub ece: f64,
    #[serde(skip)]
    pub predictions: Vec<Prob3>,
    #[serde(skip)]
    pub outcomes: Vec<Outcome>,
}

impl BacktestReport {
    pub fn log_loss_gain(&self) -> f64 {
        self.base_rate.log_loss - self.model.log_loss
    }
}

pub fn walk_forward(
    history: &[Contest],
    cfg: &EngineConfig,
    opts: BacktestOptions,
) -> EngineResult<BacktestReport> {
    // Every entity is unknown on first sight in a replay, so the fallback is forced on.
    let mut cfg = cfg.clone();
    cfg.fallback_to_baseline = true;
    cfg.validate()?;

    let updater = RatingUpdater::new(cfg.elo);
    let mut store = RatingStore::new(cfg.elo.baseline);
    // Validated and in kickoff order, so signal derivation never re-sorts.
    let mut past: Vec<ScoredContest<'_>> = Vec::new();
    let mut seen: Vec<Outcome> = Vec::new();

    let mut predictions = Vec::new();
    let mut base_preds = Vec::new();
    let mut outcomes = Vec::new();
    let mut skipped = 0usize;

    for contest in sorted_by_kickoff(history) {
        let score = match contest.validate() {
            Ok(s) => s,
            Err(reason) => {
                warn!(
                    home = %contest.home.id,
                    away = %contest.away.id,
                    %reason,
                    "backtest skip"
                );
                skipped += 1;
                continue;
            }
        };

        if seen.len() >= opts.warmup {
            let signals = if opts.derive_signals {
                SignalSet::from_scored(&past, &contest.home.id, &contest.away.id, cfg.form_window)
            } else {
                SignalSet::default()
            };
            let record = PredictionAssembler::new(&store, &cfg)?.predict(
                &contest.home.id,
                &contest.away.id,
                &signals,
            )?;
            let r = record.match_result;
            predictions.push(Prob3 {
                home: r.home,
                draw: r.draw,
                away: r.away,
            });
            base_preds.push(empirical_outcome_probs(&seen));
            outcomes.push(score.outcome());
        }

        updater.apply(&mut store, contest).map_err(|e| {
            EngineError::InvariantViolation(format!("validated contest rejected: {e}"))
        })?;
        seen.push(score.outcome());
        past.push((contest, score));
    }

    let report = BacktestReport {
        evaluated: predictions.len(),
        skipped,
        model: evaluate_probs(&predictions, &outcomes),
        base_rate: evaluate_probs(&base_preds, &outcomes),
        ece: ece_1x2(&predictions, &outcomes, ECE_BINS),
        predictions,
        outcomes,
    };
    info!(
        evaluated = report.evaluated,
        skipped = report.skipped,
        log_loss = report.model.log_loss,
        brier = report.model.brier,
        gain = report.log_loss_gain(),
        "walk-forward backtest finished"
    );
    Ok(report)
}
