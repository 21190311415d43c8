use serde::{Deserialize, Serialize};

use crate::contest::Outcome;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Prob3 {
    pub home: f64,
    pub draw: f64,
    pub away: f64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Metrics {
    pub samples: usize,
    pub brier: f64,
    pub log_loss: f64,
    pub accuracy: f64,
}

#[derive(Debug, Clone, Copy)]
pub struct CalibrationBin {
    pub bucket_start: f64,
    pub bucket_end: f64,
    pub count: usize,
    pub avg_pred: f64,
    pub actual_rate: f64,
}

impl Prob3 {
    pub fn uniform() -> Self {
        Self {
            home: 1.0 / 3.0,
            draw: 1.0 / 3.0,
            away: 1.0 / 3.0,
        }
    }

    pub fn sum(&self) -> f64 {
        self.home + self.draw + self.away
    }

    pub fn get(&self, outcome: Outcome) -> f64 {
        match outcome {
            Outcome::Home => self.home,
            Outcome::Draw => self.draw,
            Outcome::Away => self.away,
        }
    }

    /// Rescales to sum 1; `None` when there is no usable mass.
    pub fn normalized(&self) -> Option<Self> {
        let parts = [self.home, self.draw, self.away];
        if parts.iter().any(|p| !p.is_finite() || *p < 0.0) {
            return None;
        }
        let sum = self.sum();
        if sum <= 0.0 {
            return None;
        }
        Some(Self {
            home: self.home / sum,
            draw: self.draw / sum,
            away: self.away / sum,
        })
    }

    /// `(1 - w) * self + w * other`.
    pub fn mix(&self, other: &Prob3, w: f64) -> Self {
        Self {
            home: (1.0 - w) * self.home + w * other.home,
            draw: (1.0 - w) * self.draw + w * other.draw,
            away: (1.0 - w) * self.away + w * other.away,
        }
    }

    /// Ties prefer home, then draw.
    pub fn argmax(&self) -> Outcome {
        if self.home >= self.draw && self.home >= self.away {
            Outcome::Home
        } else if self.draw >= self.away {
            Outcome::Draw
        } else {
            Outcome::Away
        }
    }
}

const OUTCOMES: [Outcome; 3] = [Outcome::Home, Outcome::Draw, Outcome::Away];
// Log loss is capped at -ln(PROB_FLOOR) for a zero-probability outcome.
const PROB_FLOOR: f64 = 1e-12;

/// Observed outcome frequencies; uniform before anything has been seen.
pub fn empirical_outcome_probs(outcomes: &[Outcome]) -> Prob3 {
    let n = outcomes.len() as f64;
    let share = |o: Outcome| outcomes.iter().filter(|seen| **seen == o).count() as f64 / n;
    Prob3 {
        home: share(Outcome::Home),
        draw: share(Outcome::Draw),
        away: share(Outcome::Away),
    }
    .normalized()
    .unwrap_or_else(Prob3::uniform)
}

fn brier(p: &Prob3, actual: Outcome) -> f64 {
    OUTCOMES
        .iter()
        .map(|&o| p.get(o) - if o == actual { 1.0 } else { 0.0 })
        .map(|d| d * d)
        .sum()
}

/// Mean Brier score, log loss and argmax accuracy. Mismatched or empty
/// inputs score as zero samples.
pub fn evaluate_probs(predictions: &[Prob3], outcomes: &[Outcome]) -> Metrics {
    if predictions.is_empty() || predictions.len() != outcomes.len() {
        return Metrics::default();
    }
    let (brier_sum, loss_sum, hits) = predictions.iter().zip(outcomes).fold(
        (0.0, 0.0, 0usize),
        |(b, l, h), (p, &o)| {
            (
                b + brier(p, o),
                l - p.get(o).clamp(PROB_FLOOR, 1.0).ln(),
                h + usize::from(p.argmax() == o),
            )
        },
    );
    let n = predictions.len() as f64;
    Metrics {
        samples: predictions.len(),
        brier: brier_sum / n,
        log_loss: loss_sum / n,
        accuracy: hits as f64 / n,
    }
}

/// Reliability table for one class: equal-width probability buckets with the
/// mean predicted probability and the observed hit rate of each.
pub fn calibration_bins(
    predictions: &[Prob3],
    outcomes: &[Outcome],
    class: Outcome,
    bins: usize,
) -> Vec<CalibrationBin> {
    let bins = bins.max(2);
    let width = 1.0 / bins as f64;
    let mut table: Vec<CalibrationBin> = (0..bins)
        .map(|i| CalibrationBin {
            bucket_start: i as f64 * width,
            bucket_end: (i + 1) as f64 * width,
            count: 0,
            avg_pred: 0.0,
            actual_rate: 0.0,
        })
        .collect();

    for (p, outcome) in predictions.iter().zip(outcomes) {
        let q = p.get(class).clamp(0.0, 1.0);
        let bin = &mut table[((q * bins as f64) as usize).min(bins - 1)];
        bin.count += 1;
        bin.avg_pred += q;
        bin.actual_rate += f64::from(u8::from(*outcome == class));
    }
    for bin in table.iter_mut().filter(|b| b.count > 0) {
        bin.avg_pred /= bin.count as f64;
        bin.actual_rate /= bin.count as f64;
    }
    table
}

/// Expected calibration error averaged over the three 1X2 classes.
pub fn ece_1x2(predictions: &[Prob3], outcomes: &[Outcome], bins: usize) -> f64 {
    let n = predictions.len().min(outcomes.len());
    if n == 0 {
        return 0.0;
    }
    let gap: f64 = OUTCOMES
        .iter()
        .flat_map(|&class| calibration_bins(predictions, outcomes, class, bins))
        .map(|b| b.count as f64 * (b.avg_pred - b.actual_rate).abs())
        .sum();
    gap / (3.0 * n as f64)
}
