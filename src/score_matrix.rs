use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::contest::{Outcome, classify_outcome};
use crate::error::{EngineError, EngineResult};
use crate::metrics::Prob3;

pub const SUM_TOLERANCE: f64 = 1e-6;
/// Largest goal count per side a grid may span.
pub const MAX_GOALS_LIMIT: u32 = 20;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Scoreline {
    pub home: u32,
    pub away: u32,
}

impl Scoreline {
    pub fn new(home: u32, away: u32) -> Self {
        Self { home, away }
    }

    pub fn total(&self) -> u32 {
        self.home + self.away
    }

    pub fn outcome(&self) -> Outcome {
        classify_outcome(self.home, self.away)
    }
}

impl fmt::Display for Scoreline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.home, self.away)
    }
}

impl FromStr for Scoreline {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (h, a) = s
            .trim()
            .split_once('-')
            .ok_or_else(|| format!("scoreline `{s}` is not of the form H-A"))?;
        let home = h.trim().parse::<u32>().map_err(|e| format!("{s}: {e}"))?;
        let away = a.trim().parse::<u32>().map_err(|e| format!("{s}: {e}"))?;
        Ok(Self { home, away })
    }
}

impl TryFrom<String> for Scoreline {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Scoreline> for String {
    fn from(value: Scoreline) -> Self {
        value.to_string()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScoreEntry {
    pub score: Scoreline,
    pub probability: f64,
}

/// Most probable first; equal probabilities go to fewer total goals, then fewer home goals.
fn rank(a: &ScoreEntry, b: &ScoreEntry) -> Ordering {
    b.probability
        .total_cmp(&a.probability)
        .then(a.score.total().cmp(&b.score.total()))
        .then(a.score.home.cmp(&b.score.home))
}

/// Joint scoreline distribution over `0..=max_goals` for each side, row-major by home goals.
#[derive(Debug, Clone, PartialEq)]
pub struct ScoreMatrix {
    max_goals: u32,
    cells: Vec<f64>,
    tail_mass: f64,
}

impl ScoreMatrix {
    /// Independent Poisson marginals, renormalized over the truncated grid.
    pub fn build(home_rate: f64, away_rate: f64, max_goals: u32) -> EngineResult<Self> {
        if !(1..=MAX_GOALS_LIMIT).contains(&max_goals) {
            return Err(EngineError::InvalidConfig(format!(
                "max_goals must lie in 1..={MAX_GOALS_LIMIT}, got {max_goals}"
            )));
        }
        for rate in [home_rate, away_rate] {
            if !rate.is_finite() || rate <= 0.0 {
                return Err(EngineError::InvariantViolation(format!(
                    "poisson rate must be positive, got {rate}"
                )));
            }
        }

        let pmf_h = poisson_pmf(home_rate, max_goals);
        let pmf_a = poisson_pmf(away_rate, max_goals);
        let mut cells = Vec::with_capacity(pmf_h.len() * pmf_a.len());
        for p_h in &pmf_h {
            for p_a in &pmf_a {
                cells.push(p_h * p_a);
            }
        }

        let captured: f64 = cells.iter().sum();
        let mut matrix = Self {
            max_goals,
            cells,
            tail_mass: (1.0 - captured).max(0.0),
        };
        matrix.renormalize()?;
        Ok(matrix)
    }

    pub fn max_goals(&self) -> u32 {
        self.max_goals
    }

    fn side(&self) -> usize {
        self.max_goals as usize + 1
    }

    /// Probability mass the grid cap cut off before renormalization.
    pub fn tail_mass(&self) -> f64 {
        self.tail_mass
    }

    pub fn get(&self, home: u32, away: u32) -> f64 {
        if home > self.max_goals || away > self.max_goals {
            return 0.0;
        }
        self.cells[home as usize * self.side() + away as usize]
    }

    pub fn total(&self) -> f64 {
        self.cells.iter().sum()
    }

    pub fn entries(&self) -> impl Iterator<Item = ScoreEntry> + '_ {
        let side = self.side();
        self.cells.iter().enumerate().map(move |(idx, p)| ScoreEntry {
            score: Scoreline::new((idx / side) as u32, (idx % side) as u32),
            probability: *p,
        })
    }

    pub fn rows(&self) -> Vec<Vec<f64>> {
        self.cells.chunks(self.side()).map(|r| r.to_vec()).collect()
    }

    pub fn outcome_probs(&self) -> Prob3 {
        let mut p = Prob3 {
            home: 0.0,
            draw: 0.0,
            away: 0.0,
        };
        for e in self.entries() {
            match e.score.outcome() {
                Outcome::Home => p.home += e.probability,
                Outcome::Draw => p.draw += e.probability,
                Outcome::Away => p.away += e.probability,
            }
        }
        p
    }

    pub fn over(&self, line: f64) -> f64 {
        self.entries()
            .filter(|e| e.score.total() as f64 > line)
            .map(|e| e.probability)
            .sum()
    }

    pub fn under_or_equal(&self, line: f64) -> f64 {
        self.entries()
            .filter(|e| e.score.total() as f64 <= line)
            .map(|e| e.probability)
            .sum()
    }

    pub fn both_score(&self) -> f64 {
        self.entries()
            .filter(|e| e.score.home > 0 && e.score.away > 0)
            .map(|e| e.probability)
            .sum()
    }

    pub fn most_likely(&self) -> ScoreEntry {
        self.entries()
            .min_by(rank)
            .unwrap_or(ScoreEntry {
                score: Scoreline::new(0, 0),
                probability: 0.0,
            })
    }

    pub fn top(&self, n: usize) -> Vec<ScoreEntry> {
        let mut all: Vec<ScoreEntry> = self.entries().collect();
        all.sort_by(rank);
        all.truncate(n);
        all
    }

    /// Mean goals per side under the truncated table.
    pub fn expected_goals(&self) -> (f64, f64) {
        self.entries().fold((0.0, 0.0), |(h, a), e| {
            (
                h + e.score.home as f64 * e.probability,
                a + e.score.away as f64 * e.probability,
            )
        })
    }

    /// Rescales the home-win, draw and away-win regions so their masses match `target`.
    /// A region with no mass cannot be grown and is left as is.
    pub fn rebalance_outcomes(&self, target: &Prob3) -> EngineResult<Self> {
        let target = target.normalized().ok_or_else(|| {
            EngineError::InvariantViolation(format!(
                "outcome target is not a distribution: {target:?}"
            ))
        })?;
        let current = self.outcome_probs();
        let side = self.side();

        let mut out = self.clone();
        for (idx, cell) in out.cells.iter_mut().enumerate() {
            let outcome = classify_outcome((idx / side) as u32, (idx % side) as u32);
            let have = current.get(outcome);
            if have > 0.0 {
                *cell *= target.get(outcome) / have;
            }
        }
        out.renormalize()?;
        Ok(out)
    }

    pub(crate) fn scale_where(&mut self, factor: f64, mut pick: impl FnMut(Scoreline) -> bool) {
        let side = self.side();
        for (idx, cell) in self.cells.iter_mut().enumerate() {
            if pick(Scoreline::new((idx / side) as u32, (idx % side) as u32)) {
                *cell *= factor;
            }
        }
    }

    pub(crate) fn renormalize(&mut self) -> EngineResult<()> {
        let sum = self.total();
        if !sum.is_finite() || sum <= 0.0 {
            return Err(EngineError::InvariantViolation(format!(
                "score matrix has no mass to renormalize (sum={sum})"
            )));
        }
        for cell in &mut self.cells {
            *cell /= sum;
        }
        debug_assert!((self.total() - 1.0).abs() <= SUM_TOLERANCE);
        self.check_normalized()
    }

    pub fn check_normalized(&self) -> EngineResult<()> {
        if let Some(bad) = self.cells.iter().find(|p| !p.is_finite() || **p < 0.0) {
            return Err(EngineError::InvariantViolation(format!(
                "score matrix cell out of range: {bad}"
            )));
        }
        let sum = self.total();
        if (sum - 1.0).abs() > SUM_TOLERANCE {
            return Err(EngineError::InvariantViolation(format!(
                "score matrix sums to {sum}"
            )));
        }
        Ok(())
    }
}

fn poisson_pmf(lambda: f64, max_k: u32) -> Vec<f64> {
    let max_k = max_k as usize;
    let mut out = vec![0.0; max_k + 1];
    out[0] = (-lambda).exp();
    for k in 1..=max_k {
        out[k] = out[k - 1] * lambda / k as f64;
    }
    out
}
