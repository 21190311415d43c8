use serde::{Deserialize, Serialize};

use crate::contest::Outcome;
use crate::metrics::Prob3;

/// Decimal 1X2 prices for one fixture.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DecimalOdds {
    pub home: f64,
    pub draw: f64,
    pub away: f64,
}

impl DecimalOdds {
    pub fn price(&self, outcome: Outcome) -> f64 {
        match outcome {
            Outcome::Home => self.home,
            Outcome::Draw => self.draw,
            Outcome::Away => self.away,
        }
    }

    /// Bookmaker margin: sum of raw implied probabilities minus one.
    pub fn overround(&self) -> Option<f64> {
        if !self.is_valid() {
            return None;
        }
        Some(1.0 / self.home + 1.0 / self.draw + 1.0 / self.away - 1.0)
    }

    /// Implied probabilities with the margin removed proportionally.
    pub fn no_vig(&self) -> Option<Prob3> {
        if !self.is_valid() {
            return None;
        }
        Prob3 {
            home: 1.0 / self.home,
            draw: 1.0 / self.draw,
            away: 1.0 / self.away,
        }
        .normalized()
    }

    fn is_valid(&self) -> bool {
        [self.home, self.draw, self.away]
            .iter()
            .all(|p| p.is_finite() && *p > 1.0)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValueBet {
    pub outcome: Outcome,
    pub price: f64,
    pub model_prob: f64,
    pub implied_prob: f64,
    pub edge: f64,
    pub expected_value: f64,
    pub kelly_fraction: f64,
    pub is_value: bool,
}

/// Compares model probabilities with raw (margin-included) implied probabilities.
pub fn value_bets(model: &Prob3, odds: &DecimalOdds, min_edge: f64) -> Vec<ValueBet> {
    if !odds.is_valid() {
        return Vec::new();
    }
    [Outcome::Home, Outcome::Draw, Outcome::Away]
        .into_iter()
        .map(|outcome| {
            let price = odds.price(outcome);
            let model_prob = model.get(outcome);
            let implied_prob = 1.0 / price;
            let edge = model_prob - implied_prob;
            let kelly_fraction = (edge / (price - 1.0)).max(0.0);
            ValueBet {
                outcome,
                price,
                model_prob,
                implied_prob,
                edge,
                expected_value: model_prob * price - 1.0,
                kelly_fraction,
                is_value: edge > min_edge,
            }
        })
        .collect()
}
