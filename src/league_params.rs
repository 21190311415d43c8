use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::blend::BlendConfig;
use crate::contest::{Contest, Outcome};
use crate::elo::expected_score;

pub const DEFAULT_GOALS_TOTAL: f64 = 2.60;
pub const DEFAULT_HOME_OFFSET: f64 = 60.0;

// Samples needed before the fitted values fully replace the defaults.
const MIN_N: f64 = 200.0;
// Keeps the offset finite when a small league has one-sided results.
const SHARE_CLAMP: f64 = 0.95;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LeagueParams {
    pub sample_matches: usize,
    pub goals_total_base: f64,
    /// Expected-score share of the home side: wins count 1, draws 0.5.
    pub home_points_share: f64,
}

impl Default for LeagueParams {
    fn default() -> Self {
        Self {
            sample_matches: 0,
            goals_total_base: DEFAULT_GOALS_TOTAL,
            home_points_share: expected_score(DEFAULT_HOME_OFFSET, 0.0),
        }
    }
}

impl LeagueParams {
    /// Rating offset that makes two equally rated sides reproduce the observed home share.
    pub fn suggested_home_offset(&self) -> f64 {
        let p = self.home_points_share.clamp(1.0 - SHARE_CLAMP, SHARE_CLAMP);
        400.0 * (p / (1.0 - p)).log10()
    }

    pub fn apply_to(&self, cfg: &mut BlendConfig) {
        cfg.goals_total_base = self.goals_total_base;
        cfg.home_advantage_offset = self.suggested_home_offset();
    }
}

pub fn compute_league_params(contests: &[Contest]) -> LeagueParams {
    let mut total_goals = 0.0;
    let mut home_points = 0.0;
    let mut n = 0usize;

    for c in contests {
        let Ok(score) = c.validate() else {
            continue;
        };
        total_goals += score.total() as f64;
        home_points += match score.outcome() {
            Outcome::Home => 1.0,
            Outcome::Draw => 0.5,
            Outcome::Away => 0.0,
        };
        n += 1;
    }

    let d = LeagueParams::default();
    let mut out = d;
    out.sample_matches = n;
    if n == 0 {
        return out;
    }

    // Shrink small samples toward defaults to avoid wild swings.
    let w = (n as f64 / MIN_N).clamp(0.0, 1.0);
    let nf = n as f64;
    out.goals_total_base = (1.0 - w) * d.goals_total_base + w * (total_goals / nf);
    out.home_points_share = (1.0 - w) * d.home_points_share + w * (home_points / nf);
    debug!(
        samples = n,
        goals = out.goals_total_base,
        home_share = out.home_points_share,
        "league params fitted"
    );
    out
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, TimeZone, Utc};

    use super::*;
    use crate::contest::Entity;

    fn contest(i: i64, hg: i32, ag: i32) -> Contest {
        let t0 = Utc.with_ymd_and_hms(2024, 1, 1, 15, 0, 0).unwrap();
        Contest::new(
            Entity::new("h", "Home"),
            Entity::new("a", "Away"),
            hg,
            ag,
            t0 + Duration::days(i),
        )
    }

    #[test]
    fn empty_history_keeps_defaults() {
        let p = compute_league_params(&[]);
        assert_eq!(p, LeagueParams::default());
        assert!((p.suggested_home_offset() - DEFAULT_HOME_OFFSET).abs() < 1e-9);
    }

    #[test]
    fn large_sample_replaces_defaults() {
        let rows: Vec<Contest> = (0..400).map(|i| contest(i, 2, 1)).collect();
        let p = compute_league_params(&rows);
        assert_eq!(p.sample_matches, 400);
        assert!((p.goals_total_base - 3.0).abs() < 1e-12);
        // Every home side won, so the share hits the clamp.
        assert!((p.suggested_home_offset() - 400.0 * 19f64.log10()).abs() < 1e-9);
    }

    #[test]
    fn fitted_params_carry_only_what_apply_uses() {
        let rows: Vec<Contest> = (0..10).map(|i| contest(i, 3, 0)).collect();
        let json = serde_json::to_value(compute_league_params(&rows)).unwrap();
        let mut keys: Vec<&str> = json.as_object().unwrap().keys().map(String::as_str).collect();
        keys.sort_unstable();
        assert_eq!(keys, vec!["goals_total_base", "home_points_share", "sample_matches"]);
    }

    #[test]
    fn small_sample_is_shrunk() {
        let rows: Vec<Contest> = (0..20).map(|i| contest(i, 0, 0)).collect();
        let p = compute_league_params(&rows);
        let w = 20.0 / MIN_N;
        assert!((p.goals_total_base - (1.0 - w) * DEFAULT_GOALS_TOTAL).abs() < 1e-12);
        assert!(p.suggested_home_offset() < DEFAULT_HOME_OFFSET);
    }

    #[test]
    fn apply_sets_blend_baseline() {
        let rows: Vec<Contest> = (0..200).map(|i| contest(i, 1, 1)).collect();
        let mut cfg = BlendConfig::default();
        compute_league_params(&rows).apply_to(&mut cfg);
        assert!((cfg.goals_total_base - 2.0).abs() < 1e-12);
        assert!(cfg.home_advantage_offset.abs() < 1e-9);
    }
}
