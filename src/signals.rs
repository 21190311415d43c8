//! Auxiliary pre-match signals, either supplied by a collaborator or derived
//! from the contest history with [`SignalSet::from_history`].

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::contest::{Contest, EntityId, FinalScore, Outcome, sorted_by_kickoff};
use crate::market::DecimalOdds;
use crate::metrics::Prob3;

/// Prior meetings, counted from the upcoming home side's point of view
/// regardless of where each meeting was played.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct HeadToHead {
    pub meetings: u32,
    pub home_wins: u32,
    pub draws: u32,
    pub away_wins: u32,
    pub goals_avg: f64,
}

impl HeadToHead {
    pub fn is_usable(&self) -> bool {
        self.meetings > 0 && self.goals_avg.is_finite() && self.goals_avg >= 0.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct MarketSignal {
    #[serde(default)]
    pub probs: Option<Prob3>,
    #[serde(default)]
    pub odds: Option<DecimalOdds>,
}

impl MarketSignal {
    pub fn from_odds(odds: DecimalOdds) -> Self {
        Self {
            probs: None,
            odds: Some(odds),
        }
    }

    /// Explicit probabilities win over prices; prices are de-margined.
    pub fn implied(&self) -> Option<Prob3> {
        self.probs
            .and_then(|p| p.normalized())
            .or_else(|| self.odds.and_then(|o| o.no_vig()))
    }
}

/// Points per available point over the last N contests, in `[0, 1]`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FormPair {
    pub home: f64,
    pub away: f64,
}

impl FormPair {
    pub fn is_usable(&self) -> bool {
        [self.home, self.away]
            .iter()
            .all(|v| v.is_finite() && (0.0..=1.0).contains(v))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TeamStrength {
    pub scored_per_match: f64,
    pub conceded_per_match: f64,
}

impl TeamStrength {
    pub fn is_usable(&self) -> bool {
        [self.scored_per_match, self.conceded_per_match]
            .iter()
            .all(|v| v.is_finite() && *v >= 0.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct StrengthPair {
    pub home: TeamStrength,
    pub away: TeamStrength,
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct SignalSet {
    #[serde(default)]
    pub head_to_head: Option<HeadToHead>,
    #[serde(default)]
    pub market: Option<MarketSignal>,
    #[serde(default)]
    pub form: Option<FormPair>,
    #[serde(default)]
    pub strength: Option<StrengthPair>,
}

impl SignalSet {
    pub fn is_empty(&self) -> bool {
        self.head_to_head.is_none()
            && self.market.is_none()
            && self.form.is_none()
            && self.strength.is_none()
    }

    /// Takes every signal this set lacks from `other`. Supplied signals win.
    pub fn fill_missing(&mut self, other: SignalSet) {
        self.head_to_head = self.head_to_head.or(other.head_to_head);
        self.market = self.market.or(other.market);
        self.form = self.form.or(other.form);
        self.strength = self.strength.or(other.strength);
    }

    /// Builds head-to-head, form and strength from contests strictly before `before`
    /// (all of them when `None`). Market data never comes from history.
    pub fn from_history(
        history: &[Contest],
        home: &EntityId,
        away: &EntityId,
        before: Option<DateTime<Utc>>,
        window: usize,
    ) -> Self {
        Self::from_scored(&valid_before(history, before), home, away, window)
    }

    /// Same as [`SignalSet::from_history`] over contests that are already
    /// validated, cut off and in kickoff order.
    pub(crate) fn from_scored(
        past: &[ScoredContest<'_>],
        home: &EntityId,
        away: &EntityId,
        window: usize,
    ) -> Self {
        let form = match (
            recent_form(past, home, window),
            recent_form(past, away, window),
        ) {
            (Some(h), Some(a)) => Some(FormPair { home: h, away: a }),
            _ => None,
        };
        let strength = match (
            team_strength(past, home, window),
            team_strength(past, away, window),
        ) {
            (Some(h), Some(a)) => Some(StrengthPair { home: h, away: a }),
            _ => None,
        };

        Self {
            head_to_head: head_to_head(past, home, away),
            market: None,
            form,
            strength,
        }
    }
}

pub(crate) type ScoredContest<'a> = (&'a Contest, FinalScore);

fn valid_before(history: &[Contest], before: Option<DateTime<Utc>>) -> Vec<ScoredContest<'_>> {
    sorted_by_kickoff(history)
        .into_iter()
        .filter(|c| before.is_none_or(|cut| c.kicked_off_before(cut)))
        .filter_map(|c| c.validate().ok().map(|s| (c, s)))
        .collect()
}

fn head_to_head(
    past: &[ScoredContest<'_>],
    home: &EntityId,
    away: &EntityId,
) -> Option<HeadToHead> {
    let mut h2h = HeadToHead {
        meetings: 0,
        home_wins: 0,
        draws: 0,
        away_wins: 0,
        goals_avg: 0.0,
    };
    let mut goals = 0u64;

    for (c, s) in past {
        let same_venue = c.home.id == *home && c.away.id == *away;
        let reversed = c.home.id == *away && c.away.id == *home;
        if !same_venue && !reversed {
            continue;
        }
        h2h.meetings += 1;
        goals += s.total();
        match (s.outcome(), reversed) {
            (Outcome::Draw, _) => h2h.draws += 1,
            (Outcome::Home, false) | (Outcome::Away, true) => h2h.home_wins += 1,
            (Outcome::Away, false) | (Outcome::Home, true) => h2h.away_wins += 1,
        }
    }

    if h2h.meetings == 0 {
        return None;
    }
    h2h.goals_avg = goals as f64 / h2h.meetings as f64;
    Some(h2h)
}

fn last_n<'a>(
    past: &'a [ScoredContest<'a>],
    id: &EntityId,
    n: usize,
) -> Vec<&'a ScoredContest<'a>> {
    let mut games: Vec<_> = past.iter().rev().filter(|(c, _)| c.involves(id)).take(n).collect();
    games.reverse();
    games
}

fn recent_form(past: &[ScoredContest<'_>], id: &EntityId, n: usize) -> Option<f64> {
    let games = last_n(past, id, n);
    if games.is_empty() {
        return None;
    }
    let points: u32 = games
        .iter()
        .map(|(c, s)| {
            let at_home = c.home.id == *id;
            match (s.outcome(), at_home) {
                (Outcome::Draw, _) => 1,
                (Outcome::Home, true) | (Outcome::Away, false) => 3,
                _ => 0,
            }
        })
        .sum();
    Some(points as f64 / (3.0 * games.len() as f64))
}

fn team_strength(past: &[ScoredContest<'_>], id: &EntityId, n: usize) -> Option<TeamStrength> {
    let games = last_n(past, id, n);
    if games.is_empty() {
        return None;
    }
    let (mut scored, mut conceded) = (0u64, 0u64);
    for (c, s) in &games {
        let (mine, theirs) = if c.home.id == *id {
            (s.home_goals, s.away_goals)
        } else {
            (s.away_goals, s.home_goals)
        };
        scored += u64::from(mine);
        conceded += u64::from(theirs);
    }
    let n = games.len() as f64;
    Some(TeamStrength {
        scored_per_match: scored as f64 / n,
        conceded_per_match: conceded as f64 / n,
    })
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;
    use crate::contest::Entity;

    fn c(home: &str, away: &str, hg: i32, ag: i32, day: u32) -> Contest {
        Contest::new(
            Entity::new(home, ""),
            Entity::new(away, ""),
            hg,
            ag,
            Utc.with_ymd_and_hms(2024, 3, day, 19, 0, 0).unwrap(),
        )
    }

    fn history() -> Vec<Contest> {
        vec![
            c("a", "b", 2, 0, 1),
            c("b", "a", 1, 1, 8),
            c("b", "a", 3, 1, 15),
            c("a", "c", 0, 1, 22),
            c("c", "b", 2, 2, 29),
        ]
    }

    fn id(s: &str) -> EntityId {
        EntityId::from(s)
    }

    #[test]
    fn head_to_head_counts_from_upcoming_home_side() {
        let s = SignalSet::from_history(&history(), &id("a"), &id("b"), None, 5);
        let h2h = s.head_to_head.expect("met before");
        assert_eq!(h2h.meetings, 3);
        assert_eq!(h2h.home_wins, 1);
        assert_eq!(h2h.draws, 1);
        assert_eq!(h2h.away_wins, 1);
        assert!((h2h.goals_avg - 8.0 / 3.0).abs() < 1e-12);
    }

    #[test]
    fn huge_goal_counts_average_without_overflow() {
        let big = i32::MAX;
        let rows = vec![c("a", "b", big, big, 1), c("b", "a", big, 0, 8)];
        let s = SignalSet::from_history(&rows, &id("a"), &id("b"), None, 5);

        let h2h = s.head_to_head.unwrap();
        assert_eq!(h2h.meetings, 2);
        assert!((h2h.goals_avg - 1.5 * big as f64).abs() < 1.0);
        let a = s.strength.unwrap().home;
        assert!((a.scored_per_match - big as f64 / 2.0).abs() < 1.0);
        assert!((a.conceded_per_match - big as f64).abs() < 1.0);
    }

    #[test]
    fn cut_off_excludes_later_contests() {
        let before = Utc.with_ymd_and_hms(2024, 3, 10, 0, 0, 0).unwrap();
        let s = SignalSet::from_history(&history(), &id("a"), &id("b"), Some(before), 5);
        assert_eq!(s.head_to_head.unwrap().meetings, 2);
    }

    #[test]
    fn form_uses_most_recent_window() {
        let s = SignalSet::from_history(&history(), &id("a"), &id("b"), None, 2);
        let form = s.form.expect("both sides played");
        // a: lost 1-3 at b, lost 0-1 to c.
        assert_eq!(form.home, 0.0);
        // b: won 3-1, drew 2-2 at c.
        assert!((form.away - 4.0 / 6.0).abs() < 1e-12);
        let strength = s.strength.unwrap();
        assert!((strength.away.scored_per_match - 2.5).abs() < 1e-12);
    }

    #[test]
    fn unseen_pairing_has_no_head_to_head() {
        let s = SignalSet::from_history(&history(), &id("a"), &id("zzz"), None, 5);
        assert!(s.head_to_head.is_none());
        assert!(s.form.is_none());
    }

    #[test]
    fn fill_missing_keeps_supplied_signals() {
        let mut supplied = SignalSet {
            market: Some(MarketSignal::from_odds(DecimalOdds {
                home: 2.0,
                draw: 3.4,
                away: 4.0,
            })),
            ..SignalSet::default()
        };
        let derived = SignalSet::from_history(&history(), &id("a"), &id("b"), None, 5);
        supplied.fill_missing(derived);
        assert!(supplied.market.is_some());
        assert_eq!(supplied.head_to_head, derived.head_to_head);
        assert_eq!(supplied.form, derived.form);
    }

    #[test]
    fn market_prefers_explicit_probabilities() {
        let m = MarketSignal {
            probs: Some(Prob3 {
                home: 2.0,
                draw: 1.0,
                away: 1.0,
            }),
            odds: Some(DecimalOdds {
                home: 3.0,
                draw: 3.0,
                away: 3.0,
            }),
        };
        let p = m.implied().unwrap();
        assert!((p.home - 0.5).abs() < 1e-12);
    }
}
