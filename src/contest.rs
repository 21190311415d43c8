use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::ContestError;

#[derive(
    Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct EntityId(pub String);

impl EntityId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_blank(&self) -> bool {
        self.0.trim().is_empty()
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for EntityId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Entity {
    /// Absent ids parse as blank and are rejected by [`Contest::validate`].
    #[serde(default)]
    pub id: EntityId,
    #[serde(default)]
    pub name: String,
}

impl Entity {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: EntityId::new(id),
            name: name.into(),
        }
    }

    /// Falls back to the id when the feed carried no display name.
    pub fn display_name(&self) -> &str {
        if self.name.trim().is_empty() {
            self.id.as_str()
        } else {
            &self.name
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Outcome {
    Home,
    Draw,
    Away,
}

pub fn classify_outcome(home_goals: u32, away_goals: u32) -> Outcome {
    if home_goals > away_goals {
        Outcome::Home
    } else if home_goals < away_goals {
        Outcome::Away
    } else {
        Outcome::Draw
    }
}

/// A completed match as delivered by the fixture feed.
///
/// Goals and kickoff stay optional and goals stay signed at this boundary, so a
/// bad feed row is rejected by [`Contest::validate`] instead of failing the file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Contest {
    pub home: Entity,
    pub away: Entity,
    #[serde(default)]
    pub home_goals: Option<i32>,
    #[serde(default)]
    pub away_goals: Option<i32>,
    #[serde(default)]
    pub kickoff: Option<DateTime<Utc>>,
}

/// A contest that passed validation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FinalScore {
    pub home_goals: u32,
    pub away_goals: u32,
}

impl FinalScore {
    pub fn outcome(&self) -> Outcome {
        classify_outcome(self.home_goals, self.away_goals)
    }

    pub fn total(&self) -> u64 {
        u64::from(self.home_goals) + u64::from(self.away_goals)
    }

    pub fn margin(&self) -> u32 {
        self.home_goals.abs_diff(self.away_goals)
    }
}

impl Contest {
    pub fn new(
        home: Entity,
        away: Entity,
        home_goals: i32,
        away_goals: i32,
        kickoff: DateTime<Utc>,
    ) -> Self {
        Self {
            home,
            away,
            home_goals: Some(home_goals),
            away_goals: Some(away_goals),
            kickoff: Some(kickoff),
        }
    }

    pub fn validate(&self) -> Result<FinalScore, ContestError> {
        if self.home.id.is_blank() || self.away.id.is_blank() {
            return Err(ContestError::MissingIdentifier);
        }
        if self.home.id == self.away.id {
            return Err(ContestError::SameEntity(self.home.id.clone()));
        }
        if self.kickoff.is_none() {
            return Err(ContestError::MissingKickoff);
        }
        let (Some(home), Some(away)) = (self.home_goals, self.away_goals) else {
            return Err(ContestError::MissingGoals);
        };
        if home < 0 || away < 0 {
            return Err(ContestError::NegativeGoals { home, away });
        }
        Ok(FinalScore {
            home_goals: home as u32,
            away_goals: away as u32,
        })
    }

    pub fn involves(&self, id: &EntityId) -> bool {
        self.home.id == *id || self.away.id == *id
    }

    /// Undated contests never count as played before a cut-off.
    pub fn kicked_off_before(&self, cut: DateTime<Utc>) -> bool {
        self.kickoff.is_some_and(|k| k < cut)
    }
}

/// Stable chronological order: ties keep ingestion order, undated rows lead.
pub fn sorted_by_kickoff(contests: &[Contest]) -> Vec<&Contest> {
    let mut ordered: Vec<&Contest> = contests.iter().collect();
    ordered.sort_by_key(|c| c.kickoff);
    ordered
}
