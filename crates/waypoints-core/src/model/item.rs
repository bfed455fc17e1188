use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr};

/// The three kinds of trackable item, from broadest to smallest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ItemKind {
    Direction,
    Waypoint,
    Step,
}

impl ItemKind {
    pub const ALL: [Self; 3] = [Self::Direction, Self::Waypoint, Self::Step];

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Direction => "direction",
            Self::Waypoint => "waypoint",
            Self::Step => "step",
        }
    }

    /// Built-in point value awarded on completion when no override is set.
    #[must_use]
    pub const fn default_points(self) -> u32 {
        match self {
            Self::Direction => 100,
            Self::Waypoint => 25,
            Self::Step => 5,
        }
    }
}

impl fmt::Display for ItemKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when parsing an enum value from text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseEnumError {
    pub expected: &'static str,
    pub got: String,
}

impl fmt::Display for ParseEnumError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid {}: '{}'", self.expected, self.got)
    }
}

impl std::error::Error for ParseEnumError {}

impl FromStr for ItemKind {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "direction" => Ok(Self::Direction),
            "waypoint" => Ok(Self::Waypoint),
            "step" => Ok(Self::Step),
            _ => Err(ParseEnumError {
                expected: "kind",
                got: s.to_string(),
            }),
        }
    }
}

/// Per-kind default point values, overridable from project config.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PointTable {
    pub direction: u32,
    pub waypoint: u32,
    pub step: u32,
}

impl PointTable {
    #[must_use]
    pub const fn for_kind(&self, kind: ItemKind) -> u32 {
        match kind {
            ItemKind::Direction => self.direction,
            ItemKind::Waypoint => self.waypoint,
            ItemKind::Step => self.step,
        }
    }
}

impl Default for PointTable {
    fn default() -> Self {
        Self {
            direction: ItemKind::Direction.default_points(),
            waypoint: ItemKind::Waypoint.default_points(),
            step: ItemKind::Step.default_points(),
        }
    }
}

/// A stored item row, exactly as persisted in the items bucket.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Item {
    pub id: String,
    pub owner_id: Option<String>,
    pub text: String,
    pub kind: ItemKind,
    pub parent_id: Option<String>,
    pub position: u32,
    pub completed: bool,
    pub completed_at: Option<DateTime<Utc>>,
    pub points: u32,
    pub deleted_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Item {
    #[must_use]
    pub const fn is_active(&self) -> bool {
        self.deleted_at.is_none()
    }

    #[must_use]
    pub const fn is_root(&self) -> bool {
        self.parent_id.is_none()
    }

    /// Apply a completion transition, keeping `completed_at` in lockstep.
    ///
    /// Returns `true` when the flag actually changed.
    pub fn set_completed(&mut self, completed: bool, now: DateTime<Utc>) -> bool {
        if self.completed == completed {
            return false;
        }
        self.completed = completed;
        self.completed_at = completed.then_some(now);
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(now: DateTime<Utc>) -> Item {
        Item {
            id: "item-1".into(),
            owner_id: None,
            text: "Ship v1".into(),
            kind: ItemKind::Direction,
            parent_id: None,
            position: 0,
            completed: false,
            completed_at: None,
            points: 100,
            deleted_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn kind_json_and_text_forms_agree() {
        for kind in ItemKind::ALL {
            let json = serde_json::to_string(&kind).expect("serialize kind");
            assert_eq!(json, format!("\"{kind}\""));
            assert_eq!(ItemKind::from_str(&kind.to_string()).expect("parse"), kind);
        }
        assert_eq!(ItemKind::from_str(" Waypoint ").expect("parse"), ItemKind::Waypoint);
        assert!(ItemKind::from_str("milestone").is_err());
    }

    #[test]
    fn default_points_follow_kind() {
        assert_eq!(ItemKind::Direction.default_points(), 100);
        assert_eq!(ItemKind::Waypoint.default_points(), 25);
        assert_eq!(ItemKind::Step.default_points(), 5);
        assert_eq!(PointTable::default().for_kind(ItemKind::Step), 5);
    }

    #[test]
    fn item_serializes_with_camel_case_keys() {
        let item = sample(Utc::now());
        let value = serde_json::to_value(&item).expect("serialize item");
        for key in ["ownerId", "parentId", "completedAt", "deletedAt", "createdAt", "updatedAt"] {
            assert!(value.get(key).is_some(), "missing key {key}");
        }
    }

    #[test]
    fn completion_transitions_stamp_and_clear() {
        let now = Utc::now();
        let mut item = sample(now);

        assert!(item.set_completed(true, now));
        assert_eq!(item.completed_at, Some(now));
        assert!(!item.set_completed(true, now), "repeat completion is a no-op");

        assert!(item.set_completed(false, now));
        assert!(item.completed_at.is_none());
    }
}
