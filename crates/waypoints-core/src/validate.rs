//! Schema-checked construction of every entity before it reaches the store.
//!
//! Raw input types ([`NewItem`], [`ItemPatch`], [`NewAchievement`],
//! [`NewBaseline`]) mirror what a UI collaborator sends: loosely typed strings
//! and signed integers. Each validator checks every field, collects *all*
//! violations into [`ValidationErrors`], and on success yields a typed value
//! the repositories can persist without further checks.

use crate::error::ErrorCode;
use crate::model::ItemKind;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Inclusive bounds for item text, in characters.
pub const TEXT_MIN_CHARS: usize = 1;
pub const TEXT_MAX_CHARS: usize = 5000;
/// Upper bound for owner/account ids.
pub const OWNER_ID_MAX_CHARS: usize = 128;
/// Shape accepted for calendar dates: `Y`, `M` and `D` each stand for one
/// ASCII digit, anything else must match literally.
pub const DATE_FORMAT: &str = "YYYY-MM-DD";

/// The declarative constraint a field violated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Constraint {
    Required,
    TooShort { min: usize },
    TooLong { max: usize },
    NotInEnum { allowed: Vec<&'static str> },
    Negative,
    OutOfRange { max: u64 },
    InvalidFormat { pattern: &'static str },
    InvalidReference,
    SelfReference,
    /// The field cannot be set through this operation.
    NotAllowed,
}

/// A single field-addressable violation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, thiserror::Error)]
#[error("{field}: {message}")]
pub struct ValidationError {
    pub field: &'static str,
    pub constraint: Constraint,
    pub message: String,
}

impl ValidationError {
    #[must_use]
    pub fn new(field: &'static str, constraint: Constraint, message: impl Into<String>) -> Self {
        Self {
            field,
            constraint,
            message: message.into(),
        }
    }
}

/// Every violation found while validating one input.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, thiserror::Error)]
pub struct ValidationErrors {
    pub errors: Vec<ValidationError>,
}

impl ValidationErrors {
    #[must_use]
    pub fn single(error: ValidationError) -> Self {
        Self {
            errors: vec![error],
        }
    }

    #[must_use]
    pub fn has_field(&self, field: &str) -> bool {
        self.errors.iter().any(|e| e.field == field)
    }

    /// First violation recorded for `field`, if any.
    #[must_use]
    pub fn for_field(&self, field: &str) -> Option<&ValidationError> {
        self.errors.iter().find(|e| e.field == field)
    }

    /// Reference failures get their own codes; everything else is a plain
    /// validation failure.
    #[must_use]
    pub fn code(&self) -> ErrorCode {
        let violated = |c: &Constraint| self.errors.iter().any(|e| &e.constraint == c);
        if violated(&Constraint::SelfReference) {
            ErrorCode::CycleDetected
        } else if violated(&Constraint::InvalidReference) {
            ErrorCode::ParentNotFound
        } else {
            ErrorCode::ValidationFailed
        }
    }
}

impl fmt::Display for ValidationErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "validation failed")?;
        for (i, err) in self.errors.iter().enumerate() {
            let sep = if i == 0 { ": " } else { "; " };
            write!(f, "{sep}{err}")?;
        }
        Ok(())
    }
}

/// Collects violations across fields before deciding pass/fail.
#[derive(Debug, Default)]
struct Checker {
    errors: Vec<ValidationError>,
}

impl Checker {
    fn push(&mut self, error: ValidationError) {
        self.errors.push(error);
    }

    fn take<T>(&mut self, result: Result<T, ValidationError>) -> Option<T> {
        match result {
            Ok(value) => Some(value),
            Err(err) => {
                self.push(err);
                None
            }
        }
    }

    fn finish<T>(self, value: impl FnOnce() -> T) -> Result<T, ValidationErrors> {
        if self.errors.is_empty() {
            Ok(value())
        } else {
            Err(ValidationErrors {
                errors: self.errors,
            })
        }
    }
}

// ---------------------------------------------------------------------------
// Field validators
// ---------------------------------------------------------------------------

/// Item text: 1-5000 characters, not only whitespace.
///
/// # Errors
///
/// Returns the violated length constraint.
pub fn check_text(field: &'static str, text: &str) -> Result<(), ValidationError> {
    let chars = text.chars().count();
    if text.trim().is_empty() {
        return Err(ValidationError::new(
            field,
            Constraint::TooShort {
                min: TEXT_MIN_CHARS,
            },
            "text must not be empty",
        ));
    }
    if chars > TEXT_MAX_CHARS {
        return Err(ValidationError::new(
            field,
            Constraint::TooLong {
                max: TEXT_MAX_CHARS,
            },
            format!("text is {chars} characters; the limit is {TEXT_MAX_CHARS}"),
        ));
    }
    Ok(())
}

/// Parse an item kind, reporting the allowed set on failure.
///
/// # Errors
///
/// Returns [`Constraint::NotInEnum`] for unknown kinds.
pub fn check_kind(field: &'static str, raw: &str) -> Result<ItemKind, ValidationError> {
    ItemKind::from_str(raw).map_err(|_| {
        ValidationError::new(
            field,
            Constraint::NotInEnum {
                allowed: ItemKind::ALL.iter().map(|k| k.as_str()).collect(),
            },
            format!("'{raw}' is not one of direction, waypoint, step"),
        )
    })
}

/// Non-negative integer that fits a `u32`.
///
/// # Errors
///
/// Returns [`Constraint::Negative`] or [`Constraint::OutOfRange`].
pub fn check_non_negative(field: &'static str, value: i64) -> Result<u32, ValidationError> {
    if value < 0 {
        return Err(ValidationError::new(
            field,
            Constraint::Negative,
            format!("{field} must be zero or greater, got {value}"),
        ));
    }
    u32::try_from(value).map_err(|_| {
        ValidationError::new(
            field,
            Constraint::OutOfRange {
                max: u64::from(u32::MAX),
            },
            format!("{field} must be at most {}", u32::MAX),
        )
    })
}

/// Identifier reference: present and non-blank.
///
/// # Errors
///
/// Returns [`Constraint::Required`] for blank ids.
pub fn check_id(field: &'static str, id: &str) -> Result<(), ValidationError> {
    if id.trim().is_empty() {
        return Err(ValidationError::new(
            field,
            Constraint::Required,
            format!("{field} is required"),
        ));
    }
    Ok(())
}

/// Optional owner id: when present, 1-128 characters.
///
/// # Errors
///
/// Returns a length violation.
pub fn check_owner(field: &'static str, owner: Option<&str>) -> Result<(), ValidationError> {
    let Some(owner) = owner else {
        return Ok(());
    };
    if owner.trim().is_empty() {
        return Err(ValidationError::new(
            field,
            Constraint::TooShort { min: 1 },
            "owner id must not be blank; use null for local data",
        ));
    }
    if owner.chars().count() > OWNER_ID_MAX_CHARS {
        return Err(ValidationError::new(
            field,
            Constraint::TooLong {
                max: OWNER_ID_MAX_CHARS,
            },
            format!("owner id exceeds {OWNER_ID_MAX_CHARS} characters"),
        ));
    }
    Ok(())
}

/// Calendar date in `YYYY-MM-DD` form that names a real day.
///
/// # Errors
///
/// Returns [`Constraint::InvalidFormat`] on shape or calendar errors.
pub fn parse_date(field: &'static str, raw: &str) -> Result<NaiveDate, ValidationError> {
    let invalid = || {
        ValidationError::new(
            field,
            Constraint::InvalidFormat {
                pattern: DATE_FORMAT,
            },
            format!("'{raw}' is not a calendar date ({DATE_FORMAT})"),
        )
    };
    if !matches_format(raw, DATE_FORMAT) {
        return Err(invalid());
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d").map_err(|_| invalid())
}

/// Does `raw` have the shape of `format` (see [`DATE_FORMAT`])?
fn matches_format(raw: &str, format: &str) -> bool {
    raw.len() == format.len()
        && raw.bytes().zip(format.bytes()).all(|(b, f)| match f {
            b'Y' | b'M' | b'D' => b.is_ascii_digit(),
            _ => b == f,
        })
}

// ---------------------------------------------------------------------------
// Entity inputs
// ---------------------------------------------------------------------------

/// Raw input for creating an item.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct NewItem {
    pub text: String,
    pub kind: String,
    pub parent_id: Option<String>,
    pub position: Option<i64>,
    pub points: Option<i64>,
    pub owner_id: Option<String>,
}

impl NewItem {
    #[must_use]
    pub fn new(text: impl Into<String>, kind: ItemKind) -> Self {
        Self {
            text: text.into(),
            kind: kind.as_str().to_string(),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn under(mut self, parent_id: impl Into<String>) -> Self {
        self.parent_id = Some(parent_id.into());
        self
    }

    #[must_use]
    pub const fn at_position(mut self, position: i64) -> Self {
        self.position = Some(position);
        self
    }

    #[must_use]
    pub const fn with_points(mut self, points: i64) -> Self {
        self.points = Some(points);
        self
    }

    #[must_use]
    pub fn owned_by(mut self, owner_id: Option<String>) -> Self {
        self.owner_id = owner_id;
        self
    }
}

/// Create input after validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidItem {
    pub text: String,
    pub kind: ItemKind,
    pub parent_id: Option<String>,
    pub position: Option<u32>,
    pub points: Option<u32>,
    pub owner_id: Option<String>,
}

/// Validate a create request.
///
/// Parent existence is checked by the repository, which owns the item set.
///
/// # Errors
///
/// Returns every field violation found.
pub fn validate_new_item(input: &NewItem) -> Result<ValidItem, ValidationErrors> {
    let mut check = Checker::default();
    check.take(check_text("text", &input.text));
    let kind = check.take(check_kind("kind", &input.kind));
    if let Some(parent) = input.parent_id.as_deref() {
        check.take(check_id("parentId", parent));
    }
    let position = input
        .position
        .and_then(|p| check.take(check_non_negative("position", p)));
    let points = input
        .points
        .and_then(|p| check.take(check_non_negative("points", p)));
    check.take(check_owner("ownerId", input.owner_id.as_deref()));

    check.finish(|| ValidItem {
        text: input.text.clone(),
        kind: kind.unwrap_or(ItemKind::Step),
        parent_id: input.parent_id.clone(),
        position,
        points,
        owner_id: input.owner_id.clone(),
    })
}

/// Raw partial update. `None` leaves the field untouched.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ItemPatch {
    pub text: Option<String>,
    pub kind: Option<String>,
    pub position: Option<i64>,
    pub completed: Option<bool>,
    pub points: Option<i64>,
}

impl ItemPatch {
    #[must_use]
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: Some(text.into()),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn completed(completed: bool) -> Self {
        Self {
            completed: Some(completed),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn points(points: i64) -> Self {
        Self {
            points: Some(points),
            ..Self::default()
        }
    }

    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.text.is_none()
            && self.kind.is_none()
            && self.position.is_none()
            && self.completed.is_none()
            && self.points.is_none()
    }
}

/// Patch after validation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ValidPatch {
    pub text: Option<String>,
    pub kind: Option<ItemKind>,
    pub position: Option<u32>,
    pub completed: Option<bool>,
    pub points: Option<u32>,
}

/// Validate a partial update.
///
/// # Errors
///
/// Returns every field violation found.
pub fn validate_patch(patch: &ItemPatch) -> Result<ValidPatch, ValidationErrors> {
    let mut check = Checker::default();
    if let Some(text) = patch.text.as_deref() {
        check.take(check_text("text", text));
    }
    let kind = patch
        .kind
        .as_deref()
        .and_then(|k| check.take(check_kind("kind", k)));
    let position = patch
        .position
        .and_then(|p| check.take(check_non_negative("position", p)));
    let points = patch
        .points
        .and_then(|p| check.take(check_non_negative("points", p)));

    check.finish(|| ValidPatch {
        text: patch.text.clone(),
        kind,
        position,
        completed: patch.completed,
        points,
    })
}

/// Raw input for an achievement row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewAchievement {
    pub owner_id: Option<String>,
    pub item_id: String,
    pub points_earned: i64,
}

/// Validated achievement input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidAchievement {
    pub owner_id: Option<String>,
    pub item_id: String,
    pub points_earned: u32,
}

/// Validate an achievement input.
///
/// # Errors
///
/// Returns every field violation found.
pub fn validate_achievement(input: &NewAchievement) -> Result<ValidAchievement, ValidationErrors> {
    let mut check = Checker::default();
    check.take(check_id("itemId", &input.item_id));
    let points = check.take(check_non_negative("pointsEarned", input.points_earned));
    check.take(check_owner("ownerId", input.owner_id.as_deref()));
    check.finish(|| ValidAchievement {
        owner_id: input.owner_id.clone(),
        item_id: input.item_id.clone(),
        points_earned: points.unwrap_or_default(),
    })
}

/// Raw input for a daily baseline row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewBaseline {
    pub owner_id: Option<String>,
    pub date: String,
    pub baseline_points: i64,
}

/// Validated baseline input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidBaseline {
    pub owner_id: Option<String>,
    pub date: NaiveDate,
    pub baseline_points: u32,
}

/// Validate a baseline input.
///
/// # Errors
///
/// Returns every field violation found.
pub fn validate_baseline(input: &NewBaseline) -> Result<ValidBaseline, ValidationErrors> {
    let mut check = Checker::default();
    let date = check.take(parse_date("date", &input.date));
    let points = check.take(check_non_negative("baselinePoints", input.baseline_points));
    check.take(check_owner("ownerId", input.owner_id.as_deref()));
    check.finish(|| ValidBaseline {
        owner_id: input.owner_id.clone(),
        date: date.unwrap_or_default(),
        baseline_points: points.unwrap_or_default(),
    })
}
