//! Destination domain model.
//!
//! # Responsibility
//! - Define the persisted destination record and its wire shape.
//! - Define create/update input shapes and their normalized forms.
//!
//! # Invariants
//! - `name` is non-empty after trimming.
//! - `latitude`/`longitude` are finite and never rounded.
//! - `rating`, when set, is within `1..=5`.
//! - `tags` keep insertion order and never contain blanks or duplicates.
//! - `visit_date`/`notes` are absent rather than empty strings.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use std::fmt::{Display, Formatter};
use thiserror::Error;
use uuid::Uuid;

/// Stable identifier of one destination record.
pub type DestinationId = Uuid;

/// Identity reference that owns a destination.
pub type OwnerId = Uuid;

pub const MIN_RATING: u8 = 1;
pub const MAX_RATING: u8 = 5;

pub(crate) const VISIT_DATE_FORMAT: &str = "%Y-%m-%d";

/// Destination category shown as the marker kind on the map.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    City,
    Landmark,
    Restaurant,
    Hotel,
    Museum,
    Park,
    #[default]
    Other,
}

impl Category {
    pub const ALL: [Category; 7] = [
        Self::City,
        Self::Landmark,
        Self::Restaurant,
        Self::Hotel,
        Self::Museum,
        Self::Park,
        Self::Other,
    ];

    /// Stable storage/wire string.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::City => "city",
            Self::Landmark => "landmark",
            Self::Restaurant => "restaurant",
            Self::Hotel => "hotel",
            Self::Museum => "museum",
            Self::Park => "park",
            Self::Other => "other",
        }
    }

    /// Parses a storage/wire string. Returns `None` for unknown values.
    pub fn parse(value: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|category| category.as_str() == value.trim())
    }
}

impl Display for Category {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Validation failures for destination payloads.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DestinationValidationError {
    #[error("destination name is required")]
    EmptyName,
    #[error("{field} must be a finite number")]
    NonFiniteCoordinate { field: &'static str },
    #[error("rating must be between 1 and 5, got {0}")]
    RatingOutOfRange(u8),
    #[error("invalid visit date `{0}`; expected YYYY-MM-DD")]
    InvalidVisitDate(String),
    #[error("tags cannot be blank")]
    BlankTag,
    #[error("duplicate tag `{0}`")]
    DuplicateTag(String),
}

/// Canonical persisted destination record.
///
/// Field names match the backend table columns one to one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Destination {
    pub id: DestinationId,
    pub owner_id: OwnerId,
    pub name: String,
    pub latitude: f64,
    pub longitude: f64,
    #[serde(default, deserialize_with = "null_as_default")]
    pub category: Category,
    #[serde(default, deserialize_with = "null_as_default")]
    pub visited: bool,
    /// Meaningful only when `visited` is set.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub visit_date: Option<NaiveDate>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    /// `None` means unrated.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rating: Option<u8>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub photos: Vec<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub tags: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Destination {
    /// Checks record invariants. Used on every backend read path.
    pub fn validate(&self) -> Result<(), DestinationValidationError> {
        validate_name(&self.name)?;
        validate_coordinate("latitude", self.latitude)?;
        validate_coordinate("longitude", self.longitude)?;
        validate_rating(self.rating)?;
        validate_tags(&self.tags)
    }
}

/// Client-side search over loaded records.
///
/// `query` is a case-insensitive substring matched against `name` or
/// `notes`; an empty query matches everything. `category: None` means all.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DestinationFilter {
    pub query: String,
    pub category: Option<Category>,
}

impl DestinationFilter {
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            category: None,
        }
    }

    pub fn with_category(mut self, category: Option<Category>) -> Self {
        self.category = category;
        self
    }

    pub fn matches(&self, destination: &Destination) -> bool {
        if self
            .category
            .is_some_and(|category| category != destination.category)
        {
            return false;
        }
        let needle = self.query.to_lowercase();
        destination.name.to_lowercase().contains(&needle)
            || destination
                .notes
                .as_deref()
                .is_some_and(|notes| notes.to_lowercase().contains(&needle))
    }
}

/// Client payload for creating a destination.
///
/// Server-owned fields (`id`, timestamps) are not representable here.
/// `owner_id` is accepted for wire compatibility only and always replaced
/// by the caller identity.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DestinationDraft {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub owner_id: Option<OwnerId>,
    pub name: String,
    pub latitude: f64,
    pub longitude: f64,
    #[serde(default)]
    pub category: Category,
    #[serde(default)]
    pub visited: bool,
    #[serde(default)]
    pub visit_date: Option<String>,
    #[serde(default)]
    pub notes: Option<String>,
    #[serde(default)]
    pub rating: Option<u8>,
    #[serde(default)]
    pub photos: Vec<String>,
    #[serde(default)]
    pub tags: Vec<String>,
}

impl DestinationDraft {
    /// Creates a minimal draft; everything else takes record defaults.
    pub fn new(name: impl Into<String>, latitude: f64, longitude: f64) -> Self {
        Self {
            name: name.into(),
            latitude,
            longitude,
            ..Self::default()
        }
    }

    pub fn with_category(mut self, category: Category) -> Self {
        self.category = category;
        self
    }

    /// Validates the draft and converts it to its persisted input shape.
    ///
    /// Empty `visit_date`/`notes` become `None`. The draft `owner_id` is dropped.
    pub fn normalize(self) -> Result<NewDestination, DestinationValidationError> {
        let name = normalize_name(&self.name)?;
        validate_coordinate("latitude", self.latitude)?;
        validate_coordinate("longitude", self.longitude)?;
        validate_rating(self.rating)?;

        Ok(NewDestination {
            name,
            latitude: self.latitude,
            longitude: self.longitude,
            category: self.category,
            visited: self.visited,
            visit_date: parse_visit_date(self.visit_date)?,
            notes: normalize_notes(self.notes),
            rating: self.rating,
            photos: self.photos,
            tags: normalize_tags(self.tags)?,
        })
    }
}

/// Validated create payload handed to repositories.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NewDestination {
    pub name: String,
    pub latitude: f64,
    pub longitude: f64,
    pub category: Category,
    pub visited: bool,
    pub visit_date: Option<NaiveDate>,
    pub notes: Option<String>,
    pub rating: Option<u8>,
    pub photos: Vec<String>,
    pub tags: Vec<String>,
}

/// Partial update request.
///
/// `None` leaves a field unchanged. For clearable fields `Some(None)` (JSON
/// `null`) clears the stored value.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DestinationPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub latitude: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub longitude: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<Category>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub visited: Option<bool>,
    #[serde(
        default,
        deserialize_with = "double_option",
        skip_serializing_if = "Option::is_none"
    )]
    pub visit_date: Option<Option<String>>,
    #[serde(
        default,
        deserialize_with = "double_option",
        skip_serializing_if = "Option::is_none"
    )]
    pub notes: Option<Option<String>>,
    #[serde(
        default,
        deserialize_with = "double_option",
        skip_serializing_if = "Option::is_none"
    )]
    pub rating: Option<Option<u8>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub photos: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tags: Option<Vec<String>>,
}

impl DestinationPatch {
    /// Validates present fields and applies the same empty-input
    /// normalization as create.
    pub fn normalize(self) -> Result<DestinationChanges, DestinationValidationError> {
        let name = self.name.as_deref().map(normalize_name).transpose()?;
        if let Some(latitude) = self.latitude {
            validate_coordinate("latitude", latitude)?;
        }
        if let Some(longitude) = self.longitude {
            validate_coordinate("longitude", longitude)?;
        }
        if let Some(rating) = self.rating {
            validate_rating(rating)?;
        }

        Ok(DestinationChanges {
            name,
            latitude: self.latitude,
            longitude: self.longitude,
            category: self.category,
            visited: self.visited,
            visit_date: self.visit_date.map(parse_visit_date).transpose()?,
            notes: self.notes.map(normalize_notes),
            rating: self.rating,
            photos: self.photos,
            tags: self.tags.map(normalize_tags).transpose()?,
        })
    }
}

/// Validated update payload handed to repositories.
///
/// Serializes only the fields that change; cleared fields serialize as `null`.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct DestinationChanges {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub latitude: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub longitude: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub category: Option<Category>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub visited: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub visit_date: Option<Option<NaiveDate>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notes: Option<Option<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rating: Option<Option<u8>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub photos: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tags: Option<Vec<String>>,
}

impl DestinationChanges {
    /// Returns whether no field is being changed (only `updated_at` moves).
    pub fn is_empty(&self) -> bool {
        self == &Self::default()
    }
}

fn normalize_name(name: &str) -> Result<String, DestinationValidationError> {
    validate_name(name)?;
    Ok(name.trim().to_string())
}

fn validate_name(name: &str) -> Result<(), DestinationValidationError> {
    if name.trim().is_empty() {
        return Err(DestinationValidationError::EmptyName);
    }
    Ok(())
}

fn validate_coordinate(field: &'static str, value: f64) -> Result<(), DestinationValidationError> {
    if !value.is_finite() {
        return Err(DestinationValidationError::NonFiniteCoordinate { field });
    }
    Ok(())
}

fn validate_rating(rating: Option<u8>) -> Result<(), DestinationValidationError> {
    match rating {
        Some(value) if !(MIN_RATING..=MAX_RATING).contains(&value) => {
            Err(DestinationValidationError::RatingOutOfRange(value))
        }
        _ => Ok(()),
    }
}

fn validate_tags(tags: &[String]) -> Result<(), DestinationValidationError> {
    for (index, tag) in tags.iter().enumerate() {
        if tag.trim().is_empty() {
            return Err(DestinationValidationError::BlankTag);
        }
        if tags[..index].contains(tag) {
            return Err(DestinationValidationError::DuplicateTag(tag.clone()));
        }
    }
    Ok(())
}

/// Trims tags and rejects blanks and duplicates, keeping input order.
pub fn normalize_tags(tags: Vec<String>) -> Result<Vec<String>, DestinationValidationError> {
    let trimmed = tags
        .into_iter()
        .map(|tag| tag.trim().to_string())
        .collect::<Vec<_>>();
    validate_tags(&trimmed)?;
    Ok(trimmed)
}

fn normalize_notes(notes: Option<String>) -> Option<String> {
    notes.filter(|value| !value.trim().is_empty())
}

fn parse_visit_date(value: Option<String>) -> Result<Option<NaiveDate>, DestinationValidationError> {
    let Some(raw) = value else {
        return Ok(None);
    };
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Ok(None);
    }
    NaiveDate::parse_from_str(trimmed, VISIT_DATE_FORMAT)
        .map(Some)
        .map_err(|_| DestinationValidationError::InvalidVisitDate(trimmed.to_string()))
}

fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

// Distinguishes a missing key (`None`) from an explicit `null` (`Some(None)`).
fn double_option<'de, D, T>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}
