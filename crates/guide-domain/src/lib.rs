//! # Guide Domain Model
//!
//! Core entities for authored guides: a guide has a title, a home page and an
//! ordered list of chapters, each chapter an ordered list of sections. These
//! types are shared by the persistence layer and the HTTP surface.
//!
//! Field names on the wire and on disk follow the stored document format
//! (`_id`, `homePage`), so a guide written by one backend can be read back by
//! any other.

#![forbid(unsafe_code)]
#![warn(clippy::all, clippy::pedantic, clippy::nursery)]
#![allow(clippy::module_name_repetitions)]

pub mod contract;

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

pub use contract::{generate_id, validate_guide_input, with_default_home_page};

// =============================================================================
// VALUE OBJECTS
// =============================================================================

/// Landing page shown before any chapter is selected
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HomePage {
    pub title: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub content: String,
}

impl HomePage {
    /// Title of the default home page
    pub const WELCOME_TITLE: &'static str = "ברוכים הבאים למדריך!";

    /// Body of the default home page
    pub const WELCOME_CONTENT: &'static str = "מדריך זה נועד לסייע לכם. הוא מחולק למספר פרקים, וכל אחד מהם מכסה נושא חשוב.\n\nכדי להתחיל, בחרו את הפרק הרצוי מסרגל הניווט.";

    pub fn new(title: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            content: content.into(),
        }
    }

    /// The fixed localized home page injected wherever one is missing
    #[must_use]
    pub fn welcome() -> Self {
        Self::new(Self::WELCOME_TITLE, Self::WELCOME_CONTENT)
    }
}

impl Default for HomePage {
    fn default() -> Self {
        Self::welcome()
    }
}

// =============================================================================
// ENTITY TYPES
// =============================================================================

/// Leaf text block of a chapter
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Section {
    pub id: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub title: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub content: String,
}

/// Ordered group of sections. Ids are client-generated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chapter {
    pub id: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub title: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub sections: Vec<Section>,
}

/// Guide as returned to callers: `home_page` and `chapters` are always present
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Guide {
    #[serde(rename = "_id")]
    pub id: String,
    pub title: String,
    pub home_page: HomePage,
    pub chapters: Vec<Chapter>,
}

impl Guide {
    /// Projection kept in the shared index
    #[must_use]
    pub fn summary(&self) -> IndexEntry {
        IndexEntry {
            id: self.id.clone(),
            title: self.title.clone(),
        }
    }
}

/// Guide as found in storage.
///
/// Older records may predate `homePage` or carry `null` in place of a field,
/// so everything except the id is optional here. A home page that does not
/// decode is treated as missing. Use [`with_default_home_page`] to turn a
/// record into a [`Guide`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GuideRecord {
    #[serde(rename = "_id", default)]
    pub id: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub title: String,
    #[serde(default, deserialize_with = "lenient_home_page")]
    pub home_page: Option<HomePage>,
    #[serde(default)]
    pub chapters: Option<Vec<Chapter>>,
}

impl From<Guide> for GuideRecord {
    fn from(guide: Guide) -> Self {
        Self {
            id: guide.id,
            title: guide.title,
            home_page: Some(guide.home_page),
            chapters: Some(guide.chapters),
        }
    }
}

/// `{_id, title}` entry of the guide index
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct IndexEntry {
    #[serde(rename = "_id")]
    pub id: String,
    pub title: String,
}

impl IndexEntry {
    pub fn new(id: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
        }
    }
}

// =============================================================================
// INPUT TYPES
// =============================================================================

/// Caller-supplied guide body for create and update.
///
/// Built from untyped JSON with [`GuideInput::from_json`] so that wrong-typed
/// fields surface as a [`ValidationError`] instead of a decoding failure.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GuideInput {
    pub id: Option<String>,
    pub title: Option<String>,
    pub home_page: Option<HomePage>,
    pub chapters: Option<Vec<Chapter>>,
}

impl GuideInput {
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: Some(title.into()),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    #[must_use]
    pub fn with_home_page(mut self, home_page: HomePage) -> Self {
        self.home_page = Some(home_page);
        self
    }

    #[must_use]
    pub fn with_chapters(mut self, chapters: Vec<Chapter>) -> Self {
        self.chapters = Some(chapters);
        self
    }

    /// Parse a request body.
    ///
    /// `null` and absent fields are equivalent. An empty `_id` counts as
    /// absent, matching how ids are resolved at creation.
    ///
    /// # Errors
    ///
    /// Returns [`ValidationError`] when the body is not an object or a field
    /// has the wrong shape.
    pub fn from_json(value: &Value) -> Result<Self, ValidationError> {
        let Some(body) = value.as_object() else {
            return Err(ValidationError::new("Guide body must be a JSON object"));
        };

        let id = match body.get("_id") {
            None | Some(Value::Null) => None,
            Some(Value::String(id)) if id.is_empty() => None,
            Some(Value::String(id)) => Some(id.clone()),
            Some(_) => return Err(ValidationError::new("Guide id must be a string")),
        };

        let title = match body.get("title") {
            None | Some(Value::Null) => None,
            Some(Value::String(title)) => Some(title.clone()),
            Some(_) => return Err(ValidationError::new(contract::TITLE_REQUIRED)),
        };

        let home_page = match body.get("homePage") {
            None | Some(Value::Null) => None,
            Some(raw) => Some(HomePage::deserialize(raw).map_err(|e| {
                ValidationError::new(format!("Guide home page is malformed: {e}"))
            })?),
        };

        let chapters = match body.get("chapters") {
            None | Some(Value::Null) => None,
            Some(raw @ Value::Array(_)) => Some(Vec::<Chapter>::deserialize(raw).map_err(|e| {
                ValidationError::new(format!("Guide chapters are malformed: {e}"))
            })?),
            Some(_) => return Err(ValidationError::new(contract::CHAPTERS_MUST_BE_ARRAY)),
        };

        Ok(Self {
            id,
            title,
            home_page,
            chapters,
        })
    }
}

// =============================================================================
// LENIENT DECODING
// =============================================================================

/// `null` decodes to the field's default
fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

fn lenient_home_page<'de, D>(deserializer: D) -> Result<Option<HomePage>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Value::deserialize(deserializer)?;
    Ok(HomePage::deserialize(raw).ok())
}

// =============================================================================
// ERRORS
// =============================================================================

/// Caller input is malformed. Never retried.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{reason}")]
pub struct ValidationError {
    pub reason: String,
}

impl ValidationError {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}
