//! Validation and defaulting applied around every storage call.
//!
//! No I/O happens here; the persistence layer calls these before writing and
//! after reading.

use chrono::Utc;
use rand::Rng;

use crate::{Guide, GuideInput, GuideRecord, HomePage, ValidationError};

pub(crate) const TITLE_REQUIRED: &str = "Guide title is required and must be a string";
pub(crate) const CHAPTERS_MUST_BE_ARRAY: &str = "Guide chapters must be an array";

/// Length of the random part of a generated id
const RANDOM_SUFFIX_LEN: usize = 10;

/// Check the fields every create and update requires.
///
/// # Errors
///
/// Returns [`ValidationError`] if the title is missing or empty.
pub fn validate_guide_input(input: &GuideInput) -> Result<(), ValidationError> {
    match input.title.as_deref() {
        Some(title) if !title.is_empty() => Ok(()),
        _ => Err(ValidationError::new(TITLE_REQUIRED)),
    }
}

/// Normalize a stored record for callers.
///
/// A missing home page is replaced with [`HomePage::welcome`] and missing
/// chapters become an empty list. Nothing is written back.
#[must_use]
pub fn with_default_home_page(record: GuideRecord) -> Guide {
    Guide {
        id: record.id,
        title: record.title,
        home_page: record.home_page.unwrap_or_default(),
        chapters: record.chapters.unwrap_or_default(),
    }
}

/// Short, URL-safe, roughly time-ordered id.
///
/// Base-36 milliseconds since the epoch followed by a random base-36 suffix.
/// Uniqueness is probabilistic; creation still checks for an existing record.
#[must_use]
pub fn generate_id() -> String {
    let millis = u64::try_from(Utc::now().timestamp_millis()).unwrap_or_default();
    let mut rng = rand::thread_rng();

    let mut id = to_base36(millis);
    id.extend((0..RANDOM_SUFFIX_LEN).map(|_| base36_digit(rng.gen_range(0..36))));
    id
}

fn to_base36(mut value: u64) -> String {
    if value == 0 {
        return "0".to_string();
    }

    let mut digits = Vec::new();
    while value > 0 {
        // remainder is < 36
        #[allow(clippy::cast_possible_truncation)]
        digits.push(base36_digit((value % 36) as u32));
        value /= 36;
    }
    digits.iter().rev().collect()
}

fn base36_digit(digit: u32) -> char {
    char::from_digit(digit, 36).unwrap_or('0')
}
