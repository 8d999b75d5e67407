//! Request fingerprints for deduplication.
//!
//! Two requests that ask for the same thing must map to the same signature,
//! no matter how the caller spelled the location or ordered the categories.

use sha2::{Digest, Sha256};

/// Number of hex characters kept from the digest.
pub const SIGNATURE_LEN: usize = 16;

const FIELD_DELIMITER: &str = "|";
const CATEGORY_DELIMITER: &str = ",";

/// Normalizes a location for hashing and key building: trimmed, lowercased.
pub fn normalize_location(location: &str) -> String {
    location.trim().to_lowercase()
}

/// Computes the dedup signature of a search request.
///
/// Location is trimmed and lowercased, the date is used verbatim, and the
/// categories are deduplicated and sorted before hashing. Callers are
/// expected to pass canonical category labels (see
/// [`crate::traits::CategoryNormalizer`]).
///
/// # Examples
///
/// ```
/// use scout_core::signature::signature;
///
/// let a = signature(" Berlin ", "2024-01-15", &["Music", "Theater"]);
/// let b = signature("berlin", "2024-01-15", &["Theater", "Music"]);
/// assert_eq!(a, b);
/// assert_eq!(a.len(), 16);
/// ```
pub fn signature<S: AsRef<str>>(location: &str, date: &str, categories: &[S]) -> String {
    let mut cats: Vec<&str> = categories.iter().map(AsRef::as_ref).collect();
    cats.sort_unstable();
    cats.dedup();

    let material = [
        normalize_location(location).as_str(),
        date,
        cats.join(CATEGORY_DELIMITER).as_str(),
    ]
    .join(FIELD_DELIMITER);

    let mut hasher = Sha256::new();
    hasher.update(material.as_bytes());
    let digest = hasher.finalize();
    let hex = format!("{digest:x}");
    hex.chars().take(SIGNATURE_LEN).collect()
}
