//! UUID v7 utilities for time-ordered identifiers.
//!
//! Job ids, task handles and insight row ids are all UUIDv7 so that they
//! sort by creation time in the database.

use uuid::Uuid;

/// Generate a new UUIDv7 identifier.
///
/// # Example
///
/// ```
/// use threadlens_core::uuid_utils::new_v7;
///
/// let id = new_v7();
/// assert_eq!(id.get_version_num(), 7);
/// ```
#[inline]
pub fn new_v7() -> Uuid {
    Uuid::now_v7()
}
