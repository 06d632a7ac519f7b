//! Merge decision rule: last edit wins, larger user id breaks ties.
//!
//! The rule is a pure function of `(editedAt, userId)` pairs, so any two
//! parties seeing the same inputs reach the same verdict regardless of
//! arrival order.

use std::cmp::Ordering;

use chrono::{DateTime, Utc};

/// Does the incoming mutation beat the stored version?
///
/// Strictly newer always wins; strictly older always loses; on the exact
/// same instant the lexicographically larger user identifier wins.
#[must_use]
pub fn incoming_wins(
    incoming_at: DateTime<Utc>,
    incoming_user: &str,
    stored_at: DateTime<Utc>,
    stored_user: &str,
) -> bool {
    match incoming_at.cmp(&stored_at) {
        Ordering::Greater => true,
        Ordering::Less => false,
        Ordering::Equal => incoming_user > stored_user,
    }
}
