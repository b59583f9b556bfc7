//! Tri-state lookup result
//!
//! Distinguishes "never existed" from "exists but is tombstoned" so callers
//! cannot conflate the two.

/// Outcome of looking a record (or anything with a delete lifecycle) up
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Lookup<T> {
    /// The value exists and is current
    Found(T),
    /// Nothing is known under this key
    NotFound,
    /// The value existed but has been deleted
    Deleted,
}

impl<T> Lookup<T> {
    /// Returns the value if found, discarding the not-found/deleted distinction
    pub fn found(self) -> Option<T> {
        match self {
            Lookup::Found(value) => Some(value),
            Lookup::NotFound | Lookup::Deleted => None,
        }
    }

    /// Borrowing variant of [`Lookup::found`]
    pub fn as_found(&self) -> Option<&T> {
        match self {
            Lookup::Found(value) => Some(value),
            Lookup::NotFound | Lookup::Deleted => None,
        }
    }

    pub fn is_found(&self) -> bool {
        matches!(self, Lookup::Found(_))
    }

    pub fn is_deleted(&self) -> bool {
        matches!(self, Lookup::Deleted)
    }

    /// Maps the found value, preserving the other states
    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Lookup<U> {
        match self {
            Lookup::Found(value) => Lookup::Found(f(value)),
            Lookup::NotFound => Lookup::NotFound,
            Lookup::Deleted => Lookup::Deleted,
        }
    }

    /// Short label for logging
    pub fn state(&self) -> &'static str {
        match self {
            Lookup::Found(_) => "found",
            Lookup::NotFound => "not_found",
            Lookup::Deleted => "deleted",
        }
    }
}
