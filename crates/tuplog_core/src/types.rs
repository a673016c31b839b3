//! Core type definitions for tuplog.

use std::fmt;

/// Log sequence number.
///
/// Every durable mutation gets the next LSN. LSNs are never reused, and
/// [`Lsn::ZERO`] is the LSN of an empty database.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Lsn(pub u64);

impl Lsn {
    /// The LSN of an empty database.
    pub const ZERO: Self = Self(0);

    /// Creates a new LSN.
    #[must_use]
    pub const fn new(lsn: u64) -> Self {
        Self(lsn)
    }

    /// Returns the raw value.
    #[must_use]
    pub const fn as_u64(self) -> u64 {
        self.0
    }

    /// Returns the following LSN.
    #[must_use]
    pub const fn next(self) -> Self {
        Self(self.0 + 1)
    }
}

impl fmt::Display for Lsn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identifier of a space.
///
/// Space IDs are assigned when a space is created and never change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SpaceId(pub u32);

impl SpaceId {
    /// Creates a new space ID.
    #[must_use]
    pub const fn new(id: u32) -> Self {
        Self(id)
    }

    /// Returns the raw ID value.
    #[must_use]
    pub const fn as_u32(self) -> u32 {
        self.0
    }
}

impl fmt::Display for SpaceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lsn_ordering() {
        assert!(Lsn::ZERO < Lsn::new(1));
        assert_eq!(Lsn::new(5).next(), Lsn::new(6));
        assert_eq!(Lsn::default(), Lsn::ZERO);
    }

    #[test]
    fn display_is_plain_number() {
        assert_eq!(Lsn::new(42).to_string(), "42");
        assert_eq!(SpaceId::new(512).to_string(), "512");
    }
}
