use thiserror::Error;

use crate::model::ids::{PackageId, SectionId};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum SectionError {
    #[error("section name cannot be empty")]
    EmptyName,

    #[error("section duration must be at least one minute")]
    InvalidDuration,
}

/// A timed, ordered subdivision of a package ("subtest").
///
/// `order_index` defines the traversal sequence within the package; loaders
/// must return sections sorted by it ascending.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Section {
    id: SectionId,
    package_id: PackageId,
    name: String,
    duration_minutes: u32,
    order_index: u32,
}

impl Section {
    /// Creates a new section.
    ///
    /// # Errors
    ///
    /// Returns `SectionError::EmptyName` for a blank name and
    /// `SectionError::InvalidDuration` for a zero duration.
    pub fn new(
        id: SectionId,
        package_id: PackageId,
        name: impl Into<String>,
        duration_minutes: u32,
        order_index: u32,
    ) -> Result<Self, SectionError> {
        let name = name.into();
        if name.trim().is_empty() {
            return Err(SectionError::EmptyName);
        }
        if duration_minutes == 0 {
            return Err(SectionError::InvalidDuration);
        }
        Ok(Self {
            id,
            package_id,
            name,
            duration_minutes,
            order_index,
        })
    }

    #[must_use]
    pub fn id(&self) -> SectionId {
        self.id
    }

    #[must_use]
    pub fn package_id(&self) -> PackageId {
        self.package_id
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn duration_minutes(&self) -> u32 {
        self.duration_minutes
    }

    #[must_use]
    pub fn order_index(&self) -> u32 {
        self.order_index
    }

    /// Countdown budget for this section in seconds.
    #[must_use]
    pub fn duration_secs(&self) -> u32 {
        self.duration_minutes * 60
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn duration_converts_to_seconds() {
        let section = Section::new(SectionId::new(1), PackageId::new(1), "Math", 30, 1).unwrap();
        assert_eq!(section.duration_secs(), 1800);
    }

    #[test]
    fn zero_duration_is_rejected() {
        let err =
            Section::new(SectionId::new(1), PackageId::new(1), "Math", 0, 1).unwrap_err();
        assert_eq!(err, SectionError::InvalidDuration);
    }
}
