use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::model::ids::PackageId;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum PackageError {
    #[error("package name cannot be empty")]
    EmptyName,
}

/// A named bundle of timed sections offered as one exam product.
///
/// Packages own their sections; tryout sessions schedule a window in which a
/// package may be attempted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Package {
    id: PackageId,
    name: String,
    description: Option<String>,
    active: bool,
    created_at: DateTime<Utc>,
}

impl Package {
    /// Creates a new package.
    ///
    /// # Errors
    ///
    /// Returns `PackageError::EmptyName` if the name is blank.
    pub fn new(
        id: PackageId,
        name: impl Into<String>,
        description: Option<String>,
        created_at: DateTime<Utc>,
    ) -> Result<Self, PackageError> {
        let name = name.into();
        if name.trim().is_empty() {
            return Err(PackageError::EmptyName);
        }
        Ok(Self {
            id,
            name,
            description,
            active: true,
            created_at,
        })
    }

    /// Rehydrate a package from persisted storage.
    ///
    /// # Errors
    ///
    /// Returns `PackageError::EmptyName` if the stored name is blank.
    pub fn from_persisted(
        id: PackageId,
        name: impl Into<String>,
        description: Option<String>,
        active: bool,
        created_at: DateTime<Utc>,
    ) -> Result<Self, PackageError> {
        let mut package = Self::new(id, name, description, created_at)?;
        package.active = active;
        Ok(package)
    }

    #[must_use]
    pub fn id(&self) -> PackageId {
        self.id
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    #[must_use]
    pub fn is_active(&self) -> bool {
        self.active
    }

    #[must_use]
    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Rename the package.
    ///
    /// # Errors
    ///
    /// Returns `PackageError::EmptyName` if the new name is blank.
    pub fn rename(&mut self, name: impl Into<String>) -> Result<(), PackageError> {
        let name = name.into();
        if name.trim().is_empty() {
            return Err(PackageError::EmptyName);
        }
        self.name = name;
        Ok(())
    }

    pub fn set_description(&mut self, description: Option<String>) {
        self.description = description;
    }

    /// Activate or retire the package. Retired packages stay queryable for
    /// historical attempts but are hidden from learners.
    pub fn set_active(&mut self, active: bool) {
        self.active = active;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::time::fixed_now;

    #[test]
    fn new_package_is_active() {
        let package = Package::new(
            PackageId::new(1),
            "UTBK Saintek",
            Some("Full preparation bundle".into()),
            fixed_now(),
        )
        .unwrap();

        assert!(package.is_active());
        assert_eq!(package.name(), "UTBK Saintek");
    }

    #[test]
    fn blank_name_is_rejected() {
        let err = Package::new(PackageId::new(1), "   ", None, fixed_now()).unwrap_err();
        assert_eq!(err, PackageError::EmptyName);
    }

    #[test]
    fn rename_keeps_other_fields() {
        let mut package = Package::new(PackageId::new(1), "Old", None, fixed_now()).unwrap();
        package.rename("New").unwrap();
        assert_eq!(package.name(), "New");
        assert!(package.rename("").is_err());
        assert_eq!(package.name(), "New");
    }
}
