//! Explicit session context for the current learner.
//!
//! Identity is passed into services as a value rather than read from ambient
//! global state; whoever drives the services (binary, tests) decides where it
//! comes from.

use tryout_core::model::LearnerId;

use crate::error::AuthError;

/// The signed-in principal as reported by the external auth service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub learner_id: LearnerId,
    pub email: String,
    pub is_admin: bool,
}

impl Identity {
    #[must_use]
    pub fn learner(learner_id: LearnerId, email: impl Into<String>) -> Self {
        Self {
            learner_id,
            email: email.into(),
            is_admin: false,
        }
    }

    #[must_use]
    pub fn admin(learner_id: LearnerId, email: impl Into<String>) -> Self {
        Self {
            learner_id,
            email: email.into(),
            is_admin: true,
        }
    }
}

/// Auth context carried through service calls.
#[derive(Debug, Clone, Default)]
pub struct AuthSession {
    identity: Option<Identity>,
}

impl AuthSession {
    /// A context with nobody signed in.
    #[must_use]
    pub fn anonymous() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn signed_in(identity: Identity) -> Self {
        Self {
            identity: Some(identity),
        }
    }

    #[must_use]
    pub fn current(&self) -> Option<&Identity> {
        self.identity.as_ref()
    }

    /// The signed-in learner's id.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::Unauthenticated` when nobody is signed in.
    pub fn require_learner(&self) -> Result<LearnerId, AuthError> {
        self.identity
            .as_ref()
            .map(|i| i.learner_id)
            .ok_or(AuthError::Unauthenticated)
    }

    /// The signed-in identity, which must carry the admin flag.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::Unauthenticated` when nobody is signed in and
    /// `AuthError::Forbidden` for non-admin identities.
    pub fn require_admin(&self) -> Result<&Identity, AuthError> {
        let identity = self.identity.as_ref().ok_or(AuthError::Unauthenticated)?;
        if !identity.is_admin {
            return Err(AuthError::Forbidden);
        }
        Ok(identity)
    }

    /// Drops the signed-in identity.
    pub fn sign_out(&mut self) {
        self.identity = None;
    }
}
