//! Account records spread across the profile, identity and card services.

mod credentials;
mod profile;
mod registration;

pub use credentials::{CredentialSnapshot, Role};
pub use profile::{Card, NewCard, NewProfile, Profile};
pub use registration::{AccountSummary, RegistrationRequest};

use serde::{Deserialize, Serialize};

/// Result of a delete call that hands back what it removed.
///
/// `deleted` is the aggregate root that was removed and `related` holds the
/// entities the remote service cascade-deleted with it. Sagas keep the whole
/// value as the compensation snapshot for the step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeletionResult<T, R> {
    pub deleted: T,
    #[serde(default = "Vec::new")]
    pub related: Vec<R>,
}

impl<T, R> DeletionResult<T, R> {
    /// Creates a deletion result.
    pub fn new(deleted: T, related: Vec<R>) -> Self {
        Self { deleted, related }
    }

    /// Splits the result into the deleted entity and its related entities.
    pub fn into_parts(self) -> (T, Vec<R>) {
        (self.deleted, self.related)
    }
}

/// What the profile service returns from a delete: the profile and its cards.
pub type ProfileDeletion = DeletionResult<Profile, Card>;
