//! Profile service trait and in-memory implementation.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use chrono::Utc;
use common::AccountId;
use domain::{Card, NewProfile, Profile, ProfileDeletion};

use super::{read, write};
use crate::error::SagaError;

/// Trait for profile service operations.
#[async_trait]
pub trait ProfileService: Send + Sync {
    /// Creates a profile under the id carried by `profile`.
    async fn create(&self, profile: NewProfile) -> Result<Profile, SagaError>;

    /// Deletes a profile together with its cards and returns both.
    async fn delete(&self, id: &AccountId) -> Result<ProfileDeletion, SagaError>;
}

#[derive(Debug, Default)]
pub(super) struct InMemoryProfileState {
    pub(super) profiles: HashMap<AccountId, Profile>,
    pub(super) cards: HashMap<AccountId, Vec<Card>>,
    pub(super) next_card_id: u32,
    fail_on_create: bool,
    fail_on_delete: bool,
    pub(super) fail_on_card_create: bool,
    pub(super) failing_card_numbers: HashSet<String>,
    create_calls: usize,
    delete_calls: usize,
    pub(super) card_create_calls: usize,
}

/// In-memory profile service for testing.
///
/// Also serves the card endpoints, since cards live in the profile service
/// and are cascade-deleted with their profile.
#[derive(Debug, Clone, Default)]
pub struct InMemoryProfileService {
    pub(super) state: Arc<RwLock<InMemoryProfileState>>,
}

impl InMemoryProfileService {
    /// Creates a new in-memory profile service.
    pub fn new() -> Self {
        Self::default()
    }

    /// Configures create calls to fail as if the service were down.
    pub fn set_fail_on_create(&self, fail: bool) {
        write(&self.state).fail_on_create = fail;
    }

    /// Configures delete calls to fail as if the service were down.
    pub fn set_fail_on_delete(&self, fail: bool) {
        write(&self.state).fail_on_delete = fail;
    }

    /// Configures every card create call to fail.
    pub fn set_fail_on_card_create(&self, fail: bool) {
        write(&self.state).fail_on_card_create = fail;
    }

    /// Configures card create calls for one card number to fail.
    pub fn fail_card_number(&self, number: impl Into<String>) {
        write(&self.state).failing_card_numbers.insert(number.into());
    }

    /// Returns true if a profile exists with the given id.
    pub fn has_profile(&self, id: &AccountId) -> bool {
        read(&self.state).profiles.contains_key(id)
    }

    /// Returns the stored profile, if any.
    pub fn profile(&self, id: &AccountId) -> Option<Profile> {
        read(&self.state).profiles.get(id).cloned()
    }

    /// Returns the cards stored for an account.
    pub fn cards(&self, id: &AccountId) -> Vec<Card> {
        read(&self.state).cards.get(id).cloned().unwrap_or_default()
    }

    /// Returns the number of stored profiles.
    pub fn profile_count(&self) -> usize {
        read(&self.state).profiles.len()
    }

    /// Returns how many create calls were made.
    pub fn create_calls(&self) -> usize {
        read(&self.state).create_calls
    }

    /// Returns how many delete calls were made.
    pub fn delete_calls(&self) -> usize {
        read(&self.state).delete_calls
    }

    /// Returns how many card create calls were made.
    pub fn card_create_calls(&self) -> usize {
        read(&self.state).card_create_calls
    }
}

#[async_trait]
impl ProfileService for InMemoryProfileService {
    async fn create(&self, profile: NewProfile) -> Result<Profile, SagaError> {
        let mut state = write(&self.state);
        state.create_calls += 1;

        if state.fail_on_create {
            return Err(SagaError::RemoteUnavailable(
                "profile service unavailable".to_string(),
            ));
        }
        if state.profiles.contains_key(&profile.id) {
            return Err(SagaError::Conflict(format!(
                "profile {} already exists",
                profile.id
            )));
        }

        let profile = profile.into_profile(Utc::now());
        state.profiles.insert(profile.id.clone(), profile.clone());
        Ok(profile)
    }

    async fn delete(&self, id: &AccountId) -> Result<ProfileDeletion, SagaError> {
        let mut state = write(&self.state);
        state.delete_calls += 1;

        if state.fail_on_delete {
            return Err(SagaError::RemoteUnavailable(
                "profile service unavailable".to_string(),
            ));
        }

        let profile = state
            .profiles
            .remove(id)
            .ok_or_else(|| SagaError::NotFound(format!("profile {id}")))?;
        let cards = state.cards.remove(id).unwrap_or_default();
        Ok(ProfileDeletion::new(profile, cards))
    }
}
