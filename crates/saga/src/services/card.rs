//! Card service trait.
//!
//! Cards belong to the profile service, so [`InMemoryProfileService`] is the
//! in-memory implementation.

use async_trait::async_trait;
use common::AccountId;
use domain::{Card, NewCard};

use super::profile::InMemoryProfileService;
use super::write;
use crate::error::SagaError;

/// Trait for card operations.
#[async_trait]
pub trait CardService: Send + Sync {
    /// Adds a card to an existing profile.
    async fn create(&self, account_id: &AccountId, card: NewCard) -> Result<Card, SagaError>;
}

#[async_trait]
impl CardService for InMemoryProfileService {
    async fn create(&self, account_id: &AccountId, card: NewCard) -> Result<Card, SagaError> {
        let mut state = write(&self.state);
        state.card_create_calls += 1;

        if state.fail_on_card_create || state.failing_card_numbers.contains(&card.number) {
            return Err(SagaError::RemoteUnavailable(
                "card service unavailable".to_string(),
            ));
        }
        if !state.profiles.contains_key(account_id) {
            return Err(SagaError::NotFound(format!("profile {account_id}")));
        }
        if state
            .cards
            .get(account_id)
            .is_some_and(|cards| cards.iter().any(|c| c.number == card.number))
        {
            return Err(SagaError::Conflict(format!(
                "card already registered for {account_id}"
            )));
        }

        state.next_card_id += 1;
        let stored = Card {
            id: format!("CARD-{:04}", state.next_card_id),
            account_id: account_id.clone(),
            number: card.number,
            holder_name: card.holder_name,
            expiry: card.expiry,
        };
        state
            .cards
            .entry(account_id.clone())
            .or_default()
            .push(stored.clone());
        Ok(stored)
    }
}
