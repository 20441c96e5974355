//! Best-effort compensating actions for the account sagas.
//!
//! Every operation swallows remote failures: they are logged as requiring
//! manual cleanup and reported through the return value, never raised. A
//! conflict (the entity is already back, or already gone) counts as success,
//! so running any compensation twice is harmless.

use common::AccountId;
use domain::{Card, CredentialSnapshot, Profile, ProfileDeletion};
use futures_util::future::join_all;

use crate::error::SagaError;
use crate::services::{CardService, IdentityService, ProfileService};

/// Result of one compensating action.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompensationOutcome {
    /// The action changed remote state.
    Applied,
    /// Remote state already matched; nothing to do.
    AlreadyApplied,
    /// The action failed; manual cleanup is required.
    Failed,
}

impl CompensationOutcome {
    /// Returns true unless the action failed.
    pub fn is_ok(&self) -> bool {
        !matches!(self, CompensationOutcome::Failed)
    }
}

/// How many cards were put back.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CardRestoreReport {
    pub requested: usize,
    pub restored: usize,
}

impl CardRestoreReport {
    pub fn is_complete(&self) -> bool {
        self.restored == self.requested
    }
}

/// Runs compensating actions against the remote services.
pub struct CompensationManager<P, I, C>
where
    P: ProfileService,
    I: IdentityService,
    C: CardService,
{
    profiles: P,
    identity: I,
    cards: C,
}

impl<P, I, C> CompensationManager<P, I, C>
where
    P: ProfileService,
    I: IdentityService,
    C: CardService,
{
    pub fn new(profiles: P, identity: I, cards: C) -> Self {
        Self {
            profiles,
            identity,
            cards,
        }
    }

    /// Recreates a deleted profile with its original id and fields.
    #[tracing::instrument(skip(self, profile), fields(account_id = %profile.id))]
    pub async fn recreate_profile(&self, profile: &Profile) -> CompensationOutcome {
        let result = self.profiles.create(profile.to_new_profile()).await.map(|_| ());
        record("recreate_profile", &profile.id, result)
    }

    /// Writes back a deleted credential record, password hash included.
    #[tracing::instrument(skip(self, snapshot), fields(account_id = %snapshot.account_id))]
    pub async fn recreate_credentials(&self, snapshot: &CredentialSnapshot) -> CompensationOutcome {
        let result = self.identity.restore(snapshot.clone()).await;
        record("recreate_credentials", &snapshot.account_id, result)
    }

    /// Recreates cards concurrently.
    ///
    /// Partial success is accepted: failed cards are logged and counted, not
    /// retried, and cards already restored are kept.
    #[tracing::instrument(skip(self, cards), fields(card_count = cards.len()))]
    pub async fn recreate_cards(&self, cards: &[Card], account_id: &AccountId) -> CardRestoreReport {
        let attempts = cards.iter().map(|card| async move {
            let result = self
                .cards
                .create(account_id, card.to_new_card())
                .await
                .map(|_| ());
            record("recreate_card", account_id, result)
        });

        let restored = join_all(attempts)
            .await
            .into_iter()
            .filter(CompensationOutcome::is_ok)
            .count();
        let report = CardRestoreReport {
            requested: cards.len(),
            restored,
        };

        if !report.is_complete() {
            tracing::warn!(
                %account_id,
                requested = report.requested,
                restored = report.restored,
                "cards only partially restored, manual cleanup required"
            );
        }
        report
    }

    /// Restores a profile and then its cards from a deletion snapshot.
    ///
    /// Cards are only attempted once the profile is back.
    pub async fn restore_profile(
        &self,
        snapshot: &ProfileDeletion,
    ) -> (CompensationOutcome, CardRestoreReport) {
        let outcome = self.recreate_profile(&snapshot.deleted).await;
        if !outcome.is_ok() {
            return (
                outcome,
                CardRestoreReport {
                    requested: snapshot.related.len(),
                    restored: 0,
                },
            );
        }
        let report = self
            .recreate_cards(&snapshot.related, &snapshot.deleted.id)
            .await;
        (outcome, report)
    }

    /// Deletes a profile created by a registration that later failed.
    ///
    /// A profile that is already gone counts as removed.
    #[tracing::instrument(skip(self))]
    pub async fn remove_profile(&self, account_id: &AccountId) -> CompensationOutcome {
        let result = match self.profiles.delete(account_id).await {
            Err(SagaError::NotFound(msg)) => Err(SagaError::Conflict(msg)),
            other => other.map(|_| ()),
        };
        record("remove_profile", account_id, result)
    }
}

fn record(
    step: &'static str,
    account_id: &AccountId,
    result: Result<(), SagaError>,
) -> CompensationOutcome {
    metrics::counter!("compensations_total", "step" => step).increment(1);

    match result {
        Ok(()) => {
            tracing::info!(step, %account_id, "compensation applied");
            CompensationOutcome::Applied
        }
        Err(err) if err.is_conflict() => {
            tracing::info!(step, %account_id, reason = %err, "compensation already applied");
            CompensationOutcome::AlreadyApplied
        }
        Err(err) => {
            metrics::counter!("compensation_failures_total", "step" => step).increment(1);
            let failure = SagaError::CompensationFailed {
                step: step.to_string(),
                reason: err.to_string(),
            };
            tracing::error!(
                %account_id,
                error = %failure,
                "compensation failed, manual cleanup required"
            );
            CompensationOutcome::Failed
        }
    }
}
