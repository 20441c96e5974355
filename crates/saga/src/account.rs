//! Account registration and deletion sagas.
//!
//! Forward steps run strictly in order. When a step fails, completed steps
//! are compensated in reverse and the triggering error is returned, labelled
//! with the step it came from. Compensation failures are logged, never
//! returned.

use std::sync::Arc;
use std::time::Instant;

use common::AccountId;
use domain::{AccountSummary, CredentialSnapshot, Profile, ProfileDeletion, RegistrationRequest};

use crate::compensation::CompensationManager;
use crate::error::{Result, SagaError};
use crate::services::{CardService, IdentityService, OrderService, ProfileService};
use crate::state::SagaState;
use crate::steps::{DELETION, REGISTRATION, STEP_IDENTITY, STEP_ORDER, STEP_PROFILE};

type IdGenerator = Arc<dyn Fn() -> AccountId + Send + Sync>;

/// Progress of one registration.
#[derive(Debug)]
struct RegistrationSaga {
    account_id: AccountId,
    state: SagaState,
    profile_created: bool,
}

/// Progress of one deletion, holding the snapshots needed to undo it.
#[derive(Debug)]
struct DeletionSaga {
    account_id: AccountId,
    state: SagaState,
    profile: Option<ProfileDeletion>,
    credentials: Option<CredentialSnapshot>,
}

fn enter(saga: &'static str, account_id: &AccountId, state: &mut SagaState, next: SagaState) {
    debug_assert!(
        state.can_transition_to(next),
        "invalid saga transition {state} -> {next}"
    );
    tracing::debug!(saga, %account_id, from = %state, to = %next, "saga state changed");
    *state = next;
}

impl RegistrationSaga {
    fn new(account_id: AccountId) -> Self {
        Self {
            account_id,
            state: SagaState::NotStarted,
            profile_created: false,
        }
    }

    fn enter(&mut self, next: SagaState) {
        enter(REGISTRATION, &self.account_id, &mut self.state, next);
    }
}

impl DeletionSaga {
    fn new(account_id: AccountId) -> Self {
        Self {
            account_id,
            state: SagaState::NotStarted,
            profile: None,
            credentials: None,
        }
    }

    fn enter(&mut self, next: SagaState) {
        enter(DELETION, &self.account_id, &mut self.state, next);
    }
}

/// Labels a first-step failure, letting not-found and validation errors
/// through unchanged.
fn first_step_error(saga: &'static str, stage: &'static str, err: SagaError) -> SagaError {
    match err {
        SagaError::NotFound(_) | SagaError::Validation(_) => err,
        other => SagaError::stage_failed(saga, stage, other),
    }
}

/// Orchestrates account registration and deletion across the profile,
/// identity, order and card services.
///
/// Saga state lives on the stack of each call; nothing is shared between
/// concurrent sagas and nothing is persisted.
pub struct AccountSagaCoordinator<P, I, O, C>
where
    P: ProfileService,
    I: IdentityService,
    O: OrderService,
    C: CardService,
{
    profiles: P,
    identity: I,
    orders: O,
    compensation: CompensationManager<P, I, C>,
    id_generator: IdGenerator,
}

impl<P, I, O, C> AccountSagaCoordinator<P, I, O, C>
where
    P: ProfileService + Clone,
    I: IdentityService + Clone,
    O: OrderService,
    C: CardService,
{
    /// Creates a coordinator that assigns random account ids.
    pub fn new(profiles: P, identity: I, orders: O, cards: C) -> Self {
        let compensation = CompensationManager::new(profiles.clone(), identity.clone(), cards);
        Self {
            profiles,
            identity,
            orders,
            compensation,
            id_generator: Arc::new(AccountId::generate),
        }
    }

    /// Replaces the account id generator.
    pub fn with_id_generator(
        mut self,
        generator: impl Fn() -> AccountId + Send + Sync + 'static,
    ) -> Self {
        self.id_generator = Arc::new(generator);
        self
    }

    pub fn compensation(&self) -> &CompensationManager<P, I, C> {
        &self.compensation
    }

    /// Registers an account: profile first, then credentials under the same id.
    ///
    /// If credentials cannot be created the new profile is removed again.
    #[tracing::instrument(skip(self, request), fields(login = %request.login))]
    pub async fn register_account(&self, request: RegistrationRequest) -> Result<AccountSummary> {
        request.check()?;

        metrics::counter!("account_sagas_total", "saga" => REGISTRATION).increment(1);
        let started = Instant::now();

        let mut saga = RegistrationSaga::new((self.id_generator)());
        let result = self.run_registration(&mut saga, &request).await;

        metrics::histogram!("saga_duration_seconds", "saga" => REGISTRATION)
            .record(started.elapsed().as_secs_f64());

        match result {
            Ok(profile) => {
                tracing::info!(account_id = %profile.id, "account registered");
                Ok(AccountSummary {
                    id: profile.id,
                    login: request.login,
                    email: profile.email,
                    name: profile.name,
                    surname: profile.surname,
                })
            }
            Err(err) => Err(record_failure(REGISTRATION, &saga.account_id, err)),
        }
    }

    async fn run_registration(
        &self,
        saga: &mut RegistrationSaga,
        request: &RegistrationRequest,
    ) -> Result<Profile> {
        saga.enter(SagaState::Running);

        tracing::info!(step = STEP_PROFILE, account_id = %saga.account_id, "saga step started");
        let profile = match self
            .profiles
            .create(request.profile_for(saga.account_id.clone()))
            .await
        {
            Ok(profile) => profile,
            Err(err) => {
                self.compensate_registration(saga).await;
                return Err(first_step_error(REGISTRATION, STEP_PROFILE, err));
            }
        };
        saga.profile_created = true;

        tracing::info!(step = STEP_IDENTITY, account_id = %saga.account_id, "saga step started");
        if let Err(err) = self
            .identity
            .create(&saga.account_id, &request.login, &request.password)
            .await
        {
            self.compensate_registration(saga).await;
            return Err(SagaError::stage_failed(REGISTRATION, STEP_IDENTITY, err));
        }

        saga.enter(SagaState::Completed);
        Ok(profile)
    }

    async fn compensate_registration(&self, saga: &mut RegistrationSaga) {
        saga.enter(SagaState::Compensating);
        if saga.profile_created {
            self.compensation.remove_profile(&saga.account_id).await;
        }
        saga.enter(SagaState::Failed);
    }

    /// Deletes an account: profile (with its cards), then credentials, then
    /// orders.
    ///
    /// On failure the profile, cards and credentials deleted so far are
    /// recreated from the snapshots the services returned. Cards may come
    /// back only partially; that is logged and not reported to the caller.
    #[tracing::instrument(skip(self))]
    pub async fn delete_account(&self, account_id: &AccountId) -> Result<()> {
        metrics::counter!("account_sagas_total", "saga" => DELETION).increment(1);
        let started = Instant::now();

        let mut saga = DeletionSaga::new(account_id.clone());
        let result = self.run_deletion(&mut saga).await;

        metrics::histogram!("saga_duration_seconds", "saga" => DELETION)
            .record(started.elapsed().as_secs_f64());

        match result {
            Ok(()) => {
                tracing::info!(%account_id, "account deleted");
                Ok(())
            }
            Err(err) => Err(record_failure(DELETION, account_id, err)),
        }
    }

    async fn run_deletion(&self, saga: &mut DeletionSaga) -> Result<()> {
        saga.enter(SagaState::Running);
        let account_id = saga.account_id.clone();

        tracing::info!(step = STEP_PROFILE, %account_id, "saga step started");
        match self.profiles.delete(&account_id).await {
            Ok(snapshot) => {
                tracing::info!(
                    step = STEP_PROFILE,
                    cards = snapshot.related.len(),
                    "saga step completed"
                );
                saga.profile = Some(snapshot);
            }
            Err(err) => {
                self.compensate_deletion(saga).await;
                return Err(first_step_error(DELETION, STEP_PROFILE, err));
            }
        }

        tracing::info!(step = STEP_IDENTITY, %account_id, "saga step started");
        match self.identity.delete(&account_id).await {
            Ok(snapshot) => saga.credentials = Some(snapshot),
            Err(err) => {
                self.compensate_deletion(saga).await;
                return Err(SagaError::stage_failed(DELETION, STEP_IDENTITY, err));
            }
        }

        tracing::info!(step = STEP_ORDER, %account_id, "saga step started");
        if let Err(err) = self.orders.delete_all_for_user(&account_id).await {
            self.compensate_deletion(saga).await;
            return Err(SagaError::stage_failed(DELETION, STEP_ORDER, err));
        }

        saga.enter(SagaState::Completed);
        Ok(())
    }

    /// Undoes completed deletion steps in reverse: credentials, then profile
    /// and cards.
    async fn compensate_deletion(&self, saga: &mut DeletionSaga) {
        saga.enter(SagaState::Compensating);

        if let Some(credentials) = saga.credentials.as_ref() {
            self.compensation.recreate_credentials(credentials).await;
        }
        if let Some(profile) = saga.profile.as_ref() {
            self.compensation.restore_profile(profile).await;
        }

        saga.enter(SagaState::Failed);
    }
}

fn record_failure(saga: &'static str, account_id: &AccountId, err: SagaError) -> SagaError {
    let stage = err.stage().unwrap_or("validation");
    metrics::counter!("account_saga_failures_total", "saga" => saga, "stage" => stage)
        .increment(1);
    tracing::warn!(saga, stage, %account_id, error = %err, "saga failed");
    err
}
