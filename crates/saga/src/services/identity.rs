//! Identity service trait and in-memory implementation.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use chrono::Utc;
use common::AccountId;
use domain::{CredentialSnapshot, Role};

use super::{read, write};
use crate::error::SagaError;

/// Trait for credential operations.
#[async_trait]
pub trait IdentityService: Send + Sync {
    /// Creates login credentials bound to an account id.
    async fn create(
        &self,
        account_id: &AccountId,
        login: &str,
        password: &str,
    ) -> Result<(), SagaError>;

    /// Deletes the credentials of an account and returns the full record.
    async fn delete(&self, account_id: &AccountId) -> Result<CredentialSnapshot, SagaError>;

    /// Writes back a previously deleted credential record verbatim.
    async fn restore(&self, snapshot: CredentialSnapshot) -> Result<(), SagaError>;
}

#[derive(Debug, Default)]
struct InMemoryIdentityState {
    credentials: HashMap<AccountId, CredentialSnapshot>,
    fail_on_create: bool,
    fail_on_delete: bool,
    fail_on_restore: bool,
    restore_calls: usize,
}

/// In-memory identity service for testing.
#[derive(Debug, Clone, Default)]
pub struct InMemoryIdentityService {
    state: Arc<RwLock<InMemoryIdentityState>>,
}

impl InMemoryIdentityService {
    /// Creates a new in-memory identity service.
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

    /// Configures restore calls to fail as if the service were down.
    pub fn set_fail_on_restore(&self, fail: bool) {
        write(&self.state).fail_on_restore = fail;
    }

    /// Returns true if credentials exist for the account.
    pub fn has_credentials(&self, account_id: &AccountId) -> bool {
        read(&self.state).credentials.contains_key(account_id)
    }

    /// Returns the stored credential record, if any.
    pub fn credentials(&self, account_id: &AccountId) -> Option<CredentialSnapshot> {
        read(&self.state).credentials.get(account_id).cloned()
    }

    /// Returns the number of stored credential records.
    pub fn credential_count(&self) -> usize {
        read(&self.state).credentials.len()
    }

    /// Returns how many restore calls were made.
    pub fn restore_calls(&self) -> usize {
        read(&self.state).restore_calls
    }
}

#[async_trait]
impl IdentityService for InMemoryIdentityService {
    async fn create(
        &self,
        account_id: &AccountId,
        login: &str,
        password: &str,
    ) -> Result<(), SagaError> {
        let mut state = write(&self.state);

        if state.fail_on_create {
            return Err(SagaError::RemoteUnavailable(
                "identity service unavailable".to_string(),
            ));
        }
        if state.credentials.contains_key(account_id)
            || state.credentials.values().any(|c| c.login == login)
        {
            return Err(SagaError::Conflict(format!("login {login} already taken")));
        }

        let now = Utc::now();
        state.credentials.insert(
            account_id.clone(),
            CredentialSnapshot {
                account_id: account_id.clone(),
                login: login.to_string(),
                // Not a real hash; the fake only needs something opaque to restore.
                password_hash: format!("fake${}${}", login, password.len()),
                roles: vec![Role::User],
                created_at: now,
                updated_at: now,
            },
        );
        Ok(())
    }

    async fn delete(&self, account_id: &AccountId) -> Result<CredentialSnapshot, SagaError> {
        let mut state = write(&self.state);

        if state.fail_on_delete {
            return Err(SagaError::RemoteUnavailable(
                "identity service unavailable".to_string(),
            ));
        }

        state
            .credentials
            .remove(account_id)
            .ok_or_else(|| SagaError::NotFound(format!("credentials for {account_id}")))
    }

    async fn restore(&self, snapshot: CredentialSnapshot) -> Result<(), SagaError> {
        let mut state = write(&self.state);
        state.restore_calls += 1;

        if state.fail_on_restore {
            return Err(SagaError::RemoteUnavailable(
                "identity service unavailable".to_string(),
            ));
        }
        if state.credentials.contains_key(&snapshot.account_id) {
            return Err(SagaError::Conflict(format!(
                "credentials for {} already exist",
                snapshot.account_id
            )));
        }

        state
            .credentials
            .insert(snapshot.account_id.clone(), snapshot);
        Ok(())
    }
}
