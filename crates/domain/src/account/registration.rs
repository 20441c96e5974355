//! Registration input and the summary handed back to callers.

use chrono::NaiveDate;
use common::AccountId;
use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::account::NewProfile;
use crate::error::DomainError;

/// Input of the registration saga.
#[derive(Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct RegistrationRequest {
    #[validate(length(min = 1, max = 64, message = "login must be 1-64 characters"))]
    pub login: String,
    #[validate(length(min = 1, max = 128, message = "password must be 1-128 characters"))]
    pub password: String,
    #[validate(email(message = "email must be a valid address"))]
    pub email: String,
    #[serde(default)]
    #[validate(length(max = 100, message = "name must be at most 100 characters"))]
    pub name: String,
    #[serde(default)]
    #[validate(length(max = 100, message = "surname must be at most 100 characters"))]
    pub surname: String,
    #[serde(default)]
    pub birth_date: Option<NaiveDate>,
}

impl RegistrationRequest {
    /// Creates a request with only the mandatory fields set.
    pub fn new(
        login: impl Into<String>,
        password: impl Into<String>,
        email: impl Into<String>,
    ) -> Self {
        Self {
            login: login.into(),
            password: password.into(),
            email: email.into(),
            name: String::new(),
            surname: String::new(),
            birth_date: None,
        }
    }

    /// Sets the display name.
    pub fn with_name(mut self, name: impl Into<String>, surname: impl Into<String>) -> Self {
        self.name = name.into();
        self.surname = surname.into();
        self
    }

    /// Runs field validation, collapsing all violations into one error.
    pub fn check(&self) -> Result<(), DomainError> {
        self.validate()
            .map_err(|errors| DomainError::Validation(errors.to_string()))
    }

    /// Builds the profile payload for the given account id.
    pub fn profile_for(&self, id: AccountId) -> NewProfile {
        NewProfile {
            id,
            name: self.name.clone(),
            surname: self.surname.clone(),
            birth_date: self.birth_date,
            email: self.email.clone(),
        }
    }
}

impl std::fmt::Debug for RegistrationRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RegistrationRequest")
            .field("login", &self.login)
            .field("password", &"<redacted>")
            .field("email", &self.email)
            .field("name", &self.name)
            .field("surname", &self.surname)
            .field("birth_date", &self.birth_date)
            .finish()
    }
}

/// Result of a successful registration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccountSummary {
    pub id: AccountId,
    pub login: String,
    pub email: String,
    pub name: String,
    pub surname: String,
}
