//! HTTP implementations of the service traits.
//!
//! Status mapping shared by every client:
//! - 404 → `NotFound`
//! - 409 → `Conflict`
//! - 400 / 422 → `Validation`
//! - any other non-2xx, connect errors, timeouts, undecodable bodies →
//!   `RemoteUnavailable`

use std::time::Duration;

use async_trait::async_trait;
use common::AccountId;
use domain::{Card, CredentialSnapshot, NewCard, NewProfile, Profile, ProfileDeletion};
use reqwest::{Client, Response, StatusCode};
use serde::Serialize;
use serde::de::DeserializeOwned;

use super::{
    AuthorizationProvider, AuthorizationRequest, CardService, IdentityService, OrderService,
    ProfileService,
};
use crate::error::SagaError;

/// Timeouts applied to every remote call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HttpClientConfig {
    pub connect_timeout: Duration,
    pub request_timeout: Duration,
}

impl Default for HttpClientConfig {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(2),
            request_timeout: Duration::from_secs(5),
        }
    }
}

impl HttpClientConfig {
    /// Builds a `reqwest` client with these timeouts.
    pub fn build_client(&self) -> Result<Client, SagaError> {
        Client::builder()
            .connect_timeout(self.connect_timeout)
            .timeout(self.request_timeout)
            .build()
            .map_err(|e| SagaError::RemoteUnavailable(format!("cannot build HTTP client: {e}")))
    }
}

/// Maps a non-success status to the saga error taxonomy.
pub fn error_for_status(status: StatusCode, detail: String) -> SagaError {
    match status {
        StatusCode::NOT_FOUND => SagaError::NotFound(detail),
        StatusCode::CONFLICT => SagaError::Conflict(detail),
        StatusCode::BAD_REQUEST | StatusCode::UNPROCESSABLE_ENTITY => {
            SagaError::Validation(detail)
        }
        _ => SagaError::RemoteUnavailable(format!("{status}: {detail}")),
    }
}

fn transport_error(what: &str, err: reqwest::Error) -> SagaError {
    SagaError::RemoteUnavailable(format!("{what}: {err}"))
}

async fn check(what: &str, response: Response) -> Result<Response, SagaError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    let detail = if body.is_empty() {
        what.to_string()
    } else {
        format!("{what}: {body}")
    };
    Err(error_for_status(status, detail))
}

async fn decode<T: DeserializeOwned>(what: &str, response: Response) -> Result<T, SagaError> {
    response
        .json()
        .await
        .map_err(|e| SagaError::RemoteUnavailable(format!("{what}: invalid response body: {e}")))
}

fn join(base_url: &str, path: &str) -> String {
    format!("{}{}", base_url.trim_end_matches('/'), path)
}

/// Profile service over HTTP.
#[derive(Debug, Clone)]
pub struct HttpProfileClient {
    client: Client,
    base_url: String,
}

impl HttpProfileClient {
    pub fn new(base_url: impl Into<String>, config: &HttpClientConfig) -> Result<Self, SagaError> {
        Ok(Self::with_client(config.build_client()?, base_url))
    }

    pub fn with_client(client: Client, base_url: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into(),
        }
    }
}

#[async_trait]
impl ProfileService for HttpProfileClient {
    #[tracing::instrument(skip(self, profile), fields(account_id = %profile.id))]
    async fn create(&self, profile: NewProfile) -> Result<Profile, SagaError> {
        let what = "create profile";
        let response = self
            .client
            .post(join(&self.base_url, "/profiles"))
            .json(&profile)
            .send()
            .await
            .map_err(|e| transport_error(what, e))?;
        decode(what, check(what, response).await?).await
    }

    #[tracing::instrument(skip(self))]
    async fn delete(&self, id: &AccountId) -> Result<ProfileDeletion, SagaError> {
        let what = "delete profile";
        let response = self
            .client
            .delete(join(&self.base_url, &format!("/profiles/{id}")))
            .send()
            .await
            .map_err(|e| transport_error(what, e))?;
        decode(what, check(what, response).await?).await
    }
}

/// Card endpoints of the profile service over HTTP.
#[derive(Debug, Clone)]
pub struct HttpCardClient {
    client: Client,
    base_url: String,
}

impl HttpCardClient {
    pub fn new(base_url: impl Into<String>, config: &HttpClientConfig) -> Result<Self, SagaError> {
        Ok(Self::with_client(config.build_client()?, base_url))
    }

    pub fn with_client(client: Client, base_url: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into(),
        }
    }
}

#[async_trait]
impl CardService for HttpCardClient {
    #[tracing::instrument(skip(self, card))]
    async fn create(&self, account_id: &AccountId, card: NewCard) -> Result<Card, SagaError> {
        let what = "create card";
        let response = self
            .client
            .post(join(&self.base_url, &format!("/users/{account_id}/cards")))
            .json(&card)
            .send()
            .await
            .map_err(|e| transport_error(what, e))?;
        decode(what, check(what, response).await?).await
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct NewCredentials<'a> {
    account_id: &'a AccountId,
    login: &'a str,
    password: &'a str,
}

/// Identity service over HTTP.
#[derive(Debug, Clone)]
pub struct HttpIdentityClient {
    client: Client,
    base_url: String,
}

impl HttpIdentityClient {
    pub fn new(base_url: impl Into<String>, config: &HttpClientConfig) -> Result<Self, SagaError> {
        Ok(Self::with_client(config.build_client()?, base_url))
    }

    pub fn with_client(client: Client, base_url: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into(),
        }
    }
}

#[async_trait]
impl IdentityService for HttpIdentityClient {
    #[tracing::instrument(skip(self, password))]
    async fn create(
        &self,
        account_id: &AccountId,
        login: &str,
        password: &str,
    ) -> Result<(), SagaError> {
        let what = "create credentials";
        let response = self
            .client
            .post(join(&self.base_url, "/credentials"))
            .json(&NewCredentials {
                account_id,
                login,
                password,
            })
            .send()
            .await
            .map_err(|e| transport_error(what, e))?;
        check(what, response).await?;
        Ok(())
    }

    #[tracing::instrument(skip(self))]
    async fn delete(&self, account_id: &AccountId) -> Result<CredentialSnapshot, SagaError> {
        let what = "delete credentials";
        let response = self
            .client
            .delete(join(&self.base_url, &format!("/credentials/{account_id}")))
            .send()
            .await
            .map_err(|e| transport_error(what, e))?;
        decode(what, check(what, response).await?).await
    }

    #[tracing::instrument(skip(self, snapshot), fields(account_id = %snapshot.account_id))]
    async fn restore(&self, snapshot: CredentialSnapshot) -> Result<(), SagaError> {
        let what = "restore credentials";
        let response = self
            .client
            .put(join(
                &self.base_url,
                &format!("/credentials/{}", snapshot.account_id),
            ))
            .json(&snapshot)
            .send()
            .await
            .map_err(|e| transport_error(what, e))?;
        check(what, response).await?;
        Ok(())
    }
}

/// Order service over HTTP.
#[derive(Debug, Clone)]
pub struct HttpOrderClient {
    client: Client,
    base_url: String,
}

impl HttpOrderClient {
    pub fn new(base_url: impl Into<String>, config: &HttpClientConfig) -> Result<Self, SagaError> {
        Ok(Self::with_client(config.build_client()?, base_url))
    }

    pub fn with_client(client: Client, base_url: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into(),
        }
    }
}

#[async_trait]
impl OrderService for HttpOrderClient {
    #[tracing::instrument(skip(self))]
    async fn delete_all_for_user(&self, account_id: &AccountId) -> Result<(), SagaError> {
        let what = "delete orders";
        let response = self
            .client
            .delete(join(&self.base_url, &format!("/orders/users/{account_id}")))
            .send()
            .await
            .map_err(|e| transport_error(what, e))?;
        check(what, response).await?;
        Ok(())
    }
}

/// Authorization provider over HTTP.
///
/// Issues `GET {url}` with the order as query parameters; the response body is
/// the reference as plain text.
#[derive(Debug, Clone)]
pub struct HttpAuthorizationClient {
    client: Client,
    url: String,
}

impl HttpAuthorizationClient {
    pub fn new(url: impl Into<String>, config: &HttpClientConfig) -> Result<Self, SagaError> {
        Ok(Self::with_client(config.build_client()?, url))
    }

    pub fn with_client(client: Client, url: impl Into<String>) -> Self {
        Self {
            client,
            url: url.into(),
        }
    }
}

#[async_trait]
impl AuthorizationProvider for HttpAuthorizationClient {
    #[tracing::instrument(skip(self, request), fields(order_id = %request.order_id))]
    async fn request_reference(&self, request: &AuthorizationRequest) -> Result<u64, SagaError> {
        let what = "request authorization";
        let response = self
            .client
            .get(&self.url)
            .query(&[
                ("orderId", request.order_id.as_str()),
                ("userId", request.user_id.as_str()),
            ])
            .send()
            .await
            .map_err(|e| transport_error(what, e))?;
        let body = check(what, response)
            .await?
            .text()
            .await
            .map_err(|e| transport_error(what, e))?;
        body.trim().parse::<u64>().map_err(|e| {
            SagaError::RemoteUnavailable(format!("{what}: invalid reference {body:?}: {e}"))
        })
    }
}
