//! Profile and payment card records owned by the profile and card services.

use chrono::{DateTime, NaiveDate, Utc};
use common::AccountId;
use serde::{Deserialize, Serialize};

/// Payload for creating a profile under a caller-chosen account id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewProfile {
    pub id: AccountId,
    pub name: String,
    pub surname: String,
    pub birth_date: Option<NaiveDate>,
    pub email: String,
}

/// A profile as stored by the profile service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Profile {
    pub id: AccountId,
    pub name: String,
    pub surname: String,
    pub birth_date: Option<NaiveDate>,
    pub email: String,
    pub created_at: DateTime<Utc>,
}

impl Profile {
    /// Builds the creation payload that recreates this profile under the same id.
    pub fn to_new_profile(&self) -> NewProfile {
        NewProfile {
            id: self.id.clone(),
            name: self.name.clone(),
            surname: self.surname.clone(),
            birth_date: self.birth_date,
            email: self.email.clone(),
        }
    }
}

impl NewProfile {
    /// Materializes the stored profile, stamping the creation time.
    pub fn into_profile(self, created_at: DateTime<Utc>) -> Profile {
        Profile {
            id: self.id,
            name: self.name,
            surname: self.surname,
            birth_date: self.birth_date,
            email: self.email,
            created_at,
        }
    }
}

/// Payload for attaching a payment card to an account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewCard {
    /// Masked card number, e.g. `**** **** **** 4242`.
    pub number: String,
    pub holder_name: String,
    /// Expiry as `MM/YY`.
    pub expiry: String,
}

/// A payment card as stored by the card service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Card {
    pub id: String,
    pub account_id: AccountId,
    pub number: String,
    pub holder_name: String,
    pub expiry: String,
}

impl Card {
    /// Builds the creation payload that recreates this card.
    ///
    /// The card service assigns a new card id on creation.
    pub fn to_new_card(&self) -> NewCard {
        NewCard {
            number: self.number.clone(),
            holder_name: self.holder_name.clone(),
            expiry: self.expiry.clone(),
        }
    }
}
