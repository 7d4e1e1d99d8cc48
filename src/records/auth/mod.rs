use serde::Deserialize;

use crate::collaborators::Session;

pub mod auth_refresh;
pub mod auth_with_password;
pub mod create_account;
pub mod request_verification;

/// Stores authentication details for a signed-in account.
///
/// The `AuthStore` struct holds the authenticated account's record and a
/// token used for making authenticated requests to the backend.
#[derive(Clone, Debug, Deserialize)]
pub struct AuthStore {
    /// The authenticated account's record.
    pub record: AuthStoreRecord,
    /// The authentication token.
    pub token: String,
}

/// Represents the details of an authenticated account's record.
#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthStoreRecord {
    /// The account's unique ID.
    pub id: String,
    /// The ID of the collection the account belongs to.
    #[serde(default)]
    pub collection_id: String,
    /// The name of the collection the account belongs to.
    #[serde(default)]
    pub collection_name: String,
    /// The account's email address.
    #[serde(default)]
    pub email: String,
    /// Indicates whether the account's email has been verified.
    #[serde(default)]
    pub verified: bool,
}

impl From<&AuthStoreRecord> for Session {
    fn from(record: &AuthStoreRecord) -> Self {
        Self {
            uid: record.id.clone(),
            email: record.email.clone(),
            email_verified: record.verified,
        }
    }
}
