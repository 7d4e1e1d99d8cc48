use serde::Serialize;

use crate::error::WriteError;
use crate::Collection;

#[derive(Clone, Serialize)]
#[serde(rename_all = "camelCase")]
struct NewAccount<'a> {
    email: &'a str,
    password: &'a str,
    password_confirm: &'a str,
}

impl Collection<'_> {
    /// Registers a new account in an auth collection and returns its id.
    ///
    /// The backend does not sign the new account in; follow up with
    /// [`Collection::auth_with_password`].
    pub async fn create_account(&self, email: &str, password: &str) -> Result<String, WriteError> {
        let account = NewAccount {
            email,
            password,
            password_confirm: password,
        };

        let created = self.create(&account).await?;

        Ok(created.id)
    }
}
