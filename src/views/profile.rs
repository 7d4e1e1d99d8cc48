//! Profile: who is signed in, their picture, suggestions and sign-out.

use chrono::Utc;
use serde_json::Value;
use tokio::sync::watch;
use tracing::{info, instrument, warn};

use super::{wait_for, Loadable, ViewContext};
use crate::app::sign_out_and_settle;
use crate::collaborators::{Fields, Upload};
use crate::models::{to_fields, Suggestion};
use crate::notice::Notice;
use crate::task::ViewScope;

/// What the profile shows.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ProfileState {
    /// Sign-in email.
    pub email: String,
    /// Display name, empty when unset.
    pub username: String,
    /// Picture URL, if one was uploaded.
    pub profile_picture: Option<String>,
}

/// The signed-in member's profile.
#[derive(Debug)]
pub struct ProfileView {
    context: ViewContext,
    state: watch::Sender<Loadable<ProfileState>>,
    _scope: ViewScope,
}

impl ProfileView {
    pub(crate) fn open(context: &ViewContext) -> Self {
        let (state, _) = watch::channel(Loadable::Loading);
        let scope = ViewScope::new();

        let profile_state = state.clone();
        let documents = context.documents.clone();
        let accounts = context.collections.accounts.clone();
        let uid = context.uid.clone();
        let email = context.email.clone();
        scope.spawn(async move {
            let loaded = match documents.get_one(&accounts, &uid).await {
                Ok(account) => {
                    let text = |field: &str| {
                        account
                            .as_ref()
                            .and_then(|account| account.get(field))
                            .and_then(Value::as_str)
                            .filter(|value| !value.is_empty())
                            .map(str::to_owned)
                    };
                    Loadable::Ready(ProfileState {
                        email,
                        username: text("username").unwrap_or_default(),
                        profile_picture: text("profilePicture"),
                    })
                }
                Err(error) => {
                    warn!(%uid, %error, "could not load the profile");
                    Loadable::Failed(Notice::from_backend("load your profile", &error))
                }
            };
            profile_state.send_replace(loaded);
        });

        Self {
            context: context.clone(),
            state,
            _scope: scope,
        }
    }

    /// Current state.
    #[must_use]
    pub fn state(&self) -> Loadable<ProfileState> {
        self.state.borrow().clone()
    }

    /// Waits until the profile is loaded or failed.
    pub async fn loaded(&self) -> Loadable<ProfileState> {
        wait_for(self.state.subscribe(), |state| !state.is_loading())
            .await
            .unwrap_or_else(|| self.state())
    }

    /// Uploads a new picture and records its URL on the account. Returns the URL.
    #[instrument(skip(self, picture), fields(uid = %self.context.uid, bytes = picture.bytes.len()))]
    pub async fn upload_profile_picture(&self, picture: Upload) -> Result<String, Notice> {
        let path = self.context.collections.profile_picture_path(&self.context.uid);
        let failed = |error: &crate::BackendError| {
            warn!(%path, %error, "profile picture upload failed");
            Notice::from_backend("upload the picture", error)
        };

        self.context
            .blobs
            .upload(&path, picture)
            .await
            .map_err(|error| failed(&error))?;
        let url = self
            .context
            .blobs
            .download_url(&path)
            .await
            .map_err(|error| failed(&error))?;

        let mut fields = Fields::new();
        fields.insert("profilePicture".to_owned(), Value::String(url.clone()));
        self.context
            .documents
            .merge(&self.context.collections.accounts, &self.context.uid, fields)
            .await
            .map_err(|error| failed(&error))?;

        info!("profile picture updated");
        self.state.send_modify(|state| {
            if let Loadable::Ready(profile) = state {
                profile.profile_picture = Some(url.clone());
            }
        });
        Ok(url)
    }

    /// Sends a suggestion to the library staff.
    #[instrument(skip(self, text), fields(uid = %self.context.uid))]
    pub async fn send_suggestion(&self, text: &str) -> Result<Notice, Notice> {
        let text = text.trim();
        if text.is_empty() {
            return Err(Notice::error("Please enter a suggestion."));
        }

        let suggestion = Suggestion {
            user_id: self.context.uid.clone(),
            suggestion: text.to_owned(),
            created_at: Utc::now(),
        };
        let fields = to_fields(&suggestion)
            .map_err(|error| Notice::from_backend("send the suggestion", &error))?;

        match self
            .context
            .documents
            .add(&self.context.collections.suggestions, fields)
            .await
        {
            Ok(key) => {
                info!(%key, "suggestion sent");
                Ok(Notice::suggestion_sent())
            }
            Err(error) => {
                warn!(%error, "could not send suggestion");
                Err(Notice::from_backend("send the suggestion", &error))
            }
        }
    }

    /// Signs out; resolves once the app is back at the login screen.
    pub async fn sign_out(&self) -> Result<(), Notice> {
        sign_out_and_settle(self.context.auth.as_ref(), &self.context.store).await
    }
}
