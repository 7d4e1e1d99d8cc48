//! Documents the client reads and writes, in their stored (camelCase) shape.

use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::collaborators::Fields;
use crate::error::BackendError;

/// Account profile stored under the account id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Account {
    /// Account id, duplicated into the document.
    #[serde(default)]
    pub uid: String,
    /// Sign-in email.
    #[serde(default)]
    pub email: String,
    /// Display name.
    #[serde(default)]
    pub username: String,
    /// Contact number.
    #[serde(default)]
    pub phone_number: String,
    /// URL of the identity document submitted at sign-up, empty when none.
    #[serde(default)]
    pub document_url: String,
    /// Set by an administrator once the account may use the library.
    #[serde(default)]
    pub is_admin_approved: bool,
    /// Payload of the member's QR identifier.
    #[serde(default)]
    pub barcode: String,
    /// Download URL of the profile picture.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub profile_picture: Option<String>,
}

impl Account {
    /// Fresh, unapproved account as written at sign-up.
    #[must_use]
    pub fn new(uid: &str, email: &str, username: &str, phone_number: &str, document_url: &str) -> Self {
        Self {
            uid: uid.to_owned(),
            email: email.to_owned(),
            username: username.to_owned(),
            phone_number: phone_number.to_owned(),
            document_url: document_url.to_owned(),
            is_admin_approved: false,
            barcode: barcode_for(uid),
            profile_picture: None,
        }
    }
}

/// Identifier encoded in a member's QR code.
#[must_use]
pub fn barcode_for(uid: &str) -> String {
    format!("barcode-{uid}")
}

/// Catalog entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Book {
    /// Document key.
    #[serde(default)]
    pub id: String,
    /// Title.
    #[serde(default)]
    pub title: String,
    /// Author.
    #[serde(default)]
    pub author: String,
    /// ISBN.
    #[serde(default)]
    pub isbn: String,
    /// Whether a copy can be borrowed right now.
    #[serde(default)]
    pub available: bool,
    /// Cover image URL.
    #[serde(default)]
    pub image_url: String,
    /// Free-text blurb.
    #[serde(default)]
    pub description: String,
}

/// One loan in a member's history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BorrowRecord {
    /// Document key, empty until stored.
    #[serde(default, skip_serializing)]
    pub id: String,
    /// Owning account.
    pub user_id: String,
    /// Title of the borrowed book, copied at borrow time.
    pub book_title: String,
    /// When the book was borrowed.
    #[serde(with = "timestamp")]
    pub borrow_date: DateTime<Utc>,
    /// When the book is due back.
    #[serde(with = "timestamp")]
    pub return_date: DateTime<Utc>,
    /// Whether the book has been returned.
    #[serde(default)]
    pub returned: bool,
}

/// Title of the sample loan developers add to exercise the history view.
pub const SAMPLE_BOOK_TITLE: &str = "Atomic Habits";

/// Loan period of the sample loan.
pub const SAMPLE_LOAN_DAYS: i64 = 7;

impl BorrowRecord {
    /// An open loan starting at `borrowed_at`, due `loan_days` later.
    ///
    /// # Errors
    ///
    /// Fails when the due date falls outside the representable range.
    pub fn open(
        user_id: &str,
        book_title: &str,
        borrowed_at: DateTime<Utc>,
        loan_days: i64,
    ) -> Result<Self, BackendError> {
        let return_date = TimeDelta::try_days(loan_days)
            .and_then(|period| borrowed_at.checked_add_signed(period))
            .ok_or_else(|| BackendError::Malformed(format!("loan period of {loan_days} days is out of range")))?;

        Ok(Self {
            id: String::new(),
            user_id: user_id.to_owned(),
            book_title: book_title.to_owned(),
            borrow_date: borrowed_at,
            return_date,
            returned: false,
        })
    }

    /// Status line shown next to the loan.
    #[must_use]
    pub const fn status_label(&self) -> &'static str {
        if self.returned {
            "Returned"
        } else {
            "Not Returned"
        }
    }
}

/// Free-text feedback sent from the profile screen.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Suggestion {
    /// Author account.
    pub user_id: String,
    /// Body.
    pub suggestion: String,
    /// When it was sent.
    #[serde(with = "timestamp")]
    pub created_at: DateTime<Utc>,
}

/// Serializes a model into the field map written to the document store.
pub fn to_fields<T: Serialize>(model: &T) -> Result<Fields, BackendError> {
    match serde_json::to_value(model)? {
        Value::Object(fields) => Ok(fields),
        other => Err(BackendError::Malformed(format!(
            "expected an object, got {other}"
        ))),
    }
}

/// Timestamps are written as RFC 3339 and read from RFC 3339 or the
/// backend's own `YYYY-MM-DD HH:MM:SS.sssZ` form.
pub mod timestamp {
    use chrono::{DateTime, NaiveDateTime, Utc};
    use serde::{de, Deserialize, Deserializer, Serializer};

    const BACKEND_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.fZ";

    /// Writes RFC 3339 with millisecond precision.
    pub fn serialize<S: Serializer>(value: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&value.to_rfc3339_opts(chrono::SecondsFormat::Millis, true))
    }

    /// Reads either accepted form.
    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<DateTime<Utc>, D::Error> {
        let raw = String::deserialize(deserializer)?;
        parse(&raw).ok_or_else(|| de::Error::custom(format!("unrecognised timestamp: {raw}")))
    }

    /// Parses either accepted form.
    #[must_use]
    pub fn parse(raw: &str) -> Option<DateTime<Utc>> {
        if let Ok(parsed) = DateTime::parse_from_rfc3339(raw) {
            return Some(parsed.with_timezone(&Utc));
        }

        NaiveDateTime::parse_from_str(raw, BACKEND_FORMAT)
            .ok()
            .map(|naive| naive.and_utc())
    }
}
