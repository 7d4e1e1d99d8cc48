mod common;

use std::collections::BTreeSet;
use std::time::Duration;

use booknook::fake::FakeBackend;
use booknook::{Loadable, Notice, Route, Upload};
use chrono::{TimeZone, Utc};
use serde_json::{json, Value};

use common::{approved_member, SETTLE};

fn fields(value: Value) -> booknook::Fields {
    match value {
        Value::Object(fields) => fields,
        _ => panic!("fixture must be an object"),
    }
}

fn book(title: &str, available: bool) -> booknook::Fields {
    fields(json!({
        "title": title,
        "author": "Frank Herbert",
        "isbn": "9780441013593",
        "available": available,
        "imageUrl": "https://covers.example.com/dune.jpg",
        "description": "Desert planet.",
    }))
}

#[tokio::test]
async fn history_shows_every_record_with_its_original_dates() {
    let fake = FakeBackend::new();
    let (app, uid) = approved_member(&fake, "ana@example.com").await;
    let history = app.shell().unwrap().history();

    let mut expected = BTreeSet::new();
    for day in 1..=5 {
        let borrowed_at = Utc.with_ymd_and_hms(2024, 3, day, 9, 30, 0).unwrap();
        history
            .record_borrow(&format!("Book {day}"), borrowed_at, 14)
            .await
            .unwrap();
        expected.insert((format!("Book {day}"), borrowed_at, borrowed_at + chrono::Duration::days(14)));
    }

    let Loadable::Ready(records) = tokio::time::timeout(SETTLE, history.wait_for_records(5)).await.unwrap() else {
        panic!("history failed to load");
    };

    assert_eq!(records.len(), 5);
    assert!(records.iter().all(|record| record.user_id == uid && !record.returned));
    let seen: BTreeSet<_> = records
        .into_iter()
        .map(|record| (record.book_title, record.borrow_date, record.return_date))
        .collect();
    assert_eq!(seen, expected);
}

#[tokio::test]
async fn history_only_lists_the_members_own_records() {
    let fake = FakeBackend::new();
    fake.insert(
        "borrowHistory",
        "someone-else",
        fields(json!({
            "userId": "other",
            "bookTitle": "Dune",
            "borrowDate": "2024-01-01T00:00:00.000Z",
            "returnDate": "2024-01-08T00:00:00.000Z",
            "returned": true,
        })),
    );
    let (app, _) = approved_member(&fake, "ana@example.com").await;
    let history = app.shell().unwrap().history();

    history.add_sample_record().await.unwrap();

    let Loadable::Ready(records) = tokio::time::timeout(SETTLE, history.wait_for_records(1)).await.unwrap() else {
        panic!("history failed to load");
    };
    assert_eq!(records.len(), 1);
    let sample = &records[0];
    assert_eq!(sample.book_title, "Atomic Habits");
    assert_eq!(sample.return_date - sample.borrow_date, chrono::Duration::days(7));
    assert_eq!(sample.status_label(), "Not Returned");
}

#[tokio::test]
async fn impossible_loan_periods_become_a_notice() {
    let fake = FakeBackend::new();
    let (app, _) = approved_member(&fake, "ana@example.com").await;
    let history = app.shell().unwrap().history();

    let notice = history
        .record_borrow("Dune", Utc::now(), 1_000_000_000)
        .await
        .unwrap_err();

    assert_eq!(notice.title, "Error");
    assert!(notice.message.starts_with("Failed to record the loan"));
    assert!(fake.documents("borrowHistory").is_empty());
}

#[tokio::test]
async fn catalog_lists_books_live_and_greets_the_member() {
    let fake = FakeBackend::new();
    fake.insert("books", "dune", book("Dune", true));
    let (app, _) = approved_member(&fake, "ana@example.com").await;
    let catalog = app.shell().unwrap().catalog();

    let state = tokio::time::timeout(SETTLE, catalog.loaded()).await.unwrap();
    assert_eq!(state.greeting(), "Welcome Back, ana");
    assert_eq!(state.books.ready().map(Vec::len), Some(1));

    fake.insert("books", "messiah", book("Dune Messiah", false));
    let mut updates = catalog.watch();
    tokio::time::timeout(
        SETTLE,
        updates.wait_for(|state| state.books.ready().is_some_and(|books| books.len() == 2)),
    )
    .await
    .unwrap()
    .unwrap();

    let messiah = catalog.book("messiah").expect("book is loaded");
    assert_eq!(messiah.title, "Dune Messiah");
    assert!(!messiah.available);
    assert!(catalog.book("missing").is_none());
}

#[tokio::test]
async fn catalog_greets_members_without_a_name_generically() {
    let fake = FakeBackend::new();
    let (app, uid) = approved_member(&fake, "ana@example.com").await;
    fake.set_field("users", &uid, "username", json!(""));

    let state = tokio::time::timeout(SETTLE, app.shell().unwrap().catalog().loaded())
        .await
        .unwrap();

    assert_eq!(state.greeting(), "Welcome Back, User");
    assert_eq!(state.books, Loadable::Ready(Vec::new()));
}

#[tokio::test]
async fn identifier_shows_the_barcode_or_nothing() {
    let fake = FakeBackend::new();
    let (app, uid) = approved_member(&fake, "ana@example.com").await;
    let shell = app.shell().unwrap();

    let barcode = tokio::time::timeout(SETTLE, shell.identifier().loaded()).await.unwrap();
    assert_eq!(barcode, format!("barcode-{uid}"));

    fake.fail_next_reads(1);
    let barcode = tokio::time::timeout(SETTLE, shell.identifier().loaded()).await.unwrap();
    assert_eq!(barcode, "");
}

#[tokio::test]
async fn profile_picture_upload_is_recorded_on_the_account() {
    let fake = FakeBackend::new();
    let (app, uid) = approved_member(&fake, "ana@example.com").await;
    let profile = app.shell().unwrap().profile();

    let Loadable::Ready(loaded) = tokio::time::timeout(SETTLE, profile.loaded()).await.unwrap() else {
        panic!("profile failed to load");
    };
    assert_eq!(loaded.email, "ana@example.com");
    assert_eq!(loaded.username, "ana");
    assert_eq!(loaded.profile_picture, None);

    let url = profile
        .upload_profile_picture(Upload::jpeg(vec![0xFF, 0xD8, 0xFF, 0xE0]))
        .await
        .unwrap();

    let path = format!("profilePictures/{uid}");
    assert!(url.ends_with(&path));
    assert_eq!(fake.blob(&path).map(|blob| blob.content_type), Some("image/jpeg".to_owned()));

    let account = fake.documents("users").remove(0);
    assert_eq!(account.get("profilePicture"), Some(&json!(url)));
    assert_eq!(account.get("isAdminApproved"), Some(&json!(true)));
    assert_eq!(
        profile.state().ready().and_then(|state| state.profile_picture.clone()),
        Some(url)
    );
}

#[tokio::test]
async fn suggestions_are_stored_for_the_member() {
    let fake = FakeBackend::new();
    let (app, uid) = approved_member(&fake, "ana@example.com").await;
    let profile = app.shell().unwrap().profile();

    let notice = profile.send_suggestion("  More sci-fi, please  ").await.unwrap();
    assert_eq!(notice, Notice::suggestion_sent());

    let suggestions = fake.documents("suggestions");
    assert_eq!(suggestions.len(), 1);
    assert_eq!(suggestions[0].get("userId"), Some(&json!(uid)));
    assert_eq!(suggestions[0].get("suggestion"), Some(&json!("More sci-fi, please")));
    assert!(suggestions[0].get("createdAt").is_some());

    assert!(profile.send_suggestion("   ").await.is_err());
    assert_eq!(fake.documents("suggestions").len(), 1);
}

#[tokio::test]
async fn profile_sign_out_returns_to_login() {
    let fake = FakeBackend::new();
    let (app, _) = approved_member(&fake, "ana@example.com").await;
    let profile = app.shell().unwrap().profile();

    profile.sign_out().await.unwrap();

    assert_eq!(app.route(), Route::Unauthenticated);
    assert!(fake.current_session().is_none());
}

#[tokio::test]
async fn closing_a_view_stops_its_updates() {
    let fake = FakeBackend::new();
    let (app, _) = approved_member(&fake, "ana@example.com").await;
    let catalog = app.shell().unwrap().catalog();
    let updates = catalog.watch();
    tokio::time::timeout(SETTLE, catalog.loaded()).await.unwrap();

    drop(catalog);
    fake.insert("books", "dune", book("Dune", true));
    tokio::time::sleep(Duration::from_millis(50)).await;

    assert!(updates.has_changed().is_err());
}
