mod common;

use std::time::Duration;

use booknook::fake::FakeBackend;
use booknook::{Approval, AuthProvider, Notice, Route, SessionState};
use serde_json::json;

use common::{approved_member, form, registered, start, uid_of, wait_route, PASSWORD};

#[tokio::test]
async fn sign_up_stores_an_unapproved_account_and_signs_out() {
    let fake = FakeBackend::new();
    let app = start(&fake);

    let notice = app.sign_up(form("ana@example.com")).await.unwrap();

    assert_eq!(notice, Notice::sign_up_complete());
    assert_eq!(app.route(), Route::Unauthenticated);
    assert!(fake.current_session().is_none());
    assert_eq!(fake.verification_requests(), ["ana@example.com"]);

    let uid = uid_of(&fake, "ana@example.com");
    let account = fake.documents("users").remove(0);
    assert_eq!(account.get("isAdminApproved"), Some(&json!(false)));
    assert_eq!(account.get("barcode"), Some(&json!(format!("barcode-{uid}"))));
    assert_eq!(account.get("username"), Some(&json!("ana")));
    assert_eq!(account.get("documentUrl"), Some(&json!("")));
}

#[tokio::test]
async fn sign_up_uploads_the_identity_document() {
    let fake = FakeBackend::new();
    let app = start(&fake);

    let mut form = form("ana@example.com");
    form.identity_document = Some(booknook::Upload::jpeg(vec![0xFF, 0xD8, 0xFF]));
    app.sign_up(form).await.unwrap();

    let uid = uid_of(&fake, "ana@example.com");
    let path = format!("self_documents/{uid}");
    assert!(fake.blob(&path).is_some());

    let account = fake.documents("users").remove(0);
    let url = account.get("documentUrl").and_then(|url| url.as_str()).unwrap();
    assert!(url.ends_with(&path));
}

#[tokio::test]
async fn sign_up_failures_use_credential_wording() {
    let fake = FakeBackend::new();
    let app = start(&fake);

    let mut short = form("ana@example.com");
    short.password = "12345".to_owned();
    let notice = app.sign_up(short).await.unwrap_err();
    assert_eq!(notice.message, "Password should be at least 6 characters.");

    app.sign_up(form("ana@example.com")).await.unwrap();
    let notice = app.sign_up(form("ana@example.com")).await.unwrap_err();
    assert_eq!(notice.message, "Email already in use.");

    let notice = app.sign_up(form("not-an-email")).await.unwrap_err();
    assert_eq!(notice.message, "Invalid email address.");
}

#[tokio::test]
async fn unverified_sign_in_is_rejected_without_state_change() {
    let fake = FakeBackend::new();
    let app = start(&fake);
    app.sign_up(form("ana@example.com")).await.unwrap();
    let before = app.state();

    let notice = app.sign_in("ana@example.com", PASSWORD).await.unwrap_err();

    assert_eq!(notice, Notice::verification_required());
    assert!(fake.current_session().is_none());
    assert_eq!(fake.verification_requests().len(), 2);

    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(app.state(), before);
    assert_eq!(app.route(), Route::Unauthenticated);
}

#[tokio::test]
async fn wrong_password_is_reported() {
    let fake = FakeBackend::new();
    let app = start(&fake);
    registered(&fake, &app, "ana@example.com").await;

    let notice = app.sign_in("ana@example.com", "wrong-password").await.unwrap_err();

    assert_eq!(notice.title, "Error");
    assert!(notice.message.starts_with("Sign in failed"));
    assert_eq!(app.route(), Route::Unauthenticated);
}

#[tokio::test]
async fn unapproved_member_waits_on_pending() {
    let fake = FakeBackend::new();
    let app = start(&fake);
    registered(&fake, &app, "ana@example.com").await;

    app.sign_in("ana@example.com", PASSWORD).await.unwrap();
    wait_route(&app, Route::Pending).await;

    let mut states = app.watch();
    tokio::time::timeout(
        common::SETTLE,
        states.wait_for(|state| state.approval == Approval::Denied),
    )
    .await
    .expect("account lookup resolves")
    .unwrap();

    assert_eq!(app.route(), Route::Pending);
    assert!(app.shell().is_none());
}

#[tokio::test]
async fn missing_account_document_is_never_approval() {
    let fake = FakeBackend::new();
    let app = start(&fake);
    let uid = registered(&fake, &app, "ana@example.com").await;
    fake.remove("users", &uid);

    app.sign_in("ana@example.com", PASSWORD).await.unwrap();
    tokio::time::sleep(Duration::from_millis(100)).await;

    assert_eq!(app.state().approval, Approval::Unresolved);
    assert_eq!(app.route(), Route::Pending);
    assert!(app.shell().is_none());
}

#[tokio::test]
async fn approval_must_be_exactly_true() {
    let fake = FakeBackend::new();
    let app = start(&fake);
    let uid = registered(&fake, &app, "ana@example.com").await;
    fake.set_field("users", &uid, "isAdminApproved", json!("true"));

    app.sign_in("ana@example.com", PASSWORD).await.unwrap();
    tokio::time::sleep(Duration::from_millis(100)).await;

    assert_eq!(app.state().approval, Approval::Denied);
    assert_eq!(app.route(), Route::Pending);
}

#[tokio::test]
async fn approved_member_reaches_the_shell() {
    let fake = FakeBackend::new();
    let (app, uid) = approved_member(&fake, "ana@example.com").await;

    let shell = app.shell().expect("shell is available once approved");
    assert_eq!(shell.uid(), uid);
    assert_eq!(app.state().approval, Approval::Granted);
}

#[tokio::test]
async fn approval_flipped_while_signed_in_reaches_the_gate() {
    let fake = FakeBackend::new();
    let app = start(&fake);
    let uid = registered(&fake, &app, "ana@example.com").await;

    app.sign_in("ana@example.com", PASSWORD).await.unwrap();
    wait_route(&app, Route::Pending).await;

    fake.approve(&uid, true);
    wait_route(&app, Route::Approved).await;

    fake.approve(&uid, false);
    let state = wait_route(&app, Route::Pending).await;
    assert_eq!(state.approval, Approval::Denied);
}

#[tokio::test]
async fn sign_out_clears_session_and_approval() {
    let fake = FakeBackend::new();
    let (app, _) = approved_member(&fake, "ana@example.com").await;

    app.sign_out().await.unwrap();

    assert_eq!(app.state(), SessionState::default());
    assert_eq!(app.route(), Route::Unauthenticated);
    assert!(app.shell().is_none());
}

#[tokio::test]
async fn failed_lookups_stay_pending_and_are_retried() {
    let fake = FakeBackend::new();
    let app = start(&fake);
    let uid = registered(&fake, &app, "ana@example.com").await;
    fake.approve(&uid, true);
    fake.fail_next_reads(3);

    app.sign_in("ana@example.com", PASSWORD).await.unwrap();
    assert_eq!(app.route(), Route::Pending);

    wait_route(&app, Route::Approved).await;
}

#[tokio::test]
async fn previous_account_approval_is_not_carried_over() {
    let fake = FakeBackend::new();
    let app = start(&fake);
    let approved = registered(&fake, &app, "ana@example.com").await;
    registered(&fake, &app, "ben@example.com").await;
    fake.approve(&approved, true);

    // The first lookup is still in flight when the account changes.
    fake.delay_reads(Some(Duration::from_millis(100)));
    app.sign_in("ana@example.com", PASSWORD).await.unwrap();
    app.sign_out().await.unwrap();
    app.sign_in("ben@example.com", PASSWORD).await.unwrap();

    tokio::time::sleep(Duration::from_millis(300)).await;

    let state = app.state();
    assert_eq!(state.session.map(|session| session.email), Some("ben@example.com".to_owned()));
    assert_eq!(state.approval, Approval::Denied);
    assert_eq!(app.route(), Route::Pending);
}

#[tokio::test]
async fn signing_out_from_pending_returns_to_login() {
    let fake = FakeBackend::new();
    let app = start(&fake);
    registered(&fake, &app, "ana@example.com").await;
    app.sign_in("ana@example.com", PASSWORD).await.unwrap();
    wait_route(&app, Route::Pending).await;

    app.sign_out().await.unwrap();

    assert_eq!(app.route(), Route::Unauthenticated);
}

#[tokio::test]
async fn sign_in_resolves_when_a_sign_out_overtakes_it() {
    let fake = FakeBackend::new();
    let app = start(&fake);
    registered(&fake, &app, "ana@example.com").await;

    let (outcome, signed_out) = tokio::join!(
        tokio::time::timeout(common::SETTLE, app.sign_in("ana@example.com", PASSWORD)),
        fake.sign_out(),
    );

    assert_eq!(outcome.expect("sign-in resolves"), Ok(()));
    signed_out.unwrap();
    wait_route(&app, Route::Unauthenticated).await;
}
