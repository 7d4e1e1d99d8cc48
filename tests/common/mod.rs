#![allow(dead_code)]

use std::time::Duration;

use booknook::fake::FakeBackend;
use booknook::{App, AppConfig, Collaborators, Route, SessionState, SignUpForm};

pub const PASSWORD: &str = "secret123";

/// Bound for anything that should settle "soon".
pub const SETTLE: Duration = Duration::from_secs(3);

pub fn config() -> AppConfig {
    AppConfig::from_lookup(|key| match key {
        "BOOKNOOK_BACKEND_URL" => Some("http://127.0.0.1:8090".to_owned()),
        "BOOKNOOK_LOOKUP_RETRY_INITIAL_MS" => Some("10".to_owned()),
        "BOOKNOOK_LOOKUP_RETRY_MAX_MS" => Some("40".to_owned()),
        _ => None,
    })
    .expect("test configuration is valid")
}

pub fn start(fake: &FakeBackend) -> App {
    booknook::telemetry::init();
    App::start(Collaborators::from_fake(fake), &config())
}

pub fn form(email: &str) -> SignUpForm {
    SignUpForm {
        email: email.to_owned(),
        password: PASSWORD.to_owned(),
        username: email.split('@').next().unwrap_or_default().to_owned(),
        phone_number: "+62 812 0000 0000".to_owned(),
        identity_document: None,
    }
}

/// Account id the fake assigned to `email`.
pub fn uid_of(fake: &FakeBackend, email: &str) -> String {
    fake.documents("users")
        .into_iter()
        .find(|document| document.get("email").and_then(|value| value.as_str()) == Some(email))
        .map(|document| document.id)
        .expect("account document exists")
}

/// Signs up through the app and verifies the email, leaving nobody signed in.
pub async fn registered(fake: &FakeBackend, app: &App, email: &str) -> String {
    app.sign_up(form(email)).await.expect("sign-up succeeds");
    fake.verify_email(email);
    uid_of(fake, email)
}

pub async fn wait_route(app: &App, route: Route) -> SessionState {
    tokio::time::timeout(SETTLE, app.wait_for_route(route))
        .await
        .unwrap_or_else(|_| panic!("route never became {route:?}, state: {:?}", app.state()))
}

/// A verified, approved member, signed in with the shell open.
pub async fn approved_member(fake: &FakeBackend, email: &str) -> (App, String) {
    let app = start(fake);
    let uid = registered(fake, &app, email).await;
    fake.approve(&uid, true);
    app.sign_in(email, PASSWORD).await.expect("sign-in succeeds");
    wait_route(&app, Route::Approved).await;
    (app, uid)
}
