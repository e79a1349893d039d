mod common;

use std::sync::Arc;

use common::{MemoryDb, RecordingSender};
use estate_moderation::auth::{Argon2Hasher, AuthService, JwtSigner};
use estate_moderation::models::{RegisterRequest, Role};
use estate_moderation::store::Deadline;
use estate_moderation::Error;

const SECRET: &str = "integration-secret";

struct Harness {
    db: MemoryDb,
    sender: Arc<RecordingSender>,
    auth: AuthService,
}

fn harness() -> Harness {
    let db = MemoryDb::new();
    let sender = Arc::new(RecordingSender::new());
    let auth = AuthService::new(
        Arc::new(db.clone()),
        sender.clone(),
        Arc::new(Argon2Hasher::new()),
        Arc::new(JwtSigner::new(SECRET, 1)),
        chrono::Duration::minutes(5),
    );
    Harness { db, sender, auth }
}

fn client_request() -> RegisterRequest {
    RegisterRequest {
        email: "u@test.local".into(),
        password: "correct horse".into(),
        user_type: "client".into(),
    }
}

fn delivered_code(sender: &RecordingSender) -> u32 {
    sender
        .last_payload_for("u@test.local")
        .and_then(|payload| payload.rsplit(' ').next().map(str::to_owned))
        .and_then(|code| code.parse().ok())
        .unwrap()
}

#[tokio::test]
async fn registered_client_logs_in_with_the_delivered_code() {
    let h = harness();
    let deadline = Deadline::none();
    let user_id = h.auth.register(&deadline, &client_request()).await.unwrap();

    let ack = h.auth.start(&deadline, user_id, "correct horse").await.unwrap();
    let code = delivered_code(&h.sender);
    assert!(!ack.message.contains(&code.to_string()));
    assert!(!h.db.state().codes[&user_id].code.contains(&code.to_string()));

    let token = h.auth.finish(&deadline, user_id, code).await.unwrap();
    assert!(!token.is_empty());
    let claims = JwtSigner::new(SECRET, 1).validate(&token).unwrap();
    assert_eq!(claims.sub, user_id);
    assert_eq!(claims.role, Role::Client);
}

#[tokio::test]
async fn wrong_code_is_rejected() {
    let h = harness();
    let deadline = Deadline::none();
    let user_id = h.auth.register(&deadline, &client_request()).await.unwrap();
    h.auth.start(&deadline, user_id, "correct horse").await.unwrap();

    let code = delivered_code(&h.sender);
    let wrong = if code == 999_999 { 100_000 } else { code + 1 };
    let res = h.auth.finish(&deadline, user_id, wrong).await;
    assert!(matches!(res, Err(Error::BadCode(id)) if id == user_id));
}

#[tokio::test]
async fn wrong_password_never_issues_a_code() {
    let h = harness();
    let deadline = Deadline::none();
    let user_id = h.auth.register(&deadline, &client_request()).await.unwrap();

    let res = h.auth.start(&deadline, user_id, "battery staple").await;
    assert!(matches!(res, Err(Error::BadCredentials(_))));
    assert!(h.sender.sent().is_empty());
    assert!(h.db.state().codes.is_empty());
}

#[tokio::test]
async fn codes_are_single_use() {
    let h = harness();
    let deadline = Deadline::none();
    let user_id = h.auth.register(&deadline, &client_request()).await.unwrap();
    h.auth.start(&deadline, user_id, "correct horse").await.unwrap();
    let code = delivered_code(&h.sender);

    h.auth.finish(&deadline, user_id, code).await.unwrap();
    let replay = h.auth.finish(&deadline, user_id, code).await;
    assert!(matches!(replay, Err(Error::CodeExpired(_))));
}

#[tokio::test]
async fn a_new_login_replaces_the_previous_code() {
    let h = harness();
    let deadline = Deadline::none();
    let user_id = h.auth.register(&deadline, &client_request()).await.unwrap();

    h.auth.start(&deadline, user_id, "correct horse").await.unwrap();
    let first = delivered_code(&h.sender);
    h.auth.start(&deadline, user_id, "correct horse").await.unwrap();
    let second = delivered_code(&h.sender);

    if first != second {
        let res = h.auth.finish(&deadline, user_id, first).await;
        assert!(matches!(res, Err(Error::BadCode(_))));
    }
    h.auth.finish(&deadline, user_id, second).await.unwrap();
}

#[tokio::test]
async fn stale_codes_expire() {
    let h = harness();
    let deadline = Deadline::none();
    let user_id = h.auth.register(&deadline, &client_request()).await.unwrap();
    h.auth.start(&deadline, user_id, "correct horse").await.unwrap();
    let code = delivered_code(&h.sender);

    if let Some(stored) = h.db.state().codes.get_mut(&user_id) {
        stored.issued_at -= chrono::Duration::minutes(10);
    }
    let res = h.auth.finish(&deadline, user_id, code).await;
    assert!(matches!(res, Err(Error::CodeExpired(_))));
}

#[tokio::test]
async fn dummy_login_signs_the_requested_role() {
    let h = harness();
    let token = h.auth.dummy_login(&Deadline::none(), "moderator").await.unwrap();
    let claims = JwtSigner::new(SECRET, 1).validate(&token).unwrap();
    assert_eq!(claims.role, Role::Moderator);
    assert!(h.db.state().users.contains_key(&claims.sub));
}
