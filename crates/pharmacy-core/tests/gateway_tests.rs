//! Integration tests for the session-aware gateway against a mock backend

use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use pharmacy_core::auth::MemoryTokenStorage;
use pharmacy_core::models::{Role, User, UserProfileUpdate};
use pharmacy_core::{
    ApiClient, ApiError, Gateway, IdentityOutcome, RecordingNavigator, Session, SessionStore,
    TokenStorage, LOGIN_ROUTE,
};
use serde_json::{json, Value};
use wiremock::matchers::{body_json, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

struct Harness {
    server: MockServer,
    gateway: Gateway,
    session: Arc<SessionStore>,
    storage: Arc<MemoryTokenStorage>,
    navigator: Arc<RecordingNavigator>,
}

async fn harness_with(storage: MemoryTokenStorage) -> Harness {
    let server = MockServer::start().await;
    let storage = Arc::new(storage);
    let api = ApiClient::new(server.uri()).unwrap();
    let session = SessionStore::new(storage.clone(), Arc::new(api.clone()));
    let navigator = Arc::new(RecordingNavigator::new());
    let gateway = Gateway::new(api, session.clone(), navigator.clone());
    Harness {
        server,
        gateway,
        session,
        storage,
        navigator,
    }
}

async fn harness() -> Harness {
    harness_with(MemoryTokenStorage::new()).await
}

fn profile_json(id: i64, email: &str) -> Value {
    json!({
        "id": id,
        "email": email,
        "address": null,
        "phoneNumber": "555-0100",
        "paymentMethod": null,
        "role": "USER",
        "registeredAt": "2024-01-01T09:00:00",
        "updatedAt": "2024-03-01T09:00:00"
    })
}

fn user(id: i64, email: &str) -> User {
    User {
        id,
        email: email.to_string(),
        role: Role::User,
    }
}

async fn mount_profile(server: &MockServer, token: &str, body: Value) {
    Mock::given(method("GET"))
        .and(path("/profile"))
        .and(header("authorization", format!("Bearer {}", token).as_str()))
        .respond_with(ResponseTemplate::new(200).set_body_json(body))
        .mount(server)
        .await;
}

#[tokio::test]
async fn test_credential_login_populates_session() {
    let h = harness().await;

    Mock::given(method("POST"))
        .and(path("/auth/login"))
        .and(body_json(json!({"email": "a@b.com", "password": "hunter22"})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": 1,
            "email": "a@b.com",
            "token": "abc123",
            "role": "USER",
            "issuedAt": "2024-01-01T00:00:00",
            "expiresAt": "2099-01-01T00:00:00"
        })))
        .mount(&h.server)
        .await;
    mount_profile(&h.server, "abc123", profile_json(1, "a@b.com")).await;

    let logged_in = h.gateway.login("a@b.com", "hunter22").await.unwrap();
    assert_eq!(logged_in.response.token, "abc123");
    assert_eq!(h.storage.load().unwrap().as_deref(), Some("abc123"));

    assert_eq!(
        logged_in.identity.settled().await,
        IdentityOutcome::Populated(user(1, "a@b.com"))
    );
    assert_eq!(
        h.session.session(),
        Session {
            token: Some("abc123".to_string()),
            user: Some(user(1, "a@b.com")),
        }
    );
    assert_eq!(h.navigator.count(), 0);
}

#[tokio::test]
async fn test_rejected_credentials_do_not_redirect() {
    let h = harness().await;

    Mock::given(method("POST"))
        .and(path("/auth/login"))
        .respond_with(ResponseTemplate::new(401))
        .mount(&h.server)
        .await;

    let result = h.gateway.login("a@b.com", "wrong").await;
    assert!(matches!(result, Err(ApiError::InvalidCredentials)));
    assert_eq!(h.session.session(), Session::default());
    assert_eq!(h.navigator.count(), 0);
}

#[tokio::test]
async fn test_rejected_relogin_clears_existing_session() {
    let h = harness_with(MemoryTokenStorage::with_token("old")).await;
    mount_profile(&h.server, "old", profile_json(1, "a@b.com")).await;
    h.session.rehydrate().unwrap().expect("token in storage").settled().await;
    assert!(h.session.is_authenticated());

    Mock::given(method("POST"))
        .and(path("/auth/login"))
        .respond_with(ResponseTemplate::new(401))
        .mount(&h.server)
        .await;

    let result = h.gateway.login("a@b.com", "wrong").await;
    assert!(matches!(result, Err(ApiError::InvalidCredentials)));
    assert_eq!(h.storage.load().unwrap(), None);
    assert_eq!(h.session.session(), Session::default());
    // Already on the login route
    assert_eq!(h.navigator.count(), 0);
}

#[tokio::test]
async fn test_minimal_identity_record_populates_session() {
    let h = harness().await;
    mount_profile(
        &h.server,
        "abc123",
        json!({"id": 1, "email": "a@b.com", "role": "USER"}),
    )
    .await;

    let fetch = h.session.login("abc123").unwrap();
    assert_eq!(
        fetch.settled().await,
        IdentityOutcome::Populated(user(1, "a@b.com"))
    );
    assert_eq!(
        h.session.session(),
        Session {
            token: Some("abc123".to_string()),
            user: Some(user(1, "a@b.com")),
        }
    );
}

#[tokio::test]
async fn test_token_rejected_by_identity_endpoint_rolls_back() {
    let h = harness().await;

    Mock::given(method("GET"))
        .and(path("/profile"))
        .respond_with(ResponseTemplate::new(401))
        .mount(&h.server)
        .await;

    let fetch = h.session.login("bad-token").unwrap();
    assert_eq!(fetch.settled().await, IdentityOutcome::RolledBack);
    assert_eq!(h.session.session(), Session::default());
    assert_eq!(h.storage.load().unwrap(), None);
}

#[tokio::test]
async fn test_identity_network_failure_rolls_back() {
    // Discard port: nothing accepts connections there
    let api = ApiClient::with_timeout("http://127.0.0.1:9", Duration::from_secs(2)).unwrap();
    let storage = Arc::new(MemoryTokenStorage::new());
    let session = SessionStore::new(storage.clone(), Arc::new(api));

    let fetch = session.login("abc123").unwrap();
    assert_eq!(fetch.settled().await, IdentityOutcome::RolledBack);
    assert!(!session.is_authenticated());
    assert_eq!(storage.load().unwrap(), None);
}

#[tokio::test]
async fn test_empty_storage_starts_logged_out_without_fetch() {
    let h = harness().await;

    assert!(h.session.rehydrate().unwrap().is_none());
    assert!(h.session.token().is_none());
    assert!(h.server.received_requests().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_rehydrated_token_is_attached_to_requests() {
    let h = harness_with(MemoryTokenStorage::with_token("stored-token")).await;
    mount_profile(&h.server, "stored-token", profile_json(4, "back@b.com")).await;

    let fetch = h.session.rehydrate().unwrap().expect("token in storage");
    assert_eq!(h.session.token().as_deref(), Some("stored-token"));
    assert_eq!(
        fetch.settled().await,
        IdentityOutcome::Populated(user(4, "back@b.com"))
    );

    let profile = h.gateway.get_profile().await.unwrap();
    assert_eq!(profile.email, "back@b.com");
    assert_eq!(profile.phone_number.as_deref(), Some("555-0100"));

    // One identity fetch plus the explicit profile call
    assert_eq!(h.server.received_requests().await.unwrap().len(), 2);
}

#[tokio::test]
async fn test_public_requests_without_token_have_no_authorization() {
    let h = harness().await;

    Mock::given(method("GET"))
        .and(path("/public/drugs/search"))
        .and(query_param("query", "ibuprofen 200mg"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([{
            "id": 3,
            "name": "Ibuprofen",
            "type": "NSAID",
            "manufacturer": "Acme",
            "dosage": "200mg",
            "description": "Pain relief",
            "prescriptionRequired": false
        }])))
        .mount(&h.server)
        .await;

    let drugs = h.gateway.search_public_drugs("ibuprofen 200mg").await.unwrap();
    assert_eq!(drugs.len(), 1);
    assert_eq!(drugs[0].name, "Ibuprofen");

    let requests = h.server.received_requests().await.unwrap();
    assert_eq!(requests.len(), 1);
    assert!(!requests[0].headers.contains_key("authorization"));
}

#[tokio::test]
async fn test_unauthorized_response_ends_session_and_redirects() {
    let h = harness().await;
    mount_profile(&h.server, "abc123", profile_json(1, "a@b.com")).await;
    h.session.login("abc123").unwrap().settled().await;

    Mock::given(method("GET"))
        .and(path("/prescriptions"))
        .respond_with(ResponseTemplate::new(401))
        .mount(&h.server)
        .await;

    let result = h.gateway.list_prescriptions().await;
    assert!(matches!(result, Err(ApiError::SessionExpired)));
    assert_eq!(h.session.session(), Session::default());
    assert_eq!(h.storage.load().unwrap(), None);
    assert_eq!(h.navigator.routes(), vec![LOGIN_ROUTE.to_string()]);
}

#[tokio::test]
async fn test_concurrent_unauthorized_responses_redirect_once() {
    let h = harness().await;
    mount_profile(&h.server, "abc123", profile_json(1, "a@b.com")).await;
    h.session.login("abc123").unwrap().settled().await;

    Mock::given(method("GET"))
        .and(path("/drugs"))
        .respond_with(ResponseTemplate::new(401).set_delay(Duration::from_millis(50)))
        .mount(&h.server)
        .await;

    let results = join_all((0..3).map(|_| h.gateway.list_drugs())).await;
    assert_eq!(results.len(), 3);
    for result in results {
        assert!(matches!(result, Err(ApiError::SessionExpired)));
    }

    assert_eq!(h.storage.load().unwrap(), None);
    assert!(!h.session.is_authenticated());
    assert_eq!(h.navigator.count(), 1);
}

#[tokio::test]
async fn test_other_errors_pass_through() {
    let h = harness().await;
    mount_profile(&h.server, "abc123", profile_json(1, "a@b.com")).await;
    h.session.login("abc123").unwrap().settled().await;

    Mock::given(method("GET"))
        .and(path("/drugs/99"))
        .respond_with(ResponseTemplate::new(404).set_body_json(json!({
            "status": 404,
            "message": "Drug 99 not found",
            "timestamp": "2024-01-01T00:00:00",
            "path": "/drugs/99"
        })))
        .mount(&h.server)
        .await;
    Mock::given(method("PUT"))
        .and(path("/profile"))
        .respond_with(ResponseTemplate::new(422).set_body_json(json!({
            "status": 422,
            "message": "Phone number is invalid"
        })))
        .mount(&h.server)
        .await;
    Mock::given(method("GET"))
        .and(path("/prescriptions"))
        .respond_with(ResponseTemplate::new(503).set_body_string("maintenance"))
        .mount(&h.server)
        .await;

    match h.gateway.get_drug(99).await {
        Err(ApiError::NotFound(msg)) => assert_eq!(msg, "Drug 99 not found"),
        other => panic!("unexpected result: {:?}", other.map(|d| d.id)),
    }
    match h.gateway.update_profile(&UserProfileUpdate::default()).await {
        Err(ApiError::Validation(msg)) => assert_eq!(msg, "Phone number is invalid"),
        other => panic!("unexpected result: {:?}", other.map(|p| p.id)),
    }
    assert!(matches!(
        h.gateway.list_prescriptions().await,
        Err(ApiError::ServerError(_))
    ));

    assert!(h.session.is_authenticated());
    assert_eq!(h.storage.load().unwrap().as_deref(), Some("abc123"));
    assert_eq!(h.navigator.count(), 0);
}

#[tokio::test]
async fn test_prescription_crud() {
    let h = harness().await;
    mount_profile(&h.server, "abc123", profile_json(1, "a@b.com")).await;
    h.session.login("abc123").unwrap().settled().await;

    let prescription = json!({
        "id": 12,
        "userId": 1,
        "drugName": "Amoxicillin",
        "dosage": "500mg",
        "frequency": "3x daily",
        "prescriptionRequired": true,
        "issuedAt": "2024-01-01T00:00:00",
        "expiresAt": "2099-01-01T00:00:00"
    });

    Mock::given(method("POST"))
        .and(path("/prescriptions"))
        .and(header("authorization", "Bearer abc123"))
        .respond_with(ResponseTemplate::new(201).set_body_json(&prescription))
        .mount(&h.server)
        .await;
    Mock::given(method("GET"))
        .and(path("/prescriptions/12"))
        .respond_with(ResponseTemplate::new(200).set_body_json(&prescription))
        .mount(&h.server)
        .await;
    Mock::given(method("DELETE"))
        .and(path("/prescriptions/12"))
        .respond_with(ResponseTemplate::new(204))
        .mount(&h.server)
        .await;

    let request: pharmacy_core::models::PrescriptionRequest = serde_json::from_value(json!({
        "drugId": 3,
        "dosage": "500mg",
        "frequency": "3x daily",
        "prescriptionRequired": true,
        "issuedAt": "2024-01-01T00:00:00",
        "expiresAt": "2099-01-01T00:00:00"
    }))
    .unwrap();

    let created = h.gateway.create_prescription(&request).await.unwrap();
    assert_eq!(created.id, 12);
    assert!(!created.is_expired());

    let fetched = h.gateway.get_prescription(12).await.unwrap();
    assert_eq!(fetched.drug_name, "Amoxicillin");

    h.gateway.delete_prescription(12).await.unwrap();
}

#[tokio::test]
async fn test_logout_makes_requests_anonymous() {
    let h = harness().await;
    mount_profile(&h.server, "abc123", profile_json(1, "a@b.com")).await;
    h.session.login("abc123").unwrap().settled().await;

    Mock::given(method("GET"))
        .and(path("/public/drugs"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .mount(&h.server)
        .await;

    h.gateway.logout().unwrap();
    h.gateway.logout().unwrap();
    assert!(h.gateway.list_public_drugs().await.unwrap().is_empty());

    let requests = h.server.received_requests().await.unwrap();
    let last = requests.last().expect("public drugs request");
    assert_eq!(last.url.path(), "/public/drugs");
    assert!(!last.headers.contains_key("authorization"));
    assert_eq!(h.navigator.count(), 0);
}

#[tokio::test]
async fn test_change_password() {
    let h = harness().await;
    mount_profile(&h.server, "abc123", profile_json(1, "a@b.com")).await;
    h.session.login("abc123").unwrap().settled().await;

    Mock::given(method("POST"))
        .and(path("/profile/password"))
        .and(body_json(json!({"oldPassword": "old-pass", "newPassword": "new-pass"})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "message": "Password updated",
            "updatedAt": "2024-06-01T12:00:00"
        })))
        .mount(&h.server)
        .await;

    let changed = h.gateway.change_password("old-pass", "new-pass").await.unwrap();
    assert_eq!(changed.message, "Password updated");
}
