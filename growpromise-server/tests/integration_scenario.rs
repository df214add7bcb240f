use axum::http::StatusCode;
use chrono::{Duration, Utc};
use growpromise_server::{server, storage};
use reqwest::Client;
use serde_json::{Value, json};
use std::io::ErrorKind;
use std::net::SocketAddr;
use std::path::Path;

const LOGIN_PATH: &str = "/api/v1/auth/login";
const TENANT_ID: &str = "test-family";

struct TestServer {
    base: String,
    client: Client,
    handle: tokio::task::JoinHandle<()>,
    _tempdir: tempfile::TempDir,
}

impl TestServer {
    async fn spawn() -> Option<Self> {
        let dir = tempfile::tempdir().unwrap();
        let db_path = dir.path().join("test.db");
        let (addr, handle) = match start_server(&db_path).await {
            Ok(v) => v,
            Err(e) if e.kind() == ErrorKind::PermissionDenied => {
                eprintln!("Skipping test due to sandbox restrictions: {e}");
                return None;
            }
            Err(e) => panic!("failed to start server: {e}"),
        };
        Some(Self {
            base: format!("http://{}", addr),
            client: Client::new(),
            handle,
            _tempdir: dir,
        })
    }

    async fn login(&self, username: &str, password: &str) -> String {
        let body = self
            .request_expect(
                "POST",
                LOGIN_PATH,
                None,
                Some(json!({"username": username, "password": password})),
                StatusCode::OK,
            )
            .await;
        body.get("token")
            .and_then(|v| v.as_str())
            .map(|s| s.to_string())
            .expect("token missing from auth response")
    }

    async fn request(
        &self,
        method: &str,
        path: &str,
        token: Option<&str>,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        let url = format!("{}{}", self.base, path);
        let mut req = match method {
            "GET" => self.client.get(&url),
            "POST" => self.client.post(&url),
            other => panic!("unsupported method {other}"),
        };
        if let Some(t) = token {
            req = req.bearer_auth(t);
        }
        if let Some(b) = body {
            req = req.json(&b);
        }
        let resp = req.send().await.unwrap();
        let status = resp.status();
        let text = resp.text().await.unwrap();
        let val = if text.is_empty() {
            json!(null)
        } else {
            serde_json::from_str(&text).unwrap_or(json!({"raw": text}))
        };
        (status, val)
    }

    async fn request_expect(
        &self,
        method: &str,
        path: &str,
        token: Option<&str>,
        body: Option<Value>,
        expected: StatusCode,
    ) -> Value {
        let (status, value) = self.request(method, path, token, body).await;
        assert_eq!(
            status, expected,
            "{method} {path} returned {status:?} with body {value:?}",
        );
        value
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

async fn start_server(
    tmp_db: &Path,
) -> Result<(SocketAddr, tokio::task::JoinHandle<()>), std::io::Error> {
    let guardian_pwd = "secret123";
    let dependent_pwd = "kidpass";
    let guardian_hash = bcrypt::hash(guardian_pwd, bcrypt::DEFAULT_COST).unwrap();
    let dependent_hash = bcrypt::hash(dependent_pwd, bcrypt::DEFAULT_COST).unwrap();
    let config_yaml = format!(
        r#"
tenant_id: {TENANT_ID}
jwt_secret: testsecret
dependents:
  - id: alice
    display_name: Alice
  - id: bob
    display_name: Bob
plant_types:
  - id: sunflower
    name: Sunflower
    max_stage: 5
    experience_per_stage: 100
    image_ref: plants/sunflower.png
growth:
  watering_health_gain: 10
  approval_experience: 25
users:
  - username: mom
    password_hash: "{guardian_hash}"
    role: guardian
  - username: alice
    password_hash: "{dependent_hash}"
    role: dependent
    dependent_id: alice
"#
    );
    let config: server::AppConfig =
        serde_yaml::from_str(&config_yaml).expect("test config parses");

    let store = storage::Store::connect_sqlite(tmp_db.to_str().unwrap())
        .await
        .expect("db");
    store
        .seed_from_config(&config.dependents, &config.plant_types)
        .await
        .expect("seed");

    let state = server::AppState::new(config, store);
    let app = server::router(state);

    let listener = tokio::net::TcpListener::bind((std::net::Ipv4Addr::LOCALHOST, 0)).await?;
    let addr = listener.local_addr()?;
    let handle = tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    Ok((addr, handle))
}

fn tenant_path(suffix: &str) -> String {
    format!(
        "{}/{}",
        growpromise_shared::api::tenant_scope(TENANT_ID),
        suffix.trim_start_matches('/')
    )
}

fn rfc3339(ts: chrono::NaiveDateTime) -> String {
    chrono::DateTime::<Utc>::from_naive_utc_and_offset(ts, Utc).to_rfc3339()
}

async fn create_commitment(server: &TestServer, guardian_token: &str, title: &str) -> Value {
    server
        .request_expect(
            "POST",
            &tenant_path("commitments"),
            Some(guardian_token),
            Some(json!({
                "title": title,
                "description": "every evening",
                "recurrence": "daily",
                "start_date": rfc3339(Utc::now().naive_utc() + Duration::hours(6)),
                "dependent_ids": ["alice"],
            })),
            StatusCode::OK,
        )
        .await
}

async fn pending_assignment_id(server: &TestServer, token: &str) -> String {
    let listed = server
        .request_expect(
            "GET",
            &tenant_path("dependents/alice/assignments"),
            Some(token),
            None,
            StatusCode::OK,
        )
        .await;
    listed
        .as_array()
        .unwrap()
        .iter()
        .find(|a| a.get("status").unwrap() == "pending")
        .and_then(|a| a.get("id"))
        .and_then(|v| v.as_str())
        .map(|s| s.to_string())
        .expect("pending assignment")
}

#[tokio::test]
async fn public_endpoints_work() {
    let Some(server) = TestServer::spawn().await else {
        return;
    };
    server
        .request_expect("GET", "/healthz", None, None, StatusCode::OK)
        .await;
    let version = server
        .request_expect("GET", "/api/version", None, None, StatusCode::OK)
        .await;
    assert!(version.get("version").and_then(|v| v.as_str()).is_some());
    server
        .request_expect("GET", "/api/v1/version", None, None, StatusCode::OK)
        .await;
    let token = server.login("mom", "secret123").await;
    assert!(!token.is_empty());
}

#[tokio::test]
async fn unauthenticated_requests_are_rejected() {
    let Some(server) = TestServer::spawn().await else {
        return;
    };
    let cases: Vec<(&str, String, Option<Value>)> = vec![
        ("GET", tenant_path("dependents"), None),
        ("GET", tenant_path("commitments"), None),
        (
            "POST",
            tenant_path("commitments"),
            Some(json!({"title":"X","recurrence":"daily","dependent_ids":["alice"]})),
        ),
        ("GET", tenant_path("approvals"), None),
        ("GET", tenant_path("approvals/count"), None),
        ("POST", tenant_path("approvals/a1/approve"), None),
        (
            "POST",
            tenant_path("approvals/a1/reject"),
            Some(json!({"reason":"nope"})),
        ),
        ("GET", tenant_path("dependents/alice/assignments"), None),
        (
            "POST",
            tenant_path("dependents/alice/assignments/a1/submit"),
            Some(json!({"image_ref":"img/x.jpg"})),
        ),
        ("GET", tenant_path("dependents/alice/stickers"), None),
        ("GET", tenant_path("dependents/alice/balance"), None),
        ("GET", tenant_path("rewards"), None),
        (
            "POST",
            tenant_path("rewards"),
            Some(json!({"title":"Ice cream","required_stickers":3})),
        ),
        (
            "POST",
            tenant_path("dependents/alice/rewards/r1/redeem"),
            None,
        ),
        ("GET", tenant_path("plant-types"), None),
        ("GET", tenant_path("dependents/alice/plant"), None),
        (
            "POST",
            tenant_path("dependents/alice/plant"),
            Some(json!({"plant_type_id":"sunflower"})),
        ),
        ("POST", tenant_path("dependents/alice/plant/water"), None),
        ("POST", tenant_path("dependents/alice/plant/advance"), None),
    ];

    for (method, path, body) in cases.iter() {
        server
            .request_expect(method, path, None, body.clone(), StatusCode::UNAUTHORIZED)
            .await;
    }
}

#[tokio::test]
async fn commitment_lifecycle_scenario() {
    let Some(server) = TestServer::spawn().await else {
        return;
    };
    let guardian_token = server.login("mom", "secret123").await;
    let dependent_token = server.login("alice", "kidpass").await;

    // Guardian sets up the commitment; Alice gets a pending assignment.
    let commitment = create_commitment(&server, &guardian_token, "Brush teeth").await;
    assert_eq!(commitment.get("recurrence").unwrap(), "daily");
    assert_eq!(commitment.get("active").unwrap(), true);

    // Alice adopts a plant first so approval experience lands somewhere.
    let plant = server
        .request_expect(
            "POST",
            &tenant_path("dependents/alice/plant"),
            Some(&dependent_token),
            Some(json!({"plant_type_id":"sunflower"})),
            StatusCode::OK,
        )
        .await;
    assert_eq!(plant.get("stage").unwrap().as_i64().unwrap(), 1);
    assert_eq!(plant.get("experience").unwrap().as_i64().unwrap(), 0);

    let assignment_id = pending_assignment_id(&server, &dependent_token).await;

    // Alice submits photographic proof.
    let submitted = server
        .request_expect(
            "POST",
            &tenant_path(&format!(
                "dependents/alice/assignments/{assignment_id}/submit"
            )),
            Some(&dependent_token),
            Some(json!({"image_ref":"img/proof.jpg","note":"all clean"})),
            StatusCode::OK,
        )
        .await;
    assert_eq!(submitted.get("status").unwrap(), "submitted");

    // It shows up in the guardian's approvals inbox.
    let approvals = server
        .request_expect(
            "GET",
            &tenant_path("approvals"),
            Some(&guardian_token),
            None,
            StatusCode::OK,
        )
        .await;
    let inbox = approvals.as_array().unwrap();
    assert_eq!(inbox.len(), 1);
    assert_eq!(inbox[0].get("assignment_id").unwrap(), &json!(assignment_id));
    assert_eq!(inbox[0].get("commitment_title").unwrap(), "Brush teeth");
    assert_eq!(inbox[0].get("dependent_id").unwrap(), "alice");

    let count = server
        .request_expect(
            "GET",
            &tenant_path("approvals/count"),
            Some(&guardian_token),
            None,
            StatusCode::OK,
        )
        .await;
    assert_eq!(count.get("count").unwrap().as_u64().unwrap(), 1);

    // Approval mints exactly one sticker and grants plant experience.
    let approved = server
        .request_expect(
            "POST",
            &tenant_path(&format!("approvals/{assignment_id}/approve")),
            Some(&guardian_token),
            None,
            StatusCode::OK,
        )
        .await;
    assert_eq!(approved.get("status").unwrap(), "approved");
    assert!(approved.get("completed_at").unwrap().as_str().is_some());

    // Replayed approval is refused as a lost race, not silently merged.
    let (status, conflict) = server
        .request(
            "POST",
            &tenant_path(&format!("approvals/{assignment_id}/approve")),
            Some(&guardian_token),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(conflict.get("kind").unwrap(), "invalid_transition");

    let balance = server
        .request_expect(
            "GET",
            &tenant_path("dependents/alice/balance"),
            Some(&dependent_token),
            None,
            StatusCode::OK,
        )
        .await;
    assert_eq!(
        balance.get("available_stickers").unwrap().as_i64().unwrap(),
        1
    );

    let stickers = server
        .request_expect(
            "GET",
            &tenant_path("dependents/alice/stickers"),
            Some(&dependent_token),
            None,
            StatusCode::OK,
        )
        .await;
    let stickers = stickers.as_array().unwrap();
    assert_eq!(stickers.len(), 1);
    assert_eq!(stickers[0].get("title").unwrap(), "Brush teeth");
    assert_eq!(stickers[0].get("redeemed").unwrap(), false);

    let plant = server
        .request_expect(
            "GET",
            &tenant_path("dependents/alice/plant"),
            Some(&dependent_token),
            None,
            StatusCode::OK,
        )
        .await;
    assert_eq!(plant.get("experience").unwrap().as_i64().unwrap(), 25);
}

#[tokio::test]
async fn rejection_requires_reason_and_reopens() {
    let Some(server) = TestServer::spawn().await else {
        return;
    };
    let guardian_token = server.login("mom", "secret123").await;
    let dependent_token = server.login("alice", "kidpass").await;
    create_commitment(&server, &guardian_token, "Tidy room").await;
    let assignment_id = pending_assignment_id(&server, &dependent_token).await;

    server
        .request_expect(
            "POST",
            &tenant_path(&format!(
                "dependents/alice/assignments/{assignment_id}/submit"
            )),
            Some(&dependent_token),
            Some(json!({"image_ref":"img/room.jpg"})),
            StatusCode::OK,
        )
        .await;

    // Empty reason is malformed input.
    server
        .request_expect(
            "POST",
            &tenant_path(&format!("approvals/{assignment_id}/reject")),
            Some(&guardian_token),
            Some(json!({"reason":"  "})),
            StatusCode::BAD_REQUEST,
        )
        .await;

    let rejected = server
        .request_expect(
            "POST",
            &tenant_path(&format!("approvals/{assignment_id}/reject")),
            Some(&guardian_token),
            Some(json!({"reason":"bed still a mess"})),
            StatusCode::OK,
        )
        .await;
    assert_eq!(rejected.get("status").unwrap(), "rejected");
    assert_eq!(
        rejected.get("rejection_reason").unwrap(),
        "bed still a mess"
    );

    // Resubmission re-enters the submitted state.
    let resubmitted = server
        .request_expect(
            "POST",
            &tenant_path(&format!(
                "dependents/alice/assignments/{assignment_id}/submit"
            )),
            Some(&dependent_token),
            Some(json!({"image_ref":"img/room2.jpg","note":"fixed"})),
            StatusCode::OK,
        )
        .await;
    assert_eq!(resubmitted.get("status").unwrap(), "submitted");
}

#[tokio::test]
async fn redeem_shortfall_is_reported() {
    let Some(server) = TestServer::spawn().await else {
        return;
    };
    let guardian_token = server.login("mom", "secret123").await;
    let dependent_token = server.login("alice", "kidpass").await;

    let reward = server
        .request_expect(
            "POST",
            &tenant_path("rewards"),
            Some(&guardian_token),
            Some(json!({"title":"Ice cream","required_stickers":3})),
            StatusCode::OK,
        )
        .await;
    let reward_id = reward.get("id").unwrap().as_str().unwrap().to_string();

    // Earn two stickers via two approvals on two due dates.
    let commitment = create_commitment(&server, &guardian_token, "Brush teeth").await;
    let commitment_id = commitment.get("id").unwrap().as_str().unwrap().to_string();
    for day in 0..2 {
        if day > 0 {
            server
                .request_expect(
                    "POST",
                    &tenant_path(&format!("commitments/{commitment_id}/instantiate")),
                    Some(&guardian_token),
                    Some(json!({
                        "due_date": rfc3339(Utc::now().naive_utc() + Duration::days(day)),
                    })),
                    StatusCode::OK,
                )
                .await;
        }
        let assignment_id = pending_assignment_id(&server, &dependent_token).await;
        server
            .request_expect(
                "POST",
                &tenant_path(&format!(
                    "dependents/alice/assignments/{assignment_id}/submit"
                )),
                Some(&dependent_token),
                Some(json!({"image_ref":"img/p.jpg"})),
                StatusCode::OK,
            )
            .await;
        server
            .request_expect(
                "POST",
                &tenant_path(&format!("approvals/{assignment_id}/approve")),
                Some(&guardian_token),
                None,
                StatusCode::OK,
            )
            .await;
    }

    let (status, body) = server
        .request(
            "POST",
            &tenant_path(&format!("dependents/alice/rewards/{reward_id}/redeem")),
            Some(&dependent_token),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body.get("kind").unwrap(), "insufficient_balance");
    let message = body.get("error").unwrap().as_str().unwrap();
    assert!(message.contains("short 1"), "message was: {message}");

    // One more approval and the redemption goes through.
    server
        .request_expect(
            "POST",
            &tenant_path(&format!("commitments/{commitment_id}/instantiate")),
            Some(&guardian_token),
            Some(json!({
                "due_date": rfc3339(Utc::now().naive_utc() + Duration::days(2)),
            })),
            StatusCode::OK,
        )
        .await;
    let assignment_id = pending_assignment_id(&server, &dependent_token).await;
    server
        .request_expect(
            "POST",
            &tenant_path(&format!(
                "dependents/alice/assignments/{assignment_id}/submit"
            )),
            Some(&dependent_token),
            Some(json!({"image_ref":"img/p3.jpg"})),
            StatusCode::OK,
        )
        .await;
    server
        .request_expect(
            "POST",
            &tenant_path(&format!("approvals/{assignment_id}/approve")),
            Some(&guardian_token),
            None,
            StatusCode::OK,
        )
        .await;

    let redeemed = server
        .request_expect(
            "POST",
            &tenant_path(&format!("dependents/alice/rewards/{reward_id}/redeem")),
            Some(&dependent_token),
            None,
            StatusCode::OK,
        )
        .await;
    assert_eq!(redeemed.get("stickers_spent").unwrap().as_i64().unwrap(), 3);
    assert_eq!(
        redeemed
            .get("available_stickers")
            .unwrap()
            .as_i64()
            .unwrap(),
        0
    );
}

#[tokio::test]
async fn watering_window_is_enforced_over_rest() {
    let Some(server) = TestServer::spawn().await else {
        return;
    };
    let dependent_token = server.login("alice", "kidpass").await;
    server
        .request_expect(
            "POST",
            &tenant_path("dependents/alice/plant"),
            Some(&dependent_token),
            Some(json!({"plant_type_id":"sunflower"})),
            StatusCode::OK,
        )
        .await;

    let watered = server
        .request_expect(
            "POST",
            &tenant_path("dependents/alice/plant/water"),
            Some(&dependent_token),
            None,
            StatusCode::OK,
        )
        .await;
    assert_eq!(watered.get("health").unwrap().as_i64().unwrap(), 90);
    assert_eq!(watered.get("streak_days").unwrap().as_i64().unwrap(), 0);

    let (status, body) = server
        .request(
            "POST",
            &tenant_path("dependents/alice/plant/water"),
            Some(&dependent_token),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body.get("kind").unwrap(), "already_watered");
}

#[tokio::test]
async fn guardian_and_dependent_access_control() {
    let Some(server) = TestServer::spawn().await else {
        return;
    };
    let guardian_token = server.login("mom", "secret123").await;
    let dependent_token = server.login("alice", "kidpass").await;

    let dependents = server
        .request_expect(
            "GET",
            &tenant_path("dependents"),
            Some(&guardian_token),
            None,
            StatusCode::OK,
        )
        .await;
    assert!(
        dependents
            .as_array()
            .unwrap()
            .iter()
            .any(|d| d.get("id").unwrap() == "alice")
    );

    // Dependent-reachable reads.
    server
        .request_expect(
            "GET",
            &tenant_path("rewards"),
            Some(&dependent_token),
            None,
            StatusCode::OK,
        )
        .await;
    server
        .request_expect(
            "GET",
            &tenant_path("plant-types"),
            Some(&dependent_token),
            None,
            StatusCode::OK,
        )
        .await;
    server
        .request_expect(
            "GET",
            &tenant_path("dependents/alice/assignments"),
            Some(&dependent_token),
            None,
            StatusCode::OK,
        )
        .await;

    // A guardian cannot submit proof on the dependent's behalf, and a
    // dependent cannot reach guardian surfaces or other dependents.
    let forbidden_cases: Vec<(&str, String, Option<Value>, &str)> = vec![
        (
            "POST",
            tenant_path("dependents/alice/assignments/a1/submit"),
            Some(json!({"image_ref":"img/x.jpg"})),
            &guardian_token,
        ),
        (
            "POST",
            tenant_path("dependents/alice/plant/water"),
            None,
            &guardian_token,
        ),
        ("GET", tenant_path("dependents"), None, &dependent_token),
        ("GET", tenant_path("approvals"), None, &dependent_token),
        (
            "GET",
            tenant_path("approvals/count"),
            None,
            &dependent_token,
        ),
        (
            "POST",
            tenant_path("approvals/a1/approve"),
            None,
            &dependent_token,
        ),
        (
            "POST",
            tenant_path("approvals/a1/reject"),
            Some(json!({"reason":"no"})),
            &dependent_token,
        ),
        (
            "POST",
            tenant_path("commitments"),
            Some(json!({"title":"X","recurrence":"daily","dependent_ids":["alice"]})),
            &dependent_token,
        ),
        (
            "POST",
            tenant_path("rewards"),
            Some(json!({"title":"X","required_stickers":1})),
            &dependent_token,
        ),
        (
            "GET",
            tenant_path("dependents/bob/assignments"),
            None,
            &dependent_token,
        ),
        (
            "GET",
            tenant_path("dependents/bob/balance"),
            None,
            &dependent_token,
        ),
        (
            "POST",
            tenant_path("dependents/bob/plant/water"),
            None,
            &dependent_token,
        ),
    ];

    for (method, path, body, token) in forbidden_cases.iter() {
        server
            .request_expect(method, path, Some(token), body.clone(), StatusCode::FORBIDDEN)
            .await;
    }
}

#[tokio::test]
async fn token_renewal_keeps_session_valid() {
    let Some(server) = TestServer::spawn().await else {
        return;
    };
    let token = server.login("alice", "kidpass").await;
    let renewed = server
        .request_expect(
            "POST",
            "/api/v1/auth/renew",
            Some(&token),
            None,
            StatusCode::OK,
        )
        .await;
    let new_token = renewed.get("token").unwrap().as_str().unwrap().to_string();
    assert!(!new_token.is_empty());
    server
        .request_expect(
            "GET",
            &tenant_path("dependents/alice/balance"),
            Some(&new_token),
            None,
            StatusCode::OK,
        )
        .await;
}
