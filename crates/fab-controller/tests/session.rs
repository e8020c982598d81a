//! Session tests against an in-process controller stub

#[cfg(test)]
mod tests {
    use axum::extract::State;
    use axum::http::{header, HeaderMap, Method, StatusCode, Uri};
    use axum::response::IntoResponse;
    use axum::routing::post;
    use axum::{Json, Router};
    use fab_controller::{ControllerError, ControllerSession, SessionState};
    use fab_core::ControllerSettings;
    use serde_json::{json, Value};
    use std::collections::HashSet;
    use std::sync::{Arc, Mutex};

    #[derive(Default)]
    struct Stub {
        logins: usize,
        valid: HashSet<String>,
        reads: usize,
        writes: Vec<Value>,
    }

    type Shared = Arc<Mutex<Stub>>;

    async fn login(State(stub): State<Shared>, Json(body): Json<Value>) -> impl IntoResponse {
        let name = body
            .pointer("/aaaUser/attributes/name")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        let pwd = body
            .pointer("/aaaUser/attributes/pwd")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();

        let mut stub = stub.lock().unwrap();
        stub.logins += 1;
        if name != "admin" || pwd != "secret" {
            return (StatusCode::UNAUTHORIZED, Json(json!({"imdata": []}))).into_response();
        }
        let token = format!("tok-{}", stub.logins);
        stub.valid.insert(token.clone());
        Json(json!({
            "imdata": [{
                "aaaLogin": {
                    "attributes": { "token": token, "refreshTimeoutSeconds": "600" }
                }
            }]
        }))
        .into_response()
    }

    async fn resource(
        State(stub): State<Shared>,
        method: Method,
        uri: Uri,
        headers: HeaderMap,
        body: String,
    ) -> impl IntoResponse {
        let mut stub = stub.lock().unwrap();
        let token = headers
            .get(header::COOKIE)
            .and_then(|v| v.to_str().ok())
            .and_then(|c| c.strip_prefix("APIC-cookie="))
            .map(str::to_string);
        if !token.map(|t| stub.valid.contains(&t)).unwrap_or(false) {
            return (StatusCode::FORBIDDEN, "token expired".to_string()).into_response();
        }

        match (method, uri.path()) {
            (Method::GET, "/api/class/fvTenant.json") => {
                stub.reads += 1;
                Json(json!({
                    "totalCount": "2",
                    "imdata": [
                        {"fvTenant": {"attributes": {"name": "common", "dn": "uni/tn-common"}}},
                        {"fvTenant": {"attributes": {"name": "PROD", "dn": "uni/tn-PROD"}}}
                    ]
                }))
                .into_response()
            }
            (Method::GET, "/api/class/faultInst.json") => {
                (StatusCode::SERVICE_UNAVAILABLE, "busy".to_string()).into_response()
            }
            (Method::GET, "/api/class/fvAp.json") => "not json".to_string().into_response(),
            (Method::POST, "/api/mo/uni.json") => {
                let value: Value = serde_json::from_str(&body).unwrap_or(Value::Null);
                stub.writes.push(value);
                Json(json!({"totalCount": "0", "imdata": []})).into_response()
            }
            _ => (
                StatusCode::BAD_REQUEST,
                r#"{"imdata":[{"error":{"attributes":{"text":"unknown class"}}}]}"#.to_string(),
            )
                .into_response(),
        }
    }

    async fn spawn_stub() -> (String, Shared) {
        let stub: Shared = Arc::new(Mutex::new(Stub::default()));
        let app = Router::new()
            .route("/api/aaaLogin.json", post(login))
            .fallback(resource)
            .with_state(stub.clone());

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        (format!("http://{}", addr), stub)
    }

    fn settings(base_url: &str, password: &str) -> ControllerSettings {
        ControllerSettings {
            base_url: base_url.to_string(),
            username: "admin".to_string(),
            password: password.to_string(),
            ..ControllerSettings::default()
        }
    }

    #[tokio::test]
    async fn test_lazy_login_then_read() {
        let (url, stub) = spawn_stub().await;
        let session = ControllerSession::new(&settings(&url, "secret")).unwrap();
        assert_eq!(session.state().await, SessionState::Unauthenticated);

        let body = session.get("/api/class/fvTenant.json").await.unwrap();
        assert_eq!(body["imdata"].as_array().unwrap().len(), 2);
        assert_eq!(session.state().await, SessionState::Authenticated);
        assert!(!session.expiry_unknown().await);

        // Reads are idempotent and reuse the token
        let again = session.get("/api/class/fvTenant.json").await.unwrap();
        assert_eq!(body, again);
        assert_eq!(stub.lock().unwrap().logins, 1);
        assert_eq!(stub.lock().unwrap().reads, 2);
    }

    #[tokio::test]
    async fn test_revoked_token_reauthenticates_exactly_once() {
        let (url, stub) = spawn_stub().await;
        let session = ControllerSession::new(&settings(&url, "secret")).unwrap();
        session.authenticate().await.unwrap();

        stub.lock().unwrap().valid.clear();

        let err = session.get("/api/class/fvTenant.json").await.unwrap_err();
        assert!(err.is_auth());
        assert_eq!(session.state().await, SessionState::Unauthenticated);

        session.get("/api/class/fvTenant.json").await.unwrap();
        assert_eq!(session.login_attempts(), 2);
        assert_eq!(stub.lock().unwrap().logins, 2);
    }

    #[tokio::test]
    async fn test_bad_credentials_are_auth_errors() {
        let (url, _stub) = spawn_stub().await;
        let session = ControllerSession::new(&settings(&url, "wrong")).unwrap();

        let err = session.get("/api/class/fvTenant.json").await.unwrap_err();
        assert!(matches!(err, ControllerError::Auth(_)));
        assert_eq!(session.state().await, SessionState::Unauthenticated);
    }

    #[tokio::test]
    async fn test_status_classification() {
        let (url, _stub) = spawn_stub().await;
        let session = ControllerSession::new(&settings(&url, "secret")).unwrap();

        let server = session.get("/api/class/faultInst.json").await.unwrap_err();
        assert!(matches!(server, ControllerError::Server { status: 503, .. }));

        let client = session.get("/api/class/fvBD.json").await.unwrap_err();
        match client {
            ControllerError::Client { status, body } => {
                assert_eq!(status, 400);
                assert!(body.contains("unknown class"));
            }
            other => panic!("expected client error, got {:?}", other),
        }

        let parse = session.get("/api/class/fvAp.json").await.unwrap_err();
        assert!(matches!(parse, ControllerError::Parse(_)));
    }

    #[tokio::test]
    async fn test_grammar_violation_never_reaches_controller() {
        let (url, stub) = spawn_stub().await;
        let session = ControllerSession::new(&settings(&url, "secret")).unwrap();

        let err = session.get("/api/class/fvTenant").await.unwrap_err();
        assert!(matches!(err, ControllerError::InvalidPath { .. }));
        assert_eq!(stub.lock().unwrap().logins, 0);
    }

    #[tokio::test]
    async fn test_write_posts_payload() {
        let (url, stub) = spawn_stub().await;
        let session = ControllerSession::new(&settings(&url, "secret")).unwrap();

        let payload = json!({"fvTenant": {"attributes": {"name": "LAB"}}});
        session.post("/api/mo/uni.json", &payload).await.unwrap();
        assert_eq!(stub.lock().unwrap().writes, vec![payload]);
    }

    #[tokio::test]
    async fn test_unreachable_controller_fails_login() {
        let session = ControllerSession::new(&settings("http://127.0.0.1:1", "secret")).unwrap();
        let err = session.get("/api/class/fvTenant.json").await.unwrap_err();
        assert!(err.is_auth());
    }
}
