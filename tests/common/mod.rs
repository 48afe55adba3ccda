#![allow(dead_code)]

use async_trait::async_trait;
use axum::{
    Router,
    body::Body,
    http::{HeaderMap, Method, Request, StatusCode, header},
};
use http_body_util::BodyExt;
use incidentry::api::AppState;
use incidentry::config::Config;
use incidentry::db::Store;
use incidentry::domain::Role;
use incidentry::services::{Notification, Notifier};
use incidentry::state::SharedState;
use serde_json::{Value, json};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::Mutex;
use tower::ServiceExt;

pub const PASSWORD: &str = "correct-horse";

/// Keeps every notification so tests can read reset links.
#[derive(Default)]
pub struct CapturingNotifier {
    pub sent: Mutex<Vec<Notification>>,
}

#[async_trait]
impl Notifier for CapturingNotifier {
    async fn send(&self, notification: &Notification) -> anyhow::Result<()> {
        self.sent.lock().await.push(notification.clone());
        Ok(())
    }
}

pub struct TestApp {
    pub router: Router,
    pub state: Arc<AppState>,
    pub notifier: Arc<CapturingNotifier>,
    db_path: PathBuf,
}

impl Drop for TestApp {
    fn drop(&mut self) {
        let _ = std::fs::remove_file(&self.db_path);
    }
}

pub fn test_config() -> Config {
    let mut config = Config::default();
    config.server.secure_cookies = false;
    config.security.secret_key = "integration-test-secret".to_string();
    config.security.argon2_memory_cost_kib = 64;
    config.security.argon2_time_cost = 1;
    config.security.lockout.max_attempts = 3;
    config.audit.record_auth_events = false;
    config
}

pub async fn spawn_app() -> TestApp {
    spawn_app_with(test_config()).await
}

pub async fn spawn_app_with(mut config: Config) -> TestApp {
    let db_path =
        std::env::temp_dir().join(format!("incidentry-it-{}.db", uuid::Uuid::new_v4()));
    config.general.database_path = format!("sqlite:{}", db_path.display());

    let store = Store::new(&config.general.database_path)
        .await
        .expect("Failed to open test database");
    let notifier = Arc::new(CapturingNotifier::default());
    let shared = SharedState::with_store(config, store, notifier.clone())
        .expect("Failed to build state");

    let state = incidentry::api::create_app_state(Arc::new(shared), None);
    let router = incidentry::api::router(state.clone());

    TestApp {
        router,
        state,
        notifier,
        db_path,
    }
}

impl TestApp {
    pub async fn create_account(&self, username: &str, role: Role) -> i32 {
        self.state
            .shared
            .auth_service
            .create_account(username, &format!("{username}@example.com"), PASSWORD, role)
            .await
            .expect("Failed to seed account")
            .id
    }

    /// Seeds an account and walks it through the whole login sequence.
    pub async fn signed_in(&self, username: &str, role: Role) -> Browser {
        self.create_account(username, role).await;
        let mut browser = Browser::default();
        browser.login(self, username, PASSWORD).await;
        browser
    }
}

pub struct Reply {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Value,
}

impl Reply {
    pub fn location(&self) -> Option<&str> {
        self.headers
            .get(header::LOCATION)
            .and_then(|v| v.to_str().ok())
    }

    pub fn error(&self) -> &str {
        self.body["error"].as_str().unwrap_or_default()
    }
}

/// A client that carries the session cookie between requests.
#[derive(Default)]
pub struct Browser {
    cookie: Option<String>,
    pub otp_secret: Option<String>,
    /// Sent as `X-Forwarded-For` when set.
    pub client_ip: Option<String>,
}

impl Browser {
    pub async fn send(
        &mut self,
        app: &TestApp,
        method: Method,
        uri: &str,
        body: Option<Value>,
    ) -> Reply {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(cookie) = &self.cookie {
            builder = builder.header(header::COOKIE, cookie);
        }
        if let Some(ip) = &self.client_ip {
            builder = builder.header("x-forwarded-for", ip);
        }

        let request = match body {
            Some(json) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(json.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };

        let response = app.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let headers = response.headers().clone();

        if let Some(set_cookie) = headers.get(header::SET_COOKIE) {
            let pair = set_cookie
                .to_str()
                .unwrap()
                .split(';')
                .next()
                .unwrap()
                .to_string();
            self.cookie = Some(pair);
        }

        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);

        Reply {
            status,
            headers,
            body,
        }
    }

    pub async fn get(&mut self, app: &TestApp, uri: &str) -> Reply {
        self.send(app, Method::GET, uri, None).await
    }

    pub async fn post(&mut self, app: &TestApp, uri: &str, body: Value) -> Reply {
        self.send(app, Method::POST, uri, Some(body)).await
    }

    pub async fn put(&mut self, app: &TestApp, uri: &str, body: Value) -> Reply {
        self.send(app, Method::PUT, uri, Some(body)).await
    }

    pub async fn delete(&mut self, app: &TestApp, uri: &str) -> Reply {
        self.send(app, Method::DELETE, uri, None).await
    }

    pub fn current_code(&self) -> String {
        let secret = self.otp_secret.as_deref().expect("not enrolled");
        incidentry::services::totp::code_at(secret, chrono::Utc::now().timestamp())
            .expect("bad secret")
    }

    /// Password step plus whichever second-factor step the server asks for.
    pub async fn login(&mut self, app: &TestApp, username: &str, password: &str) -> Reply {
        let reply = self
            .post(
                app,
                "/auth/login",
                json!({ "username": username, "password": password }),
            )
            .await;
        assert_eq!(reply.status, StatusCode::OK, "{:?}", reply.body);

        let next = reply.body["data"]["next"].as_str().unwrap().to_string();
        if next == "/auth/2fa-setup" {
            let setup = self.get(app, "/auth/2fa-setup").await;
            assert_eq!(setup.status, StatusCode::OK, "{:?}", setup.body);
            let uri = setup.body["data"]["provisioning_uri"].as_str().unwrap();
            self.otp_secret = Some(secret_from_uri(uri));
        }

        let code = self.current_code();
        let reply = self.post(app, &next, json!({ "token": code })).await;
        assert_eq!(reply.status, StatusCode::OK, "{:?}", reply.body);
        reply
    }
}

pub fn secret_from_uri(uri: &str) -> String {
    let query = uri.split_once('?').unwrap().1;
    query
        .split('&')
        .find_map(|pair| pair.strip_prefix("secret="))
        .unwrap()
        .to_string()
}
