//! Shared test helpers for server integration tests.
#![allow(dead_code)]

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use axum::Router;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use bazaar_core::config::{
    BroadcastingConfig, ServerConfig, ServiceConfig, SharedConfig, TokenConfig,
};
use bazaar_core::gate::{ConversationOwnership, GateError};
use bazaar_sdk::objects::{Principal, RecommendationRoute, Role};
use bazaar_server::server::{build_router, run_server};
use bazaar_server::state::{AppState, Background};
use http_body_util::BodyExt;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{broadcast, oneshot};
use tokio::task::JoinHandle;
use tower::ServiceExt;

pub const APP_KEY: &str = "bazaar-test";
pub const APP_SECRET: &str = "app-secret-0123456789";
pub const TOKEN_SECRET: &str = "token-secret-0123456789";
pub const SERVICE_SECRET: &str = "service-secret-0123456789";

/// Conversation `c-42` belongs to user 42.
pub struct TestConversations;

#[async_trait]
impl ConversationOwnership for TestConversations {
    async fn belongs_to(&self, conversation_id: &str, user_id: u64) -> Result<bool, GateError> {
        let owners = HashMap::from([("c-42", 42u64)]);
        Ok(owners.get(conversation_id) == Some(&user_id))
    }
}

/// Every lookup fails as if the database were down.
pub struct UnreachableConversations;

#[async_trait]
impl ConversationOwnership for UnreachableConversations {
    async fn belongs_to(&self, _: &str, _: u64) -> Result<bool, GateError> {
        Err(GateError::Database(sqlx::Error::PoolTimedOut))
    }
}

pub fn shared_config(route: RecommendationRoute) -> SharedConfig {
    SharedConfig::new(
        ServerConfig {
            listen: SocketAddr::from(([127, 0, 0, 1], 0)),
        },
        BroadcastingConfig {
            app_key: APP_KEY.to_owned(),
            app_secret: APP_SECRET.to_owned(),
            recommendation_route: route,
            activity_timeout: 30,
        },
        TokenConfig {
            secret: TOKEN_SECRET.to_owned(),
        },
        ServiceConfig {
            secret: SERVICE_SECRET.to_owned(),
        },
    )
}

/// Router plus the state behind it. Keep `Background` alive for the whole
/// test: dropping it stops the broadcaster.
pub struct TestApp {
    pub router: Router,
    pub state: AppState,
    pub background: Background,
}

pub fn build_test_app() -> TestApp {
    build_test_app_with(Arc::new(TestConversations), RecommendationRoute::User)
}

pub fn build_test_app_with(
    conversations: Arc<dyn ConversationOwnership>,
    route: RecommendationRoute,
) -> TestApp {
    let (state, background) = AppState::assemble(shared_config(route), conversations);
    TestApp {
        router: build_router(state.clone()),
        state,
        background,
    }
}

pub fn token_for(id: u64, roles: impl IntoIterator<Item = Role>) -> String {
    bazaar_sdk::token::issue_token(
        &Principal::new(id, roles),
        Duration::from_secs(300),
        TOKEN_SECRET.as_bytes(),
    )
}

/// Send `request` and return the status with the JSON body (`Null` when
/// the body is not JSON).
pub async fn send(app: Router, request: Request<Body>) -> (StatusCode, serde_json::Value) {
    let response = app.oneshot(request).await.unwrap();
    let status = response.status();
    let body_bytes = response.into_body().collect().await.unwrap().to_bytes();
    let json = serde_json::from_slice(&body_bytes).unwrap_or(serde_json::Value::Null);
    (status, json)
}

/// `POST /broadcasting/auth` with a JSON body.
pub async fn post_auth(
    app: Router,
    token: Option<&str>,
    channel_name: &str,
    socket_id: &str,
) -> (StatusCode, serde_json::Value) {
    let mut request = Request::builder()
        .method("POST")
        .uri("/broadcasting/auth")
        .header("content-type", "application/json");
    if let Some(token) = token {
        request = request.header("authorization", format!("Bearer {token}"));
    }
    let body = serde_json::json!({ "channel_name": channel_name, "socket_id": socket_id });
    let request = request
        .body(Body::from(serde_json::to_vec(&body).unwrap()))
        .unwrap();
    send(app, request).await
}

/// A server on an ephemeral port. Dropping `stop` shuts it down.
pub struct RunningServer {
    pub addr: SocketAddr,
    pub state: AppState,
    pub background: Background,
    pub stop: oneshot::Sender<()>,
}

impl RunningServer {
    pub async fn start() -> Self {
        let TestApp {
            router,
            state,
            background,
        } = build_test_app();
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (stop, stopped) = oneshot::channel::<()>();
        let shutdown = background.shutdown_after(async {
            let _ = stopped.await;
        });
        tokio::spawn(run_server(router, listener, shutdown));
        Self {
            addr,
            state,
            background,
            stop,
        }
    }

    pub fn http_url(&self) -> url::Url {
        url::Url::parse(&format!("http://{}", self.addr)).unwrap()
    }

    pub fn ws_url(&self) -> url::Url {
        url::Url::parse(&format!("ws://{}/app", self.addr)).unwrap()
    }
}

/// TCP relay in front of a server, so a test can cut the client's transport
/// without touching the server.
pub struct Relay {
    pub addr: SocketAddr,
    sever: broadcast::Sender<()>,
    accept: JoinHandle<()>,
}

impl Relay {
    pub async fn start(upstream: SocketAddr) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (sever, _) = broadcast::channel(1);
        let sever_tx = sever.clone();
        let accept = tokio::spawn(async move {
            while let Ok((mut inbound, _)) = listener.accept().await {
                let mut severed = sever_tx.subscribe();
                tokio::spawn(async move {
                    let Ok(mut outbound) = TcpStream::connect(upstream).await else {
                        return;
                    };
                    tokio::select! {
                        _ = tokio::io::copy_bidirectional(&mut inbound, &mut outbound) => {}
                        _ = severed.recv() => {}
                    }
                });
            }
        });
        Self {
            addr,
            sever,
            accept,
        }
    }

    /// Drop every relayed connection. New connections are still accepted.
    pub fn sever(&self) {
        let _ = self.sever.send(());
    }

    /// Stop listening and drop every relayed connection.
    pub fn close(&self) {
        self.accept.abort();
        self.sever();
    }

    pub fn ws_url(&self) -> url::Url {
        url::Url::parse(&format!("ws://{}/app", self.addr)).unwrap()
    }
}

