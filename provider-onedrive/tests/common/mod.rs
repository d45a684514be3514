#![allow(dead_code)]

use async_trait::async_trait;
use bridge_traits::error::{BridgeError, Result as BridgeResult};
use bridge_traits::{HttpClient, HttpRequest, HttpResponse};
use chrono::{Duration as ChronoDuration, Utc};
use core_auth::{AccountSession, AccountType, TokenRequest, TokenStrategy};
use core_runtime::config::{ClientType, ServiceConfig};
use provider_onedrive::OneDriveClient;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

pub enum Reply {
    Response(HttpResponse),
    Error(BridgeError),
    Delayed(Duration, HttpResponse),
}

/// Hands out scripted replies in order and records every request.
#[derive(Default)]
pub struct ScriptedHttpClient {
    replies: Mutex<VecDeque<Reply>>,
    requests: Mutex<Vec<HttpRequest>>,
}

impl ScriptedHttpClient {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn push(&self, response: HttpResponse) {
        self.replies.lock().unwrap().push_back(Reply::Response(response));
    }

    pub fn push_reply(&self, reply: Reply) {
        self.replies.lock().unwrap().push_back(reply);
    }

    pub fn requests(&self) -> Vec<HttpRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub fn call_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }
}

#[async_trait]
impl HttpClient for ScriptedHttpClient {
    async fn execute(&self, request: HttpRequest) -> BridgeResult<HttpResponse> {
        self.requests.lock().unwrap().push(request);
        let reply = self.replies.lock().unwrap().pop_front();
        match reply {
            Some(Reply::Response(response)) => Ok(response),
            Some(Reply::Error(error)) => Err(error),
            Some(Reply::Delayed(delay, response)) => {
                tokio::time::sleep(delay).await;
                Ok(response)
            }
            None => Err(BridgeError::OperationFailed("no scripted reply".to_string())),
        }
    }
}

/// Returns a fresh session without touching the network.
pub struct StaticTokenStrategy {
    pub calls: AtomicUsize,
    account_type: AccountType,
}

impl StaticTokenStrategy {
    pub fn new(account_type: AccountType) -> Arc<Self> {
        Arc::new(Self {
            calls: AtomicUsize::new(0),
            account_type,
        })
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TokenStrategy for StaticTokenStrategy {
    fn name(&self) -> &'static str {
        "static"
    }

    async fn resolve_token(&self, request: &TokenRequest) -> core_auth::Result<AccountSession> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(AccountSession::new(self.account_type)
            .with_client_id(request.client_id.clone())
            .with_user_id("user-1")
            .with_access_token("token-1")
            .with_refresh_token("refresh-1")
            .with_expires_on(Utc::now() + ChronoDuration::hours(1)))
    }
}

pub fn consumer_config(http: Arc<ScriptedHttpClient>) -> ServiceConfig {
    ServiceConfig::builder(ClientType::Consumer)
        .app_id("app-id")
        .http_client(http)
        .build()
        .unwrap()
}

pub fn consumer_client(http: Arc<ScriptedHttpClient>) -> (OneDriveClient, Arc<StaticTokenStrategy>) {
    let strategy = StaticTokenStrategy::new(AccountType::MicrosoftAccount);
    let client = OneDriveClient::builder(consumer_config(http))
        .strategy(strategy.clone())
        .build()
        .unwrap();
    (client, strategy)
}

/// Consumer client that has already resolved its service info. The static
/// strategy makes this free of HTTP calls.
pub async fn authenticated_consumer(
    http: Arc<ScriptedHttpClient>,
) -> (OneDriveClient, Arc<StaticTokenStrategy>) {
    let (client, strategy) = consumer_client(http);
    client.authenticate().await.unwrap();
    (client, strategy)
}

pub fn json(status: u16, body: &str) -> HttpResponse {
    HttpResponse::new(status)
        .with_header("Content-Type", "application/json")
        .with_body(body.to_string())
}
