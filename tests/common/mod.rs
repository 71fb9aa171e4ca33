//! Shared test harness: an `AuthService` wired entirely to in-memory
//! collaborators, with every store kept reachable for assertions.
#![allow(dead_code)]

use std::sync::{Arc, Mutex};

use gardisto::config::AuthConfig;
use gardisto::events::{AuthEvent, EventSink};
use gardisto::model::Account;
use gardisto::password::hash_password;
use gardisto::rate_limit::RateLimiter;
use gardisto::service::{AuthService, RequestContext};
use gardisto::store::memory::{
    InMemoryAccountStore, InMemoryAuditSink, InMemoryRefreshTokenStore, InMemorySessionStore,
    RecordingMailer,
};

pub const CHROME_WINDOWS: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) \
     AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0 Safari/537.36";

/// Collects emitted domain events for assertions.
#[derive(Default)]
pub struct CollectingEventSink {
    events: Mutex<Vec<AuthEvent>>,
}

impl CollectingEventSink {
    pub fn events(&self) -> Vec<AuthEvent> {
        self.events.lock().unwrap().clone()
    }
}

impl EventSink for CollectingEventSink {
    fn emit(&self, event: AuthEvent) {
        self.events.lock().unwrap().push(event);
    }
}

pub struct Harness {
    pub service: AuthService,
    pub accounts: Arc<InMemoryAccountStore>,
    pub refresh_tokens: Arc<InMemoryRefreshTokenStore>,
    pub sessions: Arc<InMemorySessionStore>,
    pub audit: Arc<InMemoryAuditSink>,
    pub mailer: Arc<RecordingMailer>,
    pub events: Arc<CollectingEventSink>,
}

pub fn harness() -> Harness {
    harness_with(AuthConfig::development())
}

pub fn harness_with(config: AuthConfig) -> Harness {
    let accounts = Arc::new(InMemoryAccountStore::new());
    let refresh_tokens = Arc::new(InMemoryRefreshTokenStore::new());
    let sessions = Arc::new(InMemorySessionStore::new());
    let audit = Arc::new(InMemoryAuditSink::new());
    let mailer = Arc::new(RecordingMailer::new());
    let events = Arc::new(CollectingEventSink::default());

    let service = AuthService::new(
        config,
        accounts.clone(),
        refresh_tokens.clone(),
        sessions.clone(),
        audit.clone(),
        Arc::new(RateLimiter::in_memory()),
        mailer.clone(),
        events.clone(),
    )
    .expect("test configuration must validate");

    Harness {
        service,
        accounts,
        refresh_tokens,
        sessions,
        audit,
        mailer,
        events,
    }
}

pub async fn seed_account(harness: &Harness, email: &str, password: &str) -> Account {
    let account = Account::new(
        email.to_string(),
        "Test Admin".to_string(),
        hash_password(password).expect("hashing must succeed"),
        vec!["admin".to_string()],
    );
    harness.accounts.insert(account.clone()).await;
    account
}

pub fn ctx() -> RequestContext {
    RequestContext::new("203.0.113.10", Some(CHROME_WINDOWS))
}

pub fn ctx_from(ip: &str) -> RequestContext {
    RequestContext::new(ip, Some(CHROME_WINDOWS))
}
