//! Session provider boundary and change notifications
//!
//! Every provider owns a [`SessionHub`]: the current principal plus a
//! broadcast of each transition. Subscribers hold a [`SessionSubscription`];
//! dropping it releases the subscription.

use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::broadcast::{self, error::RecvError};
use tokio::sync::{watch, RwLock};
use tracing::{info, warn};
use uuid::Uuid;

use crate::domain::Principal;
use crate::error::{HiveError, Result};

/// Identity and session issuance
#[async_trait]
pub trait SessionProvider: Send + Sync {
    /// Current session, if any
    async fn current_session(&self) -> Result<Option<Principal>>;

    /// Sign in with email and password
    async fn sign_in(&self, email: &str, password: &str) -> Result<Principal>;

    /// Create an account. Returns `None` when the provider withholds a
    /// session until the address is confirmed.
    async fn sign_up(&self, email: &str, password: &str) -> Result<Option<Principal>>;

    /// End the current session
    async fn sign_out(&self) -> Result<()>;

    /// Subscribe to every subsequent session transition
    fn subscribe(&self) -> SessionSubscription;
}

const TRANSITION_BUFFER: usize = 16;

/// Publishes session transitions to subscribers
pub struct SessionHub {
    current: watch::Sender<Option<Principal>>,
    transitions: broadcast::Sender<Option<Principal>>,
}

impl SessionHub {
    pub fn new() -> Self {
        let (current, _) = watch::channel(None);
        let (transitions, _) = broadcast::channel(TRANSITION_BUFFER);
        Self {
            current,
            transitions,
        }
    }

    pub fn current(&self) -> Option<Principal> {
        self.current.borrow().clone()
    }

    /// Publish a transition
    pub fn set(&self, principal: Option<Principal>) {
        match &principal {
            Some(p) => info!(email = %p.email, "Session started"),
            None => info!("Session ended"),
        }
        self.current.send_replace(principal.clone());
        // No subscribers is fine; the current value is still recorded.
        let _ = self.transitions.send(principal);
    }

    pub fn subscribe(&self) -> SessionSubscription {
        // Transitions published before this call count as already seen.
        SessionSubscription {
            transitions: self.transitions.subscribe(),
            current: self.current.subscribe(),
        }
    }

    /// Number of live subscriptions
    pub fn subscriber_count(&self) -> usize {
        self.transitions.receiver_count()
    }
}

impl Default for SessionHub {
    fn default() -> Self {
        Self::new()
    }
}

/// A held session-change subscription
pub struct SessionSubscription {
    transitions: broadcast::Receiver<Option<Principal>>,
    current: watch::Receiver<Option<Principal>>,
}

impl SessionSubscription {
    /// Wait for the next transition, in publish order. A sign-out followed by
    /// a sign-in is delivered as two transitions. A subscriber that falls
    /// more than the buffer behind resumes from the current session.
    /// `None` once the provider is gone.
    pub async fn changed(&mut self) -> Option<Option<Principal>> {
        match self.transitions.recv().await {
            Ok(session) => Some(session),
            Err(RecvError::Lagged(skipped)) => {
                warn!(skipped, "Session subscriber lagged, resuming from current session");
                Some(self.current.borrow_and_update().clone())
            }
            Err(RecvError::Closed) => None,
        }
    }
}

/// Reject empty credentials before any request is made
pub fn require_credentials(email: &str, password: &str) -> Result<()> {
    if email.trim().is_empty() || password.is_empty() {
        return Err(HiveError::Auth(
            "email and password are required".to_string(),
        ));
    }
    Ok(())
}

/// Session provider backed by an in-process account table
pub struct MemorySessionProvider {
    hub: SessionHub,
    accounts: RwLock<HashMap<String, (String, Principal)>>,
}

impl MemorySessionProvider {
    pub fn new() -> Self {
        Self {
            hub: SessionHub::new(),
            accounts: RwLock::new(HashMap::new()),
        }
    }

    pub fn hub(&self) -> &SessionHub {
        &self.hub
    }
}

impl Default for MemorySessionProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SessionProvider for MemorySessionProvider {
    async fn current_session(&self) -> Result<Option<Principal>> {
        Ok(self.hub.current())
    }

    async fn sign_in(&self, email: &str, password: &str) -> Result<Principal> {
        require_credentials(email, password)?;
        let accounts = self.accounts.read().await;
        let principal = match accounts.get(email) {
            Some((stored, principal)) if stored == password => principal.clone(),
            _ => return Err(HiveError::Auth("Invalid login credentials".to_string())),
        };
        drop(accounts);

        self.hub.set(Some(principal.clone()));
        Ok(principal)
    }

    async fn sign_up(&self, email: &str, password: &str) -> Result<Option<Principal>> {
        require_credentials(email, password)?;
        let mut accounts = self.accounts.write().await;
        if accounts.contains_key(email) {
            return Err(HiveError::Auth("User already registered".to_string()));
        }

        let principal = Principal {
            user_id: Uuid::new_v4(),
            email: email.to_string(),
        };
        accounts.insert(
            email.to_string(),
            (password.to_string(), principal.clone()),
        );
        drop(accounts);

        self.hub.set(Some(principal.clone()));
        Ok(Some(principal))
    }

    async fn sign_out(&self) -> Result<()> {
        self.hub.set(None);
        Ok(())
    }

    fn subscribe(&self) -> SessionSubscription {
        self.hub.subscribe()
    }
}
