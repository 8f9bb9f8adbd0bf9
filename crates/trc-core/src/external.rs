//! Contracts for external collaborators.
//!
//! The interactive shell, Stripe and keychain integrations live outside this
//! workspace; these traits are their only contract with the core.

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Secret store
// ---------------------------------------------------------------------------

/// Errors from the secret store.
#[derive(Debug, thiserror::Error)]
pub enum SecretError {
    /// The key does not exist.
    #[error("secret not found: {0}")]
    NotFound(String),
    /// The backing store failed.
    #[error("secret store backend error: {0}")]
    Backend(String),
}

/// Key-value secret storage. Implementations include OS keychains and an
/// encrypted-file fallback; tests use [`MemorySecretStore`].
pub trait SecretStore: Send + Sync {
    /// Fetch a secret by key.
    fn get(&self, key: &str) -> Result<String, SecretError>;
    /// Store a secret.
    fn set(&self, key: &str, value: &str) -> Result<(), SecretError>;
    /// Delete a secret. Deleting a missing key is not an error.
    fn delete(&self, key: &str) -> Result<(), SecretError>;
    /// Whether the key exists.
    fn has(&self, key: &str) -> bool;
}

/// In-memory secret store for tests and single-process deployments.
#[derive(Debug, Default)]
pub struct MemorySecretStore {
    inner: std::sync::Mutex<std::collections::BTreeMap<String, String>>,
}

impl MemorySecretStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }
}

impl SecretStore for MemorySecretStore {
    fn get(&self, key: &str) -> Result<String, SecretError> {
        self.inner
            .lock()
            .expect("secret store lock")
            .get(key)
            .cloned()
            .ok_or_else(|| SecretError::NotFound(key.to_string()))
    }

    fn set(&self, key: &str, value: &str) -> Result<(), SecretError> {
        self.inner
            .lock()
            .expect("secret store lock")
            .insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn delete(&self, key: &str) -> Result<(), SecretError> {
        self.inner.lock().expect("secret store lock").remove(key);
        Ok(())
    }

    fn has(&self, key: &str) -> bool {
        self.inner.lock().expect("secret store lock").contains_key(key)
    }
}

// ---------------------------------------------------------------------------
// Billing subscription manager
// ---------------------------------------------------------------------------

/// A credit grant or consumption record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreditTransaction {
    /// Transaction identifier.
    pub id: String,
    /// Positive for grants, negative for consumption.
    pub amount_usd: f64,
    /// Human description.
    pub description: String,
}

/// Subscription and credit operations. The Stripe-backed implementation lives
/// outside this workspace.
pub trait BillingSubscription: Send + Sync {
    /// Current credit balance for the organization.
    fn credit_balance(&self, org_id: &str) -> f64;
    /// Record a credit transaction.
    fn record_transaction(&self, org_id: &str, tx: CreditTransaction);
    /// Whether a webhook event id has already been processed (idempotency).
    fn webhook_seen(&self, provider_event_id: &str) -> bool;
    /// Mark a webhook event id as processed.
    fn mark_webhook_seen(&self, provider_event_id: &str);
}

/// Fixed-balance billing used by tests and local runs.
#[derive(Debug, Default)]
pub struct StaticBilling {
    balance: std::sync::Mutex<std::collections::BTreeMap<String, f64>>,
    seen: std::sync::Mutex<std::collections::BTreeSet<String>>,
}

impl StaticBilling {
    /// Create a billing manager with the same starting balance for every org.
    pub fn with_balance(org_id: &str, balance_usd: f64) -> Self {
        let s = Self::default();
        s.balance
            .lock()
            .expect("billing lock")
            .insert(org_id.to_string(), balance_usd);
        s
    }
}

impl BillingSubscription for StaticBilling {
    fn credit_balance(&self, org_id: &str) -> f64 {
        *self
            .balance
            .lock()
            .expect("billing lock")
            .get(org_id)
            .unwrap_or(&0.0)
    }

    fn record_transaction(&self, org_id: &str, tx: CreditTransaction) {
        let mut guard = self.balance.lock().expect("billing lock");
        *guard.entry(org_id.to_string()).or_insert(0.0) += tx.amount_usd;
    }

    fn webhook_seen(&self, provider_event_id: &str) -> bool {
        self.seen
            .lock()
            .expect("billing lock")
            .contains(provider_event_id)
    }

    fn mark_webhook_seen(&self, provider_event_id: &str) {
        self.seen
            .lock()
            .expect("billing lock")
            .insert(provider_event_id.to_string());
    }
}
