//! Round-robin credential pool with cooldown tracking
//!
//! Credentials are configured at process start and never persisted. The
//! pool tracks, per credential, when it was last presented and until when
//! it is blocked after a rate-limit signal. Selection rotates a cursor so
//! usage spreads evenly across the set instead of always favoring the
//! first entry.

use std::sync::Mutex;
use std::time::Duration;
use tokio::time::Instant;
use tracing::debug;

use crate::types::{Result, StorygateError};

/// A single pinning credential: key/secret pair for authenticated writes
/// plus a bearer token for gateway reads.
#[derive(Debug, Clone)]
pub struct StoreCredential {
    pub name: String,
    pub api_key: String,
    pub api_secret: String,
    pub bearer_token: String,
}

/// Per-credential bookkeeping. `None` means never used / not blocked.
struct CredentialState {
    credential: StoreCredential,
    last_used_at: Option<Instant>,
    blocked_until: Option<Instant>,
}

impl CredentialState {
    /// Earliest instant at which this credential may be presented again.
    fn usable_at(&self, min_spacing: Duration) -> Instant {
        let unblocked = self.blocked_until.unwrap_or_else(Instant::now);
        let spaced = self
            .last_used_at
            .map(|t| t + min_spacing)
            .unwrap_or_else(Instant::now);
        unblocked.max(spaced)
    }

    fn is_usable(&self, now: Instant, min_spacing: Duration) -> bool {
        let unblocked = self.blocked_until.map_or(true, |t| now >= t);
        let spaced = self.last_used_at.map_or(true, |t| now >= t + min_spacing);
        unblocked && spaced
    }
}

/// Outcome of a single acquisition pass.
#[derive(Debug, Clone)]
pub enum Acquire {
    /// A credential is ready to use now.
    Ready(StoreCredential),
    /// Nothing is usable; retry after this duration. Callers must sleep,
    /// not spin.
    WaitFor(Duration),
}

struct PoolState {
    credentials: Vec<CredentialState>,
    cursor: usize,
}

/// Rotating pool of pinning credentials.
///
/// All state lives behind a mutex; no lock is held across an await point.
pub struct CredentialPool {
    min_spacing: Duration,
    state: Mutex<PoolState>,
}

impl CredentialPool {
    /// Create a pool over a fixed, non-empty credential set.
    pub fn new(credentials: Vec<StoreCredential>, min_spacing: Duration) -> Result<Self> {
        if credentials.is_empty() {
            return Err(StorygateError::Config(
                "credential pool requires at least one credential".to_string(),
            ));
        }

        let credentials = credentials
            .into_iter()
            .map(|credential| CredentialState {
                credential,
                last_used_at: None,
                blocked_until: None,
            })
            .collect();

        Ok(Self {
            min_spacing,
            state: Mutex::new(PoolState {
                credentials,
                cursor: 0,
            }),
        })
    }

    /// Number of configured credentials.
    pub fn len(&self) -> usize {
        self.lock().credentials.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Select the next usable credential, or report how long to wait.
    ///
    /// Scans in round-robin order starting from the rotation cursor.
    /// Blocked or too-recently-used credentials are skipped, advancing the
    /// cursor each time; a successful selection also advances the cursor
    /// past the chosen credential so consecutive acquisitions visit the
    /// whole set before repeating.
    pub fn acquire(&self) -> Acquire {
        let now = Instant::now();
        let mut state = self.lock();
        let count = state.credentials.len();

        for _ in 0..count {
            let idx = state.cursor % count;
            if state.credentials[idx].is_usable(now, self.min_spacing) {
                state.cursor = (idx + 1) % count;
                return Acquire::Ready(state.credentials[idx].credential.clone());
            }
            state.cursor = (idx + 1) % count;
        }

        // Full pass found nothing: report the shortest wait until any
        // credential becomes usable again.
        let earliest = state
            .credentials
            .iter()
            .map(|c| c.usable_at(self.min_spacing))
            .min()
            .unwrap_or(now);

        Acquire::WaitFor(earliest.saturating_duration_since(now))
    }

    /// Acquire a credential, sleeping through wait windows.
    pub async fn acquire_ready(&self) -> StoreCredential {
        loop {
            match self.acquire() {
                Acquire::Ready(credential) => return credential,
                Acquire::WaitFor(wait) => {
                    let wait = wait.max(Duration::from_millis(1));
                    debug!(wait_ms = wait.as_millis() as u64, "All credentials cooling down");
                    tokio::time::sleep(wait).await;
                }
            }
        }
    }

    /// Record that a credential was just presented to the store.
    pub fn mark_used(&self, credential: &StoreCredential) {
        let mut state = self.lock();
        if let Some(entry) = state
            .credentials
            .iter_mut()
            .find(|c| c.credential.name == credential.name)
        {
            entry.last_used_at = Some(Instant::now());
        }
    }

    /// Block a credential for `duration` after a rate-limit signal.
    ///
    /// An already-blocked credential only ever has its block extended,
    /// never shortened. The rotation cursor is advanced past the blocked
    /// credential so the next acquisition does not land on it.
    pub fn mark_blocked(&self, credential: &StoreCredential, duration: Duration) {
        let until = Instant::now() + duration;
        let mut state = self.lock();
        let count = state.credentials.len();
        if let Some(idx) = state
            .credentials
            .iter()
            .position(|c| c.credential.name == credential.name)
        {
            let entry = &mut state.credentials[idx];
            entry.blocked_until = Some(entry.blocked_until.map_or(until, |t| t.max(until)));
            if state.cursor % count == idx {
                state.cursor = (idx + 1) % count;
            }
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, PoolState> {
        match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn credential(name: &str) -> StoreCredential {
        StoreCredential {
            name: name.to_string(),
            api_key: format!("{name}-key"),
            api_secret: format!("{name}-secret"),
            bearer_token: format!("{name}-jwt"),
        }
    }

    fn pool(names: &[&str], min_spacing: Duration) -> CredentialPool {
        CredentialPool::new(names.iter().map(|n| credential(n)).collect(), min_spacing)
            .expect("non-empty pool")
    }

    fn acquire_name(pool: &CredentialPool) -> String {
        match pool.acquire() {
            Acquire::Ready(c) => c.name,
            Acquire::WaitFor(d) => panic!("expected a usable credential, got wait {d:?}"),
        }
    }

    #[test]
    fn rejects_empty_set() {
        assert!(CredentialPool::new(Vec::new(), Duration::ZERO).is_err());
    }

    #[test]
    fn round_robin_visits_every_credential_before_repeating() {
        let pool = pool(&["a", "b", "c"], Duration::ZERO);

        let mut seen = Vec::new();
        for _ in 0..6 {
            let name = acquire_name(&pool);
            let cred = credential(&name);
            pool.mark_used(&cred);
            seen.push(name);
        }

        assert_eq!(seen, vec!["a", "b", "c", "a", "b", "c"]);
    }

    #[tokio::test(start_paused = true)]
    async fn blocked_credential_is_skipped_until_expiry() {
        let pool = pool(&["a", "b"], Duration::ZERO);
        pool.mark_blocked(&credential("a"), Duration::from_secs(60));

        // Only "b" is selectable while "a" cools down.
        assert_eq!(acquire_name(&pool), "b");
        assert_eq!(acquire_name(&pool), "b");

        tokio::time::advance(Duration::from_secs(61)).await;
        let names = [acquire_name(&pool), acquire_name(&pool)];
        assert!(names.contains(&"a".to_string()));
    }

    #[tokio::test(start_paused = true)]
    async fn block_durations_never_shrink() {
        let pool = pool(&["a", "b"], Duration::ZERO);
        pool.mark_blocked(&credential("a"), Duration::from_secs(100));
        pool.mark_blocked(&credential("a"), Duration::from_secs(10));

        tokio::time::advance(Duration::from_secs(50)).await;
        assert_eq!(acquire_name(&pool), "b");
        assert_eq!(acquire_name(&pool), "b");
    }

    #[tokio::test(start_paused = true)]
    async fn wait_duration_is_minimum_over_blocked_credentials() {
        let pool = pool(&["a", "b"], Duration::ZERO);
        pool.mark_blocked(&credential("a"), Duration::from_secs(100));
        pool.mark_blocked(&credential("b"), Duration::from_secs(50));

        match pool.acquire() {
            Acquire::WaitFor(wait) => assert_eq!(wait, Duration::from_secs(50)),
            Acquire::Ready(c) => panic!("expected a wait, got credential {}", c.name),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn spacing_excludes_recently_used_credentials() {
        let pool = pool(&["a"], Duration::from_secs(2));
        let cred = match pool.acquire() {
            Acquire::Ready(c) => c,
            Acquire::WaitFor(d) => panic!("fresh credential should be usable, got wait {d:?}"),
        };
        pool.mark_used(&cred);

        match pool.acquire() {
            Acquire::WaitFor(wait) => assert!(wait <= Duration::from_secs(2) && !wait.is_zero()),
            Acquire::Ready(c) => panic!("expected spacing wait, got credential {}", c.name),
        }

        tokio::time::advance(Duration::from_secs(3)).await;
        assert_eq!(acquire_name(&pool), "a");
    }

    #[tokio::test(start_paused = true)]
    async fn acquire_ready_sleeps_through_cooldowns() {
        let pool = pool(&["a"], Duration::ZERO);
        pool.mark_blocked(&credential("a"), Duration::from_secs(30));

        let before = Instant::now();
        let cred = pool.acquire_ready().await;
        assert_eq!(cred.name, "a");
        assert!(Instant::now() - before >= Duration::from_secs(30));
    }
}
