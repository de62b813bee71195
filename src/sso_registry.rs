// ============================================================================
// SSO Registry - Cross-application single sign-on records
// ============================================================================
//
// Owns every SsoRecord and its association to application sessions.
// One record per live principal; activity on any bound application
// refreshes the whole record. Records are destroyed exclusively by the
// SSO reaper sweep: detaching the last binding leaves the record alive
// for a grace window equal to `max_inactive`, and a purged id is
// permanently invalid — it is never reused or resurrected.
//
// ============================================================================

use std::collections::{HashMap, HashSet};
use std::time::Duration;

use tokio::sync::RwLock;
use vestibule_error::{AppError, AppResult};

use crate::types::{AppId, Principal, SessionId, SsoId};

/// The shared identity binding that lets one login be honored across
/// multiple applications.
#[derive(Clone, Debug)]
pub struct SsoRecord {
    pub sso_id: SsoId,
    pub principal: Principal,
    pub created_at_ms: u64,
    /// Maximum `last_access` observed over all currently-bound
    /// application sessions; monotonically non-decreasing.
    pub last_activity_ms: u64,
    pub max_inactive: Duration,
    /// `(app_id, session_id)` pairs currently associated. May be empty:
    /// the record then survives until its own sweep (grace window).
    pub bindings: HashSet<(AppId, SessionId)>,
}

impl SsoRecord {
    /// Expiry predicate: eligible for purging once `max_inactive` has
    /// fully elapsed without activity from any bound application.
    pub fn is_expired(&self, now_ms: u64) -> bool {
        now_ms.saturating_sub(self.last_activity_ms) > self.max_inactive.as_millis() as u64
    }
}

struct RegistryInner {
    records: HashMap<SsoId, SsoRecord>,
    /// Reuse index. May briefly point at an expired-but-unswept record;
    /// `create_or_reuse` checks liveness at call time, never trusting
    /// the index alone.
    by_principal: HashMap<Principal, SsoId>,
}

/// In-memory store of SSO records.
pub struct SsoRegistry {
    inner: RwLock<RegistryInner>,
    max_inactive: Duration,
}

impl SsoRegistry {
    /// `max_inactive` is the caller's expiration policy, fixed for the
    /// registry's lifetime (configuration is read once at construction).
    pub fn new(max_inactive: Duration) -> Self {
        Self {
            inner: RwLock::new(RegistryInner {
                records: HashMap::new(),
                by_principal: HashMap::new(),
            }),
            max_inactive,
        }
    }

    /// Return the live record for `principal`, or allocate a fresh one.
    ///
    /// Liveness is computed at call time: a principal whose only prior
    /// record has passed its inactivity threshold is treated as absent
    /// even if the reaper has not swept it yet. The stale record stays
    /// in the table for the sweep to collect; the index moves on.
    ///
    /// A bare lookup never refreshes `last_activity` — only `bind` and
    /// `touch` do — so reuse alone cannot extend a record's life.
    pub async fn create_or_reuse(&self, principal: &Principal, now_ms: u64) -> SsoId {
        let mut inner = self.inner.write().await;

        if let Some(existing) = inner.by_principal.get(principal) {
            if let Some(record) = inner.records.get(existing) {
                if !record.is_expired(now_ms) {
                    return record.sso_id.clone();
                }
            }
        }

        let sso_id = SsoId::generate();
        let record = SsoRecord {
            sso_id: sso_id.clone(),
            principal: principal.clone(),
            created_at_ms: now_ms,
            last_activity_ms: now_ms,
            max_inactive: self.max_inactive,
            bindings: HashSet::new(),
        };
        inner.records.insert(sso_id.clone(), record);
        inner
            .by_principal
            .insert(principal.clone(), sso_id.clone());

        vestibule_metrics::SSO_RECORDS_CREATED_TOTAL.inc();
        tracing::info!(sso_id = %sso_id, principal = %principal, "Created SSO record");
        sso_id
    }

    /// Associate an application session with the record and refresh its
    /// activity. Fails with `NotFound` if the id is unknown, already
    /// reclaimed, or past its inactivity threshold.
    pub async fn bind(
        &self,
        sso_id: &SsoId,
        app_id: AppId,
        session_id: SessionId,
        now_ms: u64,
    ) -> AppResult<()> {
        let mut inner = self.inner.write().await;
        let record = match inner.records.get_mut(sso_id) {
            Some(record) if !record.is_expired(now_ms) => record,
            _ => return Err(AppError::NotFound(format!("SSO record {sso_id}"))),
        };

        record.bindings.insert((app_id.clone(), session_id.clone()));
        record.last_activity_ms = record.last_activity_ms.max(now_ms);

        tracing::debug!(
            sso_id = %sso_id,
            app_id = %app_id,
            session_id = %session_id,
            "Bound application session to SSO record"
        );
        Ok(())
    }

    /// Record activity. Returns false if the record is absent, already
    /// reaped, or expired (lazy check) — the caller must treat the id
    /// as invalid and fall back to a full login.
    pub async fn touch(&self, sso_id: &SsoId, now_ms: u64) -> bool {
        let mut inner = self.inner.write().await;
        match inner.records.get_mut(sso_id) {
            Some(record) if !record.is_expired(now_ms) => {
                record.last_activity_ms = record.last_activity_ms.max(now_ms);
                true
            }
            _ => false,
        }
    }

    pub async fn get(&self, sso_id: &SsoId) -> Option<SsoRecord> {
        self.inner.read().await.records.get(sso_id).cloned()
    }

    /// Remove one binding. Never destroys the record, even when the
    /// binding set becomes empty — destruction is exclusively the
    /// reaper's job, which gives the record a grace window of
    /// `max_inactive` instead of collapsing instantly. Removing an
    /// absent binding or record is an idempotent no-op.
    pub async fn detach(&self, sso_id: &SsoId, app_id: &AppId, session_id: &SessionId) {
        let mut inner = self.inner.write().await;
        if let Some(record) = inner.records.get_mut(sso_id) {
            record
                .bindings
                .remove(&(app_id.clone(), session_id.clone()));
        }
    }

    /// Purge every record past its inactivity threshold and return the
    /// removed records (with their bindings, so the reaper can clean up
    /// sessions still pointing at them). Removed ids are permanently
    /// invalid.
    ///
    /// Same two-phase shape as the session sweep: snapshot candidates
    /// under the read lock, re-check under the write lock, so a
    /// concurrent touch wins. An expired record may stay visible for at
    /// most `max_inactive + sso_reap_interval` past its true expiry.
    pub async fn sweep_expired(&self, now_ms: u64) -> Vec<SsoRecord> {
        let candidates: Vec<SsoId> = {
            let inner = self.inner.read().await;
            inner
                .records
                .values()
                .filter(|r| r.is_expired(now_ms))
                .map(|r| r.sso_id.clone())
                .collect()
        };

        if candidates.is_empty() {
            return Vec::new();
        }

        let mut removed = Vec::new();
        let mut inner = self.inner.write().await;
        for sso_id in candidates {
            if inner
                .records
                .get(&sso_id)
                .is_some_and(|r| r.is_expired(now_ms))
            {
                let Some(record) = inner.records.remove(&sso_id) else {
                    continue;
                };
                // The principal may already have been re-issued a fresh
                // record after this one lazily expired; only clear the
                // index if it still points at the record being purged.
                if inner.by_principal.get(&record.principal) == Some(&record.sso_id) {
                    inner.by_principal.remove(&record.principal);
                }
                removed.push(record);
            }
        }
        removed
    }

    pub async fn count(&self) -> usize {
        self.inner.read().await.records.len()
    }

    /// Copy of every live record, for monitoring and consistency checks.
    pub async fn snapshot(&self) -> Vec<SsoRecord> {
        self.inner.read().await.records.values().cloned().collect()
    }
}
