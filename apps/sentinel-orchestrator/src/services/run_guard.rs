use dashmap::DashMap;
use tokio_util::sync::CancellationToken;

/// Enforces "exactly one run per `(tenant, connector)` in `running` at a
/// time" (spec §4.7). A second request while one is in flight is rejected
/// with `AlreadyRunning` rather than queued — callers retry later. Each
/// held slot carries a `CancellationToken` so an external caller can ask
/// an in-flight run to stop cooperatively (spec §4.4 step 7, scenario S6).
#[derive(Default)]
pub struct RunGuard {
    running: DashMap<(String, String), CancellationToken>,
}

/// Dropping this releases the guard even if the holder panics or returns
/// early, so a run can never wedge a `(tenant, connector)` pair permanently.
pub struct RunPermit<'a> {
    guard: &'a RunGuard,
    key: (String, String),
    pub cancel_token: CancellationToken,
}

impl RunGuard {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn try_acquire(&self, tenant_id: &str, connector_name: &str) -> Option<RunPermit<'_>> {
        let key = (tenant_id.to_string(), connector_name.to_string());
        let cancel_token = CancellationToken::new();
        match self.running.entry(key.clone()) {
            dashmap::mapref::entry::Entry::Occupied(_) => None,
            dashmap::mapref::entry::Entry::Vacant(slot) => {
                slot.insert(cancel_token.clone());
                Some(RunPermit {
                    guard: self,
                    key,
                    cancel_token,
                })
            }
        }
    }

    pub fn is_running(&self, tenant_id: &str, connector_name: &str) -> bool {
        self.running
            .contains_key(&(tenant_id.to_string(), connector_name.to_string()))
    }

    /// Signals cancellation to whoever holds the permit for this pair.
    /// Returns `false` if no run is currently in flight for it.
    pub fn cancel(&self, tenant_id: &str, connector_name: &str) -> bool {
        match self
            .running
            .get(&(tenant_id.to_string(), connector_name.to_string()))
        {
            Some(token) => {
                token.cancel();
                true
            }
            None => false,
        }
    }
}

impl Drop for RunPermit<'_> {
    fn drop(&mut self) {
        self.guard.running.remove(&self.key);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn second_acquire_for_same_pair_is_rejected() {
        let guard = RunGuard::new();
        let first = guard.try_acquire("tenant-a", "aws").unwrap();
        assert!(guard.try_acquire("tenant-a", "aws").is_none());
        assert!(guard.try_acquire("tenant-a", "okta").is_some());
        drop(first);
        assert!(guard.try_acquire("tenant-a", "aws").is_some());
    }

    #[test]
    fn cancel_triggers_the_held_token_and_is_noop_when_idle() {
        let guard = RunGuard::new();
        assert!(!guard.cancel("tenant-a", "aws"));

        let permit = guard.try_acquire("tenant-a", "aws").unwrap();
        assert!(!permit.cancel_token.is_cancelled());
        assert!(guard.cancel("tenant-a", "aws"));
        assert!(permit.cancel_token.is_cancelled());
    }
}
