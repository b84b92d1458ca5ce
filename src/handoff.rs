use crate::chat::ResolvedRequest;
use crate::error::ChatError;
use dashmap::DashMap;
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::Instant;

// Keeps `Instant` arithmetic and the timer wheel's horizon in range.
pub const MAX_HANDOFF_TTL: Duration = Duration::from_secs(24 * 60 * 60);

struct HandoffEntry {
    request: ResolvedRequest,
    expires_at: Instant,
    eviction: Option<JoinHandle<()>>,
}

/// Every entry leaves the map exactly once, through a single atomic
/// removal: either [`HandoffRegistry::redeem`] or the entry's eviction task
/// gets it, and the loser observes absence.
#[derive(Clone)]
pub struct HandoffRegistry {
    entries: Arc<DashMap<String, HandoffEntry>>,
    ttl: Duration,
}

impl HandoffRegistry {
    pub fn new(ttl: Duration) -> Self {
        if ttl > MAX_HANDOFF_TTL {
            tracing::warn!(
                requested_secs = ttl.as_secs(),
                max_secs = MAX_HANDOFF_TTL.as_secs(),
                "handoff ttl clamped"
            );
        }
        Self {
            entries: Arc::new(DashMap::new()),
            ttl: ttl.min(MAX_HANDOFF_TTL),
        }
    }

    pub fn pending(&self) -> usize {
        self.entries.len()
    }

    pub fn register(&self, request: ResolvedRequest) -> String {
        let token = uuid::Uuid::new_v4().to_string();
        let expires_at = Instant::now() + self.ttl;
        self.entries.insert(
            token.clone(),
            HandoffEntry {
                request,
                expires_at,
                eviction: None,
            },
        );

        let handle = tokio::spawn(evict_at(
            Arc::downgrade(&self.entries),
            token.clone(),
            expires_at,
        ));
        // A redeem may already have taken the entry; the task then finds
        // nothing to remove.
        if let Some(mut entry) = self.entries.get_mut(&token) {
            entry.eviction = Some(handle);
        }

        metrics::counter!("chatrelay_handoff_registered_total").increment(1);
        tracing::debug!(
            stream_id = %token,
            ttl_secs = self.ttl.as_secs_f64(),
            "stream handoff registered"
        );
        token
    }

    pub fn redeem(&self, token: &str) -> Result<ResolvedRequest, ChatError> {
        let Some((_, entry)) = self.entries.remove(token) else {
            return Err(ChatError::HandoffNotFound);
        };
        if let Some(handle) = entry.eviction {
            handle.abort();
        }
        if entry.expires_at <= Instant::now() {
            metrics::counter!("chatrelay_handoff_evicted_total").increment(1);
            tracing::debug!(stream_id = %token, "stream handoff expired before redeem");
            return Err(ChatError::HandoffNotFound);
        }
        metrics::counter!("chatrelay_handoff_redeemed_total").increment(1);
        tracing::debug!(stream_id = %token, "stream handoff redeemed");
        Ok(entry.request)
    }
}

async fn evict_at(
    entries: Weak<DashMap<String, HandoffEntry>>,
    token: String,
    expires_at: Instant,
) {
    tokio::time::sleep_until(expires_at).await;
    let Some(entries) = entries.upgrade() else {
        return;
    };
    if entries.remove(&token).is_some() {
        metrics::counter!("chatrelay_handoff_evicted_total").increment(1);
        tracing::debug!(stream_id = %token, "stream handoff evicted unredeemed");
    }
}
