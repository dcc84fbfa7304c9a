//! # Atomic conditional writes on a sorted set.
//!
//! Concurrent renewals and removals from independent processes must never
//! interleave into a lost update or a record resurrected after its delete, so
//! each operation is a single scripted broker step. Errors surface to the
//! caller untouched; retrying is the caller's concern.

use tracing::trace;

use crate::broker::{BrokerRef, ScoreOp};
use crate::error::BrokerError;

/// Insert-only, update-only and remove operations on a broker sorted set.
#[derive(Clone)]
pub struct AtomicScoreSet {
    broker: BrokerRef,
}

impl AtomicScoreSet {
    pub fn new(broker: BrokerRef) -> Self {
        Self { broker }
    }

    /// Adds `member` with `score` only if it is absent. Returns whether it was inserted.
    pub async fn insert_if_absent(
        &self,
        key: &str,
        member: &str,
        score: i64,
    ) -> Result<bool, BrokerError> {
        let reply = self
            .broker
            .score(key, member, ScoreOp::InsertIfAbsent(score))
            .await?;
        trace!(key, member, score, inserted = reply > 0, "insert_if_absent");
        Ok(reply > 0)
    }

    /// Sets `score` only if `member` exists. Returns whether it was updated.
    pub async fn update_if_present(
        &self,
        key: &str,
        member: &str,
        score: i64,
    ) -> Result<bool, BrokerError> {
        let reply = self
            .broker
            .score(key, member, ScoreOp::UpdateIfPresent(score))
            .await?;
        trace!(key, member, score, updated = reply > 0, "update_if_present");
        Ok(reply > 0)
    }

    /// Removes `member`. Returns how many members were removed (0 or 1).
    pub async fn remove_member(&self, key: &str, member: &str) -> Result<u64, BrokerError> {
        let reply = self.broker.score(key, member, ScoreOp::Remove).await?;
        trace!(key, member, removed = reply, "remove_member");
        Ok(u64::try_from(reply).unwrap_or(0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::broker::MemoryBroker;
    use std::sync::Arc;

    fn set() -> (Arc<MemoryBroker>, AtomicScoreSet) {
        let broker = Arc::new(MemoryBroker::new());
        (broker.clone(), AtomicScoreSet::new(broker))
    }

    #[tokio::test]
    async fn test_second_insert_is_noop() {
        let (broker, set) = set();
        assert!(set.insert_if_absent("live", "a", 100).await.unwrap());
        assert!(!set.insert_if_absent("live", "a", 200).await.unwrap());
        assert_eq!(broker.score_of("live", "a"), Some(100));
    }

    #[tokio::test]
    async fn test_update_without_insert_is_noop() {
        let (broker, set) = set();
        assert!(!set.update_if_present("live", "a", 100).await.unwrap());
        assert_eq!(broker.score_of("live", "a"), None);
    }

    #[tokio::test]
    async fn test_update_after_insert_changes_score() {
        let (broker, set) = set();
        set.insert_if_absent("live", "a", 100).await.unwrap();
        assert!(set.update_if_present("live", "a", 105).await.unwrap());
        assert_eq!(broker.score_of("live", "a"), Some(105));
    }

    #[tokio::test]
    async fn test_remove_reports_count() {
        let (_, set) = set();
        set.insert_if_absent("live", "a", 1).await.unwrap();
        assert_eq!(set.remove_member("live", "a").await.unwrap(), 1);
        assert_eq!(set.remove_member("live", "a").await.unwrap(), 0);
        assert!(!set.update_if_present("live", "a", 2).await.unwrap());
    }

    #[tokio::test]
    async fn test_unreachable_broker_surfaces_error() {
        let (broker, set) = set();
        broker.set_reachable(false);
        assert!(matches!(
            set.insert_if_absent("live", "a", 1).await,
            Err(BrokerError::Unavailable(_))
        ));
    }
}
