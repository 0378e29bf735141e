//! Ad Analytics Counter
//!
//! One event row per (campaign, user, event type). The map key is the
//! in-memory equivalent of the unique compound index the document store
//! carries, and the entry API makes the row write and the dedup decision
//! one atomic step. Duplicates are a no-op, never an error.

use dashmap::DashMap;
use mess_common::{CampaignId, UserId};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use chrono::{DateTime, Utc};

/// Kind of delivery event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventType {
    /// The ad was shown to the user
    Impression,
    /// The user opened the ad
    Click,
    /// A direct message reached the user
    MessageSent,
}

/// One recorded delivery event
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdEvent {
    /// Campaign the event belongs to
    pub campaign_id: CampaignId,
    /// User the event was counted for
    pub user_id: UserId,
    /// Event kind
    pub event_type: EventType,
    /// First (and only) time the pair was recorded
    pub created_at: DateTime<Utc>,
}

/// Deduplicating event store
pub struct AnalyticsTracker {
    events: Arc<DashMap<(CampaignId, UserId, EventType), AdEvent>>,
}

impl AnalyticsTracker {
    pub fn new() -> Self {
        Self {
            events: Arc::new(DashMap::new()),
        }
    }

    /// Record an event. Returns `true` when the row is new; a repeat of the
    /// same (campaign, user, type) tuple is swallowed and returns `false`.
    pub fn record(&self, campaign_id: CampaignId, user_id: UserId, event_type: EventType) -> bool {
        let key = (campaign_id, user_id, event_type);
        match self.events.entry(key) {
            dashmap::mapref::entry::Entry::Occupied(_) => {
                tracing::debug!(%campaign_id, %user_id, ?event_type, "duplicate analytics event ignored");
                false
            }
            dashmap::mapref::entry::Entry::Vacant(slot) => {
                slot.insert(AdEvent {
                    campaign_id,
                    user_id,
                    event_type,
                    created_at: Utc::now(),
                });
                true
            }
        }
    }

    /// All events of a campaign
    pub fn events_for(&self, campaign_id: CampaignId) -> Vec<AdEvent> {
        self.events
            .iter()
            .filter(|e| e.value().campaign_id == campaign_id)
            .map(|e| e.value().clone())
            .collect()
    }

    /// Unique users counted for a campaign and event kind
    pub fn unique_count(&self, campaign_id: CampaignId, event_type: EventType) -> u64 {
        self.events
            .iter()
            .filter(|e| {
                let v = e.value();
                v.campaign_id == campaign_id && v.event_type == event_type
            })
            .count() as u64
    }
}

impl Default for AnalyticsTracker {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    #[test]
    fn test_duplicate_is_a_noop() {
        let tracker = AnalyticsTracker::new();
        let campaign = Uuid::new_v4();
        let user = Uuid::new_v4();
        assert!(tracker.record(campaign, user, EventType::Impression));
        assert!(!tracker.record(campaign, user, EventType::Impression));
        assert_eq!(tracker.unique_count(campaign, EventType::Impression), 1);
    }

    #[test]
    fn test_event_types_counted_separately() {
        let tracker = AnalyticsTracker::new();
        let campaign = Uuid::new_v4();
        let user = Uuid::new_v4();
        assert!(tracker.record(campaign, user, EventType::Impression));
        assert!(tracker.record(campaign, user, EventType::Click));
        assert_eq!(tracker.unique_count(campaign, EventType::Impression), 1);
        assert_eq!(tracker.unique_count(campaign, EventType::Click), 1);
        assert_eq!(tracker.events_for(campaign).len(), 2);
    }

    #[test]
    fn test_users_counted_independently() {
        let tracker = AnalyticsTracker::new();
        let campaign = Uuid::new_v4();
        for _ in 0..5 {
            assert!(tracker.record(campaign, Uuid::new_v4(), EventType::Impression));
        }
        assert_eq!(tracker.unique_count(campaign, EventType::Impression), 5);
    }

    #[test]
    fn test_concurrent_duplicates_insert_once() {
        let tracker = Arc::new(AnalyticsTracker::new());
        let campaign = Uuid::new_v4();
        let user = Uuid::new_v4();
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let tracker = tracker.clone();
                std::thread::spawn(move || tracker.record(campaign, user, EventType::Impression))
            })
            .collect();
        let inserted = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|new| *new)
            .count();
        assert_eq!(inserted, 1);
        assert_eq!(tracker.unique_count(campaign, EventType::Impression), 1);
    }
}
