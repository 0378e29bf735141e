//! Ad Settings
//!
//! Single global settings record gating the campaign lifecycle.

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use chrono::{DateTime, Utc};

/// Policies applied to every campaign
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdPolicies {
    /// Whether submission routes through admin approval
    pub require_approval: bool,
    /// Cap on simultaneously active campaigns per mess
    pub max_active_campaigns: u32,
    /// Minimum campaign window length in days
    pub min_campaign_days: i64,
    /// Maximum campaign window length in days
    pub max_campaign_days: i64,
}

impl Default for AdPolicies {
    fn default() -> Self {
        Self {
            require_approval: true,
            max_active_campaigns: 3,
            min_campaign_days: 1,
            max_campaign_days: 90,
        }
    }
}

/// Global ad settings record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdSettings {
    /// Lifecycle policies
    pub policies: AdPolicies,
    /// Last admin edit
    pub updated_at: DateTime<Utc>,
}

impl Default for AdSettings {
    fn default() -> Self {
        Self {
            policies: AdPolicies::default(),
            updated_at: Utc::now(),
        }
    }
}

/// Holder for the single global settings record
pub struct SettingsStore {
    settings: Arc<RwLock<AdSettings>>,
}

impl SettingsStore {
    pub fn new() -> Self {
        Self {
            settings: Arc::new(RwLock::new(AdSettings::default())),
        }
    }

    /// Current settings snapshot
    pub fn get(&self) -> AdSettings {
        self.settings.read().clone()
    }

    /// Replace the policies (admin operation)
    pub fn update(&self, policies: AdPolicies) -> AdSettings {
        let mut settings = self.settings.write();
        settings.policies = policies;
        settings.updated_at = Utc::now();
        settings.clone()
    }
}

impl Default for SettingsStore {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_update_replaces_policies() {
        let store = SettingsStore::new();
        assert!(store.get().policies.require_approval);
        store.update(AdPolicies {
            require_approval: false,
            ..AdPolicies::default()
        });
        assert!(!store.get().policies.require_approval);
    }
}
