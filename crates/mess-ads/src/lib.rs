//! SmartMess Ad Platform (SMAP)
//!
//! Credit-funded advertising for mess tenants: tiered credit pricing,
//! a per-tenant credit ledger with an append-only audit log, a campaign
//! lifecycle state machine, and deduplicated delivery analytics.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        AD PLATFORM (SMAP)                               │
//! │                                                                         │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                   CAMPAIGN LIFECYCLE                             │   │
//! │  │   Draft ─► PendingApproval ─► Active ─► Paused/Completed/Rejected│   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! │                                                                         │
//! │  ┌──────────────┐  ┌──────────────┐  ┌──────────────┐  ┌─────────────┐ │
//! │  │ Slab         │  │ Credit       │  │ Transaction  │  │ Purchase    │ │
//! │  │ Resolver     │  │ Ledger       │  │ Log          │  │ Plans       │ │
//! │  └──────────────┘  └──────────────┘  └──────────────┘  └─────────────┘ │
//! │                                                                         │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                 ANALYTICS COUNTERS                               │   │
//! │  │   Impressions | Clicks | Messages — unique per (campaign, user) │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

#![warn(missing_docs)]
#![allow(dead_code)]

pub mod analytics;
pub mod campaigns;
pub mod ledger;
pub mod plans;
pub mod settings;
pub mod slabs;
pub mod transactions;

use std::sync::Arc;
use chrono::Utc;
use thiserror::Error;

use mess_common::{CampaignId, MessId, PlanId, UserId};

pub use analytics::{AdEvent, AnalyticsTracker, EventType};
pub use campaigns::{
    AdCampaign, AudienceDirectory, AudienceFilter, CampaignDraft, CampaignManager,
    CampaignStats, CampaignStatus, CampaignType,
};
pub use ledger::{LedgerManager, LedgerStatus, MessCredits};
pub use plans::{CreditPurchasePlan, PlanCatalog};
pub use settings::{AdPolicies, AdSettings, SettingsStore};
pub use slabs::{CreditSlab, SlabManager};
pub use transactions::{CreditTransaction, TransactionLog, TransactionStatus, TransactionType};

/// Ad platform error types
#[derive(Debug, Error)]
pub enum AdsError {
    /// Slab resolution or slab admin failure
    #[error(transparent)]
    Slab(#[from] slabs::SlabError),
    /// Ledger failure, including refused deductions
    #[error(transparent)]
    Ledger(#[from] ledger::LedgerError),
    /// Transaction log failure
    #[error(transparent)]
    Transaction(#[from] transactions::TransactionError),
    /// Purchase plan failure
    #[error(transparent)]
    Plan(#[from] plans::PlanError),
    /// Campaign lifecycle failure
    #[error(transparent)]
    Campaign(#[from] campaigns::CampaignError),
    /// Activation refused by the active-campaign policy cap
    #[error("active campaign limit reached ({limit})")]
    CampaignLimitReached {
        /// Configured cap
        limit: u32,
    },
}

/// Ad Platform façade
///
/// Owns every manager and coordinates the cross-manager operations:
/// campaign activation deducts from the ledger and appends the billing
/// transaction as one platform step, credit purchases pair the grant with
/// its purchase entry, and analytics increments go through the dedup store
/// before touching campaign counters.
pub struct AdPlatform {
    /// Slab resolver
    pub slabs: Arc<SlabManager>,
    /// Per-tenant credit ledger
    pub ledger: Arc<LedgerManager>,
    /// Append-only transaction log
    pub transactions: Arc<TransactionLog>,
    /// Purchase plan catalog
    pub plans: Arc<PlanCatalog>,
    /// Campaign store and state machine
    pub campaigns: Arc<CampaignManager>,
    /// Deduplicating analytics store
    pub analytics: Arc<AnalyticsTracker>,
    /// Global settings
    pub settings: Arc<SettingsStore>,
    /// Seam to the user/membership collections
    directory: Arc<dyn AudienceDirectory>,
}

impl AdPlatform {
    /// Create a platform over the given audience directory
    pub fn new(directory: Arc<dyn AudienceDirectory>) -> Self {
        Self {
            slabs: Arc::new(SlabManager::new()),
            ledger: Arc::new(LedgerManager::new()),
            transactions: Arc::new(TransactionLog::new()),
            plans: Arc::new(PlanCatalog::new()),
            campaigns: Arc::new(CampaignManager::new()),
            analytics: Arc::new(AnalyticsTracker::new()),
            settings: Arc::new(SettingsStore::new()),
            directory,
        }
    }

    /// Draft a campaign: size the audience, resolve the per-user cost
    /// through the slab table and freeze it into the campaign.
    pub fn create_campaign(
        &self,
        mess_id: MessId,
        draft: CampaignDraft,
    ) -> Result<AdCampaign, AdsError> {
        self.ledger.open(mess_id);
        let policies = self.settings.get().policies;
        let window_days = (draft.end_date - draft.start_date).num_days();
        if window_days < policies.min_campaign_days {
            return Err(campaigns::CampaignError::from(mess_common::ValidationError::new(
                "end_date",
                format!("campaign must run at least {} day(s)", policies.min_campaign_days),
            ))
            .into());
        }
        if window_days > policies.max_campaign_days {
            return Err(campaigns::CampaignError::from(mess_common::ValidationError::new(
                "end_date",
                format!("campaign must not run longer than {} days", policies.max_campaign_days),
            ))
            .into());
        }
        let target_user_count = self.directory.count_matching(&draft.audience);
        let slab = self.slabs.resolve(target_user_count)?;
        let campaign =
            self.campaigns
                .create(mess_id, draft, target_user_count, slab.credits_per_user)?;
        Ok(campaign)
    }

    /// Submit a draft. Routes through admin approval when the policy
    /// requires it, otherwise activates (and bills) immediately.
    pub fn submit_campaign(&self, id: CampaignId) -> Result<AdCampaign, AdsError> {
        if self.settings.get().policies.require_approval {
            Ok(self.campaigns.submit_for_approval(id)?)
        } else {
            self.activate_and_bill(id, None, CampaignStatus::Draft)
        }
    }

    /// Admin approval: PendingApproval -> Active, billing the mess. A
    /// Draft that was never submitted cannot be approved.
    pub fn approve_campaign(&self, id: CampaignId, admin: UserId) -> Result<AdCampaign, AdsError> {
        self.activate_and_bill(id, Some(admin), CampaignStatus::PendingApproval)
    }

    /// Admin rejection with a recorded reason.
    pub fn reject_campaign(
        &self,
        id: CampaignId,
        reason: impl Into<String>,
    ) -> Result<AdCampaign, AdsError> {
        Ok(self.campaigns.reject(id, reason)?)
    }

    /// Deduct the frozen credit cost and move the campaign into Active.
    ///
    /// The ledger decrement is a single compare-and-swap style critical
    /// section, the log append cannot fail, and a transition refused after
    /// the deduction is compensated with a refund entry, so the ledger and
    /// its audit trail move together or not at all.
    fn activate_and_bill(
        &self,
        id: CampaignId,
        admin: Option<UserId>,
        allowed_from: CampaignStatus,
    ) -> Result<AdCampaign, AdsError> {
        let campaign = self.campaigns.get(id)?;
        if campaign.status != allowed_from {
            return Err(campaigns::CampaignError::InvalidTransition {
                from: campaign.status,
                to: CampaignStatus::Active,
            }
            .into());
        }
        let policies = self.settings.get().policies;
        let now = Utc::now();
        // The cap check and the deduction are separate critical sections:
        // two racing submissions can exceed the cap by one. The ledger
        // check itself is atomic and cannot overdraw.
        if self.campaigns.active_count(campaign.mess_id, now) >= policies.max_active_campaigns {
            return Err(AdsError::CampaignLimitReached {
                limit: policies.max_active_campaigns,
            });
        }

        self.ledger
            .deduct_credits(campaign.mess_id, campaign.credits_required)?;
        self.transactions.record_billing(
            campaign.mess_id,
            campaign.credits_required,
            format!("Campaign activation: {}", campaign.title),
            Some((campaign.start_date, campaign.end_date)),
        );

        match self.campaigns.activate(id, admin, allowed_from) {
            Ok(active) => Ok(active),
            Err(err) => {
                // Transition lost a race; compensate the deduction.
                let _ = self
                    .ledger
                    .add_credits(campaign.mess_id, campaign.credits_required);
                self.transactions.record_grant(
                    campaign.mess_id,
                    TransactionType::Refund,
                    campaign.credits_required as i64,
                    format!("Activation rollback: {}", campaign.title),
                );
                Err(err.into())
            }
        }
    }

    /// Apply a confirmed credit purchase: grant the plan's credits and
    /// append the purchase entry. Called by the payment-gateway webhook
    /// handler after confirmation.
    pub fn purchase_credits(
        &self,
        mess_id: MessId,
        plan_id: PlanId,
    ) -> Result<MessCredits, AdsError> {
        let plan = self.plans.get_active(plan_id)?;
        let record = self.ledger.add_credits(mess_id, plan.total_credits())?;
        self.transactions.record_purchase(
            mess_id,
            plan.id,
            plan.total_credits(),
            format!("Credit purchase: {}", plan.name),
        );
        Ok(record)
    }

    /// Open a trial window, optionally seeded with trial credits.
    pub fn grant_trial(
        &self,
        mess_id: MessId,
        days: i64,
        credits: u64,
    ) -> Result<MessCredits, AdsError> {
        let mut record = self.ledger.start_trial(mess_id, days)?;
        if credits > 0 {
            record = self.ledger.add_credits(mess_id, credits)?;
            self.transactions.record_grant(
                mess_id,
                TransactionType::Trial,
                credits as i64,
                format!("{days}-day trial grant"),
            );
        }
        Ok(record)
    }

    /// Count an impression for a (campaign, user) pair. Returns `false` on
    /// a duplicate; the aggregate counter moves only with a new row.
    pub fn record_impression(&self, id: CampaignId, user: UserId) -> Result<bool, AdsError> {
        self.record_event(id, user, EventType::Impression)
    }

    /// Count a click for a (campaign, user) pair.
    pub fn record_click(&self, id: CampaignId, user: UserId) -> Result<bool, AdsError> {
        self.record_event(id, user, EventType::Click)
    }

    /// Count a delivered direct message for a (campaign, user) pair.
    pub fn record_message_sent(&self, id: CampaignId, user: UserId) -> Result<bool, AdsError> {
        self.record_event(id, user, EventType::MessageSent)
    }

    fn record_event(
        &self,
        id: CampaignId,
        user: UserId,
        event_type: EventType,
    ) -> Result<bool, AdsError> {
        // Unknown campaigns are an error, not a silent row.
        self.campaigns.get(id)?;
        let inserted = self.analytics.record(id, user, event_type);
        if inserted {
            self.campaigns.bump_stat(id, |stats| match event_type {
                EventType::Impression => stats.impressions += 1,
                EventType::Click => stats.clicks += 1,
                EventType::MessageSent => stats.messages_sent += 1,
            })?;
        }
        Ok(inserted)
    }

    /// Whether the mess can use paid (advertising) features right now.
    pub fn can_access_paid_features(&self, mess_id: MessId) -> bool {
        self.ledger
            .get(mess_id)
            .map(|record| record.can_access_paid_features())
            .unwrap_or(false)
    }
}
