//! Ad Campaign Lifecycle
//!
//! State machine: Draft -> PendingApproval -> Active -> {Paused, Completed,
//! Rejected}. The per-user credit cost is resolved through the slab table at
//! creation and frozen into the campaign; later slab edits do not reprice an
//! existing campaign. Credit deduction happens at the transition into
//! Active and is coordinated by the platform façade, not here.

use mess_common::{CampaignId, MessId, UserId, ValidationError};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use chrono::{DateTime, Utc};
use thiserror::Error;
use uuid::Uuid;

/// What the campaign delivers to its audience
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CampaignType {
    /// A promoted card in the discovery feed
    AdCard,
    /// A direct message pushed to each targeted user
    DirectMessage,
}

/// Campaign lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CampaignStatus {
    /// Being edited by the mess owner
    Draft,
    /// Submitted, awaiting admin decision
    PendingApproval,
    /// Running inside its date window
    Active,
    /// Temporarily halted by the owner
    Paused,
    /// Date window closed
    Completed,
    /// Refused by an admin
    Rejected,
}

/// Audience selection evaluated by the user/membership collections
/// (an external collaborator behind [`AudienceDirectory`])
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AudienceFilter {
    /// Delivery areas to include; empty means all areas
    pub areas: Vec<String>,
    /// Meal-plan names to include; empty means all plans
    pub meal_plans: Vec<String>,
    /// Whether lapsed members are targeted too
    pub include_inactive: bool,
}

/// Seam to the user/membership store: sizes an audience for a filter
pub trait AudienceDirectory: Send + Sync {
    /// Number of users matching the filter
    fn count_matching(&self, filter: &AudienceFilter) -> u64;
}

/// Aggregate delivery counters kept on the campaign
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CampaignStats {
    /// Unique impressions
    pub impressions: u64,
    /// Unique clicks
    pub clicks: u64,
    /// Direct messages delivered
    pub messages_sent: u64,
}

/// An advertising unit owned by one mess
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdCampaign {
    /// Campaign id
    pub id: CampaignId,
    /// Owning mess
    pub mess_id: MessId,
    /// Delivery kind
    pub campaign_type: CampaignType,
    /// Headline
    pub title: String,
    /// Body copy
    pub body: String,
    /// Optional creative, stored out of process
    pub image_url: Option<String>,
    /// Audience selection
    pub audience: AudienceFilter,
    /// Audience size at creation time
    pub target_user_count: u64,
    /// Per-user cost frozen from the slab table at creation
    pub credit_cost_per_user: u64,
    /// `target_user_count * credit_cost_per_user`
    pub credits_required: u64,
    /// Credits actually deducted (set at activation)
    pub credits_used: u64,
    /// Stored lifecycle state; read through [`AdCampaign::effective_status`]
    pub status: CampaignStatus,
    /// Window start
    pub start_date: DateTime<Utc>,
    /// Window end
    pub end_date: DateTime<Utc>,
    /// Admin who approved
    pub approved_by: Option<UserId>,
    /// Approval time
    pub approved_at: Option<DateTime<Utc>>,
    /// Reason recorded on rejection
    pub rejection_reason: Option<String>,
    /// Delivery counters
    pub stats: CampaignStats,
    /// Creation time
    pub created_at: DateTime<Utc>,
    /// Last mutation time
    pub updated_at: DateTime<Utc>,
}

impl AdCampaign {
    /// Lifecycle state with the date window applied lazily: an Active
    /// campaign past its `end_date` reads as Completed even before the
    /// sweep persists the transition.
    pub fn effective_status(&self, now: DateTime<Utc>) -> CampaignStatus {
        if self.status == CampaignStatus::Active && now > self.end_date {
            CampaignStatus::Completed
        } else {
            self.status
        }
    }
}

/// Campaign lifecycle errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CampaignError {
    /// Campaign id unknown
    #[error("campaign not found")]
    NotFound,
    /// The requested state change is not a legal transition
    #[error("invalid campaign transition: {from:?} -> {to:?}")]
    InvalidTransition {
        /// Current state
        from: CampaignStatus,
        /// Requested state
        to: CampaignStatus,
    },
    /// Field-level constraint violation
    #[error(transparent)]
    Validation(#[from] ValidationError),
}

/// Parameters for a new draft campaign
#[derive(Debug, Clone)]
pub struct CampaignDraft {
    /// Delivery kind
    pub campaign_type: CampaignType,
    /// Headline
    pub title: String,
    /// Body copy
    pub body: String,
    /// Optional creative URL
    pub image_url: Option<String>,
    /// Audience selection
    pub audience: AudienceFilter,
    /// Window start
    pub start_date: DateTime<Utc>,
    /// Window end
    pub end_date: DateTime<Utc>,
}

/// Campaign store and state machine
pub struct CampaignManager {
    campaigns: Arc<RwLock<HashMap<CampaignId, AdCampaign>>>,
}

impl CampaignManager {
    pub fn new() -> Self {
        Self {
            campaigns: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Insert a draft. Audience sizing and slab resolution have already
    /// happened; this only validates content and the date window.
    pub fn create(
        &self,
        mess_id: MessId,
        draft: CampaignDraft,
        target_user_count: u64,
        credit_cost_per_user: u64,
    ) -> Result<AdCampaign, CampaignError> {
        if draft.title.trim().is_empty() {
            return Err(ValidationError::new("title", "must not be empty").into());
        }
        if draft.end_date <= draft.start_date {
            return Err(ValidationError::new("end_date", "must be after start_date").into());
        }
        if target_user_count == 0 {
            return Err(ValidationError::new("audience", "matches no users").into());
        }
        let credits_required = target_user_count
            .checked_mul(credit_cost_per_user)
            .ok_or_else(|| ValidationError::new("audience", "credit cost overflows"))?;
        let now = Utc::now();
        let campaign = AdCampaign {
            id: Uuid::new_v4(),
            mess_id,
            campaign_type: draft.campaign_type,
            title: draft.title,
            body: draft.body,
            image_url: draft.image_url,
            audience: draft.audience,
            target_user_count,
            credit_cost_per_user,
            credits_required,
            credits_used: 0,
            status: CampaignStatus::Draft,
            start_date: draft.start_date,
            end_date: draft.end_date,
            approved_by: None,
            approved_at: None,
            rejection_reason: None,
            stats: CampaignStats::default(),
            created_at: now,
            updated_at: now,
        };
        self.campaigns.write().insert(campaign.id, campaign.clone());
        tracing::info!(campaign_id = %campaign.id, %mess_id, credits_required = campaign.credits_required, "campaign drafted");
        Ok(campaign)
    }

    /// Get by id
    pub fn get(&self, id: CampaignId) -> Result<AdCampaign, CampaignError> {
        self.campaigns
            .read()
            .get(&id)
            .cloned()
            .ok_or(CampaignError::NotFound)
    }

    /// Campaigns of a mess, newest first
    pub fn for_mess(&self, mess_id: MessId) -> Vec<AdCampaign> {
        let mut campaigns: Vec<_> = self
            .campaigns
            .read()
            .values()
            .filter(|c| c.mess_id == mess_id)
            .cloned()
            .collect();
        campaigns.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        campaigns
    }

    /// Number of campaigns of a mess currently readable as Active
    pub fn active_count(&self, mess_id: MessId, now: DateTime<Utc>) -> u32 {
        self.campaigns
            .read()
            .values()
            .filter(|c| c.mess_id == mess_id && c.effective_status(now) == CampaignStatus::Active)
            .count() as u32
    }

    fn transition(
        &self,
        id: CampaignId,
        allowed_from: &[CampaignStatus],
        to: CampaignStatus,
        mutate: impl FnOnce(&mut AdCampaign),
    ) -> Result<AdCampaign, CampaignError> {
        let mut campaigns = self.campaigns.write();
        let campaign = campaigns.get_mut(&id).ok_or(CampaignError::NotFound)?;
        if !allowed_from.contains(&campaign.status) {
            return Err(CampaignError::InvalidTransition {
                from: campaign.status,
                to,
            });
        }
        campaign.status = to;
        mutate(campaign);
        campaign.updated_at = Utc::now();
        tracing::info!(campaign_id = %id, status = ?to, "campaign transition");
        Ok(campaign.clone())
    }

    /// Draft -> PendingApproval
    pub fn submit_for_approval(&self, id: CampaignId) -> Result<AdCampaign, CampaignError> {
        self.transition(id, &[CampaignStatus::Draft], CampaignStatus::PendingApproval, |_| {})
    }

    /// `allowed_from` -> Active. The direct-submit path activates from
    /// Draft; admin approval activates only from PendingApproval. Credits
    /// have been deducted by the caller before this is invoked.
    pub fn activate(
        &self,
        id: CampaignId,
        approved_by: Option<UserId>,
        allowed_from: CampaignStatus,
    ) -> Result<AdCampaign, CampaignError> {
        self.transition(
            id,
            &[allowed_from],
            CampaignStatus::Active,
            |c| {
                c.credits_used = c.credits_required;
                if approved_by.is_some() {
                    c.approved_by = approved_by;
                    c.approved_at = Some(Utc::now());
                }
            },
        )
    }

    /// PendingApproval -> Rejected
    pub fn reject(&self, id: CampaignId, reason: impl Into<String>) -> Result<AdCampaign, CampaignError> {
        let reason = reason.into();
        self.transition(id, &[CampaignStatus::PendingApproval], CampaignStatus::Rejected, |c| {
            c.rejection_reason = Some(reason);
        })
    }

    /// Active -> Paused
    pub fn pause(&self, id: CampaignId) -> Result<AdCampaign, CampaignError> {
        self.transition(id, &[CampaignStatus::Active], CampaignStatus::Paused, |_| {})
    }

    /// Paused -> Active, no re-deduction
    pub fn resume(&self, id: CampaignId) -> Result<AdCampaign, CampaignError> {
        self.transition(id, &[CampaignStatus::Paused], CampaignStatus::Active, |_| {})
    }

    /// Persist Completed for every Active campaign whose window has closed.
    /// Reads stay correct without this through `effective_status`; the sweep
    /// is for callers that want the stored status trustworthy.
    pub fn close_expired(&self, now: DateTime<Utc>) -> usize {
        let mut campaigns = self.campaigns.write();
        let mut closed = 0;
        for campaign in campaigns.values_mut() {
            if campaign.status == CampaignStatus::Active && now > campaign.end_date {
                campaign.status = CampaignStatus::Completed;
                campaign.updated_at = now;
                closed += 1;
            }
        }
        if closed > 0 {
            tracing::info!(closed, "expired campaigns completed");
        }
        closed
    }

    /// Bump an aggregate counter after a deduplicated analytics event
    pub(crate) fn bump_stat(
        &self,
        id: CampaignId,
        bump: impl FnOnce(&mut CampaignStats),
    ) -> Result<(), CampaignError> {
        let mut campaigns = self.campaigns.write();
        let campaign = campaigns.get_mut(&id).ok_or(CampaignError::NotFound)?;
        bump(&mut campaign.stats);
        Ok(())
    }
}

impl Default for CampaignManager {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn draft() -> CampaignDraft {
        CampaignDraft {
            campaign_type: CampaignType::AdCard,
            title: "Iftar special".into(),
            body: "Half price first week".into(),
            image_url: None,
            audience: AudienceFilter::default(),
            start_date: Utc::now(),
            end_date: Utc::now() + Duration::days(7),
        }
    }

    #[test]
    fn test_create_freezes_cost() {
        let mgr = CampaignManager::new();
        let c = mgr.create(Uuid::new_v4(), draft(), 40, 10).unwrap();
        assert_eq!(c.status, CampaignStatus::Draft);
        assert_eq!(c.credit_cost_per_user, 10);
        assert_eq!(c.credits_required, 400);
        assert_eq!(c.credits_used, 0);
    }

    #[test]
    fn test_empty_audience_refused() {
        let mgr = CampaignManager::new();
        assert!(matches!(
            mgr.create(Uuid::new_v4(), draft(), 0, 10),
            Err(CampaignError::Validation(_))
        ));
    }

    #[test]
    fn test_approval_path() {
        let mgr = CampaignManager::new();
        let admin = Uuid::new_v4();
        let c = mgr.create(Uuid::new_v4(), draft(), 10, 10).unwrap();
        mgr.submit_for_approval(c.id).unwrap();
        let active = mgr
            .activate(c.id, Some(admin), CampaignStatus::PendingApproval)
            .unwrap();
        assert_eq!(active.status, CampaignStatus::Active);
        assert_eq!(active.approved_by, Some(admin));
        assert!(active.approved_at.is_some());
        assert_eq!(active.credits_used, active.credits_required);
    }

    #[test]
    fn test_activate_respects_allowed_source_state() {
        let mgr = CampaignManager::new();
        let c = mgr.create(Uuid::new_v4(), draft(), 10, 10).unwrap();
        // A Draft cannot be activated through the approval source state.
        assert_eq!(
            mgr.activate(c.id, Some(Uuid::new_v4()), CampaignStatus::PendingApproval),
            Err(CampaignError::InvalidTransition {
                from: CampaignStatus::Draft,
                to: CampaignStatus::Active,
            })
        );
        assert_eq!(mgr.get(c.id).unwrap().status, CampaignStatus::Draft);
    }

    #[test]
    fn test_credit_cost_overflow_refused() {
        let mgr = CampaignManager::new();
        assert!(matches!(
            mgr.create(Uuid::new_v4(), draft(), u64::MAX, 2),
            Err(CampaignError::Validation(_))
        ));
    }

    #[test]
    fn test_rejection_records_reason() {
        let mgr = CampaignManager::new();
        let c = mgr.create(Uuid::new_v4(), draft(), 10, 10).unwrap();
        mgr.submit_for_approval(c.id).unwrap();
        let rejected = mgr.reject(c.id, "misleading pricing").unwrap();
        assert_eq!(rejected.status, CampaignStatus::Rejected);
        assert_eq!(rejected.rejection_reason.as_deref(), Some("misleading pricing"));
    }

    #[test]
    fn test_illegal_transition() {
        let mgr = CampaignManager::new();
        let c = mgr.create(Uuid::new_v4(), draft(), 10, 10).unwrap();
        // Draft cannot be paused.
        assert_eq!(
            mgr.pause(c.id),
            Err(CampaignError::InvalidTransition {
                from: CampaignStatus::Draft,
                to: CampaignStatus::Paused,
            })
        );
        // Draft cannot be rejected either.
        assert!(mgr.reject(c.id, "nope").is_err());
    }

    #[test]
    fn test_pause_resume() {
        let mgr = CampaignManager::new();
        let c = mgr.create(Uuid::new_v4(), draft(), 10, 10).unwrap();
        mgr.activate(c.id, None, CampaignStatus::Draft).unwrap();
        mgr.pause(c.id).unwrap();
        let resumed = mgr.resume(c.id).unwrap();
        assert_eq!(resumed.status, CampaignStatus::Active);
    }

    #[test]
    fn test_lazy_completion_and_sweep() {
        let mgr = CampaignManager::new();
        let c = mgr.create(Uuid::new_v4(), draft(), 10, 10).unwrap();
        mgr.activate(c.id, None, CampaignStatus::Draft).unwrap();

        let after_window = Utc::now() + Duration::days(8);
        let stored = mgr.get(c.id).unwrap();
        assert_eq!(stored.status, CampaignStatus::Active);
        assert_eq!(stored.effective_status(after_window), CampaignStatus::Completed);

        assert_eq!(mgr.close_expired(after_window), 1);
        assert_eq!(mgr.get(c.id).unwrap().status, CampaignStatus::Completed);
        assert_eq!(mgr.close_expired(after_window), 0);
    }

    #[test]
    fn test_active_count_uses_effective_status() {
        let mgr = CampaignManager::new();
        let mess = Uuid::new_v4();
        let c = mgr.create(mess, draft(), 10, 10).unwrap();
        mgr.activate(c.id, None, CampaignStatus::Draft).unwrap();
        assert_eq!(mgr.active_count(mess, Utc::now()), 1);
        assert_eq!(mgr.active_count(mess, Utc::now() + Duration::days(8)), 0);
    }
}
