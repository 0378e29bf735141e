//! Credit Transaction Log
//!
//! Append-only audit trail for every ledger mutation. Entries are immutable
//! once written except for the `Pending -> Completed | Failed` status
//! transition.

use mess_common::{MessId, PlanId, TransactionId};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use chrono::{DateTime, Utc};
use thiserror::Error;
use uuid::Uuid;

/// Kind of ledger movement the entry records
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TransactionType {
    /// Credits bought through a purchase plan
    Purchase,
    /// Credits consumed by a billing event (campaign activation)
    Deduction,
    /// Promotional or plan bonus credits
    Bonus,
    /// Credits returned to the mess
    Refund,
    /// Manual admin correction
    Adjustment,
    /// Trial grant
    Trial,
}

/// Entry status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TransactionStatus {
    /// Awaiting settlement confirmation
    Pending,
    /// Settled; entry is frozen
    Completed,
    /// Settlement failed; entry is frozen
    Failed,
}

/// Immutable log entry for one ledger movement
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreditTransaction {
    /// Entry id
    pub id: TransactionId,
    /// Mess whose ledger moved
    pub mess_id: MessId,
    /// Movement kind
    pub tx_type: TransactionType,
    /// Signed credit delta: positive for grants, negative for consumption
    pub amount: i64,
    /// Human-readable description
    pub description: String,
    /// Purchase plan behind a `Purchase` entry
    pub plan_id: Option<PlanId>,
    /// Billing period start for periodic deductions
    pub period_start: Option<DateTime<Utc>>,
    /// Billing period end for periodic deductions
    pub period_end: Option<DateTime<Utc>>,
    /// Settlement status
    pub status: TransactionStatus,
    /// Creation time
    pub created_at: DateTime<Utc>,
}

/// Transaction log errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransactionError {
    /// Entry id unknown
    #[error("credit transaction not found")]
    NotFound,
    /// Completed/Failed entries cannot change status again
    #[error("credit transaction already finalized")]
    AlreadyFinal,
}

/// Append-only transaction log
pub struct TransactionLog {
    entries: Arc<RwLock<Vec<CreditTransaction>>>,
}

impl TransactionLog {
    pub fn new() -> Self {
        Self {
            entries: Arc::new(RwLock::new(Vec::new())),
        }
    }

    fn push(&self, tx: CreditTransaction) -> CreditTransaction {
        tracing::debug!(tx_id = %tx.id, mess_id = %tx.mess_id, ?tx.tx_type, tx.amount, "transaction appended");
        self.entries.write().push(tx.clone());
        tx
    }

    /// Record a completed credit purchase
    pub fn record_purchase(
        &self,
        mess_id: MessId,
        plan_id: PlanId,
        credits: u64,
        description: impl Into<String>,
    ) -> CreditTransaction {
        self.push(CreditTransaction {
            id: Uuid::new_v4(),
            mess_id,
            tx_type: TransactionType::Purchase,
            amount: credits as i64,
            description: description.into(),
            plan_id: Some(plan_id),
            period_start: None,
            period_end: None,
            status: TransactionStatus::Completed,
            created_at: Utc::now(),
        })
    }

    /// Record a completed billing deduction
    pub fn record_billing(
        &self,
        mess_id: MessId,
        credits: u64,
        description: impl Into<String>,
        period: Option<(DateTime<Utc>, DateTime<Utc>)>,
    ) -> CreditTransaction {
        self.push(CreditTransaction {
            id: Uuid::new_v4(),
            mess_id,
            tx_type: TransactionType::Deduction,
            amount: -(credits as i64),
            description: description.into(),
            plan_id: None,
            period_start: period.map(|(s, _)| s),
            period_end: period.map(|(_, e)| e),
            status: TransactionStatus::Completed,
            created_at: Utc::now(),
        })
    }

    /// Record a grant that is not a purchase: bonus, refund, adjustment, trial
    pub fn record_grant(
        &self,
        mess_id: MessId,
        tx_type: TransactionType,
        amount: i64,
        description: impl Into<String>,
    ) -> CreditTransaction {
        self.push(CreditTransaction {
            id: Uuid::new_v4(),
            mess_id,
            tx_type,
            amount,
            description: description.into(),
            plan_id: None,
            period_start: None,
            period_end: None,
            status: TransactionStatus::Completed,
            created_at: Utc::now(),
        })
    }

    /// Append a pending entry awaiting settlement
    pub fn record_pending(
        &self,
        mess_id: MessId,
        tx_type: TransactionType,
        amount: i64,
        description: impl Into<String>,
    ) -> CreditTransaction {
        self.push(CreditTransaction {
            id: Uuid::new_v4(),
            mess_id,
            tx_type,
            amount,
            description: description.into(),
            plan_id: None,
            period_start: None,
            period_end: None,
            status: TransactionStatus::Pending,
            created_at: Utc::now(),
        })
    }

    /// Settle a pending entry. Completed/Failed entries are frozen.
    pub fn settle(
        &self,
        id: TransactionId,
        status: TransactionStatus,
    ) -> Result<CreditTransaction, TransactionError> {
        let mut entries = self.entries.write();
        let tx = entries
            .iter_mut()
            .find(|t| t.id == id)
            .ok_or(TransactionError::NotFound)?;
        if tx.status != TransactionStatus::Pending {
            return Err(TransactionError::AlreadyFinal);
        }
        tx.status = status;
        Ok(tx.clone())
    }

    /// Entries for a mess, newest first
    pub fn for_mess(&self, mess_id: MessId) -> Vec<CreditTransaction> {
        let mut txs: Vec<_> = self
            .entries
            .read()
            .iter()
            .filter(|t| t.mess_id == mess_id)
            .cloned()
            .collect();
        txs.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        txs
    }

    /// Net signed delta of all completed entries for a mess
    pub fn balance_delta(&self, mess_id: MessId) -> i64 {
        self.entries
            .read()
            .iter()
            .filter(|t| t.mess_id == mess_id && t.status == TransactionStatus::Completed)
            .map(|t| t.amount)
            .sum()
    }
}

impl Default for TransactionLog {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_purchase_and_billing_are_completed() {
        let log = TransactionLog::new();
        let mess = Uuid::new_v4();
        let plan = Uuid::new_v4();
        let p = log.record_purchase(mess, plan, 500, "Starter pack");
        assert_eq!(p.status, TransactionStatus::Completed);
        assert_eq!(p.amount, 500);
        let b = log.record_billing(mess, 120, "Campaign activation", None);
        assert_eq!(b.status, TransactionStatus::Completed);
        assert_eq!(b.amount, -120);
        assert_eq!(log.balance_delta(mess), 380);
    }

    #[test]
    fn test_settle_only_pending() {
        let log = TransactionLog::new();
        let mess = Uuid::new_v4();
        let tx = log.record_pending(mess, TransactionType::Refund, 50, "Refund on appeal");
        log.settle(tx.id, TransactionStatus::Completed).unwrap();
        assert_eq!(
            log.settle(tx.id, TransactionStatus::Failed),
            Err(TransactionError::AlreadyFinal)
        );
    }

    #[test]
    fn test_for_mess_newest_first() {
        let log = TransactionLog::new();
        let mess = Uuid::new_v4();
        let other = Uuid::new_v4();
        log.record_grant(mess, TransactionType::Bonus, 10, "early signup");
        log.record_grant(other, TransactionType::Bonus, 99, "other tenant");
        log.record_billing(mess, 5, "small run", None);
        let txs = log.for_mess(mess);
        assert_eq!(txs.len(), 2);
        assert!(txs[0].created_at >= txs[1].created_at);
        assert!(txs.iter().all(|t| t.mess_id == mess));
    }

    #[test]
    fn test_pending_excluded_from_delta() {
        let log = TransactionLog::new();
        let mess = Uuid::new_v4();
        log.record_grant(mess, TransactionType::Trial, 100, "trial grant");
        log.record_pending(mess, TransactionType::Refund, 40, "disputed");
        assert_eq!(log.balance_delta(mess), 100);
    }
}
