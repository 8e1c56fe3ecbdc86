//! Quota Ledger
//!
//! Monthly content and image counters per account. Every increment is a
//! single conditional update ("claim a slot"), so the plan limit holds
//! under concurrent requests. A claim yields a reservation that the caller
//! either commits or releases once the guarded work is known to have
//! succeeded or failed.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;

use crate::config::{PlanLimits, QuotaConfig};
use crate::data::{Database, PlanTier, UsageCounter, UsageCounters};
use crate::error::{AppError, QuotaKind};

/// Usage period key ("YYYY-MM") for an instant
pub fn period_for(at: DateTime<Utc>) -> String {
    at.format("%Y-%m").to_string()
}

/// Usage period key for now
pub fn current_period() -> String {
    period_for(Utc::now())
}

/// Usage of one account in the current period
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccountUsage {
    pub account_id: String,
    pub plan: PlanTier,
    pub limits: PlanLimits,
    pub period: String,
    pub counters: UsageCounters,
}

impl AccountUsage {
    fn limit(&self, kind: QuotaKind) -> i64 {
        match kind {
            QuotaKind::Content => self.limits.content_limit,
            QuotaKind::Image => self.limits.image_limit,
        }
    }

    fn used(&self, kind: QuotaKind) -> i64 {
        match kind {
            QuotaKind::Content => self.counters.content_count,
            QuotaKind::Image => self.counters.image_count,
        }
    }

    /// `None` means unlimited
    pub fn remaining(&self, kind: QuotaKind) -> Option<i64> {
        let limit = self.limit(kind);
        if limit == PlanLimits::UNLIMITED {
            return None;
        }
        Some((limit - self.used(kind)).max(0))
    }

    pub fn has_remaining(&self, kind: QuotaKind) -> bool {
        self.remaining(kind).is_none_or(|remaining| remaining > 0)
    }

    /// Remaining quota after this call's increments, computed optimistically
    pub fn remaining_after(&self, content_used: i64, images_used: i64) -> UsageRemaining {
        let after = |kind: QuotaKind, extra: i64| {
            self.remaining(kind).map(|remaining| (remaining - extra).max(0))
        };
        UsageRemaining {
            content: after(QuotaKind::Content, content_used),
            image: after(QuotaKind::Image, images_used),
        }
    }
}

/// Remaining quota as reported to the caller (`null` = unlimited)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct UsageRemaining {
    pub content: Option<i64>,
    pub image: Option<i64>,
}

/// A claimed slot on one usage counter
#[derive(Debug, PartialEq, Eq)]
#[must_use = "a reservation must be committed or released"]
pub struct QuotaReservation {
    account_id: String,
    period: String,
    counter: UsageCounter,
}

impl QuotaReservation {
    pub fn counter(&self) -> UsageCounter {
        self.counter
    }
}

/// Quota ledger service
pub struct QuotaLedger {
    db: Arc<Database>,
    limits: QuotaConfig,
}

impl QuotaLedger {
    pub fn new(db: Arc<Database>, limits: QuotaConfig) -> Self {
        Self { db, limits }
    }

    pub fn limits_for(&self, plan: PlanTier) -> PlanLimits {
        self.limits.limits_for(plan)
    }

    /// Load the account's plan and counters for the current period
    pub async fn snapshot(&self, account_id: &str) -> Result<AccountUsage, AppError> {
        self.snapshot_for_period(account_id, &current_period()).await
    }

    pub async fn snapshot_for_period(
        &self,
        account_id: &str,
        period: &str,
    ) -> Result<AccountUsage, AppError> {
        let plan = self
            .db
            .get_account(account_id)
            .await?
            .map(|account| account.plan_tier())
            .unwrap_or_default();
        let counters = self.db.get_usage(account_id, period).await?;

        Ok(AccountUsage {
            account_id: account_id.to_string(),
            plan,
            limits: self.limits_for(plan),
            period: period.to_string(),
            counters,
        })
    }

    /// Atomically claim one slot of `kind`
    ///
    /// # Returns
    /// `None` when the plan limit is already reached.
    pub async fn claim(
        &self,
        usage: &AccountUsage,
        kind: QuotaKind,
    ) -> Result<Option<QuotaReservation>, AppError> {
        let limit = match kind {
            QuotaKind::Content => usage.limits.content_limit,
            QuotaKind::Image => usage.limits.image_limit,
        };
        let counter = match kind {
            QuotaKind::Content => UsageCounter::Content,
            QuotaKind::Image => UsageCounter::Image,
        };
        let limit = (limit != PlanLimits::UNLIMITED).then_some(limit);

        self.claim_counter(&usage.account_id, &usage.period, counter, limit)
            .await
    }

    /// Claim one zero-stock AI fallback slot, separate from the image quota
    pub async fn claim_fallback(
        &self,
        usage: &AccountUsage,
        monthly_cap: Option<i64>,
    ) -> Result<Option<QuotaReservation>, AppError> {
        self.claim_counter(
            &usage.account_id,
            &usage.period,
            UsageCounter::Fallback,
            monthly_cap,
        )
        .await
    }

    async fn claim_counter(
        &self,
        account_id: &str,
        period: &str,
        counter: UsageCounter,
        limit: Option<i64>,
    ) -> Result<Option<QuotaReservation>, AppError> {
        let claimed = self
            .db
            .try_increment_usage(account_id, period, counter, limit)
            .await?;
        if !claimed {
            tracing::info!(account_id, counter = counter.column(), ?limit, "Quota slot refused");
            return Ok(None);
        }

        Ok(Some(QuotaReservation {
            account_id: account_id.to_string(),
            period: period.to_string(),
            counter,
        }))
    }

    /// Keep the increment
    pub fn commit(&self, reservation: QuotaReservation) {
        tracing::debug!(
            account_id = %reservation.account_id,
            counter = reservation.counter.column(),
            "Quota reservation committed"
        );
    }

    /// Give the slot back because the guarded work did not happen
    pub async fn release(&self, reservation: QuotaReservation) -> Result<(), AppError> {
        self.db
            .decrement_usage(
                &reservation.account_id,
                &reservation.period,
                reservation.counter,
            )
            .await?;
        tracing::debug!(
            account_id = %reservation.account_id,
            counter = reservation.counter.column(),
            "Quota reservation released"
        );
        Ok(())
    }

    /// Release, logging instead of failing; used on already-failing paths
    pub async fn release_quietly(&self, reservation: QuotaReservation) {
        let counter = reservation.counter.column();
        if let Err(error) = self.release(reservation).await {
            tracing::error!(counter, %error, "Failed to release quota reservation");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use tempfile::TempDir;

    async fn ledger() -> (QuotaLedger, Arc<Database>, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let db = Arc::new(Database::connect(&temp_dir.path().join("quota.db")).await.unwrap());
        (QuotaLedger::new(db.clone(), QuotaConfig::default()), db, temp_dir)
    }

    #[test]
    fn period_is_year_month() {
        let at = Utc.with_ymd_and_hms(2026, 3, 9, 12, 0, 0).unwrap();
        assert_eq!(period_for(at), "2026-03");
    }

    #[tokio::test]
    async fn claims_stop_at_the_limit() {
        let (ledger, db, _temp_dir) = ledger().await;
        db.upsert_account("acct-1", PlanTier::Free).await.unwrap();

        let usage = ledger.snapshot_for_period("acct-1", "2026-10").await.unwrap();
        assert_eq!(usage.remaining(QuotaKind::Image), Some(3));

        for _ in 0..3 {
            let reservation = ledger.claim(&usage, QuotaKind::Image).await.unwrap();
            ledger.commit(reservation.expect("slot available"));
        }
        assert!(ledger.claim(&usage, QuotaKind::Image).await.unwrap().is_none());

        let usage = ledger.snapshot_for_period("acct-1", "2026-10").await.unwrap();
        assert_eq!(usage.remaining(QuotaKind::Image), Some(0));
        assert!(!usage.has_remaining(QuotaKind::Image));
        assert!(usage.has_remaining(QuotaKind::Content));
    }

    #[tokio::test]
    async fn release_returns_the_slot() {
        let (ledger, db, _temp_dir) = ledger().await;
        db.upsert_account("acct-1", PlanTier::Free).await.unwrap();
        let usage = ledger.snapshot_for_period("acct-1", "2026-10").await.unwrap();

        let reservation = ledger
            .claim(&usage, QuotaKind::Content)
            .await
            .unwrap()
            .unwrap();
        ledger.release(reservation).await.unwrap();

        let usage = ledger.snapshot_for_period("acct-1", "2026-10").await.unwrap();
        assert_eq!(usage.counters.content_count, 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_claims_never_exceed_the_limit() {
        let (ledger, db, _temp_dir) = ledger().await;
        db.upsert_account("acct-1", PlanTier::Free).await.unwrap();
        let ledger = Arc::new(ledger);
        let usage = ledger.snapshot_for_period("acct-1", "2026-10").await.unwrap();

        let claims: Vec<_> = (0..40)
            .map(|_| {
                let ledger = ledger.clone();
                let usage = usage.clone();
                tokio::spawn(async move { ledger.claim(&usage, QuotaKind::Content).await })
            })
            .collect();

        let mut claimed = 0;
        for claim in claims {
            if claim.await.unwrap().unwrap().is_some() {
                claimed += 1;
            }
        }

        assert_eq!(claimed, 5);
        let usage = ledger.snapshot_for_period("acct-1", "2026-10").await.unwrap();
        assert_eq!(usage.counters.content_count, 5);
    }

    #[tokio::test]
    async fn unlimited_plan_reports_null_remaining() {
        let (ledger, db, _temp_dir) = ledger().await;
        db.upsert_account("acct-9", PlanTier::Agency).await.unwrap();
        let usage = ledger.snapshot_for_period("acct-9", "2026-10").await.unwrap();

        for _ in 0..20 {
            let reservation = ledger.claim(&usage, QuotaKind::Content).await.unwrap();
            ledger.commit(reservation.unwrap());
        }
        assert_eq!(usage.remaining(QuotaKind::Content), None);
        assert_eq!(
            usage.remaining_after(1, 1),
            UsageRemaining {
                content: None,
                image: None
            }
        );
    }

    #[tokio::test]
    async fn fallback_cap_is_separate_from_image_quota() {
        let (ledger, db, _temp_dir) = ledger().await;
        db.upsert_account("acct-1", PlanTier::Pro).await.unwrap();
        let usage = ledger.snapshot_for_period("acct-1", "2026-10").await.unwrap();

        let first = ledger.claim_fallback(&usage, Some(1)).await.unwrap();
        ledger.commit(first.unwrap());
        assert!(ledger.claim_fallback(&usage, Some(1)).await.unwrap().is_none());

        // Image quota itself is untouched
        assert!(ledger.claim(&usage, QuotaKind::Image).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn unknown_account_uses_free_limits() {
        let (ledger, _db, _temp_dir) = ledger().await;
        let usage = ledger.snapshot_for_period("nobody", "2026-10").await.unwrap();
        assert_eq!(usage.plan, PlanTier::Free);
        assert_eq!(usage.remaining_after(1, 0).content, Some(4));
    }
}
