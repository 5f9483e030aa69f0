use std::collections::HashSet;
use std::sync::Mutex;

use chrono::{Duration, Local, NaiveTime, Utc};

use serde::Serialize;

use sqlx::PgPool;

use thiserror::Error;

use tokio::sync::OnceCell;

use crate::domain::EmailAddress;
use crate::repo::{EmailStatus, StoreError, SubmissionMeta, WaitlistEmail, WaitlistRepo};
use crate::setup::DatabaseSetup;

/// Result of a waitlist submission
#[derive(Debug)]
pub enum SubmitOutcome {
    /// A new signup. `None` when the in-memory store handled it.
    Joined(Option<WaitlistEmail>),
    /// A previously unsubscribed address signed up again
    Reactivated(WaitlistEmail),
    /// The address is already active on the waitlist
    AlreadyJoined,
    /// The address has bounced and may not rejoin
    Blocked,
}

#[derive(Debug, Error)]
pub enum SubmitError {
    #[error("Invalid email address: {0}")]
    InvalidEmail(String),

    #[error(transparent)]
    Store(#[from] StoreError),
}

#[derive(Debug, Error)]
pub enum ExportError {
    #[error("no active emails")]
    NoActiveEmails,

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Waitlist signup statistics
#[derive(Debug, PartialEq, Eq, Serialize)]
pub struct WaitlistStats {
    pub total_emails: i64,
    pub active_emails: i64,
    pub unsubscribed_emails: i64,
    pub bounced_emails: i64,
    pub signups_today: i64,
    pub signups_this_week: i64,
    pub signups_this_month: i64,
}

/// Validates, deduplicates, and persists waitlist signups, degrading to an
/// in-memory store when the waitlist table is unavailable.
///
/// Constructed once per process and injected into the application; all state
/// (the demo store, the initialization latch) is owned by the instance.
pub struct WaitlistService {
    pool: PgPool,
    demo_mode: bool,
    initialized: OnceCell<()>,
    demo_emails: Mutex<HashSet<String>>,
}

impl WaitlistService {
    pub fn new(pool: PgPool, demo_mode: bool) -> Self {
        Self {
            pool,
            demo_mode,
            initialized: OnceCell::new(),
            demo_emails: Mutex::new(HashSet::new()),
        }
    }

    /// Verify the database schema, once per process lifetime.
    ///
    /// Failures are logged, never propagated: the service keeps running and
    /// falls back to the in-memory store when the waitlist table is missing.
    pub async fn initialize(&self) {
        self.initialized
            .get_or_init(|| async {
                if self.demo_mode {
                    tracing::debug!("Demo mode enabled; skipping database setup");
                    return;
                }
                let report = DatabaseSetup::initialize_database(&self.pool).await;
                if report.success {
                    tracing::info!(message = %report.message, "Database setup verified");
                } else {
                    tracing::warn!(
                        message = %report.message,
                        "Database setup incomplete; submissions may fall back to the in-memory store"
                    );
                }
            })
            .await;
    }

    /// Submit an address to the waitlist
    #[tracing::instrument(name = "Submit waitlist email", skip(self, meta))]
    pub async fn submit(
        &self,
        raw_email: &str,
        meta: SubmissionMeta,
    ) -> Result<SubmitOutcome, SubmitError> {
        self.initialize().await;

        let email: EmailAddress = raw_email.parse().map_err(SubmitError::InvalidEmail)?;

        if self.demo_mode {
            return Ok(self.submit_demo(&email));
        }

        // Reachability is re-evaluated on every call; a missing table
        // downgrades this submission to the in-memory store
        let existing = match WaitlistRepo::find_by_email(&self.pool, &email).await {
            Ok(existing) => existing,
            Err(StoreError::TableNotFound) => {
                tracing::warn!("Waitlist table unavailable; using in-memory store");
                return Ok(self.submit_demo(&email));
            }
            Err(error) => return Err(error.into()),
        };

        match existing {
            None => match WaitlistRepo::insert(&self.pool, &email, &meta).await {
                Ok(record) => {
                    tracing::info!(email = %email, "New email added to waitlist");
                    Ok(SubmitOutcome::Joined(Some(record)))
                }
                // Lost a race with a concurrent submission of the same
                // address; indistinguishable from a pre-existing active row
                Err(StoreError::UniqueViolation) => Ok(SubmitOutcome::AlreadyJoined),
                Err(error) => Err(error.into()),
            },
            Some(record) => match record.status() {
                EmailStatus::Active => Ok(SubmitOutcome::AlreadyJoined),
                EmailStatus::Unsubscribed => {
                    let record = WaitlistRepo::reactivate(&self.pool, record.id, &meta).await?;
                    tracing::info!(email = %email, "Email reactivated on waitlist");
                    Ok(SubmitOutcome::Reactivated(record))
                }
                EmailStatus::Bounced => Ok(SubmitOutcome::Blocked),
            },
        }
    }

    /// Remove an address from the waitlist (sets status, never deletes)
    #[tracing::instrument(name = "Unsubscribe waitlist email", skip(self))]
    pub async fn unsubscribe(&self, raw_email: &str) -> Result<(), StoreError> {
        self.initialize().await;

        let normalized = raw_email.trim().to_lowercase();

        if self.demo_mode {
            self.demo_store().remove(&normalized);
            return Ok(());
        }

        match WaitlistRepo::set_status_by_email(&self.pool, &normalized, EmailStatus::Unsubscribed)
            .await
        {
            Ok(_affected) => {
                tracing::info!(email = %normalized, "Email unsubscribed from waitlist");
                Ok(())
            }
            Err(StoreError::TableNotFound) => {
                tracing::warn!("Waitlist table unavailable; using in-memory store");
                self.demo_store().remove(&normalized);
                Ok(())
            }
            Err(error) => Err(error),
        }
    }

    /// Current signup statistics. Re-queries the store on every call.
    #[tracing::instrument(name = "Waitlist stats", skip(self))]
    pub async fn stats(&self) -> Result<WaitlistStats, StoreError> {
        self.initialize().await;

        if self.demo_mode {
            return Ok(self.demo_stats());
        }

        let counts = match WaitlistRepo::count_by_status(&self.pool).await {
            Ok(counts) => counts,
            Err(StoreError::TableNotFound) => return Ok(self.demo_stats()),
            Err(error) => return Err(error),
        };

        // Window anchors at local midnight
        let now = Local::now();
        let today = now - now.time().signed_duration_since(NaiveTime::MIN);
        let week_ago = today - Duration::days(7);
        let month_ago = today - Duration::days(30);

        let signups_today =
            WaitlistRepo::count_since(&self.pool, today.with_timezone(&Utc)).await?;
        let signups_this_week =
            WaitlistRepo::count_since(&self.pool, week_ago.with_timezone(&Utc)).await?;
        let signups_this_month =
            WaitlistRepo::count_since(&self.pool, month_ago.with_timezone(&Utc)).await?;

        Ok(WaitlistStats {
            total_emails: counts.total,
            active_emails: counts.active,
            unsubscribed_emails: counts.unsubscribed,
            bounced_emails: counts.bounced,
            signups_today,
            signups_this_week,
            signups_this_month,
        })
    }

    /// Newest-first page of records plus the total record count
    #[tracing::instrument(name = "List waitlist emails", skip(self))]
    pub async fn all_emails(
        &self,
        limit: i64,
        offset: i64,
    ) -> Result<(Vec<WaitlistEmail>, i64), StoreError> {
        self.initialize().await;

        let records = WaitlistRepo::fetch_page(&self.pool, limit, offset).await?;
        let count = WaitlistRepo::count_all(&self.pool).await?;

        Ok((records, count))
    }

    /// Serialize all active records to CSV, newest-first
    #[tracing::instrument(name = "Export waitlist emails", skip(self))]
    pub async fn export_csv(&self) -> Result<String, ExportError> {
        self.initialize().await;

        let records = WaitlistRepo::fetch_active(&self.pool).await?;
        if records.is_empty() {
            return Err(ExportError::NoActiveEmails);
        }

        Ok(render_csv(&records))
    }

    fn submit_demo(&self, email: &EmailAddress) -> SubmitOutcome {
        let mut store = self.demo_store();
        if store.insert(email.as_ref().to_string()) {
            tracing::info!(email = %email, "New email added to in-memory waitlist");
            SubmitOutcome::Joined(None)
        } else {
            SubmitOutcome::AlreadyJoined
        }
    }

    fn demo_stats(&self) -> WaitlistStats {
        let total = self.demo_store().len() as i64;
        WaitlistStats {
            total_emails: total,
            active_emails: total,
            unsubscribed_emails: 0,
            bounced_emails: 0,
            signups_today: total,
            signups_this_week: total,
            signups_this_month: total,
        }
    }

    fn demo_store(&self) -> std::sync::MutexGuard<'_, HashSet<String>> {
        // Lock poisoning would require a panic mid-insert on a HashSet
        self.demo_emails
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

const CSV_HEADERS: [&str; 6] = [
    "Email",
    "Status",
    "Signup Date",
    "UTM Source",
    "UTM Medium",
    "UTM Campaign",
];

/// Render records to CSV text. Every field is double-quoted, with embedded
/// quotes doubled.
fn render_csv(records: &[WaitlistEmail]) -> String {
    let header = CSV_HEADERS
        .iter()
        .map(|h| csv_field(h))
        .collect::<Vec<_>>()
        .join(",");

    let mut lines = Vec::with_capacity(records.len() + 1);
    lines.push(header);

    for record in records {
        let fields = [
            record.email.as_str(),
            record.status.as_str(),
            &record.created_at.format("%-m/%-d/%Y").to_string(),
            record.utm_source.as_deref().unwrap_or(""),
            record.utm_medium.as_deref().unwrap_or(""),
            record.utm_campaign.as_deref().unwrap_or(""),
        ]
        .map(csv_field);

        lines.push(fields.join(","));
    }

    lines.join("\n")
}

fn csv_field(field: &str) -> String {
    format!("\"{}\"", field.replace('"', "\"\""))
}
