use std::str::FromStr;

use uuid::Uuid;

use chrono::{DateTime, Utc};

use serde::Serialize;

use sqlx::PgExecutor;

use crate::domain::EmailAddress;

use super::StoreError;

/// Lifecycle status of a waitlist record.
///
/// `Bounced` is terminal and only ever written by an external delivery
/// process; this service reads it but never sets it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EmailStatus {
    Active,
    Unsubscribed,
    Bounced,
}

impl EmailStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Unsubscribed => "unsubscribed",
            Self::Bounced => "bounced",
        }
    }
}

impl FromStr for EmailStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "active" => Ok(Self::Active),
            "unsubscribed" => Ok(Self::Unsubscribed),
            "bounced" => Ok(Self::Bounced),
            other => Err(format!("{} is not a valid email status", other)),
        }
    }
}

/// Provenance metadata captured alongside a submission.
/// Free-form strings, never validated beyond that.
#[derive(Debug, Default, Clone)]
pub struct SubmissionMeta {
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
    pub referrer: Option<String>,
    pub utm_source: Option<String>,
    pub utm_medium: Option<String>,
    pub utm_campaign: Option<String>,
}

/// Stored waitlist record
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct WaitlistEmail {
    /// ID of the record
    pub id: Uuid,
    /// Normalized email address, unique across all records
    pub email: String,
    /// Provenance metadata
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
    pub referrer: Option<String>,
    pub utm_source: Option<String>,
    pub utm_medium: Option<String>,
    pub utm_campaign: Option<String>,
    /// One of `active`, `unsubscribed`, `bounced` (check constraint)
    pub status: String,
    /// Creation and update timestamps
    /// NOTE: `updated_at` is refreshed by a database trigger
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl WaitlistEmail {
    /// Parsed record status.
    ///
    /// The check constraint admits only the three known values; anything else
    /// is treated as `Bounced` so that an unexpected row is never re-mailed.
    pub fn status(&self) -> EmailStatus {
        self.status.parse().unwrap_or_else(|error: String| {
            tracing::warn!(%error, id = %self.id, "Unknown waitlist status on record");
            EmailStatus::Bounced
        })
    }
}

/// Per-status record counts
#[derive(Debug, Default, Clone, Copy)]
pub struct StatusCounts {
    pub total: i64,
    pub active: i64,
    pub unsubscribed: i64,
    pub bounced: i64,
}

const COLUMNS: &str = "id, email, ip_address, user_agent, referrer, \
                       utm_source, utm_medium, utm_campaign, status, \
                       created_at, updated_at";

/// Repository for interfacing with the waitlist table
pub struct WaitlistRepo;

impl WaitlistRepo {
    #[tracing::instrument(name = "Find waitlist record by email", skip(executor))]
    pub async fn find_by_email<'con>(
        executor: impl PgExecutor<'con>,
        email: &EmailAddress,
    ) -> Result<Option<WaitlistEmail>, StoreError> {
        let query = format!("select {} from waitlist_emails where email = $1", COLUMNS);

        let record = sqlx::query_as::<_, WaitlistEmail>(&query)
            .bind(email.as_ref())
            .fetch_optional(executor)
            .await?;

        Ok(record)
    }

    #[tracing::instrument(name = "Insert waitlist record", skip(executor, meta))]
    pub async fn insert<'con>(
        executor: impl PgExecutor<'con>,
        email: &EmailAddress,
        meta: &SubmissionMeta,
    ) -> Result<WaitlistEmail, StoreError> {
        let query = format!(
            "insert into waitlist_emails \
             (email, ip_address, user_agent, referrer, utm_source, utm_medium, utm_campaign, status) \
             values ($1, $2, $3, $4, $5, $6, $7, 'active') \
             returning {}",
            COLUMNS
        );

        let record = sqlx::query_as::<_, WaitlistEmail>(&query)
            .bind(email.as_ref())
            .bind(&meta.ip_address)
            .bind(&meta.user_agent)
            .bind(&meta.referrer)
            .bind(&meta.utm_source)
            .bind(&meta.utm_medium)
            .bind(&meta.utm_campaign)
            .fetch_one(executor)
            .await?;

        Ok(record)
    }

    /// Flip an unsubscribed record back to active, refreshing its metadata
    #[tracing::instrument(name = "Reactivate waitlist record", skip(executor, meta))]
    pub async fn reactivate<'con>(
        executor: impl PgExecutor<'con>,
        id: Uuid,
        meta: &SubmissionMeta,
    ) -> Result<WaitlistEmail, StoreError> {
        let query = format!(
            "update waitlist_emails \
             set status = 'active', ip_address = $2, user_agent = $3, referrer = $4, \
                 utm_source = $5, utm_medium = $6, utm_campaign = $7, updated_at = now() \
             where id = $1 \
             returning {}",
            COLUMNS
        );

        let record = sqlx::query_as::<_, WaitlistEmail>(&query)
            .bind(id)
            .bind(&meta.ip_address)
            .bind(&meta.user_agent)
            .bind(&meta.referrer)
            .bind(&meta.utm_source)
            .bind(&meta.utm_medium)
            .bind(&meta.utm_campaign)
            .fetch_one(executor)
            .await?;

        Ok(record)
    }

    #[tracing::instrument(name = "Set waitlist record status", skip(executor))]
    pub async fn set_status_by_email<'con>(
        executor: impl PgExecutor<'con>,
        email: &str,
        status: EmailStatus,
    ) -> Result<u64, StoreError> {
        let result =
            sqlx::query("update waitlist_emails set status = $2, updated_at = now() where email = $1")
                .bind(email)
                .bind(status.as_str())
                .execute(executor)
                .await?;

        Ok(result.rows_affected())
    }

    #[tracing::instrument(name = "Count waitlist records by status", skip(executor))]
    pub async fn count_by_status<'con>(
        executor: impl PgExecutor<'con>,
    ) -> Result<StatusCounts, StoreError> {
        let rows = sqlx::query_as::<_, (String, i64)>(
            "select status, count(*) from waitlist_emails group by status",
        )
        .fetch_all(executor)
        .await?;

        let mut counts = StatusCounts::default();
        for (status, count) in rows {
            counts.total += count;
            match status.parse() {
                Ok(EmailStatus::Active) => counts.active += count,
                Ok(EmailStatus::Unsubscribed) => counts.unsubscribed += count,
                Ok(EmailStatus::Bounced) | Err(_) => counts.bounced += count,
            }
        }

        Ok(counts)
    }

    #[tracing::instrument(name = "Count waitlist records since", skip(executor))]
    pub async fn count_since<'con>(
        executor: impl PgExecutor<'con>,
        since: DateTime<Utc>,
    ) -> Result<i64, StoreError> {
        let count = sqlx::query_scalar::<_, i64>(
            "select count(*) from waitlist_emails where created_at >= $1",
        )
        .bind(since)
        .fetch_one(executor)
        .await?;

        Ok(count)
    }

    #[tracing::instrument(name = "Count all waitlist records", skip(executor))]
    pub async fn count_all<'con>(executor: impl PgExecutor<'con>) -> Result<i64, StoreError> {
        let count = sqlx::query_scalar::<_, i64>("select count(*) from waitlist_emails")
            .fetch_one(executor)
            .await?;

        Ok(count)
    }

    /// Fetch a newest-first page of records for administrative listing
    #[tracing::instrument(name = "Fetch waitlist page", skip(executor))]
    pub async fn fetch_page<'con>(
        executor: impl PgExecutor<'con>,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<WaitlistEmail>, StoreError> {
        let query = format!(
            "select {} from waitlist_emails order by created_at desc limit $1 offset $2",
            COLUMNS
        );

        let records = sqlx::query_as::<_, WaitlistEmail>(&query)
            .bind(limit)
            .bind(offset)
            .fetch_all(executor)
            .await?;

        Ok(records)
    }

    /// Fetch all active records, newest-first, for export
    #[tracing::instrument(name = "Fetch active waitlist records", skip(executor))]
    pub async fn fetch_active<'con>(
        executor: impl PgExecutor<'con>,
    ) -> Result<Vec<WaitlistEmail>, StoreError> {
        let query = format!(
            "select {} from waitlist_emails where status = 'active' order by created_at desc",
            COLUMNS
        );

        let records = sqlx::query_as::<_, WaitlistEmail>(&query)
            .fetch_all(executor)
            .await?;

        Ok(records)
    }
}
