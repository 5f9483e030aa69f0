mod profiles;
mod waitlist;

pub use profiles::*;
pub use waitlist::*;

use sqlx::PgExecutor;

use thiserror::Error;

/// Postgres error code for `undefined_table` (relation does not exist)
const PG_UNDEFINED_TABLE: &str = "42P01";
/// Postgres error code for `unique_violation`
const PG_UNIQUE_VIOLATION: &str = "23505";

/// Store-layer error, classified from the driver error so that callers can
/// match on variants instead of sniffing error codes.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("relation does not exist")]
    TableNotFound,

    #[error("unique constraint violation")]
    UniqueViolation,

    #[error(transparent)]
    Database(sqlx::Error),
}

impl From<sqlx::Error> for StoreError {
    fn from(e: sqlx::Error) -> Self {
        if let sqlx::Error::Database(db_err) = &e {
            match db_err.code().as_deref() {
                Some(PG_UNDEFINED_TABLE) => return Self::TableNotFound,
                Some(PG_UNIQUE_VIOLATION) => return Self::UniqueViolation,
                _ => {}
            }
        }
        Self::Database(e)
    }
}

/// Issue a one-row probe against a table to check that it exists.
///
/// `table` must come from a fixed internal list, never from user input.
#[tracing::instrument(name = "Probe table", skip(executor))]
pub async fn probe_table<'con>(
    executor: impl PgExecutor<'con>,
    table: &str,
) -> Result<(), StoreError> {
    let query = format!("select 1 as probe from {} limit 1", table);
    sqlx::query(&query).fetch_optional(executor).await?;
    Ok(())
}
