use sqlx::PgPool;

use crate::repo::{self, StoreError};

/// Tables the application expects to find in the database
pub const REQUIRED_TABLES: [&str; 4] = ["profiles", "workflows", "ai_agents", "waitlist_emails"];

const WAITLIST_TABLE: &str = "waitlist_emails";

/// DDL for the waitlist table, emitted for manual application when the table
/// is missing. Never executed by this service.
pub const WAITLIST_TABLE_DDL: &str = r#"
CREATE TABLE IF NOT EXISTS public.waitlist_emails (
  id UUID DEFAULT gen_random_uuid() PRIMARY KEY,
  email TEXT NOT NULL UNIQUE,
  ip_address INET,
  user_agent TEXT,
  referrer TEXT,
  utm_source TEXT,
  utm_medium TEXT,
  utm_campaign TEXT,
  status TEXT DEFAULT 'active' CHECK (status IN ('active', 'unsubscribed', 'bounced')),
  created_at TIMESTAMP WITH TIME ZONE DEFAULT NOW(),
  updated_at TIMESTAMP WITH TIME ZONE DEFAULT NOW()
);

CREATE INDEX IF NOT EXISTS idx_waitlist_emails_email ON public.waitlist_emails(email);
CREATE INDEX IF NOT EXISTS idx_waitlist_emails_created_at ON public.waitlist_emails(created_at);
CREATE INDEX IF NOT EXISTS idx_waitlist_emails_status ON public.waitlist_emails(status);

ALTER TABLE public.waitlist_emails ENABLE ROW LEVEL SECURITY;

CREATE POLICY IF NOT EXISTS "Anyone can insert waitlist emails" ON public.waitlist_emails
  FOR INSERT WITH CHECK (true);

CREATE POLICY IF NOT EXISTS "Authenticated users can view waitlist emails" ON public.waitlist_emails
  FOR SELECT USING (auth.role() = 'authenticated');

CREATE POLICY IF NOT EXISTS "Anyone can update waitlist email status" ON public.waitlist_emails
  FOR UPDATE USING (true) WITH CHECK (status IN ('active', 'unsubscribed'));

CREATE OR REPLACE FUNCTION public.update_updated_at_column()
RETURNS TRIGGER AS $$
BEGIN
  NEW.updated_at = NOW();
  RETURN NEW;
END;
$$ LANGUAGE plpgsql;

CREATE TRIGGER IF NOT EXISTS update_waitlist_emails_updated_at
  BEFORE UPDATE ON public.waitlist_emails
  FOR EACH ROW
  EXECUTE FUNCTION public.update_updated_at_column();
"#;

/// Outcome of a setup step
#[derive(Debug)]
pub struct SetupReport {
    pub success: bool,
    pub message: String,
}

/// Outcome of a table-presence check
#[derive(Debug)]
pub struct TableCheck {
    pub success: bool,
    pub missing_tables: Vec<&'static str>,
}

/// Verifies the presence of the required tables and describes (but never
/// executes) the remediation for a missing waitlist table.
pub struct DatabaseSetup;

impl DatabaseSetup {
    /// Probe each required table with a one-row select
    #[tracing::instrument(name = "Verify required tables", skip(pool))]
    pub async fn verify_tables(pool: &PgPool) -> TableCheck {
        let mut missing_tables = Vec::new();

        for table in REQUIRED_TABLES {
            match repo::probe_table(pool, table).await {
                Ok(()) => {}
                Err(StoreError::TableNotFound) => missing_tables.push(table),
                Err(error) => {
                    tracing::warn!(%table, %error, "Table probe failed; recording table as missing");
                    missing_tables.push(table);
                }
            }
        }

        TableCheck {
            success: missing_tables.is_empty(),
            missing_tables,
        }
    }

    /// Check for the waitlist table and, if it is missing, log the DDL needed
    /// to create it for manual application
    #[tracing::instrument(name = "Create waitlist table", skip(pool))]
    pub async fn create_waitlist_table(pool: &PgPool) -> SetupReport {
        match repo::probe_table(pool, WAITLIST_TABLE).await {
            Ok(()) => {
                tracing::info!("Waitlist table already exists");
                SetupReport {
                    success: true,
                    message: "Waitlist table already exists".into(),
                }
            }
            Err(error) => {
                tracing::warn!(
                    %error,
                    "Waitlist table does not exist. Execute the following SQL against the database:"
                );
                tracing::warn!("{}", WAITLIST_TABLE_DDL);

                SetupReport {
                    success: false,
                    message: "Waitlist table needs to be created manually. Check logs for SQL."
                        .into(),
                }
            }
        }
    }

    /// Verify the schema, delegating to [`Self::create_waitlist_table`] when
    /// the waitlist table is the only one missing
    #[tracing::instrument(name = "Initialize database", skip(pool))]
    pub async fn initialize_database(pool: &PgPool) -> SetupReport {
        tracing::info!("Checking database setup");

        let check = Self::verify_tables(pool).await;

        if check.success {
            tracing::info!("All required tables exist");
            return SetupReport {
                success: true,
                message: "Database is properly configured".into(),
            };
        }

        tracing::warn!(missing_tables = ?check.missing_tables, "Missing tables");

        if check.missing_tables == [WAITLIST_TABLE] {
            return Self::create_waitlist_table(pool).await;
        }

        SetupReport {
            success: false,
            message: format!(
                "Missing required tables: {}. Please run the setup SQL script.",
                check.missing_tables.join(", ")
            ),
        }
    }
}
