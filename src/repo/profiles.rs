use uuid::Uuid;

use secrecy::Secret;

use sqlx::PgExecutor;

use crate::domain::EmailAddress;

use super::StoreError;

/// New profile request
#[derive(Debug)]
pub struct NewProfile {
    pub email: EmailAddress,
    pub password_hash: String,
}

/// Stored credentials for a profile
#[derive(Debug)]
pub struct ProfileCredentials {
    pub id: Uuid,
    pub password_hash: Secret<String>,
}

/// Repository for interfacing with the profiles table
pub struct ProfilesRepo;

impl ProfilesRepo {
    #[tracing::instrument(name = "Insert profile", skip(new_profile, executor))]
    pub async fn insert<'con>(
        executor: impl PgExecutor<'con>,
        new_profile: &NewProfile,
    ) -> Result<Uuid, StoreError> {
        let id = sqlx::query_scalar::<_, Uuid>(
            "insert into profiles(email, password_hash) values ($1, $2) returning id",
        )
        .bind(new_profile.email.as_ref())
        .bind(&new_profile.password_hash)
        .fetch_one(executor)
        .await?;

        Ok(id)
    }

    #[tracing::instrument(name = "Fetch profile credentials", skip(executor))]
    pub async fn fetch_credentials_by_email<'con>(
        executor: impl PgExecutor<'con>,
        email: &EmailAddress,
    ) -> Result<Option<ProfileCredentials>, StoreError> {
        let row = sqlx::query_as::<_, (Uuid, String)>(
            "select id, password_hash from profiles where email = $1",
        )
        .bind(email.as_ref())
        .fetch_optional(executor)
        .await?;

        Ok(row.map(|(id, password_hash)| ProfileCredentials {
            id,
            password_hash: Secret::new(password_hash),
        }))
    }
}
