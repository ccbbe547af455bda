use async_trait::async_trait;
use mongodb::bson::{doc, to_bson};

use crate::db::models::{OtpCode, OtpPurpose};
use crate::error::AppError;

/// Repository trait for pending one-time codes (`otp_codes`).
#[async_trait]
pub trait OtpRepository: Send + Sync {
    /// Store a code, replacing any previous one for the same email and purpose.
    async fn put(&self, code: OtpCode) -> Result<(), AppError>;

    async fn find(&self, email: &str, purpose: OtpPurpose) -> Result<Option<OtpCode>, AppError>;

    async fn record_failed_attempt(&self, email: &str, purpose: OtpPurpose)
        -> Result<(), AppError>;

    async fn delete(&self, email: &str, purpose: OtpPurpose) -> Result<(), AppError>;
}

/// MongoDB implementation of the OtpRepository.
pub struct MongoOtpRepository {
    collection: mongodb::Collection<OtpCode>,
}

impl MongoOtpRepository {
    pub fn new(db: &mongodb::Database) -> Self {
        Self {
            collection: db.collection("otp_codes"),
        }
    }
}

#[async_trait]
impl OtpRepository for MongoOtpRepository {
    async fn put(&self, code: OtpCode) -> Result<(), AppError> {
        self.collection
            .replace_one(
                doc! { "email": &code.email, "purpose": to_bson(&code.purpose)? },
                &code,
            )
            .upsert(true)
            .await?;
        Ok(())
    }

    async fn find(&self, email: &str, purpose: OtpPurpose) -> Result<Option<OtpCode>, AppError> {
        Ok(self
            .collection
            .find_one(doc! { "email": email, "purpose": to_bson(&purpose)? })
            .await?)
    }

    async fn record_failed_attempt(
        &self,
        email: &str,
        purpose: OtpPurpose,
    ) -> Result<(), AppError> {
        self.collection
            .update_one(
                doc! { "email": email, "purpose": to_bson(&purpose)? },
                doc! { "$inc": { "attempts": 1 } },
            )
            .await?;
        Ok(())
    }

    async fn delete(&self, email: &str, purpose: OtpPurpose) -> Result<(), AppError> {
        self.collection
            .delete_one(doc! { "email": email, "purpose": to_bson(&purpose)? })
            .await?;
        Ok(())
    }
}
