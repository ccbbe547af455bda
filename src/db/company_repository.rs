use async_trait::async_trait;
use futures::TryStreamExt;
use mongodb::bson::doc;

use crate::db::models::CompanyMember;
use crate::error::AppError;

/// Repository trait for per-person company profiles (`company_users`).
#[async_trait]
pub trait CompanyMemberRepository: Send + Sync {
    /// Create a new profile or replace the existing one (matched by `user_id`).
    async fn save(&self, member: CompanyMember) -> Result<(), AppError>;

    async fn find_by_user_id(&self, user_id: &str) -> Result<Option<CompanyMember>, AppError>;

    async fn list_by_roster(&self, roster_id: &str) -> Result<Vec<CompanyMember>, AppError>;

    async fn delete_by_user_id(&self, user_id: &str) -> Result<bool, AppError>;
}

/// MongoDB implementation of the CompanyMemberRepository.
pub struct MongoCompanyMemberRepository {
    collection: mongodb::Collection<CompanyMember>,
}

impl MongoCompanyMemberRepository {
    pub fn new(db: &mongodb::Database) -> Self {
        Self {
            collection: db.collection("company_users"),
        }
    }
}

#[async_trait]
impl CompanyMemberRepository for MongoCompanyMemberRepository {
    async fn save(&self, member: CompanyMember) -> Result<(), AppError> {
        self.collection
            .replace_one(doc! { "user_id": &member.user_id }, &member)
            .upsert(true)
            .await?;
        Ok(())
    }

    async fn find_by_user_id(&self, user_id: &str) -> Result<Option<CompanyMember>, AppError> {
        Ok(self.collection.find_one(doc! { "user_id": user_id }).await?)
    }

    async fn list_by_roster(&self, roster_id: &str) -> Result<Vec<CompanyMember>, AppError> {
        let cursor = self
            .collection
            .find(doc! { "roster_id": roster_id })
            .sort(doc! { "created_at": 1 })
            .await?;
        Ok(cursor.try_collect().await?)
    }

    async fn delete_by_user_id(&self, user_id: &str) -> Result<bool, AppError> {
        let result = self
            .collection
            .delete_one(doc! { "user_id": user_id })
            .await?;
        Ok(result.deleted_count > 0)
    }
}
