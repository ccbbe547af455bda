use async_trait::async_trait;
use futures::TryStreamExt;
use mongodb::bson::{doc, Document};

use crate::auth::models::{Role, UserStatus};
use crate::db::models::{timestamp, User};
use crate::error::{is_duplicate_key, AppError};

/// Optional filters for the admin user listing.
#[derive(Debug, Clone, Copy, Default)]
pub struct UserFilter {
    pub role: Option<Role>,
    pub status: Option<UserStatus>,
}

/// Repository trait for `users`.
///
/// This trait allows mocking the database layer in tests.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait UserRepository: Send + Sync {
    /// Insert a new user. A taken email yields `AppError::Conflict`.
    async fn insert(&self, user: User) -> Result<(), AppError>;

    async fn find_by_id(&self, id: &str) -> Result<Option<User>, AppError>;

    /// Lookup by (already lowercased) email.
    async fn find_by_email(&self, email: &str) -> Result<Option<User>, AppError>;

    /// Returns `false` when no user matched.
    async fn set_status(&self, id: &str, status: UserStatus) -> Result<bool, AppError>;

    async fn set_role(&self, id: &str, role: Role) -> Result<bool, AppError>;

    async fn set_password_hash(&self, id: &str, password_hash: &str) -> Result<bool, AppError>;

    /// Newest first.
    async fn list(&self, filter: UserFilter) -> Result<Vec<User>, AppError>;

    async fn delete(&self, id: &str) -> Result<bool, AppError>;

    async fn count(&self, filter: UserFilter) -> Result<u64, AppError>;
}

/// MongoDB implementation of the UserRepository.
pub struct MongoUserRepository {
    collection: mongodb::Collection<User>,
}

impl MongoUserRepository {
    pub fn new(db: &mongodb::Database) -> Self {
        Self {
            collection: db.collection("users"),
        }
    }

    async fn set_field(&self, id: &str, update: Document) -> Result<bool, AppError> {
        let mut set = update;
        set.insert("updated_at", timestamp::now());
        let result = self
            .collection
            .update_one(doc! { "_id": id }, doc! { "$set": set })
            .await?;
        Ok(result.matched_count > 0)
    }
}

fn filter_document(filter: UserFilter) -> Result<Document, AppError> {
    let mut query = Document::new();
    if let Some(role) = filter.role {
        query.insert("role", mongodb::bson::to_bson(&role)?);
    }
    if let Some(status) = filter.status {
        query.insert("status", mongodb::bson::to_bson(&status)?);
    }
    Ok(query)
}

#[async_trait]
impl UserRepository for MongoUserRepository {
    async fn insert(&self, user: User) -> Result<(), AppError> {
        match self.collection.insert_one(&user).await {
            Ok(_) => Ok(()),
            Err(e) if is_duplicate_key(&e) => Err(AppError::Conflict(format!(
                "Email '{}' is already registered",
                user.email
            ))),
            Err(e) => Err(e.into()),
        }
    }

    async fn find_by_id(&self, id: &str) -> Result<Option<User>, AppError> {
        Ok(self.collection.find_one(doc! { "_id": id }).await?)
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<User>, AppError> {
        Ok(self.collection.find_one(doc! { "email": email }).await?)
    }

    async fn set_status(&self, id: &str, status: UserStatus) -> Result<bool, AppError> {
        self.set_field(id, doc! { "status": mongodb::bson::to_bson(&status)? })
            .await
    }

    async fn set_role(&self, id: &str, role: Role) -> Result<bool, AppError> {
        self.set_field(id, doc! { "role": mongodb::bson::to_bson(&role)? })
            .await
    }

    async fn set_password_hash(&self, id: &str, password_hash: &str) -> Result<bool, AppError> {
        self.set_field(id, doc! { "password_hash": password_hash }).await
    }

    async fn list(&self, filter: UserFilter) -> Result<Vec<User>, AppError> {
        let cursor = self
            .collection
            .find(filter_document(filter)?)
            .sort(doc! { "created_at": -1 })
            .await?;
        Ok(cursor.try_collect().await?)
    }

    async fn delete(&self, id: &str) -> Result<bool, AppError> {
        let result = self.collection.delete_one(doc! { "_id": id }).await?;
        Ok(result.deleted_count > 0)
    }

    async fn count(&self, filter: UserFilter) -> Result<u64, AppError> {
        Ok(self
            .collection
            .count_documents(filter_document(filter)?)
            .await?)
    }
}
