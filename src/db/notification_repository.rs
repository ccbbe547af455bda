use async_trait::async_trait;
use futures::TryStreamExt;
use mongodb::bson::doc;

use crate::db::models::Notification;
use crate::error::AppError;

/// Repository trait for `notifications`.
///
/// Every read or write other than `insert_many` is scoped to a recipient,
/// so one user can never touch another user's notifications.
#[async_trait]
pub trait NotificationRepository: Send + Sync {
    async fn insert_many(&self, notifications: Vec<Notification>) -> Result<(), AppError>;

    /// Newest first.
    async fn list_for(
        &self,
        recipient_id: &str,
        unread_only: bool,
        limit: i64,
    ) -> Result<Vec<Notification>, AppError>;

    async fn unread_count(&self, recipient_id: &str) -> Result<u64, AppError>;

    async fn mark_read(&self, id: &str, recipient_id: &str) -> Result<bool, AppError>;

    /// Returns how many notifications flipped to read.
    async fn mark_all_read(&self, recipient_id: &str) -> Result<u64, AppError>;

    async fn delete(&self, id: &str, recipient_id: &str) -> Result<bool, AppError>;

    async fn delete_for(&self, recipient_id: &str) -> Result<u64, AppError>;
}

/// MongoDB implementation of the NotificationRepository.
pub struct MongoNotificationRepository {
    collection: mongodb::Collection<Notification>,
}

impl MongoNotificationRepository {
    pub fn new(db: &mongodb::Database) -> Self {
        Self {
            collection: db.collection("notifications"),
        }
    }
}

#[async_trait]
impl NotificationRepository for MongoNotificationRepository {
    async fn insert_many(&self, notifications: Vec<Notification>) -> Result<(), AppError> {
        if notifications.is_empty() {
            return Ok(());
        }
        self.collection.insert_many(&notifications).await?;
        Ok(())
    }

    async fn list_for(
        &self,
        recipient_id: &str,
        unread_only: bool,
        limit: i64,
    ) -> Result<Vec<Notification>, AppError> {
        let mut filter = doc! { "recipient_id": recipient_id };
        if unread_only {
            filter.insert("read", false);
        }
        let cursor = self
            .collection
            .find(filter)
            .sort(doc! { "created_at": -1 })
            .limit(limit)
            .await?;
        Ok(cursor.try_collect().await?)
    }

    async fn unread_count(&self, recipient_id: &str) -> Result<u64, AppError> {
        Ok(self
            .collection
            .count_documents(doc! { "recipient_id": recipient_id, "read": false })
            .await?)
    }

    async fn mark_read(&self, id: &str, recipient_id: &str) -> Result<bool, AppError> {
        let result = self
            .collection
            .update_one(
                doc! { "_id": id, "recipient_id": recipient_id },
                doc! { "$set": { "read": true } },
            )
            .await?;
        Ok(result.matched_count > 0)
    }

    async fn mark_all_read(&self, recipient_id: &str) -> Result<u64, AppError> {
        let result = self
            .collection
            .update_many(
                doc! { "recipient_id": recipient_id, "read": false },
                doc! { "$set": { "read": true } },
            )
            .await?;
        Ok(result.modified_count)
    }

    async fn delete(&self, id: &str, recipient_id: &str) -> Result<bool, AppError> {
        let result = self
            .collection
            .delete_one(doc! { "_id": id, "recipient_id": recipient_id })
            .await?;
        Ok(result.deleted_count > 0)
    }

    async fn delete_for(&self, recipient_id: &str) -> Result<u64, AppError> {
        let result = self
            .collection
            .delete_many(doc! { "recipient_id": recipient_id })
            .await?;
        Ok(result.deleted_count)
    }
}
