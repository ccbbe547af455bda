use async_trait::async_trait;
use futures::TryStreamExt;
use mongodb::bson::{doc, to_bson};
use mongodb::options::ReturnDocument;

use crate::db::models::{timestamp, Application, ApplicationStatus};
use crate::error::{is_duplicate_key, AppError};

/// Repository trait for `applications`.
///
/// (`student_id`, `job_id`) is unique; a second insert for the same pair
/// yields `AppError::Conflict`.
#[async_trait]
pub trait ApplicationRepository: Send + Sync {
    async fn insert(&self, application: Application) -> Result<(), AppError>;

    async fn find_by_id(&self, id: &str) -> Result<Option<Application>, AppError>;

    /// Newest first.
    async fn list_by_student(&self, student_id: &str) -> Result<Vec<Application>, AppError>;

    async fn list_by_job(&self, job_id: &str) -> Result<Vec<Application>, AppError>;

    async fn list_by_roster(
        &self,
        roster_id: &str,
        status: Option<ApplicationStatus>,
    ) -> Result<Vec<Application>, AppError>;

    /// Write the new status. Returns the updated application, or `None` if
    /// it no longer exists.
    async fn set_status(
        &self,
        id: &str,
        status: ApplicationStatus,
    ) -> Result<Option<Application>, AppError>;

    async fn delete(&self, id: &str) -> Result<bool, AppError>;

    async fn delete_by_job(&self, job_id: &str) -> Result<u64, AppError>;

    async fn delete_by_student(&self, student_id: &str) -> Result<u64, AppError>;

    async fn count_all(&self) -> Result<u64, AppError>;
}

/// MongoDB implementation of the ApplicationRepository.
pub struct MongoApplicationRepository {
    collection: mongodb::Collection<Application>,
}

impl MongoApplicationRepository {
    pub fn new(db: &mongodb::Database) -> Self {
        Self {
            collection: db.collection("applications"),
        }
    }

    async fn list(&self, filter: mongodb::bson::Document) -> Result<Vec<Application>, AppError> {
        let cursor = self
            .collection
            .find(filter)
            .sort(doc! { "applied_at": -1 })
            .await?;
        Ok(cursor.try_collect().await?)
    }
}

#[async_trait]
impl ApplicationRepository for MongoApplicationRepository {
    async fn insert(&self, application: Application) -> Result<(), AppError> {
        match self.collection.insert_one(&application).await {
            Ok(_) => Ok(()),
            Err(e) if is_duplicate_key(&e) => Err(AppError::Conflict(
                "You have already applied to this job".into(),
            )),
            Err(e) => Err(e.into()),
        }
    }

    async fn find_by_id(&self, id: &str) -> Result<Option<Application>, AppError> {
        Ok(self.collection.find_one(doc! { "_id": id }).await?)
    }

    async fn list_by_student(&self, student_id: &str) -> Result<Vec<Application>, AppError> {
        self.list(doc! { "student_id": student_id }).await
    }

    async fn list_by_job(&self, job_id: &str) -> Result<Vec<Application>, AppError> {
        self.list(doc! { "job_id": job_id }).await
    }

    async fn list_by_roster(
        &self,
        roster_id: &str,
        status: Option<ApplicationStatus>,
    ) -> Result<Vec<Application>, AppError> {
        let mut filter = doc! { "roster_id": roster_id };
        if let Some(status) = status {
            filter.insert("status", to_bson(&status)?);
        }
        self.list(filter).await
    }

    async fn set_status(
        &self,
        id: &str,
        status: ApplicationStatus,
    ) -> Result<Option<Application>, AppError> {
        Ok(self
            .collection
            .find_one_and_update(
                doc! { "_id": id },
                doc! { "$set": { "status": to_bson(&status)?, "updated_at": timestamp::now() } },
            )
            .return_document(ReturnDocument::After)
            .await?)
    }

    async fn delete(&self, id: &str) -> Result<bool, AppError> {
        let result = self.collection.delete_one(doc! { "_id": id }).await?;
        Ok(result.deleted_count > 0)
    }

    async fn delete_by_job(&self, job_id: &str) -> Result<u64, AppError> {
        let result = self.collection.delete_many(doc! { "job_id": job_id }).await?;
        Ok(result.deleted_count)
    }

    async fn delete_by_student(&self, student_id: &str) -> Result<u64, AppError> {
        let result = self
            .collection
            .delete_many(doc! { "student_id": student_id })
            .await?;
        Ok(result.deleted_count)
    }

    async fn count_all(&self) -> Result<u64, AppError> {
        Ok(self.collection.count_documents(doc! {}).await?)
    }
}
