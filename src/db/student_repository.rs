use async_trait::async_trait;
use futures::TryStreamExt;
use mongodb::bson::doc;

use crate::db::models::Student;
use crate::error::AppError;

/// Repository trait for `student_users`.
#[async_trait]
pub trait StudentRepository: Send + Sync {
    /// Create a new profile or replace the existing one (matched by `user_id`).
    async fn save(&self, student: Student) -> Result<(), AppError>;

    async fn find_by_user_id(&self, user_id: &str) -> Result<Option<Student>, AppError>;

    async fn find_by_user_ids(&self, user_ids: &[String]) -> Result<Vec<Student>, AppError>;

    async fn delete_by_user_id(&self, user_id: &str) -> Result<bool, AppError>;
}

/// MongoDB implementation of the StudentRepository.
pub struct MongoStudentRepository {
    collection: mongodb::Collection<Student>,
}

impl MongoStudentRepository {
    pub fn new(db: &mongodb::Database) -> Self {
        Self {
            collection: db.collection("student_users"),
        }
    }
}

#[async_trait]
impl StudentRepository for MongoStudentRepository {
    async fn save(&self, student: Student) -> Result<(), AppError> {
        self.collection
            .replace_one(doc! { "user_id": &student.user_id }, &student)
            .upsert(true)
            .await?;
        Ok(())
    }

    async fn find_by_user_id(&self, user_id: &str) -> Result<Option<Student>, AppError> {
        Ok(self.collection.find_one(doc! { "user_id": user_id }).await?)
    }

    async fn find_by_user_ids(&self, user_ids: &[String]) -> Result<Vec<Student>, AppError> {
        if user_ids.is_empty() {
            return Ok(vec![]);
        }
        let cursor = self
            .collection
            .find(doc! { "user_id": { "$in": user_ids.to_vec() } })
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
