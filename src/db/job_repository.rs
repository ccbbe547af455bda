use async_trait::async_trait;
use futures::TryStreamExt;
use mongodb::bson::{doc, to_bson, Document};

use crate::db::models::{timestamp, Job, JobQuery, JobStatus};
use crate::error::AppError;

/// Repository trait for job postings (`jobs`).
#[async_trait]
pub trait JobRepository: Send + Sync {
    async fn insert(&self, job: Job) -> Result<(), AppError>;

    async fn find_by_id(&self, id: &str) -> Result<Option<Job>, AppError>;

    /// Replace an existing job (matched by id). Returns `false` if it is gone.
    async fn save(&self, job: Job) -> Result<bool, AppError>;

    async fn set_status(&self, id: &str, status: JobStatus) -> Result<bool, AppError>;

    async fn delete(&self, id: &str) -> Result<bool, AppError>;

    /// Open jobs matching the query, newest first, with the total match count.
    async fn search_open(&self, query: &JobQuery) -> Result<(Vec<Job>, u64), AppError>;

    /// All jobs of a roster, newest first.
    async fn list_by_roster(&self, roster_id: &str) -> Result<Vec<Job>, AppError>;

    /// All jobs, newest first, optionally restricted to one status.
    async fn list_all(&self, status: Option<JobStatus>) -> Result<Vec<Job>, AppError>;

    async fn count_by_status(&self, status: JobStatus) -> Result<u64, AppError>;
}

/// Escape user input for use inside a `$regex`.
pub fn escape_regex(input: &str) -> String {
    let mut escaped = String::with_capacity(input.len());
    for c in input.chars() {
        if "\\.+*?()|[]{}^$#&-~".contains(c) {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

/// MongoDB implementation of the JobRepository.
pub struct MongoJobRepository {
    collection: mongodb::Collection<Job>,
}

impl MongoJobRepository {
    pub fn new(db: &mongodb::Database) -> Self {
        Self {
            collection: db.collection("jobs"),
        }
    }
}

fn open_jobs_filter(query: &JobQuery) -> Result<Document, AppError> {
    let mut filter = doc! { "status": to_bson(&JobStatus::Open)? };
    if let Some(text) = query.text.as_deref().filter(|t| !t.trim().is_empty()) {
        filter.insert(
            "title",
            doc! { "$regex": escape_regex(text.trim()), "$options": "i" },
        );
    }
    if let Some(location) = query.location.as_deref().filter(|l| !l.trim().is_empty()) {
        filter.insert(
            "location",
            doc! { "$regex": escape_regex(location.trim()), "$options": "i" },
        );
    }
    if let Some(work_type) = query.work_type {
        filter.insert("work_type", to_bson(&work_type)?);
    }
    Ok(filter)
}

#[async_trait]
impl JobRepository for MongoJobRepository {
    async fn insert(&self, job: Job) -> Result<(), AppError> {
        self.collection.insert_one(&job).await?;
        Ok(())
    }

    async fn find_by_id(&self, id: &str) -> Result<Option<Job>, AppError> {
        Ok(self.collection.find_one(doc! { "_id": id }).await?)
    }

    async fn save(&self, job: Job) -> Result<bool, AppError> {
        let result = self
            .collection
            .replace_one(doc! { "_id": &job.id }, &job)
            .await?;
        Ok(result.matched_count > 0)
    }

    async fn set_status(&self, id: &str, status: JobStatus) -> Result<bool, AppError> {
        let result = self
            .collection
            .update_one(
                doc! { "_id": id },
                doc! { "$set": { "status": to_bson(&status)?, "updated_at": timestamp::now() } },
            )
            .await?;
        Ok(result.matched_count > 0)
    }

    async fn delete(&self, id: &str) -> Result<bool, AppError> {
        let result = self.collection.delete_one(doc! { "_id": id }).await?;
        Ok(result.deleted_count > 0)
    }

    async fn search_open(&self, query: &JobQuery) -> Result<(Vec<Job>, u64), AppError> {
        let filter = open_jobs_filter(query)?;
        let total = self.collection.count_documents(filter.clone()).await?;

        let cursor = self
            .collection
            .find(filter)
            .sort(doc! { "created_at": -1 })
            .skip(query.skip)
            .limit(query.limit)
            .await?;
        let jobs: Vec<Job> = cursor.try_collect().await?;

        Ok((jobs, total))
    }

    async fn list_by_roster(&self, roster_id: &str) -> Result<Vec<Job>, AppError> {
        let cursor = self
            .collection
            .find(doc! { "roster_id": roster_id })
            .sort(doc! { "created_at": -1 })
            .await?;
        Ok(cursor.try_collect().await?)
    }

    async fn list_all(&self, status: Option<JobStatus>) -> Result<Vec<Job>, AppError> {
        let filter = match status {
            Some(status) => doc! { "status": to_bson(&status)? },
            None => doc! {},
        };
        let cursor = self
            .collection
            .find(filter)
            .sort(doc! { "created_at": -1 })
            .await?;
        Ok(cursor.try_collect().await?)
    }

    async fn count_by_status(&self, status: JobStatus) -> Result<u64, AppError> {
        Ok(self
            .collection
            .count_documents(doc! { "status": to_bson(&status)? })
            .await?)
    }
}
