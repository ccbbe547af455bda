use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::TryStreamExt;
use mongodb::bson::{doc, from_document, Document};
use serde::{Deserialize, Serialize};

use crate::db::models::timestamp;
use crate::error::AppError;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusCount {
    #[serde(rename(deserialize = "_id"))]
    pub status: String,
    pub count: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompanyJobCount {
    #[serde(rename(deserialize = "_id"))]
    pub roster_id: String,
    pub company_name: String,
    pub jobs: u64,
}

/// Application count for one calendar month (1 = January).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MonthCount {
    pub month: u32,
    pub count: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobApplicationCount {
    #[serde(rename = "_id")]
    pub job_id: String,
    pub count: u64,
}

/// One line of the company applications export.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApplicationExportRow {
    pub applicant_name: String,
    pub email: String,
    pub school: String,
    pub course: String,
    pub job_title: String,
    pub status: String,
    #[serde(with = "timestamp")]
    pub applied_at: DateTime<Utc>,
}

/// Reporting queries spanning several collections.
#[async_trait]
pub trait ReportRepository: Send + Sync {
    async fn job_status_counts(&self) -> Result<Vec<StatusCount>, AppError>;

    /// Rosters with the most postings, most first.
    async fn top_companies_by_jobs(&self, limit: i64) -> Result<Vec<CompanyJobCount>, AppError>;

    /// Only months with at least one application are returned.
    async fn monthly_application_counts(&self, year: i32) -> Result<Vec<MonthCount>, AppError>;

    async fn application_status_counts(&self, year: i32) -> Result<Vec<StatusCount>, AppError>;

    async fn job_application_counts(
        &self,
        roster_id: &str,
    ) -> Result<Vec<JobApplicationCount>, AppError>;

    /// Roster applications joined with the applicant profile, newest first.
    async fn application_export_rows(
        &self,
        roster_id: &str,
    ) -> Result<Vec<ApplicationExportRow>, AppError>;
}

/// MongoDB implementation of the ReportRepository, built on aggregation pipelines.
pub struct MongoReportRepository {
    jobs: mongodb::Collection<Document>,
    applications: mongodb::Collection<Document>,
}

impl MongoReportRepository {
    pub fn new(db: &mongodb::Database) -> Self {
        Self {
            jobs: db.collection("jobs"),
            applications: db.collection("applications"),
        }
    }
}

async fn collect<T: serde::de::DeserializeOwned>(
    collection: &mongodb::Collection<Document>,
    pipeline: Vec<Document>,
) -> Result<Vec<T>, AppError> {
    let cursor = collection.aggregate(pipeline).await?;
    let documents: Vec<Document> = cursor.try_collect().await?;
    documents
        .into_iter()
        .map(|d| from_document(d).map_err(AppError::from))
        .collect()
}

/// Timestamps are stored as RFC 3339 strings, so a year is a string prefix.
fn year_match(year: i32) -> Document {
    doc! { "$match": { "applied_at": { "$regex": format!("^{year:04}-") } } }
}

#[async_trait]
impl ReportRepository for MongoReportRepository {
    async fn job_status_counts(&self) -> Result<Vec<StatusCount>, AppError> {
        let pipeline = vec![
            doc! { "$group": { "_id": "$status", "count": { "$sum": 1 } } },
            doc! { "$sort": { "_id": 1 } },
        ];
        collect(&self.jobs, pipeline).await
    }

    async fn top_companies_by_jobs(&self, limit: i64) -> Result<Vec<CompanyJobCount>, AppError> {
        let pipeline = vec![
            doc! { "$group": {
                "_id": "$roster_id",
                "company_name": { "$first": "$company.name" },
                "jobs": { "$sum": 1 },
            } },
            doc! { "$sort": { "jobs": -1, "company_name": 1 } },
            doc! { "$limit": limit },
        ];
        collect(&self.jobs, pipeline).await
    }

    async fn monthly_application_counts(&self, year: i32) -> Result<Vec<MonthCount>, AppError> {
        let pipeline = vec![
            year_match(year),
            doc! { "$group": {
                "_id": { "$toInt": { "$substrBytes": ["$applied_at", 5, 2] } },
                "count": { "$sum": 1 },
            } },
            doc! { "$project": { "_id": 0, "month": "$_id", "count": 1 } },
            doc! { "$sort": { "month": 1 } },
        ];
        collect(&self.applications, pipeline).await
    }

    async fn application_status_counts(&self, year: i32) -> Result<Vec<StatusCount>, AppError> {
        let pipeline = vec![
            year_match(year),
            doc! { "$group": { "_id": "$status", "count": { "$sum": 1 } } },
            doc! { "$sort": { "_id": 1 } },
        ];
        collect(&self.applications, pipeline).await
    }

    async fn job_application_counts(
        &self,
        roster_id: &str,
    ) -> Result<Vec<JobApplicationCount>, AppError> {
        let pipeline = vec![
            doc! { "$match": { "roster_id": roster_id } },
            doc! { "$group": { "_id": "$job_id", "count": { "$sum": 1 } } },
        ];
        collect(&self.applications, pipeline).await
    }

    async fn application_export_rows(
        &self,
        roster_id: &str,
    ) -> Result<Vec<ApplicationExportRow>, AppError> {
        let pipeline = vec![
            doc! { "$match": { "roster_id": roster_id } },
            doc! { "$lookup": {
                "from": "student_users",
                "localField": "student_id",
                "foreignField": "user_id",
                "as": "student",
            } },
            doc! { "$unwind": { "path": "$student", "preserveNullAndEmptyArrays": true } },
            doc! { "$sort": { "applied_at": -1 } },
            doc! { "$project": {
                "_id": 0,
                "applicant_name": { "$trim": { "input": { "$concat": [
                    { "$ifNull": ["$student.first_name", ""] },
                    " ",
                    { "$ifNull": ["$student.last_name", ""] },
                ] } } },
                "email": { "$ifNull": ["$student.email", ""] },
                "school": { "$ifNull": ["$student.school", ""] },
                "course": { "$ifNull": ["$student.course", ""] },
                "job_title": "$job_title",
                "status": "$status",
                "applied_at": "$applied_at",
            } },
        ];
        collect(&self.applications, pipeline).await
    }
}
