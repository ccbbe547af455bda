use mongodb::bson::{doc, Document};
use mongodb::options::IndexOptions;
use mongodb::IndexModel;

use crate::error::AppError;

/// Create the indexes the application relies on. Idempotent.
///
/// The unique ones carry invariants: one account per email, one roster per
/// normalized company name, one application per student and job.
pub async fn ensure_indexes(db: &mongodb::Database) -> Result<(), AppError> {
    let specs: [(&str, Document, bool); 10] = [
        ("users", doc! { "email": 1 }, true),
        ("student_users", doc! { "user_id": 1 }, true),
        ("company_users", doc! { "user_id": 1 }, true),
        ("company_users", doc! { "roster_id": 1 }, false),
        ("company_employees", doc! { "company_key": 1 }, true),
        ("jobs", doc! { "status": 1, "created_at": -1 }, false),
        ("jobs", doc! { "roster_id": 1 }, false),
        ("applications", doc! { "student_id": 1, "job_id": 1 }, true),
        ("applications", doc! { "roster_id": 1, "applied_at": -1 }, false),
        ("notifications", doc! { "recipient_id": 1, "created_at": -1 }, false),
    ];

    for (collection, keys, unique) in specs {
        let index = IndexModel::builder()
            .keys(keys)
            .options(IndexOptions::builder().unique(unique).build())
            .build();
        db.collection::<Document>(collection)
            .create_index(index)
            .await?;
    }

    db.collection::<Document>("otp_codes")
        .create_index(
            IndexModel::builder()
                .keys(doc! { "email": 1, "purpose": 1 })
                .options(IndexOptions::builder().unique(true).build())
                .build(),
        )
        .await?;

    tracing::info!("MongoDB indexes ensured");
    Ok(())
}
