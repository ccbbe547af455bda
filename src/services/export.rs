use crate::db::report_repository::ApplicationExportRow;
use crate::error::AppError;

const HEADER: [&str; 7] = [
    "Applicant Name",
    "Email",
    "School",
    "Course",
    "Job Title",
    "Status",
    "Applied At",
];

/// Render the company applications export as CSV bytes.
pub fn applications_csv(rows: &[ApplicationExportRow]) -> Result<Vec<u8>, AppError> {
    let csv_error = |e: csv::Error| AppError::Internal(format!("Failed to write CSV: {e}"));

    let mut writer = csv::Writer::from_writer(Vec::new());
    writer.write_record(HEADER).map_err(csv_error)?;
    for row in rows {
        let applied_at = row.applied_at.format("%Y-%m-%d %H:%M").to_string();
        writer
            .write_record([
                row.applicant_name.as_str(),
                row.email.as_str(),
                row.school.as_str(),
                row.course.as_str(),
                row.job_title.as_str(),
                row.status.as_str(),
                applied_at.as_str(),
            ])
            .map_err(csv_error)?;
    }

    writer
        .into_inner()
        .map_err(|e| AppError::Internal(format!("Failed to flush CSV: {e}")))
}
