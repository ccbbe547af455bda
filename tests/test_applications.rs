mod common;

use axum::http::StatusCode;
use internconnect::db::models::NotificationKind;
use serde_json::{json, Value};

struct Setup {
    env: common::TestEnv,
    server: axum_test::TestServer,
    owner: String,
    student: String,
    job_id: String,
}

async fn setup() -> Setup {
    let env = common::TestEnv::start();
    let server = env.server_permissive();
    let owner = env.company(&server, "owner@acme.com", "Acme Corp", true).await;
    let student = env.student(&server, "ana@school.edu").await;
    env.upload_resume(&server, &student).await;
    let job_id = env.open_job(&server, &owner, "Backend Intern").await;
    Setup {
        env,
        server,
        owner,
        student,
        job_id,
    }
}

async fn apply(s: &Setup) -> String {
    let response = s
        .server
        .post("/api/applications")
        .authorization_bearer(&s.student)
        .json(&json!({
            "job_id": s.job_id,
            "message": "I would love to join.",
            "screening_answers": [{ "question": "Why this role?", "answer": "Rust." }],
        }))
        .await;
    response.assert_status(StatusCode::CREATED);
    let body: Value = response.json();
    body["_id"].as_str().unwrap().to_string()
}

async fn set_status(s: &Setup, application_id: &str, status: &str) -> axum_test::TestResponse {
    s.server
        .patch(&format!("/api/applications/{application_id}/status"))
        .authorization_bearer(&s.owner)
        .json(&json!({ "status": status }))
        .await
}

#[tokio::test]
async fn apply_snapshots_job_and_notifies_the_roster() {
    let s = setup().await;
    let application_id = apply(&s).await;

    let mine: Value = s
        .server
        .get("/api/applications/mine")
        .authorization_bearer(&s.student)
        .await
        .json();
    assert_eq!(mine[0]["_id"], application_id.as_str());
    assert_eq!(mine[0]["status"], "New");
    assert_eq!(mine[0]["job_title"], "Backend Intern");
    assert_eq!(mine[0]["company_name"], "Acme Corp");

    let count: Value = s
        .server
        .get("/api/notifications/unread-count")
        .authorization_bearer(&s.owner)
        .await
        .json();
    assert_eq!(count["count"], 1);
}

#[tokio::test]
async fn applying_twice_is_a_conflict() {
    let s = setup().await;
    apply(&s).await;

    s.server
        .post("/api/applications")
        .authorization_bearer(&s.student)
        .json(&json!({ "job_id": s.job_id }))
        .await
        .assert_status(StatusCode::CONFLICT);
}

#[tokio::test]
async fn closed_jobs_do_not_accept_applications() {
    let s = setup().await;
    s.server
        .patch(&format!("/api/jobs/{}/status", s.job_id))
        .authorization_bearer(&s.owner)
        .json(&json!({ "status": "Closed" }))
        .await
        .assert_status_ok();

    s.server
        .post("/api/applications")
        .authorization_bearer(&s.student)
        .json(&json!({ "job_id": s.job_id }))
        .await
        .assert_status_bad_request();
}

#[tokio::test]
async fn applying_without_a_resume_is_rejected() {
    let env = common::TestEnv::start();
    let server = env.server_permissive();
    let owner = env.company(&server, "owner@acme.com", "Acme Corp", true).await;
    let student = env.student(&server, "noresume@school.edu").await;
    let job_id = env.open_job(&server, &owner, "Backend Intern").await;

    server
        .post("/api/applications")
        .authorization_bearer(&student)
        .json(&json!({ "job_id": job_id }))
        .await
        .assert_status_bad_request();

    server
        .post("/api/applications")
        .authorization_bearer(&student)
        .json(&json!({ "job_id": job_id, "resume": "resumes/someone-else/cv.pdf" }))
        .await
        .assert_status_bad_request();
}

#[tokio::test]
async fn status_follows_the_lifecycle() {
    let s = setup().await;
    let application_id = apply(&s).await;

    set_status(&s, &application_id, "Hired")
        .await
        .assert_status_bad_request();

    let body: Value = set_status(&s, &application_id, "Under Review").await.json();
    assert_eq!(body["status"], "Under Review");

    // Re-sending the current status changes nothing.
    set_status(&s, &application_id, "Under Review")
        .await
        .assert_status_ok();

    set_status(&s, &application_id, "New")
        .await
        .assert_status_bad_request();

    let body: Value = set_status(&s, &application_id, "Accepted").await.json();
    assert_eq!(body["status"], "Accepted");

    set_status(&s, &application_id, "Rejected")
        .await
        .assert_status_bad_request();

    // The student was told about both changes.
    let notifications: Value = s
        .server
        .get("/api/notifications")
        .authorization_bearer(&s.student)
        .await
        .json();
    assert_eq!(notifications.as_array().unwrap().len(), 2);
    assert!(notifications
        .as_array()
        .unwrap()
        .iter()
        .all(|n| n["kind"] == "application_status"));

    let emails = s.env.mailer.sent.lock().unwrap();
    assert!(emails
        .iter()
        .any(|m| m.to == "ana@school.edu" && m.body.contains("Accepted")));
}

#[tokio::test]
async fn other_companies_cannot_review_applications() {
    let s = setup().await;
    let application_id = apply(&s).await;
    let globex = s
        .env
        .company(&s.server, "owner@globex.com", "Globex", true)
        .await;

    s.server
        .patch(&format!("/api/applications/{application_id}/status"))
        .authorization_bearer(&globex)
        .json(&json!({ "status": "Accepted" }))
        .await
        .assert_status(StatusCode::FORBIDDEN);

    s.server
        .get(&format!("/api/applications/job/{}", s.job_id))
        .authorization_bearer(&globex)
        .await
        .assert_status(StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn applicants_include_student_profiles() {
    let s = setup().await;
    apply(&s).await;

    let applicants: Value = s
        .server
        .get(&format!("/api/applications/job/{}", s.job_id))
        .authorization_bearer(&s.owner)
        .await
        .json();
    assert_eq!(applicants[0]["student"]["email"], "ana@school.edu");
    assert_eq!(applicants[0]["status"], "New");
}

#[tokio::test]
async fn withdraw_only_while_new() {
    let s = setup().await;
    let application_id = apply(&s).await;
    set_status(&s, &application_id, "Under Review")
        .await
        .assert_status_ok();

    s.server
        .delete(&format!("/api/applications/{application_id}"))
        .authorization_bearer(&s.student)
        .await
        .assert_status_bad_request();
}

#[tokio::test]
async fn withdrawing_a_new_application_deletes_it() {
    let s = setup().await;
    let application_id = apply(&s).await;

    s.server
        .delete(&format!("/api/applications/{application_id}"))
        .authorization_bearer(&s.student)
        .await
        .assert_status(StatusCode::NO_CONTENT);
    assert!(s.env.store.applications.lock().unwrap().is_empty());
}

#[tokio::test]
async fn company_export_is_csv() {
    let s = setup().await;
    apply(&s).await;

    let response = s
        .server
        .get("/api/applications/company/export")
        .authorization_bearer(&s.owner)
        .await;
    response.assert_status_ok();
    assert!(response
        .header("content-type")
        .to_str()
        .unwrap()
        .starts_with("text/csv"));
    let csv = response.text();
    let mut lines = csv.lines();
    assert_eq!(
        lines.next().unwrap(),
        "Applicant Name,Email,School,Course,Job Title,Status,Applied At"
    );
    assert!(lines.next().unwrap().starts_with("Ana Reyes,ana@school.edu,"));
}

#[tokio::test]
async fn company_applications_filter_by_status() {
    let s = setup().await;
    let application_id = apply(&s).await;
    set_status(&s, &application_id, "Under Review")
        .await
        .assert_status_ok();

    let under_review: Value = s
        .server
        .get("/api/applications/company")
        .authorization_bearer(&s.owner)
        .add_query_param("status", "Under Review")
        .await
        .json();
    assert_eq!(under_review.as_array().unwrap().len(), 1);

    let new: Value = s
        .server
        .get("/api/applications/company")
        .authorization_bearer(&s.owner)
        .add_query_param("status", "New")
        .await
        .json();
    assert!(new.as_array().unwrap().is_empty());
}

#[tokio::test]
async fn closing_a_job_notifies_applicants_still_in_review() {
    let s = setup().await;
    let mut applications = vec![apply(&s).await];
    for email in ["ben@school.edu", "cy@school.edu"] {
        let student = s.env.student(&s.server, email).await;
        s.env.upload_resume(&s.server, &student).await;
        let body: Value = s
            .server
            .post("/api/applications")
            .authorization_bearer(&student)
            .json(&json!({ "job_id": s.job_id }))
            .await
            .json();
        applications.push(body["_id"].as_str().unwrap().to_string());
    }
    set_status(&s, &applications[1], "Under Review")
        .await
        .assert_status_ok();
    set_status(&s, &applications[2], "Rejected")
        .await
        .assert_status_ok();

    s.server
        .patch(&format!("/api/jobs/{}/status", s.job_id))
        .authorization_bearer(&s.owner)
        .json(&json!({ "status": "Closed" }))
        .await
        .assert_status_ok();

    let student_of = |email: &str| {
        s.env
            .store
            .users
            .lock()
            .unwrap()
            .iter()
            .find(|u| u.email == email)
            .map(|u| u.id.clone())
            .unwrap()
    };
    let mut notified: Vec<String> = s
        .env
        .store
        .notifications
        .lock()
        .unwrap()
        .iter()
        .filter(|n| n.kind == NotificationKind::JobClosed)
        .map(|n| n.recipient_id.clone())
        .collect();
    notified.sort();
    let mut expected = vec![student_of("ana@school.edu"), student_of("ben@school.edu")];
    expected.sort();
    assert_eq!(notified, expected);
}
