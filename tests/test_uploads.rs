mod common;

use axum_test::multipart::{MultipartForm, Part};
use serde_json::Value;

fn png() -> Vec<u8> {
    vec![
        0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A, // PNG signature
        0x00, 0x00, 0x00, 0x0D, 0x49, 0x48, 0x44, 0x52, // IHDR chunk
        0x00, 0x00, 0x00, 0x01, 0x00, 0x00, 0x00, 0x01, // 1x1
        0x08, 0x02, 0x00, 0x00, 0x00, 0x90, 0x77, 0x53, 0xDE,
        0x00, 0x00, 0x00, 0x00, 0x49, 0x45, 0x4E, 0x44, // IEND chunk
        0xAE, 0x42, 0x60, 0x82,
    ]
}

#[tokio::test]
async fn resume_upload_is_served_back_as_pdf() {
    let env = common::TestEnv::start();
    let server = env.server();
    let student = env.student(&server, "ana@school.edu").await;

    let key = env.upload_resume(&server, &student).await;
    assert!(key.starts_with("resumes/"), "unexpected key {key}");
    assert!(key.ends_with(".pdf"), "unexpected key {key}");

    let profile: Value = server
        .get("/api/students/me")
        .authorization_bearer(&student)
        .await
        .json();
    assert_eq!(profile["resume"], key.as_str());

    let response = server.get(&format!("/uploads/{key}")).await;
    response.assert_status_ok();
    assert_eq!(response.header("content-type"), "application/pdf");
    assert_eq!(response.header("x-content-type-options"), "nosniff");
    assert!(response.as_bytes().starts_with(b"%PDF"));
}

#[tokio::test]
async fn resume_must_be_a_document() {
    let env = common::TestEnv::start();
    let server = env.server_permissive();
    let student = env.student(&server, "ana@school.edu").await;

    let form = MultipartForm::new().add_part(
        "file",
        Part::bytes(png()).file_name("me.png").mime_type("image/png"),
    );
    server
        .post("/api/students/me/resume")
        .authorization_bearer(&student)
        .multipart(form)
        .await
        .assert_status_bad_request();
}

#[tokio::test]
async fn avatar_replaces_previous_image() {
    let env = common::TestEnv::start();
    let server = env.server();
    let student = env.student(&server, "ana@school.edu").await;

    let mut keys = Vec::new();
    for name in ["first.png", "second.png"] {
        let form = MultipartForm::new().add_part(
            "file",
            Part::bytes(png()).file_name(name).mime_type("image/png"),
        );
        let body: Value = server
            .post("/api/students/me/avatar")
            .authorization_bearer(&student)
            .multipart(form)
            .await
            .json();
        keys.push(body["key"].as_str().unwrap().to_string());
    }

    let objects = env.storage.objects.lock().unwrap();
    assert!(!objects.contains_key(&keys[0]));
    assert!(objects.contains_key(&keys[1]));
}

#[tokio::test]
async fn oversized_upload_is_rejected() {
    let env = common::TestEnv::start();
    let server = env.server_permissive();
    let student = env.student(&server, "ana@school.edu").await;

    let mut big = b"%PDF-1.4\n".to_vec();
    big.resize(5 * 1024 * 1024 + 1, b'a');
    let form = MultipartForm::new().add_part(
        "file",
        Part::bytes(big).file_name("huge.pdf").mime_type("application/pdf"),
    );
    let response = server
        .post("/api/students/me/resume")
        .authorization_bearer(&student)
        .multipart(form)
        .await;
    assert!(response.status_code().is_client_error());
    assert!(env.storage.objects.lock().unwrap().is_empty());
}

#[tokio::test]
async fn only_owners_upload_company_logos() {
    let env = common::TestEnv::start();
    let server = env.server_permissive();
    env.company(&server, "owner@acme.com", "Acme Corp", true).await;
    let staff = env.company(&server, "staff@acme.com", "Acme Corp", false).await;

    let form = MultipartForm::new().add_part(
        "file",
        Part::bytes(png()).file_name("logo.png").mime_type("image/png"),
    );
    server
        .post("/api/companies/me/company/logo")
        .authorization_bearer(&staff)
        .multipart(form)
        .await
        .assert_status(axum::http::StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn unknown_and_traversal_keys() {
    let env = common::TestEnv::start();
    let server = env.server_permissive();

    server
        .get("/uploads/resumes/nobody/missing.pdf")
        .await
        .assert_status_not_found();
    server
        .get("/uploads/resumes/..%2F..%2Fetc/passwd")
        .await
        .assert_status_bad_request();
}

#[tokio::test]
async fn svg_images_are_refused() {
    let env = common::TestEnv::start();
    let server = env.server_permissive();
    let student = env.student(&server, "ana@school.edu").await;
    let svg = br#"<svg xmlns="http://www.w3.org/2000/svg"><script>alert(1)</script></svg>"#;

    for (name, mime) in [("me.svg", "image/svg+xml"), ("me.svg", "image/png")] {
        let form = MultipartForm::new().add_part(
            "file",
            Part::bytes(svg.to_vec()).file_name(name).mime_type(mime),
        );
        let response = server
            .post("/api/students/me/avatar")
            .authorization_bearer(&student)
            .multipart(form)
            .await;
        response.assert_status_bad_request();
        let body: Value = response.json();
        assert!(body["message"].as_str().unwrap().contains("PNG"));
    }
    assert!(env.storage.objects.lock().unwrap().is_empty());
}
