pub mod app;
pub mod config;
pub mod error;
pub mod state;
pub mod auth {
    pub mod jwt;
    pub mod middleware;
    pub mod models;
    pub mod otp;
    pub mod password;
}
pub mod db {
    pub mod application_repository;
    pub mod company_repository;
    pub mod indexes;
    pub mod job_repository;
    pub mod models;
    pub mod notification_repository;
    pub mod otp_repository;
    pub mod report_repository;
    pub mod roster_repository;
    pub mod student_repository;
    pub mod user_repository;
}
pub mod mail {
    pub mod mailer;
    pub mod templates;
}
pub mod storage {
    pub mod client;
}
pub mod services {
    pub mod export;
    pub mod notify;
    pub mod roster;
    pub mod uploads;
}
pub mod api {
    pub mod admin;
    pub mod applications;
    pub mod auth;
    pub mod companies;
    pub mod errors;
    pub mod extract;
    pub mod jobs;
    pub mod notifications;
    pub mod stats;
    pub mod students;
}
