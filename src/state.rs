use std::sync::Arc;

use crate::auth::jwt::TokenService;
use crate::config::AppConfig;
use crate::db::application_repository::{ApplicationRepository, MongoApplicationRepository};
use crate::db::company_repository::{CompanyMemberRepository, MongoCompanyMemberRepository};
use crate::db::job_repository::{JobRepository, MongoJobRepository};
use crate::db::notification_repository::{MongoNotificationRepository, NotificationRepository};
use crate::db::otp_repository::{MongoOtpRepository, OtpRepository};
use crate::db::report_repository::{MongoReportRepository, ReportRepository};
use crate::db::roster_repository::{MongoRosterRepository, RosterRepository};
use crate::db::student_repository::{MongoStudentRepository, StudentRepository};
use crate::db::user_repository::{MongoUserRepository, UserRepository};
use crate::error::AppError;
use crate::mail::mailer::{self, Mailer};
use crate::mail::templates::EmailTemplates;
use crate::storage::client::{self, StorageClient};

/// One handle per collection.
#[derive(Clone)]
pub struct Repositories {
    pub users: Arc<dyn UserRepository>,
    pub students: Arc<dyn StudentRepository>,
    pub members: Arc<dyn CompanyMemberRepository>,
    pub rosters: Arc<dyn RosterRepository>,
    pub jobs: Arc<dyn JobRepository>,
    pub applications: Arc<dyn ApplicationRepository>,
    pub notifications: Arc<dyn NotificationRepository>,
    pub otps: Arc<dyn OtpRepository>,
    pub reports: Arc<dyn ReportRepository>,
}

impl Repositories {
    pub fn mongo(db: &mongodb::Database) -> Self {
        Self {
            users: Arc::new(MongoUserRepository::new(db)),
            students: Arc::new(MongoStudentRepository::new(db)),
            members: Arc::new(MongoCompanyMemberRepository::new(db)),
            rosters: Arc::new(MongoRosterRepository::new(db)),
            jobs: Arc::new(MongoJobRepository::new(db)),
            applications: Arc::new(MongoApplicationRepository::new(db)),
            notifications: Arc::new(MongoNotificationRepository::new(db)),
            otps: Arc::new(MongoOtpRepository::new(db)),
            reports: Arc::new(MongoReportRepository::new(db)),
        }
    }
}

/// Shared state handed to every handler.
#[derive(Clone)]
pub struct AppState {
    pub repos: Repositories,
    pub storage: Arc<dyn StorageClient>,
    pub mailer: Arc<dyn Mailer>,
    pub templates: Arc<EmailTemplates>,
    pub tokens: Arc<TokenService>,
    pub config: Arc<AppConfig>,
}

impl AppState {
    pub fn new(
        config: AppConfig,
        repos: Repositories,
        storage: Arc<dyn StorageClient>,
        mailer: Arc<dyn Mailer>,
    ) -> Result<Self, AppError> {
        let tokens = TokenService::new(&config.jwt_secret, config.jwt_ttl_hours);
        Ok(Self {
            repos,
            storage,
            mailer,
            templates: Arc::new(EmailTemplates::new()?),
            tokens: Arc::new(tokens),
            config: Arc::new(config),
        })
    }

    /// Connect to MongoDB, make sure indexes exist and wire the configured
    /// storage and mail backends.
    pub async fn connect(config: AppConfig) -> Result<Self, AppError> {
        let client = mongodb::Client::with_uri_str(&config.mongodb_uri).await?;
        let db = client.database(&config.mongodb_database);
        crate::db::indexes::ensure_indexes(&db).await?;

        let storage: Arc<dyn StorageClient> = client::from_config(&config.storage).await?.into();
        let mailer: Arc<dyn Mailer> = mailer::from_config(&config.smtp)?.into();

        Self::new(config, Repositories::mongo(&db), storage, mailer)
    }
}
