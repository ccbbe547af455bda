use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::auth::models::{Role, UserStatus};

/// Stored timestamps: RFC 3339 UTC with a fixed six-digit fraction, so
/// string order matches time order.
pub mod timestamp {
    use chrono::{DateTime, SecondsFormat, Utc};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn format(at: &DateTime<Utc>) -> String {
        at.to_rfc3339_opts(SecondsFormat::Micros, true)
    }

    pub fn now() -> String {
        format(&Utc::now())
    }

    pub fn serialize<S: Serializer>(at: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&format(at))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<DateTime<Utc>, D::Error> {
        let raw = String::deserialize(deserializer)?;
        DateTime::parse_from_rfc3339(&raw)
            .map(|at| at.with_timezone(&Utc))
            .map_err(serde::de::Error::custom)
    }
}

/// New random document id.
pub fn new_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

/// Normalize a company name into its roster key: trimmed, inner whitespace
/// collapsed to single spaces, lowercased.
pub fn company_key(name: &str) -> String {
    name.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

/// An account in the `users` collection. Source of truth for authentication.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    #[serde(rename = "_id")]
    pub id: String,
    /// Always stored lowercase.
    pub email: String,
    pub password_hash: String,
    pub role: Role,
    pub status: UserStatus,
    #[serde(with = "timestamp")]
    pub created_at: DateTime<Utc>,
    #[serde(with = "timestamp")]
    pub updated_at: DateTime<Utc>,
}

/// Public view of a `User`, without the password hash.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserView {
    #[serde(rename = "_id")]
    pub id: String,
    pub email: String,
    pub role: Role,
    pub status: UserStatus,
    #[serde(with = "timestamp")]
    pub created_at: DateTime<Utc>,
}

impl From<&User> for UserView {
    fn from(user: &User) -> Self {
        Self {
            id: user.id.clone(),
            email: user.email.clone(),
            role: user.role,
            status: user.status,
            created_at: user.created_at,
        }
    }
}

/// Student profile in `student_users`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Student {
    #[serde(rename = "_id")]
    pub id: String,
    pub user_id: String,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    #[serde(default)]
    pub school: String,
    #[serde(default)]
    pub course: String,
    #[serde(default)]
    pub year_level: Option<u8>,
    #[serde(default)]
    pub phone: String,
    #[serde(default)]
    pub location: String,
    #[serde(default)]
    pub bio: String,
    #[serde(default)]
    pub skills: Vec<String>,
    #[serde(default)]
    pub experience: Vec<ExperienceEntry>,
    #[serde(default)]
    pub education: Vec<EducationEntry>,
    #[serde(default)]
    pub certifications: Vec<CertificationEntry>,
    #[serde(default)]
    pub reminders: Vec<Reminder>,
    /// Storage key of the uploaded resume.
    #[serde(default)]
    pub resume: Option<String>,
    #[serde(default)]
    pub avatar: Option<String>,
    #[serde(with = "timestamp")]
    pub created_at: DateTime<Utc>,
    #[serde(with = "timestamp")]
    pub updated_at: DateTime<Utc>,
}

impl Student {
    pub fn new(user_id: &str, email: &str, first_name: &str, last_name: &str) -> Self {
        let now = Utc::now();
        Self {
            id: new_id(),
            user_id: user_id.to_string(),
            email: email.to_string(),
            first_name: first_name.trim().to_string(),
            last_name: last_name.trim().to_string(),
            school: String::new(),
            course: String::new(),
            year_level: None,
            phone: String::new(),
            location: String::new(),
            bio: String::new(),
            skills: vec![],
            experience: vec![],
            education: vec![],
            certifications: vec![],
            reminders: vec![],
            resume: None,
            avatar: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn full_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
            .trim()
            .to_string()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExperienceEntry {
    #[serde(rename = "_id")]
    pub id: String,
    pub title: String,
    pub organization: String,
    pub start_date: NaiveDate,
    #[serde(default)]
    pub end_date: Option<NaiveDate>,
    #[serde(default)]
    pub description: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EducationEntry {
    #[serde(rename = "_id")]
    pub id: String,
    pub school: String,
    pub degree: String,
    pub start_year: i32,
    #[serde(default)]
    pub end_year: Option<i32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CertificationEntry {
    #[serde(rename = "_id")]
    pub id: String,
    pub name: String,
    pub issuer: String,
    #[serde(default)]
    pub issued_on: Option<NaiveDate>,
    #[serde(default)]
    pub url: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Reminder {
    #[serde(rename = "_id")]
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub due_date: Option<NaiveDate>,
    #[serde(default)]
    pub done: bool,
}

/// Per-person company profile in `company_users`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompanyMember {
    #[serde(rename = "_id")]
    pub id: String,
    pub user_id: String,
    pub roster_id: String,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    /// Role title inside the company, e.g. "HR Manager".
    #[serde(default)]
    pub position: String,
    #[serde(default)]
    pub phone: String,
    #[serde(default)]
    pub is_owner: bool,
    #[serde(with = "timestamp")]
    pub created_at: DateTime<Utc>,
    #[serde(with = "timestamp")]
    pub updated_at: DateTime<Utc>,
}

impl CompanyMember {
    pub fn full_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
            .trim()
            .to_string()
    }
}

/// A person listed on a roster.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RosterPerson {
    pub user_id: String,
    pub name: String,
    pub email: String,
    #[serde(default)]
    pub position: String,
    #[serde(with = "timestamp")]
    pub joined_at: DateTime<Utc>,
}

/// Company roster in `company_employees`, one per normalized company name.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Roster {
    #[serde(rename = "_id")]
    pub id: String,
    /// Display form of the name as first registered.
    pub company_name: String,
    /// Unique, see [`company_key`].
    pub company_key: String,
    #[serde(default)]
    pub owner: Option<RosterPerson>,
    #[serde(default)]
    pub employees: Vec<RosterPerson>,
    #[serde(default)]
    pub industry: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub website: String,
    #[serde(default)]
    pub address: String,
    #[serde(default)]
    pub logo: Option<String>,
    #[serde(default)]
    pub banner: Option<String>,
    #[serde(with = "timestamp")]
    pub created_at: DateTime<Utc>,
    #[serde(with = "timestamp")]
    pub updated_at: DateTime<Utc>,
}

impl Roster {
    pub fn new(company_name: &str) -> Self {
        let now = Utc::now();
        let display = company_name.split_whitespace().collect::<Vec<_>>().join(" ");
        Self {
            id: new_id(),
            company_key: company_key(&display),
            company_name: display,
            owner: None,
            employees: vec![],
            industry: String::new(),
            description: String::new(),
            website: String::new(),
            address: String::new(),
            logo: None,
            banner: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn is_owner(&self, user_id: &str) -> bool {
        self.owner.as_ref().is_some_and(|o| o.user_id == user_id)
    }

    /// Everyone who should hear about roster activity: owner plus employees.
    pub fn member_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.employees.iter().map(|e| e.user_id.clone()).collect();
        if let Some(owner) = &self.owner {
            if !ids.contains(&owner.user_id) {
                ids.push(owner.user_id.clone());
            }
        }
        ids
    }
}

/// Which roster image slot an upload targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RosterImage {
    Logo,
    Banner,
}

impl RosterImage {
    pub fn field(&self) -> &'static str {
        match self {
            RosterImage::Logo => "logo",
            RosterImage::Banner => "banner",
        }
    }
}

/// Company fields copied into a job at creation time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompanySnapshot {
    pub name: String,
    #[serde(default)]
    pub industry: String,
    #[serde(default)]
    pub address: String,
    #[serde(default)]
    pub logo: Option<String>,
}

impl From<&Roster> for CompanySnapshot {
    fn from(roster: &Roster) -> Self {
        Self {
            name: roster.company_name.clone(),
            industry: roster.industry.clone(),
            address: roster.address.clone(),
            logo: roster.logo.clone(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum JobStatus {
    Open,
    Closed,
    Draft,
}

impl JobStatus {
    pub const ALL: [JobStatus; 3] = [JobStatus::Open, JobStatus::Closed, JobStatus::Draft];

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "open" => Some(JobStatus::Open),
            "closed" => Some(JobStatus::Closed),
            "draft" => Some(JobStatus::Draft),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Open => "Open",
            JobStatus::Closed => "Closed",
            JobStatus::Draft => "Draft",
        }
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WorkType {
    Onsite,
    Remote,
    Hybrid,
}

impl WorkType {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().replace(['-', ' '], "").as_str() {
            "onsite" => Some(WorkType::Onsite),
            "remote" => Some(WorkType::Remote),
            "hybrid" => Some(WorkType::Hybrid),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            WorkType::Onsite => "onsite",
            WorkType::Remote => "remote",
            WorkType::Hybrid => "hybrid",
        }
    }
}

/// A posting in `jobs`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    #[serde(rename = "_id")]
    pub id: String,
    pub roster_id: String,
    pub posted_by: String,
    pub company: CompanySnapshot,
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub location: String,
    pub work_type: WorkType,
    pub slots: u32,
    #[serde(default)]
    pub allowance: Option<String>,
    #[serde(default)]
    pub skills: Vec<String>,
    #[serde(default)]
    pub requirements: Vec<String>,
    #[serde(default)]
    pub responsibilities: Vec<String>,
    #[serde(default)]
    pub offers: Vec<String>,
    #[serde(default)]
    pub screening_questions: Vec<String>,
    pub status: JobStatus,
    #[serde(default)]
    pub start_date: Option<NaiveDate>,
    #[serde(default)]
    pub end_date: Option<NaiveDate>,
    #[serde(default)]
    pub deadline: Option<NaiveDate>,
    #[serde(with = "timestamp")]
    pub created_at: DateTime<Utc>,
    #[serde(with = "timestamp")]
    pub updated_at: DateTime<Utc>,
}

impl Job {
    /// Open and not past its deadline (the deadline day itself still counts).
    pub fn accepts_applications(&self, today: NaiveDate) -> bool {
        self.status == JobStatus::Open && self.deadline.is_none_or(|d| d >= today)
    }
}

/// Filters for the public job board.
#[derive(Debug, Clone, Default)]
pub struct JobQuery {
    /// Case-insensitive substring of the title.
    pub text: Option<String>,
    /// Case-insensitive substring of the location.
    pub location: Option<String>,
    pub work_type: Option<WorkType>,
    pub skip: u64,
    pub limit: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ApplicationStatus {
    New,
    #[serde(rename = "Under Review")]
    UnderReview,
    Accepted,
    Rejected,
}

impl ApplicationStatus {
    pub const ALL: [ApplicationStatus; 4] = [
        ApplicationStatus::New,
        ApplicationStatus::UnderReview,
        ApplicationStatus::Accepted,
        ApplicationStatus::Rejected,
    ];

    /// Parse a status string. Accepts the display form and a few spellings
    /// older dashboards send (`under_review`, `UnderReview`).
    pub fn parse(s: &str) -> Option<Self> {
        let normalized: String = s
            .trim()
            .chars()
            .filter(|c| !matches!(c, ' ' | '_' | '-'))
            .collect::<String>()
            .to_lowercase();
        match normalized.as_str() {
            "new" => Some(ApplicationStatus::New),
            "underreview" => Some(ApplicationStatus::UnderReview),
            "accepted" => Some(ApplicationStatus::Accepted),
            "rejected" => Some(ApplicationStatus::Rejected),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ApplicationStatus::New => "New",
            ApplicationStatus::UnderReview => "Under Review",
            ApplicationStatus::Accepted => "Accepted",
            ApplicationStatus::Rejected => "Rejected",
        }
    }

    /// `Accepted` and `Rejected` are final.
    pub fn is_final(&self) -> bool {
        matches!(self, ApplicationStatus::Accepted | ApplicationStatus::Rejected)
    }

    pub fn can_transition_to(&self, next: ApplicationStatus) -> bool {
        use ApplicationStatus::*;
        matches!(
            (self, next),
            (New, UnderReview) | (New, Accepted) | (New, Rejected)
                | (UnderReview, Accepted) | (UnderReview, Rejected)
        )
    }
}

impl fmt::Display for ApplicationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScreeningAnswer {
    pub question: String,
    pub answer: String,
}

/// A student's submission in `applications`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Application {
    #[serde(rename = "_id")]
    pub id: String,
    /// The student's user id.
    pub student_id: String,
    pub job_id: String,
    pub roster_id: String,
    pub status: ApplicationStatus,
    pub resume: String,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub screening_answers: Vec<ScreeningAnswer>,
    pub job_title: String,
    pub company_name: String,
    #[serde(with = "timestamp")]
    pub applied_at: DateTime<Utc>,
    #[serde(with = "timestamp")]
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    ApplicationReceived,
    ApplicationStatus,
    JobClosed,
    System,
}

/// Entry in `notifications`. One shape for every sender.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Notification {
    #[serde(rename = "_id")]
    pub id: String,
    pub recipient_id: String,
    pub kind: NotificationKind,
    pub title: String,
    pub message: String,
    #[serde(default)]
    pub link: Option<String>,
    #[serde(default)]
    pub read: bool,
    #[serde(with = "timestamp")]
    pub created_at: DateTime<Utc>,
}

impl Notification {
    pub fn new(
        recipient_id: &str,
        kind: NotificationKind,
        title: impl Into<String>,
        message: impl Into<String>,
        link: Option<String>,
    ) -> Self {
        Self {
            id: new_id(),
            recipient_id: recipient_id.to_string(),
            kind,
            title: title.into(),
            message: message.into(),
            link,
            read: false,
            created_at: Utc::now(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OtpPurpose {
    Verify,
    Reset,
}

/// Pending one-time code in `otp_codes`; one per (email, purpose).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OtpCode {
    pub email: String,
    pub purpose: OtpPurpose,
    pub code_hash: String,
    #[serde(with = "timestamp")]
    pub expires_at: DateTime<Utc>,
    #[serde(default)]
    pub attempts: u32,
}
