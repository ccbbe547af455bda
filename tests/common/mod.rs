#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use axum::Router;
use axum_test::multipart::{MultipartForm, Part};
use chrono::{Datelike, Utc};
use serde_json::{json, Value};

use internconnect::app::build_router;
use internconnect::auth::models::{Role, UserStatus};
use internconnect::auth::password::hash_password;
use internconnect::config::AppConfig;
use internconnect::db::application_repository::ApplicationRepository;
use internconnect::db::company_repository::CompanyMemberRepository;
use internconnect::db::job_repository::JobRepository;
use internconnect::db::models::{
    company_key, new_id, Application, ApplicationStatus, CompanyMember, Job, JobQuery, JobStatus,
    Notification, OtpCode, OtpPurpose, Roster, RosterImage, RosterPerson, Student, User,
};
use internconnect::db::notification_repository::NotificationRepository;
use internconnect::db::otp_repository::OtpRepository;
use internconnect::db::report_repository::{
    ApplicationExportRow, CompanyJobCount, JobApplicationCount, MonthCount, ReportRepository,
    StatusCount,
};
use internconnect::db::roster_repository::{RosterProfileUpdate, RosterRepository};
use internconnect::db::student_repository::StudentRepository;
use internconnect::db::user_repository::{UserFilter, UserRepository};
use internconnect::error::AppError;
use internconnect::mail::mailer::Mailer;
use internconnect::mail::templates::EmailMessage;
use internconnect::state::{AppState, Repositories};
use internconnect::storage::client::StorageClient;

pub const PASSWORD: &str = "correct-horse-42";

/// Every collection the server touches, kept in process memory.
#[derive(Default)]
pub struct MemoryStore {
    pub users: Mutex<Vec<User>>,
    pub students: Mutex<Vec<Student>>,
    pub members: Mutex<Vec<CompanyMember>>,
    pub rosters: Mutex<Vec<Roster>>,
    pub jobs: Mutex<Vec<Job>>,
    pub applications: Mutex<Vec<Application>>,
    pub notifications: Mutex<Vec<Notification>>,
    pub otps: Mutex<Vec<OtpCode>>,
    /// When set, company member writes fail like a dropped connection.
    pub fail_member_writes: AtomicBool,
}

fn matches_filter(user: &User, filter: &UserFilter) -> bool {
    filter.role.is_none_or(|r| user.role == r) && filter.status.is_none_or(|s| user.status == s)
}

fn contains_ci(haystack: &str, needle: Option<&str>) -> bool {
    match needle.map(str::trim).filter(|n| !n.is_empty()) {
        Some(needle) => haystack.to_lowercase().contains(&needle.to_lowercase()),
        None => true,
    }
}

#[async_trait]
impl UserRepository for MemoryStore {
    async fn insert(&self, user: User) -> Result<(), AppError> {
        let mut users = self.users.lock().unwrap();
        if users.iter().any(|u| u.email == user.email) {
            return Err(AppError::Conflict(format!(
                "Email '{}' is already registered",
                user.email
            )));
        }
        users.push(user);
        Ok(())
    }

    async fn find_by_id(&self, id: &str) -> Result<Option<User>, AppError> {
        Ok(self.users.lock().unwrap().iter().find(|u| u.id == id).cloned())
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<User>, AppError> {
        Ok(self
            .users
            .lock()
            .unwrap()
            .iter()
            .find(|u| u.email == email)
            .cloned())
    }

    async fn set_status(&self, id: &str, status: UserStatus) -> Result<bool, AppError> {
        let mut users = self.users.lock().unwrap();
        Ok(users
            .iter_mut()
            .find(|u| u.id == id)
            .map(|u| u.status = status)
            .is_some())
    }

    async fn set_role(&self, id: &str, role: Role) -> Result<bool, AppError> {
        let mut users = self.users.lock().unwrap();
        Ok(users
            .iter_mut()
            .find(|u| u.id == id)
            .map(|u| u.role = role)
            .is_some())
    }

    async fn set_password_hash(&self, id: &str, password_hash: &str) -> Result<bool, AppError> {
        let mut users = self.users.lock().unwrap();
        Ok(users
            .iter_mut()
            .find(|u| u.id == id)
            .map(|u| u.password_hash = password_hash.to_string())
            .is_some())
    }

    async fn list(&self, filter: UserFilter) -> Result<Vec<User>, AppError> {
        let mut users: Vec<User> = self
            .users
            .lock()
            .unwrap()
            .iter()
            .filter(|u| matches_filter(u, &filter))
            .cloned()
            .collect();
        users.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(users)
    }

    async fn delete(&self, id: &str) -> Result<bool, AppError> {
        let mut users = self.users.lock().unwrap();
        let before = users.len();
        users.retain(|u| u.id != id);
        Ok(users.len() < before)
    }

    async fn count(&self, filter: UserFilter) -> Result<u64, AppError> {
        Ok(self
            .users
            .lock()
            .unwrap()
            .iter()
            .filter(|u| matches_filter(u, &filter))
            .count() as u64)
    }
}

#[async_trait]
impl StudentRepository for MemoryStore {
    async fn save(&self, student: Student) -> Result<(), AppError> {
        let mut students = self.students.lock().unwrap();
        students.retain(|s| s.user_id != student.user_id);
        students.push(student);
        Ok(())
    }

    async fn find_by_user_id(&self, user_id: &str) -> Result<Option<Student>, AppError> {
        Ok(self
            .students
            .lock()
            .unwrap()
            .iter()
            .find(|s| s.user_id == user_id)
            .cloned())
    }

    async fn find_by_user_ids(&self, user_ids: &[String]) -> Result<Vec<Student>, AppError> {
        Ok(self
            .students
            .lock()
            .unwrap()
            .iter()
            .filter(|s| user_ids.contains(&s.user_id))
            .cloned()
            .collect())
    }

    async fn delete_by_user_id(&self, user_id: &str) -> Result<bool, AppError> {
        let mut students = self.students.lock().unwrap();
        let before = students.len();
        students.retain(|s| s.user_id != user_id);
        Ok(students.len() < before)
    }
}

#[async_trait]
impl CompanyMemberRepository for MemoryStore {
    async fn save(&self, member: CompanyMember) -> Result<(), AppError> {
        if self.fail_member_writes.load(Ordering::SeqCst) {
            return Err(AppError::Database("write timeout".into()));
        }
        let mut members = self.members.lock().unwrap();
        members.retain(|m| m.user_id != member.user_id);
        members.push(member);
        Ok(())
    }

    async fn find_by_user_id(&self, user_id: &str) -> Result<Option<CompanyMember>, AppError> {
        Ok(self
            .members
            .lock()
            .unwrap()
            .iter()
            .find(|m| m.user_id == user_id)
            .cloned())
    }

    async fn list_by_roster(&self, roster_id: &str) -> Result<Vec<CompanyMember>, AppError> {
        Ok(self
            .members
            .lock()
            .unwrap()
            .iter()
            .filter(|m| m.roster_id == roster_id)
            .cloned()
            .collect())
    }

    async fn delete_by_user_id(&self, user_id: &str) -> Result<bool, AppError> {
        let mut members = self.members.lock().unwrap();
        let before = members.len();
        members.retain(|m| m.user_id != user_id);
        Ok(members.len() < before)
    }
}

#[async_trait]
impl RosterRepository for MemoryStore {
    async fn insert(&self, roster: Roster) -> Result<(), AppError> {
        let mut rosters = self.rosters.lock().unwrap();
        if rosters.iter().any(|r| r.company_key == roster.company_key) {
            return Err(AppError::Conflict(format!(
                "A company named '{}' already exists",
                roster.company_name
            )));
        }
        rosters.push(roster);
        Ok(())
    }

    async fn find_by_id(&self, id: &str) -> Result<Option<Roster>, AppError> {
        Ok(self
            .rosters
            .lock()
            .unwrap()
            .iter()
            .find(|r| r.id == id)
            .cloned())
    }

    async fn find_by_key(&self, key: &str) -> Result<Option<Roster>, AppError> {
        Ok(self
            .rosters
            .lock()
            .unwrap()
            .iter()
            .find(|r| r.company_key == key)
            .cloned())
    }

    async fn claim_owner(&self, roster_id: &str, owner: RosterPerson) -> Result<bool, AppError> {
        let mut rosters = self.rosters.lock().unwrap();
        match rosters.iter_mut().find(|r| r.id == roster_id) {
            Some(roster) if roster.owner.is_none() => {
                roster.employees.push(owner.clone());
                roster.owner = Some(owner);
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn add_employee(
        &self,
        roster_id: &str,
        employee: RosterPerson,
    ) -> Result<bool, AppError> {
        let mut rosters = self.rosters.lock().unwrap();
        match rosters.iter_mut().find(|r| r.id == roster_id) {
            Some(roster) if !roster.employees.iter().any(|e| e.user_id == employee.user_id) => {
                roster.employees.push(employee);
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn remove_employee(&self, roster_id: &str, user_id: &str) -> Result<bool, AppError> {
        let mut rosters = self.rosters.lock().unwrap();
        let Some(roster) = rosters.iter_mut().find(|r| r.id == roster_id) else {
            return Ok(false);
        };
        let before = roster.employees.len();
        roster.employees.retain(|e| e.user_id != user_id);
        Ok(roster.employees.len() < before)
    }

    async fn release_owner(&self, roster_id: &str, user_id: &str) -> Result<bool, AppError> {
        let mut rosters = self.rosters.lock().unwrap();
        match rosters.iter_mut().find(|r| r.id == roster_id) {
            Some(roster) if roster.is_owner(user_id) => {
                roster.owner = None;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn delete_if_vacant(&self, roster_id: &str) -> Result<bool, AppError> {
        let mut rosters = self.rosters.lock().unwrap();
        let before = rosters.len();
        rosters.retain(|r| r.id != roster_id || r.owner.is_some() || !r.employees.is_empty());
        Ok(rosters.len() < before)
    }

    async fn update_profile(
        &self,
        roster_id: &str,
        update: RosterProfileUpdate,
    ) -> Result<Option<Roster>, AppError> {
        let mut rosters = self.rosters.lock().unwrap();
        if rosters
            .iter()
            .any(|r| r.id != roster_id && r.company_key == update.company_key)
        {
            return Err(AppError::Conflict(format!(
                "A company named '{}' already exists",
                update.company_name
            )));
        }
        Ok(rosters.iter_mut().find(|r| r.id == roster_id).map(|roster| {
            roster.company_name = update.company_name;
            roster.company_key = update.company_key;
            roster.industry = update.industry;
            roster.description = update.description;
            roster.website = update.website;
            roster.address = update.address;
            roster.updated_at = Utc::now();
            roster.clone()
        }))
    }

    async fn set_image(
        &self,
        roster_id: &str,
        image: RosterImage,
        key: &str,
    ) -> Result<bool, AppError> {
        let mut rosters = self.rosters.lock().unwrap();
        let Some(roster) = rosters.iter_mut().find(|r| r.id == roster_id) else {
            return Ok(false);
        };
        match image {
            RosterImage::Logo => roster.logo = Some(key.to_string()),
            RosterImage::Banner => roster.banner = Some(key.to_string()),
        }
        Ok(true)
    }

    async fn list_all(&self) -> Result<Vec<Roster>, AppError> {
        let mut rosters = self.rosters.lock().unwrap().clone();
        rosters.sort_by(|a, b| a.company_key.cmp(&b.company_key));
        Ok(rosters)
    }

    async fn count(&self) -> Result<u64, AppError> {
        Ok(self.rosters.lock().unwrap().len() as u64)
    }
}

#[async_trait]
impl JobRepository for MemoryStore {
    async fn insert(&self, job: Job) -> Result<(), AppError> {
        self.jobs.lock().unwrap().push(job);
        Ok(())
    }

    async fn find_by_id(&self, id: &str) -> Result<Option<Job>, AppError> {
        Ok(self.jobs.lock().unwrap().iter().find(|j| j.id == id).cloned())
    }

    async fn save(&self, job: Job) -> Result<bool, AppError> {
        let mut jobs = self.jobs.lock().unwrap();
        match jobs.iter_mut().find(|j| j.id == job.id) {
            Some(slot) => {
                *slot = job;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn set_status(&self, id: &str, status: JobStatus) -> Result<bool, AppError> {
        let mut jobs = self.jobs.lock().unwrap();
        Ok(jobs
            .iter_mut()
            .find(|j| j.id == id)
            .map(|j| j.status = status)
            .is_some())
    }

    async fn delete(&self, id: &str) -> Result<bool, AppError> {
        let mut jobs = self.jobs.lock().unwrap();
        let before = jobs.len();
        jobs.retain(|j| j.id != id);
        Ok(jobs.len() < before)
    }

    async fn search_open(&self, query: &JobQuery) -> Result<(Vec<Job>, u64), AppError> {
        let mut matching: Vec<Job> = self
            .jobs
            .lock()
            .unwrap()
            .iter()
            .filter(|j| j.status == JobStatus::Open)
            .filter(|j| contains_ci(&j.title, query.text.as_deref()))
            .filter(|j| contains_ci(&j.location, query.location.as_deref()))
            .filter(|j| query.work_type.is_none_or(|w| j.work_type == w))
            .cloned()
            .collect();
        matching.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        let total = matching.len() as u64;
        let page = matching
            .into_iter()
            .skip(query.skip as usize)
            .take(query.limit.max(0) as usize)
            .collect();
        Ok((page, total))
    }

    async fn list_by_roster(&self, roster_id: &str) -> Result<Vec<Job>, AppError> {
        let mut jobs: Vec<Job> = self
            .jobs
            .lock()
            .unwrap()
            .iter()
            .filter(|j| j.roster_id == roster_id)
            .cloned()
            .collect();
        jobs.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(jobs)
    }

    async fn list_all(&self, status: Option<JobStatus>) -> Result<Vec<Job>, AppError> {
        let mut jobs: Vec<Job> = self
            .jobs
            .lock()
            .unwrap()
            .iter()
            .filter(|j| status.is_none_or(|s| j.status == s))
            .cloned()
            .collect();
        jobs.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(jobs)
    }

    async fn count_by_status(&self, status: JobStatus) -> Result<u64, AppError> {
        Ok(self
            .jobs
            .lock()
            .unwrap()
            .iter()
            .filter(|j| j.status == status)
            .count() as u64)
    }
}

impl MemoryStore {
    fn applications_where(&self, predicate: impl Fn(&Application) -> bool) -> Vec<Application> {
        let mut found: Vec<Application> = self
            .applications
            .lock()
            .unwrap()
            .iter()
            .filter(|a| predicate(a))
            .cloned()
            .collect();
        found.sort_by(|a, b| b.applied_at.cmp(&a.applied_at));
        found
    }

    fn remove_applications(&self, predicate: impl Fn(&Application) -> bool) -> u64 {
        let mut applications = self.applications.lock().unwrap();
        let before = applications.len();
        applications.retain(|a| !predicate(a));
        (before - applications.len()) as u64
    }
}

#[async_trait]
impl ApplicationRepository for MemoryStore {
    async fn insert(&self, application: Application) -> Result<(), AppError> {
        let mut applications = self.applications.lock().unwrap();
        if applications
            .iter()
            .any(|a| a.job_id == application.job_id && a.student_id == application.student_id)
        {
            return Err(AppError::Conflict(
                "You have already applied to this job".into(),
            ));
        }
        applications.push(application);
        Ok(())
    }

    async fn find_by_id(&self, id: &str) -> Result<Option<Application>, AppError> {
        Ok(self.applications_where(|a| a.id == id).pop())
    }

    async fn list_by_student(&self, student_id: &str) -> Result<Vec<Application>, AppError> {
        Ok(self.applications_where(|a| a.student_id == student_id))
    }

    async fn list_by_job(&self, job_id: &str) -> Result<Vec<Application>, AppError> {
        Ok(self.applications_where(|a| a.job_id == job_id))
    }

    async fn list_by_roster(
        &self,
        roster_id: &str,
        status: Option<ApplicationStatus>,
    ) -> Result<Vec<Application>, AppError> {
        Ok(self.applications_where(|a| {
            a.roster_id == roster_id && status.is_none_or(|s| a.status == s)
        }))
    }

    async fn set_status(
        &self,
        id: &str,
        status: ApplicationStatus,
    ) -> Result<Option<Application>, AppError> {
        let mut applications = self.applications.lock().unwrap();
        Ok(applications.iter_mut().find(|a| a.id == id).map(|a| {
            a.status = status;
            a.updated_at = Utc::now();
            a.clone()
        }))
    }

    async fn delete(&self, id: &str) -> Result<bool, AppError> {
        Ok(self.remove_applications(|a| a.id == id) > 0)
    }

    async fn delete_by_job(&self, job_id: &str) -> Result<u64, AppError> {
        Ok(self.remove_applications(|a| a.job_id == job_id))
    }

    async fn delete_by_student(&self, student_id: &str) -> Result<u64, AppError> {
        Ok(self.remove_applications(|a| a.student_id == student_id))
    }

    async fn count_all(&self) -> Result<u64, AppError> {
        Ok(self.applications.lock().unwrap().len() as u64)
    }
}

#[async_trait]
impl NotificationRepository for MemoryStore {
    async fn insert_many(&self, notifications: Vec<Notification>) -> Result<(), AppError> {
        self.notifications.lock().unwrap().extend(notifications);
        Ok(())
    }

    async fn list_for(
        &self,
        recipient_id: &str,
        unread_only: bool,
        limit: i64,
    ) -> Result<Vec<Notification>, AppError> {
        let mut found: Vec<Notification> = self
            .notifications
            .lock()
            .unwrap()
            .iter()
            .filter(|n| n.recipient_id == recipient_id && (!unread_only || !n.read))
            .cloned()
            .collect();
        found.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        found.truncate(limit.max(0) as usize);
        Ok(found)
    }

    async fn unread_count(&self, recipient_id: &str) -> Result<u64, AppError> {
        Ok(self
            .notifications
            .lock()
            .unwrap()
            .iter()
            .filter(|n| n.recipient_id == recipient_id && !n.read)
            .count() as u64)
    }

    async fn mark_read(&self, id: &str, recipient_id: &str) -> Result<bool, AppError> {
        let mut notifications = self.notifications.lock().unwrap();
        Ok(notifications
            .iter_mut()
            .find(|n| n.id == id && n.recipient_id == recipient_id)
            .map(|n| n.read = true)
            .is_some())
    }

    async fn mark_all_read(&self, recipient_id: &str) -> Result<u64, AppError> {
        let mut updated = 0;
        for n in self.notifications.lock().unwrap().iter_mut() {
            if n.recipient_id == recipient_id && !n.read {
                n.read = true;
                updated += 1;
            }
        }
        Ok(updated)
    }

    async fn delete(&self, id: &str, recipient_id: &str) -> Result<bool, AppError> {
        let mut notifications = self.notifications.lock().unwrap();
        let before = notifications.len();
        notifications.retain(|n| !(n.id == id && n.recipient_id == recipient_id));
        Ok(notifications.len() < before)
    }

    async fn delete_for(&self, recipient_id: &str) -> Result<u64, AppError> {
        let mut notifications = self.notifications.lock().unwrap();
        let before = notifications.len();
        notifications.retain(|n| n.recipient_id != recipient_id);
        Ok((before - notifications.len()) as u64)
    }
}

#[async_trait]
impl OtpRepository for MemoryStore {
    async fn put(&self, code: OtpCode) -> Result<(), AppError> {
        let mut otps = self.otps.lock().unwrap();
        otps.retain(|o| !(o.email == code.email && o.purpose == code.purpose));
        otps.push(code);
        Ok(())
    }

    async fn find(&self, email: &str, purpose: OtpPurpose) -> Result<Option<OtpCode>, AppError> {
        Ok(self
            .otps
            .lock()
            .unwrap()
            .iter()
            .find(|o| o.email == email && o.purpose == purpose)
            .cloned())
    }

    async fn record_failed_attempt(
        &self,
        email: &str,
        purpose: OtpPurpose,
    ) -> Result<(), AppError> {
        if let Some(otp) = self
            .otps
            .lock()
            .unwrap()
            .iter_mut()
            .find(|o| o.email == email && o.purpose == purpose)
        {
            otp.attempts += 1;
        }
        Ok(())
    }

    async fn delete(&self, email: &str, purpose: OtpPurpose) -> Result<(), AppError> {
        self.otps
            .lock()
            .unwrap()
            .retain(|o| !(o.email == email && o.purpose == purpose));
        Ok(())
    }
}

fn tally<K: std::hash::Hash + Eq>(keys: impl Iterator<Item = K>) -> HashMap<K, u64> {
    let mut counts = HashMap::new();
    for key in keys {
        *counts.entry(key).or_insert(0) += 1;
    }
    counts
}

#[async_trait]
impl ReportRepository for MemoryStore {
    async fn job_status_counts(&self) -> Result<Vec<StatusCount>, AppError> {
        let jobs = self.jobs.lock().unwrap();
        Ok(tally(jobs.iter().map(|j| j.status.as_str()))
            .into_iter()
            .map(|(status, count)| StatusCount {
                status: status.to_string(),
                count,
            })
            .collect())
    }

    async fn top_companies_by_jobs(&self, limit: i64) -> Result<Vec<CompanyJobCount>, AppError> {
        let jobs = self.jobs.lock().unwrap();
        let mut rows: Vec<CompanyJobCount> = tally(jobs.iter().map(|j| j.roster_id.clone()))
            .into_iter()
            .map(|(roster_id, count)| CompanyJobCount {
                company_name: jobs
                    .iter()
                    .find(|j| j.roster_id == roster_id)
                    .map(|j| j.company.name.clone())
                    .unwrap_or_default(),
                roster_id,
                jobs: count,
            })
            .collect();
        rows.sort_by(|a, b| b.jobs.cmp(&a.jobs).then(a.company_name.cmp(&b.company_name)));
        rows.truncate(limit.max(0) as usize);
        Ok(rows)
    }

    async fn monthly_application_counts(&self, year: i32) -> Result<Vec<MonthCount>, AppError> {
        let applications = self.applications.lock().unwrap();
        let mut rows: Vec<MonthCount> = tally(
            applications
                .iter()
                .filter(|a| a.applied_at.year() == year)
                .map(|a| a.applied_at.month()),
        )
        .into_iter()
        .map(|(month, count)| MonthCount { month, count })
        .collect();
        rows.sort_by_key(|r| r.month);
        Ok(rows)
    }

    async fn application_status_counts(&self, year: i32) -> Result<Vec<StatusCount>, AppError> {
        let applications = self.applications.lock().unwrap();
        Ok(tally(
            applications
                .iter()
                .filter(|a| a.applied_at.year() == year)
                .map(|a| a.status.as_str()),
        )
        .into_iter()
        .map(|(status, count)| StatusCount {
            status: status.to_string(),
            count,
        })
        .collect())
    }

    async fn job_application_counts(
        &self,
        roster_id: &str,
    ) -> Result<Vec<JobApplicationCount>, AppError> {
        let applications = self.applications.lock().unwrap();
        Ok(tally(
            applications
                .iter()
                .filter(|a| a.roster_id == roster_id)
                .map(|a| a.job_id.clone()),
        )
        .into_iter()
        .map(|(job_id, count)| JobApplicationCount { job_id, count })
        .collect())
    }

    async fn application_export_rows(
        &self,
        roster_id: &str,
    ) -> Result<Vec<ApplicationExportRow>, AppError> {
        let applications = self.applications_where(|a| a.roster_id == roster_id);
        let students = self.students.lock().unwrap();
        Ok(applications
            .into_iter()
            .map(|a| {
                let student = students.iter().find(|s| s.user_id == a.student_id);
                ApplicationExportRow {
                    applicant_name: student.map(|s| s.full_name()).unwrap_or_default(),
                    email: student.map(|s| s.email.clone()).unwrap_or_default(),
                    school: student.map(|s| s.school.clone()).unwrap_or_default(),
                    course: student.map(|s| s.course.clone()).unwrap_or_default(),
                    job_title: a.job_title,
                    status: a.status.as_str().to_string(),
                    applied_at: a.applied_at,
                }
            })
            .collect())
    }
}

/// Object storage backed by a map.
#[derive(Default)]
pub struct MemoryStorage {
    pub objects: Mutex<HashMap<String, Vec<u8>>>,
}

#[async_trait]
impl StorageClient for MemoryStorage {
    async fn put_object(&self, key: &str, content: Vec<u8>) -> Result<(), AppError> {
        self.objects
            .lock()
            .unwrap()
            .insert(key.to_string(), content);
        Ok(())
    }

    async fn get_object(&self, key: &str) -> Result<Option<Vec<u8>>, AppError> {
        Ok(self.objects.lock().unwrap().get(key).cloned())
    }

    async fn delete_object(&self, key: &str) -> Result<(), AppError> {
        self.objects.lock().unwrap().remove(key);
        Ok(())
    }
}

/// Keeps every message so tests can read the emailed codes.
#[derive(Default)]
pub struct RecordingMailer {
    pub sent: Mutex<Vec<EmailMessage>>,
}

impl RecordingMailer {
    /// The six-digit code in the most recent message sent to `email`.
    pub fn last_code_for(&self, email: &str) -> String {
        let sent = self.sent.lock().unwrap();
        let message = sent
            .iter()
            .rev()
            .find(|m| m.to == email)
            .unwrap_or_else(|| panic!("No email sent to {email}"));
        message
            .body
            .lines()
            .map(str::trim)
            .find(|line| line.len() == 6 && line.chars().all(|c| c.is_ascii_digit()))
            .unwrap_or_else(|| panic!("No code in email body: {}", message.body))
            .to_string()
    }
}

#[async_trait]
impl Mailer for RecordingMailer {
    async fn send(&self, message: EmailMessage) -> Result<(), AppError> {
        self.sent.lock().unwrap().push(message);
        Ok(())
    }
}

/// The full router over in-memory backends.
pub struct TestEnv {
    pub router: Router,
    pub store: Arc<MemoryStore>,
    pub storage: Arc<MemoryStorage>,
    pub mailer: Arc<RecordingMailer>,
}

impl TestEnv {
    pub fn start() -> Self {
        let store = Arc::new(MemoryStore::default());
        let storage = Arc::new(MemoryStorage::default());
        let mailer = Arc::new(RecordingMailer::default());

        let repos = Repositories {
            users: store.clone(),
            students: store.clone(),
            members: store.clone(),
            rosters: store.clone(),
            jobs: store.clone(),
            applications: store.clone(),
            notifications: store.clone(),
            otps: store.clone(),
            reports: store.clone(),
        };
        let config = AppConfig::for_tests("integration-test-secret-0123456789");
        let state = AppState::new(config, repos, storage.clone(), mailer.clone())
            .expect("Failed to build application state");

        Self {
            router: build_router(state),
            store,
            storage,
            mailer,
        }
    }

    /// Build an `axum_test::TestServer` from this environment's router.
    pub fn server(&self) -> axum_test::TestServer {
        axum_test::TestServer::builder()
            .save_cookies()
            .expect_success_by_default()
            .try_build(self.router.clone())
            .expect("Failed to build TestServer")
    }

    /// Build a `TestServer` that does NOT expect success by default (for error tests).
    pub fn server_permissive(&self) -> axum_test::TestServer {
        axum_test::TestServer::builder()
            .save_cookies()
            .try_build(self.router.clone())
            .expect("Failed to build TestServer")
    }

    /// Register, verify and return the session token.
    pub async fn student(&self, server: &axum_test::TestServer, email: &str) -> String {
        server
            .post("/api/auth/register")
            .json(&json!({
                "email": email,
                "password": PASSWORD,
                "role": "student",
                "first_name": "Ana",
                "last_name": "Reyes",
            }))
            .await
            .assert_status(axum::http::StatusCode::CREATED);
        self.verify(server, email).await
    }

    pub async fn company(
        &self,
        server: &axum_test::TestServer,
        email: &str,
        company_name: &str,
        is_owner: bool,
    ) -> String {
        server
            .post("/api/auth/register")
            .json(&json!({
                "email": email,
                "password": PASSWORD,
                "role": "company",
                "first_name": "Ben",
                "last_name": "Cruz",
                "company_name": company_name,
                "position": "HR",
                "is_owner": is_owner,
            }))
            .await
            .assert_status(axum::http::StatusCode::CREATED);
        self.verify(server, email).await
    }

    pub async fn verify(&self, server: &axum_test::TestServer, email: &str) -> String {
        let code = self.mailer.last_code_for(email);
        let body: Value = server
            .post("/api/auth/verify-otp")
            .json(&json!({ "email": email, "code": code }))
            .await
            .json();
        body["token"]
            .as_str()
            .expect("verify-otp should return a token")
            .to_string()
    }

    /// Seed an active admin directly and log in.
    pub async fn admin(&self, server: &axum_test::TestServer, email: &str) -> String {
        let now = Utc::now();
        self.store.users.lock().unwrap().push(User {
            id: new_id(),
            email: email.to_string(),
            password_hash: hash_password(PASSWORD).expect("hash"),
            role: Role::Admin,
            status: UserStatus::Active,
            created_at: now,
            updated_at: now,
        });
        let body: Value = server
            .post("/api/auth/login")
            .json(&json!({ "email": email, "password": PASSWORD }))
            .await
            .json();
        body["token"].as_str().expect("login token").to_string()
    }

    /// Create an open job as the given company member and return its id.
    pub async fn open_job(&self, server: &axum_test::TestServer, token: &str, title: &str) -> String {
        let body: Value = server
            .post("/api/jobs")
            .authorization_bearer(token)
            .json(&json!({
                "title": title,
                "description": "Build and test backend services.",
                "location": "Makati City",
                "work_type": "hybrid",
                "slots": 2,
                "skills": ["Rust", "MongoDB"],
                "screening_questions": ["Why this role?"],
                "status": "Open",
            }))
            .await
            .json();
        body["_id"].as_str().expect("job id").to_string()
    }

    /// Upload a small PDF as the student's resume and return its key.
    pub async fn upload_resume(&self, server: &axum_test::TestServer, token: &str) -> String {
        let form = MultipartForm::new().add_part(
            "file",
            Part::bytes(b"%PDF-1.4\n%test resume\n".to_vec())
                .file_name("resume.pdf")
                .mime_type("application/pdf"),
        );
        let body: Value = server
            .post("/api/students/me/resume")
            .authorization_bearer(token)
            .multipart(form)
            .await
            .json();
        body["key"].as_str().expect("resume key").to_string()
    }

    pub fn roster_by_name(&self, company_name: &str) -> Option<Roster> {
        let key = company_key(company_name);
        self.store
            .rosters
            .lock()
            .unwrap()
            .iter()
            .find(|r| r.company_key == key)
            .cloned()
    }
}
