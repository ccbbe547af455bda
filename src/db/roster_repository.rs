use async_trait::async_trait;
use futures::TryStreamExt;
use mongodb::bson::{doc, to_bson};
use mongodb::options::ReturnDocument;

use crate::db::models::{timestamp, Roster, RosterImage, RosterPerson};
use crate::error::{is_duplicate_key, AppError};

/// Company-level profile fields editable by the roster owner.
#[derive(Debug, Clone, PartialEq)]
pub struct RosterProfileUpdate {
    pub company_name: String,
    pub company_key: String,
    pub industry: String,
    pub description: String,
    pub website: String,
    pub address: String,
}

/// Repository trait for company rosters (`company_employees`).
///
/// Rosters are unique per `company_key`; implementations must reject a
/// second roster with the same key with `AppError::Conflict`.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait RosterRepository: Send + Sync {
    async fn insert(&self, roster: Roster) -> Result<(), AppError>;

    async fn find_by_id(&self, id: &str) -> Result<Option<Roster>, AppError>;

    async fn find_by_key(&self, company_key: &str) -> Result<Option<Roster>, AppError>;

    /// Atomically set the owner if the slot is still empty, and list the
    /// owner among the employees. Returns `false` if the slot was taken.
    async fn claim_owner(&self, roster_id: &str, owner: RosterPerson) -> Result<bool, AppError>;

    /// Add an employee unless one with the same `user_id` is already listed.
    /// Returns `false` if nothing was added.
    async fn add_employee(&self, roster_id: &str, employee: RosterPerson)
        -> Result<bool, AppError>;

    async fn remove_employee(&self, roster_id: &str, user_id: &str) -> Result<bool, AppError>;

    /// Empty the owner slot if `user_id` holds it.
    async fn release_owner(&self, roster_id: &str, user_id: &str) -> Result<bool, AppError>;

    /// Delete the roster if it has neither an owner nor employees.
    async fn delete_if_vacant(&self, roster_id: &str) -> Result<bool, AppError>;

    async fn update_profile(
        &self,
        roster_id: &str,
        update: RosterProfileUpdate,
    ) -> Result<Option<Roster>, AppError>;

    async fn set_image(
        &self,
        roster_id: &str,
        image: RosterImage,
        key: &str,
    ) -> Result<bool, AppError>;

    /// Sorted by company name.
    async fn list_all(&self) -> Result<Vec<Roster>, AppError>;

    async fn count(&self) -> Result<u64, AppError>;
}

/// MongoDB implementation of the RosterRepository.
pub struct MongoRosterRepository {
    collection: mongodb::Collection<Roster>,
}

impl MongoRosterRepository {
    pub fn new(db: &mongodb::Database) -> Self {
        Self {
            collection: db.collection("company_employees"),
        }
    }
}

#[async_trait]
impl RosterRepository for MongoRosterRepository {
    async fn insert(&self, roster: Roster) -> Result<(), AppError> {
        match self.collection.insert_one(&roster).await {
            Ok(_) => Ok(()),
            Err(e) if is_duplicate_key(&e) => Err(AppError::Conflict(format!(
                "A company named '{}' already exists",
                roster.company_name
            ))),
            Err(e) => Err(e.into()),
        }
    }

    async fn find_by_id(&self, id: &str) -> Result<Option<Roster>, AppError> {
        Ok(self.collection.find_one(doc! { "_id": id }).await?)
    }

    async fn find_by_key(&self, company_key: &str) -> Result<Option<Roster>, AppError> {
        Ok(self
            .collection
            .find_one(doc! { "company_key": company_key })
            .await?)
    }

    async fn claim_owner(&self, roster_id: &str, owner: RosterPerson) -> Result<bool, AppError> {
        let owner_bson = to_bson(&owner)?;
        // `owner: null` also matches documents where the field is missing.
        let result = self
            .collection
            .update_one(
                doc! { "_id": roster_id, "owner": null },
                doc! {
                    "$set": { "owner": owner_bson.clone(), "updated_at": timestamp::now() },
                    "$push": { "employees": owner_bson },
                },
            )
            .await?;
        Ok(result.modified_count > 0)
    }

    async fn add_employee(
        &self,
        roster_id: &str,
        employee: RosterPerson,
    ) -> Result<bool, AppError> {
        let result = self
            .collection
            .update_one(
                doc! { "_id": roster_id, "employees.user_id": { "$ne": &employee.user_id } },
                doc! {
                    "$push": { "employees": to_bson(&employee)? },
                    "$set": { "updated_at": timestamp::now() },
                },
            )
            .await?;
        Ok(result.modified_count > 0)
    }

    async fn remove_employee(&self, roster_id: &str, user_id: &str) -> Result<bool, AppError> {
        let result = self
            .collection
            .update_one(
                doc! { "_id": roster_id },
                doc! {
                    "$pull": { "employees": { "user_id": user_id } },
                    "$set": { "updated_at": timestamp::now() },
                },
            )
            .await?;
        Ok(result.modified_count > 0)
    }

    async fn release_owner(&self, roster_id: &str, user_id: &str) -> Result<bool, AppError> {
        let result = self
            .collection
            .update_one(
                doc! { "_id": roster_id, "owner.user_id": user_id },
                doc! { "$set": { "owner": null, "updated_at": timestamp::now() } },
            )
            .await?;
        Ok(result.modified_count > 0)
    }

    async fn delete_if_vacant(&self, roster_id: &str) -> Result<bool, AppError> {
        let result = self
            .collection
            .delete_one(doc! { "_id": roster_id, "owner": null, "employees": { "$size": 0 } })
            .await?;
        Ok(result.deleted_count > 0)
    }

    async fn update_profile(
        &self,
        roster_id: &str,
        update: RosterProfileUpdate,
    ) -> Result<Option<Roster>, AppError> {
        let result = self
            .collection
            .find_one_and_update(
                doc! { "_id": roster_id },
                doc! { "$set": {
                    "company_name": &update.company_name,
                    "company_key": &update.company_key,
                    "industry": &update.industry,
                    "description": &update.description,
                    "website": &update.website,
                    "address": &update.address,
                    "updated_at": timestamp::now(),
                } },
            )
            .return_document(ReturnDocument::After)
            .await;

        match result {
            Ok(roster) => Ok(roster),
            Err(e) if is_duplicate_key(&e) => Err(AppError::Conflict(format!(
                "A company named '{}' already exists",
                update.company_name
            ))),
            Err(e) => Err(e.into()),
        }
    }

    async fn set_image(
        &self,
        roster_id: &str,
        image: RosterImage,
        key: &str,
    ) -> Result<bool, AppError> {
        let mut set = doc! { "updated_at": timestamp::now() };
        set.insert(image.field(), key);
        let result = self
            .collection
            .update_one(doc! { "_id": roster_id }, doc! { "$set": set })
            .await?;
        Ok(result.matched_count > 0)
    }

    async fn list_all(&self) -> Result<Vec<Roster>, AppError> {
        let cursor = self
            .collection
            .find(doc! {})
            .sort(doc! { "company_key": 1 })
            .await?;
        Ok(cursor.try_collect().await?)
    }

    async fn count(&self) -> Result<u64, AppError> {
        Ok(self.collection.count_documents(doc! {}).await?)
    }
}
