use chrono::Utc;

use crate::db::models::{company_key, Roster, RosterPerson};
use crate::db::roster_repository::RosterRepository;
use crate::error::AppError;

/// Insert attempts before giving up on a racing roster creation.
const MAX_ATTEMPTS: usize = 3;

/// The company account being attached to a roster.
#[derive(Debug, Clone)]
pub struct Registrant {
    pub user_id: String,
    pub name: String,
    pub email: String,
    pub position: String,
}

impl Registrant {
    fn person(&self) -> RosterPerson {
        RosterPerson {
            user_id: self.user_id.clone(),
            name: self.name.clone(),
            email: self.email.clone(),
            position: self.position.clone(),
            joined_at: Utc::now(),
        }
    }
}

fn owner_taken(company_name: &str) -> AppError {
    AppError::BadRequest(format!("Company '{company_name}' already has an owner"))
}

/// Fail early when an owner registration cannot succeed.
///
/// Runs before the user document is written so a rejected owner leaves no
/// account behind.
pub async fn ensure_owner_slot_free(
    rosters: &dyn RosterRepository,
    company_name: &str,
) -> Result<(), AppError> {
    let key = company_key(company_name);
    if key.is_empty() {
        return Err(AppError::BadRequest("Company name is required".into()));
    }
    match rosters.find_by_key(&key).await? {
        Some(roster) if roster.owner.is_some() => Err(owner_taken(&roster.company_name)),
        _ => Ok(()),
    }
}

/// Outcome of [`join_roster`].
#[derive(Debug, Clone)]
pub struct Membership {
    /// The roster as stored after joining.
    pub roster: Roster,
    /// Whether this call inserted the roster.
    pub created: bool,
}

/// Attach a registrant to the roster for `company_name`, creating it if needed.
///
/// Owners take the owner slot (creating the roster, or claiming an ownerless
/// one). Everyone else joins the employee list.
pub async fn join_roster(
    rosters: &dyn RosterRepository,
    company_name: &str,
    registrant: &Registrant,
    as_owner: bool,
) -> Result<Membership, AppError> {
    let key = company_key(company_name);
    if key.is_empty() {
        return Err(AppError::BadRequest("Company name is required".into()));
    }

    for _ in 0..MAX_ATTEMPTS {
        let existing = rosters.find_by_key(&key).await?;

        let Some(roster) = existing else {
            let mut roster = Roster::new(company_name);
            if as_owner {
                roster.owner = Some(registrant.person());
            }
            roster.employees.push(registrant.person());

            match rosters.insert(roster.clone()).await {
                Ok(()) => {
                    tracing::info!(
                        roster_id = %roster.id,
                        company = %roster.company_name,
                        owner = as_owner,
                        "Created company roster"
                    );
                    return Ok(Membership {
                        roster,
                        created: true,
                    });
                }
                // Someone created the same roster meanwhile; join theirs instead.
                Err(AppError::Conflict(_)) => continue,
                Err(e) => return Err(e),
            }
        };

        if as_owner {
            if roster.owner.is_some() {
                return Err(owner_taken(&roster.company_name));
            }
            if !rosters.claim_owner(&roster.id, registrant.person()).await? {
                return Err(owner_taken(&roster.company_name));
            }
            tracing::info!(roster_id = %roster.id, user_id = %registrant.user_id, "Claimed roster owner slot");
        } else if rosters.add_employee(&roster.id, registrant.person()).await? {
            tracing::info!(roster_id = %roster.id, user_id = %registrant.user_id, "Added employee to roster");
        }

        let roster = rosters
            .find_by_id(&roster.id)
            .await?
            .ok_or_else(|| AppError::NotFound("Company roster disappeared".into()))?;
        return Ok(Membership {
            roster,
            created: false,
        });
    }

    Err(AppError::Conflict(
        "Company roster is being modified concurrently, please retry".into(),
    ))
}

/// Take a user off a roster, freeing the owner slot if they held it.
pub async fn leave_roster(
    rosters: &dyn RosterRepository,
    roster_id: &str,
    user_id: &str,
) -> Result<(), AppError> {
    rosters.remove_employee(roster_id, user_id).await?;
    if rosters.release_owner(roster_id, user_id).await? {
        tracing::info!(roster_id, user_id, "Roster owner slot released");
    }
    Ok(())
}

/// Reverse a [`join_roster`] whose registration could not be completed.
///
/// A roster inserted by that call is removed again once nobody is left on it.
pub async fn undo_join(
    rosters: &dyn RosterRepository,
    membership: &Membership,
    user_id: &str,
) -> Result<(), AppError> {
    let roster_id = membership.roster.id.as_str();
    leave_roster(rosters, roster_id, user_id).await?;
    if membership.created && rosters.delete_if_vacant(roster_id).await? {
        tracing::info!(roster_id, "Removed roster created by a failed registration");
    }
    Ok(())
}
