//! # Accounts
//!
//! First sign-in creates the account with a welcome grant and a sponsor code of
//! its own. The profile is only needed to ship a prize to a winner.
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use uuid::Uuid;

use crate::{
    auth::Identity,
    error::AppError,
    models::{Account, ArchivedTicket, Profile},
    store::Store,
    utils::{collapse_whitespace, normalize_code},
};

const SPONSOR_PREFIX: &str = "LP-";
const SPONSOR_SUFFIX_LEN: usize = 8;
const SPONSOR_CODE_ATTEMPTS: usize = 5;

#[derive(Deserialize, Debug, Default)]
#[serde(rename_all = "camelCase")]
pub struct RegisterRequest {
    pub sponsor_code: Option<String>,
}

#[derive(Serialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct RegisterResponse {
    pub created: bool,
    pub credits: u64,
    pub profile_completed: bool,
    pub sponsor_code: Option<String>,
}

#[derive(Serialize, Debug)]
pub struct HistoryResponse {
    pub tickets: Vec<ArchivedTicket>,
}

pub fn new_sponsor_code() -> String {
    let suffix = Uuid::new_v4().simple().to_string()[..SPONSOR_SUFFIX_LEN].to_uppercase();

    format!("{SPONSOR_PREFIX}{suffix}")
}

pub fn clean_profile(profile: Profile) -> Result<Profile, AppError> {
    let profile = Profile {
        phone: collapse_whitespace(&profile.phone),
        address: collapse_whitespace(&profile.address),
        postal_code: collapse_whitespace(&profile.postal_code),
        city: collapse_whitespace(&profile.city),
        country: collapse_whitespace(&profile.country),
    };

    let fields = [
        &profile.phone,
        &profile.address,
        &profile.postal_code,
        &profile.city,
        &profile.country,
    ];
    if fields.iter().any(|field| field.is_empty()) {
        return Err(AppError::InvalidProfile);
    }

    Ok(profile)
}

pub async fn register<S: Store>(
    store: &S,
    identity: &Identity,
    request: RegisterRequest,
    welcome_credits: u64,
) -> Result<RegisterResponse, AppError> {
    register_with(store, identity, request, welcome_credits, new_sponsor_code).await
}

/// Registration with an explicit sponsor code source. A code already owned by
/// another account is replaced by the next one from `next_code`.
pub async fn register_with<S: Store>(
    store: &S,
    identity: &Identity,
    request: RegisterRequest,
    welcome_credits: u64,
    mut next_code: impl FnMut() -> String,
) -> Result<RegisterResponse, AppError> {
    if let Some(existing) = store.account(&identity.uid).await? {
        return Ok(existing_response(existing));
    }

    let referred_by = match request
        .sponsor_code
        .as_deref()
        .map(str::trim)
        .filter(|code| !code.is_empty())
    {
        Some(raw) => {
            let code = normalize_code(raw).ok_or(AppError::InvalidSponsorCode)?;
            Some(
                store
                    .sponsor(&code)
                    .await?
                    .ok_or(AppError::InvalidSponsorCode)?,
            )
        }
        None => None,
    };

    let mut last_taken = String::new();
    for _ in 0..SPONSOR_CODE_ATTEMPTS {
        let account = Account {
            credits: welcome_credits,
            profile_completed: false,
            email: identity.email.clone(),
            display_name: identity.display_name.clone(),
            sponsor_code: Some(next_code()),
            referred_by: referred_by.clone(),
            profile: Profile::default(),
            created_at: Some(Utc::now()),
        };

        match store.register(&identity.uid, account).await {
            Ok((account, true)) => {
                info!(uid = %identity.uid, referred_by = ?account.referred_by, "Account created");

                return Ok(RegisterResponse {
                    created: true,
                    credits: account.credits,
                    profile_completed: account.profile_completed,
                    sponsor_code: account.sponsor_code,
                });
            }
            Ok((account, false)) => return Ok(existing_response(account)),
            Err(AppError::SponsorCodeTaken(code)) => {
                warn!(uid = %identity.uid, %code, "Sponsor code collision, drawing another");
                last_taken = code;
            }
            Err(e) => return Err(e),
        }
    }

    Err(AppError::SponsorCodeTaken(last_taken))
}

fn existing_response(account: Account) -> RegisterResponse {
    RegisterResponse {
        created: false,
        credits: account.credits,
        profile_completed: account.profile_completed,
        sponsor_code: account.sponsor_code,
    }
}

pub async fn complete_profile<S: Store>(
    store: &S,
    uid: &str,
    profile: Profile,
) -> Result<(), AppError> {
    let profile = clean_profile(profile)?;
    store.complete_profile(uid, &profile).await?;

    info!(%uid, "Profile completed");

    Ok(())
}

pub async fn history<S: Store>(store: &S, uid: &str) -> Result<HistoryResponse, AppError> {
    let mut tickets = store.history(uid).await?;
    tickets.sort_by(|a, b| b.archived_at.cmp(&a.archived_at));

    Ok(HistoryResponse { tickets })
}
