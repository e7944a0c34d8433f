//! # Credits
//!
//! Top-ups, either a direct amount or a single-use recharge card. Both only
//! ever raise a balance, so no price cross-check applies here.
//!
//! A card's `used` flag is the only guard against double redemption. It is
//! read and flipped inside the same store transaction as the balance increment.
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::{
    error::AppError,
    models::{RechargeCard, Redemption},
    store::Store,
    utils::normalize_code,
};

#[derive(Deserialize, Debug)]
pub struct AddCreditsRequest {
    pub amount: f64,
}

#[derive(Serialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct AddCreditsResponse {
    pub success: bool,
    pub new_credits: u64,
}

#[derive(Deserialize, Debug)]
pub struct RedeemRequest {
    pub code: String,
}

#[derive(Serialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct RedeemResponse {
    pub success: bool,
    pub credited: u64,
    pub new_credits: u64,
}

pub fn validate_amount(amount: f64, max_top_up: u64) -> Result<u64, AppError> {
    if !amount.is_finite() || amount <= 0.0 || amount.fract() != 0.0 || amount > max_top_up as f64
    {
        return Err(AppError::InvalidAmount);
    }

    Ok(amount as u64)
}

/// Returns the amount a card is worth if it can be consumed right now.
pub fn plan_redemption(card: Option<&RechargeCard>) -> Result<u64, AppError> {
    let card = card.ok_or(AppError::UnknownCode)?;

    if card.used {
        return Err(AppError::CodeAlreadyUsed);
    }

    if card.credits == 0 {
        return Err(AppError::InvalidAmount);
    }

    Ok(card.credits)
}

pub async fn add_credits<S: Store>(
    store: &S,
    uid: &str,
    request: AddCreditsRequest,
    max_top_up: u64,
) -> Result<AddCreditsResponse, AppError> {
    let amount = validate_amount(request.amount, max_top_up)?;
    let new_credits = store.add_credits(uid, amount).await?;

    info!(%uid, amount, new_credits, "Credits added");

    Ok(AddCreditsResponse {
        success: true,
        new_credits,
    })
}

pub async fn redeem_code<S: Store>(
    store: &S,
    uid: &str,
    request: RedeemRequest,
) -> Result<RedeemResponse, AppError> {
    let code = normalize_code(&request.code).ok_or(AppError::UnknownCode)?;

    let Redemption {
        credited,
        new_credits,
    } = store.redeem(uid, &code).await?;

    info!(%uid, %code, credited, new_credits, "Recharge card redeemed");

    Ok(RedeemResponse {
        success: true,
        credited,
        new_credits,
    })
}
