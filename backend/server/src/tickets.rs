//! # Tickets
//!
//! Purchase flow. Eligibility rules live in [`plan_purchase`] so the advisory
//! pre-check and the store transaction apply exactly the same checks.
//!
//! ## Flow
//! 1. Read the prize document, derive the cost. Client hints are only compared.
//! 2. Validate the selected numbers.
//! 3. Advisory pre-check against a plain read, for a fast failure.
//! 4. Store transaction: re-read, re-check, debit, create ticket, bump stats.
use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::{
    error::AppError,
    models::{PrizeConfig, Receipt, Ticket, TicketDraft},
    store::Store,
};

pub const MAX_PENDING_TICKETS: usize = 2;

#[derive(Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct BuyTicketRequest {
    #[serde(default)]
    pub selected_numbers: Vec<i64>,
    pub entry_points: Option<f64>,
    pub prize: Option<String>,
}

#[derive(Serialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct BuyTicketResponse {
    pub success: bool,
    pub ticket_id: String,
    pub numbers: Vec<u32>,
    pub new_credits: u64,
}

/// Returns the balance left after paying `cost`.
///
/// The cap is checked first: a user at the cap is refused whatever the balance.
pub fn plan_purchase(balance: u64, pending: usize, cost: u64) -> Result<u64, AppError> {
    if pending >= MAX_PENDING_TICKETS {
        return Err(AppError::TicketLimitExceeded);
    }

    balance.checked_sub(cost).ok_or(AppError::InsufficientCredits)
}

pub fn count_pending(tickets: &[Ticket]) -> usize {
    tickets.iter().filter(|ticket| ticket.is_pending()).count()
}

pub fn validate_selection(selected: &[i64], prize: &PrizeConfig) -> Result<Vec<u32>, AppError> {
    if selected.len() != prize.numbers_per_ticket {
        return Err(AppError::InvalidSelection(format!(
            "{} numéros attendus, {} reçus",
            prize.numbers_per_ticket,
            selected.len()
        )));
    }

    let mut seen = HashSet::with_capacity(selected.len());
    let mut numbers = Vec::with_capacity(selected.len());

    for &number in selected {
        let number = u32::try_from(number)
            .ok()
            .filter(|n| (1..=prize.max_number).contains(n))
            .ok_or_else(|| {
                AppError::InvalidSelection(format!(
                    "{number} hors de l'intervalle 1-{}",
                    prize.max_number
                ))
            })?;

        if !seen.insert(number) {
            return Err(AppError::InvalidSelection(format!("{number} en double")));
        }

        numbers.push(number);
    }

    Ok(numbers)
}

/// Compares client hints against the authoritative prize. Hints never set the price.
fn check_hints(request: &BuyTicketRequest, prize: &PrizeConfig) -> Result<(), AppError> {
    if let Some(hint) = request.entry_points {
        if hint != prize.entry_points as f64 {
            warn!(
                hint,
                entry_points = prize.entry_points,
                "Client entry points differ from prize"
            );
            return Err(AppError::StaleOffer);
        }
    }

    if let Some(name) = &request.prize {
        if *name != prize.name {
            warn!(hint = %name, prize = %prize.name, "Client prize differs from current prize");
            return Err(AppError::StaleOffer);
        }
    }

    Ok(())
}

pub async fn buy_ticket<S: Store>(
    store: &S,
    uid: &str,
    request: BuyTicketRequest,
) -> Result<BuyTicketResponse, AppError> {
    let prize = PrizeConfig::from_document(store.prize().await?.as_ref())?;
    let numbers = validate_selection(&request.selected_numbers, &prize)?;
    check_hints(&request, &prize)?;

    let balance = store
        .account(uid)
        .await?
        .map_or(0, |account| account.credits);
    let pending = count_pending(&store.tickets(uid).await?);
    plan_purchase(balance, pending, prize.entry_points)?;

    let Receipt {
        ticket_id,
        new_credits,
    } = store
        .purchase(
            uid,
            TicketDraft {
                numbers: numbers.clone(),
                entry_points: prize.entry_points,
                prize_id: prize.name,
            },
        )
        .await?;

    info!(%uid, %ticket_id, new_credits, "Ticket purchased");

    Ok(BuyTicketResponse {
        success: true,
        ticket_id,
        numbers,
        new_credits,
    })
}
