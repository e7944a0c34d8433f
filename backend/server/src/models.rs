//! # Documents
//!
//! Records kept in the store. JSON field names are camelCase so the browser
//! client reads them unchanged.
use std::{fmt, str::FromStr};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::AppError;

pub const DEFAULT_NUMBERS_PER_TICKET: usize = 6;
pub const DEFAULT_MAX_NUMBER: u32 = 49;

#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct Profile {
    pub phone: String,
    pub address: String,
    pub postal_code: String,
    pub city: String,
    pub country: String,
}

#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Account {
    pub credits: u64,
    pub profile_completed: bool,
    pub email: Option<String>,
    pub display_name: Option<String>,
    pub sponsor_code: Option<String>,
    pub referred_by: Option<String>,
    #[serde(flatten)]
    pub profile: Profile,
    pub created_at: Option<DateTime<Utc>>,
}

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum TicketStatus {
    Pending,
    Won,
    Lost,
}

impl TicketStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TicketStatus::Pending => "pending",
            TicketStatus::Won => "won",
            TicketStatus::Lost => "lost",
        }
    }
}

impl fmt::Display for TicketStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TicketStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(TicketStatus::Pending),
            "won" => Ok(TicketStatus::Won),
            "lost" => Ok(TicketStatus::Lost),
            other => Err(format!("unknown ticket status {other}")),
        }
    }
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Ticket {
    pub id: String,
    // older archives written by the draw job lack owner and prizeId
    #[serde(default)]
    pub owner: String,
    pub numbers: Vec<u32>,
    pub status: TicketStatus,
    pub date: DateTime<Utc>,
    pub entry_points: u64,
    #[serde(default)]
    pub prize_id: String,
}

impl Ticket {
    pub fn is_pending(&self) -> bool {
        self.status == TicketStatus::Pending
    }
}

/// Ticket moved out of the live index by the draw job once resolved.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ArchivedTicket {
    #[serde(flatten)]
    pub ticket: Ticket,
    pub archived_at: DateTime<Utc>,
}

#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Stats {
    pub total_tickets_sold: u64,
    pub total_revenue: u64,
    pub updated_at: Option<DateTime<Utc>>,
}

#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RechargeCard {
    pub credits: u64,
    pub used: bool,
    pub used_by: Option<String>,
    pub used_at: Option<DateTime<Utc>>,
}

/// Everything a purchase needs once eligibility and selection are settled.
#[derive(Clone, Debug)]
pub struct TicketDraft {
    pub numbers: Vec<u32>,
    pub entry_points: u64,
    pub prize_id: String,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Receipt {
    pub ticket_id: String,
    pub new_credits: u64,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Redemption {
    pub credited: u64,
    pub new_credits: u64,
}

/// Authoritative view of the prize document for charging.
#[derive(Clone, Debug, PartialEq)]
pub struct PrizeConfig {
    pub name: String,
    pub entry_points: u64,
    pub numbers_per_ticket: usize,
    pub max_number: u32,
}

impl PrizeConfig {
    pub fn from_document(document: Option<&Value>) -> Result<Self, AppError> {
        let document = document.ok_or(AppError::ConfigurationUnavailable)?;

        let entry_points = document
            .get("entryPoints")
            .and_then(whole_number)
            .ok_or(AppError::ConfigurationUnavailable)?;

        let name = document
            .get("name")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();

        let numbers_per_ticket = match document.get("numbersPerTicket") {
            None | Some(Value::Null) => DEFAULT_NUMBERS_PER_TICKET,
            Some(value) => whole_number(value).ok_or(AppError::ConfigurationUnavailable)? as usize,
        };

        let max_number = match document.get("maxNumber") {
            None | Some(Value::Null) => DEFAULT_MAX_NUMBER,
            Some(value) => whole_number(value)
                .and_then(|n| u32::try_from(n).ok())
                .ok_or(AppError::ConfigurationUnavailable)?,
        };

        // distinct numbers must fit in the range
        if numbers_per_ticket == 0 || numbers_per_ticket as u64 > max_number as u64 {
            return Err(AppError::ConfigurationUnavailable);
        }

        Ok(Self {
            name,
            entry_points,
            numbers_per_ticket,
            max_number,
        })
    }
}

/// Accepts integers and integral floats, since the admin tooling writes either.
fn whole_number(value: &Value) -> Option<u64> {
    value.as_u64().or_else(|| {
        value
            .as_f64()
            .filter(|v| v.is_finite() && *v >= 0.0 && v.fract() == 0.0 && *v <= u64::MAX as f64)
            .map(|v| v as u64)
    })
}
