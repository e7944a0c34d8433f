//! # In-process store
//!
//! Single-node stand-in for Redis, used for local runs (`STORE_BACKEND=memory`)
//! and tests. One async mutex guards every document and is held for the whole
//! of each operation, so transactions are trivially serializable.
use std::collections::{HashMap, hash_map::Entry};

use chrono::{DateTime, Utc};
use serde_json::Value;
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::{
    credits::plan_redemption,
    error::AppError,
    models::{
        Account, ArchivedTicket, Profile, RechargeCard, Receipt, Redemption, Stats, Ticket,
        TicketDraft, TicketStatus,
    },
    store::Store,
    tickets::{count_pending, plan_purchase},
};

#[derive(Default)]
struct Documents {
    accounts: HashMap<String, Account>,
    tickets: HashMap<String, Vec<Ticket>>,
    history: HashMap<String, Vec<ArchivedTicket>>,
    sponsor_codes: HashMap<String, String>,
    cards: HashMap<String, RechargeCard>,
    prize: Option<Value>,
    next_draw: Option<Value>,
    stats: Option<Stats>,
    winners: Vec<Value>,
    winning_numbers: Option<Value>,
    draws: Vec<Value>,
    last_probe: Option<DateTime<Utc>>,
}

#[derive(Default)]
pub struct MemoryStore {
    documents: Mutex<Documents>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn set_prize(&self, prize: Value) {
        self.documents.lock().await.prize = Some(prize);
    }

    pub async fn set_next_draw(&self, draw: Value) {
        self.documents.lock().await.next_draw = Some(draw);
    }

    pub async fn insert_account(&self, uid: &str, account: Account) {
        let mut documents = self.documents.lock().await;
        if let Some(code) = &account.sponsor_code {
            documents.sponsor_codes.insert(code.clone(), uid.to_string());
        }
        documents.accounts.insert(uid.to_string(), account);
    }

    pub async fn insert_card(&self, code: &str, credits: u64) {
        self.documents.lock().await.cards.insert(
            code.to_string(),
            RechargeCard {
                credits,
                ..Default::default()
            },
        );
    }

    pub async fn card(&self, code: &str) -> Option<RechargeCard> {
        self.documents.lock().await.cards.get(code).cloned()
    }

    /// Draw-job side: resolves a ticket.
    pub async fn set_ticket_status(&self, uid: &str, ticket_id: &str, status: TicketStatus) {
        let mut documents = self.documents.lock().await;
        if let Some(ticket) = documents
            .tickets
            .get_mut(uid)
            .and_then(|tickets| tickets.iter_mut().find(|ticket| ticket.id == ticket_id))
        {
            ticket.status = status;
        }
    }

    /// Draw-job side: moves resolved tickets to the user's history.
    pub async fn archive_resolved(&self, uid: &str, archived_at: DateTime<Utc>) {
        let mut documents = self.documents.lock().await;
        let Some(tickets) = documents.tickets.remove(uid) else {
            return;
        };

        let (pending, resolved): (Vec<_>, Vec<_>) =
            tickets.into_iter().partition(Ticket::is_pending);

        documents.tickets.insert(uid.to_string(), pending);
        documents
            .history
            .entry(uid.to_string())
            .or_default()
            .extend(resolved.into_iter().map(|ticket| ArchivedTicket {
                ticket,
                archived_at,
            }));
    }

    pub async fn add_winner(&self, winner: Value) {
        self.documents.lock().await.winners.push(winner);
    }

    pub async fn set_winning_numbers(&self, numbers: Value) {
        self.documents.lock().await.winning_numbers = Some(numbers);
    }

    pub async fn add_draw(&self, draw: Value) {
        self.documents.lock().await.draws.push(draw);
    }

    pub async fn last_probe(&self) -> Option<DateTime<Utc>> {
        self.documents.lock().await.last_probe
    }
}

impl Store for MemoryStore {
    async fn ping(&self) -> Result<(), AppError> {
        self.documents.lock().await.last_probe = Some(Utc::now());
        Ok(())
    }

    async fn account(&self, uid: &str) -> Result<Option<Account>, AppError> {
        Ok(self.documents.lock().await.accounts.get(uid).cloned())
    }

    async fn register(&self, uid: &str, account: Account) -> Result<(Account, bool), AppError> {
        let mut documents = self.documents.lock().await;

        if let Some(existing) = documents.accounts.get(uid) {
            return Ok((existing.clone(), false));
        }

        if let Some(code) = &account.sponsor_code {
            match documents.sponsor_codes.entry(code.clone()) {
                Entry::Occupied(_) => return Err(AppError::SponsorCodeTaken(code.clone())),
                Entry::Vacant(slot) => {
                    slot.insert(uid.to_string());
                }
            }
        }
        documents.accounts.insert(uid.to_string(), account.clone());

        Ok((account, true))
    }

    async fn sponsor(&self, code: &str) -> Result<Option<String>, AppError> {
        Ok(self.documents.lock().await.sponsor_codes.get(code).cloned())
    }

    async fn complete_profile(&self, uid: &str, profile: &Profile) -> Result<(), AppError> {
        let mut documents = self.documents.lock().await;
        let account = documents
            .accounts
            .get_mut(uid)
            .ok_or(AppError::AccountNotFound)?;

        account.profile = profile.clone();
        account.profile_completed = true;

        Ok(())
    }

    async fn tickets(&self, uid: &str) -> Result<Vec<Ticket>, AppError> {
        Ok(self
            .documents
            .lock()
            .await
            .tickets
            .get(uid)
            .cloned()
            .unwrap_or_default())
    }

    async fn history(&self, uid: &str) -> Result<Vec<ArchivedTicket>, AppError> {
        Ok(self
            .documents
            .lock()
            .await
            .history
            .get(uid)
            .cloned()
            .unwrap_or_default())
    }

    async fn prize(&self) -> Result<Option<Value>, AppError> {
        Ok(self.documents.lock().await.prize.clone())
    }

    async fn next_draw(&self) -> Result<Option<Value>, AppError> {
        Ok(self.documents.lock().await.next_draw.clone())
    }

    async fn stats(&self) -> Result<Option<Stats>, AppError> {
        Ok(self.documents.lock().await.stats.clone())
    }

    async fn winners_exist(&self) -> Result<bool, AppError> {
        Ok(!self.documents.lock().await.winners.is_empty())
    }

    async fn winners(&self) -> Result<Vec<Value>, AppError> {
        Ok(self.documents.lock().await.winners.clone())
    }

    async fn winning_numbers(&self) -> Result<Option<Value>, AppError> {
        Ok(self.documents.lock().await.winning_numbers.clone())
    }

    async fn draws(&self) -> Result<Vec<Value>, AppError> {
        Ok(self.documents.lock().await.draws.clone())
    }

    async fn purchase(&self, uid: &str, draft: TicketDraft) -> Result<Receipt, AppError> {
        let mut documents = self.documents.lock().await;

        let balance = documents.accounts.get(uid).map_or(0, |a| a.credits);
        let pending = documents
            .tickets
            .get(uid)
            .map_or(0, |tickets| count_pending(tickets));
        let new_credits = plan_purchase(balance, pending, draft.entry_points)?;

        // a free ticket still needs an account to belong to
        let account = documents
            .accounts
            .get_mut(uid)
            .ok_or(AppError::InsufficientCredits)?;
        account.credits = new_credits;

        let now = Utc::now();
        let ticket = Ticket {
            id: Uuid::new_v4().to_string(),
            owner: uid.to_string(),
            numbers: draft.numbers,
            status: TicketStatus::Pending,
            date: now,
            entry_points: draft.entry_points,
            prize_id: draft.prize_id,
        };
        let ticket_id = ticket.id.clone();
        documents
            .tickets
            .entry(uid.to_string())
            .or_default()
            .push(ticket);

        let stats = documents.stats.get_or_insert_with(Stats::default);
        stats.total_tickets_sold += 1;
        stats.total_revenue += draft.entry_points;
        stats.updated_at = Some(now);

        Ok(Receipt {
            ticket_id,
            new_credits,
        })
    }

    async fn add_credits(&self, uid: &str, amount: u64) -> Result<u64, AppError> {
        let mut documents = self.documents.lock().await;
        let account = documents
            .accounts
            .get_mut(uid)
            .ok_or(AppError::AccountNotFound)?;

        account.credits = account
            .credits
            .checked_add(amount)
            .ok_or(AppError::InvalidAmount)?;

        Ok(account.credits)
    }

    async fn redeem(&self, uid: &str, code: &str) -> Result<Redemption, AppError> {
        let mut documents = self.documents.lock().await;

        let credited = plan_redemption(documents.cards.get(code))?;
        let balance = documents
            .accounts
            .get(uid)
            .ok_or(AppError::AccountNotFound)?
            .credits;
        let new_credits = balance
            .checked_add(credited)
            .ok_or(AppError::InvalidAmount)?;

        if let Some(card) = documents.cards.get_mut(code) {
            card.used = true;
            card.used_by = Some(uid.to_string());
            card.used_at = Some(Utc::now());
        }
        if let Some(account) = documents.accounts.get_mut(uid) {
            account.credits = new_credits;
        }

        Ok(Redemption {
            credited,
            new_credits,
        })
    }
}
