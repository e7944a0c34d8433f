//! # Store
//!
//! Document store seam. Every shared record lives behind this trait; the server
//! keeps no other mutable state between requests.
//!
//! Implementations must run [`Store::purchase`], [`Store::redeem`] and
//! [`Store::register`] as single atomic transactions that re-read what they
//! check. A violated rule aborts the whole transaction and leaves nothing
//! written. The remaining operations are single-document or read-only.
use serde_json::Value;

use crate::{
    error::AppError,
    models::{Account, ArchivedTicket, Profile, Receipt, Redemption, Stats, Ticket, TicketDraft},
};

pub trait Store: Send + Sync + 'static {
    /// Writes a probe document, proving the store accepts writes.
    fn ping(&self) -> impl Future<Output = Result<(), AppError>> + Send;

    fn account(&self, uid: &str) -> impl Future<Output = Result<Option<Account>, AppError>> + Send;

    /// Creates the account unless one exists. Returns the stored account and
    /// whether it was created by this call.
    fn register(
        &self,
        uid: &str,
        account: Account,
    ) -> impl Future<Output = Result<(Account, bool), AppError>> + Send;

    /// Resolves a sponsor code to the user id owning it.
    fn sponsor(&self, code: &str) -> impl Future<Output = Result<Option<String>, AppError>> + Send;

    fn complete_profile(
        &self,
        uid: &str,
        profile: &Profile,
    ) -> impl Future<Output = Result<(), AppError>> + Send;

    fn tickets(&self, uid: &str) -> impl Future<Output = Result<Vec<Ticket>, AppError>> + Send;

    fn history(
        &self,
        uid: &str,
    ) -> impl Future<Output = Result<Vec<ArchivedTicket>, AppError>> + Send;

    fn prize(&self) -> impl Future<Output = Result<Option<Value>, AppError>> + Send;

    fn next_draw(&self) -> impl Future<Output = Result<Option<Value>, AppError>> + Send;

    fn stats(&self) -> impl Future<Output = Result<Option<Stats>, AppError>> + Send;

    fn winners_exist(&self) -> impl Future<Output = Result<bool, AppError>> + Send;

    /// Winner records of the last draw, as written by the draw job.
    fn winners(&self) -> impl Future<Output = Result<Vec<Value>, AppError>> + Send;

    fn winning_numbers(&self) -> impl Future<Output = Result<Option<Value>, AppError>> + Send;

    /// Every draw record, whatever its status.
    fn draws(&self) -> impl Future<Output = Result<Vec<Value>, AppError>> + Send;

    /// Debits the entry cost, creates a pending ticket and bumps the stats.
    fn purchase(
        &self,
        uid: &str,
        draft: TicketDraft,
    ) -> impl Future<Output = Result<Receipt, AppError>> + Send;

    /// Returns the balance after the increment.
    fn add_credits(
        &self,
        uid: &str,
        amount: u64,
    ) -> impl Future<Output = Result<u64, AppError>> + Send;

    /// Consumes a recharge card and credits its amount. `code` is normalized.
    fn redeem(
        &self,
        uid: &str,
        code: &str,
    ) -> impl Future<Output = Result<Redemption, AppError>> + Send;
}
