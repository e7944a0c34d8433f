//! # Game Data
//!
//! Snapshot behind the game screen. Independent reads, no transaction: a
//! missing record falls back to its default instead of failing the request.
use serde::Serialize;
use serde_json::Value;

use crate::{
    error::AppError,
    models::{Stats, Ticket},
    store::Store,
};

#[derive(Serialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct GameData {
    pub user_credits: u64,
    pub user_tickets: Vec<Ticket>,
    pub prize: Option<Value>,
    pub draw: Option<Value>,
    pub stats: Stats,
    pub winners_exist: bool,
}

pub async fn game_data<S: Store>(store: &S, uid: &str) -> Result<GameData, AppError> {
    let (account, user_tickets, prize, draw, stats, winners_exist) = tokio::try_join!(
        store.account(uid),
        store.tickets(uid),
        store.prize(),
        store.next_draw(),
        store.stats(),
        store.winners_exist(),
    )?;

    Ok(GameData {
        user_credits: account.map_or(0, |account| account.credits),
        user_tickets,
        prize,
        draw,
        stats: stats.unwrap_or_default(),
        winners_exist,
    })
}
