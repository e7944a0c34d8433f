//! # Redis
//!
//! Document store for accounts, tickets, stats and recharge cards.
//!
//! ## Layout
//!
//! - `user:{uid}` hash: credits, profile fields, sponsor code, claims
//! - `user:{uid}:tickets` set: ids of the user's live tickets
//! - `user:{uid}:tickets_history` list: archived tickets as JSON, written by the draw job
//! - `ticket:{id}` hash: owner, numbers (comma separated), status, date, entryPoints, prizeId
//! - `stats:overview` hash: totalTicketsSold, totalRevenue, updatedAt
//! - `settings:prize_object`, `settings:next_draw`: JSON documents set by admin tooling
//! - `recharge_card:{CODE}` hash: credits, used, usedBy, usedAt
//! - `sponsor_codes` hash: sponsor code to uid
//! - `winners` list: winner records of the last draw as JSON, written by the draw job
//! - `settings:winning_numbers`: JSON document with the last draw's `numbers`
//! - `draws` list: every draw record as JSON, written by the draw job
//!
//! ## Transactions
//!
//! Optimistic, the Redis way: WATCH the keys a decision depends on, read them,
//! decide, then queue the writes in MULTI/EXEC. EXEC returns nil if any
//! watched key changed in between, in which case the whole attempt is redone
//! from fresh reads, up to [`MAX_TRANSACTION_ATTEMPTS`] times.
//!
//! WATCH state belongs to a connection, so transactions run on a connection of
//! their own rather than on the shared [`ConnectionManager`].
use std::{collections::HashMap, str::FromStr, time::Duration};

use chrono::{DateTime, Utc};
use redis::{
    AsyncCommands, Client, Pipeline,
    aio::{ConnectionManager, ConnectionManagerConfig, MultiplexedConnection},
};
use serde_json::Value;
use tracing::{info, warn};
use uuid::Uuid;

use crate::{
    credits::plan_redemption,
    error::AppError,
    models::{
        Account, ArchivedTicket, Profile, RechargeCard, Receipt, Redemption, Stats, Ticket,
        TicketDraft, TicketStatus,
    },
    store::Store,
    tickets::plan_purchase,
};

pub const MAX_TRANSACTION_ATTEMPTS: usize = 5;

const PRIZE_KEY: &str = "settings:prize_object";
const NEXT_DRAW_KEY: &str = "settings:next_draw";
const STATS_KEY: &str = "stats:overview";
const WINNERS_KEY: &str = "winners";
const WINNING_NUMBERS_KEY: &str = "settings:winning_numbers";
const DRAWS_KEY: &str = "draws";
const SPONSOR_CODES_KEY: &str = "sponsor_codes";
const PROBE_KEY: &str = "test:connection";

fn user_key(uid: &str) -> String {
    format!("user:{uid}")
}

fn tickets_key(uid: &str) -> String {
    format!("user:{uid}:tickets")
}

fn history_key(uid: &str) -> String {
    format!("user:{uid}:tickets_history")
}

fn ticket_key(id: &str) -> String {
    format!("ticket:{id}")
}

fn card_key(code: &str) -> String {
    format!("recharge_card:{code}")
}

pub async fn init_redis(redis_url: &str) -> Result<(Client, ConnectionManager), AppError> {
    let config = ConnectionManagerConfig::new()
        .set_number_of_retries(1)
        .set_connection_timeout(Duration::from_millis(500));

    let client = Client::open(redis_url)?;
    let connection_manager = client
        .get_connection_manager_with_config(config)
        .await?;

    Ok((client, connection_manager))
}

pub struct RedisStore {
    client: Client,
    connection: ConnectionManager,
}

impl RedisStore {
    pub async fn connect(redis_url: &str) -> Result<Self, AppError> {
        let (client, connection) = init_redis(redis_url).await?;
        info!("Connected to Redis");

        Ok(Self { client, connection })
    }

    /// Runs `body` under WATCH on `keys` and commits the pipeline it returns.
    ///
    /// `body` may WATCH further keys before returning. An `Err` from `body`
    /// aborts without writing anything.
    ///
    /// Each call opens its own connection and drops it when done. WATCH state
    /// is per connection, so a connection shared between concurrent requests
    /// would let one request's EXEC clear another's watches. The extra
    /// connect per write request is accepted; reads stay on the manager.
    async fn transaction<T, F, Fut>(&self, keys: &[String], mut body: F) -> Result<T, AppError>
    where
        F: FnMut(MultiplexedConnection) -> Fut,
        Fut: Future<Output = Result<(Pipeline, T), AppError>>,
    {
        let mut connection = self.client.get_multiplexed_async_connection().await?;

        for attempt in 1..=MAX_TRANSACTION_ATTEMPTS {
            redis::cmd("WATCH")
                .arg(keys)
                .query_async::<()>(&mut connection)
                .await?;

            let (pipe, value) = match body(connection.clone()).await {
                Ok(step) => step,
                Err(e) => {
                    redis::cmd("UNWATCH")
                        .query_async::<()>(&mut connection)
                        .await?;
                    return Err(e);
                }
            };

            let committed: Option<()> = pipe.query_async(&mut connection).await?;
            if committed.is_some() {
                return Ok(value);
            }

            warn!(attempt, ?keys, "Transaction conflicted, retrying");
        }

        Err(AppError::Contention(MAX_TRANSACTION_ATTEMPTS))
    }
}

fn multi() -> Pipeline {
    let mut pipe = redis::pipe();
    pipe.atomic();
    pipe
}

/// Counts pending tickets among `ids`, watching each ticket so a status change
/// made by the draw job invalidates the surrounding transaction.
async fn watch_pending(
    connection: &mut MultiplexedConnection,
    ids: &[String],
) -> Result<usize, AppError> {
    if ids.is_empty() {
        return Ok(0);
    }

    let keys: Vec<String> = ids.iter().map(|id| ticket_key(id)).collect();
    redis::cmd("WATCH")
        .arg(&keys)
        .query_async::<()>(&mut *connection)
        .await?;

    let mut pipe = redis::pipe();
    for key in &keys {
        pipe.hget(key, "status");
    }
    let statuses: Vec<Option<String>> = pipe.query_async(&mut *connection).await?;

    Ok(statuses
        .iter()
        .filter(|status| status.as_deref() == Some(TicketStatus::Pending.as_str()))
        .count())
}

fn field<T: FromStr>(fields: &HashMap<String, String>, name: &str) -> Option<T> {
    fields.get(name).and_then(|value| value.parse().ok())
}

fn flag(fields: &HashMap<String, String>, name: &str) -> bool {
    matches!(fields.get(name).map(String::as_str), Some("true" | "1"))
}

fn text(fields: &HashMap<String, String>, name: &str) -> Option<String> {
    fields.get(name).filter(|value| !value.is_empty()).cloned()
}

fn timestamp(fields: &HashMap<String, String>, name: &str) -> Option<DateTime<Utc>> {
    fields
        .get(name)
        .and_then(|value| DateTime::parse_from_rfc3339(value).ok())
        .map(|date| date.with_timezone(&Utc))
}

fn account_from_fields(fields: &HashMap<String, String>) -> Option<Account> {
    if fields.is_empty() {
        return None;
    }

    Some(Account {
        credits: field(fields, "credits").unwrap_or(0),
        profile_completed: flag(fields, "profileCompleted"),
        email: text(fields, "email"),
        display_name: text(fields, "displayName"),
        sponsor_code: text(fields, "sponsorCode"),
        referred_by: text(fields, "referredBy"),
        profile: Profile {
            phone: text(fields, "phone").unwrap_or_default(),
            address: text(fields, "address").unwrap_or_default(),
            postal_code: text(fields, "postalCode").unwrap_or_default(),
            city: text(fields, "city").unwrap_or_default(),
            country: text(fields, "country").unwrap_or_default(),
        },
        created_at: timestamp(fields, "createdAt"),
    })
}

fn account_fields(account: &Account) -> Vec<(&'static str, String)> {
    let mut fields = vec![
        ("credits", account.credits.to_string()),
        ("profileCompleted", account.profile_completed.to_string()),
    ];

    let optional = [
        ("email", account.email.clone()),
        ("displayName", account.display_name.clone()),
        ("sponsorCode", account.sponsor_code.clone()),
        ("referredBy", account.referred_by.clone()),
        ("createdAt", account.created_at.map(|date| date.to_rfc3339())),
    ];
    fields.extend(
        optional
            .into_iter()
            .filter_map(|(name, value)| value.map(|value| (name, value))),
    );
    fields.extend(profile_fields(&account.profile));

    fields
}

fn profile_fields(profile: &Profile) -> Vec<(&'static str, String)> {
    vec![
        ("phone", profile.phone.clone()),
        ("address", profile.address.clone()),
        ("postalCode", profile.postal_code.clone()),
        ("city", profile.city.clone()),
        ("country", profile.country.clone()),
    ]
}

fn ticket_from_fields(id: &str, fields: &HashMap<String, String>) -> Option<Ticket> {
    let numbers = fields
        .get("numbers")?
        .split(',')
        .filter(|n| !n.is_empty())
        .map(str::parse)
        .collect::<Result<Vec<u32>, _>>()
        .ok()?;

    Some(Ticket {
        id: id.to_string(),
        owner: text(fields, "owner")?,
        numbers,
        status: field(fields, "status")?,
        date: timestamp(fields, "date")?,
        entry_points: field(fields, "entryPoints")?,
        prize_id: text(fields, "prizeId").unwrap_or_default(),
    })
}

fn ticket_fields(ticket: &Ticket) -> Vec<(&'static str, String)> {
    let numbers = ticket
        .numbers
        .iter()
        .map(u32::to_string)
        .collect::<Vec<_>>()
        .join(",");

    vec![
        ("owner", ticket.owner.clone()),
        ("numbers", numbers),
        ("status", ticket.status.to_string()),
        ("date", ticket.date.to_rfc3339()),
        ("entryPoints", ticket.entry_points.to_string()),
        ("prizeId", ticket.prize_id.clone()),
    ]
}

fn stats_from_fields(fields: &HashMap<String, String>) -> Option<Stats> {
    if fields.is_empty() {
        return None;
    }

    Some(Stats {
        total_tickets_sold: field(fields, "totalTicketsSold").unwrap_or(0),
        total_revenue: field(fields, "totalRevenue").unwrap_or(0),
        updated_at: timestamp(fields, "updatedAt"),
    })
}

fn card_from_fields(fields: &HashMap<String, String>) -> Option<RechargeCard> {
    if fields.is_empty() {
        return None;
    }

    Some(RechargeCard {
        credits: field(fields, "credits").unwrap_or(0),
        used: flag(fields, "used"),
        used_by: text(fields, "usedBy"),
        used_at: timestamp(fields, "usedAt"),
    })
}

fn parse_document(key: &str, raw: Option<String>) -> Option<Value> {
    raw.and_then(|raw| {
        serde_json::from_str(&raw)
            .map_err(|e| warn!(%key, "Ignoring malformed document: {e}"))
            .ok()
    })
}

fn parse_documents(key: &str, entries: Vec<String>) -> Vec<Value> {
    entries
        .into_iter()
        .filter_map(|entry| parse_document(key, Some(entry)))
        .collect()
}

impl Store for RedisStore {
    async fn ping(&self) -> Result<(), AppError> {
        let mut connection = self.connection.clone();
        let _: () = connection.set(PROBE_KEY, Utc::now().to_rfc3339()).await?;

        Ok(())
    }

    async fn account(&self, uid: &str) -> Result<Option<Account>, AppError> {
        let mut connection = self.connection.clone();
        let fields: HashMap<String, String> = connection.hgetall(user_key(uid)).await?;

        Ok(account_from_fields(&fields))
    }

    async fn register(&self, uid: &str, account: Account) -> Result<(Account, bool), AppError> {
        let user = user_key(uid);

        // the code index is watched so two sign-ins cannot claim one code
        let keys = [user.clone(), SPONSOR_CODES_KEY.to_string()];

        self.transaction(&keys, |mut connection| {
            let (user, account) = (user.clone(), account.clone());
            let uid = uid.to_string();

            async move {
                let fields: HashMap<String, String> = connection.hgetall(&user).await?;

                if let Some(existing) = account_from_fields(&fields) {
                    return Ok((multi(), (existing, false)));
                }

                if let Some(code) = &account.sponsor_code {
                    let taken: bool = connection.hexists(SPONSOR_CODES_KEY, code).await?;
                    if taken {
                        return Err(AppError::SponsorCodeTaken(code.clone()));
                    }
                }

                let mut pipe = multi();
                pipe.hset_multiple(&user, &account_fields(&account))
                    .ignore();
                if let Some(code) = &account.sponsor_code {
                    pipe.hset(SPONSOR_CODES_KEY, code, &uid).ignore();
                }

                Ok((pipe, (account, true)))
            }
        })
        .await
    }

    async fn sponsor(&self, code: &str) -> Result<Option<String>, AppError> {
        let mut connection = self.connection.clone();

        Ok(connection.hget(SPONSOR_CODES_KEY, code).await?)
    }

    async fn complete_profile(&self, uid: &str, profile: &Profile) -> Result<(), AppError> {
        let mut connection = self.connection.clone();
        let user = user_key(uid);

        let exists: bool = connection.exists(&user).await?;
        if !exists {
            return Err(AppError::AccountNotFound);
        }

        let mut fields = profile_fields(profile);
        fields.push(("profileCompleted", true.to_string()));
        fields.push(("updatedAt", Utc::now().to_rfc3339()));

        let _: () = connection.hset_multiple(&user, &fields).await?;

        Ok(())
    }

    async fn tickets(&self, uid: &str) -> Result<Vec<Ticket>, AppError> {
        let mut connection = self.connection.clone();
        let ids: Vec<String> = connection.smembers(tickets_key(uid)).await?;

        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let mut pipe = redis::pipe();
        for id in &ids {
            pipe.hgetall(ticket_key(id));
        }
        let documents: Vec<HashMap<String, String>> = pipe.query_async(&mut connection).await?;

        let mut tickets: Vec<Ticket> = ids
            .iter()
            .zip(documents.iter())
            .filter_map(|(id, fields)| {
                let ticket = ticket_from_fields(id, fields);
                if ticket.is_none() {
                    warn!(%uid, ticket_id = %id, "Skipping unreadable ticket");
                }
                ticket
            })
            .collect();
        tickets.sort_by(|a, b| a.date.cmp(&b.date));

        Ok(tickets)
    }

    async fn history(&self, uid: &str) -> Result<Vec<ArchivedTicket>, AppError> {
        let mut connection = self.connection.clone();
        let entries: Vec<String> = connection.lrange(history_key(uid), 0, -1).await?;

        Ok(entries
            .iter()
            .filter_map(|entry| {
                serde_json::from_str(entry)
                    .map_err(|e| warn!(%uid, "Skipping malformed archived ticket: {e}"))
                    .ok()
            })
            .collect())
    }

    async fn prize(&self) -> Result<Option<Value>, AppError> {
        let mut connection = self.connection.clone();
        let raw: Option<String> = connection.get(PRIZE_KEY).await?;

        Ok(parse_document(PRIZE_KEY, raw))
    }

    async fn next_draw(&self) -> Result<Option<Value>, AppError> {
        let mut connection = self.connection.clone();
        let raw: Option<String> = connection.get(NEXT_DRAW_KEY).await?;

        Ok(parse_document(NEXT_DRAW_KEY, raw))
    }

    async fn stats(&self) -> Result<Option<Stats>, AppError> {
        let mut connection = self.connection.clone();
        let fields: HashMap<String, String> = connection.hgetall(STATS_KEY).await?;

        Ok(stats_from_fields(&fields))
    }

    async fn winners_exist(&self) -> Result<bool, AppError> {
        let mut connection = self.connection.clone();

        Ok(connection.exists(WINNERS_KEY).await?)
    }

    async fn winners(&self) -> Result<Vec<Value>, AppError> {
        let mut connection = self.connection.clone();
        let entries: Vec<String> = connection.lrange(WINNERS_KEY, 0, -1).await?;

        Ok(parse_documents(WINNERS_KEY, entries))
    }

    async fn winning_numbers(&self) -> Result<Option<Value>, AppError> {
        let mut connection = self.connection.clone();
        let raw: Option<String> = connection.get(WINNING_NUMBERS_KEY).await?;

        Ok(parse_document(WINNING_NUMBERS_KEY, raw))
    }

    async fn draws(&self) -> Result<Vec<Value>, AppError> {
        let mut connection = self.connection.clone();
        let entries: Vec<String> = connection.lrange(DRAWS_KEY, 0, -1).await?;

        Ok(parse_documents(DRAWS_KEY, entries))
    }

    async fn purchase(&self, uid: &str, draft: TicketDraft) -> Result<Receipt, AppError> {
        let user = user_key(uid);
        let index = tickets_key(uid);

        self.transaction(&[user.clone(), index.clone()], |mut connection| {
            let (user, index, draft) = (user.clone(), index.clone(), draft.clone());
            let uid = uid.to_string();

            async move {
                let balance: Option<u64> = connection.hget(&user, "credits").await?;
                let ids: Vec<String> = connection.smembers(&index).await?;
                let pending = watch_pending(&mut connection, &ids).await?;

                let new_credits = plan_purchase(balance.unwrap_or(0), pending, draft.entry_points)?;
                if balance.is_none() {
                    return Err(AppError::InsufficientCredits);
                }

                let now = Utc::now();
                let ticket = Ticket {
                    id: Uuid::new_v4().to_string(),
                    owner: uid,
                    numbers: draft.numbers,
                    status: TicketStatus::Pending,
                    date: now,
                    entry_points: draft.entry_points,
                    prize_id: draft.prize_id,
                };

                let mut pipe = multi();
                pipe.hset(&user, "credits", new_credits)
                    .ignore()
                    .hset_multiple(ticket_key(&ticket.id), &ticket_fields(&ticket))
                    .ignore()
                    .sadd(&index, &ticket.id)
                    .ignore()
                    .hincr(STATS_KEY, "totalTicketsSold", 1)
                    .ignore()
                    .hincr(STATS_KEY, "totalRevenue", ticket.entry_points)
                    .ignore()
                    .hset(STATS_KEY, "updatedAt", now.to_rfc3339())
                    .ignore();

                #[cfg(feature = "verbose")]
                info!(%user, pending, new_credits, "Purchase queued");

                Ok((
                    pipe,
                    Receipt {
                        ticket_id: ticket.id,
                        new_credits,
                    },
                ))
            }
        })
        .await
    }

    async fn add_credits(&self, uid: &str, amount: u64) -> Result<u64, AppError> {
        let user = user_key(uid);

        self.transaction(&[user.clone()], |mut connection| {
            let user = user.clone();

            async move {
                let balance: Option<u64> = connection.hget(&user, "credits").await?;
                let new_credits = balance
                    .ok_or(AppError::AccountNotFound)?
                    .checked_add(amount)
                    .ok_or(AppError::InvalidAmount)?;

                let mut pipe = multi();
                pipe.hset(&user, "credits", new_credits).ignore();

                Ok((pipe, new_credits))
            }
        })
        .await
    }

    async fn redeem(&self, uid: &str, code: &str) -> Result<Redemption, AppError> {
        let user = user_key(uid);
        let card = card_key(code);

        self.transaction(&[card.clone(), user.clone()], |mut connection| {
            let (user, card) = (user.clone(), card.clone());
            let uid = uid.to_string();

            async move {
                let fields: HashMap<String, String> = connection.hgetall(&card).await?;
                let credited = plan_redemption(card_from_fields(&fields).as_ref())?;

                let balance: Option<u64> = connection.hget(&user, "credits").await?;
                let new_credits = balance
                    .ok_or(AppError::AccountNotFound)?
                    .checked_add(credited)
                    .ok_or(AppError::InvalidAmount)?;

                let mut pipe = multi();
                pipe.hset_multiple(
                    &card,
                    &[
                        ("used", true.to_string()),
                        ("usedBy", uid),
                        ("usedAt", Utc::now().to_rfc3339()),
                    ],
                )
                .ignore()
                .hset(&user, "credits", new_credits)
                .ignore();

                Ok((
                    pipe,
                    Redemption {
                        credited,
                        new_credits,
                    },
                ))
            }
        })
        .await
    }
}
