use std::sync::Arc;

use axum::{
    Router,
    body::Body,
    http::{Method, Request, StatusCode, header},
};
use http_body_util::BodyExt;
use serde_json::{Value, json};
use server::{
    app,
    auth::StaticVerifier,
    config::Config,
    memory::MemoryStore,
    models::{Account, TicketStatus},
    state::State,
    store::Store,
};
use tower::ServiceExt;

const TOKEN: &str = "token-alice";
const UID: &str = "uid-alice";
const NUMBERS: [u32; 6] = [4, 8, 15, 16, 23, 42];

struct Harness {
    state: Arc<State<MemoryStore, StaticVerifier>>,
}

impl Harness {
    fn new() -> Self {
        let verifier = StaticVerifier::new()
            .with_user(TOKEN, UID)
            .with_user("token-bob", "uid-bob");

        Self {
            state: State::new(Config::default(), MemoryStore::new(), verifier),
        }
    }

    async fn with_prize(self, entry_points: u64) -> Self {
        self.store()
            .set_prize(json!({ "name": "Vélo électrique", "entryPoints": entry_points }))
            .await;
        self
    }

    async fn with_credits(self, uid: &str, credits: u64) -> Self {
        self.store()
            .insert_account(
                uid,
                Account {
                    credits,
                    ..Default::default()
                },
            )
            .await;
        self
    }

    fn store(&self) -> &MemoryStore {
        &self.state.store
    }

    fn router(&self) -> Router {
        app(self.state.clone())
    }

    async fn call(
        &self,
        method: Method,
        uri: &str,
        token: Option<&str>,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        let mut request = Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            request = request.header(header::AUTHORIZATION, format!("Bearer {token}"));
        }

        let request = match body {
            Some(body) => request
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string())),
            None => request.body(Body::empty()),
        }
        .unwrap();

        let response = self.router().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let value = serde_json::from_slice(&bytes).unwrap_or(Value::Null);

        (status, value)
    }

    async fn buy(&self, token: &str) -> (StatusCode, Value) {
        self.call(
            Method::POST,
            "/api/buy-ticket",
            Some(token),
            Some(json!({ "selectedNumbers": NUMBERS })),
        )
        .await
    }
}

#[tokio::test]
async fn test_missing_or_bad_token() {
    let harness = Harness::new().with_prize(50).await.with_credits(UID, 100).await;

    let (status, body) = harness
        .call(Method::GET, "/api/game-data", None, None)
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"], "Non autorisé");

    let (status, body) = harness
        .call(
            Method::POST,
            "/api/buy-ticket",
            Some("forged"),
            Some(json!({ "selectedNumbers": NUMBERS })),
        )
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"], "Token invalide");

    assert!(harness.store().tickets(UID).await.unwrap().is_empty());
    assert_eq!(
        harness.store().account(UID).await.unwrap().unwrap().credits,
        100
    );
}

#[tokio::test]
async fn test_purchase_scenario() {
    let harness = Harness::new().with_prize(50).await.with_credits(UID, 100).await;

    let (status, body) = harness.buy(TOKEN).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);
    assert_eq!(body["newCredits"], 50);
    assert_eq!(body["numbers"], json!(NUMBERS));

    let tickets = harness.store().tickets(UID).await.unwrap();
    assert_eq!(tickets.len(), 1);
    assert_eq!(tickets[0].id, body["ticketId"]);
    assert_eq!(tickets[0].status, TicketStatus::Pending);
    assert_eq!(tickets[0].prize_id, "Vélo électrique");

    let (status, body) = harness.buy(TOKEN).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["newCredits"], 0);

    harness.store().add_credits(UID, 1_000).await.unwrap();
    let (status, body) = harness.buy(TOKEN).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "Vous avez déjà acheté le maximum de 2 tickets");
}

#[tokio::test]
async fn test_insufficient_credits() {
    let harness = Harness::new().with_prize(50).await.with_credits(UID, 30).await;

    let (status, body) = harness.buy(TOKEN).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "Crédits insuffisants");

    assert!(harness.store().tickets(UID).await.unwrap().is_empty());
    assert_eq!(
        harness.store().account(UID).await.unwrap().unwrap().credits,
        30
    );
}

#[tokio::test]
async fn test_purchase_alias_and_hints() {
    let harness = Harness::new().with_prize(50).await.with_credits(UID, 100).await;

    let (status, body) = harness
        .call(
            Method::POST,
            "/api/purchase-ticket",
            Some(TOKEN),
            Some(json!({ "selectedNumbers": NUMBERS, "entryPoints": 1 })),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "L'offre a changé, veuillez actualiser la page");

    let (status, body) = harness
        .call(
            Method::POST,
            "/api/purchase-ticket",
            Some(TOKEN),
            Some(json!({
                "selectedNumbers": NUMBERS,
                "entryPoints": 50,
                "prize": "Vélo électrique",
            })),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["newCredits"], 50);
}

#[tokio::test]
async fn test_invalid_selection_and_payload() {
    let harness = Harness::new().with_prize(50).await.with_credits(UID, 100).await;

    let (status, body) = harness
        .call(
            Method::POST,
            "/api/buy-ticket",
            Some(TOKEN),
            Some(json!({ "selectedNumbers": [1, 1, 2, 3, 4, 5] })),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].as_str().unwrap().starts_with("Sélection invalide"));

    let (status, _) = harness
        .call(
            Method::POST,
            "/api/buy-ticket",
            Some(TOKEN),
            Some(json!({ "selectedNumbers": "lucky" })),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    assert_eq!(
        harness.store().account(UID).await.unwrap().unwrap().credits,
        100
    );
}

#[tokio::test]
async fn test_no_prize_configured() {
    let harness = Harness::new().with_credits(UID, 100).await;

    let (status, body) = harness.buy(TOKEN).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "Aucun tirage actif pour le moment");
}

#[tokio::test]
async fn test_concurrent_requests_last_slot() {
    let harness = Harness::new().with_prize(50).await.with_credits(UID, 100).await;
    harness.buy(TOKEN).await;

    let (first, second) = tokio::join!(harness.buy(TOKEN), harness.buy(TOKEN));

    let statuses = [first.0, second.0];
    assert_eq!(statuses.iter().filter(|s| **s == StatusCode::OK).count(), 1);
    assert_eq!(
        statuses
            .iter()
            .filter(|s| **s == StatusCode::BAD_REQUEST)
            .count(),
        1
    );
    assert_eq!(harness.store().tickets(UID).await.unwrap().len(), 2);

    let stats = harness.store().stats().await.unwrap().unwrap();
    assert_eq!(stats.total_tickets_sold, 2);
    assert_eq!(stats.total_revenue, 100);
}

#[tokio::test]
async fn test_game_data_defaults() {
    let harness = Harness::new();

    let (status, body) = harness
        .call(Method::GET, "/api/game-data", Some(TOKEN), None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["userCredits"], 0);
    assert_eq!(body["userTickets"], json!([]));
    assert_eq!(body["prize"], Value::Null);
    assert_eq!(body["draw"], Value::Null);
    assert_eq!(body["stats"]["totalTicketsSold"], 0);
    assert_eq!(body["winnersExist"], false);
}

#[tokio::test]
async fn test_game_data_snapshot() {
    let harness = Harness::new().with_prize(50).await.with_credits(UID, 100).await;
    harness
        .store()
        .set_next_draw(json!({ "date": "2025-06-01T20:00:00Z", "completed": false }))
        .await;
    harness
        .store()
        .add_winner(json!({ "userId": "uid-bob", "prize": "Vélo électrique" }))
        .await;
    harness.buy(TOKEN).await;

    let (status, body) = harness
        .call(Method::GET, "/api/game-data", Some(TOKEN), None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["userCredits"], 50);
    assert_eq!(body["userTickets"][0]["status"], "pending");
    assert_eq!(body["userTickets"][0]["numbers"], json!(NUMBERS));
    assert_eq!(body["prize"]["entryPoints"], 50);
    assert_eq!(body["draw"]["completed"], false);
    assert_eq!(body["stats"]["totalRevenue"], 50);
    assert_eq!(body["winnersExist"], true);
}

#[tokio::test]
async fn test_add_credits() {
    let harness = Harness::new().with_credits(UID, 100).await;

    let (status, body) = harness
        .call(
            Method::POST,
            "/api/add-credits",
            Some(TOKEN),
            Some(json!({ "amount": 250 })),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["newCredits"], 350);

    for amount in [json!(0), json!(-10), json!(2.5), json!(1_000_000)] {
        let (status, body) = harness
            .call(
                Method::POST,
                "/api/add-credits",
                Some(TOKEN),
                Some(json!({ "amount": amount })),
            )
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST, "{amount}");
        assert_eq!(body["error"], "Montant invalide");
    }

    let (status, _) = harness
        .call(
            Method::POST,
            "/api/add-credits",
            Some("token-bob"),
            Some(json!({ "amount": 10 })),
        )
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_redeem_code_once() {
    let harness = Harness::new()
        .with_credits(UID, 100)
        .await
        .with_credits("uid-bob", 0)
        .await;
    harness.store().insert_card("LOTO-TX4ZAQEA", 200).await;

    let (status, body) = harness
        .call(
            Method::POST,
            "/api/redeem-code",
            Some(TOKEN),
            Some(json!({ "code": " loto-tx4zaqea " })),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["credited"], 200);
    assert_eq!(body["newCredits"], 300);

    let (status, body) = harness
        .call(
            Method::POST,
            "/api/redeem-code",
            Some("token-bob"),
            Some(json!({ "code": "LOTO-TX4ZAQEA" })),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "Code déjà utilisé");

    let card = harness.store().card("LOTO-TX4ZAQEA").await.unwrap();
    assert_eq!(card.used_by.as_deref(), Some(UID));

    let (status, body) = harness
        .call(
            Method::POST,
            "/api/redeem-code",
            Some(TOKEN),
            Some(json!({ "code": "LOTO-NOPE0000" })),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "Code invalide");
}

#[tokio::test]
async fn test_register_and_profile() {
    let harness = Harness::new();

    let (status, alice) = harness
        .call(Method::POST, "/api/register", Some(TOKEN), None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(alice["created"], true);
    assert_eq!(alice["credits"], 400);
    assert_eq!(alice["profileCompleted"], false);

    let (status, again) = harness
        .call(Method::POST, "/api/register", Some(TOKEN), Some(json!({})))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(again["created"], false);
    assert_eq!(again["sponsorCode"], alice["sponsorCode"]);

    let (status, body) = harness
        .call(
            Method::POST,
            "/api/register",
            Some("token-bob"),
            Some(json!({ "sponsorCode": "LP-ZZZZ" })),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "Code de parrainage invalide");

    let (status, bob) = harness
        .call(
            Method::POST,
            "/api/register",
            Some("token-bob"),
            Some(json!({ "sponsorCode": alice["sponsorCode"] })),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(bob["created"], true);
    let account = harness.store().account("uid-bob").await.unwrap().unwrap();
    assert_eq!(account.referred_by.as_deref(), Some(UID));

    let (status, body) = harness
        .call(
            Method::POST,
            "/api/complete-profile",
            Some(TOKEN),
            Some(json!({ "phone": "0612345678", "address": "1 rue Haute" })),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "Veuillez remplir tous les champs obligatoires");

    let (status, body) = harness
        .call(
            Method::POST,
            "/api/complete-profile",
            Some(TOKEN),
            Some(json!({
                "phone": "0612345678",
                "address": "1  rue Haute",
                "postalCode": "69001",
                "city": "Lyon",
                "country": "France",
            })),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);

    let account = harness.store().account(UID).await.unwrap().unwrap();
    assert!(account.profile_completed);
    assert_eq!(account.profile.address, "1 rue Haute");
}

#[tokio::test]
async fn test_history_newest_first() {
    let harness = Harness::new().with_prize(50).await.with_credits(UID, 200).await;

    let (_, first) = harness.buy(TOKEN).await;
    let (_, second) = harness.buy(TOKEN).await;
    let first_id = first["ticketId"].as_str().unwrap();
    let second_id = second["ticketId"].as_str().unwrap();

    let store = harness.store();
    store
        .set_ticket_status(UID, first_id, TicketStatus::Lost)
        .await;
    store
        .archive_resolved(UID, "2025-06-01T20:00:00Z".parse().unwrap())
        .await;
    store
        .set_ticket_status(UID, second_id, TicketStatus::Won)
        .await;
    store
        .archive_resolved(UID, "2025-06-08T20:00:00Z".parse().unwrap())
        .await;

    let (status, body) = harness
        .call(Method::GET, "/api/history", Some(TOKEN), None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["tickets"][0]["id"], second_id);
    assert_eq!(body["tickets"][0]["status"], "won");
    assert_eq!(body["tickets"][1]["id"], first_id);
    assert!(store.tickets(UID).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_results_defaults() {
    let harness = Harness::new();

    let (status, _) = harness.call(Method::GET, "/api/results", None, None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, body) = harness
        .call(Method::GET, "/api/results", Some(TOKEN), None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["winners"], json!([]));
    assert_eq!(body["winningNumbers"], json!([]));
    assert_eq!(body["prize"], Value::Null);
    assert_eq!(body["draw"], Value::Null);

    let (status, body) = harness
        .call(Method::GET, "/api/draws", Some(TOKEN), None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["draws"], json!([]));
}

#[tokio::test]
async fn test_results_after_draw() {
    let harness = Harness::new().with_prize(50).await;
    let store = harness.store();
    store
        .add_winner(json!({ "userId": "uid-bob", "displayName": "Bob", "numbers": NUMBERS }))
        .await;
    store
        .set_winning_numbers(json!({ "numbers": NUMBERS }))
        .await;
    store
        .add_draw(json!({ "id": "d1", "status": "completed", "completedAt": "2025-05-01T20:00:00Z" }))
        .await;
    store
        .add_draw(json!({ "id": "d2", "status": "scheduled" }))
        .await;
    store
        .add_draw(json!({ "id": "d3", "status": "completed", "completedAt": "2025-06-01T20:00:00Z" }))
        .await;

    let (status, body) = harness
        .call(Method::GET, "/api/results", Some(TOKEN), None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["winners"][0]["displayName"], "Bob");
    assert_eq!(body["winningNumbers"], json!(NUMBERS));
    assert_eq!(body["prize"]["name"], "Vélo électrique");

    let (status, body) = harness
        .call(Method::GET, "/api/draws", Some(TOKEN), None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["draws"].as_array().unwrap().len(), 2);
    assert_eq!(body["draws"][0]["id"], "d3");
    assert_eq!(body["draws"][1]["id"], "d1");
}

#[tokio::test]
async fn test_store_check_needs_no_token() {
    let harness = Harness::new();

    let (status, _) = harness
        .call(Method::GET, "/test-firebase", None, None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert!(harness.store().last_probe().await.is_some());
}
