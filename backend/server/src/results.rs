//! # Results
//!
//! Read-only view of what the draw job published: the winners of the last
//! draw, its winning numbers and the archive of completed draws. Missing
//! records read as empty, like the game screen.
use std::cmp::Reverse;

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;

use crate::{error::AppError, store::Store};

const COMPLETED: &str = "completed";

#[derive(Serialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct ResultsResponse {
    pub winners: Vec<Value>,
    pub winning_numbers: Vec<u32>,
    pub prize: Option<Value>,
    pub draw: Option<Value>,
}

#[derive(Serialize, Debug)]
pub struct DrawsResponse {
    pub draws: Vec<Value>,
}

/// Reads `numbers` out of the winning numbers document, skipping anything
/// that is not a number in range.
pub fn winning_numbers(document: Option<&Value>) -> Vec<u32> {
    document
        .and_then(|document| document.get("numbers"))
        .and_then(Value::as_array)
        .map(|numbers| {
            numbers
                .iter()
                .filter_map(Value::as_u64)
                .filter_map(|n| u32::try_from(n).ok())
                .collect()
        })
        .unwrap_or_default()
}

fn completed_at(draw: &Value) -> Option<DateTime<Utc>> {
    draw.get("completedAt")
        .and_then(Value::as_str)
        .and_then(|date| DateTime::parse_from_rfc3339(date).ok())
        .map(|date| date.with_timezone(&Utc))
}

/// Keeps completed draws, most recent first. Undated ones go last.
pub fn completed_draws(draws: Vec<Value>) -> Vec<Value> {
    let mut completed: Vec<Value> = draws
        .into_iter()
        .filter(|draw| draw.get("status").and_then(Value::as_str) == Some(COMPLETED))
        .collect();
    completed.sort_by_key(|draw| Reverse(completed_at(draw)));

    completed
}

pub async fn results<S: Store>(store: &S) -> Result<ResultsResponse, AppError> {
    let (winners, numbers, prize, draw) = tokio::try_join!(
        store.winners(),
        store.winning_numbers(),
        store.prize(),
        store.next_draw(),
    )?;

    Ok(ResultsResponse {
        winners,
        winning_numbers: winning_numbers(numbers.as_ref()),
        prize,
        draw,
    })
}

pub async fn draws<S: Store>(store: &S) -> Result<DrawsResponse, AppError> {
    Ok(DrawsResponse {
        draws: completed_draws(store.draws().await?),
    })
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn test_winning_numbers() {
        let document = json!({ "numbers": [7, 14, "x", -3, 49] });

        assert_eq!(winning_numbers(Some(&document)), vec![7, 14, 49]);
        assert!(winning_numbers(None).is_empty());
        assert!(winning_numbers(Some(&json!({ "drawnAt": "2025-06-01" }))).is_empty());
    }

    #[test]
    fn test_completed_draws_newest_first() {
        let draws = vec![
            json!({ "id": "d1", "status": "completed", "completedAt": "2025-05-01T20:00:00Z" }),
            json!({ "id": "d2", "status": "scheduled" }),
            json!({ "id": "d3", "status": "completed" }),
            json!({ "id": "d4", "status": "completed", "completedAt": "2025-06-01T20:00:00Z" }),
        ];

        let ids: Vec<_> = completed_draws(draws)
            .iter()
            .map(|draw| draw["id"].as_str().unwrap().to_string())
            .collect();

        assert_eq!(ids, ["d4", "d1", "d3"]);
    }
}
