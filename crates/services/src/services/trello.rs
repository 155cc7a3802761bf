//! REST client for the Trello API.
//!
//! The sync engine consumes Trello through the [`BoardApi`] trait so tests
//! can substitute an in-memory board. [`TrelloService`] is the production
//! implementation over reqwest; authentication is the usual key/token query
//! parameter pair.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use thiserror::Error;

/// Errors from the Trello API client.
///
/// Every variant is recoverable per item: a failed call aborts the one
/// deliverable being synced, never the batch.
#[derive(Debug, Error)]
pub enum TrelloServiceError {
    #[error("request to Trello failed: {0}")]
    Transport(String),
    #[error("Trello returned HTTP {status}: {body}")]
    Http { status: u16, body: String },
    #[error("failed to parse Trello response: {0}")]
    Parse(String),
}

/// A list on a board.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrelloList {
    pub id: String,
    pub name: String,
}

/// A label on a board.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrelloLabel {
    pub id: String,
    pub name: String,
}

/// A board with its lists and labels. Fetched once per sync run and shared
/// read-only across all deliverables routed to it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrelloBoard {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub lists: Vec<TrelloList>,
    #[serde(default)]
    pub labels: Vec<TrelloLabel>,
}

/// A card, as returned from card reads and creation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrelloCard {
    pub id: String,
    #[serde(default)]
    pub name: String,
}

/// An item on a checklist.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrelloCheckItem {
    pub id: String,
    pub name: String,
}

/// A checklist on a card, with its current items.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrelloChecklist {
    pub id: String,
    pub name: String,
    #[serde(rename = "checkItems", default)]
    pub check_items: Vec<TrelloCheckItem>,
}

impl TrelloChecklist {
    /// Whether `checkitem_id` is among this checklist's current items.
    pub fn contains_item(&self, checkitem_id: &str) -> bool {
        self.check_items.iter().any(|ci| ci.id == checkitem_id)
    }
}

/// Payload for creating a card from a template.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NewCard {
    pub desc: String,
    pub id_card_source: String,
    pub id_labels: String,
    pub id_list: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id_members: Option<String>,
    pub keep_from_source: String,
    pub name: String,
}

#[derive(Debug, Clone, Serialize)]
struct NewCheckItem<'a> {
    name: &'a str,
}

/// The capability surface the sync engine needs from the board service.
#[async_trait]
pub trait BoardApi: Send + Sync {
    /// Fetch a board with its lists and labels.
    async fn get_board(&self, board_id: &str) -> Result<TrelloBoard, TrelloServiceError>;

    /// Fetch the cards on a list.
    async fn get_cards_for_list(&self, list_id: &str)
    -> Result<Vec<TrelloCard>, TrelloServiceError>;

    /// Fetch the checklists on a card, including their items.
    async fn get_checklists(&self, card_id: &str)
    -> Result<Vec<TrelloChecklist>, TrelloServiceError>;

    /// Create a card (copying checklists from the source card when
    /// `keep_from_source` says so).
    async fn create_card(&self, card: &NewCard) -> Result<TrelloCard, TrelloServiceError>;

    /// Create a checklist item.
    async fn create_checklist_item(
        &self,
        checklist_id: &str,
        name: &str,
    ) -> Result<TrelloCheckItem, TrelloServiceError>;

    /// Update a checklist item's text in place.
    async fn update_checklist_item(
        &self,
        card_id: &str,
        checkitem_id: &str,
        name: &str,
    ) -> Result<TrelloCheckItem, TrelloServiceError>;
}

/// Configuration for the Trello client.
#[derive(Debug, Clone)]
pub struct TrelloConfig {
    /// API base URL (e.g. "https://api.trello.com/1")
    pub base_url: String,
    /// API key
    pub api_key: String,
    /// API token
    pub api_token: String,
}

impl TrelloConfig {
    const DEFAULT_BASE_URL: &'static str = "https://api.trello.com/1";

    /// Build the config from `TRELLO_API_KEY` / `TRELLO_API_TOKEN`
    /// (and optionally `TRELLO_BASE_URL`).
    pub fn from_env() -> Result<Self, TrelloServiceError> {
        let api_key = std::env::var("TRELLO_API_KEY")
            .map_err(|_| TrelloServiceError::Transport("TRELLO_API_KEY not set".to_string()))?;
        let api_token = std::env::var("TRELLO_API_TOKEN")
            .map_err(|_| TrelloServiceError::Transport("TRELLO_API_TOKEN not set".to_string()))?;
        let base_url = std::env::var("TRELLO_BASE_URL")
            .unwrap_or_else(|_| Self::DEFAULT_BASE_URL.to_string());

        Ok(Self {
            base_url,
            api_key,
            api_token,
        })
    }
}

/// Production [`BoardApi`] implementation over the Trello REST API.
pub struct TrelloService {
    http: Client,
    config: TrelloConfig,
}

impl TrelloService {
    const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

    pub fn new(config: TrelloConfig) -> Self {
        let http = Client::builder()
            .timeout(Self::REQUEST_TIMEOUT)
            .user_agent(concat!("trello-sync/", env!("CARGO_PKG_VERSION")))
            .build()
            .expect("failed to build HTTP client");

        Self { http, config }
    }

    fn url(&self, path: &str) -> String {
        format!(
            "{}{}?key={}&token={}",
            self.config.base_url.trim_end_matches('/'),
            path,
            self.config.api_key,
            self.config.api_token
        )
    }

    async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T, TrelloServiceError> {
        let response = self
            .http
            .get(self.url(path))
            .send()
            .await
            .map_err(|e| TrelloServiceError::Transport(e.to_string()))?;

        Self::read_json(response).await
    }

    async fn send_json<T: DeserializeOwned, B: Serialize>(
        &self,
        method: reqwest::Method,
        path: &str,
        body: &B,
    ) -> Result<T, TrelloServiceError> {
        let response = self
            .http
            .request(method, self.url(path))
            .json(body)
            .send()
            .await
            .map_err(|e| TrelloServiceError::Transport(e.to_string()))?;

        Self::read_json(response).await
    }

    async fn read_json<T: DeserializeOwned>(
        response: reqwest::Response,
    ) -> Result<T, TrelloServiceError> {
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(TrelloServiceError::Http {
                status: status.as_u16(),
                body,
            });
        }

        response
            .json::<T>()
            .await
            .map_err(|e| TrelloServiceError::Parse(e.to_string()))
    }

    /// Fetch the lists on a board.
    pub async fn get_lists(&self, board_id: &str) -> Result<Vec<TrelloList>, TrelloServiceError> {
        self.get(&format!("/boards/{board_id}/lists")).await
    }

    /// Fetch the labels on a board.
    pub async fn get_labels(&self, board_id: &str) -> Result<Vec<TrelloLabel>, TrelloServiceError> {
        self.get(&format!("/boards/{board_id}/labels")).await
    }
}

#[async_trait]
impl BoardApi for TrelloService {
    async fn get_board(&self, board_id: &str) -> Result<TrelloBoard, TrelloServiceError> {
        let mut board: TrelloBoard = self.get(&format!("/boards/{board_id}")).await?;
        board.lists = self.get_lists(board_id).await?;
        board.labels = self.get_labels(board_id).await?;
        Ok(board)
    }

    async fn get_cards_for_list(
        &self,
        list_id: &str,
    ) -> Result<Vec<TrelloCard>, TrelloServiceError> {
        self.get(&format!("/lists/{list_id}/cards")).await
    }

    async fn get_checklists(
        &self,
        card_id: &str,
    ) -> Result<Vec<TrelloChecklist>, TrelloServiceError> {
        self.get(&format!("/cards/{card_id}/checklists")).await
    }

    async fn create_card(&self, card: &NewCard) -> Result<TrelloCard, TrelloServiceError> {
        self.send_json(reqwest::Method::POST, "/cards", card).await
    }

    async fn create_checklist_item(
        &self,
        checklist_id: &str,
        name: &str,
    ) -> Result<TrelloCheckItem, TrelloServiceError> {
        self.send_json(
            reqwest::Method::POST,
            &format!("/checklists/{checklist_id}/checkItems"),
            &NewCheckItem { name },
        )
        .await
    }

    async fn update_checklist_item(
        &self,
        card_id: &str,
        checkitem_id: &str,
        name: &str,
    ) -> Result<TrelloCheckItem, TrelloServiceError> {
        self.send_json(
            reqwest::Method::PUT,
            &format!("/cards/{card_id}/checkItem/{checkitem_id}"),
            &NewCheckItem { name },
        )
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_card_serializes_to_trello_field_names() {
        let card = NewCard {
            desc: "links".to_string(),
            id_card_source: "tmpl-1".to_string(),
            id_labels: "label-1".to_string(),
            id_list: "list-1".to_string(),
            id_members: Some("member-1".to_string()),
            keep_from_source: "checklists".to_string(),
            name: "Marsh, Ada".to_string(),
        };

        let value = serde_json::to_value(&card).unwrap();
        assert_eq!(value["idCardSource"], "tmpl-1");
        assert_eq!(value["idLabels"], "label-1");
        assert_eq!(value["idList"], "list-1");
        assert_eq!(value["idMembers"], "member-1");
        assert_eq!(value["keepFromSource"], "checklists");
    }

    #[test]
    fn test_new_card_omits_members_when_unset() {
        let card = NewCard {
            desc: String::new(),
            id_card_source: "tmpl-1".to_string(),
            id_labels: "label-1".to_string(),
            id_list: "list-1".to_string(),
            id_members: None,
            keep_from_source: "checklists".to_string(),
            name: "Marsh, Ada".to_string(),
        };

        let value = serde_json::to_value(&card).unwrap();
        assert!(value.get("idMembers").is_none());
    }

    #[test]
    fn test_checklist_deserializes_check_items() {
        let json = r#"
        {
            "id": "cl-1",
            "name": "Returns to File",
            "checkItems": [
                {"id": "ci-1", "name": "first"},
                {"id": "ci-2", "name": "second"}
            ]
        }
        "#;

        let checklist: TrelloChecklist = serde_json::from_str(json).unwrap();
        assert_eq!(checklist.check_items.len(), 2);
        assert!(checklist.contains_item("ci-2"));
        assert!(!checklist.contains_item("ci-3"));
    }

    #[test]
    fn test_board_tolerates_missing_lists_and_labels() {
        let board: TrelloBoard = serde_json::from_str(r#"{"id": "board-1"}"#).unwrap();
        assert!(board.lists.is_empty());
        assert!(board.labels.is_empty());
    }
}
