//! The deliverable reconciliation engine.
//!
//! For each deliverable in a batch: resolve which card and checklist it
//! belongs on (creating the client card when none exists), then create or
//! update its checklist item and record the binding in `trello_relations`.
//! Runs are idempotent: a second sync with no external drift updates the
//! existing items in place. The stored checkitem id is re-checked against
//! the live checklist before being trusted, so manual deletions and earlier
//! partial failures heal by recreating the item.
//!
//! Per-deliverable failures are logged and isolated; the batch always
//! completes and reports per-deliverable outcomes plus an aggregate count.

use std::sync::Arc;

use db::models::deliverable::DeliverableWithOwners;
use db::models::trello_relation::{BoardType, RelationError, RelationType, TrelloRelation};
use futures::future::join_all;
use serde::Serialize;
use sqlx::SqlitePool;
use thiserror::Error;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::board_options::BoardOptions;
use super::trello::{BoardApi, NewCard, TrelloBoard, TrelloServiceError};

#[derive(Debug, Error)]
pub enum DeliverableSyncError {
    #[error("no deliverable found for id {0}")]
    NotFound(Uuid),
    #[error("no {0} board recorded for this tax season")]
    BoardMissing(BoardType),
    #[error("checklist '{0}' not found on the card")]
    ChecklistMissing(String),
    #[error("no list matching '{0}' on the board")]
    ListMissing(String),
    #[error("no '{0}' list on the reference board")]
    TemplatesListMissing(String),
    #[error("no template card named '{0}' on the reference board")]
    TemplateCardMissing(String),
    #[error("no preparer assigned to the client for this tax season")]
    PreparerMissing,
    #[error("no label for preparer '{0}' on the board")]
    LabelMissing(String),
    #[error(transparent)]
    Relation(#[from] RelationError),
    #[error(transparent)]
    Database(#[from] sqlx::Error),
    #[error(transparent)]
    Trello(#[from] TrelloServiceError),
}

/// Boards fetched once at the start of a sync run and shared read-only
/// across all concurrent resolutions.
#[derive(Debug, Default)]
pub struct BoardSnapshots {
    tax_return: Option<TrelloBoard>,
    financial_statements: Option<TrelloBoard>,
}

impl BoardSnapshots {
    pub fn get(&self, board_type: BoardType) -> Option<&TrelloBoard> {
        match board_type {
            BoardType::TaxReturn => self.tax_return.as_ref(),
            BoardType::FinancialStatements => self.financial_statements.as_ref(),
        }
    }

    fn set(&mut self, board_type: BoardType, board: TrelloBoard) {
        match board_type {
            BoardType::TaxReturn => self.tax_return = Some(board),
            BoardType::FinancialStatements => self.financial_statements = Some(board),
        }
    }
}

/// The resolved view of one deliverable: where its checklist item must
/// live, and the item currently recorded for it (if any).
#[derive(Debug, Clone)]
pub struct DeliverableContext {
    pub deliverable: DeliverableWithOwners,
    pub board_type: BoardType,
    pub checklist_name: String,
    pub checkitem_id: Option<String>,
    pub card_id: String,
}

/// Per-deliverable result of a sync run.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeliverableOutcome {
    pub deliverable_id: Uuid,
    pub synced: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Batch result: the aggregate count plus per-deliverable outcomes so
/// callers can tell partial success from full success.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncSummary {
    /// Deliverables that completed resolution (attempted syncs, not
    /// necessarily externally confirmed ones).
    pub num_updated_deliverables: usize,
    pub results: Vec<DeliverableOutcome>,
}

pub struct DeliverableSyncService {
    pool: SqlitePool,
    board_api: Arc<dyn BoardApi>,
    options: BoardOptions,
    controller_url: String,
}

impl DeliverableSyncService {
    pub fn new(
        pool: SqlitePool,
        board_api: Arc<dyn BoardApi>,
        options: BoardOptions,
        controller_url: String,
    ) -> Self {
        Self {
            pool,
            board_api,
            options,
            controller_url: controller_url.trim_end_matches('/').to_string(),
        }
    }

    /// Sync a batch of deliverables with Trello.
    ///
    /// Only a batch-level failure (the board lookup itself) is returned as
    /// an error; per-deliverable failures are reported in the summary.
    pub async fn sync_deliverables(
        &self,
        deliverable_ids: &[Uuid],
        tax_season_id: Uuid,
    ) -> Result<SyncSummary, DeliverableSyncError> {
        let boards = self.load_board_snapshots(tax_season_id).await?;

        let resolutions = join_all(deliverable_ids.iter().map(|&deliverable_id| {
            let boards = &boards;
            async move {
                let resolved = self
                    .resolve_deliverable(deliverable_id, tax_season_id, boards)
                    .await;
                (deliverable_id, resolved)
            }
        }))
        .await;

        let mut outcomes = Vec::with_capacity(deliverable_ids.len());
        let mut contexts = Vec::new();
        for (deliverable_id, resolved) in resolutions {
            match resolved {
                Ok(ctx) => contexts.push(ctx),
                Err(e) => {
                    warn!(
                        deliverable_id = %deliverable_id,
                        error = %e,
                        "Failed to resolve deliverable"
                    );
                    outcomes.push(DeliverableOutcome {
                        deliverable_id,
                        synced: false,
                        error: Some(e.to_string()),
                    });
                }
            }
        }

        let num_updated_deliverables = contexts.len();

        let reconciliations = join_all(contexts.iter().map(|ctx| async move {
            let result = self.sync_deliverable(ctx, tax_season_id).await;
            (ctx.deliverable.id, result)
        }))
        .await;

        for (deliverable_id, result) in reconciliations {
            match result {
                Ok(()) => outcomes.push(DeliverableOutcome {
                    deliverable_id,
                    synced: true,
                    error: None,
                }),
                Err(e) => {
                    warn!(
                        deliverable_id = %deliverable_id,
                        error = %e,
                        "Failed to sync deliverable with Trello"
                    );
                    outcomes.push(DeliverableOutcome {
                        deliverable_id,
                        synced: false,
                        error: Some(e.to_string()),
                    });
                }
            }
        }

        Ok(SyncSummary {
            num_updated_deliverables,
            results: outcomes,
        })
    }

    /// Fetch the boards recorded for this season. Board relations key the
    /// season itself as the controller id. A season with no board recorded
    /// is skipped, not an error; its deliverables fail resolution
    /// individually.
    async fn load_board_snapshots(
        &self,
        tax_season_id: Uuid,
    ) -> Result<BoardSnapshots, DeliverableSyncError> {
        let mut boards = BoardSnapshots::default();

        if let Some(board_id) = TrelloRelation::find(
            &self.pool,
            tax_season_id,
            RelationType::Board,
            BoardType::TaxReturn,
            tax_season_id,
        )
        .await?
        {
            let board = self.board_api.get_board(&board_id).await?;
            boards.set(BoardType::TaxReturn, board);
        } else {
            debug!(tax_season_id = %tax_season_id, "No tax-return board recorded for this season");
        }

        Ok(boards)
    }

    /// Resolve one deliverable: classify it, locate its checklist item
    /// binding, and determine the card it must live on.
    async fn resolve_deliverable(
        &self,
        deliverable_id: Uuid,
        tax_season_id: Uuid,
        boards: &BoardSnapshots,
    ) -> Result<DeliverableContext, DeliverableSyncError> {
        let deliverable = DeliverableWithOwners::find(&self.pool, deliverable_id, tax_season_id)
            .await?
            .ok_or(DeliverableSyncError::NotFound(deliverable_id))?;

        let board_type = BoardType::from_type_name(&deliverable.type_name);

        // Without a board for this season there is no card to target.
        let board = boards
            .get(board_type)
            .ok_or(DeliverableSyncError::BoardMissing(board_type))?;

        let checklist_name = self
            .options
            .for_board_type(board_type)
            .primary_checklist_name
            .clone();

        let checkitem_id = TrelloRelation::find(
            &self.pool,
            deliverable.id,
            RelationType::Deliverable,
            board_type,
            tax_season_id,
        )
        .await?;

        let card_id = self
            .resolve_card_id(&deliverable, board_type, tax_season_id, board)
            .await?;

        Ok(DeliverableContext {
            deliverable,
            board_type,
            checklist_name,
            checkitem_id,
            card_id,
        })
    }

    /// A split_card relation on the entity wins over the client card; with
    /// neither recorded, a new client card is created.
    async fn resolve_card_id(
        &self,
        deliverable: &DeliverableWithOwners,
        board_type: BoardType,
        tax_season_id: Uuid,
        board: &TrelloBoard,
    ) -> Result<String, DeliverableSyncError> {
        if let Some(card_id) = TrelloRelation::find(
            &self.pool,
            deliverable.entity_id,
            RelationType::SplitCard,
            board_type,
            tax_season_id,
        )
        .await?
        {
            return Ok(card_id);
        }

        debug!(
            entity_id = %deliverable.entity_id,
            "No split card for entity, checking for the client card"
        );

        if let Some(card_id) = TrelloRelation::find(
            &self.pool,
            deliverable.client_id,
            RelationType::Client,
            board_type,
            tax_season_id,
        )
        .await?
        {
            return Ok(card_id);
        }

        self.create_client_card(deliverable, board_type, tax_season_id, board)
            .await
    }

    /// Create the client's card from the reference template and record the
    /// client relation.
    async fn create_client_card(
        &self,
        deliverable: &DeliverableWithOwners,
        board_type: BoardType,
        tax_season_id: Uuid,
        board: &TrelloBoard,
    ) -> Result<String, DeliverableSyncError> {
        let category = self.options.for_board_type(board_type);

        let list_id = board
            .lists
            .iter()
            .find(|list| list.name.contains(&category.list_to_create_cards_in))
            .map(|list| list.id.clone())
            .ok_or_else(|| {
                DeliverableSyncError::ListMissing(category.list_to_create_cards_in.clone())
            })?;

        let reference_board = self
            .board_api
            .get_board(&self.options.reference_board_id)
            .await?;
        let templates_list = reference_board
            .lists
            .iter()
            .find(|list| list.name == self.options.templates_list_name)
            .ok_or_else(|| {
                DeliverableSyncError::TemplatesListMissing(self.options.templates_list_name.clone())
            })?;
        let template_cards = self
            .board_api
            .get_cards_for_list(&templates_list.id)
            .await?;
        let template_card = template_cards
            .iter()
            .find(|card| card.name == self.options.template_card_name)
            .ok_or_else(|| {
                DeliverableSyncError::TemplateCardMissing(self.options.template_card_name.clone())
            })?;

        let preparer_name = deliverable
            .preparer_full_name()
            .ok_or(DeliverableSyncError::PreparerMissing)?;
        let label_id = board
            .labels
            .iter()
            .find(|label| label.name == preparer_name)
            .map(|label| label.id.clone())
            .ok_or(DeliverableSyncError::LabelMissing(preparer_name))?;

        let new_card = NewCard {
            desc: client_description_links(&self.controller_url, deliverable.client_id),
            id_card_source: template_card.id.clone(),
            id_labels: label_id,
            id_list: list_id,
            id_members: self
                .options
                .member_for_rank(deliverable.client_rank)
                .map(str::to_string),
            keep_from_source: "checklists".to_string(),
            name: deliverable.client_card_name(),
        };

        let card = self.board_api.create_card(&new_card).await?;

        match TrelloRelation::insert(
            &self.pool,
            deliverable.client_id,
            &card.id,
            tax_season_id,
            RelationType::Client,
            board_type,
        )
        .await
        {
            Ok(_) => {}
            Err(RelationError::Conflict) => {
                // A concurrent resolution for the same client won the
                // insert race; its card is the canonical one.
                if let Some(existing) = TrelloRelation::find(
                    &self.pool,
                    deliverable.client_id,
                    RelationType::Client,
                    board_type,
                    tax_season_id,
                )
                .await?
                {
                    warn!(
                        client_id = %deliverable.client_id,
                        "Client card already recorded, using the existing card"
                    );
                    return Ok(existing);
                }
                return Err(RelationError::Conflict.into());
            }
            Err(e) => return Err(e.into()),
        }

        info!(
            client_id = %deliverable.client_id,
            card_id = %card.id,
            "Created client card"
        );

        Ok(card.id)
    }

    /// Reconcile one resolved deliverable against its card's checklist.
    async fn sync_deliverable(
        &self,
        ctx: &DeliverableContext,
        tax_season_id: Uuid,
    ) -> Result<(), DeliverableSyncError> {
        let checklists = self.board_api.get_checklists(&ctx.card_id).await?;
        let checklist = checklists
            .iter()
            .find(|cl| cl.name == ctx.checklist_name)
            .ok_or_else(|| DeliverableSyncError::ChecklistMissing(ctx.checklist_name.clone()))?;

        let checkitem_name = checkitem_name(&self.controller_url, &ctx.deliverable);

        // The stored id only counts if the item still exists on this
        // checklist; anything else means the deliverable is new here or
        // moved cards.
        if let Some(checkitem_id) = ctx
            .checkitem_id
            .as_deref()
            .filter(|id| checklist.contains_item(id))
        {
            let updated = self
                .board_api
                .update_checklist_item(&ctx.card_id, checkitem_id, &checkitem_name)
                .await?;
            TrelloRelation::update(
                &self.pool,
                ctx.deliverable.id,
                &updated.id,
                tax_season_id,
                RelationType::Deliverable,
                ctx.board_type,
            )
            .await?;
            debug!(
                deliverable_id = %ctx.deliverable.id,
                checkitem_id = %updated.id,
                "Updated checklist item"
            );
            return Ok(());
        }

        let created = self
            .board_api
            .create_checklist_item(&checklist.id, &checkitem_name)
            .await?;

        // A stale relation is archived, never overwritten, so the old
        // binding stays behind as history.
        if ctx.checkitem_id.is_some() {
            TrelloRelation::archive(
                &self.pool,
                ctx.deliverable.id,
                tax_season_id,
                RelationType::Deliverable,
                ctx.board_type,
            )
            .await?;
        }

        match TrelloRelation::insert(
            &self.pool,
            ctx.deliverable.id,
            &created.id,
            tax_season_id,
            RelationType::Deliverable,
            ctx.board_type,
        )
        .await
        {
            Ok(_) => {}
            Err(RelationError::Conflict) => {
                // Another sync recorded the relation first; keep the
                // existing row.
                warn!(
                    deliverable_id = %ctx.deliverable.id,
                    "Relation already recorded for deliverable"
                );
            }
            Err(e) => return Err(e.into()),
        }

        info!(
            deliverable_id = %ctx.deliverable.id,
            checkitem_id = %created.id,
            "Created checklist item"
        );
        Ok(())
    }
}

/// Deep links back into the controller app, shown on new client cards.
fn client_description_links(controller_url: &str, client_id: Uuid) -> String {
    let client_url = format!("{controller_url}/clients/{client_id}");
    let send_returns_url = format!("{controller_url}/clients/{client_id}?sendReturns=true");
    format!(
        "[:newLink:]({client_url}) - View Client\n[:newLink:]({send_returns_url}) - Who to Send Returns to"
    )
}

/// The checklist item text: a deep link to the entity followed by
/// "<entity name> (<deliverable detail>)".
fn checkitem_name(controller_url: &str, deliverable: &DeliverableWithOwners) -> String {
    let entity_url = format!("{controller_url}/entities/{}", deliverable.entity_id);
    format!(
        "[:newlink:]({entity_url}) {} ({})",
        deliverable.entity_name, deliverable.type_detail_name
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn deliverable(type_name: &str) -> DeliverableWithOwners {
        DeliverableWithOwners {
            id: Uuid::new_v4(),
            tax_season_id: Uuid::new_v4(),
            type_name: type_name.to_string(),
            type_detail_name: "Form 1040".to_string(),
            entity_id: Uuid::new_v4(),
            entity_name: "Marsh Holdings LLC".to_string(),
            client_id: Uuid::new_v4(),
            client_first_name: "Ada".to_string(),
            client_last_name: "Marsh".to_string(),
            client_rank: 0,
            preparer_first_name: Some("Pat".to_string()),
            preparer_last_name: Some("Lee".to_string()),
        }
    }

    #[test]
    fn test_board_category_routing() {
        assert_eq!(
            BoardType::from_type_name("Tax Return"),
            BoardType::TaxReturn
        );
        assert_eq!(
            BoardType::from_type_name("Financial Statements"),
            BoardType::FinancialStatements
        );
        // Anything that is not exactly "Tax Return" lands on the
        // financial-statements board.
        assert_eq!(
            BoardType::from_type_name("tax return"),
            BoardType::FinancialStatements
        );
    }

    #[test]
    fn test_checkitem_name_links_entity_and_names_detail() {
        let d = deliverable("Tax Return");
        let name = checkitem_name("https://app.example.com", &d);
        assert_eq!(
            name,
            format!(
                "[:newlink:](https://app.example.com/entities/{}) Marsh Holdings LLC (Form 1040)",
                d.entity_id
            )
        );
    }

    #[test]
    fn test_client_description_links_both_deep_links() {
        let client_id = Uuid::new_v4();
        let desc = client_description_links("https://app.example.com", client_id);
        assert!(desc.contains(&format!(
            "[:newLink:](https://app.example.com/clients/{client_id}) - View Client\n"
        )));
        assert!(desc.ends_with(&format!(
            "[:newLink:](https://app.example.com/clients/{client_id}?sendReturns=true) - Who to Send Returns to"
        )));
    }
}
