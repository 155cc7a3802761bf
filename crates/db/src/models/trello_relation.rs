use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, SqlitePool};
use thiserror::Error;
use uuid::Uuid;

/// Which kind of internal object a relation binds to a Trello object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(rename_all = "snake_case")]
pub enum RelationType {
    Board,
    Client,
    SplitCard,
    Deliverable,
}

/// Which board category a relation belongs to for a tax season.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(rename_all = "snake_case")]
pub enum BoardType {
    TaxReturn,
    FinancialStatements,
}

impl BoardType {
    /// Classify a deliverable by its type display name. Only "Tax Return"
    /// deliverables route to the tax-return board; everything else lands on
    /// the financial-statements board.
    pub fn from_type_name(type_name: &str) -> Self {
        if type_name == "Tax Return" {
            BoardType::TaxReturn
        } else {
            BoardType::FinancialStatements
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            BoardType::TaxReturn => "tax_return",
            BoardType::FinancialStatements => "financial_statements",
        }
    }
}

impl std::fmt::Display for BoardType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A durable binding between one internal object and one Trello object for
/// one tax season. Replaced rows are archived, never deleted.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct TrelloRelation {
    pub id: Uuid,
    pub controller_id: Uuid,
    pub trello_id: String,
    pub tax_season_id: Uuid,
    #[sqlx(rename = "type")]
    #[serde(rename = "type")]
    pub relation_type: RelationType,
    pub board_type: BoardType,
    pub archived: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Error)]
pub enum RelationError {
    #[error("an unarchived relation already exists for this object")]
    Conflict,
    #[error("relation not found")]
    NotFound,
    #[error(transparent)]
    Database(#[from] sqlx::Error),
}

impl TrelloRelation {
    /// Find the Trello id bound to an internal object, if any.
    ///
    /// Archived relations are never returned.
    pub async fn find(
        pool: &SqlitePool,
        controller_id: Uuid,
        relation_type: RelationType,
        board_type: BoardType,
        tax_season_id: Uuid,
    ) -> Result<Option<String>, RelationError> {
        let trello_id = sqlx::query_scalar::<_, String>(
            r#"
            SELECT trello_id
            FROM trello_relations
            WHERE controller_id = $1
              AND tax_season_id = $2
              AND type = $3
              AND board_type = $4
              AND archived IS NULL
            "#,
        )
        .bind(controller_id)
        .bind(tax_season_id)
        .bind(relation_type)
        .bind(board_type)
        .fetch_optional(pool)
        .await?;

        Ok(trello_id)
    }

    /// Create a new unarchived relation.
    ///
    /// Fails with [`RelationError::Conflict`] if an unarchived relation
    /// already exists for the same (controller, season, type, board) tuple.
    /// This is the concurrency control point: two concurrent syncs of the
    /// same object cannot both record the canonical binding.
    pub async fn insert(
        pool: &SqlitePool,
        controller_id: Uuid,
        trello_id: &str,
        tax_season_id: Uuid,
        relation_type: RelationType,
        board_type: BoardType,
    ) -> Result<TrelloRelation, RelationError> {
        let id = Uuid::new_v4();
        let relation = sqlx::query_as::<_, TrelloRelation>(
            r#"
            INSERT INTO trello_relations (id, controller_id, trello_id, tax_season_id, type, board_type)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING
                id,
                controller_id,
                trello_id,
                tax_season_id,
                type,
                board_type,
                archived,
                created_at,
                updated_at
            "#,
        )
        .bind(id)
        .bind(controller_id)
        .bind(trello_id)
        .bind(tax_season_id)
        .bind(relation_type)
        .bind(board_type)
        .fetch_one(pool)
        .await
        .map_err(|e| {
            if let sqlx::Error::Database(ref db_err) = e
                && db_err.is_unique_violation()
            {
                return RelationError::Conflict;
            }
            RelationError::from(e)
        })?;

        Ok(relation)
    }

    /// Rewrite the Trello id of the matching unarchived relation.
    ///
    /// Used when the logical binding persists but the Trello object was
    /// recreated (e.g. a checklist item deleted and remade).
    pub async fn update(
        pool: &SqlitePool,
        controller_id: Uuid,
        new_trello_id: &str,
        tax_season_id: Uuid,
        relation_type: RelationType,
        board_type: BoardType,
    ) -> Result<(), RelationError> {
        let result = sqlx::query(
            r#"
            UPDATE trello_relations
            SET trello_id = $2,
                updated_at = datetime('now', 'subsec')
            WHERE controller_id = $1
              AND tax_season_id = $3
              AND type = $4
              AND board_type = $5
              AND archived IS NULL
            "#,
        )
        .bind(controller_id)
        .bind(new_trello_id)
        .bind(tax_season_id)
        .bind(relation_type)
        .bind(board_type)
        .execute(pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(RelationError::NotFound);
        }

        Ok(())
    }

    /// Archive the matching unarchived relation, preserving it as history.
    ///
    /// Returns the number of rows archived (0 when none matched). Callers
    /// archive before inserting a replacement for the same tuple.
    pub async fn archive(
        pool: &SqlitePool,
        controller_id: Uuid,
        tax_season_id: Uuid,
        relation_type: RelationType,
        board_type: BoardType,
    ) -> Result<u64, RelationError> {
        let result = sqlx::query(
            r#"
            UPDATE trello_relations
            SET archived = datetime('now', 'subsec'),
                updated_at = datetime('now', 'subsec')
            WHERE controller_id = $1
              AND tax_season_id = $2
              AND type = $3
              AND board_type = $4
              AND archived IS NULL
            "#,
        )
        .bind(controller_id)
        .bind(tax_season_id)
        .bind(relation_type)
        .bind(board_type)
        .execute(pool)
        .await?;

        Ok(result.rows_affected())
    }
}
