use serde::Serialize;
use sqlx::{FromRow, SqlitePool};
use uuid::Uuid;

/// The enriched view of one deliverable the sync engine works from:
/// the deliverable joined with its owning entity, client, and the
/// client's assigned preparer for the season (when one is recorded).
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct DeliverableWithOwners {
    pub id: Uuid,
    pub tax_season_id: Uuid,
    pub type_name: String,
    pub type_detail_name: String,
    pub entity_id: Uuid,
    pub entity_name: String,
    pub client_id: Uuid,
    pub client_first_name: String,
    pub client_last_name: String,
    pub client_rank: i64,
    pub preparer_first_name: Option<String>,
    pub preparer_last_name: Option<String>,
}

impl DeliverableWithOwners {
    /// Load one deliverable with its owners, scoped to the tax season.
    ///
    /// Returns `None` when no deliverable matches the id within the season
    /// (the deliverable may exist under a different season).
    pub async fn find(
        pool: &SqlitePool,
        deliverable_id: Uuid,
        tax_season_id: Uuid,
    ) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, Self>(
            r#"
            SELECT
                d.id,
                d.tax_season_id,
                d.type_name,
                d.type_detail_name,
                e.id   AS entity_id,
                e.name AS entity_name,
                c.id   AS client_id,
                c.first_name AS client_first_name,
                c.last_name  AS client_last_name,
                c.rank       AS client_rank,
                p.first_name AS preparer_first_name,
                p.last_name  AS preparer_last_name
            FROM deliverables d
            INNER JOIN entities e ON e.id = d.entity_id
            INNER JOIN clients c ON c.id = e.client_id
            LEFT JOIN preparer_assignments p
                ON p.client_id = c.id AND p.tax_season_id = d.tax_season_id
            WHERE d.id = $1
              AND d.tax_season_id = $2
            "#,
        )
        .bind(deliverable_id)
        .bind(tax_season_id)
        .fetch_optional(pool)
        .await
    }

    /// The client's display name, "First Last".
    pub fn client_full_name(&self) -> String {
        format!("{} {}", self.client_first_name, self.client_last_name)
    }

    /// The client's card title, "Last, First".
    pub fn client_card_name(&self) -> String {
        format!("{}, {}", self.client_last_name, self.client_first_name)
    }

    /// The assigned preparer's display name, "First Last", when one is
    /// recorded for this season.
    pub fn preparer_full_name(&self) -> Option<String> {
        match (&self.preparer_first_name, &self.preparer_last_name) {
            (Some(first), Some(last)) => Some(format!("{first} {last}")),
            _ => None,
        }
    }
}
