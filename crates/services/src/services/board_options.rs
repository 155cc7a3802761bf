//! Board layout configuration.
//!
//! Names the checklists, card-creation lists, reference board, and the
//! rank-to-member table by semantic keys instead of scattering opaque
//! Trello identifiers through the engine. Loaded once at process start;
//! a JSON file at `BOARD_OPTIONS_PATH` overrides the compiled defaults.

use db::models::trello_relation::BoardType;
use serde::{Deserialize, Serialize};

/// Per-board-category layout options.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BoardCategoryOptions {
    /// The checklist deliverable items live on.
    pub primary_checklist_name: String,
    /// New client cards are created in the first list whose name contains
    /// this substring.
    pub list_to_create_cards_in: String,
}

/// One row of the rank-to-member table.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RankMember {
    pub rank: i64,
    pub member_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BoardOptions {
    pub tax_return: BoardCategoryOptions,
    pub financial_statements: BoardCategoryOptions,
    /// Board holding the card templates.
    pub reference_board_id: String,
    /// List on the reference board holding template cards.
    pub templates_list_name: String,
    /// Template card new client cards are copied from.
    pub template_card_name: String,
    /// Rank-to-member assignments for new client cards. The last entry is
    /// the default for unmatched ranks; an empty table assigns no member.
    pub member_ranks: Vec<RankMember>,
}

impl Default for BoardOptions {
    fn default() -> Self {
        Self {
            tax_return: BoardCategoryOptions {
                primary_checklist_name: "Returns to File".to_string(),
                list_to_create_cards_in: "Prep".to_string(),
            },
            financial_statements: BoardCategoryOptions {
                primary_checklist_name: "Statements to Prepare".to_string(),
                list_to_create_cards_in: "Prep".to_string(),
            },
            reference_board_id: String::new(),
            templates_list_name: "Templates".to_string(),
            template_card_name: "Tax Year".to_string(),
            member_ranks: Vec::new(),
        }
    }
}

impl BoardOptions {
    /// The layout options for one board category.
    pub fn for_board_type(&self, board_type: BoardType) -> &BoardCategoryOptions {
        match board_type {
            BoardType::TaxReturn => &self.tax_return,
            BoardType::FinancialStatements => &self.financial_statements,
        }
    }

    /// The member id assigned to a client rank. Unmatched ranks fall back
    /// to the table's last entry; an empty table assigns nobody.
    pub fn member_for_rank(&self, rank: i64) -> Option<&str> {
        self.member_ranks
            .iter()
            .find(|rm| rm.rank == rank)
            .or_else(|| self.member_ranks.last())
            .map(|rm| rm.member_id.as_str())
    }

    /// Load options from the configured file, falling back to defaults
    /// when the file is absent or unreadable.
    pub fn load() -> Self {
        let path = utils::assets::board_options_path();
        match std::fs::read_to_string(&path) {
            Ok(contents) => match serde_json::from_str(&contents) {
                Ok(options) => {
                    tracing::info!(path = %path.display(), "Loaded board options");
                    options
                }
                Err(e) => {
                    tracing::warn!(
                        path = %path.display(),
                        error = %e,
                        "Failed to parse board options, using defaults"
                    );
                    Self::default()
                }
            },
            Err(_) => {
                tracing::debug!(path = %path.display(), "No board options file, using defaults");
                Self::default()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_name_both_primary_checklists() {
        let options = BoardOptions::default();
        assert_eq!(
            options.for_board_type(BoardType::TaxReturn).primary_checklist_name,
            "Returns to File"
        );
        assert_eq!(
            options
                .for_board_type(BoardType::FinancialStatements)
                .primary_checklist_name,
            "Statements to Prepare"
        );
    }

    #[test]
    fn test_member_for_rank_matches_then_falls_back_to_last() {
        let options = BoardOptions {
            member_ranks: vec![
                RankMember {
                    rank: 0,
                    member_id: "member-a".to_string(),
                },
                RankMember {
                    rank: 1,
                    member_id: "member-b".to_string(),
                },
            ],
            ..Default::default()
        };

        assert_eq!(options.member_for_rank(0), Some("member-a"));
        assert_eq!(options.member_for_rank(1), Some("member-b"));
        // Unmatched ranks get the last entry.
        assert_eq!(options.member_for_rank(99), Some("member-b"));
    }

    #[test]
    fn test_member_for_rank_empty_table_assigns_nobody() {
        let options = BoardOptions::default();
        assert_eq!(options.member_for_rank(0), None);
    }

    #[test]
    fn test_partial_file_overrides_merge_with_defaults() {
        let json = r#"{ "reference_board_id": "ref-board-1" }"#;
        let options: BoardOptions = serde_json::from_str(json).unwrap();
        assert_eq!(options.reference_board_id, "ref-board-1");
        assert_eq!(options.template_card_name, "Tax Year");
    }
}
