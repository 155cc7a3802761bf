//! Integration tests for the Trello relation store.
//!
//! These exercise the uniqueness invariant and the archive-on-replace
//! lifecycle against a real (temporary) SQLite database.

use std::str::FromStr;

use db::models::trello_relation::{BoardType, RelationError, RelationType, TrelloRelation};
use sqlx::{
    SqlitePool,
    sqlite::{SqliteConnectOptions, SqliteJournalMode},
};
use tempfile::TempDir;
use uuid::Uuid;

/// Create a temporary SQLite pool with migrations applied.
async fn create_test_pool() -> (SqlitePool, TempDir) {
    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    let db_path = temp_dir.path().join("test.db");

    let options =
        SqliteConnectOptions::from_str(&format!("sqlite://{}", db_path.to_string_lossy()))
            .expect("Invalid database URL")
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal);

    let pool = SqlitePool::connect_with(options)
        .await
        .expect("Failed to create pool");

    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .expect("Failed to run migrations");

    (pool, temp_dir)
}

#[tokio::test]
async fn find_returns_none_when_absent() {
    let (pool, _tmp) = create_test_pool().await;

    let found = TrelloRelation::find(
        &pool,
        Uuid::new_v4(),
        RelationType::Deliverable,
        BoardType::TaxReturn,
        Uuid::new_v4(),
    )
    .await
    .unwrap();

    assert!(found.is_none());
}

#[tokio::test]
async fn insert_then_find_round_trips() {
    let (pool, _tmp) = create_test_pool().await;
    let controller_id = Uuid::new_v4();
    let season_id = Uuid::new_v4();

    let relation = TrelloRelation::insert(
        &pool,
        controller_id,
        "checkitem-1",
        season_id,
        RelationType::Deliverable,
        BoardType::TaxReturn,
    )
    .await
    .unwrap();

    assert_eq!(relation.controller_id, controller_id);
    assert_eq!(relation.trello_id, "checkitem-1");
    assert!(relation.archived.is_none());

    let found = TrelloRelation::find(
        &pool,
        controller_id,
        RelationType::Deliverable,
        BoardType::TaxReturn,
        season_id,
    )
    .await
    .unwrap();

    assert_eq!(found.as_deref(), Some("checkitem-1"));
}

#[tokio::test]
async fn duplicate_unarchived_insert_conflicts() {
    let (pool, _tmp) = create_test_pool().await;
    let controller_id = Uuid::new_v4();
    let season_id = Uuid::new_v4();

    TrelloRelation::insert(
        &pool,
        controller_id,
        "card-1",
        season_id,
        RelationType::Client,
        BoardType::TaxReturn,
    )
    .await
    .unwrap();

    let err = TrelloRelation::insert(
        &pool,
        controller_id,
        "card-2",
        season_id,
        RelationType::Client,
        BoardType::TaxReturn,
    )
    .await
    .unwrap_err();

    assert!(matches!(err, RelationError::Conflict));
}

#[tokio::test]
async fn same_tuple_different_board_type_does_not_conflict() {
    let (pool, _tmp) = create_test_pool().await;
    let controller_id = Uuid::new_v4();
    let season_id = Uuid::new_v4();

    TrelloRelation::insert(
        &pool,
        controller_id,
        "card-tr",
        season_id,
        RelationType::Client,
        BoardType::TaxReturn,
    )
    .await
    .unwrap();

    TrelloRelation::insert(
        &pool,
        controller_id,
        "card-fs",
        season_id,
        RelationType::Client,
        BoardType::FinancialStatements,
    )
    .await
    .unwrap();
}

#[tokio::test]
async fn archive_excludes_row_from_find_and_allows_reinsert() {
    let (pool, _tmp) = create_test_pool().await;
    let controller_id = Uuid::new_v4();
    let season_id = Uuid::new_v4();

    TrelloRelation::insert(
        &pool,
        controller_id,
        "checkitem-old",
        season_id,
        RelationType::Deliverable,
        BoardType::TaxReturn,
    )
    .await
    .unwrap();

    let archived = TrelloRelation::archive(
        &pool,
        controller_id,
        season_id,
        RelationType::Deliverable,
        BoardType::TaxReturn,
    )
    .await
    .unwrap();
    assert_eq!(archived, 1);

    let found = TrelloRelation::find(
        &pool,
        controller_id,
        RelationType::Deliverable,
        BoardType::TaxReturn,
        season_id,
    )
    .await
    .unwrap();
    assert!(found.is_none());

    // The tuple is free again; history stays behind as an archived row.
    TrelloRelation::insert(
        &pool,
        controller_id,
        "checkitem-new",
        season_id,
        RelationType::Deliverable,
        BoardType::TaxReturn,
    )
    .await
    .unwrap();

    let (total,): (i64,) = sqlx::query_as(
        "SELECT COUNT(*) FROM trello_relations WHERE controller_id = $1 AND tax_season_id = $2",
    )
    .bind(controller_id)
    .bind(season_id)
    .fetch_one(&pool)
    .await
    .unwrap();
    assert_eq!(total, 2);
}

#[tokio::test]
async fn update_rewrites_trello_id_in_place() {
    let (pool, _tmp) = create_test_pool().await;
    let controller_id = Uuid::new_v4();
    let season_id = Uuid::new_v4();

    TrelloRelation::insert(
        &pool,
        controller_id,
        "checkitem-1",
        season_id,
        RelationType::Deliverable,
        BoardType::TaxReturn,
    )
    .await
    .unwrap();

    TrelloRelation::update(
        &pool,
        controller_id,
        "checkitem-2",
        season_id,
        RelationType::Deliverable,
        BoardType::TaxReturn,
    )
    .await
    .unwrap();

    let found = TrelloRelation::find(
        &pool,
        controller_id,
        RelationType::Deliverable,
        BoardType::TaxReturn,
        season_id,
    )
    .await
    .unwrap();
    assert_eq!(found.as_deref(), Some("checkitem-2"));
}

#[tokio::test]
async fn update_of_missing_relation_is_not_found() {
    let (pool, _tmp) = create_test_pool().await;

    let err = TrelloRelation::update(
        &pool,
        Uuid::new_v4(),
        "checkitem-1",
        Uuid::new_v4(),
        RelationType::Deliverable,
        BoardType::TaxReturn,
    )
    .await
    .unwrap_err();

    assert!(matches!(err, RelationError::NotFound));
}
