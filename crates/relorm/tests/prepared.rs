mod common;

use common::{seed, setup, setup_with};
use relorm::{Condition, DbConfig, OrmError, Value, params};

#[tokio::test]
async fn test_prepared_select_binds_placeholders() {
    let (db, log) = setup().await;
    seed(&db, "tags", vec![params! { "name" => "go" }, params! { "name" => "rust" }]).await;
    log.clear();

    let rows = db
        .prepare("tag_by_name")
        .from("tags")
        .filter([("name", "rust")])
        .select("id, name")
        .await
        .unwrap();
    assert_eq!(rows, vec![params! { "id" => 2, "name" => "rust" }]);
    assert_eq!(
        log.take(),
        vec![
            "PREPARE tag_by_name_select1".to_string(),
            "SELECT id, name FROM tags WHERE (1=1) AND \"name\"=?1".to_string(),
        ]
    );
}

#[tokio::test]
async fn test_prepared_statement_is_reused() {
    let (db, log) = setup().await;
    seed(&db, "tags", vec![params! { "name" => "go" }, params! { "name" => "rust" }]).await;
    log.clear();

    for name in ["go", "rust", "zig"] {
        db.prepare("tag_by_name")
            .from("tags")
            .filter([("name", name)])
            .select("*")
            .await
            .unwrap();
    }
    let prepares = log.take().into_iter().filter(|sql| sql.starts_with("PREPARE")).count();
    assert_eq!(prepares, 1);

    // Same name, different SQL: prepared again.
    db.prepare("tag_by_name")
        .from("tags")
        .filter([("id", 1)])
        .select("*")
        .await
        .unwrap();
    let statements = log.take();
    assert_eq!(statements[0], "PREPARE tag_by_name_select1");
}

#[tokio::test]
async fn test_prepared_without_cache_prepares_every_time() {
    let (db, log) = setup_with(DbConfig::default().no_statement_cache()).await;
    for _ in 0..2 {
        db.prepare("all_tags").from("tags").select("*").await.unwrap();
    }
    let prepares = log.take().into_iter().filter(|sql| sql.starts_with("PREPARE")).count();
    assert_eq!(prepares, 2);
}

#[tokio::test]
async fn test_prepared_update_and_insert() {
    let (db, _log) = setup().await;
    seed(&db, "tags", vec![params! { "name" => "a" }, params! { "name" => "b" }]).await;

    let updated = db
        .prepare("rename_tag")
        .from("tags")
        .filter([("id", 1)])
        .update(&params! { "name" => "it's" })
        .await
        .unwrap();
    assert_eq!(updated, 1);

    let id = db
        .prepare("add_tag")
        .from("tags")
        .insert(&params! { "name" => "c" })
        .await
        .unwrap();
    assert_eq!(id, Value::Int(3));

    let rows = db.select("SELECT name FROM tags ORDER BY id").await.unwrap();
    assert_eq!(
        rows,
        vec![params! { "name" => "it's" }, params! { "name" => "b" }, params! { "name" => "c" }]
    );
}

#[tokio::test]
async fn test_prepared_rejects_transforms() {
    let (db, log) = setup().await;
    let err = db
        .prepare("lowered")
        .from("tags")
        .filter([("name", Condition::op_with("=", "RUST", "LOWER"))])
        .select("*")
        .await
        .unwrap_err();
    assert!(matches!(err, OrmError::Configuration(_)));
    assert!(log.take().is_empty());

    // Inline builders accept them.
    let rows = db
        .qb()
        .from("tags")
        .filter([("name", Condition::op_with("=", "RUST", "LOWER"))])
        .select("*")
        .await
        .unwrap();
    assert!(rows.is_empty());
}

#[tokio::test]
async fn test_prepared_expressions_stay_inline() {
    let (db, log) = setup().await;
    seed(&db, "tags", vec![params! { "name" => "a" }]).await;
    log.clear();

    let rows = db
        .prepare("by_expr")
        .from("tags")
        .filter([("id", Condition::eq(Value::Expr("1".into()))), ("name", Condition::eq("a"))])
        .select("name")
        .await
        .unwrap();
    assert_eq!(rows.len(), 1);
    let statements = log.take();
    assert_eq!(statements[1], "SELECT name FROM tags WHERE (1=1) AND \"id\"=1 AND \"name\"=?1");
}

#[tokio::test]
async fn test_model_reads_through_prepared_builder() {
    let (db, _log) = setup().await;
    seed(&db, "tags", vec![params! { "name" => "go" }, params! { "name" => "rust" }]).await;
    let tags = db.model("Tag").unwrap();

    let rust = tags
        .find(db.prepare("find_tag").filter([("Tag.name", "rust")]))
        .await
        .unwrap();
    assert_eq!(rust.primary_key(), Value::Int(2));

    let all = tags.select(db.prepare("all_tags"), None).await.unwrap();
    assert_eq!(all.len(), 2);
}
