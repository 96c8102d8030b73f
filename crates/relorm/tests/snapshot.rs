use relorm::store::snapshot::{pull_tables, push_tables};
use relorm::{SqliteStore, Store, Value, params};

#[tokio::test]
async fn test_pull_then_push_copies_tables() {
    let source = SqliteStore::in_memory().await.unwrap();
    source
        .batch(
            "CREATE TABLE tags (id INTEGER PRIMARY KEY, name TEXT);
             INSERT INTO tags (id, name) VALUES (1, 'rust'), (2, NULL);
             CREATE TABLE empty (id INTEGER);",
        )
        .await
        .unwrap();

    let tables = pull_tables(&source).await.unwrap();
    assert_eq!(tables.keys().collect::<Vec<_>>(), ["empty", "tags"]);
    assert_eq!(
        tables["tags"],
        vec![params! { "id" => 1, "name" => "rust" }, params! { "id" => 2, "name" => Value::Null }]
    );

    let target = SqliteStore::in_memory().await.unwrap();
    let created = push_tables(&target, &tables).await.unwrap();
    // A table without rows has no known columns.
    assert_eq!(created, vec!["tags".to_string()]);

    // Copied columns are text.
    let copied = target.select("SELECT id, name FROM tags ORDER BY id").await.unwrap();
    assert_eq!(
        copied,
        vec![params! { "id" => "1", "name" => "rust" }, params! { "id" => "2", "name" => Value::Null }]
    );
}

#[tokio::test]
async fn test_push_skips_existing_tables() {
    let target = SqliteStore::in_memory().await.unwrap();
    target
        .batch("CREATE TABLE tags (id INTEGER PRIMARY KEY, name TEXT)")
        .await
        .unwrap();

    let mut tables = relorm::store::snapshot::Tables::new();
    tables.insert("tags".to_string(), vec![params! { "name" => "dup" }]);
    let created = push_tables(&target, &tables).await.unwrap();

    assert!(created.is_empty());
    assert!(target.select("SELECT * FROM tags").await.unwrap().is_empty());
}
