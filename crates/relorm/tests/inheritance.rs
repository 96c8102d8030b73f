mod common;

use common::{seed, setup, sorted_text};
use relorm::{Value, ValueMap, params};

#[tokio::test]
async fn test_is_a_upsert_creates_parent_row() {
    let (db, _log) = setup().await;
    seed(&db, "people", vec![params! { "name" => "Zed" }]).await;
    let employees = db.model("Employee").unwrap();

    let ann = employees
        .upsert(
            db.filter([("Person_0.name", "Ann")]),
            params! { "name" => "Ann", "salary" => 10 },
            ValueMap::new(),
        )
        .await
        .unwrap();

    assert_eq!(ann.primary_key(), Value::Int(1));
    assert_eq!(ann.value("person_id"), Value::Int(2));
    assert_eq!(ann.value("name"), Value::from("Ann"));
    assert_eq!(ann.value("salary"), Value::Int(10));

    let people = db.select("SELECT id, name FROM people ORDER BY id").await.unwrap();
    assert_eq!(
        people,
        vec![params! { "id" => 1, "name" => "Zed" }, params! { "id" => 2, "name" => "Ann" }]
    );
    let rows = db.select("SELECT id, person_id, salary FROM employees").await.unwrap();
    assert_eq!(rows, vec![params! { "id" => 1, "person_id" => 2, "salary" => 10 }]);
}

#[tokio::test]
async fn test_is_a_upsert_finds_existing_through_parent_columns() {
    let (db, _log) = setup().await;
    let employees = db.model("Employee").unwrap();
    let filter = || db.filter([("Person_0.name", "Ann")]);

    employees
        .upsert(filter(), params! { "name" => "Ann", "salary" => 10 }, ValueMap::new())
        .await
        .unwrap();
    let ann = employees
        .upsert(filter(), params! { "salary" => 20 }, ValueMap::new())
        .await
        .unwrap();

    assert_eq!(ann.value("salary"), Value::Int(20));
    assert_eq!(employees.count(db.qb()).await.unwrap(), 1);
    assert_eq!(db.model("Person").unwrap().count(db.qb()).await.unwrap(), 1);
}

#[tokio::test]
async fn test_is_a_update_propagates_to_parent() {
    let (db, _log) = setup().await;
    let employees = db.model("Employee").unwrap();

    let ann = employees
        .upsert(db.filter([("Employee.id", 0)]), params! { "name" => "Ann" }, ValueMap::new())
        .await
        .unwrap();
    let renamed = employees
        .upsert(
            db.filter([("Employee.id", ann.primary_key())]),
            params! { "name" => "Anna" },
            ValueMap::new(),
        )
        .await
        .unwrap();

    assert_eq!(renamed.primary_key(), ann.primary_key());
    assert_eq!(renamed.value("person_id"), ann.value("person_id"));
    assert_eq!(renamed.value("name"), Value::from("Anna"));
    let people = db.select("SELECT name FROM people").await.unwrap();
    assert_eq!(people, vec![params! { "name" => "Anna" }]);
}

#[tokio::test]
async fn test_two_level_is_a() {
    let (db, _log) = setup().await;
    let managers = db.model("Manager").unwrap();
    assert_eq!(managers.ancestors(), ["Manager", "Employee", "Person"]);

    let max = managers
        .upsert(
            db.filter([("Manager.id", 0)]),
            params! { "name" => "Max", "salary" => 50, "reports" => 3 },
            ValueMap::new(),
        )
        .await
        .unwrap();

    assert_eq!(max.value("name"), Value::from("Max"));
    assert_eq!(max.value("salary"), Value::Int(50));
    assert_eq!(max.value("reports"), Value::Int(3));
    assert_eq!(max.value("employee_id"), Value::Int(1));

    let employee = db.select("SELECT person_id, salary FROM employees").await.unwrap();
    assert_eq!(employee, vec![params! { "person_id" => 1, "salary" => 50 }]);
    let manager = db.select("SELECT employee_id, reports FROM managers").await.unwrap();
    assert_eq!(manager, vec![params! { "employee_id" => 1, "reports" => 3 }]);

    // Reading through the parent type sees the same person.
    let as_employee = db.model("Employee").unwrap().by_id(&db, 1).await.unwrap().unwrap();
    assert_eq!(as_employee.value("name"), Value::from("Max"));
}

#[tokio::test]
async fn test_has_many_inherited_from_parent_uses_parent_key() {
    let (db, _log) = setup().await;
    seed(&db, "people", vec![params! { "name" => "Zed" }]).await;
    let employees = db.model("Employee").unwrap();
    let ann = employees
        .upsert(db.filter([("Person_0.name", "Ann")]), params! { "name" => "Ann" }, ValueMap::new())
        .await
        .unwrap();
    let person_id = ann.value("person_id");
    assert_ne!(person_id, ann.primary_key());

    seed(
        &db,
        "posts",
        vec![
            params! { "title" => "mine", "author_id" => person_id.clone() },
            params! { "title" => "not mine", "author_id" => ann.primary_key() },
        ],
    )
    .await;

    let mut ann = employees.by_id(&db, ann.primary_key()).await.unwrap().unwrap();
    let posts = ann.get("posts").await.unwrap();
    assert_eq!(sorted_text(posts.as_records().unwrap(), "title"), vec!["mine"]);
}
