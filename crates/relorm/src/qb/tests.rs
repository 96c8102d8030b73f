use super::*;
use crate::params;

fn pg() -> QueryBuilder {
    QueryBuilder::new(Dialect::Postgres)
}

#[test]
fn test_select_statement() {
    let qb = pg()
        .from("test_table t1")
        .join("another_table t2", "t1.id=t2.t1_id")
        .left_join("third_table t3", "t2.id=t3.t2_id")
        .where_sql("test=success")
        .having("1=1")
        .group_by("test_col")
        .order_by("test_col DESC")
        .limit(10);
    assert_eq!(
        qb.select_statement("test_col"),
        "SELECT test_col FROM test_table t1 JOIN another_table t2 ON (t1.id=t2.t1_id) \
         LEFT JOIN third_table t3 ON (t2.id=t3.t2_id) WHERE (test=success) GROUP BY test_col \
         HAVING (1=1) ORDER BY test_col DESC LIMIT 10"
    );
}

#[test]
fn test_display_selects_star() {
    let qb = pg().from("people");
    assert_eq!(qb.to_string(), "SELECT * FROM people WHERE (1=1)");
}

#[test]
fn test_enforce_wraps_where() {
    let qb = pg()
        .from("people")
        .enforce("tenant_id=5")
        .where_sql("name='a' OR name='b'");
    assert_eq!(qb.where_clause(), "(tenant_id=5) AND (name='a' OR name='b')");
}

#[test]
fn test_filter_terms() {
    let qb = pg().from("people").filter([
        ("name", Condition::eq("alice")),
        ("deleted_at", Condition::is_null()),
        ("age", Condition::op(">", 30)),
        ("Person.id", Condition::in_list([1, 2])),
    ]);
    assert_eq!(
        qb.where_clause(),
        "(1=1) AND \"name\"='alice' AND \"deleted_at\" IS NULL AND \"age\" > '30' \
         AND \"Person\".\"id\" IN ('1','2')"
    );
}

#[test]
fn test_filter_replaces_repeated_key_in_place() {
    let qb = pg()
        .from("people")
        .filter(params! { "a" => 1, "b" => 2 })
        .filter(params! { "a" => 3 });
    assert_eq!(qb.where_clause(), "(1=1) AND \"a\"='3' AND \"b\"='2'");
}

#[test]
fn test_empty_in_list_and_null_operand() {
    let qb = pg().from("t").filter([
        ("id", Condition::in_list(Vec::<Value>::new())),
        ("parent_id", Condition::op("IS NOT", Value::Null)),
    ]);
    assert_eq!(
        qb.where_clause(),
        "(1=1) AND \"id\" IN (NULL) AND \"parent_id\" IS NOT NULL"
    );
}

#[test]
fn test_transform_wraps_operand() {
    let qb = pg()
        .from("t")
        .filter_by("email", Condition::op_with("=", "A@B.C", "LOWER"));
    assert_eq!(qb.where_clause(), "(1=1) AND \"email\" = LOWER('A@B.C')");
}

#[test]
fn test_injection_stays_quoted() {
    let qb = pg().from("t").filter(params! { "id" => "1 OR 1=1" });
    let sql = qb.select_statement("*");
    assert!(!sql.contains("id=1 OR 1=1"));
    assert!(sql.contains("\"id\"='1 OR 1=1'"));
}

#[test]
fn test_fail_matches_nothing() {
    let qb = pg().from("t").filter(params! { "a" => 1 }).fail();
    assert_eq!(qb.where_clause(), "(1=1) AND 1='0'");
}

#[test]
fn test_mysql_quotes_with_backticks() {
    let qb = QueryBuilder::new(Dialect::MySql)
        .from("t")
        .filter(params! { "name" => "x" });
    assert_eq!(qb.where_clause(), "(1=1) AND `name`='x'");
}

#[test]
fn test_add_columns() {
    let qb = pg()
        .from("people p")
        .add_columns([("full_name", "p.first || p.last")])
        .add_column("\"Person_0\".*");
    assert_eq!(
        qb.select_statement("*"),
        "SELECT *, p.first || p.last as full_name,\"Person_0\".* FROM people p WHERE (1=1)"
    );
}

#[test]
fn test_nest_as() {
    let qb = pg().from("people").group_by("city");
    let nested = qb.nest_as("city", "dt_countable");
    assert_eq!(
        nested.select_statement("COUNT(*) as count"),
        "SELECT COUNT(*) as count FROM (SELECT city FROM people WHERE (1=1) GROUP BY city) \
         as dt_countable WHERE (1=1)"
    );
}

#[test]
fn test_update_statement() {
    let qb = pg().from("\"people\"").filter(params! { "id" => 7 });
    let sql = qb.update_statement(&params! { "name" => "O'Brien", "age" => Value::Null });
    assert_eq!(
        sql,
        "UPDATE \"people\" SET \"name\"='O''Brien',\"age\"=NULL WHERE (1=1) AND \"id\"='7'"
    );
}

#[test]
fn test_insert_statement() {
    let qb = pg().from("\"people\"");
    assert_eq!(
        qb.insert_statement(&params! { "name" => "a", "meta" => params! { "k" => "v" } }),
        "INSERT INTO \"people\" (\"name\",\"meta\") VALUES ('a','{\"k\":\"v\"}')"
    );
    assert_eq!(
        qb.insert_statement(&ValueMap::new()),
        "INSERT INTO \"people\" DEFAULT VALUES"
    );
}

#[test]
fn test_delete_statement() {
    let qb = pg()
        .from("\"people\"")
        .filter([("id", Condition::in_list([4, 5]))]);
    assert_eq!(
        qb.delete_statement(),
        "DELETE FROM \"people\" WHERE (1=1) AND \"id\" IN ('4','5')"
    );
}

#[test]
fn test_prepared_select_numbers_placeholders() {
    let qb = pg()
        .prepared("people")
        .from("people")
        .filter(params! { "name" => "alice", "city" => "paris" })
        .filter([("age", Condition::in_list([1, 2]))]);
    let (sql, params) = qb.prepared_select_statement("*").unwrap();
    assert_eq!(
        sql,
        "SELECT * FROM people WHERE (1=1) AND \"name\"=$1 AND \"city\"=$2 AND \"age\" IN ($3,$4)"
    );
    assert_eq!(
        params,
        vec![
            Value::from("alice"),
            Value::from("paris"),
            Value::Int(1),
            Value::Int(2)
        ]
    );
}

#[test]
fn test_prepared_sqlite_placeholders_and_raw_expr() {
    let qb = QueryBuilder::new(Dialect::Sqlite)
        .prepared("t")
        .from("t")
        .filter(params! { "a" => 1, "b" => Value::expr("CURRENT_DATE") });
    let (sql, params) = qb.prepared_select_statement("*").unwrap();
    assert_eq!(sql, "SELECT * FROM t WHERE (1=1) AND \"a\"=?1 AND \"b\"=CURRENT_DATE");
    assert_eq!(params, vec![Value::Int(1)]);
}

#[test]
fn test_prepared_rejects_transform() {
    let qb = pg()
        .prepared("t")
        .from("t")
        .filter_by("email", Condition::op_with("=", "x", "LOWER"));
    let err = qb.prepared_select_statement("*").unwrap_err();
    assert!(matches!(err, OrmError::Configuration(_)));
}

#[test]
fn test_format_value() {
    assert_eq!(format_value(&Value::Null), "NULL");
    assert_eq!(
        format_value(&Value::Map(params! { "test" => "success" })),
        "'{\"test\":\"success\"}'"
    );
    assert_eq!(
        format_value(&Value::expr("SELECT * FROM test")),
        "SELECT * FROM test"
    );
    assert_eq!(format_value(&Value::from("Any old string")), "'Any old string'");
    assert_eq!(format_value(&Value::from("NULL")), "'NULL'");
    assert_eq!(format_value(&Value::Bool(true)), "'1'");
    assert_eq!(format_value(&Value::from("a/b")), "'a/b'");
    assert_eq!(
        format_value(&Value::from(vec![1, 2])),
        "'[1,2]'"
    );
}

#[test]
fn test_format_value_escapes_json_literals() {
    assert_eq!(
        format_value(&Value::from(vec!["a/b", "é"])),
        r#"'["a\/b","\u00e9"]'"#
    );
    assert_eq!(
        format_value(&Value::Map(params! { "url" => "http://x/y", "who" => "O'Neil" })),
        r#"'{"url":"http:\/\/x\/y","who":"O''Neil"}'"#
    );
}

#[test]
fn test_execution_without_storage_is_an_error() {
    let qb = pg().from("t");
    assert!(matches!(qb.db(), Err(OrmError::Configuration(_))));
}
