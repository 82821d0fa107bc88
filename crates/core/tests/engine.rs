use pretty_assertions::assert_eq;
use relix_core::{Config, Engine, Outcome};
use relix_expr::{NodeType, QueryNode};
use relix_primitives::ColumnType;
use relix_schema::{Column, Schema};

fn create_table(name: &str, columns: Vec<Column>) -> QueryNode {
    QueryNode::leaf(NodeType::CreateTable, serde_json::to_string(&Schema::new(name, columns)).unwrap())
}

#[test]
fn schema_changes_and_rows_survive_reopening_the_engine() {
    let dir = tempfile::tempdir().unwrap();
    let config = Config::new(dir.path());

    {
        let mut engine = Engine::open(config.clone()).unwrap();
        engine
            .execute(&create_table("accounts", vec![Column::new("id", ColumnType::Integer).primary_key()]))
            .unwrap();
        engine
            .execute(&QueryNode::leaf(NodeType::Insert, r#"{"table":"accounts","values":{"id":7}}"#))
            .unwrap();
    }

    let mut engine = Engine::open(config).unwrap();
    assert_eq!(engine.list_tables(), vec!["accounts".to_string()]);

    let select = QueryNode::leaf(NodeType::Table, "accounts a");
    let Outcome::Rows(rows) = engine.execute(&select).unwrap() else {
        panic!("expected a row set");
    };
    assert_eq!(rows.rows.len(), 1);
    assert_eq!(rows.rows[0]["a.id"], relix_sats::Value::Integer(7));
}

#[test]
fn an_implicit_transaction_commits_exactly_once_per_statement() {
    let dir = tempfile::tempdir().unwrap();
    let mut engine = Engine::open(Config::new(dir.path())).unwrap();
    engine
        .execute(&create_table("t", vec![Column::new("id", ColumnType::Integer).primary_key()]))
        .unwrap();

    for i in 0..3 {
        let insert = QueryNode::leaf(NodeType::Insert, format!(r#"{{"table":"t","values":{{"id":{i}}}}}"#));
        assert!(matches!(engine.execute(&insert).unwrap(), Outcome::RowsAffected(1)));
    }

    let select = QueryNode::leaf(NodeType::Table, "t t");
    let Outcome::Rows(rows) = engine.execute(&select).unwrap() else {
        panic!("expected a row set");
    };
    assert_eq!(rows.rows.len(), 3);
}

#[test]
fn drop_table_without_cascade_is_rejected_while_a_dependent_exists() {
    let dir = tempfile::tempdir().unwrap();
    let mut engine = Engine::open(Config::new(dir.path())).unwrap();
    engine
        .execute(&create_table("parent", vec![Column::new("id", ColumnType::Integer).primary_key()]))
        .unwrap();
    let child_schema = Schema::new(
        "child",
        vec![
            Column::new("id", ColumnType::Integer).primary_key(),
            Column::new("parent_id", ColumnType::Integer).references(relix_schema::ForeignKey {
                ref_table: "parent".into(),
                ref_column: "id".into(),
                on_delete: relix_primitives::ForeignKeyAction::Restrict,
                on_update: relix_primitives::ForeignKeyAction::NoAction,
            }),
        ],
    );
    engine.execute(&QueryNode::leaf(NodeType::CreateTable, serde_json::to_string(&child_schema).unwrap())).unwrap();

    let drop = QueryNode::leaf(NodeType::DropTable, r#"{"table":"parent","cascade":false}"#);
    assert!(engine.execute(&drop).is_err());
    assert!(engine.list_tables().contains(&"parent".to_string()));

    let drop_cascade = QueryNode::leaf(NodeType::DropTable, r#"{"table":"parent","cascade":true}"#);
    engine.execute(&drop_cascade).unwrap();
    assert!(!engine.list_tables().contains(&"parent".to_string()));
    assert!(!engine.list_tables().contains(&"child".to_string()));
}
