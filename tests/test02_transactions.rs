use sqlite_tx_engine::prelude::*;
use tempfile::TempDir;

async fn engine_with_table(dir: &TempDir) -> Result<Engine, EngineError> {
    let path = dir.path().join("tx.db");
    let engine = Engine::new(path.to_string_lossy().into_owned()).await?;
    engine
        .execute("CREATE TABLE items (id INTEGER PRIMARY KEY, name TEXT NOT NULL)")
        .await?;
    Ok(engine)
}

async fn count_items(engine: &Engine) -> Result<i64, EngineError> {
    let result = engine.query("SELECT COUNT(*) AS cnt FROM items").await?;
    result
        .get(0, "cnt")
        .and_then(ColumnValue::as_int)
        .ok_or_else(|| EngineError::ExecutionError("missing count".into()))
}

#[tokio::test]
async fn failed_operation_leaves_no_trace() -> Result<(), Box<dyn std::error::Error>> {
    let dir = tempfile::tempdir()?;
    let engine = engine_with_table(&dir).await?;
    engine.execute("INSERT INTO items (name) VALUES ('seed')").await?;
    assert_eq!(count_items(&engine).await?, 1);

    let outcome = engine
        .transaction(|tx| {
            tx.execute("INSERT INTO items (name) VALUES ('first')")?;
            tx.execute("INSERT INTO items (missing_column) VALUES ('second')")
        })
        .await;

    match outcome {
        Err(EngineError::StatementFailed { sql, .. }) => {
            assert!(sql.contains("missing_column"), "unexpected sql: {sql}");
        }
        other => panic!("expected StatementFailed, got {other:?}"),
    }
    assert_eq!(count_items(&engine).await?, 1);
    Ok(())
}

#[tokio::test]
async fn successful_operation_commits_every_statement() -> Result<(), Box<dyn std::error::Error>> {
    let dir = tempfile::tempdir()?;
    let engine = engine_with_table(&dir).await?;

    let inserted = engine
        .transaction(|tx| {
            let mut total = 0;
            for name in ["a", "b", "c"] {
                total += tx.execute_dml(&format!("INSERT INTO items (name) VALUES ('{name}')"))?;
            }
            let seen = tx.query("SELECT name FROM items ORDER BY id")?;
            assert_eq!(seen.row_count(), 3);
            Ok(total)
        })
        .await?;

    assert_eq!(inserted, 3);
    assert_eq!(count_items(&engine).await?, 3);
    Ok(())
}

#[tokio::test]
async fn batch_is_all_or_nothing() -> Result<(), Box<dyn std::error::Error>> {
    let dir = tempfile::tempdir()?;
    let engine = engine_with_table(&dir).await?;

    let err = engine
        .execute_batch(
            "INSERT INTO items (name) VALUES ('ok');
             INSERT INTO items (name) VALUES (NULL);",
        )
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::StatementFailed { .. }));
    assert_eq!(count_items(&engine).await?, 0);
    Ok(())
}

#[tokio::test]
async fn invalid_sql_is_a_failure_value() -> Result<(), Box<dyn std::error::Error>> {
    let dir = tempfile::tempdir()?;
    let engine = engine_with_table(&dir).await?;

    let err = engine.query("SELECT * FROM no_such_table").await.unwrap_err();
    assert!(matches!(err, EngineError::StatementFailed { .. }));

    let err = engine.execute("INSERT INTO").await.unwrap_err();
    assert!(matches!(err, EngineError::StatementFailed { .. }));

    let status = engine.status();
    assert_eq!(status.idle, status.connections, "connection leaked after failure");
    assert_eq!(count_items(&engine).await?, 0);
    Ok(())
}

#[tokio::test]
async fn execute_reports_success_for_row_returning_statements() -> Result<(), Box<dyn std::error::Error>> {
    let dir = tempfile::tempdir()?;
    let engine = engine_with_table(&dir).await?;

    assert!(engine.execute("INSERT INTO items (name) VALUES ('x')").await?);
    assert!(engine.execute("SELECT name FROM items").await?);
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn panicking_operation_releases_connection() -> Result<(), Box<dyn std::error::Error>> {
    let dir = tempfile::tempdir()?;
    let engine = engine_with_table(&dir).await?;

    let outcome = engine
        .transaction(|tx| -> Result<(), EngineError> {
            tx.execute("INSERT INTO items (name) VALUES ('doomed')")?;
            panic!("operation blew up");
        })
        .await;
    assert!(matches!(outcome, Err(EngineError::ExecutionError(_))));

    // The half-finished transaction must not survive on a reused connection.
    assert_eq!(count_items(&engine).await?, 0);
    engine.execute("INSERT INTO items (name) VALUES ('after')").await?;
    assert_eq!(count_items(&engine).await?, 1);
    Ok(())
}

#[tokio::test]
async fn deferred_constraint_failure_at_commit_rolls_back() -> Result<(), Box<dyn std::error::Error>> {
    let dir = tempfile::tempdir()?;
    let engine = engine_with_table(&dir).await?;
    engine
        .execute_batch(
            "CREATE TABLE tags (
                 item_id INTEGER NOT NULL REFERENCES items (id) DEFERRABLE INITIALLY DEFERRED,
                 tag TEXT
             );",
        )
        .await?;

    let err = engine
        .transaction(|tx| {
            tx.execute("INSERT INTO items (name) VALUES ('kept only if tagged')")?;
            tx.execute("INSERT INTO tags (item_id, tag) VALUES (999, 'orphan')")
        })
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::CommitFailed(_)), "got {err:?}");
    assert_eq!(count_items(&engine).await?, 0);

    let status = engine.status();
    assert_eq!(status.idle, status.connections);
    Ok(())
}

#[tokio::test]
async fn transaction_control_statements_are_rejected() -> Result<(), Box<dyn std::error::Error>> {
    let dir = tempfile::tempdir()?;
    let engine = engine_with_table(&dir).await?;

    for sql in ["COMMIT", "BEGIN", "ROLLBACK", "SAVEPOINT sp"] {
        let err = engine.execute(sql).await.unwrap_err();
        assert!(
            matches!(err, EngineError::TransactionControl { .. }),
            "{sql}: got {err:?}"
        );
    }

    let err = engine
        .execute_batch(
            "INSERT INTO items (name) VALUES ('before');
             COMMIT;
             INSERT INTO items (name) VALUES ('after');",
        )
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::TransactionControl { .. }));
    assert_eq!(count_items(&engine).await?, 0);

    assert!(engine.execute("INSERT INTO items (name) VALUES ('fine')").await?);
    assert_eq!(count_items(&engine).await?, 1);
    Ok(())
}
