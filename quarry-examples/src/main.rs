use quarry_db::prelude::*;
use quarry_db::testing::RecordingConnection;
use quarry_db::{Config, Error};

#[tokio::main]
async fn main() -> Result<(), Error> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    build_examples();

    match Config::from_env() {
        Ok(config) => live_examples(config).await,
        Err(_) => {
            println!("set DATABASE_URL to run the live examples");
            Ok(())
        }
    }
}

fn build_examples() {
    let conn = RecordingConnection::new();

    // Complex query example
    let query = conn
        .table("users")
        .select("name")
        .select("email")
        .where_eq("active", true)
        .where_op("age", ">", 18)
        .order_by_desc("created_at")
        .limit(10)
        .to_sql();

    println!("Query: {}", query);
    // SELECT name, email FROM users
    // WHERE active = $1 AND age > $2
    // ORDER BY created_at DESC LIMIT 10

    // Raw expressions skip binding entirely
    let query = conn
        .table("users")
        .select_raw(conn.raw("count(*) as total"))
        .where_raw(conn.raw("deleted_at IS NULL"))
        .to_sql();

    println!("Query: {}", query);
    // SELECT count(*) as total FROM users WHERE deleted_at IS NULL
}

async fn live_examples(config: Config) -> Result<(), Error> {
    let db = Database::connect_with(config).await?;
    let conn = db.connection().await?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS notes (id SERIAL PRIMARY KEY, body TEXT NOT NULL)",
        &[],
    )
    .await?;

    // Dry-run a unit of work and show what it would have sent.
    let log = conn
        .pretend(|conn| {
            Box::pin(async move {
                conn.table("notes")
                    .insert(vec![("body", Value::from("hello from quarry"))])
                    .await?;
                conn.table("notes").where_eq("id", 1).delete().await?;
                Ok(())
            })
        })
        .await?;

    for entry in &log {
        println!(
            "would run: {} {}",
            entry.query,
            serde_json::to_string(&entry.bindings).unwrap_or_default()
        );
    }

    // The same work for real, inside a transaction.
    let inserted = conn
        .transaction(|conn| {
            Box::pin(async move {
                println!("transaction level: {}", conn.transaction_level());
                conn.table("notes")
                    .insert(vec![("body", Value::from("hello from quarry"))])
                    .await?;
                conn.table("notes").count().await
            })
        })
        .await?;

    println!("notes after insert: {}", inserted);

    if let Some(row) = conn
        .table("notes")
        .select("body")
        .order_by_desc("id")
        .first()
        .await?
    {
        println!("latest note: {:?}", row.get("body"));
    }

    Ok(())
}
