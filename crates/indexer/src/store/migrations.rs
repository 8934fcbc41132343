//! Embedded schema migrations, applied once each and tracked in `_migrations`.

use super::StoreError;
use deadpool_postgres::Pool;
use std::collections::HashSet;

const MIGRATIONS: &[(&str, &str)] = &[(
    "0001_init.sql",
    include_str!("../../migrations/0001_init.sql"),
)];

pub async fn run(pool: &Pool) -> Result<(), StoreError> {
    let client = pool.get().await?;

    client
        .execute(
            "CREATE TABLE IF NOT EXISTS _migrations (
                id SERIAL PRIMARY KEY,
                name VARCHAR(255) NOT NULL UNIQUE,
                applied_at TIMESTAMP WITH TIME ZONE DEFAULT NOW()
            )",
            &[],
        )
        .await?;

    let rows = client.query("SELECT name FROM _migrations", &[]).await?;
    let applied: HashSet<String> = rows.iter().map(|row| row.get(0)).collect();
    drop(client);

    for (name, sql) in MIGRATIONS {
        if applied.contains(*name) {
            continue;
        }
        let mut client = pool.get().await?;
        let tx = client.transaction().await?;

        tx.batch_execute(sql)
            .await
            .map_err(|e| StoreError::Migration(format!("failed to run migration {name}: {e}")))?;

        tx.execute("INSERT INTO _migrations (name) VALUES ($1)", &[name])
            .await?;

        tx.commit().await?;

        tracing::info!(migration = name, "applied migration");
    }

    tracing::debug!("migrations up to date");
    Ok(())
}
