use anyhow::Context;
use rusqlite::Connection;

/// Schema migrations, applied in order and recorded by name.
const MIGRATIONS: &[(&str, &str)] = &[
    (
        "001_bookings.sql",
        "CREATE TABLE bookings (
            id TEXT PRIMARY KEY,
            code TEXT NOT NULL UNIQUE,
            resource_ref TEXT NOT NULL,
            service_ref TEXT NOT NULL,
            requester_ref TEXT NOT NULL,
            date TEXT NOT NULL,
            start_time TEXT,
            end_time TEXT,
            status TEXT NOT NULL,
            decline_reason TEXT NOT NULL DEFAULT '',
            cancel_reason TEXT NOT NULL DEFAULT '',
            last_actor TEXT,
            payment_status TEXT NOT NULL DEFAULT 'pending',
            payment_method TEXT,
            payment_amount INTEGER,
            payment_currency TEXT,
            payment_order_id TEXT UNIQUE,
            payment_transaction_id TEXT,
            paid_at TEXT,
            version INTEGER NOT NULL DEFAULT 1,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL,
            status_changed_at TEXT NOT NULL
        );
        CREATE INDEX idx_bookings_resource_date ON bookings (resource_ref, date, status);
        CREATE INDEX idx_bookings_requester_date ON bookings (requester_ref, date, status);",
    ),
    (
        "002_services.sql",
        "CREATE TABLE services (
            resource_ref TEXT NOT NULL,
            service_ref TEXT NOT NULL,
            price INTEGER NOT NULL,
            currency TEXT NOT NULL,
            is_free INTEGER NOT NULL DEFAULT 0,
            advance_booking_window_days INTEGER NOT NULL DEFAULT 0,
            PRIMARY KEY (resource_ref, service_ref)
        );",
    ),
    (
        "003_booking_events.sql",
        "CREATE TABLE booking_events (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            booking_id TEXT NOT NULL,
            booking_code TEXT NOT NULL,
            old_status TEXT,
            new_status TEXT NOT NULL,
            actor TEXT NOT NULL,
            reason TEXT,
            created_at TEXT NOT NULL DEFAULT (datetime('now'))
        );
        CREATE INDEX idx_booking_events_booking ON booking_events (booking_id);",
    ),
];

pub fn run_migrations(conn: &Connection) -> anyhow::Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS _migrations (
            name TEXT PRIMARY KEY,
            applied_at TEXT NOT NULL DEFAULT (datetime('now'))
        );",
    )
    .context("failed to create migrations table")?;

    for (name, sql) in MIGRATIONS {
        let already_applied: bool = conn
            .query_row(
                "SELECT COUNT(*) > 0 FROM _migrations WHERE name = ?1",
                [name],
                |row| row.get(0),
            )
            .context("failed to check migration status")?;

        if already_applied {
            continue;
        }

        conn.execute_batch(sql)
            .with_context(|| format!("failed to apply migration: {name}"))?;

        conn.execute("INSERT INTO _migrations (name) VALUES (?1)", [name])
            .with_context(|| format!("failed to record migration: {name}"))?;

        tracing::info!("applied migration: {name}");
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_migrations_are_idempotent() {
        let conn = Connection::open_in_memory().unwrap();
        run_migrations(&conn).unwrap();
        run_migrations(&conn).unwrap();

        let applied: i64 = conn
            .query_row("SELECT COUNT(*) FROM _migrations", [], |row| row.get(0))
            .unwrap();
        assert_eq!(applied, MIGRATIONS.len() as i64);
    }
}
