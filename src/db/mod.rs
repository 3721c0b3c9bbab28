pub mod migrations;
pub mod queries;

use anyhow::Context;
use rusqlite::{Connection, Transaction, TransactionBehavior};

use crate::errors::AppError;

pub fn init_db(path: &str) -> anyhow::Result<Connection> {
    let conn = Connection::open(path).context("failed to open database")?;

    conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA foreign_keys=ON; PRAGMA busy_timeout=5000;")
        .context("failed to set database pragmas")?;

    migrations::run_migrations(&conn)?;

    Ok(conn)
}

/// Runs `op` inside an immediate write transaction and commits it. A
/// `StaleWrite` rolls the transaction back and re-runs `op` from scratch, at
/// most `max_retries` more times.
pub fn in_write_tx<T>(
    conn: &mut Connection,
    max_retries: u32,
    mut op: impl FnMut(&Transaction<'_>) -> Result<T, AppError>,
) -> Result<T, AppError> {
    let mut attempt = 0;
    loop {
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        match op(&tx) {
            Ok(value) => {
                tx.commit()?;
                return Ok(value);
            }
            Err(AppError::StaleWrite(id)) if attempt < max_retries => {
                attempt += 1;
                tracing::warn!(booking_id = %id, attempt, "stale write, retrying");
            }
            Err(e) => return Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_in_write_tx_retries_stale_writes() {
        let mut conn = init_db(":memory:").unwrap();
        let mut calls = 0;
        let result = in_write_tx(&mut conn, 2, |_| {
            calls += 1;
            if calls < 3 {
                Err(AppError::StaleWrite("b1".to_string()))
            } else {
                Ok(calls)
            }
        });
        assert_eq!(result.unwrap(), 3);
    }

    #[test]
    fn test_in_write_tx_gives_up_after_max_retries() {
        let mut conn = init_db(":memory:").unwrap();
        let mut calls = 0;
        let result: Result<(), AppError> = in_write_tx(&mut conn, 1, |_| {
            calls += 1;
            Err(AppError::StaleWrite("b1".to_string()))
        });
        assert!(matches!(result, Err(AppError::StaleWrite(_))));
        assert_eq!(calls, 2);
    }

    #[test]
    fn test_in_write_tx_rolls_back_on_error() {
        let mut conn = init_db(":memory:").unwrap();
        let result: Result<(), AppError> = in_write_tx(&mut conn, 0, |tx| {
            tx.execute(
                "INSERT INTO services (resource_ref, service_ref, price, currency) VALUES ('r', 's', 1, 'USD')",
                [],
            )?;
            Err(AppError::Validation("nope".to_string()))
        });
        assert!(result.is_err());

        let count: i64 = conn
            .query_row("SELECT COUNT(*) FROM services", [], |row| row.get(0))
            .unwrap();
        assert_eq!(count, 0);
    }
}
