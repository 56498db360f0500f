//! The transactional execution boundary.

use ormscope_core::{Connection, Cx, Error, Outcome, TransactionOps, Value};

/// Execute one statement inside its own transaction.
///
/// begin → execute → commit. When the statement fails, is cancelled or panics the
/// transaction is rolled back and the statement's outcome is returned; a failed rollback
/// is only logged so it never hides the original cause.
#[tracing::instrument(level = "debug", skip(cx, conn, args), fields(args = args.len()))]
pub async fn exec_tx<C: Connection>(
    cx: &Cx,
    conn: &C,
    sql: &str,
    args: &[Value],
) -> Outcome<u64, Error> {
    if let Some(reason) = cx.cancel_reason() {
        return Outcome::Cancelled(reason);
    }

    tracing::info!("Beginning transaction");
    let tx = match conn.begin(cx).await {
        Outcome::Ok(tx) => tx,
        Outcome::Err(e) => return Outcome::Err(e),
        Outcome::Cancelled(r) => return Outcome::Cancelled(r),
        Outcome::Panicked(p) => return Outcome::Panicked(p),
    };

    let executed = tx.execute(cx, sql, args).await;
    let affected = match executed {
        Outcome::Ok(n) => n,
        Outcome::Err(e) => {
            tracing::info!(error = %e, "Statement failed, rolling back");
            if let Outcome::Err(rollback_err) = tx.rollback(cx).await {
                tracing::warn!(error = %rollback_err, "Rollback failed after statement error");
            }
            return Outcome::Err(e);
        }
        Outcome::Cancelled(r) => {
            if let Outcome::Err(rollback_err) = tx.rollback(cx).await {
                tracing::warn!(error = %rollback_err, "Rollback failed after cancellation");
            }
            return Outcome::Cancelled(r);
        }
        Outcome::Panicked(p) => {
            tracing::warn!("Statement panicked, rolling back");
            if let Outcome::Err(rollback_err) = tx.rollback(cx).await {
                tracing::warn!(error = %rollback_err, "Rollback failed after panic");
            }
            return Outcome::Panicked(p);
        }
    };

    tracing::info!(affected, "Committing transaction");
    match tx.commit(cx).await {
        Outcome::Ok(()) => Outcome::Ok(affected),
        Outcome::Err(e) => Outcome::Err(e),
        Outcome::Cancelled(r) => Outcome::Cancelled(r),
        Outcome::Panicked(p) => Outcome::Panicked(p),
    }
}
