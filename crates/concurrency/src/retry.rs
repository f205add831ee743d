//! Caller-side retry loop
//!
//! The protocol never retries on its own. `run_with_retry` is the loop a
//! business transaction would otherwise write by hand: run the body between
//! `begin()` and `commit()`, and start over only when the store rejected the
//! commit.

use deferkv_core::{Result, Store};

use crate::client::TransactionClient;

/// Run `body` as one transaction, retrying commit rejections
///
/// Each attempt is `begin → body → commit`. A rejected commit is retried up to
/// `max_retries` times with the same transaction id. Any other error (from the
/// body or the store) is returned immediately; a transaction still in flight is
/// aborted first.
///
/// # Errors
///
/// The body's error, or `TransactionAborted` once the retries are used up.
pub fn run_with_retry<S, T, F>(
    client: &mut TransactionClient<S>,
    max_retries: u32,
    mut body: F,
) -> Result<T>
where
    S: Store,
    F: FnMut(&mut TransactionClient<S>) -> Result<T>,
{
    let mut retries = 0;
    loop {
        client.begin()?;

        let value = match body(client) {
            Ok(value) => value,
            Err(e) => {
                abandon(client);
                return Err(e);
            }
        };

        match client.commit() {
            Ok(()) => return Ok(value),
            Err(e) if e.is_retryable() && retries < max_retries => {
                retries += 1;
                tracing::debug!(txn_id = %client.id(), retries, "Retrying rejected transaction");
            }
            Err(e) => {
                abandon(client);
                return Err(e);
            }
        }
    }
}

fn abandon<S: Store>(client: &mut TransactionClient<S>) {
    if !client.status().can_abort() {
        return;
    }
    if let Err(e) = client.abort() {
        tracing::warn!(txn_id = %client.id(), error = %e, "Abort after failed attempt failed");
    }
}
