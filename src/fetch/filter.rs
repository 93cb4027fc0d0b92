//! Batched, cooperative filtering of large member lists.

use crate::error::{Result, RosterError};
use crate::fetch::MemberRecord;
use tokio_util::sync::CancellationToken;

/// Keep members matching `predicate`, `batch_size` at a time.
///
/// Yields to the scheduler between batches and checks `token` before each
/// one. `on_batch` receives the number of members processed so far.
pub async fn filter_in_batches<P, F>(
    members: Vec<MemberRecord>,
    predicate: P,
    batch_size: usize,
    token: &CancellationToken,
    mut on_batch: F,
) -> Result<Vec<MemberRecord>>
where
    P: Fn(&MemberRecord) -> bool,
    F: FnMut(usize),
{
    let batch_size = batch_size.max(1);
    let mut kept = Vec::new();
    let mut processed = 0;
    let mut remaining = members.into_iter().peekable();

    while remaining.peek().is_some() {
        if token.is_cancelled() {
            return Err(RosterError::Cancelled(format!(
                "member filtering stopped after {processed} records"
            )));
        }

        for member in remaining.by_ref().take(batch_size) {
            processed += 1;
            if predicate(&member) {
                kept.push(member);
            }
        }
        on_batch(processed);
        tokio::task::yield_now().await;
    }

    Ok(kept)
}
