use std::cell::Cell;
use std::rc::Rc;
use std::time::Duration;

use crate::contract::{ContractClient, NoteUpdatedEvent};
use crate::error::AppResult;
use crate::provider::Eip1193;
use crate::runtime::Runtime;

/// Widest `eth_getLogs` window requested in one poll. Public RPC endpoints
/// reject larger ranges.
pub const MAX_LOG_RANGE: u64 = 500;

/// Polls the chain for `NoteUpdated` logs and hands each one to a callback.
///
/// The first tick only records the head block, so history is never replayed.
pub struct NoteEventWatcher {
    stopped: Rc<Cell<bool>>,
}

impl NoteEventWatcher {
    pub fn spawn<P, R>(
        client: ContractClient<P>,
        runtime: R,
        interval: Duration,
        on_event: impl Fn(NoteUpdatedEvent) + 'static,
    ) -> Self
    where
        P: Eip1193,
        R: Runtime,
    {
        let stopped = Rc::new(Cell::new(false));
        let flag = Rc::clone(&stopped);
        let timer = runtime.clone();
        runtime.spawn(async move {
            let mut next_block = None;
            tracing::debug!(contract = %client.address(), "watching NoteUpdated");
            while !flag.get() {
                match poll_once(&client, next_block).await {
                    Ok(_) if flag.get() => break,
                    Ok((events, next)) => {
                        next_block = Some(next);
                        for event in events {
                            tracing::debug!(
                                block = ?event.block_number,
                                tx = ?event.tx_hash,
                                "NoteUpdated"
                            );
                            on_event(event);
                        }
                    }
                    Err(err) => tracing::warn!(%err, "NoteUpdated poll failed"),
                }
                timer.sleep(interval).await;
            }
            tracing::debug!("stopped watching NoteUpdated");
        });
        Self { stopped }
    }

    pub fn stop(&self) {
        self.stopped.set(true);
    }
}

/// Returns the new events and the first block of the next window.
///
/// A watcher that fell behind catches up [`MAX_LOG_RANGE`] blocks per call.
async fn poll_once<P: Eip1193>(
    client: &ContractClient<P>,
    next_block: Option<u64>,
) -> AppResult<(Vec<NoteUpdatedEvent>, u64)> {
    let latest = client.block_number().await?;
    match next_block {
        None => Ok((Vec::new(), latest + 1)),
        Some(from) if from > latest => Ok((Vec::new(), from)),
        Some(from) => {
            let to = latest.min(from + MAX_LOG_RANGE - 1);
            let events = client.note_updated_logs(from, to).await?;
            Ok((events, to + 1))
        }
    }
}
