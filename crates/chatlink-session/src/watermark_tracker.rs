use std::sync::Arc;

use chatlink_core::{SessionState, Subscription};
use chatlink_directline::ChatTransport;

/// Records the id of every identified activity on `transport` as the session
/// watermark. Last write wins; activities without an id are skipped.
pub fn track_watermark(state: &Arc<SessionState>, transport: &dyn ChatTransport) -> Subscription {
    let state = Arc::clone(state);
    transport.activities().subscribe(move |activity| {
        if let Some(id) = activity.activity_id() {
            state.record_watermark(id);
        }
    })
}
