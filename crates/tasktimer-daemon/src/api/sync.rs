use serde_json::Value;
use std::sync::Arc;

use super::Result;
use crate::timer::TimerStore;

/// Run a sync cycle immediately and report its outcome.
pub async fn now(store: &Arc<TimerStore>, _params: Option<Value>) -> Result<Value> {
    let report = store.sync_once().await;
    Ok(serde_json::to_value(report)?)
}
