//! Timer API methods

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::sync::Arc;

use super::{ApiError, Result, parse_params};
use crate::timer::TimerStore;
use tasktimer_core::{TimerRecord, UrgencyLevel, format_remaining, timer_urgency};

#[derive(Debug, Deserialize)]
struct StartParams {
    task_id: String,
    owner_id: String,
    duration_seconds: u64,
}

#[derive(Debug, Deserialize)]
struct TaskParams {
    task_id: String,
}

#[derive(Debug, Deserialize)]
struct OwnerParams {
    owner_id: String,
}

#[derive(Debug, Deserialize)]
struct ClearParams {
    task_id: Option<String>,
    owner_id: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct ListParams {
    owner_id: Option<String>,
}

/// A timer plus its presentation fields.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct TimerView<'a> {
    #[serde(flatten)]
    timer: &'a TimerRecord,
    formatted: String,
    urgency: UrgencyLevel,
}

impl<'a> TimerView<'a> {
    fn new(timer: &'a TimerRecord) -> Self {
        Self {
            timer,
            formatted: format_remaining(timer),
            urgency: timer_urgency(timer),
        }
    }
}

fn to_value(timer: Option<TimerRecord>) -> Result<Value> {
    Ok(serde_json::to_value(timer)?)
}

/// Start (or restart) a timer
pub async fn start(store: &Arc<TimerStore>, params: Option<Value>) -> Result<Value> {
    let params: StartParams = parse_params(params)?;

    let timer = store
        .start_timer(&params.task_id, &params.owner_id, params.duration_seconds)
        .await;

    Ok(serde_json::to_value(timer)?)
}

pub async fn pause(store: &Arc<TimerStore>, params: Option<Value>) -> Result<Value> {
    let params: TaskParams = parse_params(params)?;
    to_value(store.pause_timer(&params.task_id).await)
}

pub async fn resume(store: &Arc<TimerStore>, params: Option<Value>) -> Result<Value> {
    let params: TaskParams = parse_params(params)?;
    to_value(store.resume_timer(&params.task_id).await)
}

pub async fn complete(store: &Arc<TimerStore>, params: Option<Value>) -> Result<Value> {
    let params: TaskParams = parse_params(params)?;
    to_value(store.complete_timer(&params.task_id).await)
}

pub async fn expire(store: &Arc<TimerStore>, params: Option<Value>) -> Result<Value> {
    let params: TaskParams = parse_params(params)?;
    to_value(store.expire_timer(&params.task_id).await)
}

/// Remove one expired timer, or every expired timer of an owner. A
/// `task_id` always narrows the call to that task.
pub async fn clear(store: &Arc<TimerStore>, params: Option<Value>) -> Result<Value> {
    let params: ClearParams = parse_params(params)?;

    let cleared = match (params.task_id, params.owner_id) {
        (Some(task_id), _) => usize::from(store.clear_timer(&task_id).await.is_some()),
        (None, Some(owner_id)) => store.clear_expired(&owner_id).await,
        (None, None) => {
            return Err(ApiError::InvalidParams(
                "task_id or owner_id is required".to_string(),
            ));
        }
    };
    Ok(json!({ "cleared": cleared }))
}

/// Get one timer with its formatted remaining time and urgency
pub async fn get(store: &Arc<TimerStore>, params: Option<Value>) -> Result<Value> {
    let params: TaskParams = parse_params(params)?;

    match store.get_timer(&params.task_id).await {
        Some(timer) => Ok(serde_json::to_value(TimerView::new(&timer))?),
        None => Ok(Value::Null),
    }
}

pub async fn remaining(store: &Arc<TimerStore>, params: Option<Value>) -> Result<Value> {
    let params: TaskParams = parse_params(params)?;
    let remaining = store.get_remaining_time(&params.task_id).await;

    Ok(json!({
        "taskId": params.task_id,
        "remainingTime": remaining
    }))
}

pub async fn active(store: &Arc<TimerStore>, params: Option<Value>) -> Result<Value> {
    let params: OwnerParams = parse_params(params)?;
    Ok(serde_json::to_value(
        store.get_active_timers(&params.owner_id).await,
    )?)
}

pub async fn expired(store: &Arc<TimerStore>, params: Option<Value>) -> Result<Value> {
    let params: OwnerParams = parse_params(params)?;
    Ok(serde_json::to_value(
        store.get_expired_timers(&params.owner_id).await,
    )?)
}

/// List all timers, optionally restricted to one owner
pub async fn list(store: &Arc<TimerStore>, params: Option<Value>) -> Result<Value> {
    let params: ListParams = match params {
        Some(params) => parse_params(Some(params))?,
        None => ListParams::default(),
    };

    let timers = match params.owner_id {
        Some(owner_id) => store.get_owner_timers(&owner_id).await,
        None => store.snapshot().await,
    };

    Ok(serde_json::to_value(timers)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{T0, clock, store as new_store};

    #[tokio::test]
    async fn test_start_and_get() {
        let clock = clock();
        let store = Arc::new(new_store(&clock));

        let started = start(
            &store,
            Some(json!({"task_id": "t1", "owner_id": "u1", "duration_seconds": 100})),
        )
        .await
        .unwrap();
        assert_eq!(started["deadline"], T0 + 100_000);

        clock.advance_secs(40);
        let timer = get(&store, Some(json!({"task_id": "t1"}))).await.unwrap();
        assert_eq!(timer["taskId"], "t1");
        assert_eq!(timer["remainingTime"], 60);
        assert_eq!(timer["formatted"], "1m 0s");
        assert_eq!(timer["urgency"], "medium");
    }

    #[tokio::test]
    async fn test_unknown_task_returns_null() {
        let clock = clock();
        let store = Arc::new(new_store(&clock));

        let params = Some(json!({"task_id": "missing"}));
        assert_eq!(get(&store, params.clone()).await.unwrap(), Value::Null);
        assert_eq!(pause(&store, params.clone()).await.unwrap(), Value::Null);
        assert_eq!(
            remaining(&store, params).await.unwrap(),
            json!({"taskId": "missing", "remainingTime": 0})
        );
    }

    #[tokio::test]
    async fn test_clear_by_task_and_owner() {
        let clock = clock();
        let store = Arc::new(new_store(&clock));
        for task_id in ["t1", "t2", "t3"] {
            store.start_timer(task_id, "u1", 10).await;
            store.expire_timer(task_id).await;
        }

        let one = clear(&store, Some(json!({"task_id": "t1"}))).await.unwrap();
        assert_eq!(one["cleared"], 1);

        let rest = clear(&store, Some(json!({"owner_id": "u1"}))).await.unwrap();
        assert_eq!(rest["cleared"], 2);

        assert!(matches!(
            clear(&store, Some(json!({}))).await,
            Err(ApiError::InvalidParams(_))
        ));
    }

    #[tokio::test]
    async fn test_clear_with_task_and_owner_removes_only_task() {
        let clock = clock();
        let store = Arc::new(new_store(&clock));
        for task_id in ["t1", "t2", "t3"] {
            store.start_timer(task_id, "u1", 10).await;
            store.expire_timer(task_id).await;
        }

        let cleared = clear(&store, Some(json!({"task_id": "t1", "owner_id": "u1"})))
            .await
            .unwrap();
        assert_eq!(cleared["cleared"], 1);
        assert!(store.get_timer("t1").await.is_none());
        assert_eq!(store.get_expired_timers("u1").await.len(), 2);
    }

    #[tokio::test]
    async fn test_list_filters_by_owner() {
        let clock = clock();
        let store = Arc::new(new_store(&clock));
        store.start_timer("t1", "u1", 10).await;
        store.start_timer("t2", "u2", 10).await;

        let all = list(&store, None).await.unwrap();
        assert_eq!(all.as_array().unwrap().len(), 2);

        let owned = list(&store, Some(json!({"owner_id": "u2"}))).await.unwrap();
        assert_eq!(owned[0]["taskId"], "t2");
    }
}
