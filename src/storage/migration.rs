//! Rewrites entries saved before task lists existed.
//!
//! The legacy shape carried one free-text plan per side of the standup
//! (`yesterdayPlan` / `todayPlan`) plus a single completion flag with its
//! reason and ETA. Each non-empty plan becomes a one-task list.

use serde_json::{Map, Value, json};

use crate::types::DEFAULT_TEAM_ID;

const LEGACY_FIELDS: [&str; 5] = [
    "yesterdayPlan",
    "todayPlan",
    "completed",
    "incompletionReason",
    "newEta",
];

pub fn is_legacy(entry: &Value) -> bool {
    entry.get("yesterdayPlan").is_some_and(Value::is_string)
}

/// Returns the migrated collection, or `None` when nothing needed migrating.
pub fn migrate_entries(entries: &[Value]) -> Option<Vec<Value>> {
    if !entries.iter().any(is_legacy) {
        return None;
    }
    Some(
        entries
            .iter()
            .map(|entry| match entry.as_object() {
                Some(obj) if is_legacy(entry) => Value::Object(migrate_entry(obj)),
                _ => entry.clone(),
            })
            .collect(),
    )
}

fn migrate_entry(legacy: &Map<String, Value>) -> Map<String, Value> {
    let id = legacy.get("id").and_then(Value::as_str).unwrap_or_default();
    let text_of = |field: &str| {
        legacy
            .get(field)
            .and_then(Value::as_str)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
    };

    let mut migrated = legacy.clone();
    for field in LEGACY_FIELDS {
        migrated.remove(field);
    }

    let has_team = legacy
        .get("teamId")
        .and_then(Value::as_str)
        .is_some_and(|t| !t.is_empty());
    if !has_team {
        migrated.insert("teamId".into(), json!(DEFAULT_TEAM_ID));
    }

    let yesterday = match text_of("yesterdayPlan") {
        Some(text) => {
            let mut task = Map::new();
            task.insert("id".into(), json!(format!("{id}-yesterday-1")));
            task.insert("text".into(), json!(text));
            task.insert(
                "completed".into(),
                json!(legacy.get("completed").and_then(Value::as_bool).unwrap_or(false)),
            );
            for field in ["incompletionReason", "newEta"] {
                if let Some(value) = legacy.get(field).filter(|v| !v.is_null()) {
                    task.insert(field.into(), value.clone());
                }
            }
            vec![Value::Object(task)]
        }
        None => Vec::new(),
    };
    let today = match text_of("todayPlan") {
        Some(text) => vec![json!({
            "id": format!("{id}-today-1"),
            "text": text,
            "completed": false,
        })],
        None => Vec::new(),
    };

    migrated.insert("yesterdayTasks".into(), Value::Array(yesterday));
    migrated.insert("todayTasks".into(), Value::Array(today));
    migrated
}
