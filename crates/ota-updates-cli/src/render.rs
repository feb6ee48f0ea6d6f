// crates/ota-updates-cli/src/render.rs
// ============================================================================
// Module: Structured Field Rendering
// Description: JSON views of parsed structured fields and stored updates.
// Purpose: Give operators a readable dump of header values and store rows.
// Dependencies: base64, ota-structured-fields, ota-updates-core, serde_json
// ============================================================================

//! ## Overview
//! Items without parameters render as their bare value; items with
//! parameters render as `{"value": .., "params": {..}}`. Tokens and byte
//! sequences are tagged so they stay distinguishable from strings.

use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use ota_structured_fields::BareItem;
use ota_structured_fields::Item;
use ota_structured_fields::ListEntry;
use ota_structured_fields::Parameters;
use ota_structured_fields::StructuredField;
use ota_updates_core::LaunchedUpdate;
use ota_updates_core::Update;
use serde_json::Map;
use serde_json::Value;
use serde_json::json;

/// Renders a parsed field as JSON.
pub fn field_to_json(field: &StructuredField) -> Value {
    match field {
        StructuredField::Item(item) => item_to_json(item),
        StructuredField::List(list) => Value::Array(list.iter().map(entry_to_json).collect()),
        StructuredField::Dictionary(dictionary) => Value::Object(
            dictionary.iter().map(|(key, entry)| (key.to_string(), entry_to_json(entry))).collect(),
        ),
    }
}

/// Renders a list or dictionary member.
fn entry_to_json(entry: &ListEntry) -> Value {
    match entry {
        ListEntry::Item(item) => item_to_json(item),
        ListEntry::InnerList(inner) => {
            let items = Value::Array(inner.items.iter().map(item_to_json).collect());
            if inner.params.is_empty() {
                items
            } else {
                json!({ "items": items, "params": params_to_json(&inner.params) })
            }
        }
    }
}

/// Renders an item.
fn item_to_json(item: &Item) -> Value {
    let value = bare_to_json(&item.bare_item);
    if item.params.is_empty() {
        value
    } else {
        json!({ "value": value, "params": params_to_json(&item.params) })
    }
}

/// Renders parameters in order.
fn params_to_json(params: &Parameters) -> Value {
    Value::Object(params.iter().map(|(key, value)| (key.to_string(), bare_to_json(value))).collect())
}

/// Renders a bare item.
fn bare_to_json(bare_item: &BareItem) -> Value {
    match bare_item {
        BareItem::Integer(value) => json!(value),
        BareItem::Decimal(value) => json!(value.as_f64()),
        BareItem::String(value) => json!(value),
        BareItem::Token(value) => json!({ "token": value }),
        BareItem::ByteSequence(bytes) => json!({ "bytes": BASE64.encode(bytes) }),
        BareItem::Boolean(value) => json!(value),
    }
}

/// Summarizes a stored update.
pub fn update_summary(update: &Update) -> Value {
    let mut summary = Map::new();
    summary.insert("id".to_string(), json!(update.id.to_string()));
    summary.insert("status".to_string(), serde_json::to_value(update.status).unwrap_or(Value::Null));
    summary.insert("commit_time".to_string(), json!(update.commit_time.as_unix_millis()));
    summary.insert("runtime_version".to_string(), json!(update.runtime_version.as_str()));
    summary.insert("launchable".to_string(), json!(update.is_launchable()));
    summary.insert("successful_launch_count".to_string(), json!(update.successful_launch_count));
    summary.insert("failed_launch_count".to_string(), json!(update.failed_launch_count));
    summary.insert(
        "launch_asset".to_string(),
        update.launch_asset().map_or(Value::Null, |asset| json!(asset.filename())),
    );
    Value::Object(summary)
}

/// Summarizes a launch decision.
pub fn launch_summary(launched: &LaunchedUpdate) -> Value {
    json!({
        "update": update_summary(&launched.update),
        "launch_asset_path": launched.launch_asset_path.display().to_string(),
        "asset_paths": launched
            .asset_paths
            .iter()
            .map(|(filename, path)| (filename.clone(), json!(path.display().to_string())))
            .collect::<Map<String, Value>>(),
    })
}
