//! Structured list extraction.
//!
//! The model reports the *entire* current list on every function call, so an
//! [`ExtractedListState`] always replaces the previous one; it is never merged.
//! Arguments arrive loosely typed and every field has a default.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::utils::unix_seconds;

/// Item name used when the model omits one.
pub const DEFAULT_ITEM_NAME: &str = "unknown";

/// Quantity used when the model omits one.
pub const DEFAULT_QUANTITY: f64 = 1.0;

/// Category used when the model omits one.
pub const DEFAULT_CATEGORY: &str = "general";

/// Confidence used when the model omits one.
pub const DEFAULT_CONFIDENCE: f64 = 0.8;

/// One item of the extracted list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtractedItem {
    pub name: String,
    /// Never negative
    pub quantity: f64,
    pub unit: Option<String>,
    pub category: String,
}

impl ExtractedItem {
    pub fn new(name: impl Into<String>, quantity: f64) -> Self {
        Self {
            name: name.into(),
            quantity: quantity.max(0.0),
            unit: None,
            category: DEFAULT_CATEGORY.to_string(),
        }
    }

    pub fn with_category(mut self, category: impl Into<String>) -> Self {
        self.category = category.into();
        self
    }

    pub fn with_unit(mut self, unit: impl Into<String>) -> Self {
        self.unit = Some(unit.into());
        self
    }

    /// Build an item from one element of the `items` argument.
    ///
    /// Non-object elements and wrongly typed fields fall back to the defaults.
    pub fn from_value(value: &Value) -> Self {
        let name = value
            .get("name")
            .and_then(Value::as_str)
            .unwrap_or(DEFAULT_ITEM_NAME);
        let quantity = value
            .get("quantity")
            .and_then(Value::as_f64)
            .unwrap_or(DEFAULT_QUANTITY);
        let category = value
            .get("category")
            .and_then(Value::as_str)
            .unwrap_or(DEFAULT_CATEGORY);

        Self {
            name: name.to_string(),
            quantity: quantity.max(0.0),
            unit: value.get("unit").and_then(Value::as_str).map(str::to_string),
            category: category.to_string(),
        }
    }
}

/// The complete current list as last reported.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtractedListState {
    pub items: Vec<ExtractedItem>,
    /// In `[0, 1]`
    pub confidence: f64,
    /// Unix seconds
    pub last_update: f64,
}

impl ExtractedListState {
    /// Create a state stamped with the current time.
    pub fn new(items: Vec<ExtractedItem>, confidence: f64) -> Self {
        Self {
            items,
            confidence: clamp_confidence(confidence),
            last_update: unix_seconds(),
        }
    }

    /// Build a state from the arguments object of an extraction call.
    pub fn from_arguments(arguments: &Value) -> Self {
        let items = arguments
            .get("items")
            .and_then(Value::as_array)
            .map(|items| items.iter().map(ExtractedItem::from_value).collect())
            .unwrap_or_default();
        let confidence = arguments
            .get("confidence")
            .and_then(Value::as_f64)
            .unwrap_or(DEFAULT_CONFIDENCE);

        Self::new(items, confidence)
    }

    /// Fixed single-item list used to exercise clients without an upstream.
    pub fn sample() -> Self {
        Self::new(vec![ExtractedItem::new("milk", 1.0).with_category("dairy")], 0.95)
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

fn clamp_confidence(confidence: f64) -> f64 {
    if confidence.is_nan() {
        DEFAULT_CONFIDENCE
    } else {
        confidence.clamp(0.0, 1.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_single_item_defaults() {
        let state = ExtractedListState::from_arguments(&json!({
            "items": [{"name": "milk", "quantity": 1}]
        }));

        assert_eq!(state.items, vec![ExtractedItem::new("milk", 1.0)]);
        assert_eq!(state.items[0].category, "general");
        assert_eq!(state.confidence, DEFAULT_CONFIDENCE);
        assert!(state.last_update > 0.0);
    }

    #[test]
    fn test_missing_fields_use_defaults() {
        let state = ExtractedListState::from_arguments(&json!({"items": [{}]}));
        let item = &state.items[0];

        assert_eq!(item.name, DEFAULT_ITEM_NAME);
        assert_eq!(item.quantity, DEFAULT_QUANTITY);
        assert_eq!(item.unit, None);
        assert_eq!(item.category, DEFAULT_CATEGORY);
    }

    #[test]
    fn test_all_fields_preserved() {
        let state = ExtractedListState::from_arguments(&json!({
            "items": [{"name": "flour", "quantity": 2.5, "unit": "kg", "category": "baking"}],
            "confidence": 0.9
        }));

        assert_eq!(
            state.items,
            vec![ExtractedItem::new("flour", 2.5).with_unit("kg").with_category("baking")]
        );
        assert_eq!(state.confidence, 0.9);
    }

    #[test]
    fn test_wrong_types_fall_back() {
        let state = ExtractedListState::from_arguments(&json!({
            "items": [{"name": 7, "quantity": "lots", "category": null}, "onion"],
            "confidence": "high"
        }));

        assert_eq!(state.items.len(), 2);
        assert!(state.items.iter().all(|i| i.name == DEFAULT_ITEM_NAME));
        assert!(state.items.iter().all(|i| i.quantity == DEFAULT_QUANTITY));
        assert_eq!(state.confidence, DEFAULT_CONFIDENCE);
    }

    #[test]
    fn test_missing_items_is_empty_list() {
        assert!(ExtractedListState::from_arguments(&json!({})).is_empty());
        assert!(ExtractedListState::from_arguments(&Value::Null).is_empty());
        assert!(ExtractedListState::from_arguments(&json!({"items": "milk"})).is_empty());
    }

    #[test]
    fn test_clamping() {
        let state = ExtractedListState::from_arguments(&json!({
            "items": [{"name": "eggs", "quantity": -3}],
            "confidence": 1.7
        }));
        assert_eq!(state.items[0].quantity, 0.0);
        assert_eq!(state.confidence, 1.0);

        let low = ExtractedListState::new(Vec::new(), -0.2);
        assert_eq!(low.confidence, 0.0);
    }

    #[test]
    fn test_item_order_is_kept() {
        let state = ExtractedListState::from_arguments(&json!({
            "items": [{"name": "milk", "quantity": 2}, {"name": "onion", "quantity": 1}]
        }));
        let names: Vec<_> = state.items.iter().map(|i| i.name.as_str()).collect();
        assert_eq!(names, vec!["milk", "onion"]);
    }

    #[test]
    fn test_sample_list() {
        let sample = ExtractedListState::sample();
        assert_eq!(sample.items.len(), 1);
        assert_eq!(sample.items[0].name, "milk");
        assert_eq!(sample.items[0].category, "dairy");
        assert_eq!(sample.confidence, 0.95);
    }

    #[test]
    fn test_serialization_shape() {
        let state = ExtractedListState::from_arguments(&json!({
            "items": [{"name": "milk", "quantity": 1}]
        }));
        let value = serde_json::to_value(&state).unwrap();

        assert_eq!(value["items"][0]["name"], "milk");
        assert_eq!(value["items"][0]["quantity"], 1.0);
        assert!(value["items"][0]["unit"].is_null());
        assert_eq!(value["confidence"], 0.8);
        assert!(value["last_update"].is_f64());
    }
}
