// Document update operators, evaluated against a JSON document inside a single store transaction.
// Element operators address the first array element matching an ElementFilter (positional update).

use serde_json::{Map, Number, Value};

use crate::error::{AppError, AppResult};

/// Equality conditions on fields of an embedded array element. Values compare as JSON, so ids
/// (serialized as strings) compare as strings.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ElementFilter {
    pub conditions: Vec<(String, Value)>,
}

impl ElementFilter {
    pub fn eq(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self {
            conditions: vec![(field.into(), value.into())],
        }
    }

    pub fn and(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.conditions.push((field.into(), value.into()));
        self
    }

    pub fn matches(&self, element: &Value) -> bool {
        self.conditions
            .iter()
            .all(|(field, expected)| lookup(element, field) == Some(expected))
    }
}

/// Precondition checked before any operator runs. A failed guard leaves the document untouched
/// and reports `matched == false`.
#[derive(Debug, Clone, PartialEq)]
pub enum Guard {
    Contains { array: String, filter: ElementFilter },
    Lacks { array: String, filter: ElementFilter },
}

#[derive(Debug, Clone, PartialEq)]
pub enum Aggregate {
    Sum { field: String },
    Count,
    Mean { field: String, decimals: u32 },
}

#[derive(Debug, Clone, PartialEq)]
pub enum UpdateOp {
    Set { path: String, value: Value },
    Inc { path: String, by: Value },
    Push { array: String, value: Value },
    Pull { array: String, filter: ElementFilter },
    AddToSet { array: String, value: Value },
    ToggleMember { array: String, value: Value },
    SetElement { array: String, filter: ElementFilter, field: String, value: Value },
    IncElement { array: String, filter: ElementFilter, field: String, by: Value },
    /// Recompute `target` from the current contents of `array` and write it as an absolute value.
    Recompute { target: String, array: String, aggregate: Aggregate },
    /// Set `amount = quantity * unit price` (cents) on every element of `array`. The unit price
    /// is read from the document after the preceding operators ran; without one nothing changes.
    Reprice { array: String, quantity: String, amount: String, unit_price: String },
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Update {
    pub guard: Option<Guard>,
    pub ops: Vec<UpdateOp>,
}

impl Update {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn when_contains(mut self, array: &str, filter: ElementFilter) -> Self {
        self.guard = Some(Guard::Contains {
            array: array.to_string(),
            filter,
        });
        self
    }

    pub fn when_lacks(mut self, array: &str, filter: ElementFilter) -> Self {
        self.guard = Some(Guard::Lacks {
            array: array.to_string(),
            filter,
        });
        self
    }

    pub fn set(mut self, path: &str, value: impl Into<Value>) -> Self {
        self.ops.push(UpdateOp::Set {
            path: path.to_string(),
            value: value.into(),
        });
        self
    }

    pub fn inc(mut self, path: &str, by: impl Into<Value>) -> Self {
        self.ops.push(UpdateOp::Inc {
            path: path.to_string(),
            by: by.into(),
        });
        self
    }

    pub fn push(mut self, array: &str, value: Value) -> Self {
        self.ops.push(UpdateOp::Push {
            array: array.to_string(),
            value,
        });
        self
    }

    pub fn pull(mut self, array: &str, filter: ElementFilter) -> Self {
        self.ops.push(UpdateOp::Pull {
            array: array.to_string(),
            filter,
        });
        self
    }

    pub fn add_to_set(mut self, array: &str, value: impl Into<Value>) -> Self {
        self.ops.push(UpdateOp::AddToSet {
            array: array.to_string(),
            value: value.into(),
        });
        self
    }

    pub fn toggle_member(mut self, array: &str, value: impl Into<Value>) -> Self {
        self.ops.push(UpdateOp::ToggleMember {
            array: array.to_string(),
            value: value.into(),
        });
        self
    }

    pub fn set_element(
        mut self,
        array: &str,
        filter: ElementFilter,
        field: &str,
        value: impl Into<Value>,
    ) -> Self {
        self.ops.push(UpdateOp::SetElement {
            array: array.to_string(),
            filter,
            field: field.to_string(),
            value: value.into(),
        });
        self
    }

    pub fn inc_element(
        mut self,
        array: &str,
        filter: ElementFilter,
        field: &str,
        by: impl Into<Value>,
    ) -> Self {
        self.ops.push(UpdateOp::IncElement {
            array: array.to_string(),
            filter,
            field: field.to_string(),
            by: by.into(),
        });
        self
    }

    pub fn recompute(mut self, target: &str, array: &str, aggregate: Aggregate) -> Self {
        self.ops.push(UpdateOp::Recompute {
            target: target.to_string(),
            array: array.to_string(),
            aggregate,
        });
        self
    }

    pub fn reprice(mut self, array: &str, quantity: &str, amount: &str, unit_price: &str) -> Self {
        self.ops.push(UpdateOp::Reprice {
            array: array.to_string(),
            quantity: quantity.to_string(),
            amount: amount.to_string(),
            unit_price: unit_price.to_string(),
        });
        self
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }
}

/// Result of applying an [`Update`] to one document.
#[derive(Debug, Clone, PartialEq)]
pub struct UpdateOutcome {
    /// The document existed and the guard (if any) held.
    pub matched: bool,
    /// Number of operators that changed the document (pulls count removed elements).
    pub modified: u32,
    /// Post-image of the document when it exists.
    pub document: Option<Value>,
}

impl UpdateOutcome {
    pub fn unmatched(document: Option<Value>) -> Self {
        Self {
            matched: false,
            modified: 0,
            document,
        }
    }
}

/// Apply `update` to `doc` in place. Returns `None` when the guard rejects the document,
/// otherwise the number of modifications.
pub fn apply_update(doc: &mut Value, update: &Update) -> AppResult<Option<u32>> {
    if let Some(guard) = &update.guard {
        let holds = match guard {
            Guard::Contains { array, filter } => array_contains(doc, array, filter),
            Guard::Lacks { array, filter } => !array_contains(doc, array, filter),
        };
        if !holds {
            return Ok(None);
        }
    }

    let mut modified = 0;
    for op in &update.ops {
        modified += apply_op(doc, op)?;
    }
    Ok(Some(modified))
}

fn apply_op(doc: &mut Value, op: &UpdateOp) -> AppResult<u32> {
    match op {
        UpdateOp::Set { path, value } => {
            let slot = slot_mut(doc, path)?;
            if slot == value {
                return Ok(0);
            }
            *slot = value.clone();
            Ok(1)
        }
        UpdateOp::Inc { path, by } => {
            let slot = slot_mut(doc, path)?;
            *slot = add_numbers(slot, by, path)?;
            Ok(1)
        }
        UpdateOp::Push { array, value } => {
            array_mut(doc, array)?.push(value.clone());
            Ok(1)
        }
        UpdateOp::Pull { array, filter } => {
            let items = array_mut(doc, array)?;
            let before = items.len();
            items.retain(|item| !filter.matches(item));
            Ok((before - items.len()) as u32)
        }
        UpdateOp::AddToSet { array, value } => {
            let items = array_mut(doc, array)?;
            if items.contains(value) {
                Ok(0)
            } else {
                items.push(value.clone());
                Ok(1)
            }
        }
        UpdateOp::ToggleMember { array, value } => {
            let items = array_mut(doc, array)?;
            match items.iter().position(|item| item == value) {
                Some(index) => {
                    items.remove(index);
                }
                None => items.push(value.clone()),
            }
            Ok(1)
        }
        UpdateOp::SetElement {
            array,
            filter,
            field,
            value,
        } => match first_match_mut(doc, array, filter)? {
            Some(element) => {
                let slot = slot_mut(element, field)?;
                if slot == value {
                    return Ok(0);
                }
                *slot = value.clone();
                Ok(1)
            }
            None => Ok(0),
        },
        UpdateOp::IncElement {
            array,
            filter,
            field,
            by,
        } => match first_match_mut(doc, array, filter)? {
            Some(element) => {
                let slot = slot_mut(element, field)?;
                *slot = add_numbers(slot, by, field)?;
                Ok(1)
            }
            None => Ok(0),
        },
        UpdateOp::Recompute {
            target,
            array,
            aggregate,
        } => {
            let value = {
                let items = array_mut(doc, array)?;
                compute_aggregate(items, aggregate)?
            };
            let slot = slot_mut(doc, target)?;
            if *slot == value {
                return Ok(0);
            }
            *slot = value;
            Ok(1)
        }
        UpdateOp::Reprice {
            array,
            quantity,
            amount,
            unit_price,
        } => {
            let Some(unit_price) = lookup(doc, unit_price).and_then(Value::as_f64) else {
                return Ok(0);
            };
            let mut modified = 0;
            for item in array_mut(doc, array)?.iter_mut() {
                let Some(count) = lookup(item, quantity).and_then(Value::as_f64) else {
                    continue;
                };
                let value = float_value(round_to(count * unit_price, 2), amount)?;
                let slot = slot_mut(item, amount)?;
                if slot.as_f64() != value.as_f64() {
                    *slot = value;
                    modified += 1;
                }
            }
            Ok(modified)
        }
    }
}

fn compute_aggregate(items: &[Value], aggregate: &Aggregate) -> AppResult<Value> {
    match aggregate {
        Aggregate::Count => Ok(Value::from(items.len() as u64)),
        Aggregate::Sum { field } => {
            let mut total = Value::from(0);
            for item in items {
                if let Some(value) = lookup(item, field) {
                    if !value.is_null() {
                        total = add_numbers(&total, value, field)?;
                    }
                }
            }
            Ok(total)
        }
        Aggregate::Mean { field, decimals } => {
            let values: Vec<f64> = items
                .iter()
                .filter_map(|item| lookup(item, field).and_then(Value::as_f64))
                .collect();
            if values.is_empty() {
                return Ok(Value::from(0));
            }
            let mean = values.iter().sum::<f64>() / values.len() as f64;
            float_value(round_to(mean, *decimals), field)
        }
    }
}

/// Round half away from zero to `decimals` places.
pub fn round_to(value: f64, decimals: u32) -> f64 {
    let factor = 10f64.powi(decimals as i32);
    (value * factor).round() / factor
}

fn add_numbers(current: &Value, by: &Value, path: &str) -> AppResult<Value> {
    let zero = Value::from(0);
    let current = if current.is_null() { &zero } else { current };
    match (current, by) {
        (Value::Number(a), Value::Number(b)) => {
            if let (Some(a), Some(b)) = (a.as_i64(), b.as_i64()) {
                if let Some(sum) = a.checked_add(b) {
                    return Ok(Value::from(sum));
                }
            }
            let sum = a.as_f64().unwrap_or(0.0) + b.as_f64().unwrap_or(0.0);
            float_value(sum, path)
        }
        _ => Err(AppError::Validation(format!(
            "Cannot increment non-numeric field '{}'",
            path
        ))),
    }
}

fn float_value(value: f64, path: &str) -> AppResult<Value> {
    Number::from_f64(value)
        .map(Value::Number)
        .ok_or_else(|| AppError::Validation(format!("Non-finite value computed for '{}'", path)))
}

fn array_contains(doc: &Value, array: &str, filter: &ElementFilter) -> bool {
    lookup(doc, array)
        .and_then(Value::as_array)
        .map(|items| items.iter().any(|item| filter.matches(item)))
        .unwrap_or(false)
}

fn first_match_mut<'a>(
    doc: &'a mut Value,
    array: &str,
    filter: &ElementFilter,
) -> AppResult<Option<&'a mut Value>> {
    Ok(array_mut(doc, array)?
        .iter_mut()
        .find(|item| filter.matches(item)))
}

/// Read a dotted path.
pub fn lookup<'a>(value: &'a Value, path: &str) -> Option<&'a Value> {
    path.split('.')
        .try_fold(value, |current, key| current.as_object()?.get(key))
}

/// Resolve a dotted path for writing, creating intermediate objects and a null leaf as needed.
fn slot_mut<'a>(value: &'a mut Value, path: &str) -> AppResult<&'a mut Value> {
    let mut current = value;
    for key in path.split('.') {
        if current.is_null() {
            *current = Value::Object(Map::new());
        }
        current = match current {
            Value::Object(map) => map.entry(key.to_string()).or_insert(Value::Null),
            _ => {
                return Err(AppError::Validation(format!(
                    "Path '{}' crosses a non-object value",
                    path
                )))
            }
        };
    }
    Ok(current)
}

fn array_mut<'a>(doc: &'a mut Value, array: &str) -> AppResult<&'a mut Vec<Value>> {
    let slot = slot_mut(doc, array)?;
    if slot.is_null() {
        *slot = Value::Array(Vec::new());
    }
    slot.as_array_mut()
        .ok_or_else(|| AppError::Validation(format!("Field '{}' is not an array", array)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn deal() -> Value {
        json!({
            "id": "d1",
            "currentOrderedQty": 0,
            "orders": [
                {"userId": "u1", "quantity": 2, "amount": 200.0},
                {"userId": "u2", "quantity": 1, "amount": 100.0}
            ]
        })
    }

    #[test]
    fn test_guarded_element_increment() {
        let mut doc = deal();
        let update = Update::new()
            .when_contains("orders", ElementFilter::eq("userId", "u1"))
            .inc_element("orders", ElementFilter::eq("userId", "u1"), "quantity", 3)
            .recompute(
                "currentOrderedQty",
                "orders",
                Aggregate::Sum {
                    field: "quantity".into(),
                },
            );

        assert_eq!(apply_update(&mut doc, &update).unwrap(), Some(2));
        assert_eq!(doc["orders"][0]["quantity"], 5);
        assert_eq!(doc["currentOrderedQty"], 6);
    }

    #[test]
    fn test_guard_rejects_without_touching_document() {
        let mut doc = deal();
        let update = Update::new()
            .when_contains("orders", ElementFilter::eq("userId", "u9"))
            .set("currentOrderedQty", 99);

        assert_eq!(apply_update(&mut doc, &update).unwrap(), None);
        assert_eq!(doc, deal());

        let lacks = Update::new()
            .when_lacks("orders", ElementFilter::eq("userId", "u1"))
            .set("currentOrderedQty", 99);
        assert_eq!(apply_update(&mut doc, &lacks).unwrap(), None);
    }

    #[test]
    fn test_pull_counts_removed_elements() {
        let mut doc = deal();
        let update = Update::new()
            .pull("orders", ElementFilter::eq("userId", "u2"))
            .recompute(
                "currentOrderedQty",
                "orders",
                Aggregate::Sum {
                    field: "quantity".into(),
                },
            );
        assert_eq!(apply_update(&mut doc, &update).unwrap(), Some(2));
        assert_eq!(doc["orders"].as_array().unwrap().len(), 1);
        assert_eq!(doc["currentOrderedQty"], 2);

        let again = Update::new().pull("orders", ElementFilter::eq("userId", "u2"));
        assert_eq!(apply_update(&mut doc, &again).unwrap(), Some(0));
    }

    #[test]
    fn test_toggle_member_restores_state() {
        let mut doc = json!({"likes": ["a"]});
        let toggle = Update::new().toggle_member("likes", "b");
        apply_update(&mut doc, &toggle).unwrap();
        assert_eq!(doc["likes"], json!(["a", "b"]));
        apply_update(&mut doc, &toggle).unwrap();
        assert_eq!(doc["likes"], json!(["a"]));
    }

    #[test]
    fn test_add_to_set_and_missing_arrays() {
        let mut doc = json!({});
        let update = Update::new()
            .add_to_set("societyIds", "s1")
            .add_to_set("societyIds", "s1");
        assert_eq!(apply_update(&mut doc, &update).unwrap(), Some(1));
        assert_eq!(doc["societyIds"], json!(["s1"]));
    }

    #[test]
    fn test_mean_and_count_aggregates() {
        let mut doc = json!({"reviews": [{"rating": 5}, {"rating": 4}, {"rating": 4}]});
        let update = Update::new()
            .recompute(
                "averageRating",
                "reviews",
                Aggregate::Mean {
                    field: "rating".into(),
                    decimals: 2,
                },
            )
            .recompute("totalReviews", "reviews", Aggregate::Count);
        apply_update(&mut doc, &update).unwrap();
        assert_eq!(doc["averageRating"], json!(4.33));
        assert_eq!(doc["totalReviews"], 3);
    }

    #[test]
    fn test_nested_set_and_float_increment() {
        let mut doc = json!({"price": {"sellingPrice": 10}});
        let update = Update::new()
            .set("price.mrp", 12.5)
            .inc("price.sellingPrice", 0.5);
        apply_update(&mut doc, &update).unwrap();
        assert_eq!(doc["price"]["mrp"], json!(12.5));
        assert_eq!(doc["price"]["sellingPrice"], json!(10.5));
    }

    #[test]
    fn test_increment_rejects_strings() {
        let mut doc = json!({"title": "x"});
        let update = Update::new().inc("title", 1);
        assert!(apply_update(&mut doc, &update).is_err());
    }

    #[test]
    fn test_reprice_follows_price_set_in_same_update() {
        let mut doc = deal();
        doc["price"] = json!({"sellingPrice": 100.0});
        let update = Update::new()
            .set("price.sellingPrice", 150.0)
            .reprice("orders", "quantity", "amount", "price.sellingPrice");
        assert_eq!(apply_update(&mut doc, &update).unwrap(), Some(3));
        assert_eq!(doc["orders"][0]["amount"], json!(300.0));
        assert_eq!(doc["orders"][1]["amount"], json!(150.0));

        // Same price again leaves amounts alone.
        assert_eq!(apply_update(&mut doc, &update).unwrap(), Some(0));

        let mut unpriced = deal();
        let update = Update::new().reprice("orders", "quantity", "amount", "price");
        assert_eq!(apply_update(&mut unpriced, &update).unwrap(), Some(0));
        assert_eq!(unpriced, deal());
    }

    #[test]
    fn test_round_to() {
        assert_eq!(round_to(66.666, 1), 66.7);
        assert_eq!(round_to(4.333333, 2), 4.33);
        assert_eq!(round_to(0.1 * 3.0, 2), 0.3);
    }
}
