use serde_json::{Map, Value};

/// A flat transaction-like record: column name -> scalar value.
pub type Record = Map<String, Value>;

/// Wrapper keys that commonly hold the transaction list or connection,
/// probed in this order.
const WRAPPER_KEYS: &[&str] = &[
    "transactions",
    "allTransactions",
    "transactionsForAccount",
    "transactionsByAccount",
    "getTransactions",
];

/// Collapse a value to something a spreadsheet cell can hold.
/// Scalars pass through; arrays/objects become compact JSON text.
pub fn scalar(v: &Value) -> Value {
    match v {
        Value::Null | Value::Bool(_) | Value::Number(_) | Value::String(_) => v.clone(),
        other => Value::String(other.to_string()),
    }
}

/// Convert an arbitrary value into a record, trying strategies in order:
/// 1. a JSON object: take its entries, scalarizing each value;
/// 2. a string that parses as a JSON object: recurse on the parsed value;
/// 3. anything else: wrap under a single "value" key.
pub fn to_record(v: &Value) -> Record {
    match v {
        Value::Object(map) => map.iter().map(|(k, val)| (k.clone(), scalar(val))).collect(),
        Value::String(s) => {
            if let Ok(parsed @ Value::Object(_)) = serde_json::from_str::<Value>(s) {
                return to_record(&parsed);
            }
            single_value_record(v)
        }
        _ => single_value_record(v),
    }
}

fn single_value_record(v: &Value) -> Record {
    let mut rec = Record::new();
    rec.insert("value".to_string(), scalar(v));
    rec
}

/// Normalize an arbitrarily-shaped response into a flat list of
/// record-like values. Unrecognized shapes yield an empty list rather
/// than an error: the paginator treats "nothing found" the same as a
/// true end-of-data page.
pub fn unwrap_records(v: &Value) -> Vec<Value> {
    match v {
        Value::Array(items) => items.clone(),
        Value::Object(map) => {
            if let Some(data) = map.get("data") {
                if !data.is_null() {
                    return unwrap_records(data);
                }
            }
            for key in WRAPPER_KEYS {
                if let Some(part) = map.get(*key) {
                    if !part.is_null() {
                        return unwrap_records(part);
                    }
                }
            }
            if let Some(Value::Array(results)) = map.get("results") {
                return results.clone();
            }
            if let Some(nodes) = map.get("nodes") {
                if !nodes.is_null() {
                    return unwrap_records(nodes);
                }
            }
            if let Some(edges) = map.get("edges") {
                if let Value::Array(edges) = edges {
                    return edges
                        .iter()
                        .map(|e| match e.get("node") {
                            Some(node) if !node.is_null() => node.clone(),
                            _ => e.clone(),
                        })
                        .collect();
                }
                return Vec::new();
            }
            if let Some(items) = map.get("items") {
                if !items.is_null() {
                    return unwrap_records(items);
                }
            }
            Vec::new()
        }
        _ => Vec::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn ab() -> Vec<Value> {
        vec![json!({"id": "a"}), json!({"id": "b"})]
    }

    #[test]
    fn test_unwrap_bare_list() {
        assert_eq!(unwrap_records(&json!([{"id": "a"}, {"id": "b"}])), ab());
    }

    #[test]
    fn test_unwrap_data_transactions() {
        let v = json!({"data": {"transactions": [{"id": "a"}, {"id": "b"}]}});
        assert_eq!(unwrap_records(&v), ab());
    }

    #[test]
    fn test_unwrap_connection_edges() {
        let v = json!({"allTransactions": {"edges": [
            {"node": {"id": "a"}},
            {"node": {"id": "b"}},
        ]}});
        assert_eq!(unwrap_records(&v), ab());
    }

    #[test]
    fn test_unwrap_edge_without_node_falls_back_to_edge() {
        let v = json!({"edges": [{"id": "a"}, {"node": {"id": "b"}}]});
        assert_eq!(unwrap_records(&v), ab());
    }

    #[test]
    fn test_unwrap_results() {
        let v = json!({"results": [{"id": "a"}, {"id": "b"}]});
        assert_eq!(unwrap_records(&v), ab());
    }

    #[test]
    fn test_unwrap_nodes() {
        let v = json!({"nodes": [{"id": "a"}, {"id": "b"}]});
        assert_eq!(unwrap_records(&v), ab());
    }

    #[test]
    fn test_unwrap_items() {
        let v = json!({"items": [{"id": "a"}, {"id": "b"}]});
        assert_eq!(unwrap_records(&v), ab());
    }

    #[test]
    fn test_unwrap_unrecognized_shape_is_empty() {
        assert_eq!(unwrap_records(&json!({"foo": 1})), Vec::<Value>::new());
        assert_eq!(unwrap_records(&json!("plain string")), Vec::<Value>::new());
        assert_eq!(unwrap_records(&Value::Null), Vec::<Value>::new());
    }

    #[test]
    fn test_unwrap_null_data_does_not_absorb() {
        // A null "data" field should not shadow a usable sibling wrapper.
        let v = json!({"data": null, "transactions": [{"id": "a"}, {"id": "b"}]});
        assert_eq!(unwrap_records(&v), ab());
    }

    #[test]
    fn test_scalar_passthrough_and_json_text() {
        assert_eq!(scalar(&json!("x")), json!("x"));
        assert_eq!(scalar(&json!(1.5)), json!(1.5));
        assert_eq!(scalar(&json!(true)), json!(true));
        assert_eq!(scalar(&json!({"a": 1})), json!("{\"a\":1}"));
        assert_eq!(scalar(&json!([1, 2])), json!("[1,2]"));
    }

    #[test]
    fn test_to_record_object_scalarizes_nested() {
        let rec = to_record(&json!({"id": "t1", "merchant": {"name": "Acme"}}));
        assert_eq!(rec.get("id"), Some(&json!("t1")));
        assert_eq!(rec.get("merchant"), Some(&json!("{\"name\":\"Acme\"}")));
    }

    #[test]
    fn test_to_record_json_object_string() {
        let rec = to_record(&json!("{\"id\": \"t1\"}"));
        assert_eq!(rec.get("id"), Some(&json!("t1")));
    }

    #[test]
    fn test_to_record_scalar_wraps_under_value() {
        let rec = to_record(&json!(42));
        assert_eq!(rec.get("value"), Some(&json!(42)));
        assert_eq!(rec.len(), 1);
    }
}
