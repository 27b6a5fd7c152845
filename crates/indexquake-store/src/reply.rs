//! Decoding of RediSearch replies into the store's result types.

use crate::client::{AggregateRow, IndexAttribute, IndexInfo, SearchDocument, SearchResult};
use crate::StoreError;
use redis::Value;
use std::collections::BTreeMap;

/// Text form of a scalar reply element.
pub fn as_text(value: &Value) -> Option<String> {
    match value {
        Value::BulkString(bytes) => Some(String::from_utf8_lossy(bytes).into_owned()),
        Value::SimpleString(s) => Some(s.clone()),
        Value::VerbatimString { text, .. } => Some(text.clone()),
        Value::Int(n) => Some(n.to_string()),
        Value::Double(d) => Some(d.to_string()),
        Value::Okay => Some("OK".to_owned()),
        _ => None,
    }
}

fn as_u64(value: &Value) -> Option<u64> {
    match value {
        Value::Int(n) => u64::try_from(*n).ok(),
        other => as_text(other).and_then(|s| s.parse::<f64>().ok()).map(|f| f as u64),
    }
}

fn items(value: &Value) -> Option<&[Value]> {
    match value {
        Value::Array(items) | Value::Set(items) => Some(items),
        _ => None,
    }
}

/// Flatten `[k1, v1, k2, v2, ...]` (or a RESP3 map) into owned pairs.
fn pairs(value: &Value) -> Vec<(String, &Value)> {
    match value {
        Value::Map(entries) => entries
            .iter()
            .filter_map(|(k, v)| as_text(k).map(|k| (k, v)))
            .collect(),
        other => items(other)
            .unwrap_or_default()
            .chunks_exact(2)
            .filter_map(|kv| as_text(&kv[0]).map(|k| (k, &kv[1])))
            .collect(),
    }
}

fn text_map(value: &Value) -> BTreeMap<String, String> {
    pairs(value)
        .into_iter()
        .filter_map(|(k, v)| as_text(v).map(|v| (k, v)))
        .collect()
}

/// `FT.SEARCH` reply: `[total, key, [field, value, ...], key, ...]`.
pub fn parse_search(value: &Value) -> Result<SearchResult, StoreError> {
    let list = items(value)
        .ok_or_else(|| StoreError::Protocol(format!("FT.SEARCH returned {value:?}")))?;
    let (head, rest) = list
        .split_first()
        .ok_or_else(|| StoreError::Protocol("FT.SEARCH returned an empty array".to_owned()))?;
    let total = as_u64(head)
        .ok_or_else(|| StoreError::Protocol(format!("FT.SEARCH total was {head:?}")))?;

    let mut documents: Vec<SearchDocument> = Vec::new();
    for element in rest {
        if let Some(id) = as_text(element) {
            documents.push(SearchDocument {
                id,
                fields: BTreeMap::new(),
            });
        } else if let Some(doc) = documents.last_mut() {
            doc.fields = text_map(element);
        } else {
            return Err(StoreError::Protocol(
                "FT.SEARCH returned fields before a document id".to_owned(),
            ));
        }
    }
    Ok(SearchResult { total, documents })
}

/// `FT.AGGREGATE` reply: `[count, [field, value, ...], ...]`.
pub fn parse_aggregate(value: &Value) -> Result<Vec<AggregateRow>, StoreError> {
    let list = items(value)
        .ok_or_else(|| StoreError::Protocol(format!("FT.AGGREGATE returned {value:?}")))?;
    Ok(list.iter().skip(1).map(text_map).collect())
}

/// `FT.INFO` reply, reduced to the parts the harness reports.
pub fn parse_info(name: &str, value: &Value) -> Result<IndexInfo, StoreError> {
    let fields = pairs(value);
    if fields.is_empty() {
        return Err(StoreError::Protocol(format!("FT.INFO returned {value:?}")));
    }

    let mut info = IndexInfo {
        name: name.to_owned(),
        ..IndexInfo::default()
    };
    for (key, v) in fields {
        match key.as_str() {
            "index_name" => {
                if let Some(n) = as_text(v) {
                    info.name = n;
                }
            }
            "num_docs" => info.num_docs = as_u64(v).unwrap_or(0),
            "index_definition" => {
                for (dk, dv) in pairs(v) {
                    if dk == "prefixes" {
                        info.prefixes = items(dv)
                            .unwrap_or_default()
                            .iter()
                            .filter_map(as_text)
                            .collect();
                    }
                }
            }
            "attributes" => {
                info.attributes = items(v)
                    .unwrap_or_default()
                    .iter()
                    .filter_map(|attr| {
                        let attr = text_map(attr);
                        Some(IndexAttribute {
                            identifier: attr.get("identifier")?.clone(),
                            alias: attr
                                .get("attribute")
                                .or_else(|| attr.get("identifier"))?
                                .clone(),
                            kind: attr.get("type").cloned().unwrap_or_default(),
                        })
                    })
                    .collect();
            }
            _ => {}
        }
    }
    Ok(info)
}

/// `JSON.GET` returns serialized JSON; JSONPath queries wrap matches in an array.
pub fn parse_json_get(raw: Option<String>, path: &str) -> Result<Option<serde_json::Value>, StoreError> {
    let Some(raw) = raw else {
        return Ok(None);
    };
    let value: serde_json::Value = serde_json::from_str(&raw)?;
    if path.starts_with('$') {
        return Ok(match value {
            serde_json::Value::Array(mut matches) if !matches.is_empty() => {
                Some(matches.swap_remove(0))
            }
            serde_json::Value::Array(_) => None,
            other => Some(other),
        });
    }
    Ok(Some(value))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bulk(s: &str) -> Value {
        Value::BulkString(s.as_bytes().to_vec())
    }

    #[test]
    fn search_reply_with_fields() {
        let reply = Value::Array(vec![
            Value::Int(2),
            bulk("books:0"),
            Value::Array(vec![bulk("$.title"), bulk("Canary Ledger")]),
            bulk("books:7"),
            Value::Array(vec![bulk("$.title"), bulk("Other")]),
        ]);
        let result = parse_search(&reply).unwrap();
        assert_eq!(result.total, 2);
        assert_eq!(result.documents.len(), 2);
        assert_eq!(result.documents[0].id, "books:0");
        assert_eq!(result.documents[0].field("$.title"), Some("Canary Ledger"));
    }

    #[test]
    fn search_reply_without_fields() {
        let reply = Value::Array(vec![Value::Int(1), bulk("books:3")]);
        let result = parse_search(&reply).unwrap();
        assert_eq!(result.documents[0].id, "books:3");
        assert!(result.documents[0].fields.is_empty());
    }

    #[test]
    fn search_reply_errors() {
        assert!(matches!(parse_search(&Value::Nil), Err(StoreError::Protocol(_))));
        assert!(matches!(
            parse_search(&Value::Array(vec![])),
            Err(StoreError::Protocol(_))
        ));
        assert!(matches!(
            parse_search(&Value::Array(vec![
                Value::Int(1),
                Value::Array(vec![bulk("a"), bulk("b")])
            ])),
            Err(StoreError::Protocol(_))
        ));
    }

    #[test]
    fn aggregate_rows() {
        let reply = Value::Array(vec![
            Value::Int(1),
            Value::Array(vec![bulk("total"), bulk("3001")]),
            Value::Array(vec![bulk("kind"), bulk("a"), bulk("sum"), bulk("5")]),
        ]);
        let rows = parse_aggregate(&reply).unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0]["total"], "3001");
        assert_eq!(rows[1]["sum"], "5");
    }

    #[test]
    fn info_reply() {
        let reply = Value::Array(vec![
            bulk("index_name"),
            bulk("idx:books"),
            bulk("index_definition"),
            Value::Array(vec![
                bulk("key_type"),
                bulk("JSON"),
                bulk("prefixes"),
                Value::Array(vec![bulk("indexquake:books:")]),
            ]),
            bulk("attributes"),
            Value::Array(vec![Value::Array(vec![
                bulk("identifier"),
                bulk("$.title"),
                bulk("attribute"),
                bulk("title"),
                bulk("type"),
                bulk("TEXT"),
            ])]),
            bulk("num_docs"),
            bulk("3001"),
        ]);
        let info = parse_info("idx:books", &reply).unwrap();
        assert_eq!(info.name, "idx:books");
        assert_eq!(info.num_docs, 3001);
        assert_eq!(info.prefixes, vec!["indexquake:books:".to_owned()]);
        assert_eq!(info.attributes.len(), 1);
        assert_eq!(info.attributes[0].alias, "title");
        assert_eq!(info.attributes[0].kind, "TEXT");
    }

    #[test]
    fn json_get_unwraps_jsonpath_matches() {
        let v = parse_json_get(Some(r#"[{"a":1}]"#.to_owned()), "$").unwrap();
        assert_eq!(v, Some(serde_json::json!({"a": 1})));
        assert_eq!(parse_json_get(Some("[]".to_owned()), "$.x").unwrap(), None);
        assert_eq!(parse_json_get(None, "$").unwrap(), None);
        let legacy = parse_json_get(Some("5".to_owned()), ".n").unwrap();
        assert_eq!(legacy, Some(serde_json::json!(5)));
    }
}
