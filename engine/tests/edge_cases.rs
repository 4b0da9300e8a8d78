//! Edge case tests for nimbus-engine
//!
//! These tests cover boundary conditions and unusual inputs.

use nimbus_engine::{
    codes, encode, BatchOp, Error, MockTransport, Number, Query, Record, RecordSnapshot,
    Registry, Synchronizer, Value,
};
use serde_json::json;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

fn setup() -> (Arc<MockTransport>, Synchronizer) {
    let transport = Arc::new(MockTransport::new());
    let sync = Synchronizer::new(transport.clone()).with_path_prefix("/1");
    (transport, sync)
}

// ============================================================================
// String Edge Cases
// ============================================================================

#[test]
fn empty_string_fields() {
    let mut record = Record::new("Item");
    record.put("name", "").unwrap();
    assert_eq!(record.get_str("name"), Some(""));
    assert_eq!(record.pending_payload().unwrap()["name"], "");
}

#[test]
fn unicode_strings() {
    let (transport, sync) = setup();
    let names = [
        "日本語テスト",
        "Привет мир",
        "مرحبا بالعالم",
        "🎉🚀💯",
        "Hello\nWorld\tTab",
        "Null\0Test",
    ];

    for (i, name) in names.iter().enumerate() {
        transport.push_json(200, json!({"objectId": format!("item_{i}"), "name": name}));
        let mut record = Record::without_data("Item", format!("item_{i}"));
        record.fetch(&sync).unwrap();
        assert_eq!(record.get_str("name"), Some(*name), "Failed for: {name}");
    }
}

#[test]
fn unicode_keys() {
    let mut record = Record::new("Item");
    record.put("名前", "value").unwrap();
    assert!(record.pending_payload().unwrap().contains_key("名前"));
}

// ============================================================================
// Numeric Edge Cases
// ============================================================================

#[test]
fn large_integers_keep_precision() {
    let (transport, sync) = setup();
    transport.push_json(200, json!({"objectId": "n", "big": i64::MAX, "small": i64::MIN}));
    let mut record = Record::without_data("Item", "n");
    record.fetch(&sync).unwrap();
    assert_eq!(record.get_number("big"), Some(Number::Long(i64::MAX)));
    assert_eq!(record.get_i64("small"), Some(i64::MIN));
}

#[test]
fn increment_widens_local_value() {
    let mut record = Record::new("Item");
    record.put("ratio", 1i32).unwrap();
    record.increment_by("ratio", 0.5f64).unwrap();
    assert_eq!(record.get_number("ratio"), Some(Number::Double(1.5)));
}

#[test]
fn non_finite_increment_fails_on_save() {
    let (transport, sync) = setup();
    let mut record = Record::without_data("Item", "n");
    record.increment_by("ratio", f64::INFINITY).unwrap();
    assert!(matches!(record.save(&sync), Err(Error::EncodingFailure(_))));
    assert_eq!(transport.request_count(), 0);
}

// ============================================================================
// Structured Values
// ============================================================================

#[test]
fn deeply_nested_values_decode() {
    let registry = Registry::new();
    let mut nested = json!("leaf");
    for _ in 0..50 {
        nested = json!({"child": [nested]});
    }
    let value = encode::decode(&nested, &registry).unwrap();

    let mut depth = 0;
    let mut cursor = &value;
    while let Value::Map(map) = cursor {
        cursor = &map["child"].as_array().unwrap()[0];
        depth += 1;
    }
    assert_eq!(depth, 50);
    assert_eq!(cursor, &Value::from("leaf"));
}

#[test]
fn empty_bytes_and_arrays() {
    let mut record = Record::new("Item");
    record.put("blob", Value::bytes(Vec::new())).unwrap();
    record.put("list", Value::Array(Vec::new())).unwrap();
    let payload = record.pending_payload().unwrap();
    assert_eq!(payload["blob"], json!({"__type": "Bytes", "base64": ""}));
    assert_eq!(payload["list"], json!([]));
}

#[test]
fn null_inside_arrays_is_allowed() {
    let mut record = Record::new("Item");
    record
        .put("list", Value::Array(vec![Value::Null, Value::from(1i32)]))
        .unwrap();
    assert_eq!(record.pending_payload().unwrap()["list"], json!([null, 1]));
}

// ============================================================================
// Response Edge Cases
// ============================================================================

#[test]
fn empty_update_response_confirms_save() {
    let (transport, sync) = setup();
    transport.push_raw(200, "");
    let mut record = Record::without_data("Item", "i1");
    record.put("name", "x").unwrap();
    record.save(&sync).unwrap();
    assert!(!record.is_dirty());
    assert_eq!(record.get_str("name"), Some("x"));
}

#[test]
fn html_error_page_is_invalid_json() {
    let (transport, sync) = setup();
    transport.push_raw(502, "<html>Bad Gateway</html>");
    let mut record = Record::without_data("Item", "i1");
    let err = record.fetch(&sync).unwrap_err();
    assert_eq!(err.code(), codes::INVALID_JSON);
}

#[test]
fn non_object_fetch_response_is_rejected() {
    let (transport, sync) = setup();
    transport.push_json(200, json!([1, 2, 3]));
    let mut record = Record::without_data("Item", "i1");
    record.put("name", "x").unwrap();
    assert!(record.fetch(&sync).is_err());
    assert!(record.is_dirty());
}

#[test]
fn error_body_without_code_uses_other_cause() {
    let (transport, sync) = setup();
    transport.push_json(400, json!({"error": "bad"}));
    let mut record = Record::without_data("Item", "i1");
    let err = record.fetch(&sync).unwrap_err();
    assert_eq!(err, Error::server(codes::OTHER_CAUSE, "bad"));
}

#[test]
fn find_with_no_results() {
    let (transport, sync) = setup();
    transport.push_json(200, json!({"results": []}));
    assert!(sync.first(&Query::new("Item")).unwrap().is_none());
    let request = transport.last_request().unwrap();
    assert!(request
        .query
        .contains(&("limit".to_string(), "1".to_string())));
}

// ============================================================================
// Batch Edge Cases
// ============================================================================

#[test]
fn empty_batch_round_trips() {
    let (transport, sync) = setup();
    transport.push_json(200, json!([]));
    let mut batch = sync.batch();
    assert!(batch.execute(&sync).unwrap());
    assert!(batch.errors().unwrap().is_empty());
    assert_eq!(
        transport.last_request().unwrap().body,
        Some(json!({"requests": []}))
    );
}

#[test]
fn batch_reports_progress() {
    let (transport, sync) = setup();
    transport.push_json(200, json!([{"success": {}}]));
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = calls.clone();

    let mut record = Record::without_data("Item", "i1");
    let mut batch = sync.batch();
    batch.set_progress_callback(Arc::new(move |_: u8| {
        counter.fetch_add(1, Ordering::SeqCst);
    }));
    batch.add_object(&mut record, BatchOp::Delete).unwrap();
    batch.execute(&sync).unwrap();
    assert!(calls.load(Ordering::SeqCst) > 0);
}

#[test]
fn batch_rejects_non_array_response() {
    let (transport, sync) = setup();
    transport.push_json(200, json!({"results": []}));
    let mut record = Record::without_data("Item", "i1");
    let mut batch = sync.batch();
    batch.add_object(&mut record, BatchOp::Delete).unwrap();
    assert_eq!(batch.execute(&sync).unwrap_err().code(), codes::INVALID_JSON);
}

#[test]
fn batch_can_be_re_executed_after_failure() {
    let (transport, sync) = setup();
    transport.push_failure("offline");
    transport.push_json(200, json!([{"success": {"updatedAt": "2024-01-01T00:00:00.000Z"}}]));

    let mut record = Record::without_data("Item", "i1");
    record.put("name", "x").unwrap();
    let mut batch = sync.batch();
    batch.add_object(&mut record, BatchOp::Update).unwrap();
    assert!(batch.execute(&sync).is_err());
    assert!(batch.execute(&sync).unwrap());
    drop(batch);
    assert!(!record.is_dirty());
}

// ============================================================================
// Snapshot Edge Cases
// ============================================================================

#[test]
fn snapshot_of_unsaved_clean_record() {
    let record = Record::new("Item");
    let snapshot = RecordSnapshot::capture(&record).unwrap();
    assert!(snapshot.object_id.is_none());
    let restored = snapshot.restore(&Registry::new()).unwrap();
    assert_eq!(restored.object_id(), None);
    assert!(!restored.is_data_available());
}

#[test]
fn snapshot_from_garbage_fails() {
    assert!(RecordSnapshot::from_json("{not json").is_err());
    assert!(RecordSnapshot::from_json("{}").is_err());
}
