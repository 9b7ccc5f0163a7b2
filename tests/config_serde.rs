use parindex::config::{CommConfig, ErrorPolicy};

#[test]
fn json_roundtrip() {
    let cfg = CommConfig {
        base_tag: 0x1234,
        bsend_buffer_bytes: 1 << 10,
        error_policy: ErrorPolicy::Abort,
    };
    let text = serde_json::to_string(&cfg).unwrap();
    assert!(text.contains("\"abort\""));
    let back: CommConfig = serde_json::from_str(&text).unwrap();
    assert_eq!(back, cfg);
}

#[test]
fn missing_fields_take_defaults() {
    let cfg: CommConfig = serde_json::from_str(r#"{"error_policy":"propagate","base_tag":7}"#).unwrap();
    assert_eq!(cfg.base_tag, 7);
    assert_eq!(cfg.bsend_buffer_bytes, CommConfig::default().bsend_buffer_bytes);
    assert_eq!(cfg.error_policy, ErrorPolicy::Propagate);
}
