// ==========================================
// 配置层集成测试
// ==========================================
// 测试目标: 配置文件 → ReconcileConfigReader → 已校验的 ReconcileConfig
// ==========================================


use lot_reconcile::config::{config_keys, ConfigManager, ReconcileConfig, ReconcileConfigReader};
use lot_reconcile::domain::types::{LifecycleStage, NormalizationConfidence, SourceKind};
use lot_reconcile::ReconcileError;
use serde_json::Value;
use test_helpers::{anchor, date, write_temp_config};

#[tokio::test]
async fn test_missing_file_uses_defaults() {
    let dir = tempfile::tempdir().expect("Failed to create temp dir");
    let manager = ConfigManager::from_file(dir.path().join("config.json"))
        .expect("missing file should fall back to defaults");

    let config = ReconcileConfig::load(&manager, anchor()).await.unwrap();

    assert_eq!(config.issue_rule.text(), "line_issue_flag = true");
    assert_eq!(config.missing_shipping_label, "Not Found / Not Shipped Yet");
    assert!(!config.include_needs_review);
    assert_eq!(config.week_anchor_date, anchor());
    assert_eq!(config.canonical_separator, '-');
    assert_eq!(
        config.policy.identity_attributes,
        vec!["part_number".to_string(), "production_line".to_string()]
    );
    assert_eq!(config.policy.min_sources_for(LifecycleStage::Shipped), 3);
    assert!(config.policy.flag_intra_source_variants);
}

#[tokio::test]
async fn test_file_values_override_defaults() {
    let file = write_temp_config(
        r#"{
            "issue_rule": "line_issue_flag = true OR downtime_minutes > 60",
            "missing_shipping_label": "N/A",
            "include_needs_review": "yes",
            "week_anchor_date": "2026-03-04",
            "identity_attributes": "part_number, customer",
            "min_sources_by_stage": {"shipped": 2},
            "flag_intra_source_variants": false
        }"#,
    );
    let manager = ConfigManager::from_file(file.path()).unwrap();

    assert_eq!(
        manager.get_include_needs_review().await.unwrap(),
        true,
        "truthy strings are accepted"
    );

    let config = ReconcileConfig::load(&manager, anchor()).await.unwrap();

    assert_eq!(
        config.issue_rule.text(),
        "line_issue_flag = true OR downtime_minutes > 60"
    );
    assert_eq!(config.missing_shipping_label, "N/A");
    assert!(config.include_needs_review);
    assert_eq!(config.week_anchor_date, date(2026, 3, 4));
    assert_eq!(
        config.policy.identity_attributes,
        vec!["part_number".to_string(), "customer".to_string()]
    );
    // 未配置的阶段保留默认值
    assert_eq!(config.policy.min_sources_for(LifecycleStage::Shipped), 2);
    assert_eq!(config.policy.min_sources_for(LifecycleStage::Inspected), 2);
    assert!(!config.policy.flag_intra_source_variants);
}

#[tokio::test]
async fn test_custom_strip_rules_reach_the_normalizer() {
    let file = write_temp_config(
        r#"{
            "strip_rules": {
                "*": [{"type": "regex", "pattern": "^L0T", "replacement": "LOT"}],
                "shipping": [{"type": "prefix", "value": "wh/"}]
            }
        }"#,
    );
    let manager = ConfigManager::from_file(file.path()).unwrap();
    let config = ReconcileConfig::load(&manager, anchor()).await.unwrap();
    let normalizer = config.normalizer();

    let shipped = normalizer
        .normalize("WH/LOT-2026-0001", SourceKind::Shipping)
        .unwrap();
    assert_eq!(shipped.key, "LOT-2026-0001");
    assert_eq!(shipped.confidence, NormalizationConfidence::High);

    // 发运专属规则不作用于生产
    let produced = normalizer
        .normalize("WH/LOT-2026-0001", SourceKind::Production)
        .unwrap();
    assert_ne!(produced.key, "LOT-2026-0001");
}

#[tokio::test]
async fn test_invalid_values_are_fatal_before_processing() {
    let cases = [
        (config_keys::ISSUE_RULE, Value::String("line_issue_flag ==".to_string())),
        (config_keys::LOT_PATTERN, Value::String("([A-Z".to_string())),
        (config_keys::CANONICAL_SEPARATOR, Value::String("ab".to_string())),
        (config_keys::WEEK_ANCHOR_DATE, Value::String("11/02/2026".to_string())),
        (config_keys::INCLUDE_NEEDS_REVIEW, Value::String("maybe".to_string())),
        (config_keys::MISSING_SHIPPING_LABEL, Value::String("   ".to_string())),
        (
            config_keys::STRIP_RULES,
            serde_json::json!({"finance": [{"type": "prefix", "value": "X"}]}),
        ),
        (
            config_keys::MIN_SOURCES_BY_STAGE,
            serde_json::json!({"archived": 1}),
        ),
    ];

    for (key, value) in cases {
        let mut manager = ConfigManager::new();
        manager.set_config_value(key, value.clone());

        let result = ReconcileConfig::load(&manager, anchor()).await;
        assert!(result.is_err(), "{} = {} should be rejected", key, value);
    }
}

#[tokio::test]
async fn test_unknown_strip_rule_source_names_the_tag() {
    let mut manager = ConfigManager::new();
    manager.set_config_value(
        config_keys::STRIP_RULES,
        serde_json::json!({"finance": [{"type": "prefix", "value": "X"}]}),
    );

    let err = ReconcileConfig::load(&manager, anchor()).await.unwrap_err();
    assert!(matches!(err, ReconcileError::UnknownSourceTag(ref tag) if tag == "finance"));
}

#[test]
fn test_snapshot_is_stable_and_sorted() {
    let file = write_temp_config(r#"{"week_anchor_date": "2026-02-11", "issue_rule": "line_issue_flag = true"}"#);
    let manager = ConfigManager::from_file(file.path()).unwrap();

    let snapshot = manager.get_config_snapshot().unwrap();
    assert_eq!(
        snapshot,
        r#"{"issue_rule":"line_issue_flag = true","week_anchor_date":"2026-02-11"}"#
    );
    assert_eq!(manager.source_path(), Some(file.path()));
}

#[test]
fn test_non_object_config_file_is_rejected() {
    let file = write_temp_config("[1, 2, 3]");
    assert!(ConfigManager::from_file(file.path()).is_err());
}
