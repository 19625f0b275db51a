// ==========================================
// 对账 + 周报端到端测试
// ==========================================
// 测试目标: 归一 → 身份解析 → 关联 → 周报 全流程
// 覆盖: 三源别名归一、L0T 笔误、合规 fail-closed、复核排除、
//       产线排名、缺陷周环比、下钻、冲突、可重复性
// ==========================================


use lot_reconcile::config::{config_keys, ConfigManager, ReconcileConfig};
use lot_reconcile::domain::lot::{ConflictKind, ReviewReason};
use lot_reconcile::domain::types::{
    ComplianceIndicator, InspectionResult, LifecycleStage, ShipStatus, SourceKind,
    TrendDirection,
};
use lot_reconcile::engine::TrendKind;
use lot_reconcile::export::{export_weekly_summary_csv, ExportMetadata};
use lot_reconcile::ReconcileOrchestrator;
use serde_json::Value;
use std::sync::Arc;
use test_helpers::{anchor, date, default_config, run_clock, DatasetBuilder};

fn orchestrator(config: ReconcileConfig) -> ReconcileOrchestrator {
    lot_reconcile::logging::init_test();
    ReconcileOrchestrator::new(Arc::new(config))
}

// ==========================================
// 身份归一
// ==========================================

#[test]
fn test_three_source_spellings_resolve_to_one_lot() {
    let dataset = DatasetBuilder::new()
        .production("lot-2026-0001", "Line A", date(2026, 2, 10))
        .inspection("LOT2026_0001", InspectionResult::Pass, date(2026, 2, 11), &[])
        .shipment(" Lot 2026 0001 ", ShipStatus::Shipped, date(2026, 2, 12))
        .build();

    let result = orchestrator(default_config()).run(&dataset, run_clock());

    assert_eq!(result.identities.lots.len(), 1);
    let lot = result.identities.lot("LOT-2026-0001").expect("lot should exist");
    assert_eq!(lot.aliases.len(), 3);
    assert_eq!(
        lot.sources().into_iter().collect::<Vec<_>>(),
        vec![SourceKind::Production, SourceKind::Quality, SourceKind::Shipping]
    );
    assert_eq!(lot.stage, LifecycleStage::Shipped);
    assert!(!lot.needs_review, "reasons: {:?}", lot.review_reasons);
    assert!(result.identities.unlinked.is_empty());

    let view = result.linked.view("LOT-2026-0001").unwrap();
    assert_eq!(view.compliance, ComplianceIndicator::Green);
    assert_eq!(view.shipment.status_label, "Shipped");
}

#[test]
fn test_l0t_typo_links_across_sources() {
    let dataset = DatasetBuilder::new()
        .production("LOT-2026-0002", "Line A", date(2026, 2, 10))
        .inspection("LOT-2026-0002", InspectionResult::Pass, date(2026, 2, 10), &[])
        .shipment("L0T-2026-0002", ShipStatus::Shipped, date(2026, 2, 12))
        .build();

    let result = orchestrator(default_config()).run(&dataset, run_clock());

    assert_eq!(result.identities.lots.len(), 1);
    let lot = result.identities.lot("LOT-2026-0002").unwrap();
    assert!(lot.alias(SourceKind::Shipping, "L0T-2026-0002").is_some());
    assert_eq!(lot.stage, LifecycleStage::Shipped);
}

#[test]
fn test_repeated_raw_identifier_updates_single_alias() {
    let dataset = DatasetBuilder::new()
        .production("LOT-2026-0003", "Line A", date(2026, 2, 9))
        .production("LOT-2026-0003", "Line A", date(2026, 2, 11))
        .build();

    let result = orchestrator(default_config()).run(&dataset, run_clock());

    let lot = result.identities.lot("LOT-2026-0003").unwrap();
    assert_eq!(lot.aliases.len(), 1);
    let alias = &lot.aliases[0];
    assert_eq!(alias.occurrences, 2);
    assert_eq!(alias.first_seen.date_naive(), date(2026, 2, 9));
    assert_eq!(alias.last_seen.date_naive(), date(2026, 2, 11));
    assert_eq!(alias.source_ref.row, 2);
    assert_eq!(alias.last_source_ref.row, 3);
}

#[test]
fn test_blank_identifier_goes_to_unlinked_and_run_continues() {
    let dataset = DatasetBuilder::new()
        .production("   ", "Line A", date(2026, 2, 10))
        .production("LOT-2026-0004", "Line A", date(2026, 2, 10))
        .build();

    let result = orchestrator(default_config()).run(&dataset, run_clock());

    assert_eq!(result.identities.lots.len(), 1);
    assert_eq!(result.identities.unlinked.len(), 1);
    let unlinked = &result.identities.unlinked[0];
    assert_eq!(unlinked.source, SourceKind::Production);
    assert_eq!(unlinked.source_ref.file, "production.csv");
    assert_eq!(unlinked.source_ref.row, 2);
    assert!(!unlinked.reason.is_empty());
    // 每条记录要么关联到批次，要么进入无法关联集合
    assert_eq!(
        result.identities.record_links.len() + result.identities.unlinked.len(),
        dataset.record_count()
    );
}

// ==========================================
// 合规 / 占位标签
// ==========================================

#[test]
fn test_failed_lot_without_shipment_is_red_with_placeholder() {
    let dataset = DatasetBuilder::new()
        .production("LOT-2026-0005", "Line A", date(2026, 2, 10))
        .inspection("LOT-2026-0005", InspectionResult::Fail, date(2026, 2, 11), &[])
        .build();

    let result = orchestrator(default_config()).run(&dataset, run_clock());

    let view = result.linked.view("LOT-2026-0005").unwrap();
    assert_eq!(view.compliance, ComplianceIndicator::Red);
    assert_eq!(view.shipment.status_label, "Not Found / Not Shipped Yet");
    assert!(!view.shipment.has_shipped);
}

#[test]
fn test_lot_without_inspection_is_never_green() {
    let dataset = DatasetBuilder::new()
        .production("LOT-2026-0006", "Line A", date(2026, 2, 10))
        .shipment("LOT-2026-0006", ShipStatus::Shipped, date(2026, 2, 12))
        .build();

    let result = orchestrator(default_config()).run(&dataset, run_clock());

    let view = result.linked.view("LOT-2026-0006").unwrap();
    assert!(view.latest_inspection.is_none());
    assert_eq!(view.compliance, ComplianceIndicator::Red);
}

#[tokio::test]
async fn test_configured_placeholder_label_is_used() {
    let mut manager = ConfigManager::new();
    manager.set_config_value(
        config_keys::MISSING_SHIPPING_LABEL,
        Value::String("未发运".to_string()),
    );
    let config = ReconcileConfig::load(&manager, anchor()).await.unwrap();

    let dataset = DatasetBuilder::new()
        .production("LOT-2026-0007", "Line A", date(2026, 2, 10))
        .build();

    let result = orchestrator(config).run(&dataset, run_clock());

    assert_eq!(
        result.linked.view("LOT-2026-0007").unwrap().shipment.status_label,
        "未发运"
    );
}

// ==========================================
// 冲突 / 复核
// ==========================================

#[test]
fn test_part_number_conflict_is_preserved_and_flagged() {
    let dataset = DatasetBuilder::new()
        .production_with("LOT-2026-0008", "Line A", date(2026, 2, 10), |r| {
            r.part_number = Some("P-100".to_string());
        })
        .inspection_with(
            "LOT-2026-0008",
            InspectionResult::Pass,
            date(2026, 2, 11),
            &[],
            |i| i.part_number = Some("P-200".to_string()),
        )
        .build();

    let result = orchestrator(default_config()).run(&dataset, run_clock());

    assert_eq!(result.identities.conflicts.len(), 1);
    let conflict = &result.identities.conflicts[0];
    assert_eq!(conflict.kind, ConflictKind::AttributeMismatch);
    assert_eq!(conflict.attribute, "part_number");
    assert_eq!(conflict.value_strings(), vec!["P-100", "P-200"]);
    assert_eq!(
        conflict.sources().into_iter().collect::<Vec<_>>(),
        vec![SourceKind::Production, SourceKind::Quality]
    );

    let lot = result.identities.lot("LOT-2026-0008").unwrap();
    assert!(lot.needs_review);
    assert!(lot
        .review_reasons
        .iter()
        .any(|r| matches!(r, ReviewReason::Conflict { .. })));
}

#[test]
fn test_conflict_is_symmetric_regardless_of_ingestion_order() {
    let forward = DatasetBuilder::new()
        .production_with("LOT-2026-0009", "Line A", date(2026, 2, 10), |r| {
            r.part_number = Some("P-100".to_string());
        })
        .shipment_with("LOT-2026-0009", ShipStatus::Shipped, date(2026, 2, 12), |s| {
            s.lines[0].part_number = Some("P-300".to_string());
        })
        .build();
    let backward = DatasetBuilder::new()
        .shipment_with("LOT-2026-0009", ShipStatus::Shipped, date(2026, 2, 12), |s| {
            s.lines[0].part_number = Some("P-300".to_string());
        })
        .production_with("LOT-2026-0009", "Line A", date(2026, 2, 10), |r| {
            r.part_number = Some("P-100".to_string());
        })
        .build();

    let engine = orchestrator(default_config());
    let a = engine.run(&forward, run_clock());
    let b = engine.run(&backward, run_clock());

    assert_eq!(a.identities.conflicts.len(), 1);
    assert_eq!(
        a.identities.conflicts[0].value_strings(),
        b.identities.conflicts[0].value_strings()
    );
    assert_eq!(a.identities.conflicts[0].value_strings(), vec!["P-100", "P-300"]);
}

#[tokio::test]
async fn test_ship_status_conflict_is_opt_in() {
    let dataset = DatasetBuilder::new()
        .production("LOT-2026-0010", "Line A", date(2026, 2, 9))
        .inspection("LOT-2026-0010", InspectionResult::Pass, date(2026, 2, 10), &[])
        .shipment("LOT-2026-0010", ShipStatus::Shipped, date(2026, 2, 11))
        .shipment("LOT-2026-0010", ShipStatus::OnHold, date(2026, 2, 12))
        .build();

    // 默认属性列表不含发运状态
    let default_run = orchestrator(default_config()).run(&dataset, run_clock());
    assert!(default_run.identities.conflicts.is_empty());

    let mut manager = ConfigManager::new();
    manager.set_config_value(
        config_keys::IDENTITY_ATTRIBUTES,
        Value::String("part_number, production_line, ship_status".to_string()),
    );
    let config = ReconcileConfig::load(&manager, anchor()).await.unwrap();
    let result = orchestrator(config).run(&dataset, run_clock());

    let conflict = result
        .identities
        .conflicts_for("LOT-2026-0010")
        .find(|c| c.attribute == "ship_status")
        .expect("ship status conflict should be recorded");
    assert_eq!(conflict.kind, ConflictKind::AttributeMismatch);
    assert_eq!(conflict.value_strings(), vec!["On Hold", "Shipped"]);
    assert!(result.identities.lot("LOT-2026-0010").unwrap().needs_review);
}

#[test]
fn test_low_confidence_and_missing_source_lots_are_excluded_by_default() {
    let dataset = DatasetBuilder::new()
        // 形态不符
        .issue_run("BATCH-X", "Line A", date(2026, 2, 10), 15.0)
        // 只有质检没有生产（inspected 阶段需要 2 个来源）
        .inspection("LOT-2026-0010", InspectionResult::Fail, date(2026, 2, 10), &[("Scratch", 3)])
        // 正常批次
        .issue_run("LOT-2026-0011", "Line A", date(2026, 2, 10), 5.0)
        .build();

    let result = orchestrator(default_config()).run(&dataset, run_clock());

    let low = result.identities.lot("BATCH-X").unwrap();
    assert!(low
        .review_reasons
        .iter()
        .any(|r| matches!(r, ReviewReason::LowConfidenceIdentifier { .. })));
    let partial = result.identities.lot("LOT-2026-0010").unwrap();
    assert!(partial
        .review_reasons
        .iter()
        .any(|r| matches!(r, ReviewReason::MissingSources { expected: 2, .. })));

    let summary = &result.summary;
    assert_eq!(summary.included_lots, 1);
    assert_eq!(
        summary.excluded_lots,
        vec!["BATCH-X".to_string(), "LOT-2026-0010".to_string()]
    );
    assert_eq!(summary.ranking.len(), 1);
    assert_eq!(summary.ranking[0].issue_runs, 1);
    assert!(summary.defect_trends.is_empty());

    // 解析结果保留全部批次
    assert_eq!(result.linked.views.len(), 3);
}

#[tokio::test]
async fn test_include_needs_review_brings_flagged_lots_back() {
    let mut manager = ConfigManager::new();
    manager.set_config_value(config_keys::INCLUDE_NEEDS_REVIEW, Value::Bool(true));
    let config = ReconcileConfig::load(&manager, anchor()).await.unwrap();

    let dataset = DatasetBuilder::new()
        .issue_run("BATCH-X", "Line A", date(2026, 2, 10), 15.0)
        .issue_run("LOT-2026-0011", "Line A", date(2026, 2, 10), 5.0)
        .build();

    let result = orchestrator(config).run(&dataset, run_clock());

    assert_eq!(result.summary.included_lots, 2);
    assert!(result.summary.excluded_lots.is_empty());
    assert_eq!(result.summary.ranking[0].issue_runs, 2);
    assert_eq!(result.summary.ranking[0].downtime_minutes, 20.0);
}

// ==========================================
// 周报
// ==========================================

fn weekly_dataset() -> lot_reconcile::SourceDataset {
    DatasetBuilder::new()
        // Line A: 3 次问题运行
        .issue_run("LOT-2026-0101", "Line A", date(2026, 2, 9), 10.0)
        .issue_run("LOT-2026-0102", "Line A", date(2026, 2, 10), 20.0)
        .issue_run("LOT-2026-0103", "Line A", date(2026, 2, 15), 5.0)
        // Line B: 1 次问题运行 + 1 次正常运行
        .issue_run("LOT-2026-0201", "Line B", date(2026, 2, 11), 90.0)
        .production("LOT-2026-0202", "Line B", date(2026, 2, 12))
        // 上周的问题运行不计入排名
        .issue_run("LOT-2026-0301", "Line C", date(2026, 2, 5), 30.0)
        // Scratch: 本周 6 + 4，上周 4；Dent 只在上周出现
        .inspection("LOT-2026-0101", InspectionResult::Fail, date(2026, 2, 10), &[("Scratch", 6)])
        .inspection("LOT-2026-0102", InspectionResult::Fail, date(2026, 2, 14), &[("Scratch", 4)])
        .inspection("LOT-2026-0301", InspectionResult::Fail, date(2026, 2, 3), &[("Scratch", 4), ("Dent", 2)])
        .shipment("LOT-2026-0101", ShipStatus::Shipped, date(2026, 2, 13))
        .shipment("LOT-2026-0102", ShipStatus::OnHold, date(2026, 2, 13))
        .shipment("LOT-2026-0301", ShipStatus::Shipped, date(2026, 2, 6))
        .build()
}

#[test]
fn test_week_window_from_mid_week_anchor() {
    let result = orchestrator(default_config()).run(&weekly_dataset(), run_clock());

    assert_eq!(result.summary.window.start, date(2026, 2, 9));
    assert_eq!(result.summary.window.end, date(2026, 2, 15));
    assert_eq!(result.summary.previous_window.start, date(2026, 2, 2));
    assert_eq!(result.summary.previous_window.end, date(2026, 2, 8));
}

#[test]
fn test_line_ranking_lists_line_a_first() {
    let result = orchestrator(default_config()).run(&weekly_dataset(), run_clock());
    let ranking = &result.summary.ranking;

    assert_eq!(ranking.len(), 2, "Line C ran only last week");
    assert_eq!(ranking[0].line, "Line A");
    assert_eq!(ranking[0].rank, 1);
    assert_eq!(ranking[0].issue_runs, 3);
    assert_eq!(ranking[0].downtime_minutes, 35.0);
    assert_eq!(ranking[1].line, "Line B");
    assert_eq!(ranking[1].issue_runs, 1);
    assert_eq!(ranking[1].total_runs, 2);
    assert_eq!(ranking[1].unique_lots, 2);
}

#[test]
fn test_scratch_trend_delta_and_percentage() {
    let result = orchestrator(default_config()).run(&weekly_dataset(), run_clock());
    let trends = &result.summary.defect_trends;

    let scratch = trends.iter().find(|t| t.category == "Scratch").unwrap();
    assert_eq!(scratch.current_total, 10);
    assert_eq!(scratch.previous_total, 4);
    assert_eq!(scratch.delta, 6);
    assert_eq!(scratch.pct_change, Some(150.0));
    assert_eq!(scratch.direction, TrendDirection::Up);

    // 只在上周出现: 差值为上周总数的相反数，本周视为 0
    let dent = trends.iter().find(|t| t.category == "Dent").unwrap();
    assert_eq!(dent.current_total, 0);
    assert_eq!(dent.delta, -2);
    assert_eq!(dent.pct_change, Some(-100.0));

    assert_eq!(trends[0].category, "Scratch");
}

#[test]
fn test_drill_down_reproduces_ranked_counts() {
    let result = orchestrator(default_config()).run(&weekly_dataset(), run_clock());

    let line_a = result.line_drill_down("Line A", true);
    assert_eq!(line_a.len(), 3);
    assert!(line_a.iter().all(|row| row.line.as_deref() == Some("Line A")));
    assert_eq!(
        line_a.iter().map(|r| r.canonical_key.as_str()).collect::<Vec<_>>(),
        vec!["LOT-2026-0101", "LOT-2026-0102", "LOT-2026-0103"]
    );
    // 溯源字段完整
    assert!(line_a.iter().all(|row| row.source_ref.file == "production.csv"));
    assert!(line_a.iter().all(|row| row.raw_lot_id.is_some()));

    let held = line_a
        .iter()
        .find(|row| row.canonical_key == "LOT-2026-0102")
        .unwrap();
    assert_eq!(held.shipping_status_display, "On Hold");
    assert_eq!(held.compliance, ComplianceIndicator::Red);

    let shipped = line_a
        .iter()
        .find(|row| row.canonical_key == "LOT-2026-0101")
        .unwrap();
    assert!(shipped.is_problematic_but_shipped);

    let scratch = result.category_drill_down(TrendKind::Defect, "Scratch", true);
    let current: u64 = scratch
        .iter()
        .filter(|r| r.in_current_week)
        .map(|r| r.quantity)
        .sum();
    let previous: u64 = scratch
        .iter()
        .filter(|r| !r.in_current_week)
        .map(|r| r.quantity)
        .sum();
    assert_eq!((current, previous), (10, 4));
}

#[test]
fn test_issue_trend_uses_unspecified_category() {
    let result = orchestrator(default_config()).run(&weekly_dataset(), run_clock());

    let unspecified = result
        .summary
        .issue_trends
        .iter()
        .find(|t| t.category == "Unspecified")
        .unwrap();
    assert_eq!(unspecified.current_total, 4);
    assert_eq!(unspecified.previous_total, 1);
}

#[tokio::test]
async fn test_issue_rule_counts_failed_inspections() {
    let mut manager = ConfigManager::new();
    manager.set_config_value(
        config_keys::ISSUE_RULE,
        Value::String("line_issue_flag = true OR inspection_result = fail".to_string()),
    );
    let config = ReconcileConfig::load(&manager, anchor()).await.unwrap();

    let dataset = DatasetBuilder::new()
        .production("LOT-2026-0401", "Line D", date(2026, 2, 10))
        .inspection("LOT-2026-0401", InspectionResult::Fail, date(2026, 2, 11), &[])
        .production("LOT-2026-0402", "Line D", date(2026, 2, 10))
        .inspection("LOT-2026-0402", InspectionResult::Pass, date(2026, 2, 11), &[])
        .build();

    let result = orchestrator(config).run(&dataset, run_clock());

    assert_eq!(result.summary.ranking[0].line, "Line D");
    assert_eq!(result.summary.ranking[0].issue_runs, 1);
    assert_eq!(result.summary.ranking[0].total_runs, 2);
    assert_eq!(
        result.summary.issue_rule,
        "line_issue_flag = true OR inspection_result = fail"
    );
}

#[test]
fn test_undated_records_stay_linkable_but_leave_the_window() {
    let dataset = DatasetBuilder::new()
        .production_with("LOT-2026-0501", "Line A", date(2026, 2, 10), |r| {
            r.production_date = None;
            r.date_error = Some("无法解析的日期: \"31/31/2026\"".to_string());
            r.line_issue_flag = true;
        })
        .build();

    let result = orchestrator(default_config()).run(&dataset, run_clock());

    assert!(result.identities.lot("LOT-2026-0501").is_some());
    assert_eq!(result.summary.undated_records, 1);
    assert!(result.summary.ranking.is_empty());
}

// ==========================================
// 可重复性
// ==========================================

#[test]
fn test_repeated_runs_are_byte_identical() {
    let engine = orchestrator(default_config());
    let dataset = weekly_dataset();

    let first = engine.run(&dataset, run_clock());
    let second = engine.run(&dataset, run_clock());

    assert_eq!(first.summary, second.summary);
    assert_eq!(
        first.identities.needs_review_keys(),
        second.identities.needs_review_keys()
    );

    let metadata = ExportMetadata::new(run_clock());
    assert_eq!(
        export_weekly_summary_csv(&first.summary, &metadata).unwrap(),
        export_weekly_summary_csv(&second.summary, &metadata).unwrap()
    );
}
