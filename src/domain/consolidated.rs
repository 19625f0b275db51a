// ==========================================
// 批次对账与周报系统 - 批次合并视图
// ==========================================
// 职责: 每个规范批次一份 ConsolidatedLotView（最新质检 / 发运汇总 / 生产指标 / 合规指示）
// 用途: 关联层写入，汇总层与导出层只读
// ==========================================

use crate::domain::lot::{ConflictRecord, ReviewReason};
use crate::domain::records::{InspectionRecord, ProductionRecord, RecordId, SourceRef};
use crate::domain::types::{ComplianceIndicator, InspectionResult, LifecycleStage, ShipStatus};
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

// ==========================================
// InspectionSummary - 最新质检摘要
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InspectionSummary {
    pub record_id: RecordId,
    pub inspected_at: Option<DateTime<Utc>>,
    pub result: InspectionResult,
    pub inspection_type: Option<String>,
    pub inspector: Option<String>,
    pub source_ref: SourceRef,
}

// ==========================================
// LinkedShipmentLine - 已关联的发运明细
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LinkedShipmentLine {
    pub record_id: RecordId,
    pub shipment_id: Option<String>,
    pub ship_date: Option<NaiveDate>,
    pub status: ShipStatus,
    pub quantity: Option<u32>,
    pub raw_lot_id: String,
    pub source_ref: SourceRef,
}

// ==========================================
// ShipmentRollup - 发运汇总
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShipmentRollup {
    pub has_shipped: bool,                  // 任一状态为 Shipped/Partial
    pub has_hold: bool,                     // 任一状态为 On Hold
    pub active_hold: bool,                  // 最新状态为 On Hold
    pub latest_status: Option<ShipStatus>,  // 按发运日期取最新
    pub latest_ship_date: Option<NaiveDate>,
    pub status_label: String,               // 无发运时为占位标签，永不为空
    pub total_quantity: u64,
    pub line_ids: Vec<RecordId>,
}

// ==========================================
// ProductionMetrics - 生产指标
// ==========================================
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProductionMetrics {
    pub run_count: usize,
    pub issue_flag_runs: usize,
    pub planned_units: u64,
    pub actual_units: u64,
    pub downtime_minutes: f64,
    pub lines: BTreeSet<String>,
    pub part_numbers: BTreeSet<String>,
    pub first_production_date: Option<NaiveDate>,
    pub last_production_date: Option<NaiveDate>,
}

// ==========================================
// ConsolidatedLotView - 批次合并视图
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConsolidatedLotView {
    pub canonical_key: String,
    pub raw_aliases: Vec<String>,
    pub stage: LifecycleStage,
    pub needs_review: bool,
    pub review_reasons: Vec<ReviewReason>,
    pub conflicts: Vec<ConflictRecord>,

    pub latest_inspection: Option<InspectionSummary>,
    pub shipment: ShipmentRollup,
    pub production: ProductionMetrics,
    pub compliance: ComplianceIndicator,
    pub is_problematic_but_shipped: bool,

    // 下钻用明细（汇总层不重新查源数据）
    pub production_runs: Vec<ProductionRecord>,
    pub inspections: Vec<InspectionRecord>,
    pub shipment_lines: Vec<LinkedShipmentLine>,
}

impl ConsolidatedLotView {
    pub fn latest_result(&self) -> Option<InspectionResult> {
        self.latest_inspection.as_ref().map(|i| i.result)
    }

    pub fn latest_inspected_at(&self) -> Option<DateTime<Utc>> {
        self.latest_inspection.as_ref().and_then(|i| i.inspected_at)
    }
}

// ==========================================
// LinkedDataset - 关联层输出
// ==========================================
// 全量视图保留给导出；aggregation_scope() 才是进入汇总的口径
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LinkedDataset {
    pub views: BTreeMap<String, ConsolidatedLotView>,
    pub include_needs_review: bool,
    pub missing_shipping_label: String,
}

impl LinkedDataset {
    pub fn view(&self, key: &str) -> Option<&ConsolidatedLotView> {
        self.views.get(key)
    }

    /// 进入汇总的视图（默认排除需复核批次）
    pub fn aggregation_scope(&self) -> impl Iterator<Item = &ConsolidatedLotView> {
        let include = self.include_needs_review;
        self.views
            .values()
            .filter(move |view| include || !view.needs_review)
    }

    /// 被排除在汇总之外的批次
    pub fn excluded_keys(&self) -> Vec<&str> {
        if self.include_needs_review {
            return Vec::new();
        }
        self.views
            .values()
            .filter(|view| view.needs_review)
            .map(|view| view.canonical_key.as_str())
            .collect()
    }
}
