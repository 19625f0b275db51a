// ==========================================
// 批次对账与周报系统 - 源记录领域模型
// ==========================================
// 职责: 生产/质检/发运三类源记录（已类型化，导入边界之后不再做列名访问）
// 用途: 导入层写入，引擎层只读
// ==========================================

use crate::domain::types::{InspectionResult, Severity, ShipStatus, SourceKind};
use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// 数据集内唯一的记录 ID（按清单顺序 + 行顺序分配，用作稳定的次级排序键）
pub type RecordId = u64;

// ==========================================
// 身份相关属性名
// ==========================================
pub mod attribute_names {
    pub const PART_NUMBER: &str = "part_number";
    pub const PRODUCTION_LINE: &str = "production_line";
    pub const SHIFT: &str = "shift";
    pub const CUSTOMER: &str = "customer";
    pub const SALES_ORDER: &str = "sales_order";
    pub const INSPECTION_TYPE: &str = "inspection_type";
    pub const SHIP_STATUS: &str = "ship_status";
}

// ==========================================
// SourceRef - 溯源信息
// ==========================================
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct SourceRef {
    pub file: String,          // 源文件名
    pub sheet: Option<String>, // 工作表（CSV 为 None）
    pub row: usize,            // 源文件行号（表头为第 1 行）
}

impl SourceRef {
    pub fn new(file: impl Into<String>, sheet: Option<String>, row: usize) -> Self {
        Self {
            file: file.into(),
            sheet,
            row,
        }
    }
}

// ==========================================
// ProductionRecord - 生产记录
// ==========================================
// 与 CanonicalLot 多对一（返工会产生多条）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProductionRecord {
    pub record_id: RecordId,
    pub source_ref: SourceRef,
    pub raw_lot_id: String,
    pub provided_lot_key: Option<String>, // 源系统自带的"已归一"批次号（可能与计算结果冲突）

    pub production_date: Option<NaiveDate>, // None = 日期缺失或无法解析
    pub date_error: Option<String>,         // 日期问题原因（溯源展示用）

    pub line: String,
    pub part_number: Option<String>,
    pub shift: Option<String>,
    pub planned_units: Option<u32>,
    pub actual_units: Option<u32>,
    pub downtime_minutes: f64,
    pub line_issue_flag: bool,
    pub issue_category: Option<String>, // 主要问题分类
    pub issue_text: Option<String>,     // 问题描述（自由文本）
    pub note: Option<String>,
}

impl ProductionRecord {
    /// 计划 - 实际（缺失按 0）
    pub fn unit_shortfall(&self) -> i64 {
        let planned = self.planned_units.unwrap_or(0) as i64;
        let actual = self.actual_units.unwrap_or(0) as i64;
        planned - actual
    }
}

// ==========================================
// DefectType / DefectInstance - 缺陷
// ==========================================
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DefectType {
    pub code: String,
    pub category: String,
    pub default_severity: Option<Severity>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DefectInstance {
    pub defect_type: DefectType,
    pub quantity: u32, // 正数（导入层保证）
    pub severity_override: Option<Severity>,
}

impl DefectInstance {
    /// 生效严重度（覆盖值优先）
    pub fn effective_severity(&self) -> Option<Severity> {
        self.severity_override.or(self.defect_type.default_severity)
    }
}

// ==========================================
// InspectionRecord - 质检记录
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InspectionRecord {
    pub record_id: RecordId,
    pub source_ref: SourceRef,
    pub raw_lot_id: String,
    pub provided_lot_key: Option<String>,

    pub inspection_id: Option<String>,
    pub inspected_at: Option<DateTime<Utc>>, // None = 时间无法解析
    pub date_error: Option<String>,
    pub inspection_type: Option<String>,
    pub inspector: Option<String>,
    pub sample_size: Option<u32>,
    pub result: InspectionResult,
    pub part_number: Option<String>,
    pub defects: Vec<DefectInstance>,
    pub note: Option<String>,
}

impl InspectionRecord {
    pub fn inspected_on(&self) -> Option<NaiveDate> {
        self.inspected_at.map(|ts| ts.date_naive())
    }
}

// ==========================================
// ShipmentRecord / ShipmentLine - 发运记录
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShipmentLine {
    pub record_id: RecordId,
    pub source_ref: SourceRef,
    pub raw_lot_id: String,
    pub provided_lot_key: Option<String>,
    pub quantity: Option<u32>,
    pub part_number: Option<String>,
    pub note: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShipmentRecord {
    pub shipment_id: Option<String>,
    pub ship_date: Option<NaiveDate>,
    pub date_error: Option<String>,
    pub status: ShipStatus,
    pub customer: Option<String>,
    pub sales_order: Option<String>,
    pub lines: Vec<ShipmentLine>,
}

// ==========================================
// IdentityObservation - 身份解析输入元组
// ==========================================
// (raw identifier, source, source file, attribute snapshot)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IdentityObservation {
    pub record_id: RecordId,
    pub source: SourceKind,
    pub source_ref: SourceRef,
    pub raw_lot_id: String,
    pub provided_lot_key: Option<String>,
    pub attributes: BTreeMap<String, String>,
    pub observed_at: Option<DateTime<Utc>>,
    pub note: Option<String>,
}

// ==========================================
// SourceDataset - 单次运行的全部输入
// ==========================================
// 由导入层一次性物化，之后不可变
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SourceDataset {
    pub production: Vec<ProductionRecord>,
    pub inspections: Vec<InspectionRecord>,
    pub shipments: Vec<ShipmentRecord>,
}

impl SourceDataset {
    pub fn new() -> Self {
        Self::default()
    }

    /// 记录总数（发运按明细行计）
    pub fn record_count(&self) -> usize {
        self.production.len()
            + self.inspections.len()
            + self
                .shipments
                .iter()
                .map(|s| s.lines.len())
                .sum::<usize>()
    }

    /// 展开为身份解析输入（生产 → 质检 → 发运，各自保持源顺序）
    pub fn observations(&self) -> Vec<IdentityObservation> {
        let mut out = Vec::with_capacity(self.record_count());

        for record in &self.production {
            let mut attributes = BTreeMap::new();
            insert_attr(&mut attributes, attribute_names::PRODUCTION_LINE, Some(&record.line));
            insert_attr(&mut attributes, attribute_names::PART_NUMBER, record.part_number.as_ref());
            insert_attr(&mut attributes, attribute_names::SHIFT, record.shift.as_ref());

            out.push(IdentityObservation {
                record_id: record.record_id,
                source: SourceKind::Production,
                source_ref: record.source_ref.clone(),
                raw_lot_id: record.raw_lot_id.clone(),
                provided_lot_key: record.provided_lot_key.clone(),
                attributes,
                observed_at: record.production_date.and_then(start_of_day),
                note: record.note.clone(),
            });
        }

        for record in &self.inspections {
            let mut attributes = BTreeMap::new();
            insert_attr(&mut attributes, attribute_names::PART_NUMBER, record.part_number.as_ref());
            insert_attr(
                &mut attributes,
                attribute_names::INSPECTION_TYPE,
                record.inspection_type.as_ref(),
            );

            out.push(IdentityObservation {
                record_id: record.record_id,
                source: SourceKind::Quality,
                source_ref: record.source_ref.clone(),
                raw_lot_id: record.raw_lot_id.clone(),
                provided_lot_key: record.provided_lot_key.clone(),
                attributes,
                observed_at: record.inspected_at,
                note: record.note.clone(),
            });
        }

        for shipment in &self.shipments {
            for line in &shipment.lines {
                let mut attributes = BTreeMap::new();
                insert_attr(&mut attributes, attribute_names::PART_NUMBER, line.part_number.as_ref());
                insert_attr(&mut attributes, attribute_names::CUSTOMER, shipment.customer.as_ref());
                insert_attr(
                    &mut attributes,
                    attribute_names::SALES_ORDER,
                    shipment.sales_order.as_ref(),
                );
                attributes.insert(
                    attribute_names::SHIP_STATUS.to_string(),
                    shipment.status.as_str().to_string(),
                );

                out.push(IdentityObservation {
                    record_id: line.record_id,
                    source: SourceKind::Shipping,
                    source_ref: line.source_ref.clone(),
                    raw_lot_id: line.raw_lot_id.clone(),
                    provided_lot_key: line.provided_lot_key.clone(),
                    attributes,
                    observed_at: shipment.ship_date.and_then(start_of_day),
                    note: line.note.clone(),
                });
            }
        }

        out
    }
}

fn insert_attr(map: &mut BTreeMap<String, String>, name: &str, value: Option<&String>) {
    if let Some(v) = value {
        let trimmed = v.trim();
        if !trimmed.is_empty() {
            map.insert(name.to_string(), trimmed.to_string());
        }
    }
}

/// 日期 → 当日 00:00 UTC
pub fn start_of_day(date: NaiveDate) -> Option<DateTime<Utc>> {
    date.and_hms_opt(0, 0, 0)
        .map(|naive| Utc.from_utc_datetime(&naive))
}
