// ==========================================
// 批次对账与周报系统 - 导入清单与数据集组装
// ==========================================
// 职责: 导入清单、单文件导入结果、同单据多行合并、数据集组装
// 红线: 记录 ID 按 清单顺序 → 行顺序 全局分配，保证多次运行结果一致
// ==========================================

use crate::domain::import::{DqLevel, DqViolation, ImportReport};
use crate::domain::records::{
    InspectionRecord, ProductionRecord, RecordId, ShipmentRecord, SourceDataset,
};
use crate::domain::types::SourceKind;
use crate::engine::error::ReconcileResult;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tracing::debug;

// ==========================================
// ImportManifest - 导入清单
// ==========================================
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManifestEntry {
    pub source_tag: String, // production / quality / shipping
    pub path: PathBuf,
    pub sheet: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImportManifest {
    pub entries: Vec<ManifestEntry>,
}

impl ImportManifest {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_source(
        mut self,
        source_tag: impl Into<String>,
        path: impl AsRef<Path>,
        sheet: Option<&str>,
    ) -> Self {
        self.entries.push(ManifestEntry {
            source_tag: source_tag.into(),
            path: path.as_ref().to_path_buf(),
            sheet: sheet.map(str::to_string),
        });
        self
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// 解析全部来源标签（任一未知标签即失败，须在读取任何文件之前调用）
    pub fn resolve(&self) -> ReconcileResult<Vec<(SourceKind, &ManifestEntry)>> {
        self.entries
            .iter()
            .map(|entry| {
                let kind: SourceKind = entry.source_tag.parse()?;
                Ok((kind, entry))
            })
            .collect()
    }
}

// ==========================================
// SourceBatch - 单文件导入结果
// ==========================================
#[derive(Debug, Clone)]
pub enum SourceRecords {
    Production(Vec<ProductionRecord>),
    Quality(Vec<InspectionRecord>),
    Shipping(Vec<ShipmentRecord>),
}

impl SourceRecords {
    pub fn len(&self) -> usize {
        match self {
            SourceRecords::Production(records) => records.len(),
            SourceRecords::Quality(records) => records.len(),
            SourceRecords::Shipping(records) => records.iter().map(|s| s.lines.len()).sum(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// 单文件导入结果（record_id 尚未分配）
#[derive(Debug, Clone)]
pub struct SourceBatch {
    pub records: SourceRecords,
    pub report: ImportReport,
}

/// 全部导入结果
#[derive(Debug, Clone)]
pub struct ImportOutcome {
    pub dataset: SourceDataset,
    pub reports: Vec<ImportReport>,
}

impl ImportOutcome {
    pub fn total_blocked(&self) -> usize {
        self.reports.iter().map(|r| r.summary.blocked).sum()
    }

    pub fn violations(&self) -> impl Iterator<Item = (&ImportReport, &DqViolation)> {
        self.reports
            .iter()
            .flat_map(|report| report.violations.iter().map(move |v| (report, v)))
    }
}

// ==========================================
// 数据集组装
// ==========================================

/// 按清单顺序组装数据集并分配全局记录 ID（从 1 开始）
pub fn assemble_dataset(batches: Vec<SourceBatch>) -> ImportOutcome {
    let mut dataset = SourceDataset::new();
    let mut reports = Vec::with_capacity(batches.len());
    let mut next_id: RecordId = 1;
    let mut take_id = || {
        let id = next_id;
        next_id += 1;
        id
    };

    for batch in batches {
        match batch.records {
            SourceRecords::Production(records) => {
                for mut record in records {
                    record.record_id = take_id();
                    dataset.production.push(record);
                }
            }
            SourceRecords::Quality(records) => {
                for mut record in records {
                    record.record_id = take_id();
                    dataset.inspections.push(record);
                }
            }
            SourceRecords::Shipping(records) => {
                for mut shipment in records {
                    for line in shipment.lines.iter_mut() {
                        line.record_id = take_id();
                    }
                    dataset.shipments.push(shipment);
                }
            }
        }
        reports.push(batch.report);
    }

    debug!(
        production = dataset.production.len(),
        inspections = dataset.inspections.len(),
        shipments = dataset.shipments.len(),
        "数据集组装完成"
    );

    ImportOutcome { dataset, reports }
}

// ==========================================
// 同单据多行合并
// ==========================================

fn same_lot(a: &str, b: &str) -> bool {
    a.trim().eq_ignore_ascii_case(b.trim())
}

fn same_value(a: &Option<String>, b: &Option<String>) -> bool {
    let a = a.as_deref().map(str::trim).filter(|v| !v.is_empty());
    let b = b.as_deref().map(str::trim).filter(|v| !v.is_empty());
    a == b
}

/// 两行身份观测完全一致（原始批次号、零件号、源系统批次号）才可合并
fn identity_mismatch(head: &InspectionRecord, row: &InspectionRecord) -> Option<&'static str> {
    if !same_value(&head.part_number, &row.part_number) {
        return Some("part_number");
    }
    if !same_value(&head.provided_lot_key, &row.provided_lot_key) {
        return Some("provided_lot_key");
    }
    if head.raw_lot_id != row.raw_lot_id {
        return Some("raw_lot_id");
    }
    None
}

/// 同一 inspection_id 的多行合并为一条质检记录（缺陷累加）
///
/// 只合并身份观测完全一致的行；其余行保留为独立记录，
/// 让身份解析看到每一种写法和属性值：
/// - 批次号不同 → 冲突
/// - 零件号 / 源系统批次号不同 → 冲突
/// - 仅写法不同（同一批次）→ 独立记录，不记 DQ
///
/// 质检结果不一致时以首行为准，同样记冲突。
pub fn group_inspections(
    rows: Vec<InspectionRecord>,
    dq: &mut Vec<DqViolation>,
) -> Vec<InspectionRecord> {
    let mut grouped: Vec<InspectionRecord> = Vec::with_capacity(rows.len());
    let mut index_by_id: HashMap<String, usize> = HashMap::new();

    for row in rows {
        let Some(inspection_id) = row.inspection_id.clone() else {
            grouped.push(row);
            continue;
        };

        let Some(idx) = index_by_id.get(&inspection_id).copied() else {
            index_by_id.insert(inspection_id, grouped.len());
            grouped.push(row);
            continue;
        };

        let head = &grouped[idx];
        if !same_lot(&head.raw_lot_id, &row.raw_lot_id) {
            dq.push(DqViolation::new(
                row.source_ref.row,
                Some(&row.raw_lot_id),
                DqLevel::Conflict,
                "inspection_id",
                format!(
                    "检验单 {} 的批次号与首行（第 {} 行）{:?} 不同，按独立记录处理",
                    inspection_id, head.source_ref.row, head.raw_lot_id
                ),
            ));
            grouped.push(row);
            continue;
        }

        match identity_mismatch(head, &row) {
            Some("raw_lot_id") => grouped.push(row),
            Some(field) => {
                let (head_value, row_value) = match field {
                    "part_number" => (&head.part_number, &row.part_number),
                    _ => (&head.provided_lot_key, &row.provided_lot_key),
                };
                dq.push(DqViolation::new(
                    row.source_ref.row,
                    Some(&row.raw_lot_id),
                    DqLevel::Conflict,
                    field,
                    format!(
                        "检验单 {} 的 {} {:?} 与首行（第 {} 行）{:?} 不一致，按独立记录处理",
                        inspection_id,
                        field,
                        row_value.as_deref().unwrap_or(""),
                        head.source_ref.row,
                        head_value.as_deref().unwrap_or("")
                    ),
                ));
                grouped.push(row);
            }
            None => {
                let head = &mut grouped[idx];
                if head.result != row.result {
                    dq.push(DqViolation::new(
                        row.source_ref.row,
                        Some(&row.raw_lot_id),
                        DqLevel::Conflict,
                        "result",
                        format!(
                            "检验单 {} 的质检结果 {} 与首行（第 {} 行）{} 不一致，以首行为准",
                            inspection_id, row.result, head.source_ref.row, head.result
                        ),
                    ));
                }
                head.defects.extend(row.defects);
                merge_note(&mut head.note, row.note);
            }
        }
    }

    grouped
}

/// 合并备注（去重，按出现顺序以 "; " 连接）
fn merge_note(head: &mut Option<String>, extra: Option<String>) {
    let Some(extra) = extra.map(|n| n.trim().to_string()).filter(|n| !n.is_empty()) else {
        return;
    };
    match head {
        Some(existing) if existing.split("; ").any(|n| n == extra) => {}
        Some(existing) => {
            existing.push_str("; ");
            existing.push_str(&extra);
        }
        None => *head = Some(extra),
    }
}

/// 同一 shipment_id 且表头字段一致的多行合并为一张发运单
pub fn group_shipments(rows: Vec<ShipmentRecord>, dq: &mut Vec<DqViolation>) -> Vec<ShipmentRecord> {
    let mut grouped: Vec<ShipmentRecord> = Vec::with_capacity(rows.len());
    let mut index_by_id: HashMap<String, usize> = HashMap::new();

    for row in rows {
        let Some(shipment_id) = row.shipment_id.clone() else {
            grouped.push(row);
            continue;
        };

        match index_by_id.get(&shipment_id) {
            Some(&idx) => {
                let head = &grouped[idx];
                let consistent = head.ship_date == row.ship_date
                    && head.status == row.status
                    && head.customer == row.customer
                    && head.sales_order == row.sales_order;

                if consistent {
                    grouped[idx].lines.extend(row.lines);
                } else {
                    let head_row = head.lines.first().map(|l| l.source_ref.row).unwrap_or(0);
                    for line in &row.lines {
                        dq.push(DqViolation::new(
                            line.source_ref.row,
                            Some(&line.raw_lot_id),
                            DqLevel::Conflict,
                            "shipment_id",
                            format!(
                                "发运单 {} 的日期/状态/客户与首行（第 {} 行）不一致，按独立发运处理",
                                shipment_id, head_row
                            ),
                        ));
                    }
                    grouped.push(row);
                }
            }
            None => {
                index_by_id.insert(shipment_id, grouped.len());
                grouped.push(row);
            }
        }
    }

    grouped
}
