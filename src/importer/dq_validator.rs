// ==========================================
// 批次对账与周报系统 - 数据质量校验器实现
// ==========================================
// 职责: 已类型化记录的 DQ 校验 + DQ 汇总
// 红线: 校验只产出违规记录，不修改、不丢弃记录
// ==========================================

use crate::domain::import::{DqLevel, DqSummary, DqViolation};
use crate::domain::records::{InspectionRecord, ProductionRecord, ShipmentRecord};
use crate::domain::types::InspectionResult;
use std::collections::BTreeSet;

/// 停机时长异常阈值（分钟，超过一整天视为录入错误）
pub const DEFAULT_DOWNTIME_ANOMALY_MINUTES: f64 = 24.0 * 60.0;

pub struct DqValidator {
    downtime_anomaly_minutes: f64,
}

impl Default for DqValidator {
    fn default() -> Self {
        Self::new(DEFAULT_DOWNTIME_ANOMALY_MINUTES)
    }
}

impl DqValidator {
    pub fn new(downtime_anomaly_minutes: f64) -> Self {
        Self {
            downtime_anomaly_minutes,
        }
    }

    /// 校验生产记录
    pub fn validate_production(&self, records: &[ProductionRecord]) -> Vec<DqViolation> {
        let mut violations = Vec::new();

        for record in records {
            let row = record.source_ref.row;
            let lot = Some(record.raw_lot_id.as_str());

            if record.raw_lot_id.trim().is_empty() {
                violations.push(missing_lot(row));
            }

            if let Some(reason) = &record.date_error {
                violations.push(DqViolation::new(
                    row,
                    lot,
                    DqLevel::Warning,
                    "production_date",
                    format!("生产日期不可用（{}），该记录不计入任何周", reason),
                ));
            }

            if record.line.trim().is_empty() {
                violations.push(DqViolation::new(
                    row,
                    lot,
                    DqLevel::Warning,
                    "production_line",
                    "产线为空，周报中归入 Unspecified",
                ));
            }

            if record.downtime_minutes < 0.0 {
                violations.push(DqViolation::new(
                    row,
                    lot,
                    DqLevel::Warning,
                    "downtime_minutes",
                    format!("停机时长为负: {:.1}", record.downtime_minutes),
                ));
            } else if record.downtime_minutes > self.downtime_anomaly_minutes {
                violations.push(DqViolation::new(
                    row,
                    lot,
                    DqLevel::Warning,
                    "downtime_minutes",
                    format!(
                        "停机时长异常: {:.1} > {:.1}",
                        record.downtime_minutes, self.downtime_anomaly_minutes
                    ),
                ));
            }

            if let (Some(planned), Some(actual)) = (record.planned_units, record.actual_units) {
                if actual > planned {
                    violations.push(DqViolation::new(
                        row,
                        lot,
                        DqLevel::Info,
                        "actual_units",
                        format!("实际产量 {} 大于计划 {}", actual, planned),
                    ));
                }
            }
        }

        violations
    }

    /// 校验质检记录
    pub fn validate_inspections(&self, records: &[InspectionRecord]) -> Vec<DqViolation> {
        let mut violations = Vec::new();

        for record in records {
            let row = record.source_ref.row;
            let lot = Some(record.raw_lot_id.as_str());

            if record.raw_lot_id.trim().is_empty() {
                violations.push(missing_lot(row));
            }

            if let Some(reason) = &record.date_error {
                violations.push(DqViolation::new(
                    row,
                    lot,
                    DqLevel::Warning,
                    "inspected_at",
                    format!("检验时间不可用（{}），缺陷不计入任何周", reason),
                ));
            }

            if record.result == InspectionResult::Fail && record.defects.is_empty() {
                violations.push(DqViolation::new(
                    row,
                    lot,
                    DqLevel::Info,
                    "defect_category",
                    "检验不合格但未登记缺陷",
                ));
            }
        }

        violations
    }

    /// 校验发运记录（按明细行）
    pub fn validate_shipments(&self, records: &[ShipmentRecord]) -> Vec<DqViolation> {
        let mut violations = Vec::new();

        for shipment in records {
            for line in &shipment.lines {
                let row = line.source_ref.row;

                if line.raw_lot_id.trim().is_empty() {
                    violations.push(missing_lot(row));
                }

                if let Some(reason) = &shipment.date_error {
                    violations.push(DqViolation::new(
                        row,
                        Some(&line.raw_lot_id),
                        DqLevel::Warning,
                        "ship_date",
                        format!("发运日期不可用（{}），排序时视为最早", reason),
                    ));
                }
            }
        }

        violations
    }

    /// 生成 DQ 汇总（按行计数）
    ///
    /// # 参数
    /// - total_rows: 解析出的非空行数
    /// - rejected_rows: 被拒绝（未进入数据集）的行号
    /// - violations: 全部违规记录
    pub fn summarize(
        &self,
        total_rows: usize,
        rejected_rows: &BTreeSet<usize>,
        violations: &[DqViolation],
    ) -> DqSummary {
        let rows_with = |level: DqLevel| {
            violations
                .iter()
                .filter(|v| v.level == level)
                .map(|v| v.row_number)
                .collect::<BTreeSet<_>>()
                .len()
        };

        DqSummary {
            total_rows,
            success: total_rows.saturating_sub(rejected_rows.len()),
            blocked: rejected_rows.len(),
            warning: rows_with(DqLevel::Warning),
            conflict: rows_with(DqLevel::Conflict),
        }
    }
}

fn missing_lot(row: usize) -> DqViolation {
    DqViolation::new(
        row,
        None,
        DqLevel::Warning,
        "raw_lot_id",
        "批次号为空，该记录将进入无法关联集合",
    )
}
