// ==========================================
// 批次对账与周报系统 - 记录关联引擎
// ==========================================
// 职责: 源记录挂接到规范批次，生成 ConsolidatedLotView
// 合规规则: GREEN ⇔ 最新质检为 pass 且无生效暂扣；无质检 = RED（失败即关闭）
// 红线: 需复核批次的排除在这里（LinkedDataset::aggregation_scope）执行，不在解析层
// ==========================================

use crate::domain::consolidated::{
    ConsolidatedLotView, InspectionSummary, LinkedDataset, LinkedShipmentLine, ProductionMetrics,
    ShipmentRollup,
};
use crate::domain::lot::{CanonicalLot, ResolvedIdentities};
use crate::domain::records::{InspectionRecord, ProductionRecord, SourceDataset};
use crate::domain::types::{ComplianceIndicator, InspectionResult, ShipStatus};
use std::collections::BTreeMap;
use tracing::{info, instrument};

/// 无发运批次的默认占位标签
pub const DEFAULT_MISSING_SHIPPING_LABEL: &str = "Not Found / Not Shipped Yet";

// 单个批次挂接到的源记录
#[derive(Default)]
struct LotRecords<'a> {
    production: Vec<&'a ProductionRecord>,
    inspections: Vec<&'a InspectionRecord>,
    shipment_lines: Vec<LinkedShipmentLine>,
}

// ==========================================
// RecordLinker - 记录关联引擎
// ==========================================
pub struct RecordLinker {
    missing_shipping_label: String,
    include_needs_review: bool,
}

impl RecordLinker {
    pub fn new(missing_shipping_label: impl Into<String>, include_needs_review: bool) -> Self {
        Self {
            missing_shipping_label: missing_shipping_label.into(),
            include_needs_review,
        }
    }

    /// 生成全部批次的合并视图
    #[instrument(skip_all, fields(lots = resolved.lots.len()))]
    pub fn link(&self, resolved: &ResolvedIdentities, dataset: &SourceDataset) -> LinkedDataset {
        let mut grouped: BTreeMap<&str, LotRecords<'_>> = BTreeMap::new();

        for record in &dataset.production {
            if let Some(key) = resolved.lot_key_for(record.record_id) {
                grouped.entry(key).or_default().production.push(record);
            }
        }

        for record in &dataset.inspections {
            if let Some(key) = resolved.lot_key_for(record.record_id) {
                grouped.entry(key).or_default().inspections.push(record);
            }
        }

        for shipment in &dataset.shipments {
            for line in &shipment.lines {
                if let Some(key) = resolved.lot_key_for(line.record_id) {
                    grouped
                        .entry(key)
                        .or_default()
                        .shipment_lines
                        .push(LinkedShipmentLine {
                            record_id: line.record_id,
                            shipment_id: shipment.shipment_id.clone(),
                            ship_date: shipment.ship_date,
                            status: shipment.status,
                            quantity: line.quantity,
                            raw_lot_id: line.raw_lot_id.clone(),
                            source_ref: line.source_ref.clone(),
                        });
                }
            }
        }

        let mut views = BTreeMap::new();
        for (key, lot) in &resolved.lots {
            let records = grouped.remove(key.as_str()).unwrap_or_default();
            views.insert(key.clone(), self.build_view(lot, resolved, records));
        }

        let linked = LinkedDataset {
            views,
            include_needs_review: self.include_needs_review,
            missing_shipping_label: self.missing_shipping_label.clone(),
        };

        info!(
            views = linked.views.len(),
            in_scope = linked.aggregation_scope().count(),
            excluded = linked.excluded_keys().len(),
            include_needs_review = self.include_needs_review,
            "记录关联完成"
        );

        linked
    }

    fn build_view(
        &self,
        lot: &CanonicalLot,
        resolved: &ResolvedIdentities,
        records: LotRecords<'_>,
    ) -> ConsolidatedLotView {
        let LotRecords {
            production,
            inspections,
            mut shipment_lines,
        } = records;

        // 最新质检: 时间戳最大，同时间取 record_id 最大
        let latest_inspection = inspections
            .iter()
            .max_by_key(|r| (r.inspected_at, r.record_id))
            .map(|r| InspectionSummary {
                record_id: r.record_id,
                inspected_at: r.inspected_at,
                result: r.result,
                inspection_type: r.inspection_type.clone(),
                inspector: r.inspector.clone(),
                source_ref: r.source_ref.clone(),
            });

        shipment_lines.sort_by_key(|l| (l.ship_date, l.record_id));
        let shipment = self.rollup_shipments(&shipment_lines);
        let production_metrics = production_metrics(&production);

        let compliance = compliance_for(
            latest_inspection.as_ref().map(|i| i.result),
            shipment.active_hold,
        );
        let is_problematic_but_shipped = production_metrics.issue_flag_runs > 0 && shipment.has_shipped;

        ConsolidatedLotView {
            canonical_key: lot.key.clone(),
            raw_aliases: lot.raw_aliases(),
            stage: lot.stage,
            needs_review: lot.needs_review,
            review_reasons: lot.review_reasons.clone(),
            conflicts: resolved.conflicts_for(&lot.key).cloned().collect(),
            latest_inspection,
            shipment,
            production: production_metrics,
            compliance,
            is_problematic_but_shipped,
            production_runs: production.into_iter().cloned().collect(),
            inspections: inspections.into_iter().cloned().collect(),
            shipment_lines,
        }
    }

    // lines 已按 (ship_date, record_id) 升序，无日期排在最前
    fn rollup_shipments(&self, lines: &[LinkedShipmentLine]) -> ShipmentRollup {
        let latest = lines.last();
        let latest_status = latest.map(|l| l.status);

        ShipmentRollup {
            has_shipped: lines.iter().any(|l| l.status.counts_as_shipped()),
            has_hold: lines.iter().any(|l| l.status == ShipStatus::OnHold),
            active_hold: latest_status == Some(ShipStatus::OnHold),
            latest_status,
            latest_ship_date: lines.iter().filter_map(|l| l.ship_date).max(),
            status_label: match latest_status {
                Some(status) => status.as_str().to_string(),
                None => self.missing_shipping_label.clone(),
            },
            total_quantity: lines
                .iter()
                .filter_map(|l| l.quantity)
                .map(u64::from)
                .sum(),
            line_ids: lines.iter().map(|l| l.record_id).collect(),
        }
    }
}

impl Default for RecordLinker {
    fn default() -> Self {
        Self::new(DEFAULT_MISSING_SHIPPING_LABEL, false)
    }
}

/// 合规指示
pub fn compliance_for(latest: Option<InspectionResult>, active_hold: bool) -> ComplianceIndicator {
    match latest {
        Some(InspectionResult::Pass) if !active_hold => ComplianceIndicator::Green,
        _ => ComplianceIndicator::Red,
    }
}

fn production_metrics(runs: &[&ProductionRecord]) -> ProductionMetrics {
    let mut metrics = ProductionMetrics::default();

    for run in runs {
        metrics.run_count += 1;
        if run.line_issue_flag {
            metrics.issue_flag_runs += 1;
        }
        metrics.planned_units += run.planned_units.map(u64::from).unwrap_or(0);
        metrics.actual_units += run.actual_units.map(u64::from).unwrap_or(0);
        metrics.downtime_minutes += run.downtime_minutes;

        let line = run.line.trim();
        if !line.is_empty() {
            metrics.lines.insert(line.to_string());
        }
        if let Some(part) = run.part_number.as_deref().map(str::trim) {
            if !part.is_empty() {
                metrics.part_numbers.insert(part.to_string());
            }
        }

        if let Some(date) = run.production_date {
            metrics.first_production_date =
                Some(metrics.first_production_date.map_or(date, |d| d.min(date)));
            metrics.last_production_date =
                Some(metrics.last_production_date.map_or(date, |d| d.max(date)));
        }
    }

    metrics
}
