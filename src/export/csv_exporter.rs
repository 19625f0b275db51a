// ==========================================
// 批次对账与周报系统 - CSV 导出
// ==========================================
// 职责: 周报（元数据块 + 排名/趋势表）、下钻、批次视图、冲突、无法关联、DQ 明细
// 红线: 每一行明细都带 源文件/工作表/行号/原始批次号，保证可追溯
// ==========================================

use crate::domain::consolidated::LinkedDataset;
use crate::domain::import::ImportReport;
use crate::domain::lot::{ConflictRecord, UnlinkedRecord};
use crate::domain::records::SourceRef;
use crate::domain::report::{CategoryTrend, DrillDownRow, WeeklySummary};
use crate::export::error::{ExportError, ExportResult};
use chrono::{DateTime, NaiveDate, SecondsFormat, Utc};
use csv::{Writer, WriterBuilder};
use serde::{Deserialize, Serialize};

// ==========================================
// ExportMetadata - 导出元数据
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExportMetadata {
    pub generated_utc: DateTime<Utc>,
    pub run_id: Option<String>,
    pub config_snapshot: Option<String>, // ConfigManager::get_config_snapshot()
}

impl ExportMetadata {
    pub fn new(generated_utc: DateTime<Utc>) -> Self {
        Self {
            generated_utc,
            run_id: None,
            config_snapshot: None,
        }
    }

    pub fn with_run_id(mut self, run_id: impl Into<String>) -> Self {
        self.run_id = Some(run_id.into());
        self
    }

    pub fn with_config_snapshot(mut self, snapshot: impl Into<String>) -> Self {
        self.config_snapshot = Some(snapshot.into());
        self
    }
}

// ==========================================
// 格式化工具
// ==========================================

fn new_writer() -> Writer<Vec<u8>> {
    WriterBuilder::new().flexible(true).from_writer(Vec::new())
}

fn finish(writer: Writer<Vec<u8>>) -> ExportResult<Vec<u8>> {
    writer
        .into_inner()
        .map_err(|e| ExportError::Buffer(e.to_string()))
}

fn opt_date(date: Option<NaiveDate>) -> String {
    date.map(|d| d.to_string()).unwrap_or_default()
}

fn opt_text(value: Option<&str>) -> String {
    value.unwrap_or_default().to_string()
}

fn number(value: f64) -> String {
    format!("{:.1}", value)
}

fn flag(value: bool) -> &'static str {
    if value {
        "true"
    } else {
        "false"
    }
}

fn source_columns(source_ref: &SourceRef) -> [String; 3] {
    [
        source_ref.file.clone(),
        source_ref.sheet.clone().unwrap_or_default(),
        source_ref.row.to_string(),
    ]
}

/// 溯源紧凑写法: file[sheet]:row
fn compact_ref(source_ref: &SourceRef) -> String {
    match &source_ref.sheet {
        Some(sheet) => format!("{}[{}]:{}", source_ref.file, sheet, source_ref.row),
        None => format!("{}:{}", source_ref.file, source_ref.row),
    }
}

// ==========================================
// 周报
// ==========================================

/// 周报 CSV: 元数据块 + ranking_table + trending_table + issue_trending_table
pub fn export_weekly_summary_csv(
    summary: &WeeklySummary,
    metadata: &ExportMetadata,
) -> ExportResult<Vec<u8>> {
    let mut out = Vec::new();

    // 元数据块
    let mut meta = new_writer();
    let window = &summary.window;
    let previous = &summary.previous_window;
    let generated = metadata
        .generated_utc
        .to_rfc3339_opts(SecondsFormat::Secs, true);
    meta_row(&mut meta, "week_start", &window.start.to_string())?;
    meta_row(&mut meta, "week_end", &window.end.to_string())?;
    meta_row(&mut meta, "previous_week_start", &previous.start.to_string())?;
    meta_row(&mut meta, "previous_week_end", &previous.end.to_string())?;
    meta_row(&mut meta, "generated_utc", &generated)?;
    if let Some(run_id) = &metadata.run_id {
        meta_row(&mut meta, "run_id", run_id)?;
    }
    meta_row(&mut meta, "issue_rule", &summary.issue_rule)?;
    meta_row(&mut meta, "included_lots", &summary.included_lots.to_string())?;
    meta_row(&mut meta, "excluded_lots", &summary.excluded_lots.len().to_string())?;
    meta_row(&mut meta, "undated_records", &summary.undated_records.to_string())?;
    if let Some(snapshot) = &metadata.config_snapshot {
        meta_row(&mut meta, "config_snapshot", snapshot)?;
    }
    out.extend(finish(meta)?);

    // 排名表
    out.extend_from_slice(b"\nranking_table\n");
    let mut ranking = new_writer();
    ranking.write_record([
        "rank",
        "line",
        "issue_runs",
        "total_runs",
        "downtime_minutes",
        "unique_lots",
    ])?;
    for row in &summary.ranking {
        ranking.write_record([
            row.rank.to_string(),
            row.line.clone(),
            row.issue_runs.to_string(),
            row.total_runs.to_string(),
            number(row.downtime_minutes),
            row.unique_lots.to_string(),
        ])?;
    }
    out.extend(finish(ranking)?);

    out.extend_from_slice(b"\ntrending_table\n");
    out.extend(trend_table(&summary.defect_trends)?);

    out.extend_from_slice(b"\nissue_trending_table\n");
    out.extend(trend_table(&summary.issue_trends)?);

    Ok(out)
}

fn meta_row(writer: &mut Writer<Vec<u8>>, key: &str, value: &str) -> ExportResult<()> {
    writer.write_record([key, value])?;
    Ok(())
}

fn trend_table(rows: &[CategoryTrend]) -> ExportResult<Vec<u8>> {
    let mut writer = new_writer();
    writer.write_record([
        "category",
        "current_total",
        "previous_total",
        "delta",
        "pct_change",
        "direction",
    ])?;
    for row in rows {
        writer.write_record([
            row.category.clone(),
            row.current_total.to_string(),
            row.previous_total.to_string(),
            row.delta.to_string(),
            row.pct_change.map(number).unwrap_or_default(),
            row.direction.to_string(),
        ])?;
    }
    finish(writer)
}

// ==========================================
// 下钻明细
// ==========================================
pub fn export_drill_down_csv(rows: &[DrillDownRow]) -> ExportResult<Vec<u8>> {
    let mut writer = new_writer();
    writer.write_record([
        "canonical_key",
        "record_id",
        "date",
        "week",
        "line",
        "category",
        "detail",
        "quantity",
        "raw_lot_id",
        "source_file",
        "source_sheet",
        "source_row",
        "shipping_status",
        "latest_ship_date",
        "compliance",
        "is_problematic_but_shipped",
        "needs_review",
    ])?;

    for row in rows {
        let [file, sheet, line_no] = source_columns(&row.source_ref);
        writer.write_record([
            row.canonical_key.clone(),
            row.record_id.to_string(),
            row.date.to_string(),
            if row.in_current_week { "current" } else { "previous" }.to_string(),
            opt_text(row.line.as_deref()),
            opt_text(row.category.as_deref()),
            opt_text(row.detail.as_deref()),
            row.quantity.to_string(),
            opt_text(row.raw_lot_id.as_deref()),
            file,
            sheet,
            line_no,
            row.shipping_status_display.clone(),
            opt_date(row.latest_ship_date),
            row.compliance.to_string(),
            flag(row.is_problematic_but_shipped).to_string(),
            flag(row.needs_review).to_string(),
        ])?;
    }

    finish(writer)
}

// ==========================================
// 批次视图（全部批次，含待复核）
// ==========================================
pub fn export_lot_views_csv(linked: &LinkedDataset) -> ExportResult<Vec<u8>> {
    let mut writer = new_writer();
    writer.write_record([
        "canonical_key",
        "stage",
        "needs_review",
        "in_aggregation_scope",
        "review_reasons",
        "raw_aliases",
        "latest_inspection_result",
        "latest_inspected_at",
        "shipping_status",
        "latest_ship_date",
        "has_shipped",
        "active_hold",
        "compliance",
        "is_problematic_but_shipped",
        "run_count",
        "issue_flag_runs",
        "planned_units",
        "actual_units",
        "downtime_minutes",
        "lines",
        "record_ids",
        "source_refs",
    ])?;

    for view in linked.views.values() {
        let reasons: Vec<String> = view.review_reasons.iter().map(|r| r.to_string()).collect();

        let mut record_ids: Vec<u64> = view
            .production_runs
            .iter()
            .map(|r| r.record_id)
            .chain(view.inspections.iter().map(|i| i.record_id))
            .chain(view.shipment_lines.iter().map(|l| l.record_id))
            .collect();
        record_ids.sort_unstable();

        let refs: Vec<String> = view
            .production_runs
            .iter()
            .map(|r| compact_ref(&r.source_ref))
            .chain(view.inspections.iter().map(|i| compact_ref(&i.source_ref)))
            .chain(view.shipment_lines.iter().map(|l| compact_ref(&l.source_ref)))
            .collect();

        let lines: Vec<&str> = view.production.lines.iter().map(|l| l.as_str()).collect();
        let in_scope = linked.include_needs_review || !view.needs_review;

        writer.write_record([
            view.canonical_key.clone(),
            view.stage.to_string(),
            flag(view.needs_review).to_string(),
            flag(in_scope).to_string(),
            reasons.join("; "),
            view.raw_aliases.join("|"),
            view.latest_result().map(|r| r.to_string()).unwrap_or_default(),
            view.latest_inspected_at()
                .map(|ts| ts.to_rfc3339_opts(SecondsFormat::Secs, true))
                .unwrap_or_default(),
            view.shipment.status_label.clone(),
            opt_date(view.shipment.latest_ship_date),
            flag(view.shipment.has_shipped).to_string(),
            flag(view.shipment.active_hold).to_string(),
            view.compliance.to_string(),
            flag(view.is_problematic_but_shipped).to_string(),
            view.production.run_count.to_string(),
            view.production.issue_flag_runs.to_string(),
            view.production.planned_units.to_string(),
            view.production.actual_units.to_string(),
            number(view.production.downtime_minutes),
            lines.join("|"),
            record_ids
                .iter()
                .map(|id| id.to_string())
                .collect::<Vec<_>>()
                .join("|"),
            refs.join("|"),
        ])?;
    }

    finish(writer)
}

// ==========================================
// 冲突（每个 取值 × 出现位置 一行）
// ==========================================
pub fn export_conflicts_csv(conflicts: &[ConflictRecord]) -> ExportResult<Vec<u8>> {
    let mut writer = new_writer();
    writer.write_record([
        "canonical_key",
        "kind",
        "attribute",
        "value",
        "value_sources",
        "source_file",
        "source_sheet",
        "source_row",
    ])?;

    for conflict in conflicts {
        let kind = serde_json::to_value(conflict.kind)?
            .as_str()
            .map(str::to_string)
            .unwrap_or_default();
        for value in &conflict.values {
            let sources: Vec<&str> = value.sources.iter().map(|s| s.as_str()).collect();
            for source_ref in &value.refs {
                let [file, sheet, row] = source_columns(source_ref);
                writer.write_record([
                    conflict.canonical_key.clone(),
                    kind.clone(),
                    conflict.attribute.clone(),
                    value.value.clone(),
                    sources.join("|"),
                    file,
                    sheet,
                    row,
                ])?;
            }
        }
    }

    finish(writer)
}

// ==========================================
// 无法关联的记录
// ==========================================
pub fn export_unlinked_csv(unlinked: &[UnlinkedRecord]) -> ExportResult<Vec<u8>> {
    let mut writer = new_writer();
    writer.write_record([
        "record_id",
        "source",
        "raw_lot_id",
        "reason",
        "source_file",
        "source_sheet",
        "source_row",
    ])?;

    for record in unlinked {
        let [file, sheet, row] = source_columns(&record.source_ref);
        writer.write_record([
            record.record_id.to_string(),
            record.source.to_string(),
            record.raw_lot_id.clone(),
            record.reason.clone(),
            file,
            sheet,
            row,
        ])?;
    }

    finish(writer)
}

// ==========================================
// 导入 DQ 明细
// ==========================================
pub fn export_dq_csv(reports: &[ImportReport]) -> ExportResult<Vec<u8>> {
    let mut writer = new_writer();
    writer.write_record([
        "batch_id",
        "source",
        "file_name",
        "sheet",
        "row_number",
        "level",
        "field",
        "raw_lot_id",
        "message",
    ])?;

    for report in reports {
        for violation in &report.violations {
            writer.write_record([
                report.batch_id.clone(),
                report.source.to_string(),
                report.file_name.clone(),
                opt_text(report.sheet.as_deref()),
                violation.row_number.to_string(),
                violation.level.as_str().to_string(),
                violation.field.clone(),
                opt_text(violation.raw_lot_id.as_deref()),
                violation.message.clone(),
            ])?;
        }
    }

    finish(writer)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::report::{LineRanking, WeekWindow};
    use crate::domain::types::TrendDirection;
    use chrono::TimeZone;
    use std::collections::BTreeMap;

    fn summary() -> WeeklySummary {
        let window = WeekWindow::containing(NaiveDate::from_ymd_opt(2026, 2, 11).unwrap());
        WeeklySummary {
            window,
            previous_window: window.previous(),
            issue_rule: "line_issue_flag = true".to_string(),
            ranking: vec![LineRanking {
                rank: 1,
                line: "Line A".to_string(),
                issue_runs: 2,
                total_runs: 3,
                downtime_minutes: 45.0,
                unique_lots: 2,
            }],
            defect_trends: vec![CategoryTrend {
                category: "Scratch".to_string(),
                current_total: 10,
                previous_total: 4,
                delta: 6,
                pct_change: Some(150.0),
                direction: TrendDirection::Up,
            }],
            issue_trends: Vec::new(),
            line_groups: BTreeMap::new(),
            defect_groups: BTreeMap::new(),
            issue_groups: BTreeMap::new(),
            included_lots: 2,
            excluded_lots: vec!["LOT-X".to_string()],
            undated_records: 0,
        }
    }

    #[test]
    fn test_weekly_summary_csv_layout() {
        let generated = Utc.with_ymd_and_hms(2026, 2, 16, 8, 0, 0).unwrap();
        let metadata = ExportMetadata::new(generated)
            .with_config_snapshot(r#"{"issue_rule":"line = 'A'"}"#);

        let bytes = export_weekly_summary_csv(&summary(), &metadata).unwrap();
        let text = String::from_utf8(bytes).unwrap();
        let lines: Vec<&str> = text.lines().collect();

        assert_eq!(lines[0], "week_start,2026-02-09");
        assert_eq!(lines[1], "week_end,2026-02-15");
        assert_eq!(lines[2], "previous_week_start,2026-02-02");
        assert_eq!(lines[3], "previous_week_end,2026-02-08");
        assert_eq!(lines[4], "generated_utc,2026-02-16T08:00:00Z");
        // 含逗号/引号的快照被正确转义
        assert!(text.contains(r#"config_snapshot,"{""issue_rule"":""line = 'A'""}""#));

        assert!(text.contains("\nranking_table\nrank,line,issue_runs,total_runs,downtime_minutes,unique_lots\n1,Line A,2,3,45.0,2\n"));
        assert!(text.contains("\ntrending_table\ncategory,current_total,previous_total,delta,pct_change,direction\nScratch,10,4,6,150.0,up\n"));
        // 空表仍输出表头
        assert!(text.ends_with("\nissue_trending_table\ncategory,current_total,previous_total,delta,pct_change,direction\n"));
    }

    #[test]
    fn test_unlinked_csv_carries_traceability() {
        use crate::domain::types::SourceKind;

        let unlinked = vec![UnlinkedRecord {
            record_id: 7,
            source: SourceKind::Shipping,
            source_ref: SourceRef::new("ship.xlsx", Some("Sheet1".to_string()), 12),
            raw_lot_id: "??".to_string(),
            reason: "批次号为空".to_string(),
        }];

        let text = String::from_utf8(export_unlinked_csv(&unlinked).unwrap()).unwrap();
        let lines: Vec<&str> = text.lines().collect();

        assert_eq!(
            lines[0],
            "record_id,source,raw_lot_id,reason,source_file,source_sheet,source_row"
        );
        assert_eq!(lines[1], "7,shipping,??,批次号为空,ship.xlsx,Sheet1,12");
    }
}
