// ==========================================
// 批次对账与周报系统 - 导出文件包
// ==========================================
// 职责: 把一次运行的全部导出写入输出目录
// ==========================================

use crate::domain::import::ImportReport;
use crate::engine::orchestrator::ReconcileRunResult;
use crate::engine::weekly_aggregator::TrendKind;
use crate::export::csv_exporter::{
    export_conflicts_csv, export_dq_csv, export_drill_down_csv, export_lot_views_csv,
    export_unlinked_csv, export_weekly_summary_csv, ExportMetadata,
};
use crate::export::error::ExportResult;
use crate::export::json_exporter::export_run_json;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

pub const WEEKLY_SUMMARY_FILE: &str = "weekly_summary.csv";
pub const LINE_DRILL_DOWN_FILE: &str = "drilldown_lines.csv";
pub const DEFECT_DRILL_DOWN_FILE: &str = "drilldown_defects.csv";
pub const ISSUE_DRILL_DOWN_FILE: &str = "drilldown_issues.csv";
pub const LOT_VIEWS_FILE: &str = "lot_views.csv";
pub const CONFLICTS_FILE: &str = "conflicts.csv";
pub const UNLINKED_FILE: &str = "unlinked.csv";
pub const IMPORT_DQ_FILE: &str = "import_dq.csv";
pub const RUN_JSON_FILE: &str = "run.json";

/// 写出全部导出文件，返回已写入的路径（固定顺序）
pub fn write_bundle(
    out_dir: &Path,
    run: &ReconcileRunResult,
    reports: &[ImportReport],
    metadata: &ExportMetadata,
) -> ExportResult<Vec<PathBuf>> {
    fs::create_dir_all(out_dir)?;

    // 下钻: 每条产线 / 每个分类按名称顺序拼接（分类含上周贡献）
    let line_rows: Vec<_> = run
        .summary
        .line_groups
        .keys()
        .flat_map(|line| run.line_drill_down(line, false))
        .collect();
    let defect_rows: Vec<_> = run
        .summary
        .defect_groups
        .keys()
        .flat_map(|category| run.category_drill_down(TrendKind::Defect, category, true))
        .collect();
    let issue_rows: Vec<_> = run
        .summary
        .issue_groups
        .keys()
        .flat_map(|category| run.category_drill_down(TrendKind::Issue, category, true))
        .collect();

    let payloads = [
        (
            WEEKLY_SUMMARY_FILE,
            export_weekly_summary_csv(&run.summary, metadata)?,
        ),
        (LINE_DRILL_DOWN_FILE, export_drill_down_csv(&line_rows)?),
        (DEFECT_DRILL_DOWN_FILE, export_drill_down_csv(&defect_rows)?),
        (ISSUE_DRILL_DOWN_FILE, export_drill_down_csv(&issue_rows)?),
        (LOT_VIEWS_FILE, export_lot_views_csv(&run.linked)?),
        (CONFLICTS_FILE, export_conflicts_csv(&run.identities.conflicts)?),
        (UNLINKED_FILE, export_unlinked_csv(&run.identities.unlinked)?),
        (IMPORT_DQ_FILE, export_dq_csv(reports)?),
        (RUN_JSON_FILE, export_run_json(run, reports, metadata)?),
    ];

    let mut written = Vec::with_capacity(payloads.len());
    for (name, bytes) in payloads {
        let path = out_dir.join(name);
        fs::write(&path, bytes)?;
        debug!(path = %path.display(), "导出文件已写入");
        written.push(path);
    }

    info!(out_dir = %out_dir.display(), files = written.len(), "导出完成");
    Ok(written)
}
