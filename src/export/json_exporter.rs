// ==========================================
// 批次对账与周报系统 - JSON 导出
// ==========================================
// 职责: 单次运行结果的完整 JSON（身份、视图、周报、导入报告、配置快照）
// ==========================================

use crate::domain::import::ImportReport;
use crate::engine::orchestrator::ReconcileRunResult;
use crate::export::csv_exporter::ExportMetadata;
use crate::export::error::ExportResult;
use serde::Serialize;
use serde_json::Value;

#[derive(Debug, Serialize)]
struct RunExport<'a> {
    app: &'static str,
    version: &'static str,
    metadata: &'a ExportMetadata,
    config: Option<Value>, // 快照解析为 JSON 对象，便于下游读取
    import_reports: &'a [ImportReport],
    run: &'a ReconcileRunResult,
}

/// 导出完整运行结果（缩进格式）
pub fn export_run_json(
    run: &ReconcileRunResult,
    reports: &[ImportReport],
    metadata: &ExportMetadata,
) -> ExportResult<Vec<u8>> {
    let config = match &metadata.config_snapshot {
        Some(snapshot) => Some(serde_json::from_str(snapshot)?),
        None => None,
    };

    let payload = RunExport {
        app: crate::APP_NAME,
        version: crate::VERSION,
        metadata,
        config,
        import_reports: reports,
        run,
    };

    Ok(serde_json::to_vec_pretty(&payload)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::consolidated::LinkedDataset;
    use crate::domain::lot::ResolvedIdentities;
    use crate::engine::issue_rule::IssueRule;
    use crate::engine::weekly_aggregator::WeeklyAggregator;
    use chrono::{NaiveDate, TimeZone, Utc};

    #[test]
    fn test_run_json_embeds_config_snapshot_as_object() {
        let generated = Utc.with_ymd_and_hms(2026, 2, 16, 8, 0, 0).unwrap();
        let linked = LinkedDataset::default();
        let summary = WeeklyAggregator::new().aggregate(
            &linked,
            NaiveDate::from_ymd_opt(2026, 2, 11).unwrap(),
            &IssueRule::default(),
        );
        let run = ReconcileRunResult {
            run_id: "run-1".to_string(),
            generated_at: generated,
            identities: ResolvedIdentities::default(),
            linked,
            summary,
        };
        let metadata = ExportMetadata::new(generated)
            .with_run_id("run-1")
            .with_config_snapshot(r#"{"include_needs_review":true}"#);

        let bytes = export_run_json(&run, &[], &metadata).unwrap();
        let value: Value = serde_json::from_slice(&bytes).unwrap();

        assert_eq!(value["config"]["include_needs_review"], Value::Bool(true));
        assert_eq!(value["run"]["run_id"], "run-1");
        assert_eq!(value["run"]["summary"]["window"]["start"], "2026-02-09");
    }

    #[test]
    fn test_invalid_snapshot_is_error() {
        let generated = Utc.with_ymd_and_hms(2026, 2, 16, 8, 0, 0).unwrap();
        let linked = LinkedDataset::default();
        let summary = WeeklyAggregator::new().aggregate(
            &linked,
            NaiveDate::from_ymd_opt(2026, 2, 11).unwrap(),
            &IssueRule::default(),
        );
        let run = ReconcileRunResult {
            run_id: "run-1".to_string(),
            generated_at: generated,
            identities: ResolvedIdentities::default(),
            linked,
            summary,
        };
        let metadata = ExportMetadata::new(generated).with_config_snapshot("{broken");

        assert!(export_run_json(&run, &[], &metadata).is_err());
    }
}
