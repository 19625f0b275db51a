// ==========================================
// 批次对账与周报系统 - 导出层
// ==========================================
// 职责: 周报/下钻/批次视图/冲突/无法关联/DQ 的 CSV 与完整 JSON
// ==========================================

pub mod bundle;
pub mod csv_exporter;
pub mod error;
pub mod json_exporter;

// 重导出
pub use bundle::write_bundle;
pub use csv_exporter::{
    export_conflicts_csv, export_dq_csv, export_drill_down_csv, export_lot_views_csv,
    export_unlinked_csv, export_weekly_summary_csv, ExportMetadata,
};
pub use error::{ExportError, ExportResult};
pub use json_exporter::export_run_json;
