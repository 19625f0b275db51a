// ==========================================
// 批次对账与周报系统 - 领域模型层
// ==========================================
// 职责: 定义领域实体、类型
// 红线: 不含文件访问逻辑,不含引擎逻辑
// ==========================================

pub mod consolidated;
pub mod import;
pub mod lot;
pub mod records;
pub mod report;
pub mod types;

// 重导出核心类型
pub use consolidated::{
    ConsolidatedLotView, InspectionSummary, LinkedDataset, LinkedShipmentLine, ProductionMetrics,
    ShipmentRollup,
};
pub use import::{DqLevel, DqSummary, DqViolation, ImportReport};
pub use lot::{
    CanonicalLot, ConflictKind, ConflictRecord, ConflictValue, LotAlias, ResolvedIdentities,
    ReviewReason, UnlinkedRecord,
};
pub use records::{
    DefectInstance, DefectType, IdentityObservation, InspectionRecord, ProductionRecord, RecordId,
    ShipmentLine, ShipmentRecord, SourceDataset, SourceRef,
};
pub use report::{
    CategoryGroup, CategoryTrend, DrillDownRow, LineGroup, LineRanking, RunRef,
    TrendContribution, WeekWindow, WeeklySummary,
};
pub use types::{
    ComplianceIndicator, InspectionResult, LifecycleStage, NormalizationConfidence, Severity,
    ShipStatus, SourceKind, TrendDirection,
};
