// ==========================================
// 批次对账与周报系统 - 核心库
// ==========================================
// 技术栈: Rust + tokio + calamine/csv
// 系统定位: 生产/质检/发运三源批次身份归一 + 周度汇总
// ==========================================

// ==========================================
// 模块声明
// ==========================================

// 领域层 - 实体与类型
pub mod domain;

// 引擎层 - 归一/身份解析/关联/周报
pub mod engine;

// 导入层 - 外部数据
pub mod importer;

// 配置层 - 运行配置
pub mod config;

// 导出层 - CSV / JSON
pub mod export;

// 日志系统
pub mod logging;

// ==========================================
// 重导出核心类型
// ==========================================

// 领域类型
pub use domain::types::{
    ComplianceIndicator, InspectionResult, LifecycleStage, NormalizationConfidence, Severity,
    ShipStatus, SourceKind, TrendDirection,
};

// 领域实体
pub use domain::{
    CanonicalLot, ConflictRecord, ConsolidatedLotView, ImportReport, LinkedDataset, LotAlias,
    ResolvedIdentities, SourceDataset, UnlinkedRecord, WeeklySummary,
};

// 引擎
pub use engine::{
    IdentityResolver, IssueRule, LotNormalizer, ReconcileError, ReconcileOrchestrator,
    ReconcileRunResult, RecordLinker, WeeklyAggregator,
};

// 导入 / 配置 / 导出
pub use config::{ConfigManager, ReconcileConfig, ReconcileConfigReader};
pub use export::{write_bundle, ExportMetadata};
pub use importer::{ImportManifest, ImportOutcome, SourceImporter, SourceImporterImpl};

// ==========================================
// 版本信息
// ==========================================

pub const VERSION: &str = env!("CARGO_PKG_VERSION");
pub const APP_NAME: &str = "批次对账与周报系统";

/// 配置目录名（<config_dir>/lot-reconcile/）
pub const APP_DIR_NAME: &str = "lot-reconcile";
