// ==========================================
// 批次对账与周报系统 - 引擎层
// ==========================================
// 职责: 批次号归一、身份解析、记录关联、周报汇总
// 红线: 引擎不做文件 I/O，所有复核/冲突必须输出 reason
// ==========================================

pub mod error;
pub mod identity_resolver;
pub mod issue_rule;
pub mod normalizer;
pub mod orchestrator;
pub mod record_linker;
pub mod weekly_aggregator;

// 重导出核心引擎
pub use error::{ReconcileError, ReconcileResult};
pub use identity_resolver::{IdentityResolver, ResolverPolicy};
pub use issue_rule::{IssueContext, IssueRule};
pub use normalizer::{LotNormalizer, NormalizeError, NormalizedLot, StripRule, StripRuleTable};
pub use orchestrator::{ReconcileOrchestrator, ReconcileRunResult};
pub use record_linker::RecordLinker;
pub use weekly_aggregator::{category_drill_down, line_drill_down, TrendKind, WeeklyAggregator};
