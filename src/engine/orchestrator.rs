// ==========================================
// 批次对账与周报系统 - 引擎编排器
// ==========================================
// 用途: 按 归一 → 身份解析 → 记录关联 → 周报汇总 的顺序执行
// 红线: 单次运行，输入快照不可变；每个阶段产出新的内存结构交给下一阶段
// ==========================================

use crate::config::ReconcileConfig;
use crate::domain::consolidated::LinkedDataset;
use crate::domain::lot::ResolvedIdentities;
use crate::domain::records::SourceDataset;
use crate::domain::report::{DrillDownRow, WeeklySummary};
use crate::engine::identity_resolver::IdentityResolver;
use crate::engine::normalizer::LotNormalizer;
use crate::engine::record_linker::RecordLinker;
use crate::engine::weekly_aggregator::{
    category_drill_down, line_drill_down, TrendKind, WeeklyAggregator,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, instrument};
use uuid::Uuid;

// ==========================================
// ReconcileRunResult - 单次运行结果
// ==========================================
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReconcileRunResult {
    pub run_id: String,
    pub generated_at: DateTime<Utc>,
    pub identities: ResolvedIdentities,
    pub linked: LinkedDataset,
    pub summary: WeeklySummary,
}

impl ReconcileRunResult {
    /// 产线下钻
    pub fn line_drill_down(&self, line: &str, issues_only: bool) -> Vec<DrillDownRow> {
        line_drill_down(&self.summary, &self.linked, line, issues_only)
    }

    /// 分类下钻
    pub fn category_drill_down(
        &self,
        kind: TrendKind,
        category: &str,
        include_previous: bool,
    ) -> Vec<DrillDownRow> {
        category_drill_down(&self.summary, &self.linked, kind, category, include_previous)
    }
}

// ==========================================
// ReconcileOrchestrator - 引擎编排器
// ==========================================
pub struct ReconcileOrchestrator {
    config: Arc<ReconcileConfig>,
    normalizer: LotNormalizer,
    resolver: IdentityResolver,
    linker: RecordLinker,
    aggregator: WeeklyAggregator,
}

impl ReconcileOrchestrator {
    /// 创建新的编排器实例
    ///
    /// # 参数
    /// - config: 已校验的运行配置
    pub fn new(config: Arc<ReconcileConfig>) -> Self {
        Self {
            normalizer: config.normalizer(),
            resolver: config.resolver(),
            linker: config.linker(),
            aggregator: WeeklyAggregator::new(),
            config,
        }
    }

    pub fn config(&self) -> &ReconcileConfig {
        &self.config
    }

    /// 执行完整对账 + 周报流程
    ///
    /// # 参数
    /// - dataset: 导入层物化的全部源记录
    /// - now: 本次运行时钟
    #[instrument(skip_all, fields(records = dataset.record_count()))]
    pub fn run(&self, dataset: &SourceDataset, now: DateTime<Utc>) -> ReconcileRunResult {
        let run_id = Uuid::new_v4().to_string();
        let started = Instant::now();

        info!(
            run_id = %run_id,
            production = dataset.production.len(),
            inspections = dataset.inspections.len(),
            shipments = dataset.shipments.len(),
            anchor = %self.config.week_anchor_date,
            "开始执行对账流程"
        );

        // ==========================================
        // 步骤1: 身份解析（含归一）
        // ==========================================
        debug!("步骤1: 身份解析");
        let observations = dataset.observations();
        let identities = self.resolver.resolve(&observations, &self.normalizer, now);

        // ==========================================
        // 步骤2: 记录关联
        // ==========================================
        debug!("步骤2: 记录关联");
        let linked = self.linker.link(&identities, dataset);

        // ==========================================
        // 步骤3: 周报汇总
        // ==========================================
        debug!("步骤3: 周报汇总");
        let summary = self.aggregator.aggregate(
            &linked,
            self.config.week_anchor_date,
            &self.config.issue_rule,
        );

        info!(
            run_id = %run_id,
            lots = identities.lots.len(),
            conflicts = identities.conflicts.len(),
            unlinked = identities.unlinked.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "对账流程完成"
        );

        ReconcileRunResult {
            run_id,
            generated_at: now,
            identities,
            linked,
            summary,
        }
    }
}
