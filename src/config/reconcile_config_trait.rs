// ==========================================
// 批次对账与周报系统 - 对账配置读取 Trait
// ==========================================
// 职责: 定义引擎所需的配置读取接口（不包含实现）
// 红线: 不包含配置写入、不包含业务逻辑；键缺失时返回文档中的默认值
// ==========================================

use crate::config::reconcile_config::StripRuleSpec;
use async_trait::async_trait;
use chrono::NaiveDate;
use std::collections::BTreeMap;
use std::error::Error;

// ==========================================
// ReconcileConfigReader Trait
// ==========================================
// 实现者: ConfigManager（从 JSON 配置文件读取）
#[async_trait]
pub trait ReconcileConfigReader: Send + Sync {
    // ===== 周报口径 =====

    /// 问题判定规则文本
    ///
    /// # 默认值
    /// - "line_issue_flag = true"
    async fn get_issue_rule(&self) -> Result<String, Box<dyn Error>>;

    /// 无发运批次的占位标签
    ///
    /// # 默认值
    /// - "Not Found / Not Shipped Yet"
    async fn get_missing_shipping_label(&self) -> Result<String, Box<dyn Error>>;

    /// 需复核批次是否进入汇总
    ///
    /// # 默认值
    /// - false
    async fn get_include_needs_review(&self) -> Result<bool, Box<dyn Error>>;

    /// 周锚点日期（YYYY-MM-DD）
    ///
    /// # 参数
    /// - today: 未配置时使用的日期
    async fn get_week_anchor_date(&self, today: NaiveDate) -> Result<NaiveDate, Box<dyn Error>>;

    // ===== 批次号归一 =====

    /// 剥离规则表（"*" 为全局，其余为来源标签）
    ///
    /// # 默认值
    /// - {"*": [L0T → LOT, 紧凑写法拆分]}
    async fn get_strip_rules(&self) -> Result<BTreeMap<String, Vec<StripRuleSpec>>, Box<dyn Error>>;

    /// 批次号形态（正则）；空串表示不校验
    async fn get_lot_pattern(&self) -> Result<String, Box<dyn Error>>;

    /// 规范分隔符（单个字符）
    ///
    /// # 默认值
    /// - "-"
    async fn get_canonical_separator(&self) -> Result<String, Box<dyn Error>>;

    // ===== 复核策略 =====

    /// 参与冲突检测的身份属性
    ///
    /// # 默认值
    /// - ["part_number", "production_line"]
    async fn get_identity_attributes(&self) -> Result<Vec<String>, Box<dyn Error>>;

    /// 各阶段最少来源数（键: produced / inspected / shipped）
    ///
    /// # 默认值
    /// - {produced: 1, inspected: 2, shipped: 3}
    async fn get_min_sources_by_stage(&self) -> Result<BTreeMap<String, usize>, Box<dyn Error>>;

    /// 同一来源多种写法折叠到同一批次时是否视为歧义
    ///
    /// # 默认值
    /// - true
    async fn get_flag_intra_source_variants(&self) -> Result<bool, Box<dyn Error>>;
}
