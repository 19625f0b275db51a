// ==========================================
// 批次对账与周报系统 - 引擎错误类型
// ==========================================
// 工具: thiserror 派生宏
// 红线: 只有"结构上不可能"的输入才是致命错误，且必须在处理开始前抛出
// ==========================================

use crate::domain::types::UnknownSourceTag;
use thiserror::Error;

/// 对账引擎致命错误（配置/结构错误）
#[derive(Error, Debug)]
pub enum ReconcileError {
    #[error("未知数据来源标签: {0:?}（仅支持 production / quality / shipping）")]
    UnknownSourceTag(String),

    #[error("批次号剥离规则无效 (来源 {source_tag}, 规则 {pattern:?}): {message}")]
    InvalidStripRule {
        source_tag: String,
        pattern: String,
        message: String,
    },

    #[error("批次号形态规则无效 ({pattern:?}): {message}")]
    InvalidLotPattern { pattern: String, message: String },

    #[error("问题判定规则无效 ({rule:?}): {message}")]
    InvalidIssueRule { rule: String, message: String },

    #[error("配置值格式错误 (key: {key}, value: {value}): {message}")]
    InvalidConfig {
        key: String,
        value: String,
        message: String,
    },
}

impl From<UnknownSourceTag> for ReconcileError {
    fn from(err: UnknownSourceTag) -> Self {
        ReconcileError::UnknownSourceTag(err.0)
    }
}

/// Result 类型别名
pub type ReconcileResult<T> = Result<T, ReconcileError>;
