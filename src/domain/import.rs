// ==========================================
// 批次对账与周报系统 - 导入领域模型
// ==========================================
// 职责: 数据质量（DQ）违规、导入报告
// 用途: 导入层产出，导出层 / CLI 展示
// ==========================================

use crate::domain::types::SourceKind;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ==========================================
// DqLevel - 数据质量级别
// ==========================================
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum DqLevel {
    Error,    // 错误（该行被拒绝）
    Warning,  // 警告（该行保留，字段置空或取默认）
    Info,     // 提示（仅记录）
    Conflict, // 冲突（同一单据多行不一致，以首行为准）
}

impl DqLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            DqLevel::Error => "ERROR",
            DqLevel::Warning => "WARNING",
            DqLevel::Info => "INFO",
            DqLevel::Conflict => "CONFLICT",
        }
    }
}

// ==========================================
// DqViolation - 数据质量违规记录
// ==========================================
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DqViolation {
    pub row_number: usize,          // 原始文件行号
    pub raw_lot_id: Option<String>, // 批次号（如果可解析）
    pub level: DqLevel,             // 违规级别
    pub field: String,              // 违规字段
    pub message: String,            // 违规描述
}

impl DqViolation {
    pub fn new(
        row_number: usize,
        raw_lot_id: Option<&str>,
        level: DqLevel,
        field: &str,
        message: impl Into<String>,
    ) -> Self {
        Self {
            row_number,
            raw_lot_id: raw_lot_id
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string),
            level,
            field: field.to_string(),
            message: message.into(),
        }
    }
}

// ==========================================
// DqSummary - 数据质量汇总
// ==========================================
// 计数口径为"行"：一行有多条警告只计一次
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DqSummary {
    pub total_rows: usize, // 总行数（不含空白行）
    pub success: usize,    // 进入数据集的行数
    pub blocked: usize,    // 被拒绝的行数（ERROR）
    pub warning: usize,    // 有警告的行数（WARNING）
    pub conflict: usize,   // 有冲突的行数（CONFLICT）
}

// ==========================================
// ImportReport - 单个源文件的导入报告
// ==========================================
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImportReport {
    pub batch_id: String, // 批次 ID（UUID）
    pub source: SourceKind,
    pub file_name: String,
    pub file_path: String,
    pub sheet: Option<String>,
    pub summary: DqSummary,
    pub violations: Vec<DqViolation>,
    pub imported_at: DateTime<Utc>,
    pub elapsed_ms: u64,
}

impl ImportReport {
    pub fn has_errors(&self) -> bool {
        self.summary.blocked > 0
    }
}
