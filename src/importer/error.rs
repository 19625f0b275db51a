// ==========================================
// 批次对账与周报系统 - 导入模块错误类型
// ==========================================
// 工具: thiserror 派生宏
// 红线: 只有"整个文件无法读取"才是错误；行级问题进入 DQ 报告
// ==========================================

use crate::engine::error::ReconcileError;
use thiserror::Error;

/// 导入模块错误类型
#[derive(Error, Debug)]
pub enum ImportError {
    // ===== 文件相关错误 =====
    #[error("文件不存在: {0}")]
    FileNotFound(String),

    #[error("文件格式不支持: {0}（仅支持 .xlsx/.xls/.csv）")]
    UnsupportedFormat(String),

    #[error("文件读取失败: {0}")]
    FileReadError(String),

    #[error("Excel 解析失败: {0}")]
    ExcelParseError(String),

    #[error("工作表不存在: {0}")]
    SheetNotFound(String),

    #[error("CSV 解析失败: {0}")]
    CsvParseError(String),

    // ===== 数据映射错误（行级，转为 DQ ERROR；数值/日期问题只记 DQ 不报错） =====
    #[error("字段映射失败 (行 {row}): {message}")]
    FieldMappingError { row: usize, message: String },

    #[error("枚举值无效 (行 {row}, 字段 {field}): {value:?}")]
    UnknownEnumValue {
        row: usize,
        field: String,
        value: String,
    },

    // ===== 清单/配置错误 =====
    #[error(transparent)]
    Manifest(#[from] ReconcileError),

    // ===== 通用错误 =====
    #[error("内部错误: {0}")]
    InternalError(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl ImportError {
    /// 行级错误对应的 (行号, 字段)
    pub fn row_field(&self) -> Option<(usize, &str)> {
        match self {
            ImportError::FieldMappingError { row, .. } => Some((*row, "")),
            ImportError::UnknownEnumValue { row, field, .. } => Some((*row, field.as_str())),
            _ => None,
        }
    }
}

// 实现 From<std::io::Error>
impl From<std::io::Error> for ImportError {
    fn from(err: std::io::Error) -> Self {
        ImportError::FileReadError(err.to_string())
    }
}

// 实现 From<csv::Error>
impl From<csv::Error> for ImportError {
    fn from(err: csv::Error) -> Self {
        ImportError::CsvParseError(err.to_string())
    }
}

// 实现 From<calamine::Error>
impl From<calamine::Error> for ImportError {
    fn from(err: calamine::Error) -> Self {
        ImportError::ExcelParseError(err.to_string())
    }
}

// 实现 From<tokio::task::JoinError>
impl From<tokio::task::JoinError> for ImportError {
    fn from(err: tokio::task::JoinError) -> Self {
        ImportError::InternalError(format!("导入任务异常终止: {}", err))
    }
}

/// Result 类型别名
pub type ImportResult<T> = Result<T, ImportError>;
