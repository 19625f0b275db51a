// ==========================================
// 批次对账与周报系统 - 导出模块错误类型
// ==========================================
// 工具: thiserror 派生宏
// ==========================================

use thiserror::Error;

/// 导出模块错误类型
#[derive(Error, Debug)]
pub enum ExportError {
    #[error("CSV 写入失败: {0}")]
    Csv(#[from] csv::Error),

    #[error("JSON 序列化失败: {0}")]
    Json(#[from] serde_json::Error),

    #[error("文件写入失败: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV 缓冲区提取失败: {0}")]
    Buffer(String),
}

/// Result 类型别名
pub type ExportResult<T> = Result<T, ExportError>;
