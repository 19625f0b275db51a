// ==========================================
// 批次对账与周报系统 - 源数据导入 Trait
// ==========================================
// 职责: 定义导入接口（不包含实现）
// ==========================================

use crate::domain::types::SourceKind;
use crate::importer::error::ImportResult;
use crate::importer::file_parser::RawRow;
use crate::importer::source_importer::{ImportManifest, ImportOutcome, SourceBatch};
use async_trait::async_trait;
use std::path::Path;

// ==========================================
// SourceImporter Trait
// ==========================================
// 用途: 源数据导入主接口
// 实现者: SourceImporterImpl
#[async_trait]
pub trait SourceImporter: Send + Sync {
    /// 导入单个源文件
    ///
    /// # 参数
    /// - source: 数据来源
    /// - file_path: 文件路径（.csv / .xlsx / .xls）
    /// - sheet: 工作表名（None = 第一个工作表；CSV 忽略）
    ///
    /// # 返回
    /// - Ok(SourceBatch): 已类型化记录（record_id 尚未分配）+ 导入报告
    /// - Err: 文件无法读取
    async fn import_source(
        &self,
        source: SourceKind,
        file_path: &Path,
        sheet: Option<&str>,
    ) -> ImportResult<SourceBatch>;

    /// 按清单导入全部源文件（并发解析，按清单顺序组装）
    ///
    /// # 返回
    /// - Ok(ImportOutcome): 不可变数据集 + 每个文件的导入报告
    /// - Err: 清单标签未知（处理开始前）或任一文件无法读取
    async fn import_all(&self, manifest: &ImportManifest) -> ImportResult<ImportOutcome>;
}

// ==========================================
// FileParser Trait
// ==========================================
// 用途: 文件解析接口（阶段 0）
// 实现者: CsvParser, ExcelParser, UniversalFileParser
pub trait FileParser: Send + Sync {
    /// 解析文件为原始行记录（列名已规整为 snake_case）
    ///
    /// # 参数
    /// - file_path: 文件路径
    /// - sheet: 工作表名（仅 Excel 使用）
    ///
    /// # 返回
    /// - Ok(Vec<RawRow>): 行记录列表（已跳过空白行）
    /// - Err: 文件读取错误、格式错误
    fn parse_to_raw_rows(&self, file_path: &Path, sheet: Option<&str>)
        -> ImportResult<Vec<RawRow>>;
}
