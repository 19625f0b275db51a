// ==========================================
// 批次对账与周报系统 - 导入层
// ==========================================
// 职责: 外部文件导入，生成不可变的源数据集
// 支持: Excel, CSV
// ==========================================

// 模块声明
pub mod data_cleaner;
pub mod dq_validator;
pub mod error;
pub mod field_mapper;
pub mod file_parser;
pub mod source_importer;
pub mod source_importer_impl;
pub mod source_importer_trait;

// 重导出核心类型
pub use data_cleaner::DataCleaner;
pub use dq_validator::DqValidator;
pub use error::{ImportError, ImportResult};
pub use field_mapper::FieldMapper;
pub use file_parser::{CsvParser, ExcelParser, RawRow, UniversalFileParser};
pub use source_importer::{
    ImportManifest, ImportOutcome, ManifestEntry, SourceBatch, SourceRecords,
};
pub use source_importer_impl::SourceImporterImpl;

// 重导出 Trait 接口
pub use source_importer_trait::{FileParser, SourceImporter};
