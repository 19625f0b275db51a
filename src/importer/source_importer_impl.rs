// ==========================================
// 批次对账与周报系统 - 源数据导入器实现
// ==========================================
// 职责: 整合导入流程，从文件到不可变数据集
// 流程: 解析 → 映射（含清洗）→ 合并 → 校验 → 组装
// 并发: 每个源文件一个阻塞任务（spawn_blocking），按清单顺序汇合
// ==========================================

use crate::domain::import::{DqLevel, DqViolation, ImportReport};
use crate::domain::types::SourceKind;
use crate::importer::dq_validator::DqValidator;
use crate::importer::error::{ImportError, ImportResult};
use crate::importer::field_mapper::{columns, FieldMapper};
use crate::importer::file_parser::{RawRow, UniversalFileParser};
use crate::importer::source_importer::{
    assemble_dataset, group_inspections, group_shipments, ImportManifest, ImportOutcome,
    SourceBatch, SourceRecords,
};
use crate::importer::source_importer_trait::{FileParser, SourceImporter};
use async_trait::async_trait;
use chrono::Utc;
use futures::future::join_all;
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

// ==========================================
// SourceImporterImpl - 源数据导入器实现
// ==========================================
#[derive(Clone)]
pub struct SourceImporterImpl {
    // 导入组件（Arc 以便移入阻塞任务）
    file_parser: Arc<dyn FileParser>,
    field_mapper: Arc<FieldMapper>,
    dq_validator: Arc<DqValidator>,
}

impl Default for SourceImporterImpl {
    fn default() -> Self {
        Self::new(
            Arc::new(UniversalFileParser),
            Arc::new(FieldMapper),
            Arc::new(DqValidator::default()),
        )
    }
}

impl SourceImporterImpl {
    /// 创建新的 SourceImporter 实例
    ///
    /// # 参数
    /// - file_parser: 文件解析器
    /// - field_mapper: 字段映射器
    /// - dq_validator: DQ 校验器
    pub fn new(
        file_parser: Arc<dyn FileParser>,
        field_mapper: Arc<FieldMapper>,
        dq_validator: Arc<DqValidator>,
    ) -> Self {
        Self {
            file_parser,
            field_mapper,
            dq_validator,
        }
    }

    /// 在阻塞线程池中执行单文件导入
    async fn spawn_import(
        &self,
        source: SourceKind,
        file_path: PathBuf,
        sheet: Option<String>,
    ) -> ImportResult<SourceBatch> {
        let this = self.clone();
        tokio::task::spawn_blocking(move || this.import_blocking(source, &file_path, sheet.as_deref()))
            .await?
    }

    /// 单文件导入（同步）
    fn import_blocking(
        &self,
        source: SourceKind,
        file_path: &Path,
        sheet: Option<&str>,
    ) -> ImportResult<SourceBatch> {
        let start_time = Instant::now();
        let imported_at = Utc::now();
        let batch_id = Uuid::new_v4().to_string();
        let file_name = file_path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| file_path.display().to_string());

        info!(batch_id = %batch_id, source = %source, file = %file_path.display(), "开始导入源文件");

        // === 步骤 1: 解析文件 ===
        debug!("步骤 1: 解析文件");
        let raw_rows = self
            .file_parser
            .parse_to_raw_rows(file_path, sheet)
            .map_err(|e| {
                error!(batch_id = %batch_id, error = %e, "文件解析失败");
                e
            })?;
        let total_rows = raw_rows.len();
        let sheet_used = raw_rows
            .first()
            .and_then(|r| r.sheet.clone())
            .or_else(|| sheet.map(str::to_string));
        debug!(total_rows, "文件解析完成");

        // === 步骤 2: 字段映射 + 清洗 ===
        debug!("步骤 2: 字段映射");
        let mut violations = Vec::new();
        let mut rejected = BTreeSet::new();
        let mapper = &self.field_mapper;

        let records = match source {
            SourceKind::Production => {
                let rows = map_rows(&raw_rows, &mut violations, &mut rejected, |row, dq| {
                    mapper.map_production(row, &file_name, dq)
                });
                // === 步骤 3: DQ 校验 ===
                debug!("步骤 3: DQ 校验");
                violations.extend(self.dq_validator.validate_production(&rows));
                SourceRecords::Production(rows)
            }
            SourceKind::Quality => {
                let rows = map_rows(&raw_rows, &mut violations, &mut rejected, |row, dq| {
                    mapper.map_inspection(row, &file_name, dq)
                });
                let grouped = group_inspections(rows, &mut violations);
                debug!("步骤 3: DQ 校验");
                violations.extend(self.dq_validator.validate_inspections(&grouped));
                SourceRecords::Quality(grouped)
            }
            SourceKind::Shipping => {
                let rows = map_rows(&raw_rows, &mut violations, &mut rejected, |row, dq| {
                    mapper.map_shipment(row, &file_name, dq)
                });
                let grouped = group_shipments(rows, &mut violations);
                debug!("步骤 3: DQ 校验");
                violations.extend(self.dq_validator.validate_shipments(&grouped));
                SourceRecords::Shipping(grouped)
            }
        };

        // 违规按行号排序（同行保持产生顺序）
        violations.sort_by_key(|v| v.row_number);

        // === 步骤 4: 生成导入报告 ===
        let summary = self
            .dq_validator
            .summarize(total_rows, &rejected, &violations);
        let elapsed_ms = start_time.elapsed().as_millis() as u64;

        if summary.blocked > 0 {
            warn!(
                batch_id = %batch_id,
                blocked = summary.blocked,
                "部分行未通过 DQ 校验，已被拒绝"
            );
        }
        info!(
            batch_id = %batch_id,
            source = %source,
            total_rows = summary.total_rows,
            success = summary.success,
            blocked = summary.blocked,
            warning = summary.warning,
            conflict = summary.conflict,
            elapsed_ms,
            "源文件导入完成"
        );

        Ok(SourceBatch {
            records,
            report: ImportReport {
                batch_id,
                source,
                file_name,
                file_path: file_path.display().to_string(),
                sheet: sheet_used,
                summary,
                violations,
                imported_at,
                elapsed_ms,
            },
        })
    }
}

/// 逐行映射；行级错误转为 DQ ERROR 并记录被拒绝的行号
fn map_rows<T>(
    rows: &[RawRow],
    violations: &mut Vec<DqViolation>,
    rejected: &mut BTreeSet<usize>,
    mut map: impl FnMut(&RawRow, &mut Vec<DqViolation>) -> ImportResult<T>,
) -> Vec<T> {
    let mut records = Vec::with_capacity(rows.len());
    for row in rows {
        match map(row, violations) {
            Ok(record) => records.push(record),
            Err(e) => {
                let field = e.row_field().map(|(_, f)| f).unwrap_or("").to_string();
                let lot = columns::LOT.iter().find_map(|alias| row.get(alias));
                violations.push(DqViolation::new(
                    row.row_number,
                    lot,
                    DqLevel::Error,
                    &field,
                    e.to_string(),
                ));
                rejected.insert(row.row_number);
            }
        }
    }
    records
}

#[async_trait]
impl SourceImporter for SourceImporterImpl {
    #[instrument(skip(self, file_path, sheet), fields(source = %source))]
    async fn import_source(
        &self,
        source: SourceKind,
        file_path: &Path,
        sheet: Option<&str>,
    ) -> ImportResult<SourceBatch> {
        self.spawn_import(source, file_path.to_path_buf(), sheet.map(str::to_string))
            .await
    }

    #[instrument(skip(self, manifest), fields(files = manifest.entries.len()))]
    async fn import_all(&self, manifest: &ImportManifest) -> ImportResult<ImportOutcome> {
        let start_time = Instant::now();

        // 标签校验在读取任何文件之前完成
        let resolved = manifest.resolve().map_err(|e| {
            error!(error = %e, "导入清单无效");
            ImportError::from(e)
        })?;

        info!(files = resolved.len(), "开始并发导入源文件");

        let tasks = resolved.into_iter().map(|(kind, entry)| {
            self.spawn_import(kind, entry.path.clone(), entry.sheet.clone())
        });

        // join_all 保持清单顺序
        let mut batches = Vec::with_capacity(manifest.entries.len());
        for result in join_all(tasks).await {
            batches.push(result?);
        }

        let outcome = assemble_dataset(batches);

        info!(
            records = outcome.dataset.record_count(),
            blocked = outcome.total_blocked(),
            elapsed_ms = start_time.elapsed().as_millis() as u64,
            "全部源文件导入完成"
        );

        Ok(outcome)
    }
}
