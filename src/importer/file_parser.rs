// ==========================================
// 批次对账与周报系统 - 文件解析器实现
// ==========================================
// 阶段 0: 文件读取与解析
// 支持: Excel (.xlsx/.xls) / CSV (.csv)
// 红线: 表头统一规整为 snake_case；行号按源文件计（表头为第 1 行）
// ==========================================

use crate::importer::error::{ImportError, ImportResult};
use crate::importer::source_importer_trait::FileParser;
use calamine::{open_workbook_auto, Reader};
use csv::ReaderBuilder;
use std::collections::HashMap;
use std::fs::File;
use std::path::Path;

// ==========================================
// RawRow - 原始行
// ==========================================
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawRow {
    pub row_number: usize,     // 源文件行号
    pub sheet: Option<String>, // 工作表（CSV 为 None）
    pub values: HashMap<String, String>,
}

impl RawRow {
    /// 按规整后的列名取值（已 trim；空串视为缺失）
    pub fn get(&self, column: &str) -> Option<&str> {
        self.values
            .get(column)
            .map(|v| v.as_str())
            .filter(|v| !v.is_empty())
    }

    fn is_blank(&self) -> bool {
        self.values.values().all(|v| v.is_empty())
    }
}

/// 表头规整: trim + 小写，空格与斜杠替换为下划线
pub fn normalize_header(header: &str) -> String {
    header
        .trim_start_matches('\u{feff}')
        .trim()
        .to_lowercase()
        .replace([' ', '/'], "_")
}

fn build_row(
    headers: &[String],
    values: impl Iterator<Item = String>,
    row_number: usize,
    sheet: Option<&str>,
) -> RawRow {
    let mut map = HashMap::new();
    for (header, value) in headers.iter().zip(values) {
        if header.is_empty() {
            continue;
        }
        // 同名列以第一列为准
        map.entry(header.clone())
            .or_insert_with(|| value.trim().to_string());
    }
    RawRow {
        row_number,
        sheet: sheet.map(str::to_string),
        values: map,
    }
}

fn check_exists(path: &Path) -> ImportResult<()> {
    if !path.exists() {
        return Err(ImportError::FileNotFound(path.display().to_string()));
    }
    Ok(())
}

fn extension_of(path: &Path) -> String {
    path.extension()
        .and_then(|e| e.to_str())
        .unwrap_or("")
        .to_lowercase()
}

// ==========================================
// CSV Parser 实现
// ==========================================
pub struct CsvParser;

impl FileParser for CsvParser {
    fn parse_to_raw_rows(&self, file_path: &Path, _sheet: Option<&str>) -> ImportResult<Vec<RawRow>> {
        check_exists(file_path)?;

        let ext = extension_of(file_path);
        if !ext.is_empty() && ext != "csv" {
            return Err(ImportError::UnsupportedFormat(ext));
        }

        let file = File::open(file_path)?;
        let mut reader = ReaderBuilder::new()
            .has_headers(true)
            .flexible(true) // 允许行长度不一致
            .from_reader(file);

        let headers: Vec<String> = reader.headers()?.iter().map(normalize_header).collect();

        let mut rows = Vec::new();
        for (idx, result) in reader.records().enumerate() {
            let record = result?;
            // csv 会跳过真正的空行，行号以记录起始行为准
            let row_number = record
                .position()
                .map(|p| p.line() as usize)
                .unwrap_or(idx + 2);

            let row = build_row(
                &headers,
                record.iter().map(str::to_string),
                row_number,
                None,
            );

            // 跳过完全空白的行
            if row.is_blank() {
                continue;
            }
            rows.push(row);
        }

        Ok(rows)
    }
}

// ==========================================
// Excel Parser 实现
// ==========================================
pub struct ExcelParser;

impl FileParser for ExcelParser {
    fn parse_to_raw_rows(&self, file_path: &Path, sheet: Option<&str>) -> ImportResult<Vec<RawRow>> {
        check_exists(file_path)?;

        let ext = extension_of(file_path);
        if ext != "xlsx" && ext != "xls" {
            return Err(ImportError::UnsupportedFormat(ext));
        }

        let mut workbook = open_workbook_auto(file_path)?;

        // 指定工作表，否则取第一个
        let sheet_names = workbook.sheet_names();
        let sheet_name = match sheet {
            Some(name) => sheet_names
                .iter()
                .find(|s| s.as_str() == name)
                .cloned()
                .ok_or_else(|| ImportError::SheetNotFound(name.to_string()))?,
            None => sheet_names
                .first()
                .cloned()
                .ok_or_else(|| ImportError::ExcelParseError("Excel 文件无工作表".to_string()))?,
        };

        let range = workbook.worksheet_range(&sheet_name)?;
        // 数据区不一定从 A1 开始
        let first_row = range.start().map(|(row, _)| row as usize).unwrap_or(0);

        let mut range_rows = range.rows();
        let header_row = match range_rows.next() {
            Some(row) => row,
            None => return Ok(Vec::new()),
        };
        let headers: Vec<String> = header_row
            .iter()
            .map(|cell| normalize_header(&cell.to_string()))
            .collect();

        let mut rows = Vec::new();
        for (idx, data_row) in range_rows.enumerate() {
            // 表头所在行 = first_row + 1（1 基），数据行依次 +1
            let row_number = first_row + idx + 2;
            let row = build_row(
                &headers,
                data_row.iter().map(|cell| cell.to_string()),
                row_number,
                Some(&sheet_name),
            );

            if row.is_blank() {
                continue;
            }
            rows.push(row);
        }

        Ok(rows)
    }
}

// ==========================================
// 通用文件解析器（根据扩展名自动选择）
// ==========================================
pub struct UniversalFileParser;

impl FileParser for UniversalFileParser {
    fn parse_to_raw_rows(&self, file_path: &Path, sheet: Option<&str>) -> ImportResult<Vec<RawRow>> {
        match extension_of(file_path).as_str() {
            "csv" => CsvParser.parse_to_raw_rows(file_path, sheet),
            "xlsx" | "xls" => ExcelParser.parse_to_raw_rows(file_path, sheet),
            other => Err(ImportError::UnsupportedFormat(other.to_string())),
        }
    }
}
