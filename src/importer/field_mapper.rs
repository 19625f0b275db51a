// ==========================================
// 批次对账与周报系统 - 字段映射器实现
// ==========================================
// 职责: 源列（别名表）→ 已类型化记录 + 类型转换
// 红线: 闭合枚举无法识别 → 行被拒绝（Err）；可选字段无法解析 → 置空 + DQ 警告
// ==========================================

use crate::domain::import::{DqLevel, DqViolation};
use crate::domain::records::{
    DefectInstance, DefectType, InspectionRecord, ProductionRecord, ShipmentLine, ShipmentRecord,
    SourceRef,
};
use crate::domain::types::ShipStatus;
use crate::importer::data_cleaner::DataCleaner;
use crate::importer::error::{ImportError, ImportResult};
use crate::importer::file_parser::RawRow;
use chrono::{NaiveDate, TimeZone, Utc};

// ==========================================
// 列名别名表（表头已规整为 snake_case）
// ==========================================
pub mod columns {
    // 通用
    pub const LOT: &[&str] = &["raw_lot_id", "lot_id", "lot", "lot_number"];
    pub const NORMALIZED_LOT: &[&str] = &["normalized_lot_id", "lot_key"];
    pub const PART_NUMBER: &[&str] = &["part_number", "part_no", "part"];
    pub const NOTE: &[&str] = &["note", "notes", "comment", "comments"];

    // 生产
    pub const PRODUCTION_LINE: &[&str] = &["production_line", "line_name", "line"];
    pub const PRODUCTION_DATE: &[&str] = &["production_date", "run_date", "date"];
    pub const SHIFT: &[&str] = &["shift"];
    pub const PLANNED_UNITS: &[&str] = &["planned_units", "planned_qty", "planned"];
    pub const ACTUAL_UNITS: &[&str] = &["actual_units", "actual_qty", "actual"];
    pub const DOWNTIME: &[&str] = &["downtime_minutes", "downtime_min", "downtime"];
    pub const LINE_ISSUE: &[&str] = &["line_issue", "line_issue_flag", "issue"];
    pub const ISSUE_CATEGORY: &[&str] = &["primary_issue", "issue_category", "defect_category"];
    pub const ISSUE_TEXT: &[&str] = &["issue_text", "issue_description", "issue_notes"];

    // 质检
    pub const INSPECTION_ID: &[&str] = &["inspection_id", "inspection_no"];
    pub const INSPECTED_AT: &[&str] = &["inspected_at", "inspection_date", "inspection_time", "date"];
    pub const INSPECTION_TYPE: &[&str] = &["inspection_type", "type"];
    pub const INSPECTOR: &[&str] = &["inspector"];
    pub const SAMPLE_SIZE: &[&str] = &["sample_size"];
    pub const RESULT: &[&str] = &["result", "inspection_result"];
    pub const DEFECT_CODE: &[&str] = &["defect_code"];
    pub const DEFECT_CATEGORY: &[&str] = &["defect_category", "defect_type", "category"];
    pub const DEFECT_QUANTITY: &[&str] = &["defect_quantity", "defect_qty", "quantity", "qty"];
    pub const SEVERITY: &[&str] = &["severity"];

    // 发运
    pub const SHIPMENT_ID: &[&str] = &["shipment_id", "shipment_no", "shipment"];
    pub const SHIP_DATE: &[&str] = &["ship_date", "shipping_date", "date"];
    pub const SHIP_STATUS: &[&str] = &["ship_status", "shipping_status", "status"];
    pub const CUSTOMER: &[&str] = &["customer", "customer_name"];
    pub const SALES_ORDER: &[&str] = &["sales_order", "sales_order_no", "so_number"];
    pub const SHIP_QUANTITY: &[&str] = &["quantity", "qty", "ship_qty"];
}

const CLEANER: DataCleaner = DataCleaner;

pub struct FieldMapper;

impl FieldMapper {
    // ==========================================
    // 生产记录
    // ==========================================
    pub fn map_production(
        &self,
        row: &RawRow,
        file: &str,
        dq: &mut Vec<DqViolation>,
    ) -> ImportResult<ProductionRecord> {
        let raw_lot_id = self.get_string(row, columns::LOT).unwrap_or_default();
        let (production_date, date_error) =
            self.parse_date(row, columns::PRODUCTION_DATE);

        let downtime_minutes = self
            .parse_number(row, columns::DOWNTIME, &raw_lot_id, dq)
            .unwrap_or(0.0);

        Ok(ProductionRecord {
            record_id: 0,
            source_ref: self.source_ref(row, file),
            provided_lot_key: self.get_string(row, columns::NORMALIZED_LOT),
            production_date,
            date_error,
            line: self.get_string(row, columns::PRODUCTION_LINE).unwrap_or_default(),
            part_number: self.get_string(row, columns::PART_NUMBER),
            shift: self.get_string(row, columns::SHIFT),
            planned_units: self.parse_count(row, columns::PLANNED_UNITS, &raw_lot_id, dq),
            actual_units: self.parse_count(row, columns::ACTUAL_UNITS, &raw_lot_id, dq),
            downtime_minutes,
            line_issue_flag: CLEANER.parse_truthy_flag(self.get_str(row, columns::LINE_ISSUE)),
            issue_category: self.get_string(row, columns::ISSUE_CATEGORY),
            issue_text: self.get_string(row, columns::ISSUE_TEXT),
            note: self.get_string(row, columns::NOTE),
            raw_lot_id,
        })
    }

    // ==========================================
    // 质检记录（一行 = 一次检验 + 至多一条缺陷）
    // ==========================================
    pub fn map_inspection(
        &self,
        row: &RawRow,
        file: &str,
        dq: &mut Vec<DqViolation>,
    ) -> ImportResult<InspectionRecord> {
        let raw_lot_id = self.get_string(row, columns::LOT).unwrap_or_default();

        let result_text = self.get_string(row, columns::RESULT).ok_or_else(|| {
            ImportError::FieldMappingError {
                row: row.row_number,
                message: "质检结果为空".to_string(),
            }
        })?;
        let result = CLEANER
            .parse_inspection_result(&result_text)
            .ok_or_else(|| ImportError::UnknownEnumValue {
                row: row.row_number,
                field: "result".to_string(),
                value: result_text.clone(),
            })?;

        let (inspected_at, date_error) = match self.get_str(row, columns::INSPECTED_AT) {
            None => (None, Some("日期为空".to_string())),
            Some(value) => match CLEANER.parse_mixed_datetime(value) {
                Ok(ts) => (Some(Utc.from_utc_datetime(&ts)), None),
                Err(e) => (None, Some(e)),
            },
        };

        let defects = self
            .map_defect(row, &raw_lot_id, dq)
            .into_iter()
            .collect();

        Ok(InspectionRecord {
            record_id: 0,
            source_ref: self.source_ref(row, file),
            provided_lot_key: self.get_string(row, columns::NORMALIZED_LOT),
            inspection_id: self.get_string(row, columns::INSPECTION_ID),
            inspected_at,
            date_error,
            inspection_type: self.get_string(row, columns::INSPECTION_TYPE),
            inspector: self.get_string(row, columns::INSPECTOR),
            sample_size: self.parse_count(row, columns::SAMPLE_SIZE, &raw_lot_id, dq),
            result,
            part_number: self.get_string(row, columns::PART_NUMBER),
            defects,
            note: self.get_string(row, columns::NOTE),
            raw_lot_id,
        })
    }

    /// 缺陷列（代码/分类任一非空即视为有缺陷；数量缺失按 1 计）
    fn map_defect(
        &self,
        row: &RawRow,
        raw_lot_id: &str,
        dq: &mut Vec<DqViolation>,
    ) -> Option<DefectInstance> {
        let code = self.get_string(row, columns::DEFECT_CODE);
        let category = self.get_string(row, columns::DEFECT_CATEGORY);
        if code.is_none() && category.is_none() {
            return None;
        }

        let quantity = match self.get_str(row, columns::DEFECT_QUANTITY) {
            None => 1,
            Some(value) => match CLEANER.parse_number(value) {
                Ok(n) if n >= 1.0 && n.fract() == 0.0 && n <= u32::MAX as f64 => n as u32,
                _ => {
                    dq.push(DqViolation::new(
                        row.row_number,
                        Some(raw_lot_id),
                        DqLevel::Error,
                        "defect_quantity",
                        format!("缺陷数量必须为正整数, 实际为 {:?}，该缺陷已丢弃", value),
                    ));
                    return None;
                }
            },
        };

        let severity = self.get_str(row, columns::SEVERITY).and_then(|value| {
            let parsed = CLEANER.parse_severity(value);
            if parsed.is_none() {
                dq.push(DqViolation::new(
                    row.row_number,
                    Some(raw_lot_id),
                    DqLevel::Warning,
                    "severity",
                    format!("无法识别的严重度 {:?}，按未填写处理", value),
                ));
            }
            parsed
        });

        let code_text = code.clone().or_else(|| category.clone()).unwrap_or_default();
        let category_text = category.or(code).unwrap_or_default();

        Some(DefectInstance {
            defect_type: DefectType {
                code: code_text,
                category: category_text,
                default_severity: None,
            },
            quantity,
            severity_override: severity,
        })
    }

    // ==========================================
    // 发运记录（一行 = 一张发运单 + 一条明细）
    // ==========================================
    pub fn map_shipment(
        &self,
        row: &RawRow,
        file: &str,
        dq: &mut Vec<DqViolation>,
    ) -> ImportResult<ShipmentRecord> {
        let raw_lot_id = self.get_string(row, columns::LOT).unwrap_or_default();

        let status = match self.get_string(row, columns::SHIP_STATUS) {
            None => {
                dq.push(DqViolation::new(
                    row.row_number,
                    Some(&raw_lot_id),
                    DqLevel::Warning,
                    "ship_status",
                    "发运状态为空，按 On Hold 处理",
                ));
                ShipStatus::OnHold
            }
            Some(text) => CLEANER.parse_ship_status(&text).ok_or_else(|| {
                ImportError::UnknownEnumValue {
                    row: row.row_number,
                    field: "ship_status".to_string(),
                    value: text.clone(),
                }
            })?,
        };

        let (ship_date, date_error) = self.parse_date(row, columns::SHIP_DATE);

        let line = ShipmentLine {
            record_id: 0,
            source_ref: self.source_ref(row, file),
            provided_lot_key: self.get_string(row, columns::NORMALIZED_LOT),
            quantity: self.parse_count(row, columns::SHIP_QUANTITY, &raw_lot_id, dq),
            part_number: self.get_string(row, columns::PART_NUMBER),
            note: self.get_string(row, columns::NOTE),
            raw_lot_id,
        };

        Ok(ShipmentRecord {
            shipment_id: self.get_string(row, columns::SHIPMENT_ID),
            ship_date,
            date_error,
            status,
            customer: self.get_string(row, columns::CUSTOMER),
            sales_order: self.get_string(row, columns::SALES_ORDER),
            lines: vec![line],
        })
    }

    // ==========================================
    // 取值工具
    // ==========================================

    /// 按别名顺序取第一个非空值
    fn get_str<'a>(&self, row: &'a RawRow, aliases: &[&str]) -> Option<&'a str> {
        aliases.iter().find_map(|alias| row.get(alias))
    }

    fn get_string(&self, row: &RawRow, aliases: &[&str]) -> Option<String> {
        CLEANER.normalize_null(self.get_str(row, aliases))
    }

    fn source_ref(&self, row: &RawRow, file: &str) -> SourceRef {
        SourceRef::new(file, row.sheet.clone(), row.row_number)
    }

    /// 日期（缺失或无法解析 → None + 原因）
    fn parse_date(&self, row: &RawRow, aliases: &[&str]) -> (Option<NaiveDate>, Option<String>) {
        match self.get_str(row, aliases) {
            None => (None, Some("日期为空".to_string())),
            Some(value) => match CLEANER.parse_mixed_date(value) {
                Ok(date) => (Some(date), None),
                Err(e) => (None, Some(e)),
            },
        }
    }

    fn parse_count(
        &self,
        row: &RawRow,
        aliases: &[&str],
        raw_lot_id: &str,
        dq: &mut Vec<DqViolation>,
    ) -> Option<u32> {
        let value = self.get_str(row, aliases)?;
        match CLEANER.parse_count(value) {
            Ok(n) => Some(n),
            Err(message) => {
                dq.push(DqViolation::new(
                    row.row_number,
                    Some(raw_lot_id),
                    DqLevel::Warning,
                    aliases[0],
                    message,
                ));
                None
            }
        }
    }

    fn parse_number(
        &self,
        row: &RawRow,
        aliases: &[&str],
        raw_lot_id: &str,
        dq: &mut Vec<DqViolation>,
    ) -> Option<f64> {
        let value = self.get_str(row, aliases)?;
        match CLEANER.parse_number(value) {
            Ok(n) => Some(n),
            Err(message) => {
                dq.push(DqViolation::new(
                    row.row_number,
                    Some(raw_lot_id),
                    DqLevel::Warning,
                    aliases[0],
                    message,
                ));
                None
            }
        }
    }
}
