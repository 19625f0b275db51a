// ==========================================
// 批次对账与周报系统 - 数据清洗器实现
// ==========================================
// 职责: TRIM / NULL 标准化 / 布尔标记 / 混合日期 / 数值 / 闭合枚举
// 红线: 无法解析的值返回 Err，由调用方记 DQ，绝不猜测
// ==========================================

use crate::domain::types::{InspectionResult, Severity, ShipStatus};
use chrono::{DateTime, Duration, NaiveDate, NaiveDateTime};

/// 带时间的格式
const DATETIME_FORMATS: [&str; 5] = [
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%d %H:%M",
    "%Y/%m/%d %H:%M:%S",
    "%m/%d/%Y %H:%M",
];

/// 纯日期格式（按顺序尝试）
const DATE_FORMATS: [&str; 4] = ["%Y-%m-%d", "%Y/%m/%d", "%m/%d/%Y", "%d.%m.%Y"];

/// Excel 序列日期下限（1970-01-01）；更小的裸数字视为录入错误而非日期
const EXCEL_SERIAL_MIN: f64 = 25_569.0;

/// Excel 序列日期上限（9999-12-31）
const EXCEL_SERIAL_MAX: f64 = 2_958_465.0;

pub struct DataCleaner;

impl DataCleaner {
    pub fn clean_text(&self, value: &str, uppercase: bool) -> String {
        let trimmed = value.trim();
        if uppercase {
            trimmed.to_uppercase()
        } else {
            trimmed.to_string()
        }
    }

    /// 标准化 NULL 值（空字符串/空白/常见占位符 → None）
    pub fn normalize_null(&self, value: Option<&str>) -> Option<String> {
        value.and_then(|v| {
            let trimmed = v.trim();
            match trimmed.to_lowercase().as_str() {
                "" | "null" | "none" | "n/a" | "na" | "nan" => None,
                _ => Some(trimmed.to_string()),
            }
        })
    }

    /// 布尔标记（yes/y/true/t/1/是 → true，其余 → false）
    pub fn parse_truthy_flag(&self, value: Option<&str>) -> bool {
        match value {
            None => false,
            Some(v) => matches!(
                v.trim().to_lowercase().as_str(),
                "yes" | "y" | "true" | "t" | "1" | "是"
            ),
        }
    }

    /// 混合格式日期时间
    ///
    /// # 支持
    /// - RFC 3339（保留当地日期时间，不换算到 UTC）
    /// - `%Y-%m-%d %H:%M:%S` 等带时间格式
    /// - `%Y-%m-%d` / `%Y/%m/%d` / `%m/%d/%Y` / `%Y%m%d` / `%d.%m.%Y`
    /// - Excel 序列日期（1900 日期系统，仅 1970-01-01 之后）
    pub fn parse_mixed_datetime(&self, value: &str) -> Result<NaiveDateTime, String> {
        let value = value.trim();
        if value.is_empty() {
            return Err("日期为空".to_string());
        }

        if let Ok(ts) = DateTime::parse_from_rfc3339(value) {
            return Ok(ts.naive_local());
        }

        for format in DATETIME_FORMATS {
            if let Ok(ts) = NaiveDateTime::parse_from_str(value, format) {
                return Ok(ts);
            }
        }

        for format in DATE_FORMATS {
            if let Ok(date) = NaiveDate::parse_from_str(value, format) {
                return start_of(date, value);
            }
        }

        // YYYYMMDD 只接受恰好 8 位数字，避免吞掉 Excel 序列号
        if value.len() == 8 && value.chars().all(|c| c.is_ascii_digit()) {
            if let Ok(date) = NaiveDate::parse_from_str(value, "%Y%m%d") {
                return start_of(date, value);
            }
        }

        if let Ok(serial) = value.parse::<f64>() {
            return excel_serial_to_datetime(serial)
                .ok_or_else(|| format!("无法识别的日期: {:?}", value));
        }

        Err(format!("无法识别的日期: {:?}", value))
    }

    pub fn parse_mixed_date(&self, value: &str) -> Result<NaiveDate, String> {
        self.parse_mixed_datetime(value).map(|ts| ts.date())
    }

    /// 非负整数（兼容 Excel 导出的 "12.0"）
    pub fn parse_count(&self, value: &str) -> Result<u32, String> {
        let number = self.parse_number(value)?;
        if number < 0.0 || number.fract() != 0.0 || number > u32::MAX as f64 {
            return Err(format!("期望非负整数, 实际为: {:?}", value.trim()));
        }
        Ok(number as u32)
    }

    /// 数值（允许千分位逗号）
    pub fn parse_number(&self, value: &str) -> Result<f64, String> {
        let compact: String = value.trim().chars().filter(|c| *c != ',').collect();
        match compact.parse::<f64>() {
            Ok(n) if n.is_finite() => Ok(n),
            _ => Err(format!("期望数值, 实际为: {:?}", value.trim())),
        }
    }

    // ===== 闭合枚举 =====

    pub fn parse_inspection_result(&self, value: &str) -> Option<InspectionResult> {
        InspectionResult::parse(value)
    }

    pub fn parse_ship_status(&self, value: &str) -> Option<ShipStatus> {
        ShipStatus::parse(value)
    }

    pub fn parse_severity(&self, value: &str) -> Option<Severity> {
        Severity::parse(value)
    }
}

fn start_of(date: NaiveDate, value: &str) -> Result<NaiveDateTime, String> {
    date.and_hms_opt(0, 0, 0)
        .ok_or_else(|| format!("无法识别的日期: {:?}", value))
}

/// Excel 序列日期 → 日期时间（基准 1899-12-30，兼容 1900 闰年 bug）
fn excel_serial_to_datetime(serial: f64) -> Option<NaiveDateTime> {
    if !(EXCEL_SERIAL_MIN..=EXCEL_SERIAL_MAX).contains(&serial) {
        return None;
    }
    let base = NaiveDate::from_ymd_opt(1899, 12, 30)?.and_hms_opt(0, 0, 0)?;
    let days = serial.trunc() as i64;
    let seconds = (serial.fract() * 86_400.0).round() as i64;
    base.checked_add_signed(Duration::days(days))?
        .checked_add_signed(Duration::seconds(seconds))
}
