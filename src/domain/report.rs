// ==========================================
// 批次对账与周报系统 - 周报领域模型
// ==========================================
// 职责: 周窗口 / 产线排名 / 分类趋势 / 下钻分组
// 红线: 中间分组必须保留，下钻不允许重新计算
// ==========================================

use crate::domain::records::{RecordId, SourceRef};
use crate::domain::types::{ComplianceIndicator, TrendDirection};
use chrono::{Datelike, Duration, NaiveDate};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

// ==========================================
// WeekWindow - 周窗口（周一至周日，含两端）
// ==========================================
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WeekWindow {
    pub start: NaiveDate, // 周一
    pub end: NaiveDate,   // 周日
}

impl WeekWindow {
    /// 锚点日期所在的周（锚点可以是周中任意一天）
    pub fn containing(anchor: NaiveDate) -> Self {
        let offset = anchor.weekday().num_days_from_monday() as i64;
        let start = anchor - Duration::days(offset);
        Self {
            start,
            end: start + Duration::days(6),
        }
    }

    /// 上一周（整体平移 7 天）
    pub fn previous(&self) -> Self {
        Self {
            start: self.start - Duration::days(7),
            end: self.end - Duration::days(7),
        }
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        date >= self.start && date <= self.end
    }
}

// ==========================================
// LineRanking - 产线问题排名
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LineRanking {
    pub rank: usize,
    pub line: String,
    pub issue_runs: usize,
    pub total_runs: usize,
    pub downtime_minutes: f64,
    pub unique_lots: usize,
}

// ==========================================
// CategoryTrend - 分类周环比
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategoryTrend {
    pub category: String,
    pub current_total: u64,
    pub previous_total: u64,
    pub delta: i64,
    pub pct_change: Option<f64>, // 上周为 0 时无意义
    pub direction: TrendDirection,
}

// ==========================================
// 下钻分组
// ==========================================

/// 本周某产线的一次生产
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunRef {
    pub record_id: RecordId,
    pub canonical_key: String,
    pub production_date: NaiveDate,
    pub downtime_minutes: f64,
    pub is_issue: bool,
    pub source_ref: SourceRef,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LineGroup {
    pub line: String,
    pub runs: Vec<RunRef>,
}

impl LineGroup {
    pub fn issue_runs(&self) -> impl Iterator<Item = &RunRef> {
        self.runs.iter().filter(|r| r.is_issue)
    }
}

/// 计入某分类合计的一笔贡献（缺陷数量或问题生产）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrendContribution {
    pub record_id: RecordId,
    pub canonical_key: String,
    pub date: NaiveDate,
    pub quantity: u64,
    pub detail: Option<String>, // 缺陷代码 / 问题描述
    pub source_ref: SourceRef,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CategoryGroup {
    pub category: String,
    pub current: Vec<TrendContribution>,
    pub previous: Vec<TrendContribution>,
}

impl CategoryGroup {
    pub fn current_total(&self) -> u64 {
        self.current.iter().map(|c| c.quantity).sum()
    }

    pub fn previous_total(&self) -> u64 {
        self.previous.iter().map(|c| c.quantity).sum()
    }
}

// ==========================================
// WeeklySummary - 周报结果
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeeklySummary {
    pub window: WeekWindow,
    pub previous_window: WeekWindow,
    pub issue_rule: String,

    pub ranking: Vec<LineRanking>,
    pub defect_trends: Vec<CategoryTrend>,
    pub issue_trends: Vec<CategoryTrend>,

    pub line_groups: BTreeMap<String, LineGroup>,
    pub defect_groups: BTreeMap<String, CategoryGroup>,
    pub issue_groups: BTreeMap<String, CategoryGroup>,

    pub included_lots: usize,
    pub excluded_lots: Vec<String>,
    pub undated_records: usize, // 日期无法解析而被排除在窗口外的记录数
}

impl WeeklySummary {
    pub fn line_group(&self, line: &str) -> Option<&LineGroup> {
        self.line_groups.get(line)
    }

    pub fn defect_group(&self, category: &str) -> Option<&CategoryGroup> {
        self.defect_groups.get(category)
    }

    pub fn issue_group(&self, category: &str) -> Option<&CategoryGroup> {
        self.issue_groups.get(category)
    }
}

// ==========================================
// DrillDownRow - 下钻明细行
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DrillDownRow {
    pub canonical_key: String,
    pub record_id: RecordId,
    pub date: NaiveDate,
    pub in_current_week: bool,
    pub line: Option<String>,
    pub category: Option<String>,
    pub detail: Option<String>,
    pub quantity: u64,
    pub raw_lot_id: Option<String>,
    pub source_ref: SourceRef,
    pub shipping_status_display: String,
    pub latest_ship_date: Option<NaiveDate>,
    pub compliance: ComplianceIndicator,
    pub is_problematic_but_shipped: bool,
    pub needs_review: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_week_window_mid_week_anchor() {
        // 2026-02-11 为周三
        let window = WeekWindow::containing(date(2026, 2, 11));
        assert_eq!(window.start, date(2026, 2, 9));
        assert_eq!(window.end, date(2026, 2, 15));

        let previous = window.previous();
        assert_eq!(previous.start, date(2026, 2, 2));
        assert_eq!(previous.end, date(2026, 2, 8));
    }

    #[test]
    fn test_week_window_boundaries_inclusive() {
        let monday = WeekWindow::containing(date(2026, 2, 9));
        let sunday = WeekWindow::containing(date(2026, 2, 15));
        assert_eq!(monday, sunday);
        assert!(monday.contains(date(2026, 2, 9)));
        assert!(monday.contains(date(2026, 2, 15)));
        assert!(!monday.contains(date(2026, 2, 16)));
        assert!(!monday.contains(date(2026, 2, 8)));
    }

    #[test]
    fn test_week_window_across_year_end() {
        // 2026-01-01 为周四
        let window = WeekWindow::containing(date(2026, 1, 1));
        assert_eq!(window.start, date(2025, 12, 29));
        assert_eq!(window.end, date(2026, 1, 4));
    }
}
