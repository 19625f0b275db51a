// ==========================================
// 批次对账与周报系统 - 周报汇总引擎
// ==========================================
// 职责: 产线问题排名 + 缺陷分类周环比 + 问题分类周环比
// 口径: 周一至周日（含两端），锚点落在周中时先归到所在周
// 红线: 中间分组全部保留在 WeeklySummary 中，下钻不重新计算
// ==========================================

use crate::domain::consolidated::{ConsolidatedLotView, LinkedDataset};
use crate::domain::records::{RecordId, SourceRef};
use crate::domain::report::{
    CategoryGroup, CategoryTrend, DrillDownRow, LineGroup, LineRanking, RunRef,
    TrendContribution, WeekWindow, WeeklySummary,
};
use crate::domain::types::TrendDirection;
use crate::engine::issue_rule::{IssueContext, IssueRule};
use chrono::NaiveDate;
use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet};
use tracing::{debug, info, instrument};

/// 缺失分类 / 产线时的显示值
pub const UNSPECIFIED: &str = "Unspecified";

/// 趋势表类型
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrendKind {
    Defect,
    Issue,
}

fn label_or_unspecified(value: Option<&str>) -> String {
    match value.map(str::trim) {
        Some(v) if !v.is_empty() => v.to_string(),
        _ => UNSPECIFIED.to_string(),
    }
}

// ==========================================
// WeeklyAggregator - 周报汇总引擎
// ==========================================
#[derive(Debug, Default)]
pub struct WeeklyAggregator;

impl WeeklyAggregator {
    pub fn new() -> Self {
        Self
    }

    /// 计算周报
    ///
    /// # 参数
    /// - linked: 关联层输出（只使用 aggregation_scope 内的批次）
    /// - anchor: 周锚点（可为周中任意一天）
    /// - rule: 问题判定规则
    #[instrument(skip(self, linked, rule), fields(rule = rule.text()))]
    pub fn aggregate(
        &self,
        linked: &LinkedDataset,
        anchor: NaiveDate,
        rule: &IssueRule,
    ) -> WeeklySummary {
        let window = WeekWindow::containing(anchor);
        let previous_window = window.previous();

        let mut line_groups: BTreeMap<String, LineGroup> = BTreeMap::new();
        let mut defect_groups: BTreeMap<String, CategoryGroup> = BTreeMap::new();
        let mut issue_groups: BTreeMap<String, CategoryGroup> = BTreeMap::new();
        let mut included_lots = 0;
        let mut undated_records = 0;

        for view in linked.aggregation_scope() {
            included_lots += 1;
            let latest_result = view.latest_result();

            // 生产: 产线分组 + 问题分类
            for run in &view.production_runs {
                let Some(date) = run.production_date else {
                    undated_records += 1;
                    continue;
                };

                let is_issue = rule.is_issue(&IssueContext {
                    run,
                    inspection_result: latest_result,
                });

                if window.contains(date) {
                    let line = label_or_unspecified(Some(&run.line));
                    line_groups
                        .entry(line.clone())
                        .or_insert_with(|| LineGroup {
                            line,
                            runs: Vec::new(),
                        })
                        .runs
                        .push(RunRef {
                            record_id: run.record_id,
                            canonical_key: view.canonical_key.clone(),
                            production_date: date,
                            downtime_minutes: run.downtime_minutes,
                            is_issue,
                            source_ref: run.source_ref.clone(),
                        });
                }

                if is_issue {
                    let category = label_or_unspecified(run.issue_category.as_deref());
                    push_contribution(
                        &mut issue_groups,
                        &window,
                        &previous_window,
                        category,
                        TrendContribution {
                            record_id: run.record_id,
                            canonical_key: view.canonical_key.clone(),
                            date,
                            quantity: 1,
                            detail: run.issue_text.clone(),
                            source_ref: run.source_ref.clone(),
                        },
                    );
                }
            }

            // 质检: 缺陷分类按检验日期归周
            for inspection in &view.inspections {
                let Some(date) = inspection.inspected_on() else {
                    undated_records += 1;
                    continue;
                };

                for defect in &inspection.defects {
                    let category = label_or_unspecified(Some(&defect.defect_type.category));
                    push_contribution(
                        &mut defect_groups,
                        &window,
                        &previous_window,
                        category,
                        TrendContribution {
                            record_id: inspection.record_id,
                            canonical_key: view.canonical_key.clone(),
                            date,
                            quantity: u64::from(defect.quantity),
                            detail: Some(defect.defect_type.code.clone()),
                            source_ref: inspection.source_ref.clone(),
                        },
                    );
                }
            }
        }

        let ranking = build_ranking(&line_groups);
        let defect_trends = build_trends(&defect_groups);
        let issue_trends = build_trends(&issue_groups);
        let excluded_lots: Vec<String> = linked
            .excluded_keys()
            .into_iter()
            .map(|k| k.to_string())
            .collect();

        debug!(
            lines = line_groups.len(),
            defect_categories = defect_groups.len(),
            issue_categories = issue_groups.len(),
            "分组完成"
        );
        info!(
            week_start = %window.start,
            week_end = %window.end,
            ranked_lines = ranking.len(),
            defect_trends = defect_trends.len(),
            issue_trends = issue_trends.len(),
            included_lots,
            excluded_lots = excluded_lots.len(),
            undated_records,
            "周报汇总完成"
        );

        WeeklySummary {
            window,
            previous_window,
            issue_rule: rule.text().to_string(),
            ranking,
            defect_trends,
            issue_trends,
            line_groups,
            defect_groups,
            issue_groups,
            included_lots,
            excluded_lots,
            undated_records,
        }
    }
}

// 窗口外的贡献直接丢弃；只在命中窗口时建分组
fn push_contribution(
    groups: &mut BTreeMap<String, CategoryGroup>,
    window: &WeekWindow,
    previous_window: &WeekWindow,
    category: String,
    contribution: TrendContribution,
) {
    let in_current = window.contains(contribution.date);
    if !in_current && !previous_window.contains(contribution.date) {
        return;
    }

    let group = groups
        .entry(category.clone())
        .or_insert_with(|| CategoryGroup {
            category,
            ..CategoryGroup::default()
        });

    if in_current {
        group.current.push(contribution);
    } else {
        group.previous.push(contribution);
    }
}

/// 产线排名: 问题次数降序 → 停机时间降序 → 产线名升序
pub fn build_ranking(line_groups: &BTreeMap<String, LineGroup>) -> Vec<LineRanking> {
    let mut rows: Vec<LineRanking> = line_groups
        .values()
        .map(|group| LineRanking {
            rank: 0,
            line: group.line.clone(),
            issue_runs: group.issue_runs().count(),
            total_runs: group.runs.len(),
            downtime_minutes: group.runs.iter().map(|r| r.downtime_minutes).sum(),
            unique_lots: group
                .runs
                .iter()
                .map(|r| r.canonical_key.as_str())
                .collect::<BTreeSet<_>>()
                .len(),
        })
        .collect();

    rows.sort_by(|a, b| {
        b.issue_runs
            .cmp(&a.issue_runs)
            .then_with(|| {
                b.downtime_minutes
                    .partial_cmp(&a.downtime_minutes)
                    .unwrap_or(Ordering::Equal)
            })
            .then_with(|| a.line.cmp(&b.line))
    });

    for (idx, row) in rows.iter_mut().enumerate() {
        row.rank = idx + 1;
    }

    rows
}

/// 分类周环比: 本周降序 → 差值降序 → 分类名升序；两周都为 0 的分类不输出
pub fn build_trends(groups: &BTreeMap<String, CategoryGroup>) -> Vec<CategoryTrend> {
    let mut rows: Vec<CategoryTrend> = groups
        .values()
        .filter_map(|group| {
            let current_total = group.current_total();
            let previous_total = group.previous_total();
            if current_total == 0 && previous_total == 0 {
                return None;
            }

            let delta = current_total as i64 - previous_total as i64;
            let pct_change = if previous_total > 0 {
                Some(delta as f64 / previous_total as f64 * 100.0)
            } else {
                None
            };

            Some(CategoryTrend {
                category: group.category.clone(),
                current_total,
                previous_total,
                delta,
                pct_change,
                direction: TrendDirection::from_delta(delta),
            })
        })
        .collect();

    rows.sort_by(|a, b| {
        b.current_total
            .cmp(&a.current_total)
            .then_with(|| b.delta.cmp(&a.delta))
            .then_with(|| a.category.cmp(&b.category))
    });

    rows
}

// ==========================================
// 下钻
// ==========================================

fn base_row(
    view: &ConsolidatedLotView,
    record_id: RecordId,
    date: NaiveDate,
    in_current_week: bool,
    source_ref: &SourceRef,
) -> DrillDownRow {
    DrillDownRow {
        canonical_key: view.canonical_key.clone(),
        record_id,
        date,
        in_current_week,
        line: None,
        category: None,
        detail: None,
        quantity: 0,
        raw_lot_id: None,
        source_ref: source_ref.clone(),
        shipping_status_display: view.shipment.status_label.clone(),
        latest_ship_date: view.shipment.latest_ship_date,
        compliance: view.compliance,
        is_problematic_but_shipped: view.is_problematic_but_shipped,
        needs_review: view.needs_review,
    }
}

/// 某产线本周的生产明细
///
/// `issues_only` 为 true 时只返回计入问题次数的生产
pub fn line_drill_down(
    summary: &WeeklySummary,
    linked: &LinkedDataset,
    line: &str,
    issues_only: bool,
) -> Vec<DrillDownRow> {
    let Some(group) = summary.line_group(line) else {
        return Vec::new();
    };

    group
        .runs
        .iter()
        .filter(|r| !issues_only || r.is_issue)
        .filter_map(|r| {
            let view = linked.view(&r.canonical_key)?;
            let mut row = base_row(view, r.record_id, r.production_date, true, &r.source_ref);
            row.line = Some(group.line.clone());
            row.quantity = u64::from(r.is_issue);

            if let Some(run) = view
                .production_runs
                .iter()
                .find(|p| p.record_id == r.record_id)
            {
                row.category = run.issue_category.clone();
                row.detail = run.issue_text.clone();
                row.raw_lot_id = Some(run.raw_lot_id.clone());
            }
            Some(row)
        })
        .collect()
}

/// 某分类的贡献明细（本周，可选含上周）
pub fn category_drill_down(
    summary: &WeeklySummary,
    linked: &LinkedDataset,
    kind: TrendKind,
    category: &str,
    include_previous: bool,
) -> Vec<DrillDownRow> {
    let group = match kind {
        TrendKind::Defect => summary.defect_group(category),
        TrendKind::Issue => summary.issue_group(category),
    };
    let Some(group) = group else {
        return Vec::new();
    };

    let current = group.current.iter().map(|c| (c, true));
    let previous = group
        .previous
        .iter()
        .filter(|_| include_previous)
        .map(|c| (c, false));

    let mut rows: Vec<DrillDownRow> = current
        .chain(previous)
        .filter_map(|(c, in_current_week)| {
            let view = linked.view(&c.canonical_key)?;
            let mut row = base_row(view, c.record_id, c.date, in_current_week, &c.source_ref);
            row.category = Some(group.category.clone());
            row.detail = c.detail.clone();
            row.quantity = c.quantity;

            match kind {
                TrendKind::Issue => {
                    if let Some(run) = view
                        .production_runs
                        .iter()
                        .find(|p| p.record_id == c.record_id)
                    {
                        row.line = Some(run.line.clone());
                        row.raw_lot_id = Some(run.raw_lot_id.clone());
                    }
                }
                TrendKind::Defect => {
                    if !view.production.lines.is_empty() {
                        let lines: Vec<&str> =
                            view.production.lines.iter().map(|l| l.as_str()).collect();
                        row.line = Some(lines.join(", "));
                    }
                    row.raw_lot_id = view
                        .inspections
                        .iter()
                        .find(|i| i.record_id == c.record_id)
                        .map(|i| i.raw_lot_id.clone());
                }
            }
            Some(row)
        })
        .collect();

    rows.sort_by(|a, b| {
        b.in_current_week
            .cmp(&a.in_current_week)
            .then_with(|| a.date.cmp(&b.date))
            .then_with(|| a.canonical_key.cmp(&b.canonical_key))
            .then_with(|| a.record_id.cmp(&b.record_id))
    });

    rows
}
