// ==========================================
// 批次对账与周报系统 - 命令行入口
// ==========================================
// 流程: 读取配置 → 导入三源文件 → 对账 + 周报 → 写出导出文件
//
// 用法:
//   lot-reconcile --production prod.csv --quality qa.xlsx --sheet QA \
//                 --shipping ship.csv [--config config.json] [--anchor 2026-02-11] \
//                 [--issue-rule "line_issue_flag = true"] [--include-needs-review] \
//                 [--out ./reconcile_output] [--log-json]
// ==========================================

use anyhow::{anyhow, bail, Context};
use chrono::{Local, NaiveDate, Utc};
use lot_reconcile::config::config_keys;
use lot_reconcile::{
    logging, write_bundle, ConfigManager, ExportMetadata, ImportManifest, ReconcileConfig,
    ReconcileOrchestrator, SourceImporter, SourceImporterImpl,
};
use serde_json::Value;
use std::path::PathBuf;
use std::sync::Arc;

const DEFAULT_OUT_DIR: &str = "reconcile_output";

#[derive(Debug, Default)]
struct CliArgs {
    manifest: ImportManifest,
    config_path: Option<PathBuf>,
    anchor: Option<NaiveDate>,
    issue_rule: Option<String>,
    include_needs_review: bool,
    out_dir: Option<PathBuf>,
    log_json: bool,
    help: bool,
}

fn usage() -> String {
    format!(
        "{} v{}\n\n\
         用法: lot-reconcile [选项]\n\n\
         数据源（可重复，按出现顺序导入）:\n\
         \x20 --production <文件>        生产记录 (.csv/.xlsx/.xls)\n\
         \x20 --quality <文件>           质检记录\n\
         \x20 --shipping <文件>          发运记录\n\
         \x20 --source <标签>=<文件>     任意来源标签（production/quality/shipping）\n\
         \x20 --sheet <名称>             指定上一个数据源的工作表\n\n\
         运行选项:\n\
         \x20 --config <文件>            配置文件（默认: 用户配置目录/{}/config.json）\n\
         \x20 --anchor <YYYY-MM-DD>      周锚点（默认: 今天）\n\
         \x20 --issue-rule <表达式>      问题判定规则\n\
         \x20 --include-needs-review     待复核批次也计入周报\n\
         \x20 --out <目录>               输出目录（默认: {}）\n\
         \x20 --log-json                 JSON 格式日志\n",
        lot_reconcile::APP_NAME,
        lot_reconcile::VERSION,
        lot_reconcile::APP_DIR_NAME,
        DEFAULT_OUT_DIR,
    )
}

fn parse_args(args: impl IntoIterator<Item = String>) -> anyhow::Result<CliArgs> {
    let mut parsed = CliArgs::default();
    let mut args = args.into_iter();

    while let Some(arg) = args.next() {
        let mut value = |name: &str| {
            args.next()
                .filter(|v| !v.trim().is_empty())
                .ok_or_else(|| anyhow!("参数 {} 缺少取值", name))
        };

        match arg.as_str() {
            "--production" | "--quality" | "--shipping" => {
                let path = value(&arg)?;
                let tag = arg.trim_start_matches("--").to_string();
                parsed.manifest = std::mem::take(&mut parsed.manifest).with_source(tag, path, None);
            }
            "--source" => {
                let spec = value(&arg)?;
                let (tag, path) = spec
                    .split_once('=')
                    .ok_or_else(|| anyhow!("--source 格式应为 <标签>=<文件>: {}", spec))?;
                parsed.manifest = std::mem::take(&mut parsed.manifest).with_source(tag, path, None);
            }
            "--sheet" => {
                let sheet = value(&arg)?;
                let entry = parsed
                    .manifest
                    .entries
                    .last_mut()
                    .ok_or_else(|| anyhow!("--sheet 必须跟在某个数据源之后"))?;
                entry.sheet = Some(sheet);
            }
            "--config" => parsed.config_path = Some(PathBuf::from(value(&arg)?)),
            "--anchor" => {
                let text = value(&arg)?;
                let date = NaiveDate::parse_from_str(text.trim(), "%Y-%m-%d")
                    .with_context(|| format!("--anchor 日期格式应为 YYYY-MM-DD: {}", text))?;
                parsed.anchor = Some(date);
            }
            "--issue-rule" => parsed.issue_rule = Some(value(&arg)?),
            "--include-needs-review" => parsed.include_needs_review = true,
            "--out" => parsed.out_dir = Some(PathBuf::from(value(&arg)?)),
            "--log-json" => parsed.log_json = true,
            "-h" | "--help" => parsed.help = true,
            other => bail!("未知参数: {}\n\n{}", other, usage()),
        }
    }

    Ok(parsed)
}

/// 加载配置文件并应用命令行覆写（命令行优先）
fn load_config_manager(args: &CliArgs) -> anyhow::Result<ConfigManager> {
    let path = match &args.config_path {
        Some(path) => Some(path.clone()),
        None => ConfigManager::get_default_config_path(),
    };

    let mut manager = match path {
        Some(path) => ConfigManager::from_file(&path)
            .map_err(|e| anyhow!("配置文件加载失败 ({}): {}", path.display(), e))?,
        None => ConfigManager::new(),
    };

    if let Some(anchor) = args.anchor {
        manager.set_config_value(config_keys::WEEK_ANCHOR_DATE, Value::String(anchor.to_string()));
    }
    if let Some(rule) = &args.issue_rule {
        manager.set_config_value(config_keys::ISSUE_RULE, Value::String(rule.clone()));
    }
    if args.include_needs_review {
        manager.set_config_value(config_keys::INCLUDE_NEEDS_REVIEW, Value::Bool(true));
    }

    Ok(manager)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = parse_args(std::env::args().skip(1))?;
    if args.help {
        print!("{}", usage());
        return Ok(());
    }
    if args.manifest.is_empty() {
        bail!("至少需要一个数据源\n\n{}", usage());
    }

    if args.log_json {
        logging::init_json();
    } else {
        logging::init();
    }

    tracing::info!("==================================================");
    tracing::info!("{}", lot_reconcile::APP_NAME);
    tracing::info!("系统版本: {}", lot_reconcile::VERSION);
    tracing::info!("==================================================");

    // ===== 配置 =====
    let manager = load_config_manager(&args)?;
    let today = Local::now().date_naive();
    let config = ReconcileConfig::load(&manager, today)
        .await
        .context("配置校验失败")?;
    let snapshot = manager
        .get_config_snapshot()
        .map_err(|e| anyhow!("配置快照生成失败: {}", e))?;

    // ===== 导入 =====
    let importer = SourceImporterImpl::default();
    let outcome = importer
        .import_all(&args.manifest)
        .await
        .context("数据源导入失败")?;

    // ===== 对账 + 周报 =====
    let orchestrator = ReconcileOrchestrator::new(Arc::new(config));
    let now = Utc::now();
    let result = orchestrator.run(&outcome.dataset, now);

    // ===== 导出 =====
    let out_dir = args
        .out_dir
        .clone()
        .unwrap_or_else(|| PathBuf::from(DEFAULT_OUT_DIR));
    let metadata = ExportMetadata::new(now)
        .with_run_id(result.run_id.clone())
        .with_config_snapshot(snapshot);
    let written = write_bundle(&out_dir, &result, &outcome.reports, &metadata)
        .with_context(|| format!("导出失败: {}", out_dir.display()))?;

    // ===== 控制台摘要 =====
    let summary = &result.summary;
    println!(
        "周区间: {} ~ {}（上周 {} ~ {}）",
        summary.window.start,
        summary.window.end,
        summary.previous_window.start,
        summary.previous_window.end
    );
    println!(
        "批次: {} 个（计入周报 {}，待复核排除 {}），冲突 {}，无法关联记录 {}",
        result.identities.lots.len(),
        summary.included_lots,
        summary.excluded_lots.len(),
        result.identities.conflicts.len(),
        result.identities.unlinked.len()
    );
    for report in &outcome.reports {
        println!(
            "导入 {} [{}]: 共 {} 行，成功 {}，拒绝 {}，警告 {}，冲突 {}",
            report.file_name,
            report.source,
            report.summary.total_rows,
            report.summary.success,
            report.summary.blocked,
            report.summary.warning,
            report.summary.conflict
        );
    }
    for path in &written {
        println!("已写出: {}", path.display());
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_parse_args_builds_manifest_in_order() {
        let parsed = parse_args(args(&[
            "--shipping",
            "ship.csv",
            "--production",
            "prod.xlsx",
            "--sheet",
            "Runs",
            "--source",
            "quality=qa.csv",
            "--anchor",
            "2026-02-11",
            "--include-needs-review",
        ]))
        .unwrap();

        let tags: Vec<&str> = parsed
            .manifest
            .entries
            .iter()
            .map(|e| e.source_tag.as_str())
            .collect();
        assert_eq!(tags, vec!["shipping", "production", "quality"]);
        assert_eq!(parsed.manifest.entries[1].sheet.as_deref(), Some("Runs"));
        assert_eq!(parsed.anchor, NaiveDate::from_ymd_opt(2026, 2, 11));
        assert!(parsed.include_needs_review);
    }

    #[test]
    fn test_parse_args_errors() {
        assert!(parse_args(args(&["--sheet", "A"])).is_err());
        assert!(parse_args(args(&["--production"])).is_err());
        assert!(parse_args(args(&["--anchor", "11/02/2026"])).is_err());
        assert!(parse_args(args(&["--bogus"])).is_err());
    }

    #[test]
    fn test_cli_overrides_config_file() {
        let parsed = parse_args(args(&[
            "--config",
            "/definitely/missing/config.json",
            "--issue-rule",
            "downtime_minutes > 30",
        ]))
        .unwrap();

        let manager = load_config_manager(&parsed).unwrap();
        assert_eq!(
            manager.get_global_config_value(config_keys::ISSUE_RULE),
            Some("downtime_minutes > 30".to_string())
        );
    }
}
