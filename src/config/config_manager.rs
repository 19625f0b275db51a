// ==========================================
// 批次对账与周报系统 - 配置管理器
// ==========================================
// 职责: 配置加载、查询、覆写
// 存储: 扁平 JSON 对象文件（key → value），文件不存在时全部取默认值
// ==========================================

use crate::config::reconcile_config::{
    default_min_sources_by_stage, default_strip_rules, StripRuleSpec, DEFAULT_LOT_PATTERN,
};
use crate::config::reconcile_config_trait::ReconcileConfigReader;
use crate::engine::issue_rule::DEFAULT_ISSUE_RULE;
use crate::engine::normalizer::DEFAULT_SEPARATOR;
use crate::engine::record_linker::DEFAULT_MISSING_SHIPPING_LABEL;
use async_trait::async_trait;
use chrono::NaiveDate;
use serde_json::Value;
use std::collections::BTreeMap;
use std::error::Error;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// 默认配置文件名
pub const CONFIG_FILE_NAME: &str = "config.json";

// ==========================================
// ConfigManager - 配置管理器
// ==========================================
#[derive(Debug, Clone, Default)]
pub struct ConfigManager {
    values: BTreeMap<String, Value>,
    source_path: Option<PathBuf>,
}

impl ConfigManager {
    /// 空配置（全部默认值）
    pub fn new() -> Self {
        Self::default()
    }

    /// 从配置文件加载
    ///
    /// # 参数
    /// - path: JSON 配置文件路径（不存在时视为空配置）
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, Box<dyn Error>> {
        let path = path.as_ref();
        if !path.exists() {
            info!(path = %path.display(), "配置文件不存在，使用默认配置");
            return Ok(Self {
                values: BTreeMap::new(),
                source_path: Some(path.to_path_buf()),
            });
        }

        let content = std::fs::read_to_string(path)?;
        let mut manager = Self::from_json_str(&content)?;
        manager.source_path = Some(path.to_path_buf());

        info!(path = %path.display(), keys = manager.values.len(), "配置文件已加载");
        Ok(manager)
    }

    /// 从 JSON 文本加载（必须是对象）
    pub fn from_json_str(json: &str) -> Result<Self, Box<dyn Error>> {
        let parsed: Value = serde_json::from_str(json)?;
        let object = match parsed {
            Value::Object(map) => map,
            other => return Err(format!("配置文件顶层必须是 JSON 对象, 实际为: {}", other).into()),
        };

        Ok(Self {
            values: object.into_iter().collect(),
            source_path: None,
        })
    }

    /// 默认配置文件路径: <config_dir>/lot-reconcile/config.json
    pub fn get_default_config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join(crate::APP_DIR_NAME).join(CONFIG_FILE_NAME))
    }

    pub fn source_path(&self) -> Option<&Path> {
        self.source_path.as_deref()
    }

    /// 覆写单个配置值（命令行参数优先于配置文件）
    pub fn set_config_value(&mut self, key: &str, value: Value) {
        debug!(key, "覆写配置值");
        self.values.insert(key.to_string(), value);
    }

    fn get_config_value(&self, key: &str) -> Option<&Value> {
        match self.values.get(key) {
            None | Some(Value::Null) => None,
            Some(v) => Some(v),
        }
    }

    /// 读取配置值的文本形式（公开方法，供其他模块复用）
    pub fn get_global_config_value(&self, key: &str) -> Option<String> {
        self.get_config_value(key).map(|v| match v {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        })
    }

    fn get_config_or_default(&self, key: &str, default: &str) -> String {
        self.get_global_config_value(key)
            .unwrap_or_else(|| default.to_string())
    }

    fn get_bool_or_default(&self, key: &str, default: bool) -> Result<bool, Box<dyn Error>> {
        match self.get_config_value(key) {
            None => Ok(default),
            Some(Value::Bool(b)) => Ok(*b),
            Some(Value::String(s)) => match s.trim().to_lowercase().as_str() {
                "true" | "yes" | "y" | "1" => Ok(true),
                "false" | "no" | "n" | "0" => Ok(false),
                _ => Err(format!("期望布尔值, 实际为: {:?}", s).into()),
            },
            Some(other) => Err(format!("期望布尔值, 实际为: {}", other).into()),
        }
    }

    /// 获取所有配置的快照（键有序的 JSON）
    ///
    /// # 用途
    /// - 写入导出元数据，保证周报可追溯到当次配置
    pub fn get_config_snapshot(&self) -> Result<String, Box<dyn Error>> {
        Ok(serde_json::to_string(&self.values)?)
    }
}

// ==========================================
// ReconcileConfigReader 实现
// ==========================================
#[async_trait]
impl ReconcileConfigReader for ConfigManager {
    // ===== 周报口径 =====

    async fn get_issue_rule(&self) -> Result<String, Box<dyn Error>> {
        Ok(self.get_config_or_default(config_keys::ISSUE_RULE, DEFAULT_ISSUE_RULE))
    }

    async fn get_missing_shipping_label(&self) -> Result<String, Box<dyn Error>> {
        Ok(self.get_config_or_default(
            config_keys::MISSING_SHIPPING_LABEL,
            DEFAULT_MISSING_SHIPPING_LABEL,
        ))
    }

    async fn get_include_needs_review(&self) -> Result<bool, Box<dyn Error>> {
        self.get_bool_or_default(config_keys::INCLUDE_NEEDS_REVIEW, false)
    }

    async fn get_week_anchor_date(&self, today: NaiveDate) -> Result<NaiveDate, Box<dyn Error>> {
        match self.get_global_config_value(config_keys::WEEK_ANCHOR_DATE) {
            None => Ok(today),
            Some(s) if s.trim().is_empty() => Ok(today),
            Some(s) => NaiveDate::parse_from_str(s.trim(), "%Y-%m-%d")
                .map_err(|e| -> Box<dyn Error> {
                    format!("日期格式应为 YYYY-MM-DD: {:?} ({})", s, e).into()
                }),
        }
    }

    // ===== 批次号归一 =====

    async fn get_strip_rules(&self) -> Result<BTreeMap<String, Vec<StripRuleSpec>>, Box<dyn Error>> {
        match self.get_config_value(config_keys::STRIP_RULES) {
            None => Ok(default_strip_rules()),
            // 允许以字符串形式内嵌 JSON
            Some(Value::String(s)) => Ok(serde_json::from_str(s)?),
            Some(v) => Ok(serde_json::from_value(v.clone())?),
        }
    }

    async fn get_lot_pattern(&self) -> Result<String, Box<dyn Error>> {
        Ok(self.get_config_or_default(config_keys::LOT_PATTERN, DEFAULT_LOT_PATTERN))
    }

    async fn get_canonical_separator(&self) -> Result<String, Box<dyn Error>> {
        Ok(self.get_config_or_default(
            config_keys::CANONICAL_SEPARATOR,
            &DEFAULT_SEPARATOR.to_string(),
        ))
    }

    // ===== 复核策略 =====

    async fn get_identity_attributes(&self) -> Result<Vec<String>, Box<dyn Error>> {
        match self.get_config_value(config_keys::IDENTITY_ATTRIBUTES) {
            None => Ok(vec!["part_number".to_string(), "production_line".to_string()]),
            // 逗号分隔写法
            Some(Value::String(s)) => Ok(s
                .split(',')
                .map(|a| a.trim().to_string())
                .filter(|a| !a.is_empty())
                .collect()),
            Some(v) => Ok(serde_json::from_value(v.clone())?),
        }
    }

    async fn get_min_sources_by_stage(&self) -> Result<BTreeMap<String, usize>, Box<dyn Error>> {
        match self.get_config_value(config_keys::MIN_SOURCES_BY_STAGE) {
            None => Ok(default_min_sources_by_stage()),
            Some(Value::String(s)) => Ok(serde_json::from_str(s)?),
            Some(v) => {
                // 未配置的阶段保留默认值
                let overrides: BTreeMap<String, usize> = serde_json::from_value(v.clone())?;
                let mut merged = default_min_sources_by_stage();
                for (stage, count) in overrides {
                    merged.insert(stage.trim().to_lowercase(), count);
                }
                Ok(merged)
            }
        }
    }

    async fn get_flag_intra_source_variants(&self) -> Result<bool, Box<dyn Error>> {
        self.get_bool_or_default(config_keys::FLAG_INTRA_SOURCE_VARIANTS, true)
    }
}

// ==========================================
// 配置键常量
// ==========================================
pub mod config_keys {
    // 周报口径
    pub const ISSUE_RULE: &str = "issue_rule";
    pub const MISSING_SHIPPING_LABEL: &str = "missing_shipping_label";
    pub const INCLUDE_NEEDS_REVIEW: &str = "include_needs_review";
    pub const WEEK_ANCHOR_DATE: &str = "week_anchor_date";

    // 批次号归一
    pub const STRIP_RULES: &str = "strip_rules"; // {"*": [...], "shipping": [...]} (JSON)
    pub const LOT_PATTERN: &str = "lot_pattern";
    pub const CANONICAL_SEPARATOR: &str = "canonical_separator";

    // 复核策略
    pub const IDENTITY_ATTRIBUTES: &str = "identity_attributes";
    pub const MIN_SOURCES_BY_STAGE: &str = "min_sources_by_stage";
    pub const FLAG_INTRA_SOURCE_VARIANTS: &str = "flag_intra_source_variants";

    pub const ALL: [&str; 10] = [
        ISSUE_RULE,
        MISSING_SHIPPING_LABEL,
        INCLUDE_NEEDS_REVIEW,
        WEEK_ANCHOR_DATE,
        STRIP_RULES,
        LOT_PATTERN,
        CANONICAL_SEPARATOR,
        IDENTITY_ATTRIBUTES,
        MIN_SOURCES_BY_STAGE,
        FLAG_INTRA_SOURCE_VARIANTS,
    ];
}
