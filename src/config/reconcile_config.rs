// ==========================================
// 批次对账与周报系统 - 运行配置快照
// ==========================================
// 职责: 原始配置值 → 已校验的强类型快照（处理开始前一次性构建，之后不可变）
// 红线: 任何无法解释的配置都是致命错误，在读取任何源数据之前抛出
// ==========================================

use crate::config::reconcile_config_trait::ReconcileConfigReader;
use crate::config::config_keys;
use crate::domain::types::{LifecycleStage, SourceKind};
use crate::engine::error::{ReconcileError, ReconcileResult};
use crate::engine::identity_resolver::{IdentityResolver, ResolverPolicy};
use crate::engine::issue_rule::{IssueRule, DEFAULT_ISSUE_RULE};
use crate::engine::normalizer::{LotNormalizer, StripRule, StripRuleTable, DEFAULT_SEPARATOR};
use crate::engine::record_linker::{RecordLinker, DEFAULT_MISSING_SHIPPING_LABEL};
use chrono::NaiveDate;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::error::Error;
use std::str::FromStr;

/// 剥离规则表中的全局键
pub const GLOBAL_RULE_KEY: &str = "*";

/// 默认批次号形态
pub const DEFAULT_LOT_PATTERN: &str = r"^[A-Z]{2,5}-\d{4,8}-\d{3,5}$";

// ==========================================
// StripRuleSpec - 剥离规则（配置形态）
// ==========================================
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StripRuleSpec {
    Prefix {
        value: String,
    },
    Suffix {
        value: String,
    },
    Regex {
        pattern: String,
        #[serde(default)]
        replacement: String,
    },
}

impl StripRuleSpec {
    pub fn regex(pattern: &str, replacement: &str) -> Self {
        StripRuleSpec::Regex {
            pattern: pattern.to_string(),
            replacement: replacement.to_string(),
        }
    }

    /// 编译为引擎规则
    pub fn compile(&self, source_tag: &str) -> ReconcileResult<StripRule> {
        match self {
            StripRuleSpec::Prefix { value } => Ok(StripRule::prefix(value)),
            StripRuleSpec::Suffix { value } => Ok(StripRule::suffix(value)),
            StripRuleSpec::Regex {
                pattern,
                replacement,
            } => StripRule::regex(pattern, replacement).map_err(|e| {
                ReconcileError::InvalidStripRule {
                    source_tag: source_tag.to_string(),
                    pattern: pattern.clone(),
                    message: e.to_string(),
                }
            }),
        }
    }
}

/// 默认剥离规则: L0T 笔误（数字 0 代替字母 O）、紧凑写法拆分
pub fn default_strip_rules() -> BTreeMap<String, Vec<StripRuleSpec>> {
    let mut rules = BTreeMap::new();
    rules.insert(
        GLOBAL_RULE_KEY.to_string(),
        vec![
            StripRuleSpec::regex("^L0T", "LOT"),
            StripRuleSpec::regex(r"^LOT(\d{8})(\d{3})$", "LOT-$1-$2"),
        ],
    );
    rules
}

pub fn default_min_sources_by_stage() -> BTreeMap<String, usize> {
    let mut map = BTreeMap::new();
    map.insert(LifecycleStage::Produced.as_str().to_string(), 1);
    map.insert(LifecycleStage::Inspected.as_str().to_string(), 2);
    map.insert(LifecycleStage::Shipped.as_str().to_string(), 3);
    map
}

// ==========================================
// ReconcileSettings - 原始配置值（未校验）
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReconcileSettings {
    pub issue_rule: String,
    pub missing_shipping_label: String,
    pub include_needs_review: bool,
    pub week_anchor_date: NaiveDate,
    pub strip_rules: BTreeMap<String, Vec<StripRuleSpec>>,
    pub lot_pattern: String,
    pub canonical_separator: String,
    pub identity_attributes: Vec<String>,
    pub min_sources_by_stage: BTreeMap<String, usize>,
    pub flag_intra_source_variants: bool,
}

impl ReconcileSettings {
    pub fn defaults(today: NaiveDate) -> Self {
        Self {
            issue_rule: DEFAULT_ISSUE_RULE.to_string(),
            missing_shipping_label: DEFAULT_MISSING_SHIPPING_LABEL.to_string(),
            include_needs_review: false,
            week_anchor_date: today,
            strip_rules: default_strip_rules(),
            lot_pattern: DEFAULT_LOT_PATTERN.to_string(),
            canonical_separator: DEFAULT_SEPARATOR.to_string(),
            identity_attributes: ResolverPolicy::default().identity_attributes,
            min_sources_by_stage: default_min_sources_by_stage(),
            flag_intra_source_variants: true,
        }
    }

    /// 通过读取器加载
    pub async fn read<R>(reader: &R, today: NaiveDate) -> ReconcileResult<Self>
    where
        R: ReconcileConfigReader + ?Sized,
    {
        Ok(Self {
            issue_rule: reader
                .get_issue_rule()
                .await
                .map_err(reader_error(config_keys::ISSUE_RULE))?,
            missing_shipping_label: reader
                .get_missing_shipping_label()
                .await
                .map_err(reader_error(config_keys::MISSING_SHIPPING_LABEL))?,
            include_needs_review: reader
                .get_include_needs_review()
                .await
                .map_err(reader_error(config_keys::INCLUDE_NEEDS_REVIEW))?,
            week_anchor_date: reader
                .get_week_anchor_date(today)
                .await
                .map_err(reader_error(config_keys::WEEK_ANCHOR_DATE))?,
            strip_rules: reader
                .get_strip_rules()
                .await
                .map_err(reader_error(config_keys::STRIP_RULES))?,
            lot_pattern: reader
                .get_lot_pattern()
                .await
                .map_err(reader_error(config_keys::LOT_PATTERN))?,
            canonical_separator: reader
                .get_canonical_separator()
                .await
                .map_err(reader_error(config_keys::CANONICAL_SEPARATOR))?,
            identity_attributes: reader
                .get_identity_attributes()
                .await
                .map_err(reader_error(config_keys::IDENTITY_ATTRIBUTES))?,
            min_sources_by_stage: reader
                .get_min_sources_by_stage()
                .await
                .map_err(reader_error(config_keys::MIN_SOURCES_BY_STAGE))?,
            flag_intra_source_variants: reader
                .get_flag_intra_source_variants()
                .await
                .map_err(reader_error(config_keys::FLAG_INTRA_SOURCE_VARIANTS))?,
        })
    }

    /// 校验并构建强类型快照
    pub fn validate(self) -> ReconcileResult<ReconcileConfig> {
        let issue_rule = IssueRule::parse(&self.issue_rule)?;

        // 剥离规则: 键必须是 "*" 或三个来源之一
        let mut strip_rules = StripRuleTable::new();
        for (tag, specs) in &self.strip_rules {
            let tag = tag.trim();
            if tag == GLOBAL_RULE_KEY {
                for spec in specs {
                    strip_rules.push_global(spec.compile(tag)?);
                }
            } else {
                let source = SourceKind::from_str(tag)?;
                for spec in specs {
                    strip_rules.push_source(source, spec.compile(tag)?);
                }
            }
        }

        let lot_pattern = match self.lot_pattern.trim() {
            "" => None,
            pattern => Some(Regex::new(pattern).map_err(|e| ReconcileError::InvalidLotPattern {
                pattern: pattern.to_string(),
                message: e.to_string(),
            })?),
        };

        let canonical_separator = parse_separator(&self.canonical_separator)?;

        let missing_shipping_label = self.missing_shipping_label.trim().to_string();
        if missing_shipping_label.is_empty() {
            return Err(ReconcileError::InvalidConfig {
                key: config_keys::MISSING_SHIPPING_LABEL.to_string(),
                value: self.missing_shipping_label.clone(),
                message: "占位标签不能为空".to_string(),
            });
        }

        let mut min_sources_by_stage = BTreeMap::new();
        for (stage, count) in &self.min_sources_by_stage {
            let parsed = LifecycleStage::from_str(stage).map_err(|message| {
                ReconcileError::InvalidConfig {
                    key: config_keys::MIN_SOURCES_BY_STAGE.to_string(),
                    value: stage.clone(),
                    message,
                }
            })?;
            if *count > SourceKind::ALL.len() {
                return Err(ReconcileError::InvalidConfig {
                    key: config_keys::MIN_SOURCES_BY_STAGE.to_string(),
                    value: format!("{}={}", stage, count),
                    message: format!("最少来源数不能超过 {}", SourceKind::ALL.len()),
                });
            }
            min_sources_by_stage.insert(parsed, *count);
        }

        let identity_attributes: Vec<String> = self
            .identity_attributes
            .iter()
            .map(|a| a.trim().to_string())
            .filter(|a| !a.is_empty())
            .collect();

        Ok(ReconcileConfig {
            issue_rule,
            missing_shipping_label,
            include_needs_review: self.include_needs_review,
            week_anchor_date: self.week_anchor_date,
            strip_rules,
            lot_pattern,
            canonical_separator,
            policy: ResolverPolicy {
                identity_attributes,
                min_sources_by_stage,
                flag_intra_source_variants: self.flag_intra_source_variants,
            },
            settings: self,
        })
    }
}

fn reader_error(key: &'static str) -> impl Fn(Box<dyn Error>) -> ReconcileError {
    move |e| ReconcileError::InvalidConfig {
        key: key.to_string(),
        value: String::new(),
        message: e.to_string(),
    }
}

fn parse_separator(value: &str) -> ReconcileResult<char> {
    let mut chars = value.chars();
    match (chars.next(), chars.next()) {
        (Some(c), None) if !c.is_alphanumeric() => Ok(c),
        _ => Err(ReconcileError::InvalidConfig {
            key: config_keys::CANONICAL_SEPARATOR.to_string(),
            value: value.to_string(),
            message: "分隔符必须是单个非字母数字字符".to_string(),
        }),
    }
}

// ==========================================
// ReconcileConfig - 已校验的运行配置
// ==========================================
#[derive(Debug, Clone)]
pub struct ReconcileConfig {
    pub issue_rule: IssueRule,
    pub missing_shipping_label: String,
    pub include_needs_review: bool,
    pub week_anchor_date: NaiveDate,
    pub strip_rules: StripRuleTable,
    pub lot_pattern: Option<Regex>,
    pub canonical_separator: char,
    pub policy: ResolverPolicy,
    settings: ReconcileSettings,
}

impl ReconcileConfig {
    /// 从配置读取器加载并校验
    ///
    /// # 参数
    /// - reader: 配置读取器
    /// - today: week_anchor_date 未配置时的锚点
    pub async fn load<R>(reader: &R, today: NaiveDate) -> ReconcileResult<Self>
    where
        R: ReconcileConfigReader + ?Sized,
    {
        ReconcileSettings::read(reader, today).await?.validate()
    }

    /// 全默认配置
    pub fn defaults(today: NaiveDate) -> ReconcileResult<Self> {
        ReconcileSettings::defaults(today).validate()
    }

    /// 校验前的原始值（导出元数据用）
    pub fn settings(&self) -> &ReconcileSettings {
        &self.settings
    }

    pub fn normalizer(&self) -> LotNormalizer {
        LotNormalizer::new(
            self.strip_rules.clone(),
            self.canonical_separator,
            self.lot_pattern.clone(),
        )
    }

    pub fn resolver(&self) -> IdentityResolver {
        IdentityResolver::new(self.policy.clone())
    }

    pub fn linker(&self) -> RecordLinker {
        RecordLinker::new(self.missing_shipping_label.clone(), self.include_needs_review)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 2, 11).unwrap()
    }

    #[test]
    fn test_defaults_validate() {
        let config = ReconcileConfig::defaults(today()).unwrap();
        assert_eq!(config.issue_rule.text(), DEFAULT_ISSUE_RULE);
        assert_eq!(config.missing_shipping_label, "Not Found / Not Shipped Yet");
        assert!(!config.include_needs_review);
        assert_eq!(config.week_anchor_date, today());
        assert_eq!(config.canonical_separator, '-');
        assert_eq!(config.strip_rules.len(), 2);
        assert_eq!(config.policy, ResolverPolicy::default());

        let n = config.normalizer();
        let key = n.normalize("L0T20260203001", SourceKind::Production).unwrap();
        assert_eq!(key.key, "LOT-20260203-001");
        assert!(!key.is_low_confidence());
    }

    #[test]
    fn test_unknown_strip_rule_source_is_fatal() {
        let mut settings = ReconcileSettings::defaults(today());
        settings
            .strip_rules
            .insert("warehouse".to_string(), vec![StripRuleSpec::Prefix { value: "W".to_string() }]);

        let err = settings.validate().unwrap_err();
        assert!(matches!(err, ReconcileError::UnknownSourceTag(tag) if tag == "warehouse"));
    }

    #[test]
    fn test_invalid_regex_is_fatal() {
        let mut settings = ReconcileSettings::defaults(today());
        settings
            .strip_rules
            .insert("shipping".to_string(), vec![StripRuleSpec::regex("(unclosed", "")]);
        assert!(matches!(
            settings.validate(),
            Err(ReconcileError::InvalidStripRule { .. })
        ));

        let mut settings = ReconcileSettings::defaults(today());
        settings.lot_pattern = "[".to_string();
        assert!(matches!(
            settings.validate(),
            Err(ReconcileError::InvalidLotPattern { .. })
        ));
    }

    #[test]
    fn test_invalid_values_are_fatal() {
        let mut settings = ReconcileSettings::defaults(today());
        settings.canonical_separator = "ab".to_string();
        assert!(matches!(settings.validate(), Err(ReconcileError::InvalidConfig { .. })));

        let mut settings = ReconcileSettings::defaults(today());
        settings.min_sources_by_stage.insert("archived".to_string(), 1);
        assert!(matches!(settings.validate(), Err(ReconcileError::InvalidConfig { .. })));

        let mut settings = ReconcileSettings::defaults(today());
        settings.issue_rule = "line_issue_flag ==".to_string();
        assert!(matches!(settings.validate(), Err(ReconcileError::InvalidIssueRule { .. })));
    }

    #[test]
    fn test_empty_lot_pattern_disables_shape_check() {
        let mut settings = ReconcileSettings::defaults(today());
        settings.lot_pattern = String::new();
        let config = settings.validate().unwrap();
        assert!(config.lot_pattern.is_none());
        let n = config.normalizer();
        assert!(!n.normalize("whatever", SourceKind::Quality).unwrap().is_low_confidence());
    }

    #[test]
    fn test_strip_rule_spec_json_shape() {
        let json = r#"{"shipping": [{"type": "prefix", "value": "SHP/"}, {"type": "regex", "pattern": "/\\d+$"}]}"#;
        let rules: BTreeMap<String, Vec<StripRuleSpec>> = serde_json::from_str(json).unwrap();
        assert_eq!(
            rules["shipping"],
            vec![
                StripRuleSpec::Prefix { value: "SHP/".to_string() },
                StripRuleSpec::regex(r"/\d+$", ""),
            ]
        );
    }
}
