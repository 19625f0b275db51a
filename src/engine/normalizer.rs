// ==========================================
// 批次对账与周报系统 - 批次号归一器
// ==========================================
// 职责: 原始批次号 → canonical key（确定性规则，固定顺序）
// 顺序: TRIM → UPPER → 来源剥离规则 → 分隔符折叠 → 形态校验
// 红线: 剥离规则来自配置，不在引擎内硬编码
// ==========================================

use crate::domain::types::{NormalizationConfidence, SourceKind};
use regex::{Regex, RegexBuilder};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use thiserror::Error;

/// 默认规范分隔符
pub const DEFAULT_SEPARATOR: char = '-';

// ==========================================
// NormalizeError - 单条记录级错误（不致命）
// ==========================================
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum NormalizeError {
    #[error("批次号为空")]
    Empty,

    #[error("批次号无法解析: {raw:?}")]
    Unparseable { raw: String },
}

// ==========================================
// NormalizedLot - 归一结果
// ==========================================
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NormalizedLot {
    pub key: String,
    pub confidence: NormalizationConfidence,
    pub raw: String,
}

impl NormalizedLot {
    pub fn is_low_confidence(&self) -> bool {
        self.confidence == NormalizationConfidence::Low
    }
}

// ==========================================
// StripRule - 剥离/改写规则
// ==========================================
#[derive(Debug, Clone)]
pub enum StripRule {
    /// 去掉固定前缀（只去一次）
    Prefix(String),
    /// 去掉固定后缀（只去一次）
    Suffix(String),
    /// 正则替换（replace-all，忽略大小写）
    Regex { pattern: Regex, replacement: String },
}

impl StripRule {
    pub fn prefix(value: &str) -> Self {
        StripRule::Prefix(value.to_uppercase())
    }

    pub fn suffix(value: &str) -> Self {
        StripRule::Suffix(value.to_uppercase())
    }

    pub fn regex(pattern: &str, replacement: &str) -> Result<Self, regex::Error> {
        let compiled = RegexBuilder::new(pattern).case_insensitive(true).build()?;
        Ok(StripRule::Regex {
            pattern: compiled,
            replacement: replacement.to_string(),
        })
    }

    /// 规则描述（日志 / 配置快照用）
    pub fn describe(&self) -> String {
        match self {
            StripRule::Prefix(v) => format!("prefix:{}", v),
            StripRule::Suffix(v) => format!("suffix:{}", v),
            StripRule::Regex {
                pattern,
                replacement,
            } => format!("regex:{}=>{}", pattern.as_str(), replacement),
        }
    }

    fn apply(&self, value: String) -> String {
        match self {
            StripRule::Prefix(prefix) => match value.strip_prefix(prefix.as_str()) {
                Some(rest) if !prefix.is_empty() => rest.to_string(),
                _ => value,
            },
            StripRule::Suffix(suffix) => match value.strip_suffix(suffix.as_str()) {
                Some(rest) if !suffix.is_empty() => rest.to_string(),
                _ => value,
            },
            StripRule::Regex {
                pattern,
                replacement,
            } => pattern
                .replace_all(&value, replacement.as_str())
                .to_uppercase(),
        }
    }
}

// ==========================================
// StripRuleTable - 全局 + 分来源规则表
// ==========================================
#[derive(Debug, Clone, Default)]
pub struct StripRuleTable {
    global: Vec<StripRule>,
    per_source: HashMap<SourceKind, Vec<StripRule>>,
}

impl StripRuleTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_global(mut self, rule: StripRule) -> Self {
        self.global.push(rule);
        self
    }

    pub fn with_source(mut self, source: SourceKind, rule: StripRule) -> Self {
        self.per_source.entry(source).or_default().push(rule);
        self
    }

    pub fn push_global(&mut self, rule: StripRule) {
        self.global.push(rule);
    }

    pub fn push_source(&mut self, source: SourceKind, rule: StripRule) {
        self.per_source.entry(source).or_default().push(rule);
    }

    /// 某来源生效的规则（全局在前）
    pub fn rules_for(&self, source: SourceKind) -> impl Iterator<Item = &StripRule> {
        self.global.iter().chain(
            self.per_source
                .get(&source)
                .into_iter()
                .flat_map(|rules| rules.iter()),
        )
    }

    pub fn len(&self) -> usize {
        self.global.len() + self.per_source.values().map(|r| r.len()).sum::<usize>()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

// ==========================================
// LotNormalizer - 批次号归一器
// ==========================================
// 红线: 无状态，纯函数
#[derive(Debug, Clone)]
pub struct LotNormalizer {
    strip_rules: StripRuleTable,
    separator: char,
    lot_pattern: Option<Regex>,
}

impl LotNormalizer {
    pub fn new(strip_rules: StripRuleTable, separator: char, lot_pattern: Option<Regex>) -> Self {
        Self {
            strip_rules,
            separator,
            lot_pattern,
        }
    }

    /// 归一化
    ///
    /// # 返回
    /// - Ok(NormalizedLot): 成功（可能是低置信度）
    /// - Err(NormalizeError): 空值或清洗后无剩余字符
    pub fn normalize(&self, raw: &str, source: SourceKind) -> Result<NormalizedLot, NormalizeError> {
        // 1. TRIM
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(NormalizeError::Empty);
        }

        // 2. UPPER
        let mut value = trimmed.to_uppercase();

        // 3. 剥离规则（全局 → 分来源）
        for rule in self.strip_rules.rules_for(source) {
            value = rule.apply(value);
        }

        // 4. 分隔符折叠
        let key = self.collapse_separators(&value);
        if key.is_empty() {
            return Err(NormalizeError::Unparseable {
                raw: raw.to_string(),
            });
        }

        // 5. 形态校验
        let confidence = match &self.lot_pattern {
            Some(pattern) if !pattern.is_match(&key) => NormalizationConfidence::Low,
            _ => NormalizationConfidence::High,
        };

        Ok(NormalizedLot {
            key,
            confidence,
            raw: raw.to_string(),
        })
    }

    /// `-` / `_` / 空白 以及字母↔数字边界统一为单个规范分隔符，首尾分隔符去掉
    fn collapse_separators(&self, value: &str) -> String {
        let mut out = String::with_capacity(value.len() + 4);
        let mut pending_separator = false;
        let mut prev: Option<char> = None;

        for c in value.chars() {
            if self.is_separator(c) {
                pending_separator = true;
                continue;
            }

            if let Some(p) = prev {
                let boundary = (p.is_alphabetic() && c.is_ascii_digit())
                    || (p.is_ascii_digit() && c.is_alphabetic());
                if pending_separator || boundary {
                    out.push(self.separator);
                }
            }

            out.push(c);
            prev = Some(c);
            pending_separator = false;
        }

        out
    }

    fn is_separator(&self, c: char) -> bool {
        c == '-' || c == '_' || c.is_whitespace() || c == self.separator
    }
}

impl Default for LotNormalizer {
    fn default() -> Self {
        Self::new(StripRuleTable::new(), DEFAULT_SEPARATOR, None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn default_pattern() -> Regex {
        Regex::new(r"^[A-Z]{2,5}-\d{4,8}-\d{3,5}$").unwrap()
    }

    fn normalizer() -> LotNormalizer {
        let rules = StripRuleTable::new()
            .with_global(StripRule::regex("^L0T", "LOT").unwrap())
            .with_global(StripRule::regex(r"^LOT(\d{8})(\d{3})$", "LOT-$1-$2").unwrap())
            .with_source(SourceKind::Shipping, StripRule::prefix("shp/"))
            .with_source(SourceKind::Shipping, StripRule::suffix("/00"));
        LotNormalizer::new(rules, DEFAULT_SEPARATOR, Some(default_pattern()))
    }

    #[test]
    fn test_three_source_variants_share_key() {
        let n = normalizer();
        let a = n.normalize("lot-2026-0001", SourceKind::Production).unwrap();
        let b = n.normalize("LOT2026_0001", SourceKind::Quality).unwrap();
        let c = n.normalize(" Lot 2026 0001 ", SourceKind::Shipping).unwrap();

        assert_eq!(a.key, "LOT-2026-0001");
        assert_eq!(a.key, b.key);
        assert_eq!(b.key, c.key);
        assert_eq!(a.confidence, NormalizationConfidence::High);
    }

    #[test]
    fn test_normalize_is_idempotent() {
        let n = normalizer();
        for raw in ["lot-2026-0001", "L0T-20260203-001", "LOT20260204001", "badlot", "A1b2"] {
            let once = n.normalize(raw, SourceKind::Production).unwrap();
            let twice = n.normalize(&once.key, SourceKind::Production).unwrap();
            assert_eq!(once.key, twice.key, "raw = {}", raw);
            assert_eq!(once.confidence, twice.confidence);
        }
    }

    #[test]
    fn test_empty_and_blank_fail() {
        let n = normalizer();
        assert_eq!(n.normalize("", SourceKind::Production), Err(NormalizeError::Empty));
        assert_eq!(n.normalize("   ", SourceKind::Quality), Err(NormalizeError::Empty));
        assert!(matches!(
            n.normalize(" -_- ", SourceKind::Quality),
            Err(NormalizeError::Unparseable { .. })
        ));
    }

    #[test]
    fn test_typo_and_compact_rules() {
        let n = normalizer();
        let typo = n.normalize("L0T-20260203-001", SourceKind::Production).unwrap();
        assert_eq!(typo.key, "LOT-20260203-001");

        let compact = n.normalize("LOT20260204001", SourceKind::Production).unwrap();
        assert_eq!(compact.key, "LOT-20260204-001");

        let mixed = n.normalize(" LOT_20260202-001 ", SourceKind::Production).unwrap();
        assert_eq!(mixed.key, "LOT-20260202-001");
    }

    #[test]
    fn test_source_specific_rules_only_apply_to_their_source() {
        let n = normalizer();
        let shipping = n.normalize("SHP/LOT-2026-0001/00", SourceKind::Shipping).unwrap();
        assert_eq!(shipping.key, "LOT-2026-0001");

        // 生产来源不剥离 SHP/
        let production = n.normalize("SHP/LOT-2026-0001", SourceKind::Production).unwrap();
        assert_ne!(production.key, "LOT-2026-0001");
        assert!(production.is_low_confidence());
    }

    #[test]
    fn test_shape_mismatch_is_low_confidence_not_failure() {
        let n = normalizer();
        let result = n.normalize("BADLOT", SourceKind::Production).unwrap();
        assert_eq!(result.key, "BADLOT");
        assert_eq!(result.confidence, NormalizationConfidence::Low);
        assert_eq!(result.raw, "BADLOT");
    }

    #[test]
    fn test_without_pattern_everything_is_high_confidence() {
        let n = LotNormalizer::default();
        let result = n.normalize("anything goes", SourceKind::Quality).unwrap();
        assert_eq!(result.key, "ANYTHING-GOES");
        assert_eq!(result.confidence, NormalizationConfidence::High);
    }

    #[test]
    fn test_custom_separator() {
        let n = LotNormalizer::new(StripRuleTable::new(), '.', None);
        let result = n.normalize("lot 2026-0001", SourceKind::Production).unwrap();
        assert_eq!(result.key, "LOT.2026.0001");
        // 已是规范形态时保持不变
        let again = n.normalize(&result.key, SourceKind::Production).unwrap();
        assert_eq!(again.key, result.key);
    }
}
