// ==========================================
// 批次对账与周报系统 - 批次身份领域模型
// ==========================================
// 职责: CanonicalLot / LotAlias / ConflictRecord / 无法关联集合
// 红线: 身份解析输出永远是"全量事实"，排除策略只在关联层执行
// ==========================================

use crate::domain::records::{RecordId, SourceRef};
use crate::domain::types::{LifecycleStage, NormalizationConfidence, SourceKind};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

// ==========================================
// LotAlias - 批次别名
// ==========================================
// 唯一性: (source, raw_lot_id)
// 归属: 挂在所指向的 CanonicalLot 下，随批次一起删除
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LotAlias {
    pub canonical_key: String,
    pub source: SourceKind,
    pub raw_lot_id: String,
    pub source_ref: SourceRef,        // 首次出现位置
    pub last_source_ref: SourceRef,   // 最近一次出现位置
    pub first_seen: DateTime<Utc>,
    pub last_seen: DateTime<Utc>,
    pub occurrences: u32,
    pub confidence: NormalizationConfidence,
}

// ==========================================
// ReviewReason - 需复核原因
// ==========================================
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum ReviewReason {
    /// 原始批次号未通过形态校验
    LowConfidenceIdentifier {
        source: SourceKind,
        raw_lot_id: String,
    },
    /// 存在冲突记录
    Conflict {
        kind: ConflictKind,
        attribute: String,
    },
    /// 来源覆盖数低于该阶段最低要求
    MissingSources {
        stage: LifecycleStage,
        present: Vec<SourceKind>,
        expected: usize,
    },
}

impl fmt::Display for ReviewReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReviewReason::LowConfidenceIdentifier { source, raw_lot_id } => {
                write!(f, "批次号形态不符 ({}: {:?})", source, raw_lot_id)
            }
            ReviewReason::Conflict { kind, attribute } => {
                write!(f, "{} ({})", kind, attribute)
            }
            ReviewReason::MissingSources {
                stage,
                present,
                expected,
            } => {
                let names: Vec<&str> = present.iter().map(|s| s.as_str()).collect();
                write!(
                    f,
                    "来源覆盖不足: 阶段 {} 需要 {} 个来源, 实际 [{}]",
                    stage,
                    expected,
                    names.join(",")
                )
            }
        }
    }
}

// ==========================================
// CanonicalLot - 规范批次
// ==========================================
// 唯一性: 每个 canonical key 恰好一个
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CanonicalLot {
    pub key: String,
    pub created_at: DateTime<Utc>,
    pub notes: Vec<String>,
    pub aliases: Vec<LotAlias>,
    pub stage: LifecycleStage,
    pub needs_review: bool,
    pub review_reasons: Vec<ReviewReason>,
}

impl CanonicalLot {
    pub fn new(key: String, created_at: DateTime<Utc>) -> Self {
        Self {
            key,
            created_at,
            notes: Vec::new(),
            aliases: Vec::new(),
            stage: LifecycleStage::Produced,
            needs_review: false,
            review_reasons: Vec::new(),
        }
    }

    /// 出现过的来源集合
    pub fn sources(&self) -> BTreeSet<SourceKind> {
        self.aliases.iter().map(|a| a.source).collect()
    }

    pub fn has_source(&self, source: SourceKind) -> bool {
        self.aliases.iter().any(|a| a.source == source)
    }

    /// 所有原始写法（去重排序）
    pub fn raw_aliases(&self) -> Vec<String> {
        let set: BTreeSet<&str> = self.aliases.iter().map(|a| a.raw_lot_id.as_str()).collect();
        set.into_iter().map(|s| s.to_string()).collect()
    }

    pub fn alias(&self, source: SourceKind, raw_lot_id: &str) -> Option<&LotAlias> {
        self.aliases
            .iter()
            .find(|a| a.source == source && a.raw_lot_id == raw_lot_id)
    }
}

// ==========================================
// ConflictRecord - 冲突记录（派生，不持久化）
// ==========================================
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConflictKind {
    AttributeMismatch,  // 身份属性取值互斥
    AmbiguousCollision, // 归一化多对一碰撞
}

impl fmt::Display for ConflictKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConflictKind::AttributeMismatch => write!(f, "身份属性冲突"),
            ConflictKind::AmbiguousCollision => write!(f, "批次号归一歧义"),
        }
    }
}

/// 冲突中的某一个取值及其出处
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConflictValue {
    pub value: String,
    pub sources: BTreeSet<SourceKind>,
    pub refs: Vec<SourceRef>, // 已排序
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConflictRecord {
    pub canonical_key: String,
    pub kind: ConflictKind,
    pub attribute: String,
    pub values: Vec<ConflictValue>, // 按 value 排序，与导入顺序无关
}

impl ConflictRecord {
    /// 参与冲突的全部来源
    pub fn sources(&self) -> BTreeSet<SourceKind> {
        self.values
            .iter()
            .flat_map(|v| v.sources.iter().copied())
            .collect()
    }

    pub fn value_strings(&self) -> Vec<&str> {
        self.values.iter().map(|v| v.value.as_str()).collect()
    }
}

// ==========================================
// UnlinkedRecord - 无法关联的记录
// ==========================================
// 批次号为空/无法解析，不丢弃，进入人工关注集合
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnlinkedRecord {
    pub record_id: RecordId,
    pub source: SourceKind,
    pub source_ref: SourceRef,
    pub raw_lot_id: String,
    pub reason: String,
}

// ==========================================
// ResolvedIdentities - 身份解析结果（不可变）
// ==========================================
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ResolvedIdentities {
    pub lots: BTreeMap<String, CanonicalLot>,
    pub record_links: BTreeMap<RecordId, String>,
    pub conflicts: Vec<ConflictRecord>,
    pub unlinked: Vec<UnlinkedRecord>,
}

impl ResolvedIdentities {
    pub fn lot(&self, key: &str) -> Option<&CanonicalLot> {
        self.lots.get(key)
    }

    /// 记录所属规范批次
    pub fn lot_key_for(&self, record_id: RecordId) -> Option<&str> {
        self.record_links.get(&record_id).map(|s| s.as_str())
    }

    pub fn aliases(&self) -> impl Iterator<Item = &LotAlias> {
        self.lots.values().flat_map(|lot| lot.aliases.iter())
    }

    pub fn alias_count(&self) -> usize {
        self.lots.values().map(|lot| lot.aliases.len()).sum()
    }

    pub fn conflicts_for<'a>(&'a self, key: &'a str) -> impl Iterator<Item = &'a ConflictRecord> {
        self.conflicts.iter().filter(move |c| c.canonical_key == key)
    }

    pub fn needs_review_keys(&self) -> Vec<&str> {
        self.lots
            .values()
            .filter(|lot| lot.needs_review)
            .map(|lot| lot.key.as_str())
            .collect()
    }
}
