// ==========================================
// 批次对账与周报系统 - 身份解析引擎
// ==========================================
// 职责: 三来源观测 → CanonicalLot + LotAlias + ConflictRecord + 无法关联集合
// 输入: IdentityObservation 流（生产 → 质检 → 发运）
// 红线: 输出是全量事实，不做任何排除；每条可导入记录要么挂到唯一批次，要么进入无法关联集合
// ==========================================

use crate::domain::lot::{
    CanonicalLot, ConflictKind, ConflictRecord, ConflictValue, LotAlias, ResolvedIdentities,
    ReviewReason, UnlinkedRecord,
};
use crate::domain::records::{attribute_names, IdentityObservation, SourceRef};
use crate::domain::types::{LifecycleStage, NormalizationConfidence, SourceKind};
use crate::engine::normalizer::LotNormalizer;
use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, BTreeSet};
use tracing::{debug, info, instrument};

/// 源系统自带"已归一批次号"列对应的冲突属性名
pub const PROVIDED_KEY_ATTRIBUTE: &str = "normalized_lot_id";

// ==========================================
// ResolverPolicy - 复核策略
// ==========================================
#[derive(Debug, Clone, PartialEq)]
pub struct ResolverPolicy {
    /// 参与冲突检测的身份属性
    pub identity_attributes: Vec<String>,
    /// 各生命周期阶段要求的最少来源数
    pub min_sources_by_stage: BTreeMap<LifecycleStage, usize>,
    /// 同一来源多种写法折叠到同一 key 时是否视为歧义
    pub flag_intra_source_variants: bool,
}

impl Default for ResolverPolicy {
    fn default() -> Self {
        let mut min_sources_by_stage = BTreeMap::new();
        min_sources_by_stage.insert(LifecycleStage::Produced, 1);
        min_sources_by_stage.insert(LifecycleStage::Inspected, 2);
        min_sources_by_stage.insert(LifecycleStage::Shipped, 3);

        Self {
            identity_attributes: vec![
                attribute_names::PART_NUMBER.to_string(),
                attribute_names::PRODUCTION_LINE.to_string(),
            ],
            min_sources_by_stage,
            flag_intra_source_variants: true,
        }
    }
}

impl ResolverPolicy {
    pub fn min_sources_for(&self, stage: LifecycleStage) -> usize {
        self.min_sources_by_stage.get(&stage).copied().unwrap_or(1)
    }
}

// 取值 → (来源集合, 出处)
type ValueEvidence = BTreeMap<String, (BTreeSet<SourceKind>, Vec<SourceRef>)>;

// 单个批次在解析过程中收集的证据（全部用有序容器，保证与导入顺序无关）
#[derive(Default)]
struct LotEvidence {
    attributes: BTreeMap<String, ValueEvidence>,
    provided_keys: ValueEvidence,
    variants: BTreeMap<SourceKind, ValueEvidence>,
}

fn add_evidence(map: &mut ValueEvidence, value: &str, source: SourceKind, source_ref: &SourceRef) {
    let entry = map.entry(value.to_string()).or_default();
    entry.0.insert(source);
    entry.1.push(source_ref.clone());
}

fn into_conflict(
    canonical_key: &str,
    kind: ConflictKind,
    attribute: String,
    evidence: ValueEvidence,
) -> ConflictRecord {
    let values = evidence
        .into_iter()
        .map(|(value, (sources, mut refs))| {
            refs.sort();
            refs.dedup();
            ConflictValue {
                value,
                sources,
                refs,
            }
        })
        .collect();

    ConflictRecord {
        canonical_key: canonical_key.to_string(),
        kind,
        attribute,
        values,
    }
}

// ==========================================
// IdentityResolver - 身份解析引擎
// ==========================================
// 红线: 无状态；时钟由调用方注入
pub struct IdentityResolver {
    policy: ResolverPolicy,
}

impl IdentityResolver {
    pub fn new(policy: ResolverPolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> &ResolverPolicy {
        &self.policy
    }

    /// 执行身份解析
    ///
    /// # 参数
    /// - observations: 三来源观测（顺序只影响 notes 的先后）
    /// - normalizer: 批次号归一器
    /// - now: 本次运行时钟（created_at / 缺失时间戳的兜底）
    #[instrument(skip_all, fields(observations = observations.len()))]
    pub fn resolve(
        &self,
        observations: &[IdentityObservation],
        normalizer: &LotNormalizer,
        now: DateTime<Utc>,
    ) -> ResolvedIdentities {
        let mut resolved = ResolvedIdentities::default();
        let mut evidence: BTreeMap<String, LotEvidence> = BTreeMap::new();

        // ==========================================
        // 阶段1: 逐条归一 + 别名登记
        // ==========================================
        for obs in observations {
            let normalized = match normalizer.normalize(&obs.raw_lot_id, obs.source) {
                Ok(n) => n,
                Err(err) => {
                    debug!(
                        record_id = obs.record_id,
                        source = %obs.source,
                        raw = %obs.raw_lot_id,
                        "批次号无法归一，进入无法关联集合"
                    );
                    resolved.unlinked.push(UnlinkedRecord {
                        record_id: obs.record_id,
                        source: obs.source,
                        source_ref: obs.source_ref.clone(),
                        raw_lot_id: obs.raw_lot_id.clone(),
                        reason: err.to_string(),
                    });
                    continue;
                }
            };

            let key = normalized.key.clone();
            let seen_at = obs.observed_at.unwrap_or(now);

            let lot = resolved
                .lots
                .entry(key.clone())
                .or_insert_with(|| CanonicalLot::new(key.clone(), now));

            match lot
                .aliases
                .iter_mut()
                .find(|a| a.source == obs.source && a.raw_lot_id == obs.raw_lot_id)
            {
                Some(alias) => {
                    alias.first_seen = alias.first_seen.min(seen_at);
                    alias.last_seen = alias.last_seen.max(seen_at);
                    alias.last_source_ref = obs.source_ref.clone();
                    alias.occurrences += 1;
                }
                None => lot.aliases.push(LotAlias {
                    canonical_key: key.clone(),
                    source: obs.source,
                    raw_lot_id: obs.raw_lot_id.clone(),
                    source_ref: obs.source_ref.clone(),
                    last_source_ref: obs.source_ref.clone(),
                    first_seen: seen_at,
                    last_seen: seen_at,
                    occurrences: 1,
                    confidence: normalized.confidence,
                }),
            }

            if let Some(note) = obs.note.as_deref().map(str::trim) {
                if !note.is_empty() && !lot.notes.iter().any(|n| n == note) {
                    lot.notes.push(note.to_string());
                }
            }

            resolved.record_links.insert(obs.record_id, key.clone());

            // 证据收集
            let ev = evidence.entry(key.clone()).or_default();

            for attribute in &self.policy.identity_attributes {
                if let Some(value) = obs.attributes.get(attribute) {
                    add_evidence(
                        ev.attributes.entry(attribute.clone()).or_default(),
                        value,
                        obs.source,
                        &obs.source_ref,
                    );
                }
            }

            if let Some(provided) = obs.provided_lot_key.as_deref().map(str::trim) {
                if let Ok(provided_key) = normalizer.normalize(provided, obs.source) {
                    if provided_key.key != key {
                        add_evidence(&mut ev.provided_keys, &key, obs.source, &obs.source_ref);
                        add_evidence(
                            &mut ev.provided_keys,
                            &provided_key.key,
                            obs.source,
                            &obs.source_ref,
                        );
                    }
                }
            }

            add_evidence(
                ev.variants.entry(obs.source).or_default(),
                &obs.raw_lot_id.trim().to_uppercase(),
                obs.source,
                &obs.source_ref,
            );
        }

        // ==========================================
        // 阶段2: 冲突检测（所有来源导入完成后）
        // ==========================================
        for (key, ev) in evidence {
            for (attribute, values) in ev.attributes {
                if values.len() >= 2 {
                    resolved.conflicts.push(into_conflict(
                        &key,
                        ConflictKind::AttributeMismatch,
                        attribute,
                        values,
                    ));
                }
            }

            if ev.provided_keys.len() >= 2 {
                resolved.conflicts.push(into_conflict(
                    &key,
                    ConflictKind::AmbiguousCollision,
                    PROVIDED_KEY_ATTRIBUTE.to_string(),
                    ev.provided_keys,
                ));
            }

            if self.policy.flag_intra_source_variants {
                for (source, variants) in ev.variants {
                    if variants.len() >= 2 {
                        resolved.conflicts.push(into_conflict(
                            &key,
                            ConflictKind::AmbiguousCollision,
                            format!("raw_lot_id[{}]", source),
                            variants,
                        ));
                    }
                }
            }
        }

        resolved
            .conflicts
            .sort_by(|a, b| {
                (&a.canonical_key, a.kind, &a.attribute).cmp(&(&b.canonical_key, b.kind, &b.attribute))
            });

        // ==========================================
        // 阶段3: 生命周期阶段 + 需复核判定
        // ==========================================
        let conflicts = &resolved.conflicts;
        for lot in resolved.lots.values_mut() {
            lot.aliases
                .sort_by(|a, b| (a.source, &a.raw_lot_id).cmp(&(b.source, &b.raw_lot_id)));

            lot.stage = if lot.has_source(SourceKind::Shipping) {
                LifecycleStage::Shipped
            } else if lot.has_source(SourceKind::Quality) {
                LifecycleStage::Inspected
            } else {
                LifecycleStage::Produced
            };

            let mut reasons = Vec::new();

            for alias in &lot.aliases {
                if alias.confidence == NormalizationConfidence::Low {
                    reasons.push(ReviewReason::LowConfidenceIdentifier {
                        source: alias.source,
                        raw_lot_id: alias.raw_lot_id.clone(),
                    });
                }
            }

            for conflict in conflicts.iter().filter(|c| c.canonical_key == lot.key) {
                reasons.push(ReviewReason::Conflict {
                    kind: conflict.kind,
                    attribute: conflict.attribute.clone(),
                });
            }

            let present: Vec<SourceKind> = lot.sources().into_iter().collect();
            let expected = self.policy.min_sources_for(lot.stage);
            if present.len() < expected {
                reasons.push(ReviewReason::MissingSources {
                    stage: lot.stage,
                    present,
                    expected,
                });
            }

            lot.needs_review = !reasons.is_empty();
            lot.review_reasons = reasons;
        }

        info!(
            lots = resolved.lots.len(),
            aliases = resolved.alias_count(),
            conflicts = resolved.conflicts.len(),
            unlinked = resolved.unlinked.len(),
            needs_review = resolved.needs_review_keys().len(),
            "身份解析完成"
        );

        resolved
    }
}

impl Default for IdentityResolver {
    fn default() -> Self {
        Self::new(ResolverPolicy::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::normalizer::{StripRule, StripRuleTable, DEFAULT_SEPARATOR};
    use chrono::TimeZone;
    use regex::Regex;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 2, 16, 8, 0, 0).unwrap()
    }

    fn normalizer() -> LotNormalizer {
        let rules = StripRuleTable::new()
            .with_global(StripRule::regex("^L0T", "LOT").unwrap())
            .with_source(SourceKind::Shipping, StripRule::prefix("SHP/"));
        LotNormalizer::new(
            rules,
            DEFAULT_SEPARATOR,
            Some(Regex::new(r"^[A-Z]{2,5}-\d{4,8}-\d{3,5}$").unwrap()),
        )
    }

    fn obs(record_id: u64, source: SourceKind, raw: &str, attrs: &[(&str, &str)]) -> IdentityObservation {
        IdentityObservation {
            record_id,
            source,
            source_ref: SourceRef::new(format!("{}.csv", source), None, record_id as usize + 1),
            raw_lot_id: raw.to_string(),
            provided_lot_key: None,
            attributes: attrs
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
            observed_at: None,
            note: None,
        }
    }

    #[test]
    fn test_three_sources_one_lot_three_aliases() {
        let observations = vec![
            obs(1, SourceKind::Production, "lot-2026-0001", &[]),
            obs(2, SourceKind::Quality, "LOT2026_0001", &[]),
            obs(3, SourceKind::Shipping, " Lot 2026 0001 ", &[]),
        ];

        let resolved = IdentityResolver::default().resolve(&observations, &normalizer(), now());

        assert_eq!(resolved.lots.len(), 1);
        let lot = resolved.lot("LOT-2026-0001").unwrap();
        assert_eq!(lot.aliases.len(), 3);
        assert_eq!(lot.stage, LifecycleStage::Shipped);
        assert!(!lot.needs_review);
        assert_eq!(lot.created_at, now());
        assert_eq!(resolved.record_links.len(), 3);
    }

    #[test]
    fn test_repeat_raw_updates_alias_instead_of_duplicating() {
        let mut first = obs(1, SourceKind::Production, "LOT-2026-0002", &[]);
        first.observed_at = Some(Utc.with_ymd_and_hms(2026, 2, 9, 0, 0, 0).unwrap());
        let mut second = obs(2, SourceKind::Production, "LOT-2026-0002", &[]);
        second.observed_at = Some(Utc.with_ymd_and_hms(2026, 2, 12, 0, 0, 0).unwrap());

        // 逆序输入，first_seen / last_seen 仍然正确
        let resolved =
            IdentityResolver::default().resolve(&[second, first], &normalizer(), now());

        let lot = resolved.lot("LOT-2026-0002").unwrap();
        assert_eq!(lot.aliases.len(), 1);
        let alias = &lot.aliases[0];
        assert_eq!(alias.occurrences, 2);
        assert_eq!(alias.first_seen.date_naive().to_string(), "2026-02-09");
        assert_eq!(alias.last_seen.date_naive().to_string(), "2026-02-12");
        assert_eq!(alias.source_ref.row, 3);
        assert_eq!(alias.last_source_ref.row, 2);
    }

    #[test]
    fn test_unparseable_goes_to_unlinked() {
        let observations = vec![
            obs(1, SourceKind::Production, "   ", &[]),
            obs(2, SourceKind::Quality, "--", &[]),
            obs(3, SourceKind::Quality, "LOT-2026-0003", &[]),
        ];

        let resolved = IdentityResolver::default().resolve(&observations, &normalizer(), now());

        assert_eq!(resolved.unlinked.len(), 2);
        assert_eq!(resolved.unlinked[0].record_id, 1);
        assert_eq!(resolved.unlinked[1].record_id, 2);
        assert_eq!(resolved.lots.len(), 1);
        // 每条记录恰好在一处
        assert_eq!(resolved.record_links.len() + resolved.unlinked.len(), 3);
    }

    #[test]
    fn test_attribute_conflict_is_symmetric() {
        let a = obs(1, SourceKind::Production, "LOT-2026-0004", &[("part_number", "P-100")]);
        let b = obs(2, SourceKind::Quality, "LOT-2026-0004", &[("part_number", "P-200")]);

        let resolver = IdentityResolver::default();
        let forward = resolver.resolve(&[a.clone(), b.clone()], &normalizer(), now());
        let backward = resolver.resolve(&[b, a], &normalizer(), now());

        assert_eq!(forward.conflicts, backward.conflicts);
        assert_eq!(forward.conflicts.len(), 1);
        let conflict = &forward.conflicts[0];
        assert_eq!(conflict.kind, ConflictKind::AttributeMismatch);
        assert_eq!(conflict.attribute, "part_number");
        assert_eq!(conflict.value_strings(), vec!["P-100", "P-200"]);
        assert_eq!(
            conflict.sources().into_iter().collect::<Vec<_>>(),
            vec![SourceKind::Production, SourceKind::Quality]
        );

        let lot = forward.lot("LOT-2026-0004").unwrap();
        assert!(lot.needs_review);
        assert!(lot
            .review_reasons
            .iter()
            .any(|r| matches!(r, ReviewReason::Conflict { .. })));
    }

    #[test]
    fn test_non_identity_attributes_do_not_conflict() {
        let a = obs(1, SourceKind::Production, "LOT-2026-0005", &[("shift", "A")]);
        let b = obs(2, SourceKind::Production, "LOT-2026-0005", &[("shift", "B")]);

        let resolved = IdentityResolver::default().resolve(&[a, b], &normalizer(), now());
        assert!(resolved.conflicts.is_empty());

        // 配置后 shift 参与冲突检测
        let policy = ResolverPolicy {
            identity_attributes: vec!["shift".to_string()],
            ..ResolverPolicy::default()
        };
        let a = obs(1, SourceKind::Production, "LOT-2026-0005", &[("shift", "A")]);
        let b = obs(2, SourceKind::Production, "LOT-2026-0005", &[("shift", "B")]);
        let resolved = IdentityResolver::new(policy).resolve(&[a, b], &normalizer(), now());
        assert_eq!(resolved.conflicts.len(), 1);
    }

    #[test]
    fn test_low_confidence_flags_review() {
        let resolved = IdentityResolver::default().resolve(
            &[obs(1, SourceKind::Production, "BADLOT", &[])],
            &normalizer(),
            now(),
        );

        let lot = resolved.lot("BADLOT").unwrap();
        assert!(lot.needs_review);
        assert_eq!(
            lot.review_reasons,
            vec![ReviewReason::LowConfidenceIdentifier {
                source: SourceKind::Production,
                raw_lot_id: "BADLOT".to_string(),
            }]
        );
    }

    #[test]
    fn test_missing_sources_by_stage() {
        // 只有发运 → 阶段 shipped，要求 3 个来源
        let resolved = IdentityResolver::default().resolve(
            &[obs(1, SourceKind::Shipping, "LOT-2026-0006", &[])],
            &normalizer(),
            now(),
        );

        let lot = resolved.lot("LOT-2026-0006").unwrap();
        assert_eq!(lot.stage, LifecycleStage::Shipped);
        assert!(lot.needs_review);
        assert!(matches!(
            lot.review_reasons[0],
            ReviewReason::MissingSources { expected: 3, .. }
        ));
    }

    #[test]
    fn test_intra_source_variants_are_ambiguous() {
        let observations = vec![
            obs(1, SourceKind::Production, "L0T-2026-0007", &[]),
            obs(2, SourceKind::Production, "LOT-2026-0007", &[]),
        ];

        let resolved = IdentityResolver::default().resolve(&observations, &normalizer(), now());
        assert_eq!(resolved.conflicts.len(), 1);
        assert_eq!(resolved.conflicts[0].kind, ConflictKind::AmbiguousCollision);
        assert_eq!(resolved.conflicts[0].attribute, "raw_lot_id[production]");

        let policy = ResolverPolicy {
            flag_intra_source_variants: false,
            ..ResolverPolicy::default()
        };
        let resolved = IdentityResolver::new(policy).resolve(&observations, &normalizer(), now());
        assert!(resolved.conflicts.is_empty());
        assert!(!resolved.lot("LOT-2026-0007").unwrap().needs_review);
    }

    #[test]
    fn test_provided_key_mismatch_is_ambiguous() {
        let mut o = obs(1, SourceKind::Production, "LOT-2026-0008", &[]);
        o.provided_lot_key = Some("LOT-2026-0009".to_string());

        let resolved = IdentityResolver::default().resolve(&[o], &normalizer(), now());
        assert_eq!(resolved.conflicts.len(), 1);
        let conflict = &resolved.conflicts[0];
        assert_eq!(conflict.attribute, PROVIDED_KEY_ATTRIBUTE);
        assert_eq!(conflict.value_strings(), vec!["LOT-2026-0008", "LOT-2026-0009"]);
        // 批次仍按原始批次号归属
        assert_eq!(resolved.lot_key_for(1), Some("LOT-2026-0008"));
    }

    #[test]
    fn test_notes_deduplicated_in_first_seen_order() {
        let mut a = obs(1, SourceKind::Production, "LOT-2026-0010", &[]);
        a.note = Some(" rework ".to_string());
        let mut b = obs(2, SourceKind::Quality, "LOT-2026-0010", &[]);
        b.note = Some("rework".to_string());
        let mut c = obs(3, SourceKind::Quality, "LOT-2026-0010", &[]);
        c.note = Some("retest".to_string());

        let resolved = IdentityResolver::default().resolve(&[a, b, c], &normalizer(), now());
        assert_eq!(
            resolved.lot("LOT-2026-0010").unwrap().notes,
            vec!["rework".to_string(), "retest".to_string()]
        );
    }
}
