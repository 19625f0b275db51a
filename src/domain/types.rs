// ==========================================
// 批次对账与周报系统 - 领域类型定义
// ==========================================
// 职责: 闭合枚举（来源/质检结果/发运状态/合规指示等）
// 红线: 字符串只在导入边界解析一次，下游只认枚举
// ==========================================

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

// ==========================================
// 数据来源 (Source Kind)
// ==========================================
// 三源之一: 生产 / 质检 / 发运
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
    Production, // 生产记录
    Quality,    // 质检记录
    Shipping,   // 发运记录
}

impl SourceKind {
    /// 全部来源（固定顺序）
    pub const ALL: [SourceKind; 3] = [
        SourceKind::Production,
        SourceKind::Quality,
        SourceKind::Shipping,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            SourceKind::Production => "production",
            SourceKind::Quality => "quality",
            SourceKind::Shipping => "shipping",
        }
    }
}

impl fmt::Display for SourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// 来源标签解析失败（标签不在 {production, quality, shipping} 内）
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownSourceTag(pub String);

impl fmt::Display for UnknownSourceTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "未知数据来源标签: {:?}", self.0)
    }
}

impl std::error::Error for UnknownSourceTag {}

impl FromStr for SourceKind {
    type Err = UnknownSourceTag;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "production" => Ok(SourceKind::Production),
            "quality" => Ok(SourceKind::Quality),
            "shipping" => Ok(SourceKind::Shipping),
            _ => Err(UnknownSourceTag(s.to_string())),
        }
    }
}

// ==========================================
// 质检结果 (Inspection Result)
// ==========================================
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InspectionResult {
    Pass,        // 合格
    Fail,        // 不合格
    Conditional, // 条件放行
}

impl InspectionResult {
    /// 从源文本解析（大小写不敏感）
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_lowercase().as_str() {
            "pass" | "passed" | "ok" => Some(InspectionResult::Pass),
            "fail" | "failed" | "ng" | "reject" | "rejected" => Some(InspectionResult::Fail),
            "conditional" | "conditional pass" | "cond" => Some(InspectionResult::Conditional),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            InspectionResult::Pass => "pass",
            InspectionResult::Fail => "fail",
            InspectionResult::Conditional => "conditional",
        }
    }
}

impl fmt::Display for InspectionResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// ==========================================
// 发运状态 (Ship Status)
// ==========================================
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum ShipStatus {
    Shipped,   // 已发运
    Partial,   // 部分发运
    OnHold,    // 暂扣
    Cancelled, // 已取消
}

impl ShipStatus {
    /// 从源文本解析（忽略大小写与分隔符差异）
    pub fn parse(value: &str) -> Option<Self> {
        let compact: String = value
            .trim()
            .to_lowercase()
            .chars()
            .filter(|c| c.is_alphanumeric())
            .collect();
        match compact.as_str() {
            "shipped" => Some(ShipStatus::Shipped),
            "partial" | "partiallyshipped" => Some(ShipStatus::Partial),
            "onhold" | "hold" => Some(ShipStatus::OnHold),
            "cancelled" | "canceled" => Some(ShipStatus::Cancelled),
            _ => None,
        }
    }

    /// 是否算作"已发运"（Shipped / Partial）
    pub fn counts_as_shipped(&self) -> bool {
        matches!(self, ShipStatus::Shipped | ShipStatus::Partial)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ShipStatus::Shipped => "Shipped",
            ShipStatus::Partial => "Partial",
            ShipStatus::OnHold => "On Hold",
            ShipStatus::Cancelled => "Cancelled",
        }
    }
}

impl fmt::Display for ShipStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// ==========================================
// 缺陷严重度 (Severity)
// ==========================================
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Minor,
    Major,
    Critical,
}

impl Severity {
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_lowercase().as_str() {
            "minor" | "low" => Some(Severity::Minor),
            "major" | "medium" => Some(Severity::Major),
            "critical" | "high" => Some(Severity::Critical),
            _ => None,
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Severity::Minor => write!(f, "minor"),
            Severity::Major => write!(f, "major"),
            Severity::Critical => write!(f, "critical"),
        }
    }
}

// ==========================================
// 合规指示 (Compliance Indicator)
// ==========================================
// 红线: 无质检 = RED（fail-closed）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ComplianceIndicator {
    Green,
    Red,
}

impl fmt::Display for ComplianceIndicator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ComplianceIndicator::Green => write!(f, "GREEN"),
            ComplianceIndicator::Red => write!(f, "RED"),
        }
    }
}

// ==========================================
// 批次号归一置信度
// ==========================================
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NormalizationConfidence {
    High, // 符合批次号形态
    Low,  // 不符合形态，仍返回 key，但需人工复核
}

// ==========================================
// 批次生命周期阶段
// ==========================================
// 用于判定"来源覆盖不足"
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LifecycleStage {
    Produced,  // 仅见于生产
    Inspected, // 已见于质检
    Shipped,   // 已见于发运
}

impl LifecycleStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            LifecycleStage::Produced => "produced",
            LifecycleStage::Inspected => "inspected",
            LifecycleStage::Shipped => "shipped",
        }
    }
}

impl fmt::Display for LifecycleStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for LifecycleStage {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "produced" => Ok(LifecycleStage::Produced),
            "inspected" => Ok(LifecycleStage::Inspected),
            "shipped" => Ok(LifecycleStage::Shipped),
            other => Err(format!("未知生命周期阶段: {}", other)),
        }
    }
}

// ==========================================
// 趋势方向
// ==========================================
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TrendDirection {
    Up,
    Down,
    Flat,
}

impl TrendDirection {
    pub fn from_delta(delta: i64) -> Self {
        if delta > 0 {
            TrendDirection::Up
        } else if delta < 0 {
            TrendDirection::Down
        } else {
            TrendDirection::Flat
        }
    }
}

impl fmt::Display for TrendDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TrendDirection::Up => write!(f, "up"),
            TrendDirection::Down => write!(f, "down"),
            TrendDirection::Flat => write!(f, "flat"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_source_kind_from_str() {
        assert_eq!("production".parse::<SourceKind>(), Ok(SourceKind::Production));
        assert_eq!(" Quality ".parse::<SourceKind>(), Ok(SourceKind::Quality));
        assert_eq!("SHIPPING".parse::<SourceKind>(), Ok(SourceKind::Shipping));
        assert!("sales".parse::<SourceKind>().is_err());
    }

    #[test]
    fn test_ship_status_parse() {
        assert_eq!(ShipStatus::parse("On Hold"), Some(ShipStatus::OnHold));
        assert_eq!(ShipStatus::parse("on_hold"), Some(ShipStatus::OnHold));
        assert_eq!(ShipStatus::parse("Shipped"), Some(ShipStatus::Shipped));
        assert_eq!(ShipStatus::parse("canceled"), Some(ShipStatus::Cancelled));
        assert_eq!(ShipStatus::parse("lost"), None);
        assert!(ShipStatus::Partial.counts_as_shipped());
        assert!(!ShipStatus::OnHold.counts_as_shipped());
    }

    #[test]
    fn test_inspection_result_parse() {
        assert_eq!(InspectionResult::parse("PASS"), Some(InspectionResult::Pass));
        assert_eq!(InspectionResult::parse(" fail "), Some(InspectionResult::Fail));
        assert_eq!(
            InspectionResult::parse("Conditional"),
            Some(InspectionResult::Conditional)
        );
        assert_eq!(InspectionResult::parse("maybe"), None);
    }

    #[test]
    fn test_trend_direction_from_delta() {
        assert_eq!(TrendDirection::from_delta(6), TrendDirection::Up);
        assert_eq!(TrendDirection::from_delta(-1), TrendDirection::Down);
        assert_eq!(TrendDirection::from_delta(0), TrendDirection::Flat);
    }
}
