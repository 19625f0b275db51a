// ==========================================
// 批次对账与周报系统 - 配置层
// ==========================================
// 职责: 配置文件加载、默认值、校验为强类型快照
// 存储: 扁平 JSON 配置文件
// ==========================================

pub mod config_manager;
pub mod reconcile_config;
pub mod reconcile_config_trait;

// 重导出核心配置类型
pub use config_manager::{config_keys, ConfigManager};
pub use reconcile_config::{ReconcileConfig, ReconcileSettings, StripRuleSpec};
pub use reconcile_config_trait::ReconcileConfigReader;
