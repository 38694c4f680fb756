//! 配置管理器 - 负责处理不同环境下的配置覆盖
//!
//! 该模块提供了配置管理功能，包括：
//! - 获取当前运行环境
//! - 加载环境特定配置并合并到基础配置

use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use toml::Value;

use super::merge_value;

/// 配置管理器
pub struct ConfigManager;

impl ConfigManager {
    /// 获取当前环境名称
    ///
    /// 从环境变量 RIPPLE_ENV 获取当前环境名称，
    /// 如果未设置则默认为 "development"
    pub fn get_environment() -> String {
        env::var("RIPPLE_ENV").unwrap_or_else(|_| "development".to_string())
    }

    /// 环境配置文件路径：`{config_dir}/environments/{environment}.toml`
    pub fn environment_config_path(config_dir: &Path, environment: &str) -> PathBuf {
        config_dir
            .join("environments")
            .join(format!("{environment}.toml"))
    }

    /// 根据环境加载特定配置并合并到已合并的配置树中
    ///
    /// 环境配置文件不存在时直接返回
    pub fn merge_environment_config(merged: &mut Value, config_dir: &Path) -> Result<()> {
        let path = Self::environment_config_path(config_dir, &Self::get_environment());
        if !path.exists() {
            return Ok(());
        }

        let content = fs::read_to_string(&path)
            .with_context(|| format!("unable to read environment config: {}", path.display()))?;
        let overlay: Value = toml::from_str(&content)
            .with_context(|| format!("invalid environment config format: {}", path.display()))?;

        merge_value(merged, overlay);
        Ok(())
    }
}
