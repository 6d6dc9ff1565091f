//! 存储位置与流水线配置的加载.

use std::env;
use std::path::PathBuf;

use epi_zone::config::default_store_dir;
use epi_zone::{OpenMode, PipelineConfig, Result, Store};

/// 存储目录环境变量.
pub const STORE_ENV: &str = "EPI_ZONE_STORE";

/// 人工内区带掩膜目录环境变量.
pub const MANUAL_DIR_ENV: &str = "EPI_ZONE_MANUAL_DIR";

/// JSON 配置文件环境变量.
pub const CONFIG_ENV: &str = "EPI_ZONE_CONFIG";

/// 读取非空的环境变量.
fn non_empty_var(key: &str) -> Option<String> {
    env::var(key).ok().filter(|v| !v.is_empty())
}

/// 获取存储目录.
///
/// 1. 若环境变量 `$EPI_ZONE_STORE` 非空, 则返回其值;
/// 2. 否则, 返回 `$HOME/dataset/roi_data`. 无法确定用户主目录时返回 `None`.
pub fn store_dir_from_env_or_home() -> Option<PathBuf> {
    non_empty_var(STORE_ENV)
        .map(PathBuf::from)
        .or_else(default_store_dir)
}

/// 从 `$EPI_ZONE_STORE` 或者 `$HOME/dataset/roi_data` 以 `mode` 模式打开存储.
pub fn open_store_from_env_or_home(mode: OpenMode) -> Result<Store> {
    let dir = store_dir_from_env_or_home()
        .ok_or_else(|| epi_zone::Error::NotFound(format!("${STORE_ENV}")))?;
    Store::open(dir, mode)
}

/// 获取人工内区带掩膜目录. 环境变量 `$EPI_ZONE_MANUAL_DIR` 为空时返回 `None`.
pub fn manual_dir_from_env() -> Option<PathBuf> {
    non_empty_var(MANUAL_DIR_ENV).map(PathBuf::from)
}

/// 加载流水线配置.
///
/// 1. 若环境变量 `$EPI_ZONE_CONFIG` 非空, 则从该 JSON 文件加载, 否则使用默认配置;
/// 2. 若环境变量 `$EPI_ZONE_MANUAL_DIR` 非空, 则覆盖配置中的人工掩膜目录.
pub fn config_from_env() -> Result<PipelineConfig> {
    let cfg = match non_empty_var(CONFIG_ENV) {
        Some(path) => PipelineConfig::from_json_file(path)?,
        None => PipelineConfig::default(),
    };
    Ok(match manual_dir_from_env() {
        Some(dir) => cfg.with_manual_roi_dir(dir),
        None => cfg,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    // 环境变量是进程级的, 所有相关断言放在同一个测试中.
    #[test]
    fn test_env_overrides() {
        let dir = tempfile::tempdir().unwrap();
        let cfg_path = dir.path().join("cfg.json");
        std::fs::write(&cfg_path, r#"{"inner_zone_thickness": 7}"#).unwrap();

        env::set_var(STORE_ENV, dir.path());
        env::set_var(CONFIG_ENV, &cfg_path);
        env::set_var(MANUAL_DIR_ENV, dir.path().join("manual"));

        assert_eq!(store_dir_from_env_or_home().unwrap(), dir.path());
        let store = open_store_from_env_or_home(OpenMode::Read).unwrap();
        assert_eq!(store.path(), dir.path());

        let cfg = config_from_env().unwrap();
        assert_eq!(cfg.inner_zone_thickness, 7);
        assert_eq!(cfg.manual_roi_dir, Some(dir.path().join("manual")));

        env::set_var(MANUAL_DIR_ENV, "");
        env::remove_var(CONFIG_ENV);
        let cfg = config_from_env().unwrap();
        assert_eq!(cfg, PipelineConfig::default());
    }
}
