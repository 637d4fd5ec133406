//! 日志系统
//!
//! 初始化 tracing 订阅者。所有进程共享继承下来的 stderr，
//! 因此只在根进程中初始化一次，子进程通过 fork 继承该配置。

use anyhow::Result;
use std::path::PathBuf;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// 未指定级别且没有 RUST_LOG 时的默认过滤规则
pub const DEFAULT_FILTER: &str = "warn,forktree=info";

/// 初始化日志系统
///
/// # Arguments
/// * `log_level` - 日志级别 (trace, debug, info, warn, error)，如果为 None 则使用环境变量 RUST_LOG
/// * `log_file` - 日志文件路径，如果为 None 则只输出到 stderr
///
/// # Examples
/// ```no_run
/// use forktree::utils::logger::init_logger;
///
/// // 使用默认配置（从环境变量读取）
/// init_logger(None, None).unwrap();
/// ```
pub fn init_logger(log_level: Option<&str>, log_file: Option<PathBuf>) -> Result<()> {
    let env_filter = build_filter(log_level)?;

    // stdout 只留给根进程打印进程树
    let fmt_layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_level(true)
        .compact();

    let registry = tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer);

    if let Some(log_path) = log_file {
        if let Some(parent) = log_path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        // 追加模式：多个进程同时写入时不会互相覆盖
        let file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&log_path)?;

        let file_layer = fmt::layer()
            .with_writer(std::sync::Arc::new(file))
            .with_target(true)
            .with_ansi(false)
            .with_level(true);

        registry.with(file_layer).try_init()?;
    } else {
        registry.try_init()?;
    }

    tracing::debug!("Logger initialized");
    Ok(())
}

fn build_filter(log_level: Option<&str>) -> Result<EnvFilter> {
    let filter = match log_level {
        Some(level) => EnvFilter::try_new(level)?,
        None => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER)),
    };
    Ok(filter)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn explicit_level_is_accepted() {
        assert!(build_filter(Some("debug")).is_ok());
        assert!(build_filter(Some("warn,forktree=trace")).is_ok());
    }

    #[test]
    fn invalid_level_is_rejected() {
        assert!(build_filter(Some("forktree=notalevel")).is_err());
    }
}
