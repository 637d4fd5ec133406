//! CLI 命令行参数解析
//!
//! 使用 clap 定义命令行接口并进行参数解析

use crate::config::RunConfig;
use clap::{Args, Parser, Subcommand};
use std::ffi::OsString;
use std::path::PathBuf;

/// run 命令参数；未指定的字段沿用配置文件/环境变量中的值
#[derive(Args, Debug, Clone, Default, PartialEq, Eq)]
pub struct RunArgs {
    /// 进程总数上限（包含根进程）
    #[arg(long, value_name = "N")]
    pub max_processes: Option<u64>,
    /// 单个进程最少派生的子进程数
    #[arg(long, value_name = "N")]
    pub min_spawn: Option<u64>,
    /// 单个进程最多派生的子进程数
    #[arg(long, value_name = "N")]
    pub max_spawn: Option<u64>,
    /// 派生日志文件路径（每次运行时清空）
    #[arg(long, value_name = "PATH")]
    pub log_file: Option<PathBuf>,
    /// JSON 配置文件
    #[arg(long, value_name = "PATH")]
    pub config: Option<PathBuf>,
    /// 打印进程树后删除派生日志
    #[arg(long)]
    pub cleanup: bool,
    /// 日志级别 (trace, debug, info, warn, error)
    #[arg(long, value_name = "LEVEL")]
    pub log_level: Option<String>,
}

impl RunArgs {
    /// 命令行参数优先级最高，覆盖已加载的配置
    pub fn apply(&self, mut config: RunConfig) -> RunConfig {
        if let Some(value) = self.max_processes {
            config.max_processes = value;
        }
        if let Some(value) = self.min_spawn {
            config.min_spawn = value;
        }
        if let Some(value) = self.max_spawn {
            config.max_spawn = value;
        }
        if let Some(path) = &self.log_file {
            config.log_file = path.clone();
        }
        if self.cleanup {
            config.cleanup_log = true;
        }
        if let Some(level) = &self.log_level {
            config.log_level = Some(level.clone());
        }
        config
    }
}

#[derive(Parser, Debug)]
#[command(
    name = "forktree",
    version,
    about = "Spawn a bounded random process tree and print its shape"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Commands {
    /// 派生进程树并打印（无参数时的默认行为）
    Run(RunArgs),

    /// 从已有的派生日志重建并打印进程树
    Show {
        /// 派生日志文件
        #[arg(value_name = "LOG")]
        log: PathBuf,
    },
}

impl Cli {
    /// 解析命令行参数并返回最终命令（默认 Run）
    pub fn parse_command() -> Commands {
        Self::parse_command_from(std::env::args_os())
    }

    /// 尝试解析命令行参数（用于测试或自定义 argv）
    pub fn try_parse_command_from<I, T>(iter: I) -> Result<Commands, clap::Error>
    where
        I: IntoIterator<Item = T>,
        T: Into<OsString> + Clone,
    {
        let mut cli = Cli::try_parse_from(iter)?;
        Ok(cli
            .command
            .take()
            .unwrap_or_else(|| Commands::Run(RunArgs::default())))
    }

    /// 解析命令行参数（失败时由 clap 处理错误输出和退出）
    pub fn parse_command_from<I, T>(iter: I) -> Commands
    where
        I: IntoIterator<Item = T>,
        T: Into<OsString> + Clone,
    {
        match Self::try_parse_command_from(iter) {
            Ok(command) => command,
            Err(err) => err.exit(),
        }
    }
}
