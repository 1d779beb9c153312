//! 配置管理命令

use anyhow::{Context, Result};
use clap::Subcommand;
use scope_client::ScopeConfig;
use std::path::{Path, PathBuf};

/// 配置命令
#[derive(Subcommand, Debug)]
pub enum ConfigCommand {
    /// 显示生效的配置（TOML）
    Show,

    /// 写出默认配置文件
    Init {
        /// 输出路径
        #[arg(default_value = "scope.toml")]
        path: PathBuf,

        /// 覆盖已存在的文件
        #[arg(long)]
        force: bool,
    },
}

impl ConfigCommand {
    pub fn execute(self, config: &ScopeConfig) -> Result<()> {
        match self {
            ConfigCommand::Show => {
                print!("{}", config.to_toml_string()?);
                Ok(())
            },
            ConfigCommand::Init { path, force } => init(&path, force),
        }
    }
}

fn init(path: &Path, force: bool) -> Result<()> {
    if path.exists() && !force {
        anyhow::bail!("{} 已存在（使用 --force 覆盖）", path.display());
    }
    ScopeConfig::default()
        .save_to_file(path)
        .with_context(|| format!("写入配置文件失败: {}", path.display()))?;
    println!("✅ 已写入默认配置: {}", path.display());
    Ok(())
}
