//! 产物发布与中间文件清理

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use tracing::{debug, error, info, warn};

use crate::error::{RsadResult, RsadrulesError};

/// 中间文件工作区：记录本次运行创建的全部临时文件
#[derive(Debug)]
pub struct Workspace {
    dir: PathBuf,
    transients: Vec<PathBuf>,
}

impl Workspace {
    pub async fn create(dir: &Path) -> RsadResult<Self> {
        tokio::fs::create_dir_all(dir).await?;
        Ok(Self {
            dir: dir.to_path_buf(),
            transients: Vec::new(),
        })
    }

    /// 分配工作区内的临时文件路径并登记
    pub fn transient(&mut self, file_name: &str) -> PathBuf {
        let path = self.dir.join(file_name);
        self.register(path.clone());
        path
    }

    /// 登记工作区外的临时文件（如临时下载的工具）
    pub fn register(&mut self, path: PathBuf) {
        if !self.transients.contains(&path) {
            self.transients.push(path);
        }
    }

    /// 删除全部登记的临时文件，不存在的文件直接跳过；返回实际删除数量
    pub async fn cleanup(&self) -> usize {
        let mut removed = 0;
        for path in &self.transients {
            if remove_quietly(path).await {
                removed += 1;
            }
        }

        // 工作区为空时一并删除
        if let Err(e) = tokio::fs::remove_dir(&self.dir).await {
            debug!("保留工作区 {}：{}", self.dir.display(), e);
        }
        debug!("已清理 {} 个临时文件", removed);
        removed
    }
}

/// 待发布产物
#[derive(Debug, Clone)]
pub struct Artifact {
    pub staged: PathBuf,
    pub target: PathBuf,
}

impl Artifact {
    pub fn new(staged: PathBuf, target: PathBuf) -> Self {
        Self { staged, target }
    }
}

/// 产物发布器
pub struct Publisher;

/// 复制到目标目录后待提交的产物
struct Staged<'a> {
    artifact: &'a Artifact,
    tmp: PathBuf,
    backup: PathBuf,
}

/// 已替换的目标及其旧版本备份
struct Committed {
    target: PathBuf,
    backup: Option<PathBuf>,
}

impl Publisher {
    /// 发布全部产物，覆盖旧版本，全部成功或全部不变
    /// 1. 预检：待发布文件存在，目标不是目录
    /// 2. 复制：产物复制为目标目录内的临时文件
    /// 3. 提交：旧产物改名为备份后原子重命名；任一失败则还原已替换的目标
    pub async fn publish(artifacts: &[Artifact]) -> RsadResult<Vec<PathBuf>> {
        for artifact in artifacts {
            Self::preflight(artifact).await?;
        }

        let mut staged: Vec<Staged<'_>> = Vec::with_capacity(artifacts.len());
        for artifact in artifacts {
            if let Some(parent) = artifact.target.parent() {
                tokio::fs::create_dir_all(parent).await?;
            }
            let tmp = sibling(&artifact.target, "tmp")?;
            let backup = sibling(&artifact.target, "bak")?;
            if let Err(e) = tokio::fs::copy(&artifact.staged, &tmp).await {
                discard_staged(&staged).await;
                remove_quietly(&tmp).await;
                return Err(e.into());
            }
            staged.push(Staged { artifact, tmp, backup });
        }

        let mut committed: Vec<Committed> = Vec::with_capacity(staged.len());
        for (idx, item) in staged.iter().enumerate() {
            match swap_in(&item.tmp, &item.artifact.target, &item.backup).await {
                Ok(had_previous) => committed.push(Committed {
                    target: item.artifact.target.clone(),
                    backup: had_previous.then(|| item.backup.clone()),
                }),
                Err(e) => {
                    error!("替换 {} 失败：{}，还原已发布的产物", item.artifact.target.display(), e);
                    rollback(&committed).await;
                    discard_staged(&staged[idx..]).await;
                    return Err(e.into());
                }
            }
        }

        for done in &committed {
            if let Some(backup) = &done.backup {
                remove_quietly(backup).await;
            }
        }

        let mut published = Vec::with_capacity(staged.len());
        for item in &staged {
            remove_quietly(&item.artifact.staged).await;
            info!("已发布 {}", item.artifact.target.display());
            published.push(item.artifact.target.clone());
        }
        Ok(published)
    }

    async fn preflight(artifact: &Artifact) -> RsadResult<()> {
        if !tokio::fs::try_exists(&artifact.staged).await? {
            return Err(RsadrulesError::InvalidInput(format!(
                "待发布产物不存在：{}",
                artifact.staged.display()
            )));
        }
        match tokio::fs::metadata(&artifact.target).await {
            Ok(meta) if meta.is_dir() => Err(RsadrulesError::InvalidInput(format!(
                "发布目标是目录：{}",
                artifact.target.display()
            ))),
            Ok(_) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

/// 旧产物改名为备份，再把临时文件重命名为目标；返回是否存在旧产物
async fn swap_in(tmp: &Path, target: &Path, backup: &Path) -> std::io::Result<bool> {
    let had_previous = tokio::fs::try_exists(target).await?;
    if had_previous {
        tokio::fs::rename(target, backup).await?;
    }
    if let Err(e) = tokio::fs::rename(tmp, target).await {
        if had_previous {
            if let Err(restore_err) = tokio::fs::rename(backup, target).await {
                warn!("还原 {} 失败：{}", target.display(), restore_err);
            }
        }
        return Err(e);
    }
    Ok(had_previous)
}

/// 逆序还原已替换的目标：有备份则恢复备份，否则删除新文件
async fn rollback(committed: &[Committed]) {
    for done in committed.iter().rev() {
        match &done.backup {
            Some(backup) => {
                if let Err(e) = tokio::fs::rename(backup, &done.target).await {
                    warn!("还原 {} 失败：{}", done.target.display(), e);
                }
            }
            None => {
                remove_quietly(&done.target).await;
            }
        }
    }
}

async fn discard_staged(staged: &[Staged<'_>]) {
    for item in staged {
        remove_quietly(&item.tmp).await;
    }
}

fn sibling(target: &Path, suffix: &str) -> RsadResult<PathBuf> {
    let file_name = target
        .file_name()
        .ok_or_else(|| RsadrulesError::InvalidInput(format!("无效的发布路径：{}", target.display())))?;
    Ok(target.with_file_name(format!(".{}.{}", file_name.to_string_lossy(), suffix)))
}

/// 删除文件，文件不存在不视为错误；返回是否实际删除
pub(crate) async fn remove_quietly(path: &Path) -> bool {
    match tokio::fs::remove_file(path).await {
        Ok(()) => true,
        Err(e) if e.kind() == ErrorKind::NotFound => false,
        Err(e) => {
            warn!("删除临时文件 {} 失败：{}", path.display(), e);
            false
        }
    }
}
