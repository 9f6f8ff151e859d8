//! 测试用临时目录：离开作用域时整目录删除

use std::ops::Deref;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

static SEQ: AtomicU64 = AtomicU64::new(0);

#[derive(Debug)]
pub(crate) struct TempDir(PathBuf);

impl TempDir {
    pub fn new(tag: &str) -> Self {
        let nanos = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap()
            .as_nanos();
        let dir = std::env::temp_dir().join(format!(
            "cite-tier-{}-{}-{}-{}",
            tag,
            std::process::id(),
            nanos,
            SEQ.fetch_add(1, Ordering::Relaxed)
        ));
        std::fs::create_dir_all(&dir).unwrap();
        Self(dir)
    }
}

impl Deref for TempDir {
    type Target = Path;

    fn deref(&self) -> &Path {
        &self.0
    }
}

impl AsRef<Path> for TempDir {
    fn as_ref(&self) -> &Path {
        &self.0
    }
}

impl Drop for TempDir {
    fn drop(&mut self) {
        let _ = std::fs::remove_dir_all(&self.0);
    }
}

/// 临时目录下的 `papers.txt`；守卫存活期间文件存在
#[derive(Debug)]
pub(crate) struct TempDataset {
    file: PathBuf,
    _dir: TempDir,
}

impl TempDataset {
    pub fn new(tag: &str, body: impl AsRef<[u8]>) -> Self {
        let dir = TempDir::new(tag);
        let file = dir.join("papers.txt");
        std::fs::write(&file, body).unwrap();
        Self { file, _dir: dir }
    }

    /// 每行之后补 `\n`
    pub fn lines(tag: &str, lines: &[&str]) -> Self {
        let mut body = String::new();
        for l in lines {
            body.push_str(l);
            body.push('\n');
        }
        Self::new(tag, body)
    }
}

impl Deref for TempDataset {
    type Target = Path;

    fn deref(&self) -> &Path {
        &self.file
    }
}

impl AsRef<Path> for TempDataset {
    fn as_ref(&self) -> &Path {
        &self.file
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dropping_guard_removes_directory() {
        let ds = TempDataset::lines("guard", &["x", "y"]);
        let dir = ds.parent().unwrap().to_path_buf();
        assert_eq!(std::fs::read(&*ds).unwrap(), b"x\ny\n");
        drop(ds);
        assert!(!dir.exists());
    }
}
