//! 待下载队列
//!
//! 主机端排队的文件路径，下标即 `/api/download/{index}` 中的 index。
//! 移除条目后剩余条目向前压缩。

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use crate::sync::Guarded;

/// 列表中的一项，大小在请求时解析
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingEntry {
    pub index: usize,
    pub path: PathBuf,
    pub name: String,
    pub size: u64,
}

#[derive(Debug, Default)]
pub struct PendingQueue {
    paths: Guarded<Vec<PathBuf>>,
}

impl PendingQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// 追加尚未在队列中的路径，返回新加入的路径
    pub fn extend_unique<I>(&self, paths: I) -> Vec<PathBuf>
    where
        I: IntoIterator<Item = PathBuf>,
    {
        let mut queue = self.paths.lock();
        let mut added = Vec::new();
        for path in paths {
            if !queue.contains(&path) {
                queue.push(path.clone());
                added.push(path);
            }
        }
        added
    }

    pub fn remove(&self, path: &Path) -> bool {
        let mut queue = self.paths.lock();
        let before = queue.len();
        queue.retain(|p| p != path);
        queue.len() != before
    }

    pub fn get(&self, index: usize) -> Option<PathBuf> {
        self.paths.lock().get(index).cloned()
    }

    pub fn paths(&self) -> Vec<PathBuf> {
        self.paths.snapshot()
    }

    pub fn len(&self) -> usize {
        self.paths.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.paths.lock().is_empty()
    }

    /// 列出仍然存在的文件；已消失的文件出队且不出现在结果中
    ///
    /// 返回 (列表, 被移除的路径)。文件状态在锁外读取，每个文件只读一次。
    pub fn listing(&self) -> (Vec<PendingEntry>, Vec<PathBuf>) {
        let sizes: HashMap<PathBuf, Option<u64>> = self
            .paths()
            .into_iter()
            .map(|path| {
                let size = std::fs::metadata(&path)
                    .ok()
                    .filter(|meta| meta.is_file())
                    .map(|meta| meta.len());
                (path, size)
            })
            .collect();

        let mut vanished = Vec::new();
        let current = {
            let mut queue = self.paths.lock();
            queue.retain(|path| {
                if matches!(sizes.get(path), Some(None)) {
                    vanished.push(path.clone());
                    false
                } else {
                    true
                }
            });
            queue.clone()
        };

        let entries = current
            .into_iter()
            .enumerate()
            .map(|(index, path)| PendingEntry {
                index,
                name: display_name(&path),
                size: sizes.get(&path).copied().flatten().unwrap_or(0),
                path,
            })
            .collect();
        (entries, vanished)
    }
}

/// 路径中的文件名部分
pub fn display_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.to_string_lossy().into_owned())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn test_unique_and_compacting() {
        let queue = PendingQueue::new();
        let (a, b, c) = (
            PathBuf::from("/x/a"),
            PathBuf::from("/x/b"),
            PathBuf::from("/x/c"),
        );

        let added = queue.extend_unique([a.clone(), b.clone(), a.clone()]);
        assert_eq!(added, vec![a.clone(), b.clone()]);
        assert_eq!(queue.extend_unique([b.clone(), c.clone()]), vec![c.clone()]);
        assert_eq!(queue.len(), 3);

        assert!(queue.remove(&b));
        assert!(!queue.remove(&b));
        assert_eq!(queue.get(0), Some(a));
        assert_eq!(queue.get(1), Some(c));
        assert_eq!(queue.get(2), None);
    }

    #[test]
    fn test_listing_prunes_vanished_files() {
        let dir = tempfile::tempdir().unwrap();
        let keep = dir.path().join("keep.bin");
        let gone = dir.path().join("gone.bin");
        fs::write(&keep, vec![0u8; 123]).unwrap();
        fs::write(&gone, b"x").unwrap();

        let queue = PendingQueue::new();
        queue.extend_unique([gone.clone(), keep.clone()]);
        fs::remove_file(&gone).unwrap();

        let (entries, vanished) = queue.listing();
        assert_eq!(vanished, vec![gone]);
        assert_eq!(
            entries,
            vec![PendingEntry {
                index: 0,
                path: keep.clone(),
                name: "keep.bin".to_string(),
                size: 123,
            }]
        );
        assert_eq!(queue.paths(), vec![keep]);
    }

    #[test]
    fn test_listing_drops_non_files() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("a.txt");
        fs::write(&file, b"abc").unwrap();

        let queue = PendingQueue::new();
        queue.extend_unique([dir.path().to_path_buf(), file.clone()]);

        let (entries, vanished) = queue.listing();
        assert_eq!(vanished, vec![dir.path().to_path_buf()]);
        assert_eq!(entries.len(), 1);
        assert_eq!((entries[0].index, entries[0].size), (0, 3));
        assert_eq!(queue.paths(), vec![file]);
    }
}
