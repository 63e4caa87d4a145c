//! 上传文件落盘
//!
//! 文件名清洗、同名避让（`name(1).ext`、`name(2).ext` …）以及分块写入。

use std::io;
use std::path::{Path, PathBuf};

use tokio::fs::{File, OpenOptions};
use tokio::io::AsyncWriteExt;

use crate::transfer::progress::PercentTracker;

/// 写入块大小
pub const WRITE_CHUNK: usize = 64 * 1024;

/// 替换路径分隔符和控制字符，空名称变为 `file`
pub fn sanitize_filename(name: &str) -> String {
    let cleaned: String = name
        .chars()
        .map(|c| match c {
            '/' | '\\' | ':' | '\0' | '\n' | '\r' => '_',
            c => c,
        })
        .collect();
    if cleaned.is_empty() {
        "file".to_string()
    } else {
        cleaned
    }
}

/// 第 n 个避让候选名
fn candidate(dir: &Path, safe_name: &str, n: u32) -> PathBuf {
    if n == 0 {
        return dir.join(safe_name);
    }
    let as_path = Path::new(safe_name);
    let stem = as_path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| safe_name.to_string());
    let ext = as_path
        .extension()
        .map(|e| format!(".{}", e.to_string_lossy()))
        .unwrap_or_default();
    dir.join(format!("{stem}({n}){ext}"))
}

/// 在 `dir` 中创建一个不覆盖已有文件的新文件
pub async fn create_unique(dir: &Path, name: &str) -> io::Result<(File, PathBuf)> {
    let safe_name = sanitize_filename(name);
    let mut n = 0;
    loop {
        let path = candidate(dir, &safe_name, n);
        match OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)
            .await
        {
            Ok(file) => return Ok((file, path)),
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => n += 1,
            Err(e) => return Err(e),
        }
    }
}

/// 分块写入，每块之后按去重规则回报百分比
pub async fn write_chunked(
    file: &mut File,
    data: &[u8],
    mut on_progress: impl FnMut(u8),
) -> io::Result<()> {
    let mut tracker = PercentTracker::new(data.len() as u64);
    if data.is_empty() {
        if let Some(pct) = tracker.update(0) {
            on_progress(pct);
        }
    }

    let mut written = 0usize;
    for chunk in data.chunks(WRITE_CHUNK) {
        file.write_all(chunk).await?;
        written += chunk.len();
        if let Some(pct) = tracker.update(written as u64) {
            on_progress(pct);
        }
    }
    file.flush().await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sanitize_filename() {
        assert_eq!(sanitize_filename("../etc/passwd"), ".._etc_passwd");
        assert_eq!(sanitize_filename("C:\\a\r\n.txt"), "C__a__.txt");
        assert_eq!(sanitize_filename(""), "file");
        assert_eq!(sanitize_filename("照片.jpg"), "照片.jpg");
    }

    #[test]
    fn test_candidate_names() {
        let dir = Path::new("/d");
        assert_eq!(candidate(dir, "a.txt", 0), PathBuf::from("/d/a.txt"));
        assert_eq!(candidate(dir, "a.txt", 1), PathBuf::from("/d/a(1).txt"));
        assert_eq!(candidate(dir, "README", 2), PathBuf::from("/d/README(2)"));
        assert_eq!(
            candidate(dir, "x.tar.gz", 1),
            PathBuf::from("/d/x.tar(1).gz")
        );
    }

    #[tokio::test]
    async fn test_create_unique_never_overwrites() {
        let dir = tempfile::tempdir().unwrap();
        let (mut first, p1) = create_unique(dir.path(), "a.txt").await.unwrap();
        write_chunked(&mut first, b"one", |_| {}).await.unwrap();
        let (mut second, p2) = create_unique(dir.path(), "a.txt").await.unwrap();
        write_chunked(&mut second, b"two", |_| {}).await.unwrap();

        assert_eq!(p1, dir.path().join("a.txt"));
        assert_eq!(p2, dir.path().join("a(1).txt"));
        assert_eq!(std::fs::read(&p1).unwrap(), b"one");
        assert_eq!(std::fs::read(&p2).unwrap(), b"two");
    }

    #[tokio::test]
    async fn test_write_chunked_progress() {
        let dir = tempfile::tempdir().unwrap();
        let (mut file, path) = create_unique(dir.path(), "big.bin").await.unwrap();
        let data = vec![7u8; WRITE_CHUNK * 4];

        let mut seen = Vec::new();
        write_chunked(&mut file, &data, |p| seen.push(p)).await.unwrap();
        assert_eq!(seen, vec![25, 50, 75, 100]);
        assert_eq!(std::fs::metadata(&path).unwrap().len(), data.len() as u64);

        let (mut empty, _) = create_unique(dir.path(), "empty.bin").await.unwrap();
        let mut seen = Vec::new();
        write_chunked(&mut empty, &[], |p| seen.push(p)).await.unwrap();
        assert_eq!(seen, vec![100]);
    }
}
