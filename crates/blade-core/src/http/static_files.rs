//! Web 根目录静态文件

use std::io;
use std::path::{Component, Path, PathBuf};

use crate::http::response::Response;

/// 将请求路径映射到 Web 根目录下；含 `..` 等越界成分时返回 `None`
pub fn resolve(web_root: &Path, request_path: &str) -> Option<PathBuf> {
    let relative = request_path.trim_start_matches('/');
    if relative.is_empty() || relative.contains('\\') {
        return None;
    }
    let relative = Path::new(relative);
    if !relative
        .components()
        .all(|c| matches!(c, Component::Normal(_)))
    {
        return None;
    }
    Some(web_root.join(relative))
}

/// 根据扩展名推断类型；无法识别时返回 `None`
pub fn content_type(path: &Path) -> Option<String> {
    mime_guess::from_path(path).first().map(|m| m.to_string())
}

/// 读取文件，不存在、不是普通文件或超过上限时返回 `Ok(None)`
pub async fn load(path: &Path, max_bytes: u64) -> io::Result<Option<Vec<u8>>> {
    let meta = match tokio::fs::metadata(path).await {
        Ok(meta) => meta,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e),
    };
    if !meta.is_file() || meta.len() > max_bytes {
        return Ok(None);
    }
    tokio::fs::read(path).await.map(Some)
}

/// 构造静态文件响应
pub fn file_response(path: &Path, content: Vec<u8>) -> Response {
    match content_type(path) {
        Some(mime) => Response::new(200).body(&mime, content),
        None => {
            let name = path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default();
            Response::new(200)
                .header(
                    "Content-Disposition",
                    format!("attachment; filename=\"{}\"", name.replace('"', "_")),
                )
                .body("application/octet-stream", content)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_rejects_traversal() {
        let root = Path::new("/srv/web");
        assert_eq!(
            resolve(root, "/index.html"),
            Some(PathBuf::from("/srv/web/index.html"))
        );
        assert_eq!(
            resolve(root, "/css/site.css"),
            Some(PathBuf::from("/srv/web/css/site.css"))
        );
        assert_eq!(resolve(root, "/../etc/passwd"), None);
        assert_eq!(resolve(root, "/a/../../b"), None);
        assert_eq!(resolve(root, "/..\\secret"), None);
        assert_eq!(resolve(root, "/"), None);
    }

    #[test]
    fn test_content_types() {
        assert_eq!(content_type(Path::new("a.html")).as_deref(), Some("text/html"));
        assert_eq!(content_type(Path::new("a.css")).as_deref(), Some("text/css"));
        assert_eq!(content_type(Path::new("a.png")).as_deref(), Some("image/png"));
        assert_eq!(content_type(Path::new("blob.zzqq")), None);
    }

    #[test]
    fn test_unknown_type_is_attachment() {
        let resp = file_response(Path::new("/w/blob.zzqq"), b"x".to_vec());
        assert_eq!(
            resp.header_value("Content-Type"),
            Some("application/octet-stream")
        );
        assert_eq!(
            resp.header_value("Content-Disposition"),
            Some("attachment; filename=\"blob.zzqq\"")
        );
    }

    #[tokio::test]
    async fn test_load_respects_cap() {
        let dir = tempfile::tempdir().unwrap();
        let small = dir.path().join("small.txt");
        let big = dir.path().join("big.txt");
        std::fs::write(&small, b"hi").unwrap();
        std::fs::write(&big, vec![b'x'; 2048]).unwrap();

        assert_eq!(load(&small, 1024).await.unwrap(), Some(b"hi".to_vec()));
        assert_eq!(load(&big, 1024).await.unwrap(), None);
        assert_eq!(load(&dir.path().join("nope"), 1024).await.unwrap(), None);
        assert_eq!(load(dir.path(), 1024).await.unwrap(), None);
    }
}
