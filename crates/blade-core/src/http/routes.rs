//! 路由表
//!
//! 路由按固定顺序匹配；`OPTIONS` 在路由之前统一处理为预检请求。

/// 路由结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Route {
    Preflight,
    Upload,
    Announce,
    Heartbeat,
    AuthConfig,
    ConnectedDevices,
    PendingFiles,
    /// `/api/download/{index}[/{name}]`，name 仅供浏览器保存文件时使用
    Download { index: usize },
    /// Web 根目录下的静态文件路径
    Static(String),
    NotFound,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Endpoint {
    Upload,
    Announce,
    Heartbeat,
    AuthConfig,
    ConnectedDevices,
    PendingFiles,
}

/// (路径, 限定方法, 端点)；`None` 表示任意方法
const API_ROUTES: &[(&str, Option<&str>, Endpoint)] = &[
    ("/api/upload", Some("POST"), Endpoint::Upload),
    ("/api/upload/announce", Some("POST"), Endpoint::Announce),
    ("/api/heartbeat", None, Endpoint::Heartbeat),
    ("/api/auth-config", None, Endpoint::AuthConfig),
    ("/api/connected-devices", None, Endpoint::ConnectedDevices),
    ("/api/pending-files", None, Endpoint::PendingFiles),
];

const DOWNLOAD_PREFIX: &str = "/api/download/";

pub struct RouteTable;

impl RouteTable {
    pub fn resolve(method: &str, path: &str) -> Route {
        if method == "OPTIONS" {
            return Route::Preflight;
        }

        let endpoint = API_ROUTES.iter().find(|(route, only, _)| {
            *route == path && only.is_none_or(|m| m == method)
        });
        if let Some((_, _, endpoint)) = endpoint {
            return match endpoint {
                Endpoint::Upload => Route::Upload,
                Endpoint::Announce => Route::Announce,
                Endpoint::Heartbeat => Route::Heartbeat,
                Endpoint::AuthConfig => Route::AuthConfig,
                Endpoint::ConnectedDevices => Route::ConnectedDevices,
                Endpoint::PendingFiles => Route::PendingFiles,
            };
        }

        if let Some(rest) = path.strip_prefix(DOWNLOAD_PREFIX) {
            let index = rest.split('/').next().unwrap_or_default();
            return match index.parse() {
                Ok(index) => Route::Download { index },
                Err(_) => Route::NotFound,
            };
        }

        if method == "GET" {
            let file = if path == "/" { "/index.html" } else { path };
            return Route::Static(file.to_string());
        }
        Route::NotFound
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_api_routes() {
        assert_eq!(RouteTable::resolve("POST", "/api/upload"), Route::Upload);
        assert_eq!(
            RouteTable::resolve("POST", "/api/upload/announce"),
            Route::Announce
        );
        assert_eq!(RouteTable::resolve("GET", "/api/heartbeat"), Route::Heartbeat);
        assert_eq!(RouteTable::resolve("POST", "/api/heartbeat"), Route::Heartbeat);
        assert_eq!(RouteTable::resolve("GET", "/api/auth-config"), Route::AuthConfig);
        assert_eq!(
            RouteTable::resolve("GET", "/api/connected-devices"),
            Route::ConnectedDevices
        );
        assert_eq!(
            RouteTable::resolve("GET", "/api/pending-files"),
            Route::PendingFiles
        );
    }

    #[test]
    fn test_preflight_precedes_routing() {
        assert_eq!(RouteTable::resolve("OPTIONS", "/api/upload"), Route::Preflight);
        assert_eq!(RouteTable::resolve("OPTIONS", "/nothing"), Route::Preflight);
    }

    #[test]
    fn test_download_routes() {
        assert_eq!(
            RouteTable::resolve("GET", "/api/download/3"),
            Route::Download { index: 3 }
        );
        assert_eq!(
            RouteTable::resolve("GET", "/api/download/0/my%20file.txt"),
            Route::Download { index: 0 }
        );
        assert_eq!(RouteTable::resolve("GET", "/api/download/x"), Route::NotFound);
        assert_eq!(RouteTable::resolve("GET", "/api/download/"), Route::NotFound);
    }

    #[test]
    fn test_static_and_fallback() {
        assert_eq!(
            RouteTable::resolve("GET", "/"),
            Route::Static("/index.html".to_string())
        );
        assert_eq!(
            RouteTable::resolve("GET", "/style.css"),
            Route::Static("/style.css".to_string())
        );
        // 上传端点只接受 POST，GET 落到静态文件
        assert_eq!(
            RouteTable::resolve("GET", "/api/upload"),
            Route::Static("/api/upload".to_string())
        );
        assert_eq!(RouteTable::resolve("DELETE", "/x"), Route::NotFound);
        assert_eq!(RouteTable::resolve("PUT", "/api/upload"), Route::NotFound);
    }
}
