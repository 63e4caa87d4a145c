//! 本机局域网地址探测
//!
//! 枚举网卡地址，跳过回环地址，优先选择私有网段（10/8、172.16/12、192.168/16）。
//! 在存在 VPN / 虚拟网卡的主机上可能选错，结果仅供展示配对 URL 使用。

use std::net::{IpAddr, Ipv4Addr};

use log::debug;

/// 探测本机局域网 IPv4 地址，失败时返回 `127.0.0.1`
pub fn local_lan_address() -> Ipv4Addr {
    let interfaces = match get_if_addrs::get_if_addrs() {
        Ok(interfaces) => interfaces,
        Err(e) => {
            debug!("Failed to enumerate interfaces: {}", e);
            return Ipv4Addr::LOCALHOST;
        }
    };

    let candidates: Vec<Ipv4Addr> = interfaces
        .iter()
        .filter(|iface| !iface.is_loopback())
        .filter_map(|iface| match iface.ip() {
            IpAddr::V4(v4) => Some(v4),
            IpAddr::V6(_) => None,
        })
        .collect();

    select_lan_address(&candidates)
}

/// 从候选地址中选出最可能的局域网地址
pub fn select_lan_address(candidates: &[Ipv4Addr]) -> Ipv4Addr {
    let usable = || {
        candidates
            .iter()
            .copied()
            .filter(|ip| !ip.is_loopback() && !ip.is_unspecified())
    };

    usable()
        .find(Ipv4Addr::is_private)
        .or_else(|| usable().next())
        .unwrap_or(Ipv4Addr::LOCALHOST)
}

/// 判断对端是否为本机（回环地址或本机局域网地址）
pub fn is_local_peer(peer_ip: &str, own_ip: &str) -> bool {
    match peer_ip.parse::<IpAddr>() {
        Ok(ip) if ip.is_loopback() => true,
        _ => peer_ip == own_ip,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prefers_private_address() {
        let picked = select_lan_address(&[
            Ipv4Addr::new(127, 0, 0, 1),
            Ipv4Addr::new(8, 8, 4, 4),
            Ipv4Addr::new(192, 168, 1, 20),
        ]);
        assert_eq!(picked, Ipv4Addr::new(192, 168, 1, 20));

        let picked = select_lan_address(&[
            Ipv4Addr::new(100, 64, 0, 3),
            Ipv4Addr::new(172, 20, 0, 5),
        ]);
        assert_eq!(picked, Ipv4Addr::new(172, 20, 0, 5));
    }

    #[test]
    fn test_falls_back_to_first_non_loopback() {
        let picked = select_lan_address(&[
            Ipv4Addr::new(127, 0, 0, 1),
            Ipv4Addr::new(0, 0, 0, 0),
            Ipv4Addr::new(100, 64, 0, 3),
            Ipv4Addr::new(8, 8, 8, 8),
        ]);
        assert_eq!(picked, Ipv4Addr::new(100, 64, 0, 3));
    }

    #[test]
    fn test_defaults_to_localhost() {
        assert_eq!(select_lan_address(&[]), Ipv4Addr::LOCALHOST);
        assert_eq!(
            select_lan_address(&[Ipv4Addr::new(127, 0, 1, 1)]),
            Ipv4Addr::LOCALHOST
        );
    }

    #[test]
    fn test_is_local_peer() {
        assert!(is_local_peer("127.0.0.1", "192.168.1.2"));
        assert!(is_local_peer("127.4.5.6", "192.168.1.2"));
        assert!(is_local_peer("::1", "192.168.1.2"));
        assert!(is_local_peer("192.168.1.2", "192.168.1.2"));
        assert!(!is_local_peer("192.168.1.3", "192.168.1.2"));
    }

    #[test]
    fn test_local_lan_address_is_not_loopback_unless_fallback() {
        let ip = local_lan_address();
        assert!(!ip.is_unspecified());
    }
}
