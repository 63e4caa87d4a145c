//! 设备活动表
//!
//! 记录远端 IP → 最近一次活动时间。每次被跟踪的 HTTP 连接、远端 socket 连接和
//! 心跳都会刷新时间戳；后台清理任务移除超过阈值未活动的条目。
//! 表中的 key 集合即"已连接设备"集合。

use std::collections::BTreeMap;
use std::time::Duration;

use tokio::time::Instant;

use crate::sync::Guarded;

#[derive(Debug)]
pub struct DeviceActivity {
    last_seen: Guarded<BTreeMap<String, Instant>>,
    inactivity: Duration,
}

impl DeviceActivity {
    pub fn new(inactivity: Duration) -> Self {
        Self {
            last_seen: Guarded::new(BTreeMap::new()),
            inactivity,
        }
    }

    /// 刷新或插入设备时间戳，首次出现时返回 true
    pub fn touch(&self, ip: &str) -> bool {
        self.touch_at(ip, Instant::now())
    }

    pub fn touch_at(&self, ip: &str, now: Instant) -> bool {
        self.last_seen
            .lock()
            .insert(ip.to_string(), now)
            .is_none()
    }

    /// 移除超时条目，返回被移除的 IP
    pub fn sweep(&self) -> Vec<String> {
        self.sweep_at(Instant::now())
    }

    pub fn sweep_at(&self, now: Instant) -> Vec<String> {
        let mut last_seen = self.last_seen.lock();
        let expired: Vec<String> = last_seen
            .iter()
            .filter(|(_, seen)| now.saturating_duration_since(**seen) > self.inactivity)
            .map(|(ip, _)| ip.clone())
            .collect();
        for ip in &expired {
            last_seen.remove(ip);
        }
        expired
    }

    pub fn contains(&self, ip: &str) -> bool {
        self.last_seen.lock().contains_key(ip)
    }

    pub fn is_empty(&self) -> bool {
        self.last_seen.lock().is_empty()
    }

    /// 当前设备 IP（有序）
    pub fn devices(&self) -> Vec<String> {
        self.last_seen.lock().keys().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_touch_reports_first_seen_only() {
        let table = DeviceActivity::new(Duration::from_secs(30));
        assert!(table.touch("192.168.1.5"));
        assert!(!table.touch("192.168.1.5"));
        assert!(table.touch("192.168.1.6"));
        assert_eq!(table.devices(), vec!["192.168.1.5", "192.168.1.6"]);
    }

    #[test]
    fn test_sweep_evicts_stale_entries() {
        let table = DeviceActivity::new(Duration::from_secs(30));
        let start = Instant::now();
        table.touch_at("10.0.0.1", start);
        table.touch_at("10.0.0.2", start + Duration::from_secs(20));

        // 恰好 30 秒不算超时
        assert!(table.sweep_at(start + Duration::from_secs(30)).is_empty());

        let evicted = table.sweep_at(start + Duration::from_secs(31));
        assert_eq!(evicted, vec!["10.0.0.1"]);
        assert!(!table.contains("10.0.0.1"));
        assert!(!table.is_empty());

        table.sweep_at(start + Duration::from_secs(51));
        assert!(table.is_empty());
    }

    #[test]
    fn test_refresh_keeps_device_alive() {
        let table = DeviceActivity::new(Duration::from_secs(30));
        let start = Instant::now();
        table.touch_at("10.0.0.1", start);
        table.touch_at("10.0.0.1", start + Duration::from_secs(25));

        assert!(table.sweep_at(start + Duration::from_secs(40)).is_empty());
        assert!(table.contains("10.0.0.1"));
    }
}
