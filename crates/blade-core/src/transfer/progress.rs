//! 传输进度
//!
//! 进度以整数百分比 `floor(done * 100 / total)` 表示，只在数值变化时上报。

use std::sync::Arc;

use crate::sync::Guarded;

/// 进度回调：(文件路径或名称, 百分比)
pub type ProgressCallback = dyn Fn(&str, u8) + Send + Sync;

/// 文件预告回调：(文件名, 字节数)
pub type AnnounceCallback = dyn Fn(&str, u64) + Send + Sync;

/// 计算百分比，空文件视为 100
pub fn percent(done: u64, total: u64) -> u8 {
    if total == 0 {
        return 100;
    }
    let pct = (u128::from(done.min(total)) * 100) / u128::from(total);
    pct as u8
}

/// 百分比去重
#[derive(Debug, Clone)]
pub struct PercentTracker {
    total: u64,
    last: Option<u8>,
}

impl PercentTracker {
    pub fn new(total: u64) -> Self {
        Self { total, last: None }
    }

    /// 从已上报过的百分比继续，不再重复上报该值
    pub fn after(total: u64, reported: u8) -> Self {
        Self {
            total,
            last: Some(reported),
        }
    }

    /// 更新已完成字节数，百分比变化时返回新值
    pub fn update(&mut self, done: u64) -> Option<u8> {
        let pct = percent(done, self.total);
        if self.last == Some(pct) {
            return None;
        }
        self.last = Some(pct);
        Some(pct)
    }
}

/// 单槽回调，后注册的覆盖先注册的
pub struct CallbackSlot<F: ?Sized> {
    inner: Guarded<Option<Arc<F>>>,
}

impl<F: ?Sized> CallbackSlot<F> {
    pub fn new() -> Self {
        Self {
            inner: Guarded::new(None),
        }
    }

    pub fn set(&self, callback: Arc<F>) {
        self.inner.replace(Some(callback));
    }

    /// 取出当前回调；调用在锁外进行
    pub fn get(&self) -> Option<Arc<F>> {
        self.inner.lock().clone()
    }
}

impl<F: ?Sized> Default for CallbackSlot<F> {
    fn default() -> Self {
        Self::new()
    }
}

impl<F: ?Sized> std::fmt::Debug for CallbackSlot<F> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CallbackSlot")
            .field("set", &self.inner.lock().is_some())
            .finish()
    }
}
