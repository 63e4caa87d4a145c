//! 共享资源保护
//!
//! 每个共享资源（设备表、待发送队列、下载目录、回调槽位）各自持有一把锁，
//! 不同资源之间的操作互不竞争。

use std::sync::{Mutex, MutexGuard, PoisonError};

/// 独占访问的共享资源
///
/// 锁中毒时直接取回内部数据：持锁期间不会留下半更新的状态。
#[derive(Debug, Default)]
pub struct Guarded<T> {
    inner: Mutex<T>,
}

impl<T> Guarded<T> {
    pub fn new(value: T) -> Self {
        Self {
            inner: Mutex::new(value),
        }
    }

    pub fn lock(&self) -> MutexGuard<'_, T> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// 在持锁状态下执行闭包
    pub fn with<R>(&self, f: impl FnOnce(&mut T) -> R) -> R {
        f(&mut self.lock())
    }

    /// 替换内部值，返回旧值
    pub fn replace(&self, value: T) -> T {
        std::mem::replace(&mut *self.lock(), value)
    }
}

impl<T: Clone> Guarded<T> {
    /// 获取当前值的副本
    pub fn snapshot(&self) -> T {
        self.lock().clone()
    }
}
