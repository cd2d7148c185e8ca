//! 按标识符的互斥锁
//!
//! 同一标识符的写入和删除串行执行，不同标识符互不影响。

use ingest_core::{IngestError, Result};
use std::collections::HashSet;
use std::sync::{Condvar, Mutex};
use tracing::debug;

/// 正在被占用的标识符集合
#[derive(Debug, Default)]
pub struct IdentifierLocks {
    held: Mutex<HashSet<String>>,
    released: Condvar,
}

impl IdentifierLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// 阻塞直到拿到该标识符的锁
    pub fn acquire(&self, identifier: &str) -> Result<IdentifierGuard<'_>> {
        let mut held = self.held.lock().map_err(poisoned)?;

        while held.contains(identifier) {
            debug!("waiting for identifier lock: {}", identifier);
            held = self.released.wait(held).map_err(poisoned)?;
        }
        held.insert(identifier.to_string());

        Ok(IdentifierGuard {
            locks: self,
            identifier: identifier.to_string(),
        })
    }

    /// 当前是否被占用
    pub fn is_held(&self, identifier: &str) -> bool {
        self.held
            .lock()
            .map(|held| held.contains(identifier))
            .unwrap_or(false)
    }
}

/// 离开作用域时释放锁
#[derive(Debug)]
pub struct IdentifierGuard<'a> {
    locks: &'a IdentifierLocks,
    identifier: String,
}

impl Drop for IdentifierGuard<'_> {
    fn drop(&mut self) {
        let mut held = self
            .locks
            .held
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        held.remove(&self.identifier);
        self.locks.released.notify_all();
    }
}

fn poisoned<E: std::fmt::Display>(e: E) -> IngestError {
    IngestError::PersistenceFailure(format!("identifier lock poisoned: {}", e))
}
