use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// 协作式取消信号：批次之间检查，已在途的单条读取允许完成。
#[derive(Clone, Debug, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Release);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}
