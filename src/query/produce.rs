use std::iter::FusedIterator;
use std::sync::Arc;

use roaring::RoaringBitmap;

use crate::config::RevisitPolicy;
use crate::core::{Frontier, Result, Tier};
use crate::index::RecordIndex;
use crate::query::expand::next_tier;
use crate::storage::RecordStore;

/// 惰性、有限、只能前进的 Tier 序列。
///
/// 每次 `next()` 才计算一层；达到 `max_tiers`、某层为空、或出错之后都不再产出。
pub struct Tiers<'s> {
    store: &'s RecordStore,
    index: Arc<RecordIndex>,
    current: Frontier,
    /// 仅 `RevisitPolicy::AllTiers` 时维护
    visited: Option<RoaringBitmap>,
    level: u32,
    max_tiers: u32,
    done: bool,
}

impl<'s> Tiers<'s> {
    pub fn new(store: &'s RecordStore, index: Arc<RecordIndex>, max_tiers: u32) -> Self {
        let current = index.seed().clone();
        Self {
            store,
            index,
            current,
            visited: None,
            level: 0,
            max_tiers,
            done: max_tiers == 0,
        }
    }

    /// 指定重访策略；应在第一次拉取之前调用
    pub fn revisit(mut self, policy: RevisitPolicy) -> Self {
        self.visited = match policy {
            RevisitPolicy::PreviousTier => None,
            RevisitPolicy::AllTiers => Some(self.current.docs().clone()),
        };
        self
    }

    /// 已产出的层数
    pub fn level(&self) -> u32 {
        self.level
    }

    pub fn index(&self) -> &RecordIndex {
        &self.index
    }
}

impl Iterator for Tiers<'_> {
    type Item = Result<Tier>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done || self.level >= self.max_tiers {
            return None;
        }

        let step = match next_tier(
            self.store,
            &self.index,
            &self.current,
            self.visited.as_ref(),
            self.level + 1,
        ) {
            Ok(step) => step,
            Err(e) => {
                self.done = true;
                return Some(Err(e));
            }
        };

        if step.frontier.is_empty() {
            tracing::info!("No records reach tier {}, search exhausted", self.level + 1);
            self.done = true;
            return None;
        }

        self.level += 1;
        if let Some(v) = self.visited.as_mut() {
            *v |= step.frontier.docs();
        }
        // 旧 frontier 在此被替换释放
        self.current = step.frontier;
        Some(Ok(step.tier))
    }
}

impl FusedIterator for Tiers<'_> {}

/// 建索引（幂等）并返回按需计算的 Tier 序列
pub fn produce<'s>(store: &'s RecordStore, keyword: &str, max_tiers: u32) -> Result<Tiers<'s>> {
    let index = store.build_index(keyword)?;
    Ok(Tiers::new(store, index, max_tiers))
}
