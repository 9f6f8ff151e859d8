use rayon::prelude::*;

use crate::core::{Frontier, Location, Result, SearchError};

/// 扫描阶段产出的原始条目（未排序、可能含重复 id）
#[derive(Clone, Debug)]
pub(crate) struct RawEntry {
    pub id: Box<str>,
    pub loc: Location,
    /// title 是否命中关键字
    pub matched: bool,
}

/// 索引条目：只有 id 与位置，从不保存记录正文
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct IndexEntry {
    pub id: Box<str>,
    pub loc: Location,
}

/// id → Location 的只读表。
///
/// 条目按 id 排序，下标即 DocId（u32），frontier 用 DocId 位图表示。
/// 构建完成后不再修改，扩展阶段被所有 worker 并发只读共享。
#[derive(Debug)]
pub struct RecordIndex {
    entries: Vec<IndexEntry>,
    seed: Frontier,
    keyword: String,
    duplicates: usize,
}

impl RecordIndex {
    pub(crate) fn from_raw(mut raw: Vec<RawEntry>, keyword: &str) -> Result<Self> {
        // (id, offset) 排序后去重保留第一条：重复 id 以文件中最早出现者为准，与分块调度无关；
        // 任一重复行命中关键字，保留的那条即进入 seed
        raw.par_sort_unstable_by(|a, b| a.id.cmp(&b.id).then(a.loc.cmp(&b.loc)));
        let before = raw.len();
        raw.dedup_by(|later, first| {
            if later.id != first.id {
                return false;
            }
            first.matched |= later.matched;
            true
        });
        let duplicates = before - raw.len();

        if raw.len() > u32::MAX as usize {
            return Err(SearchError::TooManyRecords);
        }

        let seed: Frontier = raw
            .iter()
            .enumerate()
            .filter(|(_, e)| e.matched)
            .map(|(doc, _)| doc as u32)
            .collect();

        let mut entries = Vec::with_capacity(raw.len());
        entries.extend(raw.into_iter().map(|e| IndexEntry { id: e.id, loc: e.loc }));

        Ok(Self {
            entries,
            seed,
            keyword: keyword.to_string(),
            duplicates,
        })
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> &[IndexEntry] {
        &self.entries
    }

    /// 初始 frontier：title 命中关键字的记录
    pub fn seed(&self) -> &Frontier {
        &self.seed
    }

    /// 构建该索引时使用的关键字
    pub fn keyword(&self) -> &str {
        &self.keyword
    }

    /// 被忽略的重复 id 行数
    pub fn duplicates(&self) -> usize {
        self.duplicates
    }

    pub fn doc_id(&self, id: &str) -> Option<u32> {
        self.entries
            .binary_search_by(|e| (*e.id).cmp(id))
            .ok()
            .map(|i| i as u32)
    }

    pub fn location(&self, id: &str) -> Option<Location> {
        self.doc_id(id).map(|d| self.entries[d as usize].loc)
    }

    pub fn id(&self, doc: u32) -> Option<&str> {
        self.entries.get(doc as usize).map(|e| &*e.id)
    }

    /// DocId 集合还原为 id（按 id 排序）
    pub fn ids_of(&self, frontier: &Frontier) -> Vec<String> {
        frontier
            .iter()
            .filter_map(|d| self.id(d))
            .map(str::to_string)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw(id: &str, offset: u64, matched: bool) -> RawEntry {
        RawEntry {
            id: id.into(),
            loc: Location::new(offset, 10),
            matched,
        }
    }

    #[test]
    fn sorted_lookup_and_seed() {
        let idx = RecordIndex::from_raw(
            vec![raw("c", 20, false), raw("a", 0, true), raw("b", 10, false)],
            "kw",
        )
        .unwrap();
        assert_eq!(idx.len(), 3);
        assert_eq!(idx.doc_id("a"), Some(0));
        assert_eq!(idx.doc_id("c"), Some(2));
        assert_eq!(idx.doc_id("x"), None);
        assert_eq!(idx.location("b").map(|l| l.offset()), Some(10));
        assert_eq!(idx.ids_of(idx.seed()), vec!["a".to_string()]);
        assert_eq!(idx.keyword(), "kw");
    }

    #[test]
    fn duplicate_ids_keep_earliest_offset() {
        let idx = RecordIndex::from_raw(
            vec![raw("a", 50, true), raw("a", 5, false), raw("b", 20, false)],
            "kw",
        )
        .unwrap();
        assert_eq!(idx.len(), 2);
        assert_eq!(idx.duplicates(), 1);
        assert_eq!(idx.location("a").map(|l| l.offset()), Some(5));
        // 偏移 50 那行命中，"a" 仍是种子
        assert_eq!(idx.ids_of(idx.seed()), vec!["a".to_string()]);
    }

    #[test]
    fn unmatched_duplicates_stay_out_of_seed() {
        let idx = RecordIndex::from_raw(
            vec![raw("a", 0, false), raw("a", 30, false), raw("b", 60, true)],
            "kw",
        )
        .unwrap();
        assert_eq!(idx.ids_of(idx.seed()), vec!["b".to_string()]);
    }
}
