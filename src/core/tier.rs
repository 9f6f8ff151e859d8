use roaring::RoaringBitmap;
use std::fmt;

/// 一层扩展的结果：层号从 1 开始单调递增，产出后不可变，归调用方所有。
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Tier {
    pub level: u32,
    pub ids: Vec<String>,
}

impl Tier {
    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    pub fn joined(&self, sep: &str) -> String {
        self.ids.join(sep)
    }
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, ">>> Tier {}", self.level)?;
        write!(f, "{}", self.joined(", "))
    }
}

/// 当前层的 id 集合（按 DocId 存储）。
///
/// 每层整体替换而非累积；计算下一层期间只读共享，并发成员测试无需加锁。
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Frontier {
    docs: RoaringBitmap,
}

impl Frontier {
    pub fn new(docs: RoaringBitmap) -> Self {
        Self { docs }
    }

    pub fn contains(&self, doc: u32) -> bool {
        self.docs.contains(doc)
    }

    pub fn len(&self) -> u64 {
        self.docs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.docs.is_empty()
    }

    pub fn docs(&self) -> &RoaringBitmap {
        &self.docs
    }

    pub fn iter(&self) -> impl Iterator<Item = u32> + '_ {
        self.docs.iter()
    }
}

impl FromIterator<u32> for Frontier {
    fn from_iter<I: IntoIterator<Item = u32>>(iter: I) -> Self {
        Self {
            docs: iter.into_iter().collect(),
        }
    }
}
