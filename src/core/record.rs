use serde::{Deserialize, Deserializer};
use std::borrow::Cow;

/// 记录在数据文件中的位置（字节偏移 + 行长度，不含换行符）。
///
/// 对调用方不透明：只能由 `RecordStore` 建索引时产出，再交回 `fetch_references` 使用。
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Location {
    offset: u64,
    len: u32,
}

impl Location {
    pub(crate) fn new(offset: u64, len: u32) -> Self {
        Self { offset, len }
    }

    pub fn offset(&self) -> u64 {
        self.offset
    }

    /// 行字节数；空白行不入索引，不存在零长度的 Location
    #[allow(clippy::len_without_is_empty)]
    pub fn len(&self) -> u32 {
        self.len
    }
}

/// 完整记录：只在一次点查的作用域内存在，从不常驻。
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
pub struct Record {
    pub id: String,
    pub title: String,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub references: Vec<String>,
}

impl Record {
    pub fn parse(line: &[u8]) -> serde_json::Result<Self> {
        serde_json::from_slice(line)
    }
}

/// 建索引阶段的部分解码：只取 id 与 title，references 只做语法跳过不分配。
#[derive(Debug, Deserialize)]
pub struct RecordHead<'a> {
    #[serde(borrow)]
    pub id: Cow<'a, str>,
    #[serde(borrow)]
    pub title: Cow<'a, str>,
}

impl<'a> RecordHead<'a> {
    pub fn parse(line: &'a [u8]) -> serde_json::Result<Self> {
        serde_json::from_slice(line)
    }
}

/// 引用 id（尽量借用行缓冲，转义时才分配）
#[derive(Debug, Deserialize)]
pub struct RefId<'a>(#[serde(borrow)] pub Cow<'a, str>);

/// 点查阶段的解码：只取 references。
#[derive(Debug, Default, Deserialize)]
pub struct RecordRefs<'a> {
    #[serde(borrow, default, deserialize_with = "null_as_empty")]
    pub references: Vec<RefId<'a>>,
}

impl<'a> RecordRefs<'a> {
    pub fn parse(line: &'a [u8]) -> serde_json::Result<Self> {
        serde_json::from_slice(line)
    }
}

/// DBLP 导出里 `references` 可能缺失或为 null，统一视为空。
fn null_as_empty<'de, D, T>(d: D) -> Result<Vec<T>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Option::<Vec<T>>::deserialize(d).map(Option::unwrap_or_default)
}

/// 空行（含仅空白）不算记录
pub(crate) fn is_blank(line: &[u8]) -> bool {
    line.iter().all(u8::is_ascii_whitespace)
}

/// 去掉行尾 `\r`（CRLF 数据集）
pub(crate) fn trim_cr(line: &[u8]) -> &[u8] {
    line.strip_suffix(b"\r").unwrap_or(line)
}
