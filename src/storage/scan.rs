use std::ops::Range;
use std::sync::atomic::{AtomicU64, Ordering};

use serde::de::Error as _;

use crate::core::{is_blank, trim_cr, CancelToken, Location, RecordHead, Result, SearchError};
use crate::index::record_index::RawEntry;
use crate::query::Matcher;

/// 每扫描这么多行检查一次取消/失败信号
const CHECK_EVERY: usize = 4_096;

/// 单次扫描的共享上下文（所有分块共用）
pub(crate) struct ScanCtx<'a> {
    pub data: &'a [u8],
    pub matcher: &'a dyn Matcher,
    pub scanned: &'a AtomicU64,
    pub cancel: &'a CancelToken,
    /// 目前已知最早的坏行偏移；位于其后的分块提前停止，位于其前的继续扫完，
    /// 保证最终报告的总是文件中第一处坏行。
    pub first_error: AtomicU64,
}

impl<'a> ScanCtx<'a> {
    pub fn new(
        data: &'a [u8],
        matcher: &'a dyn Matcher,
        scanned: &'a AtomicU64,
        cancel: &'a CancelToken,
    ) -> Self {
        Self {
            data,
            matcher,
            scanned,
            cancel,
            first_error: AtomicU64::new(u64::MAX),
        }
    }

    fn should_stop(&self, pos: usize) -> bool {
        self.cancel.is_cancelled() || pos as u64 > self.first_error.load(Ordering::Acquire)
    }
}

/// 按目标字节数切分，边界总落在 `\n` 之后，保证每行只属于一个分块
pub(crate) fn split_chunks(data: &[u8], target: usize) -> Vec<Range<usize>> {
    let target = target.max(1);
    let mut out = Vec::with_capacity(data.len() / target + 1);
    let mut start = 0usize;
    while start < data.len() {
        let tentative = start.saturating_add(target).min(data.len());
        let end = match data[tentative..].iter().position(|&b| b == b'\n') {
            Some(nl) => tentative + nl + 1,
            None => data.len(),
        };
        out.push(start..end);
        start = end;
    }
    out
}

/// 扫描一个分块：部分解码每行的 id/title，记录位置并累加计数
pub(crate) fn scan_chunk(ctx: &ScanCtx<'_>, range: Range<usize>) -> Result<Vec<RawEntry>> {
    let data = ctx.data;
    let mut out = Vec::new();
    let mut pos = range.start;
    let mut since_check = CHECK_EVERY;

    while pos < range.end {
        if since_check >= CHECK_EVERY {
            since_check = 0;
            if ctx.should_stop(pos) {
                return Err(SearchError::Cancelled);
            }
        }
        since_check += 1;

        let line_end = data[pos..range.end]
            .iter()
            .position(|&b| b == b'\n')
            .map(|i| pos + i)
            .unwrap_or(range.end);
        let start = pos;
        pos = line_end + 1;

        let line = trim_cr(&data[start..line_end]);
        if is_blank(line) {
            continue;
        }

        let parsed = RecordHead::parse(line).and_then(|head| {
            let len = u32::try_from(line.len())
                .map_err(|_| serde_json::Error::custom("record line longer than 4 GiB"))?;
            Ok((head, len))
        });
        let (head, len) = match parsed {
            Ok(v) => v,
            Err(source) => {
                ctx.first_error.fetch_min(start as u64, Ordering::AcqRel);
                return Err(SearchError::Parse {
                    offset: start as u64,
                    source,
                });
            }
        };

        ctx.scanned.fetch_add(1, Ordering::Relaxed);
        out.push(RawEntry {
            matched: ctx.matcher.matches(&head.title),
            id: head.id.as_ref().into(),
            loc: Location::new(start as u64, len),
        });
    }

    Ok(out)
}

/// 合并各分块结果：任一失败则整体失败，报告文件中最靠前的错误
pub(crate) fn merge_chunks(results: Vec<Result<Vec<RawEntry>>>) -> Result<Vec<RawEntry>> {
    let mut first_err: Option<SearchError> = None;
    let mut total = 0usize;
    for r in &results {
        if let Ok(v) = r {
            total += v.len();
        }
    }

    let mut merged = Vec::with_capacity(total);
    for r in results {
        match r {
            Ok(mut v) => merged.append(&mut v),
            Err(e) => {
                let replace = match &first_err {
                    None => true,
                    Some(cur) => e.offset() < cur.offset(),
                };
                if replace {
                    first_err = Some(e);
                }
            }
        }
    }

    match first_err {
        Some(e) => Err(e),
        None => Ok(merged),
    }
}
