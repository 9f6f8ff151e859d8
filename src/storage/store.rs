use std::fs::File;
use std::os::unix::fs::FileExt;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Instant, SystemTime};

use parking_lot::Mutex;
use rayon::prelude::*;

use crate::config::SearchConfig;
use crate::core::{
    AdaptiveScheduler, CancelToken, ExecutionStrategy, Location, RecordRefs, RefId, Result,
    SearchError, Task,
};
use crate::index::record_index::{RawEntry, RecordIndex};
use crate::query::create_matcher;
use crate::storage::scan::{merge_chunks, scan_chunk, split_chunks, ScanCtx};

/// 扫描进度句柄：可克隆、无锁读取，供资源监控使用
#[derive(Clone, Debug, Default)]
pub struct ScanProgress(Arc<AtomicU64>);

impl ScanProgress {
    pub fn scanned_count(&self) -> u64 {
        self.0.load(Ordering::Relaxed)
    }

    pub(crate) fn counter(&self) -> &AtomicU64 {
        &self.0
    }
}

/// 建索引时的文件指纹；之后每层扩展前复核
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
struct FileStamp {
    len: u64,
    modified: Option<SystemTime>,
}

impl FileStamp {
    fn of(file: &File) -> std::io::Result<Self> {
        let md = file.metadata()?;
        Ok(Self {
            len: md.len(),
            modified: md.modified().ok(),
        })
    }
}

struct Built {
    index: Arc<RecordIndex>,
    stamp: FileStamp,
}

/// 数据集存储：一次顺序扫描建立 id → 位置索引，之后按偏移点查单条记录。
///
/// - 索引只保存 id 与 (offset, len)，不保存正文。
/// - 点查用 `pread`（`read_exact_at`）直接定位，代价只与单条记录大小相关，
///   且不共享文件游标，多 worker 并发读取无需加锁。
pub struct RecordStore {
    path: PathBuf,
    file: File,
    progress: ScanProgress,
    built: Mutex<Option<Built>>,
    scheduler: AdaptiveScheduler,
    pool: rayon::ThreadPool,
    batch_size: usize,
    chunk_bytes: usize,
    cancel: CancelToken,
}

impl RecordStore {
    /// 以默认配置打开
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        Self::open_with(path, &SearchConfig::default())
    }

    /// 校验路径（存在、普通文件、扩展名、可读），此时不读取内容
    pub fn open_with(path: impl AsRef<Path>, config: &SearchConfig) -> Result<Self> {
        let path = path.as_ref();
        let md = std::fs::metadata(path)
            .map_err(|e| SearchError::invalid(path, format!("cannot stat: {}", e)))?;
        if !md.is_file() {
            return Err(SearchError::invalid(path, "not a regular file"));
        }
        if !config.accepts_extension(path) {
            return Err(SearchError::invalid(
                path,
                format!("unsupported extension (expected one of {:?})", config.extensions),
            ));
        }
        let file = File::open(path)
            .map_err(|e| SearchError::invalid(path, format!("not readable: {}", e)))?;

        let mut scheduler = if config.threads > 0 {
            AdaptiveScheduler::fixed(config.threads)
        } else {
            AdaptiveScheduler::new()
        };
        if config.threads == 0 {
            scheduler.adjust_parallelism();
        }
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(scheduler.parallelism())
            .thread_name(|i| format!("cite-tier-{}", i))
            .build()?;

        Ok(Self {
            path: path.to_path_buf(),
            file,
            progress: ScanProgress::default(),
            built: Mutex::new(None),
            scheduler,
            pool,
            batch_size: config.batch_size,
            chunk_bytes: config.chunk_bytes,
            cancel: CancelToken::new(),
        })
    }

    /// 挂接外部取消信号（Ctrl-C 等）
    pub fn with_cancel(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn cancel_token(&self) -> &CancelToken {
        &self.cancel
    }

    pub fn progress(&self) -> ScanProgress {
        self.progress.clone()
    }

    /// 已扫描记录数；单调不减，可与建索引并发读取
    pub fn scanned_count(&self) -> u64 {
        self.progress.scanned_count()
    }

    pub(crate) fn pool(&self) -> &rayon::ThreadPool {
        &self.pool
    }

    /// 选择策略；配置显式给了批大小时强制并行
    pub(crate) fn strategy(&self, task: Task, explicit_batch: usize) -> ExecutionStrategy {
        if explicit_batch > 0 {
            ExecutionStrategy::Parallel {
                batch: explicit_batch,
            }
        } else {
            self.scheduler.select_strategy(&task)
        }
    }

    pub(crate) fn batch_size(&self) -> usize {
        self.batch_size
    }

    /// 已构建的索引（若有）
    pub fn index(&self) -> Option<Arc<RecordIndex>> {
        self.built.lock().as_ref().map(|b| b.index.clone())
    }

    /// 一次完整扫描建立索引与初始 frontier。
    ///
    /// 幂等：已构建时直接返回现有索引，不重扫文件。任一行解析失败则整次构建作废。
    pub fn build_index(&self, keyword: &str) -> Result<Arc<RecordIndex>> {
        let mut guard = self.built.lock();
        if let Some(built) = guard.as_ref() {
            if built.index.keyword() != keyword {
                tracing::warn!(
                    "Index already built for keyword {:?}; ignoring new keyword {:?}",
                    built.index.keyword(),
                    keyword
                );
            }
            return Ok(built.index.clone());
        }

        let started = Instant::now();
        tracing::info!("Reading dataset {:?}", self.path);

        let stamp = FileStamp::of(&self.file)
            .map_err(|e| SearchError::invalid(&self.path, e.to_string()))?;
        let raw = if stamp.len == 0 {
            Vec::new()
        } else {
            // SAFETY: 搜索期间数据集只读（不支持增量更新）；被外部改动会在扩展前由指纹检出
            let map = unsafe { memmap2::Mmap::map(&self.file) }
                .map_err(|e| SearchError::invalid(&self.path, format!("cannot map: {}", e)))?;
            self.scan_mapped(&map, keyword)?
        };

        let index = Arc::new(RecordIndex::from_raw(raw, keyword)?);
        if index.duplicates() > 0 {
            tracing::warn!(
                "Skipped {} lines with duplicate ids (first occurrence kept)",
                index.duplicates()
            );
        }
        tracing::info!(
            "Done reading {} lines in {:.2?}: {} records, {} match {:?}",
            self.scanned_count(),
            started.elapsed(),
            index.len(),
            index.seed().len(),
            keyword
        );

        *guard = Some(Built {
            index: index.clone(),
            stamp,
        });
        Ok(index)
    }

    fn scan_mapped(&self, data: &[u8], keyword: &str) -> Result<Vec<RawEntry>> {
        let matcher = create_matcher(keyword);
        let ctx = ScanCtx::new(data, matcher.as_ref(), self.progress.counter(), &self.cancel);

        let task = Task::IndexBuild {
            bytes: data.len() as u64,
        };
        let results = match self.strategy(task, self.chunk_bytes) {
            ExecutionStrategy::Serial => vec![scan_chunk(&ctx, 0..data.len())],
            ExecutionStrategy::Parallel { batch } => {
                let chunks = split_chunks(data, batch);
                tracing::debug!("Index build: {} chunks of ~{} bytes", chunks.len(), batch);
                self.pool.install(|| {
                    chunks
                        .into_par_iter()
                        .map(|range| scan_chunk(&ctx, range))
                        .collect::<Vec<_>>()
                })
            }
        };
        merge_chunks(results)
    }

    /// 建索引之后文件是否被改动（长度或 mtime 变化）
    pub fn verify_unchanged(&self) -> Result<()> {
        let guard = self.built.lock();
        let Some(built) = guard.as_ref() else {
            return Ok(());
        };
        let now =
            FileStamp::of(&self.file).map_err(|source| SearchError::Io { offset: 0, source })?;
        if now != built.stamp {
            return Err(SearchError::DatasetChanged(self.path.clone()));
        }
        Ok(())
    }

    /// 读取 `loc` 处的一行到 `buf`（只读该记录的字节）
    fn read_line<'b>(&self, loc: Location, buf: &'b mut Vec<u8>) -> Result<&'b [u8]> {
        buf.clear();
        buf.resize(loc.len() as usize, 0);
        self.file
            .read_exact_at(buf, loc.offset())
            .map_err(|source| SearchError::Io {
                offset: loc.offset(),
                source,
            })?;
        Ok(buf.as_slice())
    }

    /// 点查并借用解码引用列表；`buf` 由调用方复用以避免每条记录分配
    pub(crate) fn with_references<R>(
        &self,
        loc: Location,
        buf: &mut Vec<u8>,
        f: impl FnOnce(&[RefId<'_>]) -> R,
    ) -> Result<R> {
        let line = self.read_line(loc, buf)?;
        let refs = RecordRefs::parse(line).map_err(|e| SearchError::Io {
            offset: loc.offset(),
            source: std::io::Error::new(std::io::ErrorKind::InvalidData, e),
        })?;
        Ok(f(&refs.references))
    }

    /// 返回 `loc` 处那条记录的引用列表
    pub fn fetch_references(&self, loc: Location) -> Result<Vec<String>> {
        let mut buf = Vec::new();
        self.with_references(loc, &mut buf, |refs| {
            refs.iter().map(|r| r.0.to_string()).collect()
        })
    }
}
