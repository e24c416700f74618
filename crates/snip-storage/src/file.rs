use crate::memory::MemoryStore;
use async_trait::async_trait;
use snip_core::{
    LinkPair, LinkRef, ReadStore, Result, ShortCode, ShortLink, Store, StoreError, StoreStats,
    UserId,
};
use std::path::{Path, PathBuf};
use tokio::fs::{self, File, OpenOptions};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

/// File-backed implementation of the store contract.
///
/// A [`MemoryStore`] holds the working set. Every insert is appended to a
/// newline-delimited JSON log, one [`ShortLink`] per line, and the log is
/// replayed in full when the store is opened. Deletes rewrite the whole log
/// from the in-memory state.
///
/// Mutating operations hold the log lock from the in-memory change until
/// the file is written, so the file and the memory see the same order of
/// changes. Reads only touch the memory.
#[derive(Debug)]
pub struct FileStore {
    memory: MemoryStore,
    path: PathBuf,
    log: Mutex<File>,
}

impl FileStore {
    /// Opens the log at `path`, creating it and its parent directories if
    /// needed, and replays its content.
    pub async fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).await.map_err(|e| {
                StoreError::Io(format!(
                    "failed to create storage directory {}: {e}",
                    parent.display()
                ))
            })?;
        }

        let memory = MemoryStore::new();
        let replayed = replay(&path, &memory).await?;
        let log = open_append(&path).await?;

        info!(path = %path.display(), records = replayed, "file storage opened");

        Ok(Self {
            memory,
            path,
            log: Mutex::new(log),
        })
    }

    /// Returns the path of the log file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Returns a snapshot of every record, soft-deleted ones included.
    pub fn get_all(&self) -> Vec<ShortLink> {
        self.memory.get_all()
    }

    /// Rewrites the log from the in-memory state and swaps the append handle.
    async fn rewrite(&self, log: &mut File) -> Result<()> {
        let snapshot = self.memory.get_all();
        let buf = encode(&snapshot)?;

        let tmp = tmp_path(&self.path);
        fs::write(&tmp, &buf).await.map_err(|e| {
            StoreError::Io(format!("failed to write {}: {e}", tmp.display()))
        })?;
        fs::rename(&tmp, &self.path).await.map_err(|e| {
            StoreError::Io(format!(
                "failed to replace {}: {e}",
                self.path.display()
            ))
        })?;

        *log = open_append(&self.path).await?;
        debug!(path = %self.path.display(), records = snapshot.len(), "rewrote storage file");
        Ok(())
    }

    /// Rewrites the log after a failed append so that no partial record is
    /// left at its end. Memory must already be rolled back.
    async fn repair(&self, log: &mut File) {
        if let Err(e) = self.rewrite(log).await {
            error!(path = %self.path.display(), error = %e, "failed to repair storage file");
        }
    }
}

fn tmp_path(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(".tmp");
    PathBuf::from(name)
}

async fn open_append(path: &Path) -> Result<File> {
    OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .await
        .map_err(|e| StoreError::Io(format!("failed to open {}: {e}", path.display())))
}

async fn replay(path: &Path, memory: &MemoryStore) -> Result<usize> {
    let file = match File::open(path).await {
        Ok(file) => file,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(0),
        Err(e) => {
            return Err(StoreError::Io(format!(
                "failed to open {}: {e}",
                path.display()
            )))
        }
    };

    let mut lines = BufReader::new(file).lines();
    let mut line_no = 0usize;
    let mut count = 0usize;

    while let Some(line) = lines.next_line().await? {
        line_no += 1;
        if line.trim().is_empty() {
            continue;
        }

        let link: ShortLink = serde_json::from_str(&line).map_err(|e| {
            StoreError::InvalidData(format!(
                "{} line {line_no}: malformed record: {e}",
                path.display()
            ))
        })?;
        memory.restore(link).map_err(|e| {
            StoreError::InvalidData(format!("{} line {line_no}: {e}", path.display()))
        })?;
        count += 1;
    }

    Ok(count)
}

fn encode(links: &[ShortLink]) -> Result<Vec<u8>> {
    let mut buf = Vec::new();
    for link in links {
        serde_json::to_writer(&mut buf, link)
            .map_err(|e| StoreError::Operation(format!("failed to serialize record: {e}")))?;
        buf.push(b'\n');
    }
    Ok(buf)
}

async fn append(log: &mut File, links: &[ShortLink]) -> Result<()> {
    let buf = encode(links)?;
    log.write_all(&buf).await?;
    log.flush().await?;
    Ok(())
}

#[async_trait]
impl ReadStore for FileStore {
    async fn get(&self, code: &ShortCode) -> Result<String> {
        self.memory.get(code).await
    }

    async fn get_all_urls(&self, user_id: &UserId) -> Result<Vec<LinkPair>> {
        self.memory.get_all_urls(user_id).await
    }

    async fn ping(&self) -> Result<()> {
        fs::metadata(&self.path).await.map_err(|e| {
            StoreError::Unavailable(format!("{}: {e}", self.path.display()))
        })?;
        Ok(())
    }

    async fn stats(&self) -> Result<StoreStats> {
        self.memory.stats().await
    }
}

#[async_trait]
impl Store for FileStore {
    async fn set(
        &self,
        user_id: &UserId,
        code: &ShortCode,
        original_url: &str,
    ) -> Result<ShortCode> {
        let mut log = self.log.lock().await;
        let link = self.memory.insert(user_id, code, original_url)?;

        if let Err(err) = append(&mut log, std::slice::from_ref(&link)).await {
            warn!(user_id = %user_id, code = %code, error = %err, "append failed, rolling back insert");
            self.memory.remove(user_id, code);
            self.repair(&mut log).await;
            return Err(err);
        }

        Ok(link.short_url)
    }

    async fn set_batch(&self, user_id: &UserId, batch: Vec<LinkPair>) -> Result<Vec<LinkPair>> {
        if batch.is_empty() {
            return Ok(batch);
        }

        let mut log = self.log.lock().await;
        let inserted = self.memory.insert_batch(user_id, &batch)?;

        if let Err(err) = append(&mut log, &inserted).await {
            warn!(user_id = %user_id, count = inserted.len(), error = %err, "append failed, rolling back batch");
            for link in &inserted {
                self.memory.remove(&link.user_id, &link.short_url);
            }
            self.repair(&mut log).await;
            return Err(err);
        }

        Ok(batch)
    }

    async fn delete_short_urls(&self, links: Vec<LinkRef>) -> Result<()> {
        let mut log = self.log.lock().await;
        if self.memory.soft_delete(&links) == 0 {
            return Ok(());
        }
        self.rewrite(&mut log).await
    }

    async fn hard_delete_urls(&self) -> Result<u64> {
        let mut log = self.log.lock().await;
        let removed = self.memory.purge_deleted();
        if removed > 0 {
            self.rewrite(&mut log).await?;
        }
        Ok(removed)
    }
}
