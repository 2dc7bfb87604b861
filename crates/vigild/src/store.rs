//! Flat-directory persistence for bugs, investigations and reports.
//!
//! There is no index: listings read the directory and sort file names in
//! reverse so the newest timestamped file comes first.

use anyhow::{Context, Result};
use chrono::{DateTime, Local};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tokio::fs::{create_dir_all, OpenOptions};
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, warn};
use vigil_common::{BugRecord, BugSignature, InvestigationRecord};

/// Bare file names only; anything that could escape the directory is rejected
fn is_plain_name(name: &str) -> bool {
    !name.is_empty()
        && !name.contains('/')
        && !name.contains('\\')
        && name != "."
        && name != ".."
}

/// Write `contents` to a file that must not exist yet.
/// Returns `Ok(false)` when the name is taken.
async fn write_new(path: &Path, contents: &[u8]) -> Result<bool> {
    let file = OpenOptions::new()
        .create_new(true)
        .write(true)
        .open(path)
        .await;

    let mut file = match file {
        Ok(file) => file,
        Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => return Ok(false),
        Err(e) => {
            return Err(e).with_context(|| format!("Failed to create {}", path.display()));
        }
    };

    file.write_all(contents)
        .await
        .with_context(|| format!("Failed to write {}", path.display()))?;
    file.sync_all()
        .await
        .with_context(|| format!("Failed to sync {}", path.display()))?;
    Ok(true)
}

/// Overwrite (or create) a JSON file
async fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let json = serde_json::to_string_pretty(value).context("Failed to serialize record")?;
    tokio::fs::write(path, json)
        .await
        .with_context(|| format!("Failed to write {}", path.display()))
}

/// `*.json` names in `dir`, newest first. A missing directory is empty.
async fn list_json(dir: &Path) -> Result<Vec<String>> {
    let mut entries = match tokio::fs::read_dir(dir).await {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(e).with_context(|| format!("Failed to read {}", dir.display())),
    };

    let mut names = Vec::new();
    while let Some(entry) = entries.next_entry().await.context("Failed to read directory entry")? {
        let name = entry.file_name().to_string_lossy().into_owned();
        if name.ends_with(".json") {
            names.push(name);
        }
    }
    names.sort_unstable_by(|a, b| b.cmp(a));
    Ok(names)
}

async fn remove(dir: &Path, filename: &str) -> Result<bool> {
    if !is_plain_name(filename) {
        anyhow::bail!("Invalid file name: {}", filename);
    }
    let path = dir.join(filename);
    match tokio::fs::remove_file(&path).await {
        Ok(()) => {
            info!("Deleted {}", path.display());
            Ok(true)
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(e).with_context(|| format!("Failed to delete {}", path.display())),
    }
}

// ============================================================================
// Bugs
// ============================================================================

/// One listed file: the parsed record, or why it could not be read
#[derive(Debug, Clone, Serialize)]
pub struct ListedBug {
    pub filename: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bug: Option<BugRecord>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Bug files plus the single last-seen signature used for deduplication
pub struct BugStore {
    dir: PathBuf,
    last_signature: Mutex<Option<BugSignature>>,
}

impl BugStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            last_signature: Mutex::new(None),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn last_signature(&self) -> Option<BugSignature> {
        self.last_signature.lock().ok().and_then(|slot| slot.clone())
    }

    /// Check-and-claim in one critical section. Returns the previous value
    /// on success so a failed write can hand the slot back.
    fn claim(&self, signature: &BugSignature) -> Option<Option<BugSignature>> {
        let mut slot = match self.last_signature.lock() {
            Ok(slot) => slot,
            Err(poisoned) => poisoned.into_inner(),
        };
        if slot.as_ref() == Some(signature) {
            return None;
        }
        Some(slot.replace(signature.clone()))
    }

    fn release(&self, signature: &BugSignature, previous: Option<BugSignature>) {
        let mut slot = match self.last_signature.lock() {
            Ok(slot) => slot,
            Err(poisoned) => poisoned.into_inner(),
        };
        if slot.as_ref() == Some(signature) {
            *slot = previous;
        }
    }

    /// Persist `bug` unless its signature matches the last one seen.
    /// Returns the new file path, or `None` for an immediate repeat.
    pub async fn save_if_new(&self, bug: &BugRecord) -> Result<Option<PathBuf>> {
        let signature = bug.signature();
        let Some(previous) = self.claim(&signature) else {
            debug!("Skipping repeat of bug signature {}", signature);
            return Ok(None);
        };

        match self.write_bug(bug).await {
            Ok(path) => {
                info!("New bug saved to {}", path.display());
                Ok(Some(path))
            }
            Err(e) => {
                self.release(&signature, previous);
                Err(e)
            }
        }
    }

    async fn write_bug(&self, bug: &BugRecord) -> Result<PathBuf> {
        create_dir_all(&self.dir)
            .await
            .context("Failed to create bugs directory")?;

        let json = serde_json::to_string_pretty(bug).context("Failed to serialize bug")?;
        let stamp = Local::now().format("%Y%m%d_%H%M%S_%6f").to_string();

        let mut attempt = 1;
        loop {
            let name = if attempt == 1 {
                format!("bug_{}.json", stamp)
            } else {
                format!("bug_{}_{}.json", stamp, attempt)
            };
            let path = self.dir.join(name);
            if write_new(&path, json.as_bytes()).await? {
                return Ok(path);
            }
            attempt += 1;
        }
    }

    pub async fn list(&self) -> Result<Vec<ListedBug>> {
        let mut listed = Vec::new();
        for filename in list_json(&self.dir).await? {
            let entry = match self.read(&filename).await {
                Ok(bug) => ListedBug {
                    filename,
                    bug: Some(bug),
                    error: None,
                },
                Err(e) => ListedBug {
                    filename,
                    bug: None,
                    error: Some(e.to_string()),
                },
            };
            listed.push(entry);
        }
        Ok(listed)
    }

    pub async fn read(&self, filename: &str) -> Result<BugRecord> {
        if !is_plain_name(filename) {
            anyhow::bail!("Invalid file name: {}", filename);
        }
        let path = self.dir.join(filename);
        let content = tokio::fs::read_to_string(&path)
            .await
            .with_context(|| format!("Failed to read {}", path.display()))?;
        serde_json::from_str(&content).with_context(|| format!("Failed to parse {}", path.display()))
    }

    /// `Ok(false)` when no such file exists
    pub async fn delete(&self, filename: &str) -> Result<bool> {
        remove(&self.dir, filename).await
    }

    /// Record which investigation covered this bug. `Ok(false)` when the
    /// file is gone.
    pub async fn attach_investigation(&self, filename: &str, investigation_id: &str) -> Result<bool> {
        if !is_plain_name(filename) {
            anyhow::bail!("Invalid file name: {}", filename);
        }
        if !self.dir.join(filename).exists() {
            return Ok(false);
        }
        let mut bug = self.read(filename).await?;
        bug.investigation_id = Some(investigation_id.to_string());
        write_json(&self.dir.join(filename), &bug).await?;
        Ok(true)
    }
}

// ============================================================================
// Investigations
// ============================================================================

#[derive(Debug, Clone, Serialize)]
pub struct ListedInvestigation {
    pub filename: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub investigation: Option<InvestigationRecord>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

pub struct InvestigationStore {
    dir: PathBuf,
}

impl InvestigationStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Persist as `<investigation_id>.json`. If that id is already on disk
    /// the record is renamed with a numeric suffix first.
    pub async fn save(&self, record: &mut InvestigationRecord) -> Result<PathBuf> {
        create_dir_all(&self.dir)
            .await
            .context("Failed to create investigations directory")?;

        let base_id = record.investigation_id.clone();
        let mut attempt = 1;
        loop {
            if attempt > 1 {
                record.investigation_id = format!("{}_{}", base_id, attempt);
            }
            let path = self.dir.join(format!("{}.json", record.investigation_id));
            let json = serde_json::to_string_pretty(record).context("Failed to serialize investigation")?;
            if write_new(&path, json.as_bytes()).await? {
                info!("Investigation {} saved", record.investigation_id);
                return Ok(path);
            }
            warn!("Investigation id {} already taken", record.investigation_id);
            attempt += 1;
        }
    }

    /// `Ok(None)` when no such investigation exists
    pub async fn get(&self, investigation_id: &str) -> Result<Option<InvestigationRecord>> {
        if !is_plain_name(investigation_id) {
            anyhow::bail!("Invalid investigation id: {}", investigation_id);
        }
        let path = self.dir.join(format!("{}.json", investigation_id));
        let content = match tokio::fs::read_to_string(&path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e).with_context(|| format!("Failed to read {}", path.display())),
        };
        let record = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse {}", path.display()))?;
        Ok(Some(record))
    }

    pub async fn list(&self) -> Result<Vec<ListedInvestigation>> {
        let mut listed = Vec::new();
        for filename in list_json(&self.dir).await? {
            let id = filename.trim_end_matches(".json");
            let entry = match self.get(id).await {
                Ok(Some(investigation)) => ListedInvestigation {
                    filename,
                    investigation: Some(investigation),
                    error: None,
                },
                Ok(None) => continue,
                Err(e) => ListedInvestigation {
                    filename,
                    investigation: None,
                    error: Some(e.to_string()),
                },
            };
            listed.push(entry);
        }
        Ok(listed)
    }

    pub async fn delete(&self, investigation_id: &str) -> Result<bool> {
        remove(&self.dir, &format!("{}.json", investigation_id)).await
    }
}

// ============================================================================
// Reports
// ============================================================================

pub struct ReportStore {
    dir: PathBuf,
}

impl ReportStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn file_name(timestamp: &DateTime<Local>) -> String {
        format!(
            "report_{}_{}.md",
            timestamp.format("%Y-%m-%d"),
            timestamp.format("%H-%M-%S")
        )
    }

    pub async fn save(&self, markdown: &str, timestamp: &DateTime<Local>) -> Result<PathBuf> {
        create_dir_all(&self.dir)
            .await
            .context("Failed to create reports directory")?;
        let path = self.dir.join(Self::file_name(timestamp));
        tokio::fs::write(&path, markdown)
            .await
            .with_context(|| format!("Failed to save report to {}", path.display()))?;
        info!("Report saved to {}", path.display());
        Ok(path)
    }
}
