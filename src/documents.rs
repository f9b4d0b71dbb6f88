use anyhow::anyhow;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::{
    collections::{HashMap, HashSet},
    hash::Hash,
    io::ErrorKind,
    sync::atomic::{AtomicU64, Ordering},
    sync::{Arc, RwLock},
    time::Instant,
};

#[derive(Debug, Clone, Eq, Serialize, Deserialize)]
pub struct Document {
    pub id: u64,

    pub title: String,
    pub content: String,
    pub doc_type: Option<String>,
    pub tags: Vec<String>,
    pub source: Option<String>,
    pub authors: Option<String>,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Hash for Document {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.id.hash(state)
    }
}

impl PartialEq for Document {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct DocumentCreate {
    pub title: String,
    pub content: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub doc_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tags: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub authors: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct DocumentUpdate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub doc_type: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tags: Option<Vec<String>>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub authors: Option<String>,
}

/// Authoritative record of documents. The vector index is derived from this;
/// both stores must agree on id membership at every quiescent point.
pub trait DocumentLedger: Send + Sync {
    fn create(&self, create: DocumentCreate) -> anyhow::Result<Document>;
    fn update(&self, id: u64, update: DocumentUpdate) -> anyhow::Result<Option<Document>>;
    fn delete(&self, id: u64) -> anyhow::Result<Option<Document>>;
    fn get(&self, id: u64) -> anyhow::Result<Option<Document>>;
    fn all(&self) -> anyhow::Result<Vec<Document>>;
    fn count(&self) -> anyhow::Result<usize>;

    /// 1-based rank of `id` under the (created_at, id) total order.
    fn ordinal_index(&self, id: u64) -> anyhow::Result<Option<usize>>;

    /// Inverse of `ordinal_index`; `None` when `n` is outside `[1, count]`.
    fn by_ordinal(&self, n: usize) -> anyhow::Result<Option<Document>>;

    /// Put a document back exactly as it was, keeping its original id.
    /// Compensation path for failed dual-store writes.
    fn restore(&self, document: Document) -> anyhow::Result<()>;

    fn clear(&self) -> anyhow::Result<usize>;
}

/// Ids sorted by (created_at, id). Creation-time ties are broken by id so
/// ordinals stay a total order.
pub(crate) fn ordinal_order(documents: &[Document]) -> Vec<u64> {
    let mut keyed: Vec<(DateTime<Utc>, u64)> =
        documents.iter().map(|d| (d.created_at, d.id)).collect();
    keyed.sort();
    keyed.into_iter().map(|(_, id)| id).collect()
}

/// Map of document id to its 1-based ordinal.
pub(crate) fn ordinal_positions(documents: &[Document]) -> HashMap<u64, usize> {
    ordinal_order(documents)
        .into_iter()
        .enumerate()
        .map(|(idx, id)| (id, idx + 1))
        .collect()
}

fn normalize_tags(tags: Vec<String>) -> Vec<String> {
    let mut seen = HashSet::new();
    tags.into_iter()
        .map(|tag| tag.trim().to_lowercase())
        .filter(|tag| !tag.is_empty())
        .filter(|tag| seen.insert(tag.clone()))
        .collect()
}

#[derive(Debug, Clone, Default)]
pub struct CsvLedger {
    list: Arc<RwLock<Vec<Document>>>,
    path: String,
    /// Next id to hand out. Ids are never reused, even after a delete.
    next_id: Arc<AtomicU64>,
}

const CSV_HEADERS: [&str; 9] = [
    "id",
    "title",
    "content",
    "doc_type",
    "tags",
    "source",
    "authors",
    "created_at",
    "updated_at",
];

fn opt_field(value: &str) -> Option<String> {
    if value.is_empty() {
        None
    } else {
        Some(value.to_string())
    }
}

fn parse_timestamp(value: &str, field: &str) -> anyhow::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|err| anyhow!("couldnt parse record {field}: {err}"))
}

impl CsvLedger {
    pub fn load(path: &str) -> anyhow::Result<Self> {
        if let Err(err) = std::fs::metadata(path) {
            match err.kind() {
                ErrorKind::NotFound => {
                    log::info!("Creating new document ledger at {path}");
                    let mut csv_wrt = csv::Writer::from_path(path)?;
                    csv_wrt.write_record(CSV_HEADERS)?;
                    csv_wrt.flush()?;
                }
                _ => Err(err)?,
            }
        }

        let now = Instant::now();
        let mut csv_reader = csv::Reader::from_path(path)?;
        let iter = csv_reader.records();

        let mut documents = vec![];
        for record in iter {
            let record = record?;
            let id = record
                .get(0)
                .ok_or(anyhow!("couldnt get record id"))?
                .parse::<u64>()?;
            let title = record
                .get(1)
                .ok_or(anyhow!("couldnt get record title"))?
                .to_string();
            let content = record
                .get(2)
                .ok_or(anyhow!("couldnt get record content"))?
                .to_string();
            let doc_type = opt_field(record.get(3).ok_or(anyhow!("couldnt get record doc_type"))?);
            let tags = crate::parse_tags(record.get(4).ok_or(anyhow!("couldnt get record tags"))?);
            let source = opt_field(record.get(5).ok_or(anyhow!("couldnt get record source"))?);
            let authors = opt_field(record.get(6).ok_or(anyhow!("couldnt get record authors"))?);
            let created_at = parse_timestamp(
                record
                    .get(7)
                    .ok_or(anyhow!("couldnt get record created_at"))?,
                "created_at",
            )?;
            let updated_at = parse_timestamp(
                record
                    .get(8)
                    .ok_or(anyhow!("couldnt get record updated_at"))?,
                "updated_at",
            )?;

            documents.push(Document {
                id,
                title,
                content,
                doc_type,
                tags,
                source,
                authors,
                created_at,
                updated_at,
            });
        }

        log::debug!(
            "took {}ms to read document csv",
            now.elapsed().as_micros() as f64 / 1000.0
        );

        let next_id = documents.iter().map(|d| d.id).max().map_or(1, |max| max + 1);

        Ok(CsvLedger {
            list: Arc::new(RwLock::new(documents)),
            path: path.to_string(),
            next_id: Arc::new(AtomicU64::new(next_id)),
        })
    }

    fn save(&self) -> anyhow::Result<()> {
        let documents = self.list.read().unwrap();

        let temp_path = format!("{}-tmp", &self.path);
        let mut csv_wrt = csv::Writer::from_path(&temp_path)?;
        csv_wrt.write_record(CSV_HEADERS)?;
        for document in documents.iter() {
            csv_wrt.write_record([
                &document.id.to_string(),
                &document.title,
                &document.content,
                &document.doc_type.clone().unwrap_or_default(),
                &document.tags.join(","),
                &document.source.clone().unwrap_or_default(),
                &document.authors.clone().unwrap_or_default(),
                &document.created_at.to_rfc3339(),
                &document.updated_at.to_rfc3339(),
            ])?;
        }
        csv_wrt.flush()?;
        std::fs::rename(&temp_path, &self.path)?;

        Ok(())
    }
}

impl DocumentLedger for CsvLedger {
    fn create(&self, create: DocumentCreate) -> anyhow::Result<Document> {
        let now = Utc::now();

        let document = {
            let mut documents = self.list.write().unwrap();

            let id = self.next_id.fetch_add(1, Ordering::SeqCst);
            let document = Document {
                id,
                title: create.title,
                content: create.content,
                doc_type: create.doc_type,
                tags: normalize_tags(create.tags.unwrap_or_default()),
                source: create.source,
                authors: create.authors,
                created_at: now,
                updated_at: now,
            };

            documents.push(document.clone());
            document
        };

        if let Err(err) = self.save() {
            self.list.write().unwrap().retain(|d| d.id != document.id);
            return Err(err);
        }

        Ok(document)
    }

    fn update(&self, id: u64, update: DocumentUpdate) -> anyhow::Result<Option<Document>> {
        let (previous, updated) = {
            let mut documents = self.list.write().unwrap();

            let Some(document) = documents.iter_mut().find(|d| d.id == id) else {
                return Ok(None);
            };
            let previous = document.clone();

            if let Some(title) = update.title {
                document.title = title;
            }
            if let Some(content) = update.content {
                document.content = content;
            }
            if let Some(doc_type) = update.doc_type {
                document.doc_type = Some(doc_type);
            }
            if let Some(tags) = update.tags {
                document.tags = normalize_tags(tags);
            }
            if let Some(source) = update.source {
                document.source = Some(source);
            }
            if let Some(authors) = update.authors {
                document.authors = Some(authors);
            }
            document.updated_at = Utc::now();

            (previous, document.clone())
        };

        if let Err(err) = self.save() {
            let mut documents = self.list.write().unwrap();
            if let Some(document) = documents.iter_mut().find(|d| d.id == id) {
                *document = previous;
            }
            return Err(err);
        }

        Ok(Some(updated))
    }

    fn delete(&self, id: u64) -> anyhow::Result<Option<Document>> {
        let removed = {
            let mut documents = self.list.write().unwrap();
            documents
                .iter()
                .position(|d| d.id == id)
                .map(|idx| (idx, documents.remove(idx)))
        };

        let Some((idx, document)) = removed else {
            return Ok(None);
        };

        if let Err(err) = self.save() {
            self.list.write().unwrap().insert(idx, document);
            return Err(err);
        }

        Ok(Some(document))
    }

    fn get(&self, id: u64) -> anyhow::Result<Option<Document>> {
        Ok(self
            .list
            .read()
            .unwrap()
            .iter()
            .find(|d| d.id == id)
            .cloned())
    }

    fn all(&self) -> anyhow::Result<Vec<Document>> {
        Ok(self.list.read().unwrap().clone())
    }

    fn count(&self) -> anyhow::Result<usize> {
        Ok(self.list.read().unwrap().len())
    }

    fn ordinal_index(&self, id: u64) -> anyhow::Result<Option<usize>> {
        let documents = self.list.read().unwrap();
        Ok(ordinal_order(&documents)
            .iter()
            .position(|&ordered| ordered == id)
            .map(|idx| idx + 1))
    }

    fn by_ordinal(&self, n: usize) -> anyhow::Result<Option<Document>> {
        if n == 0 {
            return Ok(None);
        }

        let documents = self.list.read().unwrap();
        let Some(&id) = ordinal_order(&documents).get(n - 1) else {
            return Ok(None);
        };

        Ok(documents.iter().find(|d| d.id == id).cloned())
    }

    fn restore(&self, document: Document) -> anyhow::Result<()> {
        self.next_id.fetch_max(document.id + 1, Ordering::SeqCst);

        {
            let mut documents = self.list.write().unwrap();

            if let Some(existing) = documents.iter_mut().find(|d| d.id == document.id) {
                *existing = document;
            } else {
                // keep the list id-ordered so ordinal ties stay deterministic
                let idx = documents
                    .iter()
                    .position(|d| d.id > document.id)
                    .unwrap_or(documents.len());
                documents.insert(idx, document);
            }
        }

        self.save()
    }

    fn clear(&self) -> anyhow::Result<usize> {
        let previous = {
            let mut documents = self.list.write().unwrap();
            std::mem::take(&mut *documents)
        };
        let count = previous.len();

        if let Err(err) = self.save() {
            *self.list.write().unwrap() = previous;
            return Err(err);
        }

        Ok(count)
    }
}
