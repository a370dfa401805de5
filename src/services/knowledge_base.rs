use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::error::{Error, Result};
use crate::services::completion_service::CompletionService;
use crate::services::embed_service::{EmbedService, Embedder};
use crate::services::reference_service::ReferenceLookup;

const CHUNK_CHARS: usize = 1024;
const EMBED_BATCH: usize = 32;
const QUERY_TOP_K: usize = 2;
const SUPPORTED_EXTENSIONS: [&str; 3] = ["txt", "md", "json"];

const ANSWER_FROM_CONTEXT_PROMPT: &str = "Ниже приведены фрагменты базы знаний с вопросами и ответами технических собеседований. \
Используй их как контекст и выполни запрос пользователя. \
Если запрос требует определенного формата ответа, строго соблюдай его и не добавляй лишний текст.";

/// Answers free-form queries from the indexed document corpus.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait RetrievalService: Send + Sync {
    async fn query(&self, text: &str) -> Result<String>;
}

#[derive(Debug, Clone, PartialEq)]
pub struct Chunk {
    pub source: String,
    pub text: String,
    embedding: Vec<f32>,
}

/// In-memory vector index over a directory of documents.
pub struct KnowledgeBase {
    chunks: Vec<Chunk>,
    embedder: Arc<dyn Embedder>,
    completion: Arc<dyn CompletionService>,
}

impl KnowledgeBase {
    /// Reads every supported file under `dir` and embeds its chunks.
    pub async fn load(
        dir: impl AsRef<Path>,
        embedder: Arc<dyn Embedder>,
        completion: Arc<dyn CompletionService>,
    ) -> Result<Self> {
        let dir = dir.as_ref();
        let files = collect_files(dir).await?;
        if files.is_empty() {
            return Err(Error::Config(format!(
                "Knowledge base directory {} contains no .txt, .md or .json files",
                dir.display()
            )));
        }

        let mut pending: Vec<(String, String)> = Vec::new();
        for file in &files {
            let content = tokio::fs::read_to_string(file).await?;
            let source = file
                .strip_prefix(dir)
                .unwrap_or(file)
                .display()
                .to_string();
            for text in chunk_text(&content, CHUNK_CHARS) {
                pending.push((source.clone(), text));
            }
        }

        let mut chunks = Vec::with_capacity(pending.len());
        for batch in pending.chunks(EMBED_BATCH) {
            let texts: Vec<String> = batch.iter().map(|(_, t)| t.clone()).collect();
            let vectors = embedder.embed_texts(&texts).await?;
            if vectors.len() != batch.len() {
                return Err(Error::malformed(format!(
                    "embedder returned {} vectors for {} chunks",
                    vectors.len(),
                    batch.len()
                )));
            }
            for ((source, text), embedding) in batch.iter().cloned().zip(vectors) {
                chunks.push(Chunk {
                    source,
                    text,
                    embedding,
                });
            }
        }

        tracing::info!(
            files = files.len(),
            chunks = chunks.len(),
            dir = %dir.display(),
            "Knowledge base indexed"
        );

        Ok(Self {
            chunks,
            embedder,
            completion,
        })
    }

    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    /// The `k` chunks closest to `text`, best first.
    pub async fn search(&self, text: &str, k: usize) -> Result<Vec<&Chunk>> {
        if k == 0 || self.chunks.is_empty() {
            return Ok(Vec::new());
        }
        let query = self
            .embedder
            .embed_texts(&[text.to_string()])
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| Error::malformed("embedder returned no vector for the query"))?;

        let mut scored: Vec<(f32, &Chunk)> = self
            .chunks
            .iter()
            .map(|c| (EmbedService::cosine_sim(&query, &c.embedding), c))
            .collect();
        scored.sort_by(|a, b| b.0.total_cmp(&a.0));
        Ok(scored.into_iter().take(k).map(|(_, c)| c).collect())
    }
}

#[async_trait]
impl RetrievalService for KnowledgeBase {
    async fn query(&self, text: &str) -> Result<String> {
        let hits = self.search(text, QUERY_TOP_K).await?;
        let context = hits
            .iter()
            .map(|c| c.text.as_str())
            .collect::<Vec<_>>()
            .join("\n\n");
        let system_prompt = format!("{}\n\n## Context\n{}", ANSWER_FROM_CONTEXT_PROMPT, context);
        self.completion.complete(&system_prompt, text).await
    }
}

#[async_trait]
impl ReferenceLookup for KnowledgeBase {
    async fn lookup(&self, query: &str, max_docs: usize) -> Result<Vec<String>> {
        let hits = self.search(query, max_docs).await?;
        Ok(hits.into_iter().map(|c| c.text.clone()).collect())
    }
}

async fn collect_files(root: &Path) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    let mut stack = vec![root.to_path_buf()];
    while let Some(dir) = stack.pop() {
        let mut entries = tokio::fs::read_dir(&dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if entry.file_type().await?.is_dir() {
                stack.push(path);
            } else if path
                .extension()
                .and_then(|e| e.to_str())
                .map(|e| SUPPORTED_EXTENSIONS.contains(&e.to_ascii_lowercase().as_str()))
                .unwrap_or(false)
            {
                files.push(path);
            }
        }
    }
    files.sort();
    Ok(files)
}

/// Splits `content` on blank lines, packing paragraphs into chunks of at most
/// `max_chars` characters. Oversized paragraphs are cut on char boundaries.
pub fn chunk_text(content: &str, max_chars: usize) -> Vec<String> {
    let max_chars = max_chars.max(1);
    let mut chunks = Vec::new();
    let mut current = String::new();
    let mut current_len = 0usize;

    for paragraph in content.split("\n\n").map(str::trim).filter(|p| !p.is_empty()) {
        let para_len = paragraph.chars().count();

        if current_len > 0 && current_len + 2 + para_len > max_chars {
            chunks.push(std::mem::take(&mut current));
            current_len = 0;
        }

        if para_len > max_chars {
            let chars: Vec<char> = paragraph.chars().collect();
            for piece in chars.chunks(max_chars) {
                chunks.push(piece.iter().collect());
            }
            continue;
        }

        if current_len > 0 {
            current.push_str("\n\n");
            current_len += 2;
        }
        current.push_str(paragraph);
        current_len += para_len;
    }

    if !current.is_empty() {
        chunks.push(current);
    }
    chunks
}
