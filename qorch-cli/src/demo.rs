//! Offline collaborator implementations the CLI wires in when no external
//! provider credentials are configured. Document parsing and embedding-model
//! selection are explicit Non-goals of the orchestration core (the crates
//! only need to satisfy the stated interfaces), so this module's job is
//! narrow: make `qorch ask`/`qorch research` runnable out of the box against
//! a tiny seeded corpus, in the same spirit as
//! `qorch_orchestrator::file_extraction::PlaceholderFileExtractor`.

use std::process::Stdio;
use std::sync::Arc;

use async_trait::async_trait;
use qorch_core::{Error, Result};
use qorch_providers::embedder::{Embedder, InputType};
use qorch_providers::llm::{GenerationOptions, GenerationResult, LlmProvider};
use qorch_storage::vector::{CollectionConfig, Distance, InMemoryVectorStore, Point};
use serde_json::{json, Value};
use tokio::process::Command;

/// Deterministic hash-derived text embedder. Not semantically meaningful,
/// but stable across calls and distinguishes distinct inputs well enough to
/// drive the hybrid retriever's dense half without a network round trip.
pub struct LocalEmbedder {
    dims: usize,
}

impl LocalEmbedder {
    #[must_use]
    pub fn new(dims: usize) -> Self {
        Self { dims }
    }

    fn embed_one(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0.0f32; self.dims];
        for (i, byte) in text.bytes().enumerate() {
            vector[i % self.dims] += f32::from(byte) / 255.0;
        }
        let norm: f32 = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > 0.0 {
            for x in &mut vector {
                *x /= norm;
            }
        }
        vector
    }
}

#[async_trait]
impl Embedder for LocalEmbedder {
    fn name(&self) -> &str {
        "local-embedder"
    }

    async fn embed(&self, texts: &[String], _model: &str, _input_type: InputType) -> Result<Vec<Vec<f32>>> {
        Ok(texts.iter().map(|t| self.embed_one(t)).collect())
    }
}

/// Vector dimensionality used by [`LocalEmbedder`] and the seeded corpus.
pub const LOCAL_EMBEDDING_DIMS: usize = 32;

/// A placeholder `LlmProvider` for running without any configured vendor
/// credentials: it echoes back a short synthesized line rather than
/// fabricating an answer, so it is obvious in output that no real model
/// backed the response.
pub struct EchoLlmProvider;

#[async_trait]
impl LlmProvider for EchoLlmProvider {
    fn name(&self) -> &str {
        "echo"
    }

    async fn generate(&self, prompt: &str, _options: &GenerationOptions) -> Result<GenerationResult> {
        let preview: String = prompt.chars().take(160).collect();
        Ok(GenerationResult {
            text: format!(
                "[no LLM provider configured; set ANTHROPIC_API_KEY or OPENAI_API_KEY] echo: {preview}"
            ),
            usage: None,
        })
    }
}

/// Seeds `store` with a tiny built-in corpus so `qorch ask`/`qorch research`
/// have something to retrieve without requiring a document-ingestion
/// pipeline (parsing algorithms are out of scope for this crate).
pub async fn seed_demo_corpus(store: &InMemoryVectorStore, embedder: &LocalEmbedder, collection: &str) -> Result<()> {
    store.create_collection(
        collection,
        CollectionConfig {
            vector_size: LOCAL_EMBEDDING_DIMS,
            distance: Distance::Cosine,
        },
    )?;

    let documents = [
        (
            "rag-overview",
            "rag.pdf",
            "Retrieval-Augmented Generation (RAG) combines a retriever over an external \
             knowledge base with a generator, so the model answers from retrieved passages \
             instead of relying solely on parametric memory.",
        ),
        (
            "clip-overview",
            "clip.pdf",
            "CLIP trains a vision encoder and a text encoder jointly with a contrastive \
             loss over image-caption pairs, so matching image/text embeddings end up close \
             together in a shared space.",
        ),
        (
            "bert-overview",
            "bert.pdf",
            "BERT is pretrained with masked language modeling and next sentence prediction, \
             producing bidirectional contextual token representations that transfer well to \
             downstream tasks via fine-tuning.",
        ),
    ];

    let texts: Vec<String> = documents.iter().map(|(_, _, text)| (*text).to_string()).collect();
    let vectors = embedder.embed(&texts, "local", InputType::SearchDocument).await?;

    let points = documents
        .iter()
        .zip(vectors)
        .map(|((id, file_name, text), vector)| Point {
            id: (*id).to_string(),
            vector,
            payload: json!({"text": text, "file_name": file_name, "chunk_index": 0, "content_type": "text/plain"}),
        })
        .collect();

    store.upsert(collection, points)
}

/// Executes `execute_bash`/`execute_python` tasks by shelling out locally.
/// This is a real, unsandboxed local executor suited to single-user CLI use
/// — sandbox container construction is an explicit Non-goal of the
/// orchestration core; a deployment that needs isolation swaps this service
/// for one that calls out to a real sandboxed worker behind the same
/// `qorch_gateway::Service` surface.
pub struct LocalSandboxService;

const OUTPUT_CAP_BYTES: usize = 16 * 1024;

fn truncate_output(bytes: Vec<u8>) -> String {
    let text = String::from_utf8_lossy(&bytes).into_owned();
    if text.len() <= OUTPUT_CAP_BYTES {
        return text;
    }
    let mut boundary = OUTPUT_CAP_BYTES;
    while boundary > 0 && !text.is_char_boundary(boundary) {
        boundary -= 1;
    }
    format!("{}... [truncated]", &text[..boundary])
}

#[async_trait]
impl qorch_gateway::Service for LocalSandboxService {
    fn service_id(&self) -> &str {
        "sandbox"
    }

    fn capabilities(&self) -> &[String] {
        &[]
    }

    async fn initialize(&self) -> Result<()> {
        Ok(())
    }

    async fn execute(&self, method: &str, params: Value) -> Result<Value> {
        let (program, args): (&str, Vec<String>) = match method {
            "execute_bash" => {
                let command = params
                    .get("command")
                    .and_then(|v| v.as_str())
                    .ok_or_else(|| Error::business("execute_bash requires a 'command' parameter"))?;
                ("sh", vec!["-c".to_string(), command.to_string()])
            }
            "execute_python" => {
                let code = params
                    .get("code")
                    .and_then(|v| v.as_str())
                    .ok_or_else(|| Error::business("execute_python requires a 'code' parameter"))?;
                ("python3", vec!["-c".to_string(), code.to_string()])
            }
            other => {
                return Err(Error::business(format!("sandbox has no method '{other}'")));
            }
        };

        let output = Command::new(program)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .await
            .map_err(|e| Error::TransientTransport {
                origin: "sandbox".to_string(),
                message: e.to_string(),
            })?;

        Ok(json!({
            "stdout": truncate_output(output.stdout),
            "stderr": truncate_output(output.stderr),
            "exit_code": output.status.code().unwrap_or(-1),
        }))
    }

    async fn health_check(&self) -> bool {
        true
    }

    async fn shutdown(&self) -> Result<()> {
        Ok(())
    }
}

/// Serves `rag_search_multiple`/`rag_ask` by running the hybrid retriever
/// in-process. Returns a `qorch_core::model::Retrieval`-shaped payload,
/// which is the shape the Orchestrator's synthesis step scans every task
/// result for.
pub struct KnowledgeService {
    retriever: Arc<qorch_retriever::HybridRetriever>,
}

impl KnowledgeService {
    #[must_use]
    pub fn new(retriever: Arc<qorch_retriever::HybridRetriever>) -> Self {
        Self { retriever }
    }

    fn filter_from_params(params: &Value) -> Option<qorch_storage::vector::Filter> {
        let file_names = params.get("filters")?.get("file_name")?.as_array()?;
        let mut filter = qorch_storage::vector::Filter::new();
        filter.must.insert(
            "file_name".to_string(),
            file_names.iter().filter_map(|v| v.as_str().map(|s| json!(s))).collect(),
        );
        Some(filter)
    }
}

#[async_trait]
impl qorch_gateway::Service for KnowledgeService {
    fn service_id(&self) -> &str {
        "knowledge"
    }

    fn capabilities(&self) -> &[String] {
        &[]
    }

    async fn initialize(&self) -> Result<()> {
        Ok(())
    }

    async fn execute(&self, method: &str, params: Value) -> Result<Value> {
        let filter = Self::filter_from_params(&params);
        let top_k = params.get("top_k").and_then(Value::as_u64).unwrap_or(8) as usize;

        let (query, chunks) = match method {
            "rag_search_multiple" => {
                let queries: Vec<String> = params
                    .get("queries")
                    .and_then(Value::as_array)
                    .map(|arr| arr.iter().filter_map(|v| v.as_str().map(str::to_string)).collect())
                    .unwrap_or_default();
                let query = queries.first().cloned().unwrap_or_default();
                let result = self
                    .retriever
                    .search_multiple(&queries, top_k, filter.as_ref(), false)
                    .await;
                (query, result.chunks)
            }
            "rag_ask" => {
                let question = params
                    .get("question")
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_string();
                let chunks = self.retriever.search(&question, top_k, filter.as_ref(), false).await;
                (question, chunks)
            }
            other => {
                return Err(Error::business(format!("knowledge has no method '{other}'")));
            }
        };

        let sources: Vec<qorch_core::model::SourceRef> = chunks.iter().map(qorch_core::model::Chunk::source_ref).collect();
        let retrieval = qorch_core::model::Retrieval {
            query,
            results: chunks,
            sources,
        };
        serde_json::to_value(retrieval).map_err(|e| Error::business(format!("failed to serialize retrieval: {e}")))
    }

    async fn health_check(&self) -> bool {
        true
    }

    async fn shutdown(&self) -> Result<()> {
        Ok(())
    }
}
