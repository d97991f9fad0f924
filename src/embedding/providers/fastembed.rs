//! FastEmbed local embedding provider (ONNX inference, no network calls).
//!
//! Actor pattern: the model is owned by a dedicated task and requests flow
//! through a channel, so the non-`Sync` model handle never needs a lock.

use async_trait::async_trait;
use fastembed::{EmbeddingModel, InitOptions, TextEmbedding};
use tokio::sync::{mpsc, oneshot};

use crate::domain::error::{Error, Result};
use crate::domain::ports::EmbeddingProvider;
use crate::domain::types::Embedding;

enum FastEmbedMessage {
    EmbedBatch {
        texts: Vec<String>,
        tx: oneshot::Sender<Result<Vec<Embedding>>>,
    },
}

pub struct FastEmbedProvider {
    sender: mpsc::Sender<FastEmbedMessage>,
    model_name: String,
    dimensions: usize,
}

impl FastEmbedProvider {
    /// Initialise the named model; falls back to BGESmallENV15 for unknown
    /// identifiers.
    pub fn new(model_name: &str) -> Result<Self> {
        let (model, dimensions) = match model_name {
            name if name.contains("bge-small") => (EmbeddingModel::BGESmallENV15, 384),
            name if name.contains("bge-base") => (EmbeddingModel::BGEBaseENV15, 768),
            name if name.contains("MiniLM") || name.contains("minilm") => {
                (EmbeddingModel::AllMiniLML6V2, 384)
            }
            _ => (EmbeddingModel::BGESmallENV15, 384),
        };
        let options = InitOptions::new(model).with_show_download_progress(false);
        let text_embedding = TextEmbedding::try_new(options)
            .map_err(|e| Error::embedding(format!("failed to initialise fastembed: {e}")))?;

        let (tx, rx) = mpsc::channel(64);
        let model_name = model_name.to_string();
        let mut actor = FastEmbedActor {
            receiver: rx,
            model: text_embedding,
            model_name: model_name.clone(),
        };
        tokio::spawn(async move {
            actor.run().await;
        });

        Ok(Self {
            sender: tx,
            model_name,
            dimensions,
        })
    }

    pub fn model(&self) -> &str {
        &self.model_name
    }
}

#[async_trait]
impl EmbeddingProvider for FastEmbedProvider {
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Embedding>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        let (tx, rx) = oneshot::channel();
        self.sender
            .send(FastEmbedMessage::EmbedBatch {
                texts: texts.to_vec(),
                tx,
            })
            .await
            .map_err(|_| Error::embedding("fastembed actor is gone"))?;
        rx.await
            .map_err(|_| Error::embedding("fastembed actor dropped the request"))?
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }

    fn provider_name(&self) -> &str {
        "fastembed"
    }
}

struct FastEmbedActor {
    receiver: mpsc::Receiver<FastEmbedMessage>,
    model: TextEmbedding,
    model_name: String,
}

impl FastEmbedActor {
    async fn run(&mut self) {
        while let Some(msg) = self.receiver.recv().await {
            match msg {
                FastEmbedMessage::EmbedBatch { texts, tx } => {
                    let result = self
                        .model
                        .embed(texts, None)
                        .map_err(|e| Error::embedding(format!("fastembed inference failed: {e}")))
                        .map(|vectors| {
                            vectors
                                .into_iter()
                                .map(|vector| Embedding {
                                    dimensions: vector.len(),
                                    vector,
                                    model: self.model_name.clone(),
                                })
                                .collect::<Vec<_>>()
                        });
                    let _ = tx.send(result);
                }
            }
        }
    }
}
