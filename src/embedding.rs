// Local embedding model
//
// Runs a multilingual sentence-embedding model through ONNX Runtime. The
// session and tokenizer are loaded once per process and shared read-only;
// inference needs no lock.

use std::path::Path;
use std::sync::Arc;

use anyhow::Result;
use ort::session::Session;
use ort::value::Tensor;
use tokenizers::Tokenizer;

use crate::error::DetectError;

/// Maps Greek text to a fixed-dimension vector. Deterministic for a fixed
/// model; the dimension must match the vector index.
#[async_trait::async_trait]
pub trait Embedder: Send + Sync {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, DetectError>;
    fn dimension(&self) -> usize;
}

pub struct OnnxEmbedder {
    session: Arc<Session>,
    tokenizer: Arc<Tokenizer>,
    dimension: usize,
}

impl OnnxEmbedder {
    pub fn load(model_path: &Path, tokenizer_path: &Path, dimension: usize) -> Result<Self> {
        let session = Session::builder()?
            .with_intra_threads(2)?
            .commit_from_file(model_path)?;

        let tokenizer = Tokenizer::from_file(tokenizer_path)
            .map_err(|e| anyhow::anyhow!("Failed to load tokenizer: {}", e))?;

        Ok(OnnxEmbedder {
            session: Arc::new(session),
            tokenizer: Arc::new(tokenizer),
            dimension,
        })
    }
}

fn encode(session: &Session, tokenizer: &Tokenizer, text: &str) -> Result<Vec<f32>> {
    let encoding = tokenizer
        .encode(text, true)
        .map_err(|e| anyhow::anyhow!("Tokenization error: {}", e))?;

    let input_ids: Vec<i64> = encoding.get_ids().iter().map(|&id| id as i64).collect();
    let attention_mask: Vec<i64> = encoding
        .get_attention_mask()
        .iter()
        .map(|&m| m as i64)
        .collect();
    let token_type_ids: Vec<i64> = encoding.get_type_ids().iter().map(|&t| t as i64).collect();

    let seq_len = input_ids.len();
    if seq_len == 0 {
        anyhow::bail!("Tokenizer produced an empty encoding");
    }

    let inputs = ort::inputs![
        "input_ids" => Tensor::from_array(([1usize, seq_len], input_ids))?,
        "attention_mask" => Tensor::from_array(([1usize, seq_len], attention_mask))?,
        "token_type_ids" => Tensor::from_array(([1usize, seq_len], token_type_ids))?,
    ];

    let outputs = session.run(inputs)?;
    let (shape, data) = outputs["last_hidden_state"].try_extract_tensor::<f32>()?;

    // shape is [batch=1, seq_len, hidden_dim]
    let dim = shape[2] as usize;
    let mean = mean_pool(data, seq_len, dim);
    Ok(l2_normalize(mean))
}

#[async_trait::async_trait]
impl Embedder for OnnxEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, DetectError> {
        // Inference is CPU-bound; run it off the async workers so the
        // retriever's timeout can fire and other detect calls keep moving.
        let session = Arc::clone(&self.session);
        let tokenizer = Arc::clone(&self.tokenizer);
        let text = text.to_string();

        let encoded = tokio::task::spawn_blocking(move || encode(&session, &tokenizer, &text))
            .await
            .map_err(|e| DetectError::Internal(format!("embedding task failed: {}", e)))?;

        encoded.map_err(|e| DetectError::ServiceUnavailable(format!("embedding failed: {}", e)))
    }

    fn dimension(&self) -> usize {
        self.dimension
    }
}

/// Mean pooling over the sequence dimension of a [1, seq_len, dim] tensor.
fn mean_pool(data: &[f32], seq_len: usize, dim: usize) -> Vec<f32> {
    let mut mean = vec![0.0f32; dim];
    for s in 0..seq_len {
        for d in 0..dim {
            mean[d] += data[s * dim + d];
        }
    }
    for v in &mut mean {
        *v /= seq_len as f32;
    }
    mean
}

/// L2 normalization so dot products equal cosine similarity.
fn l2_normalize(mut v: Vec<f32>) -> Vec<f32> {
    let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 0.0 {
        for x in &mut v {
            *x /= norm;
        }
    }
    v
}
