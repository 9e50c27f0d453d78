//! # Embedder
//!
//! Maps text to fixed-dimension dense vectors, used both when indexing
//! booking documents and when embedding an incoming query.
//!
//! The [`Embedder`] trait is the contract the vector store depends on; the
//! production implementation is [`MiniLmEmbedder`], which runs
//! **all-MiniLM-L6-v2** through Candle (pure Rust, CPU) with attention-mask
//! mean pooling and L2 normalization, producing 384-d vectors. Model weights
//! are fetched from the Hugging Face Hub on first load and cached locally.
//!
//! Embedding is a pure function of the input text and the loaded weights: no
//! side effects, no mutable state, and `embed_many` is equivalent to
//! repeated `embed_one` calls.

use candle_core::{DType, Device, Tensor};
use candle_nn::VarBuilder;
use candle_transformers::models::bert::{BertModel, Config, DTYPE};
use hf_hub::{Repo, RepoType, api::sync::Api};
use std::error::Error;
use tokenizers::Tokenizer;
use tracing::info;

/// Default dimensionality of MiniLM-L6 sentence embeddings.
pub const EMBEDDING_DIM: usize = 384;

/// Text → fixed-dimension vector capability.
///
/// Every returned vector has exactly `dim()` elements. Implementations may
/// batch internally in `embed_many` but must produce the same vector for the
/// same text as `embed_one` would.
pub trait Embedder: Send + Sync {
    /// Dimensionality of every vector this embedder produces.
    fn dim(&self) -> usize;

    /// Embed a single text.
    fn embed_one(&self, text: &str) -> Result<Vec<f32>, Box<dyn Error>>;

    /// Embed a batch of texts, in order.
    fn embed_many(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, Box<dyn Error>> {
        texts.iter().map(|text| self.embed_one(text)).collect()
    }
}

/// Sentence embeddings via **all-MiniLM-L6-v2** on Candle.
///
/// Construction downloads (or resolves from cache) the model config,
/// tokenizer and safetensors weights. A load failure is fatal: there is no
/// degraded mode without an embedding model.
pub struct MiniLmEmbedder {
    model: BertModel,
    tokenizer: Tokenizer,
    device: Device,
}

impl MiniLmEmbedder {
    /// Load the model from the Hugging Face Hub.
    ///
    /// # Errors
    /// Fails if the model files cannot be fetched or the weights cannot be
    /// loaded.
    pub fn load() -> Result<Self, Box<dyn Error>> {
        let device = Device::Cpu;
        let model_id = "sentence-transformers/all-MiniLM-L6-v2";
        let revision = "main";

        let repo = Repo::with_revision(model_id.to_string(), RepoType::Model, revision.to_string());
        let api = Api::new()?;
        let api_repo = api.repo(repo);

        let config_filename = api_repo.get("config.json")?;
        let tokenizer_filename = api_repo.get("tokenizer.json")?;
        let weights_filename = api_repo.get("model.safetensors")?;

        let config = std::fs::read_to_string(config_filename)?;
        let config: Config = serde_json::from_str(&config)?;

        let tokenizer = Tokenizer::from_file(tokenizer_filename)
            .map_err(|e| format!("Failed to load tokenizer: {}", e))?;

        let vb = unsafe { VarBuilder::from_mmaped_safetensors(&[weights_filename], DTYPE, &device)? };
        let model = BertModel::load(vb, &config)?;

        info!("loaded sentence embedding model {model_id}");

        Ok(Self {
            model,
            tokenizer,
            device,
        })
    }

    /// Encode text into an embedding.
    ///
    /// Text longer than 512 tokens is truncated by the tokenizer.
    fn encode(&self, text: &str) -> Result<Vec<f32>, Box<dyn Error>> {
        let tokens = self
            .tokenizer
            .encode(text, true)
            .map_err(|e| format!("Tokenization error: {}", e))?;

        let token_ids = Tensor::new(tokens.get_ids(), &self.device)?.unsqueeze(0)?;
        let token_type_ids = Tensor::new(tokens.get_type_ids(), &self.device)?.unsqueeze(0)?;

        let output = self.model.forward(&token_ids, &token_type_ids, None)?;

        let embedding = self.mean_pooling(&output, tokens.get_attention_mask())?;
        let embedding = self.normalize(&embedding)?;

        Ok(embedding.to_vec1::<f32>()?)
    }

    /// Mean pooling over token embeddings, weighted by the attention mask.
    fn mean_pooling(
        &self,
        embeddings: &Tensor,
        attention_mask: &[u32],
    ) -> Result<Tensor, Box<dyn Error>> {
        // embeddings: [1, seq_len, hidden]; mask must broadcast as [1, seq_len, 1].
        let mask = Tensor::new(attention_mask, &self.device)?
            .to_dtype(DType::F32)?
            .unsqueeze(0)?
            .unsqueeze(2)?;

        let masked = embeddings.broadcast_mul(&mask)?;
        let sum = masked.sum(1)?;
        let count = mask.sum(1)?.clamp(1f32, f32::INFINITY)?;
        let mean = sum.broadcast_div(&count)?;

        Ok(mean.squeeze(0)?)
    }

    /// L2 normalize the embedding vector.
    fn normalize(&self, tensor: &Tensor) -> Result<Tensor, Box<dyn Error>> {
        let norm = tensor.sqr()?.sum_all()?.sqrt()?;
        Ok(tensor.broadcast_div(&norm)?)
    }
}

impl Embedder for MiniLmEmbedder {
    fn dim(&self) -> usize {
        EMBEDDING_DIM
    }

    fn embed_one(&self, text: &str) -> Result<Vec<f32>, Box<dyn Error>> {
        self.encode(text)
    }
}


#[cfg(test)]
mod tests {
    use super::testing::StubEmbedder;
    use super::*;

    #[test]
    fn test_stub_embedder_is_deterministic() {
        let embedder = StubEmbedder::new(8);
        let a = embedder.embed_one("bookings in Portugal").unwrap();
        let b = embedder.embed_one("bookings in Portugal").unwrap();
        assert_eq!(a, b);
        assert_eq!(a.len(), 8);
    }

    #[test]
    fn test_embed_many_matches_embed_one() {
        let embedder = StubEmbedder::new(8);
        let texts = vec!["one".to_string(), "two".to_string()];
        let batch = embedder.embed_many(&texts).unwrap();
        assert_eq!(batch[0], embedder.embed_one("one").unwrap());
        assert_eq!(batch[1], embedder.embed_one("two").unwrap());
    }

    // Requires network access to the Hugging Face Hub.
    #[test]
    #[ignore]
    fn test_minilm_dimensionality() {
        let embedder = MiniLmEmbedder::load().unwrap();
        let v = embedder.embed_one("Rust is great!").unwrap();
        assert_eq!(v.len(), EMBEDDING_DIM);
    }
}
