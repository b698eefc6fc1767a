//! ONNX embedding engine for the multilingual E5 family.
//!
//! Loads `model.onnx` + `tokenizer.json` (e.g. intfloat/multilingual-e5-base,
//! 768-dim). E5 models are trained with role prefixes, so passages are embedded
//! as `"passage: <text>"` and queries as `"query: <text>"`. Requires the `onnx`
//! feature.

#[cfg(feature = "onnx")]
mod inner {
    use std::path::Path;

    use ndarray::Array1;
    use ort::session::Session;
    use ort::value::Tensor;
    use parking_lot::Mutex;
    use tokenizers::Tokenizer;
    use tracing::{debug, info};

    use crate::embedder::{check_dimension, l2_normalize, Embedder};
    use govrag_core::EmbeddingError;

    const MAX_SEQ_LEN: usize = 512;
    const PASSAGE_PREFIX: &str = "passage: ";
    const QUERY_PREFIX: &str = "query: ";

    pub struct OnnxEmbedder {
        session: Mutex<Session>,
        tokenizer: Tokenizer,
        dimension: usize,
        name: String,
    }

    impl OnnxEmbedder {
        /// Load the model and tokenizer from `model_dir`.
        ///
        /// Expects `model_dir/model.onnx` and `model_dir/tokenizer.json`.
        pub fn load(model_dir: &Path, dimension: usize) -> Result<Self, EmbeddingError> {
            let model_path = model_dir.join("model.onnx");
            let tokenizer_path = model_dir.join("tokenizer.json");

            if !model_path.exists() {
                return Err(EmbeddingError::Provider(format!(
                    "Model not found: {}",
                    model_path.display()
                )));
            }
            if !tokenizer_path.exists() {
                return Err(EmbeddingError::Provider(format!(
                    "Tokenizer not found: {}",
                    tokenizer_path.display()
                )));
            }

            // With load-dynamic, ORT_DYLIB_PATH must point to libonnxruntime.
            ort::init().commit();

            let session = Session::builder()
                .map_err(|e| provider_err("session builder", e))?
                .with_intra_threads(2)
                .map_err(|e| provider_err("thread config", e))?
                .commit_from_file(&model_path)
                .map_err(|e| provider_err("model load", e))?;

            let tokenizer = Tokenizer::from_file(&tokenizer_path)
                .map_err(|e| provider_err("tokenizer load", e))?;

            let name = model_dir
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_else(|| "onnx".into());
            info!(
                "ONNX embedder loaded: dim={}, model={}",
                dimension,
                model_path.display()
            );

            Ok(Self {
                session: Mutex::new(session),
                tokenizer,
                dimension,
                name,
            })
        }

        fn infer(&self, text: &str) -> Result<Array1<f32>, EmbeddingError> {
            let encoding = self
                .tokenizer
                .encode(text, true)
                .map_err(|e| provider_err("tokenization", e))?;

            let seq_len = encoding.get_ids().len().min(MAX_SEQ_LEN);
            let input_ids = &encoding.get_ids()[..seq_len];
            let attention_mask = &encoding.get_attention_mask()[..seq_len];

            let ids_data: Vec<i64> = input_ids.iter().map(|&id| id as i64).collect();
            let mask_data: Vec<i64> = attention_mask.iter().map(|&m| m as i64).collect();
            let type_ids_data: Vec<i64> = vec![0i64; seq_len];

            let ids_tensor = Tensor::from_array(([1usize, seq_len], ids_data))
                .map_err(|e| provider_err("ids tensor", e))?;
            let mask_tensor = Tensor::from_array(([1usize, seq_len], mask_data))
                .map_err(|e| provider_err("mask tensor", e))?;
            let type_ids_tensor = Tensor::from_array(([1usize, seq_len], type_ids_data))
                .map_err(|e| provider_err("type_ids tensor", e))?;

            let mut session = self.session.lock();
            let outputs = session
                .run(ort::inputs![ids_tensor, mask_tensor, type_ids_tensor])
                .map_err(|e| provider_err("inference", e))?;

            // Either token embeddings [1, seq_len, dim] (mean-pooled here) or an
            // already pooled [1, dim].
            let (shape, data) = outputs[0]
                .try_extract_tensor::<f32>()
                .map_err(|e| provider_err("output extraction", e))?;
            let dims: Vec<i64> = shape.iter().copied().collect();

            let embedding = match dims.as_slice() {
                [_, _, dim] => {
                    let dim = *dim as usize;
                    let mask_sum: f32 = attention_mask.iter().map(|&m| m as f32).sum();
                    if mask_sum < 1e-9 {
                        return Ok(Array1::zeros(dim));
                    }
                    let mut pooled = Array1::<f32>::zeros(dim);
                    for (i, &m) in attention_mask.iter().enumerate() {
                        if m > 0 {
                            let offset = i * dim;
                            for d in 0..dim {
                                pooled[d] += data[offset + d];
                            }
                        }
                    }
                    pooled / mask_sum
                }
                [_, dim] => Array1::from_vec(data[..*dim as usize].to_vec()),
                other => {
                    return Err(EmbeddingError::Provider(format!(
                        "Unexpected output shape: {:?}",
                        other
                    )))
                }
            };

            let embedding = l2_normalize(embedding);
            check_dimension(self.dimension, &embedding)?;
            Ok(embedding)
        }
    }

    impl Embedder for OnnxEmbedder {
        fn embed_documents(&self, texts: &[&str]) -> Result<Vec<Array1<f32>>, EmbeddingError> {
            debug!("ONNX embedding {} passages", texts.len());
            texts
                .iter()
                .map(|t| self.infer(&format!("{}{}", PASSAGE_PREFIX, t)))
                .collect()
        }

        fn embed_query(&self, text: &str) -> Result<Array1<f32>, EmbeddingError> {
            self.infer(&format!("{}{}", QUERY_PREFIX, text))
        }

        fn dimension(&self) -> usize {
            self.dimension
        }

        fn name(&self) -> &str {
            &self.name
        }
    }

    fn provider_err(stage: &str, e: impl std::fmt::Display) -> EmbeddingError {
        EmbeddingError::Provider(format!("ONNX {} failed: {}", stage, e))
    }
}

#[cfg(feature = "onnx")]
pub use inner::OnnxEmbedder;
