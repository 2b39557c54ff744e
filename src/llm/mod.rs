pub mod gemini;
pub mod media;

use crate::batch::types::{AspectRatio, ReferenceSet};

#[derive(Debug, thiserror::Error)]
pub enum GenerationError {
    /// Raised before any network call is made.
    #[error("The main reference photo is missing or unreadable. Please re-upload a clear, well-lit photo of your face.")]
    InvalidMainReference,
    #[error("Image generation failed: {0}")]
    Upstream(String),
    /// The model answered, but no inline image part was present.
    #[error("No image was generated (model: {model})")]
    NoImage { model: String },
}

/// Boundary to the external multimodal image model. The production
/// implementation is [`gemini::GeminiBackend`]; orchestration tests use
/// recording doubles.
pub trait ImageBackend {
    fn generate(
        &self,
        refs: &ReferenceSet,
        prompt: &str,
        aspect_ratio: AspectRatio,
        variation_level: u8,
    ) -> impl std::future::Future<Output = Result<Vec<u8>, GenerationError>> + Send;

    /// Best-effort edit of an existing image. `Ok(None)` means the model
    /// returned no image; callers keep the original.
    fn refine(
        &self,
        image: &[u8],
        instruction: &str,
        aspect_ratio: AspectRatio,
    ) -> impl std::future::Future<Output = Result<Option<Vec<u8>>, GenerationError>> + Send;
}
