use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use parking_lot::Mutex;
use tracing::{info, warn};

use crate::batch::types::{
    merged_config, GeneratedImage, GenerationConfig, Look, ReferenceSet,
};
use crate::credits::{CreditError, CreditLedger};
use crate::llm::{GenerationError, ImageBackend};
use crate::prompt::builder::build_prompt;
use crate::prompt::constraints::requests_screen;
use crate::utils::timing::BatchTimer;

// The orchestrator's own scrub trigger is broader than the prompt compiler's:
// "executive" scenes also read as meeting contexts worth correcting.
const SCRUB_CONTEXT_KEYWORDS: [&str; 4] =
    ["boardroom", "meeting room", "conference room", "executive"];

const BOARDROOM_SCRUB_INSTRUCTION: &str = "Remove every screen, monitor, whiteboard, and projector from the background of this image. \
Replace the removed objects with one of: floor-to-ceiling windows with a blurred city view, a wood feature wall, framed abstract artwork, or open shelving with books and plants. \
Keep the person, their pose, their clothing, and the lighting exactly as they are.";

fn needs_screen_scrub(scene_text: &str) -> bool {
    let lowered = scene_text.to_lowercase();
    let in_context = SCRUB_CONTEXT_KEYWORDS
        .iter()
        .any(|keyword| lowered.contains(keyword));
    in_context && !requests_screen(scene_text)
}

#[derive(Debug, thiserror::Error)]
pub enum BatchError {
    #[error(transparent)]
    Credits(#[from] CreditError),
    #[error("Shot {shot} of look '{look}' failed after retry: {source}")]
    ShotFailed {
        look: String,
        shot: u32,
        #[source]
        source: GenerationError,
    },
    #[error("The edit could not be applied; your credit for this edit has been refunded: {0}")]
    EditFailed(#[source] GenerationError),
}

/// Sequences a batch of shots across Looks: one shot at a time, in order,
/// with a courtesy pause between generation calls. The global shot index
/// advances monotonically across the whole batch so compositional variants
/// cycle batch-wide instead of repeating per Look.
pub struct BatchRunner<B: ImageBackend> {
    backend: B,
    credits: Arc<Mutex<CreditLedger>>,
    shot_pause: Duration,
}

impl<B: ImageBackend> BatchRunner<B> {
    pub fn new(backend: B, credits: Arc<Mutex<CreditLedger>>, shot_pause: Duration) -> Self {
        BatchRunner {
            backend,
            credits,
            shot_pause,
        }
    }

    pub async fn run_batch(
        &self,
        looks: &[Look],
        shared: &GenerationConfig,
        refs: &ReferenceSet,
    ) -> Result<Vec<GeneratedImage>, BatchError> {
        let total_shots: u32 = looks.iter().map(|look| look.image_count).sum();
        // Optimistic debit for the whole batch before the first shot; a batch
        // that later fails does not refund per shot.
        self.credits.lock().debit(total_shots)?;

        let mut timer = BatchTimer::start(looks.len(), total_shots);
        let mut results = Vec::new();
        let mut global_index = 0usize;

        for look in looks {
            let config = merged_config(shared, look);
            for unit in 0..look.image_count {
                if global_index > 0 && !self.shot_pause.is_zero() {
                    tokio::time::sleep(self.shot_pause).await;
                }

                let prompt = build_prompt(&config.scene, &config, global_index);
                info!(
                    "Generating shot {} of look '{}' (global index {})",
                    unit + 1,
                    look.name,
                    global_index
                );

                let outcome = self
                    .generate_with_retry(refs, &prompt, &config, look.variation_level)
                    .await;
                let shot_index = global_index;
                // Attempted shots advance the index whether or not they
                // ultimately succeed, preserving variant-cycle continuity.
                global_index += 1;

                match outcome {
                    Ok(bytes) => {
                        info!("Shot {} of look '{}' succeeded", unit + 1, look.name);
                        let (bytes, was_refined) = self.scrub_boardroom_screens(bytes, &config).await;
                        results.push(GeneratedImage {
                            id: format!("shot-{shot_index:03}"),
                            bytes,
                            display_name: format!("{} {}", look.name, unit + 1),
                            look_name: look.name.clone(),
                            created_at: Utc::now(),
                            aspect_ratio: config.aspect_ratio,
                            was_refined,
                        });
                    }
                    Err(err) => {
                        timer.mark_status("error", Some(err.to_string()));
                        timer.log_completed();
                        return Err(BatchError::ShotFailed {
                            look: look.name.clone(),
                            shot: unit + 1,
                            source: err,
                        });
                    }
                }
            }
        }

        timer.log_completed();
        Ok(results)
    }

    /// Exactly one retry. When the first attempt used optional references,
    /// the retry drops them and keeps only the identity reference, on the
    /// hypothesis that a malformed optional upload caused the failure.
    async fn generate_with_retry(
        &self,
        refs: &ReferenceSet,
        prompt: &str,
        config: &GenerationConfig,
        variation_level: u8,
    ) -> Result<Vec<u8>, GenerationError> {
        let first = self
            .backend
            .generate(refs, prompt, config.aspect_ratio, variation_level)
            .await;
        let err = match first {
            Ok(bytes) => return Ok(bytes),
            Err(err) => err,
        };

        if refs.has_optional() {
            warn!("Shot failed ({err}); retrying with the main reference only");
            let reduced = refs.main_only();
            self.backend
                .generate(&reduced, prompt, config.aspect_ratio, variation_level)
                .await
        } else {
            warn!("Shot failed ({err}); retrying once");
            self.backend
                .generate(refs, prompt, config.aspect_ratio, variation_level)
                .await
        }
    }

    /// Best-effort single-attempt correction pass for meeting-room scenes
    /// generated without an explicit screen request. Failure keeps the
    /// unrefined image and is never surfaced to the caller.
    async fn scrub_boardroom_screens(
        &self,
        bytes: Vec<u8>,
        config: &GenerationConfig,
    ) -> (Vec<u8>, bool) {
        if config.expert_text().is_some() || !needs_screen_scrub(&config.scene) {
            return (bytes, false);
        }

        match self
            .backend
            .refine(&bytes, BOARDROOM_SCRUB_INSTRUCTION, config.aspect_ratio)
            .await
        {
            Ok(Some(refined)) => (refined, true),
            Ok(None) => {
                warn!("Boardroom screen scrub returned no image; keeping the original");
                (bytes, false)
            }
            Err(err) => {
                warn!("Boardroom screen scrub failed ({err}); keeping the original");
                (bytes, false)
            }
        }
    }

    /// User-triggered edit of an already-generated image. Costs one credit,
    /// which is refunded when the edit fails.
    pub async fn apply_edit(
        &self,
        image: &mut GeneratedImage,
        instruction: &str,
    ) -> Result<(), BatchError> {
        self.credits.lock().debit(1)?;

        match self
            .backend
            .refine(&image.bytes, instruction, image.aspect_ratio)
            .await
        {
            Ok(Some(refined)) => {
                image.bytes = refined;
                image.was_refined = true;
                Ok(())
            }
            Ok(None) => {
                self.credits.lock().refund(1);
                Err(BatchError::EditFailed(GenerationError::NoImage {
                    model: "refine".to_string(),
                }))
            }
            Err(err) => {
                self.credits.lock().refund(1);
                Err(BatchError::EditFailed(err))
            }
        }
    }
}
