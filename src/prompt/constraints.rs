use once_cell::sync::Lazy;
use regex::Regex;

use crate::batch::types::{GenderPresentation, GenerationConfig, RetouchLevel};

// Context detection is substring matching on freeform wizard text. The
// keyword lists are the contract; false positives on unusual phrasing are an
// accepted tradeoff of the source behavior.
const BOARDROOM_KEYWORDS: [&str; 3] = ["boardroom", "meeting room", "conference room"];
const SCREEN_REQUEST_KEYWORDS: [&str; 4] = ["screen", "monitor", "projector", "display"];

static HEX_COLOR_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"#(?:[0-9A-Fa-f]{6}|[0-9A-Fa-f]{3})\b").expect("valid hex color regex")
});
static CLOTHING_TEXT_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\b(text|logo|logos|lettering|slogan|typography|monogram|wording)\b")
        .expect("valid clothing text regex")
});

pub fn is_boardroom_context(text: &str) -> bool {
    let lowered = text.to_lowercase();
    BOARDROOM_KEYWORDS
        .iter()
        .any(|keyword| lowered.contains(keyword))
}

pub fn requests_screen(text: &str) -> bool {
    let lowered = text.to_lowercase();
    SCREEN_REQUEST_KEYWORDS
        .iter()
        .any(|keyword| lowered.contains(keyword))
}

/// First `#RRGGBB` or `#RGB` token in freeform scene text, if any.
pub fn find_hex_color(text: &str) -> Option<String> {
    HEX_COLOR_RE
        .find(text)
        .map(|token| token.as_str().to_string())
}

pub fn requests_clothing_text(text: &str) -> bool {
    CLOTHING_TEXT_RE.is_match(text)
}

/// Positive directives plus the accumulated negative-constraint terms for one
/// shot. Rendering is concatenative; compiling the same inputs twice yields
/// byte-identical output.
#[derive(Debug, Clone, Default)]
pub struct CompiledConstraints {
    pub directives: Vec<String>,
    pub negatives: Vec<String>,
    pub solid_backdrop_color: Option<String>,
}

impl CompiledConstraints {
    pub fn render(&self) -> String {
        let mut sections = Vec::new();
        if !self.directives.is_empty() {
            sections.push(self.directives.join("\n"));
        }
        if !self.negatives.is_empty() {
            sections.push(format!(
                "DO NOT INCLUDE (strict negative constraints): {}.",
                self.negatives.join("; ")
            ));
        }
        sections.join("\n")
    }
}

const TEXTURE_PRESERVATION_BLOCK: &str = "Preserve the subject's real skin texture exactly as captured in the reference photos: visible pores, fine lines, faint freckles, and minor asymmetries must remain. \
Do not smooth, blur, or homogenize the skin in any way. Keep natural specular highlights and micro-shadows on the face. \
The result must look like an unretouched photograph from a professional camera, not a beauty-filtered render.";

fn retouch_directive(level: RetouchLevel) -> &'static str {
    match level {
        RetouchLevel::None => TEXTURE_PRESERVATION_BLOCK,
        RetouchLevel::Natural => {
            "Apply light, natural retouching only: even out temporary blemishes and reduce shine while keeping pores and fine lines clearly visible."
        }
        RetouchLevel::Polished => {
            "Apply polished professional retouching: clean, even skin tone and controlled shine, with the face still recognizably textured."
        }
        RetouchLevel::Airbrushed => {
            "Apply heavy editorial retouching: flawless, magazine-grade skin with smooth, even tone."
        }
    }
}

fn body_offset_phrase(offset: i8) -> &'static str {
    match offset {
        -3 => "Render the subject with an extremely thin, severely slender build",
        -2 => "Render the subject with a noticeably slimmer build than the reference photos",
        -1 => "Render the subject with a slightly slimmer build than the reference photos",
        0 => "Keep the subject's body shape exactly as shown in the reference photos",
        1 => "Render the subject with a slightly fuller build than the reference photos",
        2 => "Render the subject with a noticeably heavier build than the reference photos",
        _ => "Render the subject with an obese, very heavy build",
    }
}

fn ring_description(gender: Option<GenderPresentation>) -> &'static str {
    match gender {
        Some(GenderPresentation::Feminine) => {
            "The subject wears an elegant slim ring with a small stone on the left ring finger."
        }
        Some(GenderPresentation::Masculine) => {
            "The subject wears a simple flat wedding band on the left ring finger."
        }
        _ => "The subject wears a plain minimal band on the left ring finger.",
    }
}

/// Assembles the complete constraint block for one shot. The boardroom
/// override is appended last among directives so it supersedes any generic
/// scene instruction that precedes it in the final prompt.
pub fn compile(
    config: &GenerationConfig,
    scene_text: &str,
    variant_negative: Option<&str>,
) -> CompiledConstraints {
    let mut out = CompiledConstraints::default();

    // Always-on negatives.
    out.negatives.push(
        "multiple people, a second person, clones, or duplicated versions of the subject"
            .to_string(),
    );
    out.negatives.push(
        "visible lighting equipment, softboxes, light stands, umbrellas, reflectors, or their reflections in glasses or glass surfaces".to_string(),
    );
    out.negatives.push(
        "background objects merging with or appearing to sprout from the subject's head"
            .to_string(),
    );
    out.negatives
        .push("limbs or body cropped exactly at a joint (wrist, elbow, knee, ankle)".to_string());
    out.negatives
        .push("cut-off fingers, cut-off toes, or a cropped-off top of the head".to_string());

    let expert_wants_text = config
        .expert_text()
        .map(requests_clothing_text)
        .unwrap_or(false);
    if expert_wants_text {
        out.directives.push(
            "Render any requested clothing text or logos realistically: printed on the fabric, following folds, seams, and perspective, with clean kerning and no floating letters.".to_string(),
        );
    } else {
        out.negatives
            .push("text, logos, lettering, or graphics printed on plain clothing".to_string());
    }

    // Glasses policy: the two instructions are mutually exclusive.
    if config.keep_glasses {
        out.directives.push(
            "If the subject wears glasses in the main reference photo, keep the glasses exactly as shown: identical frames, identical fit, no substitutions.".to_string(),
        );
    } else {
        out.directives.push(
            "Remove the subject's eyeglasses entirely and render the face naturally without glasses.".to_string(),
        );
        out.negatives
            .push("eyeglasses, spectacles, sunglasses".to_string());
    }

    out.directives
        .push(retouch_directive(config.retouch_level).to_string());
    if config.retouch_level == RetouchLevel::None {
        out.negatives.push(
            "plastic skin, beauty filter, airbrushed skin, porcelain skin, waxy skin, AI-smoothed face".to_string(),
        );
    }

    let offset = config.clamped_body_offset();
    out.directives
        .push(format!("{}.", body_offset_phrase(offset)));
    if offset == -3 {
        out.negatives
            .push("overweight, heavyset, or obese body shape".to_string());
    } else if offset == 3 {
        out.negatives
            .push("thin, slim, skinny, or athletic body shape".to_string());
    }

    if config.include_ring {
        out.directives.push(ring_description(config.gender).to_string());
    } else {
        out.negatives
            .push("rings on any fingers of either hand".to_string());
    }

    if let Some(hair) = config.hair_color.as_deref() {
        if hair.eq_ignore_ascii_case("bald") {
            out.directives.push(
                "The subject is completely bald: a clean, hairless scalp with no hair at all."
                    .to_string(),
            );
            out.negatives
                .push("hair, wig, toupee, or visible stubble on the scalp".to_string());
        } else if !hair.trim().is_empty() {
            out.directives.push(format!(
                "The subject's hair color must match exactly: {}.",
                hair.trim()
            ));
        }
    }

    if let Some(hex) = find_hex_color(scene_text) {
        out.directives.push(format!(
            "The background is a solid, seamless studio backdrop of the exact color {hex}: perfectly even, no texture, no gradient, no vignetting."
        ));
        out.solid_backdrop_color = Some(hex);
    }

    if let Some(addition) = variant_negative {
        out.negatives.push(addition.to_string());
    }

    // Boardroom screen scrub. Appended last so it wins over generic scene
    // text when the model weighs conflicting instructions.
    if is_boardroom_context(scene_text) && !requests_screen(scene_text) {
        out.directives.push(
            "ZERO TOLERANCE OVERRIDE: there must be NO screens of any kind anywhere in the frame. No TV screens, no monitors, no laptop screens, no projector screens, no video walls, no tablets. This rule supersedes every other instruction about the scene.".to_string(),
        );
        out.directives.push(
            "Permitted boardroom background treatments (choose one): 1) floor-to-ceiling windows with a blurred city view; 2) a wood or stone feature wall; 3) framed abstract artwork; 4) open shelving with books and plants; 5) a softly blurred depth-of-field view across the empty table.".to_string(),
        );
        out.directives.push(
            "Orient the camera towards windows, a feature wall, or open depth rather than a flat blank wall.".to_string(),
        );
        out.negatives.push(
            "television screens, computer monitors, projector screens, video conference displays, or any glowing rectangular panel".to_string(),
        );
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_config() -> GenerationConfig {
        GenerationConfig::default()
    }

    #[test]
    fn retouch_none_adds_plastic_skin_negative() {
        let mut config = base_config();
        config.retouch_level = RetouchLevel::None;
        let compiled = compile(&config, "studio", None).render();
        assert!(compiled.contains("plastic skin"));

        config.retouch_level = RetouchLevel::Airbrushed;
        let compiled = compile(&config, "studio", None).render();
        assert!(!compiled.contains("plastic skin"));
    }

    #[test]
    fn glasses_instructions_are_mutually_exclusive() {
        let mut config = base_config();
        config.keep_glasses = false;
        let compiled = compile(&config, "studio", None).render();
        assert!(compiled.contains("Remove the subject's eyeglasses"));
        assert!(!compiled.contains("keep the glasses exactly as shown"));

        config.keep_glasses = true;
        let compiled = compile(&config, "studio", None).render();
        assert!(compiled.contains("keep the glasses exactly as shown"));
        assert!(!compiled.contains("Remove the subject's eyeglasses"));
    }

    #[test]
    fn boardroom_without_screen_request_triggers_override() {
        let compiled = compile(&base_config(), "a sleek corporate boardroom", None).render();
        assert!(compiled.contains("ZERO TOLERANCE OVERRIDE"));

        let compiled = compile(
            &base_config(),
            "a boardroom with a large presentation screen behind the subject",
            None,
        )
        .render();
        assert!(!compiled.contains("ZERO TOLERANCE OVERRIDE"));
    }

    #[test]
    fn hex_color_scene_emits_solid_backdrop_directive() {
        let compiled = compile(&base_config(), "backdrop #1A2B3C please", None);
        assert_eq!(compiled.solid_backdrop_color.as_deref(), Some("#1A2B3C"));
        assert!(compiled.render().contains("exact color #1A2B3C"));

        let compiled = compile(&base_config(), "shorthand #fab backdrop", None);
        assert_eq!(compiled.solid_backdrop_color.as_deref(), Some("#fab"));
    }

    #[test]
    fn body_offset_extremes_emit_opposite_negatives_only() {
        let mut config = base_config();
        config.body_offset = -3;
        let thin = compile(&config, "studio", None).render();
        assert!(thin.contains("overweight, heavyset, or obese"));
        assert!(!thin.contains("thin, slim, skinny"));

        config.body_offset = 3;
        let heavy = compile(&config, "studio", None).render();
        assert!(heavy.contains("thin, slim, skinny"));
        assert!(!heavy.contains("overweight, heavyset, or obese"));
    }

    #[test]
    fn expert_text_request_swaps_suppression_for_fabric_rules() {
        let mut config = base_config();
        config.expert_prompt = Some("hoodie with the company logo on the chest".to_string());
        let compiled = compile(&config, "studio", None).render();
        assert!(compiled.contains("printed on the fabric"));
        assert!(!compiled.contains("graphics printed on plain clothing"));
    }

    #[test]
    fn texture_keyword_does_not_count_as_clothing_text_request() {
        assert!(!requests_clothing_text("rich fabric texture, natural look"));
        assert!(requests_clothing_text("add the word TEXT on the shirt"));
        assert!(requests_clothing_text("small logo on the pocket"));
    }

    #[test]
    fn compile_is_idempotent() {
        let mut config = base_config();
        config.retouch_level = RetouchLevel::None;
        config.include_ring = true;
        let first = compile(&config, "boardroom at dusk", Some("centered framing")).render();
        let second = compile(&config, "boardroom at dusk", Some("centered framing")).render();
        assert_eq!(first, second);
    }
}
