use crate::batch::types::{
    AspectRatio, CameraAngle, Framing, GenderPresentation, GenerationConfig, Mood,
};
use crate::prompt::constraints::{self, CompiledConstraints};
use crate::prompt::variants::variant_for_index;

/// Composition, lens hint, lighting override, and extra framing negatives
/// derived from the requested framing and the global shot index.
struct FramingPlan {
    lines: Vec<String>,
    lens_hint: &'static str,
    lighting_override: Option<&'static str>,
    extra_negative: Option<&'static str>,
}

const SHORT_LIGHTING_DEFAULT: &str =
    "Short lighting: the key light falls on the far cheek, the side of the face angled away from camera, with the near cheek in soft shadow.";

fn headshot_pose(global_index: usize) -> (&'static str, Option<&'static str>) {
    // The first two shots of the cycle use the two side-turn poses; from the
    // third shot on, a three-pose cycle adds a square option.
    let pose_slot = if global_index < 2 {
        global_index
    } else {
        match (global_index - 2) % 3 {
            0 => 2,
            1 => 0,
            _ => 1,
        }
    };

    match pose_slot {
        0 => (
            "Pose: shoulders turned towards the subject's right, head turned back towards the lens.",
            Some("Short lighting: key light from camera left, illuminating the far (turned-away) cheek, near cheek in soft shadow."),
        ),
        1 => (
            "Pose: shoulders turned towards the subject's left, head turned back towards the lens.",
            Some("Short lighting: key light from camera right, illuminating the far (turned-away) cheek, near cheek in soft shadow."),
        ),
        _ => (
            "Pose: shoulders square to the camera, relaxed and confident.",
            None,
        ),
    }
}

fn plan_framing(config: &GenerationConfig, global_index: usize) -> FramingPlan {
    match config.framing {
        Framing::Headshot => {
            let (pose, lighting_override) = headshot_pose(global_index);
            FramingPlan {
                lines: vec![
                    "Framing: tight professional headshot, head and shoulders only, cropped below the collarbone.".to_string(),
                    pose.to_string(),
                ],
                lens_hint: "Shot on an 85mm telephoto portrait lens with flattering facial compression.",
                lighting_override,
                extra_negative: Some(
                    "three-quarter or full-body crop, visible belt, visible hands",
                ),
            }
        }
        Framing::WaistUp => {
            let variant = variant_for_index(global_index);
            FramingPlan {
                lines: vec![
                    "Framing: waist-up portrait, cropped at mid-thigh, never exactly at the waist or a joint.".to_string(),
                    variant.placement.to_string(),
                    variant.body_angle.to_string(),
                    variant.gaze.to_string(),
                ],
                lens_hint: "Shot on a 50mm lens at a natural perspective.",
                lighting_override: None,
                extra_negative: Some(variant.negative_addition),
            }
        }
        Framing::ThreeQuarter => {
            let variant = variant_for_index(global_index);
            FramingPlan {
                lines: vec![
                    "Framing: three-quarter portrait, cropped above the knee; no ankles or feet in frame.".to_string(),
                    variant.placement.to_string(),
                    variant.body_angle.to_string(),
                    variant.gaze.to_string(),
                ],
                lens_hint: "Shot on a 50mm lens at a natural perspective.",
                lighting_override: None,
                extra_negative: Some(variant.negative_addition),
            }
        }
        Framing::FullBody => {
            let variant = variant_for_index(global_index);
            let mut lines = vec![
                "Framing: full-body portrait with both shoes fully visible on a visible floor and comfortable headroom above the head.".to_string(),
                variant.placement.to_string(),
                variant.body_angle.to_string(),
                variant.gaze.to_string(),
            ];
            let lens_hint = if config.aspect_ratio == AspectRatio::Landscape {
                lines.push(
                    "Zoom out significantly so the full figure and a generous slice of the environment fit the wide frame.".to_string(),
                );
                "Shot on a 24mm wide-angle lens."
            } else {
                "Shot on a 35mm lens."
            };
            FramingPlan {
                lines,
                lens_hint,
                lighting_override: None,
                extra_negative: Some(variant.negative_addition),
            }
        }
        Framing::Unspecified => FramingPlan {
            lines: vec![
                "Framing: waist-up portrait, cropped at the hips.".to_string(),
            ],
            lens_hint: "Shot on a 50mm lens at a natural perspective.",
            lighting_override: None,
            extra_negative: None,
        },
    }
}

fn camera_angle_line(angle: CameraAngle) -> &'static str {
    match angle {
        CameraAngle::EyeLevel => {
            "Camera angle: exactly at the subject's eye level for a neutral, direct perspective."
        }
        CameraAngle::LowAngle => {
            "Camera angle: slightly below eye level looking up, a subtle power angle that conveys authority."
        }
        CameraAngle::HighAngle => {
            "Camera angle: slightly above eye level looking down, an approachable, friendly angle."
        }
    }
}

fn mood_doctrine(mood: Mood) -> &'static str {
    match mood {
        Mood::PolishedProfessional => {
            "Lighting mood: clean polished studio lighting, a large soft key with gentle fill, crisp round catchlights in the eyes."
        }
        Mood::Daylight => {
            "Lighting mood: bright natural daylight, soft and airy, neutral white balance, no artificial color casts."
        }
        Mood::Cinematic => {
            "Lighting mood: cinematic Rembrandt lighting, a defined triangle of light on the shadow-side cheek, deep controlled shadows, rich micro-contrast."
        }
        Mood::DarkMoody => {
            "Lighting mood: dark and moody low-key lighting, a single hard-edged key, deep shadows, dark background tones."
        }
    }
}

fn lighting_direction(
    mood: Mood,
    scene_text: &str,
    framing_override: Option<&'static str>,
) -> String {
    // A framing-driven override (headshot side poses) beats the mood default.
    if let Some(override_line) = framing_override {
        return override_line.to_string();
    }
    if mood == Mood::Daylight && scene_text.to_lowercase().contains("window") {
        return "Lighting direction: when the subject is posed directly beside the in-frame window, let the window act as the key light even if it falls on the near cheek; otherwise keep short lighting with the key on the far cheek.".to_string();
    }
    SHORT_LIGHTING_DEFAULT.to_string()
}

fn subject_descriptor_lines(config: &GenerationConfig) -> Vec<String> {
    let mut lines = Vec::new();
    if let Some(gender) = config.gender {
        let presentation = match gender {
            GenderPresentation::Feminine => "feminine",
            GenderPresentation::Masculine => "masculine",
            GenderPresentation::Neutral => "gender-neutral",
        };
        lines.push(format!(
            "Subject presentation: {presentation}, styled accordingly."
        ));
    }
    if let Some(age) = config.age_range.as_deref().filter(|a| !a.trim().is_empty()) {
        lines.push(format!(
            "The subject appears to be in the {} age range.",
            age.trim()
        ));
    }
    lines
}

fn clothing_line(config: &GenerationConfig) -> Option<String> {
    let clothing = config.clothing.trim();
    if clothing.is_empty() {
        return None;
    }
    let feminine_suit = config.gender == Some(GenderPresentation::Feminine)
        && clothing.eq_ignore_ascii_case("suit");
    if feminine_suit {
        // The generic "Suit" token defaults masculine; restyle instead.
        Some(
            "Clothing: a tailored suit styled for a feminine presentation, worn with an open collar or blouse. Do not add a necktie.".to_string(),
        )
    } else {
        Some(format!("Clothing: {clothing}."))
    }
}

fn brand_color_line(config: &GenerationConfig) -> Option<String> {
    let colors: Vec<&str> = config
        .brand_colors
        .iter()
        .map(|color| color.trim())
        .filter(|color| !color.is_empty())
        .collect();
    if colors.is_empty() {
        return None;
    }
    Some(format!(
        "Echo these brand accent colors subtly in the scene or styling: {}.",
        colors.join(", ")
    ))
}

fn scene_lines(scene_prompt: &str, constraints: &CompiledConstraints) -> Vec<String> {
    let scene = scene_prompt.trim();
    if scene.is_empty() {
        return Vec::new();
    }
    let mut lines = vec![format!("Scene: {scene}.")];
    // The generic environment phrase conflicts with an exact solid backdrop.
    if constraints.solid_backdrop_color.is_none() {
        lines.push(
            "The background is an environment only: never add extra people, and never let furniture block the subject.".to_string(),
        );
    }
    lines
}

fn build_expert_prompt(
    expert_text: &str,
    scene_prompt: &str,
    config: &GenerationConfig,
) -> String {
    let compiled = constraints::compile(config, scene_prompt, None);
    let mut lines = vec![
        "CREATIVE BRIEF (authoritative, follow exactly):".to_string(),
        expert_text.to_string(),
        "Use the attached reference photos for facial identity ONLY. Ignore the pose, clothing, lighting, and background of every reference photo.".to_string(),
        "Exactly one person in frame. Never crop a limb at a joint. Never crop off the top of the head or the fingers.".to_string(),
    ];
    lines.extend(subject_descriptor_lines(config));
    // Brand colors survive expert mode; only structured scene and clothing
    // fields are superseded by the free-text brief.
    if let Some(brand) = brand_color_line(config) {
        lines.push(brand);
    }
    lines.push(format!(
        "Output aspect ratio: {}.",
        config.aspect_ratio.as_wire_str()
    ));
    lines.push(compiled.render());
    lines.join("\n")
}

/// Compiles one shot's full instruction set. Deterministic: the same
/// (scene_prompt, config, global_index) tuple always yields the same string.
pub fn build_prompt(scene_prompt: &str, config: &GenerationConfig, global_index: usize) -> String {
    if let Some(expert_text) = config.expert_text() {
        return build_expert_prompt(expert_text, scene_prompt, config);
    }

    let plan = plan_framing(config, global_index);
    let compiled = constraints::compile(config, scene_prompt, plan.extra_negative);

    let mut lines = vec![
        "Professional portrait photograph of the person shown in the attached reference photos. The face must be a faithful likeness of the main reference photo.".to_string(),
    ];
    lines.extend(plan.lines);
    lines.push(camera_angle_line(config.camera_angle).to_string());
    lines.push(mood_doctrine(config.mood).to_string());
    lines.push(lighting_direction(
        config.mood,
        scene_prompt,
        plan.lighting_override,
    ));
    lines.push(plan.lens_hint.to_string());
    lines.extend(subject_descriptor_lines(config));
    lines.push(format!(
        "Output aspect ratio: {}.",
        config.aspect_ratio.as_wire_str()
    ));
    lines.extend(scene_lines(scene_prompt, &compiled));
    if let Some(clothing) = clothing_line(config) {
        lines.push(clothing);
    }
    if let Some(brand) = brand_color_line(config) {
        lines.push(brand);
    }
    lines.push(compiled.render());
    lines.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::batch::types::RetouchLevel;

    fn guided_config(framing: Framing) -> GenerationConfig {
        GenerationConfig {
            framing,
            clothing: "Navy blazer".to_string(),
            ..GenerationConfig::default()
        }
    }

    #[test]
    fn headshot_cinematic_scenario_contains_expected_directives() {
        let config = GenerationConfig {
            framing: Framing::Headshot,
            aspect_ratio: AspectRatio::Square,
            mood: Mood::Cinematic,
            retouch_level: RetouchLevel::None,
            keep_glasses: true,
            ..GenerationConfig::default()
        };
        let prompt = build_prompt("soft gray studio", &config, 0);
        assert!(prompt.contains("85mm"));
        assert!(prompt.contains("turned towards the subject's right"));
        assert!(prompt.contains("Rembrandt"));
        assert!(prompt.contains("keep the glasses exactly as shown"));
        assert!(prompt.contains("Preserve the subject's real skin texture"));
        assert!(!prompt.contains("ZERO TOLERANCE"));
    }

    #[test]
    fn headshot_pose_cycle_alternates_then_cycles() {
        let config = guided_config(Framing::Headshot);
        let p0 = build_prompt("studio", &config, 0);
        let p1 = build_prompt("studio", &config, 1);
        let p2 = build_prompt("studio", &config, 2);
        assert!(p0.contains("subject's right"));
        assert!(p1.contains("subject's left"));
        assert!(p2.contains("shoulders square to the camera"));
    }

    #[test]
    fn framing_override_beats_mood_lighting_default() {
        let config = guided_config(Framing::Headshot);
        let prompt = build_prompt("studio", &config, 0);
        assert!(prompt.contains("key light from camera left"));
        assert!(!prompt.contains("the key light falls on the far cheek"));
    }

    #[test]
    fn full_body_landscape_zooms_out_on_a_wide_lens() {
        let mut config = guided_config(Framing::FullBody);
        config.aspect_ratio = AspectRatio::Landscape;
        let prompt = build_prompt("office lobby", &config, 0);
        assert!(prompt.contains("Zoom out significantly"));
        assert!(prompt.contains("24mm"));

        config.aspect_ratio = AspectRatio::Portrait;
        let prompt = build_prompt("office lobby", &config, 0);
        assert!(prompt.contains("35mm"));
        assert!(prompt.contains("shoes fully visible"));
    }

    #[test]
    fn waist_up_uses_rule_of_thirds_variant_cycle() {
        let config = guided_config(Framing::WaistUp);
        let p0 = build_prompt("studio", &config, 0);
        let p3 = build_prompt("studio", &config, 3);
        assert!(p0.contains("left third of the frame"));
        assert_eq!(p0, p3);
        let p1 = build_prompt("studio", &config, 1);
        assert!(p1.contains("right third of the frame"));
    }

    #[test]
    fn unspecified_framing_falls_back_to_waist_up_crop() {
        let config = guided_config(Framing::Unspecified);
        let prompt = build_prompt("studio", &config, 0);
        assert!(prompt.contains("cropped at the hips"));
    }

    #[test]
    fn expert_prompt_ignores_structured_scene_and_clothing() {
        let config = GenerationConfig {
            expert_prompt: Some("Astronaut portrait on the lunar surface".to_string()),
            clothing: "Navy blazer".to_string(),
            scene: "boardroom".to_string(),
            ..GenerationConfig::default()
        };
        let prompt = build_prompt("soft gray studio", &config, 0);
        assert!(prompt.contains("CREATIVE BRIEF"));
        assert!(prompt.contains("Astronaut portrait"));
        assert!(!prompt.contains("Clothing: Navy blazer"));
        assert!(!prompt.contains("Scene: soft gray studio"));
        assert!(prompt.contains("facial identity ONLY"));
    }

    #[test]
    fn expert_prompt_keeps_brand_color_hints() {
        let config = GenerationConfig {
            expert_prompt: Some("Editorial rooftop portrait at golden hour".to_string()),
            brand_colors: vec!["#FF6600".to_string(), "navy".to_string()],
            ..GenerationConfig::default()
        };
        let prompt = build_prompt("studio", &config, 0);
        assert!(prompt.contains("brand accent colors"));
        assert!(prompt.contains("#FF6600, navy"));
    }

    #[test]
    fn feminine_suit_suppresses_necktie_default() {
        let mut config = guided_config(Framing::WaistUp);
        config.clothing = "Suit".to_string();
        config.gender = Some(GenderPresentation::Feminine);
        let prompt = build_prompt("studio", &config, 0);
        assert!(prompt.contains("Do not add a necktie"));

        config.gender = Some(GenderPresentation::Masculine);
        let prompt = build_prompt("studio", &config, 0);
        assert!(prompt.contains("Clothing: Suit."));
    }

    #[test]
    fn daylight_window_scene_gets_key_light_carve_out() {
        let mut config = guided_config(Framing::WaistUp);
        config.mood = Mood::Daylight;
        let prompt = build_prompt("desk beside a tall window", &config, 0);
        assert!(prompt.contains("let the window act as the key light"));

        let prompt = build_prompt("plain studio", &config, 0);
        assert!(prompt.contains("Short lighting: the key light falls on the far cheek"));
    }

    #[test]
    fn build_prompt_is_byte_identical_across_calls() {
        let config = guided_config(Framing::ThreeQuarter);
        let first = build_prompt("warm loft office", &config, 7);
        let second = build_prompt("warm loft office", &config, 7);
        assert_eq!(first, second);
    }

    #[test]
    fn hex_scene_drops_generic_environment_phrase() {
        let config = guided_config(Framing::WaistUp);
        let prompt = build_prompt("backdrop #0F172A", &config, 0);
        assert!(prompt.contains("exact color #0F172A"));
        assert!(!prompt.contains("environment only"));
    }
}
