use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub const MIN_REFERENCE_BYTES: usize = 1024;

/// Output aspect ratios supported by the generation backend. The colon form
/// is what goes on the wire; `parse` also accepts slash-delimited input.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum AspectRatio {
    #[default]
    #[serde(rename = "1:1", alias = "1/1")]
    Square,
    #[serde(rename = "16:9", alias = "16/9")]
    Landscape,
    #[serde(rename = "9:16", alias = "9/16")]
    Portrait,
    #[serde(rename = "4:5", alias = "4/5")]
    SocialPortrait,
    #[serde(rename = "3:1", alias = "3/1")]
    Banner,
    #[serde(rename = "4:1", alias = "4/1")]
    WideBanner,
}

impl AspectRatio {
    pub fn as_wire_str(&self) -> &'static str {
        match self {
            AspectRatio::Square => "1:1",
            AspectRatio::Landscape => "16:9",
            AspectRatio::Portrait => "9:16",
            AspectRatio::SocialPortrait => "4:5",
            AspectRatio::Banner => "3:1",
            AspectRatio::WideBanner => "4:1",
        }
    }

    pub fn parse(value: &str) -> Option<AspectRatio> {
        // Slash-delimited ratios from the wizard UI normalize to colon form.
        let normalized = value.trim().replace('/', ":");
        match normalized.as_str() {
            "1:1" => Some(AspectRatio::Square),
            "16:9" => Some(AspectRatio::Landscape),
            "9:16" => Some(AspectRatio::Portrait),
            "4:5" => Some(AspectRatio::SocialPortrait),
            "3:1" => Some(AspectRatio::Banner),
            "4:1" => Some(AspectRatio::WideBanner),
            _ => None,
        }
    }
}

/// How much of the subject is in frame. Unknown values from older request
/// payloads deserialize as `Unspecified` and fall back to a waist-up crop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum Framing {
    Headshot,
    #[default]
    #[serde(rename = "Waist Up")]
    WaistUp,
    #[serde(rename = "Three-Quarter")]
    ThreeQuarter,
    #[serde(rename = "Full Body")]
    FullBody,
    #[serde(other)]
    Unspecified,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum CameraAngle {
    #[default]
    #[serde(rename = "Eye Level")]
    EyeLevel,
    #[serde(rename = "High Angle")]
    HighAngle,
    #[serde(rename = "Low Angle")]
    LowAngle,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum Mood {
    #[default]
    #[serde(rename = "Polished Professional")]
    PolishedProfessional,
    Daylight,
    Cinematic,
    #[serde(rename = "Dark & Moody")]
    DarkMoody,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum RetouchLevel {
    None,
    #[default]
    Natural,
    Polished,
    Airbrushed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum GenderPresentation {
    Feminine,
    Masculine,
    Neutral,
}

fn default_true() -> bool {
    true
}

/// Full styling contract for one shot or one Look.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GenerationConfig {
    pub clothing: String,
    pub scene: String,
    pub aspect_ratio: AspectRatio,
    pub framing: Framing,
    pub camera_angle: CameraAngle,
    pub mood: Mood,
    pub retouch_level: RetouchLevel,
    pub brand_colors: Vec<String>,
    #[serde(default = "default_true")]
    pub keep_glasses: bool,
    pub body_offset: i8,
    pub expert_prompt: Option<String>,
    pub gender: Option<GenderPresentation>,
    pub age_range: Option<String>,
    pub hair_color: Option<String>,
    pub include_ring: bool,
}

// Glasses are preserved by default whether the config object is present in
// the request or absent entirely, so the struct default must agree with the
// field-level serde default.
impl Default for GenerationConfig {
    fn default() -> Self {
        GenerationConfig {
            clothing: String::new(),
            scene: String::new(),
            aspect_ratio: AspectRatio::default(),
            framing: Framing::default(),
            camera_angle: CameraAngle::default(),
            mood: Mood::default(),
            retouch_level: RetouchLevel::default(),
            brand_colors: Vec::new(),
            keep_glasses: true,
            body_offset: 0,
            expert_prompt: None,
            gender: None,
            age_range: None,
            hair_color: None,
            include_ring: false,
        }
    }
}

impl GenerationConfig {
    /// Expert mode and guided mode are mutually exclusive prompt sources.
    pub fn expert_text(&self) -> Option<&str> {
        self.expert_prompt
            .as_deref()
            .map(str::trim)
            .filter(|text| !text.is_empty())
    }

    pub fn clamped_body_offset(&self) -> i8 {
        self.body_offset.clamp(-3, 3)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReferenceImage {
    #[serde(skip)]
    pub bytes: Vec<u8>,
    pub mime_type: String,
}

impl ReferenceImage {
    pub fn new(bytes: Vec<u8>, mime_type: String) -> Self {
        Self { bytes, mime_type }
    }
}

/// Role-tagged reference photos. `main` is the sole source of facial
/// identity; the optional roles improve angle and body accuracy.
#[derive(Debug, Clone, Default)]
pub struct ReferenceSet {
    pub main: Option<ReferenceImage>,
    pub side_left: Option<ReferenceImage>,
    pub side_right: Option<ReferenceImage>,
    pub full_body: Option<ReferenceImage>,
    pub background: Option<ReferenceImage>,
}

impl ReferenceSet {
    pub fn has_optional(&self) -> bool {
        self.side_left.is_some()
            || self.side_right.is_some()
            || self.full_body.is_some()
            || self.background.is_some()
    }

    /// Retry fallback set: identity reference only.
    pub fn main_only(&self) -> ReferenceSet {
        ReferenceSet {
            main: self.main.clone(),
            ..ReferenceSet::default()
        }
    }

    /// Rejects a missing main reference or one whose payload is too small to
    /// be a real photo (corrupt or truncated upload).
    pub fn validate(&self) -> Result<&ReferenceImage, crate::llm::GenerationError> {
        match &self.main {
            Some(main) if main.bytes.len() >= MIN_REFERENCE_BYTES => Ok(main),
            _ => Err(crate::llm::GenerationError::InvalidMainReference),
        }
    }
}

/// A named, reusable styling bundle that expands into `image_count` shots.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Look {
    pub name: String,
    pub clothing: Option<String>,
    pub scene: Option<String>,
    pub image_count: u32,
    pub variation_level: u8,
    pub body_offset: Option<i8>,
}

impl Default for Look {
    fn default() -> Self {
        Look {
            name: String::new(),
            clothing: None,
            scene: None,
            image_count: 1,
            variation_level: 1,
            body_offset: None,
        }
    }
}

/// Overlay Look-specific overrides onto the batch-wide shared config.
pub fn merged_config(shared: &GenerationConfig, look: &Look) -> GenerationConfig {
    let mut config = shared.clone();
    if let Some(clothing) = &look.clothing {
        config.clothing = clothing.clone();
    }
    if let Some(scene) = &look.scene {
        config.scene = scene.clone();
    }
    if let Some(offset) = look.body_offset {
        config.body_offset = offset;
    }
    config
}

#[derive(Debug, Clone, Serialize)]
pub struct GeneratedImage {
    pub id: String,
    #[serde(skip)]
    pub bytes: Vec<u8>,
    pub display_name: String,
    pub look_name: String,
    pub created_at: DateTime<Utc>,
    pub aspect_ratio: AspectRatio,
    pub was_refined: bool,
}

/// One batch request as submitted by the caller: reference image sources,
/// the shared config, and the ordered Look list.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchRequest {
    pub references: ReferenceManifest,
    #[serde(default)]
    pub config: GenerationConfig,
    pub looks: Vec<Look>,
}

impl BatchRequest {
    pub fn total_shots(&self) -> u32 {
        self.looks.iter().map(|look| look.image_count).sum()
    }
}

/// File paths or HTTP(S) URLs for each reference role.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ReferenceManifest {
    pub main: Option<String>,
    pub side_left: Option<String>,
    pub side_right: Option<String>,
    pub full_body: Option<String>,
    pub background: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn aspect_ratio_parse_normalizes_slash_form() {
        assert_eq!(AspectRatio::parse("16/9"), Some(AspectRatio::Landscape));
        assert_eq!(AspectRatio::parse(" 9:16 "), Some(AspectRatio::Portrait));
        assert_eq!(AspectRatio::parse("2:3"), None);
    }

    #[test]
    fn unknown_framing_deserializes_to_unspecified() {
        let framing: Framing = serde_json::from_str("\"Extreme Close-Up\"").unwrap();
        assert_eq!(framing, Framing::Unspecified);
    }

    #[test]
    fn keep_glasses_defaults_to_preserve() {
        let config: GenerationConfig = serde_json::from_str("{}").unwrap();
        assert!(config.keep_glasses);
        assert!(GenerationConfig::default().keep_glasses);
    }

    #[test]
    fn request_without_config_object_preserves_glasses() {
        let request: BatchRequest = serde_json::from_str(
            r#"{ "references": { "main": "face.jpg" }, "looks": [{ "name": "Studio" }] }"#,
        )
        .unwrap();
        assert!(request.config.keep_glasses);
    }

    #[test]
    fn blank_expert_prompt_is_not_expert_mode() {
        let config = GenerationConfig {
            expert_prompt: Some("   ".to_string()),
            ..GenerationConfig::default()
        };
        assert!(config.expert_text().is_none());
    }

    #[test]
    fn look_overrides_replace_shared_fields() {
        let shared = GenerationConfig {
            clothing: "Navy suit".to_string(),
            scene: "Studio".to_string(),
            ..GenerationConfig::default()
        };
        let look = Look {
            name: "Boardroom".to_string(),
            scene: Some("Modern boardroom".to_string()),
            body_offset: Some(-1),
            ..Look::default()
        };
        let merged = merged_config(&shared, &look);
        assert_eq!(merged.clothing, "Navy suit");
        assert_eq!(merged.scene, "Modern boardroom");
        assert_eq!(merged.body_offset, -1);
    }

    #[test]
    fn reference_set_rejects_undersized_main() {
        let refs = ReferenceSet {
            main: Some(ReferenceImage::new(vec![0u8; 64], "image/png".to_string())),
            ..ReferenceSet::default()
        };
        assert!(refs.validate().is_err());
        assert!(ReferenceSet::default().validate().is_err());
    }
}
