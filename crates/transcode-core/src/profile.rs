//! Profile definitions: what a caller asks for, and the typed, closed-field
//! configuration each output type accepts.

use serde::{Deserialize, Serialize};

use crate::task::MediaType;

/// One desired output variant.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Profile {
    pub id_profile: String,
    pub output_type: OutputType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub input_type: Option<MediaType>,
    pub config: ProfileConfig,
}

impl Profile {
    /// True if this profile should be dispatched against media of `detected`.
    pub fn applies_to(&self, detected: MediaType) -> bool {
        match self.input_type {
            None => true,
            Some(expected) => expected == detected,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutputType {
    Video,
    Image,
    Gif,
    Webp,
}

impl std::fmt::Display for OutputType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            OutputType::Video => "video",
            OutputType::Image => "image",
            OutputType::Gif => "gif",
            OutputType::Webp => "webp",
        };
        f.write_str(s)
    }
}

/// Tagged, closed-field-set configuration, one variant per `output_type`.
/// Unknown fields are rejected rather than silently dropped, since the
/// upstream system's open dictionaries are exactly the ambiguity this design
/// replaces with a schema.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case", deny_unknown_fields)]
pub enum ProfileConfig {
    Video(VideoConfig),
    Image(ImageConfig),
    Gif(GifConfig),
    Webp(WebpConfig),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct VideoConfig {
    pub width: u32,
    pub height: u32,
    #[serde(default = "default_video_codec")]
    pub codec: String,
    #[serde(default)]
    pub bitrate_kbps: Option<u32>,
    #[serde(default = "default_true")]
    pub preserve_audio: bool,
}

fn default_video_codec() -> String {
    "h264".into()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ImageConfig {
    pub width: u32,
    pub height: u32,
    #[serde(default = "default_image_format")]
    pub format: String,
    #[serde(default = "default_quality")]
    pub quality: u8,
}

fn default_image_format() -> String {
    "jpeg".into()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct GifConfig {
    pub width: u32,
    pub height: u32,
    #[serde(default = "default_fps")]
    pub fps: u8,
    #[serde(default)]
    pub max_duration_secs: Option<f32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct WebpConfig {
    pub width: u32,
    pub height: u32,
    #[serde(default = "default_quality")]
    pub quality: u8,
    #[serde(default)]
    pub animated: bool,
}

fn default_true() -> bool {
    true
}
fn default_quality() -> u8 {
    85
}
fn default_fps() -> u8 {
    15
}

/// `{base_path, folder_structure}` with `{task_id}`/`{profile_id}` placeholders.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct S3Layout {
    pub base_path: String,
    pub folder_structure: String,
}

impl S3Layout {
    /// Must reference both placeholders; this is checked at admission.
    pub fn is_valid(&self) -> bool {
        self.folder_structure.contains("{task_id}") && self.folder_structure.contains("{profile_id}")
    }

    /// Renders the output layout template for one profile.
    pub fn render(&self, task_id: &str, profile_id: &str) -> String {
        let rendered = self
            .folder_structure
            .replace("{task_id}", task_id)
            .replace("{profile_id}", profile_id);
        format!("{}/{}", self.base_path.trim_end_matches('/'), rendered)
    }
}

/// Face-detection request, carried alongside the profile list.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FaceDetectionConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_similarity_threshold")]
    pub similarity_threshold: f32,
    #[serde(default = "default_min_faces_in_group")]
    pub min_faces_in_group: u32,
    #[serde(default = "default_sample_interval")]
    pub sample_interval: f32,
    #[serde(default = "default_detector_score_threshold")]
    pub detector_score_threshold: f32,
    #[serde(default = "default_avatar_size")]
    pub avatar_size: u32,
    #[serde(default = "default_quality")]
    pub avatar_quality: u8,
}

fn default_similarity_threshold() -> f32 {
    0.6
}
fn default_min_faces_in_group() -> u32 {
    1
}
fn default_sample_interval() -> f32 {
    1.0
}
fn default_detector_score_threshold() -> f32 {
    0.5
}
fn default_avatar_size() -> u32 {
    256
}

/// Fluent construction for tests and the CLI's `submit` command, in the
/// teacher's `AgentBuilder` style.
#[derive(Debug, Default)]
pub struct ProfileBuilder {
    id_profile: Option<String>,
    output_type: Option<OutputType>,
    input_type: Option<MediaType>,
    config: Option<ProfileConfig>,
}

impl ProfileBuilder {
    pub fn new(id_profile: impl Into<String>) -> Self {
        Self {
            id_profile: Some(id_profile.into()),
            ..Default::default()
        }
    }

    pub fn input_type(mut self, input_type: MediaType) -> Self {
        self.input_type = Some(input_type);
        self
    }

    pub fn video(mut self, config: VideoConfig) -> Self {
        self.output_type = Some(OutputType::Video);
        self.config = Some(ProfileConfig::Video(config));
        self
    }

    pub fn image(mut self, config: ImageConfig) -> Self {
        self.output_type = Some(OutputType::Image);
        self.config = Some(ProfileConfig::Image(config));
        self
    }

    pub fn gif(mut self, config: GifConfig) -> Self {
        self.output_type = Some(OutputType::Gif);
        self.config = Some(ProfileConfig::Gif(config));
        self
    }

    pub fn webp(mut self, config: WebpConfig) -> Self {
        self.output_type = Some(OutputType::Webp);
        self.config = Some(ProfileConfig::Webp(config));
        self
    }

    pub fn build(self) -> Result<Profile, String> {
        Ok(Profile {
            id_profile: self.id_profile.ok_or("id_profile is required")?,
            output_type: self.output_type.ok_or("an output config is required")?,
            input_type: self.input_type,
            config: self.config.ok_or("an output config is required")?,
        })
    }
}
