//! C4 — maps a source to `{image, video, unknown}`, used to prune profiles
//! that don't apply to the detected media type.

use serde::{Deserialize, Serialize};
use url::Url;

use crate::profile::Profile;
use crate::task::MediaType;

const IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "gif", "webp", "bmp", "tiff", "heic", "avif"];
const VIDEO_EXTENSIONS: &[&str] = &["mp4", "mov", "avi", "mkv", "webm", "m4v", "mpg", "mpeg", "3gp"];

/// What the classifier was given to work with. MIME takes priority over the
/// filename extension, which takes priority over the URL path extension.
#[derive(Debug, Clone, Default)]
pub struct ClassificationHint<'a> {
    pub declared_mime: Option<&'a str>,
    pub filename: Option<&'a str>,
    pub source_url: Option<&'a str>,
}

/// Resolved after filtering: the profiles that survive, and those dropped.
pub struct FilterOutcome {
    pub effective: Vec<Profile>,
    pub dropped: Vec<String>,
}

/// What to classify unmatched sources as, when no signal matches. Mirrors
/// `media_classifier.default_on_unknown`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DefaultOnUnknown {
    Video,
    Strict,
}

impl Default for DefaultOnUnknown {
    fn default() -> Self {
        DefaultOnUnknown::Video
    }
}

pub struct MediaClassifier {
    default_on_unknown: DefaultOnUnknown,
}

impl Default for MediaClassifier {
    fn default() -> Self {
        Self::new(DefaultOnUnknown::Video)
    }
}

impl MediaClassifier {
    pub fn new(default_on_unknown: DefaultOnUnknown) -> Self {
        Self { default_on_unknown }
    }

    pub fn classify(&self, hint: &ClassificationHint<'_>) -> MediaType {
        if let Some(mime) = hint.declared_mime {
            if let Some(media_type) = classify_mime(mime) {
                return media_type;
            }
        }
        if let Some(filename) = hint.filename {
            if let Some(media_type) = classify_extension(filename) {
                return media_type;
            }
        }
        if let Some(url) = hint.source_url {
            if let Some(media_type) = classify_url_path(url) {
                return media_type;
            }
        }
        match self.default_on_unknown {
            // Preserved for compatibility with legacy profiles that omit
            // `input_type`; see the open question this carries forward.
            DefaultOnUnknown::Video => MediaType::Video,
            DefaultOnUnknown::Strict => MediaType::Unknown,
        }
    }

    /// Keeps each profile iff its `input_type` is absent or matches `detected`.
    pub fn filter_profiles(&self, profiles: Vec<Profile>, detected: MediaType) -> FilterOutcome {
        let mut effective = Vec::with_capacity(profiles.len());
        let mut dropped = Vec::new();
        for profile in profiles {
            if profile.applies_to(detected) {
                effective.push(profile);
            } else {
                dropped.push(profile.id_profile);
            }
        }
        FilterOutcome { effective, dropped }
    }
}

fn classify_mime(mime: &str) -> Option<MediaType> {
    let top_level = mime.split('/').next()?;
    match top_level {
        "image" => Some(MediaType::Image),
        "video" => Some(MediaType::Video),
        _ => None,
    }
}

fn classify_extension(filename: &str) -> Option<MediaType> {
    let ext = filename.rsplit('.').next()?.to_ascii_lowercase();
    if IMAGE_EXTENSIONS.contains(&ext.as_str()) {
        Some(MediaType::Image)
    } else if VIDEO_EXTENSIONS.contains(&ext.as_str()) {
        Some(MediaType::Video)
    } else {
        None
    }
}

fn classify_url_path(source_url: &str) -> Option<MediaType> {
    let parsed = Url::parse(source_url).ok()?;
    let path = parsed.path();
    classify_extension(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::profile::{ImageConfig, ProfileBuilder, VideoConfig};

    #[test]
    fn mime_type_takes_priority_over_extension() {
        let classifier = MediaClassifier::default();
        let hint = ClassificationHint {
            declared_mime: Some("image/jpeg"),
            filename: Some("clip.mp4"),
            source_url: None,
        };
        assert_eq!(classifier.classify(&hint), MediaType::Image);
    }

    #[test]
    fn falls_back_to_extension_when_no_mime() {
        let classifier = MediaClassifier::default();
        let hint = ClassificationHint {
            declared_mime: None,
            filename: Some("movie.mkv"),
            source_url: None,
        };
        assert_eq!(classifier.classify(&hint), MediaType::Video);
    }

    #[test]
    fn falls_back_to_url_path_extension() {
        let classifier = MediaClassifier::default();
        let hint = ClassificationHint {
            declared_mime: None,
            filename: None,
            source_url: Some("https://cdn.example.com/assets/photo.png?sig=abc"),
        };
        assert_eq!(classifier.classify(&hint), MediaType::Image);
    }

    #[test]
    fn unmatched_source_defaults_to_video() {
        let classifier = MediaClassifier::default();
        let hint = ClassificationHint::default();
        assert_eq!(classifier.classify(&hint), MediaType::Video);
    }

    #[test]
    fn strict_mode_returns_unknown_for_unmatched_source() {
        let classifier = MediaClassifier::new(DefaultOnUnknown::Strict);
        let hint = ClassificationHint::default();
        assert_eq!(classifier.classify(&hint), MediaType::Unknown);
    }

    #[test]
    fn image_input_drops_video_only_profiles() {
        let classifier = MediaClassifier::default();
        let profiles = vec![
            ProfileBuilder::new("i1")
                .input_type(MediaType::Image)
                .image(ImageConfig { width: 100, height: 100, format: "jpeg".into(), quality: 85 })
                .build()
                .unwrap(),
            ProfileBuilder::new("v1")
                .input_type(MediaType::Video)
                .video(VideoConfig { width: 640, height: 480, codec: "h264".into(), bitrate_kbps: None, preserve_audio: true })
                .build()
                .unwrap(),
        ];
        let outcome = classifier.filter_profiles(profiles, MediaType::Image);
        assert_eq!(outcome.effective.len(), 1);
        assert_eq!(outcome.effective[0].id_profile, "i1");
        assert_eq!(outcome.dropped, vec!["v1".to_string()]);
    }
}
