use crate::models::{
    DurableObject, MP4_H264_AAC, ProcessingPipeline, StorageClass, ValidatedVideoParams,
    VideoOutput, VideoProcessingParams,
};
use serde::Serialize;
use std::borrow::Cow;
use validator::{Validate, ValidationError, ValidationErrorsKind};

pub const KEY_POINTER: &str = "/key";
pub const STORAGE_CLASS_POINTER: &str = "/storageClass";
pub const PIPELINE_POINTER: &str = "/videoProcessingParams/type";
pub const VIDEO_HEIGHT_POINTER: &str = "/videoProcessingParams/video/height";
pub const QUALITY_LEVEL_POINTER: &str = "/videoProcessingParams/video/qualityLevel";

const PARAMS_POINTER: &str = "/videoProcessingParams";

/// A single defect, tagged with a JSON pointer to the offending request field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldError {
    pub pointer: String,
    pub code: String,
    pub message: String,
}

impl std::fmt::Display for FieldError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({}): {}", self.pointer, self.code, self.message)
    }
}

/// `validator` output flattened into pointer-tagged defects, ordered by pointer.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ValidationErrors {
    errors: Vec<FieldError>,
}

impl ValidationErrors {
    /// Flattens nested `validator` errors, prefixing every pointer with `prefix`.
    pub fn from_validator(prefix: &str, errors: &validator::ValidationErrors) -> Self {
        let mut flat = Vec::new();
        flatten(prefix, errors, &mut flat);
        flat.sort_by(|a, b| a.pointer.cmp(&b.pointer));
        Self { errors: flat }
    }

    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn len(&self) -> usize {
        self.errors.len()
    }

    pub fn errors(&self) -> &[FieldError] {
        &self.errors
    }

    pub fn has_pointer(&self, pointer: &str) -> bool {
        self.errors.iter().any(|e| e.pointer == pointer)
    }
}

impl From<validator::ValidationErrors> for ValidationErrors {
    fn from(errors: validator::ValidationErrors) -> Self {
        Self::from_validator("", &errors)
    }
}

impl std::fmt::Display for ValidationErrors {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} invalid field(s)", self.errors.len())?;
        for (i, error) in self.errors.iter().enumerate() {
            let sep = if i == 0 { ": " } else { "; " };
            write!(f, "{}{}", sep, error)?;
        }
        Ok(())
    }
}

impl std::error::Error for ValidationErrors {}

fn flatten(prefix: &str, errors: &validator::ValidationErrors, out: &mut Vec<FieldError>) {
    for (field, kind) in errors.errors() {
        let pointer = format!("{}/{}", prefix, json_field_name(field));
        match kind {
            ValidationErrorsKind::Field(field_errors) => {
                out.extend(field_errors.iter().map(|e| FieldError {
                    pointer: pointer.clone(),
                    code: e.code.to_string(),
                    message: e
                        .message
                        .as_ref()
                        .map(|m| m.to_string())
                        .unwrap_or_else(|| format!("failed {} check", e.code)),
                }));
            }
            ValidationErrorsKind::Struct(nested) => flatten(&pointer, nested, out),
            ValidationErrorsKind::List(items) => {
                for (index, nested) in items {
                    flatten(&format!("{}/{}", pointer, index), nested, out);
                }
            }
        }
    }
}

/// Wire name of a struct field: `kind` is sent as `type`, everything else is camelCase.
fn json_field_name(field: &str) -> String {
    if field == "kind" {
        return "type".to_string();
    }
    let mut name = String::with_capacity(field.len());
    let mut upper = false;
    for c in field.chars() {
        if c == '_' {
            upper = true;
        } else if upper {
            name.push(c.to_ascii_uppercase());
            upper = false;
        } else {
            name.push(c);
        }
    }
    name
}

fn rejection(code: &'static str, message: String) -> ValidationError {
    let mut error = ValidationError::new(code);
    error.message = Some(Cow::Owned(message));
    error
}

fn single_error(prefix: &str, field: &'static str, error: ValidationError) -> ValidationErrors {
    let mut errors = validator::ValidationErrors::new();
    errors.add(field, error);
    ValidationErrors::from_validator(prefix, &errors)
}

/// `[A-Za-z0-9_.-]+`, not starting or ending with `.`
pub fn is_valid_key_segment(segment: &str) -> bool {
    !segment.is_empty()
        && !segment.starts_with('.')
        && !segment.ends_with('.')
        && segment
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '.' || c == '-')
}

/// Every non-empty `/`-separated segment must be a valid key segment.
pub fn validate_key_shape(key: &str) -> Result<(), ValidationError> {
    let parts: Vec<&str> = key.split('/').filter(|p| !p.is_empty()).collect();
    if parts.is_empty() {
        return Err(rejection(
            "EMPTY_KEY",
            "Key must contain at least one segment".to_string(),
        ));
    }

    let bad: Vec<String> = parts
        .into_iter()
        .filter(|part| !is_valid_key_segment(part))
        .map(|part| format!("'{}'", part))
        .collect();
    if bad.is_empty() {
        Ok(())
    } else {
        Err(rejection(
            "INVALID_KEY_SEGMENT",
            format!(
                "Key segment(s) {} must match [A-Za-z0-9_.-]+ and must not start or end with '.'",
                bad.join(", ")
            ),
        ))
    }
}

pub fn parse_storage_class(raw: &str) -> Result<StorageClass, ValidationError> {
    raw.parse::<StorageClass>().map_err(|e| {
        rejection(
            "INVALID_STORAGE_CLASS",
            format!("{}; expected FAST_ACCESS or ARCHIVAL", e),
        )
    })
}

pub fn validate_storage_class(raw: &str) -> Result<(), ValidationError> {
    parse_storage_class(raw).map(|_| ())
}

pub fn parse_pipeline(kind: &str) -> Result<ProcessingPipeline, ValidationError> {
    ProcessingPipeline::from_id(kind).ok_or_else(|| {
        rejection(
            "UNSUPPORTED_PIPELINE",
            format!("type must be '{}'", MP4_H264_AAC),
        )
    })
}

pub fn validate_pipeline(kind: &str) -> Result<(), ValidationError> {
    parse_pipeline(kind).map(|_| ())
}

#[derive(Validate)]
struct KeyInput {
    #[validate(custom(function = "validate_key_shape"))]
    key: String,
}

#[derive(Validate)]
struct WriteInput {
    #[validate(custom(function = "validate_key_shape"))]
    key: String,
    #[validate(custom(function = "validate_storage_class"))]
    storage_class: String,
}

/// Key shape only. Runs before any I/O.
pub fn validate_key(key: &str) -> Result<(), ValidationErrors> {
    KeyInput {
        key: key.to_string(),
    }
    .validate()
    .map_err(ValidationErrors::from)
}

/// Full pre-write validation: key shape plus the requested storage class.
pub fn validate_for_write(
    obj: &DurableObject,
    storage_class: &str,
) -> Result<StorageClass, ValidationErrors> {
    WriteInput {
        key: obj.key.clone(),
        storage_class: storage_class.to_string(),
    }
    .validate()?;

    parse_storage_class(storage_class).map_err(|e| single_error("", "storage_class", e))
}

/// Validates caller-supplied processing params and builds the defaulted, immutable value.
///
/// Height and quality level only fall back to their defaults when the whole
/// `video` object is absent. A partially specified `video` keeps its gaps.
pub fn validate_video_params(
    params: &VideoProcessingParams,
) -> Result<ValidatedVideoParams, ValidationErrors> {
    params
        .validate()
        .map_err(|e| ValidationErrors::from_validator(PARAMS_POINTER, &e))?;

    let pipeline =
        parse_pipeline(&params.kind).map_err(|e| single_error(PARAMS_POINTER, "kind", e))?;

    let video = match &params.video {
        None => VideoOutput::default(),
        Some(input) => VideoOutput {
            height: input.height.and_then(|h| u32::try_from(h).ok()),
            quality_level: input.quality_level.and_then(|q| u8::try_from(q).ok()),
        },
    };

    Ok(ValidatedVideoParams { pipeline, video })
}

/// True when the content type's top-level media type is `video`.
pub fn looks_like_video(content_type: &str) -> bool {
    content_type
        .parse::<mime::Mime>()
        .map(|m| m.type_() == mime::VIDEO)
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{DEFAULT_QUALITY_LEVEL, DEFAULT_VIDEO_HEIGHT, Scope, VideoSettingsInput};

    fn params(kind: &str, video: Option<VideoSettingsInput>) -> VideoProcessingParams {
        VideoProcessingParams {
            kind: kind.to_string(),
            video,
        }
    }

    #[test]
    fn test_key_segments() {
        assert!(is_valid_key_segment("a.mov"));
        assert!(is_valid_key_segment("clip_01-final"));
        assert!(!is_valid_key_segment(".hidden"));
        assert!(!is_valid_key_segment("trailing."));
        assert!(!is_valid_key_segment("with space"));
        assert!(!is_valid_key_segment("ünïcode"));
    }

    #[test]
    fn test_validate_key() {
        assert!(validate_key("videos/a.mov").is_ok());
        assert!(validate_key("//videos///a.mov/").is_ok());

        let errors = validate_key("bad key with spaces").unwrap_err();
        assert_eq!(errors.len(), 1);
        assert!(errors.has_pointer(KEY_POINTER));

        let errors = validate_key("../etc/.passwd").unwrap_err();
        assert_eq!(errors.errors()[0].code, "INVALID_KEY_SEGMENT");
        assert!(errors.errors()[0].message.contains("'..', '.passwd'"));

        let errors = validate_key("///").unwrap_err();
        assert_eq!(errors.errors()[0].code, "EMPTY_KEY");
    }

    #[test]
    fn test_validate_for_write_collects_key_and_storage_class() {
        let obj = DurableObject::provisional(&Scope::new("s"), "bad key", "text/plain");
        let errors = validate_for_write(&obj, "COLD").unwrap_err();
        assert_eq!(errors.len(), 2);
        assert!(errors.has_pointer(KEY_POINTER));
        assert!(errors.has_pointer(STORAGE_CLASS_POINTER));

        let obj = DurableObject::provisional(&Scope::new("s"), "ok.txt", "text/plain");
        assert_eq!(
            validate_for_write(&obj, "ARCHIVAL").unwrap(),
            StorageClass::Archival
        );
    }

    #[test]
    fn test_video_params_defaults_when_video_absent() {
        let validated = validate_video_params(&params(MP4_H264_AAC, None)).unwrap();
        assert_eq!(validated.pipeline, ProcessingPipeline::Mp4H264Aac);
        assert_eq!(validated.video.height, Some(DEFAULT_VIDEO_HEIGHT));
        assert_eq!(validated.video.quality_level, Some(DEFAULT_QUALITY_LEVEL));
    }

    #[test]
    fn test_video_params_partial_video_is_not_defaulted() {
        let input = VideoSettingsInput {
            height: Some(1080),
            quality_level: None,
        };
        let validated = validate_video_params(&params(MP4_H264_AAC, Some(input))).unwrap();
        assert_eq!(validated.video.height, Some(1080));
        assert_eq!(validated.video.quality_level, None);
    }

    #[test]
    fn test_video_params_batches_defects() {
        let input = VideoSettingsInput {
            height: Some(100),
            quality_level: Some(11),
        };
        let errors = validate_video_params(&params("WEBM_VP9", Some(input))).unwrap_err();
        assert_eq!(errors.len(), 3);
        assert!(errors.has_pointer(PIPELINE_POINTER));
        assert!(errors.has_pointer(VIDEO_HEIGHT_POINTER));
        assert!(errors.has_pointer(QUALITY_LEVEL_POINTER));
        assert!(errors.errors().iter().all(|e| !e.message.is_empty()));
    }

    #[test]
    fn test_video_params_range_bounds_are_inclusive() {
        let input = VideoSettingsInput {
            height: Some(2160),
            quality_level: Some(1),
        };
        assert!(validate_video_params(&params(MP4_H264_AAC, Some(input))).is_ok());

        let input = VideoSettingsInput {
            height: Some(359),
            quality_level: Some(0),
        };
        let errors = validate_video_params(&params(MP4_H264_AAC, Some(input))).unwrap_err();
        assert_eq!(errors.len(), 2);
        assert!(errors.errors().iter().all(|e| e.code == "OUT_OF_RANGE"));
    }

    #[test]
    fn test_missing_type_is_unsupported() {
        let errors = validate_video_params(&VideoProcessingParams::default()).unwrap_err();
        assert_eq!(errors.errors()[0].pointer, PIPELINE_POINTER);
        assert_eq!(errors.errors()[0].code, "UNSUPPORTED_PIPELINE");
    }

    #[test]
    fn test_json_field_name() {
        assert_eq!(json_field_name("kind"), "type");
        assert_eq!(json_field_name("quality_level"), "qualityLevel");
        assert_eq!(json_field_name("storage_class"), "storageClass");
        assert_eq!(json_field_name("height"), "height");
    }

    #[test]
    fn test_looks_like_video() {
        assert!(looks_like_video("video/quicktime"));
        assert!(looks_like_video("video/mp4; codecs=avc1"));
        assert!(!looks_like_video("audio/mpeg"));
        assert!(!looks_like_video("application/octet-stream"));
        assert!(!looks_like_video("not a mime"));
    }

    #[test]
    fn test_validation_errors_display() {
        let obj = DurableObject::provisional(&Scope::new("s"), "", "text/plain");
        let errors = validate_for_write(&obj, "COLD").unwrap_err();
        let text = errors.to_string();
        assert!(text.starts_with("2 invalid field(s): /key"));
        assert!(text.contains("; /storageClass"));
    }
}
