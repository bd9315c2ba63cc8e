use anyhow::{Result, anyhow};

/// Characters that are never allowed inside a staging or device path segment
const RESERVED_CHARS: &[char] = &['/', '\\', ':', '*', '?', '"', '<', '>', '|', ';'];

#[derive(Debug, Clone)]
pub struct ValidationError {
    pub code: &'static str,
    pub message: String,
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.code, self.message)
    }
}

impl std::error::Error for ValidationError {}

/// Validates a single path segment (ItemId or file name) before it is joined
/// onto the staging root or the device destination root.
///
/// Unlike upload filenames these are never rewritten: a segment that would
/// need sanitizing is rejected so local and device paths keep mirroring each
/// other.
pub fn validate_path_segment(segment: &str) -> Result<()> {
    if segment.is_empty() {
        return Err(anyhow!(ValidationError {
            code: "EMPTY_SEGMENT",
            message: "Path segment cannot be empty".to_string(),
        }));
    }

    if segment == "." || segment == ".." {
        tracing::warn!("Path traversal attempt detected: {}", segment);
        return Err(anyhow!(ValidationError {
            code: "PATH_TRAVERSAL",
            message: format!("Path segment '{}' is not allowed", segment),
        }));
    }

    if let Some(c) = segment
        .chars()
        .find(|c| c.is_control() || RESERVED_CHARS.contains(c))
    {
        return Err(anyhow!(ValidationError {
            code: "INVALID_CHARACTER",
            message: format!("Path segment '{}' contains reserved character {:?}", segment, c),
        }));
    }

    if segment.len() > 255 {
        return Err(anyhow!(ValidationError {
            code: "SEGMENT_TOO_LONG",
            message: format!("Path segment is {} bytes, maximum is 255", segment.len()),
        }));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_path_segment() {
        assert!(validate_path_segment("123").is_ok());
        assert!(validate_path_segment("image1.png").is_ok());
        assert!(validate_path_segment("测试.jpg").is_ok());

        assert!(validate_path_segment("").is_err());
        assert!(validate_path_segment(".").is_err());
        assert!(validate_path_segment("..").is_err());
        assert!(validate_path_segment("a/b").is_err());
        assert!(validate_path_segment("a\\b").is_err());
        assert!(validate_path_segment("name;rm -rf").is_err());
        assert!(validate_path_segment("tab\tname").is_err());
        assert!(validate_path_segment(&"x".repeat(256)).is_err());
    }

    #[test]
    fn test_validation_error_code() {
        let err = validate_path_segment("..").unwrap_err();
        let validation = err.downcast_ref::<ValidationError>().unwrap();
        assert_eq!(validation.code, "PATH_TRAVERSAL");
    }
}
