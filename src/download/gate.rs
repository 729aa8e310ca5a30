//! Admission gate over declared size and content type.
//!
//! The gate is a pure decision function. It runs at two points for every
//! URL: on the optional HEAD probe (early exit before the body is fetched)
//! and on the headers of the full GET response, which are authoritative.

use std::fmt;

use reqwest::header::{CONTENT_LENGTH, CONTENT_TYPE, HeaderMap};

use crate::config::PipelineConfig;

/// Metadata the gate decides on, taken from response headers.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResponseMeta {
    /// Declared `Content-Length`, if present and numeric.
    pub content_length: Option<u64>,
    /// Declared `Content-Type`, verbatim.
    pub content_type: Option<String>,
}

impl ResponseMeta {
    /// Creates metadata from explicit values.
    pub fn new(content_length: Option<u64>, content_type: Option<&str>) -> Self {
        Self {
            content_length,
            content_type: content_type.map(ToString::to_string),
        }
    }

    /// Extracts metadata from response headers.
    #[must_use]
    pub fn from_headers(headers: &HeaderMap) -> Self {
        let content_length = headers
            .get(CONTENT_LENGTH)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.trim().parse::<u64>().ok());
        let content_type = headers
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(ToString::to_string);
        Self {
            content_length,
            content_type,
        }
    }

    /// Returns the media type without parameters, lowercased.
    #[must_use]
    pub fn media_type(&self) -> Option<String> {
        self.content_type.as_deref().map(normalize_media_type)
    }
}

/// Why the gate refused a URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Rejection {
    /// Declared or received size is at or above the configured maximum.
    TooLarge {
        /// Size that tripped the limit.
        size: u64,
        /// Configured maximum (exclusive).
        max: u64,
    },
    /// Content type missing or outside the allow-list.
    WrongContentType {
        /// The offending declared type, if any.
        content_type: Option<String>,
    },
}

impl fmt::Display for Rejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::TooLarge { size, max } => {
                write!(f, "file too large ({size} bytes, limit {max})")
            }
            Self::WrongContentType {
                content_type: Some(ct),
            } => write!(f, "content type not allowed: {ct}"),
            Self::WrongContentType { content_type: None } => {
                write!(f, "content type missing")
            }
        }
    }
}

/// Admission predicate: size strictly below the maximum and an allow-listed type.
#[derive(Debug, Clone)]
pub struct Gate {
    max_size: u64,
    allowed: Vec<String>,
}

impl Gate {
    /// Creates a gate with the given exclusive size limit and content-type allow-list.
    pub fn new<I, S>(max_size: u64, allowed_content_types: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let allowed = allowed_content_types
            .into_iter()
            .map(|ct| normalize_media_type(ct.as_ref()))
            .filter(|ct| !ct.is_empty())
            .collect();
        Self { max_size, allowed }
    }

    /// Builds the gate described by a pipeline config.
    #[must_use]
    pub fn from_config(config: &PipelineConfig) -> Self {
        Self::new(config.max_file_size, &config.allowed_content_types)
    }

    /// Returns the exclusive size limit.
    #[must_use]
    pub fn max_size(&self) -> u64 {
        self.max_size
    }

    /// Rejects sizes at or above the limit.
    ///
    /// # Errors
    ///
    /// Returns [`Rejection::TooLarge`] when `size >= max_size`.
    pub fn check_size(&self, size: u64) -> Result<(), Rejection> {
        if size >= self.max_size {
            return Err(Rejection::TooLarge {
                size,
                max: self.max_size,
            });
        }
        Ok(())
    }

    /// Checks one set of response metadata.
    ///
    /// A missing `Content-Length` is not a rejection on its own; the body
    /// fetch enforces the limit on the bytes actually received.
    ///
    /// # Errors
    ///
    /// Returns the first [`Rejection`] found, size before content type.
    pub fn check(&self, meta: &ResponseMeta) -> Result<(), Rejection> {
        if let Some(size) = meta.content_length {
            self.check_size(size)?;
        }
        match meta.media_type() {
            Some(media) if self.allowed.iter().any(|allowed| *allowed == media) => Ok(()),
            _ => Err(Rejection::WrongContentType {
                content_type: meta.content_type.clone(),
            }),
        }
    }

    /// Full two-point decision: the probe (when one was obtained) and then the body headers.
    ///
    /// # Errors
    ///
    /// Returns the rejection from whichever evaluation point failed first.
    pub fn admit(&self, probe: Option<&ResponseMeta>, body: &ResponseMeta) -> Result<(), Rejection> {
        if let Some(probe) = probe {
            self.check(probe)?;
        }
        self.check(body)
    }
}

fn normalize_media_type(raw: &str) -> String {
    raw.split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase()
}
