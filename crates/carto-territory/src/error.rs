//! Error types for territory expressions
//!
//! Every failure carries the source fragment or builder value that could not
//! be understood, so callers can point users at the offending text.

/// Maximum fragment length kept in error messages
const FRAGMENT_LIMIT: usize = 120;

/// Errors raised while parsing, serializing or converting expressions
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ExpressionError {
    /// Text does not form a recognised territory expression
    #[error("malformed expression `{fragment}`: {message}")]
    Malformed { fragment: String, message: String },

    /// Group nesting exceeded the configured limit
    #[error("expression nested deeper than {limit} levels at `{fragment}`")]
    DepthExceeded { limit: usize, fragment: String },

    /// Host-language syntax error
    #[error("syntax error on line {line}: `{fragment}`")]
    Syntax { fragment: String, line: usize },

    /// Builder JSON does not follow the territory schema
    #[error("invalid builder value: {0}")]
    InvalidBuilder(String),

    /// Polygon value is not a list of `[lat, lng]` pairs
    #[error("invalid polygon `{fragment}`: {message}")]
    InvalidPolygon { fragment: String, message: String },

    /// The host grammar could not be loaded
    #[error("grammar error: {0}")]
    Grammar(String),
}

impl ExpressionError {
    /// Create malformed expression error
    pub fn malformed(fragment: impl AsRef<str>, message: impl Into<String>) -> Self {
        Self::Malformed {
            fragment: clip(fragment.as_ref()),
            message: message.into(),
        }
    }

    /// Create depth limit error
    pub fn depth_exceeded(limit: usize, fragment: impl AsRef<str>) -> Self {
        Self::DepthExceeded {
            limit,
            fragment: clip(fragment.as_ref()),
        }
    }

    /// Create syntax error
    pub fn syntax(fragment: impl AsRef<str>, line: usize) -> Self {
        Self::Syntax {
            fragment: clip(fragment.as_ref()),
            line,
        }
    }

    /// Create invalid polygon error
    pub fn invalid_polygon(fragment: impl AsRef<str>, message: impl Into<String>) -> Self {
        Self::InvalidPolygon {
            fragment: clip(fragment.as_ref()),
            message: message.into(),
        }
    }

    /// True for errors caused by user input rather than the environment
    #[inline]
    #[must_use]
    pub fn is_user_error(&self) -> bool {
        !matches!(self, Self::Grammar(_))
    }

    /// The offending fragment, when there is one
    #[must_use]
    pub fn fragment(&self) -> Option<&str> {
        match self {
            Self::Malformed { fragment, .. }
            | Self::DepthExceeded { fragment, .. }
            | Self::Syntax { fragment, .. }
            | Self::InvalidPolygon { fragment, .. } => Some(fragment),
            Self::InvalidBuilder(_) | Self::Grammar(_) => None,
        }
    }
}

fn clip(fragment: &str) -> String {
    let trimmed = fragment.trim();
    if trimmed.chars().count() <= FRAGMENT_LIMIT {
        return trimmed.to_string();
    }
    let mut out: String = trimmed.chars().take(FRAGMENT_LIMIT).collect();
    out.push('…');
    out
}

/// Result type alias for expression operations
pub type ExpressionResult<T> = Result<T, ExpressionError>;
