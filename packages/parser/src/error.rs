use thiserror::Error;

pub type ParseResult<T> = Result<T, ParseError>;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ParseError {
    #[error("Unexpected character '{ch}' at {pos}")]
    UnexpectedCharacter { pos: usize, ch: char },

    #[error("Unterminated string literal starting at {pos}")]
    UnterminatedString { pos: usize },

    #[error("Unexpected token at {pos}: expected {expected}, found {found}")]
    UnexpectedToken {
        pos: usize,
        expected: String,
        found: String,
    },

    #[error("Unexpected end of expression at {pos}: expected {expected}")]
    UnexpectedEnd { pos: usize, expected: String },

    #[error("Unexpected trailing {found} at {pos}")]
    TrailingTokens { pos: usize, found: String },

    #[error("Invalid syntax at {pos}: {message}")]
    InvalidSyntax { pos: usize, message: String },
}

impl ParseError {
    pub fn unexpected_character(pos: usize, ch: char) -> Self {
        Self::UnexpectedCharacter { pos, ch }
    }

    pub fn unterminated_string(pos: usize) -> Self {
        Self::UnterminatedString { pos }
    }

    pub fn unexpected_token(pos: usize, expected: impl Into<String>, found: impl Into<String>) -> Self {
        Self::UnexpectedToken {
            pos,
            expected: expected.into(),
            found: found.into(),
        }
    }

    pub fn unexpected_end(pos: usize, expected: impl Into<String>) -> Self {
        Self::UnexpectedEnd {
            pos,
            expected: expected.into(),
        }
    }

    pub fn trailing_tokens(pos: usize, found: impl Into<String>) -> Self {
        Self::TrailingTokens {
            pos,
            found: found.into(),
        }
    }

    pub fn invalid_syntax(pos: usize, message: impl Into<String>) -> Self {
        Self::InvalidSyntax {
            pos,
            message: message.into(),
        }
    }

    /// Byte offset into the expression source where the error was detected
    pub fn position(&self) -> usize {
        match self {
            Self::UnexpectedCharacter { pos, .. }
            | Self::UnterminatedString { pos }
            | Self::UnexpectedToken { pos, .. }
            | Self::UnexpectedEnd { pos, .. }
            | Self::TrailingTokens { pos, .. }
            | Self::InvalidSyntax { pos, .. } => *pos,
        }
    }

    /// True when the failure happened while splitting the source into tokens
    pub fn is_tokenize_error(&self) -> bool {
        matches!(
            self,
            Self::UnexpectedCharacter { .. } | Self::UnterminatedString { .. }
        )
    }

    fn label(&self) -> String {
        match self {
            Self::UnexpectedCharacter { .. } => "not part of the expression grammar".to_string(),
            Self::UnterminatedString { .. } => "string opened here is never closed".to_string(),
            Self::UnexpectedToken { expected, .. } => format!("expected {}", expected),
            Self::UnexpectedEnd { expected, .. } => format!("expected {}", expected),
            Self::TrailingTokens { .. } => "expression already complete".to_string(),
            Self::InvalidSyntax { message, .. } => message.clone(),
        }
    }
}

#[cfg(feature = "pretty-errors")]
impl ParseError {
    /// Render a plain-text (uncoloured) report pointing into `source`
    pub fn report(&self, source: &str) -> String {
        use ariadne::{Config, Label, Report, ReportKind, Source};

        let start = self.position().min(source.len());
        let end = (start + 1).min(source.len());

        let mut buffer = Vec::new();
        let written = Report::build(ReportKind::Error, (), start)
            .with_config(Config::default().with_color(false))
            .with_message(self.to_string())
            .with_label(Label::new(start..end).with_message(self.label()))
            .finish()
            .write(Source::from(source), &mut buffer);

        match written {
            Ok(()) => String::from_utf8_lossy(&buffer).into_owned(),
            Err(_) => self.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_position_and_classification() {
        let err = ParseError::unterminated_string(4);
        assert_eq!(err.position(), 4);
        assert!(err.is_tokenize_error());

        let err = ParseError::trailing_tokens(2, "identifier 'b'");
        assert!(!err.is_tokenize_error());
        assert_eq!(err.to_string(), "Unexpected trailing identifier 'b' at 2");
    }

    #[cfg(feature = "pretty-errors")]
    #[test]
    fn test_report_mentions_message() {
        let err = ParseError::unexpected_character(2, '#');
        let report = err.report("a #b");
        assert!(report.contains("Unexpected character '#' at 2"));
    }
}
