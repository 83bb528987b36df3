use std::sync::LazyLock;

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use regex::Regex;

/// Replaces text that is mostly an inline base64 payload.
pub const BINARY_PLACEHOLDER: &str = "[binary content omitted]";
/// Appended to text cut at the budget.
pub const TRUNCATION_MARKER: &str = "\n[truncated]";
pub const DEFAULT_TEXT_FIELD_BUDGET: usize = 256 * 1024;

const BASE64_SAMPLE_BYTES: usize = 4096;

static DATA_URI_PREFIX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"data:[A-Za-z0-9.+-]+/[A-Za-z0-9.+-]+(?:;[A-Za-z0-9-]+=[A-Za-z0-9.-]+)*;base64,")
        .expect("data uri pattern is valid")
});

fn is_base64_byte(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b == b'+' || b == b'/' || b == b'='
}

fn base64_run(bytes: &[u8]) -> &[u8] {
    let end = bytes
        .iter()
        .position(|b| !is_base64_byte(*b))
        .unwrap_or(bytes.len());
    &bytes[..end]
}

fn sample_decodes(run: &[u8]) -> bool {
    let take = run.len().min(BASE64_SAMPLE_BYTES);
    let take = take - take % 4;
    if take == 0 {
        return false;
    }
    STANDARD.decode(&run[..take]).is_ok()
}

/// True when inline base64 data URIs make up most of the text.
pub fn looks_like_data_uri(text: &str) -> bool {
    let bytes = text.as_bytes();
    let mut payload = 0usize;
    let mut first_run_ok = None;

    for m in DATA_URI_PREFIX.find_iter(text) {
        let run = base64_run(&bytes[m.end()..]);
        if first_run_ok.is_none() {
            first_run_ok = Some(sample_decodes(run));
        }
        payload += m.len() + run.len();
    }

    first_run_ok.unwrap_or(false) && payload * 2 > bytes.len()
}

/// Caps text fields at a byte budget. A collection is cached as one value,
/// so a single oversized record would make the whole list unwritable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SanitizationGuard {
    budget: usize,
}

impl Default for SanitizationGuard {
    fn default() -> Self {
        Self::new(DEFAULT_TEXT_FIELD_BUDGET)
    }
}

impl SanitizationGuard {
    pub fn new(budget: usize) -> Self {
        Self {
            budget: budget.max(1),
        }
    }

    pub fn budget(&self) -> usize {
        self.budget
    }

    /// Largest length a sanitized field can have.
    pub fn max_sanitized_len(&self) -> usize {
        self.budget + TRUNCATION_MARKER.len()
    }

    /// Returns the replacement for `text`, or `None` when it is within budget
    /// or was already cut by an earlier pass.
    pub fn sanitize_text(&self, text: &str) -> Option<String> {
        if text.len() <= self.budget || text == BINARY_PLACEHOLDER {
            return None;
        }
        if text.ends_with(TRUNCATION_MARKER) && text.len() <= self.max_sanitized_len() {
            return None;
        }
        if looks_like_data_uri(text) {
            return Some(BINARY_PLACEHOLDER.to_string());
        }

        let mut end = self.budget;
        while !text.is_char_boundary(end) {
            end -= 1;
        }
        let mut out = String::with_capacity(end + TRUNCATION_MARKER.len());
        out.push_str(&text[..end]);
        out.push_str(TRUNCATION_MARKER);
        Some(out)
    }

    /// Sanitize in place. Returns true when the field changed.
    pub fn sanitize_field(&self, field: &mut String) -> bool {
        match self.sanitize_text(field) {
            Some(replacement) => {
                tracing::debug!(
                    original_bytes = field.len(),
                    sanitized_bytes = replacement.len(),
                    "Capped oversized text field"
                );
                *field = replacement;
                true
            }
            None => false,
        }
    }

    pub fn sanitize_optional(&self, field: &mut Option<String>) -> bool {
        field
            .as_mut()
            .map(|value| self.sanitize_field(value))
            .unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_text_is_untouched() {
        let guard = SanitizationGuard::new(16);
        assert_eq!(guard.sanitize_text("hello"), None);
        assert_eq!(guard.sanitize_text(&"x".repeat(16)), None);
    }

    #[test]
    fn million_char_text_is_truncated_with_marker() {
        let guard = SanitizationGuard::default();
        let text = "a".repeat(1_000_000);
        let out = guard.sanitize_text(&text).expect("must truncate");
        assert!(out.len() <= guard.max_sanitized_len());
        assert!(out.ends_with(TRUNCATION_MARKER));
        assert!(out.starts_with("aaaa"));
    }

    #[test]
    fn truncated_text_does_not_change_on_second_pass() {
        let guard = SanitizationGuard::new(64);
        let once = guard.sanitize_text(&"lorem ".repeat(100)).expect("truncate");
        assert_eq!(guard.sanitize_text(&once), None);

        let mut field = once.clone();
        assert!(!guard.sanitize_field(&mut field));
        assert_eq!(field, once);
    }

    #[test]
    fn truncation_respects_char_boundaries() {
        let guard = SanitizationGuard::new(5);
        // 'é' is two bytes; a cut at byte 5 would split the third one.
        let out = guard.sanitize_text("éééééé").expect("truncate");
        assert_eq!(out, format!("éé{TRUNCATION_MARKER}"));
    }

    #[test]
    fn data_uri_payload_becomes_placeholder() {
        let guard = SanitizationGuard::new(128);
        let payload = STANDARD.encode(vec![7u8; 2048]);
        let text = format!("data:image/png;base64,{payload}");
        assert!(looks_like_data_uri(&text));
        assert_eq!(
            guard.sanitize_text(&text).as_deref(),
            Some(BINARY_PLACEHOLDER)
        );
    }

    #[test]
    fn prose_mentioning_data_uri_is_truncated_not_replaced() {
        let guard = SanitizationGuard::new(128);
        let text = format!(
            "{} data:image/png;base64,AAAA {}",
            "word ".repeat(100),
            "tail ".repeat(100)
        );
        assert!(!looks_like_data_uri(&text));
        let out = guard.sanitize_text(&text).expect("truncate");
        assert!(out.ends_with(TRUNCATION_MARKER));
    }

    #[test]
    fn optional_fields_are_sanitized_when_present() {
        let guard = SanitizationGuard::new(4);
        let mut none: Option<String> = None;
        assert!(!guard.sanitize_optional(&mut none));
        let mut some = Some("abcdefgh".to_string());
        assert!(guard.sanitize_optional(&mut some));
        assert_eq!(some.as_deref(), Some("abcd\n[truncated]"));
    }
}
