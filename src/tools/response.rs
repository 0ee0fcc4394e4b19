//! Tool response formatting (spec §4.H): "a human-readable text body
//! (bounded to 8 KiB) framed with a visible header ... and, when
//! applicable, structured fields ... serialized as lines of `key:
//! value`." Error shape: "a single line beginning with an error sigil
//! followed by the failure kind and a one-line message."

const MAX_BODY_BYTES: usize = 8 * 1024;
const TRUNCATION_MARKER: &str = "... [truncated]";
const ERROR_SIGIL: char = '\u{2717}'; // a visible "x" mark, ASCII-adjacent.

#[derive(Debug, Clone, Default)]
pub struct ToolResponse {
    fields: Vec<(String, String)>,
    body: Option<String>,
}

impl ToolResponse {
    pub fn field(mut self, key: &str, value: impl ToString) -> Self {
        self.fields.push((key.to_string(), value.to_string()));
        self
    }

    pub fn body(mut self, text: impl Into<String>) -> Self {
        self.body = Some(text.into());
        self
    }

    /// Renders the header + `key: value` lines + body, truncating only the
    /// body (never the header) to stay within the 8 KiB cap.
    pub fn render(self, tool_name: &str) -> String {
        let mut out = format!("=== {tool_name} ===\n");
        for (key, value) in &self.fields {
            out.push_str(&format!("{key}: {value}\n"));
        }
        if let Some(body) = self.body {
            out.push('\n');
            out.push_str(&truncate_to_cap(&body));
        }
        out
    }
}

fn truncate_to_cap(body: &str) -> String {
    if body.len() <= MAX_BODY_BYTES {
        return body.to_string();
    }
    let budget = MAX_BODY_BYTES.saturating_sub(TRUNCATION_MARKER.len());
    let mut cut = budget.min(body.len());
    while cut > 0 && !body.is_char_boundary(cut) {
        cut -= 1;
    }
    format!("{}{}", &body[..cut], TRUNCATION_MARKER)
}

/// Single-line error shape (spec §4.H, §7: "tool responses never raise").
pub fn render_error(kind: &str, message: &str) -> String {
    format!("{ERROR_SIGIL} {kind}: {message}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn renders_header_and_fields() {
        let text = ToolResponse::default()
            .field("mode", "autonomous")
            .field("confidence", 0.9)
            .body("hello")
            .render("orchestrated_interaction");
        assert!(text.starts_with("=== orchestrated_interaction ===\n"));
        assert!(text.contains("mode: autonomous\n"));
        assert!(text.contains("confidence: 0.9\n"));
        assert!(text.ends_with("hello"));
    }

    #[test]
    fn truncates_oversized_body() {
        let huge = "x".repeat(9000);
        let text = ToolResponse::default().body(huge).render("t");
        assert!(text.len() <= MAX_BODY_BYTES + "=== t ===\n\n".len());
        assert!(text.ends_with(TRUNCATION_MARKER));
    }

    #[test]
    fn error_line_has_sigil_kind_and_message() {
        let line = render_error("HierarchyViolation", "seed cannot parent root");
        assert!(line.starts_with(ERROR_SIGIL));
        assert!(line.contains("HierarchyViolation"));
        assert!(line.contains("seed cannot parent root"));
    }
}
