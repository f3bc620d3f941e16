use serde::Deserialize;

/// Longest CIM text forwarded to the model.
pub const MAX_CIM_CHARS: usize = 200_000;

pub const MEMO_HEADINGS: &[&str] = &[
    "Executive Summary",
    "Key Metrics",
    "Business Overview",
    "Financial Quality",
    "Customers & Concentration",
    "Operations & Owner Dependency",
    "Risks / Red Flags",
    "Diligence Questions",
    "Deal Structure Thoughts",
    "Investment Memo",
];

#[derive(Debug, Default, Clone, Copy, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum MemoMode {
    Fast,
    #[default]
    Deep,
}

impl MemoMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            MemoMode::Fast => "fast",
            MemoMode::Deep => "deep",
        }
    }

    /// Anything other than `fast` runs the deep memo.
    pub fn parse(value: &str) -> Self {
        if value.trim().eq_ignore_ascii_case("fast") {
            MemoMode::Fast
        } else {
            MemoMode::Deep
        }
    }
}

/// Truncates on a char boundary.
pub fn truncate_chars(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

pub fn build_memo_prompt(text: &str, mode: MemoMode) -> String {
    let headings = MEMO_HEADINGS
        .iter()
        .map(|heading| format!("## {heading}"))
        .collect::<Vec<_>>()
        .join("\n");

    format!(
        "You are an M&A underwriter. Produce a concise underwriting memo.\n\
         \n\
         Rules:\n\
         - Do NOT output a score, grade, or verdict.\n\
         - Do NOT output JSON and never include a RATING_JSON block.\n\
         - Output only the memo sections below, in order, using these exact headings:\n\
         \n\
         {headings}\n\
         \n\
         Mode: {mode}\n\
         \n\
         CIM TEXT:\n\
         {text}",
        mode = mode.as_str(),
        text = truncate_chars(text, MAX_CIM_CHARS),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prompt_contains_headings_mode_and_text() {
        let prompt = build_memo_prompt("Landscaping company, SDE $300k", MemoMode::Fast);
        assert!(prompt.starts_with("You are an M&A underwriter."));
        assert!(prompt.contains("## Customers & Concentration\n## Operations & Owner Dependency"));
        assert!(prompt.contains("Mode: fast"));
        assert!(prompt.ends_with("CIM TEXT:\nLandscaping company, SDE $300k"));
    }

    #[test]
    fn mode_defaults_to_deep() {
        assert_eq!(MemoMode::parse("FAST"), MemoMode::Fast);
        assert_eq!(MemoMode::parse("thorough"), MemoMode::Deep);
        assert_eq!(MemoMode::default(), MemoMode::Deep);
    }

    #[test]
    fn truncation_respects_char_boundaries() {
        assert_eq!(truncate_chars("héllo", 2), "hé");
        assert_eq!(truncate_chars("abc", 10), "abc");
    }
}
