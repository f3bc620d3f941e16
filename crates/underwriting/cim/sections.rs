use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;

const DEFAULT_TITLE: &str = "Analysis";

static RATING_JSON_FENCED: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)RATING_JSON:\s*\{[\s\S]*?\}\s*---?").unwrap());
static RATING_JSON_BARE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)RATING_JSON:\s*\{[\s\S]*?\}").unwrap());
static LEADING_RATING_BLOCK: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)^\s*RATING_JSON:\s*(?:\{[\s\S]*?\}|[^\n]*\n\s*---)\s*").unwrap());
static HEADING: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(##\s+|\d{1,2}[).]\s+|[A-Z][A-Z\s/&-]{3,40}:)").unwrap());
static HEADING_PREFIX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(?:##\s+|\d{1,2}[).]\s+)").unwrap());

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct MemoSection {
    pub title: String,
    pub body: String,
}

/// Removes any machine-readable rating block the model emitted despite instructions.
pub fn strip_rating_json(text: &str) -> String {
    let without_fenced = RATING_JSON_FENCED.replace_all(text, "");
    RATING_JSON_BARE
        .replace_all(&without_fenced, "")
        .trim()
        .to_string()
}

fn heading_title(line: &str) -> String {
    let title = HEADING_PREFIX.replace(line, "");
    title.trim().trim_end_matches(':').trim().to_string()
}

/// Splits a memo into titled sections. Text before the first heading lands in "Analysis".
pub fn parse_sections(output: &str) -> Vec<MemoSection> {
    let cleaned = LEADING_RATING_BLOCK.replace(output, "").trim().to_string();

    let mut sections = Vec::new();
    let mut title = DEFAULT_TITLE.to_string();
    let mut body: Vec<&str> = Vec::new();

    fn flush(sections: &mut Vec<MemoSection>, title: &str, body: &[&str]) {
        let text = body.join("\n").trim().to_string();
        if !text.is_empty() {
            sections.push(MemoSection {
                title: title.to_string(),
                body: text,
            });
        }
    }

    for raw in cleaned.lines() {
        let line = raw.trim();
        if HEADING.is_match(line) {
            flush(&mut sections, &title, &body);
            title = heading_title(line);
            body.clear();
        } else {
            body.push(raw);
        }
    }
    flush(&mut sections, &title, &body);

    if sections.is_empty() && !cleaned.is_empty() {
        sections.push(MemoSection {
            title: DEFAULT_TITLE.to_string(),
            body: cleaned,
        });
    }

    sections
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_rating_blocks() {
        let raw = "RATING_JSON: {\"score\": 80}\n---\n## Executive Summary\nGood shop.";
        assert_eq!(strip_rating_json(raw), "## Executive Summary\nGood shop.");

        let raw = "Memo body.\nRATING_JSON: {\"score\": 80}";
        assert_eq!(strip_rating_json(raw), "Memo body.");
    }

    #[test]
    fn splits_markdown_and_numbered_headings() {
        let memo = "Intro line.\n## Executive Summary\nSolid HVAC business.\n\n2) Key Metrics\nSDE $450k\nRISKS / RED FLAGS:\nCustomer concentration.";
        let sections = parse_sections(memo);

        let titles: Vec<&str> = sections.iter().map(|s| s.title.as_str()).collect();
        assert_eq!(
            titles,
            vec!["Analysis", "Executive Summary", "Key Metrics", "RISKS / RED FLAGS"]
        );
        assert_eq!(sections[2].body, "SDE $450k");
    }

    #[test]
    fn heading_without_body_is_skipped() {
        let sections = parse_sections("## Empty\n## Filled\nsomething");
        assert_eq!(sections.len(), 1);
        assert_eq!(sections[0].title, "Filled");
    }

    #[test]
    fn plain_text_becomes_single_section() {
        let sections = parse_sections("Just a paragraph of analysis.");
        assert_eq!(
            sections,
            vec![MemoSection {
                title: "Analysis".to_string(),
                body: "Just a paragraph of analysis.".to_string(),
            }]
        );
    }

    #[test]
    fn headings_without_bodies_fall_back_to_whole_text() {
        let sections = parse_sections("## Executive Summary\n## Key Metrics");
        assert_eq!(sections.len(), 1);
        assert_eq!(sections[0].title, "Analysis");
        assert_eq!(sections[0].body, "## Executive Summary\n## Key Metrics");
    }

    #[test]
    fn empty_output_has_no_sections() {
        assert!(parse_sections("   ").is_empty());
    }
}
