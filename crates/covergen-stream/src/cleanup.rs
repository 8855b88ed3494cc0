//! Final-text cleanup applied once a letter is complete.
//!
//! Models tend to leave scaffolding in the prose: divider rules,
//! `OUTPUT 1` headings, section labels and sometimes the JSON block that
//! was supposed to travel separately. [`clean_letter`] removes those and
//! normalizes the text into paragraphs. Running it on its own output is a
//! no-op.
use once_cell::sync::Lazy;
use regex::Regex;

static DIVIDER_LINE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\s*(?:={3,}|-{3,})\s*$").expect("divider regex"));
static OUTPUT_HEADING: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)^\s*(?:#{1,6}\s*)?OUTPUT\s*\d+.*$").expect("output heading regex")
});
static STRAY_LABEL: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^\s*(?:human_proposal_text|structured_data)\s*:?\s*$").expect("label regex")
});
static PARAGRAPH_BREAK: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\n{2,}").expect("paragraph regex"));

/// One paragraph of the cleaned letter.
#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(transparent)]
pub struct Paragraph(pub String);

impl Paragraph {
    /// Lines of the paragraph; renderers keep these as hard line breaks.
    pub fn lines(&self) -> impl Iterator<Item = &str> {
        self.0.split('\n')
    }

    /// Paragraph text.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Cleaned letter in canonical form.
#[derive(Clone, Debug, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct CleanLetter {
    /// Paragraphs joined by a blank line.
    pub text: String,
    pub paragraphs: Vec<Paragraph>,
}

impl CleanLetter {
    /// True when cleanup left no paragraphs.
    pub fn is_empty(&self) -> bool {
        self.paragraphs.is_empty()
    }
}

/// Runs the full cleanup pipeline over raw letter text.
pub fn clean_letter(raw: &str) -> CleanLetter {
    let without_cr = raw.replace('\r', "");
    let filtered = strip_scaffolding_lines(&without_cr);
    // Cutting the JSON block can leave a label or rule alone on its line,
    // so the line filters run again. A cut leaves no `{` behind, so one
    // more pass is enough.
    let body = strip_scaffolding_lines(strip_trailing_json_block(filtered.trim()));
    let paragraphs: Vec<Paragraph> = PARAGRAPH_BREAK
        .split(&body)
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .map(|p| Paragraph(p.to_string()))
        .collect();
    let text = paragraphs
        .iter()
        .map(Paragraph::as_str)
        .collect::<Vec<_>>()
        .join("\n\n");
    CleanLetter { text, paragraphs }
}

/// Drops divider rules, `OUTPUT n` headings and stray section labels.
fn strip_scaffolding_lines(text: &str) -> String {
    text.split('\n')
        .filter(|line| {
            !DIVIDER_LINE.is_match(line)
                && !OUTPUT_HEADING.is_match(line)
                && !STRAY_LABEL.is_match(line)
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Removes an appended JSON block: the span from the first `{` to the last
/// `}` is cut, along with everything after it, only if it parses as JSON.
pub fn strip_trailing_json_block(text: &str) -> &str {
    let Some(first) = text.find('{') else {
        return text;
    };
    let Some(last) = text.rfind('}') else {
        return text;
    };
    if last <= first {
        return text;
    }
    if serde_json::from_str::<serde_json::Value>(&text[first..=last]).is_ok() {
        text[..first].trim()
    } else {
        text
    }
}
