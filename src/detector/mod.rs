//! Pattern-based detection of sensitive data and injection payloads.
//!
//! The [`Detector`] is stateless after construction: it runs every category
//! matcher in [`Category::ALL`] order and aggregates all findings, so the same
//! text and ruleset version always produce the same list.

mod category;
mod patterns;
mod validators;

pub use category::{Category, Severity};

use crate::{Error, Result};

use regex::Regex;
use serde::{Deserialize, Serialize};

/// A byte range in the scanned text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Span {
    /// Inclusive start offset
    pub start: usize,
    /// Exclusive end offset
    pub end: usize,
}

impl Span {
    /// Create a new span.
    pub fn new(start: usize, end: usize) -> Self {
        Self { start, end }
    }

    /// Length in bytes.
    pub fn len(&self) -> usize {
        self.end - self.start
    }

    /// Whether the span is empty.
    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }

    /// Whether two spans share at least one byte.
    pub fn overlaps(&self, other: &Span) -> bool {
        self.start < other.end && other.start < self.end
    }

    pub(crate) fn slice<'a>(&self, text: &'a str) -> &'a str {
        &text[self.start..self.end]
    }
}

/// One detected issue. Never mutated after creation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Finding {
    /// Category of the finding
    pub category: Category,
    /// Where in the text it was found
    pub span: Span,
    /// Severity of the category
    pub severity: Severity,
    /// Matched text with all but the last four alphanumerics masked
    pub redacted: String,
}

impl Finding {
    fn new(category: Category, span: Span, text: &str) -> Self {
        Self {
            category,
            span,
            severity: category.severity(),
            redacted: redact(span.slice(text)),
        }
    }
}

/// Mask a matched token, keeping separators and the last four alphanumerics.
pub fn redact(token: &str) -> String {
    let alnum = token.chars().filter(|c| c.is_alphanumeric()).count();
    let keep_from = alnum.saturating_sub(4);
    let mut seen = 0;
    token
        .chars()
        .map(|c| {
            if c.is_alphanumeric() {
                seen += 1;
                if seen > keep_from {
                    c
                } else {
                    '*'
                }
            } else {
                c
            }
        })
        .collect()
}

struct CategoryMatcher {
    category: Category,
    regexes: Vec<Regex>,
    validator: Option<validators::Validator>,
}

impl CategoryMatcher {
    /// Collect validated matches of `re`.
    ///
    /// A rejected match does not consume its text: the longest valid prefix
    /// ending at a separator is tried, then scanning resumes at the next token
    /// inside the rejected match, so a long run of digits cannot hide a valid
    /// identifier.
    fn scan(&self, re: &Regex, text: &str, out: &mut Vec<Span>) {
        let mut at = 0;
        while at <= text.len() {
            let Some(m) = re.find_at(text, at) else {
                break;
            };
            let span = Span::new(m.start(), m.end());
            match self.accept(text, span) {
                Some(found) if found.end > at => {
                    out.push(found);
                    at = found.end;
                }
                Some(found) => {
                    out.push(found);
                    at = next_char(text, at);
                }
                None => at = next_token(text, span),
            }
        }
    }

    fn accept(&self, text: &str, span: Span) -> Option<Span> {
        let Some(valid) = self.validator else {
            return Some(span);
        };
        if valid(text, span) {
            return Some(span);
        }
        let bytes = text.as_bytes();
        (span.start + 1..span.end)
            .rev()
            .filter(|&i| !bytes[i].is_ascii_alphanumeric() && bytes[i - 1].is_ascii_alphanumeric())
            .map(|i| Span::new(span.start, i))
            .find(|prefix| valid(text, *prefix))
    }
}

/// Byte offset of the next char after `at`.
fn next_char(text: &str, at: usize) -> usize {
    text[at..].chars().next().map_or(text.len() + 1, |c| at + c.len_utf8())
}

/// Start of the first token inside `span` after its first one, or `span.end`.
fn next_token(text: &str, span: Span) -> usize {
    let mut previous_alnum = true;
    for (offset, c) in span.slice(text).char_indices() {
        let alnum = c.is_alphanumeric();
        if offset > 0 && alnum && !previous_alnum {
            return span.start + offset;
        }
        previous_alnum = alnum;
    }
    span.end.max(next_char(text, span.start))
}

/// Stateless scanner over the fixed category set.
pub struct Detector {
    matchers: Vec<CategoryMatcher>,
}

impl Detector {
    /// Version of the compiled pattern table, stamped on every context.
    pub const RULESET_VERSION: &'static str = "2025.2";

    /// Compile the pattern table.
    pub fn new() -> Result<Self> {
        let matchers = patterns::pattern_sets()
            .into_iter()
            .map(|set| {
                let regexes = set
                    .patterns
                    .iter()
                    .map(|p| {
                        Regex::new(p).map_err(|e| {
                            Error::internal(format!(
                                "Invalid {} pattern {}: {}",
                                set.category, p, e
                            ))
                        })
                    })
                    .collect::<Result<Vec<_>>>()?;
                Ok(CategoryMatcher {
                    category: set.category,
                    regexes,
                    validator: set.validator,
                })
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self { matchers })
    }

    /// Scan `text` and return every finding in category order, then offset order.
    pub fn detect(&self, text: &str) -> Vec<Finding> {
        let mut findings = Vec::new();

        for matcher in &self.matchers {
            let mut candidates = Vec::new();
            for re in &matcher.regexes {
                matcher.scan(re, text, &mut candidates);
            }

            findings.extend(
                dedup_spans(candidates)
                    .into_iter()
                    .map(|span| Finding::new(matcher.category, span, text)),
            );
        }

        findings
    }

    /// Categories this detector scans for, in order.
    pub fn categories(&self) -> impl Iterator<Item = Category> + '_ {
        self.matchers.iter().map(|m| m.category)
    }
}

/// Collapse overlapping spans of one category, preferring the earliest and
/// then the longest match.
fn dedup_spans(mut spans: Vec<Span>) -> Vec<Span> {
    spans.sort_by(|a, b| a.start.cmp(&b.start).then(b.len().cmp(&a.len())));

    let mut kept: Vec<Span> = Vec::with_capacity(spans.len());
    for span in spans {
        if kept.last().map_or(true, |last| !last.overlaps(&span)) {
            kept.push(span);
        }
    }
    kept
}
