//! Markdown to Slack mrkdwn.
//!
//! Code spans and fenced blocks pass through untouched; emphasis, strong and
//! strikethrough are rewritten in the rest of the text.

use std::sync::OnceLock;

use regex::Regex;

struct Rule {
    pattern: Regex,
    open: &'static str,
    close: &'static str,
    /// The match may not touch a neighbouring `*` or `_`.
    isolated: bool,
}

#[allow(clippy::expect_used)]
fn code_pattern() -> &'static Regex {
    static CODE: OnceLock<Regex> = OnceLock::new();
    CODE.get_or_init(|| Regex::new(r"(?s)```.+?```|`[^`\n]+?`").expect("valid regex"))
}

#[allow(clippy::expect_used)]
fn rules() -> &'static [Rule] {
    static RULES: OnceLock<Vec<Rule>> = OnceLock::new();
    RULES.get_or_init(|| {
        let rule = |pattern: &str, open, close, isolated| Rule {
            pattern: Regex::new(pattern).expect("valid regex"),
            open,
            close,
            isolated,
        };
        vec![
            rule(r"\*\*\*([^*\n]+?)\*\*\*", "_*", "*_", false),
            rule(r"\*([^*\n]+?)\*", "_", "_", true),
            rule(r"\*\*([^*\n]+?)\*\*", "*", "*", false),
            rule(r"__([^_\n]+?)__", "*", "*", false),
            rule(r"~~([^~\n]+?)~~", "~", "~", false),
        ]
    })
}

pub fn markdown_to_mrkdwn(content: &str) -> String {
    let mut output = String::with_capacity(content.len());
    let mut cursor = 0;

    for code in code_pattern().find_iter(content) {
        output.push_str(&convert_prose(&content[cursor..code.start()]));
        output.push_str(code.as_str());
        cursor = code.end();
    }
    output.push_str(&convert_prose(&content[cursor..]));
    output
}

fn convert_prose(text: &str) -> String {
    rules().iter().fold(text.to_owned(), |current, rule| apply(rule, &current))
}

fn apply(rule: &Rule, text: &str) -> String {
    let mut output = String::with_capacity(text.len());
    let mut copied = 0;
    let mut search_from = 0;

    while let Some(captures) = rule.pattern.captures_at(text, search_from) {
        let (Some(whole), Some(inner)) = (captures.get(0), captures.get(1)) else {
            break;
        };

        if accepts(rule, text, whole.start(), whole.end(), inner.as_str()) {
            output.push_str(&text[copied..whole.start()]);
            output.push_str(rule.open);
            output.push_str(inner.as_str());
            output.push_str(rule.close);
            copied = whole.end();
            search_from = whole.end();
        } else {
            // Retry one character later, as a lookaround-based matcher would.
            search_from = whole.start()
                + text[whole.start()..].chars().next().map(char::len_utf8).unwrap_or(1);
        }
    }

    output.push_str(&text[copied..]);
    output
}

fn accepts(rule: &Rule, text: &str, start: usize, end: usize, inner: &str) -> bool {
    let padded = inner.starts_with(char::is_whitespace) || inner.ends_with(char::is_whitespace);
    if padded {
        return false;
    }
    if !rule.isolated {
        return true;
    }

    let is_marker = |ch: char| ch == '*' || ch == '_';
    let before = text[..start].chars().next_back();
    let after = text[end..].chars().next();
    !before.is_some_and(is_marker) && !after.is_some_and(is_marker)
}
