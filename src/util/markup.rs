use regex::{Captures, Regex};
use std::sync::LazyLock;

static HEADING: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?m)^h([0-9])\.").expect("valid regex"));
static CODE_WITH_LANG: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r" *\{code:([a-z]+)\}").expect("valid regex"));
static CODE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r" *\{code[^}]*\}").expect("valid regex"));
static NOFORMAT: LazyLock<Regex> = LazyLock::new(|| Regex::new(r" *\{noformat\}").expect("valid regex"));
static QUOTE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)\{quote\}\n+(.*?)\n\{quote\}\n*").expect("valid regex"));

/// An inline markup pair, e.g. `*bold*` -> `**bold**`.
struct SpanRule {
    leader: &'static str,
    trailer: &'static str,
    out_leader: &'static str,
    out_trailer: &'static str,
}

// Order matters: later rules must not re-match what earlier ones produced.
const SPAN_RULES: &[SpanRule] = &[
    SpanRule { leader: "*", trailer: "*", out_leader: "**", out_trailer: "**" },
    SpanRule { leader: "{{", trailer: "}}", out_leader: "`", out_trailer: "`" },
    SpanRule { leader: "??", trailer: "??", out_leader: "<cite>", out_trailer: "</cite>" },
    SpanRule { leader: "+", trailer: "+", out_leader: "<ins>", out_trailer: "</ins>" },
    SpanRule { leader: "^", trailer: "^", out_leader: "<sup>", out_trailer: "</sup>" },
    SpanRule { leader: "~", trailer: "~", out_leader: "<sub>", out_trailer: "</sub>" },
    SpanRule { leader: "-", trailer: "-", out_leader: "~~", out_trailer: "~~" },
];

/// Convert Jira wiki markup to GitHub-flavoured markdown.
///
/// Only well-formed token pairs are rewritten; anything else passes through verbatim.
pub fn jira_to_markdown(text: Option<&str>) -> String {
    let Some(text) = text else {
        return String::new();
    };

    let mut out = text.replace("\r\n", "\n");

    // zero-width space after @ keeps GitHub from turning it into a mention
    out = out.replace('@', "@&#8203;");

    out = HEADING
        .replace_all(&out, |caps: &Captures| {
            let level = caps[1].as_bytes()[0] - b'0';
            "#".repeat(level as usize)
        })
        .into_owned();

    for rule in SPAN_RULES {
        out = substitute_spans(&out, rule);
    }

    out = CODE_WITH_LANG.replace_all(&out, "```$1").into_owned();
    out = CODE.replace_all(&out, "```").into_owned();
    out = NOFORMAT.replace_all(&out, "```").into_owned();

    out = QUOTE
        .replace_all(&out, |caps: &Captures| {
            format!(">{}\n\n", caps[1].replace('\n', "\n>"))
        })
        .into_owned();

    convert_links(&out)
}

pub(crate) fn is_word(c: char) -> bool {
    c.is_alphanumeric() || c == '_'
}

fn starts_with_at(chars: &[char], at: usize, token: &[char]) -> bool {
    chars.len() >= at + token.len() && chars[at..at + token.len()] == *token
}

fn substitute_spans(text: &str, rule: &SpanRule) -> String {
    let chars: Vec<char> = text.chars().collect();
    let leader: Vec<char> = rule.leader.chars().collect();
    let trailer: Vec<char> = rule.trailer.chars().collect();

    let mut out = String::with_capacity(text.len());
    let mut i = 0;
    while i < chars.len() {
        if let Some(body_end) = match_span(&chars, i, &leader, &trailer) {
            out.push_str(rule.out_leader);
            out.extend(&chars[i + leader.len()..body_end]);
            out.push_str(rule.out_trailer);
            i = body_end + trailer.len();
        } else {
            out.push(chars[i]);
            i += 1;
        }
    }
    out
}

/// Try to match `leader body trailer` at `start`, returning the index one past the body.
///
/// The leader must not follow a word character and the trailer must not precede one.
/// The body is a single word character, or two or more characters on one line whose
/// first and last are not whitespace.
fn match_span(chars: &[char], start: usize, leader: &[char], trailer: &[char]) -> Option<usize> {
    if start > 0 && is_word(chars[start - 1]) {
        return None;
    }
    if !starts_with_at(chars, start, leader) {
        return None;
    }

    let closes_at = |at: usize| {
        starts_with_at(chars, at, trailer)
            && chars.get(at + trailer.len()).map_or(true, |&c| !is_word(c))
    };

    let body = start + leader.len();
    let first = *chars.get(body)?;
    if is_word(first) && closes_at(body + 1) {
        return Some(body + 1);
    }
    if first.is_whitespace() {
        return None;
    }

    let mut last = body + 1;
    while last < chars.len() && chars[last] != '\n' {
        if !chars[last].is_whitespace() && closes_at(last + 1) {
            return Some(last + 1);
        }
        last += 1;
    }
    None
}

/// `[text|url]` -> `[text](url)`, unless glued to a word on either side.
fn convert_links(text: &str) -> String {
    let chars: Vec<char> = text.chars().collect();
    let mut out = String::with_capacity(text.len());
    let mut i = 0;
    while i < chars.len() {
        if chars[i] == '[' && (i == 0 || !is_word(chars[i - 1])) {
            if let Some((bar, close)) = match_link(&chars, i) {
                out.push('[');
                out.extend(&chars[i + 1..bar]);
                out.push_str("](");
                out.extend(&chars[bar + 1..close]);
                out.push(')');
                i = close + 1;
                continue;
            }
        }
        out.push(chars[i]);
        i += 1;
    }
    out
}

fn match_link(chars: &[char], open: usize) -> Option<(usize, usize)> {
    let line_end = chars[open..]
        .iter()
        .position(|&c| c == '\n')
        .map_or(chars.len(), |p| open + p);

    for bar in open + 2..line_end {
        if chars[bar] != '|' {
            continue;
        }
        for close in bar + 2..line_end {
            if chars[close] == ']' && chars.get(close + 1).map_or(true, |&c| !is_word(c)) {
                return Some((bar, close));
            }
        }
    }
    None
}
