//! Text normalization for spoken output.
//!
//! Written replies are full of marks that read fine but sound wrong when
//! synthesized: code fences, emphasis markers, quotes, parentheses and
//! long pauses at every period, colon and line break. [`normalize_for_speech`]
//! rewrites a reply into plain clauses joined by commas while keeping `!`
//! and `?` so the voice still inflects.
//!
//! Transformations, in order:
//! 1. Markdown to plain text (fenced code dropped, headings end a clause)
//! 2. Smart quotes and dashes to ASCII
//! 3. Paired quote characters removed, in-word apostrophes kept
//! 4. Parentheticals to comma-separated clauses
//! 5. Abbreviations, decimals and clock times shielded by placeholders
//! 6. Periods, colons and newlines to commas
//! 7. Placeholders restored
//! 8. Contractions expanded
//! 9. Redundant punctuation and whitespace collapsed

use pulldown_cmark::{Event, Options, Parser, Tag, TagEnd};

/// Stand-in for a period that must survive the pause rewrite.
const PROTECTED_DOT: char = '\u{E000}';
/// Stand-in for a colon that must survive the pause rewrite.
const PROTECTED_COLON: char = '\u{E001}';

/// Abbreviations whose periods are not sentence breaks. Longer forms first.
const ABBREVIATIONS: &[&str] = &[
    "approx.", "Mrs.", "Mr.", "Ms.", "Dr.", "St.", "Jr.", "Sr.", "Inc.", "Ltd.", "vs.",
    "etc.", "e.g.", "i.e.", "a.m.", "p.m.",
];

/// Contractions expanded to their full spoken form.
const CONTRACTIONS: &[(&str, &str)] = &[
    ("that'll", "that will"),
    ("that's", "that is"),
    ("there's", "there is"),
    ("what's", "what is"),
    ("let's", "let us"),
    ("i'll", "I will"),
    ("i'm", "I am"),
    ("i've", "I have"),
    ("i'd", "I would"),
    ("you'll", "you will"),
    ("you're", "you are"),
    ("you've", "you have"),
    ("you'd", "you would"),
    ("we'll", "we will"),
    ("we're", "we are"),
    ("we've", "we have"),
    ("they'll", "they will"),
    ("they're", "they are"),
    ("they've", "they have"),
    ("he'll", "he will"),
    ("she'll", "she will"),
    ("it'll", "it will"),
    ("it's", "it is"),
    ("can't", "cannot"),
    ("won't", "will not"),
    ("don't", "do not"),
    ("doesn't", "does not"),
    ("didn't", "did not"),
    ("isn't", "is not"),
    ("aren't", "are not"),
    ("wasn't", "was not"),
    ("weren't", "were not"),
    ("haven't", "have not"),
    ("hasn't", "has not"),
    ("wouldn't", "would not"),
    ("couldn't", "could not"),
    ("shouldn't", "should not"),
];

/// Rewrite a model reply into text suited for a speech synthesizer.
pub fn normalize_for_speech(text: &str) -> String {
    let text = text.replace([PROTECTED_DOT, PROTECTED_COLON], "");
    let text = markdown_to_plain(&text);
    let text = normalize_quotes(&text);
    let text = remove_paired_quotes(&text);
    let text = flatten_parentheticals(&text);
    let text = protect(&text);
    let text = collapse_pauses(&text);
    let text = restore(&text);
    let text = expand_contractions(&text);
    tidy(&text)
}

/// Render markdown to plain text, one block per line.
fn markdown_to_plain(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut in_code_block = false;

    for event in Parser::new_ext(text, Options::ENABLE_STRIKETHROUGH) {
        match event {
            Event::Start(Tag::CodeBlock(_)) => in_code_block = true,
            Event::End(TagEnd::CodeBlock) => {
                in_code_block = false;
                out.push('\n');
            }
            _ if in_code_block => {}
            Event::Start(Tag::Heading { .. }) | Event::Start(Tag::Item) => out.push('\n'),
            Event::End(TagEnd::Heading(_))
            | Event::End(TagEnd::Paragraph)
            | Event::End(TagEnd::Item)
            | Event::SoftBreak
            | Event::HardBreak => out.push('\n'),
            Event::Text(t) | Event::Code(t) => out.push_str(&t),
            _ => {}
        }
    }
    out
}

fn normalize_quotes(text: &str) -> String {
    text.replace(['\u{2018}', '\u{2019}'], "'")
        .replace(['\u{201C}', '\u{201D}'], "\"")
        .replace(['\u{2014}', '\u{2013}'], ", ")
}

/// Drop double quotes and any single quote that is not inside a word.
fn remove_paired_quotes(text: &str) -> String {
    let chars: Vec<char> = text.chars().collect();
    let mut out = String::with_capacity(text.len());
    for (i, &ch) in chars.iter().enumerate() {
        match ch {
            '"' => {}
            '\'' => {
                let before = i
                    .checked_sub(1)
                    .and_then(|j| chars.get(j))
                    .is_some_and(|c| c.is_alphanumeric());
                let after = chars.get(i + 1).is_some_and(|c| c.is_alphanumeric());
                if before && after {
                    out.push(ch);
                }
            }
            _ => out.push(ch),
        }
    }
    out
}

fn flatten_parentheticals(text: &str) -> String {
    let mut out = String::with_capacity(text.len() + 8);
    for ch in text.chars() {
        match ch {
            '(' | '[' => out.push_str(", "),
            ')' | ']' => out.push(','),
            _ => out.push(ch),
        }
    }
    out
}

/// Replace periods and colons that are not pauses with placeholders.
///
/// Covers the [`ABBREVIATIONS`] table at word starts plus `.` and `:`
/// between two digits (`3.50`, `10:30`). [`restore`] reverses it.
pub(crate) fn protect(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut rest = text;
    let mut prev: Option<char> = None;

    while let Some(ch) = rest.chars().next() {
        let word_start = prev.is_none_or(|p| !p.is_alphanumeric());
        if word_start
            && let Some(abbrev) = ABBREVIATIONS.iter().find(|a| {
                rest.starts_with(**a)
                    && rest[a.len()..]
                        .chars()
                        .next()
                        .is_none_or(|c| !c.is_alphanumeric())
            })
        {
            out.extend(abbrev.chars().map(|c| if c == '.' { PROTECTED_DOT } else { c }));
            prev = Some('.');
            rest = &rest[abbrev.len()..];
            continue;
        }

        let next = rest[ch.len_utf8()..].chars().next();
        let between_digits = prev.is_some_and(|p| p.is_ascii_digit())
            && next.is_some_and(|n| n.is_ascii_digit());
        out.push(match ch {
            '.' if between_digits => PROTECTED_DOT,
            ':' if between_digits => PROTECTED_COLON,
            other => other,
        });
        prev = Some(ch);
        rest = &rest[ch.len_utf8()..];
    }
    out
}

pub(crate) fn restore(text: &str) -> String {
    text.replace(PROTECTED_DOT, ".").replace(PROTECTED_COLON, ":")
}

fn collapse_pauses(text: &str) -> String {
    text.chars()
        .map(|ch| match ch {
            '.' | ':' | '\n' | '\r' | '\u{2026}' => ',',
            other => other,
        })
        .collect()
}

fn expand_contractions(text: &str) -> String {
    let mut out = String::with_capacity(text.len() + 16);
    let mut word = String::new();
    for ch in text.chars() {
        if ch.is_alphabetic() || ch == '\'' {
            word.push(ch);
            continue;
        }
        push_expanded(&mut out, &word);
        word.clear();
        out.push(ch);
    }
    push_expanded(&mut out, &word);
    out
}

fn push_expanded(out: &mut String, word: &str) {
    let lower = word.to_lowercase();
    let Some((_, expanded)) = CONTRACTIONS.iter().find(|(short, _)| *short == lower) else {
        out.push_str(word);
        return;
    };
    let capitalized = word.chars().next().is_some_and(char::is_uppercase);
    let mut chars = expanded.chars();
    if capitalized && let Some(first) = chars.next() {
        out.extend(first.to_uppercase());
        out.push_str(chars.as_str());
    } else {
        out.push_str(expanded);
    }
}

/// Collapse whitespace and comma runs, and drop commas that touch `!`, `?` or `;`.
fn tidy(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut pending_space = false;

    for ch in text.chars() {
        if ch.is_whitespace() {
            pending_space = !out.is_empty();
            continue;
        }
        match ch {
            ',' => {
                if !out.is_empty() && !out.ends_with([',', '!', '?', ';']) {
                    out.push(',');
                }
                pending_space = !out.is_empty();
            }
            '!' | '?' | ';' => {
                if out.ends_with(',') {
                    out.pop();
                }
                out.push(ch);
                pending_space = true;
            }
            _ => {
                if pending_space {
                    out.push(' ');
                }
                pending_space = false;
                out.push(ch);
            }
        }
    }

    while out.ends_with(',') {
        out.pop();
    }
    out
}
