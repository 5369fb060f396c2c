//! Banner comment directives
//!
//! A spec file may override its environment in a leading block comment:
//!
//! ```text
//! /**
//!  * Karma environment
//!  *   #active: false
//!  *   clean: true
//!  *   use: jasmine
//!  *   add: fooLib.js | qunit
//!  *   lib: another
//!  */
//! ```
//!
//! Lines after the marker are `key: value` directives until the comment
//! ends or a blank line follows them. A key prefixed with `#` is disabled.

use once_cell::sync::Lazy;
use regex::Regex;
use std::path::Path;

use crate::error::{Error, Result};
use crate::types::ScriptRef;

/// Marker line introducing the directive block
pub const DEFAULT_MARKER: &str = "Karma environment";

static DIRECTIVE_LINE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(?P<disabled>#\s*)?(?P<key>[A-Za-z][\w-]*)\s*:\s*(?P<value>.*?)\s*$")
        .expect("directive pattern is valid")
});

/// Overrides parsed from a banner comment
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Directives {
    pub active: Option<bool>,
    pub focus: Option<bool>,
    pub clean: Option<bool>,
    pub uses: Vec<ScriptRef>,
    pub adds: Vec<ScriptRef>,
    pub libs: Vec<ScriptRef>,
}

impl Directives {
    pub fn is_empty(&self) -> bool {
        *self == Directives::default()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Key {
    Active,
    Focus,
    Clean,
    Use,
    Add,
    Lib,
}

impl Key {
    fn parse(key: &str) -> Option<Self> {
        match key {
            "active" => Some(Key::Active),
            "focus" => Some(Key::Focus),
            "clean" => Some(Key::Clean),
            "use" => Some(Key::Use),
            "add" => Some(Key::Add),
            "lib" => Some(Key::Lib),
            _ => None,
        }
    }
}

/// A comment found before the first line of code
struct Comment<'a> {
    text: &'a str,
    first_line: usize,
}

/// Parse the directive block of `source`, if any.
///
/// `file` is only used for error reporting.
pub fn parse_directives(file: &Path, source: &str, marker: &str) -> Result<Directives> {
    for comment in leading_comments(source) {
        if let Some(directives) = parse_comment(file, &comment, marker)? {
            return Ok(directives);
        }
    }
    Ok(Directives::default())
}

/// Collect block and line comments preceding the first code token
fn leading_comments(source: &str) -> Vec<Comment<'_>> {
    let mut comments = Vec::new();
    let mut offset = 0;

    loop {
        let rest = &source[offset..];
        let trimmed = rest.trim_start();
        offset += rest.len() - trimmed.len();

        if let Some(body) = trimmed.strip_prefix("/*") {
            let (text, consumed) = match body.find("*/") {
                Some(end) => (&body[..end], end + 2),
                None => (body, body.len()),
            };
            comments.push(Comment {
                text,
                first_line: line_number_at(source, offset),
            });
            offset += 2 + consumed;
        } else if trimmed.starts_with("//") {
            let first_line = line_number_at(source, offset);
            let start = offset;
            // Consecutive line comments form one block
            loop {
                let rest = &source[offset..];
                let line_end = rest.find('\n').map(|i| i + 1).unwrap_or(rest.len());
                offset += line_end;
                let next = source[offset..].trim_start_matches(|c: char| c == ' ' || c == '\t');
                if !next.starts_with("//") || line_end == 0 {
                    break;
                }
                offset = source.len() - next.len();
            }
            comments.push(Comment {
                text: &source[start..offset],
                first_line,
            });
        } else {
            break;
        }

        if offset >= source.len() {
            break;
        }
    }

    comments
}

fn line_number_at(source: &str, offset: usize) -> usize {
    source[..offset].matches('\n').count() + 1
}

/// Strip comment decoration (`*` or `//`) from a line
fn clean_line(line: &str) -> &str {
    let line = line.trim_start();
    let line = line.strip_prefix("//").unwrap_or(line);
    line.trim_start_matches('*').trim()
}

fn parse_comment(file: &Path, comment: &Comment<'_>, marker: &str) -> Result<Option<Directives>> {
    let mut lines = comment.text.lines().enumerate();

    let found = lines
        .by_ref()
        .any(|(_, line)| clean_line(line).eq_ignore_ascii_case(marker));
    if !found {
        return Ok(None);
    }

    let mut directives = Directives::default();
    let mut seen_directive = false;

    for (index, raw) in lines {
        let line = clean_line(raw);
        let line_number = comment.first_line + index;

        if line.is_empty() {
            if seen_directive {
                break;
            }
            continue;
        }
        seen_directive = true;

        let malformed = || Error::DirectiveParse {
            file: file.to_path_buf(),
            line_number,
            line: line.to_string(),
        };

        let caps = DIRECTIVE_LINE.captures(line).ok_or_else(malformed)?;
        if caps.name("disabled").is_some() {
            continue;
        }
        let key = Key::parse(&caps["key"]).ok_or_else(malformed)?;
        let value = &caps["value"];
        if value.is_empty() {
            return Err(malformed());
        }

        match key {
            Key::Active => directives.active = Some(parse_bool(value).ok_or_else(malformed)?),
            Key::Focus => directives.focus = Some(parse_bool(value).ok_or_else(malformed)?),
            Key::Clean => directives.clean = Some(parse_bool(value).ok_or_else(malformed)?),
            Key::Use | Key::Add | Key::Lib => {
                let list = match key {
                    Key::Use => &mut directives.uses,
                    Key::Add => &mut directives.adds,
                    _ => &mut directives.libs,
                };
                for entry in split_entries(value) {
                    list.push(ScriptRef::parse(entry).ok_or_else(malformed)?);
                }
            }
        }
    }

    Ok(Some(directives))
}

fn split_entries(value: &str) -> impl Iterator<Item = &str> {
    value.split(',').map(str::trim)
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.to_ascii_lowercase().as_str() {
        "true" | "yes" | "on" | "1" => Some(true),
        "false" | "no" | "off" | "0" => Some(false),
        _ => None,
    }
}
