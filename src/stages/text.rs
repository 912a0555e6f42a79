//! Line-oriented text stages over `String` tokens.
//!
//! Patterns are compiled when the stage materializes, so an invalid pattern
//! is reported on the first pull, like every other stage-body error.

use glob::{MatchOptions, Pattern};
use regex::Regex;

use crate::connector::Connector;
use crate::error::{PipelineError, Result};
use crate::stage::{Input, StageDescriptor, Step, wrap};

const MATCHES: StageDescriptor = StageDescriptor::composable("matches", &["pattern"]);
const NOMATCH: StageDescriptor = StageDescriptor::composable("nomatch", &["pattern"]);
const SEARCH: StageDescriptor = StageDescriptor::composable("search", &["pattern", "group", "strict"]);
const SEARCH_ALL: StageDescriptor = StageDescriptor::composable("search_all", &["pattern"]);
const SUBSTITUTE: StageDescriptor = StageDescriptor::composable("substitute", &["pattern", "to"]);
const REPLACE: StageDescriptor = StageDescriptor::composable("replace", &["old", "new"]);
const SPLIT: StageDescriptor = StageDescriptor::composable("split", &["sep"]);
const SPLIT_FIELD: StageDescriptor = StageDescriptor::composable("split_field", &["sep", "n"]);
const JOIN: StageDescriptor = StageDescriptor::composable("join", &["sep"]);
const STRIP: StageDescriptor = StageDescriptor::composable("strip", &[]);
const SFORMAT: StageDescriptor = StageDescriptor::composable("sformat", &["template"]);
const FNMATCHES: StageDescriptor = StageDescriptor::composable("fnmatches", &["pattern", "match_case"]);

/// Pull the next line or hand an upstream error straight back.
macro_rules! next_line {
    ($input:expr) => {
        match $input.pull()? {
            Ok(line) => line,
            Err(err) => return Some(Err(err)),
        }
    };
}

// ---------------------------------------------------------------------------
// Regex filters and extraction
// ---------------------------------------------------------------------------

struct MatchStep {
    regex: Regex,
    keep: bool,
}

impl Step<String> for MatchStep {
    type Output = String;

    fn step(&mut self, input: &mut Input<'_, String>) -> Option<Result<String>> {
        loop {
            let line = next_line!(input);
            if self.regex.is_match(&line) == self.keep {
                return Some(Ok(line));
            }
        }
    }
}

/// Lines matching `pattern` anywhere, like `grep`.
pub fn matches(pattern: &str) -> Connector<String, String> {
    wrap(MATCHES, |pattern: String| {
        Ok(MatchStep {
            regex: Regex::new(&pattern)?,
            keep: true,
        })
    })
    .call(pattern.to_string())
}

/// Lines not matching `pattern`, like `grep -v`.
pub fn nomatch(pattern: &str) -> Connector<String, String> {
    wrap(NOMATCH, |pattern: String| {
        Ok(MatchStep {
            regex: Regex::new(&pattern)?,
            keep: false,
        })
    })
    .call(pattern.to_string())
}

struct SearchStep {
    regex: Regex,
    group: usize,
    strict: bool,
}

impl Step<String> for SearchStep {
    type Output = String;

    fn step(&mut self, input: &mut Input<'_, String>) -> Option<Result<String>> {
        loop {
            let line = next_line!(input);
            let found = self
                .regex
                .captures(&line)
                .and_then(|caps| caps.get(self.group))
                .map(|m| m.as_str().to_string());
            match found {
                Some(text) => return Some(Ok(text)),
                None if self.strict => {
                    return Some(Err(PipelineError::NoMatch {
                        line,
                        pattern: self.regex.as_str().to_string(),
                    }));
                }
                None => continue,
            }
        }
    }
}

fn search_step((pattern, group, strict): (String, usize, bool)) -> Result<SearchStep> {
    let regex = Regex::new(&pattern)?;
    if group >= regex.captures_len() {
        return Err(PipelineError::stage(
            SEARCH.name,
            format!("pattern {pattern} has no group {group}"),
        ));
    }
    Ok(SearchStep {
        regex,
        group,
        strict,
    })
}

/// Capture `group` (0 for the whole match) of each line matching `pattern`.
/// Lines that do not match, or where the group did not participate, are
/// skipped.
pub fn search(pattern: &str, group: usize) -> Connector<String, String> {
    wrap(SEARCH, search_step).call((pattern.to_string(), group, false))
}

/// Like [`search`], but a line without the group is an error.
pub fn search_strict(pattern: &str, group: usize) -> Connector<String, String> {
    wrap(SEARCH, search_step).call((pattern.to_string(), group, true))
}

struct SearchAllStep {
    regex: Regex,
}

impl Step<String> for SearchAllStep {
    type Output = Vec<String>;

    fn step(&mut self, input: &mut Input<'_, String>) -> Option<Result<Vec<String>>> {
        loop {
            let line = next_line!(input);
            if let Some(caps) = self.regex.captures(&line) {
                let groups = caps
                    .iter()
                    .skip(1)
                    .map(|m| m.map_or_else(String::new, |m| m.as_str().to_string()))
                    .collect();
                return Some(Ok(groups));
            }
        }
    }
}

/// Every capture group of each matching line; non-participating groups are
/// empty strings.
pub fn search_all(pattern: &str) -> Connector<String, Vec<String>> {
    wrap(SEARCH_ALL, |pattern: String| {
        Ok(SearchAllStep {
            regex: Regex::new(&pattern)?,
        })
    })
    .call(pattern.to_string())
}

// ---------------------------------------------------------------------------
// Rewriting
// ---------------------------------------------------------------------------

struct SubstituteStep {
    regex: Regex,
    to: String,
}

impl Step<String> for SubstituteStep {
    type Output = String;

    fn step(&mut self, input: &mut Input<'_, String>) -> Option<Result<String>> {
        let line = next_line!(input);
        Some(Ok(self.regex.replace_all(&line, self.to.as_str()).into_owned()))
    }
}

/// Replace every match of `pattern`; `to` may refer to groups as `$1` or `${name}`.
pub fn substitute(pattern: &str, to: &str) -> Connector<String, String> {
    wrap(SUBSTITUTE, |(pattern, to): (String, String)| {
        Ok(SubstituteStep {
            regex: Regex::new(&pattern)?,
            to,
        })
    })
    .call((pattern.to_string(), to.to_string()))
}

/// Replace every literal occurrence of `old` with `new`.
pub fn replace(old: &str, new: &str) -> Connector<String, String> {
    wrap(REPLACE, |(old, new): (String, String)| {
        Ok(map_lines(move |line| Ok(line.replace(&old, &new))))
    })
    .call((old.to_string(), new.to_string()))
}

/// Trim leading and trailing whitespace.
pub fn strip() -> Connector<String, String> {
    wrap(STRIP, |(): ()| Ok(map_lines(|line| Ok(line.trim().to_string())))).call(())
}

struct MapLines<F> {
    f: F,
}

fn map_lines<O, F: FnMut(String) -> Result<O>>(f: F) -> MapLines<F> {
    MapLines { f }
}

impl<O, F> Step<String> for MapLines<F>
where
    F: FnMut(String) -> Result<O>,
{
    type Output = O;

    fn step(&mut self, input: &mut Input<'_, String>) -> Option<Result<O>> {
        let line = next_line!(input);
        Some((self.f)(line))
    }
}

// ---------------------------------------------------------------------------
// Splitting and joining
// ---------------------------------------------------------------------------

fn split_line(line: &str, sep: Option<&str>) -> Vec<String> {
    match sep {
        Some(sep) => line.split(sep).map(str::to_string).collect(),
        None => line.split_whitespace().map(str::to_string).collect(),
    }
}

/// Split each line on `sep`, or on runs of whitespace when `sep` is `None`.
pub fn split(sep: Option<&str>) -> Connector<String, Vec<String>> {
    wrap(SPLIT, |sep: Option<String>| {
        Ok(map_lines(move |line| Ok(split_line(&line, sep.as_deref()))))
    })
    .call(sep.map(str::to_string))
}

/// Split each line into whitespace-separated words.
pub fn words() -> Connector<String, Vec<String>> {
    split(None)
}

/// Field `n` (counting from 1) of each line split on `sep`.
pub fn split_field(sep: Option<&str>, n: usize) -> Connector<String, String> {
    wrap(SPLIT_FIELD, |(sep, n): (Option<String>, usize)| {
        if n == 0 {
            return Err(PipelineError::stage(SPLIT_FIELD.name, "fields are numbered from 1"));
        }
        Ok(map_lines(move |line| {
            let mut fields = split_line(&line, sep.as_deref());
            if fields.len() < n {
                return Err(PipelineError::MissingField { line, index: n });
            }
            Ok(fields.swap_remove(n - 1))
        }))
    })
    .call((sep.map(str::to_string), n))
}

struct JoinStep {
    sep: String,
}

impl Step<Vec<String>> for JoinStep {
    type Output = String;

    fn step(&mut self, input: &mut Input<'_, Vec<String>>) -> Option<Result<String>> {
        let fields = next_line!(input);
        Some(Ok(fields.join(&self.sep)))
    }
}

/// Join each `Vec<String>` token with `sep`.
pub fn join(sep: &str) -> Connector<Vec<String>, String> {
    wrap(JOIN, |sep: String| Ok(JoinStep { sep })).call(sep.to_string())
}

// ---------------------------------------------------------------------------
// Formatting
// ---------------------------------------------------------------------------

#[derive(Debug, PartialEq)]
enum Piece {
    Literal(String),
    Next,
    Index(usize),
}

/// Parse `{}` / `{N}` placeholders; `{{` and `}}` are literal braces.
fn parse_template(template: &str) -> Result<Vec<Piece>> {
    let bad = |message: &str| PipelineError::stage(SFORMAT.name, format!("{message} in '{template}'"));
    let mut pieces = Vec::new();
    let mut literal = String::new();
    let mut chars = template.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '{' if chars.peek() == Some(&'{') => {
                chars.next();
                literal.push('{');
            }
            '}' if chars.peek() == Some(&'}') => {
                chars.next();
                literal.push('}');
            }
            '{' => {
                let mut index = String::new();
                loop {
                    match chars.next() {
                        Some('}') => break,
                        Some(d) if d.is_ascii_digit() => index.push(d),
                        Some(_) => return Err(bad("non-numeric placeholder")),
                        None => return Err(bad("unclosed '{'")),
                    }
                }
                if !literal.is_empty() {
                    pieces.push(Piece::Literal(std::mem::take(&mut literal)));
                }
                pieces.push(if index.is_empty() {
                    Piece::Next
                } else {
                    Piece::Index(index.parse().map_err(|_| bad("placeholder index too large"))?)
                });
            }
            '}' => return Err(bad("single '}'")),
            c => literal.push(c),
        }
    }
    if !literal.is_empty() {
        pieces.push(Piece::Literal(literal));
    }
    Ok(pieces)
}

struct FormatStep {
    pieces: Vec<Piece>,
}

impl Step<Vec<String>> for FormatStep {
    type Output = String;

    fn step(&mut self, input: &mut Input<'_, Vec<String>>) -> Option<Result<String>> {
        let fields = next_line!(input);
        let mut out = String::new();
        let mut next = 0;
        for piece in &self.pieces {
            let index = match piece {
                Piece::Literal(text) => {
                    out.push_str(text);
                    continue;
                }
                Piece::Next => {
                    next += 1;
                    next - 1
                }
                Piece::Index(index) => *index,
            };
            match fields.get(index) {
                Some(field) => out.push_str(field),
                None => {
                    return Some(Err(PipelineError::MissingField {
                        line: fields.join(" "),
                        index,
                    }));
                }
            }
        }
        Some(Ok(out))
    }
}

/// Fill `template` from each `Vec<String>` token. `{}` takes the next field,
/// `{N}` takes field `N` counting from 0.
pub fn sformat(template: &str) -> Connector<Vec<String>, String> {
    wrap(SFORMAT, |template: String| {
        Ok(FormatStep {
            pieces: parse_template(&template)?,
        })
    })
    .call(template.to_string())
}

// ---------------------------------------------------------------------------
// Path globbing
// ---------------------------------------------------------------------------

struct FnMatchStep {
    pattern: Pattern,
    options: MatchOptions,
}

impl Step<String> for FnMatchStep {
    type Output = String;

    fn step(&mut self, input: &mut Input<'_, String>) -> Option<Result<String>> {
        loop {
            let path = next_line!(input);
            let normalized = path.replace(std::path::MAIN_SEPARATOR, "/");
            if self.pattern.matches_with(&normalized, self.options) {
                return Some(Ok(path));
            }
        }
    }
}

/// Paths matching a shell glob, ignoring case. `*` also crosses `/`, as
/// with `fnmatch`.
pub fn fnmatches(pattern: &str) -> Connector<String, String> {
    fnmatches_with(pattern, false)
}

/// [`fnmatches`] with explicit case handling.
pub fn fnmatches_with(pattern: &str, match_case: bool) -> Connector<String, String> {
    wrap(FNMATCHES, |(pattern, match_case): (String, bool)| {
        Ok(FnMatchStep {
            pattern: Pattern::new(&pattern)?,
            options: MatchOptions {
                case_sensitive: match_case,
                ..MatchOptions::new()
            },
        })
    })
    .call((pattern.to_string(), match_case))
}
