//! Userscript metadata block parsing.

use std::sync::LazyLock;

use regex::Regex;
use scriptup_backend::ScriptMeta;

static METABLOCK_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)(?:^|\n)[ \t]*//\x20==UserScript==.*?\n[ \t]*//\x20==/UserScript==[^\n]*")
        .expect("valid metablock regex")
});
static METABLOCK_OPEN_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?:^|\n)[ \t]*//\x20==UserScript==").expect("valid metablock opening regex")
});
static META_LINE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\s*//\s*@(\S+)(?:\s+(.*?))?\s*$").expect("valid meta line regex")
});

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParsedMeta {
    pub meta: ScriptMeta,
    /// The metadata block exactly as it appeared in the source.
    pub block: String,
}

/// Parse a complete script. Returns `None` when there is no closed
/// metadata block.
#[must_use]
pub fn parse_meta(code: &str) -> Option<ParsedMeta> {
    let found = METABLOCK_RE.find(code)?;
    let block = found.as_str().trim_start_matches(['\r', '\n']);
    Some(ParsedMeta {
        meta: parse_lines(block),
        block: block.to_string(),
    })
}

/// Parse a payload that may be a bare or truncated metadata block, as sent
/// by servers honouring the metadata `Accept` hint.
#[must_use]
pub fn parse_meta_permissive(data: &str) -> ParsedMeta {
    if let Some(parsed) = parse_meta(data) {
        return parsed;
    }
    match METABLOCK_OPEN_RE.find(data) {
        Some(open) => {
            let block = data[open.start()..].trim_start_matches(['\r', '\n']);
            ParsedMeta {
                meta: parse_lines(block),
                block: block.to_string(),
            }
        }
        None => ParsedMeta::default(),
    }
}

/// The script with its metadata block removed.
#[must_use]
pub fn strip_metablock(code: &str) -> String {
    METABLOCK_RE.replace(code, "").into_owned()
}

fn parse_lines(block: &str) -> ScriptMeta {
    let mut meta = ScriptMeta::default();

    for line in block.lines() {
        let Some(captures) = META_LINE_RE.captures(line) else {
            continue;
        };
        let key = &captures[1];
        let value = captures.get(2).map_or("", |m| m.as_str()).trim();
        if value.is_empty() {
            continue;
        }

        match key {
            "name" if meta.name.is_empty() => meta.name = value.to_string(),
            "namespace" => meta.namespace = Some(value.to_string()),
            "version" => meta.version = Some(value.to_string()),
            "downloadURL" => meta.download_url = Some(value.to_string()),
            "updateURL" => meta.update_url = Some(value.to_string()),
            "require" => meta.requires.push(value.to_string()),
            "resource" => {
                if let Some((name, url)) = value.split_once(char::is_whitespace) {
                    meta.resources
                        .insert(name.to_string(), url.trim().to_string());
                }
            }
            _ => {}
        }
    }

    meta
}
