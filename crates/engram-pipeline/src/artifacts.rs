//! Multi-modal artifact extraction.
//!
//! Pattern-driven and pure: code blocks, file paths, shell commands, error
//! traces, and architecture mentions are pulled from chunk text and attached
//! to the memory. Patterns are compiled once per process.

use std::collections::BTreeSet;
use std::sync::OnceLock;

use regex::Regex;

use engram_types::{Artifacts, CodeSnippet, MemoryFlags};

// Caps keep pathological inputs from bloating stored artifacts.
const MAX_ERROR_LEN: usize = 500;
const MAX_ERROR_CONTINUATION_LINES: usize = 5;
const MIN_ARCHITECTURE_SENTENCE_LEN: usize = 20;

fn code_block_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?s)```([A-Za-z0-9_+-]*)\n(.*?)```").unwrap())
}

fn file_path_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r"(?x)
            \b[\w~][\w./\\-]*
            \.(?:rs|py|ts|tsx|js|jsx|go|java|kt|rb|cpp|cc|c|h|hpp|
                json|yaml|yml|toml|md|txt|sh|sql|css|html|proto|lock)\b",
        )
        .unwrap()
    })
}

fn command_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?m)^\s*\$\s+(.+?)\s*$").unwrap())
}

fn error_start_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r"(?i)^\s*(?:error(?:\[\w+\])?|exception|traceback|panicked at|fatal|[A-Za-z]+(?:Error|Exception)):?[\s:]",
        )
        .unwrap()
    })
}

fn architecture_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)\b(architecture|pattern|decided|design|strategy|pipeline|workflow)\b")
            .unwrap()
    })
}

/// Extract all artifacts from chunk text and derive the fast-filter flags.
///
/// `success` is not an artifact property and is left false; the chunker
/// owns outcome detection.
pub fn extract(text: &str) -> (Artifacts, MemoryFlags) {
    let artifacts = Artifacts {
        code_snippets: extract_code_snippets(text),
        files: extract_file_paths(text),
        commands: extract_commands(text),
        errors: extract_errors(text),
        architecture: extract_architecture(text),
    };
    let flags = MemoryFlags {
        has_code: !artifacts.code_snippets.is_empty(),
        has_files: !artifacts.files.is_empty(),
        has_architecture: !artifacts.architecture.is_empty(),
        success: false,
    };
    (artifacts, flags)
}

/// Fenced code blocks, with heuristic language detection when untagged.
pub fn extract_code_snippets(text: &str) -> Vec<CodeSnippet> {
    code_block_re()
        .captures_iter(text)
        .filter_map(|cap| {
            let code = cap.get(2)?.as_str().trim();
            if code.is_empty() {
                return None;
            }
            let tag = cap.get(1).map(|m| m.as_str()).unwrap_or("");
            let language = if tag.is_empty() {
                detect_language(code).to_string()
            } else {
                tag.to_lowercase()
            };
            Some(CodeSnippet {
                language,
                text: code.to_string(),
            })
        })
        .collect()
}

/// File paths, normalized to forward slashes, deduplicated and sorted.
pub fn extract_file_paths(text: &str) -> Vec<String> {
    let mut paths = BTreeSet::new();
    for m in file_path_re().find_iter(text) {
        let mut path = m.as_str().replace('\\', "/");
        while let Some(rest) = path.strip_prefix("./") {
            path = rest.to_string();
        }
        paths.insert(path);
    }
    paths.into_iter().collect()
}

/// Shell commands: prompt-marker lines plus lines inside bash/sh fences.
pub fn extract_commands(text: &str) -> Vec<String> {
    let mut commands = Vec::new();
    for cap in command_re().captures_iter(text) {
        let cmd = cap[1].to_string();
        if cmd.len() < 200 {
            commands.push(cmd);
        }
    }
    for cap in code_block_re().captures_iter(text) {
        let tag = cap.get(1).map(|m| m.as_str()).unwrap_or("");
        if matches!(tag, "bash" | "sh" | "shell" | "zsh") {
            for line in cap[2].lines() {
                let line = line.trim().trim_start_matches("$ ").trim();
                if !line.is_empty() && !line.starts_with('#') && line.len() < 200 {
                    commands.push(line.to_string());
                }
            }
        }
    }
    commands
}

/// Error lines together with their indented continuation lines.
pub fn extract_errors(text: &str) -> Vec<String> {
    let lines: Vec<&str> = text.lines().collect();
    let mut errors = Vec::new();
    let mut i = 0;

    while i < lines.len() {
        if error_start_re().is_match(lines[i]) {
            let mut block = vec![lines[i].trim_end()];
            let mut j = i + 1;
            while j < lines.len()
                && block.len() <= MAX_ERROR_CONTINUATION_LINES
                && (lines[j].starts_with("  ") || lines[j].starts_with('\t'))
            {
                block.push(lines[j].trim_end());
                j += 1;
            }
            let mut joined = block.join("\n");
            if joined.len() > MAX_ERROR_LEN {
                joined.truncate(floor_char_boundary(&joined, MAX_ERROR_LEN));
            }
            errors.push(joined);
            i = j;
        } else {
            i += 1;
        }
    }
    errors
}

/// Sentences mentioning design or architectural decisions.
pub fn extract_architecture(text: &str) -> Vec<String> {
    split_sentences(text)
        .filter(|sentence| {
            sentence.len() > MIN_ARCHITECTURE_SENTENCE_LEN && architecture_re().is_match(sentence)
        })
        .map(str::to_string)
        .collect()
}

/// Split on sentence terminators; good enough for marker detection.
pub fn split_sentences(text: &str) -> impl Iterator<Item = &str> {
    text.split_inclusive(['.', '!', '?', '\n'])
        .map(str::trim)
        .filter(|s| !s.is_empty())
}

fn detect_language(code: &str) -> &'static str {
    if code.contains("fn ") && (code.contains("let ") || code.contains("impl ")) {
        "rust"
    } else if code.contains("def ") || code.contains("import ") && code.contains(":") {
        "python"
    } else if code.contains("function ") || code.contains("const ") || code.contains("=>") {
        "javascript"
    } else if code.contains("#include") {
        "c"
    } else if code.lines().all(|l| {
        let l = l.trim();
        l.is_empty() || l.starts_with('$') || l.starts_with('#')
    }) {
        "shell"
    } else {
        "plaintext"
    }
}

/// Largest byte index `<= max` that lands on a char boundary.
fn floor_char_boundary(s: &str, max: usize) -> usize {
    let mut idx = max.min(s.len());
    while idx > 0 && !s.is_char_boundary(idx) {
        idx -= 1;
    }
    idx
}
