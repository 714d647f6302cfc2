//! Text scanning helpers for free-form backend output.
//!
//! Backends return prose. These helpers pull out the pieces the orchestration
//! needs: statute and case references, enumerated points, embedded JSON, and
//! labelled lists.

use serde_json::Value;

const STATUTE_MARKERS: &[&str] = &["DTSA", "UTSA", "U.S.C.", "USC", "CFR"];

/// Statute markers and "Party v. Party" case names, de-duplicated, in order of appearance.
pub fn extract_authorities(text: &str) -> Vec<String> {
    let mut found: Vec<String> = Vec::new();
    let mut push = |s: String| {
        let s = s.trim().trim_end_matches([',', ';', '.', ')']).trim().to_string();
        if !s.is_empty() && !found.contains(&s) {
            found.push(s);
        }
    };

    for clause in text.split(|c| matches!(c, ',' | ';' | '\n')) {
        for marker in STATUTE_MARKERS {
            if let Some(idx) = clause.find(marker) {
                let start = statute_start(clause, idx);
                push(clause[start..].to_string());
                break;
            }
        }
        if let Some(name) = case_name(clause) {
            push(name);
        }
    }
    found
}

// Include a leading title number ("18 U.S.C.") when present.
fn statute_start(clause: &str, marker_idx: usize) -> usize {
    let head = clause[..marker_idx].trim_end();
    let word_start = head
        .char_indices()
        .rev()
        .find(|(_, c)| c.is_whitespace())
        .map(|(i, c)| i + c.len_utf8())
        .unwrap_or(0);
    let word = &head[word_start..];
    if !word.is_empty() && word.chars().all(|c| c.is_ascii_digit()) {
        word_start
    } else {
        marker_idx
    }
}

fn case_name(clause: &str) -> Option<String> {
    let idx = clause.find(" v. ")?;
    let left = clause[..idx].split_whitespace().last()?;
    let right = clause[idx + 4..].split_whitespace().next()?;
    let capitalised = |w: &str| w.chars().next().map(|c| c.is_uppercase()).unwrap_or(false);
    if capitalised(left) && capitalised(right) {
        let right = right.trim_end_matches(|c: char| !c.is_alphanumeric());
        Some(format!("{} v. {}", left, right))
    } else {
        None
    }
}

/// Lines starting with "1.", "-" or "*", trimmed, up to `max`.
pub fn extract_key_points(text: &str, max: usize) -> Vec<String> {
    text.lines()
        .filter_map(|line| strip_list_marker(line.trim()))
        .filter(|s| !s.is_empty())
        .take(max)
        .map(str::to_string)
        .collect()
}

fn strip_list_marker(line: &str) -> Option<&str> {
    if let Some(rest) = line.strip_prefix("- ").or_else(|| line.strip_prefix("* ")) {
        return Some(rest.trim());
    }
    if let Some(rest) = line.strip_prefix('•') {
        return Some(rest.trim());
    }
    let digits = line.chars().take_while(|c| c.is_ascii_digit()).count();
    if digits > 0 && line[digits..].starts_with('.') {
        return Some(line[digits + 1..].trim());
    }
    None
}

/// First balanced `{...}` block in `text` that parses as a JSON object.
pub fn extract_json_object(text: &str) -> Option<Value> {
    let bytes = text.as_bytes();
    let mut start = 0;
    while let Some(offset) = text[start..].find('{') {
        let open = start + offset;
        let mut depth = 0usize;
        let mut in_string = false;
        let mut escaped = false;
        for (i, &b) in bytes.iter().enumerate().skip(open) {
            if in_string {
                match b {
                    b'\\' if !escaped => escaped = true,
                    b'"' if !escaped => in_string = false,
                    _ => escaped = false,
                }
                continue;
            }
            match b {
                b'"' => in_string = true,
                b'{' => depth += 1,
                b'}' => {
                    depth -= 1;
                    if depth == 0 {
                        if let Ok(v @ Value::Object(_)) = serde_json::from_str(&text[open..=i]) {
                            return Some(v);
                        }
                        break;
                    }
                }
                _ => {}
            }
        }
        start = open + 1;
    }
    None
}

/// Items following a "label:" heading: inline remainder plus bulleted continuation lines.
pub fn extract_labelled_list(text: &str, label: &str, max: usize) -> Vec<String> {
    let lower = text.to_lowercase();
    let Some(idx) = lower.find(&label.to_lowercase()) else {
        return Vec::new();
    };
    let Some(after) = text.get(idx + label.len()..) else {
        return Vec::new();
    };
    let after = after.strip_prefix('s').unwrap_or(after);
    let after = after.trim_start_matches([' ', '\t']);
    let after = after.strip_prefix(':').unwrap_or(after);
    let mut lines = after.lines();
    let mut items = Vec::new();
    if let Some(first) = lines.next() {
        let first = first.trim();
        if !first.is_empty() {
            items.push(strip_list_marker(first).unwrap_or(first).to_string());
        }
    }
    for line in lines {
        match strip_list_marker(line.trim()) {
            Some(item) if !item.is_empty() => items.push(item.to_string()),
            _ => break,
        }
    }
    items.truncate(max);
    items
}

/// Number following the first occurrence of `keyword`; a trailing '%' divides by 100.
pub fn extract_number_after(text: &str, keyword: &str) -> Option<f64> {
    let lower = text.to_lowercase();
    let idx = lower.find(keyword)?;
    let tail = &lower[idx + keyword.len()..];
    let start = tail.find(|c: char| c.is_ascii_digit() || c == '-')?;
    // Only look a short distance past the keyword.
    if start > 24 {
        return None;
    }
    let num: String = tail[start..]
        .chars()
        .enumerate()
        .take_while(|(i, c)| c.is_ascii_digit() || *c == '.' || (*i == 0 && *c == '-'))
        .map(|(_, c)| c)
        .collect();
    let value: f64 = num.trim_end_matches('.').parse().ok()?;
    let rest = &tail[start + num.len()..];
    if rest.trim_start().starts_with('%') {
        Some(value / 100.0)
    } else {
        Some(value)
    }
}
