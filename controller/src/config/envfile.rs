//! `.env` file model
//!
//! Keeps the file's layout so a rewrite only touches the entries that changed.

#[derive(Debug, Clone, PartialEq, Eq)]
enum Line {
    /// Comment, blank line, or anything that is not an assignment
    Verbatim(String),
    Entry {
        key: String,
        value: String,
        /// Original text, dropped once the value changes
        raw: Option<String>,
    },
}

/// Ordered set of environment variables backed by an env file layout
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EnvFile {
    lines: Vec<Line>,
}

impl EnvFile {
    /// Parse env file contents
    ///
    /// Accepts `KEY=value`, `export KEY=value`, and single or double quoted
    /// values. A repeated key keeps its last value, as compose does.
    pub fn parse(contents: &str) -> Self {
        let mut lines: Vec<Line> = Vec::new();

        for raw in contents.lines() {
            let Some((key, value)) = parse_assignment(raw) else {
                lines.push(Line::Verbatim(raw.to_string()));
                continue;
            };

            // Earlier duplicates become inert so lookups and rewrites see one entry.
            for line in lines.iter_mut() {
                if let Line::Entry { key: existing, raw: old_raw, value: old_value } = line {
                    if *existing == key {
                        let text = old_raw
                            .take()
                            .unwrap_or_else(|| render_entry(existing, old_value));
                        *line = Line::Verbatim(text);
                    }
                }
            }

            lines.push(Line::Entry {
                key,
                value,
                raw: Some(raw.to_string()),
            });
        }

        Self { lines }
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.lines.iter().find_map(|line| match line {
            Line::Entry { key: k, value, .. } if k == key => Some(value.as_str()),
            _ => None,
        })
    }

    /// Set the value of an existing key
    ///
    /// Returns `false`, leaving the file untouched, when the key is absent.
    pub fn set(&mut self, key: &str, new_value: &str) -> bool {
        for line in self.lines.iter_mut() {
            if let Line::Entry { key: k, value, raw } = line {
                if k == key {
                    if value != new_value {
                        *value = new_value.to_string();
                        *raw = None;
                    }
                    return true;
                }
            }
        }
        false
    }

    /// Variables in file order
    pub fn entries(&self) -> impl Iterator<Item = (&str, &str)> {
        self.lines.iter().filter_map(|line| match line {
            Line::Entry { key, value, .. } => Some((key.as_str(), value.as_str())),
            Line::Verbatim(_) => None,
        })
    }

    pub fn len(&self) -> usize {
        self.entries().count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Render the file, unchanged lines byte-for-byte
    pub fn render(&self) -> String {
        let mut out = String::new();
        for line in &self.lines {
            match line {
                Line::Verbatim(text) => out.push_str(text),
                Line::Entry { raw: Some(text), .. } => out.push_str(text),
                Line::Entry { key, value, raw: None } => out.push_str(&render_entry(key, value)),
            }
            out.push('\n');
        }
        out
    }
}

fn parse_assignment(raw: &str) -> Option<(String, String)> {
    let trimmed = raw.trim();
    if trimmed.is_empty() || trimmed.starts_with('#') {
        return None;
    }

    let trimmed = trimmed.strip_prefix("export ").unwrap_or(trimmed);
    let (key, value) = trimmed.split_once('=')?;
    let key = key.trim();
    if key.is_empty() || !key.chars().all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '.' || c == '-') {
        return None;
    }

    Some((key.to_string(), unquote(value.trim())))
}

fn unquote(value: &str) -> String {
    if value.len() >= 2 {
        if let Some(inner) = value.strip_prefix('"').and_then(|v| v.strip_suffix('"')) {
            return unescape_double_quoted(inner);
        }
        if let Some(inner) = value.strip_prefix('\'').and_then(|v| v.strip_suffix('\'')) {
            return inner.to_string();
        }
    }

    // Unquoted values may carry an inline comment
    match value.find(" #") {
        Some(pos) => value[..pos].trim_end().to_string(),
        None => value.to_string(),
    }
}

fn unescape_double_quoted(inner: &str) -> String {
    let mut out = String::with_capacity(inner.len());
    let mut chars = inner.chars().peekable();
    while let Some(c) = chars.next() {
        match (c, chars.peek()) {
            ('\\', Some('\\' | '"')) | ('$', Some('$')) => {
                if let Some(next) = chars.next() {
                    out.push(next);
                }
            }
            _ => out.push(c),
        }
    }
    out
}

fn render_entry(key: &str, value: &str) -> String {
    // Compose interpolates `$` outside single quotes
    if value.contains('$') && !value.contains('\'') {
        return format!("{}='{}'", key, value);
    }

    let needs_quotes = value.is_empty()
        || value
            .chars()
            .any(|c| c.is_whitespace() || matches!(c, '#' | '"' | '\'' | '\\' | '$'));
    if needs_quotes {
        let escaped = value
            .replace('\\', "\\\\")
            .replace('"', "\\\"")
            .replace('$', "$$");
        format!("{}=\"{}\"", key, escaped)
    } else {
        format!("{}={}", key, value)
    }
}

/// Whether `value` can be stored as a single env file line
pub fn is_single_line(value: &str) -> bool {
    !value.contains(['\n', '\r', '\0'])
}
