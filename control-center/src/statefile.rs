// Line-oriented reader/editor for the agent's state files. The agent writes
// TOML-shaped text but absent license/feed values come out as a bare `null`,
// which no strict TOML parser accepts, so field extraction is done here by
// line. No validation beyond type coercion; unknown keys are ignored.

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Fields {
  entries: Vec<(String, String)>,
}

impl Fields {
  // Duplicate keys: last occurrence wins.
  fn insert(&mut self, key: String, raw: String) {
    if let Some(slot) = self.entries.iter_mut().find(|(k, _)| *k == key) {
      slot.1 = raw;
    } else {
      self.entries.push((key, raw));
    }
  }

  pub fn is_empty(&self) -> bool {
    self.entries.is_empty()
  }

  pub fn contains(&self, key: &str) -> bool {
    self.entries.iter().any(|(k, _)| k == key)
  }

  pub fn get_raw(&self, key: &str) -> Option<&str> {
    self
      .entries
      .iter()
      .find(|(k, _)| k == key)
      .map(|(_, v)| v.as_str())
  }

  // Decoded scalar; `null` and empty values read as absent.
  pub fn get_str(&self, key: &str) -> Option<String> {
    decode_scalar(self.get_raw(key)?)
  }

  pub fn get_bool(&self, key: &str) -> bool {
    match self.get_str(key) {
      Some(v) => matches!(v.to_ascii_lowercase().as_str(), "true" | "1" | "yes" | "on"),
      None => false,
    }
  }

  pub fn get_u64(&self, key: &str) -> Option<u64> {
    self.get_str(key)?.trim().parse::<u64>().ok()
  }

  // Single-line bracketed arrays only. Multi-line and nested arrays read as
  // empty rather than as a partial list.
  pub fn get_str_array(&self, key: &str) -> Vec<String> {
    match self.get_raw(key) {
      Some(raw) => parse_array(raw),
      None => Vec::new(),
    }
  }
}

// Top-level `key = value` pairs up to the first `[section]` header.
pub fn parse(text: &str) -> Fields {
  let mut fields = Fields::default();
  for line in text.lines() {
    let trimmed = line.trim();
    if trimmed.is_empty() || trimmed.starts_with('#') {
      continue;
    }
    if trimmed.starts_with('[') {
      break;
    }
    if let Some((key, raw)) = split_key_value(trimmed) {
      fields.insert(key, raw);
    }
  }
  fields
}

// Bodies of every repeated `[[name]]` table, in file order. A block ends at
// the next section header of any name.
pub fn sections(text: &str, name: &str) -> Vec<Fields> {
  let header = format!("[[{name}]]");
  let mut blocks = Vec::new();
  let mut current: Option<Fields> = None;

  for line in text.lines() {
    let trimmed = line.trim();
    if trimmed.is_empty() || trimmed.starts_with('#') {
      continue;
    }
    if trimmed.starts_with('[') {
      if let Some(block) = current.take() {
        blocks.push(block);
      }
      if trimmed == header {
        current = Some(Fields::default());
      }
      continue;
    }
    if let Some(block) = current.as_mut() {
      if let Some((key, raw)) = split_key_value(trimmed) {
        block.insert(key, raw);
      }
    }
  }

  if let Some(block) = current.take() {
    blocks.push(block);
  }
  blocks
}

// Replaces the top-level line for `key` in place, or prepends one if absent.
// Every other line, comments and sections included, passes through untouched.
pub fn set_top_level_string(text: &str, key: &str, value: &str) -> String {
  let rendered = format!("{key} = \"{}\"", escape_quoted(value));
  let mut out: Vec<String> = Vec::new();
  let mut replaced = false;
  let mut in_section = false;

  for line in text.lines() {
    let trimmed = line.trim();
    if !in_section && trimmed.starts_with('[') {
      in_section = true;
    }
    if !in_section && !trimmed.is_empty() && !trimmed.starts_with('#') {
      if let Some((k, _)) = split_key_value(trimmed) {
        if k == key {
          if !replaced {
            out.push(rendered.clone());
            replaced = true;
          }
          // Reads are last-wins; stale duplicates are dropped.
          continue;
        }
      }
    }
    out.push(line.to_string());
  }

  if !replaced {
    out.insert(0, rendered);
  }

  let mut result = out.join("\n");
  result.push('\n');
  result
}

fn split_key_value(line: &str) -> Option<(String, String)> {
  let eq = line.find('=')?;
  let key = line[..eq].trim();
  if key.is_empty() || key.contains('"') || key.contains('\'') {
    return None;
  }
  let raw = strip_trailing_comment(line[eq + 1..].trim());
  Some((key.to_string(), raw.to_string()))
}

fn strip_trailing_comment(raw: &str) -> &str {
  let mut in_quotes = false;
  let mut escaped = false;
  for (i, c) in raw.char_indices() {
    if escaped {
      escaped = false;
      continue;
    }
    match c {
      '\\' if in_quotes => escaped = true,
      '"' => in_quotes = !in_quotes,
      '#' if !in_quotes => return raw[..i].trim_end(),
      _ => {}
    }
  }
  raw
}

fn decode_scalar(raw: &str) -> Option<String> {
  if raw.is_empty() || raw == "null" {
    return None;
  }
  if let Some(rest) = raw.strip_prefix('"') {
    return Some(decode_quoted(rest));
  }
  if let Some(rest) = raw.strip_prefix('\'') {
    return Some(rest.strip_suffix('\'').unwrap_or(rest).to_string());
  }
  Some(raw.to_string())
}

// `rest` starts after the opening quote; decoding stops at the closing one.
fn decode_quoted(rest: &str) -> String {
  let mut out = String::with_capacity(rest.len());
  let mut chars = rest.chars();
  while let Some(c) = chars.next() {
    match c {
      '"' => break,
      '\\' => match chars.next() {
        Some('n') => out.push('\n'),
        Some('t') => out.push('\t'),
        Some('r') => out.push('\r'),
        Some(other) => out.push(other),
        None => break,
      },
      other => out.push(other),
    }
  }
  out
}

fn parse_array(raw: &str) -> Vec<String> {
  let Some(inner) = raw.strip_prefix('[').and_then(|r| r.strip_suffix(']')) else {
    return Vec::new();
  };

  let mut items: Vec<String> = Vec::new();
  let mut current = String::new();
  let mut in_quotes = false;
  let mut escaped = false;

  for c in inner.chars() {
    if escaped {
      current.push(c);
      escaped = false;
      continue;
    }
    match c {
      '\\' if in_quotes => {
        current.push(c);
        escaped = true;
      }
      '"' => {
        current.push(c);
        in_quotes = !in_quotes;
      }
      '[' | ']' if !in_quotes => return Vec::new(),
      ',' if !in_quotes => items.push(std::mem::take(&mut current)),
      other => current.push(other),
    }
  }
  if in_quotes {
    return Vec::new();
  }
  items.push(current);

  items
    .iter()
    .filter_map(|item| decode_scalar(item.trim()))
    .filter(|s| !s.is_empty())
    .collect()
}

fn escape_quoted(value: &str) -> String {
  value.replace('\\', "\\\\").replace('"', "\\\"")
}
