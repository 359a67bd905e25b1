//! Small utility helpers used across modules.

/// Very small and safe string templating.
/// Replaces occurrences of `{key}` in the template with provided values.
/// This is intentionally simple (no nested/conditional logic).
pub fn fill_template(tpl: &str, pairs: &[(&str, &str)]) -> String {
  let mut out = tpl.to_string();
  for (k, v) in pairs {
    let needle = format!("{{{}}}", k);
    out = out.replace(&needle, v);
  }
  out
}

/// Escape text for embedding in XML or HTML (element content and quoted attributes).
pub fn escape_markup(s: &str) -> String {
  let mut out = String::with_capacity(s.len());
  for ch in s.chars() {
    match ch {
      '&' => out.push_str("&amp;"),
      '<' => out.push_str("&lt;"),
      '>' => out.push_str("&gt;"),
      '"' => out.push_str("&quot;"),
      '\'' => out.push_str("&apos;"),
      _ => out.push(ch),
    }
  }
  out
}

/// Make a filename safe to place inside a quoted `Content-Disposition` value.
/// Anything outside printable ASCII, plus quotes and backslashes, becomes `_`.
pub fn header_safe_filename(name: &str) -> String {
  let cleaned: String = name
    .chars()
    .map(|c| if c.is_ascii_graphic() || c == ' ' { c } else { '_' })
    .map(|c| if c == '"' || c == '\\' { '_' } else { c })
    .collect();
  if cleaned.trim().is_empty() { "quiz.zip".into() } else { cleaned }
}

/// Log-safe truncation for large strings.
/// Avoids spamming logs with huge converter diagnostics.
pub fn trunc_for_log(s: &str, max: usize) -> String {
  if s.len() <= max {
    return s.to_string();
  }
  let mut end = max;
  while !s.is_char_boundary(end) { end -= 1; }
  format!("{}… ({} bytes total)", &s[..end], s.len())
}
