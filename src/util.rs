//! Small text helpers used by views and logging.

use chrono::Duration;

/// Escape user-provided text for Telegram's HTML parse mode.
pub fn escape_html(s: &str) -> String {
  let mut out = String::with_capacity(s.len());
  for ch in s.chars() {
    match ch {
      '&' => out.push_str("&amp;"),
      '<' => out.push_str("&lt;"),
      '>' => out.push_str("&gt;"),
      '"' => out.push_str("&quot;"),
      _ => out.push(ch),
    }
  }
  out
}

/// Fixed-width progress bar, e.g. `▓▓▓░░░░░░░`.
pub fn progress_bar(done: usize, total: usize, cells: usize) -> String {
  let filled = if total == 0 { 0 } else { (done.min(total) * cells) / total };
  let mut bar = "▓".repeat(filled);
  bar.push_str(&"░".repeat(cells - filled));
  bar
}

/// `3h 05m` style; negative durations read as zero.
pub fn human_duration(d: Duration) -> String {
  let mins = d.num_minutes().max(0);
  let (h, m) = (mins / 60, mins % 60);
  if h > 0 { format!("{h}h {m:02}m") } else { format!("{m}m") }
}

/// Cut to `max` characters, adding an ellipsis when something was dropped.
pub fn truncate_chars(s: &str, max: usize) -> String {
  if s.chars().count() <= max {
    return s.to_string();
  }
  let mut out: String = s.chars().take(max.saturating_sub(1)).collect();
  out.push('…');
  out
}

/// Log-safe truncation for large strings.
/// Avoids spamming logs with huge request/response payloads.
pub fn trunc_for_log(s: &str, max: usize) -> String {
  if s.len() <= max {
    return s.to_string();
  }
  let mut end = max;
  while !s.is_char_boundary(end) {
    end -= 1;
  }
  format!("{}… ({} bytes total)", &s[..end], s.len())
}
