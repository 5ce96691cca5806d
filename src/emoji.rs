//! Single-emoji validation.
//!
//! An emoji here is one visual glyph: a pictographic base character optionally
//! followed by skin-tone modifiers, variation selectors, combining marks or tag
//! characters, with further bases allowed only when glued by a zero-width joiner.
//! A pair of regional indicators (a flag) also counts as one glyph.

const ZWJ: char = '\u{200D}';
/// Upper bound on code points in one accepted sequence (long ZWJ families stay below it).
const MAX_CODE_POINTS: usize = 16;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Class {
  Base,
  RegionalIndicator,
  Joiner,
  Modifier,
  Other,
}

fn classify(c: char) -> Class {
  let cp = c as u32;
  if c == ZWJ {
    return Class::Joiner;
  }
  if matches!(cp,
    0xFE00..=0xFE0F          // variation selectors
    | 0x1F3FB..=0x1F3FF      // skin tones
    | 0x0300..=0x036F        // combining diacritics
    | 0x20D0..=0x20FF        // combining marks for symbols (keycap)
    | 0xE0020..=0xE007F)     // tag sequence (subdivision flags)
  {
    return Class::Modifier;
  }
  if (0x1F1E6..=0x1F1FF).contains(&cp) {
    return Class::RegionalIndicator;
  }
  if matches!(cp,
    0x1F000..=0x1FAFF
    | 0x2600..=0x27BF
    | 0x2300..=0x23FF
    | 0x2190..=0x21FF
    | 0x2900..=0x297F
    | 0x2B00..=0x2BFF
    | 0x25A0..=0x25FF
    | 0x3030 | 0x303D | 0x3297 | 0x3299
    | 0x00A9 | 0x00AE | 0x203C | 0x2049 | 0x2122 | 0x2139 | 0x24C2)
  {
    return Class::Base;
  }
  Class::Other
}

/// True if `input` (after trimming) is exactly one emoji glyph.
pub fn is_single_emoji(input: &str) -> bool {
  let s = input.trim();
  if s.is_empty() || s.chars().count() > MAX_CODE_POINTS {
    return false;
  }

  let mut glyphs = 0usize;
  let mut prev: Option<Class> = None;
  let mut open_flag = false;

  for c in s.chars() {
    let class = classify(c);
    match class {
      Class::Other => return false,
      Class::Base => {
        if prev != Some(Class::Joiner) {
          glyphs += 1;
        }
        open_flag = false;
      }
      Class::RegionalIndicator => {
        if open_flag {
          // second half of a flag
          open_flag = false;
        } else {
          if prev != Some(Class::Joiner) {
            glyphs += 1;
          }
          open_flag = true;
        }
      }
      Class::Joiner => {
        if !matches!(prev, Some(Class::Base) | Some(Class::Modifier) | Some(Class::RegionalIndicator)) {
          return false;
        }
      }
      Class::Modifier => {
        if prev.is_none() || prev == Some(Class::Joiner) {
          return false;
        }
      }
    }
    prev = Some(class);
  }

  prev != Some(Class::Joiner) && glyphs == 1
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn accepts_plain_emoji() {
    for e in ["💪", "🔥", "⭐", "☕", "❤️", "✅", "🚀", "🧘"] {
      assert!(is_single_emoji(e), "{e} should be accepted");
    }
  }

  #[test]
  fn accepts_compound_emoji() {
    assert!(is_single_emoji("👍🏽"));
    assert!(is_single_emoji("🇩🇪"));
    assert!(is_single_emoji("👨‍💻"));
    assert!(is_single_emoji("👨‍👩‍👧‍👦"));
    assert!(is_single_emoji("🏳️‍🌈"));
    assert!(is_single_emoji("  🎯  "));
  }

  #[test]
  fn rejects_text_and_multiples() {
    for s in ["", " ", "a", "1", "ok", "💪💪", "💪a", "!", "🇩🇪🇫🇷", "\u{FE0F}", "💪\u{200D}", "💪 🔥"] {
      assert!(!is_single_emoji(s), "{s:?} should be rejected");
    }
  }
}
