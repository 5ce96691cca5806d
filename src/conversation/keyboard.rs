//! Platform-neutral inline keyboards.

use crate::conversation::callback::Action;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ButtonAction {
  Callback(String),
  Url(String),
  CopyText(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Button {
  pub label: String,
  pub action: ButtonAction,
}

impl Button {
  pub fn new(label: impl Into<String>, action: Action) -> Self {
    Self { label: label.into(), action: ButtonAction::Callback(action.encode()) }
  }

  pub fn url(label: impl Into<String>, url: impl Into<String>) -> Self {
    Self { label: label.into(), action: ButtonAction::Url(url.into()) }
  }

  pub fn copy(label: impl Into<String>, text: impl Into<String>) -> Self {
    Self { label: label.into(), action: ButtonAction::CopyText(text.into()) }
  }

  /// The callback action this button triggers, if any.
  pub fn callback(&self) -> Option<&str> {
    match &self.action {
      ButtonAction::Callback(data) => Some(data),
      _ => None,
    }
  }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Keyboard {
  pub rows: Vec<Vec<Button>>,
}

impl Keyboard {
  pub fn new() -> Self { Self::default() }

  pub fn row(mut self, buttons: Vec<Button>) -> Self {
    if !buttons.is_empty() {
      self.rows.push(buttons);
    }
    self
  }

  pub fn button(self, label: impl Into<String>, action: Action) -> Self {
    self.row(vec![Button::new(label, action)])
  }

  /// Lay buttons out `per_row` at a time.
  pub fn grid(mut self, buttons: Vec<Button>, per_row: usize) -> Self {
    let mut it = buttons.into_iter().peekable();
    while it.peek().is_some() {
      let row: Vec<Button> = it.by_ref().take(per_row.max(1)).collect();
      self.rows.push(row);
    }
    self
  }

  pub fn is_empty(&self) -> bool { self.rows.is_empty() }

  /// All callback payloads, row by row. Handy for asserting on menus.
  pub fn callbacks(&self) -> Vec<&str> {
    self.rows.iter().flatten().filter_map(|b| b.callback()).collect()
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn grid_splits_rows() {
    let buttons: Vec<Button> = (0..5).map(|i| Button::new(i.to_string(), Action::ShowTask(i))).collect();
    let kb = Keyboard::new().grid(buttons, 2).button("Back", Action::MainMenu);
    let sizes: Vec<usize> = kb.rows.iter().map(|r| r.len()).collect();
    assert_eq!(sizes, vec![2, 2, 1, 1]);
    assert_eq!(kb.callbacks().last(), Some(&"main_menu"));
  }

  #[test]
  fn empty_rows_are_dropped() {
    assert!(Keyboard::new().row(Vec::new()).is_empty());
  }
}
