//! Fixed-length digit entry for OTP and MPIN fields.
//!
//! Models the cell array and focus behavior the entry widgets render. The
//! widgets stay dumb: every keystroke and paste is routed through here so
//! the distribution and focus rules are testable without a UI.

/// A row of single-digit cells with a tracked focus index.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DigitEntry {
    cells: Vec<Option<char>>,
    focus: usize,
}

impl DigitEntry {
    /// Creates an empty entry with `len` cells, focused on the first.
    #[must_use]
    pub fn new(len: usize) -> Self {
        Self {
            cells: vec![None; len],
            focus: 0,
        }
    }

    /// Number of cells.
    #[must_use]
    pub fn len(&self) -> usize {
        self.cells.len()
    }

    /// Whether every cell is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.cells.iter().all(Option::is_none)
    }

    /// Currently focused cell index.
    #[must_use]
    pub const fn focus(&self) -> usize {
        self.focus
    }

    /// Applies input arriving at cell `index`.
    ///
    /// A single digit fills the addressed cell and advances focus (clamped
    /// to the last cell). Anything longer is a paste: non-digits are
    /// stripped, the remainder truncated to the field length and distributed
    /// left-to-right starting from cell 0 regardless of `index`; focus lands
    /// on the first cell past the last filled one, or the last cell when the
    /// paste fills every slot. Input with no digits at all is ignored.
    pub fn input(&mut self, index: usize, value: &str) {
        let digits: Vec<char> = value
            .chars()
            .filter(char::is_ascii_digit)
            .take(self.cells.len())
            .collect();

        match digits.as_slice() {
            [] => {}
            [digit] if value.chars().count() == 1 => {
                if let Some(cell) = self.cells.get_mut(index) {
                    *cell = Some(*digit);
                    self.focus = (index + 1).min(self.cells.len() - 1);
                }
            }
            pasted => {
                for (cell, digit) in self.cells.iter_mut().zip(pasted.iter()) {
                    *cell = Some(*digit);
                }
                self.focus = pasted.len().min(self.cells.len() - 1);
            }
        }
    }

    /// Applies a backspace at cell `index`: an empty cell moves focus to the
    /// previous cell, a filled cell clears in place.
    pub fn backspace(&mut self, index: usize) {
        match self.cells.get_mut(index) {
            Some(cell @ Some(_)) => {
                *cell = None;
                self.focus = index;
            }
            Some(None) => {
                self.focus = index.saturating_sub(1);
            }
            None => {}
        }
    }

    /// The joined value, only when every cell is filled.
    #[must_use]
    pub fn value(&self) -> Option<String> {
        self.cells.iter().copied().collect::<Option<String>>()
    }

    /// Clears every cell and refocuses the first. Invoked after a rejected
    /// MPIN so no partial state is left behind.
    pub fn reset(&mut self) {
        for cell in &mut self.cells {
            *cell = None;
        }
        self.focus = 0;
    }
}

#[cfg(test)]
mod tests {
    use test_case::test_case;

    use super::*;

    #[test]
    fn test_single_digits_advance_focus() {
        let mut entry = DigitEntry::new(6);
        entry.input(0, "4");
        entry.input(1, "2");
        assert_eq!(entry.focus(), 2);
        assert_eq!(entry.value(), None);
    }

    #[test]
    fn test_full_paste_fills_and_focuses_last_cell() {
        let mut entry = DigitEntry::new(6);
        entry.input(0, "123456");
        assert_eq!(entry.value(), Some("123456".to_string()));
        assert_eq!(entry.focus(), 5);
    }

    #[test_case(0; "paste at first cell")]
    #[test_case(3; "paste at a middle cell")]
    #[test_case(5; "paste at the last cell")]
    fn test_paste_distributes_from_cell_zero(index: usize) {
        let mut entry = DigitEntry::new(6);
        entry.input(index, "987654");
        assert_eq!(entry.value(), Some("987654".to_string()));
        assert_eq!(entry.focus(), 5);
    }

    #[test]
    fn test_partial_paste_focuses_first_unfilled_cell() {
        let mut entry = DigitEntry::new(6);
        entry.input(0, "123");
        assert_eq!(entry.value(), None);
        assert_eq!(entry.focus(), 3);
    }

    #[test]
    fn test_overlong_paste_is_truncated() {
        let mut entry = DigitEntry::new(6);
        entry.input(0, "12345678");
        assert_eq!(entry.value(), Some("123456".to_string()));
        assert_eq!(entry.focus(), 5);
    }

    #[test]
    fn test_non_digits_are_stripped_before_distribution() {
        let mut entry = DigitEntry::new(6);
        entry.input(0, "1a2b3c4d");
        assert_eq!(entry.focus(), 4);
        entry.input(4, "5");
        entry.input(5, "6");
        assert_eq!(entry.value(), Some("123456".to_string()));
    }

    #[test]
    fn test_letters_only_input_is_ignored() {
        let mut entry = DigitEntry::new(6);
        entry.input(0, "x");
        assert!(entry.is_empty());
        assert_eq!(entry.focus(), 0);
    }

    #[test]
    fn test_backspace_on_empty_cell_moves_back() {
        let mut entry = DigitEntry::new(6);
        entry.input(0, "1");
        entry.backspace(1);
        assert_eq!(entry.focus(), 0);
        entry.backspace(0);
        assert!(entry.is_empty());
        assert_eq!(entry.focus(), 0);
    }

    #[test]
    fn test_reset_clears_all_cells_and_focus() {
        let mut entry = DigitEntry::new(6);
        entry.input(0, "123456");
        entry.reset();
        assert!(entry.is_empty());
        assert_eq!(entry.focus(), 0);
        assert_eq!(entry.value(), None);
    }
}
