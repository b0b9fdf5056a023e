use serde::{Deserialize, Serialize};

/// Linear undo/redo over full snapshots.
///
/// Always holds at least one entry, so `index < entries.len()`. A commit
/// made after undoing drops every entry past the current index.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct History<T: Clone> {
    entries: Vec<T>,
    index: usize,
}

impl<T: Clone> History<T> {
    pub fn new(initial: T) -> Self {
        History {
            entries: vec![initial],
            index: 0,
        }
    }

    pub fn commit(&mut self, snapshot: T) {
        self.entries.truncate(self.index + 1);
        self.entries.push(snapshot);
        self.index = self.entries.len() - 1;
    }

    pub fn can_undo(&self) -> bool {
        self.index > 0
    }

    pub fn can_redo(&self) -> bool {
        self.index + 1 < self.entries.len()
    }

    /// Steps back and returns a copy of the restored snapshot.
    pub fn undo(&mut self) -> Option<T> {
        if !self.can_undo() {
            return None;
        }
        self.index -= 1;
        Some(self.entries[self.index].clone())
    }

    /// Steps forward and returns a copy of the restored snapshot.
    pub fn redo(&mut self) -> Option<T> {
        if !self.can_redo() {
            return None;
        }
        self.index += 1;
        Some(self.entries[self.index].clone())
    }

    pub fn current(&self) -> &T {
        &self.entries[self.index]
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_undo_redo_round_trip() {
        let mut history = History::new(0);
        for state in 1..=5 {
            history.commit(state);
        }

        for expected in (0..5).rev() {
            assert_eq!(history.undo(), Some(expected));
        }
        assert_eq!(history.undo(), None);

        for expected in 1..=5 {
            assert_eq!(history.redo(), Some(expected));
        }
        assert_eq!(history.redo(), None);
        assert_eq!(*history.current(), 5);
    }

    #[test]
    fn test_commit_truncates_redo_tail() {
        let mut history = History::new("a");
        history.commit("b");
        history.commit("c");
        history.undo();
        history.undo();
        assert!(history.can_redo());

        history.commit("x");
        assert!(!history.can_redo());
        assert_eq!(history.len(), 2);
        assert_eq!(history.undo(), Some("a"));
        assert_eq!(history.redo(), Some("x"));
    }

    #[test]
    fn test_restored_snapshot_is_a_copy() {
        let mut history = History::new(vec![1]);
        history.commit(vec![1, 2]);

        let mut restored = history.undo().unwrap();
        restored.push(99);

        assert_eq!(*history.current(), vec![1]);
        assert_eq!(history.redo(), Some(vec![1, 2]));
    }
}
