//! Namespace prefixes in scope while walking a document.

/// Tracks the namespace declarations in scope, one frame per open element depth.
/// Declarations are `(prefix, uri)` pairs of string pool indices.
#[derive(Clone, Debug, Default)]
pub struct NamespaceStack {
    frames: Vec<Vec<(i32, i32)>>,
}

impl NamespaceStack {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reset(&mut self) {
        self.frames.clear();
    }

    /// Adds a declaration to the current frame, opening the first frame if there is none.
    pub fn push(&mut self, prefix: i32, uri: i32) {
        if self.frames.is_empty() {
            self.frames.push(Vec::new());
        }

        if let Some(frame) = self.frames.last_mut() {
            frame.push((prefix, uri));
        }
    }

    /// Removes the most recent declaration in the current frame.
    /// Returns false if the current frame has no declarations.
    pub fn pop(&mut self) -> bool {
        self.frames
            .last_mut()
            .and_then(|frame| frame.pop())
            .is_some()
    }

    /// Removes the most recent matching declaration from the current frame.
    pub fn pop_pair(&mut self, prefix: i32, uri: i32) -> bool {
        let Some(frame) = self.frames.last_mut() else {
            return false;
        };

        match frame.iter().rposition(|pair| *pair == (prefix, uri)) {
            Some(idx) => {
                frame.remove(idx);
                true
            }
            None => false,
        }
    }

    pub fn increase_depth(&mut self) {
        self.frames.push(Vec::new());
    }

    /// Closes the current frame, discarding any declarations that were never popped.
    /// The bottom frame is never discarded.
    pub fn decrease_depth(&mut self) {
        if self.frames.len() > 1 {
            self.frames.pop();
        }
    }

    pub fn depth(&self) -> usize {
        self.frames.len()
    }

    pub fn current_count(&self) -> usize {
        self.frames.last().map(Vec::len).unwrap_or(0)
    }

    pub fn total_count(&self) -> usize {
        self.frames.iter().map(Vec::len).sum()
    }

    /// The number of declarations in the first `depth` frames.
    pub fn accumulated_count(&self, depth: usize) -> usize {
        self.frames.iter().take(depth).map(Vec::len).sum()
    }

    /// Finds the prefix bound to `uri`, searching the innermost frame first.
    pub fn find_prefix(&self, uri: i32) -> Option<i32> {
        self.innermost_first()
            .find(|(_, pair_uri)| *pair_uri == uri)
            .map(|(prefix, _)| prefix)
    }

    /// Finds the URI bound to `prefix`, searching the innermost frame first.
    pub fn find_uri(&self, prefix: i32) -> Option<i32> {
        self.innermost_first()
            .find(|(pair_prefix, _)| *pair_prefix == prefix)
            .map(|(_, uri)| uri)
    }

    /// The prefix of the declaration at `position`, counting from the bottom frame.
    pub fn prefix_at(&self, position: usize) -> Option<i32> {
        self.flattened().nth(position).map(|(prefix, _)| prefix)
    }

    pub fn uri_at(&self, position: usize) -> Option<i32> {
        self.flattened().nth(position).map(|(_, uri)| uri)
    }

    fn flattened(&self) -> impl Iterator<Item = (i32, i32)> + '_ {
        self.frames.iter().flatten().copied()
    }

    fn innermost_first(&self) -> impl Iterator<Item = (i32, i32)> + '_ {
        self.frames.iter().rev().flat_map(|frame| frame.iter().rev()).copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn push_opens_frame() {
        let mut stack = NamespaceStack::new();
        assert_eq!(stack.depth(), 0);
        stack.push(0, 1);

        assert_eq!(stack.depth(), 1);
        assert_eq!(stack.current_count(), 1);
        assert_eq!(stack.total_count(), 1);
    }

    #[test]
    fn inner_declarations_shadow_outer() {
        let mut stack = NamespaceStack::new();
        stack.increase_depth();
        stack.push(0, 1);
        stack.increase_depth();
        stack.push(0, 2);

        assert_eq!(stack.find_uri(0), Some(2));
        assert_eq!(stack.find_prefix(1), Some(0));
        assert_eq!(stack.total_count(), 2);

        stack.decrease_depth();
        assert_eq!(stack.find_uri(0), Some(1));
        assert_eq!(stack.find_prefix(2), None);
    }

    #[test]
    fn newest_in_frame_wins() {
        let mut stack = NamespaceStack::new();
        stack.push(5, 1);
        stack.push(5, 2);
        assert_eq!(stack.find_uri(5), Some(2));

        assert!(stack.pop());
        assert_eq!(stack.find_uri(5), Some(1));
    }

    #[test]
    fn pop_on_empty_is_noop() {
        let mut stack = NamespaceStack::new();
        assert!(!stack.pop());
        assert!(!stack.pop_pair(0, 1));

        stack.increase_depth();
        assert!(!stack.pop());
        assert_eq!(stack.current_count(), 0);
        assert_eq!(stack.total_count(), 0);
    }

    #[test]
    fn pop_pair_keeps_order() {
        let mut stack = NamespaceStack::new();
        stack.push(0, 1);
        stack.push(2, 3);
        stack.push(4, 5);

        assert!(stack.pop_pair(2, 3));
        assert!(!stack.pop_pair(2, 3));
        assert_eq!(stack.prefix_at(0), Some(0));
        assert_eq!(stack.prefix_at(1), Some(4));
        assert_eq!(stack.uri_at(1), Some(5));
        assert_eq!(stack.uri_at(2), None);
    }

    #[test]
    fn bottom_frame_survives() {
        let mut stack = NamespaceStack::new();
        stack.push(0, 1);
        stack.decrease_depth();
        stack.decrease_depth();

        assert_eq!(stack.depth(), 1);
        assert_eq!(stack.find_uri(0), Some(1));
    }

    #[test]
    fn unpopped_declarations_discarded_with_frame() {
        let mut stack = NamespaceStack::new();
        stack.increase_depth();
        stack.increase_depth();
        stack.push(0, 1);
        stack.push(2, 3);
        stack.decrease_depth();

        assert_eq!(stack.total_count(), 0);
        assert_eq!(stack.depth(), 1);
    }

    #[test]
    fn accumulated_counts() {
        let mut stack = NamespaceStack::new();
        stack.push(0, 1);
        stack.increase_depth();
        stack.push(2, 3);
        stack.push(4, 5);

        assert_eq!(stack.accumulated_count(0), 0);
        assert_eq!(stack.accumulated_count(1), 1);
        assert_eq!(stack.accumulated_count(2), 3);
        assert_eq!(stack.accumulated_count(99), 3);
        assert_eq!(stack.total_count(), 3);

        stack.reset();
        assert_eq!(stack.depth(), 0);
        assert_eq!(stack.total_count(), 0);
    }
}
