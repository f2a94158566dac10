//! Bounded dialogue history.
//!
//! [`TurnHistory`] owns the ordered turns submitted to the model. The window
//! is measured in user-role turns only; truncation always starts at a user
//! turn so that model replies and function call/result pairs stay attached
//! to the user turn that produced them.

use crate::llm::message::DialogueTurn;

/// Append-only turn list bounded by a user-turn window.
#[derive(Debug, Clone)]
pub struct TurnHistory {
    turns: Vec<DialogueTurn>,
    window: usize,
}

impl TurnHistory {
    /// Create an empty history keeping at most `window` user turns.
    ///
    /// A zero window is treated as one.
    pub fn new(window: usize) -> Self {
        Self {
            turns: Vec::new(),
            window: window.max(1),
        }
    }

    /// The configured user-turn window.
    pub fn window(&self) -> usize {
        self.window
    }

    /// Append one turn.
    pub fn append(&mut self, turn: DialogueTurn) {
        self.turns.push(turn);
    }

    /// Append several turns in order.
    pub fn extend(&mut self, turns: impl IntoIterator<Item = DialogueTurn>) {
        self.turns.extend(turns);
    }

    /// Ordered copy of the turns for submission.
    pub fn snapshot(&self) -> Vec<DialogueTurn> {
        self.turns.clone()
    }

    /// Borrow the turns.
    pub fn turns(&self) -> &[DialogueTurn] {
        &self.turns
    }

    /// Number of user-role turns.
    pub fn user_turn_count(&self) -> usize {
        self.turns.iter().filter(|t| t.is_user()).count()
    }

    /// Total number of turns.
    pub fn len(&self) -> usize {
        self.turns.len()
    }

    /// Whether the history is empty.
    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    /// Drop everything.
    pub fn clear(&mut self) {
        self.turns.clear();
    }

    /// Truncate to start at the `window`-th most recent user turn.
    ///
    /// Returns the number of dropped turns.
    pub fn enforce_window(&mut self) -> usize {
        let user_positions: Vec<usize> = self
            .turns
            .iter()
            .enumerate()
            .filter(|(_, t)| t.is_user())
            .map(|(i, _)| i)
            .collect();

        if user_positions.len() <= self.window {
            return 0;
        }

        let start = user_positions[user_positions.len() - self.window];
        self.turns.drain(..start);
        tracing::debug!(
            dropped = start,
            kept = self.turns.len(),
            window = self.window,
            "history window enforced"
        );
        start
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::message::Role;

    fn exchange(history: &mut TurnHistory, n: usize, with_tools: bool) {
        history.append(DialogueTurn::user_text(format!("question {n}")));
        if with_tools {
            history.append(DialogueTurn::new(Role::Model, Vec::new()));
            history.append(DialogueTurn::function_results([("query_items", "ok")]));
        }
        history.append(DialogueTurn::model_text(format!("answer {n}")));
    }

    #[test]
    fn within_window_is_untouched() {
        let mut history = TurnHistory::new(3);
        exchange(&mut history, 1, false);
        exchange(&mut history, 2, true);
        assert_eq!(history.enforce_window(), 0);
        assert_eq!(history.len(), 6);
    }

    #[test]
    fn window_two_keeps_last_two_user_turns() {
        for with_tools in [false, true] {
            let mut history = TurnHistory::new(2);
            for n in 1..=5 {
                exchange(&mut history, n, with_tools);
                history.enforce_window();
                assert!(history.user_turn_count() <= 2);
            }
            assert_eq!(history.user_turn_count(), 2);
            assert!(history.turns()[0].is_user());
            assert_eq!(history.turns()[0].text(), "question 4");
        }
    }

    #[test]
    fn function_pairs_stay_with_their_user_turn() {
        let mut history = TurnHistory::new(1);
        exchange(&mut history, 1, true);
        exchange(&mut history, 2, true);
        history.enforce_window();
        let roles: Vec<Role> = history.turns().iter().map(|t| t.role).collect();
        assert_eq!(
            roles,
            vec![Role::User, Role::Model, Role::Function, Role::Model]
        );
    }

    #[test]
    fn function_turns_do_not_count_as_user_turns() {
        let mut history = TurnHistory::new(1);
        history.append(DialogueTurn::user_text("only"));
        history.append(DialogueTurn::function_results([("a", "b"), ("c", "d")]));
        assert_eq!(history.user_turn_count(), 1);
        assert_eq!(history.enforce_window(), 0);
    }

    #[test]
    fn zero_window_clamps_to_one() {
        assert_eq!(TurnHistory::new(0).window(), 1);
    }

    #[test]
    fn snapshot_is_detached() {
        let mut history = TurnHistory::new(2);
        history.append(DialogueTurn::user_text("a"));
        let snap = history.snapshot();
        history.clear();
        assert_eq!(snap.len(), 1);
        assert!(history.is_empty());
    }
}
