//! Context assembly for provider calls.

use deskbot_core::Turn;

/// Assemble the provider context from stored turns.
///
/// Keeps the most recent `window` turns and prepends a synthetic system
/// turn when a prompt is configured, so the system prompt survives any
/// truncation of older history.
pub fn assemble(system_prompt: Option<&str>, turns: &[Turn], window: usize) -> Vec<Turn> {
    let start = turns.len().saturating_sub(window);
    let clipped = &turns[start..];

    let mut context = Vec::with_capacity(clipped.len() + 1);
    if let Some(prompt) = system_prompt {
        context.push(Turn::system(prompt));
    }
    context.extend_from_slice(clipped);
    context
}

#[cfg(test)]
mod tests {
    use super::*;
    use deskbot_core::Role;

    fn turns(n: u64) -> Vec<Turn> {
        (0..n).map(|seq| Turn::user(seq, format!("m{seq}"))).collect()
    }

    #[test]
    fn test_clips_to_most_recent_window() {
        let context = assemble(None, &turns(10), 3);
        assert_eq!(context.len(), 3);
        assert_eq!(context[0].seq, 7);
        assert_eq!(context[2].seq, 9);
    }

    #[test]
    fn test_system_turn_survives_clipping() {
        let context = assemble(Some("Be helpful."), &turns(10), 3);
        assert_eq!(context.len(), 4);
        assert_eq!(context[0].role, Role::System);
        assert_eq!(context[0].content, "Be helpful.");
        assert_eq!(context[1].seq, 7);
    }

    #[test]
    fn test_short_history_is_untouched() {
        let context = assemble(None, &turns(2), 40);
        assert_eq!(context.len(), 2);
        assert_eq!(context[0].seq, 0);
    }

    #[test]
    fn test_empty_history_with_prompt() {
        let context = assemble(Some("Be helpful."), &[], 40);
        assert_eq!(context.len(), 1);
        assert_eq!(context[0].role, Role::System);
    }
}
