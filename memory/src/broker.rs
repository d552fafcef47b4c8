use crate::memory::MemorySnippet;

/// Formats retrieved memories into a context block for the generation prompt.
///
/// Uses a rough 4-characters-per-token estimate and stops adding memories once
/// `max_token_estimate` would be exceeded.
pub fn format_memories_for_prompt(memories: &[MemorySnippet], max_token_estimate: usize) -> String {
    if memories.is_empty() {
        return String::new();
    }

    let estimate_tokens = |s: &str| -> usize { s.len() / 4 };

    let mut result = String::from("Relevant previous interactions:\n");
    let mut total_tokens = estimate_tokens(&result);

    for (i, memory) in memories.iter().enumerate() {
        let formatted = format!("{}. {}\n", i + 1, memory.content.trim());
        let tokens = estimate_tokens(&formatted);

        if total_tokens + tokens > max_token_estimate {
            result.push_str("(additional relevant context omitted due to length constraints)\n");
            break;
        }

        result.push_str(&formatted);
        total_tokens += tokens;
    }

    result.push('\n');
    result
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_memories_format_to_nothing() {
        assert_eq!(format_memories_for_prompt(&[], 100), "");
    }

    #[test]
    fn test_memories_are_numbered_in_rank_order() {
        let memories = vec![
            MemorySnippet::new("user likes pizza"),
            MemorySnippet::new("user lives in Lyon"),
        ];
        let text = format_memories_for_prompt(&memories, 1000);
        assert_eq!(
            text,
            "Relevant previous interactions:\n1. user likes pizza\n2. user lives in Lyon\n\n"
        );
    }

    #[test]
    fn test_budget_truncates() {
        let memories = vec![
            MemorySnippet::new("a".repeat(40)),
            MemorySnippet::new("b".repeat(400)),
        ];
        let text = format_memories_for_prompt(&memories, 30);
        assert!(text.contains("1. aaaa"));
        assert!(!text.contains("bbbb"));
        assert!(text.contains("omitted due to length constraints"));
    }
}
