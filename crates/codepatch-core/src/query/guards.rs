//! Shared guardrails for instruction size and result bounds.

pub const MAX_INSTRUCTION_LENGTH: usize = 2000;
pub const MAX_IDENTIFIERS: usize = 64;
pub const MAX_RESOLVE_RESULTS: usize = 50;
pub const MAX_FILES_TO_INCLUDE: usize = 20;
pub const MAX_CONTENT_LINES: usize = 5000;
pub const MIN_CONTENT_LINES: usize = 10;
pub const MAX_ALTERNATIVES: usize = 5;

pub fn clamp_int(value: usize, minimum: usize, maximum: usize) -> usize {
    value.max(minimum).min(maximum)
}

pub fn clamp_limit(value: usize, maximum: usize) -> usize {
    clamp_int(value, 1, maximum)
}

/// Trim and cap an instruction on a char boundary.
pub fn truncate_instruction(instruction: &str) -> String {
    let stripped = instruction.trim();
    if stripped.len() <= MAX_INSTRUCTION_LENGTH {
        return stripped.to_string();
    }
    let mut end = MAX_INSTRUCTION_LENGTH;
    while !stripped.is_char_boundary(end) {
        end -= 1;
    }
    stripped[..end].to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clamp_limit() {
        assert_eq!(clamp_limit(0, 10), 1);
        assert_eq!(clamp_limit(5, 10), 5);
        assert_eq!(clamp_limit(50, 10), 10);
    }

    #[test]
    fn test_truncate_instruction_respects_char_boundaries() {
        let long = "é".repeat(MAX_INSTRUCTION_LENGTH);
        let truncated = truncate_instruction(&long);
        assert!(truncated.len() <= MAX_INSTRUCTION_LENGTH);
        assert!(truncated.chars().all(|c| c == 'é'));
        assert_eq!(truncate_instruction("  update main.ts  "), "update main.ts");
    }
}
