//! Password prompt heuristic.

/// Shortest prompt we recognise; the trailing space is optional.
const MIN_PROMPT: &str = "x@x's password:";

/// Real prompts are short; larger chunks are ordinary output.
pub const MAX_PROMPT_CHUNK: usize = 1024;

/// Whether `chunk` looks like an interactive password prompt.
///
/// Only the tail of the chunk is inspected: chunk boundaries do not follow
/// terminal lines, so a prompt is recognised by its suffix alone.
pub fn is_password_prompt(chunk: &[u8]) -> bool {
    let min_len = MIN_PROMPT.len();
    if chunk.len() < min_len || chunk.len() > MAX_PROMPT_CHUNK {
        return false;
    }
    let tail = String::from_utf8_lossy(&chunk[chunk.len() - min_len..]);
    tail.trim().to_lowercase().ends_with(" password:")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ssh_prompt() {
        assert!(is_password_prompt(b"bob@10.0.0.1's password: "));
        assert!(is_password_prompt(b"bob@10.0.0.1's password:"));
    }

    #[test]
    fn test_case_insensitive() {
        assert!(is_password_prompt(b"Enter your Password:"));
    }

    #[test]
    fn test_not_a_prompt() {
        assert!(!is_password_prompt(b"Permission denied, please try again."));
        assert!(!is_password_prompt(b"password:"));
        assert!(!is_password_prompt(b""));
    }

    #[test]
    fn test_oversized_chunk() {
        let mut chunk = vec![b'a'; 2000 - " password:".len()];
        chunk.extend_from_slice(b" password:");
        assert_eq!(chunk.len(), 2000);
        assert!(!is_password_prompt(&chunk));
    }

    #[test]
    fn test_prompt_at_size_limit() {
        let mut chunk = vec![b'a'; MAX_PROMPT_CHUNK - " password:".len()];
        chunk.extend_from_slice(b" password:");
        assert!(is_password_prompt(&chunk));
    }
}
