//! Prompt assembly for the chat endpoints.
//!
//! Two context sources exist: snippets retrieved from the index, and text
//! extracted from files attached to the request. Attached-file context wins
//! outright: when any file context is present the retrieval step is skipped
//! and only the file text reaches the model.

use crate::models::RetrievedSnippet;
use crate::provider::ChatMessage;

/// Render retrieved snippets into the numbered block the system prompt
/// refers to. Entries are separated by a `---` rule.
pub fn build_context(snippets: &[RetrievedSnippet]) -> String {
    snippets
        .iter()
        .map(|s| format!("[{}] source: {}\n{}\n", s.rank, s.source, s.text))
        .collect::<Vec<_>>()
        .join("\n---\n")
}

fn rag_system_prompt(language: &str, context: &str) -> String {
    format!(
        "You are an assistant that answers questions in {language} using only \
the reference material below. If the material does not contain the answer, \
say so honestly instead of guessing. Cite the bracketed source numbers you \
relied on.\n\n# Reference material\n{context}"
    )
}

fn no_context_system_prompt(language: &str) -> String {
    format!(
        "You are an assistant that answers questions in {language}. No \
reference material was found for this question, so state clearly that you \
are answering from general knowledge."
    )
}

fn file_system_prompt(language: &str, file_context: &str) -> String {
    format!(
        "You are an assistant that answers questions in {language} about the \
attached files. Base your answer only on the attached content below.\n\n\
# Attached content\n{file_context}"
    )
}

/// Build the message list for one chat turn.
///
/// Precedence: if `file_context` is non-empty the retrieved snippets are
/// ignored entirely. With neither source present the model is told it has
/// no material to work from.
pub fn build_messages(
    language: &str,
    question: &str,
    snippets: &[RetrievedSnippet],
    file_context: &str,
) -> Vec<ChatMessage> {
    let system = if !file_context.trim().is_empty() {
        file_system_prompt(language, file_context)
    } else if snippets.is_empty() {
        no_context_system_prompt(language)
    } else {
        rag_system_prompt(language, &build_context(snippets))
    };

    vec![ChatMessage::system(&system), ChatMessage::user(question)]
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snippet(rank: usize, source: &str, text: &str) -> RetrievedSnippet {
        RetrievedSnippet {
            text: text.to_string(),
            source: source.to_string(),
            chunk_index: 0,
            rank,
        }
    }

    #[test]
    fn context_numbers_and_separates_entries() {
        let snippets = vec![snippet(1, "a.txt", "alpha"), snippet(2, "b.txt", "beta")];
        let context = build_context(&snippets);
        assert_eq!(
            context,
            "[1] source: a.txt\nalpha\n\n---\n[2] source: b.txt\nbeta\n"
        );
    }

    #[test]
    fn empty_snippets_render_empty_context() {
        assert_eq!(build_context(&[]), "");
    }

    #[test]
    fn file_context_suppresses_retrieval() {
        let snippets = vec![snippet(1, "a.txt", "retrieved text")];
        let messages = build_messages("English", "q?", &snippets, "[text:f.txt]\nattached\n");
        let system = messages[0].content.as_str().unwrap();
        assert!(system.contains("attached"));
        assert!(!system.contains("retrieved text"));
    }

    #[test]
    fn retrieval_used_without_file_context() {
        let snippets = vec![snippet(1, "a.txt", "retrieved text")];
        let messages = build_messages("English", "q?", &snippets, "");
        let system = messages[0].content.as_str().unwrap();
        assert!(system.contains("retrieved text"));
        assert!(system.contains("[1] source: a.txt"));
    }

    #[test]
    fn no_material_falls_back_to_general_knowledge_notice() {
        let messages = build_messages("Japanese", "q?", &[], "  ");
        let system = messages[0].content.as_str().unwrap();
        assert!(system.contains("general knowledge"));
    }

    #[test]
    fn user_question_is_last_message() {
        let messages = build_messages("English", "what is this?", &[], "");
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[1].role, "user");
        assert_eq!(messages[1].content.as_str().unwrap(), "what is this?");
    }

    #[test]
    fn language_is_interpolated() {
        let messages = build_messages("Japanese", "q?", &[], "");
        assert!(messages[0].content.as_str().unwrap().contains("Japanese"));
    }
}
