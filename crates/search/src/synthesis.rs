use context_clients::{ChatMessage, LlmClient, TokenStream};

/// One verified chunk handed to synthesis: its position in the fused
/// result set (or sub-query index under MultiPath), its source
/// reference, and the extracted content the verifier kept.
#[derive(Debug, Clone)]
pub struct SynthesisInput {
    pub index: usize,
    pub source: String,
    pub content: String,
    pub confidence: f32,
}

const DIRECT_ANSWER_SYSTEM_PROMPT: &str =
    "You are a helpful assistant for a local document workspace. \
Respond to the user naturally and concisely.";

const GREETING_SYSTEM_PROMPT: &str =
    "You are a friendly assistant for a local document workspace. \
When greeting users, be warm and brief.";

const SIMPLE_AGGREGATION_SYSTEM_PROMPT: &str =
    "You answer questions using only the numbered sources provided. Cite sources inline as \
[1], [2], etc. matching their index. If the sources do not contain enough information, say so \
plainly instead of guessing.";

/// System prompt for the fully-direct path (`search_mode = "direct"` or
/// `payload.mode = "chat"`): no retrieval happens at all.
#[must_use]
pub fn direct_answer_system_prompt() -> &'static str {
    DIRECT_ANSWER_SYSTEM_PROMPT
}

/// System prompt for the intent-routed direct-answer path when
/// `call_tools = false`.
#[must_use]
pub fn no_tools_system_prompt(intent_is_greeting: bool) -> &'static str {
    if intent_is_greeting {
        GREETING_SYSTEM_PROMPT
    } else {
        DIRECT_ANSWER_SYSTEM_PROMPT
    }
}

/// Streams the final synthesized answer from verified chunks (§4.7.4
/// step 6). Returns a plain "no relevant documents" stand-in stream
/// when `inputs` is empty, rather than calling the LLM with no sources.
pub async fn stream_simple_aggregation(
    llm: &dyn LlmClient,
    query: &str,
    inputs: &[SynthesisInput],
    max_tokens: u32,
) -> context_clients::Result<TokenStream> {
    let user_content = build_user_content(query, inputs);
    let messages = vec![
        ChatMessage::new("system", SIMPLE_AGGREGATION_SYSTEM_PROMPT),
        ChatMessage::new("user", user_content),
    ];
    llm.stream_chat_complete(messages, max_tokens).await
}

fn build_user_content(query: &str, inputs: &[SynthesisInput]) -> String {
    let mut content = format!("Question: {query}\n\nSources:\n");
    for input in inputs {
        content.push_str(&format!(
            "[{}] (from {}, confidence {:.2})\n{}\n\n",
            input.index + 1,
            input.source,
            input.confidence,
            input.content
        ));
    }
    content
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn user_content_numbers_sources_from_one() {
        let inputs = vec![
            SynthesisInput {
                index: 0,
                source: "report.pdf".to_string(),
                content: "Q2 revenue rose 4%.".to_string(),
                confidence: 0.9,
            },
            SynthesisInput {
                index: 1,
                source: "notes.md".to_string(),
                content: "Hiring paused in Q2.".to_string(),
                confidence: 0.7,
            },
        ];
        let content = build_user_content("How did Q2 go?", &inputs);
        assert!(content.contains("[1] (from report.pdf"));
        assert!(content.contains("[2] (from notes.md"));
    }
}
