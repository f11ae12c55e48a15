use crate::util::parse_json_object;
use context_clients::{ChatMessage, LlmClient};
use serde::Deserialize;

/// Classified intent for a cleaned query (§4.7.2).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Intent {
    Document,
    Greeting,
    Chitchat,
}

#[derive(Debug, Clone)]
pub struct IntentRouting {
    pub intent: Intent,
    pub call_tools: bool,
}

#[derive(Debug, Clone)]
pub struct Decomposition {
    pub needs_decomposition: bool,
    pub sub_queries: Vec<String>,
    pub strategy: String,
}

#[derive(Deserialize)]
struct RoutingJson {
    intent: String,
    call_tools: bool,
}

#[derive(Deserialize)]
struct DecompositionJson {
    needs_decomposition: bool,
    #[serde(default)]
    sub_queries: Vec<String>,
    #[serde(default = "default_strategy")]
    strategy: String,
}

fn default_strategy() -> String {
    "single".to_string()
}

const ROUTING_SYSTEM_PROMPT: &str = "Classify the user's message. Reply with strict JSON only: \
{\"intent\": \"document\" | \"greeting\" | \"chitchat\", \"call_tools\": true | false}. \
\"document\" means the message asks about the user's files or workspace content and needs \
retrieval (call_tools=true). \"greeting\" and \"chitchat\" never need retrieval \
(call_tools=false).";

const DECOMPOSITION_SYSTEM_PROMPT: &str = "Decide whether the user's question should be split \
into independent sub-questions before searching. Reply with strict JSON only: \
{\"needs_decomposition\": true | false, \"sub_queries\": [string, ...], \"strategy\": string}. \
If decomposition is not needed, set sub_queries to a single-element array containing the \
original question.";

/// Classifies a cleaned query into an intent and a tool-use decision
/// (§4.7.2). `search_mode = "knowledge"` and `"direct"` bypass this
/// entirely at the call site; this function only runs for `"auto"`.
pub async fn classify_intent(
    llm: &dyn LlmClient,
    query: &str,
) -> context_clients::Result<IntentRouting> {
    let messages = vec![
        ChatMessage::new("system", ROUTING_SYSTEM_PROMPT),
        ChatMessage::new("user", query),
    ];
    let raw = llm.chat_complete(messages, 128).await?;

    let parsed: RoutingJson = parse_json_object(&raw).unwrap_or(RoutingJson {
        intent: "document".to_string(),
        call_tools: true,
    });

    let intent = match parsed.intent.as_str() {
        "greeting" => Intent::Greeting,
        "chitchat" => Intent::Chitchat,
        _ => Intent::Document,
    };

    Ok(IntentRouting {
        intent,
        call_tools: parsed.call_tools,
    })
}

/// Decides whether the query needs sub-query decomposition (§4.7.3).
/// Falls back to "no decomposition, single sub-query" if the LLM
/// response can't be parsed, mirroring the original's `try/except`
/// fallback around query analysis.
pub async fn analyze_query(
    llm: &dyn LlmClient,
    query: &str,
) -> context_clients::Result<Decomposition> {
    let messages = vec![
        ChatMessage::new("system", DECOMPOSITION_SYSTEM_PROMPT),
        ChatMessage::new("user", query),
    ];
    let raw = llm.chat_complete(messages, 256).await?;

    let parsed: DecompositionJson = parse_json_object(&raw).unwrap_or(DecompositionJson {
        needs_decomposition: false,
        sub_queries: vec![query.to_string()],
        strategy: default_strategy(),
    });

    let sub_queries = if parsed.sub_queries.is_empty() {
        vec![query.to_string()]
    } else {
        parsed.sub_queries
    };

    Ok(Decomposition {
        needs_decomposition: parsed.needs_decomposition && sub_queries.len() > 1,
        sub_queries,
        strategy: parsed.strategy,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_routing_json_from_noisy_response() {
        let raw = "here you go:\n```json\n{\"intent\": \"greeting\", \"call_tools\": false}\n```";
        let parsed: RoutingJson = parse_json_object(raw).unwrap();
        assert_eq!(parsed.intent, "greeting");
        assert!(!parsed.call_tools);
    }

    #[test]
    fn unparsable_decomposition_response_yields_none() {
        let raw: Option<DecompositionJson> = parse_json_object("not json at all");
        assert!(raw.is_none());
    }
}
