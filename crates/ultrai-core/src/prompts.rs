use ultrai_gateway::ChatMessage;
use ultrai_types::ModelResponse;

pub const INITIAL_SYSTEM_PROMPT: &str = "independent draft round";
pub const META_SYSTEM_PROMPT: &str = "META revision round (R2)";
pub const META_INSTRUCTION: &str = "Do not assume any response is true. Review your peers' \
     INITIAL drafts. Revise your answer accordingly. List contradictions you resolved and \
     what changed.";
pub const ULTRA_SYSTEM_PROMPT: &str = "You are the ULTRAI neutral synthesis model (R3).";
pub const ULTRA_CONSTRAINTS: &str = "Do not introduce new information beyond the META drafts. \
     Do not use your own knowledge. Omit low-confidence claims where the models disagree. \
     Your role is to merge and synthesize, not to contribute.";
pub const ULTRA_TASK: &str = "Merge convergences, resolve contradictions, and cite retained \
     and omitted claims. Produce one coherent synthesis with confidence notes and basic stats.";

/// Peer drafts quoted into the R2 prompt are capped per draft.
pub const PEER_DRAFT_CHARS: usize = 500;

/// Char-boundary-safe truncation.
pub fn truncate_chars(input: &str, max_chars: usize) -> String {
    if input.chars().count() <= max_chars {
        return input.to_string();
    }
    input.chars().take(max_chars).collect()
}

pub fn initial_messages(query: &str) -> Vec<ChatMessage> {
    vec![
        ChatMessage::system(INITIAL_SYSTEM_PROMPT),
        ChatMessage::user(query),
    ]
}

/// Non-error R1 drafts formatted as `- <model>: <text>` lines. Failed models
/// never appear as peers.
pub fn peers_block(records: &[ModelResponse]) -> String {
    records
        .iter()
        .filter(|r| !r.error)
        .map(|r| format!("- {}: {}", r.model, truncate_chars(&r.text, PEER_DRAFT_CHARS)))
        .collect::<Vec<_>>()
        .join("\n")
}

pub fn meta_messages(query: &str, initial_records: &[ModelResponse]) -> Vec<ChatMessage> {
    let user = format!(
        "{query}\n\n{META_INSTRUCTION}\n{}",
        peers_block(initial_records)
    );
    vec![ChatMessage::system(META_SYSTEM_PROMPT), ChatMessage::user(user)]
}

/// R3 prompt body, in order: the query verbatim, the neutrality constraints,
/// the truncated META drafts, the synthesis task.
pub fn ultra_messages(
    query: &str,
    meta_records: &[ModelResponse],
    max_chars_per_draft: usize,
) -> Vec<ChatMessage> {
    let drafts = meta_records
        .iter()
        .filter(|r| !r.error)
        .map(|r| {
            format!(
                "- {}: {}",
                r.model,
                truncate_chars(&r.text, max_chars_per_draft)
            )
        })
        .collect::<Vec<_>>()
        .join("\n");
    let user = format!("{query}\n\n{ULTRA_CONSTRAINTS}\n\n{drafts}\n\n{ULTRA_TASK}");
    vec![
        ChatMessage::system(ULTRA_SYSTEM_PROMPT),
        ChatMessage::user(user),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use ultrai_types::Round;

    fn record(model: &str, text: &str) -> ModelResponse {
        ModelResponse::ok(Round::Initial, model, text, 5)
    }

    #[test]
    fn truncate_respects_char_boundaries() {
        assert_eq!(truncate_chars("héllo wörld", 5), "héllo");
        assert_eq!(truncate_chars("short", 100), "short");
        assert_eq!(truncate_chars("", 10), "");
    }

    #[test]
    fn peers_block_skips_error_records_and_caps_length() {
        let long = "x".repeat(2_000);
        let records = vec![
            record("a", &long),
            ModelResponse::failed(Round::Initial, "b"),
            record("c", "fine"),
        ];
        let block = peers_block(&records);
        assert!(!block.contains("- b:"));
        assert!(block.contains("- c: fine"));
        let a_line = block.lines().next().unwrap();
        assert!(a_line.chars().count() <= PEER_DRAFT_CHARS + "- a: ".len());
    }

    #[test]
    fn meta_prompt_carries_query_and_instruction() {
        let messages = meta_messages("the query", &[record("a", "draft")]);
        assert_eq!(messages[0].role, "system");
        assert_eq!(messages[0].content, META_SYSTEM_PROMPT);
        assert!(messages[1].content.starts_with("the query"));
        assert!(messages[1].content.contains("Do not assume any response is true"));
        assert!(messages[1].content.contains("- a: draft"));
    }

    #[test]
    fn ultra_prompt_orders_query_constraints_drafts_task() {
        let messages = ultra_messages("Q", &[record("a", "D")], 500);
        let body = &messages[1].content;
        let q = body.find("Q").unwrap();
        let constraints = body.find("Do not introduce new information").unwrap();
        let drafts = body.find("- a: D").unwrap();
        let task = body.find("Merge convergences").unwrap();
        assert!(q < constraints && constraints < drafts && drafts < task);
    }
}
