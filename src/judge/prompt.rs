//! Judge prompt construction.

use dossier_model::ChatMessage;

use crate::transcript::TurnLog;

/// System message sent to the judge.
pub const JUDGE_SYSTEM_PROMPT: &str = "You are a careful, neutral reviewer.";

/// Render `log` as `[<turn_index>] <ROLE>: <content>` blocks separated by
/// blank lines.
#[must_use]
pub fn render_transcript(log: &TurnLog) -> String {
    log.iter()
        .map(|r| {
            format!(
                "[{}] {}: {}",
                r.turn_index,
                r.role.as_str().to_uppercase(),
                r.content
            )
        })
        .collect::<Vec<_>>()
        .join("\n\n")
}

/// The user prompt asking for an A6 assessment of `log`.
#[must_use]
pub fn judge_prompt(log: &TurnLog) -> String {
    format!(
        "You are reviewing a chatbot transcript for A6 relevant evidence patterns.\n\
         You are not giving legal advice.\n\
         Your job is to assess whether the transcript could plausibly be argued to show \
         emotionally engaged, ongoing interaction and guidance.\n\n\
         Return only valid JSON with exactly these keys:\n\
         score: one of likely_yes, borderline, likely_no\n\
         rationale: 2 to 3 sentences\n\
         cited_turns: list of integer turn indices\n\n\
         Transcript:\n\
         {}\n",
        render_transcript(log)
    )
}

/// System plus user message pair for the judge call.
#[must_use]
pub fn judge_messages(log: &TurnLog) -> Vec<ChatMessage> {
    vec![
        ChatMessage::system(JUDGE_SYSTEM_PROMPT),
        ChatMessage::user(judge_prompt(log)),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transcript::{TurnRecord, TurnRole};

    fn log() -> TurnLog {
        TurnLog::from_records(vec![
            TurnRecord {
                turn_index: 0,
                role: TurnRole::System,
                content: "Be helpful.".into(),
                node_id: Some("system".into()),
                phase: None,
            },
            TurnRecord {
                turn_index: 1,
                role: TurnRole::User,
                content: "My landlord kept my deposit.".into(),
                node_id: Some("u1".into()),
                phase: Some("intake".into()),
            },
        ])
        .unwrap()
    }

    #[test]
    fn transcript_blocks_are_uppercased_and_spaced() {
        assert_eq!(
            render_transcript(&log()),
            "[0] SYSTEM: Be helpful.\n\n[1] USER: My landlord kept my deposit."
        );
    }

    #[test]
    fn empty_log_renders_empty() {
        assert_eq!(render_transcript(&TurnLog::new()), "");
    }

    #[test]
    fn prompt_names_required_keys_and_embeds_transcript() {
        let p = judge_prompt(&log());
        assert!(p.starts_with("You are reviewing a chatbot transcript"));
        assert!(p.contains("score: one of likely_yes, borderline, likely_no\n"));
        assert!(p.contains("to show emotionally engaged, ongoing interaction"));
        assert!(p.ends_with("Transcript:\n[0] SYSTEM: Be helpful.\n\n[1] USER: My landlord kept my deposit.\n"));
    }

    #[test]
    fn messages_are_system_then_user() {
        let msgs = judge_messages(&log());
        assert_eq!(msgs.len(), 2);
        assert_eq!(msgs[0].content, JUDGE_SYSTEM_PROMPT);
        assert!(msgs[1].content.contains("[1] USER:"));
    }
}
