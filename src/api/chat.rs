use std::convert::Infallible;

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::sse::{Event, Sse};
use axum::Json;
use futures_util::stream::{self, Stream, StreamExt};

use crate::agent;
use crate::models::{ChatMessage, ChatRequest};
use crate::state::AppState;

/// POST /api/chat — answer a question about an indexed repo, streamed
/// over SSE as `delta` events with a trailing `done` event. A pipeline
/// failure surfaces as a single `error` event before the stream closes.
pub async fn chat(
    State(state): State<AppState>,
    Json(req): Json<ChatRequest>,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, (StatusCode, String)> {
    let question = match last_user_message(&req.messages) {
        Some(q) => q,
        None => {
            return Err((
                StatusCode::BAD_REQUEST,
                "A user message is required".to_string(),
            ));
        }
    };

    let repo = state
        .db
        .get_repo(req.repo_id)
        .await
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, format!("{e:#}")))?
        .ok_or_else(|| (StatusCode::NOT_FOUND, "Repo not found".to_string()))?;

    let tokens = agent::run_streaming(state.db.clone(), state.llm.clone(), repo.id, question);

    let delta_stream = stream::unfold(tokens, |mut tokens| async move {
        match tokens.recv().await {
            Some(Ok(token)) if token.stage == "aggregate" => {
                let event: Result<Event, Infallible> = Ok(Event::default()
                    .event("delta")
                    .json_data(serde_json::json!({ "content": token.text }))
                    .unwrap());
                Some((event, tokens))
            }
            // Tokens from other stages are internal; skip them.
            Some(Ok(_)) => Some((Ok(Event::default().comment("")), tokens)),
            Some(Err(e)) => {
                // The pipeline task drops its sender after a terminal
                // error, so the next recv ends the stream.
                let event: Result<Event, Infallible> = Ok(Event::default()
                    .event("error")
                    .json_data(serde_json::json!({ "message": format!("{e:#}") }))
                    .unwrap());
                Some((event, tokens))
            }
            None => None,
        }
    });

    let done_event: Result<Event, Infallible> = Ok(Event::default()
        .event("done")
        .json_data(serde_json::json!({}))
        .unwrap());

    let event_stream = delta_stream.chain(stream::once(async move { done_event }));
    Ok(Sse::new(event_stream))
}

/// The question the pipeline answers is the most recent user turn.
fn last_user_message(messages: &[ChatMessage]) -> Option<String> {
    messages
        .iter()
        .rev()
        .find(|m| m.role == "user" && !m.content.trim().is_empty())
        .map(|m| m.content.trim().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn msg(role: &str, content: &str) -> ChatMessage {
        ChatMessage {
            role: role.to_string(),
            content: content.to_string(),
        }
    }

    #[test]
    fn test_last_user_message_picks_most_recent() {
        let messages = vec![
            msg("user", "first"),
            msg("assistant", "reply"),
            msg("user", "second"),
        ];
        assert_eq!(last_user_message(&messages).as_deref(), Some("second"));
    }

    #[test]
    fn test_last_user_message_ignores_assistant_turns() {
        let messages = vec![msg("user", "question"), msg("assistant", "answer")];
        assert_eq!(last_user_message(&messages).as_deref(), Some("question"));
    }

    #[test]
    fn test_last_user_message_trims_whitespace() {
        let messages = vec![msg("user", "  padded  ")];
        assert_eq!(last_user_message(&messages).as_deref(), Some("padded"));
    }

    #[test]
    fn test_last_user_message_none_when_empty() {
        assert_eq!(last_user_message(&[]), None);
        let blank = vec![msg("user", "   "), msg("assistant", "a")];
        assert_eq!(last_user_message(&blank), None);
    }
}
