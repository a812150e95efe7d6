//! Server-Sent-Events buffer handling.
//!
//! Every SSE consumer in the platform follows the same pattern: buffer
//! incoming chunks, split on `\n\n`, and pull `event:`/`data:` lines
//! out of each complete block. The buffer is drained in place; a
//! trailing partial event stays for the next call.

/// One parsed SSE message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SseMessage {
    /// The `event:` field, when present.
    pub event: Option<String>,
    /// Concatenated `data:` payload.
    pub data: String,
}

/// Drain complete SSE messages from a buffer.
pub fn drain_events(buffer: &mut String) -> Vec<SseMessage> {
    let mut messages = Vec::new();

    while let Some(pos) = buffer.find("\n\n") {
        let block: String = buffer.drain(..pos).collect();
        buffer.drain(..2); // the \n\n delimiter

        let mut event = None;
        let mut data_lines: Vec<&str> = Vec::new();
        for line in block.lines() {
            let line = line.trim();
            if let Some(name) = line.strip_prefix("event:") {
                event = Some(name.trim().to_string());
            } else if let Some(data) = line.strip_prefix("data:") {
                data_lines.push(data.trim());
            }
        }
        let data = data_lines.join("\n");
        if event.is_some() || !data.is_empty() {
            messages.push(SseMessage { event, data });
        }
    }

    messages
}

/// Drain only the `data:` payloads (OpenAI-style streams carry no
/// event names).
pub fn drain_data_lines(buffer: &mut String) -> Vec<String> {
    drain_events(buffer)
        .into_iter()
        .filter(|m| !m.data.is_empty())
        .map(|m| m.data)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn drain_single_complete_event() {
        let mut buf = String::from("event: command\ndata: {\"request_id\":\"r1\"}\n\n");
        let msgs = drain_events(&mut buf);
        assert_eq!(msgs.len(), 1);
        assert_eq!(msgs[0].event.as_deref(), Some("command"));
        assert_eq!(msgs[0].data, "{\"request_id\":\"r1\"}");
        assert!(buf.is_empty());
    }

    #[test]
    fn drain_multiple_events() {
        let mut buf = String::from("data: first\n\ndata: second\n\n");
        let lines = drain_data_lines(&mut buf);
        assert_eq!(lines, vec!["first", "second"]);
        assert!(buf.is_empty());
    }

    #[test]
    fn partial_event_stays_in_buffer() {
        let mut buf = String::from("data: complete\n\ndata: partial");
        let lines = drain_data_lines(&mut buf);
        assert_eq!(lines, vec!["complete"]);
        assert_eq!(buf, "data: partial");
    }

    #[test]
    fn ignores_id_and_retry_lines() {
        let mut buf = String::from("event: ping\nid: 42\nretry: 5000\ndata: payload\n\n");
        let msgs = drain_events(&mut buf);
        assert_eq!(msgs.len(), 1);
        assert_eq!(msgs[0].event.as_deref(), Some("ping"));
        assert_eq!(msgs[0].data, "payload");
    }

    #[test]
    fn done_sentinel_preserved() {
        let mut buf = String::from("data: [DONE]\n\n");
        assert_eq!(drain_data_lines(&mut buf), vec!["[DONE]"]);
    }

    #[test]
    fn incremental_buffering() {
        let mut buf = String::from("data: chunk1");
        assert!(drain_data_lines(&mut buf).is_empty());
        buf.push_str("\n\ndata: chunk2\n\n");
        assert_eq!(drain_data_lines(&mut buf), vec!["chunk1", "chunk2"]);
        assert!(buf.is_empty());
    }

    #[test]
    fn multi_data_lines_join_with_newline() {
        let mut buf = String::from("data: line1\ndata: line2\n\n");
        let msgs = drain_events(&mut buf);
        assert_eq!(msgs[0].data, "line1\nline2");
    }
}
