use serde::Serialize;

/// Events emitted by an interactive agent session, in emission order,
/// to exactly one consumer.
///
/// Each execution produces a sequence of `Thought`/`ToolStart`/`ToolEnd`
/// events (a `ToolEnd` always follows its `ToolStart`, matched by
/// `tool_use_id`) and is closed by exactly one terminal event — `Result`
/// or `Error`.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type")]
pub enum AgentEvent {
    /// Assistant text, split on text-block boundaries.
    #[serde(rename = "thought")]
    Thought {
        text: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        parent_tool_use_id: Option<String>,
    },

    /// The model is requesting a tool.
    #[serde(rename = "tool_start")]
    ToolStart {
        name: String,
        input: serde_json::Value,
        tool_use_id: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        parent_tool_use_id: Option<String>,
    },

    /// A tool finished. When `parent_tool_use_id` is set the tool ran
    /// inside a sub-agent invocation.
    #[serde(rename = "tool_end")]
    ToolEnd {
        name: String,
        success: bool,
        #[serde(skip_serializing_if = "Option::is_none")]
        output: Option<String>,
        tool_use_id: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        parent_tool_use_id: Option<String>,
    },

    /// The model asked the user one or more questions.
    #[serde(rename = "question")]
    Question { questions: serde_json::Value },

    /// The question wait elapsed without an answer.
    #[serde(rename = "question_timeout")]
    QuestionTimeout,

    /// Final turn outcome.
    #[serde(rename = "result")]
    Result {
        text: String,
        success: bool,
        subtype: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        images: Option<Vec<HarvestedImage>>,
        #[serde(skip_serializing_if = "Option::is_none")]
        files: Option<Vec<HarvestedFile>>,
    },

    /// Terminal failure for the current execution.
    #[serde(rename = "error")]
    Error { message: String, recoverable: bool },
}

impl AgentEvent {
    /// Whether this event closes the execution.
    pub fn is_terminal(&self) -> bool {
        matches!(self, AgentEvent::Result { .. } | AgentEvent::Error { .. })
    }
}

/// An image harvested from the final result text.
#[derive(Debug, Clone, Serialize)]
pub struct HarvestedImage {
    /// Original path as written in the markdown.
    pub path: String,
    /// Base64-encoded content.
    pub data: String,
    pub media_type: String,
    pub alt: String,
}

/// A non-image file harvested from the final result text.
#[derive(Debug, Clone, Serialize)]
pub struct HarvestedFile {
    pub path: String,
    pub data: String,
    pub media_type: String,
    pub filename: String,
    pub description: String,
    pub size: u64,
}
