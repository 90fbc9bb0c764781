use serde::Deserialize;
use serde_json::Value;

/// Events from Claude CLI's stream-json output format
#[derive(Debug, Deserialize)]
#[serde(tag = "type")]
pub enum StreamEvent {
    #[serde(rename = "assistant")]
    Assistant {
        message: AssistantMessage,
        #[serde(default)]
        session_id: String,
    },

    #[serde(rename = "user")]
    User {
        #[serde(default)]
        tool_use_result: Option<ToolUseResult>,
    },

    #[serde(rename = "result")]
    Result {
        #[serde(default)]
        subtype: String,
        #[serde(default)]
        result: Option<String>,
        #[serde(default)]
        is_error: bool,
        #[serde(default)]
        session_id: String,
        #[serde(default)]
        num_turns: Option<u32>,
    },

    #[serde(rename = "system")]
    System {
        #[serde(default)]
        subtype: String,
        #[serde(default)]
        session_id: String,
    },

    #[serde(other)]
    Unknown,
}

impl StreamEvent {
    /// CLI session id carried by the event, if any.
    pub fn session_id(&self) -> Option<&str> {
        match self {
            StreamEvent::Assistant { session_id, .. }
            | StreamEvent::Result { session_id, .. }
            | StreamEvent::System { session_id, .. } => {
                Some(session_id.as_str()).filter(|s| !s.is_empty())
            }
            StreamEvent::User { .. } | StreamEvent::Unknown => None,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct AssistantMessage {
    #[serde(default)]
    pub content: Vec<ContentBlock>,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type")]
pub enum ContentBlock {
    #[serde(rename = "tool_use")]
    ToolUse {
        name: String,
        input: Value,
        #[serde(default)]
        id: String,
    },

    #[serde(rename = "text")]
    Text { text: String },

    #[serde(other)]
    Other,
}

#[derive(Debug, Deserialize)]
pub struct ToolUseResult {
    #[serde(default)]
    pub file: Option<FileInfo>,
}

#[derive(Debug, Deserialize)]
pub struct FileInfo {
    #[serde(rename = "filePath")]
    pub file_path: String,
}

/// Extract a human-readable description from a tool use event
pub fn describe_tool_use(name: &str, input: &Value) -> String {
    let file = || {
        input
            .get("file_path")
            .or_else(|| input.get("notebook_path"))
            .and_then(|v| v.as_str())
            .map(shorten_path)
            .unwrap_or_else(|| "file".to_string())
    };
    match name {
        "Read" => format!("Reading: {}", file()),
        "Write" => format!("Creating: {}", file()),
        "Edit" | "MultiEdit" | "NotebookEdit" => format!("Editing: {}", file()),
        "Bash" => {
            let cmd = input
                .get("command")
                .and_then(|v| v.as_str())
                .map(|s| truncate_str(s, 40))
                .unwrap_or_else(|| "command".to_string());
            format!("Running: {}", cmd)
        }
        "Glob" => {
            let pattern = input.get("pattern").and_then(|v| v.as_str()).unwrap_or("*");
            format!("Searching: {}", pattern)
        }
        "Grep" => {
            let pattern = input
                .get("pattern")
                .and_then(|v| v.as_str())
                .map(|s| truncate_str(s, 30))
                .unwrap_or_else(|| "pattern".to_string());
            format!("Grep: {}", pattern)
        }
        "LS" => {
            let path = input
                .get("path")
                .and_then(|v| v.as_str())
                .map(shorten_path)
                .unwrap_or_else(|| ".".to_string());
            format!("Listing: {}", path)
        }
        _ => name.to_string(),
    }
}

/// Get an emoji for a tool
pub fn tool_emoji(name: &str) -> &'static str {
    match name {
        "Read" => "\u{1F4D6}",
        "Write" => "\u{1F4DD}",
        "Edit" | "MultiEdit" | "NotebookEdit" => "\u{270F}\u{FE0F}",
        "Bash" => "\u{2699}\u{FE0F}",
        "Glob" | "LS" => "\u{1F50D}",
        "Grep" => "\u{1F50E}",
        _ => "\u{1F527}",
    }
}

/// Shorten a file path to just the last 2 components
fn shorten_path(path: &str) -> String {
    let unified = path.replace('\\', "/");
    let parts: Vec<&str> = unified.split('/').collect();
    if parts.len() <= 2 {
        unified
    } else {
        parts[parts.len() - 2..].join("/")
    }
}

/// Truncate a string with ellipsis, on a char boundary
pub fn truncate_str(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else {
        let kept: String = s.chars().take(max_len.saturating_sub(3)).collect();
        format!("{}...", kept)
    }
}

/// Truncate thinking text to a reasonable snippet
pub fn truncate_thinking(text: &str, max_len: usize) -> String {
    let first_line = text.lines().next().unwrap_or(text);
    truncate_str(first_line.trim(), max_len)
}
