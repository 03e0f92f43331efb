//! Debug/trace presenter.
//!
//! Pure formatting of dispatcher reasoning and per-turn diagnostics. Missing
//! fields degrade to placeholders; nothing here can fail.

use crate::types::DebugInfo;

const NO_ANALYSIS: &str = "(no analysis returned)";
const NO_RESPONSE: &str = "(empty)";
const UNKNOWN: &str = "(unknown)";

/// Formats trace blocks for the trace area
pub struct TracePresenter;

impl TracePresenter {
    /// Headline for the dispatcher's routing of a user message
    pub fn routing_headline(analysis: Option<&str>) -> String {
        format!("🔄 Message routing: {}", non_empty(analysis).unwrap_or(NO_ANALYSIS))
    }

    /// Headline for next-speaker detection after an agent reply
    pub fn detection_headline(analysis: Option<&str>) -> String {
        format!("🎭 Next speaker detection: {}", non_empty(analysis).unwrap_or(NO_ANALYSIS))
    }

    /// Full debug block for one reply
    pub fn render_debug(info: &DebugInfo) -> String {
        let mut block = String::from("🔍 Debug\n");
        block.push_str(&format!(
            "  analysis:      {}\n",
            non_empty(info.analysis.as_deref()).unwrap_or(NO_ANALYSIS)
        ));
        block.push_str(&format!(
            "  full response: {}\n",
            non_empty(info.full_response.as_deref()).unwrap_or(NO_RESPONSE)
        ));

        if let Some(speaker) = &info.current_speaker {
            block.push_str(&format!("  speaker:       {}\n", speaker.name));
        }

        let (name, message) = info
            .input_message
            .as_ref()
            .map(|m| (m.character_name.as_deref(), m.message.as_deref()))
            .unwrap_or((None, None));
        block.push_str(&format!(
            "  input:         {}: {}",
            non_empty(name).unwrap_or(UNKNOWN),
            non_empty(message).unwrap_or(NO_RESPONSE)
        ));

        block
    }
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|s| !s.is_empty())
}

/// Append-only list of rendered trace blocks
#[derive(Debug, Clone, Default)]
pub struct TraceLog {
    entries: Vec<String>,
}

impl TraceLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, entry: String) {
        self.entries.push(entry);
    }

    pub fn entries(&self) -> &[String] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
