use serde::{Deserialize, Serialize};

/// Closed set of actionable intents. Derived per request from the classifier
/// response; never persisted.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Intent {
    Refund,
    Cancel,
    Replacement,
    Escalate,
    Status,
    Other,
}

/// Keyword scan order is fixed; when a response mentions several intents the
/// earliest entry here wins.
const SCAN_ORDER: [(Intent, &str); 5] = [
    (Intent::Refund, "refund"),
    (Intent::Cancel, "cancel"),
    (Intent::Replacement, "replacement"),
    (Intent::Escalate, "escalate"),
    (Intent::Status, "status"),
];

impl Intent {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Refund => "refund",
            Self::Cancel => "cancel",
            Self::Replacement => "replacement",
            Self::Escalate => "escalate",
            Self::Status => "status",
            Self::Other => "other",
        }
    }

    /// Parse a raw model response into an intent: scan for any known keyword
    /// as a case-insensitive whole word and return the first match in the
    /// fixed scan order. An empty or keyword-free response is `Other`.
    ///
    /// A bare one-word reply like `"refund"` is covered by the same scan; the
    /// whole word sits between a start-of-string and end-of-string boundary.
    pub fn from_model_response(response: &str) -> Self {
        let lowered = response.to_lowercase();
        SCAN_ORDER
            .iter()
            .find(|(_, keyword)| contains_whole_word(&lowered, keyword))
            .map(|(intent, _)| *intent)
            .unwrap_or(Self::Other)
    }
}

impl std::fmt::Display for Intent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

fn contains_whole_word(haystack: &str, needle: &str) -> bool {
    let mut search_from = 0;
    while let Some(relative) = haystack[search_from..].find(needle) {
        let start = search_from + relative;
        let end = start + needle.len();
        let boundary_before =
            start == 0 || !haystack[..start].chars().next_back().is_some_and(char::is_alphanumeric);
        let boundary_after =
            end == haystack.len() || !haystack[end..].chars().next().is_some_and(char::is_alphanumeric);
        if boundary_before && boundary_after {
            return true;
        }
        search_from = end;
    }
    false
}
