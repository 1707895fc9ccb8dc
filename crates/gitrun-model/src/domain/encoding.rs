use serde::{Deserialize, Serialize};

/// How the buffered output of a finished invocation is handed to the task parser.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum OutputEncoding {
    /// Decode stdout and stderr as UTF-8 (invalid sequences are replaced).
    #[default]
    Text,
    /// Hand over the raw bytes untouched.
    Binary,
}

impl OutputEncoding {
    pub fn as_str(&self) -> &'static str {
        match self {
            OutputEncoding::Text => "text",
            OutputEncoding::Binary => "binary",
        }
    }
}
