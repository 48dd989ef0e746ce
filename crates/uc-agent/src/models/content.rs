use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
/// A typed fragment of message content
pub enum ContentPart {
    InputText { text: String },
    OutputText { text: String },
    Text { text: String },
    /// Images, files and anything else we cannot forward to the model as text
    #[serde(other)]
    Unsupported,
}

impl ContentPart {
    pub fn output_text<S: Into<String>>(text: S) -> Self {
        ContentPart::OutputText { text: text.into() }
    }

    /// Get the text if this part carries any
    pub fn as_text(&self) -> Option<&str> {
        match self {
            ContentPart::InputText { text }
            | ContentPart::OutputText { text }
            | ContentPart::Text { text } => Some(text),
            ContentPart::Unsupported => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
/// Message content as it appears on the wire: either a bare string or a list of parts
pub enum Content {
    Text(String),
    Parts(Vec<ContentPart>),
}

impl Content {
    /// Flatten to plain text, concatenating the textual parts in order
    pub fn into_text(self) -> String {
        match self {
            Content::Text(text) => text,
            Content::Parts(parts) => parts
                .iter()
                .filter_map(ContentPart::as_text)
                .collect::<Vec<_>>()
                .concat(),
        }
    }
}
