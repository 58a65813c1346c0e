//! Prompt templates for document tasks

use std::borrow::Cow;

use crate::error::{Error, Result};
use crate::types::TaskKind;

/// System message sent with every request
pub const SYSTEM_PROMPT: &str = "You are a helpful AI assistant specialized in document analysis.";

/// Appended when extracted text is cut to fit the input budget
pub const TRUNCATION_MARKER: &str = "\n\n[... document truncated for processing ...]";

/// Rendered request for a model
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Prompt {
    pub system: &'static str,
    pub user: String,
}

/// Builds prompts from extracted text and a task kind
#[derive(Debug, Clone)]
pub struct PromptBuilder {
    max_input_chars: usize,
}

impl PromptBuilder {
    pub fn new(max_input_chars: usize) -> Self {
        Self { max_input_chars }
    }

    /// Instruction text for each kind; `{text}` marks where the document goes
    pub fn template(kind: TaskKind) -> &'static str {
        match kind {
            TaskKind::Summarize => {
                "You are a professional document summarizer. \
                 Provide a clear, concise summary of the following document in 3-5 sentences. \
                 Focus on the key points and main takeaways.\n\nDocument:\n{text}"
            }
            TaskKind::ExtractKeywords => {
                "Extract the top 10-15 most important keywords and key phrases from the following document. \
                 Return them as a comma-separated list.\n\nDocument:\n{text}"
            }
            TaskKind::Sentiment => {
                "Analyze the sentiment of the following document. \
                 Provide: (1) Overall sentiment (Positive/Negative/Neutral/Mixed), \
                 (2) Confidence score (0-100%), (3) Key emotional indicators found.\n\nDocument:\n{text}"
            }
            TaskKind::Translate => {
                "Translate the following document to English. \
                 If it is already in English, improve its clarity and grammar.\n\nDocument:\n{text}"
            }
            TaskKind::Qa => {
                "Read the following document carefully and provide: \
                 (1) The main question or problem being addressed, \
                 (2) The answer or solution provided, \
                 (3) Three follow-up questions a reader might have.\n\nDocument:\n{text}"
            }
        }
    }

    /// Reject blank input and cut long input on a character boundary
    pub fn prepare_text<'a>(&self, text: &'a str) -> Result<Cow<'a, str>> {
        if text.trim().is_empty() {
            return Err(Error::EmptyInput);
        }

        match text.char_indices().nth(self.max_input_chars) {
            Some((cut, _)) => Ok(Cow::Owned(format!("{}{}", &text[..cut], TRUNCATION_MARKER))),
            None => Ok(Cow::Borrowed(text)),
        }
    }

    /// Full prompt for a document
    pub fn build(&self, text: &str, kind: TaskKind) -> Result<Prompt> {
        let text = self.prepare_text(text)?;
        Ok(Prompt {
            system: SYSTEM_PROMPT,
            user: Self::template(kind).replace("{text}", &text),
        })
    }
}

impl Default for PromptBuilder {
    fn default() -> Self {
        Self::new(12_000)
    }
}
