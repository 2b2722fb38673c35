//! Prompt templates for the two retrieval routes.

use crate::domain::{RetrievedDocument, WebSnippet};

pub const CONTEXT_LABEL: &str = "Context";
pub const WEB_RESULT_LABEL: &str = "Web Result";

/// Builds the model prompts. Both templates ask for a single paragraph in
/// `answer_language`; only the local one carries a translation step.
#[derive(Debug, Clone)]
pub struct PromptBuilder {
    answer_language: String,
}

impl Default for PromptBuilder {
    fn default() -> Self {
        Self::new("English")
    }
}

impl PromptBuilder {
    pub fn new(answer_language: impl Into<String>) -> Self {
        let language = answer_language.into();
        let language = if language.trim().is_empty() {
            "English".to_string()
        } else {
            language.trim().to_string()
        };
        Self {
            answer_language: language,
        }
    }

    pub fn answer_language(&self) -> &str {
        &self.answer_language
    }

    /// `"<label> 1: a\n\n<label> 2: b"`, preserving input order.
    pub fn numbered_context<'a>(label: &str, items: impl IntoIterator<Item = &'a str>) -> String {
        items
            .into_iter()
            .enumerate()
            .map(|(i, item)| format!("{label} {}: {item}", i + 1))
            .collect::<Vec<_>>()
            .join("\n\n")
    }

    pub fn local(&self, query: &str, documents: &[RetrievedDocument]) -> String {
        let language = &self.answer_language;
        let listing = documents
            .iter()
            .map(|doc| format!("- {}", doc.text))
            .collect::<Vec<_>>()
            .join("\n");
        let context =
            Self::numbered_context(CONTEXT_LABEL, documents.iter().map(|doc| doc.text.as_str()));

        format!(
            r#"
You are given some documents. First, **translate the following documents into {language}** and display them under the header **"Translations:"**

Then, using **only** the translated content and the provided context, write a **concise one-paragraph answer** to the question in **{language}**. Begin with a brief summary of all relevant context, then answer the question clearly and completely. Do not include any information not found in the documents or context.
---
Documents:
{listing}

Context:
{context}

Question:
{query}

---
Translations:
(Translate the documents in {language} here)

Answer:
(Write the answer here)
"#
        )
    }

    pub fn fallback(&self, query: &str, snippets: &[WebSnippet]) -> String {
        let language = &self.answer_language;
        let context = Self::numbered_context(
            WEB_RESULT_LABEL,
            snippets.iter().map(|snippet| snippet.body.as_str()),
        );

        format!(
            r#"
Using only the provided context, write a **concise one-paragraph answer** to the question in **{language}**. Begin with a brief summary of the relevant context, then answer the question clearly and completely. Do not include any information that is not in the context.

---
Context:
{context}

Question:
{query}

---
Answer:
(Write the answer here)
"#
        )
    }
}
