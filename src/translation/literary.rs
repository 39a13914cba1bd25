/*!
 * Literary translation through a text generator.
 */

use async_trait::async_trait;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use super::Translator;
use crate::errors::ProviderError;
use crate::preparation::prompts::{fill, language_label};
use crate::providers::TextGenerator;

const LITERARY_TRANSLATOR: &str = r#"You are a professional literary translator working from {source_language} to {target_language}.

## Guidance
{context}

## Rules
- Preserve the author's voice, tone and register
- Keep every term listed under "Terms to Keep in Original" exactly as written
- Render dialogue naturally, respecting each character's speech pattern
- Do not add explanations, notes or commentary
- Return ONLY the translated text

## Text
{text}"#;

/// Adapts a `TextGenerator` into a `Translator`.
#[derive(Debug, Clone)]
pub struct GeneratorTranslator {
    generator: Arc<dyn TextGenerator>,
    source_language: String,
    target_language: String,
}

impl GeneratorTranslator {
    pub fn new(generator: Arc<dyn TextGenerator>, source_language: &str, target_language: &str) -> Self {
        Self {
            generator,
            source_language: language_label(source_language, "the source language"),
            target_language: language_label(target_language, "the target language"),
        }
    }

    /// The full instruction sent for one unit.
    pub fn render(&self, text: &str, context: &str) -> String {
        fill(
            LITERARY_TRANSLATOR,
            &[
                ("source_language", self.source_language.as_str()),
                ("target_language", self.target_language.as_str()),
                ("context", context.trim()),
                ("text", text),
            ],
        )
    }
}

#[async_trait]
impl Translator for GeneratorTranslator {
    fn name(&self) -> &str {
        self.generator.name()
    }

    async fn translate(
        &self,
        cancel: &CancellationToken,
        text: &str,
        context: &str,
    ) -> Result<String, ProviderError> {
        if text.trim().is_empty() {
            return Ok(text.to_string());
        }

        let generation = self.generator.generate(cancel, &self.render(text, context)).await?;
        let translated = strip_fences(&generation.text);
        if translated.is_empty() {
            return Err(ProviderError::ParseError(format!(
                "{} returned an empty translation",
                self.generator.name()
            )));
        }
        Ok(translated.to_string())
    }
}

/// Drop a markdown fence some models wrap plain answers in.
fn strip_fences(response: &str) -> &str {
    let trimmed = response.trim();
    match trimmed.strip_prefix("```") {
        Some(rest) => {
            let body = rest.split_once('\n').map_or("", |(_, body)| body);
            body.strip_suffix("```").unwrap_or(body).trim()
        }
        None => trimmed,
    }
}
