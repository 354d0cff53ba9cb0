//! Free-text rewriting into a report writing style.

use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

use super::prompts::rewrite_instructions;
use super::synthesize::strip_code_fence;
use super::with_deadline;
use crate::error::{DraftingError, Result};
use crate::traits::ai::Generator;
use crate::types::{
    config::DraftingConfig,
    draft::PromptPayload,
    style::{RewriteContext, RewriteStyle},
};

/// Rewrites user-entered text (field notes, dictated observations) in one
/// of the [`RewriteStyle`]s.
pub struct StyleRewriter {
    generator: Arc<dyn Generator>,
    timeout: Duration,
}

impl StyleRewriter {
    pub fn new(generator: Arc<dyn Generator>, config: &DraftingConfig) -> Self {
        Self {
            generator,
            timeout: config.generation_timeout(),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Rewrite `text` in `style`.
    ///
    /// Blank input is a `Validation` error. An empty reply is a
    /// `Synthesis` error.
    pub async fn rewrite(
        &self,
        text: &str,
        style: RewriteStyle,
        context: &RewriteContext,
    ) -> Result<String> {
        let text = text.trim();
        if text.is_empty() {
            return Err(DraftingError::validation("nothing to rewrite"));
        }

        let payload = PromptPayload {
            system: system_prompt(style, context),
            user: format!("Rewrite this text:\n\n{text}"),
        };
        debug!(style = %style, chars = text.chars().count(), "Rewriting text");

        let raw = with_deadline(
            "rewrite",
            self.timeout,
            self.generator.generate(&payload, self.timeout),
        )
        .await?;

        let rewritten = strip_code_fence(raw.trim());
        if rewritten.is_empty() {
            return Err(DraftingError::Synthesis {
                reason: "generator returned an empty rewrite".into(),
            });
        }
        Ok(rewritten.to_string())
    }
}

fn system_prompt(style: RewriteStyle, context: &RewriteContext) -> String {
    let mut prompt = rewrite_instructions(style).to_string();
    if let Some(section) = context.section_type {
        prompt.push_str(&format!(
            "\n\nThis text is for a {} section.",
            section.title().to_lowercase()
        ));
    }
    if let Some(name) = context
        .building_name
        .as_deref()
        .map(str::trim)
        .filter(|n| !n.is_empty())
    {
        prompt.push_str(&format!("\nBuilding: {name}"));
    }
    prompt
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::MockGenerator;
    use crate::types::section::SectionType;

    fn rewriter(generator: Arc<MockGenerator>) -> StyleRewriter {
        StyleRewriter::new(generator, &DraftingConfig::default())
    }

    #[tokio::test]
    async fn test_rewrite_sends_style_and_context() {
        let generator = Arc::new(
            MockGenerator::new()
                .with_response("  It was observed that the east parapet sealant was cracked.  "),
        );
        let context = RewriteContext::new()
            .with_section(SectionType::SiteObservations)
            .with_building("Riverside Lofts");

        let rewritten = rewriter(generator.clone())
            .rewrite("east parapet sealant cracked", RewriteStyle::FormalSor, &context)
            .await
            .unwrap();

        assert_eq!(rewritten, "It was observed that the east parapet sealant was cracked.");
        let calls = generator.calls();
        assert_eq!(calls.len(), 1);
        assert!(calls[0].system.starts_with(rewrite_instructions(RewriteStyle::FormalSor)));
        assert!(calls[0].system.contains("This text is for a site observations section."));
        assert!(calls[0].system.ends_with("\nBuilding: Riverside Lofts"));
        assert_eq!(calls[0].user, "Rewrite this text:\n\neast parapet sealant cracked");
    }

    #[tokio::test]
    async fn test_rewrite_without_context_uses_bare_instructions() {
        let generator = Arc::new(MockGenerator::new().with_response("```\nShort version.\n```"));
        let rewritten = rewriter(generator.clone())
            .rewrite("a long rambling note", RewriteStyle::Concise, &RewriteContext::new())
            .await
            .unwrap();

        assert_eq!(rewritten, "Short version.");
        assert_eq!(generator.calls()[0].system, rewrite_instructions(RewriteStyle::Concise));
    }

    #[tokio::test]
    async fn test_rewrite_rejects_blank_input_and_empty_reply() {
        let generator = Arc::new(MockGenerator::new().with_response("   "));
        let rewriter = rewriter(generator.clone());

        let blank = rewriter
            .rewrite(" \n ", RewriteStyle::Detailed, &RewriteContext::new())
            .await
            .unwrap_err();
        assert!(matches!(blank, DraftingError::Validation { .. }));
        assert!(generator.calls().is_empty());

        let empty = rewriter
            .rewrite("note", RewriteStyle::Detailed, &RewriteContext::new())
            .await
            .unwrap_err();
        assert!(matches!(empty, DraftingError::Synthesis { .. }));
    }

    #[tokio::test]
    async fn test_rewrite_honours_deadline() {
        let generator = Arc::new(MockGenerator::new().with_hang());
        let outcome = tokio::time::timeout(
            Duration::from_secs(2),
            rewriter(generator)
                .with_timeout(Duration::from_millis(50))
                .rewrite("note", RewriteStyle::FormalSor, &RewriteContext::new()),
        )
        .await
        .expect("rewrite must honour its deadline");
        assert!(matches!(outcome, Err(DraftingError::Timeout { after_ms: 50, .. })));
    }
}
