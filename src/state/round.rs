//! Question instances bound into a session.

use std::time::Duration;

use crate::dao::models::{QuestionEntity, QuestionKindEntity};

/// Blur applied to image rounds whose question omits it.
pub const DEFAULT_MAX_BLUR_PX: f32 = 24.0;

/// Kind-specific payload of a round.
#[derive(Debug, Clone, PartialEq)]
pub enum RoundKind {
    /// Plain text question.
    Text {
        /// Question text.
        prompt: String,
    },
    /// Picture revealed progressively; the blur curve is driven by clients.
    ImageReveal {
        /// Picture to reveal.
        image_url: String,
        /// Blur radius at the start of the round.
        max_blur_px: f32,
        /// Optional caption.
        prompt: Option<String>,
    },
}

/// One question with its timing context.
#[derive(Debug, Clone, PartialEq)]
pub struct Round {
    /// Question identifier, unique within the category.
    pub id: String,
    /// Kind-specific content.
    pub kind: RoundKind,
    /// Answer options in display order.
    pub options: Vec<String>,
    /// Index into `options` of the right answer.
    pub correct_option_index: usize,
    /// Answer window.
    pub duration_ms: u64,
}

impl Round {
    /// Answer window as a [`Duration`].
    pub fn duration(&self) -> Duration {
        Duration::from_millis(self.duration_ms)
    }

    /// Whether `selected_option_index` is the right answer.
    pub fn is_correct(&self, selected_option_index: usize) -> bool {
        selected_option_index == self.correct_option_index
    }
}

impl From<QuestionEntity> for Round {
    fn from(question: QuestionEntity) -> Self {
        let kind = match question.kind {
            QuestionKindEntity::Text => RoundKind::Text {
                prompt: question.prompt.unwrap_or_default(),
            },
            QuestionKindEntity::ImageReveal => RoundKind::ImageReveal {
                image_url: question.image_url.unwrap_or_default(),
                max_blur_px: question.max_blur_px.unwrap_or(DEFAULT_MAX_BLUR_PX),
                prompt: question.prompt,
            },
        };

        Self {
            id: question.id,
            kind,
            options: question.options,
            correct_option_index: question.correct_option_index,
            duration_ms: question.duration_ms,
        }
    }
}
