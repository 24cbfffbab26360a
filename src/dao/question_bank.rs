//! Ordered question sets per category.

use std::{collections::HashSet, fs, path::Path};

use indexmap::IndexMap;
use serde::Deserialize;
use thiserror::Error;

use crate::dao::models::{QuestionEntity, QuestionKindEntity};

const BUILTIN_QUESTIONS: &str = include_str!("../../config/questions.json");

/// Longest accepted round, one hour.
pub const MAX_DURATION_MS: u64 = 3_600_000;

/// Source of questions for new sessions.
pub trait QuestionBank: Send + Sync {
    /// Ordered questions of a category, `None` when the category is unknown.
    fn questions(&self, category_id: &str) -> Option<Vec<QuestionEntity>>;
    /// Known category identifiers.
    fn categories(&self) -> Vec<String>;
}

/// Reasons a question bank document is refused.
#[derive(Debug, Error)]
pub enum QuestionBankError {
    #[error("failed to read question bank `{path}`")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse question bank")]
    Parse(#[from] serde_json::Error),
    #[error("category `{category}` has no questions")]
    EmptyCategory { category: String },
    #[error("question `{question}` in `{category}`: {reason}")]
    InvalidQuestion {
        category: String,
        question: String,
        reason: &'static str,
    },
}

#[derive(Debug, Deserialize)]
struct RawBank {
    categories: IndexMap<String, Vec<QuestionEntity>>,
}

/// Immutable question bank loaded once at startup.
#[derive(Debug, Clone)]
pub struct StaticQuestionBank {
    categories: IndexMap<String, Vec<QuestionEntity>>,
}

impl StaticQuestionBank {
    /// Question bank compiled into the binary.
    pub fn builtin() -> Result<Self, QuestionBankError> {
        Self::from_json(BUILTIN_QUESTIONS)
    }

    /// Load and validate a bank from a JSON file.
    pub fn from_path(path: &Path) -> Result<Self, QuestionBankError> {
        let contents = fs::read_to_string(path).map_err(|source| QuestionBankError::Read {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_json(&contents)
    }

    /// Parse and validate a bank from JSON text.
    pub fn from_json(contents: &str) -> Result<Self, QuestionBankError> {
        let raw: RawBank = serde_json::from_str(contents)?;
        for (category, questions) in &raw.categories {
            validate_category(category, questions)?;
        }
        Ok(Self {
            categories: raw.categories,
        })
    }
}

impl QuestionBank for StaticQuestionBank {
    fn questions(&self, category_id: &str) -> Option<Vec<QuestionEntity>> {
        self.categories.get(category_id).cloned()
    }

    fn categories(&self) -> Vec<String> {
        self.categories.keys().cloned().collect()
    }
}

fn validate_category(category: &str, questions: &[QuestionEntity]) -> Result<(), QuestionBankError> {
    if questions.is_empty() {
        return Err(QuestionBankError::EmptyCategory {
            category: category.to_owned(),
        });
    }

    let mut seen = HashSet::new();
    for question in questions {
        let invalid = |reason| QuestionBankError::InvalidQuestion {
            category: category.to_owned(),
            question: question.id.clone(),
            reason,
        };

        if !seen.insert(question.id.as_str()) {
            return Err(invalid("duplicate id"));
        }
        if question.options.len() < 2 {
            return Err(invalid("needs at least two options"));
        }
        if question.correct_option_index >= question.options.len() {
            return Err(invalid("correct option out of range"));
        }
        if question.duration_ms == 0 {
            return Err(invalid("duration must be positive"));
        }
        if question.duration_ms > MAX_DURATION_MS {
            return Err(invalid("duration exceeds one hour"));
        }
        match question.kind {
            QuestionKindEntity::Text if question.prompt.is_none() => {
                return Err(invalid("text question without prompt"));
            }
            QuestionKindEntity::ImageReveal => {
                if question.image_url.is_none() {
                    return Err(invalid("image question without image_url"));
                }
                if !question.max_blur_px.is_some_and(|blur| blur > 0.0) {
                    return Err(invalid("max_blur_px must be positive"));
                }
            }
            QuestionKindEntity::Text => {}
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_bank_is_valid_and_ordered() {
        let bank = StaticQuestionBank::builtin().unwrap();
        let categories = bank.categories();
        assert_eq!(categories[0], "technology");
        assert!(categories.iter().any(|c| c == "geography"));

        let questions = bank.questions("technology").unwrap();
        assert_eq!(questions[0].id, "tech-1");
        assert!(questions.iter().all(|q| q.duration_ms == 30_000));
        assert!(
            questions
                .iter()
                .filter(|q| q.kind == QuestionKindEntity::ImageReveal)
                .all(|q| q.max_blur_px == Some(24.0))
        );
        assert!(bank.questions("astrology").is_none());
    }

    #[test]
    fn out_of_range_answer_is_rejected() {
        let json = r#"{"categories": {"quick": [
            {"id": "q1", "kind": "TEXT", "prompt": "?", "options": ["a", "b"],
             "correct_option_index": 2, "duration_ms": 1000}
        ]}}"#;
        let err = StaticQuestionBank::from_json(json).unwrap_err();
        assert!(matches!(
            err,
            QuestionBankError::InvalidQuestion { reason: "correct option out of range", .. }
        ));
    }

    #[test]
    fn image_question_needs_positive_blur() {
        let json = r#"{"categories": {"quick": [
            {"id": "q1", "kind": "IMAGE_REVEAL", "image_url": "https://img", "max_blur_px": 0.0,
             "options": ["a", "b"], "correct_option_index": 0, "duration_ms": 1000}
        ]}}"#;
        assert!(StaticQuestionBank::from_json(json).is_err());
    }

    #[test]
    fn duplicate_ids_are_rejected() {
        let json = r#"{"categories": {"quick": [
            {"id": "q1", "kind": "TEXT", "prompt": "?", "options": ["a", "b"],
             "correct_option_index": 0, "duration_ms": 1000},
            {"id": "q1", "kind": "TEXT", "prompt": "!", "options": ["a", "b"],
             "correct_option_index": 1, "duration_ms": 1000}
        ]}}"#;
        assert!(StaticQuestionBank::from_json(json).is_err());
    }

    #[test]
    fn overlong_rounds_are_rejected() {
        let json = format!(
            r#"{{"categories": {{"quick": [
                {{"id": "q1", "kind": "TEXT", "prompt": "?", "options": ["a", "b"],
                 "correct_option_index": 0, "duration_ms": {}}}
            ]}}}}"#,
            MAX_DURATION_MS + 1
        );
        let err = StaticQuestionBank::from_json(&json).unwrap_err();
        assert!(matches!(
            err,
            QuestionBankError::InvalidQuestion { reason: "duration exceeds one hour", .. }
        ));
    }
}
