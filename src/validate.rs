//! Strict validation of model output.
//!
//! Parses the raw JSON text returned by the artifact generation calls and
//! enforces the structural invariants the UI relies on: exactly 5 questions
//! with 4 options each and a correct answer drawn from those options, or
//! exactly 5 flashcards with non-empty fronts and backs. Any violation
//! rejects the whole artifact with an error naming the offending element
//! and constraint; there is no partial acceptance.

use serde_json::Value;

use crate::models::{Flashcard, McqQuestion};

/// Exact number of questions/flashcards/topics per artifact.
pub const ARTIFACT_COUNT: usize = 5;
/// Exact number of options per MCQ question.
pub const MCQ_OPTION_COUNT: usize = 4;

/// Validation failure, naming which element and which constraint failed.
#[derive(Debug)]
pub enum ValidationError {
    Json(String),
    MissingField(String),
    WrongType { field: String, expected: &'static str },
    WrongCount { field: String, expected: usize, actual: usize },
    EmptyField { index: usize, field: String },
    WrongOptionCount { index: usize, expected: usize, actual: usize },
    AnswerNotInOptions { index: usize },
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ValidationError::Json(e) => write!(f, "response is not valid JSON: {}", e),
            ValidationError::MissingField(field) => {
                write!(f, "missing required field '{}'", field)
            }
            ValidationError::WrongType { field, expected } => {
                write!(f, "field '{}' must be {}", field, expected)
            }
            ValidationError::WrongCount {
                field,
                expected,
                actual,
            } => write!(
                f,
                "'{}' must contain exactly {} elements, got {}",
                field, expected, actual
            ),
            ValidationError::EmptyField { index, field } => {
                write!(f, "element {}: field '{}' is empty or missing", index, field)
            }
            ValidationError::WrongOptionCount {
                index,
                expected,
                actual,
            } => write!(
                f,
                "question {}: must have exactly {} options, got {}",
                index, expected, actual
            ),
            ValidationError::AnswerNotInOptions { index } => {
                write!(f, "question {}: correctAnswer is not one of the options", index)
            }
        }
    }
}

impl std::error::Error for ValidationError {}

/// Strip a Markdown code fence if the model wrapped its JSON in one.
fn strip_code_fence(raw: &str) -> &str {
    let trimmed = raw.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let rest = rest.strip_prefix("json").unwrap_or(rest);
    let rest = rest.strip_suffix("```").unwrap_or(rest);
    rest.trim()
}

fn parse_json(raw: &str) -> Result<Value, ValidationError> {
    serde_json::from_str(strip_code_fence(raw)).map_err(|e| ValidationError::Json(e.to_string()))
}

fn require_string(
    obj: &Value,
    index: usize,
    field: &str,
) -> Result<String, ValidationError> {
    match obj.get(field).and_then(Value::as_str) {
        Some(s) if !s.trim().is_empty() => Ok(s.to_string()),
        _ => Err(ValidationError::EmptyField {
            index,
            field: field.to_string(),
        }),
    }
}

/// Parse and validate an MCQ artifact: `{"questions": [ ...exactly 5 ]}`.
pub fn parse_mcq(raw: &str) -> Result<Vec<McqQuestion>, ValidationError> {
    let json = parse_json(raw)?;

    let questions = json
        .get("questions")
        .ok_or_else(|| ValidationError::MissingField("questions".to_string()))?
        .as_array()
        .ok_or(ValidationError::WrongType {
            field: "questions".to_string(),
            expected: "an array",
        })?;

    if questions.len() != ARTIFACT_COUNT {
        return Err(ValidationError::WrongCount {
            field: "questions".to_string(),
            expected: ARTIFACT_COUNT,
            actual: questions.len(),
        });
    }

    let mut validated = Vec::with_capacity(ARTIFACT_COUNT);
    for (index, q) in questions.iter().enumerate() {
        let question = require_string(q, index, "question")?;
        let correct_answer = require_string(q, index, "correctAnswer")?;
        let explanation = require_string(q, index, "explanation")?;

        let options = q
            .get("options")
            .and_then(Value::as_array)
            .ok_or(ValidationError::WrongType {
                field: format!("questions[{}].options", index),
                expected: "an array",
            })?;

        if options.len() != MCQ_OPTION_COUNT {
            return Err(ValidationError::WrongOptionCount {
                index,
                expected: MCQ_OPTION_COUNT,
                actual: options.len(),
            });
        }

        let mut option_strings = Vec::with_capacity(MCQ_OPTION_COUNT);
        for opt in options {
            match opt.as_str() {
                Some(s) if !s.trim().is_empty() => option_strings.push(s.to_string()),
                _ => {
                    return Err(ValidationError::EmptyField {
                        index,
                        field: "options".to_string(),
                    })
                }
            }
        }

        if !option_strings.contains(&correct_answer) {
            return Err(ValidationError::AnswerNotInOptions { index });
        }

        validated.push(McqQuestion {
            question,
            options: option_strings,
            correct_answer,
            explanation,
        });
    }

    Ok(validated)
}

/// Parse and validate a flashcard artifact: a top-level array of exactly 5
/// `{"front", "back"}` objects.
pub fn parse_flashcards(raw: &str) -> Result<Vec<Flashcard>, ValidationError> {
    let json = parse_json(raw)?;

    let cards = json.as_array().ok_or(ValidationError::WrongType {
        field: "flashcards".to_string(),
        expected: "a top-level array",
    })?;

    if cards.len() != ARTIFACT_COUNT {
        return Err(ValidationError::WrongCount {
            field: "flashcards".to_string(),
            expected: ARTIFACT_COUNT,
            actual: cards.len(),
        });
    }

    let mut validated = Vec::with_capacity(ARTIFACT_COUNT);
    for (index, card) in cards.iter().enumerate() {
        validated.push(Flashcard {
            front: require_string(card, index, "front")?,
            back: require_string(card, index, "back")?,
        });
    }

    Ok(validated)
}

/// Parse and validate the topics call response: `{"topics": [ ...exactly 5 ]}`.
pub fn parse_topics(raw: &str) -> Result<Vec<String>, ValidationError> {
    let json = parse_json(raw)?;

    let topics = json
        .get("topics")
        .ok_or_else(|| ValidationError::MissingField("topics".to_string()))?
        .as_array()
        .ok_or(ValidationError::WrongType {
            field: "topics".to_string(),
            expected: "an array",
        })?;

    if topics.len() != ARTIFACT_COUNT {
        return Err(ValidationError::WrongCount {
            field: "topics".to_string(),
            expected: ARTIFACT_COUNT,
            actual: topics.len(),
        });
    }

    let mut validated = Vec::with_capacity(ARTIFACT_COUNT);
    for (index, topic) in topics.iter().enumerate() {
        match topic.as_str() {
            Some(s) if !s.trim().is_empty() => validated.push(s.to_string()),
            _ => {
                return Err(ValidationError::EmptyField {
                    index,
                    field: "topics".to_string(),
                })
            }
        }
    }

    Ok(validated)
}
