//! Comprehension test answer key
//!
//! The question content is opaque to the engine; it only needs to know
//! which submitted answers miss.

use std::collections::HashMap;

/// One multiple-choice question.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Question {
    /// Form field name, e.g. `q1`.
    pub name: String,
    /// Label shown to participants and reported on a miss.
    pub legend: String,
    /// Correct option key.
    pub answer: String,
}

impl Question {
    /// Create a question.
    #[must_use]
    pub fn new(
        name: impl Into<String>,
        legend: impl Into<String>,
        answer: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            legend: legend.into(),
            answer: answer.into(),
        }
    }
}

/// Provider of the comprehension answer key.
pub trait AnswerKey: Send + Sync {
    /// All questions, in display order.
    fn questions(&self) -> &[Question];

    /// Legends of the questions `answers` got wrong (or left out).
    fn missed_questions(&self, answers: &HashMap<String, String>) -> Vec<String> {
        self.questions()
            .iter()
            .filter(|q| answers.get(&q.name).map(String::as_str) != Some(q.answer.as_str()))
            .map(|q| q.legend.clone())
            .collect()
    }
}

/// The fixed two-question test every participant takes.
#[derive(Debug, Clone)]
pub struct StandardAnswerKey {
    questions: Vec<Question>,
}

impl StandardAnswerKey {
    /// Build the standard key.
    #[must_use]
    pub fn new() -> Self {
        Self {
            questions: vec![
                // How many times will each participant interact with every other participant?
                Question::new("q1", "Question 1", "c"),
                // How many points are allotted to each participant at the start of each round?
                Question::new("q2", "Question 2", "b"),
            ],
        }
    }

    /// Build a key from custom questions.
    #[must_use]
    pub const fn with_questions(questions: Vec<Question>) -> Self {
        Self { questions }
    }
}

impl Default for StandardAnswerKey {
    fn default() -> Self {
        Self::new()
    }
}

impl AnswerKey for StandardAnswerKey {
    fn questions(&self) -> &[Question] {
        &self.questions
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn answers(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect()
    }

    #[test]
    fn test_all_correct() {
        let key = StandardAnswerKey::new();
        assert!(key
            .missed_questions(&answers(&[("q1", "c"), ("q2", "b")]))
            .is_empty());
    }

    #[test]
    fn test_wrong_and_missing_answers() {
        let key = StandardAnswerKey::new();
        assert_eq!(
            key.missed_questions(&answers(&[("q1", "c"), ("q2", "c")])),
            vec!["Question 2".to_string()]
        );
        assert_eq!(key.missed_questions(&HashMap::new()).len(), 2);
    }
}
