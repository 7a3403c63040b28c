//! Judging submitted answers.

use chrono::Utc;
use lingoclaw_core::error::Error;
use lingoclaw_core::message::Message;
use lingoclaw_core::model::ModelTier;
use lingoclaw_core::provider::ProviderRequest;
use lingoclaw_core::record::{MistakeRecord, Resource};
use lingoclaw_core::Session;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use crate::question::{Question, answer_text};

/// Outcome of judging one answer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JudgeResult {
    pub index: usize,
    pub correct: bool,
    pub question: String,
    pub answer: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub correct_answer: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_reason: Option<String>,
}

/// Judges answers and books mistakes for one session.
///
/// Correctness is decided locally. Only wrong answers cost a model call,
/// which writes a short explanation in the target language.
pub struct QuestionHandler {
    session: Session,
}

impl QuestionHandler {
    pub fn new(session: Session) -> Self {
        Self { session }
    }

    pub async fn judge(
        &self,
        index: usize,
        question: &Question,
        answer: Option<&Value>,
    ) -> Result<JudgeResult, Error> {
        let correct = question.is_correct(answer);
        let mut result = JudgeResult {
            index,
            correct,
            question: question.prompt(),
            answer: answer_text(answer),
            correct_answer: None,
            error_reason: None,
        };
        if correct {
            return Ok(result);
        }

        let error_reason = self.error_reason(question, &result.answer).await?;
        result.correct_answer = Some(question.correct_answer_text());
        result.error_reason = Some(error_reason);
        self.record_mistake(question, &result).await?;
        Ok(result)
    }

    async fn error_reason(&self, question: &Question, answer: &str) -> Result<String, Error> {
        let language = &self.session.target_language;
        let system = format!(
            "You are the judge of a language learning platform. In one or two short sentences, \
             explain why the learner's answer is wrong. Write in {language}."
        );
        let user = format!(
            "Question:\n{}\nCorrect answer: {}\nLearner's answer: {}",
            question.prompt(),
            question.correct_answer_text(),
            if answer.is_empty() { "(no answer)" } else { answer },
        );

        let response = self
            .session
            .provider
            .complete(ProviderRequest {
                model: self.session.model(ModelTier::Standard).to_string(),
                messages: vec![Message::system(system), Message::user(user)],
                temperature: 0.3,
                max_tokens: None,
                tools: vec![],
                stream: false,
            })
            .await?;
        Ok(response.message.content.trim().to_string())
    }

    async fn record_mistake(&self, question: &Question, result: &JudgeResult) -> Result<(), Error> {
        let mistake = MistakeRecord {
            id: 0,
            user_id: self.session.user_id,
            question: result.question.clone(),
            question_type: question.kind().to_string(),
            language: self.session.target_language.clone(),
            answer: result.answer.clone(),
            correct_answer: question.correct_answer_text(),
            error_reason: result.error_reason.clone().unwrap_or_default(),
            question_json: serde_json::to_value(question)?,
            created_at: Utc::now(),
        };
        let mistake = self.session.repos.mistakes.create(mistake).await?;
        debug!(user_id = mistake.user_id, id = mistake.id, "Mistake recorded");

        let text = format!("{}\n{}", mistake.question, mistake.error_reason);
        lingoclaw_tools::index_text(&self.session, Resource::Mistake, mistake.id, &text).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::question::ChoiceQuestion;
    use lingoclaw_core::testing::{ScriptedProvider, text_response};
    use lingoclaw_memory::TestBed;
    use serde_json::json;
    use std::sync::Arc;

    fn question() -> Question {
        Question::Choice(ChoiceQuestion {
            stem: "Translate 'dog'".into(),
            options: vec!["perro".into(), "gato".into()],
            correct_answer: "perro".into(),
        })
    }

    #[tokio::test]
    async fn correct_answer_costs_nothing() {
        let provider = Arc::new(ScriptedProvider::default());
        let bed = TestBed::new(provider.clone());
        let handler = QuestionHandler::new(bed.session.clone());

        let result = handler.judge(0, &question(), Some(&json!("perro"))).await.unwrap();
        assert!(result.correct);
        assert!(result.error_reason.is_none());
        assert_eq!(provider.call_count(), 0);
        assert!(bed.session.repos.mistakes.all_for_user(1).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn wrong_answer_gets_reason_and_mistake() {
        let provider = Arc::new(ScriptedProvider::new(vec![text_response(
            " 'gato' significa cat. ",
        )]));
        let bed = TestBed::new(provider.clone());
        let handler = QuestionHandler::new(bed.session.clone());

        let result = handler.judge(2, &question(), Some(&json!("gato"))).await.unwrap();
        assert!(!result.correct);
        assert_eq!(result.index, 2);
        assert_eq!(result.correct_answer.as_deref(), Some("perro"));
        assert_eq!(result.error_reason.as_deref(), Some("'gato' significa cat."));

        let requests = provider.requests();
        assert_eq!(requests[0].model, "o4-mini");
        assert!(requests[0].messages[0].content.contains("es"));

        let mistakes = bed.session.repos.mistakes.all_for_user(1).await.unwrap();
        assert_eq!(mistakes.len(), 1);
        assert_eq!(mistakes[0].question_type, "choice");
        assert_eq!(mistakes[0].answer, "gato");
        assert_eq!(mistakes[0].question_json["correct_answer"], "perro");
        assert_eq!(bed.vectors.len().await, 1);
    }

    #[tokio::test]
    async fn unanswered_is_wrong() {
        let provider = Arc::new(ScriptedProvider::new(vec![text_response("No answer given.")]));
        let bed = TestBed::new(provider);
        let handler = QuestionHandler::new(bed.session.clone());

        let result = handler.judge(0, &question(), None).await.unwrap();
        assert!(!result.correct);
        assert_eq!(result.answer, "");
    }
}
