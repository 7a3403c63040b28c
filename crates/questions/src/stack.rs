//! The question stack a generation run builds up through tool calls.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use lingoclaw_core::error::ToolError;
use lingoclaw_core::tool::{Tool, ToolRegistry, ToolResult, required_i64};
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::question::{AssemblyQuestion, ChoiceQuestion, MatchQuestion, Question};

/// Ordered questions shared between the generating agent and its tools.
#[derive(Debug, Clone, Default)]
pub struct QuestionStack {
    questions: Arc<Mutex<Vec<Question>>>,
}

impl QuestionStack {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a question after checking its answer key. Returns the new size.
    pub fn push(&self, question: Question) -> Result<usize, String> {
        question.validate()?;
        let mut questions = self.questions.lock().unwrap();
        questions.push(question);
        Ok(questions.len())
    }

    pub fn remove(&self, index: usize) -> Option<Question> {
        let mut questions = self.questions.lock().unwrap();
        (index < questions.len()).then(|| questions.remove(index))
    }

    pub fn snapshot(&self) -> Vec<Question> {
        self.questions.lock().unwrap().clone()
    }

    pub fn len(&self) -> usize {
        self.questions.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Register the add/delete/list tools for this stack.
    pub fn register_tools(&self, registry: &mut ToolRegistry) {
        registry.register(Box::new(AddQuestionTool::<ChoiceQuestion>::new(self.clone())));
        registry.register(Box::new(AddQuestionTool::<MatchQuestion>::new(self.clone())));
        registry.register(Box::new(AddQuestionTool::<AssemblyQuestion>::new(self.clone())));
        registry.register(Box::new(DeleteQuestionTool {
            stack: self.clone(),
        }));
        registry.register(Box::new(ListQuestionsTool {
            stack: self.clone(),
        }));
    }
}

/// Ties a question body to its tool name, prompt text and schema.
pub trait QuestionKind: DeserializeOwned + Send + Sync + 'static {
    const TOOL_NAME: &'static str;
    const DESCRIPTION: &'static str;
    fn schema() -> Value;
    fn into_question(self) -> Question;
}

impl QuestionKind for ChoiceQuestion {
    const TOOL_NAME: &'static str = "add_choice_question";
    const DESCRIPTION: &'static str =
        "Add a multiple-choice question with one correct option. Use four options.";

    fn schema() -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "stem": { "type": "string", "description": "Question stem" },
                "options": { "type": "array", "items": { "type": "string" } },
                "correct_answer": { "type": "string", "description": "Must equal one option" }
            },
            "required": ["stem", "options", "correct_answer"]
        })
    }

    fn into_question(self) -> Question {
        Question::Choice(self)
    }
}

impl QuestionKind for MatchQuestion {
    const TOOL_NAME: &'static str = "add_match_question";
    const DESCRIPTION: &'static str =
        "Add a matching question. The learner pairs each left option with a right option.";

    fn schema() -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "left_options": { "type": "array", "items": { "type": "string" } },
                "right_options": { "type": "array", "items": { "type": "string" } },
                "correct_answer": {
                    "type": "array",
                    "description": "[left, right] pairs",
                    "items": {
                        "type": "array",
                        "items": { "type": "string" },
                        "minItems": 2,
                        "maxItems": 2
                    }
                }
            },
            "required": ["left_options", "right_options", "correct_answer"]
        })
    }

    fn into_question(self) -> Question {
        Question::Match(self)
    }
}

impl QuestionKind for AssemblyQuestion {
    const TOOL_NAME: &'static str = "add_assembly_question";
    const DESCRIPTION: &'static str = "Add an assembly question. The learner builds the answer \
         from word blocks. Options hold every block in shuffled order, plus distractors.";

    fn schema() -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "stem": { "type": "string", "description": "What to express" },
                "options": { "type": "array", "items": { "type": "string" } },
                "correct_answer": {
                    "type": "array",
                    "items": { "type": "string" },
                    "description": "Blocks in the correct order"
                }
            },
            "required": ["stem", "options", "correct_answer"]
        })
    }

    fn into_question(self) -> Question {
        Question::Assembly(self)
    }
}

pub struct AddQuestionTool<K> {
    stack: QuestionStack,
    _kind: std::marker::PhantomData<fn() -> K>,
}

impl<K: QuestionKind> AddQuestionTool<K> {
    pub fn new(stack: QuestionStack) -> Self {
        Self {
            stack,
            _kind: std::marker::PhantomData,
        }
    }
}

#[async_trait]
impl<K: QuestionKind> Tool for AddQuestionTool<K> {
    fn name(&self) -> &str {
        K::TOOL_NAME
    }

    fn description(&self) -> &str {
        K::DESCRIPTION
    }

    fn parameters_schema(&self) -> Value {
        K::schema()
    }

    async fn execute(&self, arguments: Value) -> Result<ToolResult, ToolError> {
        let body: K = serde_json::from_value(arguments)
            .map_err(|e| ToolError::InvalidArguments(e.to_string()))?;
        let size = self
            .stack
            .push(body.into_question())
            .map_err(ToolError::InvalidArguments)?;
        Ok(ToolResult::ok(format!("Question added, size={size}")))
    }
}

pub struct DeleteQuestionTool {
    stack: QuestionStack,
}

#[async_trait]
impl Tool for DeleteQuestionTool {
    fn name(&self) -> &str {
        "delete_question"
    }

    fn description(&self) -> &str {
        "Remove the question at a zero-based index. Later questions shift down."
    }

    fn parameters_schema(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": { "index": { "type": "integer", "minimum": 0 } },
            "required": ["index"]
        })
    }

    async fn execute(&self, arguments: Value) -> Result<ToolResult, ToolError> {
        let index = required_i64(&arguments, "index")?;
        let removed = usize::try_from(index)
            .ok()
            .and_then(|i| self.stack.remove(i))
            .ok_or_else(|| {
                ToolError::InvalidArguments(format!(
                    "No question at index {index} (size={})",
                    self.stack.len()
                ))
            })?;
        Ok(ToolResult::ok(format!(
            "Deleted {} question, size={}",
            removed.kind(),
            self.stack.len()
        )))
    }
}

pub struct ListQuestionsTool {
    stack: QuestionStack,
}

#[async_trait]
impl Tool for ListQuestionsTool {
    fn name(&self) -> &str {
        "list_questions"
    }

    fn description(&self) -> &str {
        "List the questions added so far with their answers."
    }

    fn parameters_schema(&self) -> Value {
        serde_json::json!({ "type": "object", "properties": {} })
    }

    async fn execute(&self, _arguments: Value) -> Result<ToolResult, ToolError> {
        let questions = self.stack.snapshot();
        if questions.is_empty() {
            return Ok(ToolResult::ok("No questions yet."));
        }
        let lines: Vec<String> = questions
            .iter()
            .enumerate()
            .map(|(i, q)| format!("{i}. {}", q.summary()))
            .collect();
        Ok(ToolResult::ok(lines.join("\n")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lingoclaw_core::tool::ToolCall;
    use serde_json::json;

    fn registry(stack: &QuestionStack) -> ToolRegistry {
        let mut registry = ToolRegistry::new();
        stack.register_tools(&mut registry);
        registry
    }

    fn call(name: &str, arguments: Value) -> ToolCall {
        ToolCall {
            id: "c".into(),
            name: name.into(),
            arguments,
        }
    }

    #[tokio::test]
    async fn tools_add_list_and_delete() {
        let stack = QuestionStack::new();
        let registry = registry(&stack);

        let added = registry
            .execute(&call(
                "add_choice_question",
                json!({"stem": "dog?", "options": ["perro", "gato"], "correct_answer": "perro"}),
            ))
            .await
            .unwrap();
        assert_eq!(added.output, "Question added, size=1");

        registry
            .execute(&call(
                "add_match_question",
                json!({
                    "left_options": ["dog", "cat"],
                    "right_options": ["gato", "perro"],
                    "correct_answer": [["dog", "perro"], ["cat", "gato"]]
                }),
            ))
            .await
            .unwrap();
        registry
            .execute(&call(
                "add_assembly_question",
                json!({"stem": "I am", "options": ["soy", "yo"], "correct_answer": ["yo", "soy"]}),
            ))
            .await
            .unwrap();
        assert_eq!(stack.len(), 3);

        let listed = registry.execute(&call("list_questions", json!({}))).await.unwrap();
        assert!(listed.output.starts_with("0. [choice] dog? => perro"));
        assert!(listed.output.contains("2. [assembly]"));

        registry
            .execute(&call("delete_question", json!({"index": 0})))
            .await
            .unwrap();
        let kinds: Vec<_> = stack.snapshot().iter().map(|q| q.kind()).collect();
        assert_eq!(kinds, vec!["match", "assembly"]);
    }

    #[tokio::test]
    async fn invalid_question_is_rejected_without_mutation() {
        let stack = QuestionStack::new();
        let registry = registry(&stack);
        let err = registry
            .execute(&call(
                "add_choice_question",
                json!({"stem": "dog?", "options": ["gato", "casa"], "correct_answer": "perro"}),
            ))
            .await
            .unwrap_err();
        assert!(matches!(err, ToolError::InvalidArguments(_)));

        let err = registry
            .execute(&call("add_match_question", json!({"left_options": ["a"]})))
            .await
            .unwrap_err();
        assert!(matches!(err, ToolError::InvalidArguments(_)));
        assert!(stack.is_empty());
    }

    #[tokio::test]
    async fn delete_out_of_range_fails() {
        let stack = QuestionStack::new();
        let registry = registry(&stack);
        for index in [json!(0), json!(-1)] {
            let err = registry
                .execute(&call("delete_question", json!({"index": index})))
                .await
                .unwrap_err();
            assert!(matches!(err, ToolError::InvalidArguments(_)));
        }
    }
}
