//! Questions for LingoClaw: the three question types, lenient answer
//! normalization, judging, and the stack that generation tools write to.

pub mod judge;
pub mod normalize;
pub mod question;
pub mod stack;

pub use judge::{JudgeResult, QuestionHandler};
pub use normalize::normalize;
pub use question::{AssemblyQuestion, ChoiceQuestion, MatchQuestion, PublicQuestion, Question};
pub use stack::QuestionStack;
