//! Question types.
//!
//! A [`Question`] carries its answer key. Anything shown to the learner goes
//! through [`Question::public_view`] or [`Question::prompt`], neither of which
//! includes it.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::normalize::{normalize, normalize_tokens};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "question_type", rename_all = "snake_case")]
pub enum Question {
    Choice(ChoiceQuestion),
    Match(MatchQuestion),
    Assembly(AssemblyQuestion),
}

/// Single-answer multiple choice.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChoiceQuestion {
    pub stem: String,
    pub options: Vec<String>,
    pub correct_answer: String,
}

/// Pair every left option with a right option.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchQuestion {
    pub left_options: Vec<String>,
    pub right_options: Vec<String>,
    pub correct_answer: Vec<(String, String)>,
}

/// Build the answer from word blocks.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssemblyQuestion {
    pub stem: String,
    pub options: Vec<String>,
    pub correct_answer: Vec<String>,
}

/// What the learner sees.
#[derive(Debug, Serialize)]
#[serde(tag = "question_type", rename_all = "snake_case")]
pub enum PublicQuestion<'a> {
    Choice {
        stem: &'a str,
        options: &'a [String],
    },
    Match {
        left_options: &'a [String],
        right_options: &'a [String],
    },
    Assembly {
        stem: &'a str,
        options: &'a [String],
    },
}

impl Question {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Choice(_) => "choice",
            Self::Match(_) => "match",
            Self::Assembly(_) => "assembly",
        }
    }

    pub fn public_view(&self) -> PublicQuestion<'_> {
        match self {
            Self::Choice(q) => PublicQuestion::Choice {
                stem: &q.stem,
                options: &q.options,
            },
            Self::Match(q) => PublicQuestion::Match {
                left_options: &q.left_options,
                right_options: &q.right_options,
            },
            Self::Assembly(q) => PublicQuestion::Assembly {
                stem: &q.stem,
                options: &q.options,
            },
        }
    }

    /// Learner-facing text of the question.
    pub fn prompt(&self) -> String {
        match self {
            Self::Choice(q) => format!("{}\nOptions: {}", q.stem, q.options.join(" | ")),
            Self::Match(q) => format!(
                "Match each item on the left with one on the right.\nLeft: {}\nRight: {}",
                q.left_options.join(" | "),
                q.right_options.join(" | ")
            ),
            Self::Assembly(q) => format!("{}\nBlocks: {}", q.stem, q.options.join(" | ")),
        }
    }

    /// The answer key as display text.
    pub fn correct_answer_text(&self) -> String {
        match self {
            Self::Choice(q) => q.correct_answer.clone(),
            Self::Match(q) => format_pairs(&q.correct_answer),
            Self::Assembly(q) => q.correct_answer.join(" "),
        }
    }

    /// Decide whether `answer` is right. A missing or malformed answer is wrong.
    ///
    /// Choice answers are a string, match answers a list of `[left, right]`
    /// pairs (or a `{left: right}` object), assembly answers a list of blocks
    /// (or one whitespace-separated string).
    pub fn is_correct(&self, answer: Option<&Value>) -> bool {
        let Some(answer) = answer else {
            return false;
        };
        match self {
            Self::Choice(q) => answer
                .as_str()
                .is_some_and(|a| a.trim() == q.correct_answer.trim()),
            Self::Match(q) => parse_pairs(answer).is_some_and(|pairs| {
                let mut given: Vec<(String, String)> = pairs
                    .into_iter()
                    .map(|(l, r)| (l.trim().to_string(), r.trim().to_string()))
                    .collect();
                let mut expected: Vec<(String, String)> = q
                    .correct_answer
                    .iter()
                    .map(|(l, r)| (l.trim().to_string(), r.trim().to_string()))
                    .collect();
                given.sort();
                given.dedup();
                expected.sort();
                expected.dedup();
                given == expected
            }),
            Self::Assembly(q) => parse_tokens(answer).is_some_and(|tokens| {
                let given = normalize_tokens(&tokens);
                !given.is_empty() && given == normalize_tokens(&q.correct_answer)
            }),
        }
    }

    /// Check that the answer key is consistent with the options.
    pub fn validate(&self) -> Result<(), String> {
        match self {
            Self::Choice(q) => {
                if q.options.len() < 2 {
                    return Err("a choice question needs at least two options".into());
                }
                if !q.options.iter().any(|o| o.trim() == q.correct_answer.trim()) {
                    return Err("correct_answer must be one of the options".into());
                }
            }
            Self::Match(q) => {
                if q.correct_answer.is_empty() {
                    return Err("correct_answer must list at least one pair".into());
                }
                for (l, r) in &q.correct_answer {
                    if !q.left_options.contains(l) || !q.right_options.contains(r) {
                        return Err(format!("pair ({l}, {r}) uses an unknown option"));
                    }
                }
            }
            Self::Assembly(q) => {
                if normalize_tokens(&q.correct_answer).is_empty() {
                    return Err("correct_answer must contain at least one block".into());
                }
                let mut pool = normalize_tokens(&q.options);
                for token in normalize_tokens(&q.correct_answer) {
                    match pool.iter().position(|o| *o == token) {
                        Some(i) => {
                            pool.swap_remove(i);
                        }
                        None => return Err(format!("block '{token}' is not among the options")),
                    }
                }
            }
        }
        Ok(())
    }

    /// One line for listing the stack to the generating model.
    pub fn summary(&self) -> String {
        let head = match self {
            Self::Choice(q) => q.stem.clone(),
            Self::Match(q) => format!("{} pairs", q.correct_answer.len()),
            Self::Assembly(q) => q.stem.clone(),
        };
        format!("[{}] {} => {}", self.kind(), head, self.correct_answer_text())
    }
}

fn format_pairs(pairs: &[(String, String)]) -> String {
    pairs
        .iter()
        .map(|(l, r)| format!("{l} - {r}"))
        .collect::<Vec<_>>()
        .join(", ")
}

fn parse_pairs(answer: &Value) -> Option<Vec<(String, String)>> {
    match answer {
        Value::Array(items) => items
            .iter()
            .map(|item| {
                let pair = item.as_array()?;
                match pair.as_slice() {
                    [l, r] => Some((l.as_str()?.to_string(), r.as_str()?.to_string())),
                    _ => None,
                }
            })
            .collect(),
        Value::Object(map) => map
            .iter()
            .map(|(l, r)| Some((l.clone(), r.as_str()?.to_string())))
            .collect(),
        _ => None,
    }
}

fn parse_tokens(answer: &Value) -> Option<Vec<String>> {
    match answer {
        Value::Array(items) => items
            .iter()
            .map(|t| t.as_str().map(str::to_string))
            .collect(),
        Value::String(s) => Some(s.split_whitespace().map(str::to_string).collect()),
        _ => None,
    }
}

/// Display form of a learner answer, for judge results and mistakes.
pub fn answer_text(answer: Option<&Value>) -> String {
    match answer {
        None | Some(Value::Null) => String::new(),
        Some(Value::String(s)) => s.clone(),
        Some(v) => {
            if let Some(pairs) = parse_pairs(v) {
                format_pairs(&pairs)
            } else if let Some(tokens) = parse_tokens(v) {
                tokens.join(" ")
            } else {
                v.to_string()
            }
        }
    }
}
