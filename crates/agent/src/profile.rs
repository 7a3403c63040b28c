//! What the agents know about a learner before they start.

use lingoclaw_core::record::{MemoryRecord, MistakeRecord, StoryRecord};
use lingoclaw_core::{Error, Session};

const TOP_MEMORIES: usize = 8;
const RECENT_MISTAKES: usize = 5;

/// A read-only snapshot of one learner's records.
#[derive(Debug, Clone, Default)]
pub struct Profile {
    pub vocab_count: usize,
    pub grammar_count: usize,
    pub memory_count: usize,
    pub mistake_count: usize,
    pub story_count: usize,
    /// Highest priority first.
    pub memories: Vec<MemoryRecord>,
    /// Newest first.
    pub recent_mistakes: Vec<MistakeRecord>,
    pub stories: Vec<StoryRecord>,
}

impl Profile {
    pub async fn load(session: &Session) -> Result<Self, Error> {
        let repos = &session.repos;
        let user = session.user_id;

        let mut memories = repos.memories.all_for_user(user).await?;
        let memory_count = memories.len();
        memories.sort_by(|a, b| b.priority.cmp(&a.priority).then(b.updated_at.cmp(&a.updated_at)));

        let mut mistakes = repos.mistakes.all_for_user(user).await?;
        let mistake_count = mistakes.len();
        mistakes.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        mistakes.truncate(RECENT_MISTAKES);

        let stories = repos.stories.all_for_user(user).await?;

        Ok(Self {
            vocab_count: repos.vocab.count(user).await?,
            grammar_count: repos.grammar.count(user).await?,
            memory_count,
            mistake_count,
            story_count: stories.len(),
            memories,
            recent_mistakes: mistakes,
            stories,
        })
    }

    pub fn counts(&self) -> String {
        format!(
            "Records: vocab={}, grammar={}, memory={}, mistake={}, story={}",
            self.vocab_count, self.grammar_count, self.memory_count, self.mistake_count, self.story_count
        )
    }

    /// Counts, top memories and recent mistakes, for question generation.
    pub fn question_context(&self) -> String {
        let mut out = self.counts();
        out.push_str("\n\n## Learner memories\n");
        push_memories(&mut out, self.memories.iter().take(TOP_MEMORIES), false);
        out.push_str("\n## Recent mistakes\n");
        if self.recent_mistakes.is_empty() {
            out.push_str("(none)\n");
        }
        for m in &self.recent_mistakes {
            out.push_str(&format!(
                "- [{}] {} | answered: {} | correct: {} | why: {}\n",
                m.question_type,
                first_line(&m.question),
                m.answer,
                m.correct_answer,
                m.error_reason
            ));
        }
        out
    }

    /// Counts, every memory summary and every story summary, for record keeping.
    pub fn record_context(&self) -> String {
        let mut out = self.counts();
        out.push_str("\n\n## Memory summaries\n");
        push_memories(&mut out, self.memories.iter(), true);
        out.push_str("\n## Story summaries\n");
        if self.stories.is_empty() {
            out.push_str("(none)\n");
        }
        for s in &self.stories {
            out.push_str(&format!("- [{}] {}\n", s.category, s.summary));
        }
        out
    }
}

fn push_memories<'a>(out: &mut String, memories: impl Iterator<Item = &'a MemoryRecord>, with_ids: bool) {
    let mut any = false;
    for m in memories {
        any = true;
        if with_ids {
            out.push_str(&format!("- id={} [{}] {}\n", m.id, m.category, m.summary));
        } else {
            out.push_str(&format!("- [{}] {}: {}\n", m.category, m.summary, m.content));
        }
    }
    if !any {
        out.push_str("(none)\n");
    }
}

fn first_line(text: &str) -> &str {
    text.lines().next().unwrap_or_default()
}
