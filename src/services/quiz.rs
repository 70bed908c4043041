use crate::core::state::QuizQuestion;
use rand::seq::SliceRandom;

pub const DEFAULT_QUIZ_SIZE: usize = 5;

/// Draws up to `count` entries from `pool` without replacement, in uniformly
/// shuffled order.
pub fn sample<T: Clone>(pool: &[T], count: usize) -> Vec<T> {
    let mut shuffled = pool.to_vec();
    shuffled.shuffle(&mut rand::rng());
    shuffled.truncate(count);
    shuffled
}

/// One play-through of a story's quiz.
#[derive(Debug, Clone)]
pub struct QuizSession {
    questions: Vec<QuizQuestion>,
    current: usize,
    selected: Option<usize>,
    confirmed: bool,
    score: usize,
}

impl QuizSession {
    /// Samples `count` valid questions from the story's pool.
    pub fn from_pool(pool: &[QuizQuestion], count: usize) -> Self {
        let valid: Vec<QuizQuestion> = pool.iter().filter(|q| q.is_valid()).cloned().collect();
        if valid.len() < pool.len() {
            log::warn!(
                "Skipping {} quiz questions with an out-of-range answer",
                pool.len() - valid.len()
            );
        }
        Self::new(sample(&valid, count))
    }

    pub fn new(questions: Vec<QuizQuestion>) -> Self {
        Self {
            questions,
            current: 0,
            selected: None,
            confirmed: false,
            score: 0,
        }
    }

    pub fn current(&self) -> Option<&QuizQuestion> {
        self.questions.get(self.current)
    }

    pub fn position(&self) -> usize {
        self.current
    }

    pub fn len(&self) -> usize {
        self.questions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.questions.is_empty()
    }

    pub fn score(&self) -> usize {
        self.score
    }

    pub fn selected(&self) -> Option<usize> {
        self.selected
    }

    pub fn is_confirmed(&self) -> bool {
        self.confirmed
    }

    /// Ignored once the current answer has been confirmed.
    pub fn select(&mut self, answer: usize) {
        if !self.confirmed {
            self.selected = Some(answer);
        }
    }

    /// Locks in the selected answer. Returns whether it was correct, or
    /// `None` when nothing is selected.
    pub fn confirm(&mut self) -> Option<bool> {
        let answer = self.selected?;
        let question = self.current()?;
        let correct = question.is_correct(answer);
        if !self.confirmed {
            self.confirmed = true;
            if correct {
                self.score += 1;
            }
        }
        Some(correct)
    }

    /// Moves to the next question. Returns false once the session is over.
    pub fn next(&mut self) -> bool {
        if self.current + 1 < self.questions.len() {
            self.current += 1;
            self.selected = None;
            self.confirmed = false;
            true
        } else {
            self.current = self.questions.len();
            false
        }
    }

    pub fn is_finished(&self) -> bool {
        self.current >= self.questions.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    fn pool(n: usize) -> Vec<QuizQuestion> {
        (0..n)
            .map(|i| QuizQuestion {
                id: format!("q{}", i),
                question: format!("Question {}?", i),
                options: vec!["A".to_string(), "B".to_string(), "C".to_string()],
                correct_answer_index: i % 3,
            })
            .collect()
    }

    fn assert_distinct_members(sampled: &[QuizQuestion], pool: &[QuizQuestion]) {
        let ids: HashSet<&str> = sampled.iter().map(|q| q.id.as_str()).collect();
        assert_eq!(ids.len(), sampled.len(), "sample contains duplicates");
        for q in sampled {
            assert!(pool.contains(q));
        }
    }

    #[test]
    fn test_sample_smaller_than_pool() {
        let pool = pool(8);
        let sampled = sample(&pool, 3);
        assert_eq!(sampled.len(), 3);
        assert_distinct_members(&sampled, &pool);
    }

    #[test]
    fn test_sample_larger_than_pool_returns_everything() {
        let pool = pool(4);
        let sampled = sample(&pool, 10);
        assert_eq!(sampled.len(), 4);
        assert_distinct_members(&sampled, &pool);
    }

    #[test]
    fn test_sample_zero_and_empty() {
        assert!(sample(&pool(4), 0).is_empty());
        assert!(sample::<QuizQuestion>(&[], 5).is_empty());
    }

    #[test]
    fn test_five_of_six_is_always_distinct() {
        let pool = pool(6);
        for _ in 0..100 {
            let sampled = sample(&pool, DEFAULT_QUIZ_SIZE);
            assert_eq!(sampled.len(), 5);
            assert_distinct_members(&sampled, &pool);
        }
    }

    #[test]
    fn test_session_scores_correct_answers() {
        let mut session = QuizSession::new(pool(3));
        assert_eq!(session.len(), 3);

        // q0: answer 0 is correct
        assert_eq!(session.confirm(), None);
        session.select(0);
        assert_eq!(session.confirm(), Some(true));
        // Confirming again does not double count
        assert_eq!(session.confirm(), Some(true));
        assert!(session.next());

        // q1: answer 1 is correct, pick 2
        session.select(2);
        assert_eq!(session.confirm(), Some(false));
        assert!(session.next());

        // q2: answer 2 is correct
        session.select(2);
        assert_eq!(session.confirm(), Some(true));
        assert!(!session.next());

        assert!(session.is_finished());
        assert!(session.current().is_none());
        assert_eq!(session.score(), 2);
    }

    #[test]
    fn test_selection_locked_after_confirm() {
        let mut session = QuizSession::new(pool(1));
        session.select(1);
        assert!(!session.is_confirmed());
        assert_eq!(session.confirm(), Some(false));
        assert!(session.is_confirmed());
        session.select(0);
        assert_eq!(session.selected(), Some(1));
        assert_eq!(session.confirm(), Some(false));
        assert_eq!(session.score(), 0);
    }

    #[test]
    fn test_from_pool_drops_invalid_questions() {
        let mut questions = pool(3);
        questions[1].correct_answer_index = 7;
        let session = QuizSession::from_pool(&questions, 5);
        assert_eq!(session.len(), 2);
        assert!(session.questions.iter().all(|q| q.is_valid()));
    }
}
