//! Domain models for a parsed quiz: questions, their kinds, and answer choices.

/// A whole quiz as read from the authoring syntax.
#[derive(Clone, Debug, PartialEq)]
pub struct Quiz {
  pub title: Option<String>,
  pub description: Option<String>,
  pub questions: Vec<Question>,
}

impl Quiz {
  pub fn points_possible(&self) -> f64 {
    self.questions.iter().map(|q| q.points).sum()
  }
}

#[derive(Clone, Debug, PartialEq)]
pub struct Question {
  /// Number as written by the author (`3.` → 3). Not required to be sequential.
  pub number: u32,
  /// Question stem; multiple source lines are joined with `\n`.
  pub text: String,
  pub points: f64,
  pub kind: QuestionKind,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Choice {
  pub text: String,
  pub correct: bool,
}

/// What kind of question is presented to the learner?
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum QuestionKind {
  /// `a)` / `*b)` lines, exactly one correct.
  MultipleChoice { choices: Vec<Choice> },
  /// Single-answer choices that are exactly "True" and "False".
  TrueFalse { choices: Vec<Choice> },
  /// `[ ]` / `[*]` lines, one or more correct.
  MultipleAnswers { choices: Vec<Choice> },
  /// `* answer` lines; any listed answer is accepted.
  ShortAnswer { answers: Vec<String> },
  /// A line of underscores; graded manually.
  Essay,
}

impl QuestionKind {
  /// Canvas `question_type` metadata value.
  pub fn canvas_type(&self) -> &'static str {
    match self {
      QuestionKind::MultipleChoice { .. } => "multiple_choice_question",
      QuestionKind::TrueFalse { .. } => "true_false_question",
      QuestionKind::MultipleAnswers { .. } => "multiple_answers_question",
      QuestionKind::ShortAnswer { .. } => "short_answer_question",
      QuestionKind::Essay => "essay_question",
    }
  }

  pub fn choices(&self) -> &[Choice] {
    match self {
      QuestionKind::MultipleChoice { choices }
      | QuestionKind::TrueFalse { choices }
      | QuestionKind::MultipleAnswers { choices } => choices,
      QuestionKind::ShortAnswer { .. } | QuestionKind::Essay => &[],
    }
  }
}
