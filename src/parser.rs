//! Parser for the plain-text quiz authoring syntax.
//!
//! The format is line oriented:
//!   - `Quiz title:` / `Quiz description:` headers before the first question
//!   - `Points: n` applies to the next question
//!   - `1. text` starts a question, plain lines after it extend the stem
//!   - `a)` / `*a)` single-answer choices, `[ ]` / `[*]` multiple-answer choices
//!   - `___` essay, `* answer` short answer
//!
//! Parsing stops at the first violation and reports its line number.

use std::sync::LazyLock;

use regex::Regex;
use thiserror::Error;

use crate::domain::{Choice, Question, QuestionKind, Quiz};

const DEFAULT_POINTS: f64 = 1.0;

static QUESTION_RE: LazyLock<Regex> =
  LazyLock::new(|| Regex::new(r"^(\d+)\.(?:\s+(.*))?$").expect("question regex"));
static CHOICE_RE: LazyLock<Regex> =
  LazyLock::new(|| Regex::new(r"^(\*?)([a-z])\)\s+(.+)$").expect("choice regex"));
static MULTI_RE: LazyLock<Regex> =
  LazyLock::new(|| Regex::new(r"^\[([ *])\]\s+(.+)$").expect("multi regex"));
static ESSAY_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^_{3,}$").expect("essay regex"));
static SHORT_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^\*\s+(.+)$").expect("short regex"));

#[derive(Debug, Error, PartialEq)]
pub enum QuizError {
  #[error("quiz contains no questions")]
  Empty,
  #[error("line {line}: {message}")]
  Syntax { line: usize, message: String },
}

fn syntax(line: usize, message: impl Into<String>) -> QuizError {
  QuizError::Syntax { line, message: message.into() }
}

/// One classified source line.
#[derive(Debug, PartialEq)]
enum Line<'a> {
  Blank,
  Title(&'a str),
  Description(&'a str),
  Points(&'a str),
  Question { number: &'a str, text: &'a str },
  Choice { correct: bool, letter: char, text: &'a str },
  Multi { correct: bool, text: &'a str },
  Essay,
  Short(&'a str),
  Text(&'a str),
}

fn strip_prefix_ci<'a>(line: &'a str, prefix: &str) -> Option<&'a str> {
  let head = line.get(..prefix.len())?;
  if head.eq_ignore_ascii_case(prefix) { Some(line[prefix.len()..].trim()) } else { None }
}

fn classify(line: &str) -> Line<'_> {
  if line.is_empty() {
    return Line::Blank;
  }
  if let Some(rest) = strip_prefix_ci(line, "quiz title:") {
    return Line::Title(rest);
  }
  if let Some(rest) = strip_prefix_ci(line, "quiz description:") {
    return Line::Description(rest);
  }
  if let Some(rest) = strip_prefix_ci(line, "points:") {
    return Line::Points(rest);
  }
  if let Some(c) = QUESTION_RE.captures(line) {
    let number = c.get(1).map_or("", |m| m.as_str());
    let text = c.get(2).map_or("", |m| m.as_str().trim());
    return Line::Question { number, text };
  }
  if let Some(c) = CHOICE_RE.captures(line) {
    let correct = !c[1].is_empty();
    let letter = c[2].chars().next().unwrap_or('a');
    let text = c.get(3).map_or("", |m| m.as_str().trim());
    return Line::Choice { correct, letter, text };
  }
  if let Some(c) = MULTI_RE.captures(line) {
    let correct = &c[1] == "*";
    let text = c.get(2).map_or("", |m| m.as_str().trim());
    return Line::Multi { correct, text };
  }
  if ESSAY_RE.is_match(line) {
    return Line::Essay;
  }
  if let Some(c) = SHORT_RE.captures(line) {
    return Line::Short(c.get(1).map_or("", |m| m.as_str().trim()));
  }
  Line::Text(line)
}

/// Answer lines collected so far for the open question.
#[derive(Debug)]
enum Responses {
  None,
  Single(Vec<Choice>),
  Multiple(Vec<Choice>),
  Short(Vec<String>),
  Essay,
}

impl Responses {
  fn style(&self) -> &'static str {
    match self {
      Responses::None => "none",
      Responses::Single(_) => "lettered choices",
      Responses::Multiple(_) => "bracketed choices",
      Responses::Short(_) => "short answers",
      Responses::Essay => "an essay prompt",
    }
  }
}

#[derive(Debug)]
struct Draft {
  number: u32,
  line: usize,
  text: Vec<String>,
  points: f64,
  responses: Responses,
}

impl Draft {
  fn mixed(&self, line: usize, found: &str) -> QuizError {
    syntax(
      line,
      format!("question {} mixes {} with {}", self.number, self.responses.style(), found),
    )
  }

  fn finish(self) -> Result<Question, QuizError> {
    let text = self.text.join("\n");
    if text.trim().is_empty() {
      return Err(syntax(self.line, format!("question {} has no text", self.number)));
    }
    let line = self.line;
    let fail = |msg: String| -> Result<Question, QuizError> { Err(syntax(line, msg)) };
    let kind = match self.responses {
      Responses::None => return fail(format!("question {} has no answers", self.number)),
      Responses::Single(choices) => {
        if choices.len() < 2 {
          return fail(format!("question {} needs at least two choices", self.number));
        }
        let correct = choices.iter().filter(|c| c.correct).count();
        if correct != 1 {
          return fail(format!(
            "question {} must mark exactly one correct choice with `*` (found {correct})",
            self.number
          ));
        }
        if is_true_false(&choices) {
          QuestionKind::TrueFalse { choices }
        } else {
          QuestionKind::MultipleChoice { choices }
        }
      }
      Responses::Multiple(choices) => {
        if choices.len() < 2 {
          return fail(format!("question {} needs at least two choices", self.number));
        }
        if !choices.iter().any(|c| c.correct) {
          return fail(format!("question {} must mark at least one choice with `[*]`", self.number));
        }
        QuestionKind::MultipleAnswers { choices }
      }
      Responses::Short(answers) => QuestionKind::ShortAnswer { answers },
      Responses::Essay => QuestionKind::Essay,
    };
    Ok(Question { number: self.number, text, points: self.points, kind })
  }
}

fn is_true_false(choices: &[Choice]) -> bool {
  choices.len() == 2
    && choices[0].text.eq_ignore_ascii_case("true")
    && choices[1].text.eq_ignore_ascii_case("false")
}

fn parse_points(line: usize, raw: &str) -> Result<f64, QuizError> {
  match raw.parse::<f64>() {
    Ok(p) if p.is_finite() && p > 0.0 => Ok(p),
    _ => Err(syntax(line, format!("invalid points value `{raw}`"))),
  }
}

/// Parse quiz source text into a [`Quiz`].
pub fn parse_quiz(source: &str) -> Result<Quiz, QuizError> {
  let source = source.strip_prefix('\u{feff}').unwrap_or(source);
  let mut quiz = Quiz { title: None, description: None, questions: Vec::new() };
  let mut current: Option<Draft> = None;
  let mut pending_points: Option<(usize, f64)> = None;

  for (idx, raw) in source.lines().enumerate() {
    let line_no = idx + 1;
    match classify(raw.trim()) {
      Line::Blank => {}
      Line::Title(_) | Line::Description(_) if current.is_some() => {
        return Err(syntax(line_no, "quiz headers must come before the first question"));
      }
      Line::Title(t) => quiz.title = Some(t.to_string()),
      Line::Description(d) => quiz.description = Some(d.to_string()),
      Line::Points(raw) => {
        pending_points = Some((line_no, parse_points(line_no, raw)?));
      }
      Line::Question { number, text } => {
        if let Some(draft) = current.take() {
          quiz.questions.push(draft.finish()?);
        }
        let number = number
          .parse::<u32>()
          .map_err(|_| syntax(line_no, format!("question number `{number}` is too large")))?;
        let points = pending_points.take().map_or(DEFAULT_POINTS, |(_, p)| p);
        let text = if text.is_empty() { Vec::new() } else { vec![text.to_string()] };
        current = Some(Draft { number, line: line_no, text, points, responses: Responses::None });
      }
      Line::Choice { correct, letter, text } => {
        let draft = open_question(&mut current, line_no, "answer choice")?;
        if let Responses::None = draft.responses {
          draft.responses = Responses::Single(Vec::new());
        }
        let choices = match &mut draft.responses {
          Responses::Single(c) => c,
          _ => return Err(draft.mixed(line_no, "lettered choices")),
        };
        let expected = (b'a' + choices.len() as u8) as char;
        if letter != expected {
          return Err(syntax(line_no, format!("expected choice `{expected})` but found `{letter})`")));
        }
        choices.push(Choice { text: text.to_string(), correct });
      }
      Line::Multi { correct, text } => {
        let draft = open_question(&mut current, line_no, "answer choice")?;
        match &mut draft.responses {
          Responses::None => {
            draft.responses = Responses::Multiple(vec![Choice { text: text.to_string(), correct }]);
          }
          Responses::Multiple(c) => c.push(Choice { text: text.to_string(), correct }),
          _ => return Err(draft.mixed(line_no, "bracketed choices")),
        }
      }
      Line::Short(answer) => {
        let draft = open_question(&mut current, line_no, "short answer")?;
        match &mut draft.responses {
          Responses::None => draft.responses = Responses::Short(vec![answer.to_string()]),
          Responses::Short(a) => a.push(answer.to_string()),
          _ => return Err(draft.mixed(line_no, "short answers")),
        }
      }
      Line::Essay => {
        let draft = open_question(&mut current, line_no, "essay prompt")?;
        match draft.responses {
          Responses::None => draft.responses = Responses::Essay,
          Responses::Essay => {
            return Err(syntax(line_no, format!("question {} has more than one essay prompt", draft.number)));
          }
          _ => return Err(draft.mixed(line_no, "an essay prompt")),
        }
      }
      Line::Text(text) => {
        let draft = open_question(&mut current, line_no, "text")?;
        if !matches!(draft.responses, Responses::None) {
          return Err(syntax(
            line_no,
            format!("unexpected text after the answers of question {}", draft.number),
          ));
        }
        draft.text.push(text.to_string());
      }
    }
  }

  if let Some(draft) = current.take() {
    quiz.questions.push(draft.finish()?);
  }
  if let Some((line, _)) = pending_points {
    return Err(syntax(line, "`Points:` must be followed by a question"));
  }
  if quiz.questions.is_empty() {
    return Err(QuizError::Empty);
  }
  Ok(quiz)
}

fn open_question<'d>(
  current: &'d mut Option<Draft>,
  line: usize,
  what: &str,
) -> Result<&'d mut Draft, QuizError> {
  current
    .as_mut()
    .ok_or_else(|| syntax(line, format!("{what} before the first numbered question")))
}
