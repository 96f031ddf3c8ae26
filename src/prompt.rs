//! Input sources for the interactive flows.
//!
//! Flows depend on the [`Prompter`] trait only, so tests drive them with a
//! [`ScriptedPrompter`] and the binary uses [`ConsolePrompter`].

use std::collections::VecDeque;
use std::io::Write;
use std::ops::RangeInclusive;

use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, BufReader, Lines, Stdin};

use crate::errors::AppError;
use crate::interrupt::Interrupt;

pub const QUIT: &str = "quit";

#[async_trait]
pub trait Prompter: Send {
    /// Asks `question` and returns the trimmed answer. Typing `quit`, closing
    /// input, or an interrupt yields `AppError::Cancelled`.
    async fn ask(&mut self, question: &str) -> Result<String, AppError>;

    /// Shows an informational line.
    fn say(&mut self, message: &str);
}

pub struct ConsolePrompter {
    lines: Lines<BufReader<Stdin>>,
    interrupt: Interrupt,
}

impl ConsolePrompter {
    pub fn new(interrupt: Interrupt) -> Self {
        Self {
            lines: BufReader::new(tokio::io::stdin()).lines(),
            interrupt,
        }
    }
}

#[async_trait]
impl Prompter for ConsolePrompter {
    async fn ask(&mut self, question: &str) -> Result<String, AppError> {
        if self.interrupt.is_triggered() {
            return Err(AppError::Cancelled);
        }
        print!("{} ", question);
        let _ = std::io::stdout().flush();

        let line = tokio::select! {
            line = self.lines.next_line() => line,
            _ = self.interrupt.triggered() => {
                println!();
                return Err(AppError::Cancelled);
            }
        };

        match line {
            Ok(Some(line)) => answer(&line),
            Ok(None) => Err(AppError::Cancelled),
            Err(e) => Err(AppError::Internal(anyhow::anyhow!("failed to read input: {}", e))),
        }
    }

    fn say(&mut self, message: &str) {
        println!("{}", message);
    }
}

fn answer(raw: &str) -> Result<String, AppError> {
    let trimmed = raw.trim();
    if trimmed.eq_ignore_ascii_case(QUIT) {
        return Err(AppError::Cancelled);
    }
    Ok(trimmed.to_string())
}

/// Replays canned answers in order. Running out of answers cancels.
#[derive(Debug, Default)]
pub struct ScriptedPrompter {
    answers: VecDeque<String>,
    pub questions: Vec<String>,
    pub output: Vec<String>,
}

impl ScriptedPrompter {
    pub fn new<I, S>(answers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            answers: answers.into_iter().map(Into::into).collect(),
            questions: Vec::new(),
            output: Vec::new(),
        }
    }

    pub fn remaining(&self) -> usize {
        self.answers.len()
    }
}

#[async_trait]
impl Prompter for ScriptedPrompter {
    async fn ask(&mut self, question: &str) -> Result<String, AppError> {
        self.questions.push(question.to_string());
        match self.answers.pop_front() {
            Some(a) => answer(&a),
            None => Err(AppError::Cancelled),
        }
    }

    fn say(&mut self, message: &str) {
        self.output.push(message.to_string());
    }
}

// ── Prompt helpers ────────────────────────────────────────────

/// yes/no question. An empty answer takes `default` when one is given.
pub async fn confirm(
    p: &mut dyn Prompter,
    question: &str,
    default: Option<bool>,
) -> Result<bool, AppError> {
    let hint = match default {
        Some(true) => " (default: yes)",
        Some(false) => " (default: no)",
        None => "",
    };
    let question = format!("{}{} (yes/no/quit):", question, hint);
    loop {
        let reply = p.ask(&question).await?.to_lowercase();
        match reply.as_str() {
            "yes" | "y" => return Ok(true),
            "no" | "n" => return Ok(false),
            "" if default.is_some() => return Ok(default.unwrap_or_default()),
            _ => p.say("Please enter 'yes', 'no', or 'quit'"),
        }
    }
}

/// Numbered menu; returns the zero-based index of the chosen option.
pub async fn choose(p: &mut dyn Prompter, title: &str, options: &[&str]) -> Result<usize, AppError> {
    p.say(title);
    for (i, option) in options.iter().enumerate() {
        p.say(&format!("{}. {}", i + 1, option));
    }
    loop {
        let reply = p.ask("Enter your choice (number) or 'quit' to exit:").await?;
        match reply.parse::<usize>() {
            Ok(n) if (1..=options.len()).contains(&n) => return Ok(n - 1),
            _ => p.say(&format!("Please enter a number between 1 and {}", options.len())),
        }
    }
}

/// Free-text input. Without a default an empty answer is re-asked.
pub async fn input(
    p: &mut dyn Prompter,
    question: &str,
    default: Option<&str>,
) -> Result<String, AppError> {
    let question = match default {
        Some(d) => format!("{} (default: {}, or 'quit' to exit):", question, d),
        None => format!("{} (or 'quit' to exit):", question),
    };
    loop {
        let reply = p.ask(&question).await?;
        if !reply.is_empty() {
            return Ok(reply);
        }
        if let Some(d) = default {
            return Ok(d.to_string());
        }
        p.say("Please provide a value");
    }
}

pub async fn number_in_range(
    p: &mut dyn Prompter,
    question: &str,
    range: RangeInclusive<u8>,
    default: u8,
) -> Result<u8, AppError> {
    let question = format!("{} ({}-{})", question, range.start(), range.end());
    loop {
        let reply = input(p, &question, Some(&default.to_string())).await?;
        match reply.parse::<u8>() {
            Ok(n) if range.contains(&n) => return Ok(n),
            _ => p.say(&format!(
                "Please enter a number between {} and {}",
                range.start(),
                range.end()
            )),
        }
    }
}

/// Splits a comma-separated answer, dropping empty entries.
pub fn parse_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
        .collect()
}
