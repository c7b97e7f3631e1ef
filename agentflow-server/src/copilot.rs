//! Natural-language command parsing
//!
//! Turns commands such as "process the invoice scan_0042.pdf for March 2024"
//! into a template id and a variable bag. Template selection is keyword
//! based, the first rule with a matching keyword wins. Variables are pulled
//! out with regular expressions:
//!
//! - `period`: `2024-03`, `Q1 2024`, `March 2024`, `last month`, `this month`
//! - `output_format`: `pdf`, `excel`, `xlsx`, `csv` or `json`
//! - `file`: the first token ending in `.pdf`, `.png`, `.jpg`, `.jpeg`, `.csv` or `.xlsx`
//!
//! Caller supplied context is merged first so extracted values take precedence.

use crate::{Error, Result};
use agentflow_core::Variables;
use chrono::{Datelike, NaiveDate, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::json;

const MONTHS: [&str; 12] = [
    "january",
    "february",
    "march",
    "april",
    "may",
    "june",
    "july",
    "august",
    "september",
    "october",
    "november",
    "december",
];

/// Maps command keywords onto a template
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeywordRule {
    pub template_id: String,
    pub keywords: Vec<String>,
}

impl KeywordRule {
    pub fn new<S: Into<String>>(template_id: S, keywords: &[&str]) -> Self {
        Self {
            template_id: template_id.into(),
            keywords: keywords.iter().map(|k| k.to_lowercase()).collect(),
        }
    }
}

/// Body of `POST /copilot/execute`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CopilotCommand {
    pub command: String,
    #[serde(default)]
    pub context: Variables,
}

/// Outcome of parsing a command
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ParsedCommand {
    pub template_id: String,
    pub keyword: String,
    pub variables: Variables,
}

/// Keyword and pattern based command interpreter
#[derive(Debug, Clone)]
pub struct CommandParser {
    rules: Vec<KeywordRule>,
    word: Regex,
    file: Regex,
    iso_month: Regex,
    quarter: Regex,
    month_name: Regex,
    relative_month: Regex,
    format: Regex,
}

impl CommandParser {
    pub fn new(rules: Vec<KeywordRule>) -> Result<Self> {
        Ok(Self {
            rules,
            word: Regex::new(r"[a-z0-9_]+")?,
            file: Regex::new(r"(?i)[\w\-./]+\.(?:pdf|png|jpe?g|csv|xlsx)\b")?,
            iso_month: Regex::new(r"\b(\d{4})-(0[1-9]|1[0-2])\b")?,
            quarter: Regex::new(r"(?i)\bq([1-4])\s+(\d{4})\b")?,
            month_name: Regex::new(
                r"(?i)\b(jan(?:uary)?|feb(?:ruary)?|mar(?:ch)?|apr(?:il)?|may|june?|july?|aug(?:ust)?|sep(?:t(?:ember)?)?|oct(?:ober)?|nov(?:ember)?|dec(?:ember)?)\s+(\d{4})\b",
            )?,
            relative_month: Regex::new(r"(?i)\b(last|previous|this|current)\s+month\b")?,
            format: Regex::new(r"(?i)\b(pdf|excel|xlsx|csv|json)\b")?,
        })
    }

    pub fn rules(&self) -> &[KeywordRule] {
        &self.rules
    }

    /// Parse relative to the current UTC date
    pub fn parse(&self, command: &str, context: &Variables) -> Result<ParsedCommand> {
        self.parse_at(command, context, Utc::now().date_naive())
    }

    /// Parse with `today` anchoring "last month" and "this month"
    pub fn parse_at(
        &self,
        command: &str,
        context: &Variables,
        today: NaiveDate,
    ) -> Result<ParsedCommand> {
        let command = command.trim();
        if command.is_empty() {
            return Err(Error::BadRequest("command must not be empty".to_string()));
        }

        let (template_id, keyword) = self.match_template(command).ok_or_else(|| {
            Error::BadRequest(format!("no workflow matches command '{}'", command))
        })?;

        let mut variables = context.clone();
        variables.insert("command".to_string(), json!(command));

        let file = self.file.find(command).map(|m| m.as_str().to_string());
        // file names must not leak into period or format detection
        let remainder = self.file.replace_all(command, " ");

        if let Some(period) = self.extract_period(&remainder, today) {
            variables.insert("period".to_string(), json!(period));
        }
        if let Some(format) = self.extract_format(&remainder) {
            variables.insert("output_format".to_string(), json!(format));
        }
        if let Some(file) = file {
            variables.insert("file".to_string(), json!(file));
        }

        tracing::debug!(template_id = %template_id, keyword = %keyword, "Parsed copilot command");

        Ok(ParsedCommand {
            template_id,
            keyword,
            variables,
        })
    }

    fn match_template(&self, command: &str) -> Option<(String, String)> {
        let lowered = command.to_lowercase();
        let words: Vec<&str> = self.word.find_iter(&lowered).map(|m| m.as_str()).collect();

        self.rules.iter().find_map(|rule| {
            rule.keywords
                .iter()
                .find(|keyword| {
                    words.iter().any(|word| {
                        *word == keyword.as_str() || word.strip_suffix('s') == Some(keyword.as_str())
                    })
                })
                .map(|keyword| (rule.template_id.clone(), keyword.clone()))
        })
    }

    fn extract_period(&self, text: &str, today: NaiveDate) -> Option<String> {
        if let Some(caps) = self.iso_month.captures(text) {
            return Some(format!("{}-{}", &caps[1], &caps[2]));
        }
        if let Some(caps) = self.quarter.captures(text) {
            return Some(format!("{}-Q{}", &caps[2], &caps[1]));
        }
        if let Some(caps) = self.month_name.captures(text) {
            let prefix = caps[1].to_lowercase();
            let month = MONTHS
                .iter()
                .position(|name| name.starts_with(&prefix[..3.min(prefix.len())]))?
                + 1;
            return Some(format!("{}-{:02}", &caps[2], month));
        }
        if let Some(caps) = self.relative_month.captures(text) {
            let (year, month) = match caps[1].to_lowercase().as_str() {
                "last" | "previous" if today.month() == 1 => (today.year() - 1, 12),
                "last" | "previous" => (today.year(), today.month() - 1),
                _ => (today.year(), today.month()),
            };
            return Some(format!("{}-{:02}", year, month));
        }
        None
    }

    fn extract_format(&self, text: &str) -> Option<String> {
        self.format.captures(text).map(|caps| {
            let format = caps[1].to_lowercase();
            if format == "excel" {
                "xlsx".to_string()
            } else {
                format
            }
        })
    }
}
