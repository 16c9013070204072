use std::fmt;

use chrono::{NaiveDate, NaiveTime};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::workflows::pipeline::domain::UserId;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MoreInfoRequest {
    pub requested: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub deadline: Option<NaiveDate>,
}

/// Shared by scheduling and rescheduling; `reason` only matters for the latter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InterviewSchedule {
    pub date: NaiveDate,
    pub time: NaiveTime,
    pub receiver: UserId,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InterviewFeedback {
    pub rating: u8,
    pub feedback: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub recommendation: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExamInstructions {
    pub exam_date: NaiveDate,
    pub instructions: String,
    pub receiver: UserId,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub link: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TestResults {
    pub score: f64,
    pub passed: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub remarks: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExamReschedule {
    pub exam_date: NaiveDate,
    pub receiver: UserId,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OfferDetails {
    pub job_title: String,
    pub start_date: NaiveDate,
    /// Defaults to the applicant when omitted.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub receiver: Option<UserId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub salary: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HireDetails {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start_date: Option<NaiveDate>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
}

/// Payload for actions that close an application (reject, withdraw, decline).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ClosureDetails {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

/// Field-level validation message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldError {
    pub field: String,
    pub message: String,
}

/// Every field problem found in one submission.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ValidationErrors(Vec<FieldError>);

impl ValidationErrors {
    pub fn single(field: &str, message: impl Into<String>) -> Self {
        let mut errors = Self::default();
        errors.push(field, message);
        errors
    }

    pub fn push(&mut self, field: &str, message: impl Into<String>) {
        self.0.push(FieldError {
            field: field.to_string(),
            message: message.into(),
        });
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn errors(&self) -> &[FieldError] {
        &self.0
    }

    pub fn has_field(&self, field: &str) -> bool {
        self.0.iter().any(|error| error.field == field)
    }
}

impl fmt::Display for ValidationErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let rendered: Vec<String> = self
            .0
            .iter()
            .map(|error| format!("{}: {}", error.field, error.message))
            .collect();
        write!(f, "{}", rendered.join("; "))
    }
}

/// Pulls typed fields out of a loosely shaped JSON object, collecting every problem.
pub(super) struct PayloadReader<'a> {
    fields: &'a Map<String, Value>,
    errors: ValidationErrors,
}

impl<'a> PayloadReader<'a> {
    pub(super) fn new(fields: &'a Map<String, Value>) -> Self {
        Self {
            fields,
            errors: ValidationErrors::default(),
        }
    }

    pub(super) fn finish<T>(self, build: impl FnOnce() -> Option<T>) -> Result<T, ValidationErrors> {
        if !self.errors.is_empty() {
            return Err(self.errors);
        }
        // `build` only returns None when a required field was missing, which was recorded.
        build().ok_or_else(|| ValidationErrors::single("payload", "incomplete payload"))
    }

    fn present(&self, field: &str) -> Option<&'a Value> {
        match self.fields.get(field) {
            None | Some(Value::Null) => None,
            Some(Value::String(text)) if text.trim().is_empty() => None,
            Some(value) => Some(value),
        }
    }

    fn require(&mut self, field: &str) -> Option<&'a Value> {
        let value = self.present(field);
        if value.is_none() {
            self.errors.push(field, "is required");
        }
        value
    }

    fn as_text(&mut self, field: &str, value: &Value) -> Option<String> {
        match value {
            Value::String(text) => Some(text.trim().to_string()),
            _ => {
                self.errors.push(field, "must be a string");
                None
            }
        }
    }

    pub(super) fn required_text(&mut self, field: &str) -> Option<String> {
        let value = self.require(field)?;
        self.as_text(field, value)
    }

    pub(super) fn optional_text(&mut self, field: &str) -> Option<String> {
        let value = self.present(field)?;
        self.as_text(field, value)
    }

    fn as_date(&mut self, field: &str, value: &Value) -> Option<NaiveDate> {
        let raw = self.as_text(field, value)?;
        match NaiveDate::parse_from_str(&raw, "%Y-%m-%d") {
            Ok(date) => Some(date),
            Err(_) => {
                self.errors.push(field, "must be a date formatted YYYY-MM-DD");
                None
            }
        }
    }

    pub(super) fn required_date(&mut self, field: &str) -> Option<NaiveDate> {
        let value = self.require(field)?;
        self.as_date(field, value)
    }

    pub(super) fn optional_date(&mut self, field: &str) -> Option<NaiveDate> {
        let value = self.present(field)?;
        self.as_date(field, value)
    }

    pub(super) fn required_time(&mut self, field: &str) -> Option<NaiveTime> {
        let value = self.require(field)?;
        let raw = self.as_text(field, value)?;
        let parsed = NaiveTime::parse_from_str(&raw, "%H:%M")
            .or_else(|_| NaiveTime::parse_from_str(&raw, "%H:%M:%S"));
        match parsed {
            Ok(time) => Some(time),
            Err(_) => {
                self.errors.push(field, "must be a time formatted HH:MM");
                None
            }
        }
    }

    fn as_user(&mut self, field: &str, value: &Value) -> Option<UserId> {
        let parsed = match value {
            Value::Number(number) => number.as_u64(),
            Value::String(text) => text.trim().parse::<u64>().ok(),
            _ => None,
        };
        if parsed.is_none() {
            self.errors.push(field, "must be a user id");
        }
        parsed.map(UserId)
    }

    pub(super) fn required_user(&mut self, field: &str) -> Option<UserId> {
        let value = self.require(field)?;
        self.as_user(field, value)
    }

    pub(super) fn optional_user(&mut self, field: &str) -> Option<UserId> {
        let value = self.present(field)?;
        self.as_user(field, value)
    }

    pub(super) fn required_number(&mut self, field: &str, min: f64, max: f64) -> Option<f64> {
        let value = self.require(field)?;
        let parsed = match value {
            Value::Number(number) => number.as_f64(),
            Value::String(text) => text.trim().parse::<f64>().ok(),
            _ => None,
        };
        match parsed {
            Some(number) if number.is_finite() && (min..=max).contains(&number) => Some(number),
            Some(_) => {
                self.errors
                    .push(field, format!("must be between {min} and {max}"));
                None
            }
            None => {
                self.errors.push(field, "must be a number");
                None
            }
        }
    }

    /// Whole number within `min..=max`; fractional values are refused rather than rounded.
    pub(super) fn required_whole_number(&mut self, field: &str, min: u8, max: u8) -> Option<u8> {
        let number = self.required_number(field, f64::from(min), f64::from(max))?;
        if number.fract() != 0.0 {
            self.errors.push(field, "must be a whole number");
            return None;
        }
        u8::try_from(number as u64).ok()
    }

    pub(super) fn required_bool(&mut self, field: &str) -> Option<bool> {
        let value = self.fields.get(field);
        match value {
            Some(Value::Bool(flag)) => Some(*flag),
            Some(Value::String(text)) if text.eq_ignore_ascii_case("true") => Some(true),
            Some(Value::String(text)) if text.eq_ignore_ascii_case("false") => Some(false),
            None | Some(Value::Null) => {
                self.errors.push(field, "is required");
                None
            }
            Some(_) => {
                self.errors.push(field, "must be true or false");
                None
            }
        }
    }

    pub(super) fn required_list(&mut self, field: &str) -> Option<Vec<String>> {
        let items = match self.fields.get(field) {
            Some(Value::Array(items)) => items,
            None | Some(Value::Null) => {
                self.errors.push(field, "is required");
                return None;
            }
            Some(_) => {
                self.errors.push(field, "must be a list of strings");
                return None;
            }
        };

        let mut values = Vec::with_capacity(items.len());
        for item in items {
            match item {
                Value::String(text) if !text.trim().is_empty() => {
                    values.push(text.trim().to_string())
                }
                Value::String(_) => {}
                _ => {
                    self.errors.push(field, "must be a list of strings");
                    return None;
                }
            }
        }

        if values.is_empty() {
            self.errors.push(field, "must name at least one item");
            return None;
        }
        Some(values)
    }
}
