use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use url::Url;

use super::stages::Stage;

/// Declarative rule for one named field of a stage submission.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldRule {
    pub name: String,
    #[serde(default)]
    pub label: Option<String>,
    #[serde(default = "default_required")]
    pub required: bool,
    pub kind: FieldKind,
}

fn default_required() -> bool {
    true
}

impl FieldRule {
    pub fn url(name: &str, label: &str) -> Self {
        Self {
            name: name.to_string(),
            label: Some(label.to_string()),
            required: true,
            kind: FieldKind::Url,
        }
    }

    pub fn choice(name: &str, allowed: &[&str]) -> Self {
        Self {
            name: name.to_string(),
            label: None,
            required: true,
            kind: FieldKind::Enum {
                allowed: allowed.iter().map(|value| value.to_string()).collect(),
            },
        }
    }

    pub fn text(name: &str) -> Self {
        Self {
            name: name.to_string(),
            label: None,
            required: true,
            kind: FieldKind::Text,
        }
    }

    pub fn optional(mut self) -> Self {
        self.required = false;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum FieldKind {
    Url,
    Enum { allowed: Vec<String> },
    Text,
}

/// Field-level reason a payload was rejected.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldIssue {
    Missing,
    InvalidUrl,
    NotAllowed,
    Unexpected,
    InvalidEmail,
    OutOfRange,
}

impl FieldIssue {
    pub const fn label(&self) -> &'static str {
        match self {
            FieldIssue::Missing => "missing",
            FieldIssue::InvalidUrl => "invalid_url",
            FieldIssue::NotAllowed => "not_allowed",
            FieldIssue::Unexpected => "unexpected",
            FieldIssue::InvalidEmail => "invalid_email",
            FieldIssue::OutOfRange => "out_of_range",
        }
    }
}

/// Every field problem found in a payload, keyed by field name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ValidationError {
    pub field_errors: BTreeMap<String, FieldIssue>,
}

impl ValidationError {
    pub fn single(field: &str, issue: FieldIssue) -> Self {
        let mut field_errors = BTreeMap::new();
        field_errors.insert(field.to_string(), issue);
        Self { field_errors }
    }

    pub fn issue(&self, field: &str) -> Option<&FieldIssue> {
        self.field_errors.get(field)
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid submission")?;
        let mut separator = ": ";
        for (field, issue) in &self.field_errors {
            write!(f, "{separator}{field} {}", issue.label())?;
            separator = ", ";
        }
        Ok(())
    }
}

impl std::error::Error for ValidationError {}

/// Payload after validation: URL fields carry an explicit scheme.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ValidatedSubmission {
    pub urls: BTreeMap<String, String>,
    pub values: BTreeMap<String, String>,
}

/// Stateless checker for stage payloads.
#[derive(Debug, Clone, Copy, Default)]
pub struct SubmissionValidator;

impl SubmissionValidator {
    pub fn validate(
        &self,
        stage: &Stage,
        payload: &BTreeMap<String, String>,
    ) -> Result<ValidatedSubmission, ValidationError> {
        let mut field_errors = BTreeMap::new();
        let mut validated = ValidatedSubmission::default();

        for rule in &stage.fields {
            let raw = payload
                .get(&rule.name)
                .map(|value| value.trim())
                .filter(|value| !value.is_empty());

            let Some(raw) = raw else {
                if rule.required {
                    field_errors.insert(rule.name.clone(), FieldIssue::Missing);
                }
                continue;
            };

            match &rule.kind {
                FieldKind::Url => match normalize_url(raw) {
                    Some(url) => {
                        validated.urls.insert(rule.name.clone(), url);
                    }
                    None => {
                        field_errors.insert(rule.name.clone(), FieldIssue::InvalidUrl);
                    }
                },
                FieldKind::Enum { allowed } => {
                    if allowed.iter().any(|option| option == raw) {
                        validated.values.insert(rule.name.clone(), raw.to_string());
                    } else {
                        field_errors.insert(rule.name.clone(), FieldIssue::NotAllowed);
                    }
                }
                FieldKind::Text => {
                    validated.values.insert(rule.name.clone(), raw.to_string());
                }
            }
        }

        for field in payload.keys() {
            if !stage.fields.iter().any(|rule| rule.name == *field) {
                field_errors.insert(field.clone(), FieldIssue::Unexpected);
            }
        }

        if field_errors.is_empty() {
            Ok(validated)
        } else {
            Err(ValidationError { field_errors })
        }
    }
}

/// Prefix `http://` when the scheme is absent and confirm the result is an
/// absolute http(s) URL with a host. Returns `None` for blank or unparseable input.
pub fn normalize_url(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }

    let candidate = if has_scheme(trimmed) {
        trimmed.to_string()
    } else {
        format!("http://{trimmed}")
    };

    let parsed = Url::parse(&candidate).ok()?;
    let supported = matches!(parsed.scheme(), "http" | "https");
    let has_host = parsed.host_str().is_some_and(|host| !host.is_empty());
    if supported && has_host {
        Some(candidate)
    } else {
        None
    }
}

/// True when `raw` opens with `scheme://`; a `://` later in a query or fragment does not count.
fn has_scheme(raw: &str) -> bool {
    let Some((scheme, _)) = raw.split_once("://") else {
        return false;
    };
    let mut chars = scheme.chars();
    chars.next().is_some_and(|first| first.is_ascii_alphabetic())
        && chars.all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '.'))
}

/// Loose shape check: one `@`, a non-empty local part, and a dotted domain.
pub fn is_plausible_email(raw: &str) -> bool {
    let trimmed = raw.trim();
    if trimmed.chars().any(char::is_whitespace) {
        return false;
    }
    match trimmed.split_once('@') {
        Some((local, domain)) => {
            !local.is_empty()
                && !domain.contains('@')
                && domain
                    .split('.')
                    .filter(|part| !part.is_empty())
                    .count()
                    >= 2
                && !domain.starts_with('.')
                && !domain.ends_with('.')
        }
        None => false,
    }
}
