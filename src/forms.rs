//! Per-form summaries of a namespace.
//!
//! Submissions are grouped by form id. A form's display name comes from the
//! `_form.title` field when the backend supplies one; otherwise it is guessed
//! from the field keys of the form's first submission.

use std::collections::HashMap;

use anyhow::Result;

use crate::config::Config;
use crate::error::GatewayError;
use crate::gateway::{build_gateway, QueryGateway};
use crate::models::{FormSummary, NormalizedSubmission, QueryOptions, RawRecord};

/// Upper bound on backend pages read for one summary.
pub const MAX_FORM_PAGES: usize = 5;

/// Guesses a readable name from a submission's field keys and tags it with
/// the first eight characters of the form id.
///
/// Keys mentioning name/title/subject win, then email plus phone
/// ("Contact Form"), then email alone ("Email Form"), then the first two keys.
pub fn generate_form_name(fields: &RawRecord, form_id: &str) -> String {
    let keys: Vec<&str> = fields.keys().map(String::as_str).collect();
    let has = |key: &str, needle: &str| key.to_lowercase().contains(needle);

    let name_keys: Vec<&str> = keys
        .iter()
        .copied()
        .filter(|k| has(k, "name") || has(k, "title") || has(k, "subject"))
        .collect();
    let any_email = keys.iter().any(|k| has(k, "email"));
    let any_phone = keys.iter().any(|k| has(k, "phone"));

    let name = if !name_keys.is_empty() {
        format!("{} Form", name_keys.join(", "))
    } else if any_email && any_phone {
        "Contact Form".to_string()
    } else if any_email {
        "Email Form".to_string()
    } else if !keys.is_empty() {
        format!("{} Form", keys[..keys.len().min(2)].join(", "))
    } else {
        "Form".to_string()
    };

    let short_id: String = form_id.chars().take(8).collect();
    format!("{} ({}...)", name, short_id)
}

/// `_form.title` of a submission, when present and non-empty.
pub fn form_title(submission: &NormalizedSubmission) -> Option<&str> {
    submission
        .fields
        .get("_form")?
        .get("title")?
        .as_str()
        .filter(|t| !t.trim().is_empty())
}

/// Groups submissions by form id, newest form first.
pub fn summarize_forms(submissions: &[NormalizedSubmission]) -> Vec<FormSummary> {
    let mut index: HashMap<&str, usize> = HashMap::new();
    let mut forms: Vec<FormSummary> = Vec::new();

    for submission in submissions {
        match index.get(submission.source_id.as_str()) {
            Some(&i) => {
                let form = &mut forms[i];
                form.submission_count += 1;
                if submission.created_at > form.last_submission_date {
                    form.last_submission_date = submission.created_at;
                }
            }
            None => {
                index.insert(submission.source_id.as_str(), forms.len());
                forms.push(FormSummary {
                    form_id: submission.source_id.clone(),
                    form_name: form_title(submission)
                        .map(str::to_string)
                        .unwrap_or_else(|| {
                            generate_form_name(&submission.fields, &submission.source_id)
                        }),
                    submission_count: 1,
                    last_submission_date: submission.created_at,
                });
            }
        }
    }

    forms.sort_by(|a, b| b.last_submission_date.cmp(&a.last_submission_date));
    forms
}

/// Reads up to [`MAX_FORM_PAGES`] pages of `namespace` and summarizes them.
pub async fn list_forms(
    gateway: &QueryGateway,
    namespace: &str,
) -> Result<Vec<FormSummary>, GatewayError> {
    let page_size = gateway.settings().max_limit;
    let mut submissions = Vec::new();
    let mut cursor = None;

    for _ in 0..MAX_FORM_PAGES {
        let options = QueryOptions::namespace(namespace)
            .with_limit(page_size)
            .with_cursor(cursor.take());
        let page = gateway.query_submissions(&options).await?;
        submissions.extend(page.result.items);
        match page.result.cursors.next {
            Some(next) if page.result.has_next => cursor = Some(next),
            _ => break,
        }
    }

    tracing::debug!(namespace, submissions = submissions.len(), "Summarizing forms");
    Ok(summarize_forms(&submissions))
}

/// `formdeck forms <namespace>`.
pub async fn run_forms(config: &Config, namespace: &str) -> Result<()> {
    let gateway = build_gateway(config)?;
    let forms = list_forms(&gateway, namespace).await?;

    if forms.is_empty() {
        println!("No forms with submissions in {}.", namespace);
        return Ok(());
    }

    println!(
        "{:<38} {:<40} {:>6}  LAST SUBMISSION",
        "FORM ID", "NAME", "COUNT"
    );
    for form in &forms {
        let name: String = form.form_name.chars().take(40).collect();
        println!(
            "{:<38} {:<40} {:>6}  {}",
            form.form_id,
            name,
            form.submission_count,
            form.last_submission_date.format("%Y-%m-%d %H:%M")
        );
    }
    println!();
    println!("{} forms", forms.len());
    Ok(())
}
