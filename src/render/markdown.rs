use std::sync::OnceLock;

use minijinja::{Environment, context};

use crate::entities::alternative::Alternatives;
use crate::entities::chat::ChatSession;
use crate::entities::drug::ResolvedDrug;
use crate::entities::interaction::InteractionReport;
use crate::error::MedSafeError;

static ENV: OnceLock<Environment<'static>> = OnceLock::new();

const DISCLAIMER: &str = "Educational use only. This is not medical advice; consult a \
pharmacist or doctor before changing any medication.";

#[derive(serde::Serialize)]
struct LabelRow<'a> {
    rxcui: &'a str,
    label: &'a str,
}

fn env() -> Result<&'static Environment<'static>, MedSafeError> {
    if let Some(env) = ENV.get() {
        return Ok(env);
    }

    let mut env = Environment::new();
    env.add_filter("truncate", |s: String, max_chars: usize| -> String {
        match s.char_indices().nth(max_chars) {
            None => s,
            Some((idx, _)) => {
                let mut out = s[..idx].trim_end().to_string();
                out.push('…');
                out
            }
        }
    });
    env.add_template(
        "interactions.md.j2",
        include_str!("../../templates/interactions.md.j2"),
    )?;
    env.add_template(
        "alternatives.md.j2",
        include_str!("../../templates/alternatives.md.j2"),
    )?;
    env.add_template(
        "extract.md.j2",
        include_str!("../../templates/extract.md.j2"),
    )?;
    env.add_template("chat.md.j2", include_str!("../../templates/chat.md.j2"))?;

    Ok(ENV.get_or_init(|| env))
}

/// Labels follow the order of the requested codes, then any other code the data mentions.
fn label_rows(report: &InteractionReport) -> Vec<LabelRow<'_>> {
    let mut rows: Vec<LabelRow<'_>> = report
        .rxcuis
        .iter()
        .map(|code| LabelRow {
            rxcui: code,
            label: report.labels.get(code).map_or(code.as_str(), String::as_str),
        })
        .collect();
    rows.extend(
        report
            .labels
            .iter()
            .filter(|(code, _)| !report.rxcuis.contains(*code))
            .map(|(code, label)| LabelRow {
                rxcui: code,
                label,
            }),
    );
    rows
}

pub fn interactions_markdown(
    drugs: &[String],
    report: &InteractionReport,
) -> Result<String, MedSafeError> {
    let tmpl = env()?.get_template("interactions.md.j2")?;
    Ok(tmpl.render(context! {
        drugs => drugs,
        labels => label_rows(report),
        pairs => report.pairs(),
        disclaimer => DISCLAIMER,
    })?)
}

pub fn alternatives_markdown(result: &Alternatives) -> Result<String, MedSafeError> {
    let tmpl = env()?.get_template("alternatives.md.j2")?;
    Ok(tmpl.render(context! {
        drug => &result.drug,
        alternatives => &result.alternatives,
        disclaimer => DISCLAIMER,
    })?)
}

pub fn extract_markdown(resolved: &[ResolvedDrug]) -> Result<String, MedSafeError> {
    let tmpl = env()?.get_template("extract.md.j2")?;
    Ok(tmpl.render(context! {
        resolved => resolved,
        disclaimer => DISCLAIMER,
    })?)
}

pub fn chat_markdown(session: &ChatSession) -> Result<String, MedSafeError> {
    let tmpl = env()?.get_template("chat.md.j2")?;
    Ok(tmpl.render(context! {
        turns => &session.turns,
        disclaimer => DISCLAIMER,
    })?)
}
