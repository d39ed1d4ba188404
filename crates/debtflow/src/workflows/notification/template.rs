use std::collections::BTreeMap;

use crate::workflows::reconciliation::{Installment, Patient};

/// Substitutes `{{ name }}` placeholders with values from `vars`. A
/// placeholder with no matching variable is a validation failure, not a
/// crash: the dispatcher turns it into a FAILED outcome without retrying.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum TemplateError {
    #[error("missing template variable '{0}'")]
    MissingVariable(String),
    #[error("unterminated placeholder starting at byte {0}")]
    UnterminatedPlaceholder(usize),
}

pub fn render(template: &str, vars: &BTreeMap<String, String>) -> Result<String, TemplateError> {
    let mut output = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(start) = rest.find("{{") {
        output.push_str(&rest[..start]);
        let after_open = &rest[start + 2..];
        let end = after_open
            .find("}}")
            .ok_or(TemplateError::UnterminatedPlaceholder(
                template.len() - rest.len() + start,
            ))?;
        let name = after_open[..end].trim();
        let value = vars
            .get(name)
            .ok_or_else(|| TemplateError::MissingVariable(name.to_string()))?;
        output.push_str(value);
        rest = &after_open[end + 2..];
    }

    output.push_str(rest);
    Ok(output)
}

/// The variable set exposed to message templates for one contact attempt.
pub fn message_vars(patient: &Patient, installment: &Installment) -> BTreeMap<String, String> {
    let mut vars = BTreeMap::new();
    vars.insert("patient_name".to_string(), patient.name.clone());
    vars.insert(
        "amount".to_string(),
        format_amount(installment.amount_cents),
    );
    vars.insert(
        "due_date".to_string(),
        installment.due_date.format("%Y-%m-%d").to_string(),
    );
    vars
}

pub fn format_amount(cents: i64) -> String {
    let sign = if cents < 0 { "-" } else { "" };
    let cents = cents.unsigned_abs();
    format!("{sign}{}.{:02}", cents / 100, cents % 100)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vars(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn substitutes_all_placeholders() {
        let rendered = render(
            "Hello {{ patient_name }}, {{ amount }} was due {{ due_date }}.",
            &vars(&[
                ("patient_name", "Ana"),
                ("amount", "150.00"),
                ("due_date", "2025-01-01"),
            ]),
        )
        .expect("template renders");
        assert_eq!(rendered, "Hello Ana, 150.00 was due 2025-01-01.");
    }

    #[test]
    fn missing_variable_is_an_error() {
        let err = render("Hi {{ patient_name }}", &vars(&[])).expect_err("must fail");
        assert_eq!(err, TemplateError::MissingVariable("patient_name".into()));
    }

    #[test]
    fn unterminated_placeholder_is_an_error() {
        let err = render("Hi {{ patient_name", &vars(&[("patient_name", "Ana")]))
            .expect_err("must fail");
        assert!(matches!(err, TemplateError::UnterminatedPlaceholder(_)));
    }

    #[test]
    fn plain_text_passes_through() {
        let rendered = render("No placeholders here.", &vars(&[])).expect("renders");
        assert_eq!(rendered, "No placeholders here.");
    }

    #[test]
    fn formats_amounts_with_two_decimals() {
        assert_eq!(format_amount(15_000), "150.00");
        assert_eq!(format_amount(7), "0.07");
        assert_eq!(format_amount(-1_250), "-12.50");
    }
}
