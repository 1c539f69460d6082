//! `{{NAME}}` placeholder substitution.

use std::collections::HashMap;
use std::sync::LazyLock;

use regex::{Captures, Regex};

use crate::model::VariableValues;

/// Substitutable placeholders: upper-case letters and underscores only.
static PLACEHOLDER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\{\{([A-Z_]+)\}\}").expect("placeholder pattern is valid"));

/// Any double-brace span, used to discover declared variables.
static DOUBLE_BRACKETS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\{\{(.*?)\}\}").expect("double bracket pattern is valid"));

/// Replace every `{{NAME}}` in `text` with its value from `variables`.
///
/// Placeholders without an entry are left exactly as written.
///
/// # Examples
///
/// ```
/// use std::collections::HashMap;
/// use evalite_core::template::substitute;
///
/// let vars = HashMap::from([("NAME".to_string(), "World".to_string())]);
/// assert_eq!(substitute("Hello {{NAME}}", &vars), "Hello World");
/// assert_eq!(substitute("Hi {{MISSING}}", &HashMap::new()), "Hi {{MISSING}}");
/// ```
pub fn substitute(text: &str, variables: &HashMap<String, String>) -> String {
    PLACEHOLDER
        .replace_all(text, |caps: &Captures<'_>| match variables.get(&caps[1]) {
            Some(value) => value.clone(),
            None => caps[0].to_string(),
        })
        .into_owned()
}

/// The text-valued subset of a test case's variables.
///
/// Image values cannot be spliced into prompt text and are dropped.
pub fn text_variables(values: &VariableValues) -> HashMap<String, String> {
    values
        .iter()
        .filter_map(|(name, value)| value.as_text().map(|t| (name.clone(), t.to_string())))
        .collect()
}

/// Every `{{ ... }}` occurrence in `text`, trimmed, in order of appearance.
pub fn extract_variable_names(text: &str) -> Vec<String> {
    DOUBLE_BRACKETS
        .captures_iter(text)
        .map(|caps| caps[1].trim().to_string())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::VariableValue;

    fn vars(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn substitutes_known_placeholder() {
        assert_eq!(
            substitute("Hello {{NAME}}", &vars(&[("NAME", "World")])),
            "Hello World"
        );
    }

    #[test]
    fn leaves_missing_placeholder_verbatim() {
        assert_eq!(substitute("Hi {{MISSING}}", &HashMap::new()), "Hi {{MISSING}}");
    }

    #[test]
    fn substitutes_every_occurrence() {
        let out = substitute(
            "{{A}} and {{A}} then {{B_C}}",
            &vars(&[("A", "x"), ("B_C", "y")]),
        );
        assert_eq!(out, "x and x then y");
    }

    #[test]
    fn ignores_non_uppercase_placeholders() {
        let out = substitute("{{name}} {{ NAME }} {{N1}}", &vars(&[("name", "x"), ("NAME", "y")]));
        assert_eq!(out, "{{name}} {{ NAME }} {{N1}}");
    }

    #[test]
    fn value_containing_placeholder_is_not_expanded_again() {
        let out = substitute("{{A}}", &vars(&[("A", "{{B}}"), ("B", "nope")]));
        assert_eq!(out, "{{B}}");
    }

    #[test]
    fn text_variables_drops_images() {
        let mut values = VariableValues::new();
        values.insert("TEXT".into(), VariableValue::text("hello"));
        values.insert("IMG".into(), VariableValue::Image(vec![0xff]));

        let text = text_variables(&values);
        assert_eq!(text.len(), 1);
        assert_eq!(text["TEXT"], "hello");
    }

    #[test]
    fn extracts_trimmed_names_in_order() {
        let names = extract_variable_names("{{ B }} then {{A}} and {{B}}");
        assert_eq!(names, vec!["B", "A", "B"]);
    }
}
