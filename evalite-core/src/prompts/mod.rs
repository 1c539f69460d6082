//! Built-in instructions for helper calls, rendered with
//! [`substitute`](crate::template::substitute).

use std::collections::HashMap;

use crate::model::{TestCase, Variable, VariableValue};
use crate::template::substitute;

/// Titles a workspace from its first prompt. Variable: `PROMPT`.
pub const SUMMARIZE: &str = include_str!("summarize.txt");

/// Drafts a prompt template from a task. Variable: `TASK_DESCRIPTION`.
pub const GENERATE_PROMPT: &str = include_str!("generate_prompt.txt");

/// Invents a test case. Variables: `PROMPT_TEMPLATE`, `VARIABLES`,
/// `EXAMPLE_VALUES`.
pub const GENERATE_TEST_CASE: &str = include_str!("generate_test_case.txt");

/// How many existing test cases are shown as examples.
pub const MAX_EXAMPLE_CASES: usize = 3;

pub fn render_summarize(prompt: &str) -> String {
    substitute(SUMMARIZE, &HashMap::from([("PROMPT".to_string(), prompt.to_string())]))
}

pub fn render_generate_prompt(task_description: &str) -> String {
    substitute(
        GENERATE_PROMPT,
        &HashMap::from([(
            "TASK_DESCRIPTION".to_string(),
            task_description.to_string(),
        )]),
    )
}

pub fn render_generate_test_case(
    template: &str,
    variables: &[Variable],
    examples: &[TestCase],
) -> String {
    let vars = HashMap::from([
        ("PROMPT_TEMPLATE".to_string(), template.to_string()),
        ("VARIABLES".to_string(), variable_list(variables)),
        ("EXAMPLE_VALUES".to_string(), example_list(examples)),
    ]);
    substitute(GENERATE_TEST_CASE, &vars)
}

fn variable_list(variables: &[Variable]) -> String {
    variables
        .iter()
        .map(|v| format!("- {}\n", v.name))
        .collect()
}

fn example_list(examples: &[TestCase]) -> String {
    examples
        .iter()
        .take(MAX_EXAMPLE_CASES)
        .map(|case| {
            let pairs: Vec<String> = case
                .variable_values
                .iter()
                .map(|(name, value)| match value {
                    VariableValue::Text(text) => format!("{name}: {text}"),
                    VariableValue::Image(_) => format!("{name}: image"),
                })
                .collect();
            format!("- {}\n", pairs.join(", "))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::VariableValues;
    use crate::types::WorkspaceId;

    #[test]
    fn summarize_embeds_prompt() {
        let rendered = render_summarize("Translate {{TEXT}} to French");
        assert!(rendered.contains("<prompt>\nTranslate {{TEXT}} to French\n</prompt>"));
        assert!(!rendered.contains("{{PROMPT}}"));
    }

    #[test]
    fn generate_prompt_keeps_example_placeholder() {
        let rendered = render_generate_prompt("classify emails");
        assert!(rendered.contains("classify emails"));
        assert!(rendered.contains("{{CUSTOMER_EMAIL}}"));
    }

    #[test]
    fn test_case_prompt_lists_variables_and_examples() {
        let workspace = WorkspaceId::new();
        let examples: Vec<TestCase> = (0..5)
            .map(|i| {
                let mut values = VariableValues::new();
                values.insert("NAME".into(), VariableValue::text(format!("user{i}")));
                values.insert("AVATAR".into(), VariableValue::Image(vec![1]));
                TestCase::new(workspace, values)
            })
            .collect();

        let rendered = render_generate_test_case(
            "Hi {{NAME}}",
            &[Variable::text("NAME"), Variable::text("AVATAR")],
            &examples,
        );

        assert!(rendered.contains("- NAME\n- AVATAR\n"));
        assert!(rendered.contains("- AVATAR: image, NAME: user0\n"));
        assert!(rendered.contains("NAME: user2"));
        assert!(!rendered.contains("NAME: user3"));
        assert!(rendered.contains("Hi {{NAME}}"));
    }
}
