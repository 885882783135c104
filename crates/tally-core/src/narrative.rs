//! Template rendering for narrative text
//!
//! Templates use mustache-style `{{var}}` placeholders and optional
//! `{{#if var}}...{{/if}}` blocks that are kept only when `var` is set
//! and non-empty.

/// Render a template with the given variables
pub fn render(template: &str, vars: &[(&str, &str)]) -> String {
    let mut result = template.to_string();

    for (key, value) in vars {
        let pattern = format!("{{{{{}}}}}", key);
        result = result.replace(&pattern, value);
    }

    resolve_conditionals(&result, vars)
}

/// Keep or drop `{{#if var}}...{{/if}}` blocks
fn resolve_conditionals(content: &str, vars: &[(&str, &str)]) -> String {
    let mut result = content.to_string();

    while let Some(if_start) = result.find("{{#if ") {
        let var_start = if_start + 6;
        let Some(var_len) = result[var_start..].find("}}") else {
            break;
        };
        let var_name = &result[var_start..var_start + var_len];
        let block_start = var_start + var_len + 2;
        let Some(block_len) = result[block_start..].find("{{/if}}") else {
            break;
        };
        let block_end = block_start + block_len;

        let keep = vars
            .iter()
            .any(|(k, v)| *k == var_name && !v.is_empty());
        let replacement = if keep {
            result[block_start..block_end].to_string()
        } else {
            String::new()
        };
        result = format!("{}{}{}", &result[..if_start], replacement, &result[block_end + 7..]);
    }

    result
}

/// Format a number for prose: integers without decimals, others to two places
pub fn number(value: f64) -> String {
    if !value.is_finite() {
        return "n/a".to_string();
    }
    if value.fract() == 0.0 && value.abs() < 1e15 {
        format!("{:.0}", value)
    } else {
        format!("{:.2}", value)
    }
}

/// Format a fraction as a percentage
pub fn percent(fraction: f64) -> String {
    format!("{:.1}%", fraction * 100.0)
}
