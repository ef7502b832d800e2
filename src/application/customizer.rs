//! Discovery of customizable top-level variables in SCAD source.
//!
//! Only literal assignments are reported (`width = 20; // Width in mm`). Expressions,
//! vectors and `$`-prefixed special variables are skipped so that overriding a
//! reported variable never replaces model logic.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;

static ASSIGNMENT: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(\$?\w+)\s*=\s*([^;]+);(?:\s*//\s*(.*))?").expect("valid regex")
});

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum ScadValue {
    Number(f64),
    Boolean(bool),
    String(String),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScadVariable {
    pub name: String,
    pub value: ScadValue,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
}

pub fn parse_scad_variables(source: &str) -> Vec<ScadVariable> {
    source.lines().filter_map(parse_line).collect()
}

fn parse_line(line: &str) -> Option<ScadVariable> {
    let captures = ASSIGNMENT.captures(line)?;
    let name = captures.get(1)?.as_str();
    if name.starts_with('$') {
        return None;
    }

    let raw = captures.get(2)?.as_str().trim();
    let value = parse_literal(raw)?;
    let comment = captures
        .get(3)
        .map(|comment| comment.as_str().trim().to_string())
        .filter(|comment| !comment.is_empty());

    Some(ScadVariable {
        name: name.to_string(),
        value,
        comment,
    })
}

fn parse_literal(raw: &str) -> Option<ScadValue> {
    if let Ok(number) = raw.parse::<f64>() {
        return number.is_finite().then_some(ScadValue::Number(number));
    }
    match raw {
        "true" => return Some(ScadValue::Boolean(true)),
        "false" => return Some(ScadValue::Boolean(false)),
        _ => {}
    }
    if raw.len() >= 2 && raw.starts_with('"') && raw.ends_with('"') {
        return Some(ScadValue::String(raw[1..raw.len() - 1].to_string()));
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reports_literal_assignments() {
        let source = r#"
width = 20; // Width in mm
rounded = true;
label = "Hello";
$fn = 64;
height = width * 2;
size = [1, 2, 3];
module box() { cube(width); }
"#;
        let variables = parse_scad_variables(source);

        assert_eq!(
            variables,
            vec![
                ScadVariable {
                    name: "width".to_string(),
                    value: ScadValue::Number(20.0),
                    comment: Some("Width in mm".to_string()),
                },
                ScadVariable {
                    name: "rounded".to_string(),
                    value: ScadValue::Boolean(true),
                    comment: None,
                },
                ScadVariable {
                    name: "label".to_string(),
                    value: ScadValue::String("Hello".to_string()),
                    comment: None,
                },
            ]
        );
    }

    #[test]
    fn indented_assignments_are_not_top_level() {
        let source = "module m() {\n    inner = 3;\n}\n";
        assert!(parse_scad_variables(source).is_empty());
    }
}
