//! Structural validation over the raw YAML tree.

use super::{Color, ColorRole, Theme};
use crate::error::ValidationIssue;
use serde_yaml::{Mapping, Value};

const TOP_LEVEL_KEYS: [&str; 5] = ["cv", "design", "locale", "locale_catalog", "rendercv_settings"];

/// What validation extracted from a valid description
#[derive(Debug, Clone)]
pub struct Summary {
    /// `cv.name`
    pub name: String,
    /// Section titles in file order
    pub sections: Vec<String>,
    /// Theme, defaulted to classic
    pub theme: Theme,
    /// Colors that were set
    pub palette: Vec<(ColorRole, Color)>,
}

#[derive(Default)]
struct Issues(Vec<ValidationIssue>);

impl Issues {
    fn push(&mut self, path: impl Into<String>, message: impl Into<String>) {
        self.0.push(ValidationIssue {
            path: path.into(),
            message: message.into(),
        });
    }
}

/// Validate a parsed description, returning every issue found
pub fn validate_value(root: &Value) -> Result<Summary, Vec<ValidationIssue>> {
    let mut issues = Issues::default();

    let Some(root) = root.as_mapping() else {
        issues.push("$", "document must be a mapping");
        return Err(issues.0);
    };

    for key in root.keys() {
        match key.as_str() {
            Some(k) if TOP_LEVEL_KEYS.contains(&k) => {}
            Some(k) => issues.push(k, "unknown top-level key"),
            None => issues.push("$", "keys must be strings"),
        }
    }

    let (name, sections) = match root.get("cv") {
        Some(Value::Mapping(cv)) => check_cv(cv, &mut issues),
        Some(_) => {
            issues.push("cv", "must be a mapping");
            (String::new(), Vec::new())
        }
        None => {
            issues.push("cv", "is required");
            (String::new(), Vec::new())
        }
    };

    let (theme, palette) = match root.get("design") {
        Some(Value::Mapping(design)) => check_design(design, &mut issues),
        Some(Value::Null) | None => (Theme::default(), Vec::new()),
        Some(_) => {
            issues.push("design", "must be a mapping");
            (Theme::default(), Vec::new())
        }
    };

    if issues.0.is_empty() {
        Ok(Summary {
            name,
            sections,
            theme,
            palette,
        })
    } else {
        Err(issues.0)
    }
}

fn check_cv(cv: &Mapping, issues: &mut Issues) -> (String, Vec<String>) {
    let name = match cv.get("name") {
        Some(Value::String(name)) if !name.trim().is_empty() => name.trim().to_string(),
        Some(Value::String(_)) => {
            issues.push("cv.name", "must not be empty");
            String::new()
        }
        Some(_) => {
            issues.push("cv.name", "must be a string");
            String::new()
        }
        None => {
            issues.push("cv.name", "is required");
            String::new()
        }
    };

    match cv.get("email") {
        Some(Value::String(email)) if !email.contains('@') => {
            issues.push("cv.email", format!("'{email}' is not an email address"));
        }
        Some(Value::String(_)) | Some(Value::Null) | None => {}
        Some(_) => issues.push("cv.email", "must be a string"),
    }

    let mut titles = Vec::new();
    match cv.get("sections") {
        Some(Value::Mapping(sections)) if sections.is_empty() => {
            issues.push("cv.sections", "must contain at least one section");
        }
        Some(Value::Mapping(sections)) => {
            for (key, entries) in sections {
                let Some(title) = key.as_str() else {
                    issues.push("cv.sections", "section titles must be strings");
                    continue;
                };
                let path = format!("cv.sections.{title}");
                match entries {
                    Value::Sequence(items) if items.is_empty() => {
                        issues.push(path, "must list at least one entry");
                    }
                    Value::Sequence(items) => {
                        for (index, item) in items.iter().enumerate() {
                            if !matches!(item, Value::String(_) | Value::Mapping(_)) {
                                issues.push(
                                    format!("{path}[{index}]"),
                                    "entries must be text or a mapping",
                                );
                            }
                        }
                        titles.push(title.to_string());
                    }
                    _ => issues.push(path, "must be a list of entries"),
                }
            }
        }
        Some(_) => issues.push("cv.sections", "must be a mapping of section title to entries"),
        None => issues.push("cv.sections", "is required"),
    }

    (name, titles)
}

fn check_design(design: &Mapping, issues: &mut Issues) -> (Theme, Vec<(ColorRole, Color)>) {
    let theme = match design.get("theme") {
        Some(Value::String(theme)) => Theme::parse(theme).unwrap_or_else(|| {
            let known: Vec<&str> = Theme::ALL.iter().map(Theme::as_str).collect();
            issues.push(
                "design.theme",
                format!("unknown theme '{theme}' (expected one of {})", known.join(", ")),
            );
            Theme::default()
        }),
        Some(_) => {
            issues.push("design.theme", "must be a string");
            Theme::default()
        }
        None => Theme::default(),
    };

    let mut palette = Vec::new();
    match design.get("colors") {
        Some(Value::Mapping(colors)) => {
            for (key, value) in colors {
                let Some(key) = key.as_str() else {
                    issues.push("design.colors", "color roles must be strings");
                    continue;
                };
                let path = format!("design.colors.{key}");
                let Some(role) = ColorRole::parse(key) else {
                    issues.push(path, "unknown color role");
                    continue;
                };
                match value.as_str().and_then(Color::parse) {
                    Some(color) => palette.push((role, color)),
                    None => issues.push(path, "expected #rgb, #rrggbb or rgb(r, g, b)"),
                }
            }
        }
        Some(Value::Null) | None => {}
        Some(_) => issues.push("design.colors", "must be a mapping"),
    }

    (theme, palette)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn issues_for(yaml: &str) -> Vec<String> {
        let value: Value = serde_yaml::from_str(yaml).expect("yaml parses");
        validate_value(&value)
            .expect_err("should be invalid")
            .into_iter()
            .map(|issue| issue.to_string())
            .collect()
    }

    #[test]
    fn collects_every_issue() {
        let issues = issues_for(
            r##"
cv:
  email: nobody
  sections:
    experience: []
design:
  theme: fancy
  colors:
    name: "#zzzzzz"
    background: "#ffffff"
extra: true
"##,
        );
        assert!(issues.contains(&"extra: unknown top-level key".to_string()));
        assert!(issues.contains(&"cv.name: is required".to_string()));
        assert!(issues.contains(&"cv.email: 'nobody' is not an email address".to_string()));
        assert!(issues.contains(&"cv.sections.experience: must list at least one entry".to_string()));
        assert!(issues.iter().any(|i| i.starts_with("design.theme: unknown theme 'fancy'")));
        assert!(issues.contains(&"design.colors.name: expected #rgb, #rrggbb or rgb(r, g, b)".to_string()));
        assert!(issues.contains(&"design.colors.background: unknown color role".to_string()));
        assert_eq!(issues.len(), 7);
    }

    #[test]
    fn requires_cv_mapping() {
        assert_eq!(issues_for("design: {theme: classic}"), vec!["cv: is required"]);
        assert_eq!(issues_for("- just\n- a list"), vec!["$: document must be a mapping"]);
    }

    #[test]
    fn rejects_non_entry_items() {
        let issues = issues_for("cv:\n  name: Jane\n  sections:\n    skills:\n      - [nested]\n");
        assert_eq!(issues, vec!["cv.sections.skills[0]: entries must be text or a mapping"]);
    }

    #[test]
    fn design_is_optional() {
        let value: Value =
            serde_yaml::from_str("cv:\n  name: Jane\n  sections:\n    about:\n      - Hello\n")
                .expect("yaml parses");
        let summary = validate_value(&value).expect("valid");
        assert_eq!(summary.theme, Theme::Classic);
        assert!(summary.palette.is_empty());
    }
}
