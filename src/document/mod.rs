//! Document descriptions: one YAML file per CV language.
//!
//! The renderer owns the full schema. This module checks the parts a broken
//! description most often gets wrong (content sections, theme, palette) so a
//! bad edit fails before any external process runs, with every issue listed.

mod validate;

pub use validate::validate_value;

use crate::config::DocumentEntry;
use crate::error::{DocumentError, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Themes the renderer ships
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Theme {
    /// Default single-column layout
    #[default]
    Classic,
    /// Compact layout after Sourabh Bajaj's template
    Sb2nov,
    /// ATS-friendly engineering layout
    EngineeringResumes,
    /// Engineering layout with classic headings
    EngineeringClassic,
    /// Two-column moderncv look
    ModernCv,
}

impl Theme {
    /// Every theme, in documentation order
    pub const ALL: [Theme; 5] = [
        Theme::Classic,
        Theme::Sb2nov,
        Theme::EngineeringResumes,
        Theme::EngineeringClassic,
        Theme::ModernCv,
    ];

    /// Identifier used in descriptions
    pub fn as_str(&self) -> &'static str {
        match self {
            Theme::Classic => "classic",
            Theme::Sb2nov => "sb2nov",
            Theme::EngineeringResumes => "engineeringresumes",
            Theme::EngineeringClassic => "engineeringclassic",
            Theme::ModernCv => "moderncv",
        }
    }

    /// Parse a theme identifier
    pub fn parse(value: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|theme| theme.as_str() == value)
    }
}

impl std::fmt::Display for Theme {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Semantic color roles of the palette
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ColorRole {
    /// The person's name in the header
    Name,
    /// Contact line (email, phone, social links)
    Connections,
    /// Section headings
    SectionTitles,
    /// Hyperlinks in the body
    Links,
}

impl ColorRole {
    /// Every role
    pub const ALL: [ColorRole; 4] = [
        ColorRole::Name,
        ColorRole::Connections,
        ColorRole::SectionTitles,
        ColorRole::Links,
    ];

    /// Key used under `design.colors`
    pub fn key(&self) -> &'static str {
        match self {
            ColorRole::Name => "name",
            ColorRole::Connections => "connections",
            ColorRole::SectionTitles => "section_titles",
            ColorRole::Links => "links",
        }
    }

    /// Parse a `design.colors` key
    pub fn parse(key: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|role| role.key() == key)
    }
}

/// An sRGB color
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Color {
    /// Red
    pub r: u8,
    /// Green
    pub g: u8,
    /// Blue
    pub b: u8,
}

impl Color {
    /// Parse `#rgb`, `#rrggbb` or `rgb(r, g, b)`
    pub fn parse(value: &str) -> Option<Self> {
        let value = value.trim();
        if let Some(hex) = value.strip_prefix('#') {
            if !hex.chars().all(|c| c.is_ascii_hexdigit()) {
                return None;
            }
            return match hex.len() {
                3 => {
                    let digit = |i: usize| u8::from_str_radix(&hex[i..=i], 16).ok().map(|d| d * 17);
                    Some(Self {
                        r: digit(0)?,
                        g: digit(1)?,
                        b: digit(2)?,
                    })
                }
                6 => {
                    let pair = |i: usize| u8::from_str_radix(&hex[i..i + 2], 16).ok();
                    Some(Self {
                        r: pair(0)?,
                        g: pair(2)?,
                        b: pair(4)?,
                    })
                }
                _ => None,
            };
        }

        let inner = value
            .strip_prefix("rgb(")
            .and_then(|rest| rest.strip_suffix(')'))?;
        let parts: Vec<u8> = inner
            .split(',')
            .map(|part| part.trim().parse::<u8>().ok())
            .collect::<Option<Vec<_>>>()?;
        match parts.as_slice() {
            [r, g, b] => Some(Self {
                r: *r,
                g: *g,
                b: *b,
            }),
            _ => None,
        }
    }

    /// `#rrggbb` form
    pub fn to_hex(&self) -> String {
        format!("#{:02x}{:02x}{:02x}", self.r, self.g, self.b)
    }
}

/// A description that passed structural validation
#[derive(Debug, Clone)]
pub struct DocumentDescription {
    /// Language code from the config entry
    pub language: String,
    /// Landing page label from the config entry
    pub label: String,
    /// Absolute or config-relative path of the YAML file
    pub source: PathBuf,
    /// `cv.name`
    pub name: String,
    /// Section titles in file order
    pub sections: Vec<String>,
    /// `design.theme`, defaulted
    pub theme: Theme,
    /// `design.colors`, only the roles that were set
    pub palette: Vec<(ColorRole, Color)>,
}

impl DocumentDescription {
    /// Color configured for a role
    pub fn color(&self, role: ColorRole) -> Option<Color> {
        self.palette
            .iter()
            .find(|(r, _)| *r == role)
            .map(|(_, color)| *color)
    }
}

/// Read and validate the description for a config entry
pub fn load(entry: &DocumentEntry) -> Result<DocumentDescription> {
    if !entry.source.is_file() {
        return Err(DocumentError::NotFound {
            path: entry.source.clone(),
        }
        .into());
    }
    let content = std::fs::read_to_string(&entry.source)?;
    parse(entry, &content)
}

/// Validate description text for a config entry
pub fn parse(entry: &DocumentEntry, content: &str) -> Result<DocumentDescription> {
    let value: serde_yaml::Value =
        serde_yaml::from_str(content).map_err(|e| DocumentError::Parse {
            path: entry.source.clone(),
            reason: e.to_string(),
        })?;

    let summary = validate_value(&value).map_err(|issues| DocumentError::Invalid {
        path: entry.source.clone(),
        issues,
    })?;

    Ok(DocumentDescription {
        language: entry.language.clone(),
        label: entry.label.clone(),
        source: entry.source.clone(),
        name: summary.name,
        sections: summary.sections,
        theme: summary.theme,
        palette: summary.palette,
    })
}

/// Load every configured description, or the one for `only`.
///
/// All descriptions are checked before the first error is returned, and
/// failures are logged individually.
pub fn load_all(
    entries: &[DocumentEntry],
    only: Option<&str>,
) -> Result<Vec<DocumentDescription>> {
    let selected: Vec<&DocumentEntry> = match only {
        Some(language) => {
            let entry = entries
                .iter()
                .find(|e| e.language == language)
                .ok_or_else(|| DocumentError::UnknownLanguage {
                    language: language.to_string(),
                })?;
            vec![entry]
        }
        None => entries.iter().collect(),
    };

    let mut documents = Vec::with_capacity(selected.len());
    let mut first_error = None;
    for entry in selected {
        match load(entry) {
            Ok(document) => documents.push(document),
            Err(e) => {
                log::error!("{}: {}", entry.language, e);
                first_error.get_or_insert(e);
            }
        }
    }

    match first_error {
        Some(e) => Err(e),
        None => Ok(documents),
    }
}
