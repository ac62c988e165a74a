//! Landing page routing.
//!
//! The landing page script makes this decision in the browser; keeping the
//! same rules here lets the behaviour be tested and lets `cv_release` print
//! where a given URL ends up.

/// Where a visit to the site root ends up
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Route {
    /// Redirect to `<lang>.pdf`
    Redirect {
        /// Language whose PDF is served
        language: String,
    },
    /// Show the language selection page
    Landing,
}

impl Route {
    /// Path relative to the site root
    pub fn path(&self) -> String {
        match self {
            Route::Redirect { language } => format!("{language}.pdf"),
            Route::Landing => String::new(),
        }
    }
}

/// Decide the route for a visit to the root.
///
/// `query` is the raw query string (with or without the leading `?`),
/// `preferred` the browser's language list in preference order. A `lang`
/// parameter naming a published language always wins; browser preferences
/// only count when `auto_detect` is on.
pub fn resolve_route(
    query: Option<&str>,
    preferred: &[&str],
    languages: &[String],
    auto_detect: bool,
) -> Route {
    if let Some(requested) = query.and_then(lang_parameter)
        && let Some(language) = match_language(&requested, languages)
    {
        return Route::Redirect { language };
    }

    if auto_detect {
        for candidate in preferred {
            if let Some(language) = match_language(candidate, languages) {
                return Route::Redirect { language };
            }
        }
    }

    Route::Landing
}

fn lang_parameter(query: &str) -> Option<String> {
    let query = query.strip_prefix('?').unwrap_or(query);
    url::form_urlencoded::parse(query.as_bytes())
        .find(|(key, _)| key == "lang")
        .map(|(_, value)| value.into_owned())
}

/// Exact code first, then the primary subtag (`pt-BR` → `pt`)
fn match_language(candidate: &str, languages: &[String]) -> Option<String> {
    let candidate = candidate.trim().to_lowercase();
    if candidate.is_empty() {
        return None;
    }
    if let Some(exact) = languages.iter().find(|l| **l == candidate) {
        return Some(exact.clone());
    }
    let primary = candidate.split(['-', '_']).next()?;
    languages.iter().find(|l| *l == primary).cloned()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn languages() -> Vec<String> {
        vec!["en".to_string(), "pt".to_string()]
    }

    #[test]
    fn lang_parameter_redirects() {
        assert_eq!(
            resolve_route(Some("?lang=pt"), &[], &languages(), false).path(),
            "pt.pdf"
        );
        assert_eq!(
            resolve_route(Some("lang=en"), &[], &languages(), false).path(),
            "en.pdf"
        );
        assert_eq!(
            resolve_route(Some("?utm=x&lang=PT-br"), &[], &languages(), false),
            Route::Redirect {
                language: "pt".to_string()
            }
        );
    }

    #[test]
    fn no_parameter_shows_landing_page() {
        assert_eq!(resolve_route(None, &["pt-BR"], &languages(), false), Route::Landing);
        assert_eq!(resolve_route(Some(""), &[], &languages(), false), Route::Landing);
    }

    #[test]
    fn unknown_language_shows_landing_page() {
        assert_eq!(
            resolve_route(Some("?lang=de"), &[], &languages(), false),
            Route::Landing
        );
    }

    #[test]
    fn browser_preference_needs_opt_in() {
        assert_eq!(
            resolve_route(None, &["de-DE", "pt-BR", "en"], &languages(), true),
            Route::Redirect {
                language: "pt".to_string()
            }
        );
        assert_eq!(resolve_route(None, &["de-DE"], &languages(), true), Route::Landing);
    }

    #[test]
    fn explicit_parameter_beats_browser_preference() {
        assert_eq!(
            resolve_route(Some("?lang=en"), &["pt-BR"], &languages(), true).path(),
            "en.pdf"
        );
    }
}
