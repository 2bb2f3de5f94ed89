//! Versioned pattern lists.
//!
//! Selectors and hostname fragments are data, not code: they ship as a JSON
//! document (`patterns/default.json`) and can be replaced at load time.

use std::sync::OnceLock;

use serde::{Deserialize, Serialize};

/// Pattern list format version understood by this build.
pub const PATTERN_VERSION: u32 = 1;

const BUILTIN_PATTERNS: &str = include_str!("../patterns/default.json");

static BUILTIN: OnceLock<PatternSet> = OnceLock::new();

/// Error type for pattern list loading.
#[derive(Debug, thiserror::Error)]
pub enum PatternError {
    #[error("Invalid pattern list: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Unsupported pattern list version: {0}")]
    UnsupportedVersion(u32),
    #[error("Pattern list has no ad selectors")]
    NoAdSelectors,
}

/// Every fixed list the Page Suppressor consults.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PatternSet {
    pub version: u32,
    /// Elements detached on every pass, in order
    #[serde(default)]
    pub ad_selectors: Vec<String>,
    /// Selectors hidden by the injected stylesheet
    #[serde(default)]
    pub hide_selectors: Vec<String>,
    /// Lowercase substrings of tracking script URLs
    #[serde(default)]
    pub tracking_script_hosts: Vec<String>,
    /// Candidate cookie/consent containers
    #[serde(default)]
    pub consent_selectors: Vec<String>,
    /// A candidate is hidden only if its text mentions one of these
    #[serde(default)]
    pub consent_keywords: Vec<String>,
    /// Page globals forced to `false` when truthy
    #[serde(default)]
    pub anti_adblock_globals: Vec<String>,
    /// `window.open` targets containing one of these are refused
    #[serde(default)]
    pub blocked_popup_substrings: Vec<String>,
}

impl PatternSet {
    pub fn from_json(text: &str) -> Result<Self, PatternError> {
        let set: PatternSet = serde_json::from_str(text)?;
        if set.version != PATTERN_VERSION {
            return Err(PatternError::UnsupportedVersion(set.version));
        }
        if set.ad_selectors.is_empty() {
            return Err(PatternError::NoAdSelectors);
        }
        Ok(set)
    }

    /// The list bundled with this build.
    pub fn builtin() -> &'static PatternSet {
        BUILTIN.get_or_init(|| {
            PatternSet::from_json(BUILTIN_PATTERNS).expect("bundled pattern list is valid")
        })
    }

    /// CSS that hides `hide_selectors` independently of script timing.
    pub fn stylesheet(&self) -> String {
        if self.hide_selectors.is_empty() {
            return String::new();
        }

        let mut css = String::from("/* AdSweep: hide common ad patterns */\n");
        css.push_str(&self.hide_selectors.join(",\n"));
        css.push_str(
            " {\n  display: none !important;\n  visibility: hidden !important;\n  opacity: 0 !important;\n  height: 0 !important;\n  width: 0 !important;\n}\n",
        );
        css
    }

    /// Does a script `src` point at a known tracker?
    pub fn is_tracking_script(&self, src: &str) -> bool {
        let src = src.to_lowercase();
        self.tracking_script_hosts
            .iter()
            .any(|host| src.contains(host.as_str()))
    }

    /// Does element text look like a cookie/consent notice?
    pub fn mentions_consent(&self, text: &str) -> bool {
        let text = text.to_lowercase();
        self.consent_keywords
            .iter()
            .any(|keyword| text.contains(keyword.as_str()))
    }

    /// Should a `window.open(url)` call be refused?
    pub fn popup_is_blocked(&self, url: &str) -> bool {
        popup_is_blocked(url, &self.blocked_popup_substrings)
    }
}

/// Free-standing form of [`PatternSet::popup_is_blocked`], for guards that
/// only carry the substring list.
pub fn popup_is_blocked(url: &str, blocked: &[String]) -> bool {
    !url.is_empty() && blocked.iter().any(|s| url.contains(s.as_str()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_list_loads() {
        let set = PatternSet::builtin();
        assert_eq!(set.version, PATTERN_VERSION);
        assert!(set.ad_selectors.iter().any(|s| s == ".adsbygoogle"));
        assert_eq!(set.consent_keywords, vec!["cookie", "privacy", "consent"]);
        assert_eq!(set.blocked_popup_substrings, vec!["adblock", "disable"]);
    }

    #[test]
    fn rejects_unknown_version() {
        let err = PatternSet::from_json(r#"{"version": 2, "adSelectors": [".ad"]}"#).unwrap_err();
        assert!(matches!(err, PatternError::UnsupportedVersion(2)));
    }

    #[test]
    fn rejects_empty_selector_list() {
        let err = PatternSet::from_json(r#"{"version": 1}"#).unwrap_err();
        assert!(matches!(err, PatternError::NoAdSelectors));

        let err = PatternSet::from_json("not json").unwrap_err();
        assert!(matches!(err, PatternError::Json(_)));
    }

    #[test]
    fn stylesheet_hides_every_selector() {
        let css = PatternSet::builtin().stylesheet();
        assert!(css.contains("iframe[src*=\"taboola\"]"));
        assert!(css.contains("display: none !important"));
        assert!(css.contains("visibility: hidden !important"));

        let empty = PatternSet {
            hide_selectors: Vec::new(),
            ..PatternSet::builtin().clone()
        };
        assert_eq!(empty.stylesheet(), "");
    }

    #[test]
    fn tracking_scripts_match_case_insensitively() {
        let set = PatternSet::builtin();
        assert!(set.is_tracking_script("https://www.Google-Analytics.com/analytics.js"));
        assert!(set.is_tracking_script("https://connect.facebook.net/en_US/sdk.js"));
        assert!(!set.is_tracking_script("https://cdn.example.com/app.js"));
    }

    #[test]
    fn consent_text_requires_keyword() {
        let set = PatternSet::builtin();
        assert!(set.mentions_consent("We use COOKIES to improve your experience"));
        assert!(set.mentions_consent("Read our Privacy policy"));
        assert!(!set.mentions_consent("Subscribe to our newsletter"));
    }

    #[test]
    fn popup_guard() {
        let set = PatternSet::builtin();
        assert!(set.popup_is_blocked("https://example.com/adblock-detected"));
        assert!(set.popup_is_blocked("https://example.com/?please=disable"));
        assert!(!set.popup_is_blocked("https://example.com/article"));
        assert!(!set.popup_is_blocked(""));
    }
}
