//! The in-memory shape of a loaded `.policy` file: one [`ActionDecl`] per
//! `<action>` element, plus the [`LocalizedText`] resolution rule shared by
//! descriptions and messages.

use std::collections::BTreeMap;
use std::path::PathBuf;

use pk_identity::{ActionId, Decision};

/// A free-text field that may carry per-language variants.
///
/// Resolution (`spec.md` §4.2): try the caller's exact language tag; if
/// absent, strip any suffix after `_` and retry; else fall back to the
/// untagged default.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LocalizedText {
    pub default: String,
    pub by_lang: BTreeMap<String, String>,
}

impl LocalizedText {
    pub fn new(default: impl Into<String>) -> Self { Self { default: default.into(), by_lang: BTreeMap::new() } }

    pub fn with_variant(mut self, lang: impl Into<String>, text: impl Into<String>) -> Self {
        self.by_lang.insert(lang.into(), text.into());
        self
    }

    /// Resolves the best text for `lang`, falling back per the rule above.
    /// `lang` of `None` always returns the untagged default.
    pub fn resolve(&self, lang: Option<&str>) -> &str {
        let Some(lang) = lang else {
            return &self.default;
        };
        if let Some(text) = self.by_lang.get(lang) {
            return text;
        }
        if let Some(stem) = lang.split('_').next() {
            if stem != lang {
                if let Some(text) = self.by_lang.get(stem) {
                    return text;
                }
            }
        }
        &self.default
    }
}

/// The three implicit-default results keyed by caller category
/// (`spec.md` §3 "Action").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Defaults {
    pub allow_any: Decision,
    pub allow_inactive: Decision,
    pub allow_active: Decision,
}

/// One declared action, as found inside a `<policyconfig>`'s `<action
/// id="...">` element.
#[derive(Debug, Clone)]
pub struct ActionDecl {
    pub id: ActionId,
    pub description: LocalizedText,
    pub message: LocalizedText,
    pub vendor: Option<String>,
    pub vendor_url: Option<String>,
    pub icon_name: Option<String>,
    pub defaults: Defaults,
    pub annotations: BTreeMap<String, String>,
    /// The `.policy` file this action was declared in -- used both for
    /// diagnostics and to tell "packaged" actions apart from any future
    /// locally-added ones (`NotAuthorizedToModifyDefaults`, `spec.md` §7.10).
    pub source_file: PathBuf,
}

/// A non-fatal issue recorded while parsing, per `spec.md` §4.2 "Unknown
/// elements are skipped silently but recorded on a diagnostic channel".
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostic {
    pub file: PathBuf,
    pub message: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn localisation_fallback_rule() {
        let text = LocalizedText::new("example").with_variant("da", "example (danish)");
        assert_eq!(text.resolve(Some("da_DK")), "example (danish)");
        assert_eq!(text.resolve(Some("fr")), "example");
        assert_eq!(text.resolve(None), "example");
        assert_eq!(text.resolve(Some("da")), "example (danish)");
    }
}
