//! Cross-provider language catalog consolidation.
//!
//! Every provider publishes its own list of language codes (`en`, `en-US`, `en_GB`, ...).
//! This crate folds those lists into canonical base-subtag groups and derives which
//! providers support each group, so callers never compare language codes by hand.
//!
//! ```text
//! provider A: en-US, fr          ┐
//! provider B: en, en-GB, de      ┼──> en {A: en-US, B: en}, fr {A: fr}, de {B: de}
//!                                ┘    + auto-detect {A, B}
//! ```

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

/// Canonical id of the synthetic "detect the language first" entry.
pub const AUTO_DETECT: &str = "auto-detect";

const AUTO_DETECT_DISPLAY_NAME: &str = "Auto-detect";

/// A single language as published by one provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LanguageEntry {
    pub provider_id: String,
    pub code: String,
    pub display_name: String,
}

/// All languages one provider offers for one job kind.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProviderCatalog {
    pub provider_id: String,
    pub entries: Vec<LanguageEntry>,
}

impl ProviderCatalog {
    pub fn new(provider_id: impl Into<String>) -> Self {
        Self {
            provider_id: provider_id.into(),
            entries: Vec::new(),
        }
    }

    /// Builder-style variant of [`ProviderCatalog::push`].
    pub fn with_language(mut self, code: impl Into<String>, display_name: impl Into<String>) -> Self {
        self.push(code, display_name);
        self
    }

    pub fn push(&mut self, code: impl Into<String>, display_name: impl Into<String>) {
        self.entries.push(LanguageEntry {
            provider_id: self.provider_id.clone(),
            code: code.into(),
            display_name: display_name.into(),
        });
    }
}

/// One canonical language and the provider-specific code to submit for it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConsolidatedLanguage {
    pub canonical_id: String,
    pub display_name: String,
    /// provider id -> code to send to that provider
    pub variants_by_provider: BTreeMap<String, String>,
}

impl ConsolidatedLanguage {
    pub fn is_auto_detect(&self) -> bool {
        self.canonical_id == AUTO_DETECT
    }
}

/// canonical language id -> providers supporting it.
///
/// Never mutated after construction; a catalog refresh builds a new one.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompatibilityMatrix {
    entries: BTreeMap<String, BTreeSet<String>>,
}

impl CompatibilityMatrix {
    pub fn providers(&self, canonical_id: &str) -> Option<&BTreeSet<String>> {
        self.entries.get(canonical_id)
    }

    pub fn contains(&self, canonical_id: &str, provider_id: &str) -> bool {
        self.entries
            .get(canonical_id)
            .is_some_and(|providers| providers.contains(provider_id))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &BTreeSet<String>)> {
        self.entries.iter()
    }
}

/// Result of consolidating every provider's catalog for one job kind.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LanguageCatalog {
    languages: BTreeMap<String, ConsolidatedLanguage>,
    matrix: CompatibilityMatrix,
    /// Providers in first-seen order
    providers: Vec<String>,
}

impl LanguageCatalog {
    pub fn get(&self, canonical_id: &str) -> Option<&ConsolidatedLanguage> {
        self.languages.get(canonical_id)
    }

    pub fn matrix(&self) -> &CompatibilityMatrix {
        &self.matrix
    }

    pub fn providers(&self) -> &[String] {
        &self.providers
    }

    pub fn len(&self) -> usize {
        self.languages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.languages.is_empty()
    }

    /// Languages ordered by canonical id.
    pub fn iter(&self) -> impl Iterator<Item = &ConsolidatedLanguage> {
        self.languages.values()
    }

    /// Languages for display: auto-detect first, then alphabetical by name.
    pub fn sorted_by_name(&self) -> Vec<&ConsolidatedLanguage> {
        let mut languages: Vec<_> = self.languages.values().collect();
        languages.sort_by(|a, b| {
            b.is_auto_detect()
                .cmp(&a.is_auto_detect())
                .then_with(|| a.display_name.to_lowercase().cmp(&b.display_name.to_lowercase()))
                .then_with(|| a.canonical_id.cmp(&b.canonical_id))
        });
        languages
    }

    /// Maps any provider or user supplied code onto its canonical group, if one exists.
    pub fn canonical_id(&self, code: &str) -> Option<&str> {
        let normalized = normalize_code(code);
        if is_auto_detect_code(&normalized) {
            return self.languages.get(AUTO_DETECT).map(|l| l.canonical_id.as_str());
        }
        self.languages
            .get(&base_subtag(&normalized))
            .map(|l| l.canonical_id.as_str())
    }

    pub fn providers_for(&self, canonical_id: &str) -> Option<&BTreeSet<String>> {
        self.matrix.providers(canonical_id)
    }

    /// Auto-detect is accepted for every provider, even one the catalog never saw.
    pub fn supports(&self, canonical_id: &str, provider_id: &str) -> bool {
        canonical_id == AUTO_DETECT || self.matrix.contains(canonical_id, provider_id)
    }

    /// Provider-specific code to submit for a canonical language.
    pub fn variant_for(&self, canonical_id: &str, provider_id: &str) -> Option<&str> {
        self.languages
            .get(canonical_id)
            .and_then(|l| l.variants_by_provider.get(provider_id))
            .map(String::as_str)
    }

    /// Languages usable with `provider_id`, auto-detect included.
    pub fn languages_for_provider<'a>(
        &'a self,
        provider_id: &'a str,
    ) -> impl Iterator<Item = &'a ConsolidatedLanguage> + 'a {
        self.languages
            .values()
            .filter(move |l| self.supports(&l.canonical_id, provider_id))
    }

    /// Re-expresses the canonical groups as a single-provider catalog.
    pub fn as_provider_catalog(&self, provider_id: &str) -> ProviderCatalog {
        self.languages
            .values()
            .filter(|l| !l.is_auto_detect())
            .fold(ProviderCatalog::new(provider_id), |catalog, l| {
                catalog.with_language(l.canonical_id.clone(), l.display_name.clone())
            })
    }
}

/// Lower-cased, trimmed language code.
pub fn normalize_code(code: &str) -> String {
    code.trim().to_ascii_lowercase()
}

/// First subtag of a code split on `-` or `_`: `en-US` -> `en`, `zh_Hant_TW` -> `zh`.
pub fn base_subtag(code: &str) -> String {
    normalize_code(code)
        .split(['-', '_'])
        .next()
        .unwrap_or_default()
        .to_string()
}

/// Whether `code` asks for automatic language detection (`auto-detect`, `auto`, ...).
pub fn is_auto_detect(code: &str) -> bool {
    is_auto_detect_code(&normalize_code(code))
}

fn is_auto_detect_code(normalized: &str) -> bool {
    matches!(normalized, AUTO_DETECT | "auto" | "auto_detect" | "autodetect")
}

struct Group {
    display_name: String,
    named_by_base_code: bool,
    variants: BTreeMap<String, Variant>,
}

struct Variant {
    code: String,
    exact: bool,
}

/// Groups every provider's entries by base subtag and builds the compatibility matrix.
///
/// Per provider, the variant kept for a group is the code equal to the base subtag when the
/// provider offers one, otherwise the first code seen. Display names come from the first
/// base-only entry seen, falling back to the first entry of the group. A base-only entry
/// from a later provider therefore wins over a regional name from an earlier one: provider
/// order only breaks ties between entries of the same kind.
pub fn consolidate(catalogs: &[ProviderCatalog]) -> LanguageCatalog {
    let mut groups: BTreeMap<String, Group> = BTreeMap::new();
    let mut providers: Vec<String> = Vec::new();

    for catalog in catalogs {
        if !providers.contains(&catalog.provider_id) {
            providers.push(catalog.provider_id.clone());
        }

        for entry in &catalog.entries {
            let normalized = normalize_code(&entry.code);
            if normalized.is_empty() || is_auto_detect_code(&normalized) {
                continue;
            }
            let base = base_subtag(&normalized);
            if base.is_empty() {
                log::warn!(
                    "Skipping language code '{}' from provider '{}': no base subtag",
                    entry.code,
                    catalog.provider_id
                );
                continue;
            }
            let exact = normalized == base;

            let group = groups.entry(base).or_insert_with(|| Group {
                display_name: entry.display_name.clone(),
                named_by_base_code: exact,
                variants: BTreeMap::new(),
            });
            if exact && !group.named_by_base_code {
                group.display_name = entry.display_name.clone();
                group.named_by_base_code = true;
            }

            let candidate = Variant {
                code: entry.code.trim().to_string(),
                exact,
            };
            match group.variants.get_mut(&catalog.provider_id) {
                None => {
                    group.variants.insert(catalog.provider_id.clone(), candidate);
                }
                Some(current) if exact && !current.exact => *current = candidate,
                Some(_) => {}
            }
        }
    }

    let mut languages = BTreeMap::new();
    let mut matrix = BTreeMap::new();

    for (canonical_id, group) in groups {
        let variants_by_provider: BTreeMap<String, String> = group
            .variants
            .into_iter()
            .map(|(provider, variant)| (provider, variant.code))
            .collect();
        matrix.insert(
            canonical_id.clone(),
            variants_by_provider.keys().cloned().collect(),
        );
        languages.insert(
            canonical_id.clone(),
            ConsolidatedLanguage {
                canonical_id,
                display_name: group.display_name,
                variants_by_provider,
            },
        );
    }

    languages.insert(
        AUTO_DETECT.to_string(),
        ConsolidatedLanguage {
            canonical_id: AUTO_DETECT.to_string(),
            display_name: AUTO_DETECT_DISPLAY_NAME.to_string(),
            variants_by_provider: BTreeMap::new(),
        },
    );
    matrix.insert(AUTO_DETECT.to_string(), providers.iter().cloned().collect());

    log::debug!(
        "Consolidated {} provider catalogs into {} languages",
        providers.len(),
        languages.len()
    );

    LanguageCatalog {
        languages,
        matrix: CompatibilityMatrix { entries: matrix },
        providers,
    }
}
