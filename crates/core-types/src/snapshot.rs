//! Point-in-time page model produced by the element indexer.
//!
//! Numeric element indexes are only meaningful for the snapshot they were
//! derived from. Fingerprints identify an element by its structural position so
//! two snapshots can be compared without trusting the indexes.

use std::collections::{BTreeMap, HashSet};
use std::fmt;

/// Structural identity of an interactive element.
#[cfg_attr(feature = "serde-full", derive(serde::Serialize, serde::Deserialize))]
#[derive(Clone, Debug, Eq, PartialEq, Hash, PartialOrd, Ord)]
pub struct ElementFingerprint(pub String);

impl ElementFingerprint {
    /// Hash a tree path (xpath or equivalent) into a fingerprint.
    pub fn from_path(path: &str) -> Self {
        let digest = blake3::hash(path.as_bytes());
        Self(hex::encode(&digest.as_bytes()[..16]))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ElementFingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Set of fingerprints derived from one snapshot.
#[cfg_attr(feature = "serde-full", derive(serde::Serialize, serde::Deserialize))]
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct FingerprintSet(HashSet<ElementFingerprint>);

impl FingerprintSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, fingerprint: ElementFingerprint) -> bool {
        self.0.insert(fingerprint)
    }

    pub fn contains(&self, fingerprint: &ElementFingerprint) -> bool {
        self.0.contains(fingerprint)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ElementFingerprint> {
        self.0.iter()
    }

    /// Fingerprints present here but absent from `baseline`, sorted.
    pub fn appeared_since(&self, baseline: &FingerprintSet) -> Vec<ElementFingerprint> {
        let mut appeared: Vec<ElementFingerprint> =
            self.0.difference(&baseline.0).cloned().collect();
        appeared.sort();
        appeared
    }

    /// A fresh set is consistent with a baseline when nothing new appeared.
    ///
    /// Elements that disappeared do not break consistency.
    pub fn is_consistent_with(&self, baseline: &FingerprintSet) -> bool {
        self.0.is_subset(&baseline.0)
    }
}

impl FromIterator<ElementFingerprint> for FingerprintSet {
    fn from_iter<I: IntoIterator<Item = ElementFingerprint>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// One indexed interactive element.
#[cfg_attr(feature = "serde-full", derive(serde::Serialize, serde::Deserialize))]
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DomElement {
    pub tag_name: String,
    pub xpath: String,
    #[cfg_attr(feature = "serde-full", serde(default))]
    pub attributes: BTreeMap<String, String>,
    #[cfg_attr(
        feature = "serde-full",
        serde(default, skip_serializing_if = "Option::is_none")
    )]
    pub text: Option<String>,
    pub fingerprint: ElementFingerprint,
}

impl DomElement {
    pub fn new(tag_name: impl Into<String>, xpath: impl Into<String>) -> Self {
        let xpath = xpath.into();
        Self {
            tag_name: tag_name.into(),
            fingerprint: ElementFingerprint::from_path(&xpath),
            xpath,
            attributes: BTreeMap::new(),
            text: None,
        }
    }

    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.text = Some(text.into());
        self
    }

    pub fn with_attribute(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.insert(key.into(), value.into());
        self
    }

    /// True for `<input type="file">` elements.
    pub fn is_file_input(&self) -> bool {
        self.tag_name.eq_ignore_ascii_case("input")
            && self
                .attributes
                .get("type")
                .map(|t| t.eq_ignore_ascii_case("file"))
                .unwrap_or(false)
    }
}

/// Browser tab as reported by the state provider.
#[cfg_attr(feature = "serde-full", derive(serde::Serialize, serde::Deserialize))]
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TabInfo {
    pub page_id: u32,
    pub url: String,
    pub title: String,
}

/// Point-in-time view of the page: URL, indexed elements and their fingerprints.
///
/// A deserialized snapshot without fingerprints derives them from its elements.
#[cfg_attr(feature = "serde-full", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde-full", serde(from = "SnapshotRepr"))]
#[derive(Clone, Debug, Default)]
pub struct BrowserStateSnapshot {
    pub url: String,
    #[cfg_attr(
        feature = "serde-full",
        serde(default, skip_serializing_if = "Option::is_none")
    )]
    pub title: Option<String>,
    #[cfg_attr(feature = "serde-full", serde(default))]
    pub selector_map: BTreeMap<u32, DomElement>,
    #[cfg_attr(feature = "serde-full", serde(default))]
    pub tabs: Vec<TabInfo>,
    #[cfg_attr(
        feature = "serde-full",
        serde(default, skip_serializing_if = "Option::is_none")
    )]
    pub screenshot: Option<String>,
    #[cfg_attr(feature = "serde-full", serde(default))]
    fingerprints: FingerprintSet,
}

/// Wire shape of [`BrowserStateSnapshot`].
#[cfg(feature = "serde-full")]
#[derive(serde::Deserialize)]
struct SnapshotRepr {
    url: String,
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    selector_map: BTreeMap<u32, DomElement>,
    #[serde(default)]
    tabs: Vec<TabInfo>,
    #[serde(default)]
    screenshot: Option<String>,
    #[serde(default)]
    fingerprints: FingerprintSet,
}

#[cfg(feature = "serde-full")]
impl From<SnapshotRepr> for BrowserStateSnapshot {
    fn from(repr: SnapshotRepr) -> Self {
        let mut snapshot = BrowserStateSnapshot::new(repr.url, repr.selector_map);
        snapshot.title = repr.title;
        snapshot.tabs = repr.tabs;
        snapshot.screenshot = repr.screenshot;
        if !repr.fingerprints.is_empty() {
            snapshot.fingerprints = repr.fingerprints;
        }
        snapshot
    }
}

impl BrowserStateSnapshot {
    /// Build a snapshot and derive its fingerprint set from the element map.
    pub fn new(
        url: impl Into<String>,
        elements: impl IntoIterator<Item = (u32, DomElement)>,
    ) -> Self {
        let selector_map: BTreeMap<u32, DomElement> = elements.into_iter().collect();
        let fingerprints = selector_map
            .values()
            .map(|element| element.fingerprint.clone())
            .collect();
        Self {
            url: url.into(),
            title: None,
            selector_map,
            tabs: Vec::new(),
            screenshot: None,
            fingerprints,
        }
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    pub fn with_tabs(mut self, tabs: Vec<TabInfo>) -> Self {
        self.tabs = tabs;
        self
    }

    pub fn with_screenshot(mut self, screenshot_base64: impl Into<String>) -> Self {
        self.screenshot = Some(screenshot_base64.into());
        self
    }

    /// Replace the derived fingerprints with ones supplied by the indexer.
    pub fn with_fingerprints(mut self, fingerprints: FingerprintSet) -> Self {
        self.fingerprints = fingerprints;
        self
    }

    pub fn fingerprints(&self) -> &FingerprintSet {
        &self.fingerprints
    }

    pub fn element(&self, index: u32) -> Option<&DomElement> {
        self.selector_map.get(&index)
    }

    pub fn element_count(&self) -> usize {
        self.selector_map.len()
    }
}
