//! Sloka records and their YAML persistence.
//!
//! A record file is a single YAML mapping whose keys are the sloka texts and
//! whose values are metadata objects:
//!
//! ```yaml
//! सुरा निर्जरा देवास्त्रिदशा विबुधाः सुराः ॥: {}
//! ```
//!
//! and, after correction:
//!
//! ```yaml
//! अमरा निर्जरा देवास्त्रिदशा विबुधाः सुराः ॥:
//!   original: अमरा निर्जरा देवास्त्रिदशा विबुधा सुराः ॥
//!   corrected: true
//! ```
//!
//! libyaml switches keys longer than 128 bytes (about 40 Devanagari
//! characters) to the explicit `? key` form, so [`RecordCollection::to_yaml`]
//! writes the mapping itself and uses serde_yaml only for scalars. Every
//! sloka key stays on one greppable line. Order is document order:
//! [`RecordCollection`] is an insertion-ordered map and (de)serialises as
//! such, instead of going through a `HashMap`.

use crate::error::KoshaError;
use serde::de::{MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::HashMap;
use std::fmt;
use std::path::Path;
use tracing::debug;

/// Per-record metadata. Empty until the correction stage fills it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordMeta {
    /// The text before correction.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub original: Option<String>,

    /// `true` iff the service returned a different, non-empty text.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub corrected: Option<bool>,
}

impl RecordMeta {
    pub fn is_empty(&self) -> bool {
        self.original.is_none() && self.corrected.is_none()
    }

    /// Metadata for a record whose key became `corrected_text`.
    pub fn corrected_from(original: impl Into<String>) -> Self {
        Self {
            original: Some(original.into()),
            corrected: Some(true),
        }
    }

    /// Metadata for a record kept as it was.
    pub fn unchanged(original: impl Into<String>) -> Self {
        Self {
            original: Some(original.into()),
            corrected: Some(false),
        }
    }
}

/// One sloka: its text (the unique key) and metadata.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record {
    pub text: String,
    pub meta: RecordMeta,
}

/// An insertion-ordered mapping from sloka text to [`RecordMeta`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecordCollection {
    records: Vec<Record>,
    index: HashMap<String, usize>,
}

impl RecordCollection {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a collection with empty metadata, dropping duplicate texts.
    pub fn from_texts<I, S>(texts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut c = Self::new();
        for t in texts {
            c.insert(t, RecordMeta::default());
        }
        c
    }

    /// Insert a record. Returns `false` (and leaves the collection untouched)
    /// if the key already exists.
    pub fn insert(&mut self, text: impl Into<String>, meta: RecordMeta) -> bool {
        let text = text.into();
        if self.index.contains_key(&text) {
            return false;
        }
        self.index.insert(text.clone(), self.records.len());
        self.records.push(Record { text, meta });
        true
    }

    pub fn contains_key(&self, text: &str) -> bool {
        self.index.contains_key(text)
    }

    pub fn get(&self, text: &str) -> Option<&RecordMeta> {
        self.index.get(text).map(|&i| &self.records[i].meta)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Record> {
        self.records.iter()
    }

    /// Sloka texts in document order.
    pub fn texts(&self) -> impl Iterator<Item = &str> {
        self.records.iter().map(|r| r.text.as_str())
    }

    /// Render as YAML, one `key:` line per record.
    pub fn to_yaml(&self) -> Result<String, KoshaError> {
        if self.records.is_empty() {
            return Ok("{}\n".to_string());
        }
        let mut out = String::new();
        for r in &self.records {
            out.push_str(&yaml_scalar(&r.text)?);
            if r.meta.is_empty() {
                out.push_str(": {}\n");
                continue;
            }
            out.push_str(":\n");
            if let Some(ref original) = r.meta.original {
                out.push_str("  original: ");
                out.push_str(&yaml_scalar(original)?);
                out.push('\n');
            }
            if let Some(corrected) = r.meta.corrected {
                out.push_str(&format!("  corrected: {corrected}\n"));
            }
        }
        Ok(out)
    }

    /// Parse from YAML. An empty document is an empty collection.
    pub fn from_yaml(yaml: &str) -> Result<Self, serde_yaml::Error> {
        if yaml.trim().is_empty() {
            return Ok(Self::new());
        }
        serde_yaml::from_str(yaml)
    }

    /// Load a record file.
    pub async fn load(path: &Path) -> Result<Self, KoshaError> {
        let text = tokio::fs::read_to_string(path).await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                KoshaError::FileNotFound {
                    path: path.to_path_buf(),
                }
            } else {
                KoshaError::ReadFailed {
                    path: path.to_path_buf(),
                    source: e,
                }
            }
        })?;
        let collection = Self::from_yaml(&text).map_err(|e| KoshaError::InvalidRecordFile {
            path: path.to_path_buf(),
            detail: e.to_string(),
        })?;
        debug!("Loaded {} records from {}", collection.len(), path.display());
        Ok(collection)
    }

    /// Write the collection to `path`, creating parent directories.
    ///
    /// Uses atomic write (temp file + rename) to prevent partial files.
    pub async fn save(&self, path: &Path) -> Result<(), KoshaError> {
        let yaml = self.to_yaml()?;
        let write_err = |e| KoshaError::OutputWriteFailed {
            path: path.to_path_buf(),
            source: e,
        };

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await.map_err(write_err)?;
            }
        }

        let tmp_path = path.with_extension("yaml.tmp");
        tokio::fs::write(&tmp_path, yaml).await.map_err(write_err)?;
        tokio::fs::rename(&tmp_path, path).await.map_err(write_err)?;
        debug!("Wrote {} records to {}", self.len(), path.display());
        Ok(())
    }
}

/// One-line YAML scalar for `text`: plain or quoted as serde_yaml decides,
/// double-quoted JSON style if that would span lines.
fn yaml_scalar(text: &str) -> Result<String, KoshaError> {
    let err = |e: String| KoshaError::Internal(format!("YAML serialisation failed: {e}"));
    let scalar = serde_yaml::to_string(text).map_err(|e| err(e.to_string()))?;
    let scalar = scalar.trim_end_matches('\n');
    if scalar.contains('\n') {
        serde_json::to_string(text).map_err(|e| err(e.to_string()))
    } else {
        Ok(scalar.to_string())
    }
}

impl<'a> IntoIterator for &'a RecordCollection {
    type Item = &'a Record;
    type IntoIter = std::slice::Iter<'a, Record>;

    fn into_iter(self) -> Self::IntoIter {
        self.records.iter()
    }
}

impl IntoIterator for RecordCollection {
    type Item = Record;
    type IntoIter = std::vec::IntoIter<Record>;

    fn into_iter(self) -> Self::IntoIter {
        self.records.into_iter()
    }
}

impl Serialize for RecordCollection {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.records.len()))?;
        for r in &self.records {
            map.serialize_entry(&r.text, &r.meta)?;
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for RecordCollection {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct CollectionVisitor;

        impl<'de> Visitor<'de> for CollectionVisitor {
            type Value = RecordCollection;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a mapping from sloka text to metadata")
            }

            fn visit_unit<E: serde::de::Error>(self) -> Result<Self::Value, E> {
                Ok(RecordCollection::new())
            }

            fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<Self::Value, A::Error> {
                let mut c = RecordCollection::new();
                // `key:` with no value parses as null; treat it as `{}`.
                while let Some((text, meta)) = access.next_entry::<String, Option<RecordMeta>>()? {
                    if !c.insert(text.clone(), meta.unwrap_or_default()) {
                        return Err(serde::de::Error::custom(format!("duplicate sloka key: {text}")));
                    }
                }
                Ok(c)
            }
        }

        deserializer.deserialize_map(CollectionVisitor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const S1: &str = "स्वर्गो नाकस्त्रिदिवस्त्रिदशालयः सुरलोको द्यौः ॥";
    const S2: &str = "अमरा निर्जरा देवास्त्रिदशा विबुधाः सुराः ॥";

    #[test]
    fn insert_rejects_duplicates() {
        let mut c = RecordCollection::new();
        assert!(c.insert(S1, RecordMeta::default()));
        assert!(!c.insert(S1, RecordMeta::unchanged(S1)));
        assert_eq!(c.len(), 1);
        assert!(c.get(S1).unwrap().is_empty());
    }

    #[test]
    fn preserves_insertion_order() {
        let c = RecordCollection::from_texts([S2, S1]);
        let texts: Vec<&str> = c.texts().collect();
        assert_eq!(texts, vec![S2, S1]);
    }

    #[test]
    fn empty_meta_serialises_as_empty_mapping() {
        let c = RecordCollection::from_texts([S1]);
        let yaml = c.to_yaml().unwrap();
        assert_eq!(yaml.trim_end(), format!("{S1}: {{}}"));
    }

    #[test]
    fn long_keys_stay_on_one_line() {
        let long = format!("{} ॥", vec!["विबुधाः"; 60].join(" "));
        let c = RecordCollection::from_texts([long.clone()]);
        let yaml = c.to_yaml().unwrap();
        assert_eq!(yaml.lines().count(), 1, "got:\n{yaml}");
        assert_eq!(yaml, format!("{long}: {{}}\n"));
    }

    #[test]
    fn full_sloka_keys_are_simple_keys() {
        // 88 characters, 246 bytes: past libyaml's simple-key limit.
        let sloka = "स्वर्गो नाकस्त्रिदिवस्त्रिदशालयः । सुरलोको द्यौदिवौ द्वे स्त्रियां क्लीबे त्रिविष्टपम् ॥";
        let garbled = "स्वर्गो नाकस्त्रिदिवस्त्रिदशालयः । सुरलोको द्यौदिवौ द्वे स्त्रियां क्लीबे त्रिविष्टपग् ॥";
        let mut c = RecordCollection::new();
        c.insert(sloka, RecordMeta::corrected_from(garbled));
        c.insert(S1, RecordMeta::default());

        let yaml = c.to_yaml().unwrap();
        let lines: Vec<&str> = yaml.lines().collect();
        assert_eq!(
            lines,
            vec![
                format!("{sloka}:"),
                format!("  original: {garbled}"),
                "  corrected: true".to_string(),
                format!("{S1}: {{}}"),
            ],
            "got:\n{yaml}"
        );
        assert!(!yaml.contains("? "));
        assert_eq!(RecordCollection::from_yaml(&yaml).unwrap(), c);
    }

    #[test]
    fn keys_needing_quotes_round_trip() {
        let c = RecordCollection::from_texts(["yes", "१२: ॥", "# ॥"]);
        let yaml = c.to_yaml().unwrap();
        assert_eq!(yaml.lines().count(), 3, "got:\n{yaml}");
        assert_eq!(RecordCollection::from_yaml(&yaml).unwrap(), c);
    }

    #[test]
    fn empty_collection_is_empty_mapping() {
        let yaml = RecordCollection::new().to_yaml().unwrap();
        assert_eq!(yaml, "{}\n");
        assert!(RecordCollection::from_yaml(&yaml).unwrap().is_empty());
    }

    #[test]
    fn corrected_meta_round_trip() {
        let mut c = RecordCollection::new();
        c.insert(S2, RecordMeta::corrected_from("अमरा निर्जरा देवास्त्रिदशा विबुधा सुराः ॥"));
        c.insert(S1, RecordMeta::unchanged(S1));
        let yaml = c.to_yaml().unwrap();
        assert!(yaml.contains("corrected: true"));
        assert!(yaml.contains("corrected: false"));

        let back = RecordCollection::from_yaml(&yaml).unwrap();
        assert_eq!(back, c);
    }

    #[test]
    fn null_values_load_as_empty_meta() {
        let yaml = format!("{S1}:\n{S2}: {{}}\n");
        let c = RecordCollection::from_yaml(&yaml).unwrap();
        assert_eq!(c.len(), 2);
        assert!(c.iter().all(|r| r.meta.is_empty()));
    }

    #[test]
    fn empty_document_is_empty_collection() {
        assert!(RecordCollection::from_yaml("").unwrap().is_empty());
        assert!(RecordCollection::from_yaml("{}\n").unwrap().is_empty());
    }

    #[test]
    fn non_mapping_is_rejected() {
        assert!(RecordCollection::from_yaml("- a\n- b\n").is_err());
    }

    #[tokio::test]
    async fn save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("Output/Kosha/Khanda/adhyaya.yaml");
        let c = RecordCollection::from_texts([S1, S2]);
        c.save(&path).await.unwrap();
        assert!(!path.with_extension("yaml.tmp").exists());

        let loaded = RecordCollection::load(&path).await.unwrap();
        assert_eq!(loaded, c);
    }

    #[tokio::test]
    async fn load_missing_file() {
        let err = RecordCollection::load(Path::new("/definitely/not/here.yaml"))
            .await
            .unwrap_err();
        assert!(matches!(err, KoshaError::FileNotFound { .. }));
    }
}
