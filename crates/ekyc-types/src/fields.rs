use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Field name to value mapping produced by an extractor.
///
/// Backed by an ordered map so repeated extractions serialize identically.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ExtractedFields {
    values: BTreeMap<String, String>,
}

impl ExtractedFields {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores a trimmed value. Blank values are ignored so absent fields stay
    /// absent rather than empty.
    pub fn insert(&mut self, name: impl Into<String>, value: impl AsRef<str>) {
        let value = value.as_ref().trim();
        if value.is_empty() {
            return;
        }
        self.values.insert(name.into(), value.to_string());
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.values.get(name).map(String::as_str)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.values.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.values
            .iter()
            .map(|(name, value)| (name.as_str(), value.as_str()))
    }

    pub fn map_values(&mut self, mut transform: impl FnMut(&str) -> String) {
        for value in self.values.values_mut() {
            *value = transform(value);
        }
        self.values.retain(|_, value| !value.is_empty());
    }

    pub fn into_inner(self) -> BTreeMap<String, String> {
        self.values
    }
}

impl<K: Into<String>, V: AsRef<str>> FromIterator<(K, V)> for ExtractedFields {
    fn from_iter<T: IntoIterator<Item = (K, V)>>(iter: T) -> Self {
        let mut fields = ExtractedFields::new();
        for (name, value) in iter {
            fields.insert(name, value);
        }
        fields
    }
}

/// Place and date of birth split out of a combined document line.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BirthDetails {
    pub place: Option<String>,
    pub date: Option<String>,
}

impl BirthDetails {
    pub fn is_empty(&self) -> bool {
        self.place.is_none() && self.date.is_none()
    }

    pub fn write_into(self, fields: &mut ExtractedFields, place_key: &str, date_key: &str) {
        if let Some(place) = self.place {
            fields.insert(place_key, place);
        }
        if let Some(date) = self.date {
            fields.insert(date_key, date);
        }
    }
}
