//! Document definitions, loaded once and shared read-only.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use std::sync::Arc;

use ekyc_types::{BoundingBox, DocumentType, EngineSettings, NamedField};
use regex::{Regex, RegexBuilder};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{DocumentError, DocumentResult};
use crate::extract::FieldExtractor;
use crate::reference::MalaysianReference;

const BUILTIN_DEFINITIONS: &str = include_str!("../assets/document_definitions.json");

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DefinitionsFile {
    document_types: Vec<DefinitionConfig>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DefinitionConfig {
    name: String,
    display_name: String,
    #[serde(default)]
    landmarks: Vec<NamedField>,
    #[serde(default)]
    data_fields: Vec<NamedField>,
    #[serde(default)]
    liveness_supported: bool,
    #[serde(default)]
    face_extraction_supported: bool,
    #[serde(default)]
    signature_extraction_supported: bool,
    #[serde(default)]
    classifier_model_reference: Option<String>,
}

/// Field read from a fixed position on the document.
#[derive(Debug, Clone)]
pub struct DataField {
    pub name: String,
    pub expected_bounding_box: Option<BoundingBox>,
    /// Case-insensitive value pattern, compiled at load time.
    pub pattern: Option<Regex>,
    pub language: Option<String>,
}

impl DataField {
    fn compile(field: NamedField, document: &str) -> DocumentResult<Self> {
        let pattern = field
            .regex_expression
            .as_deref()
            .map(str::trim)
            .filter(|expr| !expr.is_empty())
            .map(|expr| {
                RegexBuilder::new(expr)
                    .case_insensitive(true)
                    .build()
                    .map_err(|err| {
                        DocumentError::configuration(format!(
                            "{document}: field '{}' has an invalid pattern: {err}",
                            field.name
                        ))
                    })
            })
            .transpose()?;
        Ok(Self {
            name: field.name,
            expected_bounding_box: field.expected_bounding_box,
            pattern,
            language: field.language,
        })
    }

    /// Thai-script fields need a dedicated OCR model and are skipped by
    /// coordinate extraction.
    pub fn is_thai_script(&self) -> bool {
        self.language
            .as_deref()
            .is_some_and(|language| language.eq_ignore_ascii_case("th"))
    }
}

#[derive(Debug)]
pub struct DocumentDefinition {
    pub document_type: DocumentType,
    pub display_name: String,
    pub landmarks: Vec<NamedField>,
    pub data_fields: Vec<DataField>,
    pub liveness_supported: bool,
    pub face_extraction_supported: bool,
    pub signature_extraction_supported: bool,
    /// Model version used to detect this document's landmarks.
    pub classifier_model_reference: Option<String>,
    pub extractor: FieldExtractor,
}

impl DocumentDefinition {
    pub fn has_coordinate_fields(&self) -> bool {
        self.data_fields
            .iter()
            .any(|field| field.expected_bounding_box.is_some() && !field.is_thai_script())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentSummary {
    pub code: &'static str,
    pub name: String,
    pub liveness_supported: bool,
    pub face_extraction_supported: bool,
}

#[derive(Debug)]
pub struct DocumentRegistry {
    definitions: BTreeMap<DocumentType, Arc<DocumentDefinition>>,
    reference: MalaysianReference,
}

impl DocumentRegistry {
    pub fn builtin() -> DocumentResult<Self> {
        Self::from_json(BUILTIN_DEFINITIONS)
    }

    /// Loads the definitions file named in `settings`, or the built-in set.
    pub fn load(settings: &EngineSettings) -> DocumentResult<Self> {
        match settings.definitions_path.as_deref() {
            Some(path) => Self::from_path(path),
            None => Self::builtin(),
        }
    }

    pub fn from_path(path: &Path) -> DocumentResult<Self> {
        let contents = fs::read_to_string(path).map_err(|err| {
            DocumentError::configuration(format!(
                "failed to read document definitions {}: {err}",
                path.display()
            ))
        })?;
        Self::from_json(&contents)
    }

    pub fn from_json(json: &str) -> DocumentResult<Self> {
        let file: DefinitionsFile = serde_json::from_str(json).map_err(|err| {
            DocumentError::configuration(format!("invalid document definitions: {err}"))
        })?;

        let mut definitions = BTreeMap::new();
        for config in file.document_types {
            let document_type = config.name.parse::<DocumentType>().map_err(|_| {
                DocumentError::configuration(format!(
                    "document definition '{}' has no registered extractor",
                    config.name
                ))
            })?;
            if definitions.contains_key(&document_type) {
                return Err(DocumentError::configuration(format!(
                    "document type {document_type} is defined more than once"
                )));
            }
            let data_fields = config
                .data_fields
                .into_iter()
                .map(|field| DataField::compile(field, document_type.as_str()))
                .collect::<DocumentResult<Vec<_>>>()?;
            let definition = DocumentDefinition {
                document_type,
                display_name: config.display_name,
                landmarks: config.landmarks,
                data_fields,
                liveness_supported: config.liveness_supported,
                face_extraction_supported: config.face_extraction_supported,
                signature_extraction_supported: config.signature_extraction_supported,
                classifier_model_reference: config
                    .classifier_model_reference
                    .filter(|reference| !reference.trim().is_empty()),
                extractor: FieldExtractor::for_document_type(document_type),
            };
            debug!(
                document_type = %document_type,
                extractor = definition.extractor.name(),
                data_fields = definition.data_fields.len(),
                "loaded document definition"
            );
            definitions.insert(document_type, Arc::new(definition));
        }

        let missing: Vec<&str> = DocumentType::ALL
            .iter()
            .filter(|doc_type| !definitions.contains_key(*doc_type))
            .map(DocumentType::as_str)
            .collect();
        if !missing.is_empty() {
            return Err(DocumentError::configuration(format!(
                "no document definition for {}",
                missing.join(", ")
            )));
        }

        Ok(Self {
            definitions,
            reference: MalaysianReference::builtin()?,
        })
    }

    pub fn with_reference(mut self, reference: MalaysianReference) -> Self {
        self.reference = reference;
        self
    }

    pub fn resolve(&self, document_type: DocumentType) -> DocumentResult<Arc<DocumentDefinition>> {
        self.definitions
            .get(&document_type)
            .cloned()
            .ok_or_else(|| DocumentError::unsupported(document_type.as_str()))
    }

    pub fn resolve_code(&self, code: &str) -> DocumentResult<Arc<DocumentDefinition>> {
        let document_type = code
            .parse::<DocumentType>()
            .map_err(|_| DocumentError::unsupported(code.trim()))?;
        self.resolve(document_type)
    }

    pub fn definitions(&self) -> impl Iterator<Item = &Arc<DocumentDefinition>> {
        self.definitions.values()
    }

    /// Supported document types sorted by display name.
    pub fn summaries(&self) -> Vec<DocumentSummary> {
        let mut summaries: Vec<DocumentSummary> = self
            .definitions
            .values()
            .map(|definition| DocumentSummary {
                code: definition.document_type.as_str(),
                name: definition.display_name.clone(),
                liveness_supported: definition.liveness_supported,
                face_extraction_supported: definition.face_extraction_supported,
            })
            .collect();
        summaries.sort_by(|a, b| a.name.cmp(&b.name));
        summaries
    }

    pub fn reference(&self) -> &MalaysianReference {
        &self.reference
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn definitions_json(extra: &str, skip: Option<&str>) -> String {
        let mut entries: Vec<String> = DocumentType::ALL
            .iter()
            .filter(|doc_type| Some(doc_type.as_str()) != skip)
            .map(|doc_type| {
                format!(
                    r#"{{"name": "{}", "displayName": "{}"}}"#,
                    doc_type.as_str(),
                    doc_type.as_str()
                )
            })
            .collect();
        if !extra.is_empty() {
            entries.push(extra.to_string());
        }
        format!(r#"{{"documentTypes": [{}]}}"#, entries.join(","))
    }

    #[test]
    fn builtin_definitions_cover_every_document_type() {
        let registry = DocumentRegistry::builtin().unwrap();
        for doc_type in DocumentType::ALL {
            let definition = registry.resolve(doc_type).unwrap();
            assert_eq!(definition.document_type, doc_type);
            assert_eq!(
                definition.extractor,
                FieldExtractor::for_document_type(doc_type)
            );
        }
        let mykad = registry.resolve(DocumentType::MyNric).unwrap();
        assert_eq!(mykad.display_name, "Malaysian NRIC");
        assert_eq!(mykad.landmarks[0].name, "MyKadLogo");
    }

    #[test]
    fn unknown_definition_name_is_a_configuration_error() {
        let json = definitions_json(r#"{"name": "US_DL", "displayName": "US licence"}"#, None);
        let err = DocumentRegistry::from_json(&json).unwrap_err();
        assert!(matches!(err, DocumentError::Configuration { ref message } if message.contains("US_DL")));
    }

    #[test]
    fn missing_definition_is_a_configuration_error() {
        let json = definitions_json("", Some("KH_IC"));
        let err = DocumentRegistry::from_json(&json).unwrap_err();
        assert!(matches!(err, DocumentError::Configuration { ref message } if message.contains("KH_IC")));
    }

    #[test]
    fn duplicate_definition_is_rejected() {
        let json = definitions_json(r#"{"name": "generic", "displayName": "Again"}"#, None);
        assert!(DocumentRegistry::from_json(&json).is_err());
    }

    #[test]
    fn invalid_field_pattern_fails_at_load() {
        let extra = r#"{"name": "KH_IC", "displayName": "Cambodian IC",
            "dataFields": [{"name": "Id", "regexExpression": "(\\d{9"}]}"#;
        let json = definitions_json(extra, Some("KH_IC"));
        let err = DocumentRegistry::from_json(&json).unwrap_err();
        assert!(matches!(err, DocumentError::Configuration { ref message } if message.contains("Id")));
    }

    #[test]
    fn field_patterns_are_case_insensitive() {
        let extra = r#"{"name": "SG_PASSPORT", "displayName": "Singapore Passport",
            "dataFields": [{"name": "Nationality", "regexExpression": "^singapore",
                            "expectedBoundingBox": {"top": 0.5, "left": 0.4, "width": 0.3, "height": 0.05}}]}"#;
        let json = definitions_json(extra, Some("SG_PASSPORT"));
        let registry = DocumentRegistry::from_json(&json).unwrap();
        let definition = registry.resolve(DocumentType::SgPassport).unwrap();
        let pattern = definition.data_fields[0].pattern.as_ref().unwrap();
        assert!(pattern.is_match("SINGAPORE CITIZEN"));
        assert!(definition.has_coordinate_fields());
    }

    #[test]
    fn unknown_codes_resolve_to_unsupported() {
        let registry = DocumentRegistry::builtin().unwrap();
        let err = registry.resolve_code("XX_CARD").unwrap_err();
        assert!(matches!(err, DocumentError::UnsupportedDocumentType { code } if code == "XX_CARD"));
        assert!(registry.resolve_code("my_nric").is_ok());
    }

    #[test]
    fn summaries_are_sorted_by_name() {
        let registry = DocumentRegistry::builtin().unwrap();
        let summaries = registry.summaries();
        assert_eq!(summaries.len(), DocumentType::ALL.len());
        assert_eq!(summaries[0].name, "Australian Passport");
        assert!(summaries.windows(2).all(|pair| pair[0].name <= pair[1].name));
        let back = summaries.iter().find(|s| s.code == "THAI_ID_BACK").unwrap();
        assert!(!back.liveness_supported);
    }
}
