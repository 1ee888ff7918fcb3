use std::sync::Arc;

use ekyc_documents::{DocumentError, DocumentPipeline, DocumentRegistry};
use ekyc_types::{
    BoundingBox, ClassifierSettings, CustomLabel, DocumentType, EngineSettings, FaceDetail,
    IdentityField, ModelVersion, TextLine,
};
use ekyc_vision::{
    Capabilities, MemoryObjectStore, ScriptedFaceAnalyzer, ScriptedLabelClassifier,
    ScriptedTextDetector, imaging,
};
use image::{DynamicImage, GenericImageView, Rgb, RgbImage};

struct Harness {
    store: Arc<MemoryObjectStore>,
    text: Arc<ScriptedTextDetector>,
    faces: Arc<ScriptedFaceAnalyzer>,
    labels: Arc<ScriptedLabelClassifier>,
}

impl Harness {
    fn new(text: ScriptedTextDetector) -> Self {
        Self {
            store: Arc::new(MemoryObjectStore::new()),
            text: Arc::new(text),
            faces: Arc::new(ScriptedFaceAnalyzer::new()),
            labels: Arc::new(ScriptedLabelClassifier::new()),
        }
    }

    fn with_faces(mut self, faces: ScriptedFaceAnalyzer) -> Self {
        self.faces = Arc::new(faces);
        self
    }

    fn with_labels(mut self, labels: ScriptedLabelClassifier) -> Self {
        self.labels = Arc::new(labels);
        self
    }

    fn pipeline(&self, settings: EngineSettings) -> DocumentPipeline {
        self.pipeline_with(settings, DocumentRegistry::builtin().expect("builtin definitions"))
    }

    fn pipeline_with(&self, settings: EngineSettings, registry: DocumentRegistry) -> DocumentPipeline {
        let capabilities = Capabilities {
            store: self.store.clone(),
            text: self.text.clone(),
            faces: self.faces.clone(),
            labels: self.labels.clone(),
        };
        DocumentPipeline::new(capabilities, Arc::new(settings), Arc::new(registry))
    }
}

fn png(width: u32, height: u32) -> Vec<u8> {
    let image = RgbImage::from_pixel(width, height, Rgb([200, 190, 180]));
    imaging::encode_png(&DynamicImage::ImageRgb8(image)).expect("encode png")
}

fn line(text: &str, top: f32, left: f32, width: f32) -> TextLine {
    TextLine::new(text, BoundingBox::new(top, left, width, 0.04))
}

fn identity(field_type: &str, value: &str) -> IdentityField {
    IdentityField {
        field_type: field_type.into(),
        value: value.into(),
        confidence: 98.0,
    }
}

fn mykad_lines() -> Vec<TextLine> {
    vec![
        line("KAD PENGENALAN", 0.05, 0.05, 0.35),
        line("800101-14-5678", 0.15, 0.05, 0.3),
        line("ALI BIN ABU", 0.60, 0.05, 0.3),
        line("NO 12 JALAN MERANTI", 0.70, 0.05, 0.4),
        line("50000 KUALA LUMPUR", 0.75, 0.05, 0.3),
        line("W.P. KUALA LUMPUR", 0.80, 0.05, 0.3),
        line("ISLAM LELAKI", 0.90, 0.05, 0.3),
    ]
}

#[tokio::test(flavor = "multi_thread")]
async fn mykad_is_read_from_a_staged_preprocessed_image() {
    let harness = Harness::new(
        ScriptedTextDetector::new().with_forms("temp/preprocessed/*", mykad_lines()),
    );
    harness.store.insert("uploads/mykad.png", png(1600, 1000));

    let fields = harness
        .pipeline(EngineSettings::default())
        .field_data("uploads/mykad.png", Some(DocumentType::MyNric))
        .await
        .expect("mykad fields");

    assert_eq!(fields.get("NRIC"), Some("800101-14-5678"));
    assert_eq!(fields.get("Name"), Some("ALI BIN ABU"));
    assert_eq!(fields.get("AddressCity"), Some("Kuala Lumpur"));
    assert_eq!(fields.get("Gender"), Some("M"));
    assert_eq!(fields.get("Religion"), Some("ISLAM"));
    assert_eq!(harness.text.call_count("detect_key_value_forms"), 1);
    assert_eq!(harness.text.call_count("analyze_identity_document"), 0);
    assert_eq!(harness.store.keys(), ["uploads/mykad.png"]);
}

#[tokio::test(flavor = "multi_thread")]
async fn missing_anchor_falls_back_to_identity_analysis_once() {
    let harness = Harness::new(
        ScriptedTextDetector::new()
            .with_lines("kh.png", vec![line("SOK CHEA", 0.3, 0.3, 0.3)])
            .with_identity_fields("kh.png", vec![identity("DOCUMENT_NUMBER", "123456789")]),
    );

    let fields = harness
        .pipeline(EngineSettings::default())
        .field_data("kh.png", Some(DocumentType::KhIc))
        .await
        .expect("fallback fields");

    assert_eq!(fields.get("DOCUMENT_NUMBER"), Some("123456789"));
    assert_eq!(harness.text.call_count("detect_lines"), 1);
    assert_eq!(harness.text.call_count("analyze_identity_document"), 1);
}

#[tokio::test(flavor = "multi_thread")]
async fn successful_extraction_does_not_fall_back() {
    let harness = Harness::new(ScriptedTextDetector::new().with_lines(
        "kh.png",
        vec![line("123456789", 0.15, 0.3, 0.3), line("SOK CHEA", 0.3, 0.3, 0.3)],
    ));

    let fields = harness
        .pipeline(EngineSettings::default())
        .field_data("kh.png", Some(DocumentType::KhIc))
        .await
        .expect("cambodian fields");

    assert_eq!(fields.get("Id"), Some("123456789"));
    assert_eq!(harness.text.call_count("analyze_identity_document"), 0);
}

#[tokio::test(flavor = "multi_thread")]
async fn perspective_errors_reach_the_caller() {
    let harness = Harness::new(ScriptedTextDetector::new().with_lines(
        "ktp.png",
        vec![
            line("NIK", 0.12, 0.03, 0.1),
            line(": 3174096112900001", 0.12, 0.25, 0.4),
            line("Berlaku Hingga : SEUMUR HIDUP", 0.7, 0.3, 0.4),
        ],
    ));

    let err = harness
        .pipeline(EngineSettings::default())
        .field_data("ktp.png", Some(DocumentType::IdKtp))
        .await
        .expect_err("skewed card");

    assert!(matches!(err, DocumentError::Perspective));
    assert_eq!(harness.text.call_count("analyze_identity_document"), 0);
}

#[tokio::test(flavor = "multi_thread")]
async fn coordinates_are_used_before_identity_analysis() {
    let definitions = r#"{"documentTypes": [
        {"name": "ID_KTP", "displayName": "Indonesian KTP"},
        {"name": "MY_NRIC", "displayName": "Malaysian NRIC"},
        {"name": "AU_PASSPORT", "displayName": "Australian Passport"},
        {"name": "KH_IC", "displayName": "Cambodian IC"},
        {"name": "PRC_PASSPORT", "displayName": "Chinese Passport"},
        {"name": "SG_PASSPORT", "displayName": "Singapore Passport", "dataFields": [
            {"name": "Surname", "expectedBoundingBox": {"top": 0.3, "left": 0.4, "width": 0.3, "height": 0.05}},
            {"name": "PassportNo", "regexExpression": "^k\\d{7}[a-z]$",
             "expectedBoundingBox": {"top": 0.1, "left": 0.7, "width": 0.25, "height": 0.05}}
        ]},
        {"name": "THAI_ID_FRONT", "displayName": "Thai ID (front)"},
        {"name": "THAI_ID_BACK", "displayName": "Thai ID (back)"},
        {"name": "GENERIC", "displayName": "Generic document"}
    ]}"#;
    let registry = DocumentRegistry::from_json(definitions).expect("definitions");
    let harness = Harness::new(
        ScriptedTextDetector::new()
            .with_lines(
                "sg.png",
                vec![
                    line("K1234567A", 0.11, 0.71, 0.2),
                    line("TAN", 0.31, 0.41, 0.1),
                ],
            )
            .with_identity_fields("sg.png", vec![identity("LAST_NAME", "TAN")]),
    );
    let settings = EngineSettings {
        use_field_coordinates: true,
        ..EngineSettings::default()
    };

    let fields = harness
        .pipeline_with(settings, registry)
        .field_data("sg.png", Some(DocumentType::SgPassport))
        .await
        .expect("coordinate fields");

    assert_eq!(fields.get("PassportNo"), Some("K1234567A"));
    assert_eq!(fields.get("Surname"), Some("TAN"));
    assert_eq!(harness.text.call_count("analyze_identity_document"), 0);
}

#[tokio::test(flavor = "multi_thread")]
async fn empty_coordinate_results_use_identity_analysis() {
    let harness = Harness::new(
        ScriptedTextDetector::new()
            .with_identity_fields("au.png", vec![identity("LAST_NAME", "SMITH")]),
    );
    let settings = EngineSettings {
        use_field_coordinates: true,
        ..EngineSettings::default()
    };

    let fields = harness
        .pipeline(settings)
        .field_data("au.png", Some(DocumentType::AuPassport))
        .await
        .expect("generic fields");

    assert_eq!(fields.get("LAST_NAME"), Some("SMITH"));
    // The built-in passport definition has no placed fields.
    assert_eq!(harness.text.call_count("detect_lines"), 0);
}

#[tokio::test(flavor = "multi_thread")]
async fn unspecified_type_is_classified_first() {
    let labels = ScriptedLabelClassifier::new()
        .with_active_version(ModelVersion {
            arn: "arn:model/version/3".into(),
            status: ModelVersion::RUNNING.into(),
        })
        .with_labels(
            "thai-back.png",
            vec![
                CustomLabel {
                    name: "THAI_ID_BACK".into(),
                    confidence: 96.0,
                    bounding_box: Some(BoundingBox::new(0.1, 0.1, 0.8, 0.8)),
                },
                CustomLabel {
                    name: "MyKadLogo".into(),
                    confidence: 99.0,
                    bounding_box: None,
                },
            ],
        );
    let harness = Harness::new(
        ScriptedTextDetector::new()
            .with_lines("thai-back.png", vec![line("1234-56-78901234", 0.8, 0.1, 0.3)]),
    )
    .with_labels(labels);
    let settings = EngineSettings {
        classifier: Some(ClassifierSettings {
            project_arn: "arn:model/project".into(),
            version_arn: None,
        }),
        ..EngineSettings::default()
    };

    let pipeline = harness.pipeline(settings);
    assert_eq!(
        pipeline.document_type("thai-back.png").await.expect("classify"),
        Some(DocumentType::ThaiIdBack)
    );
    let fields = pipeline
        .field_data("thai-back.png", None)
        .await
        .expect("thai back fields");
    assert_eq!(fields.get("Field 1"), Some("1234-56-78901234"));
}

#[tokio::test(flavor = "multi_thread")]
async fn unclassifiable_image_is_unrecognised() {
    let harness = Harness::new(ScriptedTextDetector::new());
    let pipeline = harness.pipeline(EngineSettings::default());

    assert_eq!(pipeline.document_type("x.png").await.expect("classify"), None);
    let err = pipeline.field_data("x.png", None).await.expect_err("no type");
    assert!(matches!(err, DocumentError::UnrecognisedDocument));
    assert_eq!(harness.labels.call_count("detect_custom_labels"), 0);
}

#[tokio::test(flavor = "multi_thread")]
async fn small_documents_are_not_cropped() {
    let labels = ScriptedLabelClassifier::new().with_labels(
        "small.png",
        vec![CustomLabel {
            name: "KH_IC".into(),
            confidence: 90.0,
            bounding_box: Some(BoundingBox::new(0.1, 0.1, 0.3, 0.6)),
        }],
    );
    let harness = Harness::new(ScriptedTextDetector::new()).with_labels(labels);
    harness.store.insert("small.png", png(100, 100));
    let settings = EngineSettings {
        classifier: Some(ClassifierSettings {
            project_arn: "arn:model/project".into(),
            version_arn: Some("arn:model/version/1".into()),
        }),
        ..EngineSettings::default()
    };

    let err = harness
        .pipeline(settings)
        .detect_and_crop("small.png")
        .await
        .expect_err("too small");
    assert!(matches!(err, DocumentError::DocumentTooSmall { .. }));
}

#[tokio::test(flavor = "multi_thread")]
async fn largest_face_is_cropped_and_staged() {
    let faces = ScriptedFaceAnalyzer::new().with_faces(
        "doc.png",
        vec![
            FaceDetail::new(BoundingBox::new(0.2, 0.05, 0.25, 0.5), 99.0),
            FaceDetail::new(BoundingBox::new(0.6, 0.8, 0.1, 0.1), 99.0),
        ],
    );
    let harness = Harness::new(ScriptedTextDetector::new()).with_faces(faces);
    harness.store.insert("doc.png", png(400, 200));
    let pipeline = harness.pipeline(EngineSettings::default());

    let crop = pipeline
        .face("doc.png", Some(DocumentType::MyNric))
        .await
        .expect("face")
        .expect("crop");
    let decoded = imaging::decode(&crop).expect("jpeg");
    assert_eq!(decoded.dimensions(), (100, 100));

    let key = pipeline
        .stage_face("doc.png", Some(DocumentType::MyNric))
        .await
        .expect("stage")
        .expect("key");
    assert!(key.starts_with("temp/faces/") && key.ends_with(".jpg"));
    assert!(harness.store.contains(&key));

    let none = pipeline
        .face("doc.png", Some(DocumentType::ThaiIdBack))
        .await
        .expect("unsupported");
    assert!(none.is_none());
}
