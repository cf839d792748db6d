//! Contract Invariant Tests
//!
//! These tests verify the pipeline's non-negotiable guarantees against
//! mocked storage and model collaborators.

use async_trait::async_trait;
use image::{DynamicImage, ImageFormat, Rgb, RgbImage};
use mockall::mock;
use std::collections::HashMap;
use std::io::Cursor;
use std::sync::{Arc, Mutex};

use restyle_core::{
    upload_input, BlobStore, Candidate, ErrorKind, GenerationRequest, GenerationResponse,
    ImageBlob, ImageGenerator, ObjectStore, Part, RemoteError, Settings, StorageError,
    StoredObject, StyleCatalog, TransformEngine, TransformPipeline, TransformRequest,
    DEFAULT_MODEL_ID, OUTPUT_PREFIX,
};

const BASE_URL: &str = "https://bucket.example.com";
const SUBJECT_URL: &str = "https://bucket.example.com/input/20260101120000_subject.jpg";
const BACKGROUND_URL: &str = "https://bucket.example.com/input/20260101120000_background.jpg";

mock! {
    pub Store {}

    #[async_trait]
    impl ObjectStore for Store {
        async fn get_object(&self, key: &str) -> Result<StoredObject, StorageError>;
        async fn put_object(
            &self,
            key: &str,
            bytes: Vec<u8>,
            content_type: &str,
        ) -> Result<(), StorageError>;
    }
}

mock! {
    pub Generator {}

    #[async_trait]
    impl ImageGenerator for Generator {
        async fn generate(&self, request: GenerationRequest) -> Result<GenerationResponse, RemoteError>;
    }
}

/// In-memory object store that records every write.
#[derive(Default)]
struct MemoryStore {
    objects: Mutex<HashMap<String, StoredObject>>,
}

impl MemoryStore {
    fn with(objects: &[(&str, Vec<u8>, &str)]) -> Self {
        let store = Self::default();
        {
            let mut map = store.objects.lock().unwrap();
            for (key, bytes, content_type) in objects {
                map.insert(
                    key.to_string(),
                    StoredObject {
                        bytes: bytes.clone(),
                        content_type: Some(content_type.to_string()),
                    },
                );
            }
        }
        store
    }

    fn get(&self, key: &str) -> Option<StoredObject> {
        self.objects.lock().unwrap().get(key).cloned()
    }

    fn keys_under(&self, prefix: &str) -> Vec<String> {
        self.objects
            .lock()
            .unwrap()
            .keys()
            .filter(|k| k.starts_with(prefix))
            .cloned()
            .collect()
    }
}

#[async_trait]
impl ObjectStore for MemoryStore {
    async fn get_object(&self, key: &str) -> Result<StoredObject, StorageError> {
        self.get(key)
            .ok_or_else(|| StorageError::NotFound(key.to_string()))
    }

    async fn put_object(
        &self,
        key: &str,
        bytes: Vec<u8>,
        content_type: &str,
    ) -> Result<(), StorageError> {
        self.objects.lock().unwrap().insert(
            key.to_string(),
            StoredObject {
                bytes,
                content_type: Some(content_type.to_string()),
            },
        );
        Ok(())
    }
}

/// Generator stub that always answers with the same image.
struct FixedImage(ImageBlob);

#[async_trait]
impl ImageGenerator for FixedImage {
    async fn generate(&self, _request: GenerationRequest) -> Result<GenerationResponse, RemoteError> {
        Ok(GenerationResponse {
            candidates: vec![Candidate {
                parts: vec![Part::Image(self.0.clone())],
            }],
        })
    }
}

fn encoded_image(format: ImageFormat, width: u32, height: u32) -> Vec<u8> {
    let img = RgbImage::from_pixel(width, height, Rgb([220, 120, 180]));
    let mut out = Cursor::new(Vec::new());
    DynamicImage::ImageRgb8(img).write_to(&mut out, format).unwrap();
    out.into_inner()
}

fn request(style: &str) -> TransformRequest {
    TransformRequest {
        subject_url: SUBJECT_URL.to_string(),
        background_url: BACKGROUND_URL.to_string(),
        style: style.to_string(),
    }
}

fn create_pipeline(
    store: Arc<dyn ObjectStore>,
    generator: Arc<dyn ImageGenerator>,
) -> TransformPipeline {
    TransformPipeline::new(
        Arc::new(StyleCatalog::builtin()),
        BlobStore::new(store, BASE_URL),
        TransformEngine::new(generator),
    )
}

fn memory_store_with_inputs() -> Arc<MemoryStore> {
    Arc::new(MemoryStore::with(&[
        (
            "input/20260101120000_subject.jpg",
            encoded_image(ImageFormat::Jpeg, 16, 16),
            "image/jpeg",
        ),
        (
            "input/20260101120000_background.jpg",
            encoded_image(ImageFormat::Jpeg, 16, 16),
            "image/jpeg",
        ),
    ]))
}

fn stored_inputs_mock() -> MockStore {
    let mut store = MockStore::new();
    store.expect_get_object().times(2).returning(|_| {
        Ok(StoredObject {
            bytes: encoded_image(ImageFormat::Jpeg, 8, 8),
            content_type: Some("image/jpeg".to_string()),
        })
    });
    store
}

#[tokio::test]
async fn invariant_unknown_style_touches_nothing() {
    let mut store = MockStore::new();
    store.expect_get_object().times(0);
    store.expect_put_object().times(0);
    let mut generator = MockGenerator::new();
    generator.expect_generate().times(0);

    let pipeline = create_pipeline(Arc::new(store), Arc::new(generator));
    let err = pipeline.run(&request("NotAStyle")).await.unwrap_err();

    assert_eq!(err.kind(), ErrorKind::InvalidStyle);
    assert_eq!(err.status_code(), 400);
}

#[tokio::test]
async fn invariant_invalid_url_rejected_before_fetch() {
    let mut store = MockStore::new();
    store.expect_get_object().times(0);
    store.expect_put_object().times(0);
    let mut generator = MockGenerator::new();
    generator.expect_generate().times(0);

    let pipeline = create_pipeline(Arc::new(store), Arc::new(generator));
    let mut req = request("Kawaii");
    req.background_url = String::new();

    let err = pipeline.run(&req).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidUrl);
}

#[tokio::test]
async fn invariant_missing_blob_never_reaches_model() {
    let mut store = MockStore::new();
    store.expect_get_object().returning(|key| {
        if key.contains("background") {
            Err(StorageError::NotFound(key.to_string()))
        } else {
            Ok(StoredObject {
                bytes: encoded_image(ImageFormat::Jpeg, 8, 8),
                content_type: Some("image/jpeg".to_string()),
            })
        }
    });
    store.expect_put_object().times(0);
    let mut generator = MockGenerator::new();
    generator.expect_generate().times(0);

    let pipeline = create_pipeline(Arc::new(store), Arc::new(generator));
    let err = pipeline.run(&request("Kawaii")).await.unwrap_err();

    assert_eq!(err.kind(), ErrorKind::BlobNotFound);
    assert!(err.to_string().contains("input/20260101120000_background.jpg"));
}

#[tokio::test]
async fn invariant_no_image_produced_stores_nothing() {
    let mut store = stored_inputs_mock();
    store.expect_put_object().times(0);

    let mut generator = MockGenerator::new();
    generator.expect_generate().times(1).returning(|_| {
        Ok(GenerationResponse {
            candidates: vec![Candidate {
                parts: vec![Part::Text("I cannot draw that".to_string())],
            }],
        })
    });

    let pipeline = create_pipeline(Arc::new(store), Arc::new(generator));
    let err = pipeline.run(&request("Shonen")).await.unwrap_err();

    assert_eq!(err.kind(), ErrorKind::NoImageProduced);
}

#[tokio::test]
async fn invariant_remote_error_propagates_and_stores_nothing() {
    let mut store = stored_inputs_mock();
    store.expect_put_object().times(0);

    let mut generator = MockGenerator::new();
    generator.expect_generate().times(1).returning(|_| {
        Err(RemoteError::Status {
            status: 403,
            message: "API key not valid".to_string(),
        })
    });

    let pipeline = create_pipeline(Arc::new(store), Arc::new(generator));
    let err = pipeline.run(&request("Shonen")).await.unwrap_err();

    assert_eq!(err.kind(), ErrorKind::RemoteError);
    assert!(err.to_string().contains("API key not valid"));
}

#[tokio::test]
async fn invariant_undecodable_output_stores_nothing() {
    let mut store = stored_inputs_mock();
    store.expect_put_object().times(0);

    let mut generator = MockGenerator::new();
    generator.expect_generate().times(1).returning(|_| {
        Ok(GenerationResponse {
            candidates: vec![Candidate {
                parts: vec![Part::Image(ImageBlob::new(b"not pixels".to_vec(), "image/png"))],
            }],
        })
    });

    let pipeline = create_pipeline(Arc::new(store), Arc::new(generator));
    let err = pipeline.run(&request("Shojo")).await.unwrap_err();

    assert_eq!(err.kind(), ErrorKind::NoImageProduced);
}

#[tokio::test]
async fn invariant_model_request_shape() {
    let mut store = stored_inputs_mock();
    store.expect_put_object().times(1).returning(|_, _, _| Ok(()));

    let expected_negative = StyleCatalog::builtin()
        .lookup_by_key("ghibli_japanese_anime")
        .unwrap()
        .negative
        .clone();

    let mut generator = MockGenerator::new();
    generator
        .expect_generate()
        .times(1)
        .withf(move |req| {
            req.model == DEFAULT_MODEL_ID
                && (req.temperature - 0.7).abs() < 1e-6
                && req.parts.len() == 3
                && matches!(&req.parts[0], Part::Image(b) if b.mime_type == "image/jpeg")
                && matches!(&req.parts[1], Part::Image(_))
                && matches!(&req.parts[2], Part::Text(t) if t.contains(&expected_negative))
        })
        .returning(|_| {
            Ok(GenerationResponse {
                candidates: vec![Candidate {
                    parts: vec![Part::Image(ImageBlob::new(
                        encoded_image(ImageFormat::Png, 4, 4),
                        "image/png",
                    ))],
                }],
            })
        });

    // Lookup by internal key falls back after display-name miss.
    let pipeline = create_pipeline(Arc::new(store), Arc::new(generator));
    let result = pipeline.run(&request("ghibli_japanese_anime")).await.unwrap();
    assert_eq!(result.style, "ghibli_japanese_anime");
}

#[tokio::test]
async fn invariant_store_failure_is_storage_error() {
    let mut store = stored_inputs_mock();
    store.expect_put_object().times(1).returning(|key, _, _| {
        Err(StorageError::Backend {
            key: key.to_string(),
            status: 500,
            message: "InternalError".to_string(),
        })
    });

    let generator = FixedImage(ImageBlob::new(encoded_image(ImageFormat::Png, 4, 4), "image/png"));
    let pipeline = create_pipeline(Arc::new(store), Arc::new(generator));
    let err = pipeline.run(&request("Kawaii")).await.unwrap_err();

    assert_eq!(err.kind(), ErrorKind::StorageError);
    assert_eq!(err.status_code(), 502);
}

#[tokio::test]
async fn invariant_end_to_end_kawaii() {
    let store = memory_store_with_inputs();
    let generator = FixedImage(ImageBlob::new(encoded_image(ImageFormat::Png, 10, 10), "image/png"));
    let pipeline = create_pipeline(store.clone(), Arc::new(generator));

    let result = pipeline.run(&request("Kawaii")).await.unwrap();

    assert!(result.output_url.starts_with(&format!("{BASE_URL}/{OUTPUT_PREFIX}/")));
    assert!(result.output_url.ends_with(".png"));
    assert_eq!(result.style, "Kawaii");
    assert_eq!(result.input_url, SUBJECT_URL);
    assert_eq!(result.background_url, BACKGROUND_URL);

    let outputs = store.keys_under("output/");
    assert_eq!(outputs.len(), 1);
    let stored = store.get(&outputs[0]).unwrap();
    assert_eq!(stored.content_type.as_deref(), Some("image/png"));
    let decoded = image::load_from_memory(&stored.bytes).unwrap();
    assert_eq!((decoded.width(), decoded.height()), (10, 10));
}

#[tokio::test]
async fn invariant_output_always_png() {
    for format in [ImageFormat::Bmp, ImageFormat::Jpeg, ImageFormat::Png] {
        let store = memory_store_with_inputs();
        let generator = FixedImage(ImageBlob::new(
            encoded_image(format, 10, 10),
            format.to_mime_type(),
        ));
        let pipeline = create_pipeline(store.clone(), Arc::new(generator));

        pipeline.run(&request("Mushoku Tensei")).await.unwrap();

        let outputs = store.keys_under("output/");
        assert_eq!(outputs.len(), 1, "{format:?}");
        let stored = store.get(&outputs[0]).unwrap();
        assert_eq!(stored.content_type.as_deref(), Some("image/png"), "{format:?}");
        assert_eq!(image::guess_format(&stored.bytes).unwrap(), ImageFormat::Png);
    }
}

#[tokio::test]
async fn invariant_repeated_runs_never_collide() {
    let store = memory_store_with_inputs();
    let generator = FixedImage(ImageBlob::new(encoded_image(ImageFormat::Png, 2, 2), "image/png"));
    let pipeline = create_pipeline(store.clone(), Arc::new(generator));

    let first = pipeline.run(&request("Kawaii")).await.unwrap();
    let second = pipeline.run(&request("Kawaii")).await.unwrap();

    assert_ne!(first.output_url, second.output_url);
    assert_eq!(store.keys_under("output/").len(), 2);
}

#[tokio::test]
async fn invariant_store_twice_yields_distinct_urls() {
    let mut backend = MockStore::new();
    backend
        .expect_put_object()
        .times(2)
        .withf(|key, _, content_type| key.starts_with("input/") && content_type == "image/jpeg")
        .returning(|_, _, _| Ok(()));

    let store = BlobStore::new(Arc::new(backend), BASE_URL);
    let a = store.store("input", "jpg", vec![1, 2, 3], "image/jpeg").await.unwrap();
    let b = store.store("input", "jpg", vec![1, 2, 3], "image/jpeg").await.unwrap();

    assert_ne!(a, b);
    assert!(a.starts_with("https://bucket.example.com/input/"));
    assert_eq!(store.resolve_key(&a).unwrap(), a.trim_start_matches("https://bucket.example.com/"));
}

#[tokio::test]
async fn invariant_upload_lands_under_input() {
    let store = Arc::new(MemoryStore::default());
    let mut generator = MockGenerator::new();
    generator.expect_generate().times(0);
    let pipeline = create_pipeline(store.clone(), Arc::new(generator));

    let url = pipeline
        .upload_input("Holiday.PNG", encoded_image(ImageFormat::Png, 3, 3), None)
        .await
        .unwrap();

    assert!(url.starts_with("https://bucket.example.com/input/"));
    assert!(url.ends_with(".png"));
    let keys = store.keys_under("input/");
    assert_eq!(keys.len(), 1);
    assert_eq!(store.get(&keys[0]).unwrap().content_type.as_deref(), Some("image/png"));

    let err = pipeline.upload_input("", vec![1], None).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidUpload);
    let err = pipeline.upload_input("empty.jpg", vec![], None).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidUpload);
}

#[tokio::test]
async fn invariant_upload_needs_no_model_key() {
    let mut server = mockito::Server::new_async().await;
    let put = server
        .mock("PUT", mockito::Matcher::Regex(r"^/input/\d{14}_[0-9a-f-]{36}\.png$".into()))
        .match_header("content-type", "image/png")
        .with_status(200)
        .expect(1)
        .create_async()
        .await;

    let base_url = server.url();
    let settings = Settings::from_lookup(|name| match name {
        "STORAGE_BASE_URL" => Some(base_url.clone()),
        _ => None,
    })
    .unwrap();

    // Model-backed commands still refuse to start without a key.
    let err = TransformPipeline::from_settings(&settings, Arc::new(StyleCatalog::builtin()))
        .err()
        .unwrap();
    assert_eq!(err.kind(), ErrorKind::ConfigurationError);

    let store = BlobStore::from_settings(&settings).unwrap();
    let url = upload_input(&store, "cat.png", encoded_image(ImageFormat::Png, 2, 2), None)
        .await
        .unwrap();

    put.assert_async().await;
    assert!(url.starts_with(&format!("{base_url}/input/")));
}

#[test]
fn invariant_lookup_paths_agree() {
    let catalog = StyleCatalog::builtin();
    for style in catalog.list() {
        assert_eq!(
            catalog.lookup_by_key(&style.key),
            catalog.lookup_by_display_name(&style.display_name)
        );
        assert_eq!(catalog.resolve(&style.key), catalog.resolve(&style.display_name));
    }
}
