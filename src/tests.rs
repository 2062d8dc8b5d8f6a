use std::sync::Arc;

use anyhow::anyhow;
use async_trait::async_trait;
use chrono::{DateTime, Duration, TimeZone, Utc};
use clap::Parser;
use poem::http::StatusCode;
use poem::test::TestClient;
use poem::Route;
use poem_openapi::OpenApiService;
use serde_json::json;
use uuid::Uuid;

use crate::config::{Environment, RuntimeConfig};
use crate::controller::ImageController;
use crate::models::Image;
use crate::repository::backends::memory::MemoryBackend;
use crate::repository::{ImageFilter, ImageRepository};
use crate::routes::ImageApi;
use crate::storage::testing::ScriptedBlobStore;
use crate::storage::PathResolver;

fn image(path: &str, age: i64) -> Image {
    Image {
        id: Uuid::new_v4(),
        name: format!("image {}", path),
        path: path.to_string(),
        description: Some("test image".to_string()),
        created_at: Utc::now() - Duration::minutes(age),
        alt_text: "alt text".to_string(),
    }
}

/// A store whose connection handling is broken in a way nobody planned for.
struct PanickingRepository;

#[async_trait]
impl ImageRepository for PanickingRepository {
    async fn ensure_tables(&self) -> anyhow::Result<()> {
        Ok(())
    }

    async fn get(&self, _filter: ImageFilter) -> anyhow::Result<Option<Image>> {
        panic!("connection pool poisoned")
    }

    async fn get_all(&self, _filter: ImageFilter) -> anyhow::Result<Vec<Image>> {
        panic!("connection pool poisoned")
    }
}

struct UnreachableRepository;

#[async_trait]
impl ImageRepository for UnreachableRepository {
    async fn ensure_tables(&self) -> anyhow::Result<()> {
        Ok(())
    }

    async fn get(&self, _filter: ImageFilter) -> anyhow::Result<Option<Image>> {
        Err(anyhow!("connection refused"))
    }

    async fn get_all(&self, _filter: ImageFilter) -> anyhow::Result<Vec<Image>> {
        Err(anyhow!("connection refused"))
    }
}

fn setup_environment(
    images: Vec<Image>,
    store: ScriptedBlobStore,
    container: Option<&str>,
    environment: Environment,
) -> TestClient<Route> {
    setup_with_repository(
        Arc::new(MemoryBackend::new(images)),
        store,
        container,
        environment,
    )
}

fn setup_with_repository(
    repository: Arc<dyn ImageRepository>,
    store: ScriptedBlobStore,
    container: Option<&str>,
    environment: Environment,
) -> TestClient<Route> {
    let resolver = PathResolver::new(Arc::new(store), Duration::minutes(60), Duration::minutes(5));
    let controller = ImageController::new(repository, resolver, container.map(String::from), 4);

    let app = OpenApiService::new(
        ImageApi::new(Arc::new(controller), environment),
        "Cloakvision API",
        env!("CARGO_PKG_VERSION"),
    );

    let app = Route::new().nest("/v1", app);
    TestClient::new(app)
}

#[tokio::test]
async fn test_get_relative_image_is_signed() {
    let target = image("images/a.png", 1);
    let app = setup_environment(
        vec![target.clone()],
        ScriptedBlobStore::with_blobs(["images/a.png"]),
        Some("assets"),
        Environment::Production,
    );

    let res = app.get(format!("/v1/image/{}", target.id)).send().await;
    res.assert_status(StatusCode::OK);

    let body = res.json().await;
    let body = body.value().object();
    body.get("id").assert_string(&target.id.to_string());
    body.get("altText").assert_string("alt text");

    let path = body.get("path").string();
    assert!(path.starts_with("https://acct.blob.core.windows.net/assets/images/a.png?"));
    assert!(path.contains("sp=r"));
    assert!(path.contains("se="));
}

#[tokio::test]
async fn test_get_absolute_and_missing_blob_paths_are_unchanged() {
    let absolute = image("https://cdn.example.com/a.png", 2);
    let missing = image("images/missing.png", 1);
    let app = setup_environment(
        vec![absolute.clone(), missing.clone()],
        ScriptedBlobStore::default(),
        Some("assets"),
        Environment::Production,
    );

    for record in [absolute, missing] {
        let res = app.get(format!("/v1/image/{}", record.id)).send().await;
        res.assert_status(StatusCode::OK);
        res.json()
            .await
            .value()
            .object()
            .get("path")
            .assert_string(&record.path);
    }
}

#[tokio::test]
async fn test_get_invalid_ids() {
    let app = setup_environment(
        vec![image("images/a.png", 1)],
        ScriptedBlobStore::default(),
        Some("assets"),
        Environment::Production,
    );

    let res = app.get(format!("/v1/image/{}", Uuid::nil())).send().await;
    res.assert_status(StatusCode::BAD_REQUEST);
    res.json()
        .await
        .value()
        .object()
        .get("code")
        .assert_string("ImageService.ValidationError");

    let res = app.get("/v1/image/not-a-uuid").send().await;
    res.assert_status(StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_get_unknown_image() {
    let app = setup_environment(
        vec![image("images/a.png", 1)],
        ScriptedBlobStore::default(),
        Some("assets"),
        Environment::Production,
    );

    let res = app.get(format!("/v1/image/{}", Uuid::new_v4())).send().await;
    res.assert_status(StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_get_resolution_failure_is_an_internal_error() {
    let broken = image("broken.png", 1);
    let app = setup_environment(
        vec![broken.clone()],
        ScriptedBlobStore::with_blobs(["broken.png"]).failing_on("broken.png"),
        Some("assets"),
        Environment::Production,
    );

    let res = app.get(format!("/v1/image/{}", broken.id)).send().await;
    res.assert_status(StatusCode::INTERNAL_SERVER_ERROR);

    let body = res.json().await;
    let body = body.value().object();
    body.get("code").assert_string("image.SasUrlGenerationError");
    body.get("status").assert_i64(500);
}

#[tokio::test]
async fn test_get_missing_container_is_an_internal_error() {
    let relative = image("images/a.png", 1);
    let app = setup_environment(
        vec![relative.clone()],
        ScriptedBlobStore::with_blobs(["images/a.png"]),
        None,
        Environment::Development,
    );

    let res = app.get(format!("/v1/image/{}", relative.id)).send().await;
    res.assert_status(StatusCode::INTERNAL_SERVER_ERROR);

    let body = res.json().await;
    let body = body.value().object();
    body.get("code").assert_string("ImageService.ConfigurationError");
    assert!(body.get("detail").string().contains("Configuration"));
}

#[tokio::test]
async fn test_list_skips_unresolvable_images() {
    let images = vec![
        image("https://cdn.example.com/first.png", 4),
        image("broken.png", 3),
        image("images/third.png", 2),
        image("images/missing.png", 1),
    ];
    let app = setup_environment(
        images.clone(),
        ScriptedBlobStore::with_blobs(["images/third.png", "broken.png"]).failing_on("broken.png"),
        Some("assets"),
        Environment::Production,
    );

    let res = app.get("/v1/image/all").send().await;
    res.assert_status(StatusCode::OK);

    let body = res.json().await;
    let listed = body.value().array();
    listed.assert_len(3);
    listed.get(0).object().get("id").assert_string(&images[0].id.to_string());
    listed.get(1).object().get("id").assert_string(&images[2].id.to_string());
    listed.get(2).object().get("path").assert_string("images/missing.png");
}

#[tokio::test]
async fn test_list_with_nothing_resolvable_is_not_found() {
    let app = setup_environment(
        vec![image("images/a.png", 2), image("images/b.png", 1)],
        ScriptedBlobStore::with_blobs(["images/a.png", "images/b.png"]),
        None,
        Environment::Production,
    );

    let res = app.get("/v1/image/all").send().await;
    res.assert_status(StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_list_empty_store_is_not_found() {
    let app = setup_environment(
        vec![],
        ScriptedBlobStore::default(),
        Some("assets"),
        Environment::Production,
    );

    let res = app.get("/v1/image/all").send().await;
    res.assert_status(StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_unsupported_operations() {
    let app = setup_environment(
        vec![],
        ScriptedBlobStore::default(),
        Some("assets"),
        Environment::Production,
    );

    let res = app
        .post("/v1/image")
        .body_json(&json!({
            "name": "cat",
            "path": "images/cat.png",
            "altText": "a cat",
        }))
        .send()
        .await;
    res.assert_status(StatusCode::NOT_IMPLEMENTED);

    let res = app
        .post("/v1/image/batch")
        .body_json(&json!([Uuid::new_v4()]))
        .send()
        .await;
    res.assert_status(StatusCode::NOT_IMPLEMENTED);
}

#[tokio::test]
async fn test_panics_are_hidden_in_production() -> anyhow::Result<()> {
    let app = setup_with_repository(
        Arc::new(PanickingRepository),
        ScriptedBlobStore::default(),
        Some("assets"),
        Environment::Production,
    );

    for uri in ["/v1/image/all".to_string(), format!("/v1/image/{}", Uuid::new_v4())] {
        let res = app.get(uri).send().await;
        res.assert_status(StatusCode::INTERNAL_SERVER_ERROR);

        let body: serde_json::Value = res.0.into_body().into_json().await.map_err(anyhow::Error::msg)?;
        assert_eq!(
            body,
            json!({
                "status": 500,
                "code": "ImageService.Exception",
                "message": "An unexpected error occurred.",
                "detail": null,
            }),
        );
    }

    Ok(())
}

#[tokio::test]
async fn test_panics_are_reported_in_development() -> anyhow::Result<()> {
    let app = setup_with_repository(
        Arc::new(PanickingRepository),
        ScriptedBlobStore::default(),
        Some("assets"),
        Environment::Development,
    );

    let res = app.get(format!("/v1/image/{}", Uuid::new_v4())).send().await;
    res.assert_status(StatusCode::INTERNAL_SERVER_ERROR);

    let body: serde_json::Value = res.0.into_body().into_json().await.map_err(anyhow::Error::msg)?;
    assert_eq!(body["code"], "ImageService.Exception");

    let message = body["message"].as_str().unwrap_or_default();
    let detail = body["detail"].as_str().unwrap_or_default();
    assert!(message.contains("connection pool poisoned"), "{}", message);
    assert!(detail.contains("connection pool poisoned"), "{}", detail);

    Ok(())
}

#[tokio::test]
async fn test_store_failures_are_internal_errors() -> anyhow::Result<()> {
    let app = setup_with_repository(
        Arc::new(UnreachableRepository),
        ScriptedBlobStore::default(),
        Some("assets"),
        Environment::Production,
    );

    for uri in ["/v1/image/all".to_string(), format!("/v1/image/{}", Uuid::new_v4())] {
        let res = app.get(uri).send().await;
        res.assert_status(StatusCode::INTERNAL_SERVER_ERROR);

        let body: serde_json::Value = res.0.into_body().into_json().await.map_err(anyhow::Error::msg)?;
        assert_eq!(body["code"], "ImageRepository.Error");
        assert!(body["message"]
            .as_str()
            .unwrap_or_default()
            .contains("connection refused"));
        assert_eq!(body["detail"], serde_json::Value::Null);
    }

    Ok(())
}

const SERVER_CONFIG: &str = r#"
environment: production
database:
  type: memory
  config:
    records:
      - name: cat
        path: https://cdn.example.com/cat.png
        alt_text: a cat
        created_at: "2024-01-01T09:30:00Z"
blob_storage:
  account_name: acct
  container_name: assets
  credential:
    type: bearer_token
    config:
      token: abc
"#;

#[tokio::test]
async fn test_server_is_wired_from_config() -> anyhow::Result<()> {
    let cfg = RuntimeConfig::from_yaml(SERVER_CONFIG)?;
    let environment = cfg.environment;
    let controller = crate::build_controller(cfg).await?;

    let args = crate::ServerConfig::parse_from(["cloakvision", "--config-file", "config.yaml"]);
    let app = TestClient::new(crate::build_app(
        controller.clone(),
        environment,
        &args,
        "http://localhost:8000",
    ));

    let res = app.get("/v1/image/all").send().await;
    res.assert_status(StatusCode::OK);

    let body = res.json().await;
    let listed = body.value().array();
    listed.assert_len(1);
    let created_at: DateTime<Utc> = listed.get(0).object().get("createdAt").string().parse()?;
    assert_eq!(created_at, Utc.with_ymd_and_hms(2024, 1, 1, 9, 30, 0).unwrap());

    let res = app.get("/spec").send().await;
    res.assert_status(StatusCode::OK);

    let args = crate::ServerConfig::parse_from([
        "cloakvision",
        "--config-file",
        "config.yaml",
        "--disable-docs",
    ]);
    let app = TestClient::new(crate::build_app(
        controller,
        environment,
        &args,
        "http://localhost:8000",
    ));

    let res = app.get("/spec").send().await;
    res.assert_status(StatusCode::NOT_FOUND);

    Ok(())
}
