#![allow(dead_code)]

use std::{path::PathBuf, sync::Arc};

use axum::{
    body::Body,
    http::{header, Request, StatusCode},
    Router,
};
use chrono::NaiveDate;
use serde_json::Value;
use sqlx::sqlite::SqlitePoolOptions;
use student_registry::{
    config::Config,
    credentials::hash_password,
    models::user::{NewUser, Role, User},
    rest,
    store::{SqliteUserStore, UserStore},
    uploads::{DocumentKind, DocumentRefs},
    AppState,
};
use tempfile::TempDir;
use tower::ServiceExt;

pub const SECRET: &str = "integration-test-secret";
const BOUNDARY: &str = "X-STUDENT-REGISTRY-BOUNDARY";

pub struct TestApp {
    pub router: Router,
    pub store: Arc<SqliteUserStore>,
    pub state: AppState,
    pub upload_dir: TempDir,
}

impl TestApp {
    pub fn upload_path(&self, filename: &str) -> PathBuf {
        self.upload_dir.path().join(filename)
    }

    pub fn stored_files(&self) -> usize {
        std::fs::read_dir(self.upload_dir.path())
            .map(|dir| dir.count())
            .unwrap_or(0)
    }

    pub async fn send(&self, request: Request<Body>) -> (StatusCode, Value) {
        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let json = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, json)
    }

    pub fn token_for(&self, user: &User) -> String {
        self.state
            .tokens
            .issue(user.id, &user.email, user.role)
            .unwrap()
    }

    /// Inserts a user straight through the store, bypassing registration
    /// rules (used for admins, which cannot self-register).
    pub async fn seed_user(&self, npm: &str, email: &str, password: &str, role: Role) -> User {
        self.store
            .create(NewUser {
                npm: npm.to_string(),
                email: email.to_string(),
                full_name: format!("Seeded {}", npm),
                kelas: "4IA01".to_string(),
                jurusan: "Informatika".to_string(),
                lokasi_kampus: "Depok".to_string(),
                tempat_lahir: "Jakarta".to_string(),
                tanggal_lahir: NaiveDate::from_ymd_opt(2000, 1, 1).unwrap(),
                jenis_kelamin: "P".to_string(),
                alamat: "Jl. Akses UI".to_string(),
                no_hp: "0811111111".to_string(),
                ipk: "3.50".to_string(),
                role,
                password_hash: hash_password(password).unwrap(),
                documents: DocumentRefs::default(),
            })
            .await
            .unwrap()
    }
}

pub async fn spawn_app() -> TestApp {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .idle_timeout(None)
        .max_lifetime(None)
        .connect("sqlite::memory:")
        .await
        .unwrap();
    let store = Arc::new(SqliteUserStore::new(pool));
    store.migrate().await.unwrap();

    let upload_dir = tempfile::tempdir().unwrap();
    let config = Config {
        database_url: "sqlite::memory:".to_string(),
        jwt_secret: SECRET.to_string(),
        token_ttl: chrono::Duration::hours(1),
        bind_addr: "127.0.0.1:0".to_string(),
        upload_dir: upload_dir.path().to_path_buf(),
        public_base_url: "http://localhost:3000/api/uploads/".to_string(),
        max_upload_bytes: 1024 * 1024,
        document_fields: DocumentKind::ALL.to_vec(),
    };

    let state = AppState::new(&config, store.clone());
    TestApp {
        router: rest::router(state.clone()),
        store,
        state,
        upload_dir,
    }
}

pub struct FilePart<'a> {
    pub field: &'a str,
    pub filename: &'a str,
    pub content_type: &'a str,
    pub bytes: &'a [u8],
}

pub fn pdf<'a>(field: &'a str, filename: &'a str) -> FilePart<'a> {
    FilePart {
        field,
        filename,
        content_type: "application/pdf",
        bytes: b"%PDF-1.4 test",
    }
}

pub fn multipart_body(fields: &[(&str, &str)], files: &[FilePart<'_>]) -> Vec<u8> {
    let mut body = Vec::new();
    for (name, value) in fields {
        body.extend_from_slice(format!("--{}\r\n", BOUNDARY).as_bytes());
        body.extend_from_slice(
            format!("Content-Disposition: form-data; name=\"{}\"\r\n\r\n", name).as_bytes(),
        );
        body.extend_from_slice(value.as_bytes());
        body.extend_from_slice(b"\r\n");
    }
    for file in files {
        body.extend_from_slice(format!("--{}\r\n", BOUNDARY).as_bytes());
        body.extend_from_slice(
            format!(
                "Content-Disposition: form-data; name=\"{}\"; filename=\"{}\"\r\n",
                file.field, file.filename
            )
            .as_bytes(),
        );
        body.extend_from_slice(format!("Content-Type: {}\r\n\r\n", file.content_type).as_bytes());
        body.extend_from_slice(file.bytes);
        body.extend_from_slice(b"\r\n");
    }
    body.extend_from_slice(format!("--{}--\r\n", BOUNDARY).as_bytes());
    body
}

pub fn multipart_request(
    method: &str,
    uri: &str,
    token: Option<&str>,
    fields: &[(&str, &str)],
    files: &[FilePart<'_>],
) -> Request<Body> {
    let mut builder = Request::builder()
        .method(method)
        .uri(uri)
        .header(
            header::CONTENT_TYPE,
            format!("multipart/form-data; boundary={}", BOUNDARY),
        );
    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
    }
    builder.body(Body::from(multipart_body(fields, files))).unwrap()
}

pub fn json_request(method: &str, uri: &str, token: Option<&str>, body: Value) -> Request<Body> {
    let mut builder = Request::builder()
        .method(method)
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json");
    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
    }
    builder.body(Body::from(body.to_string())).unwrap()
}

pub fn empty_request(method: &str, uri: &str, token: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
    }
    builder.body(Body::empty()).unwrap()
}

/// A complete, valid registration for the given keys.
pub fn registration(npm: &str, email: &str) -> Vec<(String, String)> {
    vec![
        ("fullName", "Siti Rahma"),
        ("kelas", "3KA12"),
        ("jurusan", "Sistem Informasi"),
        ("lokasiKampus", "Kalimalang"),
        ("tempatLahir", "Bekasi"),
        ("tanggalLahir", "2003-02-14"),
        ("jenisKelamin", "P"),
        ("alamat", "Jl. Kalimalang 5"),
        ("noHP", "081298765432"),
        ("ipk", "3.81"),
        ("role", "user"),
        ("password", "pw"),
        ("confirmPassword", "pw"),
    ]
    .into_iter()
    .map(|(k, v)| (k.to_string(), v.to_string()))
    .chain([
        ("npm".to_string(), npm.to_string()),
        ("email".to_string(), email.to_string()),
    ])
    .collect()
}

pub fn as_fields(pairs: &[(String, String)]) -> Vec<(&str, &str)> {
    pairs.iter().map(|(k, v)| (k.as_str(), v.as_str())).collect()
}

pub async fn register(app: &TestApp, npm: &str, email: &str, files: &[FilePart<'_>]) -> (StatusCode, Value) {
    let pairs = registration(npm, email);
    app.send(multipart_request(
        "POST",
        "/api/auth/register",
        None,
        &as_fields(&pairs),
        files,
    ))
    .await
}
