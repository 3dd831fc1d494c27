//! Document uploads: multipart intake, the on-disk store, and resolution of
//! the per-field filename references kept on a user record.

use std::{
    collections::{BTreeMap, HashMap},
    path::{Path, PathBuf},
    sync::Arc,
};

use axum::extract::Multipart;
use rand_core::{OsRng, RngCore};
use serde::Serialize;
use tokio::io::AsyncWriteExt;

use crate::error::AppError;

/// Plain text parts of a multipart submission, keyed by field name.
pub type FormFields = HashMap<String, String>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum DocumentKind {
    Cv,
    Krs,
    PasFoto,
    Ktm,
    Ktp,
    RangkumanNilai,
    Certificate,
}

impl DocumentKind {
    pub const ALL: [DocumentKind; 7] = [
        DocumentKind::Cv,
        DocumentKind::Krs,
        DocumentKind::PasFoto,
        DocumentKind::Ktm,
        DocumentKind::Ktp,
        DocumentKind::RangkumanNilai,
        DocumentKind::Certificate,
    ];

    pub fn field_name(&self) -> &'static str {
        match self {
            DocumentKind::Cv => "cv",
            DocumentKind::Krs => "krs",
            DocumentKind::PasFoto => "pasFoto",
            DocumentKind::Ktm => "ktm",
            DocumentKind::Ktp => "ktp",
            DocumentKind::RangkumanNilai => "rangkumanNilai",
            DocumentKind::Certificate => "certificate",
        }
    }

    pub fn from_field_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|k| k.field_name() == name)
    }
}

/// Stored filename per document field.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct DocumentRefs {
    pub cv: Option<String>,
    pub krs: Option<String>,
    pub pas_foto: Option<String>,
    pub ktm: Option<String>,
    pub ktp: Option<String>,
    pub rangkuman_nilai: Option<String>,
    pub certificate: Option<String>,
}

impl DocumentRefs {
    fn slot(&self, kind: DocumentKind) -> &Option<String> {
        match kind {
            DocumentKind::Cv => &self.cv,
            DocumentKind::Krs => &self.krs,
            DocumentKind::PasFoto => &self.pas_foto,
            DocumentKind::Ktm => &self.ktm,
            DocumentKind::Ktp => &self.ktp,
            DocumentKind::RangkumanNilai => &self.rangkuman_nilai,
            DocumentKind::Certificate => &self.certificate,
        }
    }

    fn slot_mut(&mut self, kind: DocumentKind) -> &mut Option<String> {
        match kind {
            DocumentKind::Cv => &mut self.cv,
            DocumentKind::Krs => &mut self.krs,
            DocumentKind::PasFoto => &mut self.pas_foto,
            DocumentKind::Ktm => &mut self.ktm,
            DocumentKind::Ktp => &mut self.ktp,
            DocumentKind::RangkumanNilai => &mut self.rangkuman_nilai,
            DocumentKind::Certificate => &mut self.certificate,
        }
    }

    pub fn get(&self, kind: DocumentKind) -> Option<&str> {
        self.slot(kind).as_deref()
    }

    /// A freshly uploaded file wins; otherwise the previous reference is
    /// kept (update) or left empty (create). Nothing is ever cleared just
    /// because a field was omitted.
    pub fn resolve(uploaded: &UploadedFiles, previous: Option<&DocumentRefs>) -> Self {
        let mut refs = previous.cloned().unwrap_or_default();
        for kind in DocumentKind::ALL {
            if let Some(filename) = uploaded.filename(kind) {
                *refs.slot_mut(kind) = Some(filename.to_string());
            }
        }
        refs
    }

    /// Turns stored filenames into absolute URLs under `base`.
    pub fn to_urls(&self, base: &str) -> Self {
        let mut refs = DocumentRefs::default();
        for kind in DocumentKind::ALL {
            *refs.slot_mut(kind) = self.get(kind).map(|name| format!("{}{}", base, name));
        }
        refs
    }
}

#[derive(Debug, Clone)]
pub struct StoredFile {
    pub filename: String,
    pub path: PathBuf,
}

/// Files written to disk while reading one request.
#[derive(Debug, Default)]
pub struct UploadedFiles {
    files: BTreeMap<DocumentKind, StoredFile>,
}

impl UploadedFiles {
    pub fn filename(&self, kind: DocumentKind) -> Option<&str> {
        self.files.get(&kind).map(|f| f.filename.as_str())
    }

    /// Removes the files this request wrote. Used when the request fails
    /// after its uploads were already stored.
    pub async fn discard(self) {
        for (_, file) in self.files {
            if let Err(e) = tokio::fs::remove_file(&file.path).await {
                tracing::warn!(path = %file.path.display(), "failed to remove upload: {}", e);
            }
        }
    }
}

#[derive(Debug, Default)]
pub struct Submission {
    pub fields: FormFields,
    pub files: UploadedFiles,
}

#[derive(Debug, Clone)]
pub struct UploadStore {
    dir: PathBuf,
    max_bytes: usize,
    accepted: Arc<[DocumentKind]>,
}

impl UploadStore {
    pub fn new(dir: impl Into<PathBuf>, max_bytes: usize, accepted: &[DocumentKind]) -> Self {
        Self {
            dir: dir.into(),
            max_bytes,
            accepted: accepted.into(),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn max_bytes(&self) -> usize {
        self.max_bytes
    }

    pub async fn ensure_dir(&self) -> std::io::Result<()> {
        tokio::fs::create_dir_all(&self.dir).await
    }

    /// Reads the whole multipart body, persisting document parts as they
    /// arrive. On failure every file written so far is removed again.
    pub async fn receive(&self, mut multipart: Multipart) -> Result<Submission, AppError> {
        let mut submission = Submission::default();
        if let Err(err) = self.read_parts(&mut multipart, &mut submission).await {
            submission.files.discard().await;
            return Err(err);
        }
        Ok(submission)
    }

    async fn read_parts(
        &self,
        multipart: &mut Multipart,
        submission: &mut Submission,
    ) -> Result<(), AppError> {
        while let Some(field) = multipart.next_field().await? {
            let name = field.name().unwrap_or_default().to_string();

            let Some(original_name) = field.file_name().map(str::to_string) else {
                let value = field.text().await?;
                submission.fields.insert(name, value);
                continue;
            };
            // Browsers send an empty part for file inputs left blank.
            if original_name.is_empty() {
                continue;
            }

            let kind = DocumentKind::from_field_name(&name)
                .filter(|k| self.accepted.contains(k))
                .ok_or_else(|| AppError::BadRequest(format!("Unexpected field: {}", name)))?;
            if submission.files.files.contains_key(&kind) {
                return Err(AppError::BadRequest(format!(
                    "Only one file allowed for field: {}",
                    name
                )));
            }

            let content_type = field.content_type().unwrap_or_default().to_string();
            if !is_accepted_mime(&content_type) {
                return Err(AppError::BadRequest("Only Image & PDF Files!".to_string()));
            }

            let bytes = field.bytes().await?;
            if bytes.len() > self.max_bytes {
                return Err(AppError::BadRequest(format!("File too large: {}", name)));
            }

            let stored = self.save(&original_name, &bytes).await?;
            tracing::debug!(field = %name, filename = %stored.filename, "stored upload");
            submission.files.files.insert(kind, stored);
        }
        Ok(())
    }

    async fn save(&self, original_name: &str, bytes: &[u8]) -> Result<StoredFile, AppError> {
        let filename = stored_filename(
            original_name,
            chrono::Utc::now().timestamp_millis(),
            OsRng.next_u32(),
        );
        let path = self.dir.join(&filename);
        let mut file = tokio::fs::File::create(&path).await?;
        file.write_all(bytes).await?;
        file.flush().await?;
        Ok(StoredFile { filename, path })
    }
}

fn is_accepted_mime(content_type: &str) -> bool {
    content_type.starts_with("image/") || content_type == "application/pdf"
}

/// `<millis>-<nonce><.ext>`; the extension is kept only if it is plain
/// alphanumeric so a crafted name can't escape the upload directory.
fn stored_filename(original_name: &str, millis: i64, nonce: u32) -> String {
    let ext = Path::new(original_name)
        .extension()
        .and_then(|e| e.to_str())
        .filter(|e| !e.is_empty() && e.chars().all(|c| c.is_ascii_alphanumeric()))
        .map(|e| format!(".{}", e.to_ascii_lowercase()))
        .unwrap_or_default();
    format!("{}-{:08x}{}", millis, nonce, ext)
}
