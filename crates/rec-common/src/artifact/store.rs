use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::{BufReader, BufWriter, ErrorKind, Write};
use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use super::{ArtifactError, ArtifactMetadata, ModelArtifact, ARTIFACT_FORMAT};
use crate::features::FeatureSchema;
use crate::models::{CollaborativeModel, ContentClassifier, RandomForest, StandardScaler};

const CLASSIFIER: &str = "classifier.json";
const COLLABORATIVE: &str = "collaborative.json";
const SCALER: &str = "scaler.json";
const ENCODERS: &str = "encoders.json";
const EMBEDDING_CACHE: &str = "embedding_cache.json";
const METADATA: &str = "metadata.json";
const ACTIVE: &str = "ACTIVE";

pub const DEFAULT_MODEL_DIR: &str = "models";

#[derive(Debug, Serialize, Deserialize)]
struct EmbeddingCacheFile {
    embedder: Option<String>,
    vectors: BTreeMap<String, Vec<f32>>,
}

/// Versioned model bundles on disk: `<root>/<model_version>/*.json` plus an
/// `ACTIVE` file naming the deployed version.
#[derive(Debug, Clone)]
pub struct ArtifactStore {
    root: PathBuf,
}

impl ArtifactStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// `REC_MODEL_DIR`, default `./models`.
    pub fn from_env() -> Self {
        Self::new(std::env::var("REC_MODEL_DIR").unwrap_or_else(|_| DEFAULT_MODEL_DIR.to_string()))
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn version_dir(&self, version: &str) -> Result<PathBuf, ArtifactError> {
        let valid = !version.is_empty()
            && version
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.'))
            && !version.starts_with('.');
        if !valid {
            return Err(ArtifactError::InvalidVersion(version.to_string()));
        }
        Ok(self.root.join(version))
    }

    /// Write every member into a staging directory, then rename it into place.
    /// An existing bundle with the same version is left untouched.
    pub fn save(&self, artifact: &ModelArtifact) -> Result<PathBuf, ArtifactError> {
        let version = artifact.version();
        let target = self.version_dir(version)?;
        if target.exists() {
            warn!(model_version = version, "model bundle already persisted; keeping existing files");
            return Ok(target);
        }
        let staging = self.root.join(format!(".{version}.tmp"));
        if staging.exists() {
            fs::remove_dir_all(&staging).map_err(|source| io_error(&staging, source))?;
        }
        fs::create_dir_all(&staging).map_err(|source| io_error(&staging, source))?;

        write_json(&staging.join(METADATA), &artifact.metadata)?;
        write_json(&staging.join(CLASSIFIER), &artifact.classifier.forest)?;
        write_json(&staging.join(SCALER), &artifact.classifier.scaler)?;
        write_json(&staging.join(ENCODERS), &artifact.schema)?;
        write_json(&staging.join(COLLABORATIVE), &artifact.collaborative)?;
        write_json(
            &staging.join(EMBEDDING_CACHE),
            &EmbeddingCacheFile {
                embedder: artifact.metadata.embedder.clone(),
                vectors: artifact.embedding_cache.clone(),
            },
        )?;

        fs::rename(&staging, &target).map_err(|source| io_error(&target, source))?;
        info!(model_version = version, path = %target.display(), "model bundle persisted");
        Ok(target)
    }

    /// Point `ACTIVE` at an already persisted version.
    pub fn activate(&self, version: &str) -> Result<(), ArtifactError> {
        let dir = self.version_dir(version)?;
        if !dir.join(METADATA).is_file() {
            return Err(ArtifactError::MissingMember {
                version: version.to_string(),
                member: METADATA,
            });
        }
        let pointer = self.root.join(ACTIVE);
        let staging = self.root.join(format!("{ACTIVE}.tmp"));
        {
            let mut file = File::create(&staging).map_err(|source| io_error(&staging, source))?;
            writeln!(file, "{version}").map_err(|source| io_error(&staging, source))?;
            file.sync_all().map_err(|source| io_error(&staging, source))?;
        }
        fs::rename(&staging, &pointer).map_err(|source| io_error(&pointer, source))?;
        info!(model_version = version, "active model pointer updated");
        Ok(())
    }

    pub fn active_version(&self) -> Result<Option<String>, ArtifactError> {
        let pointer = self.root.join(ACTIVE);
        match fs::read_to_string(&pointer) {
            Ok(raw) => {
                let version = raw.trim();
                Ok((!version.is_empty()).then(|| version.to_string()))
            }
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(None),
            Err(source) => Err(io_error(&pointer, source)),
        }
    }

    /// Persisted versions, oldest first (versions sort by training time).
    pub fn versions(&self) -> Result<Vec<String>, ArtifactError> {
        let entries = match fs::read_dir(&self.root) {
            Ok(entries) => entries,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(source) => return Err(io_error(&self.root, source)),
        };
        let mut versions = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|source| io_error(&self.root, source))?;
            let name = entry.file_name().to_string_lossy().into_owned();
            if !name.starts_with('.') && entry.path().join(METADATA).is_file() {
                versions.push(name);
            }
        }
        versions.sort();
        Ok(versions)
    }

    /// Load one bundle. Fails on the first missing member or on a format
    /// mismatch; never returns a partially populated artifact.
    pub fn load(&self, version: &str) -> Result<ModelArtifact, ArtifactError> {
        let dir = self.version_dir(version)?;
        let member = |name: &'static str| -> Result<PathBuf, ArtifactError> {
            let path = dir.join(name);
            if path.is_file() {
                Ok(path)
            } else {
                Err(ArtifactError::MissingMember {
                    version: version.to_string(),
                    member: name,
                })
            }
        };

        let metadata: ArtifactMetadata = read_json(&member(METADATA)?)?;
        if metadata.artifact_format != ARTIFACT_FORMAT {
            return Err(ArtifactError::IncompatibleFormat {
                found: metadata.artifact_format,
                expected: ARTIFACT_FORMAT,
            });
        }
        let forest: RandomForest = read_json(&member(CLASSIFIER)?)?;
        let scaler: StandardScaler = read_json(&member(SCALER)?)?;
        let schema: FeatureSchema = read_json(&member(ENCODERS)?)?;
        let collaborative: CollaborativeModel = read_json(&member(COLLABORATIVE)?)?;
        let cache: EmbeddingCacheFile = read_json(&member(EMBEDDING_CACHE)?)?;

        let embedding_cache = if cache.embedder == metadata.embedder {
            cache.vectors
        } else {
            warn!(
                model_version = version,
                cache_embedder = ?cache.embedder,
                model_embedder = ?metadata.embedder,
                "embedding cache built by a different embedder; ignoring it"
            );
            BTreeMap::new()
        };

        let artifact = ModelArtifact {
            metadata,
            schema,
            classifier: ContentClassifier { scaler, forest },
            collaborative,
            embedding_cache,
        };
        artifact.validate()?;
        Ok(artifact)
    }

    pub fn load_active(&self) -> Result<Option<ModelArtifact>, ArtifactError> {
        match self.active_version()? {
            Some(version) => self.load(&version).map(Some),
            None => Ok(None),
        }
    }
}

fn io_error(path: &Path, source: std::io::Error) -> ArtifactError {
    ArtifactError::Io {
        path: path.to_path_buf(),
        source,
    }
}

fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<(), ArtifactError> {
    let file = File::create(path).map_err(|source| io_error(path, source))?;
    let mut writer = BufWriter::new(file);
    serde_json::to_writer(&mut writer, value).map_err(|source| ArtifactError::Json {
        path: path.to_path_buf(),
        source,
    })?;
    writer.flush().map_err(|source| io_error(path, source))
}

fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T, ArtifactError> {
    let file = File::open(path).map_err(|source| io_error(path, source))?;
    serde_json::from_reader(BufReader::new(file)).map_err(|source| ArtifactError::Json {
        path: path.to_path_buf(),
        source,
    })
}
