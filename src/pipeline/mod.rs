// src/pipeline/mod.rs

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::{fmt, fs, path::Path, time::Instant};
use tracing::{error, info, instrument};

use crate::{
    archive,
    config::RefinerConfig,
    crypto::FileEncryptor,
    error::{PipelineError, RefineError},
    publish::{gateway_url, Publisher},
    schema::{self, SchemaDescriptor},
    sink::RecordSink,
    transform,
};

/// Progress of a run. Stages only move forward; any failure lands in `Failed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Start,
    Located,
    Extracted,
    FilesResolved,
    OwnerResolved,
    Transformed,
    Persisted,
    SchemaWritten,
    SchemaPublished,
    Encrypted,
    ArtifactPublished,
    Done,
    Failed,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Output summary of a run, filled in as stages succeed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipelineResult {
    pub schema: Option<SchemaDescriptor>,
    pub schema_cid: Option<String>,
    pub refinement_url: Option<String>,
}

/// Sequences locate → extract → transform → persist → describe → encrypt → publish.
pub struct Refiner<'a, S, E, P> {
    config: &'a RefinerConfig,
    sink: S,
    encryptor: E,
    publisher: P,
    stage: Stage,
}

impl<'a, S, E, P> Refiner<'a, S, E, P>
where
    S: RecordSink,
    E: FileEncryptor,
    P: Publisher,
{
    pub fn new(config: &'a RefinerConfig, sink: S, encryptor: E, publisher: P) -> Self {
        Self {
            config,
            sink,
            encryptor,
            publisher,
            stage: Stage::Start,
        }
    }

    pub fn stage(&self) -> Stage {
        self.stage
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    pub fn publisher(&self) -> &P {
        &self.publisher
    }

    /// Record the outcome of the transition into `next`.
    fn advance<T>(
        &mut self,
        next: Stage,
        outcome: Result<T, RefineError>,
    ) -> Result<T, PipelineError> {
        match outcome {
            Ok(value) => {
                self.stage = next;
                info!(stage = %next, "stage reached");
                Ok(value)
            }
            Err(err) => {
                error!(stage = %next, error = %err, "stage failed");
                self.stage = Stage::Failed;
                Err(PipelineError::new(next, err))
            }
        }
    }

    /// Run every stage from `Start`. Nothing is resumed from an earlier
    /// attempt; leftovers of a failed run stay in the working directory.
    #[instrument(level = "info", skip(self), fields(input = %self.config.input_dir.display()))]
    pub fn run(&mut self) -> Result<PipelineResult, PipelineError> {
        let started = Instant::now();
        let cfg = self.config;
        self.stage = Stage::Start;
        let mut result = PipelineResult::default();

        let archive_path = archive::locate(&cfg.input_dir, &cfg.archive_extension);
        let archive_path = self.advance(Stage::Located, archive_path)?;

        let extracted = archive::extract(&archive_path, cfg.work_dir());
        self.advance(Stage::Extracted, extracted)?;

        let files = archive::find_required_files(
            cfg.work_dir(),
            &[cfg.tabular_file.as_str(), cfg.identity_file.as_str()],
        );
        let files = self.advance(Stage::FilesResolved, files)?;
        let (tabular_path, identity_path) = (&files[0], &files[1]);

        let owner = resolve_owner(identity_path, &cfg.owner_field);
        let owner = self.advance(Stage::OwnerResolved, owner)?;
        info!(owner = %owner, "resolved owner");

        let records = transform::transform_file(tabular_path, &owner);
        let records = self.advance(Stage::Transformed, records)?;

        let persisted = self
            .sink
            .insert_all(records)
            .map_err(|e| RefineError::SinkWrite(format!("{:#}", e)));
        let rows = self.advance(Stage::Persisted, persisted)?;
        info!(rows, path = %self.sink.storage_path().display(), "records persisted");

        let descriptor = schema::describe(&self.sink.columns(), &cfg.schema);
        let written = schema::write_descriptor(cfg.schema_path(), &descriptor)
            .map_err(|e| RefineError::SchemaWrite(format!("{:#}", e)));
        self.advance(Stage::SchemaWritten, written)?;
        result.schema = Some(descriptor.clone());

        let schema_cid = serde_json::to_value(&descriptor)
            .map_err(anyhow::Error::from)
            .and_then(|value: Value| self.publisher.publish_json(&cfg.schema.name, &value))
            .map_err(|e| RefineError::Publish(format!("schema: {:#}", e)));
        let schema_cid = self.advance(Stage::SchemaPublished, schema_cid)?;
        info!(cid = %schema_cid, "schema published");
        result.schema_cid = Some(schema_cid);

        let encrypted = self
            .encryptor
            .encrypt(&cfg.encryption_key, self.sink.storage_path())
            .map_err(|e| RefineError::Encryption(format!("{:#}", e)));
        let encrypted_path = self.advance(Stage::Encrypted, encrypted)?;

        let artifact_cid = self
            .publisher
            .publish_file(&encrypted_path)
            .map_err(|e| RefineError::Publish(format!("artifact: {:#}", e)));
        let artifact_cid = self.advance(Stage::ArtifactPublished, artifact_cid)?;
        result.refinement_url = Some(gateway_url(&cfg.gateway_url, &artifact_cid));

        self.advance(Stage::Done, Ok(()))?;
        info!(
            url = result.refinement_url.as_deref().unwrap_or_default(),
            elapsed = ?started.elapsed(),
            "refinement complete"
        );
        Ok(result)
    }
}

/// Read the owner identifier out of the identity JSON document.
fn resolve_owner(path: &Path, field: &str) -> Result<String, RefineError> {
    let invalid = |reason: String| RefineError::InvalidIdentity {
        path: path.to_path_buf(),
        reason,
    };
    let text = fs::read_to_string(path).map_err(|e| invalid(e.to_string()))?;
    let doc: Value = serde_json::from_str(&text).map_err(|e| invalid(e.to_string()))?;

    match doc.get(field).and_then(Value::as_str) {
        Some(owner) if !owner.trim().is_empty() => Ok(owner.to_string()),
        _ => Err(RefineError::MissingField {
            field: field.to_string(),
            source_name: path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_else(|| path.display().to_string()),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        crypto::{decrypt_file, AesGcmEncryptor},
        publish::LocalPublisher,
        records::ActivityRecord,
        sink::ParquetSink,
    };
    use anyhow::{anyhow, Result};
    use std::{
        cell::RefCell,
        fs::File,
        io::Write,
        path::PathBuf,
    };
    use tempfile::{tempdir, TempDir};
    use tracing_subscriber::{EnvFilter, FmtSubscriber};
    use zip::{write::SimpleFileOptions, ZipWriter};

    fn init_test_logging() {
        let subscriber = FmtSubscriber::builder()
            .with_env_filter(
                EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| EnvFilter::new("info,activity_refiner=debug")),
            )
            .with_test_writer()
            .finish();
        let _ = tracing::subscriber::set_global_default(subscriber);
    }

    #[derive(Default)]
    struct MemorySink {
        path: PathBuf,
        records: Vec<ActivityRecord>,
        calls: usize,
        fail: bool,
    }

    impl RecordSink for MemorySink {
        fn insert_all(&mut self, records: Vec<ActivityRecord>) -> Result<usize> {
            self.calls += 1;
            if self.fail {
                return Err(anyhow!("disk full"));
            }
            let n = records.len();
            self.records = records;
            fs::write(&self.path, format!("{} rows", n))?;
            Ok(n)
        }

        fn storage_path(&self) -> &Path {
            &self.path
        }
    }

    struct CopyEncryptor;

    impl FileEncryptor for CopyEncryptor {
        fn encrypt(&self, key: &str, path: &Path) -> Result<PathBuf> {
            if key.is_empty() {
                return Err(anyhow!("empty key"));
            }
            let out = path.with_extension("enc");
            fs::copy(path, &out)?;
            Ok(out)
        }
    }

    #[derive(Default)]
    struct MemoryPublisher {
        published: RefCell<Vec<String>>,
        fail: bool,
    }

    impl Publisher for MemoryPublisher {
        fn publish_json(&self, name: &str, _value: &Value) -> Result<String> {
            if self.fail {
                return Err(anyhow!("gateway unreachable"));
            }
            self.published.borrow_mut().push(format!("json:{}", name));
            Ok("cid-schema".to_string())
        }

        fn publish_file(&self, path: &Path) -> Result<String> {
            if self.fail {
                return Err(anyhow!("gateway unreachable"));
            }
            self.published
                .borrow_mut()
                .push(format!("file:{}", path.display()));
            Ok("cid-artifact".to_string())
        }
    }

    struct Workspace {
        _root: TempDir,
        config: RefinerConfig,
    }

    fn workspace() -> Result<Workspace> {
        let root = tempdir()?;
        let input_dir = root.path().join("input");
        let output_dir = root.path().join("output");
        fs::create_dir_all(&input_dir)?;
        fs::create_dir_all(&output_dir)?;
        let config = RefinerConfig {
            input_dir,
            output_dir: output_dir.clone(),
            encryption_key: "secret".into(),
            gateway_url: "https://gateway.example/ipfs/".into(),
            ..RefinerConfig::default()
        };
        Ok(Workspace {
            _root: root,
            config,
        })
    }

    fn write_archive(dir: &Path, name: &str, entries: &[(&str, &str)]) -> Result<PathBuf> {
        let path = dir.join(name);
        let mut zip = ZipWriter::new(File::create(&path)?);
        for (entry, content) in entries {
            zip.start_file(*entry, SimpleFileOptions::default())?;
            zip.write_all(content.as_bytes())?;
        }
        zip.finish()?;
        Ok(path)
    }

    fn memory_sink(cfg: &RefinerConfig) -> MemorySink {
        MemorySink {
            path: cfg.output_dir.join("db.mem"),
            ..MemorySink::default()
        }
    }

    const CSV: &str = "Profile Name,Start Time,Duration\nAlice,2021-01-01T00:00:00Z,3600\n";
    const ACCOUNT: &str = r#"{"user":"addr123"}"#;

    #[test]
    fn single_row_export_reaches_done() -> Result<()> {
        init_test_logging();
        let ws = workspace()?;
        write_archive(
            &ws.config.input_dir,
            "export.zip",
            &[("ViewingActivity.csv", CSV), ("account.json", ACCOUNT)],
        )?;

        let mut refiner = Refiner::new(
            &ws.config,
            memory_sink(&ws.config),
            CopyEncryptor,
            MemoryPublisher::default(),
        );
        let result = refiner.run()?;

        assert_eq!(refiner.stage(), Stage::Done);
        assert_eq!(
            refiner.sink().records,
            vec![ActivityRecord {
                address: "addr123".into(),
                profile_name: "Alice".into(),
                start_time: "2021-01-01T00:00:00Z".into(),
                duration: Some("3600".into()),
                attributes: None,
                title: None,
                supplemental_video_type: None,
                device_type: None,
                bookmark: None,
                latest_bookmark: None,
                country: None,
            }]
        );
        assert_eq!(refiner.sink().calls, 1);
        assert_eq!(
            result.refinement_url.as_deref(),
            Some("https://gateway.example/ipfs/cid-artifact")
        );
        assert_eq!(result.schema_cid.as_deref(), Some("cid-schema"));

        let schema = result.schema.expect("schema set on success");
        assert_eq!(schema.name, ws.config.schema.name);
        let on_disk: SchemaDescriptor =
            serde_json::from_str(&fs::read_to_string(ws.config.schema_path())?)?;
        assert_eq!(on_disk, schema);

        let published = refiner.publisher().published.borrow();
        assert_eq!(published.len(), 2);
        assert!(published[0].starts_with("json:"));
        assert!(published[1].ends_with("db.enc"));
        Ok(())
    }

    #[test]
    fn real_collaborators_produce_a_decryptable_artifact() -> Result<()> {
        init_test_logging();
        let ws = workspace()?;
        write_archive(
            &ws.config.input_dir,
            "Netflix-Export.ZIP",
            &[("ViewingActivity.csv", CSV), ("account.json", ACCOUNT)],
        )?;

        let store = ws.config.output_dir.join("published");
        let mut refiner = Refiner::new(
            &ws.config,
            ParquetSink::new(ws.config.sink_path())?,
            AesGcmEncryptor,
            LocalPublisher::new(&store)?,
        );
        let result = refiner.run()?;

        let url = result.refinement_url.expect("locator set on success");
        let cid = url
            .rsplit('/')
            .next()
            .expect("locator ends with a content id");
        let artifact = store.join(cid);
        assert_eq!(
            decrypt_file("secret", &artifact)?,
            fs::read(ws.config.sink_path())?
        );
        Ok(())
    }

    #[test]
    fn no_archive_fails_before_extraction() -> Result<()> {
        let ws = workspace()?;
        fs::write(ws.config.input_dir.join("readme.txt"), "no zip here")?;

        let mut refiner = Refiner::new(
            &ws.config,
            memory_sink(&ws.config),
            CopyEncryptor,
            MemoryPublisher::default(),
        );
        let err = refiner.run().unwrap_err();

        assert_eq!(err.stage, Stage::Located);
        assert!(matches!(err.source, RefineError::NotFound(_)), "{err}");
        assert_eq!(refiner.stage(), Stage::Failed);
        assert_eq!(fs::read_dir(&ws.config.input_dir)?.count(), 1);
        Ok(())
    }

    #[test]
    fn missing_identity_file_fails_resolving_files() -> Result<()> {
        let ws = workspace()?;
        write_archive(
            &ws.config.input_dir,
            "export.zip",
            &[("ViewingActivity.csv", CSV)],
        )?;

        let mut refiner = Refiner::new(
            &ws.config,
            memory_sink(&ws.config),
            CopyEncryptor,
            MemoryPublisher::default(),
        );
        let err = refiner.run().unwrap_err();

        assert_eq!(err.stage, Stage::FilesResolved);
        match err.source {
            RefineError::NotFound(msg) => assert!(msg.contains("account.json"), "{msg}"),
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(refiner.sink().calls, 0);
        Ok(())
    }

    #[test]
    fn identity_without_user_fails_with_missing_field() -> Result<()> {
        let ws = workspace()?;
        write_archive(
            &ws.config.input_dir,
            "export.zip",
            &[
                ("ViewingActivity.csv", CSV),
                ("account.json", r#"{"email":"a@example.com"}"#),
            ],
        )?;

        let mut refiner = Refiner::new(
            &ws.config,
            memory_sink(&ws.config),
            CopyEncryptor,
            MemoryPublisher::default(),
        );
        let err = refiner.run().unwrap_err();

        assert_eq!(err.stage, Stage::OwnerResolved);
        assert!(
            matches!(&err.source, RefineError::MissingField { field, .. } if field == "user"),
            "{err}"
        );
        Ok(())
    }

    #[test]
    fn malformed_row_never_reaches_the_sink() -> Result<()> {
        let ws = workspace()?;
        write_archive(
            &ws.config.input_dir,
            "export.zip",
            &[
                (
                    "ViewingActivity.csv",
                    "Profile Name,Start Time\nAlice,2021-01-01\nBob\n",
                ),
                ("account.json", ACCOUNT),
            ],
        )?;

        let mut refiner = Refiner::new(
            &ws.config,
            memory_sink(&ws.config),
            CopyEncryptor,
            MemoryPublisher::default(),
        );
        let err = refiner.run().unwrap_err();

        assert_eq!(err.stage, Stage::Transformed);
        assert!(matches!(err.source, RefineError::MalformedRow { row: 1, .. }), "{err}");
        assert_eq!(refiner.sink().calls, 0);
        Ok(())
    }

    #[test]
    fn sink_failure_is_fatal() -> Result<()> {
        let ws = workspace()?;
        write_archive(
            &ws.config.input_dir,
            "export.zip",
            &[("ViewingActivity.csv", CSV), ("account.json", ACCOUNT)],
        )?;

        let sink = MemorySink {
            fail: true,
            ..memory_sink(&ws.config)
        };
        let mut refiner = Refiner::new(&ws.config, sink, CopyEncryptor, MemoryPublisher::default());
        let err = refiner.run().unwrap_err();

        assert_eq!(err.stage, Stage::Persisted);
        assert!(matches!(err.source, RefineError::SinkWrite(_)), "{err}");
        assert!(!ws.config.schema_path().exists());
        Ok(())
    }

    #[test]
    fn publish_failure_stops_before_encryption() -> Result<()> {
        let ws = workspace()?;
        write_archive(
            &ws.config.input_dir,
            "export.zip",
            &[("ViewingActivity.csv", CSV), ("account.json", ACCOUNT)],
        )?;

        let publisher = MemoryPublisher {
            fail: true,
            ..MemoryPublisher::default()
        };
        let mut refiner = Refiner::new(&ws.config, memory_sink(&ws.config), CopyEncryptor, publisher);
        let err = refiner.run().unwrap_err();

        assert_eq!(err.stage, Stage::SchemaPublished);
        assert!(matches!(err.source, RefineError::Publish(_)), "{err}");
        // schema was written before the publish attempt
        assert!(ws.config.schema_path().exists());
        assert!(!ws.config.output_dir.join("db.enc").exists());
        Ok(())
    }

    #[test]
    fn encryption_failure_is_reported() -> Result<()> {
        let ws = workspace()?;
        write_archive(
            &ws.config.input_dir,
            "export.zip",
            &[("ViewingActivity.csv", CSV), ("account.json", ACCOUNT)],
        )?;
        let config = RefinerConfig {
            encryption_key: String::new(),
            ..ws.config.clone()
        };

        let mut refiner = Refiner::new(
            &config,
            memory_sink(&config),
            CopyEncryptor,
            MemoryPublisher::default(),
        );
        let err = refiner.run().unwrap_err();

        assert_eq!(err.stage, Stage::Encrypted);
        assert!(matches!(err.source, RefineError::Encryption(_)), "{err}");
        Ok(())
    }

    #[test]
    fn resolve_owner_rejects_non_string_and_invalid_json() -> Result<()> {
        let dir = tempdir()?;
        let numeric = dir.path().join("numeric.json");
        fs::write(&numeric, r#"{"user": 42}"#)?;
        assert!(matches!(
            resolve_owner(&numeric, "user"),
            Err(RefineError::MissingField { .. })
        ));

        let broken = dir.path().join("broken.json");
        fs::write(&broken, "{not json")?;
        assert!(matches!(
            resolve_owner(&broken, "user"),
            Err(RefineError::InvalidIdentity { .. })
        ));

        let good = dir.path().join("account.json");
        fs::write(&good, r#"{"user":"0xabc","plan":"premium"}"#)?;
        assert_eq!(resolve_owner(&good, "user")?, "0xabc");
        Ok(())
    }
}
