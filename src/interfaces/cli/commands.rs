use super::render::{render_import_summary, render_sources, render_table};
use crate::application::use_cases::data_import::DataImportUseCase;
use crate::application::use_cases::text_to_sql::{TextToSqlSettings, TextToSqlUseCase};
use crate::domain::data_source::{redact_password, DataSource, SourceKind};
use crate::domain::dataset::clean_identifier;
use crate::domain::error::{AppError, Result};
use crate::domain::llm_config::{LLMConfig, LLMProvider};
use crate::domain::query::{FailureKind, QueryOutcome};
use crate::infrastructure::config::{AppConfig, ConfigService};
use crate::infrastructure::db::postgres::PostgresDatabase;
use crate::infrastructure::db::sqlite::SqliteDatabase;
use crate::infrastructure::db::QueryDatabase;
use crate::infrastructure::llm_clients::{LLMClient, RouterClient};
use crate::infrastructure::storage::{validate_source_name, SourceRegistry};
use chrono::Utc;
use std::io::{BufRead, Write};
use std::path::Path;
use std::process::ExitCode;
use std::sync::Arc;
use tracing::{info, warn};

/// Loaded configuration plus the services every command shares.
pub struct Session {
    pub config: AppConfig,
    credentials: ConfigService,
    llm_client: Arc<dyn LLMClient + Send + Sync>,
}

impl Session {
    pub fn load(config_file: Option<&Path>) -> Result<Self> {
        Ok(Self {
            config: AppConfig::load(config_file)?,
            credentials: ConfigService::new(),
            llm_client: Arc::new(RouterClient::new()),
        })
    }

    pub fn registry(&self) -> Result<SourceRegistry> {
        SourceRegistry::load(self.config.registry_path())
    }

    pub async fn open_database(&self, source: &DataSource) -> Result<Arc<dyn QueryDatabase>> {
        let timeout = self.config.database_timeout_secs;
        match source.kind {
            SourceKind::Postgres => {
                let url = source.url.as_deref().ok_or_else(|| {
                    AppError::ConfigError(format!(
                        "Data source '{}' has no connection URL",
                        source.name
                    ))
                })?;
                let password = source
                    .password_ref
                    .as_deref()
                    .map(|reference| self.credentials.resolve_database_password(reference))
                    .transpose()?;
                let database = PostgresDatabase::connect(url, password.as_deref(), timeout).await?;
                Ok(Arc::new(database))
            }
            SourceKind::Sqlite | SourceKind::Csv | SourceKind::Excel => {
                let database = SqliteDatabase::open(&source.database_path, timeout).await?;
                Ok(Arc::new(database))
            }
        }
    }

    /// LLM settings with the API key resolved from config, env or keychain.
    pub fn llm_config(&self) -> LLMConfig {
        let mut llm = self.config.llm.clone();
        match self.credentials.resolve_api_key(&mut llm) {
            Some(source) => info!("Using API key from {}", source),
            None if llm.provider != LLMProvider::Local => {
                warn!("No API key found; set one with `text2sql key set` or GEMINI_API_KEY")
            }
            None => {}
        }
        llm
    }

    pub fn text_to_sql(
        &self,
        database: Arc<dyn QueryDatabase>,
        max_attempts: Option<u32>,
    ) -> TextToSqlUseCase {
        let settings = TextToSqlSettings {
            llm: self.llm_config(),
            max_debug_attempts: max_attempts.unwrap_or(self.config.max_debug_attempts),
        };
        TextToSqlUseCase::new(self.llm_client.clone(), database, settings)
    }
}

pub async fn import(
    session: &Session,
    file: &Path,
    name: Option<String>,
    sheet: Option<&str>,
    description: String,
    replace: bool,
) -> Result<ExitCode> {
    let name = name.unwrap_or_else(|| {
        file.file_stem()
            .and_then(|stem| stem.to_str())
            .map(clean_identifier)
            .unwrap_or_else(|| "data".to_string())
    });
    validate_source_name(&name)?;

    let mut registry = session.registry()?;
    let replaced = registry.get(&name).ok().cloned();
    if !replace && replaced.is_some() {
        return Err(AppError::ValidationError(format!(
            "Data source '{}' already exists (use --replace to overwrite)",
            name
        )));
    }

    let imported = DataImportUseCase::new(&session.config.data_dir)
        .import_file(file, sheet)
        .await?;

    let registered = registry
        .add(
            DataSource {
                name: name.clone(),
                kind: imported.kind,
                database_path: absolute(&imported.database_path),
                url: None,
                password_ref: None,
                origin: Some(absolute(file)),
                description,
                created_at: Utc::now(),
            },
            replace,
        )
        .and_then(|()| registry.save());
    if let Err(e) = registered {
        let _ = std::fs::remove_file(&imported.database_path);
        return Err(e);
    }

    if let Some(old) = replaced {
        delete_imported_database(&old);
    }

    println!("{}", render_import_summary(&imported.summary));
    println!(
        "Added data source '{}'{}",
        name,
        if registry.is_active(&name) { " (active)" } else { "" }
    );
    Ok(ExitCode::SUCCESS)
}

pub async fn add_db(
    session: &Session,
    name: String,
    path: &Path,
    description: String,
    replace: bool,
) -> Result<ExitCode> {
    // opening and reading the schema proves the file is a usable database
    let database = SqliteDatabase::open(path, session.config.database_timeout_secs).await?;
    let schema = database.extract_schema().await?;
    database.close().await;

    let mut registry = session.registry()?;
    registry.add(
        DataSource {
            name: name.clone(),
            kind: SourceKind::Sqlite,
            database_path: absolute(path),
            url: None,
            password_ref: None,
            origin: None,
            description,
            created_at: Utc::now(),
        },
        replace,
    )?;
    registry.save()?;

    println!(
        "Added data source '{}' with {} table(s): {}",
        name,
        schema.tables.len(),
        schema.table_names().join(", ")
    );
    Ok(ExitCode::SUCCESS)
}

pub async fn add_postgres(
    session: &Session,
    name: String,
    url: String,
    password_ref: Option<String>,
    description: String,
    replace: bool,
) -> Result<ExitCode> {
    validate_source_name(&name)?;
    if url != redact_password(&url) {
        warn!("The connection URL contains a password and is stored as is; prefer --password-ref env:VAR");
    }

    let source = DataSource {
        name: name.clone(),
        kind: SourceKind::Postgres,
        database_path: Default::default(),
        url: Some(url),
        password_ref,
        origin: None,
        description,
        created_at: Utc::now(),
    };

    // connecting and reading the schema proves the URL and password work
    let database = session.open_database(&source).await?;
    let schema = database.extract_schema().await;
    database.close().await;
    let schema = schema?;

    let mut registry = session.registry()?;
    registry.add(source, replace)?;
    registry.save()?;

    println!(
        "Added data source '{}' with {} table(s): {}",
        name,
        schema.tables.len(),
        schema.table_names().join(", ")
    );
    Ok(ExitCode::SUCCESS)
}

pub fn list(session: &Session) -> Result<ExitCode> {
    let registry = session.registry()?;
    print!(
        "{}",
        render_sources(registry.list(), |name| registry.is_active(name))
    );
    Ok(ExitCode::SUCCESS)
}

pub fn set_active(session: &Session, name: &str) -> Result<ExitCode> {
    let mut registry = session.registry()?;
    registry.set_active(name)?;
    registry.save()?;
    println!("Active data source: {}", name);
    Ok(ExitCode::SUCCESS)
}

pub fn remove(session: &Session, name: &str, keep_file: bool) -> Result<ExitCode> {
    let mut registry = session.registry()?;
    let removed = registry.remove(name)?;
    registry.save()?;

    if !keep_file {
        delete_imported_database(&removed);
    }

    println!("Removed data source '{}'", name);
    Ok(ExitCode::SUCCESS)
}

pub async fn schema(session: &Session, source: Option<&str>) -> Result<ExitCode> {
    let registry = session.registry()?;
    let source = registry.resolve(source)?;
    let database = session.open_database(source).await?;
    let schema = database.extract_schema().await?;
    database.close().await;

    println!("Data source: {} [{}]\n", source.name, source.kind);
    print!("{}", schema);
    Ok(ExitCode::SUCCESS)
}

pub async fn query(
    session: &Session,
    question: &str,
    source: Option<&str>,
    max_attempts: Option<u32>,
    json: bool,
) -> Result<ExitCode> {
    let registry = session.registry()?;
    let source = registry.resolve(source)?;
    let database = session.open_database(source).await?;

    let outcome = session
        .text_to_sql(database.clone(), max_attempts)
        .answer(question)
        .await;
    database.close().await;
    let outcome = outcome?;

    if json {
        let body = serde_json::to_string_pretty(&outcome)
            .map_err(|e| AppError::Internal(format!("Failed to serialize outcome: {}", e)))?;
        println!("{}", body);
    } else {
        print_outcome(&outcome);
    }

    Ok(match outcome {
        QueryOutcome::Succeeded(_) => ExitCode::SUCCESS,
        QueryOutcome::Failed(_) => ExitCode::FAILURE,
    })
}

pub fn print_outcome(outcome: &QueryOutcome) {
    match outcome {
        QueryOutcome::Succeeded(ok) => {
            println!("SQL: {}\n", ok.sql);
            println!("{}", render_table(&ok.columns, &ok.rows));
            println!("\n({} row{})", ok.rows.len(), if ok.rows.len() == 1 { "" } else { "s" });
            if ok.attempts > 0 {
                println!("Repaired after {} attempt(s)", ok.attempts);
            }
        }
        QueryOutcome::Failed(failed) => {
            match failed.kind {
                FailureKind::Generation => eprintln!("Query failed: {}", failed.reason),
                FailureKind::AttemptsExhausted => eprintln!(
                    "Query failed after {} repair attempt(s): {}",
                    failed.attempts, failed.reason
                ),
            }
            if let Some(sql) = &failed.last_sql {
                eprintln!("Last SQL: {}", sql);
            }
            if let Some(guidance) = &failed.guidance {
                eprintln!("Hint: {}", guidance);
            }
        }
    }
}

pub async fn models(session: &Session) -> Result<ExitCode> {
    let llm = session.llm_config();
    let models = session.llm_client.list_models(&llm).await?;
    if models.is_empty() {
        println!("No models reported by the provider.");
    }
    for model in models {
        let marker = if model == llm.model { "*" } else { " " };
        println!("{} {}", marker, model);
    }
    Ok(ExitCode::SUCCESS)
}

pub async fn ping(session: &Session) -> Result<ExitCode> {
    let llm = session.llm_config();
    println!("Provider: {}", llm.provider.keyring_account());
    println!("Model:    {}", llm.model);
    println!("Endpoint: {}", llm.base_url);
    println!(
        "API key:  {}",
        llm.masked_api_key().unwrap_or_else(|| "(not set)".to_string())
    );

    match session
        .llm_client
        .generate(&llm, "", "Reply with the single word OK.")
        .await
    {
        Ok(reply) => {
            println!("\nConnection OK. Response: {}", reply.trim());
            Ok(ExitCode::SUCCESS)
        }
        Err(e) => {
            eprintln!("\nConnection failed: {}", e);
            if let AppError::GenerationCallError { kind, .. } = &e {
                eprintln!("Hint: {}", kind.hint());
            }
            Ok(ExitCode::FAILURE)
        }
    }
}

pub fn key_set(
    session: &Session,
    key: Option<String>,
    provider: Option<LLMProvider>,
) -> Result<ExitCode> {
    let provider = provider.unwrap_or(session.config.llm.provider);
    let key = match key {
        Some(key) => key,
        None => {
            eprint!("API key for {}: ", provider.keyring_account());
            std::io::stderr().flush()?;
            let mut line = String::new();
            std::io::stdin().lock().read_line(&mut line)?;
            line
        }
    };

    session.credentials.save_api_key(provider, &key)?;
    println!("Stored API key for {} in the system keychain", provider.keyring_account());
    Ok(ExitCode::SUCCESS)
}

pub fn key_delete(session: &Session, provider: Option<LLMProvider>) -> Result<ExitCode> {
    let provider = provider.unwrap_or(session.config.llm.provider);
    if session.credentials.delete_api_key(provider)? {
        println!("Deleted API key for {}", provider.keyring_account());
    } else {
        println!("No API key stored for {}", provider.keyring_account());
    }
    Ok(ExitCode::SUCCESS)
}

pub fn key_set_password(
    session: &Session,
    name: &str,
    password: Option<String>,
) -> Result<ExitCode> {
    let password = match password {
        Some(password) => password,
        None => {
            eprint!("Password for {}: ", name);
            std::io::stderr().flush()?;
            let mut line = String::new();
            std::io::stdin().lock().read_line(&mut line)?;
            line.trim_end_matches(['\r', '\n']).to_string()
        }
    };

    session.credentials.save_database_password(name, &password)?;
    println!(
        "Stored password '{}' in the system keychain; use --password-ref keychain:{}",
        name, name
    );
    Ok(ExitCode::SUCCESS)
}

/// Deletes the database file of an imported source. Registered SQLite files
/// and server databases are never touched.
fn delete_imported_database(source: &DataSource) {
    if !source.kind.is_imported() {
        return;
    }
    match std::fs::remove_file(&source.database_path) {
        Ok(()) => info!("Deleted {}", source.database_path.display()),
        Err(e) => warn!(
            "Could not delete {}: {}",
            source.database_path.display(),
            e
        ),
    }
}

fn absolute(path: &Path) -> std::path::PathBuf {
    std::fs::canonicalize(path).unwrap_or_else(|_| path.to_path_buf())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn session_in(dir: &Path) -> Session {
        Session {
            config: AppConfig {
                data_dir: dir.join("data"),
                ..AppConfig::default()
            },
            credentials: ConfigService::new(),
            llm_client: Arc::new(RouterClient::new()),
        }
    }

    fn temp_dir() -> PathBuf {
        let dir = std::env::temp_dir().join(format!("text2sql-cli-{}", uuid::Uuid::new_v4()));
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    fn database_files(session: &Session) -> Vec<PathBuf> {
        match std::fs::read_dir(session.config.data_dir.join("databases")) {
            Ok(entries) => entries.map(|entry| entry.unwrap().path()).collect(),
            Err(_) => Vec::new(),
        }
    }

    #[tokio::test]
    async fn test_import_with_invalid_name_writes_nothing() {
        let dir = temp_dir();
        let session = session_in(&dir);
        let csv = dir.join("sales.csv");
        std::fs::write(&csv, "city,amount\nNYC,10\n").unwrap();

        let result = import(&session, &csv, Some("bad name".into()), None, String::new(), false).await;

        assert!(matches!(result, Err(AppError::ValidationError(_))));
        assert!(database_files(&session).is_empty());
        assert!(session.registry().unwrap().is_empty());

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[tokio::test]
    async fn test_import_replace_deletes_previous_database() {
        let dir = temp_dir();
        let session = session_in(&dir);
        let csv = dir.join("sales.csv");
        std::fs::write(&csv, "city,amount\nNYC,10\n").unwrap();

        import(&session, &csv, Some("sales".into()), None, String::new(), false)
            .await
            .unwrap();
        let first = session.registry().unwrap().get("sales").unwrap().database_path.clone();
        assert!(first.exists());

        let duplicate =
            import(&session, &csv, Some("sales".into()), None, String::new(), false).await;
        assert!(matches!(duplicate, Err(AppError::ValidationError(_))));
        assert_eq!(database_files(&session).len(), 1);

        import(&session, &csv, Some("sales".into()), None, String::new(), true)
            .await
            .unwrap();
        let second = session.registry().unwrap().get("sales").unwrap().database_path.clone();

        assert_ne!(first, second);
        assert!(!first.exists());
        assert!(second.exists());
        assert_eq!(database_files(&session).len(), 1);

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn test_registered_databases_are_never_deleted() {
        let dir = temp_dir();
        let file = dir.join("app.db");
        std::fs::write(&file, b"").unwrap();

        let source = DataSource {
            name: "app".into(),
            kind: SourceKind::Sqlite,
            database_path: file.clone(),
            url: None,
            password_ref: None,
            origin: None,
            description: String::new(),
            created_at: Utc::now(),
        };
        delete_imported_database(&source);
        assert!(file.exists());

        delete_imported_database(&DataSource {
            kind: SourceKind::Csv,
            ..source
        });
        assert!(!file.exists());

        let _ = std::fs::remove_dir_all(&dir);
    }
}
