use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use crate::error::DiagramError;
use crate::render;
use crate::source::{DeclaredModel, LiveDatabase, SchemaSource};

/// Which source produced the diagram
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Live,
    Static,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Rendered(Stage),
    /// Both sources failed and no file was written
    Failed,
}

pub struct DiagramGenerator {
    output: PathBuf,
}

impl DiagramGenerator {
    pub fn new(output: impl Into<PathBuf>) -> Self {
        Self {
            output: output.into(),
        }
    }

    pub fn output(&self) -> &Path {
        &self.output
    }

    /// Describe, check and render one source, then write the file.
    ///
    /// Only the references are checked: keyless and composite-key tables are
    /// drawn as they are. The document is rendered completely before the
    /// file is touched.
    pub fn render_to_file(&self, source: &dyn SchemaSource) -> Result<(), DiagramError> {
        tracing::debug!(source = source.label(), "Reading schema");
        let schema = source.describe()?;
        schema.validate_references()?;

        let document = render::render(&schema)?;
        fs::write(&self.output, document.to_string()).map_err(|source| DiagramError::Io {
            path: self.output.clone(),
            source,
        })?;

        tracing::info!(
            source = source.label(),
            path = %self.output.display(),
            tables = schema.tables.len(),
            "Diagram written"
        );
        Ok(())
    }

    /// Try `primary`, then `fallback`, reporting each step on `console`.
    pub fn run<W: Write>(
        &self,
        primary: &dyn SchemaSource,
        fallback: &dyn SchemaSource,
        console: &mut W,
    ) -> io::Result<Outcome> {
        let path = self.output.display();

        let err = match self.render_to_file(primary) {
            Ok(()) => {
                writeln!(console, "✅ Success! The diagram was generated at '{path}'")?;
                writeln!(console, "📊 Open {path} to view the data model")?;
                return Ok(Outcome::Rendered(Stage::Live));
            }
            Err(err) => err,
        };

        tracing::warn!(source = primary.label(), error = %err, "Live diagram failed");
        writeln!(console, "❌ Error generating diagram: {err}")?;
        writeln!(console, "\nTrying fallback method...")?;

        match self.render_to_file(fallback) {
            Ok(()) => {
                writeln!(console, "✅ Success with the fallback method! Check {path}")?;
                Ok(Outcome::Rendered(Stage::Static))
            }
            Err(err) => {
                tracing::error!(source = fallback.label(), error = %err, "Fallback diagram failed");
                writeln!(console, "❌ Error with fallback method: {err}")?;
                Ok(Outcome::Failed)
            }
        }
    }
}

/// Generate the diagram from the database at `database_url`, falling back to
/// the declared model.
///
/// Only a missing URL is an error; a failed fallback is reported as
/// [`Outcome::Failed`].
pub fn generate_diagram<W: Write>(
    database_url: Option<&str>,
    output: impl Into<PathBuf>,
    console: &mut W,
) -> Result<Outcome, DiagramError> {
    let Some(url) = database_url.filter(|url| !url.trim().is_empty()) else {
        writeln!(console, "Error: DATABASE_URL is not configured in the .env file")?;
        return Err(DiagramError::MissingDatabaseUrl);
    };

    let generator = DiagramGenerator::new(output);
    let outcome = generator.run(&LiveDatabase::new(url), &DeclaredModel, console)?;
    Ok(outcome)
}

#[cfg(test)]
mod tests {
    use super::*;
    use snapgram_types::{MetadataError, SchemaMetadata};

    struct Broken(&'static str);

    impl SchemaSource for Broken {
        fn label(&self) -> &str {
            self.0
        }

        fn describe(&self) -> Result<SchemaMetadata, DiagramError> {
            Err(DiagramError::UnsupportedBackend(self.0.to_string()))
        }
    }

    /// Declared model with a foreign key pointing nowhere
    struct Dangling;

    impl SchemaSource for Dangling {
        fn label(&self) -> &str {
            "dangling"
        }

        fn describe(&self) -> Result<SchemaMetadata, DiagramError> {
            let mut schema = SchemaMetadata::declared();
            schema.tables.retain(|t| t.name != "user");
            Ok(schema)
        }
    }

    fn run(
        primary: &dyn SchemaSource,
        fallback: &dyn SchemaSource,
    ) -> (Outcome, String, PathBuf, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let output = dir.path().join("diagram.svg");
        let generator = DiagramGenerator::new(&output);

        let mut console = Vec::new();
        let outcome = generator.run(primary, fallback, &mut console).unwrap();
        (outcome, String::from_utf8(console).unwrap(), output, dir)
    }

    #[test]
    fn test_primary_success_skips_fallback() {
        let (outcome, console, output, _dir) = run(&DeclaredModel, &Broken("unused"));

        assert_eq!(outcome, Outcome::Rendered(Stage::Live));
        assert!(console.contains("Success! The diagram was generated at"));
        assert!(console.contains("to view the data model"));
        assert!(!console.contains("fallback"));
        assert!(fs::read_to_string(output).unwrap().starts_with("<svg"));
    }

    #[test]
    fn test_primary_failure_uses_fallback() {
        let (outcome, console, output, _dir) = run(&Broken("mysql"), &DeclaredModel);

        assert_eq!(outcome, Outcome::Rendered(Stage::Static));
        let lines: Vec<&str> = console.lines().collect();
        assert!(lines[0].starts_with("❌ Error generating diagram: unsupported database backend 'mysql'"));
        assert!(console.contains("Trying fallback method..."));
        assert!(console.contains("Success with the fallback method!"));
        assert!(fs::metadata(output).unwrap().len() > 0);
    }

    #[test]
    fn test_both_failing_writes_nothing() {
        let (outcome, console, output, _dir) = run(&Broken("first"), &Broken("second"));

        assert_eq!(outcome, Outcome::Failed);
        assert!(console.contains("Error with fallback method: unsupported database backend 'second'"));
        assert!(!output.exists());
    }

    #[test]
    fn test_invalid_metadata_is_rejected_before_rendering() {
        let dir = tempfile::tempdir().unwrap();
        let generator = DiagramGenerator::new(dir.path().join("diagram.svg"));

        let err = generator.render_to_file(&Dangling).unwrap_err();
        assert!(matches!(
            err,
            DiagramError::InvalidMetadata(MetadataError::UnknownReference { .. })
        ));
        assert!(!generator.output().exists());
    }

    #[test]
    fn test_failed_render_keeps_previous_file() {
        let dir = tempfile::tempdir().unwrap();
        let output = dir.path().join("diagram.svg");
        fs::write(&output, "previous").unwrap();

        let generator = DiagramGenerator::new(&output);
        assert!(generator.render_to_file(&Dangling).is_err());
        assert_eq!(fs::read_to_string(&output).unwrap(), "previous");
    }

    #[test]
    fn test_live_tables_without_single_key_render_live() {
        let dir = tempfile::tempdir().unwrap();
        let database = dir.path().join("graph.db");
        let conn = rusqlite::Connection::open(&database).unwrap();
        conn.execute_batch(
            "CREATE TABLE member (id INTEGER PRIMARY KEY, handle TEXT NOT NULL UNIQUE);
             CREATE TABLE follow (a INTEGER REFERENCES member(id), b INTEGER REFERENCES member(id), PRIMARY KEY (a, b));
             CREATE TABLE audit_log (member_id INTEGER REFERENCES member(id), message TEXT);",
        )
        .unwrap();
        drop(conn);

        let live = LiveDatabase::new(format!("sqlite://{}", database.display()));
        let (outcome, console, output, _dir) = run(&live, &Broken("unused"));

        assert_eq!(outcome, Outcome::Rendered(Stage::Live));
        assert!(!console.contains("Error generating diagram"), "{console}");
        let svg = fs::read_to_string(output).unwrap();
        assert!(svg.contains("table-follow"));
        assert!(svg.contains("table-audit_log"));
    }

    #[test]
    fn test_missing_url_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let output = dir.path().join("diagram.svg");

        for url in [None, Some(""), Some("   ")] {
            let mut console = Vec::new();
            let result = generate_diagram(url, &output, &mut console);
            assert!(matches!(result, Err(DiagramError::MissingDatabaseUrl)));
            assert!(String::from_utf8(console)
                .unwrap()
                .starts_with("Error: DATABASE_URL is not configured"));
        }
        assert!(!output.exists());
    }

    #[test]
    fn test_unreachable_database_falls_back() {
        let dir = tempfile::tempdir().unwrap();
        let output = dir.path().join("diagram.svg");
        let url = format!("sqlite://{}", dir.path().join("missing.db").display());

        let mut console = Vec::new();
        let outcome = generate_diagram(Some(&url), &output, &mut console).unwrap();

        assert_eq!(outcome, Outcome::Rendered(Stage::Static));
        assert!(output.exists());
        assert!(!dir.path().join("missing.db").exists());
    }
}
