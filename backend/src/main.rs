//! Rollbook CLI - validate and import student rosters
//!
//! # Commands
//!
//! ```bash
//! rollbook validate roster.xlsx --classes classes.json      # Validate a roster
//! rollbook template --classes classes.json                  # Write the upload template
//! rollbook import roster.csv --classes classes.json         # Validate, then import in batches
//! rollbook serve                                            # Start HTTP server (port 3000)
//! ```
//!
//! Settings come from the environment (`ROLLBOOK_*`, `.env`); flags override them.

use clap::{Parser, Subcommand};
use rollbook::{
    import_in_batches, load_existing_students, load_known_classes, process_file, validation::load_reference_file,
    ExportFile, HttpImporter, IdentityKey, ReferenceData, ReferenceKind, Settings,
};
use std::fs;
use std::path::{Path, PathBuf};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Parser)]
#[command(name = "rollbook")]
#[command(about = "Validate and bulk-import student rosters from Excel and CSV files", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Validate a roster and report every issue
    Validate {
        /// Input file (.xlsx, .xls or .csv)
        input: PathBuf,

        /// Known classes JSON file
        #[arg(short, long)]
        classes: PathBuf,

        /// Existing students JSON file (for duplicate detection)
        #[arg(short, long)]
        existing: Option<PathBuf>,

        /// Fields that identify a student: email, name-dob or any
        #[arg(long)]
        identity_key: Option<IdentityKey>,

        /// Directory to write the error report CSV into
        #[arg(long)]
        errors_out: Option<PathBuf>,

        /// Output file for the JSON result (default: stdout)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Write the upload template CSV
    Template {
        /// Known classes JSON file (one example row per class)
        #[arg(short, long)]
        classes: PathBuf,

        /// Output directory
        #[arg(long, default_value = ".")]
        out_dir: PathBuf,
    },

    /// Validate a roster, then import its valid rows in batches
    Import {
        /// Input file (.xlsx, .xls or .csv)
        input: PathBuf,

        /// Known classes JSON file
        #[arg(short, long)]
        classes: PathBuf,

        /// Existing students JSON file (for duplicate detection)
        #[arg(short, long)]
        existing: Option<PathBuf>,

        /// Fields that identify a student: email, name-dob or any
        #[arg(long)]
        identity_key: Option<IdentityKey>,

        /// Import endpoint URL (overrides ROLLBOOK_IMPORT_URL)
        #[arg(long)]
        endpoint: Option<String>,

        /// Records per batch (overrides ROLLBOOK_BATCH_SIZE)
        #[arg(long)]
        batch_size: Option<usize>,

        /// Pause between batches in milliseconds (overrides ROLLBOOK_BATCH_DELAY_MS)
        #[arg(long)]
        delay_ms: Option<u64>,

        /// Import the valid rows even when other rows have errors
        #[arg(long)]
        skip_invalid: bool,
    },

    /// Start HTTP server
    Serve {
        /// Port to listen on (overrides ROLLBOOK_PORT)
        #[arg(short, long)]
        port: Option<u16>,
    },
}

#[tokio::main]
async fn main() {
    init_tracing();

    let cli = Cli::parse();

    let result = match Settings::from_env() {
        Err(e) => Err(e.into()),
        Ok(settings) => run(cli.command, settings).await,
    };

    if let Err(e) = result {
        eprintln!("❌ Error: {}", e);
        std::process::exit(1);
    }
}

/// Human-readable logs on stderr; `RUST_LOG` overrides the default level.
fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt::layer().with_target(false).with_writer(std::io::stderr))
        .init();
}

async fn run(command: Commands, settings: Settings) -> Result<(), Box<dyn std::error::Error>> {
    match command {
        Commands::Validate {
            input,
            classes,
            existing,
            identity_key,
            errors_out,
            output,
        } => cmd_validate(
            &input,
            &classes,
            existing.as_deref(),
            identity_key,
            errors_out.as_deref(),
            output.as_deref(),
            &settings,
        ),

        Commands::Template { classes, out_dir } => cmd_template(&classes, &out_dir),

        Commands::Import {
            input,
            classes,
            existing,
            identity_key,
            endpoint,
            batch_size,
            delay_ms,
            skip_invalid,
        } => {
            let mut settings = settings;
            if let Some(endpoint) = endpoint {
                settings.import_url = Some(endpoint);
            }
            if let Some(batch_size) = batch_size {
                settings.batch_size = batch_size;
            }
            if let Some(delay_ms) = delay_ms {
                settings.batch_delay_ms = delay_ms;
            }
            if let Some(key) = identity_key {
                settings.identity_key = key;
            }
            cmd_import(&input, &classes, existing.as_deref(), skip_invalid, &settings).await
        }

        Commands::Serve { port } => {
            let mut settings = settings;
            if let Some(port) = port {
                settings.port = port;
            }
            rollbook::server::start_server(settings).await
        }
    }
}

fn read_reference(classes: &Path, existing: Option<&Path>) -> Result<ReferenceData, Box<dyn std::error::Error>> {
    let known_classes = load_known_classes(load_reference_file(classes, ReferenceKind::KnownClasses)?)?;
    let existing_students = match existing {
        Some(path) => load_existing_students(load_reference_file(path, ReferenceKind::ExistingStudents)?)?,
        None => Vec::new(),
    };

    eprintln!(
        "📚 Reference: {} classes, {} existing students",
        known_classes.len(),
        existing_students.len()
    );
    Ok(ReferenceData::new(existing_students, known_classes))
}

fn today() -> chrono::NaiveDate {
    chrono::Local::now().date_naive()
}

fn cmd_validate(
    input: &Path,
    classes: &Path,
    existing: Option<&Path>,
    identity_key: Option<IdentityKey>,
    errors_out: Option<&Path>,
    output_path: Option<&Path>,
    settings: &Settings,
) -> Result<(), Box<dyn std::error::Error>> {
    let reference = read_reference(classes, existing)?;

    let mut options = settings.validation_options();
    if let Some(key) = identity_key {
        options.identity_key = key;
    }

    let output = process_file(input, &reference, &options)?;

    eprintln!("\n📊 Results:");
    eprintln!("   Processed: {}", output.result.processed_count());
    eprintln!("   ✅ Valid: {}", output.result.valid_data().len());
    eprintln!("   ❌ Errors: {}", output.result.error_count());
    eprintln!("   ⚠️  Warnings: {}", output.result.warning_count());

    if let Some(dir) = errors_out {
        if !output.result.errors().is_empty() {
            let path = ExportFile::errors_file(output.result.errors(), today())?.write_to(dir)?;
            eprintln!("   💾 Error report written to: {}", path.display());
        }
    }

    let json = serde_json::to_string_pretty(&output)?;
    write_output(&json, output_path)?;

    if output.result.has_blocking_errors() {
        std::process::exit(1);
    }

    Ok(())
}

fn cmd_template(classes: &Path, out_dir: &Path) -> Result<(), Box<dyn std::error::Error>> {
    let known_classes = load_known_classes(load_reference_file(classes, ReferenceKind::KnownClasses)?)?;

    let path = ExportFile::template_file(&known_classes, today())?.write_to(out_dir)?;
    eprintln!(
        "📄 Template with {} example rows written to: {}",
        known_classes.len(),
        path.display()
    );
    Ok(())
}

async fn cmd_import(
    input: &Path,
    classes: &Path,
    existing: Option<&Path>,
    skip_invalid: bool,
    settings: &Settings,
) -> Result<(), Box<dyn std::error::Error>> {
    let mut importer: HttpImporter = settings.importer().ok_or(rollbook::ImportError::MissingEndpoint)?;
    let reference = read_reference(classes, existing)?;

    let output = process_file(input, &reference, &settings.validation_options())?;
    let result = output.result;

    if result.has_blocking_errors() && !skip_invalid {
        for issue in result.errors().iter().filter(|i| i.is_error()).take(10) {
            eprintln!("   - {}", issue);
        }
    }
    let records = result.into_importable(skip_invalid)?;

    eprintln!("📤 Importing into: {}", importer.endpoint());
    let summary = import_in_batches(records, &mut importer, &settings.import_options(), |_| {})
        .await
        .map_err(|e| {
            eprintln!("   {} records were committed before the import stopped", e.imported());
            e
        })?;

    eprintln!(
        "\n✨ Done! {} records imported in {} batches",
        summary.imported_records, summary.batches
    );
    Ok(())
}

fn write_output(content: &str, path: Option<&Path>) -> Result<(), Box<dyn std::error::Error>> {
    match path {
        Some(p) => {
            fs::write(p, content)?;
            eprintln!("💾 Output written to: {}", p.display());
        }
        None => {
            println!("{}", content);
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_import_flags() {
        let cli = Cli::try_parse_from([
            "rollbook",
            "import",
            "roster.csv",
            "--classes",
            "classes.json",
            "--identity-key",
            "name-dob",
            "--batch-size",
            "25",
            "--skip-invalid",
        ])
        .unwrap();

        match cli.command {
            Commands::Import {
                input,
                identity_key,
                batch_size,
                delay_ms,
                skip_invalid,
                ..
            } => {
                assert_eq!(input, PathBuf::from("roster.csv"));
                assert_eq!(identity_key, Some(IdentityKey::NameAndDateOfBirth));
                assert_eq!(batch_size, Some(25));
                assert_eq!(delay_ms, None);
                assert!(skip_invalid);
            }
            _ => panic!("expected import command"),
        }
    }

    #[test]
    fn test_unknown_identity_key_rejected() {
        let parsed = Cli::try_parse_from([
            "rollbook",
            "validate",
            "roster.csv",
            "--classes",
            "classes.json",
            "--identity-key",
            "shoe-size",
        ]);
        assert!(parsed.is_err());
    }

    #[test]
    fn test_template_defaults_to_current_dir() {
        let cli = Cli::try_parse_from(["rollbook", "template", "--classes", "classes.json"]).unwrap();
        match cli.command {
            Commands::Template { out_dir, .. } => assert_eq!(out_dir, PathBuf::from(".")),
            _ => panic!("expected template command"),
        }
    }

    #[test]
    fn test_template_command_writes_file() {
        let dir = tempfile::tempdir().unwrap();
        let classes = dir.path().join("classes.json");
        fs::write(
            &classes,
            r#"[{"id": "c-5a", "grade": "5", "section": "A"}, {"grade": "6", "section": "B"}]"#,
        )
        .unwrap();
        let out_dir = dir.path().join("exports");

        cmd_template(&classes, &out_dir).unwrap();

        let written: Vec<_> = fs::read_dir(&out_dir).unwrap().map(|e| e.unwrap().path()).collect();
        assert_eq!(written.len(), 1);
        let name = written[0].file_name().unwrap().to_string_lossy().into_owned();
        assert!(name.starts_with("students_template_"));

        let content = fs::read_to_string(&written[0]).unwrap();
        assert_eq!(content.lines().count(), 3);
    }

    #[test]
    fn test_template_command_rejects_bad_classes() {
        let dir = tempfile::tempdir().unwrap();
        let classes = dir.path().join("classes.json");
        fs::write(&classes, r#"[{"grade": "5"}]"#).unwrap();

        assert!(cmd_template(&classes, dir.path()).is_err());
    }
}
