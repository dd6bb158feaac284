//! CLI binary for edgequake-drafter.
//!
//! A thin shim over the library crate: maps subcommands and flags to
//! `DraftConfig`, reads and writes template JSON, and prints results.

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use edgequake_drafter::{
    edit_template, generate_questions, generate_template, import_template, placeholder_label,
    resolve_model, ContractTemplate, DraftConfig, DraftError, IngestProgressCallback,
    IngestState, ProgressCallback, WizardSession,
};
use indicatif::{ProgressBar, ProgressStyle};
use std::collections::HashMap;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

// ── ANSI colour helpers ──────────────────────────────────────────────────────

fn green(s: &str) -> String {
    format!("\x1b[32m{s}\x1b[0m")
}
fn red(s: &str) -> String {
    format!("\x1b[31m{s}\x1b[0m")
}
fn dim(s: &str) -> String {
    format!("\x1b[2m{s}\x1b[0m")
}
fn bold(s: &str) -> String {
    format!("\x1b[1m{s}\x1b[0m")
}
fn cyan(s: &str) -> String {
    format!("\x1b[36m{s}\x1b[0m")
}

const TICKS: &[&str] = &["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"];

// ── CLI progress callback using indicatif ────────────────────────────────────

/// Spinner while the document is opened, then a bar over chunks.
struct CliProgressCallback {
    bar: ProgressBar,
}

impl CliProgressCallback {
    fn new() -> Arc<Self> {
        let bar = ProgressBar::new(0);
        let spinner_style = ProgressStyle::with_template("{spinner:.cyan} {prefix:.bold}  {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_strings(TICKS);
        bar.set_style(spinner_style);
        bar.set_prefix("Preparing");
        bar.set_message("Opening document…");
        bar.enable_steady_tick(Duration::from_millis(80));
        Arc::new(Self { bar })
    }

    fn activate_bar(&self, total: usize) {
        let style = ProgressStyle::with_template(
            "{spinner:.cyan} {prefix:.bold}  \
             [{bar:42.green/238}] {pos:>3}/{len} chunks  \
             ⏱ {elapsed_precise}  {msg}",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("█▉▊▋▌▍▎▏  ")
        .tick_strings(TICKS);
        self.bar.set_length(total as u64);
        self.bar.set_style(style);
        self.bar.set_prefix("Extracting");
    }
}

impl IngestProgressCallback for CliProgressCallback {
    fn on_state(&self, state: &IngestState) {
        match state {
            IngestState::Extracting { chunk: 0, total } => {
                self.activate_bar(*total);
                self.bar.set_message(state.to_string());
            }
            IngestState::ExtractingSingle => {
                self.activate_bar(1);
                self.bar.set_message(state.to_string());
            }
            IngestState::Synthesizing => {
                self.bar.set_prefix("Synthesizing");
                self.bar.set_message("merging fragments…");
            }
            IngestState::Done { title } => {
                self.bar.finish_and_clear();
                eprintln!("{} {}", green("✔"), bold(title));
            }
            // Reported once, by `main`, from the returned error.
            IngestState::Failed { .. } => self.bar.finish_and_clear(),
            other => self.bar.set_message(other.to_string()),
        }
    }

    fn on_chunk_complete(&self, chunk: usize, total_chunks: usize, html_len: usize) {
        self.bar.println(format!(
            "  {} Chunk {:>3}/{:<3}  {}",
            green("✓"),
            chunk + 1,
            total_chunks,
            dim(&format!("{html_len:>6} chars")),
        ));
        self.bar.inc(1);
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Import a scanned contract as a template
  drafter import scan.pdf -o nda.json

  # Scoped edit of one clause
  drafter edit nda.json --instruction "make the term 24 months" \
      --selection "twelve (12) months"

  # Wizard: first run writes follow-up questions into the session file,
  # second run (after answering them) generates the template
  drafter draft session.json
  drafter draft session.json -o msa.json

  # List the fill-in fields of a template
  drafter placeholders nda.json

  # Export as a Word document, filling fields from a JSON object
  drafter export nda.json -o contract.doc --values acme.json

ENVIRONMENT VARIABLES:
  GEMINI_API_KEY          Google Gemini API key
  OPENAI_API_KEY          OpenAI API key
  ANTHROPIC_API_KEY       Anthropic API key
  EDGEQUAKE_LLM_PROVIDER  Override provider (gemini, openai, anthropic, ollama)
  EDGEQUAKE_MODEL         Override model ID
  PDFIUM_LIB_PATH         Path to libpdfium
"#;

/// Draft, import and edit contract templates with generative models.
#[derive(Parser, Debug)]
#[command(
    name = "drafter",
    version,
    about = "Draft, import and edit contract templates with generative models",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    #[command(flatten)]
    model: ModelArgs,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, global = true, env = "DRAFTER_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, global = true, env = "DRAFTER_QUIET")]
    quiet: bool,

    /// Disable progress bar.
    #[arg(long, global = true, env = "DRAFTER_NO_PROGRESS")]
    no_progress: bool,
}

#[derive(Args, Debug)]
struct ModelArgs {
    /// Model ID for text and structured calls (default: gemini-2.5-flash).
    #[arg(long, global = true, env = "EDGEQUAKE_MODEL")]
    model: Option<String>,

    /// Model ID for page extraction (default: same as --model).
    #[arg(long, global = true, env = "DRAFTER_VISION_MODEL")]
    vision_model: Option<String>,

    /// LLM provider: gemini, openai, anthropic, ollama, azure.
    #[arg(long, global = true, env = "EDGEQUAKE_PROVIDER")]
    provider: Option<String>,

    /// Attempts per model call on rate limiting.
    #[arg(long, global = true, env = "DRAFTER_MAX_ATTEMPTS", default_value_t = 3)]
    max_attempts: u32,

    /// Wall-clock limit per model call, in seconds.
    #[arg(long, global = true, env = "DRAFTER_REQUEST_TIMEOUT")]
    request_timeout: Option<u64>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Import a PDF or image (path or URL) as a template.
    Import {
        input: String,

        /// Write the template JSON here instead of stdout.
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// PDF user password for encrypted documents.
        #[arg(long, env = "DRAFTER_PASSWORD")]
        password: Option<String>,

        /// Pages per extraction request.
        #[arg(long, default_value_t = 3)]
        pages_per_chunk: usize,

        /// HTTP download timeout in seconds.
        #[arg(long, default_value_t = 120)]
        download_timeout: u64,
    },

    /// Apply a natural-language edit to a template.
    Edit {
        template: PathBuf,

        #[arg(short, long)]
        instruction: String,

        /// Restrict the edit to this literal text.
        #[arg(short, long)]
        selection: Option<String>,

        /// Write here instead of overwriting the input.
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Run the drafting wizard over a session file.
    Draft {
        session: PathBuf,

        /// Where to write the generated template (default: stdout).
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Export a template as a Word-compatible .doc file.
    Export {
        template: PathBuf,

        #[arg(short, long, default_value = "contract.doc")]
        output: PathBuf,

        /// JSON object mapping placeholders to values, e.g. {"xxxx_CLIENT_NAME": "Acme"}.
        #[arg(long)]
        values: Option<PathBuf>,
    },

    /// List the placeholders of a template.
    Placeholders {
        template: PathBuf,

        /// Print JSON instead of a table.
        #[arg(long)]
        json: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    // The progress bar replaces INFO logs for imports.
    let is_import = matches!(cli.command, Command::Import { .. });
    let show_progress = is_import && !cli.quiet && !cli.no_progress;
    let filter = if cli.verbose {
        "debug"
    } else if cli.quiet || show_progress {
        "error"
    } else {
        "info"
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_writer(io::stderr)
        .init();

    match cli.command {
        Command::Import {
            ref input,
            ref output,
            ref password,
            pages_per_chunk,
            download_timeout,
        } => {
            let progress: Option<ProgressCallback> = if show_progress {
                Some(CliProgressCallback::new() as Arc<dyn IngestProgressCallback>)
            } else {
                None
            };
            let mut builder = config_builder(&cli.model)
                .pages_per_chunk(pages_per_chunk)
                .download_timeout_secs(download_timeout);
            if let Some(pwd) = password {
                builder = builder.password(pwd.clone());
            }
            if let Some(cb) = progress {
                builder = builder.progress_callback(cb);
            }
            let config = builder.build()?;

            let template = import_template(input, &config)
                .await
                .map_err(|e| failure_report("Import failed", e))?;
            emit_template(&template, output.as_deref(), cli.quiet)?;
        }

        Command::Edit {
            ref template,
            ref instruction,
            ref selection,
            ref output,
        } => {
            let config = config_builder(&cli.model).build()?;
            let model = resolve_model(&config)?;
            let mut doc = ContractTemplate::load(template)?;

            edit_template(
                model.as_ref(),
                &mut doc,
                instruction,
                selection.as_deref(),
                &config,
            )
            .await
            .map_err(|e| failure_report("Edit failed; the template was left unchanged", e))?;

            let target = output.as_deref().unwrap_or(template);
            doc.save(target)?;
            if !cli.quiet {
                eprintln!(
                    "{} {}  {} placeholders  →  {}",
                    green("✔"),
                    bold(&doc.title),
                    doc.unique_placeholders().len(),
                    target.display()
                );
            }
        }

        Command::Draft {
            ref session,
            ref output,
        } => {
            let config = config_builder(&cli.model).build()?;
            let model = resolve_model(&config)?;
            let raw = tokio::fs::read(session)
                .await
                .with_context(|| format!("Failed to read {}", session.display()))?;
            let state: WizardSession = serde_json::from_slice(&raw)
                .with_context(|| format!("{} is not a wizard session", session.display()))?;

            match state {
                WizardSession::Fixed { ref answers } => {
                    let questions = generate_questions(model.as_ref(), answers, &config).await?;
                    let next = state.clone().with_questions(questions.clone())?;
                    write_json(session, &next)?;
                    if !cli.quiet {
                        eprintln!(
                            "{} {} follow-up questions written to {}",
                            cyan("◆"),
                            questions.len(),
                            session.display()
                        );
                        for (i, q) in questions.iter().enumerate() {
                            eprintln!("  {} {}", dim(&format!("[{i}]")), q);
                        }
                        eprintln!("Answer them under \"responses\" and run again.");
                    }
                }
                WizardSession::Dynamic { .. } => {
                    let template = generate_template(model.as_ref(), &state, &config).await?;
                    emit_template(&template, output.as_deref(), cli.quiet)?;
                }
            }
        }

        Command::Export {
            ref template,
            ref output,
            ref values,
        } => {
            let doc = ContractTemplate::load(template)?;
            let values: Option<HashMap<String, String>> = match values {
                Some(path) => {
                    let raw = std::fs::read(path)
                        .with_context(|| format!("Failed to read {}", path.display()))?;
                    Some(serde_json::from_slice(&raw).with_context(|| {
                        format!("{} is not a JSON object of strings", path.display())
                    })?)
                }
                None => None,
            };
            doc.save_doc(output, values.as_ref())?;
            if !cli.quiet {
                eprintln!("{} {}  →  {}", green("✔"), bold(&doc.title), output.display());
            }
        }

        Command::Placeholders { ref template, json } => {
            let doc = ContractTemplate::load(template)?;
            let mut counts: HashMap<&str, usize> = HashMap::new();
            for p in doc.placeholders() {
                *counts.entry(p.as_str()).or_default() += 1;
            }
            let unique = doc.unique_placeholders();

            if json {
                let rows: Vec<_> = unique
                    .iter()
                    .map(|p| {
                        serde_json::json!({
                            "token": p,
                            "label": placeholder_label(p),
                            "occurrences": counts.get(p).copied().unwrap_or(0),
                        })
                    })
                    .collect();
                println!("{}", serde_json::to_string_pretty(&rows)?);
            } else if unique.is_empty() {
                println!("{}", dim("no placeholders"));
            } else {
                for p in unique {
                    println!(
                        "{:<32} {:<28} {}",
                        p,
                        placeholder_label(p),
                        dim(&format!("×{}", counts.get(p).copied().unwrap_or(0)))
                    );
                }
            }
        }
    }

    Ok(())
}

/// Wrap a library error once, with the user-facing hint in the headline.
fn failure_report(action: &str, err: DraftError) -> anyhow::Error {
    let hint = err.hint().message();
    anyhow::Error::new(err).context(format!("{} {}", red(&format!("{action}.")), dim(hint)))
}

fn config_builder(args: &ModelArgs) -> edgequake_drafter::DraftConfigBuilder {
    let mut builder = DraftConfig::builder().max_attempts(args.max_attempts);
    if let Some(ref m) = args.model {
        builder = builder.model(m.clone());
    }
    if let Some(ref m) = args.vision_model {
        builder = builder.vision_model(m.clone());
    }
    if let Some(ref p) = args.provider {
        builder = builder.provider_name(p.clone());
    }
    if let Some(secs) = args.request_timeout {
        builder = builder.request_timeout_secs(secs);
    }
    builder
}

fn emit_template(template: &ContractTemplate, output: Option<&Path>, quiet: bool) -> Result<()> {
    match output {
        Some(path) => {
            template.save(path)?;
            if !quiet {
                eprintln!(
                    "{} {}  {} placeholders  →  {}",
                    green("✔"),
                    bold(&template.title),
                    template.unique_placeholders().len(),
                    path.display()
                );
            }
        }
        None => println!("{}", serde_json::to_string_pretty(template)?),
    }
    Ok(())
}

/// Atomic pretty-JSON write.
fn write_json<T: serde::Serialize>(path: &Path, value: &T) -> Result<()> {
    use std::io::Write;
    let json = serde_json::to_string_pretty(value)?;
    let dir = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    let mut tmp = tempfile::NamedTempFile::new_in(dir)
        .with_context(|| format!("Failed to create temp file in {}", dir.display()))?;
    tmp.write_all(json.as_bytes())?;
    tmp.write_all(b"\n")?;
    tmp.persist(path)
        .with_context(|| format!("Failed to write {}", path.display()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn failure_is_reported_once_with_hint() {
        let err = DraftError::FileNotFound {
            path: PathBuf::from("missing.pdf"),
        };
        let message = err.to_string();
        let report = format!("{:#}", failure_report("Import failed", err));

        assert_eq!(report.matches(&message).count(), 1);
        assert!(report.contains("Import failed."));
        assert!(report.contains("Check the input document"));
    }

    #[test]
    fn export_takes_template_output_and_values() {
        let cli = Cli::try_parse_from([
            "drafter", "export", "nda.json", "-o", "out.doc", "--values", "v.json",
        ])
        .unwrap();
        match cli.command {
            Command::Export {
                template,
                output,
                values,
            } => {
                assert_eq!(template, PathBuf::from("nda.json"));
                assert_eq!(output, PathBuf::from("out.doc"));
                assert_eq!(values, Some(PathBuf::from("v.json")));
            }
            other => panic!("unexpected command {other:?}"),
        }

        let cli = Cli::try_parse_from(["drafter", "export", "nda.json"]).unwrap();
        assert!(matches!(
            cli.command,
            Command::Export { ref output, .. } if output == &PathBuf::from("contract.doc")
        ));
    }
}
