//! `covergen`: stream a cover letter from the generator server to the terminal.

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::time::Duration;

use clap::Parser;
use covergen_stream::observability::init_observability;
use covergen_stream::prelude::*;

#[derive(Debug, Parser)]
#[command(name = "covergen", about = "Generate a cover letter from a job posting")]
struct Args {
    /// Job posting or client message.
    #[arg(long, conflicts_with = "text_file", required_unless_present = "text_file")]
    text: Option<String>,
    /// Read the job posting from a file.
    #[arg(long, value_name = "PATH")]
    text_file: Option<PathBuf>,
    /// Reference URL (repeatable).
    #[arg(long = "url", value_name = "URL")]
    urls: Vec<String>,
    /// Selected category tag (repeatable).
    #[arg(long = "category", value_name = "TAG")]
    categories: Vec<String>,
    /// File sent base64-encoded alongside the request.
    #[arg(long, value_name = "PATH")]
    attach: Option<PathBuf>,
    /// Tone hint, e.g. `Standard` or `Creative`.
    #[arg(long)]
    mode: Option<String>,
    /// Overrides `COVERGEN_ENDPOINT`.
    #[arg(long)]
    endpoint: Option<String>,
    /// Record delimiter: `newline` or `blank-line`.
    #[arg(long)]
    delimiter: Option<RecordDelimiter>,
    /// Abort the run after this many seconds.
    #[arg(long)]
    timeout_secs: Option<u64>,
    /// Print the final result as JSON instead of plain text.
    #[arg(long)]
    json: bool,
    /// Print only the letter, without the analysis breakdown.
    #[arg(long, conflicts_with = "json")]
    letter_only: bool,
}

#[derive(Debug, thiserror::Error)]
enum CliError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error(transparent)]
    Client(#[from] ClientError),
    #[error("failed to encode result: {0}")]
    Encode(#[from] serde_json::Error),
}

fn read_text(path: &Path) -> Result<String, CliError> {
    std::fs::read_to_string(path).map_err(|source| CliError::Read {
        path: path.to_path_buf(),
        source,
    })
}

fn read_attachment(path: &Path) -> Result<(String, Vec<u8>), CliError> {
    let bytes = std::fs::read(path).map_err(|source| CliError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    let filename = path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| "attachment".to_string());
    Ok((filename, bytes))
}

fn push_heading(out: &mut String, title: &str) {
    if !out.is_empty() {
        out.push('\n');
    }
    out.push_str("== ");
    out.push_str(title);
    out.push_str(" ==\n");
}

fn push_text(out: &mut String, title: &str, text: Option<&str>) {
    let Some(text) = text.map(str::trim).filter(|t| !t.is_empty()) else {
        return;
    };
    push_heading(out, title);
    out.push_str(text);
    out.push('\n');
}

fn push_list(out: &mut String, title: &str, items: &[String]) {
    if items.is_empty() {
        return;
    }
    push_heading(out, title);
    for item in items {
        out.push_str("- ");
        out.push_str(item.trim());
        out.push('\n');
    }
}

fn push_section(out: &mut String, title: &str, section: Option<&Section>) {
    let groups = section.map(Section::groups).unwrap_or_default();
    if groups.is_empty() {
        return;
    }
    push_heading(out, title);
    for (label, items) in groups {
        let indent = match label {
            Some(label) => {
                out.push_str(label);
                out.push_str(":\n");
                "  "
            }
            None => "",
        };
        for item in items {
            out.push_str(indent);
            out.push_str("- ");
            out.push_str(item.trim());
            out.push('\n');
        }
    }
}

/// Renders the analysis as titled plain-text sections. Empty sections are
/// left out.
fn render_breakdown(analysis: &Analysis) -> String {
    let mut out = String::new();
    push_text(&mut out, "Main objective", analysis.main_objective.as_deref());
    push_text(&mut out, "Project type", analysis.project_type.as_deref());
    push_section(&mut out, "Experience", analysis.experience_summary.as_ref());
    push_section(&mut out, "Required technologies", analysis.required_technologies.as_ref());
    push_list(&mut out, "Non-technical requirements", &analysis.non_technical_requirements);
    push_list(&mut out, "Unclear points", &analysis.clarifying_questions);
    push_section(&mut out, "Recommendations", analysis.recommendations.as_ref());
    push_section(&mut out, "Technical questions", analysis.technical_questions.as_ref());
    push_list(&mut out, "Non-technical questions", &analysis.non_technical_questions);
    push_list(&mut out, "Reference websites", &analysis.reference_websites);
    out
}

fn render_usage(usage: &TokenUsage) -> String {
    format!(
        "tokens: input {}, output {}, total {}",
        usage.input, usage.output, usage.total
    )
}

fn build_config(args: &Args) -> Result<ClientConfig, CliError> {
    let mut config = ClientConfig::from_env()?;
    if let Some(endpoint) = &args.endpoint {
        config = config.endpoint(endpoint.clone());
    }
    if let Some(delimiter) = args.delimiter {
        config = config.delimiter(delimiter);
    }
    Ok(config)
}

async fn run(args: Args) -> Result<(), CliError> {
    let text = match (&args.text, &args.text_file) {
        (Some(text), _) => text.clone(),
        (None, Some(path)) => read_text(path)?,
        (None, None) => String::new(),
    };

    let client = Client::builder().config(build_config(&args)?).build()?;
    let session = client.session(SessionConfig::named("cli"));

    let mut builder = session
        .generate(text)
        .context_urls(args.urls.iter().cloned());
    for category in &args.categories {
        builder = builder.category(category.clone());
    }
    if let Some(mode) = &args.mode {
        builder = builder.generation_mode(mode.clone());
    }
    if let Some(path) = &args.attach {
        let (filename, bytes) = read_attachment(path)?;
        builder = builder.attach_file(filename, &bytes);
    }
    if let Some(secs) = args.timeout_secs {
        builder = builder.timeout(Duration::from_secs(secs));
    }

    let mut stream = builder.start_stream().await?;
    tracing::info!(run_id = %stream.run_id(), session_id = %stream.session_id(), "generation started");
    while let Some(event) = stream.next_event().await {
        match event {
            GenerationEvent::Progress { percent, message, .. } => {
                eprintln!("[{percent:>3}%] {message}");
            }
            GenerationEvent::Usage { usage, .. } => {
                tracing::debug!(input = usage.input, output = usage.output, total = usage.total, "token usage");
            }
            _ => {}
        }
    }
    let result = stream.finish().await?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&result)?);
        return Ok(());
    }
    if let Some(usage) = &result.usage {
        eprintln!("{}", render_usage(usage));
    }
    let breakdown = result
        .analysis
        .as_ref()
        .filter(|_| !args.letter_only)
        .map(render_breakdown)
        .unwrap_or_default();
    if !breakdown.is_empty() {
        println!("{breakdown}");
    }
    println!("{}", result.letter.text);
    Ok(())
}

#[tokio::main]
async fn main() -> ExitCode {
    dotenvy::dotenv().ok();
    init_observability();

    match run(Args::parse()).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            tracing::error!(error = %err, "covergen failed");
            eprintln!("error: {err}");
            ExitCode::FAILURE
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write as _;

    #[test]
    fn reads_text_file() {
        let mut file = tempfile::NamedTempFile::new().expect("tempfile");
        write!(file, "Need a Shopify theme").expect("write");
        assert_eq!(read_text(file.path()).expect("read"), "Need a Shopify theme");
    }

    #[test]
    fn attachment_uses_file_name() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("brief.pdf");
        std::fs::write(&path, b"%PDF").expect("write");
        let (name, bytes) = read_attachment(&path).expect("read");
        assert_eq!(name, "brief.pdf");
        assert_eq!(bytes, b"%PDF");
    }

    #[test]
    fn missing_file_reports_path() {
        let err = read_text(Path::new("/definitely/not/here.txt")).expect_err("missing");
        assert!(err.to_string().contains("/definitely/not/here.txt"));
    }

    #[test]
    fn flags_override_environment() {
        let args = Args::parse_from([
            "covergen",
            "--text",
            "brief",
            "--endpoint",
            "http://127.0.0.1:9999/gen",
            "--delimiter",
            "newline",
        ]);
        let config = build_config(&args).expect("config");
        assert_eq!(config.endpoint, "http://127.0.0.1:9999/gen");
        assert_eq!(config.delimiter, RecordDelimiter::Newline);
    }

    #[test]
    fn breakdown_renders_grouped_and_flat_sections() {
        let analysis = Analysis::from_value(&serde_json::json!({
            "main_objective": "Launch a soap shop",
            "required_technologies": {"CMS": ["WordPress", "WooCommerce"]},
            "recommendations": ["Yoast SEO"],
            "clarifying_questions": ["Budget?"],
            "technical_questions": null
        }))
        .expect("analysis");

        assert_eq!(
            render_breakdown(&analysis),
            "== Main objective ==\nLaunch a soap shop\n\
             \n== Required technologies ==\nCMS:\n  - WordPress\n  - WooCommerce\n\
             \n== Unclear points ==\n- Budget?\n\
             \n== Recommendations ==\n- Yoast SEO\n"
        );
    }

    #[test]
    fn empty_analysis_renders_nothing() {
        assert_eq!(render_breakdown(&Analysis::default()), "");
    }

    #[test]
    fn usage_line_lists_all_counts() {
        let usage = TokenUsage {
            input: 12,
            output: 30,
            total: 42,
        };
        assert_eq!(render_usage(&usage), "tokens: input 12, output 30, total 42");
    }

    #[test]
    fn text_and_text_file_conflict() {
        let parsed = Args::try_parse_from(["covergen", "--text", "a", "--text-file", "b.txt"]);
        assert!(parsed.is_err());
        assert!(Args::try_parse_from(["covergen"]).is_err());
    }
}
