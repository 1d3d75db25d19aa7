use anyhow::Context;
use clap::{Parser, Subcommand, ValueEnum};
use cmodel_parser::{AnalysisOutput, Analyzer};
use cmodel_types::TypeRecord;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "cmodel")]
#[command(about = "Static analyzer for C types and global data", long_about = None)]
#[command(version)]
struct Cli {
    /* Log filter, e.g. "debug" or "cmodel_parser=debug" */
    #[arg(long = "log-level", global = true, default_value = "warn")]
    log_level: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /* Parse the type declarations of a header file */
    Parse {
        /* Header file to parse */
        header: PathBuf,

        /* Output file (stdout when omitted) */
        #[arg(short = 'o', long = "output")]
        output: Option<PathBuf>,
    },

    /* Analyze a source file: types plus file-scope variables */
    Analyze {
        /* C source file to analyze */
        source: PathBuf,

        /* Header files whose types the source depends on */
        #[arg(long = "header", value_name = "FILE")]
        headers: Vec<PathBuf>,

        /* Output format */
        #[arg(long = "format", value_enum, default_value = "json")]
        format: OutputFormat,

        /* Output file (stdout when omitted) */
        #[arg(short = 'o', long = "output")]
        output: Option<PathBuf>,
    },
}

#[derive(Copy, Clone, PartialEq, Eq, ValueEnum, Debug)]
enum OutputFormat {
    /* Human-readable report */
    Text,
    /* Full JSON document */
    Json,
    /* Reduced per-variable JSON */
    #[value(name = "json-simple")]
    JsonSimple,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&cli.log_level)),
        )
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Parse { header, output } => {
            let mut analyzer = Analyzer::new();
            let snapshot = analyzer
                .parse_header_file(&header)
                .with_context(|| format!("failed to parse {}", header.display()))?;
            let rendered = serde_json::to_string_pretty(&snapshot)?;
            write_output(output.as_deref(), &rendered)?;
            eprintln!(
                "{}: {} types, {} macros",
                header.display(),
                snapshot.types.len(),
                snapshot.macro_definitions.len()
            );
        }

        Commands::Analyze {
            source,
            headers,
            format,
            output,
        } => {
            let mut analyzer = Analyzer::new();
            for header in &headers {
                analyzer
                    .parse_header_file(header)
                    .with_context(|| format!("failed to parse header {}", header.display()))?;
            }
            let result = analyzer
                .analyze_file(&source)
                .with_context(|| format!("failed to analyze {}", source.display()))?;
            let rendered = match format {
                OutputFormat::Json => serde_json::to_string_pretty(&result)?,
                OutputFormat::JsonSimple => serde_json::to_string_pretty(&result.simplified())?,
                OutputFormat::Text => render_text(&result),
            };
            write_output(output.as_deref(), &rendered)?;
        }
    }

    Ok(())
}

fn write_output(path: Option<&std::path::Path>, content: &str) -> anyhow::Result<()> {
    match path {
        Some(path) => {
            std::fs::write(path, content)
                .with_context(|| format!("failed to write {}", path.display()))?;
            eprintln!("wrote {}", path.display());
        }
        None => println!("{}", content),
    }
    Ok(())
}

/* Human-readable report of the analysis result. */
fn render_text(result: &AnalysisOutput) -> String {
    let mut out = String::new();
    out.push_str("Translation Unit Analysis\n");
    out.push_str("=========================\n\n");

    for (title, records) in [
        ("Structs", &result.types.structs),
        ("Unions", &result.types.unions),
        ("Enums", &result.types.enums),
        ("Typedefs", &result.types.typedefs),
    ] {
        out.push_str(&format!("{} ({})\n", title, records.len()));
        for record in records {
            render_type(&mut out, record);
        }
        out.push('\n');
    }

    for (title, records) in [
        ("Variables", &result.variables.variables),
        ("Pointer variables", &result.variables.pointer_vars),
        ("Array variables", &result.variables.array_vars),
        ("Struct variables", &result.variables.struct_vars),
    ] {
        out.push_str(&format!("{} ({})\n", title, records.len()));
        for var in records {
            let dims: String = var
                .array_size
                .iter()
                .map(|d| format!("[{}]", serde_json::to_string(d).unwrap_or_default()))
                .collect();
            let value = match &var.parsed_value {
                Some(value) => serde_json::to_string(value).unwrap_or_default(),
                None => "<uninitialized>".to_string(),
            };
            out.push_str(&format!(
                "  {} {}{} = {}\n",
                var.type_name, var.name, dims, value
            ));
        }
        out.push('\n');
    }

    out
}

fn render_type(out: &mut String, record: &TypeRecord) {
    match record {
        TypeRecord::Struct(c) | TypeRecord::Union(c) => {
            let size = c
                .size
                .map(|s| format!(" ({} bytes)", s))
                .unwrap_or_default();
            out.push_str(&format!("  {}{}\n", c.name, size));
            for field in &c.fields {
                out.push_str(&format!("    - {}: {}\n", field.name, field.type_name));
            }
        }
        TypeRecord::Enum(e) => {
            out.push_str(&format!("  {}\n", e.name));
            for (name, value) in &e.values {
                match value {
                    cmodel_types::EnumValue::Int(v) => {
                        out.push_str(&format!("    - {} = {}\n", name, v));
                    }
                    cmodel_types::EnumValue::Expr(text) => {
                        out.push_str(&format!("    - {} = {}\n", name, text));
                    }
                }
            }
        }
        TypeRecord::Typedef(t) => {
            out.push_str(&format!("  {} -> {}\n", t.name, t.type_name));
        }
        TypeRecord::Basic(b) => {
            out.push_str(&format!("  {} ({} bytes)\n", b.name, b.size));
        }
    }
}
