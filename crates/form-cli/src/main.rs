use clap::{Parser, Subcommand, ValueEnum};
use component_form::{
    evaluate_expression, flatten_layout, generate_hierarchy, layout_schema, nest_layout,
    resolve_form,
};
use form_engine::{
    EngineConfig, FormEngine, FormInput, ValidationResult, parse_layout_set, render_text, validate,
};
use serde_json::{Map, Value};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tracing::debug;
use tracing_subscriber::EnvFilter;

type CliResult<T> = Result<T, Box<dyn std::error::Error>>;

#[derive(Parser)]
#[command(
    author,
    version,
    about = "Form layout and expression engine CLI",
    long_about = "Nests and flattens layouts, generates node hierarchies, evaluates expressions and runs full resolution cycles"
)]
struct Cli {
    /// Engine configuration JSON (debounce window, flag defaults).
    #[arg(long, global = true, value_name = "CONFIG")]
    config: Option<PathBuf>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Copy, Clone, Debug, ValueEnum)]
enum OutputFormat {
    Text,
    Json,
}

#[derive(Subcommand)]
enum Command {
    /// Move claimed components of one layout file under their parents.
    Nest {
        /// Path to a layout file (`{ "data": { "layout": [...] } }`).
        #[arg(long, value_name = "LAYOUT")]
        layout: PathBuf,
    },
    /// Turn a nested component list back into a flat layout.
    Flatten {
        /// Path to a JSON array of nested components.
        #[arg(long, value_name = "NESTED")]
        nested: PathBuf,
    },
    /// Generate the node hierarchy of a layout set for a data snapshot.
    Hierarchy {
        /// Path to the layout set (page name -> layout file).
        #[arg(long, value_name = "LAYOUTS")]
        layouts: PathBuf,
        /// Optional data model JSON.
        #[arg(long, value_name = "DATA")]
        data: Option<PathBuf>,
    },
    /// Evaluate a single expression.
    Eval {
        /// Expression JSON, e.g. '["equals", ["dataModel", "a"], 1]'.
        expr: String,
        /// Optional data sources JSON (`dataModel`, `applicationSettings`, ...).
        #[arg(long, value_name = "SOURCES")]
        sources: Option<PathBuf>,
        /// JSON value returned when evaluation fails.
        #[arg(long, value_name = "JSON")]
        default: Option<String>,
    },
    /// Run a full resolution cycle and report the result.
    Resolve {
        /// Path to the layout set (page name -> layout file).
        #[arg(long, value_name = "LAYOUTS")]
        layouts: PathBuf,
        /// Optional cycle input JSON (`dataModel`, `options`, `changed`, ...).
        #[arg(long, value_name = "INPUT")]
        input: Option<PathBuf>,
        #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
        format: OutputFormat,
        /// Exit with an error when validation fails.
        #[arg(long)]
        strict: bool,
    },
    /// Print the JSON schema of a layout file.
    Schema,
}

fn main() -> CliResult<()> {
    init_tracing();
    let cli = Cli::parse();
    let config = read_optional(cli.config.as_deref())?;
    match cli.command {
        Command::Nest { layout } => print_component_json(&nest_layout(&fs::read_to_string(layout)?)),
        Command::Flatten { nested } => {
            print_component_json(&flatten_layout(&fs::read_to_string(nested)?))
        }
        Command::Hierarchy { layouts, data } => print_component_json(&generate_hierarchy(
            &fs::read_to_string(layouts)?,
            &read_optional(data.as_deref())?,
        )),
        Command::Eval {
            expr,
            sources,
            default,
        } => run_eval(&expr, sources.as_deref(), default.as_deref()),
        Command::Resolve {
            layouts,
            input,
            format,
            strict,
        } => run_resolve(&layouts, input.as_deref(), &config, format, strict),
        Command::Schema => print_component_json(&layout_schema()),
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .with_target(false)
        .init();
}

fn read_optional(path: Option<&Path>) -> CliResult<String> {
    match path {
        Some(path) => Ok(fs::read_to_string(path)?),
        None => Ok(String::new()),
    }
}

fn parse_component_result(response: &str) -> CliResult<Value> {
    let value: Value = serde_json::from_str(response)?;
    if let Some(error) = value.get("error").and_then(Value::as_str) {
        Err(error.into())
    } else {
        Ok(value)
    }
}

fn print_component_json(response: &str) -> CliResult<()> {
    let value = parse_component_result(response)?;
    println!("{}", serde_json::to_string_pretty(&value)?);
    Ok(())
}

fn run_eval(expr: &str, sources: Option<&Path>, default: Option<&str>) -> CliResult<()> {
    let mut request = match sources {
        Some(path) => serde_json::from_str::<Map<String, Value>>(&fs::read_to_string(path)?)?,
        None => Map::new(),
    };
    if let Some(default) = default {
        request.insert("defaultValue".into(), serde_json::from_str(default)?);
    }
    let response = evaluate_expression(expr, &Value::Object(request).to_string());
    let value = parse_component_result(&response)?;
    println!("{}", serde_json::to_string(&value["value"])?);
    Ok(())
}

fn run_resolve(
    layouts_path: &Path,
    input_path: Option<&Path>,
    config_json: &str,
    format: OutputFormat,
    strict: bool,
) -> CliResult<()> {
    let layouts_json = fs::read_to_string(layouts_path)?;
    let input_json = read_optional(input_path)?;

    let validation = match format {
        OutputFormat::Json => {
            let value = parse_component_result(&resolve_form(&layouts_json, config_json, &input_json))?;
            println!("{}", serde_json::to_string_pretty(&value)?);
            serde_json::from_value::<ValidationResult>(value["validation"].clone())?
        }
        OutputFormat::Text => {
            let layouts = parse_layout_set(&layouts_json)?;
            let config = if config_json.trim().is_empty() {
                EngineConfig::default()
            } else {
                EngineConfig::from_json(config_json)?
            };
            let input: FormInput = if input_json.trim().is_empty() {
                FormInput::default()
            } else {
                serde_json::from_str(&input_json)?
            };
            let mut engine = FormEngine::new(&layouts, config);
            let form = engine.resolve(&input)?;
            println!("{}", render_text(&form));
            validate(&form)
        }
    };

    debug!(valid = validation.valid, errors = validation.errors.len(), "resolved form");
    if strict && !validation.valid {
        Err("validation failed".into())
    } else {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn component_errors_become_cli_errors() {
        assert!(parse_component_result(r#"{"error": "boom"}"#).is_err());
        assert_eq!(
            parse_component_result(r#"{"value": 1}"#).expect("ok"),
            json!({ "value": 1 })
        );
    }

    #[test]
    fn missing_optional_file_reads_as_empty() {
        assert_eq!(read_optional(None).expect("empty"), "");
    }
}
