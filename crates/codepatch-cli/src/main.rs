use anyhow::{bail, Context as AnyhowContext, Result};
use clap::{Args, Parser, Subcommand};
use codepatch_core::config::ParseContext;
use codepatch_core::{
    CodepatchConfig, CodepatchError, CodepatchResult, EditPipeline, FsWorkspace, LanguageModel,
    ResponseParser,
};
use serde::Serialize;
use std::fs;
use std::io::{self, BufRead, Read, Write};
use std::path::PathBuf;
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

fn print_stdout(text: &str) -> Result<()> {
    let mut stdout = io::stdout().lock();
    if let Err(err) = stdout
        .write_all(text.as_bytes())
        .and_then(|_| stdout.write_all(b"\n"))
        .and_then(|_| stdout.flush())
    {
        if err.kind() == io::ErrorKind::BrokenPipe {
            return Ok(());
        }
        return Err(err.into());
    }
    Ok(())
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    print_stdout(&serde_json::to_string_pretty(value)?)
}

#[derive(Parser)]
#[command(name = "codepatch")]
#[command(about = "Turn an edit instruction into validated file edits", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Workspace root
    #[arg(long, global = true, default_value = ".")]
    root: PathBuf,

    /// JSON configuration file
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Build the project index and print its statistics
    Index,

    /// List the files an instruction resolves to
    Resolve(InstructionArgs),

    /// Print the prompts that would be sent to the model
    Compose(ComposeArgs),

    /// Parse a saved model reply
    Parse(ParseArgs),

    /// Run the full pipeline with a saved model reply
    Apply(ApplyArgs),
}

#[derive(Args)]
struct InstructionArgs {
    /// Natural-language edit instruction
    instruction: String,
}

#[derive(Args)]
struct ComposeArgs {
    instruction: String,

    /// Print the whole composed context as JSON
    #[arg(long)]
    json: bool,
}

#[derive(Args)]
struct ParseArgs {
    /// Reply file, or `-` for stdin
    response: PathBuf,

    /// Instruction the reply answers
    #[arg(long, default_value = "")]
    instruction: String,

    /// Language the reply is expected to be in
    #[arg(long)]
    language: Option<String>,
}

#[derive(Args)]
struct ApplyArgs {
    instruction: String,

    /// Reply file standing in for the model, or `-` for stdin
    #[arg(long)]
    response: PathBuf,

    /// Apply without asking for confirmation
    #[arg(long)]
    yes: bool,
}

/// Model stand-in that answers every request with a saved reply.
struct ReplyFile {
    path: PathBuf,
}

impl LanguageModel for ReplyFile {
    fn complete(&self, _system_prompt: &str, user_prompt: &str) -> CodepatchResult<String> {
        debug!("Prompt is {} bytes", user_prompt.len());
        read_reply(&self.path).map_err(|e| CodepatchError::Model(format!("{e:#}")))
    }
}

fn read_reply(path: &PathBuf) -> Result<String> {
    if path.as_os_str() == "-" {
        let mut text = String::new();
        io::stdin()
            .read_to_string(&mut text)
            .context("reading reply from stdin")?;
        return Ok(text);
    }
    fs::read_to_string(path).with_context(|| format!("reading reply {}", path.display()))
}

fn ask(message: &str) -> bool {
    eprint!("{message} [y/N] ");
    let _ = io::stderr().flush();
    let mut answer = String::new();
    if io::stdin().lock().read_line(&mut answer).is_err() {
        return false;
    }
    matches!(answer.trim().to_ascii_lowercase().as_str(), "y" | "yes")
}

fn load_config(path: Option<&PathBuf>) -> Result<CodepatchConfig> {
    let Some(path) = path else {
        return Ok(CodepatchConfig::default());
    };
    let text = fs::read_to_string(path).with_context(|| format!("reading config {}", path.display()))?;
    CodepatchConfig::from_json(&text).with_context(|| format!("parsing config {}", path.display()))
}

fn init_tracing(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("codepatch_core=debug,codepatch=debug")
    } else {
        EnvFilter::try_from_env("CODEPATCH_LOG").unwrap_or_else(|_| EnvFilter::new("warn"))
    };
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .with_target(false)
        .try_init();
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let root = cli
        .root
        .canonicalize()
        .with_context(|| format!("workspace root {}", cli.root.display()))?;
    let config = load_config(cli.config.as_ref())?;

    match cli.command {
        Commands::Index => {
            let pipeline = EditPipeline::new(Box::new(FsWorkspace::new(&root)), config);
            pipeline.build_index();
            print_json(&pipeline.stats())
        }
        Commands::Resolve(args) => {
            let pipeline = EditPipeline::new(Box::new(FsWorkspace::new(&root)), config);
            let matches = pipeline.resolve(&args.instruction);
            if matches.is_empty() {
                bail!("No relevant files found for this instruction");
            }
            for m in &matches {
                print_stdout(&format!(
                    "{:.2}  {:<8}  {}  ({})",
                    m.score,
                    m.match_type.as_str(),
                    m.file.relative_path,
                    m.reason
                ))?;
            }
            Ok(())
        }
        Commands::Compose(args) => {
            let pipeline = EditPipeline::new(Box::new(FsWorkspace::new(&root)), config);
            let matches = pipeline.resolve(&args.instruction);
            let context = pipeline.compose(&args.instruction, &matches);
            if args.json {
                return print_json(&context);
            }
            print_stdout(&context.system_prompt)?;
            print_stdout("")?;
            print_stdout(&context.user_prompt)?;
            info!("~{} tokens", context.estimated_tokens);
            Ok(())
        }
        Commands::Parse(args) => {
            let reply = read_reply(&args.response)?;
            let context = ParseContext {
                expected_language: args.language,
                expect_multi_file: false,
                instruction: args.instruction,
            };
            print_json(&ResponseParser.parse(&reply, &context))
        }
        Commands::Apply(args) => {
            if args.response.as_os_str() == "-" && !args.yes {
                bail!("--response - reads stdin; pass --yes since confirmation also needs stdin");
            }
            let mut config = config;
            if args.yes {
                config.apply.require_confirmation = false;
            }
            let host = FsWorkspace::new(&root).with_confirmer(ask);
            let pipeline = EditPipeline::new(Box::new(host), config);
            let model = ReplyFile {
                path: args.response,
            };
            let outcome = pipeline.run(&args.instruction, &model);
            print_json(&outcome)?;
            for entry in pipeline.history().entries() {
                eprintln!(
                    "{} {} ({}, confidence {:.2})",
                    if entry.success { "ok  " } else { "fail" },
                    entry.file_path,
                    entry.edit_kind.as_str(),
                    entry.confidence
                );
            }
            if !outcome.success {
                bail!(outcome.message);
            }
            Ok(())
        }
    }
}
