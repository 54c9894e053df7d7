//! texbridge CLI - DOCX and LaTeX conversion tool

use std::fs;
use std::path::{Path, PathBuf};

use clap::{Args, Parser, Subcommand, ValueEnum};
use colored::Colorize;
use indicatif::{ProgressBar, ProgressStyle};

use texbridge::{
    ConvertOptions, ConvertOutput, Converter, DocumentClass, FontSize, Format, JsonFormat,
    LineSpacing, Margins, ParseOptions, Warning,
};

#[derive(Parser)]
#[command(name = "texbridge")]
#[command(author = "iyulab")]
#[command(version)]
#[command(about = "Convert documents between DOCX and LaTeX", long_about = None)]
struct Cli {
    /// Input file (.docx, .tex or .latex)
    #[arg(value_name = "FILE")]
    input: Option<PathBuf>,

    /// Output file (defaults to the input name with the other extension)
    #[arg(value_name = "OUTPUT")]
    output: Option<PathBuf>,

    /// Log decoder and encoder decisions
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Convert one or more files
    Convert {
        /// Input files
        #[arg(value_name = "FILE", required = true)]
        inputs: Vec<PathBuf>,

        /// Target format (defaults to the other format of each input)
        #[arg(short, long, value_enum)]
        to: Option<Target>,

        /// Output file (single input only)
        #[arg(short, long, value_name = "FILE", conflicts_with = "output_dir")]
        output: Option<PathBuf>,

        /// Directory for output files
        #[arg(short = 'd', long, value_name = "DIR")]
        output_dir: Option<PathBuf>,

        #[command(flatten)]
        settings: Settings,
    },

    /// Print the decoded document model as JSON
    Inspect {
        /// Input file
        #[arg(value_name = "FILE")]
        input: PathBuf,

        /// Output file (stdout if not specified)
        #[arg(short, long, value_name = "FILE")]
        output: Option<PathBuf>,

        /// Output compact JSON
        #[arg(long)]
        compact: bool,

        /// Continue past malformed input
        #[arg(long)]
        lenient: bool,
    },

    /// Show document information
    Info {
        /// Input file
        #[arg(value_name = "FILE")]
        input: PathBuf,
    },

    /// Show version information
    Version,
}

/// Document settings shared by conversions.
#[derive(Args, Default)]
struct Settings {
    /// JSON file with conversion options; flags override it
    #[arg(long, value_name = "JSON")]
    config: Option<PathBuf>,

    /// Continue past malformed input, reporting problems as warnings
    #[arg(long)]
    lenient: bool,

    /// LaTeX document class
    #[arg(long, value_enum)]
    class: Option<Class>,

    /// Base font size in points (10, 11 or 12)
    #[arg(long, value_name = "PT", value_parser = parse_font_size)]
    font_size: Option<FontSize>,

    /// Line spacing (single, onehalf, double)
    #[arg(long, value_name = "SPACING", value_parser = parse_line_spacing)]
    line_spacing: Option<LineSpacing>,

    /// Margin on all sides in inches
    #[arg(long, value_name = "INCHES")]
    margin: Option<f32>,

    /// DOCX body font
    #[arg(long, value_name = "NAME")]
    font: Option<String>,

    /// Extra LaTeX package (repeatable)
    #[arg(long = "package", value_name = "NAME")]
    packages: Vec<String>,

    /// Emit a LaTeX body without preamble
    #[arg(long)]
    fragment: bool,

    /// Heading for the bibliography
    #[arg(long, value_name = "TITLE")]
    bibliography_title: Option<String>,

    /// BibTeX style for the bibliography; loads natbib
    #[arg(long, value_name = "STYLE")]
    bibliography_style: Option<String>,

    /// Keep reference lists as plain paragraphs
    #[arg(long)]
    no_bibliography: bool,
}

#[derive(Copy, Clone, PartialEq, Eq, ValueEnum)]
enum Target {
    /// Word document
    Docx,
    /// LaTeX source
    #[value(alias = "tex")]
    Latex,
}

impl From<Target> for Format {
    fn from(target: Target) -> Self {
        match target {
            Target::Docx => Format::Docx,
            Target::Latex => Format::Latex,
        }
    }
}

#[derive(Copy, Clone, PartialEq, Eq, ValueEnum)]
enum Class {
    /// article
    Article,
    /// report
    Report,
    /// book
    Book,
}

impl From<Class> for DocumentClass {
    fn from(class: Class) -> Self {
        match class {
            Class::Article => DocumentClass::Article,
            Class::Report => DocumentClass::Report,
            Class::Book => DocumentClass::Book,
        }
    }
}

fn parse_font_size(s: &str) -> Result<FontSize, String> {
    FontSize::parse(s).ok_or_else(|| format!("unsupported font size `{}` (use 10, 11 or 12)", s))
}

fn parse_line_spacing(s: &str) -> Result<LineSpacing, String> {
    LineSpacing::parse(s)
        .ok_or_else(|| format!("unsupported line spacing `{}` (use single, onehalf or double)", s))
}

type CliResult<T> = Result<T, Box<dyn std::error::Error>>;

fn main() {
    let cli = Cli::parse();

    let level = if cli.verbose { "debug" } else { "error" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();

    let result = match cli.command {
        Some(Commands::Convert {
            inputs,
            to,
            output,
            output_dir,
            settings,
        }) => cmd_convert(
            &inputs,
            to.map(Format::from),
            output.as_deref(),
            output_dir.as_deref(),
            &settings,
        ),
        Some(Commands::Inspect {
            input,
            output,
            compact,
            lenient,
        }) => cmd_inspect(&input, output.as_deref(), compact, lenient),
        Some(Commands::Info { input }) => cmd_info(&input),
        Some(Commands::Version) => {
            cmd_version();
            Ok(())
        }
        None => {
            // Default behavior: convert if input is provided
            if let Some(input) = cli.input {
                cmd_convert(
                    std::slice::from_ref(&input),
                    None,
                    cli.output.as_deref(),
                    None,
                    &Settings::default(),
                )
            } else {
                println!("{}", "Usage: texbridge <FILE> [OUTPUT]".yellow());
                println!("       texbridge --help for more information");
                Ok(())
            }
        }
    };

    if let Err(e) = result {
        eprintln!("{}: {}", "Error".red().bold(), e);
        std::process::exit(1);
    }
}

/// Build conversion options from the config file and flags.
fn build_options(settings: &Settings) -> CliResult<ConvertOptions> {
    let mut options: ConvertOptions = match &settings.config {
        Some(path) => {
            let text = fs::read_to_string(path)
                .map_err(|e| format!("cannot read config {}: {}", path.display(), e))?;
            serde_json::from_str(&text)
                .map_err(|e| format!("invalid config {}: {}", path.display(), e))?
        }
        None => ConvertOptions::default(),
    };

    if settings.lenient {
        options.parse = options.parse.lenient();
    }
    if settings.no_bibliography {
        options.parse = options.parse.with_bibliography(false);
    }

    let render = &mut options.render;
    if let Some(class) = settings.class {
        render.document_class = class.into();
    }
    if let Some(size) = settings.font_size {
        render.font_size = size;
    }
    if let Some(spacing) = settings.line_spacing {
        render.line_spacing = spacing;
    }
    if let Some(margin) = settings.margin {
        render.margins = Margins::uniform(margin);
    }
    if let Some(font) = &settings.font {
        render.font_name = font.clone();
    }
    render.custom_packages.extend(settings.packages.iter().cloned());
    if settings.fragment {
        render.standalone = false;
    }
    if let Some(title) = &settings.bibliography_title {
        render.bibliography_title = title.clone();
    }
    if let Some(style) = &settings.bibliography_style {
        render.bibliography_style = Some(style.clone());
    }

    options.validate()?;
    log::debug!("conversion options: {:?}", options);
    Ok(options)
}

/// Output path for `input` converted to `target`.
fn output_path(input: &Path, target: Format, dir: Option<&Path>) -> PathBuf {
    let name = input.with_extension(target.default_extension());
    match (dir, name.file_name()) {
        (Some(dir), Some(file)) => dir.join(file),
        _ => name,
    }
}

fn cmd_convert(
    inputs: &[PathBuf],
    to: Option<Format>,
    output: Option<&Path>,
    output_dir: Option<&Path>,
    settings: &Settings,
) -> CliResult<()> {
    if output.is_some() && inputs.len() > 1 {
        return Err("--output takes a single input; use --output-dir for several".into());
    }
    for input in inputs {
        let format = Format::from_path(input)?;
        if format == Format::Latex && texbridge::detect::looks_like_docx_file(input) {
            eprintln!(
                "{} {} looks like a DOCX package despite its extension",
                "warning:".yellow().bold(),
                input.display()
            );
        }
    }

    let converter = Converter::with_options(build_options(settings)?);
    if let Some(dir) = output_dir {
        fs::create_dir_all(dir)?;
    }

    let pb = ProgressBar::new(inputs.len() as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{bar:40.cyan/blue}] {pos}/{len} {msg}")?
            .progress_chars("#>-"),
    );
    pb.set_message("Converting...");

    let results = converter.convert_files(inputs, to);
    let mut failed = 0;
    for (input, result) in inputs.iter().zip(results) {
        pb.inc(1);
        let converted = match result {
            Ok(converted) => converted,
            Err(e) => {
                pb.suspend(|| {
                    eprintln!("{} {}: {}", "Failed".red().bold(), input.display(), e)
                });
                failed += 1;
                continue;
            }
        };

        let path = match output {
            Some(path) => path.to_path_buf(),
            None => output_path(input, converted.format, output_dir),
        };
        let written = pb.suspend(|| write_output(&path, &converted))?;
        pb.suspend(|| {
            println!("{} {}", "Saved to".green(), path.display());
            for image in &written {
                println!("  {} {}", "└─".dimmed(), image.display());
            }
            print_warnings(&converted.warnings);
        });
    }
    pb.finish_and_clear();

    if failed > 0 {
        return Err(format!("{} of {} conversions failed", failed, inputs.len()).into());
    }
    Ok(())
}

/// Write the converted document, and its images next to a LaTeX output.
fn write_output(path: &Path, converted: &ConvertOutput) -> CliResult<Vec<PathBuf>> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }
    fs::write(path, &converted.content)?;
    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    Ok(converted.write_resources(dir)?)
}

fn print_warnings(warnings: &[Warning]) {
    if warnings.is_empty() {
        return;
    }
    println!("{} {}", warnings.len().to_string().yellow().bold(), "warnings:".yellow());
    for warning in warnings {
        println!("  {} {}", format!("[{}]", warning.kind).yellow(), warning.message);
    }
}

fn decode_input(input: &Path, parse: ParseOptions) -> CliResult<(texbridge::Document, Vec<Warning>)> {
    let format = Format::from_path(input)?;
    let data = fs::read(input)?;
    let converter = Converter::with_options(ConvertOptions::new().with_parse_options(parse));
    let mut ctx = texbridge::Context::new();
    let doc = converter.decode(&data, format, &mut ctx)?;
    doc.validate()?;
    Ok((doc, ctx.into_warnings()))
}

fn cmd_inspect(input: &Path, output: Option<&Path>, compact: bool, lenient: bool) -> CliResult<()> {
    let mut parse = ParseOptions::new();
    if lenient {
        parse = parse.lenient();
    }
    let (doc, warnings) = decode_input(input, parse)?;

    let format = if compact {
        JsonFormat::Compact
    } else {
        JsonFormat::Pretty
    };
    let json = texbridge::render::to_json(&doc, format)?;

    if let Some(path) = output {
        fs::write(path, &json)?;
        println!("{} {}", "Saved to".green(), path.display());
        print_warnings(&warnings);
    } else {
        println!("{}", json);
        for warning in &warnings {
            eprintln!("{} {}", "warning:".yellow().bold(), warning);
        }
    }

    Ok(())
}

fn cmd_info(input: &Path) -> CliResult<()> {
    // Lenient so metadata still shows for damaged input.
    let (doc, warnings) = decode_input(input, ParseOptions::new().lenient())?;
    let format = Format::from_path(input)?;
    let stats = texbridge::DocumentStats::collect(&doc);

    println!("{}", "Document Information".cyan().bold());
    println!("{}", "─".repeat(40).dimmed());

    println!("{}: {}", "File".bold(), input.display());
    println!("{}: {}", "Format".bold(), format);

    if let Some(ref title) = doc.metadata.title {
        println!("{}: {}", "Title".bold(), title);
    }
    if let Some(ref author) = doc.metadata.author {
        println!("{}: {}", "Author".bold(), author);
    }
    if let Some(ref date) = doc.metadata.date {
        println!("{}: {}", "Date".bold(), date);
    }
    if let Some(ref created) = doc.metadata.created {
        println!("{}: {}", "Created".bold(), created);
    }
    if let Some(ref modified) = doc.metadata.modified {
        println!("{}: {}", "Modified".bold(), modified);
    }

    println!();
    println!("{}", "Content Statistics".cyan().bold());
    println!("{}", "─".repeat(40).dimmed());

    println!("{}: {}", "Headings".bold(), stats.heading_count);
    println!("{}: {}", "Paragraphs".bold(), stats.paragraph_count);
    println!("{}: {}", "Tables".bold(), stats.table_count);
    println!("{}: {}", "Images".bold(), stats.image_count);
    println!("{}: {}", "Embedded images".bold(), doc.resources.len());
    println!("{}: {}", "Citations".bold(), stats.citation_count);
    if stats.dangling_citation_count > 0 {
        println!(
            "{}: {}",
            "Unresolved citations".bold(),
            stats.dangling_citation_count.to_string().yellow()
        );
    }
    println!("{}: {}", "References".bold(), stats.bibliography_count);
    println!("{}: {}", "Words".bold(), stats.word_count);
    println!("{}: {}", "Characters".bold(), stats.char_count);

    if !warnings.is_empty() {
        println!();
        print_warnings(&warnings);
    }

    Ok(())
}

fn cmd_version() {
    println!("{} {}", "texbridge".cyan().bold(), env!("CARGO_PKG_VERSION"));
    println!("DOCX and LaTeX conversion tool");
    println!();
    println!("License: MIT");
}
