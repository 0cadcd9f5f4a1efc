//! dasc CLI - structuring and annotation of converted scientific reports

use std::fs;
use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};
use colored::Colorize;
use indicatif::{ProgressBar, ProgressStyle};

use dasc::annotate::{annotate, recognize_bibliography, PhraseHits};
use dasc::convert::{ConvertOptions, ConverterRegistry};
use dasc::structure::{extract_structure, FootnoteOptions, SectionTable};
use dasc::style::{extract_styles_into_head, normalize, StyleTable};
use dasc::tidy::tidy_document;
use dasc::{
    detect_format_from_path, parse_file, read_term_file, AnnotateOptions, BiblioOptions,
    InputFormat, PdfAnnotateOptions, PipelineContext, PipelineOptions, RuleSet,
    StructureOptions, TidyOptions,
};

#[derive(Parser)]
#[command(name = "dasc")]
#[command(author = "iyulab")]
#[command(version)]
#[command(about = "Tidy, structure and annotate pdf-to-html output and PDFs", long_about = None)]
struct Cli {
    /// Input HTML file
    #[arg(value_name = "FILE")]
    input: Option<PathBuf>,

    /// Output directory
    #[arg(value_name = "OUTPUT")]
    output: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Tidy converted HTML
    Tidy {
        /// Input HTML file
        #[arg(value_name = "FILE")]
        input: PathBuf,

        /// Output file (stdout if not specified)
        #[arg(short, long, value_name = "FILE")]
        output: Option<PathBuf>,

        /// Use IPCC thresholds (large fonts, line numbers, running headers)
        #[arg(long)]
        ipcc: bool,
    },

    /// Hoist inline styles into the head and merge equivalent ones
    Styles {
        /// Input HTML file
        #[arg(value_name = "FILE")]
        input: PathBuf,

        /// Output file (stdout if not specified)
        #[arg(short, long, value_name = "FILE")]
        output: Option<PathBuf>,
    },

    /// Build sections, floats and footnotes
    Structure {
        /// Input HTML file
        #[arg(value_name = "FILE")]
        input: PathBuf,

        /// Output file (stdout if not specified)
        #[arg(short, long, value_name = "FILE")]
        output: Option<PathBuf>,

        /// Section table JSON (IPCC numbering if not specified)
        #[arg(long, value_name = "FILE")]
        sections: Option<PathBuf>,

        /// Class of footnote number spans
        #[arg(long, value_name = "CLASS")]
        footnote_class: Option<String>,

        /// Write the structure report as JSON
        #[arg(long, value_name = "FILE")]
        report: Option<PathBuf>,
    },

    /// Link vocabulary phrases in HTML
    Annotate {
        /// Input HTML file
        #[arg(value_name = "FILE")]
        input: PathBuf,

        /// Term list (CSV, TSV, dictionary HTML or Europe PMC JSON)
        #[arg(short, long, value_name = "FILE", env = "DASC_TERMS")]
        terms: PathBuf,

        /// Output file (stdout if not specified)
        #[arg(short, long, value_name = "FILE")]
        output: Option<PathBuf>,

        /// Base URL for phrase links
        #[arg(long, value_name = "URL")]
        url_base: Option<String>,

        /// Link to each term's own target instead of its slug
        #[arg(long)]
        term_href: bool,
    },

    /// Add link annotations for vocabulary phrases to a PDF
    AnnotatePdf {
        /// Input PDF file
        #[arg(value_name = "FILE")]
        input: PathBuf,

        /// Term list (CSV, TSV, dictionary HTML or Europe PMC JSON)
        #[arg(short, long, value_name = "FILE", env = "DASC_TERMS")]
        terms: PathBuf,

        /// Output PDF (defaults to <stem>_annotated.pdf)
        #[arg(short, long, value_name = "FILE")]
        output: Option<PathBuf>,

        /// Do not append the hit summary page
        #[arg(long)]
        no_summary: bool,
    },

    /// Recognize citations, references and DOIs
    Biblio {
        /// Input HTML file
        #[arg(value_name = "FILE")]
        input: PathBuf,

        /// Output file (stdout if not specified)
        #[arg(short, long, value_name = "FILE")]
        output: Option<PathBuf>,

        /// Locator of reference list entries
        #[arg(long, value_name = "PATH")]
        references: Option<String>,
    },

    /// Run the full pipeline over one or more files
    Pipeline {
        /// Input HTML or PDF files
        #[arg(value_name = "FILES", required = true)]
        inputs: Vec<PathBuf>,

        /// Output directory
        #[arg(short, long, value_name = "DIR")]
        output: Option<PathBuf>,

        /// Term list for phrase links
        #[arg(short, long, value_name = "FILE", env = "DASC_TERMS")]
        terms: Option<PathBuf>,

        /// Rule list JSON (IPCC rules if not specified)
        #[arg(long, value_name = "FILE")]
        rules: Option<PathBuf>,

        /// Base URL for curly-brace target ids
        #[arg(long, value_name = "URL")]
        target_ids: Option<String>,

        /// Recognize citations and references
        #[arg(long)]
        biblio: bool,

        /// Write a snapshot after each pass
        #[arg(long)]
        debug: bool,
    },

    /// Show document information
    Info {
        /// Input HTML or PDF file
        #[arg(value_name = "FILE")]
        input: PathBuf,
    },

    /// Show version information
    Version,
}

fn main() {
    env_logger::init();

    let cli = Cli::parse();

    let result = match cli.command {
        Some(Commands::Tidy {
            input,
            output,
            ipcc,
        }) => cmd_tidy(&input, output.as_deref(), ipcc),
        Some(Commands::Styles { input, output }) => cmd_styles(&input, output.as_deref()),
        Some(Commands::Structure {
            input,
            output,
            sections,
            footnote_class,
            report,
        }) => cmd_structure(
            &input,
            output.as_deref(),
            sections.as_deref(),
            footnote_class,
            report.as_deref(),
        ),
        Some(Commands::Annotate {
            input,
            terms,
            output,
            url_base,
            term_href,
        }) => cmd_annotate(&input, &terms, output.as_deref(), url_base, term_href),
        Some(Commands::AnnotatePdf {
            input,
            terms,
            output,
            no_summary,
        }) => cmd_annotate_pdf(&input, &terms, output.as_deref(), !no_summary),
        Some(Commands::Biblio {
            input,
            output,
            references,
        }) => cmd_biblio(&input, output.as_deref(), references),
        Some(Commands::Pipeline {
            inputs,
            output,
            terms,
            rules,
            target_ids,
            biblio,
            debug,
        }) => cmd_pipeline(
            &inputs,
            output.as_deref(),
            terms.as_deref(),
            rules.as_deref(),
            target_ids,
            biblio,
            debug,
        ),
        Some(Commands::Info { input }) => cmd_info(&input),
        Some(Commands::Version) => {
            cmd_version();
            Ok(())
        }
        None => {
            // Default behavior: IPCC pipeline if input is provided
            if let Some(input) = cli.input {
                cmd_pipeline(
                    &[input],
                    cli.output.as_deref(),
                    None,
                    None,
                    None,
                    false,
                    false,
                )
            } else {
                println!("{}", "Usage: dasc <FILE> [OUTPUT]".yellow());
                println!("       dasc --help for more information");
                Ok(())
            }
        }
    };

    if let Err(e) = result {
        eprintln!("{}: {}", "Error".red().bold(), e);
        std::process::exit(1);
    }
}

fn write_or_print(output: Option<&Path>, content: &str) -> Result<(), Box<dyn std::error::Error>> {
    if let Some(path) = output {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        fs::write(path, content)?;
        println!("{} {}", "Saved to".green(), path.display());
    } else {
        println!("{}", content);
    }
    Ok(())
}

fn print_hits(hits: &[&PhraseHits]) {
    for hit in hits.iter().take(20) {
        println!("  {} {} ({})", "├─".dimmed(), hit.phrase, hit.count);
    }
    if hits.len() > 20 {
        println!("  {} ... {} more phrases", "└─".dimmed(), hits.len() - 20);
    }
}

fn cmd_tidy(
    input: &Path,
    output: Option<&Path>,
    ipcc: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let mut doc = parse_file(input)?;
    let opts = if ipcc {
        TidyOptions::ipcc()
    } else {
        TidyOptions::new()
    };
    let mut ctx = PipelineContext::new();
    let report = tidy_document(&mut doc, &opts, &mut ctx)?;
    write_or_print(output, &doc.serialize())?;

    if output.is_some() {
        println!(
            "{} {} headers/footers, {} empty wrappers, {} spans joined",
            "Removed".green(),
            report.header_footer_removed,
            report.empty_removed,
            report.spans_joined
        );
    }
    Ok(())
}

fn cmd_styles(input: &Path, output: Option<&Path>) -> Result<(), Box<dyn std::error::Error>> {
    let mut doc = parse_file(input)?;
    let mut ctx = PipelineContext::new();
    let extracted = extract_styles_into_head(&mut doc, &mut ctx);
    let report = normalize(&mut doc, &mut ctx);
    write_or_print(output, &doc.serialize())?;

    if output.is_some() {
        println!(
            "{} {} inline styles, {} -> {} classes",
            "Extracted".green(),
            extracted,
            report.styles_before,
            report.styles_after
        );
    }
    Ok(())
}

fn cmd_structure(
    input: &Path,
    output: Option<&Path>,
    sections: Option<&Path>,
    footnote_class: Option<String>,
    report_path: Option<&Path>,
) -> Result<(), Box<dyn std::error::Error>> {
    let mut doc = parse_file(input)?;
    let mut opts = StructureOptions::ipcc();
    if let Some(path) = sections {
        opts = opts.with_sections(SectionTable::from_file(path)?);
    }
    if let Some(class) = footnote_class {
        opts = opts.with_footnotes(FootnoteOptions::new(class));
    }

    let mut ctx = PipelineContext::new();
    let report = extract_structure(&mut doc, &opts, &mut ctx)?;
    write_or_print(output, &doc.serialize())?;

    if let Some(path) = report_path {
        fs::write(path, serde_json::to_string_pretty(&report)?)?;
        println!("{} {}", "Report saved to".green(), path.display());
    }
    if output.is_some() {
        println!(
            "{} {} sections, {} floats, {} footnotes",
            "Found".green(),
            report.sections.len(),
            report.floats.len(),
            report.footnotes.len()
        );
        for marker in &report.unmatched_markers {
            println!("  {} unmatched marker: {}", "!".yellow(), marker);
        }
    }
    Ok(())
}

fn cmd_annotate(
    input: &Path,
    terms: &Path,
    output: Option<&Path>,
    url_base: Option<String>,
    term_href: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let terms = read_term_file(terms)?;
    let mut doc = parse_file(input)?;

    let mut opts = AnnotateOptions::new().with_term_href(term_href);
    if let Some(base) = url_base {
        opts = opts.with_url_base(base);
    }

    let mut ctx = PipelineContext::new();
    let report = annotate(&mut doc, &terms, &opts, &mut ctx);
    write_or_print(output, &doc.serialize())?;

    if output.is_some() {
        println!(
            "{} {} occurrences of {} phrases",
            "Linked".green(),
            report.total(),
            report.by_count().len()
        );
        print_hits(&report.by_count());
    }
    Ok(())
}

fn cmd_annotate_pdf(
    input: &Path,
    terms: &Path,
    output: Option<&Path>,
    summary_page: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let output = output.map(|p| p.to_path_buf()).unwrap_or_else(|| {
        let dir = input.parent().unwrap_or_else(|| Path::new("."));
        dasc::convert::output_path(input, dir)
    });

    let pb = ProgressBar::new(2);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{bar:40.cyan/blue}] {msg}")
            .unwrap()
            .progress_chars("#>-"),
    );

    pb.set_message("Reading terms...");
    let terms = read_term_file(terms)?;
    pb.inc(1);

    pb.set_message("Annotating PDF...");
    let opts = PdfAnnotateOptions::new().with_summary_page(summary_page);
    let mut ctx = PipelineContext::new();
    let report = dasc::annotate::annotate_pdf(input, &terms, &output, &opts, &mut ctx)?;
    pb.inc(1);
    pb.finish_with_message("Done!");

    println!(
        "\n{} {} links on {} pages",
        "Added".green().bold(),
        report.links.len(),
        report.pages
    );
    print_hits(&report.by_count());
    println!("{} {}", "Saved to".green(), output.display());
    Ok(())
}

fn cmd_biblio(
    input: &Path,
    output: Option<&Path>,
    references: Option<String>,
) -> Result<(), Box<dyn std::error::Error>> {
    let mut doc = parse_file(input)?;
    let mut opts = BiblioOptions::new();
    if let Some(locator) = references {
        opts = opts.with_references(locator);
    }

    let mut ctx = PipelineContext::new();
    let report = recognize_bibliography(&mut doc, &opts, &mut ctx)?;
    write_or_print(output, &doc.serialize())?;

    if output.is_some() {
        println!(
            "{} {} citations ({} resolved), {} references, {} DOI links",
            "Found".green(),
            report.bibliorefs.len(),
            report.resolved(),
            report.references.len(),
            report.doi_links
        );
    }
    Ok(())
}

fn cmd_pipeline(
    inputs: &[PathBuf],
    output: Option<&Path>,
    terms: Option<&Path>,
    rules: Option<&Path>,
    target_ids: Option<String>,
    biblio: bool,
    debug: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let output_dir = output.map(|p| p.to_path_buf()).unwrap_or_else(|| {
        let stem = inputs[0].file_stem().unwrap_or_default().to_string_lossy();
        PathBuf::from(format!("{}_output", stem))
    });
    fs::create_dir_all(&output_dir)?;

    let pb = ProgressBar::new(2);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{bar:40.cyan/blue}] {msg}")
            .unwrap()
            .progress_chars("#>-"),
    );

    pb.set_message("Loading configuration...");
    let mut pipeline = PipelineOptions::ipcc();
    if let Some(path) = rules {
        pipeline = pipeline.with_rules(RuleSet::from_file(path)?);
    }
    if let Some(path) = terms {
        pipeline = pipeline.with_terms(read_term_file(path)?);
    }
    if let Some(base) = target_ids {
        pipeline = pipeline.with_target_ids(base);
    }
    if biblio {
        pipeline = pipeline.with_biblio(BiblioOptions::new());
    }
    let options = ConvertOptions::new()
        .with_pipeline(pipeline)
        .with_output_dir(output_dir.join("debug"))
        .with_debug_snapshots(debug);
    pb.inc(1);

    pb.set_message(format!("Processing {} files...", inputs.len()));
    let registry = ConverterRegistry::with_defaults();
    let results = registry.convert_batch(inputs, &output_dir, &options);
    pb.inc(1);
    pb.finish_with_message("Done!");

    println!("\n{}", "Output files:".green().bold());
    let mut failed = 0;
    for (i, (input, result)) in results.iter().enumerate() {
        let branch = if i + 1 == results.len() { "└─" } else { "├─" };
        match result {
            Ok(path) => println!("  {} {}", branch.dimmed(), path.display()),
            Err(e) => {
                failed += 1;
                println!("  {} {} {}", branch.dimmed(), input.display(), e.to_string().red());
            }
        }
    }

    if failed > 0 {
        return Err(format!("{} of {} files failed", failed, inputs.len()).into());
    }
    Ok(())
}

fn cmd_info(input: &Path) -> Result<(), Box<dyn std::error::Error>> {
    let format = detect_format_from_path(input)?;

    println!("{}", "Document Information".cyan().bold());
    println!("{}", "─".repeat(40).dimmed());

    println!("{}: {}", "File".bold(), input.display());
    println!("{}: {}", "Format".bold(), format);

    match format {
        InputFormat::Pdf { .. } => {
            let (pages, spans, annotations) = pdf_summary(input)?;
            println!("{}: {}", "Pages".bold(), pages);
            println!("{}: {}", "Text spans".bold(), spans);
            println!("{}: {}", "Annotations".bold(), annotations);
        }
        InputFormat::Html => {
            let doc = parse_file(input)?;
            let root = doc.root();
            let styles = StyleTable::from_document(&doc);
            let text = doc.text_content(root);

            println!();
            println!("{}", "Content Statistics".cyan().bold());
            println!("{}", "─".repeat(40).dimmed());
            println!("{}: {}", "Elements".bold(), doc.descendants(root).len() + 1);
            println!("{}: {}", "Divs".bold(), doc.find_all(root, "div").len());
            println!("{}: {}", "Spans".bold(), doc.find_all(root, "span").len());
            println!("{}: {}", "Links".bold(), doc.find_all(root, "a").len());
            println!("{}: {}", "Style classes".bold(), styles.len());
            println!("{}: {}", "Words".bold(), text.split_whitespace().count());
        }
    }

    Ok(())
}

/// Page, span and annotation counts of a PDF.
fn pdf_summary(input: &Path) -> Result<(usize, usize, usize), Box<dyn std::error::Error>> {
    let doc = dasc::parser::load_pdf(input)?;
    let spans = dasc::parser::extract_spans(&doc)?;
    let pages = doc.get_pages();
    let annotations = pages
        .values()
        .map(|&id| doc.get_page_annotations(id).map(|a| a.len()))
        .sum::<Result<usize, _>>()?;
    Ok((pages.len(), spans.values().map(Vec::len).sum(), annotations))
}

fn cmd_version() {
    println!("{} {}", "dasc".cyan().bold(), env!("CARGO_PKG_VERSION"));
    println!("Structuring and annotation of converted scientific reports");
    println!();
    println!("Repository: {}", "https://github.com/iyulab/dasc".dimmed());
    println!("License: MIT");
}
