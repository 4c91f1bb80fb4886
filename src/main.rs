//! elf-resolve CLI: identity resolution and coreference merging.

use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};
use miette::{IntoDiagnostic, Result};

use elf_resolve::alignment::{NoDomainLookup, TextualAlignment};
use elf_resolve::config::ResolveConfig;
use elf_resolve::coref::CorefScope;
use elf_resolve::document::Document;
use elf_resolve::pipeline::{DocumentReport, Pipeline, group_by_id};
use elf_resolve::record::{read_documents, write_document};
use elf_resolve::xdoc::possible_acronyms;

#[derive(Parser)]
#[command(name = "elf-resolve", version, about = "Identity resolution for extracted entities")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Resolve documents: merge partners, split roles, coref, cross-document ids.
    Resolve {
        /// TOML config with [index] tables and [coref] settings.
        #[arg(long)]
        config: Option<PathBuf>,

        /// JSON files holding one document record or an array of them.
        #[arg(long, required = true, num_args = 1..)]
        input: Vec<PathBuf>,

        /// Directory to write one JSON document per id into.
        #[arg(long)]
        output: PathBuf,

        /// Override the configured coref scope.
        #[arg(long)]
        scope: Option<CliScope>,

        /// Write the updated xdoc seed table here.
        #[arg(long)]
        save_seeds: Option<PathBuf>,

        /// Write the bound-URI table here.
        #[arg(long)]
        save_bound: Option<PathBuf>,

        /// Write a binary index snapshot here.
        #[arg(long)]
        save_snapshot: Option<PathBuf>,
    },

    /// List the acronyms a name could be abbreviated to.
    Acronyms {
        /// Entity name, e.g. "North Atlantic Treaty Organization".
        name: String,
    },

    /// Print the best URI of every individual in the input documents.
    BestUri {
        #[arg(long)]
        input: PathBuf,
    },

    /// Show cross-document index statistics as JSON.
    IndexStats {
        #[arg(long)]
        config: PathBuf,
    },
}

#[derive(Clone, Copy, clap::ValueEnum)]
enum CliScope {
    Document,
    Sentence,
}

impl From<CliScope> for CorefScope {
    fn from(scope: CliScope) -> Self {
        match scope {
            CliScope::Document => CorefScope::Document,
            CliScope::Sentence => CorefScope::Sentence,
        }
    }
}

fn main() -> Result<()> {
    miette::set_hook(Box::new(|_| {
        Box::new(
            miette::MietteHandlerOpts::new()
                .terminal_links(true)
                .unicode(true)
                .context_lines(3)
                .build(),
        )
    }))
    .ok(); // Ignore error if hook already set (e.g., in tests)

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Resolve {
            config,
            input,
            output,
            scope,
            save_seeds,
            save_bound,
            save_snapshot,
        } => {
            let mut config = match &config {
                Some(path) => ResolveConfig::load(path)?,
                None => ResolveConfig::default(),
            };
            if let Some(scope) = scope {
                config.coref.scope = scope.into();
            }
            let index = config.index.build_index()?;

            let mut docs = Vec::new();
            for path in &input {
                docs.extend(load_documents(path)?);
            }
            let groups = group_by_id(docs);
            println!("Resolving {} document(s) from {} file(s)", groups.len(), input.len());

            std::fs::create_dir_all(&output).into_diagnostic()?;
            let pipeline = Pipeline::new(&index, &TextualAlignment, &NoDomainLookup, config.coref);
            let mut reports: Vec<DocumentReport> = Vec::new();
            let mut failed = 0;
            for (id, result) in pipeline.run_batch(groups) {
                let (doc, report) = match result {
                    Ok(done) => done,
                    Err(e) => {
                        eprintln!("  {id}: {:?}", miette::Report::new(e));
                        failed += 1;
                        continue;
                    }
                };
                let record = match doc.to_record() {
                    Ok(record) => record,
                    Err(e) => {
                        eprintln!("  {id}: {:?}", miette::Report::new(e));
                        failed += 1;
                        continue;
                    }
                };
                write_document(&output.join(output_file_name(&id)), &record)?;
                reports.push(report);
            }
            let summary = serde_json::to_string_pretty(&reports).into_diagnostic()?;
            std::fs::write(output.join("reports.json"), summary).into_diagnostic()?;
            println!(
                "Wrote {} document(s) to {} ({failed} failed)",
                reports.len(),
                output.display()
            );

            if let Some(path) = save_seeds {
                index.save_xdoc_seeds(&path)?;
                println!("Saved xdoc seeds to {}", path.display());
            }
            if let Some(path) = save_bound {
                index.save_bound_uris(&path)?;
                println!("Saved bound URIs to {}", path.display());
            }
            if let Some(path) = save_snapshot {
                index.save_snapshot(&path)?;
                println!("Saved index snapshot to {}", path.display());
            }
        }

        Commands::Acronyms { name } => {
            let acronyms = possible_acronyms(&name);
            if acronyms.is_empty() {
                println!("No acronyms for \"{name}\".");
            }
            for acronym in acronyms {
                println!("{acronym}");
            }
        }

        Commands::BestUri { input } => {
            for doc in load_documents(&input)? {
                for individual in doc.individuals() {
                    let name = individual.name().map(|n| n.text()).unwrap_or("-");
                    match individual.best_uri(Some(doc.id())) {
                        Ok(uri) => println!("{}\t{uri}\t{name}", doc.id()),
                        Err(e) => println!("{}\t<{e}>\t{name}", doc.id()),
                    }
                }
            }
        }

        Commands::IndexStats { config } => {
            let config = ResolveConfig::load(&config)?;
            let index = config.index.build_index()?;
            let stats = index.stats()?;
            let json = serde_json::to_string_pretty(&stats).into_diagnostic()?;
            println!("{json}");
        }
    }

    Ok(())
}

/// Read documents from a JSON file, logging and skipping malformed records.
fn load_documents(path: &Path) -> Result<Vec<Document>> {
    let mut docs = Vec::new();
    for record in read_documents(path)? {
        let (doc, skipped) = Document::from_record(record);
        for e in &skipped {
            tracing::warn!(file = %path.display(), doc_id = doc.id(), error = %e, "skipped record");
        }
        docs.push(doc);
    }
    Ok(docs)
}

/// Document ids may be URIs; keep them usable as file names.
fn output_file_name(id: &str) -> String {
    let stem: String = id
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.') { c } else { '_' })
        .collect();
    format!("{stem}.json")
}
