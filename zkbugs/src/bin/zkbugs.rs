use clap::Parser;
use zkbugs::{
    dataset::DatasetOptions,
    docs, enrich, export, import, init_logging,
    llm::LlmOptions,
    similar::{self, SIMILAR_BUGS_FILE},
    stats::Stats,
};
use std::fs;
use std::path::PathBuf;

/// Maintain the zkbugs dataset.
#[derive(Parser)]
enum Command {
    /// Create bug configs from a CSV export of audit findings.
    Import {
        /// The CSV file to import.
        csv: PathBuf,

        /// Index of audit reports, used to look up audited commits [default: ROOT/reports/reports.json].
        #[clap(long, env = "ZKBUGS_REPORTS_INDEX", name = "FILE")]
        reports: Option<PathBuf>,

        /// Overwrite bugs which already have a config.
        #[clap(long)]
        force: bool,

        #[clap(flatten)]
        dataset: DatasetOptions,
    },
    /// Collect every bug config into a single JSON file.
    Export {
        /// Where to write the collected records.
        out: PathBuf,

        #[clap(flatten)]
        dataset: DatasetOptions,
    },
    /// Regenerate README.md in each of the given bug directories.
    Readme {
        #[clap(required = true)]
        dirs: Vec<PathBuf>,
    },
    /// Generate BUGS.md from the README of every bug.
    BugsMd {
        /// Where to write the page [default: ROOT/BUGS.md].
        #[clap(short, long, name = "FILE")]
        out: Option<PathBuf>,

        /// URL where the dataset directory can be browsed.
        #[clap(long, env = "ZKBUGS_DATASET_URL", default_value = docs::DATASET_URL)]
        base_url: String,

        #[clap(flatten)]
        dataset: DatasetOptions,
    },
    /// Print the number of bugs per DSL.
    Stats {
        #[clap(flatten)]
        dataset: DatasetOptions,
    },
    /// Record groups of similar bugs in each member's config.
    Similar {
        /// The similar-bug index [default: DATASET/zkbugs_similar_bugs.json].
        #[clap(long, name = "FILE")]
        file: Option<PathBuf>,

        #[clap(flatten)]
        dataset: DatasetOptions,
    },
    /// Fill in descriptions and locations from audit reports using a language model.
    ///
    /// Always check the results by hand.
    Enrich {
        /// A file listing the configs to update, one path per line.
        list: PathBuf,

        #[clap(flatten)]
        llm: LlmOptions,

        #[clap(flatten)]
        dataset: DatasetOptions,
    },
}

#[async_std::main]
async fn main() -> Result<(), anyhow::Error> {
    init_logging();

    match Command::parse() {
        Command::Import {
            csv,
            reports,
            force,
            dataset,
        } => {
            let reports = reports.unwrap_or_else(|| dataset.root.join("reports/reports.json"));
            let reports = import::Reports::load(reports)?;
            let summary = import::import(csv, dataset.dataset_dir(), &reports, force)?;
            println!("{summary}");
        }
        Command::Export { out, dataset } => {
            let records = export::collect(&dataset.open()?);
            export::write(&out, &records)?;
            println!(
                "Processed {} entries. Output saved to {}",
                records.len(),
                out.display()
            );
        }
        Command::Readme { dirs } => {
            let mut failed = 0;
            for dir in &dirs {
                if let Err(err) = docs::write_readme(dir) {
                    tracing::error!("{err}");
                    failed += 1;
                }
            }
            if failed > 0 {
                return Err(anyhow::Error::msg(format!(
                    "{failed} of {} READMEs could not be generated",
                    dirs.len()
                )));
            }
        }
        Command::BugsMd {
            out,
            base_url,
            dataset,
        } => {
            let out = out.unwrap_or_else(|| dataset.root.join("BUGS.md"));
            let md = docs::render_bugs_md(&dataset.open()?, base_url.trim_end_matches('/'))?;
            fs::write(&out, md)?;
            println!("{} has been created successfully.", out.display());
        }
        Command::Stats { dataset } => {
            print!("{}", Stats::collect(&dataset.open()?));
        }
        Command::Similar { file, dataset } => {
            let dir = dataset.dataset_dir();
            let file = file.unwrap_or_else(|| dir.join(SIMILAR_BUGS_FILE));
            let updated = similar::update(&dir, &file)?;
            println!("Updated {updated} bugs");
        }
        Command::Enrich { list, llm, dataset } => {
            let client = llm.connect()?;
            let summary = enrich::enrich_list(&client, &dataset.root, &list, llm.retry()).await?;
            println!("{summary}");
        }
    }

    Ok(())
}
