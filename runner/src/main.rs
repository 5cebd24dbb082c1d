use clap::{Args, Parser, Subcommand};
use std::fs;
use std::path::PathBuf;
use std::time::Duration;
use zkbugs::dataset::{DatasetOptions, Dsl, Selection};

mod circomspect;
mod picus;
mod process;
mod report;
mod reproduce;
mod test_runner;

/// Run reproduction scripts and analysis tools over the zkbugs dataset.
#[derive(Parser)]
enum Command {
    /// Run the exploit scripts of some bugs.
    Reproduce {
        #[clap(subcommand)]
        target: Target,
    },
    /// Run circomspect on every Circom bug and collect the results.
    Circomspect {
        /// Where to write the Markdown report.
        #[clap(short, long, default_value = "circomspect_results.md")]
        out: PathBuf,

        /// Echo each circomspect output as it is produced.
        #[clap(short, long)]
        verbose: bool,

        /// The circomspect executable.
        #[clap(long, env = "ZKBUGS_CIRCOMSPECT", default_value = "circomspect")]
        program: String,

        #[clap(flatten)]
        dataset: DatasetOptions,
    },
    /// Run Picus on every Circom bug and collect the results.
    Picus {
        /// Where to write the Markdown report.
        #[clap(short, long, default_value = "picus_results.md")]
        out: PathBuf,

        /// The Picus Docker image.
        #[clap(long, env = "ZKBUGS_PICUS_IMAGE", default_value = "veridise/picus:v1.0.3")]
        image: String,

        /// Seconds to give Picus for each circuit.
        #[clap(long, env = "ZKBUGS_PICUS_TIMEOUT", default_value = "100")]
        timeout: u64,

        /// The Docker executable.
        #[clap(long, env = "ZKBUGS_DOCKER", default_value = "docker")]
        docker: String,

        #[clap(flatten)]
        dataset: DatasetOptions,
    },
    /// Convert a hand-written analysis of circomspect or Picus results to CSV.
    Report {
        /// The tool the analysis is about (circomspect or picus).
        tool: report::Tool,

        /// The Markdown analysis.
        markdown: PathBuf,

        /// Where to write the CSV table.
        csv: PathBuf,
    },
}

/// Which bugs to reproduce.
#[derive(Subcommand)]
enum Target {
    /// The bug whose ID contains the given text.
    Single {
        id: String,

        #[clap(flatten)]
        opt: ReproduceOptions,
    },
    /// Every bug in one DSL.
    Dsl {
        dsl: Dsl,

        #[clap(flatten)]
        opt: ReproduceOptions,
    },
    /// Every bug in the dataset.
    All {
        #[clap(flatten)]
        opt: ReproduceOptions,
    },
}

impl Target {
    fn split(self) -> (Selection, ReproduceOptions) {
        match self {
            Self::Single { id, opt } => (Selection::Single(id), opt),
            Self::Dsl { dsl, opt } => (Selection::Dsl(dsl), opt),
            Self::All { opt } => (Selection::All, opt),
        }
    }
}

#[derive(Clone, Debug, Args)]
struct ReproduceOptions {
    /// Show the output of dependency installation and exploit scripts.
    #[clap(short, long)]
    verbose: bool,

    /// Don't install dependencies before running exploit scripts.
    #[clap(long)]
    no_install: bool,

    /// Shell command run in each bug directory to install dependencies.
    #[clap(
        long,
        env = "ZKBUGS_INSTALL_COMMAND",
        default_value = "npm install ffjavascript"
    )]
    install_command: String,

    #[clap(flatten)]
    dataset: DatasetOptions,
}

fn main() -> Result<(), anyhow::Error> {
    zkbugs::init_logging();

    match Command::parse() {
        Command::Reproduce { target } => {
            let (selection, opt) = target.split();
            let bugs = opt.dataset.open()?.select(&selection)?;
            println!("Bugs to reproduce:");
            for bug in &bugs {
                println!("- {}", bug.path.display());
            }
            let summary = reproduce::reproduce_all(
                &bugs,
                &reproduce::Options {
                    verbose: opt.verbose,
                    install: (!opt.no_install).then_some(opt.install_command),
                },
            );
            print!("{summary}");
        }
        Command::Circomspect {
            out,
            verbose,
            program,
            dataset,
        } => {
            let md = circomspect::report(&dataset.open()?, &program, verbose);
            fs::write(&out, md)?;
            println!("Circomspect analysis results saved to {}", out.display());
        }
        Command::Picus {
            out,
            image,
            timeout,
            docker,
            dataset,
        } => {
            let opt = picus::Options {
                docker,
                image,
                timeout: Duration::from_secs(timeout),
            };
            let md = picus::report(&dataset.root, &dataset.open()?, &opt);
            fs::write(&out, md)?;
            println!("Picus analysis results saved to {}", out.display());
        }
        Command::Report {
            tool,
            markdown,
            csv,
        } => {
            let rows = report::convert(tool, &markdown, &csv)?;
            println!(
                "Wrote {rows} {tool} results from {} to {}",
                markdown.display(),
                csv.display()
            );
        }
    }

    Ok(())
}
