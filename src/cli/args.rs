//! Command-line argument parsing
//!
//! Provides clap-based CLI with subcommands and verbosity control.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

use crate::config::DEFAULT_CONFIG_PATH;
use crate::evaluation::DEFAULT_DEPTH;

/// expertrec - Recommend review experts for procurement projects
#[derive(Parser, Debug)]
#[command(name = "expertrec")]
#[command(version)]
#[command(about = "Recommend review experts with vector recall and staged LLM reasoning", long_about = None)]
pub struct Args {
    /// System configuration file
    #[arg(short, long, global = true, default_value = DEFAULT_CONFIG_PATH)]
    pub config: PathBuf,

    /// Verbosity level: -v (debug), -vv (trace)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Quiet mode (warnings and results only)
    #[arg(short, long, global = true)]
    pub quiet: bool,

    #[command(subcommand)]
    pub command: Commands,
}

/// Available subcommands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Recommend experts for a project
    Recommend {
        /// Project name followed by project description
        #[arg(value_name = "INPUT", required = true)]
        input: Vec<String>,

        /// Candidates to recall (defaults to pipeline.top_k)
        #[arg(short = 'k', long)]
        top_k: Option<usize>,

        /// Experts to return (defaults to pipeline.num)
        #[arg(short, long)]
        num: Option<usize>,

        /// Keep chat history from earlier turns
        #[arg(long)]
        keep_history: bool,

        /// Session file read before and written after the turn
        #[arg(long)]
        session: Option<PathBuf>,

        /// Print the recalled candidates and the explanation as well
        #[arg(long)]
        show_trace: bool,
    },

    /// Generate expert descriptions with the ExpertAnalyst agent
    AnalyzeExperts {
        /// Raw expert profiles (JSON array)
        #[arg(short, long)]
        input: PathBuf,

        /// Output file for analysed experts
        #[arg(short, long)]
        output: PathBuf,
    },

    /// Embed expert profiles and write the index and expert table
    BuildIndex {
        /// Raw expert profiles (JSON array)
        #[arg(long)]
        profiles: PathBuf,

        /// Analysed experts supplying descriptions
        #[arg(long)]
        descriptions: Option<PathBuf>,

        /// Directory for the index artifact and expert table
        #[arg(short, long)]
        output_dir: PathBuf,

        /// Also load the vectors into the configured Qdrant collection
        #[arg(long)]
        push: bool,
    },

    /// Measure recall hit rates against labelled projects
    EvalRecall {
        /// Test cases (JSON array of project_name, project_infos, expert_id)
        #[arg(long)]
        test_data: PathBuf,

        /// Candidates retrieved per case
        #[arg(long, default_value_t = DEFAULT_DEPTH)]
        depth: usize,
    },
}

/// Verbosity level enum
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verbosity {
    Quiet,
    Normal,
    Verbose,
    VeryVerbose,
}

impl Args {
    /// Get verbosity level based on flags
    pub fn verbosity(&self) -> Verbosity {
        if self.quiet {
            Verbosity::Quiet
        } else {
            match self.verbose {
                0 => Verbosity::Normal,
                1 => Verbosity::Verbose,
                _ => Verbosity::VeryVerbose,
            }
        }
    }
}

impl Verbosity {
    /// Default `tracing` filter directive
    pub fn filter(&self) -> &'static str {
        match self {
            Verbosity::Quiet => "warn",
            Verbosity::Normal => "info",
            Verbosity::Verbose => "debug",
            Verbosity::VeryVerbose => "trace",
        }
    }

    /// Check if should show progress bars
    pub fn show_progress(&self) -> bool {
        !matches!(self, Verbosity::Quiet)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recommend_parsing() {
        let args = Args::try_parse_from([
            "expertrec",
            "recommend",
            "离子膜装置",
            "采购一套制造装置",
            "--top-k",
            "20",
            "-n",
            "5",
        ])
        .unwrap();

        match args.command {
            Commands::Recommend {
                input,
                top_k,
                num,
                keep_history,
                ..
            } => {
                assert_eq!(input.len(), 2);
                assert_eq!(top_k, Some(20));
                assert_eq!(num, Some(5));
                assert!(!keep_history);
            }
            other => panic!("unexpected command {:?}", other),
        }
        assert_eq!(args.config, PathBuf::from(DEFAULT_CONFIG_PATH));
    }

    #[test]
    fn test_verbosity() {
        let args = Args::try_parse_from(["expertrec", "-q", "eval-recall", "--test-data", "t.json"])
            .unwrap();
        assert_eq!(args.verbosity(), Verbosity::Quiet);
        assert!(!args.verbosity().show_progress());

        let args = Args::try_parse_from(["expertrec", "-vv", "eval-recall", "--test-data", "t.json"])
            .unwrap();
        assert_eq!(args.verbosity(), Verbosity::VeryVerbose);
        assert_eq!(args.verbosity().filter(), "trace");
    }

    #[test]
    fn test_eval_default_depth() {
        let args =
            Args::try_parse_from(["expertrec", "eval-recall", "--test-data", "t.json"]).unwrap();
        assert!(matches!(
            args.command,
            Commands::EvalRecall { depth, .. } if depth == DEFAULT_DEPTH
        ));
    }

    #[test]
    fn test_recommend_requires_input() {
        assert!(Args::try_parse_from(["expertrec", "recommend"]).is_err());
    }
}
