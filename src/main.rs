use std::path::PathBuf;

use clap::Parser;
use serde_json::{json, Value};

use taskgraph::config::Config;
use taskgraph::demo::{self, Job};
use taskgraph::{tglog, tglog_debug, ExecOptions, Executor, MergeOrder, PoolKind, Result};

/// Run the demo task graph serially or with independent tasks in parallel
#[derive(Parser, Debug)]
#[command(name = "taskgraph")]
#[command(version, about, long_about = None)]
#[command(after_help = "ENVIRONMENT:\n    TASKGRAPH_DEBUG=1        Enable debug logging (alternative to --debug)\n    TASKGRAPH_DEBUG=trace    Also log every task start and finish")]
pub struct Cli {
    /// Run independent tasks in parallel
    #[arg(short = 'p', long)]
    pub parallel: bool,

    /// Size of pool for parallel processing [default: 4]
    #[arg(short = 'z', long, value_parser = clap::value_parser!(u64).range(1..=8))]
    pub pool_size: Option<u64>,

    /// Seconds to sleep in each task [default: 0]
    #[arg(short = 'd', long, value_parser = clap::value_parser!(u64).range(0..=10))]
    pub delay: Option<u64>,

    /// Print the execution plan and exit (affected by -p)
    #[arg(short = 'g', long)]
    pub graph: bool,

    /// Thread one state through the tasks instead of accumulating a record
    #[arg(long)]
    pub pipe: bool,

    /// Worker pool substrate for parallel runs
    #[arg(long, value_enum)]
    pub substrate: Option<PoolKind>,

    /// Merge parallel results in task-name order
    #[arg(long)]
    pub deterministic_merge: bool,

    /// Enable debug logging
    #[arg(long)]
    pub debug: bool,

    /// Config file (default: ~/.taskgraph/taskgraph.toml)
    #[arg(long, value_name = "PATH")]
    pub config: Option<PathBuf>,
}

impl Cli {
    /// Overlay command-line flags onto `config`.
    fn apply(&self, config: &mut Config) {
        if self.parallel {
            config.parallel = true;
        }
        if let Some(size) = self.pool_size {
            config.pool_size = size as usize;
        }
        if let Some(delay) = self.delay {
            config.delay = delay;
        }
        if let Some(substrate) = self.substrate {
            config.substrate = substrate;
        }
        if self.deterministic_merge {
            config.merge_order = MergeOrder::TaskName;
        }
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    taskgraph::log::init_with_debug(cli.debug);

    let mut config = match &cli.config {
        Some(path) => Config::load_from(path)?,
        None => Config::load()?,
    };
    cli.apply(&mut config);
    config.validate()?;

    if let Some(path) = config.log_path() {
        taskgraph::log::init_to_file(path, cli.debug);
    }
    tglog_debug!("Effective config: {:?}", config);

    let graph = demo::graph()?;

    if cli.graph {
        println!("{}", graph.describe(config.parallel)?);
        return Ok(());
    }

    let mut executor = if config.parallel {
        Executor::parallel(&graph, &ExecOptions::from(&config))?
    } else {
        Executor::serial(&graph)
    };
    tglog!(
        "Running demo job: run={}, parallel={}, pipe={}, delay={}",
        executor.run_id().short(),
        config.parallel,
        cli.pipe,
        config.delay
    );

    let params = json!({ "delay": config.delay });
    let result = if cli.pipe {
        executor.pipe(Job::new(), json!({}), params)?
    } else {
        executor.accumulate(Job::new(), params)?.map(Value::Object)
    };

    println!("{}", serde_json::to_string_pretty(&result.unwrap_or(Value::Null))?);
    Ok(())
}
