use std::io::{self, IsTerminal, Read};
use std::time::Duration;

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand, ValueEnum};
use serde_json::{Map, Value, json};
use tracing::info;
use tracing_subscriber::EnvFilter;

use weft_runtime::{BoxError, Callable, RuntimeError, Task, TaskArgs, Weave, WeaveConfig};

/// Weft - a lightweight concurrent task orchestrator
#[derive(Parser)]
#[command(name = "weft")]
#[command(version, about, long_about = None)]
struct Cli {
  /// Log progress events (repeat for more detail). RUST_LOG overrides.
  #[arg(short, long, global = true, action = clap::ArgAction::Count)]
  verbose: u8,

  #[command(subcommand)]
  command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
  /// Run one of the built-in weaves
  Run {
    /// Which weave to run
    #[arg(value_enum)]
    demo: Demo,

    /// Worker threads for blocking tasks
    #[arg(long)]
    workers: Option<usize>,

    /// Bound on nested merges
    #[arg(long)]
    max_merge_depth: Option<usize>,

    /// Include the execution plan in the output
    #[arg(long)]
    show_plan: bool,
  },
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum Demo {
  /// One source, two independent branches, one join
  Diamond,
  /// Square every input number concurrently
  Mapped,
  /// Map over a previous task's output, then reduce
  Chained,
  /// A task that fans out more work while it runs
  Dynamic,
  /// A failing branch that cancels its sibling
  Failure,
}

fn main() -> Result<()> {
  let cli = Cli::parse();
  init_tracing(cli.verbose);

  match cli.command {
    Some(Commands::Run {
      demo,
      workers,
      max_merge_depth,
      show_plan,
    }) => {
      let mut config = WeaveConfig::default();
      config.max_workers = workers;
      if let Some(depth) = max_merge_depth {
        config.max_merge_depth = depth;
      }
      let rt = tokio::runtime::Runtime::new()?;
      rt.block_on(async { run_demo(demo, config, show_plan).await })?;
    }
    None => {
      println!("weft - use --help to see available commands");
    }
  }

  Ok(())
}

fn init_tracing(verbose: u8) {
  let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
    EnvFilter::new(match verbose {
      0 => "warn",
      1 => "info",
      _ => "debug",
    })
  });
  tracing_subscriber::fmt()
    .with_env_filter(filter)
    .with_writer(io::stderr)
    .init();
}

async fn run_demo(demo: Demo, config: WeaveConfig, show_plan: bool) -> Result<()> {
  let input = read_input_from_stdin()?;
  eprintln!("Input: {}", input);

  let mut weave = Weave::begin(config).context("invalid configuration")?;
  weave
    .seed("input", input)
    .context("failed to seed the weave")?;
  register(demo, &mut weave).context("failed to register tasks")?;

  info!(run_id = %weave.run_id(), demo = ?demo, "demo_started");
  let outcome = weave.end().await;

  let mut output = Map::new();
  output.insert("run_id".to_string(), json!(weave.run_id()));
  if let Some(result) = weave.result() {
    let results: Map<String, Value> = result
      .iter()
      .map(|(name, value)| (name.to_string(), value.clone()))
      .collect();
    let timings: Map<String, Value> = result
      .timings()
      .iter()
      .map(|(name, elapsed)| (name.clone(), json!(elapsed.as_secs_f64() * 1000.0)))
      .collect();
    output.insert("results".to_string(), Value::Object(results));
    output.insert("timings_ms".to_string(), Value::Object(timings));
  }
  if show_plan {
    if let Some(plan) = weave.plan() {
      output.insert("plan".to_string(), serde_json::to_value(plan)?);
    }
  }
  if let Err(e) = &outcome {
    output.insert("error".to_string(), json!(e.to_string()));
  }

  println!("{}", serde_json::to_string_pretty(&output)?);

  match outcome {
    Ok(_) => Ok(()),
    Err(RuntimeError::TaskFailed(failure)) if matches!(demo, Demo::Failure) => {
      eprintln!("Failed as expected: {}", failure);
      Ok(())
    }
    Err(e) => Err(e).context("weave failed"),
  }
}

/// Numbers to feed the weave; defaults to 1..=5 when stdin is a terminal or empty.
fn read_input_from_stdin() -> Result<Value> {
  let stdin = io::stdin();
  if stdin.is_terminal() {
    return Ok(json!([1, 2, 3, 4, 5]));
  }
  let mut buffer = String::new();
  stdin
    .lock()
    .read_to_string(&mut buffer)
    .context("failed to read input from stdin")?;
  if buffer.trim().is_empty() {
    return Ok(json!([1, 2, 3, 4, 5]));
  }
  let input: Value = serde_json::from_str(&buffer).context("stdin is not valid JSON")?;
  if !input.as_array().is_some_and(|items| items.iter().all(Value::is_i64)) {
    bail!("input must be a JSON array of integers");
  }
  Ok(input)
}

fn register(demo: Demo, weave: &mut Weave) -> Result<(), RuntimeError> {
  match demo {
    Demo::Diamond => {
      weave
        .task(
          Task::cooperative("initial_data", |args| async move {
            let data: Vec<i64> = args.value("input")?;
            Ok::<_, BoxError>(json!(data))
          })
          .params(["input"]),
        )?
        .task(
          Task::blocking("process_a", |args| {
            let data: Vec<i64> = args.value("initial_data")?;
            std::thread::sleep(Duration::from_millis(50));
            Ok(json!(data.iter().sum::<i64>()))
          })
          .params(["initial_data"]),
        )?
        .task(
          Task::cooperative("process_b", |args| async move {
            let data: Vec<i64> = args.value("initial_data")?;
            tokio::time::sleep(Duration::from_millis(50)).await;
            Ok::<_, BoxError>(json!(data.iter().copied().max()))
          })
          .params(["initial_data"]),
        )?
        .task(
          Task::cooperative("combine_results", |args| async move {
            Ok(json!({
              "sum": args.get("process_a").cloned().unwrap_or_default(),
              "max": args.get("process_b").cloned().unwrap_or_default(),
            }))
          })
          .params(["process_a", "process_b"]),
        )?;
    }
    Demo::Mapped => {
      weave.task(
        Task::cooperative("squares", |args| async move {
          let n: i64 = args.item_as()?;
          tokio::time::sleep(Duration::from_millis(20)).await;
          Ok::<_, BoxError>(json!(n * n))
        })
        .params(["number"])
        .map_over("input")
        .workers(2),
      )?;
    }
    Demo::Chained => {
      weave
        .task(
          Task::cooperative("scaled", |args| async move {
            let data: Vec<i64> = args.value("input")?;
            Ok::<_, BoxError>(json!(data.iter().map(|n| n * 10).collect::<Vec<_>>()))
          })
          .params(["input"]),
        )?
        .task(
          Task::blocking("add_one", |args| {
            let n: i64 = args.item_as()?;
            Ok(json!(n + 1))
          })
          .params(["n"])
          .map_over("scaled"),
        )?
        .task(
          Task::cooperative("total", |args| async move {
            let values: Vec<i64> = args.value("add_one")?;
            Ok::<_, BoxError>(json!(values.iter().sum::<i64>()))
          })
          .params(["add_one"]),
        )?;
    }
    Demo::Dynamic => {
      weave.task(
        Task::cooperative("fan_out", |args| async move {
          let data: Vec<i64> = args.value("input")?;
          let cube = Callable::blocking(|item: TaskArgs| {
            let n: i64 = item.item_as()?;
            Ok(json!(n * n * n))
          });
          let cubes = args
            .context()
            .merge_map(cube, data.into_iter().map(|n| json!(n)))
            .await?;
          let count = args
            .context()
            .merge(Callable::cooperative(move |_| {
              let len = cubes.len();
              async move { Ok(json!(len)) }
            }))
            .await?;
          Ok::<_, BoxError>(json!({ "count": count, "depth": args.context().depth() }))
        })
        .params(["input"])
        .retries(1),
      )?;
    }
    Demo::Failure => {
      weave
        .task(Task::cooperative("steady", |_| async {
          tokio::time::sleep(Duration::from_secs(5)).await;
          Ok(json!("finished"))
        }))?
        .task(
          Task::cooperative("brittle", |args| async move {
            let data: Vec<i64> = args.value("input")?;
            tokio::time::sleep(Duration::from_millis(50)).await;
            Err::<Value, BoxError>(format!("refusing {} inputs", data.len()).into())
          })
          .params(["input"]),
        )?
        .task(
          Task::cooperative("downstream", |_| async { Ok(json!("unreachable")) })
            .params(["brittle"]),
        )?;
    }
  }
  Ok(())
}
