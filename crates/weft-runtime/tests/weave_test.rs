//! End-to-end runs through `Weave` and `weave`.

use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use serde_json::{Value, json};
use weft_runtime::{
  BoxError, GraphError, RuntimeError, Task, Weave, WeaveConfig, WeaveState, weave,
};

type Log = Arc<Mutex<Vec<&'static str>>>;

#[derive(Debug)]
struct Boom;

impl fmt::Display for Boom {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str("boom")
  }
}

impl std::error::Error for Boom {}

fn recording(name: &'static str, log: &Log, value: Value) -> Task {
  let log = Arc::clone(log);
  Task::cooperative(name, move |_| {
    let log = Arc::clone(&log);
    let value = value.clone();
    async move {
      log.lock().unwrap().push(name);
      Ok(value)
    }
  })
}

fn sleeper(name: &'static str, millis: u64) -> Task {
  Task::cooperative(name, move |_| async move {
    tokio::time::sleep(Duration::from_millis(millis)).await;
    Ok(json!(name))
  })
}

#[tokio::test]
async fn test_dependencies_run_in_order() {
  let log: Log = Arc::default();
  let mut weave = Weave::begin(WeaveConfig::default()).expect("begin");
  weave
    .task(recording("a", &log, json!(1)))
    .unwrap()
    .task(recording("b", &log, json!(2)).params(["a"]))
    .unwrap()
    .task(recording("c", &log, json!(3)).params(["b"]))
    .unwrap();

  let result = weave.end().await.expect("weave should succeed");

  assert_eq!(*log.lock().unwrap(), vec!["a", "b", "c"]);
  assert_eq!(result["c"], json!(3));
  assert_eq!(result.final_value(), Some(&json!(3)));
  assert_eq!(weave.state(), WeaveState::Succeeded);
}

#[tokio::test]
async fn test_diamond_passes_values_downstream() {
  let result = weave(WeaveConfig::default(), |w| {
    w.task(Task::cooperative("initial_data", |_| async {
      Ok(json!([1, 2, 3]))
    }))?;
    w.task(
      Task::cooperative("process_a", |args| async move {
        let data: Vec<i64> = args.value("initial_data")?;
        Ok::<_, BoxError>(json!(data.iter().sum::<i64>()))
      })
      .params(["initial_data"]),
    )?;
    w.task(
      Task::cooperative("process_b", |args| async move {
        let data: Vec<i64> = args.value("initial_data")?;
        Ok::<_, BoxError>(json!(data.len()))
      })
      .params(["initial_data"]),
    )?;
    w.task(
      Task::cooperative("combine_results", |args| async move {
        let a: i64 = args.value("process_a")?;
        let b: i64 = args.value("process_b")?;
        Ok::<_, BoxError>(json!(a * 10 + b))
      })
      .params(["process_a", "process_b"]),
    )?;
    Ok::<_, RuntimeError>(())
  })
  .await
  .expect("weave should succeed");

  assert_eq!(result["combine_results"], json!(63));
  let names: Vec<&str> = result.iter().map(|(name, _)| name).collect();
  assert_eq!(
    names,
    vec!["initial_data", "process_a", "process_b", "combine_results"]
  );
  assert_eq!(result.timings().len(), 4);
}

#[tokio::test]
async fn test_independent_tasks_overlap() {
  let start = Instant::now();
  let result = weave(WeaveConfig::default(), |w| {
    w.task(sleeper("left", 150))?;
    w.task(sleeper("right", 150))?;
    Ok::<_, RuntimeError>(())
  })
  .await
  .unwrap();

  assert!(start.elapsed() < Duration::from_millis(280));
  assert_eq!(result["left"], json!("left"));
  assert_eq!(result["right"], json!("right"));
}

#[tokio::test]
async fn test_seed_values_bind_as_inputs() {
  let mut weave = Weave::begin(WeaveConfig::default()).unwrap();
  weave.seed("config", json!({"factor": 3})).unwrap();
  weave
    .task(
      Task::cooperative("scaled", |args| async move {
        let factor = args.get("config").and_then(|c| c["factor"].as_i64()).unwrap_or(0);
        Ok(json!(factor * 7))
      })
      .params(["config"]),
    )
    .unwrap();

  let result = weave.end().await.unwrap();
  assert_eq!(result["scaled"], json!(21));
  assert_eq!(result["config"], json!({"factor": 3}));
  assert_eq!(result.names(), ["scaled".to_string()]);
  assert_eq!(result.len(), 1);
}

#[tokio::test]
async fn test_mapped_task_squares_items_in_order() {
  let result = weave(WeaveConfig::default(), |w| {
    w.task(
      Task::cooperative("squares", |args| async move {
        let n: i64 = args.item_as()?;
        tokio::time::sleep(Duration::from_millis(((10 - n) * 3) as u64)).await;
        Ok::<_, BoxError>(json!(n * n))
      })
      .params(["number"])
      .map_items((0..10).map(|n| json!(n))),
    )?;
    Ok::<_, RuntimeError>(())
  })
  .await
  .unwrap();

  assert_eq!(result["squares"], json!([0, 1, 4, 9, 16, 25, 36, 49, 64, 81]));
}

#[tokio::test]
async fn test_mapped_task_over_previous_result() {
  let result = weave(WeaveConfig::default(), |w| {
    w.task(Task::cooperative("numbers", |_| async { Ok(json!([10, 20, 30])) }))?;
    w.task(Task::cooperative("offset", |_| async { Ok(json!(1)) }))?;
    w.task(
      Task::blocking("shifted", |args| {
        let n: i64 = args.value("n")?;
        let offset: i64 = args.value("offset")?;
        Ok(json!(n + offset))
      })
      .params(["offset", "n"])
      .map_over("numbers"),
    )?;
    Ok::<_, RuntimeError>(())
  })
  .await
  .unwrap();

  assert_eq!(result["shifted"], json!([11, 21, 31]));
}

#[tokio::test]
async fn test_chained_mapped_tasks() {
  let result = weave(WeaveConfig::default(), |w| {
    w.task(Task::cooperative("a", |_| async { Ok(json!([1, 2, 3])) }))?;
    w.task(
      Task::cooperative("b", |args| async move {
        let item: i64 = args.item_as()?;
        Ok::<_, BoxError>(json!(item * 10))
      })
      .params(["item"])
      .map_over("a"),
    )?;
    w.task(
      Task::blocking("c", |args| {
        let item: i64 = args.item_as()?;
        Ok(json!(item + 1))
      })
      .params(["item"])
      .map_over("b"),
    )?;
    Ok::<_, RuntimeError>(())
  })
  .await
  .unwrap();

  assert_eq!(result["b"], json!([10, 20, 30]));
  assert_eq!(result["c"], json!([11, 21, 31]));
  assert_eq!(result.final_value(), Some(&json!([11, 21, 31])));
}

#[tokio::test]
async fn test_empty_map_yields_empty_list() {
  let calls = Arc::new(AtomicUsize::new(0));
  let counter = Arc::clone(&calls);
  let result = weave(WeaveConfig::default(), move |w| {
    w.task(Task::cooperative("nothing", |_| async { Ok(json!([])) }))?;
    w.task(
      Task::cooperative("each", move |_| {
        counter.fetch_add(1, Ordering::SeqCst);
        async { Ok(Value::Null) }
      })
      .params(["item"])
      .map_over("nothing"),
    )?;
    Ok::<_, RuntimeError>(())
  })
  .await
  .unwrap();

  assert_eq!(result["each"], json!([]));
  assert_eq!(calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_map_over_non_collection_fails_before_items_start() {
  let calls = Arc::new(AtomicUsize::new(0));
  let counter = Arc::clone(&calls);
  let mut weave = Weave::begin(WeaveConfig::default()).unwrap();
  weave
    .task(Task::cooperative("scalar", |_| async { Ok(json!(5)) }))
    .unwrap()
    .task(
      Task::cooperative("each", move |_| {
        counter.fetch_add(1, Ordering::SeqCst);
        async { Ok(Value::Null) }
      })
      .params(["item"])
      .map_over("scalar"),
    )
    .unwrap();

  let err = weave.end().await.unwrap_err();
  let failure = err.task_failure().expect("map source error is a task failure");
  assert_eq!(failure.task(), "each");
  match failure.downcast_ref::<RuntimeError>() {
    Some(RuntimeError::MapSource { task, found }) => {
      assert_eq!(task, "each");
      assert_eq!(found, "a number");
    }
    other => panic!("unexpected error: {other:?}"),
  }

  assert_eq!(weave.state(), WeaveState::TaskFailed);
  let result = weave.result().unwrap();
  let kept = result.exception().expect("exception recorded");
  assert_eq!(kept.task(), "each");
  assert!(Arc::ptr_eq(&kept.source_arc(), &failure.source_arc()));
  assert_eq!(result["scalar"], json!(5));
  assert!(!result.contains("each"));
  assert_eq!(calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_mapped_worker_cap_limits_concurrency() {
  let running = Arc::new(AtomicUsize::new(0));
  let peak = Arc::new(AtomicUsize::new(0));
  let (running_in, peak_in) = (Arc::clone(&running), Arc::clone(&peak));

  let result = weave(WeaveConfig::default(), move |w| {
    w.task(
      Task::cooperative("capped", move |args| {
        let running = Arc::clone(&running_in);
        let peak = Arc::clone(&peak_in);
        async move {
          let now = running.fetch_add(1, Ordering::SeqCst) + 1;
          peak.fetch_max(now, Ordering::SeqCst);
          tokio::time::sleep(Duration::from_millis(30)).await;
          running.fetch_sub(1, Ordering::SeqCst);
          Ok(args.item().cloned().unwrap_or_default())
        }
      })
      .params(["item"])
      .map_items((0..6).map(|n| json!(n)))
      .workers(2),
    )?;
    Ok::<_, RuntimeError>(())
  })
  .await
  .unwrap();

  assert_eq!(result["capped"], json!([0, 1, 2, 3, 4, 5]));
  assert_eq!(peak.load(Ordering::SeqCst), 2);
  assert_eq!(running.load(Ordering::SeqCst), 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_single_worker_runs_blocking_tasks_serially() {
  let blocking = |name: &'static str| {
    Task::blocking(name, move |_| {
      std::thread::sleep(Duration::from_millis(100));
      Ok(json!(name))
    })
  };

  let start = Instant::now();
  weave(WeaveConfig::new().with_max_workers(1), |w| {
    w.task(blocking("one"))?;
    w.task(blocking("two"))?;
    Ok::<_, RuntimeError>(())
  })
  .await
  .unwrap();
  assert!(start.elapsed() >= Duration::from_millis(200));

  let start = Instant::now();
  weave(WeaveConfig::new().with_max_workers(2), |w| {
    w.task(blocking("one"))?;
    w.task(blocking("two"))?;
    Ok::<_, RuntimeError>(())
  })
  .await
  .unwrap();
  assert!(start.elapsed() < Duration::from_millis(190));
}

#[tokio::test]
async fn test_failure_cancels_siblings_and_skips_dependents() {
  let sibling_finished = Arc::new(AtomicBool::new(false));
  let dependent_started = Arc::new(AtomicBool::new(false));
  let (finished, started) = (
    Arc::clone(&sibling_finished),
    Arc::clone(&dependent_started),
  );

  let mut weave = Weave::begin(WeaveConfig::default()).unwrap();
  weave
    .task(Task::cooperative("quick", |_| async { Ok(json!("done")) }))
    .unwrap()
    .task(Task::cooperative("fails", |_| async {
      tokio::time::sleep(Duration::from_millis(20)).await;
      Err::<Value, BoxError>(Box::new(Boom))
    }))
    .unwrap()
    .task(Task::cooperative("slow", move |_| {
      let finished = Arc::clone(&finished);
      async move {
        tokio::time::sleep(Duration::from_secs(2)).await;
        finished.store(true, Ordering::SeqCst);
        Ok(Value::Null)
      }
    }))
    .unwrap()
    .task(
      Task::cooperative("after", move |_| {
        started.store(true, Ordering::SeqCst);
        async { Ok(Value::Null) }
      })
      .params(["fails"]),
    )
    .unwrap();

  let start = Instant::now();
  let err = weave.end().await.unwrap_err();
  assert!(start.elapsed() < Duration::from_secs(1));

  let failure = err.task_failure().expect("should be a task failure");
  assert_eq!(failure.task(), "fails");
  assert!(failure.downcast_ref::<Boom>().is_some());
  assert_eq!(failure.error().to_string(), "boom");

  assert!(!sibling_finished.load(Ordering::SeqCst));
  assert!(!dependent_started.load(Ordering::SeqCst));
  assert_eq!(weave.state(), WeaveState::TaskFailed);

  let result = weave.result().expect("result kept after failure");
  assert_eq!(result["quick"], json!("done"));
  assert!(!result.contains("slow"));
  let kept = result.exception().expect("exception recorded");
  assert!(Arc::ptr_eq(&kept.source_arc(), &failure.source_arc()));
}

#[tokio::test]
async fn test_mapped_item_failure_fails_the_run() {
  let err = weave(WeaveConfig::default(), |w| {
    w.task(
      Task::cooperative("checked", |args| async move {
        let n: i64 = args.item_as()?;
        if n == 3 {
          return Err(Box::new(Boom) as BoxError);
        }
        Ok::<_, BoxError>(json!(n))
      })
      .params(["n"])
      .map_items((0..5).map(|n| json!(n))),
    )?;
    Ok::<_, RuntimeError>(())
  })
  .await
  .unwrap_err();

  let failure = err.task_failure().unwrap();
  assert_eq!(failure.task(), "checked");
  assert!(failure.downcast_ref::<Boom>().is_some());
}

#[tokio::test]
async fn test_mapped_item_failure_cancels_in_flight_items() {
  let finished = Arc::new(AtomicUsize::new(0));
  let counter = Arc::clone(&finished);

  let mut weave = Weave::begin(WeaveConfig::default()).unwrap();
  weave
    .task(
      Task::cooperative("items", move |args| {
        let finished = Arc::clone(&counter);
        async move {
          let n: i64 = args.item_as()?;
          if n == 0 {
            tokio::time::sleep(Duration::from_millis(10)).await;
            return Err(Box::new(Boom) as BoxError);
          }
          tokio::time::sleep(Duration::from_secs(2)).await;
          finished.fetch_add(1, Ordering::SeqCst);
          Ok::<_, BoxError>(json!(n))
        }
      })
      .params(["n"])
      .map_items((0..4).map(|n| json!(n))),
    )
    .unwrap();

  let start = Instant::now();
  let err = weave.end().await.unwrap_err();
  assert!(start.elapsed() < Duration::from_secs(1));
  assert_eq!(err.task_failure().unwrap().task(), "items");
  assert_eq!(finished.load(Ordering::SeqCst), 0);
  assert!(!weave.result().unwrap().contains("items"));
}

#[tokio::test]
async fn test_timeout_cancels_running_sibling() {
  let sibling_finished = Arc::new(AtomicBool::new(false));
  let finished = Arc::clone(&sibling_finished);

  let mut weave = Weave::begin(WeaveConfig::default()).unwrap();
  weave
    .task(sleeper("deadline", 1_000).timeout(Duration::from_millis(20)))
    .unwrap()
    .task(Task::cooperative("slow", move |_| {
      let finished = Arc::clone(&finished);
      async move {
        tokio::time::sleep(Duration::from_secs(2)).await;
        finished.store(true, Ordering::SeqCst);
        Ok(Value::Null)
      }
    }))
    .unwrap();

  let start = Instant::now();
  let err = weave.end().await.unwrap_err();
  assert!(start.elapsed() < Duration::from_secs(1));

  let failure = err.task_failure().unwrap();
  assert_eq!(failure.task(), "deadline");
  assert!(matches!(
    failure.downcast_ref::<RuntimeError>(),
    Some(RuntimeError::Timeout { .. })
  ));
  assert!(!sibling_finished.load(Ordering::SeqCst));
  assert_eq!(weave.state(), WeaveState::TaskFailed);
}

#[tokio::test]
async fn test_panicking_task_is_reported() {
  let err = weave(WeaveConfig::default(), |w| {
    w.task(Task::cooperative("explodes", |_| async {
      if true {
        panic!("kaboom");
      }
      Ok(Value::Null)
    }))?;
    Ok::<_, RuntimeError>(())
  })
  .await
  .unwrap_err();

  let failure = err.task_failure().unwrap();
  match failure.downcast_ref::<RuntimeError>() {
    Some(RuntimeError::Panicked { task, message }) => {
      assert_eq!(task, "explodes");
      assert_eq!(message, "kaboom");
    }
    other => panic!("unexpected error: {other:?}"),
  }
}

#[tokio::test]
async fn test_unresolved_dependency_runs_nothing() {
  let ran = Arc::new(AtomicBool::new(false));
  let flag = Arc::clone(&ran);

  let mut weave = Weave::begin(WeaveConfig::default()).unwrap();
  weave
    .task(Task::cooperative("data", move |_| {
      flag.store(true, Ordering::SeqCst);
      async { Ok(json!(1)) }
    }))
    .unwrap()
    .task(
      Task::cooperative("consumer", |_| async { Ok(Value::Null) })
        .params(["unavailable_dependency"]),
    )
    .unwrap();

  let err = weave.end().await.unwrap_err();
  match &err {
    RuntimeError::Graph(GraphError::UnresolvedDependencies {
      task, unresolved, ..
    }) => {
      assert_eq!(task, "consumer");
      assert_eq!(unresolved, &vec!["unavailable_dependency".to_string()]);
    }
    other => panic!("unexpected error: {other}"),
  }
  assert!(err.to_string().contains("consumer"));
  assert!(!ran.load(Ordering::SeqCst));
  assert_eq!(weave.state(), WeaveState::GraphFailed);
  assert!(weave.result().is_none());
}

#[tokio::test]
async fn test_cycle_runs_nothing() {
  let calls = Arc::new(AtomicUsize::new(0));
  let counting = |name: &'static str, dep: &'static str| {
    let calls = Arc::clone(&calls);
    Task::cooperative(name, move |_| {
      calls.fetch_add(1, Ordering::SeqCst);
      async { Ok(Value::Null) }
    })
    .params([dep])
  };

  let err = weave(WeaveConfig::default(), |w| {
    w.task(counting("p", "q"))?;
    w.task(counting("q", "p"))?;
    Ok::<_, RuntimeError>(())
  })
  .await
  .unwrap_err();

  assert!(matches!(err, RuntimeError::Graph(GraphError::Cycle { .. })));
  assert_eq!(calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_duplicate_names_are_rejected() {
  let mut weave = Weave::begin(WeaveConfig::default()).unwrap();
  weave.seed("shared", json!(1)).unwrap();
  let err = weave
    .task(Task::cooperative("shared", |_| async { Ok(Value::Null) }))
    .unwrap_err();
  assert!(matches!(err, RuntimeError::DuplicateTask { name } if name == "shared"));
}

#[tokio::test]
async fn test_retries_until_success() {
  let attempts = Arc::new(AtomicU32::new(0));
  let seen = Arc::clone(&attempts);

  let result = weave(WeaveConfig::default(), move |w| {
    w.task(
      Task::cooperative("flaky", move |_| {
        let attempt = seen.fetch_add(1, Ordering::SeqCst) + 1;
        async move {
          if attempt < 3 {
            return Err::<Value, BoxError>(format!("attempt {attempt} failed").into());
          }
          Ok(json!(attempt))
        }
      })
      .retries(2),
    )?;
    Ok::<_, RuntimeError>(())
  })
  .await
  .unwrap();

  assert_eq!(result["flaky"], json!(3));
  assert_eq!(attempts.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn test_exhausted_retries_return_last_error() {
  let attempts = Arc::new(AtomicU32::new(0));
  let seen = Arc::clone(&attempts);

  let err = weave(WeaveConfig::default(), move |w| {
    w.task(
      Task::cooperative("flaky", move |_| {
        let attempt = seen.fetch_add(1, Ordering::SeqCst) + 1;
        async move { Err::<Value, BoxError>(format!("attempt {attempt} failed").into()) }
      })
      .retries(1),
    )?;
    Ok::<_, RuntimeError>(())
  })
  .await
  .unwrap_err();

  assert_eq!(
    err.task_failure().unwrap().error().to_string(),
    "attempt 2 failed"
  );
  assert_eq!(attempts.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_timeout_fails_slow_attempt() {
  let err = weave(WeaveConfig::default(), |w| {
    w.task(sleeper("slow", 1_000).timeout(Duration::from_millis(50)))?;
    Ok::<_, RuntimeError>(())
  })
  .await
  .unwrap_err();

  let failure = err.task_failure().unwrap();
  let inner = failure.downcast_ref::<RuntimeError>().unwrap();
  assert!(inner.is_timeout());
}

#[derive(Debug)]
enum SetupError {
  Runtime(RuntimeError),
  Rejected(&'static str),
}

impl From<RuntimeError> for SetupError {
  fn from(e: RuntimeError) -> Self {
    SetupError::Runtime(e)
  }
}

#[tokio::test]
async fn test_registration_error_passes_through() {
  let err = weave(WeaveConfig::default(), |w| {
    w.task(sleeper("never", 10))?;
    Err(SetupError::Rejected("bad input"))
  })
  .await
  .unwrap_err();

  assert!(matches!(err, SetupError::Rejected("bad input")));
}

#[tokio::test]
async fn test_abort_closes_without_running() {
  let ran = Arc::new(AtomicBool::new(false));
  let ran_in = Arc::clone(&ran);

  let mut weave = Weave::begin(WeaveConfig::default()).unwrap();
  weave
    .task(Task::cooperative("skipped", move |_| {
      let ran = Arc::clone(&ran_in);
      async move {
        ran.store(true, Ordering::SeqCst);
        Ok(json!(null))
      }
    }))
    .unwrap();
  let store = weave.store();

  let err = weave.abort(SetupError::Rejected("changed my mind"));

  assert!(matches!(err, SetupError::Rejected("changed my mind")));
  assert_eq!(weave.state(), WeaveState::GraphFailed);
  assert!(store.is_closed());
  assert!(matches!(weave.end().await, Err(RuntimeError::Closed)));
  assert!(!ran.load(Ordering::SeqCst));
}

#[tokio::test]
async fn test_rate_limited_map_spaces_item_starts() {
  let started = Instant::now();
  let result = weave(WeaveConfig::default(), |w| {
    w.task(
      Task::cooperative("paced", |args| async move {
        Ok(args.item().cloned().unwrap_or_default())
      })
      .params(["item"])
      .map_items([json!("a"), json!("b"), json!("c")])
      .limit_per_minute(1200),
    )?;
    Ok::<_, RuntimeError>(())
  })
  .await
  .unwrap();

  assert_eq!(result["paced"], json!(["a", "b", "c"]));
  assert!(started.elapsed() >= Duration::from_millis(90));
}

#[tokio::test]
async fn test_invalid_config_is_rejected() {
  let err = weave(WeaveConfig::new().with_max_workers(0), |_| {
    Ok::<_, SetupError>(())
  })
  .await
  .unwrap_err();
  assert!(matches!(err, SetupError::Runtime(RuntimeError::Config { .. })));
}

#[tokio::test]
async fn test_end_twice_is_closed_and_results_are_stable() {
  let mut weave = Weave::begin(WeaveConfig::default()).unwrap();
  weave.task(sleeper("only", 1)).unwrap();
  let first = weave.end().await.unwrap();

  assert_eq!(first.get("only"), first.get("only"));
  assert_eq!(weave.result().unwrap()["only"], json!("only"));
  assert!(matches!(weave.end().await, Err(RuntimeError::Closed)));
  assert!(matches!(
    weave.task(sleeper("late", 1)),
    Err(RuntimeError::Closed)
  ));
}

#[tokio::test]
async fn test_store_wait_for_observes_running_weave() {
  let mut weave = Weave::begin(WeaveConfig::default()).unwrap();
  weave
    .task(sleeper("first", 20))
    .unwrap()
    .task(Task::cooperative("second", |_| async { Ok(json!(2)) }).params(["first"]))
    .unwrap();

  let store = weave.store();
  let waiter = tokio::spawn(async move { store.wait_for("second").await });
  weave.end().await.unwrap();

  assert_eq!(waiter.await.unwrap(), Some(json!(2)));
}

#[tokio::test]
async fn test_nested_weave_inside_task() {
  let result = weave(WeaveConfig::default(), |w| {
    w.task(Task::cooperative("outer", |_| async {
      let inner = weave(WeaveConfig::default(), |w| {
        w.task(Task::cooperative("inner", |_| async { Ok(json!(41)) }))?;
        Ok::<_, RuntimeError>(())
      })
      .await?;
      let value: i64 = inner.get_as("inner")?;
      Ok::<_, BoxError>(json!(value + 1))
    }))?;
    Ok::<_, RuntimeError>(())
  })
  .await
  .unwrap();

  assert_eq!(result["outer"], json!(42));
}
