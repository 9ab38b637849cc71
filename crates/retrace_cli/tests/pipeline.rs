use retrace_cli::{
    run_complete, run_inspect, CompleteOptions, InspectOptions, COMPLETED_METHOD_IDS,
    METHOD_CALLS, METHOD_IDS, PRETRACE, PROCESSED_PRETRACE, TRACE,
};
use retrace_replay::AlignStats;
use std::fs;
use std::path::Path;
use std::process::Command;

const MAIN: &str = "\
class Main {
  static void main(String[] args) {
    int a = 1;
    // call the helper
    helper(a);
    int b = a + 1;
  }

  static void helper(int x) {
    x++;
    if (x > 2) {
      x--;
    }
  }
}
";

const METHODS: &str = "\
1 2 7 com/acme/Main.java Main main ([Ljava/lang/String;)V
2 9 14 com/acme/Main.java Main helper (I)V
";

const CALLS: &str = "\
-1 1 args
@1:3
5 2 1
@2:10
- 2
@1:6
- 1
";

const PRETRACE_LINES: [&str; 11] = [
    "1 args", "[2,2]", "[3,3]", "[5,5]", "2 1", "[9,9]", "[10,11]", "- 2", "[5,7]", "[6,7]",
    "- 1",
];

/// Source root plus a trace directory holding the raw tracer output
fn layout(root: &Path, source: &str, calls: &str) -> (String, std::path::PathBuf) {
    let src = root.join("project");
    fs::create_dir_all(src.join("com/acme")).unwrap();
    fs::write(src.join("com/acme/Main.java"), source).unwrap();

    let trace = root.join("trace");
    fs::create_dir_all(&trace).unwrap();
    fs::write(trace.join(METHOD_IDS), METHODS).unwrap();
    fs::write(trace.join(METHOD_CALLS), calls).unwrap();
    fs::write(trace.join("com-acme-MainBB"), "2\n3\n9\n10\n12\n").unwrap();
    (src.display().to_string(), trace)
}

fn read(path: &Path) -> Vec<String> {
    fs::read_to_string(path)
        .unwrap()
        .lines()
        .map(str::to_string)
        .collect()
}

#[test]
fn test_complete_without_comparison() {
    let root = tempfile::tempdir().unwrap();
    let (src, trace) = layout(root.path(), MAIN, CALLS);

    let report = run_complete(&CompleteOptions::new(&trace, src)).unwrap();
    assert_eq!(report.methods, 2);
    assert_eq!(report.unresolved, 0);
    assert_eq!(report.completion.exception_returns, 0);
    assert!(report.alignment.is_none());

    assert_eq!(read(&trace.join(PRETRACE)), PRETRACE_LINES);
    let final_trace = read(&trace.join(TRACE));
    assert_eq!(final_trace[4], "2 1");
    assert_eq!(final_trace[7], "- 2 1");
    assert_eq!(final_trace[10], "- 1 args");

    let completed = read(&trace.join(COMPLETED_METHOD_IDS));
    assert_eq!(
        completed[0],
        "1 2 7 src/com/acme/Main.java Main main ([Ljava/lang/String;)V"
    );
    assert!(trace.join("src/com/acme/Main.java").exists());
}

#[test]
fn test_complete_with_comparison() {
    let earlier = tempfile::tempdir().unwrap();
    let (earlier_src, reference) = layout(earlier.path(), MAIN, CALLS);
    run_complete(&CompleteOptions::new(&reference, earlier_src)).unwrap();

    let now = tempfile::tempdir().unwrap();
    let changed = MAIN.replace("x++;", "x += 2;");
    let (src, trace) = layout(now.path(), &changed, CALLS);
    let stats = now.path().join("data.txt");
    let options = CompleteOptions::new(&trace, src)
        .with_comparison(&reference)
        .with_stats_path(&stats);
    let report = run_complete(&options).unwrap();

    let expected = AlignStats {
        divergences: 1,
        total_drift: 0,
    };
    assert_eq!(report.alignment, Some(expected));
    assert_eq!(AlignStats::read_all(&stats).unwrap(), vec![expected]);

    let processed = read(&trace.join(PROCESSED_PRETRACE));
    assert_eq!(processed[6], "* Difference in basic block content");
    assert_eq!(processed[7], "[10,11]");
    assert_eq!(processed[8], "* Reconvergence, return");
    assert_eq!(processed[9], "- 2");

    let inspected = run_inspect(
        &trace,
        &InspectOptions {
            divergence: true,
            ..InspectOptions::default()
        },
    )
    .unwrap();
    assert!(inspected.moved);
    let location = inspected.location.unwrap();
    assert_eq!(location.line, 10);
    assert_eq!(location.method.as_deref(), Some("Main.helper"));
    assert_eq!(inspected.call_stack, vec![1, 2]);
}

#[test]
fn test_inspect_function_and_steps() {
    let root = tempfile::tempdir().unwrap();
    let (src, trace) = layout(root.path(), MAIN, CALLS);
    run_complete(&CompleteOptions::new(&trace, src)).unwrap();

    let report = run_inspect(
        &trace,
        &InspectOptions {
            function: Some("^help".to_string()),
            steps: Some(1),
            ..InspectOptions::default()
        },
    )
    .unwrap();
    assert_eq!(report.positions, 11);
    let location = report.location.unwrap();
    assert_eq!(location.line, 10);
    assert_eq!(location.depth, 2);

    assert!(run_inspect(
        &trace,
        &InspectOptions {
            function: Some("(".to_string()),
            ..InspectOptions::default()
        }
    )
    .is_err());
}

#[test]
fn test_unresolved_source_keeps_going() {
    let root = tempfile::tempdir().unwrap();
    let (_, trace) = layout(root.path(), MAIN, CALLS);
    let empty = root.path().join("empty");
    fs::create_dir_all(&empty).unwrap();

    let options = CompleteOptions::new(&trace, empty.display().to_string());
    let report = run_complete(&options).unwrap();
    assert_eq!(report.unresolved, 2);
    assert_eq!(
        read(&trace.join(PRETRACE)),
        vec!["1 args", "2 1", "- 2", "- 1"]
    );
    assert!(read(&trace.join(COMPLETED_METHOD_IDS))[1].contains(" null "));
}

#[test]
fn test_malformed_trace_fails() {
    let root = tempfile::tempdir().unwrap();
    let (src, trace) = layout(root.path(), MAIN, "-1 1\n- 1\n- 1\n");
    let err = run_complete(&CompleteOptions::new(&trace, src)).unwrap_err();
    assert!(err.to_string().contains("empty call stack"));
    // records of earlier events stay written
    assert_eq!(read(&trace.join(PRETRACE)), vec!["1", "[2,2]", "- 1"]);
}

#[test]
fn test_binary_complete_and_inspect() {
    let root = tempfile::tempdir().unwrap();
    let (src, trace) = layout(root.path(), MAIN, CALLS);
    let bin = env!("CARGO_BIN_EXE_retrace");

    let status = Command::new(bin)
        .arg("complete")
        .arg(&trace)
        .arg(&src)
        .arg("--json")
        .status()
        .unwrap();
    assert!(status.success());
    assert!(trace.join(TRACE).exists());

    let output = Command::new(bin)
        .arg("inspect")
        .arg(&trace)
        .args(["--function", "helper"])
        .output()
        .unwrap();
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("Main.helper"));
    assert!(stdout.contains("stack: 1 > 2"));

    let missing = Command::new(bin)
        .arg("complete")
        .arg(root.path().join("nowhere"))
        .arg(&src)
        .status()
        .unwrap();
    assert!(!missing.success());
}
