//! Integration tests for the batch post-processing executor
//!
//! A small shell script stands in for the audio tool: it copies the `-i`
//! input to the last argument and records its arguments next to the output.

use std::path::{Path, PathBuf};

use voxhost::audio::{worker_count, FilterOptions, PostExecutor, PostJob};
use voxhost::{format_legacy, JobOutcome};

#[cfg(unix)]
mod fake_tool {
    use std::os::unix::fs::PermissionsExt;
    use std::path::{Path, PathBuf};
    use std::sync::{Mutex, MutexGuard};

    static SPAWN_LOCK: Mutex<()> = Mutex::new(());

    const SCRIPT: &str = r#"#!/bin/sh
input=""
prev=""
out=""
for arg in "$@"; do
  if [ "$prev" = "-i" ]; then input="$arg"; fi
  prev="$arg"
  out="$arg"
done
if [ ! -f "$input" ]; then
  echo "$input: No such file or directory" >&2
  exit 1
fi
echo "$@" > "$out.args"
cp "$input" "$out"
"#;

    /// Serializes tests that write and then execute a script
    pub fn lock() -> MutexGuard<'static, ()> {
        SPAWN_LOCK.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn install(dir: &Path) -> PathBuf {
        let path = dir.join("fake-ffmpeg");
        std::fs::write(&path, SCRIPT).unwrap();
        let mut perms = std::fs::metadata(&path).unwrap().permissions();
        perms.set_mode(0o755);
        std::fs::set_permissions(&path, perms).unwrap();
        path
    }
}

fn write_input(dir: &Path, name: &str) -> PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, b"RIFF").unwrap();
    path
}

#[test]
fn test_worker_sizing() {
    assert_eq!(worker_count(5, 0, 8), 5);
    assert_eq!(worker_count(20, 0, 8), 7);
    assert_eq!(worker_count(20, 0, 1), 1);
    assert_eq!(worker_count(10, 3, 8), 3);
    assert_eq!(worker_count(2, 16, 8), 2);
}

#[test]
fn test_empty_batch() {
    let executor = PostExecutor::new("/nonexistent/audio-tool");
    assert!(executor.run(&[]).unwrap().is_empty());
}

#[test]
fn test_missing_tool_fails_every_job() {
    let dir = tempfile::tempdir().unwrap();
    let input = write_input(dir.path(), "a.wav");
    let jobs = vec![
        PostJob::new(&input, dir.path().join("a_out.wav"), FilterOptions::default()),
        PostJob::new(&input, dir.path().join("b_out.wav"), FilterOptions::default()),
    ];

    let outcomes = PostExecutor::new(dir.path().join("no-such-tool")).run(&jobs).unwrap();
    assert_eq!(outcomes.len(), 2);
    for outcome in &outcomes {
        let diagnostic = outcome.diagnostic().unwrap();
        assert!(diagnostic.contains("no-such-tool"), "{}", diagnostic);
    }
}

#[cfg(unix)]
#[test]
fn test_failing_job_does_not_affect_siblings() {
    let _guard = fake_tool::lock();
    let dir = tempfile::tempdir().unwrap();
    let tool = fake_tool::install(dir.path());

    let options = FilterOptions {
        tempo: Some(1.25),
        ..Default::default()
    };
    let jobs: Vec<PostJob> = (0..5)
        .map(|i| {
            let input = if i == 2 {
                dir.path().join("missing.wav")
            } else {
                write_input(dir.path(), &format!("in_{}.wav", i))
            };
            PostJob::new(input, dir.path().join(format!("out_{}.wav", i)), options.clone())
        })
        .collect();

    let outcomes = PostExecutor::new(&tool).with_workers(3).run(&jobs).unwrap();

    assert_eq!(outcomes.len(), 5);
    for (i, outcome) in outcomes.iter().enumerate() {
        if i == 2 {
            let diagnostic = outcome.diagnostic().unwrap();
            assert!(diagnostic.contains("No such file"), "{}", diagnostic);
            assert!(!jobs[i].output.exists());
        } else {
            assert_eq!(outcome, &JobOutcome::Success(jobs[i].output.clone()));
            assert!(jobs[i].output.exists());
        }
    }

    let legacy = format_legacy(&outcomes);
    let lines: Vec<&str> = legacy.lines().collect();
    assert_eq!(lines, vec!["-", "-", lines[2], "-", "-"]);
    assert_ne!(lines[2], "-");
}

#[cfg(unix)]
#[test]
fn test_filter_graph_reaches_tool() {
    let _guard = fake_tool::lock();
    let dir = tempfile::tempdir().unwrap();
    let tool = fake_tool::install(dir.path());
    let input = write_input(dir.path(), "voice.wav");
    let output = dir.path().join("voice_out.wav");

    let options = FilterOptions {
        hz: Some(44100),
        pad_start: Some(250.0),
        pad_end: Some(500.0),
        pitch_mult: Some(2.0),
        tempo: Some(1.25),
        amplitude: Some(0.8),
        bit_depth: None,
    };
    let outcomes = PostExecutor::new(&tool)
        .run(&[PostJob::new(&input, &output, options)])
        .unwrap();
    assert!(outcomes[0].is_success());

    let args = std::fs::read_to_string(dir.path().join("voice_out.wav.args")).unwrap();
    assert!(args.contains("-ar 44100"), "{}", args);
    assert!(
        args.contains("adelay=250,apad=pad_dur=500ms,asetrate=44100,atempo=0.5,atempo=1.25,volume=0.8"),
        "{}",
        args
    );
}

#[cfg(unix)]
#[test]
fn test_stale_output_is_removed_before_running() {
    let _guard = fake_tool::lock();
    let dir = tempfile::tempdir().unwrap();
    let tool = fake_tool::install(dir.path());
    let output = dir.path().join("stale.wav");
    std::fs::write(&output, b"old render").unwrap();

    let jobs = vec![PostJob::new(
        dir.path().join("missing.wav"),
        &output,
        FilterOptions::default(),
    )];
    let outcomes = PostExecutor::new(&tool).run(&jobs).unwrap();

    assert!(!outcomes[0].is_success());
    assert!(!output.exists());
}

#[test]
fn test_jobs_parse_from_json() {
    let json = r#"[
        {"input": "a.wav", "output": "a.mp3", "options": {"padStart": 100, "tempo": 1.1}},
        {"input": "b.wav", "output": "b.wav"}
    ]"#;
    let jobs: Vec<PostJob> = serde_json::from_str(json).unwrap();

    assert_eq!(jobs.len(), 2);
    assert_eq!(jobs[0].options.pad_start, Some(100.0));
    assert_eq!(jobs[0].options.tempo, Some(1.1));
    assert_eq!(jobs[1].options, FilterOptions::default());
    assert_eq!(jobs[1].output, Path::new("b.wav"));
}
