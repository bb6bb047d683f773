#![allow(clippy::unwrap_used, clippy::expect_used)]
//! End-to-end tests for the local worker-pool backend.

use std::collections::BTreeMap;

use sweeprun::{
    FailureMode, InputSpec, LocalExecutor, OutputSpec, ParamSet, ParamStream, ParamValue,
    ProcessTemplate, Processor, Resolvable, Source, SweepRunError,
};

fn param_sets(n: i64) -> ParamStream {
    Box::new((0..n).map(|i| -> ParamSet {
        BTreeMap::from([("i".to_string(), ParamValue::from(i))])
    }))
}

fn exit_zero_template() -> ProcessTemplate {
    ProcessTemplate::builder()
        .command("/bin/sh")
        .args(["-c", "exit 0"])
        .build()
        .unwrap()
}

#[tokio::test]
async fn three_param_sets_yield_three_results_single_worker() {
    let dir = tempfile::tempdir().unwrap();
    let executor = LocalExecutor::builder()
        .workers(1)
        .temp_dir(dir.path())
        .build()
        .unwrap();

    let results = executor
        .process(exit_zero_template(), param_sets(3))
        .await
        .unwrap()
        .try_collect()
        .await
        .unwrap();

    assert_eq!(results.len(), 3);
    for (_, result) in &results {
        assert_eq!(result.exit_code(), 0);
    }

    executor.shutdown().await.unwrap();
}

#[tokio::test]
async fn three_param_sets_yield_three_results_three_workers() {
    let dir = tempfile::tempdir().unwrap();
    let executor = LocalExecutor::builder()
        .workers(3)
        .temp_dir(dir.path())
        .build()
        .unwrap();

    let results = executor
        .process(exit_zero_template(), param_sets(3))
        .await
        .unwrap()
        .try_collect()
        .await
        .unwrap();

    assert_eq!(results.len(), 3);
    for (_, result) in &results {
        assert_eq!(result.exit_code(), 0);
    }

    executor.shutdown().await.unwrap();
}

#[tokio::test]
async fn exit_13_is_classified_as_process_failure() {
    let dir = tempfile::tempdir().unwrap();
    let template = ProcessTemplate::builder()
        .command("bash")
        .args(["-c", "exit 13"])
        .build()
        .unwrap();
    let executor = LocalExecutor::builder()
        .temp_dir(dir.path())
        .build()
        .unwrap();

    let err = executor
        .process(template, param_sets(1))
        .await
        .unwrap()
        .try_collect()
        .await
        .unwrap_err();

    assert!(matches!(
        err.root(),
        SweepRunError::ProcessFailed {
            exit_code: Some(13),
            ..
        }
    ));

    executor.shutdown().await.unwrap();
}

#[tokio::test]
async fn pinned_input_conflict_detected_before_spawn() {
    let dir = tempfile::tempdir().unwrap();
    let pinned = dir.path().join("input.dat");
    std::fs::write(&pinned, b"already here").unwrap();
    let marker = dir.path().join("marker");

    // The command would create the marker file; a resource conflict must
    // surface before any spawn, leaving the marker absent.
    let template = ProcessTemplate::builder()
        .command("/bin/sh")
        .args([
            Resolvable::literal("-c"),
            Resolvable::format("touch {touch_path}"),
        ])
        .input_file(
            InputSpec::named("data", Source::bytes(b"fresh".to_vec())).pinned(pinned.clone()),
        )
        .build()
        .unwrap();

    let executor = LocalExecutor::builder()
        .temp_dir(dir.path())
        .build()
        .unwrap();

    let params: ParamStream = Box::new(std::iter::once(ParamSet::from([(
        "touch_path".to_string(),
        ParamValue::from(marker.display().to_string()),
    )])));

    let err = executor
        .process(template, params)
        .await
        .unwrap()
        .try_collect()
        .await
        .unwrap_err();

    assert!(matches!(
        err.root(),
        SweepRunError::ResourceConflict { .. }
    ));
    assert!(!marker.exists());
    assert_eq!(std::fs::read(&pinned).unwrap(), b"already here");

    executor.shutdown().await.unwrap();
}

#[tokio::test]
async fn failing_invocation_does_not_cancel_siblings() {
    let dir = tempfile::tempdir().unwrap();

    // Parameter set 1 exits non-zero; the other two succeed.
    let template = ProcessTemplate::builder()
        .command("/bin/sh")
        .args([
            Resolvable::literal("-c"),
            Resolvable::format("exit {code}"),
        ])
        .build()
        .unwrap();
    let executor = LocalExecutor::builder()
        .workers(3)
        .temp_dir(dir.path())
        .build()
        .unwrap();

    let params: ParamStream = Box::new([0i64, 5, 0].into_iter().map(|code| -> ParamSet {
        BTreeMap::from([("code".to_string(), ParamValue::from(code))])
    }));

    let mut stream = executor.process(template, params).await.unwrap();
    let mut ok = 0;
    let mut failed = 0;
    while let Some(outcome) = stream.next().await {
        match outcome {
            Ok((_, result)) => {
                assert_eq!(result.exit_code(), 0);
                ok += 1;
            }
            Err(e) => {
                assert!(matches!(
                    e.root(),
                    SweepRunError::ProcessFailed {
                        exit_code: Some(5),
                        ..
                    }
                ));
                failed += 1;
            }
        }
    }
    assert_eq!((ok, failed), (2, 1));

    executor.shutdown().await.unwrap();
}

#[tokio::test]
async fn failed_invocation_error_names_its_params() {
    let dir = tempfile::tempdir().unwrap();
    let template = ProcessTemplate::builder()
        .command("/bin/false")
        .build()
        .unwrap();
    let executor = LocalExecutor::builder()
        .temp_dir(dir.path())
        .build()
        .unwrap();

    let params: ParamStream = Box::new(std::iter::once(ParamSet::from([(
        "which".to_string(),
        ParamValue::from("this one"),
    )])));

    let err = executor
        .process(template, params)
        .await
        .unwrap()
        .try_collect()
        .await
        .unwrap_err();

    match err {
        SweepRunError::Invocation { params, .. } => {
            assert_eq!(
                params.get("which").map(ToString::to_string),
                Some("this one".to_string())
            );
        }
        other => panic!("expected an invocation error, got {other}"),
    }

    executor.shutdown().await.unwrap();
}

#[tokio::test]
async fn temp_captures_survive_until_shutdown() {
    let dir = tempfile::tempdir().unwrap();
    let template = ProcessTemplate::builder()
        .command("/bin/echo")
        .arg("kept until shutdown")
        .capture_stdout(OutputSpec::capture())
        .build()
        .unwrap();
    let executor = LocalExecutor::builder()
        .temp_dir(dir.path())
        .build()
        .unwrap();

    let results = executor
        .process(template, param_sets(1))
        .await
        .unwrap()
        .try_collect()
        .await
        .unwrap();

    // The stdout temp file is still readable after the sweep finished.
    let (_, result) = &results[0];
    let stdout_path = result.stdout().unwrap().open_path().to_path_buf();
    assert!(stdout_path.exists());
    assert_eq!(
        result.stdout().unwrap().read_to_string().unwrap(),
        "kept until shutdown\n"
    );

    // Shutdown drains the executor-wide registry and deletes it.
    executor.shutdown().await.unwrap();
    assert!(!stdout_path.exists());
}

#[tokio::test]
async fn failed_invocation_cleans_its_temp_files() {
    let dir = tempfile::tempdir().unwrap();
    let template = ProcessTemplate::builder()
        .command("/bin/false")
        .capture_stdout(OutputSpec::capture())
        .stdin(InputSpec::stream(Source::bytes(b"unused".to_vec())))
        .build()
        .unwrap();
    let executor = LocalExecutor::builder()
        .temp_dir(dir.path())
        .build()
        .unwrap();

    let err = executor
        .process(template, param_sets(1))
        .await
        .unwrap()
        .try_collect()
        .await
        .unwrap_err();
    assert!(matches!(err.root(), SweepRunError::ProcessFailed { .. }));

    executor.shutdown().await.unwrap();

    // Both the stdin temp file and the stdout capture are gone.
    let leftovers: Vec<_> = std::fs::read_dir(dir.path()).unwrap().collect();
    assert!(leftovers.is_empty(), "leaked temp files: {leftovers:?}");
}

#[tokio::test]
async fn pinned_output_missing_after_run_is_failure() {
    let dir = tempfile::tempdir().unwrap();
    let expected = dir.path().join("result.csv");

    // The process deletes the pre-created output; the deferred existence
    // check turns that into a process failure.
    let template = ProcessTemplate::builder()
        .command("/bin/sh")
        .args([
            Resolvable::literal("-c"),
            Resolvable::format("rm {__file_out}"),
        ])
        .output_file(OutputSpec::named("out").pinned(expected.clone()))
        .build()
        .unwrap();
    let executor = LocalExecutor::builder()
        .temp_dir(dir.path())
        .build()
        .unwrap();

    let err = executor
        .process(template, param_sets(1))
        .await
        .unwrap()
        .try_collect()
        .await
        .unwrap_err();

    assert!(matches!(
        err.root(),
        SweepRunError::ProcessFailed {
            exit_code: None,
            ..
        }
    ));
    assert!(!expected.exists());

    executor.shutdown().await.unwrap();
}

#[tokio::test]
async fn custom_failure_mode_overrides_default() {
    let dir = tempfile::tempdir().unwrap();

    // Exit code 3 counts as success here; only stdout content fails.
    let template = ProcessTemplate::builder()
        .command("/bin/sh")
        .args(["-c", "echo ERROR: boom; exit 3"])
        .capture_stdout(OutputSpec::capture())
        .failure_mode(FailureMode::none().with_stdout(|stdout| {
            stdout
                .read_to_string()
                .map(|text| text.contains("ERROR"))
                .unwrap_or(true)
        }))
        .build()
        .unwrap();
    let executor = LocalExecutor::builder()
        .temp_dir(dir.path())
        .build()
        .unwrap();

    let err = executor
        .process(template, param_sets(1))
        .await
        .unwrap()
        .try_collect()
        .await
        .unwrap_err();
    assert!(matches!(
        err.root(),
        SweepRunError::ProcessFailed { reason, .. } if reason.contains("stdout")
    ));

    executor.shutdown().await.unwrap();
}

#[tokio::test]
async fn results_cover_all_param_sets_out_of_order() {
    let dir = tempfile::tempdir().unwrap();
    let template = ProcessTemplate::builder()
        .command("/bin/sh")
        .args([
            Resolvable::literal("-c"),
            Resolvable::format("sleep 0.0{i}; echo {i}"),
        ])
        .capture_stdout(OutputSpec::capture())
        .build()
        .unwrap();
    let executor = LocalExecutor::builder()
        .workers(4)
        .temp_dir(dir.path())
        .build()
        .unwrap();

    let results = executor
        .process(template, param_sets(8))
        .await
        .unwrap()
        .try_collect()
        .await
        .unwrap();

    // Each pair is internally consistent regardless of completion order.
    let mut seen: Vec<i64> = Vec::new();
    for (params, result) in &results {
        let i: i64 = params.get("i").unwrap().to_string().parse().unwrap();
        let echoed: i64 = result
            .stdout()
            .unwrap()
            .read_to_string()
            .unwrap()
            .trim()
            .parse()
            .unwrap();
        assert_eq!(i, echoed);
        seen.push(i);
    }
    seen.sort_unstable();
    assert_eq!(seen, (0..8).collect::<Vec<_>>());

    executor.shutdown().await.unwrap();
}

#[test]
fn processor_trait_is_object_safe_over_both_backends() {
    fn takes_dyn(_: &dyn Processor) {}
    let local = LocalExecutor::builder().build().unwrap();
    takes_dyn(&local);
}

#[tokio::test]
async fn no_copy_input_reuses_existing_artifact() {
    let dir = tempfile::tempdir().unwrap();
    let artifact = dir.path().join("big.dat");
    std::fs::write(&artifact, b"big artifact").unwrap();

    let template = ProcessTemplate::builder()
        .command("/bin/sh")
        .args([
            Resolvable::literal("-c"),
            Resolvable::format("cat {__file_data}"),
        ])
        .input_file(InputSpec::named("data", Source::path(artifact.clone())))
        .capture_stdout(OutputSpec::capture())
        .build()
        .unwrap();
    let executor = LocalExecutor::builder()
        .temp_dir(dir.path())
        .build()
        .unwrap();

    let results = executor
        .process(template, param_sets(1))
        .await
        .unwrap()
        .try_collect()
        .await
        .unwrap();

    let (_, result) = &results[0];
    assert_eq!(
        result.stdout().unwrap().read_to_string().unwrap(),
        "big artifact"
    );
    // The process read the artifact in place.
    assert_eq!(
        result.input_file("data").unwrap().open_path(),
        artifact.as_path()
    );

    executor.shutdown().await.unwrap();
    assert!(artifact.exists());
}
