//! Single-rank merge behavior: joins, projections, and re-runs.

mod common;

use common::{read_all_rows, row_multiset, write_dataset};
use tempfile::TempDir;

use meshlines::meshlines::comm::{Comm, World};
use meshlines::meshlines::lines::handle::DatasetHandle;
use meshlines::meshlines::merge::{self, MergeArgs, MergeEvent};

struct MergeFixture {
    _workspace: TempDir,
    output: DatasetHandle,
    left: DatasetHandle,
    right: DatasetHandle,
}

fn fixture(left_rows: &[&str], right_rows: &[&str]) -> MergeFixture {
    let workspace = TempDir::new().unwrap();
    let left_location = workspace.path().join("left");
    let right_location = workspace.path().join("right");

    write_dataset(&left_location, &[left_rows]);
    write_dataset(&right_location, &[right_rows]);

    MergeFixture {
        output: DatasetHandle::at(workspace.path().join("output")),
        left: DatasetHandle::at(left_location),
        right: DatasetHandle::at(right_location),
        _workspace: workspace,
    }
}

async fn run_merge(fixture: &MergeFixture, args: MergeArgs, ranks: usize) -> String {
    let output = fixture.output.clone();
    let left = fixture.left.clone();
    let right = fixture.right.clone();

    let results = World::run(ranks, move |mut comm: Comm<MergeEvent>| {
        let output = output.clone();
        let left = left.clone();
        let right = right.clone();
        let args = args.clone();
        async move { merge::merge(&mut comm, &output, &left, &right, &args).await }
    })
    .await;

    let mut message = None;
    for result in results {
        if let Some(text) = result.unwrap() {
            message = Some(text);
        }
    }
    message.expect("rank 0 reports the outcome")
}

fn on(columns: &[&str]) -> MergeArgs {
    MergeArgs {
        on: columns.iter().map(|c| c.to_string()).collect(),
        ..MergeArgs::default()
    }
}

#[tokio::test]
async fn single_column_inner_join() {
    let fixture = fixture(
        &[r#"{"k":1,"a":"x"}"#, r#"{"k":2,"a":"y"}"#],
        &[r#"{"k":1,"b":"p"}"#, r#"{"k":3,"b":"q"}"#],
    );

    let message = run_merge(&fixture, on(&["k"]), 1).await;
    assert_eq!(message, "joined 1 records.");

    let rows = read_all_rows(&fixture.output.state.location, 1);
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].to_text(), r#"{"k_l":1,"a_l":"x","k_r":1,"b_r":"p"}"#);
}

#[tokio::test]
async fn composite_key_with_different_names() {
    let fixture = fixture(&[r#"{"u":1,"v":"a"}"#], &[r#"{"x":1,"y":"a"}"#]);

    let args = MergeArgs {
        left_on: vec!["u".to_string(), "v".to_string()],
        right_on: vec!["x".to_string(), "y".to_string()],
        ..MergeArgs::default()
    };
    let message = run_merge(&fixture, args, 1).await;
    assert_eq!(message, "joined 1 records.");

    let rows = read_all_rows(&fixture.output.state.location, 1);
    assert_eq!(rows[0].to_text(), r#"{"u_l":1,"v_l":"a","x_r":1,"y_r":"a"}"#);
}

#[tokio::test]
async fn matching_group_produces_the_cartesian_product() {
    let fixture = fixture(
        &[r#"{"k":5,"a":1}"#, r#"{"k":5,"a":2}"#],
        &[r#"{"k":5,"b":1}"#, r#"{"k":5,"b":2}"#, r#"{"k":5,"b":3}"#],
    );

    let message = run_merge(&fixture, on(&["k"]), 1).await;
    assert_eq!(message, "joined 6 records.");

    let rows = read_all_rows(&fixture.output.state.location, 1);
    assert_eq!(rows.len(), 6);

    // every (a, b) combination appears exactly once
    let mut pairs: Vec<(i64, i64)> = rows
        .iter()
        .map(|row| {
            let fields = row.as_object().unwrap();
            let a = match fields.get("a_l").unwrap() {
                meshlines::JsonValue::Integer(v) => *v,
                other => panic!("unexpected a_l: {}", other),
            };
            let b = match fields.get("b_r").unwrap() {
                meshlines::JsonValue::Integer(v) => *v,
                other => panic!("unexpected b_r: {}", other),
            };
            (a, b)
        })
        .collect();
    pairs.sort_unstable();
    assert_eq!(pairs, vec![(1, 1), (1, 2), (1, 3), (2, 1), (2, 2), (2, 3)]);
}

#[tokio::test]
async fn projections_limit_output_but_keep_right_join_keys() {
    let fixture = fixture(
        &[r#"{"k":1,"a":"x"}"#, r#"{"k":2,"a":"y"}"#],
        &[r#"{"k":1,"b":"p"}"#, r#"{"k":3,"b":"q"}"#],
    );

    let args = MergeArgs {
        on: vec!["k".to_string()],
        left_columns: vec!["a".to_string()],
        ..MergeArgs::default()
    };
    run_merge(&fixture, args, 1).await;

    let rows = read_all_rows(&fixture.output.state.location, 1);
    assert_eq!(rows.len(), 1);
    // "k" is outside the left projection, but the right send list unions
    // the join key back in, so it survives as k_r
    assert_eq!(rows[0].to_text(), r#"{"a_l":"x","k_r":1,"b_r":"p"}"#);
}

#[tokio::test]
async fn every_output_key_is_suffixed_and_projected() {
    let fixture = fixture(
        &[r#"{"k":1,"a":"x","extra":true}"#],
        &[r#"{"k":1,"b":"p"}"#],
    );

    let args = MergeArgs {
        on: vec!["k".to_string()],
        left_columns: vec!["a".to_string()],
        right_columns: vec!["b".to_string()],
        ..MergeArgs::default()
    };
    run_merge(&fixture, args, 1).await;

    let rows = read_all_rows(&fixture.output.state.location, 1);
    for row in &rows {
        for key in row.as_object().unwrap().keys() {
            let (stem, suffix) = key.split_at(key.len() - 2);
            match suffix {
                "_l" => assert_eq!(stem, "a"),
                "_r" => assert_eq!(stem, "b"),
                other => panic!("unsuffixed output key {}{}", stem, other),
            }
        }
    }
}

#[tokio::test]
async fn rerunning_the_merge_reproduces_the_output() {
    let fixture = fixture(
        &[r#"{"k":1,"a":"x"}"#, r#"{"k":2,"a":"y"}"#, r#"{"k":2,"a":"z"}"#],
        &[r#"{"k":1,"b":"p"}"#, r#"{"k":2,"b":"q"}"#],
    );

    run_merge(&fixture, on(&["k"]), 1).await;
    let first = row_multiset(&read_all_rows(&fixture.output.state.location, 1));

    run_merge(&fixture, on(&["k"]), 1).await;
    let second = row_multiset(&read_all_rows(&fixture.output.state.location, 1));

    assert_eq!(first.len(), 3);
    assert_eq!(first, second);
}
