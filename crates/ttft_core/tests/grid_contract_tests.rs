use std::collections::HashSet;

use ttft_core::grid::{enumerate_grid, expected_tags};
use ttft_core::storage_keys::{artifact_file_name, parse_artifact_file_name, ArtifactKind};
use ttft_core::{RequestBudget, SweepProfile};

fn profile(max_inflight: Vec<u32>, concurrency: Vec<u32>) -> SweepProfile {
    SweepProfile {
        name: "contract".to_string(),
        max_inflight,
        concurrency,
        request_budget: RequestBudget::Total(10),
        prompt: "Hello world".to_string(),
        max_output_tokens: 64,
        cooldown_ms: 0,
        run_timeout_secs: None,
    }
}

#[test]
fn grid_size_is_product_of_dimensions() {
    for (mi, c) in [(1, 1), (1, 7), (4, 3), (10, 10)] {
        let space = profile((1..=mi).collect(), (1..=c).map(|v| v * 11).collect());
        let cells = enumerate_grid(&space).unwrap();
        assert_eq!(cells.len(), (mi * c) as usize);

        let tags: HashSet<String> = cells.iter().map(|cell| cell.tag().to_string()).collect();
        assert_eq!(tags.len(), cells.len());
    }
}

#[test]
fn configuration_is_recoverable_from_artifact_names() {
    let space = profile(vec![300, 400, 500], vec![1, 16, 300]);
    for tag in expected_tags(&space).unwrap() {
        let name = artifact_file_name(ArtifactKind::Results, tag);
        let parsed = parse_artifact_file_name(ArtifactKind::Results, &name).unwrap();
        assert_eq!(parsed, tag);
        assert_eq!(
            (parsed.max_inflight(), parsed.concurrency()),
            (tag.max_inflight(), tag.concurrency())
        );
    }
}

#[test]
fn profile_loads_from_json() {
    let json = r#"{
        "name": "custom",
        "max_inflight": [350],
        "concurrency": [16, 32],
        "request_budget": {"mode": "per_client", "count": 10},
        "prompt": "Hello world",
        "max_output_tokens": 64,
        "cooldown_ms": 30000
    }"#;
    let loaded: SweepProfile = serde_json::from_str(json).unwrap();
    assert_eq!(loaded.request_budget, RequestBudget::PerClient(10));
    assert_eq!(loaded.run_timeout_secs, None);
    assert_eq!(expected_tags(&loaded).unwrap().len(), 2);
}
