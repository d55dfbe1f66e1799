use std::fs;
use std::path::{Path, PathBuf};

use engage_adapters::{
    grace_community_directory, load_org_bundle, DirectoryAccess, DirectorySnapshot, OrgDirectory,
};
use engage_core::{find_matches, resolve_effective_time_preference, ResolvedNeed};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct GoldenCandidate {
    id: String,
    display_name: Option<String>,
    gift_tags: Vec<String>,
    availability: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct GoldenNeed {
    id: String,
    required_tags: Vec<String>,
    effective_preference: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct GoldenSnapshot {
    access: DirectoryAccess,
    candidates: Vec<GoldenCandidate>,
    needs: Vec<GoldenNeed>,
}

fn workspace_root() -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR"))
        .join("../..")
        .canonicalize()
        .expect("workspace root")
}

fn fixture_bundle_path(org_id: &str) -> PathBuf {
    workspace_root()
        .join("fixtures")
        .join(org_id)
        .join("sample")
        .join("bundle.json")
}

fn expected_snapshot_path(org_id: &str) -> PathBuf {
    workspace_root()
        .join("fixtures")
        .join(org_id)
        .join("sample")
        .join("snapshot.json")
}

fn snapshot_to_golden(snapshot: &DirectorySnapshot, access: DirectoryAccess) -> GoldenSnapshot {
    GoldenSnapshot {
        access,
        candidates: snapshot
            .candidates
            .iter()
            .map(|c| GoldenCandidate {
                id: c.id.clone(),
                display_name: c.display_name.clone(),
                gift_tags: c.gift_tags.clone(),
                availability: c.availability.iter().map(|b| b.as_str().to_string()).collect(),
            })
            .collect(),
        needs: snapshot
            .needs
            .iter()
            .map(|n| GoldenNeed {
                id: n.id.clone(),
                required_tags: n.required_tags.clone(),
                effective_preference: resolve_effective_time_preference(n).as_str().to_string(),
            })
            .collect(),
    }
}

fn read_snapshot(path: &Path) -> GoldenSnapshot {
    let text = fs::read_to_string(path).expect("read snapshot");
    serde_json::from_str(&text).expect("parse snapshot")
}

#[test]
fn golden_json_snapshot_test_grace_community() {
    let directory = grace_community_directory();
    let bundle = load_org_bundle(fixture_bundle_path("grace-community")).unwrap();
    let parsed = directory.parse_bundle(&bundle).unwrap();
    let actual = snapshot_to_golden(&parsed, directory.access());
    let expected = read_snapshot(&expected_snapshot_path("grace-community"));
    assert_eq!(actual, expected);
}

#[test]
fn fixture_pool_ranks_the_meal_train_need() {
    let directory = grace_community_directory();
    let bundle = load_org_bundle(fixture_bundle_path("grace-community")).unwrap();
    let parsed = directory.parse_bundle(&bundle).unwrap();

    let need = parsed
        .needs
        .iter()
        .find(|n| n.id == "need-meal-train")
        .cloned()
        .expect("meal train need present");
    let resolved = ResolvedNeed::resolve(need);

    let matches = find_matches(&parsed.candidates, &resolved, 10);
    assert_eq!(matches.len(), 1);
    assert_eq!(matches[0].candidate.id, "prof-ana");
    assert_eq!(matches[0].matching_tags, vec!["Cooking".to_string()]);
    assert_eq!(matches[0].availability_score, 3);
    assert_eq!(matches[0].total_score, 5);
}
