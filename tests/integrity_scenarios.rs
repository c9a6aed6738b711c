use std::cell::Cell;
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use tempfile::TempDir;
use tether::defaults::ScanSettings;
use tether::error::ErrorCode;
use tether::scan::{scan, CancellationToken};
use tether::update::{DiskOps, FileOps, Operation};
use tether::{Manager, MoveRequest, RelationshipGraph, RelationshipType};

fn write(root: &Path, rel: &str, content: &str) {
    let path = root.join(rel);
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(path, content).unwrap();
}

fn read(root: &Path, rel: &str) -> String {
    fs::read_to_string(root.join(rel)).unwrap()
}

fn graph(root: &Path) -> RelationshipGraph {
    RelationshipGraph::from_scan(scan(root, &ScanSettings::default(), &CancellationToken::new()))
}

/// Snapshot of every file under `root` (relative path -> content).
fn snapshot(root: &Path) -> BTreeMap<String, String> {
    fn visit(root: &Path, dir: &Path, out: &mut BTreeMap<String, String>) {
        for entry in fs::read_dir(dir).unwrap() {
            let path = entry.unwrap().path();
            if path.is_dir() {
                visit(root, &path, out);
            } else {
                let rel = path.strip_prefix(root).unwrap().to_string_lossy().replace('\\', "/");
                out.insert(rel, fs::read_to_string(&path).unwrap());
            }
        }
    }

    let mut out = BTreeMap::new();
    visit(root, root, &mut out);
    out
}

/// Real disk operations, except that the Nth write (1-indexed) fails.
struct FailNthWrite {
    n: usize,
    writes: Cell<usize>,
}

impl FailNthWrite {
    fn new(n: usize) -> Self {
        Self {
            n,
            writes: Cell::new(0),
        }
    }
}

impl FileOps for FailNthWrite {
    fn exists(&self, path: &Path) -> bool {
        DiskOps.exists(path)
    }

    fn read(&self, path: &Path) -> tether::Result<String> {
        DiskOps.read(path)
    }

    fn write(&self, path: &Path, content: &str) -> tether::Result<()> {
        let count = self.writes.get() + 1;
        self.writes.set(count);
        if count == self.n {
            return Err(tether::Error::internal_io(
                "injected write failure".to_string(),
                Some(path.display().to_string()),
            ));
        }
        DiskOps.write(path, content)
    }

    fn rename(&self, from: &Path, to: &Path) -> tether::Result<()> {
        DiskOps.rename(from, to)
    }
}

#[test]
fn deleting_target_flips_broken_and_lowers_confidence() {
    let dir = TempDir::new().unwrap();
    write(dir.path(), "docs/a.md", "[guide](docs/b.md)\n");
    write(dir.path(), "docs/b.md", "# B\n");

    let before = graph(dir.path());
    let rel = before.outgoing("docs/a.md")[0].clone();
    assert_eq!(rel.relationship_type, RelationshipType::Hyperlink);
    assert_eq!(rel.resolved_target, "docs/b.md");
    assert!(!rel.is_broken);
    assert!(rel.confidence >= 0.8);

    fs::remove_file(dir.path().join("docs/b.md")).unwrap();

    let after = graph(dir.path());
    let flipped = after.outgoing("docs/a.md")[0].clone();
    assert!(flipped.is_broken);
    assert!(flipped.confidence < rel.confidence);

    assert_eq!(flipped.source_file, rel.source_file);
    assert_eq!(flipped.target_reference, rel.target_reference);
    assert_eq!(flipped.relationship_type, rel.relationship_type);
    assert_eq!(flipped.source_line_number, rel.source_line_number);
    assert_eq!(flipped.source_column, rel.source_column);
    assert_eq!(flipped.source_line_text, rel.source_line_text);
    assert_eq!(flipped.resolved_target, rel.resolved_target);
    assert_eq!(flipped.reference_style, rel.reference_style);
}

#[test]
fn move_rewrites_reference_and_validates_clean() {
    let dir = TempDir::new().unwrap();
    write(dir.path(), "docs/a.md", "# A\n\n[guide](docs/b.md)\n");
    write(dir.path(), "docs/b.md", "# B\n");

    let mut manager = Manager::open(dir.path()).unwrap();
    let plan = manager
        .plan_moves(&[MoveRequest::new("docs/b.md", "docs/guide.md")])
        .unwrap();
    assert_eq!(plan.edits.len(), 1);
    assert!(plan.warnings.is_empty());

    manager.execute(&plan).unwrap();

    assert_eq!(read(dir.path(), "docs/a.md"), "# A\n\n[guide](docs/guide.md)\n");
    assert!(!dir.path().join("docs/b.md").exists());
    assert!(dir.path().join("docs/guide.md").exists());

    let report = manager.validate();
    assert_eq!(report.broken_relationships, 0);
    assert_eq!(report.total_relationships, 1);
}

#[test]
fn failed_edit_restores_every_file_and_move() {
    let dir = TempDir::new().unwrap();
    write(dir.path(), "b.md", "# B\n");
    write(dir.path(), "c.md", "# C\n");
    write(dir.path(), "f1.md", "see [b](b.md)\n");
    write(dir.path(), "f2.md", "see [c](c.md)\n");
    write(dir.path(), "f3.md", "again [b](b.md)\n");
    let before = snapshot(dir.path());

    let mut manager = Manager::open(dir.path()).unwrap();
    let plan = manager
        .plan_moves(&[
            MoveRequest::new("b.md", "moved/b.md"),
            MoveRequest::new("c.md", "moved/c.md"),
        ])
        .unwrap();
    assert_eq!(plan.moves.len(), 2);
    assert_eq!(plan.edits.len(), 3);
    assert!(matches!(plan.ordered_operations[0], Operation::Move { .. }));

    let err = manager
        .execute_with(&plan, &FailNthWrite::new(2))
        .unwrap_err();
    assert_eq!(err.code, ErrorCode::ExecutionFailed);

    assert_eq!(snapshot(dir.path()), before);
}

#[test]
fn heal_rewires_single_candidate_and_reports_ambiguity() {
    let dir = TempDir::new().unwrap();
    write(dir.path(), "README.md", "![logo](assets/logo.png)\n");
    write(dir.path(), "assets/logo.png", "png");
    write(dir.path(), "images/logo.png", "png");
    fs::remove_file(dir.path().join("assets/logo.png")).unwrap();

    let mut manager = Manager::open(dir.path()).unwrap();
    let report = manager.heal().unwrap();
    assert_eq!(report.healed_count, 1);
    assert_eq!(read(dir.path(), "README.md"), "![logo](images/logo.png)\n");
    assert_eq!(manager.validate().broken_relationships, 0);

    let dir = TempDir::new().unwrap();
    write(dir.path(), "README.md", "![logo](assets/logo.png)\n");
    write(dir.path(), "images/logo.png", "png");
    write(dir.path(), "brand/logo.png", "png");

    let mut manager = Manager::open(dir.path()).unwrap();
    let first = manager.heal().unwrap();
    let second = manager.heal().unwrap();
    assert_eq!(first.healed_count, 0);
    assert_eq!(first.ambiguous.len(), 1);
    assert_eq!(first.ambiguous[0].preferred, "brand/logo.png");
    assert_eq!(first.ambiguous[0].candidates, second.ambiguous[0].candidates);
    assert_eq!(read(dir.path(), "README.md"), "![logo](assets/logo.png)\n");
}

#[test]
fn move_and_move_back_is_byte_identical() {
    let dir = TempDir::new().unwrap();
    write(dir.path(), "docs/a.md", "[b](b.md) and [top](../README.md#intro)\n");
    write(dir.path(), "docs/b.md", "# B\n\n![img](../images/x.png)\n");
    write(dir.path(), "README.md", "# Intro\n\nRead [b](docs/b.md).\n");
    write(dir.path(), "images/x.png", "png");
    let before = snapshot(dir.path());

    let mut manager = Manager::open(dir.path()).unwrap();
    manager
        .execute_moves(&[MoveRequest::new("docs/b.md", "guide/b.md")])
        .unwrap();
    assert_eq!(read(dir.path(), "guide/b.md"), "# B\n\n![img](../images/x.png)\n");
    assert_eq!(manager.validate().broken_relationships, 0);

    manager
        .execute_moves(&[MoveRequest::new("guide/b.md", "docs/b.md")])
        .unwrap();
    assert_eq!(snapshot(dir.path()), before);
}

#[test]
fn graph_indexes_are_consistent() {
    let dir = TempDir::new().unwrap();
    write(dir.path(), "README.md", "[a](docs/a.md) [gone](gone.md)\n![i](img/x.png)\n");
    write(dir.path(), "docs/a.md", "[readme](../README.md)\n");
    write(dir.path(), "img/x.png", "png");
    write(dir.path(), "src/main.js", "import { a } from './util';\n");
    write(dir.path(), "src/util.js", "export const a = 1;\n");

    let graph = graph(dir.path());
    assert!(!graph.relationships().is_empty());

    for rel in graph.relationships() {
        assert!((0.0..=1.0).contains(&rel.confidence));
        assert_eq!(rel.is_broken, !dir.path().join(&rel.resolved_target).exists());
        assert!(graph
            .outgoing(&rel.source_file)
            .iter()
            .any(|r| *r == rel));
        assert!(graph
            .incoming(&rel.resolved_target)
            .iter()
            .any(|r| *r == rel));
    }

    assert_eq!(graph.broken().count(), 1);
    assert!(graph.is_referenced("src/util.js"));
}

#[test]
fn validate_is_idempotent() {
    let dir = TempDir::new().unwrap();
    write(dir.path(), "README.md", "[a](a.md) [gone](gone.md)\n");
    write(dir.path(), "a.md", "# A\n");
    write(dir.path(), "orphan.md", "# alone\n");

    let mut manager = Manager::open(dir.path()).unwrap();
    let first = manager.validate();
    manager.discover();
    let rescanned = manager.validate();
    let second = Manager::open(dir.path()).unwrap().validate();

    let first_json = serde_json::to_value(&first).unwrap();
    assert_eq!(serde_json::to_value(&rescanned).unwrap(), first_json);
    assert_eq!(serde_json::to_value(&second).unwrap(), first_json);
    assert_eq!(first.broken_relationships, 1);
    assert!((first.integrity_score - 0.5).abs() < 1e-9);
    assert!(!first.passes(&manager.config().validate));
}

#[test]
fn root_relative_reference_moved_next_to_sibling_keeps_pointing_at_file() {
    let dir = TempDir::new().unwrap();
    write(dir.path(), "docs/a.md", "[x](docs/x.md)\n");
    write(dir.path(), "docs/x.md", "# X\n");
    write(dir.path(), "docs/y.md", "# other Y\n");

    let mut manager = Manager::open(dir.path()).unwrap();
    manager
        .execute_moves(&[MoveRequest::new("docs/x.md", "y.md")])
        .unwrap();

    assert_eq!(read(dir.path(), "docs/a.md"), "[x](../y.md)\n");
    let report = manager.validate();
    assert_eq!(report.broken_relationships, 0);
    let rel = manager.graph().outgoing("docs/a.md")[0].clone();
    assert_eq!(rel.resolved_target, "y.md");
}

#[test]
fn badge_link_target_follows_move() {
    let dir = TempDir::new().unwrap();
    write(dir.path(), "README.md", "[![ci](img/badge.svg)](docs/ci.md)\n");
    write(dir.path(), "img/badge.svg", "<svg/>");
    write(dir.path(), "docs/ci.md", "# CI\n");

    let mut manager = Manager::open(dir.path()).unwrap();
    assert_eq!(manager.graph().outgoing("README.md").len(), 2);
    manager
        .execute_moves(&[MoveRequest::new("docs/ci.md", "docs/build/ci.md")])
        .unwrap();

    assert_eq!(
        read(dir.path(), "README.md"),
        "[![ci](img/badge.svg)](docs/build/ci.md)\n"
    );
    assert_eq!(manager.validate().broken_relationships, 0);
}

#[cfg(unix)]
#[test]
fn rewritten_script_keeps_executable_bit() {
    use std::os::unix::fs::PermissionsExt;

    let dir = TempDir::new().unwrap();
    write(dir.path(), "bin/run.sh", "#!/bin/sh\n. \"lib/env.sh\"\n");
    write(dir.path(), "bin/lib/env.sh", "X=1\n");
    let script = dir.path().join("bin/run.sh");
    fs::set_permissions(&script, fs::Permissions::from_mode(0o755)).unwrap();

    let mut manager = Manager::open(dir.path()).unwrap();
    let (plan, _) = manager
        .execute_moves(&[MoveRequest::new("bin/lib/env.sh", "bin/conf/env.sh")])
        .unwrap();
    assert_eq!(plan.edits.len(), 1);
    assert_eq!(read(dir.path(), "bin/run.sh"), "#!/bin/sh\n. \"conf/env.sh\"\n");

    let mode = fs::metadata(&script).unwrap().permissions().mode();
    assert_eq!(mode & 0o777, 0o755);
}
