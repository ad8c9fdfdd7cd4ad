use srcgraph::{BuilderConfig, DiagnosticKind, FileTree, SourceGraph, SourceGraphBuilder};

fn corpus() -> FileTree {
    let mut files = vec![
        ("core/__init__.py".to_string(), String::new()),
        (
            "core/base.py".to_string(),
            "class Service:\n    def start(self):\n        self.log('start')\n    def log(self, msg):\n        print(msg)\n".to_string(),
        ),
    ];
    for index in 0..24 {
        files.push((
            format!("core/svc{index}.py"),
            format!(
                "import os\nfrom core.base import Service\n\nclass Svc{index}(Service):\n    def run(self):\n        self.start()\n        return os.getenv(\"HOME\", f\"{{self}}-{index}\")\n"
            ),
        ));
    }
    FileTree::from_files(files)
}

fn build(parallel: bool) -> SourceGraph {
    let config = BuilderConfig {
        parallel,
        ..Default::default()
    };
    SourceGraphBuilder::new(config).build(&corpus()).unwrap()
}

#[test]
fn parallel_and_sequential_builds_match() {
    let sequential = build(false);
    let parallel = build(true);
    assert_eq!(sequential.fingerprint(), parallel.fingerprint());
    assert!(sequential.nodes().eq(parallel.nodes()));
    assert!(sequential.edges().eq(parallel.edges()));
    assert_eq!(sequential.diagnostics(), parallel.diagnostics());
}

#[test]
fn repeated_builds_are_identical() {
    let first = build(true);
    for _ in 0..3 {
        let again = build(true);
        assert_eq!(first.fingerprint(), again.fingerprint());
        assert_eq!(first.stats().edges_by_kind, again.stats().edges_by_kind);
    }
    assert!(first.fingerprint().starts_with("graph_"));
}

fn clashing_files() -> Vec<(&'static str, &'static str)> {
    vec![
        ("pkg/__init__.py", "class sub:\n    def run(self):\n        pass\n"),
        ("pkg/sub.py", "def run(x):\n    return x\n"),
        ("pkg/util.py", "def helper():\n    pass\n"),
        ("pkg/util/__init__.py", "def helper():\n    return 1\n"),
        ("app.py", "from pkg.sub import run\nfrom pkg.util import helper\nrun(helper())\n"),
    ]
}

#[test]
fn first_wins_conflicts_do_not_depend_on_visit_order() {
    let forward = FileTree::from_files(clashing_files());
    let backward = FileTree::from_files(clashing_files().into_iter().rev());

    let mut builds = Vec::new();
    for tree in [&forward, &backward] {
        for parallel in [false, true] {
            let config = BuilderConfig {
                parallel,
                ..Default::default()
            };
            builds.push(SourceGraphBuilder::new(config).build(tree).unwrap());
        }
    }

    let first = &builds[0];
    let duplicates: Vec<_> = first
        .diagnostics()
        .iter()
        .filter(|d| d.kind == DiagnosticKind::DuplicateSymbol)
        .map(|d| d.path.as_deref())
        .collect();
    assert_eq!(duplicates, vec![Some("pkg/sub.py"), Some("pkg/util/__init__.py")]);
    assert_eq!(
        first.node("pkg.util.helper").map(|n| n.module.as_str()),
        Some("pkg.util")
    );
    for other in &builds[1..] {
        assert_eq!(first.fingerprint(), other.fingerprint());
        assert_eq!(first.diagnostics(), other.diagnostics());
    }
}
