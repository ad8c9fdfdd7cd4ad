use srcgraph::{BuilderConfig, DiagnosticKind, FileTree, Severity, SourceGraphBuilder};

fn corpus() -> FileTree {
    let mut files = Vec::new();
    for index in 0..9 {
        let source = if index == 4 {
            "def broken(:\n    return\n".to_string()
        } else {
            format!("def f{index}():\n    return {index}\n")
        };
        files.push((format!("m{index}.py"), source));
    }
    FileTree::from_files(files)
}

#[test]
fn one_bad_file_does_not_stop_the_build() {
    for parallel in [false, true] {
        let config = BuilderConfig {
            parallel,
            ..Default::default()
        };
        let graph = SourceGraphBuilder::new(config).build(&corpus()).unwrap();

        for index in (0..9).filter(|index| *index != 4) {
            assert!(graph.contains(&format!("m{index}.m{index}")));
            assert!(graph.contains(&format!("m{index}.f{index}")));
        }
        assert!(!graph.contains("m4.m4"));
        assert!(!graph.contains("m4.broken"));

        let parse_errors: Vec<_> = graph
            .diagnostics()
            .iter()
            .filter(|d| d.kind == DiagnosticKind::ParseError)
            .collect();
        assert_eq!(parse_errors.len(), 1);
        assert_eq!(parse_errors[0].path.as_deref(), Some("m4.py"));
        assert_eq!(parse_errors[0].severity, Severity::Error);

        let stats = graph.stats();
        assert_eq!(stats.files_parsed, 8);
        assert_eq!(stats.files_skipped, 1);
        assert_eq!(stats.modules, 8);
    }
}
