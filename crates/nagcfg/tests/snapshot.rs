//! Snapshot tests
//!
//! Parses and resolves each *.cfg file in /tests/ individually and compares the
//! resulting definitions and issues.

use nagcfg::object::ObjectDefinition;

#[derive(serde::Serialize)]
struct Resolved {
    objects: Vec<ObjectDefinition>,
    issues: Vec<String>,
}

#[test]
fn snapshots() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_env("NAGCFG_LOG"))
        .with_writer(std::io::stderr)
        .init();

    insta::glob!("*.cfg", |path| {
        let text = std::fs::read_to_string(path).unwrap();
        // file name only, issues mention it
        let file_name = path.file_name().expect("glob yields files");

        let mut parsed = nagcfg::parser::parse_str(&text, file_name);
        let objects = nagcfg::resolver::resolve(parsed.objects, &mut parsed.issues);
        let resolved = Resolved {
            objects,
            issues: parsed.issues.iter().map(ToString::to_string).collect(),
        };

        insta::assert_yaml_snapshot!(resolved);
    });
}
