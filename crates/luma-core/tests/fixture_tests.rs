//! Integration tests running the analysis over projects in tests/fixtures/

use std::fs;
use std::path::Path;

use luma_core::config::{Config, load_config};
use luma_core::project::Project;
use luma_core::semantic::{AnalysisOptions, SymbolClass, ValueKind};
use luma_core::{Diagnostic, ErrorKind, Position};

const FIXTURES_DIR: &str = concat!(env!("CARGO_MANIFEST_DIR"), "/tests/fixtures");

fn read_fixture_dir(subdir: &str) -> Vec<(String, String)> {
    let dir_path = Path::new(FIXTURES_DIR).join(subdir);
    let mut files = vec![];
    for entry in fs::read_dir(&dir_path).expect("Failed to read fixtures directory") {
        let path = entry.expect("Failed to read directory entry").path();
        if path.extension().is_some_and(|ext| ext == "lua") {
            let name = path.file_name().unwrap().to_string_lossy().to_string();
            let content = fs::read_to_string(&path)
                .unwrap_or_else(|e| panic!("Failed to read fixture {}: {}", path.display(), e));
            files.push((name, content));
        }
    }
    files.sort_by(|a, b| a.0.cmp(&b.0));
    assert!(!files.is_empty(), "No Lua fixtures found in {}", subdir);
    files
}

/// Registers the fixture files with `main.lua` first, when present.
fn fixture_project(subdir: &str, config: Config) -> Project {
    let mut files = read_fixture_dir(subdir);
    files.sort_by_key(|(name, _)| name != "main.lua");
    let mut project = Project::new(config);
    for (name, content) in &files {
        project.add_file(name, content);
    }
    project
}

fn inline_project(files: &[(&str, &str)]) -> Project {
    let mut project = Project::new(Config::default());
    for (path, source) in files {
        project.add_file(path, source);
    }
    project
}

fn kinds(diagnostics: &[Diagnostic]) -> Vec<ErrorKind> {
    diagnostics.iter().map(|d| d.kind).collect()
}

fn checked(project: &mut Project, path: &str) -> Vec<Diagnostic> {
    project.check_project(&[]).expect("project walk failed");
    project.diagnostics(path).expect("diagnostics failed")
}

#[test]
fn first_pass_only_depends_on_the_file_itself() {
    let source = "local x = 1\nvalue = x\nprint(other)\n";
    let mut alone = inline_project(&[("main.lua", source)]);
    let mut with_neighbor = inline_project(&[
        ("other.lua", "other = 1\nlocal unused = 2\n"),
        ("main.lua", source),
    ]);

    let first = alone.first_pass_result("main.lua").unwrap().clone();
    alone.run_first_pass();
    let again = alone.first_pass_result("main.lua").unwrap().clone();
    let neighbor = with_neighbor.first_pass_result("main.lua").unwrap().clone();

    assert_eq!(first.diagnostics, again.diagnostics);
    assert_eq!(first.diagnostics, neighbor.diagnostics);
    assert_eq!(
        first.globals.keys().collect::<Vec<_>>(),
        neighbor.globals.keys().collect::<Vec<_>>()
    );
    assert!(neighbor.undefined.contains_key("other"));
}

#[test]
fn nil_local_gets_kind_of_later_assignment() {
    let mut project = inline_project(&[
        ("main.lua", "local m = require 'mod'\nprint(m.items.count)\n"),
        ("mod.lua", "local M = nil\nM = { items = { count = 1 } }\nreturn M\n"),
    ]);

    let diagnostics = checked(&mut project, "main.lua");
    assert!(diagnostics.is_empty(), "{:?}", diagnostics);

    let result = project.project_result().unwrap();
    let module = project.files().id_of("mod.lua").unwrap();
    let value = result.file(module).unwrap().return_value.unwrap();
    assert_eq!(result.store.variable(value).kind, ValueKind::Table);
}

#[test]
fn maybe_nil_needs_a_missing_guard() {
    let mut flagged = inline_project(&[(
        "main.lua",
        "local t = f()\nif t == nil then\n  print(t.x)\nend\n",
    )]);
    let mut guarded = inline_project(&[(
        "main.lua",
        "local t = f()\nif t == nil then\n  print(t and t.x)\nend\n",
    )]);
    let config = Config {
        globals: luma_core::config::GlobalsConfig {
            ignore: vec!["f".into()],
        },
        ..Config::default()
    };
    let mut ignored_f = Project::new(config);
    ignored_f.add_file("main.lua", "local t = f()\nif t then\n  print(t.x)\nend\n");

    let diagnostics = checked(&mut flagged, "main.lua");
    assert!(kinds(&diagnostics).contains(&ErrorKind::MaybeNil));
    let maybe_nil = diagnostics
        .iter()
        .find(|d| d.kind == ErrorKind::MaybeNil)
        .unwrap();
    assert_eq!(maybe_nil.message, "'t' may be nil here");
    assert_eq!(maybe_nil.range.start.line, 2);

    let diagnostics = checked(&mut guarded, "main.lua");
    assert!(!kinds(&diagnostics).contains(&ErrorKind::MaybeNil));

    assert!(checked(&mut ignored_f, "main.lua").is_empty());
}

#[test]
fn top_level_use_before_definition_is_load_order() {
    let mut project = fixture_project("load_order", Config::default());

    let diagnostics = checked(&mut project, "util.lua");
    let load_order: Vec<&Diagnostic> = diagnostics
        .iter()
        .filter(|d| d.kind == ErrorKind::LoadOrder)
        .collect();

    // The call inside `M.greet` runs later and stays silent.
    assert_eq!(load_order.len(), 1, "{:?}", diagnostics);
    assert_eq!(load_order[0].range.start.line, 2);
    assert_eq!(load_order[0].related[0].file, "main.lua");
    assert_eq!(load_order[0].related[0].message, "'banner' is defined here");
    assert!(!kinds(&diagnostics).contains(&ErrorKind::UndefinedGlobal));

    assert!(checked(&mut project, "main.lua").is_empty());
}

#[test]
fn shared_module_is_walked_once() {
    let mut project = fixture_project("shared_module", Config::default());
    project.check_project(&["main.lua"]).unwrap();

    let result = project.project_result().unwrap();
    assert_eq!(result.files.len(), 4);

    let util = project.files().id_of("util.lua").unwrap();
    let targets: Vec<_> = ["a.lua", "b.lua"]
        .iter()
        .map(|path| {
            let id = project.files().id_of(path).unwrap();
            let reference = result.file(id).unwrap().references[0];
            result.store.reference(reference).target
        })
        .collect();
    assert_eq!(targets, vec![Some(util), Some(util)]);

    assert!(project.all_diagnostics().unwrap().is_empty());
}

#[test]
fn require_cycle_reports_load_order_from_either_entry() {
    for (entry, other) in [("one.lua", "two.lua"), ("two.lua", "one.lua")] {
        let mut project = fixture_project("require_cycle", Config::default());
        project.check_project(&[entry]).unwrap();

        let result = project.project_result().unwrap();
        assert_eq!(result.files.len(), 2);
        let in_progress = |path: &str| {
            let id = project.files().id_of(path).unwrap();
            let reference = result.file(id).unwrap().references[0];
            result.store.reference(reference).in_progress
        };
        assert!(!in_progress(entry));
        assert!(in_progress(other));

        // The closing require, then a global its loader defines later.
        let diagnostics = project.diagnostics(other).unwrap();
        assert_eq!(
            kinds(&diagnostics),
            vec![ErrorKind::LoadOrder, ErrorKind::LoadOrder],
            "entry {}",
            entry
        );
        assert_eq!(diagnostics[0].range.start.line, 0);
        assert_eq!(diagnostics[1].range.start.line, 2);
        assert_eq!(diagnostics[1].related[0].file, entry);

        let all = project.all_diagnostics().unwrap();
        assert!(!kinds(&all).contains(&ErrorKind::UndefinedGlobal));
        assert!(!kinds(&all).contains(&ErrorKind::ImportNotFound));
    }
}

#[test]
fn bare_require_cycle_is_never_silent() {
    for (entry, other) in [("one.lua", "two.lua"), ("two.lua", "one.lua")] {
        let mut project = fixture_project("bare_require_cycle", Config::default());
        project.check_project(&[entry]).unwrap();

        let all = project.all_diagnostics().unwrap();
        assert_eq!(kinds(&all), vec![ErrorKind::LoadOrder], "entry {}", entry);
        let cycle = &all[0];
        assert_eq!(cycle.file, other);
        assert_eq!(cycle.range.start, Position::new(0, 0));
        assert!(cycle.message.contains("circular load"), "{}", cycle.message);

        // Points back at the load the entry file is suspended on.
        assert_eq!(cycle.related.len(), 1);
        assert_eq!(cycle.related[0].file, entry);
        assert_eq!(cycle.related[0].range.start, Position::new(0, 0));
    }
}

#[test]
fn unwalked_definitions_do_not_depend_on_file_order() {
    let user = "print(helper())
local function later()
  return helper()
end
later()
";
    let owner = "function helper()
  return 1
end
";

    let mut user_first = inline_project(&[("a.lua", user), ("b.lua", owner)]);
    let diagnostics = checked(&mut user_first, "a.lua");
    assert_eq!(kinds(&diagnostics), vec![ErrorKind::LoadOrder]);
    assert_eq!(diagnostics[0].range.start, Position::new(0, 6));
    assert_eq!(diagnostics[0].related[0].file, "b.lua");

    let mut owner_first = inline_project(&[("b.lua", owner), ("a.lua", user)]);
    assert!(checked(&mut owner_first, "a.lua").is_empty());

    for project in [&mut user_first, &mut owner_first] {
        let all = project.all_diagnostics().unwrap();
        assert!(!kinds(&all).contains(&ErrorKind::UndefinedGlobal), "{:?}", all);
    }
}

#[test]
fn deeply_nested_file_reports_syntax_only() {
    let deep = format!("return {}1{}\n", "(".repeat(20_000), ")".repeat(20_000));
    let mut project = inline_project(&[("deep.lua", deep.as_str()), ("main.lua", "print(1)\n")]);

    let diagnostics = checked(&mut project, "deep.lua");
    assert_eq!(kinds(&diagnostics), vec![ErrorKind::Syntax]);
    assert_eq!(diagnostics[0].message, "chunk has too many syntax levels");
    assert!(project.diagnostics("main.lua").unwrap().is_empty());
}

#[test]
fn lone_unused_local_is_the_only_diagnostic() {
    let mut project = inline_project(&[("main.lua", "local x = 1\n")]);

    let diagnostics = checked(&mut project, "main.lua");
    assert_eq!(kinds(&diagnostics), vec![ErrorKind::UnusedLocal]);
    assert_eq!(diagnostics[0].range.start, Position::new(0, 6));
}

#[test]
fn duplicate_key_points_at_first_definition() {
    let mut project = inline_project(&[(
        "main.lua",
        "return {\n  name = 'a',\n  size = 1,\n  name = 'b',\n}\n",
    )]);

    let diagnostics = checked(&mut project, "main.lua");
    assert_eq!(kinds(&diagnostics), vec![ErrorKind::DuplicateKey]);
    assert_eq!(diagnostics[0].range.start.line, 3);
    assert_eq!(diagnostics[0].related.len(), 1);
    assert_eq!(diagnostics[0].related[0].range.start.line, 1);
}

#[test]
fn self_reference_default_is_silent() {
    let mut project = inline_project(&[(
        "main.lua",
        "settings = settings or {}\nsettings.debug = true\n",
    )]);

    assert!(checked(&mut project, "main.lua").is_empty());
    assert!(project.check_scattered("main.lua").unwrap().diagnostics.is_empty());
}

#[test]
fn scattered_check_sees_other_files() {
    let mut project = inline_project(&[
        ("helpers.lua", "function shout(s) return s .. '!' end\n"),
        ("main.lua", "print(shout('hi'))\nprint(whisper('hi'))\n"),
    ]);

    let result = project.check_scattered("main.lua").unwrap();
    assert_eq!(kinds(&result.diagnostics), vec![ErrorKind::UndefinedGlobal]);
    assert_eq!(result.diagnostics[0].message, "undefined global 'whisper'");

    // Not reached by the project walk, so the scattered result is merged.
    let diagnostics = project.diagnostics("main.lua").unwrap();
    assert_eq!(kinds(&diagnostics), vec![ErrorKind::UndefinedGlobal]);
}

#[test]
fn global_references_span_files() {
    let mut project = fixture_project("references", Config::default());

    let locations = project.find_references("main.lua", Position::new(1, 2)).unwrap();
    let found: Vec<(&str, u32)> = locations
        .iter()
        .map(|l| (l.path.as_str(), l.range.start.line))
        .collect();
    assert_eq!(
        found,
        vec![("counter.lua", 2), ("main.lua", 1), ("main.lua", 2)]
    );
}

#[test]
fn global_references_include_writes() {
    let mut project = fixture_project("references", Config::default());

    let locations = project.find_references("counter.lua", Position::new(0, 1)).unwrap();
    let found: Vec<(&str, u32, u32)> = locations
        .iter()
        .map(|l| (l.path.as_str(), l.range.start.line, l.range.start.column))
        .collect();
    assert_eq!(
        found,
        vec![
            ("counter.lua", 0, 0),
            ("main.lua", 3, 6),
            ("counter.lua", 3, 2),
            ("counter.lua", 3, 10),
        ]
    );
}

#[test]
fn local_references_stay_in_their_file() {
    let mut project = inline_project(&[
        ("a.lua", "local x = 1\nprint(x)\nx = 2\n"),
        ("b.lua", "local x = 3\nprint(x)\n"),
    ]);

    let locations = project.find_references("a.lua", Position::new(1, 6)).unwrap();
    assert_eq!(locations.len(), 3);
    assert!(locations.iter().all(|l| l.path == "a.lua"));
    assert_eq!(locations[0].range.start, Position::new(0, 6));

    let nothing = project.find_references("a.lua", Position::new(1, 0)).unwrap();
    assert!(nothing.is_empty());
}

#[test]
fn coloring_uses_other_files() {
    let mut project = fixture_project("references", Config::default());

    let spans = project.classify("main.lua").unwrap();
    let classes: Vec<SymbolClass> = spans.iter().map(|s| s.class).collect();
    assert_eq!(
        classes,
        vec![
            SymbolClass::Builtin,
            SymbolClass::GlobalFunction,
            SymbolClass::GlobalFunction,
            SymbolClass::Builtin,
            SymbolClass::Global,
        ]
    );
}

#[test]
fn configured_and_inline_suppression() {
    let config_path = Path::new(FIXTURES_DIR).join("suppression/luma.toml");
    let config = load_config(&config_path).unwrap();
    let mut project = fixture_project("suppression", config);

    let diagnostics = checked(&mut project, "main.lua");
    assert_eq!(kinds(&diagnostics), vec![ErrorKind::UnusedLocal]);
    assert_eq!(diagnostics[0].range.start.line, 0);
    assert!(project.config_warnings().is_empty());
}

#[test]
fn realtime_mode_skips_slow_checks() {
    let source = "local unused = 1\nreturn {a = 1, a = 2}\n";
    let mut full = inline_project(&[("main.lua", source)]);
    let mut realtime =
        Project::new(Config::default()).with_options(AnalysisOptions { realtime: true });
    realtime.add_file("main.lua", source);

    assert_eq!(
        kinds(&checked(&mut full, "main.lua")),
        vec![ErrorKind::UnusedLocal, ErrorKind::DuplicateKey]
    );
    assert!(checked(&mut realtime, "main.lua").is_empty());
}
