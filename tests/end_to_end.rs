//! End-to-end scenarios against the public API, covering the pipeline's
//! literal examples: load → link → (optionally) prune → dispatch.

use std::cell::RefCell;
use std::fs;
use std::rc::Rc;

use schemac::ast::Type;
use schemac::config::Configuration;
use schemac::dispatcher::{GenerationError, Handler, Target};
use schemac::fs::OsFilesystem;
use schemac::logger::{Logger, RecordingLogger};
use schemac::schema::Schema;
use schemac::source_set::SourceRoot;

struct RecordingTarget {
    elements: Vec<String>,
    claimed: Rc<RefCell<Vec<String>>>,
}

struct RecordingHandler {
    claimed: Rc<RefCell<Vec<String>>>,
}

impl Handler for RecordingHandler {
    fn handle(&mut self, ty: &Type) -> Result<(), GenerationError> {
        self.claimed.borrow_mut().push(ty.qualified_name().to_string());
        Ok(())
    }
}

impl Target<OsFilesystem> for RecordingTarget {
    fn elements(&self) -> &[String] {
        &self.elements
    }

    fn new_handler(
        &self,
        _schema: &Schema,
        _filesystem: &OsFilesystem,
        _logger: &dyn Logger,
    ) -> Box<dyn Handler> {
        Box::new(RecordingHandler {
            claimed: self.claimed.clone(),
        })
    }
}

fn target(elements: &[&str]) -> (Box<dyn Target<OsFilesystem>>, Rc<RefCell<Vec<String>>>) {
    let claimed = Rc::new(RefCell::new(Vec::new()));
    let target = RecordingTarget {
        elements: elements.iter().map(|s| s.to_string()).collect(),
        claimed: claimed.clone(),
    };
    (Box::new(target), claimed)
}

#[test]
fn single_directory_root_dispatches_one_type() {
    let tmp = tempfile::tempdir().unwrap();
    fs::write(
        tmp.path().join("a.proto"),
        "package p;\nmessage M { int32 x = 1; }",
    )
    .unwrap();

    let mut config = Configuration::new(OsFilesystem);
    config.source_path(SourceRoot::Directory(tmp.path().to_path_buf()));

    let (first, claimed) = target(&["*"]);
    let logger = RecordingLogger::default();
    config.compile(vec![first], &logger).unwrap();

    assert_eq!(claimed.borrow().as_slice(), ["p.M"]);
}

#[test]
fn cross_file_import_dispatches_both_types_in_source_order() {
    let tmp = tempfile::tempdir().unwrap();
    fs::write(
        tmp.path().join("a.proto"),
        "package p;\nimport \"q.proto\";\nmessage M { q.N n = 1; }",
    )
    .unwrap();
    fs::write(tmp.path().join("q.proto"), "package q;\nmessage N {}").unwrap();

    let mut config = Configuration::new(OsFilesystem);
    config.source_path(SourceRoot::Directory(tmp.path().to_path_buf()));

    let (first, claimed) = target(&["*"]);
    let logger = RecordingLogger::default();
    config.compile(vec![first], &logger).unwrap();

    assert_eq!(claimed.borrow().as_slice(), ["p.M", "q.N"]);
}

#[test]
fn proto_path_only_file_is_linked_but_never_dispatched() {
    let tmp = tempfile::tempdir().unwrap();
    let source_dir = tmp.path().join("src");
    let proto_dir = tmp.path().join("deps");
    fs::create_dir_all(&source_dir).unwrap();
    fs::create_dir_all(&proto_dir).unwrap();
    fs::write(
        source_dir.join("a.proto"),
        "package p;\nimport \"q.proto\";\nmessage M { q.N n = 1; }",
    )
    .unwrap();
    fs::write(proto_dir.join("q.proto"), "package q;\nmessage N {}").unwrap();

    let mut config = Configuration::new(OsFilesystem);
    config.source_path(SourceRoot::Directory(source_dir));
    config.proto_path(SourceRoot::Directory(proto_dir));

    let (first, claimed) = target(&["*"]);
    let logger = RecordingLogger::default();
    config.compile(vec![first], &logger).unwrap();

    assert_eq!(claimed.borrow().as_slice(), ["p.M"]);
}

#[test]
fn tree_shaking_rubbish_drops_matching_package() {
    let tmp = tempfile::tempdir().unwrap();
    fs::write(
        tmp.path().join("a.proto"),
        "package p;\nmessage Keep {}\nmessage Drop {}",
    )
    .unwrap();
    fs::write(tmp.path().join("v.proto"), "package vitess;\nmessage X {}").unwrap();

    let mut config = Configuration::new(OsFilesystem);
    config.source_path(SourceRoot::Directory(tmp.path().to_path_buf()));
    config.tree_shaking_rubbish(vec!["vitess.*".to_string()]);

    let (first, claimed) = target(&["*"]);
    let logger = RecordingLogger::default();
    config.compile(vec![first], &logger).unwrap();

    let claimed = claimed.borrow();
    assert!(claimed.contains(&"p.Keep".to_string()));
    assert!(claimed.contains(&"p.Drop".to_string()));
    assert!(!claimed.contains(&"vitess.X".to_string()));
}

#[test]
fn unused_tree_shaking_rule_is_logged() {
    let tmp = tempfile::tempdir().unwrap();
    fs::write(tmp.path().join("a.proto"), "package p;\nmessage M {}").unwrap();

    let mut config = Configuration::new(OsFilesystem);
    config.source_path(SourceRoot::Directory(tmp.path().to_path_buf()));
    config.tree_shaking_rubbish(vec!["nonexistent.*".to_string()]);

    let (first, _claimed) = target(&["*"]);
    let logger = RecordingLogger::default();
    config.compile(vec![first], &logger).unwrap();

    assert!(logger
        .warns
        .borrow()
        .iter()
        .any(|w| w == "Unused element in treeShakingRubbish: nonexistent.*"));
}

#[test]
fn second_target_receives_only_the_leftover_type() {
    let tmp = tempfile::tempdir().unwrap();
    fs::write(
        tmp.path().join("a.proto"),
        "package p;\nmessage A {}\nmessage B {}",
    )
    .unwrap();

    let mut config = Configuration::new(OsFilesystem);
    config.source_path(SourceRoot::Directory(tmp.path().to_path_buf()));

    let (first, first_claimed) = target(&["p.A"]);
    let (second, second_claimed) = target(&["*"]);
    let logger = RecordingLogger::default();
    config.compile(vec![first, second], &logger).unwrap();

    assert_eq!(first_claimed.borrow().as_slice(), ["p.A"]);
    assert_eq!(second_claimed.borrow().as_slice(), ["p.B"]);
}
