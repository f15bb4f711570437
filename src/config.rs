//! The configuration object the core accepts, builder-style the
//! way `prost_build::Config` is assembled before `compile_protos` runs the
//! whole pipeline in one call.

use crate::dispatcher::{Target, TargetDispatcher};
use crate::error::Result;
use crate::fs::Filesystem;
use crate::loader::SchemaLoader;
use crate::linker::Linker;
use crate::logger::Logger;
use crate::pruner::Pruner;
use crate::schema::Schema;
use crate::source_set::{SourceRoot, SourceSet};

pub struct Configuration<FS: Filesystem + Clone> {
    source_path: Vec<SourceRoot>,
    proto_path: Vec<SourceRoot>,
    tree_shaking_roots: Vec<String>,
    tree_shaking_rubbish: Vec<String>,
    filesystem: FS,
}

impl<FS: Filesystem + Clone> Configuration<FS> {
    pub fn new(filesystem: FS) -> Self {
        Configuration {
            source_path: Vec::new(),
            proto_path: Vec::new(),
            tree_shaking_roots: vec!["*".to_string()],
            tree_shaking_rubbish: Vec::new(),
            filesystem,
        }
    }

    pub fn source_path(&mut self, root: SourceRoot) -> &mut Self {
        self.source_path.push(root);
        self
    }

    pub fn proto_path(&mut self, root: SourceRoot) -> &mut Self {
        self.proto_path.push(root);
        self
    }

    pub fn tree_shaking_roots(&mut self, roots: Vec<String>) -> &mut Self {
        self.tree_shaking_roots = roots;
        self
    }

    pub fn tree_shaking_rubbish(&mut self, rubbish: Vec<String>) -> &mut Self {
        self.tree_shaking_rubbish = rubbish;
        self
    }

    /// Runs the full pipeline: load, link, (optionally) prune, dispatch.
    /// Returns the schema that was actually handed to the targets, mostly
    /// useful for tests and diagnostics — the real output is the sequence
    /// of `Handler::handle` calls the targets received.
    pub fn compile(
        &self,
        targets: Vec<Box<dyn Target<FS>>>,
        logger: &dyn Logger,
    ) -> Result<Schema> {
        let source_set = SourceSet::new(self.source_path.clone(), self.filesystem.clone());
        let proto_set = SourceSet::new(self.proto_path.clone(), self.filesystem.clone());
        let loader = SchemaLoader::new(source_set, proto_set);
        let loaded = loader.load()?;

        let schema = Linker::link(loaded.files, &loaded.source_paths)?;

        let (schema, report) = Pruner::prune(
            &schema,
            &self.tree_shaking_roots,
            &self.tree_shaking_rubbish,
        )?;
        for rule in &report.unused_roots {
            logger.warn(&format!("Unused element in treeShakingRoots: {rule}"));
        }
        for rule in &report.unused_rubbish {
            logger.warn(&format!("Unused element in treeShakingRubbish: {rule}"));
        }

        TargetDispatcher::dispatch(&schema, &self.filesystem, &targets, logger)?;

        Ok(schema)
    }
}
