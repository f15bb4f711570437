//! Routes each source-set type to at most one backend, in the configured
//! target order, claiming types on a first-match basis.

use crate::ast::Type;
use crate::error::Error;
use crate::fs::Filesystem;
use crate::identifier_set::{Decision, IdentifierSet};
use crate::logger::Logger;
use crate::schema::Schema;

/// An error a target's handler may report while generating one type.
/// `Recoverable` is logged and the dispatcher moves on to the next type;
/// `Fatal` aborts the run.
#[derive(Debug)]
pub enum GenerationError {
    Recoverable(String),
    Fatal(Error),
}

/// A single claimed type's generation callback. Built once per target by
/// [`Target::new_handler`] and invoked once per type that target's
/// `elements` rule set matches; handlers may not observe or mutate the
/// schema between invocations.
pub trait Handler {
    fn handle(&mut self, ty: &Type) -> Result<(), GenerationError>;
}

/// A code-generation backend, as the core sees it: an element-selection
/// rule set plus a factory for the handler that actually emits output.
/// `FS` is the same [`Filesystem`] the rest of the pipeline was built
/// with, so a handler can read auxiliary resources through it.
pub trait Target<FS: Filesystem> {
    fn elements(&self) -> &[String];

    fn new_handler(
        &self,
        schema: &Schema,
        filesystem: &FS,
        logger: &dyn Logger,
    ) -> Box<dyn Handler>;
}

pub struct TargetDispatcher;

impl TargetDispatcher {
    /// Hands every source-set type to at most one target, in target order.
    /// Types whose file is proto-path-only never reach a handler; types
    /// left unclaimed once every target has had a turn are silently
    /// skipped.
    pub fn dispatch<FS: Filesystem>(
        schema: &Schema,
        filesystem: &FS,
        targets: &[Box<dyn Target<FS>>],
        logger: &dyn Logger,
    ) -> crate::error::Result<()> {
        let mut remaining = schema.source_set_types_in_order();

        for target in targets {
            let rules = IdentifierSet::build(target.elements(), &[])?;
            let mut handler = target.new_handler(schema, filesystem, logger);

            let mut claimed_positions = Vec::new();
            for (pos, &idx) in remaining.iter().enumerate() {
                let name = schema.type_at(idx).qualified_name();
                if rules.decide(name) != Decision::Included {
                    continue;
                }
                claimed_positions.push(pos);
                match handler.handle(schema.type_at(idx)) {
                    Ok(()) => {}
                    Err(GenerationError::Recoverable(message)) => {
                        logger.error(&message);
                    }
                    Err(GenerationError::Fatal(err)) => return Err(err),
                }
            }

            for pos in claimed_positions.into_iter().rev() {
                remaining.remove(pos);
            }

            for rule in rules.unused_includes() {
                logger.info(&format!("Unused element in target elements: {rule}"));
            }
        }

        Ok(())
    }
}
