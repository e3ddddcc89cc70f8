//! Tree to program flattening.

use stencil_markup::{Node, NodeId};

use crate::compile::CompileContext;
use crate::error::Result;
use crate::program::Program;

impl CompileContext<'_> {
    /// Flattens the children of `id` into a program.
    ///
    /// Embedded instructions are moved out of the tree, so each subtree can
    /// be generated once.
    pub fn body(&mut self, id: NodeId) -> Result<Program> {
        let mut program = Program::new();
        for child in self.doc.children(id).to_vec() {
            self.emit(child, &mut program)?;
        }
        Ok(program)
    }

    fn emit(&mut self, id: NodeId, program: &mut Program) -> Result<()> {
        let line = self.doc.line(id);
        if matches!(self.doc.node(id), Node::Embedded(_)) {
            let taken = std::mem::replace(self.doc.node_mut(id), Node::Text(String::new()));
            if let Node::Embedded(instruction) = taken {
                program.push(instruction);
            }
            return Ok(());
        }

        let (open, close) = match self.doc.node(id) {
            Node::Text(s) | Node::Comment(s) | Node::CData(s) | Node::DocType(s) => {
                (s.clone(), None)
            }
            Node::Element(el) => (el.raw_open.clone(), el.raw_close.clone()),
            Node::Document | Node::Embedded(_) => (String::new(), None),
        };
        self.expand_inline(&open, line, program)?;
        for child in self.doc.children(id).to_vec() {
            self.emit(child, program)?;
        }
        if let Some(close) = close {
            self.expand_inline(&close, line, program)?;
        }
        Ok(())
    }
}
