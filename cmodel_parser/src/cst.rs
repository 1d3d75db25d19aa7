/* Thin adapter over the third-party C grammar.
 *
 * The rest of the crate only sees this module's node abstraction: a kind
 * string, a verbatim UTF-8 text span, the ordered child list, and the
 * (line, column) start point. Reading the source file and invoking the
 * grammar are the only I/O in the pipeline and both happen here, before
 * any handler runs.
 */

use crate::errors::{AnalyzerError, AnalyzerResult};
use std::path::Path;

/* One parsed translation unit. Owns the source text and the tree. */
pub struct CstDocument {
    source: String,
    tree: tree_sitter::Tree,
}

impl CstDocument {
    /* Parse C source text. */
    pub fn parse_source(source: impl Into<String>) -> AnalyzerResult<Self> {
        let source = source.into();
        let mut parser = tree_sitter::Parser::new();
        parser
            .set_language(&tree_sitter::Language::from(tree_sitter_c::LANGUAGE))
            .map_err(|_| AnalyzerError::Grammar {
                path: "<source>".to_string(),
            })?;
        let tree = parser
            .parse(&source, None)
            .ok_or_else(|| AnalyzerError::Grammar {
                path: "<source>".to_string(),
            })?;
        Ok(Self { source, tree })
    }

    /* Read and parse a C source or header file. */
    pub fn parse_file(path: &Path) -> AnalyzerResult<Self> {
        let source = std::fs::read_to_string(path).map_err(|source| AnalyzerError::File {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse_source(source)
    }

    pub fn root(&self) -> CstNode<'_> {
        CstNode {
            node: self.tree.root_node(),
            source: &self.source,
        }
    }
}

/* Borrowed view of one syntax node. */
#[derive(Copy, Clone)]
pub struct CstNode<'a> {
    node: tree_sitter::Node<'a>,
    source: &'a str,
}

impl<'a> CstNode<'a> {
    /* Grammar production name, e.g. "struct_specifier". Punctuation and
     * keyword tokens report their literal spelling. */
    pub fn kind(&self) -> &'a str {
        self.node.kind()
    }

    /* Verbatim source text covered by this node. */
    pub fn text(&self) -> &'a str {
        self.node.utf8_text(self.source.as_bytes()).unwrap_or("")
    }

    /* Ordered children, trivia included. */
    pub fn children(&self) -> Vec<CstNode<'a>> {
        (0..self.node.child_count())
            .filter_map(|i| self.node.child(i as u32))
            .map(|node| CstNode {
                node,
                source: self.source,
            })
            .collect()
    }

    /* Zero-based (line, column) of the node start. */
    pub fn start_point(&self) -> (usize, usize) {
        let point = self.node.start_position();
        (point.row, point.column)
    }

    /* First child of the given kind, if any. */
    pub fn child_of_kind(&self, kind: &str) -> Option<CstNode<'a>> {
        self.children().into_iter().find(|c| c.kind() == kind)
    }

    /* Depth-first search for the first descendant of the given kind. */
    pub fn find_descendant(&self, kind: &str) -> Option<CstNode<'a>> {
        for child in self.children() {
            if child.kind() == kind {
                return Some(child);
            }
            if let Some(found) = child.find_descendant(kind) {
                return Some(found);
            }
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_a_simple_declaration() {
        let doc = CstDocument::parse_source("int x = 1;").unwrap();
        let root = doc.root();
        assert_eq!(root.kind(), "translation_unit");
        let decl = root.child_of_kind("declaration").expect("declaration node");
        assert_eq!(decl.text(), "int x = 1;");
        assert_eq!(decl.start_point(), (0, 0));
    }

    #[test]
    fn finds_nested_nodes() {
        let doc = CstDocument::parse_source("struct P { int x; };").unwrap();
        let spec = doc.root().find_descendant("struct_specifier").unwrap();
        assert!(spec.child_of_kind("field_declaration_list").is_some());
        let field = spec.find_descendant("field_declaration").unwrap();
        assert_eq!(field.text(), "int x;");
    }
}
