/* Static analyzer core for C translation units.
 *
 * A single pass runs one file end to end: the CST adapter produces the
 * tree, the type walk registers every declared type and macro in the
 * TypeManager, then the data walk resolves each file-scope variable
 * against that table and reduces its initializer to a typed value
 * tree. Distinct files are independent; parallel callers each own an
 * Analyzer (or clone the promoted global tier at start).
 */

pub mod cst;
pub mod data_manager;
pub mod data_parser;
pub mod errors;
pub mod layout;
pub mod output;
pub mod type_manager;
pub mod type_parser;

pub use cst::{CstDocument, CstNode};
pub use data_manager::{DataManager, VariableRecord};
pub use data_parser::DataParser;
pub use errors::{AnalyzerError, AnalyzerResult};
pub use layout::{BasicInfo, TargetLayout};
pub use output::{AnalysisOutput, SimplifiedOutput, SimplifiedVariable, TypeSection, VariableSection};
pub use type_manager::{
    FieldInfo, ResolveRequest, ResolvedType, Scope, TypeInfoSnapshot, TypeManager,
};
pub use type_parser::TypeParser;

use std::path::Path;

/* End-to-end driver for one or more translation units sharing a global
 * type tier. */
pub struct Analyzer {
    types: TypeManager,
}

impl Default for Analyzer {
    fn default() -> Self {
        Self::new()
    }
}

impl Analyzer {
    pub fn new() -> Self {
        Self {
            types: TypeManager::new(),
        }
    }

    pub fn with_layout(layout: TargetLayout) -> Self {
        Self {
            types: TypeManager::with_layout(layout),
        }
    }

    pub fn types(&self) -> &TypeManager {
        &self.types
    }

    pub fn types_mut(&mut self) -> &mut TypeManager {
        &mut self.types
    }

    /* Run only the type pass over a header and promote its declarations
     * to the global tier, returning what was found. */
    pub fn parse_header_file(&mut self, path: &Path) -> AnalyzerResult<TypeInfoSnapshot> {
        let doc = CstDocument::parse_file(path)?;
        self.parse_header_root(&doc, &path.display().to_string())
    }

    pub fn parse_header_source(
        &mut self,
        source: &str,
        label: &str,
    ) -> AnalyzerResult<TypeInfoSnapshot> {
        let doc = CstDocument::parse_source(source)?;
        self.parse_header_root(&doc, label)
    }

    fn parse_header_root(
        &mut self,
        doc: &CstDocument,
        label: &str,
    ) -> AnalyzerResult<TypeInfoSnapshot> {
        self.types.reset_current_type_info();
        TypeParser::new(&mut self.types, label).parse_root(&doc.root());
        let snapshot = self.types.export_types(Scope::Current);
        self.types.promote_current_to_global();
        Ok(snapshot)
    }

    /* Full analysis of one translation unit: types first, then
     * variables. */
    pub fn analyze_file(&mut self, path: &Path) -> AnalyzerResult<AnalysisOutput> {
        let doc = CstDocument::parse_file(path)?;
        self.analyze_root(&doc, &path.display().to_string())
    }

    pub fn analyze_source(&mut self, source: &str, label: &str) -> AnalyzerResult<AnalysisOutput> {
        let doc = CstDocument::parse_source(source)?;
        self.analyze_root(&doc, label)
    }

    fn analyze_root(&mut self, doc: &CstDocument, label: &str) -> AnalyzerResult<AnalysisOutput> {
        self.types.reset_current_type_info();
        let root = doc.root();
        TypeParser::new(&mut self.types, label).parse_root(&root);
        let mut data = DataManager::new();
        DataParser::new(&self.types, &mut data, label).parse_root(&root);
        Ok(AnalysisOutput::collect(&self.types, &data))
    }
}
