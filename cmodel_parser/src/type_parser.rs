/* Declaration walk: consumes a translation unit and emits type records
 * and macro definitions into a TypeManager.
 *
 * Handles typedefs (plain, pointer, array, and function-pointer
 * aliases), struct/union/enum specifiers (named, anonymous, forward,
 * nested), bit-fields, multi-dimensional arrays, and object-like
 * `#define`s. Preprocessor conditionals are walked transparently; both
 * branches contribute declarations and later ones shadow earlier ones.
 * A malformed sub-declaration is skipped with a diagnostic and the walk
 * continues.
 */

use crate::cst::{CstDocument, CstNode};
use crate::errors::AnalyzerResult;
use crate::type_manager::TypeManager;
use cmodel_types::{
    evaluate, ArrayDim, AttrValue, BitField, CompositeType, EnumType, EnumValue, Evaluated,
    FieldRecord, FunctionInfo, Location, ParameterInfo, Qualifiers, RealKind, ScalarValue,
    SymbolTable, TypeCategory, TypeRecord, TypedefType,
};
use indexmap::IndexMap;
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use tracing::{debug, warn};

const BASE_TYPE_KINDS: &[&str] = &[
    "primitive_type",
    "sized_type_specifier",
    "type_identifier",
    "struct_specifier",
    "union_specifier",
    "enum_specifier",
];

const LITERAL_KINDS: &[&str] = &[
    "number_literal",
    "hex_literal",
    "octal_literal",
    "decimal_literal",
    "binary_literal",
];

pub struct TypeParser<'tm> {
    types: &'tm mut TypeManager,
    current_file: String,
}

impl<'tm> TypeParser<'tm> {
    pub fn new(types: &'tm mut TypeManager, current_file: impl Into<String>) -> Self {
        Self {
            types,
            current_file: current_file.into(),
        }
    }

    /* Parse source text and register every declaration found. */
    pub fn parse_source(&mut self, source: &str) -> AnalyzerResult<()> {
        let doc = CstDocument::parse_source(source)?;
        self.parse_root(&doc.root());
        Ok(())
    }

    /* Walk an already-parsed translation unit. */
    pub fn parse_root(&mut self, root: &CstNode) {
        self.walk_children(root);
    }

    fn walk_children(&mut self, node: &CstNode) {
        let mut pending_comment: Option<String> = None;
        for child in node.children() {
            match child.kind() {
                "comment" => {
                    pending_comment = Some(clean_comment(child.text()));
                    continue;
                }
                "type_definition" => {
                    self.parse_typedef(&child);
                }
                "struct_specifier" => {
                    self.parse_composite(
                        &child,
                        TypeCategory::Struct,
                        None,
                        pending_comment.as_deref(),
                    );
                }
                "union_specifier" => {
                    self.parse_composite(
                        &child,
                        TypeCategory::Union,
                        None,
                        pending_comment.as_deref(),
                    );
                }
                "enum_specifier" => {
                    self.parse_enum(&child, None, pending_comment.as_deref());
                }
                "preproc_def" => {
                    self.parse_macro(&child);
                }
                "preproc_ifdef" | "preproc_if" | "preproc_else" | "preproc_elif" => {
                    self.walk_children(&child);
                }
                "declaration" => {
                    /* Composite types defined inline in a variable
                     * declaration still belong to the type table. */
                    for sub in child.children() {
                        match sub.kind() {
                            "struct_specifier" => {
                                self.parse_composite(&sub, TypeCategory::Struct, None, None);
                            }
                            "union_specifier" => {
                                self.parse_composite(&sub, TypeCategory::Union, None, None);
                            }
                            "enum_specifier" => {
                                self.parse_enum(&sub, None, None);
                            }
                            _ => {}
                        }
                    }
                }
                other => {
                    debug!(kind = other, "skipping node");
                }
            }
            pending_comment = None;
        }
    }

    /* ---- typedefs ---- */

    fn parse_typedef(&mut self, node: &CstNode) {
        let children = node.children();
        let mut qualifiers = Qualifiers::default();
        for child in &children {
            match child.kind() {
                "type_qualifier" => apply_qualifier(&mut qualifiers, child.text()),
                "storage_class_specifier" => {
                    qualifiers.storage_class = Some(child.text().to_string());
                }
                _ => {}
            }
        }

        let Some(base_index) = children
            .iter()
            .position(|c| BASE_TYPE_KINDS.contains(&c.kind()))
        else {
            warn!(text = node.text(), "typedef without a base type skipped");
            return;
        };

        /* Declarators follow the base type; the first name doubles as the
         * tag of an anonymous composite defined inline. */
        let declarators: Vec<CstNode> = children
            .iter()
            .skip(base_index + 1)
            .filter(|c| {
                matches!(
                    c.kind(),
                    "type_identifier"
                        | "pointer_declarator"
                        | "array_declarator"
                        | "function_declarator"
                )
            })
            .copied()
            .collect();
        let hint = declarators.first().and_then(|d| declarator_name(d));

        let base_node = &children[base_index];
        let (base_type, mut real_type) = match base_node.kind() {
            "primitive_type" | "sized_type_specifier" => {
                (base_node.text().to_string(), Some(RealKind::Basic))
            }
            "type_identifier" => {
                let name = base_node.text().to_string();
                let real = self.classify_real_kind(&name);
                (name, real)
            }
            "struct_specifier" => {
                match self.parse_composite(base_node, TypeCategory::Struct, hint.as_deref(), None) {
                    Some((name, _)) => (name, Some(RealKind::Struct)),
                    None => return,
                }
            }
            "union_specifier" => {
                match self.parse_composite(base_node, TypeCategory::Union, hint.as_deref(), None) {
                    Some((name, _)) => (name, Some(RealKind::Union)),
                    None => return,
                }
            }
            "enum_specifier" => match self.parse_enum(base_node, hint.as_deref(), None) {
                Some((name, _)) => (name, Some(RealKind::Enum)),
                None => return,
            },
            _ => return,
        };

        let location = self.location_of(node);
        for declarator in &declarators {
            match declarator.kind() {
                "type_identifier" => {
                    self.register_typedef(
                        declarator.text(),
                        base_type.clone(),
                        0,
                        None,
                        real_type,
                        None,
                        &qualifiers,
                        &location,
                    );
                }
                "pointer_declarator" => {
                    let (stars, name) = pointer_depth_and_name(declarator);
                    let Some(name) = name else {
                        warn!(text = declarator.text(), "pointer typedef without a name");
                        continue;
                    };
                    self.register_typedef(
                        &name,
                        base_type.clone(),
                        stars,
                        None,
                        Some(RealKind::Pointer),
                        None,
                        &qualifiers,
                        &location,
                    );
                }
                "array_declarator" => {
                    let Some(name) = declarator_name(declarator) else {
                        warn!(text = declarator.text(), "array typedef without a name");
                        continue;
                    };
                    let dims = self.array_dimensions(declarator);
                    let suffix: String = dims
                        .iter()
                        .map(|d| match d {
                            ArrayDim::Fixed(n) => format!("[{}]", n),
                            ArrayDim::Named(n) => format!("[{}]", n),
                            ArrayDim::Expr(e) => format!("[{}]", e),
                            ArrayDim::Dynamic => "[]".to_string(),
                        })
                        .collect();
                    self.register_typedef(
                        &name,
                        base_type.clone(),
                        0,
                        Some(suffix),
                        real_type,
                        None,
                        &qualifiers,
                        &location,
                    );
                }
                "function_declarator" => {
                    let Some((name, info)) = self.parse_function_pointer(declarator, &base_type)
                    else {
                        warn!(text = declarator.text(), "unparsable function typedef");
                        continue;
                    };
                    let spelled = function_pointer_spelling(&info);
                    real_type = Some(RealKind::FunctionPointer);
                    self.register_typedef(
                        &name,
                        spelled,
                        0,
                        None,
                        real_type,
                        Some(info),
                        &qualifiers,
                        &location,
                    );
                }
                _ => {}
            }
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn register_typedef(
        &mut self,
        name: &str,
        base_type: String,
        stars: u32,
        array_suffix: Option<String>,
        real_type: Option<RealKind>,
        function_info: Option<FunctionInfo>,
        qualifiers: &Qualifiers,
        location: &Location,
    ) {
        let mut type_name = format!("{}{}", base_type, "*".repeat(stars as usize));
        if let Some(suffix) = array_suffix {
            type_name.push_str(&suffix);
        }
        let real_type = if stars > 0 {
            Some(RealKind::Pointer)
        } else {
            real_type
        };
        self.types.register_type(TypeRecord::Typedef(TypedefType {
            name: name.to_string(),
            type_name,
            base_type,
            real_type,
            function_info,
            qualifiers: qualifiers.clone(),
            location: Some(location.clone()),
        }));
    }

    fn classify_real_kind(&self, name: &str) -> Option<RealKind> {
        match self.types.get_type_category(name) {
            TypeCategory::Basic => Some(RealKind::Basic),
            TypeCategory::Struct => Some(RealKind::Struct),
            TypeCategory::Union => Some(RealKind::Union),
            TypeCategory::Enum => Some(RealKind::Enum),
            TypeCategory::Pointer => Some(RealKind::Pointer),
            _ => None,
        }
    }

    fn parse_function_pointer(
        &mut self,
        node: &CstNode,
        return_type: &str,
    ) -> Option<(String, FunctionInfo)> {
        let name = node.find_descendant("type_identifier")?.text().to_string();
        let mut parameters = Vec::new();
        let mut is_variadic = false;
        if let Some(list) = node.child_of_kind("parameter_list") {
            for param in list.children() {
                match param.kind() {
                    "parameter_declaration" => {
                        if let Some(info) = parse_parameter(&param) {
                            parameters.push(info);
                        }
                    }
                    "variadic_parameter" | "..." => is_variadic = true,
                    _ => {}
                }
            }
        }
        Some((
            name,
            FunctionInfo {
                return_type: return_type.to_string(),
                parameters,
                is_variadic,
            },
        ))
    }

    /* ---- composites ---- */

    /* Parse a struct or union specifier, register it, and return its
     * canonical name plus fields. A specifier without a body registers a
     * forward declaration. An anonymous specifier takes its tag from the
     * surrounding typedef when one exists, otherwise a synthetic
     * position-derived name. */
    pub(crate) fn parse_composite(
        &mut self,
        node: &CstNode,
        kind: TypeCategory,
        tag_hint: Option<&str>,
        comment: Option<&str>,
    ) -> Option<(String, Vec<FieldRecord>)> {
        let keyword = match kind {
            TypeCategory::Struct => "struct",
            TypeCategory::Union => "union",
            _ => return None,
        };
        let name = match node.child_of_kind("type_identifier") {
            Some(tag) => {
                let text = tag.text();
                if text.starts_with(&format!("{} ", keyword)) {
                    text.to_string()
                } else {
                    format!("{} {}", keyword, text)
                }
            }
            None => match tag_hint {
                Some(hint) => format!("{} {}", keyword, hint),
                None => anonymous_name(keyword, node),
            },
        };

        let location = self.location_of(node);
        let attributes = parse_attributes(node);

        let Some(body) = node.child_of_kind("field_declaration_list") else {
            self.types.register_type(make_composite(
                kind,
                CompositeType {
                    name: name.clone(),
                    fields: Vec::new(),
                    size: None,
                    alignment: None,
                    location: Some(location),
                    attributes,
                    comment: comment.map(str::to_string),
                },
            ));
            return Some((name, Vec::new()));
        };

        let mut fields = Vec::new();
        for field_node in body.children() {
            if field_node.kind() != "field_declaration" {
                continue;
            }
            match self.parse_field(&field_node) {
                Some(field) => fields.push(field),
                None => {
                    warn!(text = field_node.text(), "malformed field skipped");
                }
            }
        }

        let (size, alignment) = self.types.composite_layout(kind, &fields, &attributes);
        self.types.register_type(make_composite(
            kind,
            CompositeType {
                name: name.clone(),
                fields: fields.clone(),
                size,
                alignment,
                location: Some(location),
                attributes,
                comment: comment.map(str::to_string),
            },
        ));
        Some((name, fields))
    }

    /* ---- enums ---- */

    pub(crate) fn parse_enum(
        &mut self,
        node: &CstNode,
        tag_hint: Option<&str>,
        comment: Option<&str>,
    ) -> Option<(String, IndexMap<String, EnumValue>)> {
        let name = match node.child_of_kind("type_identifier") {
            Some(tag) => format!("enum {}", tag.text()),
            None => match tag_hint {
                Some(hint) => format!("enum {}", hint),
                None => anonymous_name("enum", node),
            },
        };

        let mut values: IndexMap<String, EnumValue> = IndexMap::new();
        let mut counter: i64 = 0;
        /* Explicit values may reference enumerators declared just above,
         * so the substitution table grows as the list is walked. */
        let mut known = self.types.get_enum_values();
        let macros = self.types.get_macro_definitions();

        if let Some(list) = node.child_of_kind("enumerator_list") {
            for enumerator in list.children() {
                if enumerator.kind() != "enumerator" {
                    continue;
                }
                let Some(id) = enumerator.child_of_kind("identifier") else {
                    continue;
                };
                let enum_name = id.text().to_string();
                /* The explicit value is whatever follows the '='. */
                let mut saw_assign = false;
                let mut explicit = None;
                for c in enumerator.children() {
                    if c.kind() == "=" {
                        saw_assign = true;
                    } else if saw_assign && c.kind() != "comment" {
                        explicit = Some(c);
                        break;
                    }
                }
                let value = match explicit {
                    None => {
                        let v = counter;
                        counter += 1;
                        EnumValue::Int(v)
                    }
                    Some(expr_node) => match evaluate(expr_node.text(), &known, &macros) {
                        Evaluated::Int(v) => {
                            counter = v + 1;
                            EnumValue::Int(v)
                        }
                        _ => {
                            warn!(
                                name = %enum_name,
                                value = expr_node.text(),
                                "enumerator value did not reduce to an integer"
                            );
                            EnumValue::Expr(expr_node.text().to_string())
                        }
                    },
                };
                if let EnumValue::Int(v) = &value {
                    known.insert(enum_name.clone(), ScalarValue::Int(*v));
                }
                values.insert(enum_name, value);
            }
        }

        let location = self.location_of(node);
        self.types.register_type(TypeRecord::Enum(EnumType {
            name: name.clone(),
            values: values.clone(),
            size: Some(self.types.layout().enum_size),
            alignment: Some(self.types.layout().enum_alignment),
            location: Some(location),
            comment: comment.map(str::to_string),
        }));
        Some((name, values))
    }

    /* ---- macros ---- */

    /* Object-like `#define NAME value`. Function-like macros arrive as a
     * different production and are not dispatched here. */
    fn parse_macro(&mut self, node: &CstNode) {
        if node.child_of_kind("preproc_params").is_some() {
            return;
        }
        let Some(name) = node.child_of_kind("identifier").map(|n| n.text().to_string()) else {
            return;
        };
        let value_node = node.children().into_iter().find(|c| {
            c.kind() == "preproc_arg"
                || LITERAL_KINDS.contains(&c.kind())
                || matches!(
                    c.kind(),
                    "binary_expression" | "string_literal" | "char_literal"
                )
        });
        let Some(value_node) = value_node else {
            debug!(name = %name, "macro without a value skipped");
            return;
        };

        let mut text = value_node.text().trim().to_string();
        if let Some(stripped) = strip_balanced_parens(&text) {
            text = stripped.to_string();
        }

        let value = match evaluate(
            &text,
            &self.types.get_enum_values(),
            &self.types.get_macro_definitions(),
        ) {
            Evaluated::Int(v) => ScalarValue::Int(v),
            Evaluated::Float(v) => ScalarValue::Float(v),
            Evaluated::Str(s) => ScalarValue::Text(s),
            Evaluated::Expr(_) => ScalarValue::Text(text),
        };
        self.types.add_macro_definition(name, value);
    }

    /* ---- fields ---- */

    fn parse_field(&mut self, node: &CstNode) -> Option<FieldRecord> {
        let mut field = FieldRecord::new("", "");
        field.original_type = None;

        for child in node.children() {
            match child.kind() {
                "field_identifier" => {
                    if field.name.is_empty() {
                        field.name = child.text().to_string();
                    }
                }
                "type_qualifier" => apply_qualifier(&mut field.qualifiers, child.text()),
                "primitive_type" | "sized_type_specifier" | "type_identifier" => {
                    if field.type_name.is_empty() {
                        field.type_name = child.text().to_string();
                        field.original_type = Some(field.type_name.clone());
                    }
                }
                "struct_specifier" | "union_specifier" => {
                    let kind = if child.kind() == "struct_specifier" {
                        TypeCategory::Struct
                    } else {
                        TypeCategory::Union
                    };
                    let (nested_name, nested_fields) =
                        self.parse_composite(&child, kind, None, None)?;
                    if self.types.is_anonymous_type(&nested_name) && !nested_fields.is_empty() {
                        field.nested_fields = Some(nested_fields);
                    }
                    field.type_name = nested_name.clone();
                    field.original_type = Some(nested_name);
                }
                "enum_specifier" => {
                    let (nested_name, _) = self.parse_enum(&child, None, None)?;
                    field.type_name = nested_name.clone();
                    field.original_type = Some(nested_name);
                }
                _ => {}
            }
        }

        /* Declarator pass: pointers, arrays, bit-fields. */
        for child in node.children() {
            match child.kind() {
                "pointer_declarator" => {
                    let (stars, name) = pointer_depth_and_name(&child);
                    if let Some(name) = name {
                        field.name = name;
                    }
                    if stars > 0 {
                        let base = field.type_name.clone();
                        field.pointer_type =
                            Some(format!("{}{}", base, "*".repeat(stars as usize - 1)));
                        field.type_name = format!("{}{}", base, "*".repeat(stars as usize));
                    }
                    if let Some(array) = child.find_descendant("array_declarator") {
                        field.array_size = self.array_dimensions(&array);
                    }
                }
                "array_declarator" => {
                    field.array_size = self.array_dimensions(&child);
                    if let Some(name) = declarator_name(&child) {
                        field.name = name;
                    }
                }
                "function_declarator" => {
                    /* Function-pointer field: keep the base as pointee. */
                    if let Some(name) = child.find_descendant("field_identifier") {
                        field.name = name.text().to_string();
                    }
                    let base = field.type_name.clone();
                    field.pointer_type = Some(base.clone());
                    field.type_name = format!("{}*", base);
                }
                "bitfield_clause" => {
                    field.bit_field = Some(self.parse_bitfield(&child));
                }
                _ => {}
            }
        }

        if field.name.is_empty() && field.nested_fields.is_none() {
            return None;
        }
        if field.type_name.is_empty() {
            return None;
        }
        Some(field)
    }

    fn parse_bitfield(&self, clause: &CstNode) -> BitField {
        let expr = clause
            .children()
            .into_iter()
            .find(|c| !matches!(c.kind(), ":" | "comment"));
        let Some(expr) = expr else {
            return BitField::Expr(String::new());
        };
        let mut text = expr.text().trim().to_string();
        if let Some(stripped) = strip_balanced_parens(&text) {
            text = stripped.to_string();
        }
        match evaluate(
            &text,
            &self.types.get_enum_values(),
            &self.types.get_macro_definitions(),
        ) {
            Evaluated::Int(v) if (0..=64).contains(&v) => BitField::Width(v as u32),
            Evaluated::Int(v) => {
                warn!(width = v, "bit-field width out of range");
                BitField::Expr(text)
            }
            _ => {
                warn!(value = %text, "bit-field width did not reduce to an integer");
                BitField::Expr(text)
            }
        }
    }

    /* Dimensions of a (possibly nested) array declarator, returned in
     * declaration order. */
    fn array_dimensions(&self, declarator: &CstNode) -> Vec<ArrayDim> {
        let enums = self.types.get_enum_values();
        let macros = self.types.get_macro_definitions();
        let mut dims = Vec::new();
        let mut current = Some(*declarator);
        while let Some(node) = current {
            if node.kind() != "array_declarator" {
                break;
            }
            dims.push(extract_dimension(&node, &enums, &macros, true));
            current = node
                .children()
                .into_iter()
                .find(|c| c.kind() == "array_declarator");
        }
        dims.reverse();
        dims
    }

    fn location_of(&self, node: &CstNode) -> Location {
        let (line, column) = node.start_point();
        Location {
            file: self.current_file.clone(),
            line: line + 1,
            column,
        }
    }
}

/* ---- shared helpers ---- */

pub(crate) fn apply_qualifier(qualifiers: &mut Qualifiers, text: &str) {
    match text {
        "const" => qualifiers.is_const = true,
        "volatile" => qualifiers.is_volatile = true,
        "restrict" => qualifiers.is_restrict = true,
        _ => {}
    }
}

/* Synthetic name for a tagless composite or enum, stable across runs:
 * position plus a short hash of the byte span. */
pub(crate) fn anonymous_name(keyword: &str, node: &CstNode) -> String {
    let (line, column) = node.start_point();
    let digest = Sha256::digest(node.text().as_bytes());
    let hash: String = digest
        .iter()
        .take(3)
        .map(|b| format!("{:02x}", b))
        .collect();
    format!("__anon_{}_{}_{}_{}", keyword, line, column, hash)
}

fn make_composite(kind: TypeCategory, composite: CompositeType) -> TypeRecord {
    match kind {
        TypeCategory::Union => TypeRecord::Union(composite),
        _ => TypeRecord::Struct(composite),
    }
}

fn clean_comment(text: &str) -> String {
    text.trim_start_matches('/')
        .trim_start_matches('*')
        .trim_end_matches('/')
        .trim_end_matches('*')
        .trim()
        .to_string()
}

/* Count pointer levels and find the declared name under a pointer
 * declarator. */
pub(crate) fn pointer_depth_and_name(node: &CstNode) -> (u32, Option<String>) {
    let mut stars = 0;
    let mut current = Some(*node);
    let mut name = None;
    while let Some(n) = current {
        match n.kind() {
            "pointer_declarator" => {
                stars += 1;
                current = n.children().into_iter().find(|c| {
                    matches!(
                        c.kind(),
                        "pointer_declarator"
                            | "array_declarator"
                            | "identifier"
                            | "field_identifier"
                            | "type_identifier"
                            | "parenthesized_declarator"
                            | "function_declarator"
                    )
                });
            }
            "identifier" | "field_identifier" | "type_identifier" => {
                name = Some(n.text().to_string());
                break;
            }
            "array_declarator" | "parenthesized_declarator" | "function_declarator" => {
                name = declarator_name(&n);
                break;
            }
            _ => break,
        }
    }
    (stars, name)
}

/* Find the declared identifier anywhere under a declarator subtree. */
pub(crate) fn declarator_name(node: &CstNode) -> Option<String> {
    if matches!(
        node.kind(),
        "identifier" | "field_identifier" | "type_identifier"
    ) {
        return Some(node.text().to_string());
    }
    for kind in ["identifier", "field_identifier", "type_identifier"] {
        if let Some(found) = node.find_descendant(kind) {
            return Some(found.text().to_string());
        }
    }
    None
}

/* One dimension of an array declarator: the expression between the
 * brackets, or Dynamic for `[]`. With `named_vars` an irreducible bare
 * identifier becomes a named extent marker. */
pub(crate) fn extract_dimension(
    node: &CstNode,
    enums: &SymbolTable,
    macros: &SymbolTable,
    named_vars: bool,
) -> ArrayDim {
    let mut inside = false;
    for child in node.children() {
        match child.kind() {
            "[" => inside = true,
            "]" => inside = false,
            "comment" => {}
            kind if inside => {
                let text = child.text().trim().to_string();
                return match evaluate(&text, enums, macros) {
                    Evaluated::Int(v) => ArrayDim::Fixed(v),
                    Evaluated::Float(v) => ArrayDim::Fixed(v as i64),
                    _ if named_vars && kind == "identifier" => ArrayDim::Named(text),
                    _ => ArrayDim::Expr(text),
                };
            }
            _ => {}
        }
    }
    ArrayDim::Dynamic
}

/* Strip one pair of parentheses when they enclose the whole text. */
pub(crate) fn strip_balanced_parens(text: &str) -> Option<&str> {
    let inner = text.strip_prefix('(')?.strip_suffix(')')?;
    let mut depth = 0i32;
    for c in inner.chars() {
        match c {
            '(' => depth += 1,
            ')' => {
                depth -= 1;
                if depth < 0 {
                    return None;
                }
            }
            _ => {}
        }
    }
    Some(inner.trim())
}

fn parse_parameter(node: &CstNode) -> Option<ParameterInfo> {
    let mut info = ParameterInfo {
        name: None,
        type_name: String::new(),
        is_pointer: false,
        pointer_level: 0,
        qualifiers: Qualifiers::default(),
    };
    for child in node.children() {
        match child.kind() {
            "type_qualifier" => apply_qualifier(&mut info.qualifiers, child.text()),
            "primitive_type" | "sized_type_specifier" | "type_identifier" => {
                if info.type_name.is_empty() {
                    info.type_name = child.text().to_string();
                }
            }
            "pointer_declarator" => {
                let (stars, name) = pointer_depth_and_name(&child);
                info.pointer_level += stars;
                info.is_pointer = info.pointer_level > 0;
                if name.is_some() {
                    info.name = name;
                }
            }
            "identifier" => {
                info.name = Some(child.text().to_string());
            }
            "abstract_pointer_declarator" => {
                info.pointer_level += child.text().matches('*').count() as u32;
                info.is_pointer = info.pointer_level > 0;
            }
            _ => {}
        }
    }
    if info.type_name.is_empty() {
        return None;
    }
    Some(info)
}

/* Canonical spelling of a function-pointer alias. */
fn function_pointer_spelling(info: &FunctionInfo) -> String {
    let mut params: Vec<String> = info
        .parameters
        .iter()
        .map(|p| format!("{}{}", p.type_name, "*".repeat(p.pointer_level as usize)))
        .collect();
    if info.is_variadic {
        params.push("...".to_string());
    }
    format!("{} (*) ({})", info.return_type, params.join(", "))
}

fn parse_attributes(node: &CstNode) -> BTreeMap<String, AttrValue> {
    let mut attributes = BTreeMap::new();
    for child in node.children() {
        if !matches!(child.kind(), "attribute_specifier" | "ms_declspec_modifier") {
            continue;
        }
        let text = child.text();
        if text.contains("packed") {
            attributes.insert("packed".to_string(), AttrValue::Bool(true));
        }
        if let Some(rest) = text.split("aligned(").nth(1) {
            if let Some(value) = rest.split(')').next() {
                if let Ok(n) = value.trim().parse::<i64>() {
                    attributes.insert("aligned".to_string(), AttrValue::Int(n));
                }
            }
        }
    }
    attributes
}
