/* Variable walk: turns every file-scope declaration that is not a
 * function declaration into a VariableRecord.
 *
 * Runs after the type pass, so every local type is already registered.
 * Initializers go through two separate steps: a raw parse that mirrors
 * the C initializer grammar with no knowledge of the target type, then
 * a shaping step that applies the resolved type to the raw tree. The
 * split is what lets designated initializers, anonymous unions, and
 * dynamic-extent inference fall out of the same code path.
 */

use crate::cst::CstNode;
use crate::data_manager::{DataManager, VariableRecord};
use crate::type_manager::{ResolveRequest, ResolvedType, TypeManager};
use crate::type_parser::{anonymous_name, apply_qualifier, extract_dimension};
use cmodel_types::{
    decode_c_string, evaluate, ArrayDim, Designator, FieldRecord, Location, Qualifiers, RawValue,
    ScalarValue, ShapedValue, TypeCategory, TypeRecord,
};
use indexmap::IndexMap;
use tracing::{debug, warn};

/* Bound on initializer nesting; past it the subtree is kept as text
 * instead of risking the stack. */
const MAX_NESTING: usize = 256;

pub struct DataParser<'a> {
    types: &'a TypeManager,
    data: &'a mut DataManager,
    current_file: String,
}

impl<'a> DataParser<'a> {
    pub fn new(
        types: &'a TypeManager,
        data: &'a mut DataManager,
        current_file: impl Into<String>,
    ) -> Self {
        Self {
            types,
            data,
            current_file: current_file.into(),
        }
    }

    /* Walk the translation unit, visiting file-scope declarations only. */
    pub fn parse_root(&mut self, root: &CstNode) {
        for child in root.children() {
            match child.kind() {
                "declaration" => self.visit_declaration(&child),
                "preproc_ifdef" | "preproc_if" | "preproc_else" | "preproc_elif" => {
                    self.parse_root(&child);
                }
                _ => {}
            }
        }
    }

    fn visit_declaration(&mut self, node: &CstNode) {
        if is_function_declaration(node) {
            debug!(text = node.text(), "skipping function declaration");
            return;
        }
        if let Some(record) = self.parse_variable(node) {
            self.data.add_variable(record, self.types);
        }
    }

    fn parse_variable(&mut self, node: &CstNode) -> Option<VariableRecord> {
        /* Qualifiers and storage class. */
        let mut qualifiers = Qualifiers::default();
        for child in node.children() {
            match child.kind() {
                "type_qualifier" => apply_qualifier(&mut qualifiers, child.text()),
                "storage_class_specifier" => {
                    qualifiers.storage_class = Some(child.text().to_string());
                }
                _ => {}
            }
        }

        /* Base type. */
        let base_type = self.extract_base_type(node)?;

        /* Declarator: name, pointer depth, array extents. */
        let declarator = find_declarator(node)?;
        let mut walk = DeclaratorInfo::default();
        self.walk_declarator(&declarator, &mut walk);
        let name = walk.name?;
        walk.dims.reverse();

        /* Initializer. */
        let initializer = find_initializer(node);
        let initial_value = initializer.map(|n| n.text().to_string());

        if qualifiers.storage_class.as_deref() == Some("extern") && initializer.is_none() {
            debug!(name = %name, "skipping extern declaration without initializer");
            return None;
        }

        /* Resolved view used for shaping. An entirely unknown base type
         * is reported and the record kept without type information. */
        let nested_fields = self.nested_fields_for(&base_type);
        let category = self.types.get_type_category(&base_type);
        let typeinfo = if category == TypeCategory::Unknown
            && nested_fields.is_none()
            && walk.pointer_level == 0
        {
            warn!(name = %name, type_name = %base_type, "variable references an unknown type");
            None
        } else {
            Some(self.types.resolve_type(
                &base_type,
                Some(ResolveRequest {
                    pointer_level: walk.pointer_level,
                    array_size: walk.dims.clone(),
                    bit_field: None,
                    nested_fields,
                }),
            ))
        };

        let mut record = VariableRecord {
            name,
            type_name: base_type,
            is_const: qualifiers.is_const,
            is_volatile: qualifiers.is_volatile,
            is_restrict: qualifiers.is_restrict,
            storage_class: qualifiers.storage_class,
            is_pointer: walk.pointer_level > 0,
            pointer_level: walk.pointer_level,
            array_size: walk.dims,
            initial_value,
            parsed_value: None,
            location: self.location_of(node),
            typeinfo,
        };

        if let Some(init_node) = initializer {
            let raw = self.parse_raw_initializer(&init_node);
            self.infer_dynamic_extents(&raw, &mut record);
            if let Some(info) = record.typeinfo.as_mut() {
                info.array_size = record.array_size.clone();
            }
            record.parsed_value = Some(match record.typeinfo.clone() {
                Some(info) => self.shape(raw, &info, &record.array_size.clone()),
                None => ShapedValue::from(raw),
            });
        }

        Some(record)
    }

    fn extract_base_type(&self, node: &CstNode) -> Option<String> {
        let mut parts: Vec<String> = Vec::new();
        for child in node.children() {
            match child.kind() {
                "primitive_type" | "sized_type_specifier" | "type_identifier" => {
                    parts.push(child.text().to_string());
                }
                "struct_specifier" | "union_specifier" | "enum_specifier" => {
                    let keyword = child.kind().trim_end_matches("_specifier");
                    match child.child_of_kind("type_identifier") {
                        Some(tag) => parts.push(format!("{} {}", keyword, tag.text())),
                        /* Tagless composite in a declaration: the type
                         * pass registered it under its synthetic name. */
                        None => parts.push(anonymous_name(keyword, &child)),
                    }
                }
                _ => {}
            }
        }
        if parts.is_empty() {
            warn!(text = node.text(), "declaration without a base type skipped");
            return None;
        }
        Some(parts.join(" "))
    }

    /* For an anonymous composite base, surface its registered fields on
     * the resolved type so shaping can use them directly. */
    fn nested_fields_for(&self, base_type: &str) -> Option<Vec<FieldRecord>> {
        if !self.types.is_anonymous_type(base_type) {
            return None;
        }
        match self.types.get_type_info(base_type)? {
            TypeRecord::Struct(c) | TypeRecord::Union(c) => Some(c.fields),
            _ => None,
        }
    }

    fn walk_declarator(&self, node: &CstNode, out: &mut DeclaratorInfo) {
        match node.kind() {
            "identifier" => {
                out.name = Some(node.text().to_string());
            }
            "pointer_declarator" => {
                out.pointer_level += 1;
                if let Some(inner) = node.children().into_iter().find(|c| {
                    matches!(
                        c.kind(),
                        "identifier"
                            | "pointer_declarator"
                            | "array_declarator"
                            | "function_declarator"
                            | "parenthesized_declarator"
                    )
                }) {
                    self.walk_declarator(&inner, out);
                }
            }
            "array_declarator" => {
                out.dims.push(extract_dimension(
                    node,
                    &self.types.get_enum_values(),
                    &self.types.get_macro_definitions(),
                    false,
                ));
                if let Some(first) = node.children().into_iter().next() {
                    self.walk_declarator(&first, out);
                }
            }
            "parenthesized_declarator" | "function_declarator" => {
                if let Some(inner) = node.children().into_iter().find(|c| {
                    matches!(
                        c.kind(),
                        "identifier"
                            | "pointer_declarator"
                            | "array_declarator"
                            | "parenthesized_declarator"
                    )
                }) {
                    self.walk_declarator(&inner, out);
                }
            }
            _ => {}
        }
    }

    /* ---- raw initializer parse ---- */

    fn parse_raw_initializer(&self, node: &CstNode) -> RawValue {
        self.parse_raw_at(node, 0)
    }

    fn parse_raw_at(&self, node: &CstNode, depth: usize) -> RawValue {
        if depth >= MAX_NESTING {
            warn!("initializer nesting limit reached; keeping subtree as text");
            return RawValue::Scalar(ScalarValue::Text(node.text().to_string()));
        }
        match node.kind() {
            "initializer_list" => {
                let mut items = Vec::new();
                for child in node.children() {
                    match child.kind() {
                        "{" | "}" | "," | "comment" => {}
                        "initializer_pair" => {
                            if let Some(entry) = self.parse_designated(&child, depth + 1) {
                                items.push(entry);
                            }
                        }
                        "initializer_list" => {
                            items.push(self.parse_raw_at(&child, depth + 1));
                        }
                        _ => items.push(RawValue::Scalar(self.scalar_from_node(&child))),
                    }
                }
                RawValue::List(items)
            }
            _ => RawValue::Scalar(self.scalar_from_node(node)),
        }
    }

    fn parse_designated(&self, node: &CstNode, depth: usize) -> Option<RawValue> {
        let mut designator: Option<Designator> = None;
        let mut value: Option<RawValue> = None;
        for child in node.children() {
            match child.kind() {
                "field_designator" => {
                    if designator.is_none() {
                        let field = child.find_descendant("field_identifier")?;
                        designator = Some(Designator::Field(field.text().to_string()));
                    }
                }
                "subscript_designator" => {
                    if designator.is_none() {
                        let expr = child
                            .children()
                            .into_iter()
                            .find(|c| !matches!(c.kind(), "[" | "]" | "comment"))?;
                        let evaluated = evaluate(
                            expr.text(),
                            &self.types.get_enum_values(),
                            &self.types.get_macro_definitions(),
                        );
                        designator = Some(match evaluated.as_int() {
                            Some(index) => Designator::Index(index),
                            None => Designator::Field(expr.text().to_string()),
                        });
                    }
                }
                "=" | "," | "comment" => {}
                "initializer_list" => value = Some(self.parse_raw_at(&child, depth + 1)),
                "initializer_pair" => value = self.parse_designated(&child, depth + 1),
                _ => value = Some(RawValue::Scalar(self.scalar_from_node(&child))),
            }
        }
        Some(RawValue::Designated {
            designator: designator?,
            value: Box::new(value?),
        })
    }

    fn scalar_from_node(&self, node: &CstNode) -> ScalarValue {
        match node.kind() {
            "string_literal" | "char_literal" => ScalarValue::Text(node.text().to_string()),
            "true" => ScalarValue::Bool(true),
            "false" => ScalarValue::Bool(false),
            "null" => ScalarValue::Null,
            "assignment_expression" => {
                match node.children().into_iter().last() {
                    Some(rhs) => self.scalar_from_node(&rhs),
                    None => ScalarValue::Null,
                }
            }
            _ => {
                let text = node.text().trim();
                match text {
                    "NULL" => ScalarValue::Null,
                    "true" => ScalarValue::Bool(true),
                    "false" => ScalarValue::Bool(false),
                    _ => evaluate(
                        text,
                        &self.types.get_enum_values(),
                        &self.types.get_macro_definitions(),
                    )
                    .into_scalar(),
                }
            }
        }
    }

    /* ---- dynamic-extent inference ---- */

    /* Replace `dynamic` extents with lengths observed in the raw value.
     * The walk descends one initializer level per declared dimension; a
     * string literal initializing a char array contributes its decoded
     * byte length plus the NUL terminator. */
    fn infer_dynamic_extents(&self, raw: &RawValue, record: &mut VariableRecord) {
        if record.array_size.is_empty() {
            return;
        }
        let is_char_array = record
            .typeinfo
            .as_ref()
            .is_some_and(|info| info.base_type == "char" && !info.is_pointer);

        let mut level: Option<&RawValue> = Some(raw);
        for dim in record.array_size.iter_mut() {
            if dim.is_dynamic() {
                match level {
                    Some(RawValue::List(items)) => {
                        *dim = ArrayDim::Fixed(items.len() as i64);
                    }
                    Some(RawValue::Scalar(scalar))
                        if is_char_array && scalar.is_string_literal() =>
                    {
                        if let ScalarValue::Text(text) = scalar {
                            *dim = ArrayDim::Fixed(decode_c_string(text).len() as i64 + 1);
                        }
                        break;
                    }
                    _ => {
                        *dim = ArrayDim::Fixed(1);
                        break;
                    }
                }
            }
            level = match level {
                Some(RawValue::List(items)) => items.first(),
                other => other,
            };
        }
    }

    /* ---- shaping ---- */

    fn shape(&self, raw: RawValue, info: &ResolvedType, dims: &[ArrayDim]) -> ShapedValue {
        if let Some((first, rest)) = dims.split_first() {
            return self.shape_array(raw, info, first, rest);
        }
        if (info.is_struct || info.is_union) && !info.is_pointer {
            return self.shape_composite(raw, info);
        }
        match raw {
            RawValue::List(_) => {
                warn!(type_name = %info.type_name, "aggregate initializer for a scalar");
                ShapedValue::from(raw)
            }
            other => ShapedValue::from(other),
        }
    }

    fn shape_array(
        &self,
        raw: RawValue,
        info: &ResolvedType,
        first: &ArrayDim,
        rest: &[ArrayDim],
    ) -> ShapedValue {
        let items = match raw {
            RawValue::List(items) => items,
            RawValue::Scalar(scalar)
                if scalar.is_string_literal() && info.base_type == "char" && !info.is_pointer =>
            {
                /* A string literal fills the whole char array. */
                if let ScalarValue::Text(text) = &scalar {
                    return ShapedValue::Scalar(ScalarValue::Text(decode_c_string(text)));
                }
                return ShapedValue::Scalar(scalar);
            }
            other => {
                warn!(type_name = %info.type_name, "scalar initializer for an array");
                return ShapedValue::from(other);
            }
        };

        let declared = first.as_fixed().map(|n| n.max(0) as usize);
        let capacity = declared.unwrap_or(items.len());
        let mut slots: Vec<Option<ShapedValue>> = vec![None; capacity];
        let mut cursor = 0usize;
        for item in items {
            match item {
                RawValue::Designated {
                    designator: Designator::Index(index),
                    value,
                } => {
                    let index = index.max(0) as usize;
                    if index < capacity {
                        slots[index] = Some(self.shape(*value, info, rest));
                        cursor = index + 1;
                    } else {
                        warn!(index, "array designator beyond declared extent dropped");
                    }
                }
                RawValue::Designated {
                    designator: Designator::Field(name),
                    ..
                } => {
                    warn!(field = %name, "field designator in array initializer ignored");
                }
                other => {
                    if cursor < capacity {
                        slots[cursor] = Some(self.shape(other, info, rest));
                        cursor += 1;
                    } else {
                        warn!(type_name = %info.type_name, "excess array initializer dropped");
                    }
                }
            }
        }

        let last_filled = slots.iter().rposition(Option::is_some).map_or(0, |i| i + 1);
        ShapedValue::List(
            slots
                .into_iter()
                .take(last_filled)
                .map(|slot| slot.unwrap_or(ShapedValue::Scalar(ScalarValue::Null)))
                .collect(),
        )
    }

    fn shape_composite(&self, raw: RawValue, info: &ResolvedType) -> ShapedValue {
        let fields: Vec<FieldRecord> = match (&info.nested_fields, &info.info) {
            (Some(nested), _) => nested.clone(),
            (None, Some(record)) => record.fields().map(<[FieldRecord]>::to_vec).unwrap_or_default(),
            (None, None) => Vec::new(),
        };
        if fields.is_empty() {
            warn!(type_name = %info.type_name, "no field list available for shaping");
            return ShapedValue::from(raw);
        }
        let items = match raw {
            RawValue::List(items) => items,
            other => {
                warn!(type_name = %info.type_name, "scalar initializer for a composite");
                return ShapedValue::from(other);
            }
        };

        if info.is_union {
            return self.shape_union(items, &fields);
        }

        /* Positional elements advance a field cursor; designated entries
         * bind by name without advancing it. */
        let mut bound: IndexMap<String, ShapedValue> = IndexMap::new();
        let mut cursor = 0usize;
        for item in items {
            match item {
                RawValue::Designated {
                    designator: Designator::Field(name),
                    value,
                } => match fields.iter().find(|f| f.name == name) {
                    Some(field) => {
                        bound.insert(name, self.shape_field(field, *value));
                    }
                    None => {
                        warn!(field = %name, "designator names an unknown field");
                    }
                },
                RawValue::Designated {
                    designator: Designator::Index(index),
                    ..
                } => {
                    warn!(index, "index designator in a struct initializer ignored");
                }
                other => {
                    if cursor < fields.len() {
                        let field = &fields[cursor];
                        bound.insert(field.name.clone(), self.shape_field(field, other));
                        cursor += 1;
                    } else {
                        warn!(type_name = %info.type_name, "excess struct initializer dropped");
                    }
                }
            }
        }

        /* Emit in declaration order; absent fields stay absent. */
        let mut result = IndexMap::new();
        for field in &fields {
            if let Some(value) = bound.shift_remove(&field.name) {
                result.insert(field.name.clone(), value);
            } else {
                debug!(field = %field.name, "field not covered by initializer");
            }
        }
        ShapedValue::Record(result)
    }

    /* A union initializer selects exactly one variant: the designated
     * one, or the first field for a positional initializer. */
    fn shape_union(&self, items: Vec<RawValue>, fields: &[FieldRecord]) -> ShapedValue {
        let designated = items.iter().find_map(|item| match item {
            RawValue::Designated {
                designator: Designator::Field(name),
                value,
            } => Some((name.clone(), (**value).clone())),
            _ => None,
        });

        let (field, value) = match designated {
            Some((name, value)) => match fields.iter().find(|f| f.name == name) {
                Some(field) => (field, value),
                None => {
                    warn!(field = %name, "designator names an unknown union variant");
                    return ShapedValue::Record(IndexMap::new());
                }
            },
            None => match items.into_iter().next() {
                Some(first) => (&fields[0], first),
                None => return ShapedValue::Record(IndexMap::new()),
            },
        };

        let mut result = IndexMap::new();
        result.insert(field.name.clone(), self.shape_field(field, value));
        ShapedValue::Record(result)
    }

    fn shape_field(&self, field: &FieldRecord, raw: RawValue) -> ShapedValue {
        let info = self.types.resolve_type(
            &field.type_name,
            Some(ResolveRequest {
                pointer_level: 0,
                array_size: field.array_size.clone(),
                bit_field: None,
                nested_fields: field.nested_fields.clone(),
            }),
        );
        self.shape(raw, &info, &field.array_size)
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

#[derive(Default)]
struct DeclaratorInfo {
    name: Option<String>,
    pointer_level: u32,
    dims: Vec<ArrayDim>,
}

/* A declaration declares a function (and is skipped) when a function
 * declarator's own declarator is a plain identifier. Pointer-to-function
 * variables wrap theirs in a parenthesized declarator instead. */
fn is_function_declaration(node: &CstNode) -> bool {
    fn check(node: &CstNode) -> bool {
        if node.kind() == "function_declarator" {
            if let Some(first) = node.children().into_iter().next() {
                if matches!(first.kind(), "identifier" | "field_identifier") {
                    return true;
                }
            }
        }
        node.children().iter().any(check)
    }
    node.children()
        .iter()
        .filter(|c| !matches!(c.kind(), "initializer_list"))
        .any(check)
}

/* The declarator of the (first) declared entity. */
fn find_declarator<'a>(node: &CstNode<'a>) -> Option<CstNode<'a>> {
    for child in node.children() {
        match child.kind() {
            "init_declarator" => {
                return child.children().into_iter().find(|c| {
                    matches!(
                        c.kind(),
                        "identifier"
                            | "pointer_declarator"
                            | "array_declarator"
                            | "function_declarator"
                            | "parenthesized_declarator"
                    )
                });
            }
            "identifier"
            | "pointer_declarator"
            | "array_declarator"
            | "function_declarator"
            | "parenthesized_declarator" => return Some(child),
            _ => {}
        }
    }
    None
}

/* The initializer node: whatever follows '=' in the init declarator. */
fn find_initializer<'a>(node: &CstNode<'a>) -> Option<CstNode<'a>> {
    let init = node.child_of_kind("init_declarator")?;
    let mut saw_assign = false;
    for child in init.children() {
        if child.kind() == "=" {
            saw_assign = true;
        } else if saw_assign && child.kind() != "comment" {
            return Some(child);
        }
    }
    None
}
