/* Symbol table and type resolver for the C type algebra.
 *
 * Two storage tiers hold the declared types: the current-file tier,
 * populated while one translation unit is parsed, and the global tier,
 * carrying everything promoted from previously parsed files. Queries
 * consult both, current-file shadowing global. Each tier also carries
 * the pointer-alias set (typedefs whose right-hand side is a pointer)
 * and the object-like macro table.
 */

use crate::layout::TargetLayout;
use cmodel_types::{
    ArrayDim, AttrValue, BitField, CompositeType, EnumValue, FieldRecord, ScalarValue, SymbolTable,
    TypeCategory, TypeRecord, TypedefType,
};
use indexmap::IndexMap;
use serde_derive::{Deserialize, Serialize};
use std::cell::RefCell;
use std::collections::{BTreeSet, HashMap, HashSet};
use tracing::{debug, warn};

/* Query scope selector. */
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scope {
    All,
    Global,
    Current,
}

/* Serializable dump of one tier (or both merged). */
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
pub struct TypeInfoSnapshot {
    pub types: Vec<TypeRecord>,
    pub pointer_types: Vec<String>,
    pub macro_definitions: SymbolTable,
}

/* Declaration-site modifiers supplied to `resolve_type`. */
#[derive(Debug, Clone, Default)]
pub struct ResolveRequest {
    pub pointer_level: u32,
    pub array_size: Vec<ArrayDim>,
    pub bit_field: Option<u32>,
    pub nested_fields: Option<Vec<FieldRecord>>,
}

/* Fully-expanded view of a type reference at a declaration site. */
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct ResolvedType {
    #[serde(rename = "type")]
    pub type_name: String,
    pub base_type: String,
    pub resolved_type: String,
    pub is_pointer: bool,
    pub pointer_level: u32,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub array_size: Vec<ArrayDim>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bit_field: Option<u32>,
    pub is_basic: bool,
    pub is_struct: bool,
    pub is_union: bool,
    pub is_enum: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub info: Option<TypeRecord>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nested_fields: Option<Vec<FieldRecord>>,
}

/* Field lookup result: the record plus its computed byte offset. */
#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct FieldInfo {
    #[serde(flatten)]
    pub field: FieldRecord,
    pub offset: u64,
}

#[derive(Default)]
struct Tier {
    types: IndexMap<String, TypeRecord>,
    pointer_aliases: BTreeSet<String>,
    macros: SymbolTable,
}

impl Tier {
    fn snapshot(&self) -> TypeInfoSnapshot {
        TypeInfoSnapshot {
            types: self.types.values().cloned().collect(),
            pointer_types: self.pointer_aliases.iter().cloned().collect(),
            macro_definitions: self.macros.clone(),
        }
    }

    fn clear(&mut self) {
        self.types.clear();
        self.pointer_aliases.clear();
        self.macros.clear();
    }
}

pub struct TypeManager {
    layout: TargetLayout,
    global: Tier,
    current: Tier,
    /* Lazily filled classification cache, dropped on every mutation. */
    kind_cache: RefCell<HashMap<String, TypeCategory>>,
}

impl Default for TypeManager {
    fn default() -> Self {
        Self::new()
    }
}

impl TypeManager {
    pub fn new() -> Self {
        Self::with_layout(TargetLayout::default())
    }

    pub fn with_layout(layout: TargetLayout) -> Self {
        Self {
            layout,
            global: Tier::default(),
            current: Tier::default(),
            kind_cache: RefCell::new(HashMap::new()),
        }
    }

    pub fn layout(&self) -> &TargetLayout {
        &self.layout
    }

    fn invalidate_caches(&mut self) {
        self.kind_cache.borrow_mut().clear();
    }

    /* ---- registration and tier management ---- */

    /* Add a type to the current-file tier. An existing entry is only
     * replaced when it is a forward declaration completed by this
     * definition. */
    pub fn register_type(&mut self, record: TypeRecord) {
        self.invalidate_caches();
        let name = record.name().to_string();
        if let TypeRecord::Typedef(td) = &record {
            if td.type_name.trim_end().ends_with('*') {
                self.current.pointer_aliases.insert(name.clone());
            }
        }
        if record.is_forward_declaration() {
            if let Some(existing) = self.lookup(&name) {
                if !existing.is_forward_declaration() {
                    debug!(name = %name, "ignoring forward declaration of known type");
                    return;
                }
            }
        }
        match self.current.types.get(&name) {
            Some(existing) if existing.is_forward_declaration() && !record.is_forward_declaration() => {
                debug!(name = %name, "completing forward declaration");
                self.current.types.insert(name, record);
            }
            Some(_) => {
                if record.is_forward_declaration() {
                    debug!(name = %name, "ignoring forward declaration of known type");
                } else {
                    warn!(name = %name, "duplicate type registration rejected");
                }
            }
            None => {
                self.current.types.insert(name, record);
            }
        }
    }

    pub fn add_macro_definition(&mut self, name: impl Into<String>, value: ScalarValue) {
        self.invalidate_caches();
        self.current.macros.insert(name.into(), value);
    }

    pub fn export_types(&self, scope: Scope) -> TypeInfoSnapshot {
        match scope {
            Scope::Current => self.current.snapshot(),
            Scope::Global => self.global.snapshot(),
            Scope::All => {
                let mut snapshot = self.global.snapshot();
                let current = self.current.snapshot();
                snapshot.types.extend(current.types);
                for alias in current.pointer_types {
                    if !snapshot.pointer_types.contains(&alias) {
                        snapshot.pointer_types.push(alias);
                    }
                }
                snapshot.macro_definitions.extend(current.macro_definitions);
                snapshot
            }
        }
    }

    /* Fold a snapshot into one tier. Records replace same-named entries. */
    pub fn merge_type_info(&mut self, other: TypeInfoSnapshot, to_global: bool) {
        self.invalidate_caches();
        let tier = if to_global {
            &mut self.global
        } else {
            &mut self.current
        };
        for record in other.types {
            tier.types.insert(record.name().to_string(), record);
        }
        tier.pointer_aliases.extend(other.pointer_types);
        tier.macros.extend(other.macro_definitions);
    }

    pub fn reset_current_type_info(&mut self) {
        self.invalidate_caches();
        self.current.clear();
    }

    /* Move everything in the current-file tier into the global tier,
     * leaving the current tier empty for the next file. */
    pub fn promote_current_to_global(&mut self) {
        let snapshot = self.export_types(Scope::Current);
        self.merge_type_info(snapshot, true);
        self.reset_current_type_info();
    }

    /* ---- name handling ---- */

    /* Split a spelled type into its bare base, pointer depth, and array
     * suffix: "struct Node *[4]" -> ("struct Node", 1, Some("[4]")). */
    fn split_spelled(spelled: &str) -> (String, u32, Option<String>) {
        let trimmed = spelled.trim();
        /* Function-pointer spellings like "int (*) (int)" stay opaque. */
        if trimmed.contains('(') {
            return (trimmed.to_string(), 0, None);
        }
        let (head, array) = match trimmed.find('[') {
            Some(idx) => (&trimmed[..idx], Some(trimmed[idx..].to_string())),
            None => (trimmed, None),
        };
        let stars = head.matches('*').count() as u32;
        let base = head
            .replace('*', " ")
            .split_whitespace()
            .collect::<Vec<_>>()
            .join(" ");
        (base, stars, array)
    }

    /* Strip composite prefixes and modifiers down to the bare name used
     * as a lookup key. */
    fn clean_name(spelled: &str) -> String {
        let (base, _, _) = Self::split_spelled(spelled);
        for prefix in ["struct ", "union ", "enum "] {
            if let Some(rest) = base.strip_prefix(prefix) {
                return rest.trim().to_string();
            }
        }
        base
    }

    fn lookup(&self, key: &str) -> Option<&TypeRecord> {
        self.current
            .types
            .get(key)
            .or_else(|| self.global.types.get(key))
    }

    /* Find a record by exact name or by bare composite name. */
    fn lookup_any_form(&self, name: &str) -> Option<&TypeRecord> {
        let (base, _, _) = Self::split_spelled(name);
        if let Some(record) = self.lookup(&base) {
            return Some(record);
        }
        let clean = Self::clean_name(&base);
        self.lookup(&clean)
            .or_else(|| self.lookup(&format!("struct {}", clean)))
            .or_else(|| self.lookup(&format!("union {}", clean)))
            .or_else(|| self.lookup(&format!("enum {}", clean)))
    }

    fn find_typedef(&self, name: &str) -> Option<&TypedefType> {
        match self.lookup(name) {
            Some(TypeRecord::Typedef(td)) => Some(td),
            _ => None,
        }
    }

    fn is_pointer_alias(&self, name: &str) -> bool {
        self.current.pointer_aliases.contains(name) || self.global.pointer_aliases.contains(name)
    }

    pub fn is_anonymous_type(&self, name: &str) -> bool {
        name.starts_with("__anon_")
    }

    /* ---- resolution ---- */

    /* Resolve a spelled type through its typedef chain to the terminal
     * spelling. Pointer stars met along the chain accumulate; the
     * outermost array suffix wins over one carried by an alias. */
    pub fn get_real_type(&self, spelled: &str) -> String {
        let (mut base, mut stars, mut array) = Self::split_spelled(spelled);
        let mut visited: HashSet<String> = HashSet::new();
        loop {
            if base.starts_with("struct ")
                || base.starts_with("union ")
                || base.starts_with("enum ")
                || self.layout.basic(&base).is_some() && self.layout.resolve_alias(&base).is_none()
            {
                break;
            }
            if let Some(target) = self.layout.resolve_alias(&base) {
                base = target.to_string();
                continue;
            }
            if !visited.insert(base.clone()) {
                warn!(name = %base, "cyclic typedef chain cut");
                break;
            }
            match self.find_typedef(&base) {
                /* Function-pointer aliases are terminal. */
                Some(td) if td.type_name.contains('(') => break,
                Some(td) => {
                    let (next, extra_stars, inner_array) = Self::split_spelled(&td.type_name);
                    stars += extra_stars;
                    if array.is_none() {
                        array = inner_array;
                    }
                    if next == base {
                        break;
                    }
                    base = next;
                }
                None => break,
            }
        }
        let mut result = base;
        result.push_str(&"*".repeat(stars as usize));
        if let Some(suffix) = array {
            result.push_str(&suffix);
        }
        result
    }

    fn terminal_category(&self, name: &str) -> TypeCategory {
        if let Some(cached) = self.kind_cache.borrow().get(name).copied() {
            return cached;
        }
        let real = self.get_real_type(name);
        let (base, stars, _) = Self::split_spelled(&real);
        let category = if stars > 0 {
            TypeCategory::Pointer
        } else if base.starts_with("struct ") {
            TypeCategory::Struct
        } else if base.starts_with("union ") {
            TypeCategory::Union
        } else if base.starts_with("enum ") {
            TypeCategory::Enum
        } else if self.layout.is_basic(&base) {
            TypeCategory::Basic
        } else if self.is_pointer_alias(&base) {
            TypeCategory::Pointer
        } else {
            match self.lookup(&base) {
                Some(record) => record.kind(),
                None => TypeCategory::Unknown,
            }
        };
        self.kind_cache
            .borrow_mut()
            .insert(name.to_string(), category);
        category
    }

    pub fn is_basic_type(&self, name: &str) -> bool {
        self.terminal_category(name) == TypeCategory::Basic
    }

    pub fn is_struct_type(&self, name: &str) -> bool {
        self.terminal_category(name) == TypeCategory::Struct
    }

    pub fn is_union_type(&self, name: &str) -> bool {
        self.terminal_category(name) == TypeCategory::Union
    }

    pub fn is_enum_type(&self, name: &str) -> bool {
        self.terminal_category(name) == TypeCategory::Enum
    }

    pub fn is_pointer_type(&self, name: &str) -> bool {
        self.terminal_category(name) == TypeCategory::Pointer
    }

    pub fn is_typedef_type(&self, name: &str) -> bool {
        self.find_typedef(&Self::clean_name(name)).is_some()
            || self.find_typedef(name).is_some()
    }

    pub fn is_composite_type(&self, name: &str) -> bool {
        self.is_struct_type(name) || self.is_union_type(name)
    }

    pub fn get_type_category(&self, name: &str) -> TypeCategory {
        match self.terminal_category(name) {
            TypeCategory::Unknown | TypeCategory::Typedef => {
                if self.is_typedef_type(name) {
                    TypeCategory::Typedef
                } else {
                    TypeCategory::Unknown
                }
            }
            terminal => terminal,
        }
    }

    /* Expand a spelled type plus declaration-site modifiers into the
     * resolved view used for initializer shaping. */
    pub fn resolve_type(&self, spelled: &str, request: Option<ResolveRequest>) -> ResolvedType {
        let request = request.unwrap_or_default();
        let type_name = spelled.trim().to_string();

        let (mut base, spelled_stars, _outer_array) = Self::split_spelled(&type_name);
        let mut pointer_level = request.pointer_level + spelled_stars;

        let mut visited: HashSet<String> = HashSet::new();
        loop {
            if base.starts_with("struct ")
                || base.starts_with("union ")
                || base.starts_with("enum ")
            {
                break;
            }
            if let Some(target) = self.layout.resolve_alias(&base) {
                base = target.to_string();
                continue;
            }
            if self.layout.basic(&base).is_some() {
                break;
            }
            if !visited.insert(base.clone()) {
                warn!(name = %base, "cyclic typedef chain cut during resolution");
                break;
            }
            match self.find_typedef(&base) {
                Some(td) if td.type_name.contains('(') => break,
                Some(td) => {
                    let (next, extra_stars, _) = Self::split_spelled(&td.type_name);
                    pointer_level += extra_stars;
                    if next == base {
                        break;
                    }
                    base = next;
                }
                None => {
                    /* A pointer alias known only from imported type info
                     * has no typedef record to expand; count its star. */
                    if self.is_pointer_alias(&base) {
                        pointer_level += 1;
                    }
                    break;
                }
            }
        }

        let category = self.terminal_category(&base);
        let has_nested = request.nested_fields.is_some();
        let is_struct = category == TypeCategory::Struct || has_nested;
        let is_union = category == TypeCategory::Union;
        let is_enum = category == TypeCategory::Enum;
        let is_basic = category == TypeCategory::Basic;

        let info = if is_struct && !has_nested {
            self.get_struct_info(&base)
        } else if is_union {
            self.get_union_info(&base)
        } else if is_enum {
            self.get_enum_info(&base)
        } else {
            None
        };

        let resolved_type = format!("{}{}", base, "*".repeat(pointer_level as usize));
        ResolvedType {
            type_name,
            base_type: base,
            resolved_type,
            is_pointer: pointer_level > 0,
            pointer_level,
            array_size: request.array_size,
            bit_field: request.bit_field,
            is_basic,
            is_struct,
            is_union,
            is_enum,
            info,
            nested_fields: request.nested_fields,
        }
    }

    /* ---- record queries ---- */

    fn get_kind_info(&self, name: &str, kind: TypeCategory) -> Option<TypeRecord> {
        let clean = Self::clean_name(name);
        let prefixed = match kind {
            TypeCategory::Struct => format!("struct {}", clean),
            TypeCategory::Union => format!("union {}", clean),
            TypeCategory::Enum => format!("enum {}", clean),
            _ => clean.clone(),
        };
        for key in [name, clean.as_str(), prefixed.as_str()] {
            if let Some(record) = self.lookup(key) {
                if record.kind() == kind {
                    return Some(record.clone());
                }
            }
        }
        /* Aliases of composites resolve through the typedef chain. */
        let real = self.get_real_type(&clean);
        if real != clean && real != name {
            let (base, stars, _) = Self::split_spelled(&real);
            if stars == 0 {
                if let Some(record) = self.lookup(&base) {
                    if record.kind() == kind {
                        return Some(record.clone());
                    }
                }
            }
        }
        None
    }

    pub fn get_struct_info(&self, name: &str) -> Option<TypeRecord> {
        self.get_kind_info(name, TypeCategory::Struct)
    }

    pub fn get_union_info(&self, name: &str) -> Option<TypeRecord> {
        self.get_kind_info(name, TypeCategory::Union)
    }

    pub fn get_enum_info(&self, name: &str) -> Option<TypeRecord> {
        self.get_kind_info(name, TypeCategory::Enum)
    }

    pub fn get_type_info(&self, name: &str) -> Option<TypeRecord> {
        self.lookup_any_form(name).cloned()
    }

    pub fn find_type_by_name(&self, name: &str, kind: Option<TypeCategory>) -> Option<TypeRecord> {
        match kind {
            Some(kind) => self.get_kind_info(name, kind),
            None => self.get_type_info(name),
        }
    }

    pub fn get_field_info(&self, type_name: &str, field_name: &str) -> Option<FieldInfo> {
        let record = self
            .get_struct_info(type_name)
            .or_else(|| self.get_union_info(type_name))?;
        let is_struct = record.kind() == TypeCategory::Struct;
        let field = record
            .fields()?
            .iter()
            .find(|f| f.name == field_name)?
            .clone();
        let offset = if is_struct {
            self.calculate_field_offset(type_name, field_name)
        } else {
            0
        };
        Some(FieldInfo { field, offset })
    }

    /* Enumerator table flattened across every known enum; the earliest
     * declaration of a name wins. */
    pub fn get_enum_values(&self) -> SymbolTable {
        let mut table = SymbolTable::new();
        for tier in [&self.global, &self.current] {
            for record in tier.types.values() {
                if let TypeRecord::Enum(e) = record {
                    for (name, value) in &e.values {
                        if !table.contains_key(name) {
                            let scalar = match value {
                                EnumValue::Int(v) => ScalarValue::Int(*v),
                                EnumValue::Expr(text) => ScalarValue::Text(text.clone()),
                            };
                            table.insert(name.clone(), scalar);
                        }
                    }
                }
            }
        }
        table
    }

    pub fn get_enum_value(&self, enum_name: &str, value_name: &str) -> Option<EnumValue> {
        match self.get_enum_info(enum_name)? {
            TypeRecord::Enum(e) => e.values.get(value_name).cloned(),
            _ => None,
        }
    }

    pub fn get_macro_definition(&self, name: &str) -> Option<ScalarValue> {
        self.current
            .macros
            .get(name)
            .or_else(|| self.global.macros.get(name))
            .cloned()
    }

    pub fn get_macro_definitions(&self) -> SymbolTable {
        let mut merged = self.global.macros.clone();
        merged.extend(self.current.macros.clone());
        merged
    }

    pub fn has_macro(&self, name: &str) -> bool {
        self.current.macros.contains_key(name) || self.global.macros.contains_key(name)
    }

    /* ---- structured search ---- */

    fn scoped_records(&self, scope: Scope) -> Vec<&TypeRecord> {
        match scope {
            Scope::Current => self.current.types.values().collect(),
            Scope::Global => self.global.types.values().collect(),
            Scope::All => self
                .global
                .types
                .values()
                .chain(self.current.types.values())
                .collect(),
        }
    }

    pub fn find_types_by_kind(&self, kind: TypeCategory, scope: Scope) -> Vec<TypeRecord> {
        self.scoped_records(scope)
            .into_iter()
            .filter(|r| r.kind() == kind)
            .cloned()
            .collect()
    }

    pub fn find_types_by_attribute(
        &self,
        attribute: &str,
        value: Option<&AttrValue>,
        scope: Scope,
    ) -> Vec<TypeRecord> {
        self.scoped_records(scope)
            .into_iter()
            .filter(|r| match r.attributes().and_then(|a| a.get(attribute)) {
                Some(found) => value.is_none_or(|expected| found == expected),
                None => false,
            })
            .cloned()
            .collect()
    }

    pub fn find_types_by_field(
        &self,
        field_name: &str,
        field_type: Option<&str>,
        scope: Scope,
    ) -> Vec<TypeRecord> {
        self.scoped_records(scope)
            .into_iter()
            .filter(|r| match r.fields() {
                Some(fields) => fields.iter().any(|f| {
                    f.name == field_name
                        && field_type.is_none_or(|expected| f.type_name == expected)
                }),
                None => false,
            })
            .cloned()
            .collect()
    }

    pub fn find_types_by_size(&self, size: u64, scope: Scope) -> Vec<TypeRecord> {
        let mut results: Vec<TypeRecord> = self
            .scoped_records(scope)
            .into_iter()
            .filter(|r| r.size() == Some(size))
            .cloned()
            .collect();
        if matches!(scope, Scope::All | Scope::Global) {
            results.extend(
                self.layout
                    .basics_with_size(size)
                    .into_iter()
                    .map(TypeRecord::Basic),
            );
        }
        results
    }

    /* ---- layout queries ---- */

    pub fn get_type_size(&self, name: &str) -> u64 {
        self.size_of(name, &mut HashSet::new()).unwrap_or(0)
    }

    pub fn get_type_alignment(&self, name: &str) -> u64 {
        self.align_of(name, &mut HashSet::new()).unwrap_or(0)
    }

    fn size_of(&self, spelled: &str, visited: &mut HashSet<String>) -> Option<u64> {
        let real = self.get_real_type(spelled);
        let (base, stars, array) = Self::split_spelled(&real);
        let element = if stars > 0 {
            self.layout.pointer_size
        } else if let Some(info) = self.layout.basic(&base) {
            info.size
        } else if self.is_pointer_alias(&base) {
            self.layout.pointer_size
        } else {
            match self.lookup(&base) {
                Some(TypeRecord::Struct(c)) => {
                    if !visited.insert(base.clone()) {
                        return None;
                    }
                    let size = self.struct_walk(c, visited, None).map(|(size, _, _)| size);
                    visited.remove(&base);
                    size?
                }
                Some(TypeRecord::Union(c)) => {
                    if !visited.insert(base.clone()) {
                        return None;
                    }
                    let size = self.union_layout(c, visited).map(|(size, _)| size);
                    visited.remove(&base);
                    size?
                }
                Some(TypeRecord::Enum(_)) => self.layout.enum_size,
                Some(TypeRecord::Basic(b)) => b.size,
                _ => return None,
            }
        };
        match array {
            Some(suffix) => Some(element.checked_mul(Self::suffix_extent(&suffix)?)?),
            None => Some(element),
        }
    }

    fn align_of(&self, spelled: &str, visited: &mut HashSet<String>) -> Option<u64> {
        let real = self.get_real_type(spelled);
        let (base, stars, _) = Self::split_spelled(&real);
        if stars > 0 {
            return Some(self.layout.pointer_alignment);
        }
        if let Some(info) = self.layout.basic(&base) {
            return Some(info.alignment);
        }
        if self.is_pointer_alias(&base) {
            return Some(self.layout.pointer_alignment);
        }
        match self.lookup(&base) {
            Some(TypeRecord::Struct(c)) => {
                if !visited.insert(base.clone()) {
                    return None;
                }
                let align = self.struct_walk(c, visited, None).map(|(_, align, _)| align);
                visited.remove(&base);
                align
            }
            Some(TypeRecord::Union(c)) => {
                if !visited.insert(base.clone()) {
                    return None;
                }
                let align = self.union_layout(c, visited).map(|(_, align)| align);
                visited.remove(&base);
                align
            }
            Some(TypeRecord::Enum(_)) => Some(self.layout.enum_alignment),
            Some(TypeRecord::Basic(b)) => Some(b.alignment),
            _ => None,
        }
    }

    /* Total extent of a textual array suffix like "[4][2]"; None when a
     * dimension is not a plain integer. */
    fn suffix_extent(suffix: &str) -> Option<u64> {
        let mut total: u64 = 1;
        for part in suffix.split('[').skip(1) {
            let dim = part.strip_suffix(']')?.trim();
            total = total.checked_mul(dim.parse::<u64>().ok()?)?;
        }
        Some(total)
    }

    fn dims_extent(dims: &[ArrayDim]) -> Option<u64> {
        let mut total: u64 = 1;
        for dim in dims {
            let n = dim.as_fixed()?;
            if n < 0 {
                return None;
            }
            total = total.checked_mul(n as u64)?;
        }
        Some(total)
    }

    fn field_metrics(
        &self,
        field: &FieldRecord,
        visited: &mut HashSet<String>,
    ) -> Option<(u64, u64)> {
        if field.type_name.contains('*') {
            return Some((self.layout.pointer_size, self.layout.pointer_alignment));
        }
        let size = self.size_of(&field.type_name, visited)?;
        let align = self.align_of(&field.type_name, visited)?;
        Some((size, align))
    }

    fn is_packed(composite: &CompositeType) -> bool {
        matches!(
            composite.attributes.get("packed"),
            Some(AttrValue::Bool(true)) | Some(AttrValue::Int(1))
        )
    }

    /* Shared struct layout walk. Without a target it yields the full
     * (size, alignment, None); with one it stops at the named field and
     * yields its offset. Consecutive bit-fields pack into allocation
     * units of their declared base type. */
    fn struct_walk(
        &self,
        composite: &CompositeType,
        visited: &mut HashSet<String>,
        target: Option<&str>,
    ) -> Option<(u64, u64, Option<u64>)> {
        let packed = Self::is_packed(composite);
        let mut offset: u64 = 0;
        let mut max_align: u64 = 1;
        /* (unit byte size, bits consumed, unit start offset) */
        let mut bit_run: Option<(u64, u64, u64)> = None;

        for field in &composite.fields {
            let (element_size, natural_align) = self.field_metrics(field, visited)?;
            let align = if packed { 1 } else { natural_align.max(1) };

            if let Some(BitField::Width(width)) = &field.bit_field {
                let width = *width as u64;
                let unit = element_size.max(1);
                match bit_run {
                    Some((run_unit, bits, start))
                        if run_unit == unit && width > 0 && bits + width <= unit * 8 =>
                    {
                        if target == Some(field.name.as_str()) {
                            return Some((0, 0, Some(start)));
                        }
                        bit_run = Some((run_unit, bits + width, start));
                    }
                    _ => {
                        if let Some((run_unit, _, start)) = bit_run.take() {
                            offset = start + run_unit;
                        }
                        if !packed {
                            offset = align_up(offset, align);
                        }
                        if width == 0 {
                            /* Zero-width bit-field only closes the unit. */
                            max_align = max_align.max(align);
                            continue;
                        }
                        if target == Some(field.name.as_str()) {
                            return Some((0, 0, Some(offset)));
                        }
                        bit_run = Some((unit, width, offset));
                    }
                }
                max_align = max_align.max(align);
                continue;
            }

            if let Some((run_unit, _, start)) = bit_run.take() {
                offset = start + run_unit;
            }
            if !packed {
                offset = align_up(offset, align);
            }
            if target == Some(field.name.as_str()) {
                return Some((0, 0, Some(offset)));
            }
            let total = element_size.checked_mul(Self::dims_extent(&field.array_size)?)?;
            offset = offset.checked_add(total)?;
            max_align = max_align.max(align);
        }

        if let Some((run_unit, _, start)) = bit_run {
            offset = start + run_unit;
        }
        if target.is_some() {
            return None;
        }
        if let Some(AttrValue::Int(n)) = composite.attributes.get("aligned") {
            if *n > 0 {
                max_align = max_align.max(*n as u64);
            }
        }
        let size = align_up(offset, max_align).max(1);
        Some((size, max_align, None))
    }

    fn union_layout(
        &self,
        composite: &CompositeType,
        visited: &mut HashSet<String>,
    ) -> Option<(u64, u64)> {
        let mut size: u64 = 0;
        let mut max_align: u64 = 1;
        for field in &composite.fields {
            let (element_size, align) = self.field_metrics(field, visited)?;
            let total = element_size.checked_mul(Self::dims_extent(&field.array_size)?)?;
            size = size.max(total);
            max_align = max_align.max(align.max(1));
        }
        Some((align_up(size, max_align).max(1), max_align))
    }

    /* Byte size and alignment of a composite under construction, before
     * its record is registered. */
    pub fn composite_layout(
        &self,
        kind: TypeCategory,
        fields: &[FieldRecord],
        attributes: &std::collections::BTreeMap<String, AttrValue>,
    ) -> (Option<u64>, Option<u64>) {
        if fields.is_empty() {
            return (None, None);
        }
        let probe = CompositeType {
            name: String::new(),
            fields: fields.to_vec(),
            size: None,
            alignment: None,
            location: None,
            attributes: attributes.clone(),
            comment: None,
        };
        let mut visited = HashSet::new();
        match kind {
            TypeCategory::Union => match self.union_layout(&probe, &mut visited) {
                Some((size, align)) => (Some(size), Some(align)),
                None => (None, None),
            },
            _ => match self.struct_walk(&probe, &mut visited, None) {
                Some((size, align, _)) => (Some(size), Some(align)),
                None => (None, None),
            },
        }
    }

    pub fn calculate_field_offset(&self, type_name: &str, field_name: &str) -> u64 {
        if self.is_union_type(type_name) {
            return 0;
        }
        let Some(TypeRecord::Struct(composite)) = self.get_struct_info(type_name) else {
            return 0;
        };
        let mut visited = HashSet::new();
        match self.struct_walk(&composite, &mut visited, Some(field_name)) {
            Some((_, _, Some(offset))) => offset,
            _ => 0,
        }
    }

    pub fn is_packed_type(&self, name: &str) -> bool {
        match self.lookup_any_form(name) {
            Some(TypeRecord::Struct(c)) | Some(TypeRecord::Union(c)) => Self::is_packed(c),
            _ => false,
        }
    }

    /* Printf conversion specifier companion of a type. */
    pub fn get_printf_format(&self, name: &str) -> String {
        if self.is_pointer_type(name) {
            return "\"0x%p\"".to_string();
        }
        if self.is_enum_type(name) {
            return "%d".to_string();
        }
        let real = self.get_real_type(&Self::clean_name(name));
        let (base, _, _) = Self::split_spelled(&real);
        let canonical = self
            .layout
            .resolve_alias(&base)
            .map(str::to_string)
            .unwrap_or(base);
        match self.layout.printf_format(&canonical) {
            Some(format) => format.to_string(),
            None => "\"0x%x\"".to_string(),
        }
    }
}

fn align_up(offset: u64, align: u64) -> u64 {
    if align <= 1 {
        return offset;
    }
    offset.div_ceil(align) * align
}

#[cfg(test)]
mod tests {
    use super::*;
    use cmodel_types::{EnumType, RealKind};
    use std::collections::BTreeMap;

    fn composite(name: &str, fields: Vec<FieldRecord>) -> CompositeType {
        CompositeType {
            name: name.to_string(),
            fields,
            size: None,
            alignment: None,
            location: None,
            attributes: BTreeMap::new(),
            comment: None,
        }
    }

    fn typedef(name: &str, spelled: &str, base: &str) -> TypeRecord {
        TypeRecord::Typedef(TypedefType {
            name: name.to_string(),
            type_name: spelled.to_string(),
            base_type: base.to_string(),
            real_type: None,
            function_info: None,
            qualifiers: Default::default(),
            location: None,
        })
    }

    fn point_struct() -> TypeRecord {
        TypeRecord::Struct(composite(
            "struct Point",
            vec![FieldRecord::new("x", "int"), FieldRecord::new("y", "int")],
        ))
    }

    #[test]
    fn typedef_chain_resolution_is_idempotent() {
        let mut tm = TypeManager::new();
        tm.register_type(point_struct());
        tm.register_type(typedef("Point", "struct Point", "struct Point"));
        tm.register_type(typedef("PointAlias", "Point", "Point"));

        let once = tm.get_real_type("PointAlias");
        assert_eq!(once, "struct Point");
        assert_eq!(tm.get_real_type(&once), once);
    }

    #[test]
    fn pointer_stars_accumulate_through_the_chain() {
        let mut tm = TypeManager::new();
        tm.register_type(typedef("bytep", "char*", "char"));
        assert_eq!(tm.get_real_type("bytep*"), "char**");

        let resolved = tm.resolve_type("bytep", None);
        assert!(resolved.is_pointer);
        assert_eq!(resolved.pointer_level, 1);
        assert_eq!(resolved.resolved_type, "char*");
        assert!(tm.is_pointer_type("bytep"));
    }

    #[test]
    fn outer_array_suffix_wins_over_alias_suffix() {
        let mut tm = TypeManager::new();
        tm.register_type(typedef("Row", "int[4]", "int"));
        assert_eq!(tm.get_real_type("Row"), "int[4]");
        assert_eq!(tm.get_real_type("Row[2]"), "int[2]");
    }

    #[test]
    fn composite_lookup_accepts_both_name_forms() {
        let mut tm = TypeManager::new();
        tm.register_type(point_struct());
        assert!(tm.get_struct_info("Point").is_some());
        assert!(tm.get_struct_info("struct Point").is_some());
        assert!(tm.get_union_info("Point").is_none());
    }

    #[test]
    fn classification_follows_typedefs() {
        let mut tm = TypeManager::new();
        tm.register_type(point_struct());
        tm.register_type(typedef("Point", "struct Point", "struct Point"));
        assert!(tm.is_struct_type("Point"));
        assert!(tm.is_struct_type("struct Point"));
        assert!(tm.is_typedef_type("Point"));
        assert_eq!(tm.get_type_category("Point"), TypeCategory::Struct);
        assert_eq!(tm.get_type_category("u16"), TypeCategory::Basic);
        assert_eq!(tm.get_type_category("struct Missing"), TypeCategory::Struct);
        assert_eq!(tm.get_type_category("Missing"), TypeCategory::Unknown);
    }

    #[test]
    fn classification_cache_invalidated_by_registration() {
        let mut tm = TypeManager::new();
        assert_eq!(tm.get_type_category("Color"), TypeCategory::Unknown);
        tm.register_type(TypeRecord::Enum(EnumType {
            name: "enum Color".to_string(),
            values: IndexMap::from([("RED".to_string(), EnumValue::Int(0))]),
            size: Some(4),
            alignment: Some(4),
            location: None,
            comment: None,
        }));
        assert_eq!(tm.get_type_category("Color"), TypeCategory::Enum);
    }

    #[test]
    fn struct_layout_and_field_offsets() {
        let mut tm = TypeManager::new();
        tm.register_type(TypeRecord::Struct(composite(
            "struct Mixed",
            vec![
                FieldRecord::new("a", "char"),
                FieldRecord::new("b", "int"),
                FieldRecord::new("c", "char"),
            ],
        )));
        assert_eq!(tm.get_type_size("struct Mixed"), 12);
        assert_eq!(tm.get_type_alignment("struct Mixed"), 4);
        assert_eq!(tm.calculate_field_offset("struct Mixed", "a"), 0);
        assert_eq!(tm.calculate_field_offset("struct Mixed", "b"), 4);
        assert_eq!(tm.calculate_field_offset("struct Mixed", "c"), 8);
    }

    #[test]
    fn field_offsets_stay_below_struct_size() {
        let mut tm = TypeManager::new();
        tm.register_type(point_struct());
        tm.register_type(TypeRecord::Struct(composite(
            "struct Outer",
            vec![
                FieldRecord::new("tag", "char"),
                FieldRecord::new("p", "struct Point"),
                FieldRecord::new("next", "struct Outer*"),
            ],
        )));
        let size = tm.get_type_size("struct Outer");
        assert!(size > 0);
        for field in ["tag", "p", "next"] {
            assert!(tm.calculate_field_offset("struct Outer", field) < size);
        }
    }

    #[test]
    fn array_fields_scale_struct_size() {
        let mut tm = TypeManager::new();
        let mut buffer = FieldRecord::new("data", "int");
        buffer.array_size = vec![ArrayDim::Fixed(4)];
        tm.register_type(TypeRecord::Struct(composite("struct Buf", vec![buffer])));
        assert_eq!(tm.get_type_size("struct Buf"), 16);
    }

    #[test]
    fn bit_fields_share_allocation_units() {
        let mut tm = TypeManager::new();
        let mut flags = FieldRecord::new("flags", "int");
        flags.bit_field = Some(BitField::Width(3));
        let mut mode = FieldRecord::new("mode", "int");
        mode.bit_field = Some(BitField::Width(5));
        tm.register_type(TypeRecord::Struct(composite(
            "struct Packed",
            vec![flags, mode, FieldRecord::new("value", "int")],
        )));
        assert_eq!(tm.calculate_field_offset("struct Packed", "flags"), 0);
        assert_eq!(tm.calculate_field_offset("struct Packed", "mode"), 0);
        assert_eq!(tm.calculate_field_offset("struct Packed", "value"), 4);
        assert_eq!(tm.get_type_size("struct Packed"), 8);
    }

    #[test]
    fn union_size_is_widest_member() {
        let mut tm = TypeManager::new();
        tm.register_type(TypeRecord::Union(composite(
            "union Value",
            vec![
                FieldRecord::new("i", "int"),
                FieldRecord::new("d", "double"),
                FieldRecord::new("c", "char"),
            ],
        )));
        assert_eq!(tm.get_type_size("union Value"), 8);
        assert_eq!(tm.get_type_alignment("union Value"), 8);
        assert_eq!(tm.calculate_field_offset("union Value", "d"), 0);
    }

    #[test]
    fn self_referential_struct_resolves_through_pointer() {
        let mut tm = TypeManager::new();
        tm.register_type(TypeRecord::Struct(composite(
            "struct Node",
            vec![
                FieldRecord::new("value", "int"),
                FieldRecord::new("next", "struct Node*"),
            ],
        )));
        assert_eq!(tm.get_type_size("struct Node"), 16);
        assert_eq!(tm.calculate_field_offset("struct Node", "next"), 8);
    }

    #[test]
    fn forward_declaration_completed_by_definition() {
        let mut tm = TypeManager::new();
        tm.register_type(TypeRecord::Struct(composite("struct Later", vec![])));
        assert!(tm
            .get_struct_info("Later")
            .is_some_and(|r| r.is_forward_declaration()));
        tm.register_type(TypeRecord::Struct(composite(
            "struct Later",
            vec![FieldRecord::new("x", "int")],
        )));
        let record = tm.get_struct_info("Later").unwrap();
        assert!(!record.is_forward_declaration());

        /* A second full definition does not overwrite the first. */
        tm.register_type(TypeRecord::Struct(composite(
            "struct Later",
            vec![FieldRecord::new("y", "long")],
        )));
        let record = tm.get_struct_info("Later").unwrap();
        assert_eq!(record.fields().unwrap()[0].name, "x");
    }

    #[test]
    fn merge_promotes_current_types_to_global() {
        let mut tm = TypeManager::new();
        tm.register_type(point_struct());
        tm.add_macro_definition("MAX", ScalarValue::Int(16));
        tm.promote_current_to_global();

        assert!(tm.export_types(Scope::Current).types.is_empty());
        assert!(tm.get_struct_info("Point").is_some());
        assert_eq!(tm.get_macro_definition("MAX"), Some(ScalarValue::Int(16)));

        /* Current-file entries shadow merged global ones. */
        tm.add_macro_definition("MAX", ScalarValue::Int(32));
        assert_eq!(tm.get_macro_definition("MAX"), Some(ScalarValue::Int(32)));
    }

    #[test]
    fn enum_values_flatten_first_declared_wins() {
        let mut tm = TypeManager::new();
        tm.register_type(TypeRecord::Enum(EnumType {
            name: "enum A".to_string(),
            values: IndexMap::from([("X".to_string(), EnumValue::Int(1))]),
            size: Some(4),
            alignment: Some(4),
            location: None,
            comment: None,
        }));
        tm.register_type(TypeRecord::Enum(EnumType {
            name: "enum B".to_string(),
            values: IndexMap::from([
                ("X".to_string(), EnumValue::Int(9)),
                ("Y".to_string(), EnumValue::Int(2)),
            ]),
            size: Some(4),
            alignment: Some(4),
            location: None,
            comment: None,
        }));
        let table = tm.get_enum_values();
        assert_eq!(table.get("X"), Some(&ScalarValue::Int(1)));
        assert_eq!(table.get("Y"), Some(&ScalarValue::Int(2)));
    }

    #[test]
    fn printf_formats() {
        let mut tm = TypeManager::new();
        tm.register_type(point_struct());
        tm.register_type(typedef("bytep", "char*", "char"));
        tm.register_type(TypeRecord::Enum(EnumType {
            name: "enum Color".to_string(),
            values: IndexMap::new(),
            size: Some(4),
            alignment: Some(4),
            location: None,
            comment: None,
        }));
        assert_eq!(tm.get_printf_format("int"), "%d");
        assert_eq!(tm.get_printf_format("u64"), "%lu");
        assert_eq!(tm.get_printf_format("bytep"), "\"0x%p\"");
        assert_eq!(tm.get_printf_format("enum Color"), "%d");
        assert_eq!(tm.get_printf_format("struct Point"), "\"0x%x\"");
    }

    #[test]
    fn find_queries() {
        let mut tm = TypeManager::new();
        tm.register_type(point_struct());
        tm.register_type(typedef("Point", "struct Point", "struct Point"));

        assert_eq!(tm.find_types_by_kind(TypeCategory::Struct, Scope::All).len(), 1);
        assert_eq!(tm.find_types_by_kind(TypeCategory::Typedef, Scope::All).len(), 1);
        assert_eq!(tm.find_types_by_field("x", None, Scope::All).len(), 1);
        assert_eq!(tm.find_types_by_field("x", Some("long"), Scope::All).len(), 0);
        assert!(tm
            .find_types_by_size(4, Scope::All)
            .iter()
            .any(|r| r.name() == "int"));
    }

    #[test]
    fn field_info_carries_offset() {
        let mut tm = TypeManager::new();
        tm.register_type(TypeRecord::Struct(composite(
            "struct Mixed",
            vec![FieldRecord::new("a", "char"), FieldRecord::new("b", "int")],
        )));
        let info = tm.get_field_info("Mixed", "b").unwrap();
        assert_eq!(info.offset, 4);
        assert_eq!(info.field.type_name, "int");
    }

    #[test]
    fn typedef_real_kind_survives_serialization() {
        let record = typedef("cb", "int (*) (void)", "int");
        if let TypeRecord::Typedef(mut td) = record {
            td.real_type = Some(RealKind::FunctionPointer);
            let json = serde_json::to_value(TypeRecord::Typedef(td)).unwrap();
            assert_eq!(json["kind"], "typedef");
            assert_eq!(json["real_type"], "function_pointer");
        }
    }
}
