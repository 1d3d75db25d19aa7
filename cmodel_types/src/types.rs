/* Records describing the named types declared in a C translation unit.
 *
 * One TypeRecord variant exists per declaration kind, discriminated by a
 * `kind` tag in the serialized form. Composite fields reference other
 * types by name; cycles (self-referential structs) are broken by that
 * indirection and resolved through the symbol table.
 */

use indexmap::IndexMap;
use serde::de::Error as DeError;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_derive::{Deserialize as De, Serialize as Ser};
use std::collections::BTreeMap;

/* Source position of a declaration. */
#[derive(Ser, De, Debug, Clone, PartialEq, Eq, Default)]
pub struct Location {
    pub file: String,
    pub line: usize,
    pub column: usize,
}

/* Type qualifiers and storage class attached to a declaration. */
#[derive(Ser, De, Debug, Clone, PartialEq, Eq, Default)]
pub struct Qualifiers {
    #[serde(default)]
    pub is_const: bool,
    #[serde(default)]
    pub is_volatile: bool,
    #[serde(default)]
    pub is_restrict: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub storage_class: Option<String>,
}

/* One array dimension. Serialized as a bare integer for constant extents,
 * "var(NAME)" for a named non-constant extent, "dynamic" for `[]`, and the
 * original expression text otherwise. */
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ArrayDim {
    Fixed(i64),
    Named(String),
    Expr(String),
    Dynamic,
}

impl ArrayDim {
    pub fn as_fixed(&self) -> Option<i64> {
        match self {
            ArrayDim::Fixed(n) => Some(*n),
            _ => None,
        }
    }

    pub fn is_dynamic(&self) -> bool {
        matches!(self, ArrayDim::Dynamic)
    }
}

impl Serialize for ArrayDim {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            ArrayDim::Fixed(n) => serializer.serialize_i64(*n),
            ArrayDim::Named(name) => serializer.serialize_str(&format!("var({})", name)),
            ArrayDim::Expr(text) => serializer.serialize_str(text),
            ArrayDim::Dynamic => serializer.serialize_str("dynamic"),
        }
    }
}

impl<'de> Deserialize<'de> for ArrayDim {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(De)]
        #[serde(untagged)]
        enum Repr {
            Num(i64),
            Text(String),
        }
        match Repr::deserialize(deserializer)? {
            Repr::Num(n) => Ok(ArrayDim::Fixed(n)),
            Repr::Text(s) => {
                if s == "dynamic" {
                    Ok(ArrayDim::Dynamic)
                } else if let Some(inner) = s.strip_prefix("var(").and_then(|r| r.strip_suffix(')')) {
                    if inner.is_empty() {
                        return Err(DeError::custom("empty var() array dimension"));
                    }
                    Ok(ArrayDim::Named(inner.to_string()))
                } else {
                    Ok(ArrayDim::Expr(s))
                }
            }
        }
    }
}

/* Bit-field width: a constant integer, or the original expression text
 * when the width did not reduce. */
#[derive(Ser, De, Debug, Clone, PartialEq, Eq)]
#[serde(untagged)]
pub enum BitField {
    Width(u32),
    Expr(String),
}

/* One member of a struct or union. */
#[derive(Ser, De, Debug, Clone, PartialEq)]
pub struct FieldRecord {
    pub name: String,
    #[serde(rename = "type")]
    pub type_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub original_type: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub array_size: Vec<ArrayDim>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bit_field: Option<BitField>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pointer_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nested_fields: Option<Vec<FieldRecord>>,
    #[serde(default)]
    pub qualifiers: Qualifiers,
}

impl FieldRecord {
    pub fn new(name: impl Into<String>, type_name: impl Into<String>) -> Self {
        let type_name = type_name.into();
        Self {
            name: name.into(),
            original_type: Some(type_name.clone()),
            type_name,
            array_size: Vec::new(),
            bit_field: None,
            pointer_type: None,
            nested_fields: None,
            qualifiers: Qualifiers::default(),
        }
    }
}

/* Opaque attribute value, e.g. packed = true or aligned = 16. */
#[derive(Ser, De, Debug, Clone, PartialEq)]
#[serde(untagged)]
pub enum AttrValue {
    Bool(bool),
    Int(i64),
    Text(String),
}

/* Enumerator value: a resolved integer or the original expression text. */
#[derive(Ser, De, Debug, Clone, PartialEq, Eq)]
#[serde(untagged)]
pub enum EnumValue {
    Int(i64),
    Expr(String),
}

/* Struct or union definition. An empty field list marks a forward
 * declaration awaiting completion later in the unit. */
#[derive(Ser, De, Debug, Clone, PartialEq)]
pub struct CompositeType {
    pub name: String,
    #[serde(default)]
    pub fields: Vec<FieldRecord>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alignment: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<Location>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub attributes: BTreeMap<String, AttrValue>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
}

impl CompositeType {
    pub fn is_forward(&self) -> bool {
        self.fields.is_empty()
    }
}

/* Enumeration definition. Values preserve declaration order. */
#[derive(Ser, De, Debug, Clone, PartialEq)]
pub struct EnumType {
    pub name: String,
    #[serde(default)]
    pub values: IndexMap<String, EnumValue>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alignment: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<Location>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
}

/* Classification of a typedef's right-hand side after one resolution
 * step. */
#[derive(Ser, De, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RealKind {
    Basic,
    Struct,
    Union,
    Enum,
    Pointer,
    FunctionPointer,
}

/* One parameter of a function-pointer alias. */
#[derive(Ser, De, Debug, Clone, PartialEq, Eq)]
pub struct ParameterInfo {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(rename = "type")]
    pub type_name: String,
    #[serde(default)]
    pub is_pointer: bool,
    #[serde(default)]
    pub pointer_level: u32,
    #[serde(default)]
    pub qualifiers: Qualifiers,
}

/* Signature captured for a function-pointer typedef. */
#[derive(Ser, De, Debug, Clone, PartialEq, Eq)]
pub struct FunctionInfo {
    pub return_type: String,
    #[serde(default)]
    pub parameters: Vec<ParameterInfo>,
    #[serde(default)]
    pub is_variadic: bool,
}

/* Type alias. `type_name` is the full spelled right-hand side (pointer
 * stars and array suffix included); `base_type` is the bare base name. */
#[derive(Ser, De, Debug, Clone, PartialEq)]
pub struct TypedefType {
    pub name: String,
    #[serde(rename = "type")]
    pub type_name: String,
    pub base_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub real_type: Option<RealKind>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub function_info: Option<FunctionInfo>,
    #[serde(default)]
    pub qualifiers: Qualifiers,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<Location>,
}

/* Built-in type entry, synthesized when queries need to report basic
 * types next to declared ones. */
#[derive(Ser, De, Debug, Clone, PartialEq, Eq)]
pub struct BasicType {
    pub name: String,
    pub size: u64,
    pub alignment: u64,
    pub signed: bool,
}

/* Tagged description of one named type. */
#[derive(Ser, De, Debug, Clone, PartialEq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TypeRecord {
    Struct(CompositeType),
    Union(CompositeType),
    Enum(EnumType),
    Typedef(TypedefType),
    Basic(BasicType),
}

/* Result of classifying a type name. */
#[derive(Ser, De, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TypeCategory {
    Basic,
    Struct,
    Union,
    Enum,
    Pointer,
    Typedef,
    Unknown,
}

impl TypeRecord {
    pub fn name(&self) -> &str {
        match self {
            TypeRecord::Struct(c) | TypeRecord::Union(c) => &c.name,
            TypeRecord::Enum(e) => &e.name,
            TypeRecord::Typedef(t) => &t.name,
            TypeRecord::Basic(b) => &b.name,
        }
    }

    pub fn kind(&self) -> TypeCategory {
        match self {
            TypeRecord::Struct(_) => TypeCategory::Struct,
            TypeRecord::Union(_) => TypeCategory::Union,
            TypeRecord::Enum(_) => TypeCategory::Enum,
            TypeRecord::Typedef(_) => TypeCategory::Typedef,
            TypeRecord::Basic(_) => TypeCategory::Basic,
        }
    }

    pub fn fields(&self) -> Option<&[FieldRecord]> {
        match self {
            TypeRecord::Struct(c) | TypeRecord::Union(c) => Some(&c.fields),
            _ => None,
        }
    }

    pub fn size(&self) -> Option<u64> {
        match self {
            TypeRecord::Struct(c) | TypeRecord::Union(c) => c.size,
            TypeRecord::Enum(e) => e.size,
            TypeRecord::Basic(b) => Some(b.size),
            TypeRecord::Typedef(_) => None,
        }
    }

    pub fn alignment(&self) -> Option<u64> {
        match self {
            TypeRecord::Struct(c) | TypeRecord::Union(c) => c.alignment,
            TypeRecord::Enum(e) => e.alignment,
            TypeRecord::Basic(b) => Some(b.alignment),
            TypeRecord::Typedef(_) => None,
        }
    }

    pub fn attributes(&self) -> Option<&BTreeMap<String, AttrValue>> {
        match self {
            TypeRecord::Struct(c) | TypeRecord::Union(c) => Some(&c.attributes),
            _ => None,
        }
    }

    /* Forward declarations are composites registered without a body. */
    pub fn is_forward_declaration(&self) -> bool {
        match self {
            TypeRecord::Struct(c) | TypeRecord::Union(c) => c.is_forward(),
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn type_record_is_kind_tagged() {
        let record = TypeRecord::Enum(EnumType {
            name: "enum Color".to_string(),
            values: IndexMap::from([
                ("RED".to_string(), EnumValue::Int(0)),
                ("GREEN".to_string(), EnumValue::Int(1)),
            ]),
            size: Some(4),
            alignment: Some(4),
            location: None,
            comment: None,
        });
        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["kind"], "enum");
        assert_eq!(json["name"], "enum Color");
        assert_eq!(json["values"]["GREEN"], 1);

        let back: TypeRecord = serde_json::from_value(json).unwrap();
        assert_eq!(back, record);
    }

    #[test]
    fn array_dim_round_trip() {
        let dims = vec![
            ArrayDim::Fixed(8),
            ArrayDim::Named("count".to_string()),
            ArrayDim::Dynamic,
            ArrayDim::Expr("N + 1".to_string()),
        ];
        let json = serde_json::to_string(&dims).unwrap();
        assert_eq!(json, "[8,\"var(count)\",\"dynamic\",\"N + 1\"]");
        let back: Vec<ArrayDim> = serde_json::from_str(&json).unwrap();
        assert_eq!(back, dims);
    }

    #[test]
    fn forward_declaration_is_empty_composite() {
        let fwd = TypeRecord::Struct(CompositeType {
            name: "struct Node".to_string(),
            fields: Vec::new(),
            size: None,
            alignment: None,
            location: None,
            attributes: BTreeMap::new(),
            comment: None,
        });
        assert!(fwd.is_forward_declaration());
    }

    #[test]
    fn field_record_omits_empty_parts() {
        let field = FieldRecord::new("next", "struct Node*");
        let json = serde_json::to_value(&field).unwrap();
        assert_eq!(json["type"], "struct Node*");
        assert!(json.get("array_size").is_none());
        assert!(json.get("bit_field").is_none());
    }
}
