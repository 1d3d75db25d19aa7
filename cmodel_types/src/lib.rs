/* Data model for the C translation-unit analyzer.
 *
 * This crate holds the language-neutral records produced by the analysis
 * (type records, field records, value trees) and the constant-expression
 * evaluator. It performs no I/O and knows nothing about the concrete
 * syntax tree.
 */

pub mod expr;
pub mod types;
pub mod value;

pub use expr::{evaluate, EvalKind, Evaluated, SymbolTable};
pub use types::{
    ArrayDim, AttrValue, BasicType, BitField, CompositeType, EnumType, EnumValue, FieldRecord,
    FunctionInfo, Location, ParameterInfo, Qualifiers, RealKind, TypeCategory, TypeRecord,
    TypedefType,
};
pub use value::{decode_c_string, Designator, RawValue, ScalarValue, ShapedValue};
