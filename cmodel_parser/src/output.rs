/* Serializable analysis document: every type declared in the unit,
 * partitioned by kind, plus every file-scope variable, partitioned by
 * bucket. A simplified view strips provenance for downstream emitters
 * that only need name, type, shape, and value.
 */

use crate::data_manager::{DataManager, VariableRecord};
use crate::type_manager::{Scope, TypeManager};
use cmodel_types::{ArrayDim, ShapedValue, TypeCategory, TypeRecord};
use serde_derive::{Deserialize, Serialize};

#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
pub struct TypeSection {
    pub structs: Vec<TypeRecord>,
    pub unions: Vec<TypeRecord>,
    pub enums: Vec<TypeRecord>,
    pub typedefs: Vec<TypeRecord>,
}

#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
pub struct VariableSection {
    pub variables: Vec<VariableRecord>,
    pub pointer_vars: Vec<VariableRecord>,
    pub array_vars: Vec<VariableRecord>,
    pub struct_vars: Vec<VariableRecord>,
}

#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
pub struct AnalysisOutput {
    pub types: TypeSection,
    pub variables: VariableSection,
}

/* Per-variable reduction to the four fields downstream generators ask
 * for. `array_size` disappears when the variable is not an array. */
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct SimplifiedVariable {
    pub name: String,
    #[serde(rename = "type")]
    pub type_name: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub array_size: Vec<ArrayDim>,
    pub parsed_value: Option<ShapedValue>,
}

#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
pub struct SimplifiedOutput {
    pub variables: Vec<SimplifiedVariable>,
}

impl AnalysisOutput {
    /* Assemble the document for the just-parsed unit: current-scope
     * types plus the accumulated variable buckets. */
    pub fn collect(types: &TypeManager, data: &DataManager) -> Self {
        Self {
            types: TypeSection {
                structs: types.find_types_by_kind(TypeCategory::Struct, Scope::Current),
                unions: types.find_types_by_kind(TypeCategory::Union, Scope::Current),
                enums: types.find_types_by_kind(TypeCategory::Enum, Scope::Current),
                typedefs: types.find_types_by_kind(TypeCategory::Typedef, Scope::Current),
            },
            variables: VariableSection {
                variables: data.variables.clone(),
                pointer_vars: data.pointer_vars.clone(),
                array_vars: data.array_vars.clone(),
                struct_vars: data.struct_vars.clone(),
            },
        }
    }

    pub fn simplified(&self) -> SimplifiedOutput {
        let buckets = [
            &self.variables.struct_vars,
            &self.variables.array_vars,
            &self.variables.pointer_vars,
            &self.variables.variables,
        ];
        SimplifiedOutput {
            variables: buckets
                .into_iter()
                .flatten()
                .map(simplify_variable)
                .collect(),
        }
    }
}

fn simplify_variable(record: &VariableRecord) -> SimplifiedVariable {
    SimplifiedVariable {
        name: record.name.clone(),
        type_name: record.type_name.clone(),
        array_size: record.array_size.clone(),
        parsed_value: record.parsed_value.clone(),
    }
}
