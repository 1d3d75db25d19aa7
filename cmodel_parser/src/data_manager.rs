/* Accumulator for parsed file-scope variables.
 *
 * Variables land in one of four buckets, decided by precedence:
 * pointer, then array, then struct, then plain. No further logic lives
 * here.
 */

use crate::type_manager::{ResolvedType, TypeManager};
use cmodel_types::{ArrayDim, Location, ShapedValue};
use serde_derive::{Deserialize, Serialize};

/* One file-scope variable, fully resolved against the type table. */
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct VariableRecord {
    pub name: String,
    #[serde(rename = "type")]
    pub type_name: String,
    #[serde(default)]
    pub is_const: bool,
    #[serde(default)]
    pub is_volatile: bool,
    #[serde(default)]
    pub is_restrict: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub storage_class: Option<String>,
    #[serde(default)]
    pub is_pointer: bool,
    #[serde(default)]
    pub pointer_level: u32,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub array_size: Vec<ArrayDim>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub initial_value: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parsed_value: Option<ShapedValue>,
    pub location: Location,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub typeinfo: Option<ResolvedType>,
}

#[derive(Debug, Default, Clone)]
pub struct DataManager {
    pub variables: Vec<VariableRecord>,
    pub pointer_vars: Vec<VariableRecord>,
    pub array_vars: Vec<VariableRecord>,
    pub struct_vars: Vec<VariableRecord>,
}

impl DataManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_variable(&mut self, record: VariableRecord, types: &TypeManager) {
        if record.is_pointer {
            self.pointer_vars.push(record);
        } else if !record.array_size.is_empty() {
            self.array_vars.push(record);
        } else if types.is_struct_type(&record.type_name)
            || record
                .typeinfo
                .as_ref()
                .is_some_and(|info| info.is_struct)
        {
            self.struct_vars.push(record);
        } else {
            self.variables.push(record);
        }
    }

    pub fn len(&self) -> usize {
        self.variables.len()
            + self.pointer_vars.len()
            + self.array_vars.len()
            + self.struct_vars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&mut self) {
        self.variables.clear();
        self.pointer_vars.clear();
        self.array_vars.clear();
        self.struct_vars.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cmodel_types::{CompositeType, FieldRecord, TypeRecord};

    fn record(name: &str, type_name: &str) -> VariableRecord {
        VariableRecord {
            name: name.to_string(),
            type_name: type_name.to_string(),
            is_const: false,
            is_volatile: false,
            is_restrict: false,
            storage_class: None,
            is_pointer: false,
            pointer_level: 0,
            array_size: Vec::new(),
            initial_value: None,
            parsed_value: None,
            location: Location::default(),
            typeinfo: None,
        }
    }

    #[test]
    fn bucket_precedence_is_pointer_array_struct_plain() {
        let mut types = TypeManager::new();
        types.register_type(TypeRecord::Struct(CompositeType {
            name: "struct P".to_string(),
            fields: vec![FieldRecord::new("x", "int")],
            size: None,
            alignment: None,
            location: None,
            attributes: Default::default(),
            comment: None,
        }));
        let mut data = DataManager::new();

        let mut ptr = record("p", "struct P");
        ptr.is_pointer = true;
        ptr.pointer_level = 1;
        data.add_variable(ptr, &types);

        let mut arr = record("a", "struct P");
        arr.array_size = vec![ArrayDim::Fixed(2)];
        data.add_variable(arr, &types);

        data.add_variable(record("s", "struct P"), &types);
        data.add_variable(record("n", "int"), &types);

        assert_eq!(data.pointer_vars.len(), 1);
        assert_eq!(data.array_vars.len(), 1);
        assert_eq!(data.struct_vars.len(), 1);
        assert_eq!(data.variables.len(), 1);
        assert_eq!(data.len(), 4);
    }
}
