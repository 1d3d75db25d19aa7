/* Target data model: sizes, alignments, aliases, and printf formats for
 * the built-in C types. The default table is the common 64-bit LP64
 * model; swapping in another table changes every layout computation
 * without touching the public API of the type manager.
 */

use cmodel_types::BasicType;
use indexmap::IndexMap;

/* Size, alignment, and signedness of one built-in type. */
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BasicInfo {
    pub size: u64,
    pub alignment: u64,
    pub signed: bool,
}

/* Layout table for one compilation target. */
#[derive(Debug, Clone)]
pub struct TargetLayout {
    basics: IndexMap<String, BasicInfo>,
    aliases: IndexMap<String, String>,
    printf_formats: IndexMap<String, String>,
    pub pointer_size: u64,
    pub pointer_alignment: u64,
    pub enum_size: u64,
    pub enum_alignment: u64,
}

impl Default for TargetLayout {
    fn default() -> Self {
        Self::lp64()
    }
}

const LP64_BASICS: &[(&str, u64, u64, bool)] = &[
    ("char", 1, 1, true),
    ("short", 2, 2, true),
    ("int", 4, 4, true),
    ("long", 8, 8, true),
    ("long long", 8, 8, true),
    ("unsigned char", 1, 1, false),
    ("unsigned short", 2, 2, false),
    ("unsigned int", 4, 4, false),
    ("unsigned long", 8, 8, false),
    ("unsigned long long", 8, 8, false),
    ("int8_t", 1, 1, true),
    ("int16_t", 2, 2, true),
    ("int32_t", 4, 4, true),
    ("int64_t", 8, 8, true),
    ("uint8_t", 1, 1, false),
    ("uint16_t", 2, 2, false),
    ("uint32_t", 4, 4, false),
    ("uint64_t", 8, 8, false),
    ("float", 4, 4, true),
    ("double", 8, 8, true),
    ("long double", 16, 16, true),
    ("bool", 1, 1, false),
    ("size_t", 8, 8, false),
    ("void", 0, 1, false),
    ("signed", 4, 4, true),
    ("unsigned", 4, 4, false),
];

const FIXED_WIDTH_ALIASES: &[(&str, &str)] = &[
    ("u8", "uint8_t"),
    ("u16", "uint16_t"),
    ("u32", "uint32_t"),
    ("u64", "uint64_t"),
    ("i8", "int8_t"),
    ("i16", "int16_t"),
    ("i32", "int32_t"),
    ("i64", "int64_t"),
    ("f32", "float"),
    ("f64", "double"),
];

const PRINTF_FORMATS: &[(&str, &str)] = &[
    ("char", "\"%c\""),
    ("short", "%d"),
    ("int", "%d"),
    ("long", "%ld"),
    ("long long", "%lld"),
    ("unsigned char", "%u"),
    ("unsigned short", "%u"),
    ("unsigned int", "%u"),
    ("unsigned long", "%lu"),
    ("unsigned long long", "%llu"),
    ("int8_t", "%d"),
    ("int16_t", "%d"),
    ("int32_t", "%d"),
    ("int64_t", "%ld"),
    ("uint8_t", "%u"),
    ("uint16_t", "%u"),
    ("uint32_t", "%u"),
    ("uint64_t", "%lu"),
    ("float", "%.6f"),
    ("double", "%.6lf"),
    ("long double", "%.6Lf"),
    ("bool", "%s"),
    ("size_t", "%zu"),
];

impl TargetLayout {
    /* The common 64-bit model: 8-byte pointers and longs, 4-byte enums. */
    pub fn lp64() -> Self {
        let basics = LP64_BASICS
            .iter()
            .map(|&(name, size, alignment, signed)| {
                (
                    name.to_string(),
                    BasicInfo {
                        size,
                        alignment,
                        signed,
                    },
                )
            })
            .collect();
        let aliases = FIXED_WIDTH_ALIASES
            .iter()
            .map(|&(from, to)| (from.to_string(), to.to_string()))
            .collect();
        let printf_formats = PRINTF_FORMATS
            .iter()
            .map(|&(name, format)| (name.to_string(), format.to_string()))
            .collect();
        Self {
            basics,
            aliases,
            printf_formats,
            pointer_size: 8,
            pointer_alignment: 8,
            enum_size: 4,
            enum_alignment: 4,
        }
    }

    pub fn basic(&self, name: &str) -> Option<&BasicInfo> {
        self.basics
            .get(name)
            .or_else(|| self.aliases.get(name).and_then(|t| self.basics.get(t)))
    }

    pub fn is_basic(&self, name: &str) -> bool {
        self.basic(name).is_some()
    }

    /* Fixed-width alias target, e.g. u32 -> uint32_t. */
    pub fn resolve_alias(&self, name: &str) -> Option<&str> {
        self.aliases.get(name).map(String::as_str)
    }

    pub fn printf_format(&self, name: &str) -> Option<&str> {
        self.printf_formats.get(name).map(String::as_str)
    }

    /* Built-in entries matching a size, as synthesizable records. */
    pub fn basics_with_size(&self, size: u64) -> Vec<BasicType> {
        self.basics
            .iter()
            .filter(|(_, info)| info.size == size)
            .map(|(name, info)| BasicType {
                name: name.clone(),
                size: info.size,
                alignment: info.alignment,
                signed: info.signed,
            })
            .collect()
    }
}
