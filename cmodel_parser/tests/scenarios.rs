/* End-to-end checks: C snippets through the full pipeline, asserting on
 * the emitted records and value trees. */

use cmodel_parser::{AnalysisOutput, Analyzer, VariableRecord};
use cmodel_types::{ArrayDim, TypeRecord};
use serde_json::json;

fn analyze(source: &str) -> AnalysisOutput {
    Analyzer::new()
        .analyze_source(source, "test.c")
        .expect("analysis should succeed")
}

fn value_of(var: &VariableRecord) -> serde_json::Value {
    serde_json::to_value(var.parsed_value.as_ref().expect("parsed value")).unwrap()
}

#[test]
fn scalar_with_hex_initializer() {
    let out = analyze("static int g = 0x2A;");
    assert_eq!(out.variables.variables.len(), 1);
    let g = &out.variables.variables[0];
    assert_eq!(g.name, "g");
    assert_eq!(g.type_name, "int");
    assert_eq!(g.storage_class.as_deref(), Some("static"));
    assert_eq!(value_of(g), json!(42));
}

#[test]
fn enum_driven_array_dimension() {
    let out = analyze(
        "enum Sz { N = 4 };\n\
         static int a[N] = {10, 20, 30, 40};\n",
    );

    assert_eq!(out.types.enums.len(), 1);
    match &out.types.enums[0] {
        TypeRecord::Enum(e) => {
            assert_eq!(e.name, "enum Sz");
            assert_eq!(serde_json::to_value(&e.values).unwrap(), json!({"N": 4}));
        }
        other => panic!("expected enum record, got {:?}", other),
    }

    assert_eq!(out.variables.array_vars.len(), 1);
    let a = &out.variables.array_vars[0];
    assert_eq!(a.array_size, vec![ArrayDim::Fixed(4)]);
    assert_eq!(value_of(a), json!([10, 20, 30, 40]));
}

#[test]
fn designated_and_positional_mix_omits_uncovered_fields() {
    let out = analyze(
        "typedef struct { int x; int y; int z; } P;\n\
         static P p = { 1, .z = 3 };\n",
    );
    assert_eq!(out.variables.struct_vars.len(), 1);
    let p = &out.variables.struct_vars[0];
    let value = value_of(p);
    assert_eq!(value, json!({"x": 1, "z": 3}));
    assert!(value.get("y").is_none());
}

#[test]
fn dynamic_two_dimensional_array_inference() {
    let out = analyze("static int m[][3] = { {1,2,3}, {4,5,6}, {7,8,9} };");
    let m = &out.variables.array_vars[0];
    assert_eq!(m.array_size, vec![ArrayDim::Fixed(3), ArrayDim::Fixed(3)]);
    assert_eq!(value_of(m), json!([[1, 2, 3], [4, 5, 6], [7, 8, 9]]));
}

#[test]
fn string_initializer_infers_nul_terminated_extent() {
    let out = analyze("static char s[] = \"hi\";");
    let s = &out.variables.array_vars[0];
    assert_eq!(s.array_size, vec![ArrayDim::Fixed(3)]);
    assert_eq!(value_of(s), json!("hi"));
}

#[test]
fn string_escapes_count_as_single_bytes() {
    let out = analyze("static char s[] = \"a\\n\\x41\";");
    let s = &out.variables.array_vars[0];
    assert_eq!(s.array_size, vec![ArrayDim::Fixed(4)]);
    assert_eq!(value_of(s), json!("a\nA"));
}

#[test]
fn anonymous_union_selects_designated_variant() {
    let out = analyze(
        "typedef struct { int tag; union { int i; float f; } u; } V;\n\
         static V v = { .tag = 1, .u = { .f = 3.14f } };\n",
    );
    let v = &out.variables.struct_vars[0];
    assert_eq!(value_of(v), json!({"tag": 1, "u": {"f": 3.14}}));
}

#[test]
fn designated_order_does_not_change_the_value() {
    let forward = analyze(
        "typedef struct { int a; int b; } T;\n\
         static T t = { .a = 1, .b = 2 };\n",
    );
    let backward = analyze(
        "typedef struct { int a; int b; } T;\n\
         static T t = { .b = 2, .a = 1 };\n",
    );
    let positional = analyze(
        "typedef struct { int a; int b; } T;\n\
         static T t = { 1, 2 };\n",
    );
    let expected = json!({"a": 1, "b": 2});
    assert_eq!(value_of(&forward.variables.struct_vars[0]), expected);
    assert_eq!(value_of(&backward.variables.struct_vars[0]), expected);
    assert_eq!(value_of(&positional.variables.struct_vars[0]), expected);
}

#[test]
fn enumerator_auto_increment_resumes_after_explicit_value() {
    let out = analyze("enum Seq { A, B = 5, C, D };");
    match &out.types.enums[0] {
        TypeRecord::Enum(e) => {
            assert_eq!(
                serde_json::to_value(&e.values).unwrap(),
                json!({"A": 0, "B": 5, "C": 6, "D": 7})
            );
        }
        other => panic!("expected enum record, got {:?}", other),
    }
}

#[test]
fn constant_array_extents_round_trip() {
    let out = analyze("static int grid[2][3] = { {1, 2, 3}, {4, 5, 6} };");
    let grid = &out.variables.array_vars[0];
    assert_eq!(grid.array_size, vec![ArrayDim::Fixed(2), ArrayDim::Fixed(3)]);
    match serde_json::to_value(grid.parsed_value.as_ref().unwrap()).unwrap() {
        serde_json::Value::Array(rows) => {
            assert_eq!(rows.len(), 2);
            for row in rows {
                assert_eq!(row.as_array().unwrap().len(), 3);
            }
        }
        other => panic!("expected array value, got {:?}", other),
    }
}

#[test]
fn typedef_resolution_is_idempotent() {
    let mut analyzer = Analyzer::new();
    analyzer
        .analyze_source(
            "typedef int base_t;\n\
             typedef base_t level1_t;\n\
             typedef level1_t level2_t;\n\
             typedef struct Pt { int x; } *pt_ptr;\n",
            "test.c",
        )
        .unwrap();
    let types = analyzer.types();
    for name in ["base_t", "level1_t", "level2_t", "pt_ptr", "int", "struct Pt"] {
        let once = types.get_real_type(name);
        assert_eq!(types.get_real_type(&once), once, "resolving {}", name);
    }
    assert_eq!(types.get_real_type("level2_t"), "int");
    assert_eq!(types.get_real_type("pt_ptr"), "struct Pt*");
}

#[test]
fn field_offsets_are_bounded_by_struct_size() {
    let mut analyzer = Analyzer::new();
    analyzer
        .analyze_source(
            "struct Header { char magic[4]; unsigned int length; unsigned short flags; };\n\
             struct Packet { struct Header hdr; char payload[16]; struct Packet *next; };\n",
            "test.c",
        )
        .unwrap();
    let types = analyzer.types();
    for (composite, fields) in [
        ("struct Header", vec!["magic", "length", "flags"]),
        ("struct Packet", vec!["hdr", "payload", "next"]),
    ] {
        let size = types.get_type_size(composite);
        assert!(size > 0, "{} has a computed size", composite);
        for field in fields {
            assert!(
                types.calculate_field_offset(composite, field) < size,
                "{}.{} offset within size",
                composite,
                field
            );
        }
    }
}

#[test]
fn pointer_variables_keep_symbolic_initializers() {
    let out = analyze(
        "static int target = 3;\n\
         static int *p = &target;\n\
         static const char *name = \"boot\";\n\
         static void *nothing = NULL;\n",
    );
    assert_eq!(out.variables.pointer_vars.len(), 3);
    let p = &out.variables.pointer_vars[0];
    assert_eq!(value_of(p), json!("&target"));
    let name = &out.variables.pointer_vars[1];
    assert!(name.is_const);
    assert_eq!(value_of(name), json!("\"boot\""));
    let nothing = &out.variables.pointer_vars[2];
    assert_eq!(value_of(nothing), json!(null));
}

#[test]
fn extern_without_initializer_is_skipped() {
    let out = analyze(
        "extern int skipped;\n\
         extern int kept = 1;\n\
         int plain;\n",
    );
    let names: Vec<&str> = out
        .variables
        .variables
        .iter()
        .map(|v| v.name.as_str())
        .collect();
    assert!(!names.contains(&"skipped"));
    assert!(names.contains(&"kept"));
    assert!(names.contains(&"plain"));
}

#[test]
fn function_declarations_are_not_variables() {
    let out = analyze(
        "int compute(int a, int b);\n\
         static int (*handler)(int) = NULL;\n\
         int value = 7;\n",
    );
    assert_eq!(out.variables.variables.len(), 1);
    assert_eq!(out.variables.variables[0].name, "value");
    assert_eq!(out.variables.pointer_vars.len(), 1);
    assert_eq!(out.variables.pointer_vars[0].name, "handler");
}

#[test]
fn excess_initializer_elements_are_dropped() {
    let out = analyze("static int pair[2] = {1, 2, 3, 4};");
    let pair = &out.variables.array_vars[0];
    assert_eq!(pair.array_size, vec![ArrayDim::Fixed(2)]);
    assert_eq!(value_of(pair), json!([1, 2]));
}

#[test]
fn struct_array_of_composites() {
    let out = analyze(
        "typedef struct { int id; char tag; } Item;\n\
         static Item items[2] = { {1, 'a'}, {.id = 2} };\n",
    );
    let items = &out.variables.array_vars[0];
    assert_eq!(
        value_of(items),
        json!([{"id": 1, "tag": "'a'"}, {"id": 2}])
    );
}

#[test]
fn macro_constants_reach_dimensions_and_values() {
    let out = analyze(
        "#define COUNT 3\n\
         #define TOTAL (COUNT * 2)\n\
         static int table[TOTAL] = {1, 2, 3, 4, 5, 6};\n\
         static int limit = TOTAL - 1;\n",
    );
    let table = &out.variables.array_vars[0];
    assert_eq!(table.array_size, vec![ArrayDim::Fixed(6)]);
    let limit = &out.variables.variables[0];
    assert_eq!(value_of(limit), json!(5));
}

#[test]
fn simplified_view_keeps_only_core_fields() {
    let out = analyze(
        "static int g = 1;\n\
         static int a[2] = {1, 2};\n",
    );
    let simple = out.simplified();
    assert_eq!(simple.variables.len(), 2);
    let json = serde_json::to_value(&simple).unwrap();
    let vars = json["variables"].as_array().unwrap();
    for var in vars {
        assert!(var.get("name").is_some());
        assert!(var.get("type").is_some());
        assert!(var.get("typeinfo").is_none());
        assert!(var.get("location").is_none());
    }
    /* The scalar variable has no array_size key at all. */
    let scalar = vars.iter().find(|v| v["name"] == "g").unwrap();
    assert!(scalar.get("array_size").is_none());
}

#[test]
fn unknown_expression_survives_as_text() {
    let out = analyze("static int mystery = SOME_UNDEFINED_CONSTANT + 1;");
    let mystery = &out.variables.variables[0];
    assert_eq!(value_of(mystery), json!("SOME_UNDEFINED_CONSTANT + 1"));
}

#[test]
fn analysis_from_a_file_on_disk() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("unit.c");
    std::fs::write(&path, "static int answer = 42;\n").unwrap();

    let out = Analyzer::new().analyze_file(&path).unwrap();
    assert_eq!(out.variables.variables.len(), 1);
    let answer = &out.variables.variables[0];
    assert_eq!(value_of(answer), json!(42));
    assert_eq!(answer.location.file, path.display().to_string());
}

#[test]
fn missing_file_is_a_file_error() {
    let result = Analyzer::new().analyze_file(std::path::Path::new("/no/such/unit.c"));
    match result {
        Err(cmodel_parser::AnalyzerError::File { path, .. }) => {
            assert_eq!(path, std::path::PathBuf::from("/no/such/unit.c"));
        }
        other => panic!("expected a file error, got {:?}", other.map(|_| ())),
    }
}

#[test]
fn output_document_has_the_published_shape() {
    let out = analyze(
        "struct S { int x; };\n\
         enum E { A };\n\
         typedef int alias_t;\n\
         static struct S s = {1};\n",
    );
    let doc = serde_json::to_value(&out).unwrap();
    for key in ["structs", "unions", "enums", "typedefs"] {
        assert!(doc["types"].get(key).is_some(), "missing types.{}", key);
    }
    for key in ["variables", "pointer_vars", "array_vars", "struct_vars"] {
        assert!(doc["variables"].get(key).is_some(), "missing variables.{}", key);
    }
    assert_eq!(doc["variables"]["struct_vars"][0]["name"], "s");
}
