//! Parser integration tests

use plycpp::grammar::{
    DeclSpecifier, Declaration, Initializer, ProductionKind, Record, Simple, chain_iter,
};
use plycpp::{
    CollectingSupervisor, ParseSupervisor, ScopeKind, ScopeRef, ScopeStack, TranslationUnit,
    VisitedFiles, parse,
};

/// Helper to parse a source string with a collecting supervisor
fn parse_source(source: &str) -> (TranslationUnit, CollectingSupervisor) {
    let mut files = VisitedFiles::new();
    let mut visor = CollectingSupervisor::default();
    let output = parse("test.h", source, &mut files, &[], None, Some(&mut visor));
    assert_eq!(output.error_count as usize, visor.errors.len());
    (output.unit, visor)
}

/// Helper to parse a source string that must not produce diagnostics
fn parse_ok(source: &str) -> TranslationUnit {
    let (unit, visor) = parse_source(source);
    assert!(visor.errors.is_empty(), "unexpected errors: {:?}", visor.errors);
    unit
}

fn as_simple(decl: &Declaration) -> &Simple {
    match decl {
        Declaration::Simple(simple) => simple,
        other => panic!("expected a simple declaration, got {:?}", other),
    }
}

fn as_record(simple: &Simple) -> &Record {
    simple
        .decl_specifier_seq
        .iter()
        .find_map(|spec| match spec {
            DeclSpecifier::Record(record) => Some(record),
            _ => None,
        })
        .expect("expected a record specifier")
}

#[test]
fn test_angle_brackets_in_template_arguments() {
    let unit = parse_ok("Map<Foo, Vector<Bar>> m;\nint x = a >> b;\n");
    assert_eq!(unit.visor_decls.len(), 2);
    let simple = as_simple(&unit.visor_decls[0]);
    let DeclSpecifier::TypeID { qid, .. } = &simple.decl_specifier_seq[0] else {
        panic!("expected a type id");
    };
    assert_eq!(qid.to_string(), "Map<>");
    assert_eq!(simple.init_declarators[0].dcor.qid.to_string(), "m");

    let simple = as_simple(&unit.visor_decls[1]);
    let Initializer::Assignment { .. } = &simple.init_declarators[0].init else {
        panic!("expected an initializer");
    };
}

#[test]
fn test_constructor_only_for_enclosing_class() {
    let unit = parse_ok("struct Foo {\n    Foo(int);\n    Baz(int);\n};\n");
    let record = as_record(as_simple(&unit.visor_decls[0]));
    assert_eq!(record.qid.to_string(), "Foo");
    assert_eq!(record.visor_decls.len(), 2);

    let ctor = as_simple(&record.visor_decls[0]);
    assert!(ctor.decl_specifier_seq.is_empty());
    assert!(ctor.init_declarators[0].dcor.is_function());

    let other = as_simple(&record.visor_decls[1]);
    assert!(matches!(
        other.decl_specifier_seq[0],
        DeclSpecifier::TypeID { .. }
    ));
}

#[test]
fn test_declarator_composition() {
    let unit = parse_ok("int *a[3];\nint (*b)[3];\nint (*c)();\nvoid (*d)() const;\n");
    let shapes: Vec<String> = unit
        .visor_decls
        .iter()
        .map(|decl| {
            let dcor = &as_simple(decl).init_declarators[0].dcor;
            plycpp::dump::describe_declarator(&dcor.prod)
        })
        .collect();
    assert_eq!(
        shapes,
        vec![
            "array of pointer to",
            "pointer to array of",
            "pointer to function returning",
            "pointer to function returning",
        ]
    );

    let dcor = &as_simple(&unit.visor_decls[3]).init_declarators[0].dcor;
    let function = chain_iter(&dcor.prod)
        .find_map(|p| match &p.kind {
            ProductionKind::Function(f) => Some(f),
            _ => None,
        })
        .unwrap();
    assert_eq!(function.qualifiers.tokens[0].text, "const");
}

#[test]
fn test_template_owns_its_declaration() {
    let unit = parse_ok("template <typename T, int N = 3>\nstruct Box {\n    T items[N];\n};\n");
    let Declaration::Template(tmpl) = &unit.visor_decls[0] else {
        panic!("expected a template");
    };
    assert_eq!(tmpl.params.params.len(), 2);
    let inner = tmpl.visor_decl.as_deref().unwrap();
    let record = as_record(as_simple(inner));
    assert_eq!(record.qid.to_string(), "Box");
    assert_eq!(record.visor_decls.len(), 1);
}

#[test]
fn test_enumerators_are_reported() {
    let (unit, visor) = parse_source("enum class Color : u8 {\n    Red,\n    Green = 2,\n    Blue\n};\n");
    assert!(visor.errors.is_empty());
    assert_eq!(visor.enumerators, vec!["Red", "Green", "Blue"]);
    assert_eq!(visor.entered_classes, vec!["Color"]);
    let simple = as_simple(&unit.visor_decls[0]);
    let DeclSpecifier::Enum(en) = &simple.decl_specifier_seq[0] else {
        panic!("expected an enum");
    };
    assert_eq!(en.class_key.text, "class");
    assert_eq!(en.base.to_string(), "u8");
    assert_eq!(en.enumerators.len(), 3);
}

#[test]
fn test_class_members_and_bases() {
    let source = "namespace ply {\n\
                  class Widget : public Base, private detail::Mixin<int> {\n\
                  public:\n\
                      virtual ~Widget();\n\
                      void draw() const override;\n\
                      static constexpr int Size = 4;\n\
                      operator bool() const { return true; }\n\
                  private:\n\
                      struct Impl;\n\
                      Impl* impl = nullptr;\n\
                  };\n\
                  } // namespace ply\n";
    let (unit, visor) = parse_source(source);
    assert!(visor.errors.is_empty(), "{:?}", visor.errors);
    assert_eq!(visor.entered_classes, vec!["ply::Widget"]);

    let Declaration::Namespace(ns) = &unit.visor_decls[0] else {
        panic!("expected a namespace");
    };
    let record = as_record(as_simple(&ns.visor_decls[0]));
    assert_eq!(record.base_specifier_list.len(), 2);
    assert_eq!(record.base_specifier_list[1].base_qid.to_string(), "detail::Mixin<>");
    let access = record
        .visor_decls
        .iter()
        .filter(|d| matches!(d, Declaration::AccessSpecifier { .. }))
        .count();
    assert_eq!(access, 2);
    assert_eq!(record.visor_decls.len(), 8);
    assert_eq!(visor.comments.len(), 1);
}

/// Records the scope stack at each enter/exit
#[derive(Default)]
struct ScopeRecorder {
    events: Vec<String>,
}

impl ParseSupervisor for ScopeRecorder {
    fn enter(&mut self, node: ScopeRef<'_>, scopes: &ScopeStack) {
        let label = match node {
            ScopeRef::TranslationUnit(_) => "tu".to_string(),
            ScopeRef::Namespace(_) => format!("ns {}", scopes.get_namespace_prefix()),
            ScopeRef::Record(_) => format!("record {}", scopes.get_class_name("::", true)),
            ScopeRef::Enum(_) => format!("enum {}", scopes.get_class_name("::", true)),
            ScopeRef::Linkage(_) => "linkage".to_string(),
            ScopeRef::Template(_) => "template".to_string(),
            ScopeRef::FunctionBody(_) => "body".to_string(),
        };
        self.events.push(format!("enter {}", label));
    }

    fn exit(&mut self, _node: ScopeRef<'_>, scopes: &ScopeStack) {
        let top = match scopes.top() {
            Some(ScopeKind::TranslationUnit) => "tu",
            Some(ScopeKind::Namespace { .. }) => "ns",
            Some(ScopeKind::Record { .. }) => "record",
            Some(ScopeKind::Enum { .. }) => "enum",
            Some(ScopeKind::Linkage) => "linkage",
            Some(ScopeKind::Template) => "template",
            Some(ScopeKind::FunctionBody) => "body",
            None => "none",
        };
        self.events.push(format!("exit {}", top));
    }
}

#[test]
fn test_scope_events_are_nested() {
    let mut files = VisitedFiles::new();
    let mut recorder = ScopeRecorder::default();
    let source = "namespace a { namespace b {\n\
                  extern \"C\" { int f(); }\n\
                  template <typename T> struct S { enum E { X }; };\n\
                  } }\n";
    let output = parse("test.h", source, &mut files, &[], None, Some(&mut recorder));
    assert_eq!(output.error_count, 0);
    assert_eq!(
        recorder.events,
        vec![
            "enter tu",
            "enter ns a::",
            "enter ns a::b::",
            "enter linkage",
            "exit linkage",
            "enter template",
            "enter record a::b::S",
            "enter enum a::b::S::E",
            "exit enum",
            "exit record",
            "exit template",
            "exit ns",
            "exit ns",
            "exit tu",
        ]
    );
}

#[test]
fn test_function_definition_needs_no_semicolon() {
    let unit = parse_ok("int add(int a, int b) { return a + b; }\nint x;\n");
    assert_eq!(unit.visor_decls.len(), 2);
    let simple = as_simple(&unit.visor_decls[0]);
    assert!(simple.init_declarators[0].init.is_function_body());
    assert!(!simple.semicolon.is_valid());
}

#[test]
fn test_macros_are_transparent_to_the_parser() {
    let (unit, visor) = parse_source("#define EXPORT\n#define DECL(name) int name\nEXPORT DECL(x);\n");
    assert!(visor.errors.is_empty(), "{:?}", visor.errors);
    assert_eq!(unit.visor_decls.len(), 1);
    let simple = as_simple(&unit.visor_decls[0]);
    assert_eq!(simple.init_declarators[0].dcor.qid.to_string(), "x");
    let names: Vec<&str> = visor.macros.iter().map(|(name, _)| name.as_str()).collect();
    assert_eq!(names, vec!["EXPORT", "DECL"]);
}

#[test]
fn test_multi_word_builtin_types() {
    let source = "unsigned n;\n\
                  long long x;\n\
                  signed char c;\n\
                  short int s;\n\
                  long double d;\n\
                  unsigned long y;\n\
                  struct Buffer {\n\
                      unsigned size = 0;\n\
                      unsigned long long capacity;\n\
                  };\n\
                  void resize(unsigned long count, short);\n";
    let unit = parse_ok(source);
    assert_eq!(unit.visor_decls.len(), 8);
    let names: Vec<String> = unit.visor_decls[..6]
        .iter()
        .map(|decl| as_simple(decl).init_declarators[0].dcor.qid.to_string())
        .collect();
    assert_eq!(names, vec!["n", "x", "c", "s", "d", "y"]);
    let record = as_record(as_simple(&unit.visor_decls[6]));
    assert_eq!(record.visor_decls.len(), 2);
}
