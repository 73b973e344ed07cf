//! Integration tests for the text-format summary loader.
//!
//! The loader is the user-facing surface: every resolution failure must be a
//! distinct, descriptive error, and the commands must populate exactly the
//! summary sets their names promise.

use cilgc::metadata::{CustomAttribute, NamedArgument};
use cilgc::prelude::*;

/// A world with a widget hierarchy, two same-named helpers for ambiguity,
/// and an attributed field.
struct ScriptWorld {
    program: WholeProgram,
    main: MethodId,
    widget: TypeId,
    widget_ctor: MethodId,
    widget_private_ctor: MethodId,
    button: TypeId,
    button_ctor: MethodId,
    draw: MethodId,
    internal_refresh: MethodId,
    count: FieldId,
    configured: FieldId,
    attr_ctor: MethodId,
    attr_setter: MethodId,
}

fn script_world(with_setter: bool) -> ScriptWorld {
    let mut b = ProgramBuilder::new();
    let app = b.add_assembly("App", true);
    let lib = b.add_assembly("Lib", false);
    let object = b.system_object();

    let widget = b.add_class(app, "App", "Widget");
    let widget_ctor = b.add_method(
        widget,
        ".ctor",
        MethodFlags::CONSTRUCTOR,
        Visibility::Public,
        Vec::new(),
    );
    let widget_private_ctor = b.add_method(
        widget,
        ".ctor",
        MethodFlags::CONSTRUCTOR,
        Visibility::Private,
        vec![object],
    );
    let draw = b.add_method(widget, "Draw", MethodFlags::VIRTUAL, Visibility::Public, Vec::new());
    let internal_refresh = b.add_method(
        widget,
        "Refresh",
        MethodFlags::empty(),
        Visibility::Assembly,
        Vec::new(),
    );
    let count = b.add_field(widget, "count", object, false);

    let button = b.add_type(app, "App", "Button", Some(widget), TypeFlags::empty());
    let button_ctor = b.add_method(
        button,
        ".ctor",
        MethodFlags::CONSTRUCTOR,
        Visibility::Public,
        Vec::new(),
    );

    // Two methods named Helper in different assemblies, for ambiguity.
    let app_util = b.add_class(app, "App", "Util");
    b.add_method(app_util, "Helper", MethodFlags::STATIC, Visibility::Public, Vec::new());
    let lib_util = b.add_class(lib, "App", "Util");
    b.add_method(lib_util, "Helper", MethodFlags::STATIC, Visibility::Public, Vec::new());

    // An attribute type with a constructor and optionally a property setter.
    let attr = b.add_class(app, "App", "ConfigAttribute");
    let attr_ctor = b.add_method(attr, ".ctor", MethodFlags::CONSTRUCTOR, Visibility::Public, Vec::new());
    let attr_setter = b.add_method(
        attr,
        if with_setter { "set_Name" } else { "set_Other" },
        MethodFlags::empty(),
        Visibility::Public,
        vec![object],
    );
    let configured = b.add_field(widget, "configured", object, false);
    let attr_ctor_ref = b.method_ref(attr_ctor);
    b.add_field_attribute(
        configured,
        CustomAttribute {
            constructor: attr_ctor_ref,
            named_arguments: vec![NamedArgument {
                name: "Name".into(),
                value_type: object,
            }],
        },
    );

    let program_type = b.add_class(app, "App", "Program");
    let main = b.add_method(
        program_type,
        "Main",
        MethodFlags::STATIC,
        Visibility::Public,
        Vec::new(),
    );

    ScriptWorld {
        program: b.finish(),
        main,
        widget,
        widget_ctor,
        widget_private_ctor,
        button,
        button_ctor,
        draw,
        internal_refresh,
        count,
        configured,
        attr_ctor,
        attr_setter,
    }
}

#[test]
fn construct_marks_type_and_public_constructors() -> Result<()> {
    let w = script_world(true);
    let script = ScriptSummarizer::parse(
        "summarize App!Program::Main\n\
         construct App!Widget\n",
        &w.program,
    )?;

    assert!(script.can_summarize(&w.program, w.main));
    let summary = script.summarize(&w.program, w.main)?;
    assert!(summary.constructed_types.contains(&w.widget));
    assert!(summary.nonvirtually_called_methods.contains(&w.widget_ctor));
    assert!(!summary
        .nonvirtually_called_methods
        .contains(&w.widget_private_ctor));
    Ok(())
}

#[test]
fn construct_subtypes_covers_the_hierarchy_below() -> Result<()> {
    let w = script_world(true);
    let script = ScriptSummarizer::parse(
        "summarize Program::Main\nconstruct subtypes App!Widget\n",
        &w.program,
    )?;

    let summary = script.summarize(&w.program, w.main)?;
    assert!(summary.constructed_types.contains(&w.button));
    assert!(!summary.constructed_types.contains(&w.widget));
    assert!(summary.nonvirtually_called_methods.contains(&w.button_ctor));
    Ok(())
}

#[test]
fn construct_matches_uses_wildcards() -> Result<()> {
    let w = script_world(true);
    let script = ScriptSummarizer::parse(
        "summarize Program::Main\nconstruct matches App!App.W*\n",
        &w.program,
    )?;

    let summary = script.summarize(&w.program, w.main)?;
    assert!(summary.constructed_types.contains(&w.widget));
    assert!(!summary.constructed_types.contains(&w.button));
    Ok(())
}

#[test]
fn call_commands_populate_their_sets() -> Result<()> {
    let w = script_world(true);
    let script = ScriptSummarizer::parse(
        "summarize Program::Main\n\
         # direct and virtual calls\n\
         call App!Util::Helper\n\
         call virtual App!Widget::Draw\n\
         read App!Widget::count\n",
        &w.program,
    )?;

    let summary = script.summarize(&w.program, w.main)?;
    assert!(summary.virtually_called_methods.contains(&w.draw));
    assert!(summary.reachable_fields.contains(&w.count));
    assert_eq!(summary.nonvirtually_called_methods.len(), 1);
    Ok(())
}

#[test]
fn call_anypublic_skips_non_public_methods() -> Result<()> {
    let w = script_world(true);
    let script = ScriptSummarizer::parse(
        "summarize Program::Main\ncall anypublic App!Widget\n",
        &w.program,
    )?;

    let summary = script.summarize(&w.program, w.main)?;
    assert!(summary.nonvirtually_called_methods.contains(&w.draw));
    assert!(!summary
        .nonvirtually_called_methods
        .contains(&w.internal_refresh));
    // A matched constructor implies construction.
    assert!(summary.nonvirtually_called_methods.contains(&w.widget_ctor));
    assert!(summary.constructed_types.contains(&w.widget));
    Ok(())
}

#[test]
fn call_any_includes_non_public_methods() -> Result<()> {
    let w = script_world(true);
    let script = ScriptSummarizer::parse(
        "summarize Program::Main\ncall any App!Widget\n",
        &w.program,
    )?;

    let summary = script.summarize(&w.program, w.main)?;
    assert!(summary
        .nonvirtually_called_methods
        .contains(&w.internal_refresh));
    assert!(summary
        .nonvirtually_called_methods
        .contains(&w.widget_private_ctor));
    Ok(())
}

#[test]
fn construct_attributes_resolves_setters() -> Result<()> {
    let w = script_world(true);
    let script = ScriptSummarizer::parse(
        "summarize Program::Main\nconstruct attributes App!Widget::configured\n",
        &w.program,
    )?;

    let summary = script.summarize(&w.program, w.main)?;
    assert!(summary.nonvirtually_called_methods.contains(&w.attr_ctor));
    assert!(summary.nonvirtually_called_methods.contains(&w.attr_setter));
    assert!(!summary.reachable_fields.contains(&w.configured));
    Ok(())
}

#[test]
fn missing_setter_is_a_distinct_fatal_error() {
    let w = script_world(false);
    let result = ScriptSummarizer::parse(
        "summarize Program::Main\nconstruct attributes App!Widget::configured\n",
        &w.program,
    );
    assert!(matches!(result, Err(Error::MissingSetter { .. })));
}

#[test]
fn unresolved_attribute_constructor_is_fatal() {
    let mut b = ProgramBuilder::new();
    let app = b.add_assembly("App", true);
    let object = b.system_object();
    let widget = b.add_class(app, "App", "Widget");
    let tagged = b.add_field(widget, "tagged", object, false);
    let vendor_ctor = b.unresolved_method_ref("Vendor.TagAttribute::.ctor");
    b.add_field_attribute(
        tagged,
        CustomAttribute {
            constructor: vendor_ctor,
            named_arguments: Vec::new(),
        },
    );
    let program_type = b.add_class(app, "App", "Program");
    b.add_method(program_type, "Main", MethodFlags::STATIC, Visibility::Public, Vec::new());
    let program = b.finish();

    let result = ScriptSummarizer::parse(
        "summarize Program::Main\nconstruct attributes App!Widget::tagged\n",
        &program,
    );
    assert!(matches!(result, Err(Error::UnresolvedAttribute { .. })));
}

#[test]
fn not_found_and_ambiguous_are_distinct_errors() {
    let w = script_world(true);

    let result = ScriptSummarizer::parse("summarize Program::NoSuchMethod\n", &w.program);
    assert!(matches!(result, Err(Error::IdentifierNotFound { .. })));

    // Util::Helper exists in both App and Lib; without an assembly qualifier
    // the lookup is ambiguous.
    let result = ScriptSummarizer::parse(
        "summarize Program::Main\ncall Util::Helper\n",
        &w.program,
    );
    assert!(matches!(
        result,
        Err(Error::IdentifierAmbiguous { count: 2, .. })
    ));
}

#[test]
fn commands_outside_a_summary_scope_fail_with_line_numbers() {
    let w = script_world(true);
    let result = ScriptSummarizer::parse(
        "# leading comment\ncall App!Util::Helper\n",
        &w.program,
    );
    match result {
        Err(Error::ScriptParse { line, .. }) => assert_eq!(line, 2),
        other => panic!("expected a parse error, got {other:?}"),
    }
}

#[test]
fn unknown_operations_are_parse_errors() {
    let w = script_world(true);
    let result = ScriptSummarizer::parse("summon App!Widget\n", &w.program);
    assert!(matches!(result, Err(Error::ScriptParse { .. })));
}

#[test]
fn methods_without_a_scripted_summary_get_an_empty_one() -> Result<()> {
    let w = script_world(true);
    let script = ScriptSummarizer::parse("summarize Program::Main\n", &w.program)?;
    assert!(!script.can_summarize(&w.program, w.draw));
    assert!(script.summarize(&w.program, w.draw)?.is_empty());
    Ok(())
}
